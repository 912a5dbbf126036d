use clist::{
    grown_capacity, CompactList, CompactListFactory, ListError, ObjectCompactList,
    DEFAULT_CAPACITY,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn generated_and_object_lists_agree(values in prop::collection::vec(any::<i64>(), 0..120)) {
        let mut factory = CompactListFactory::default();
        let mut generated = factory.new_compact_list::<i64>().unwrap();
        let mut object = ObjectCompactList::<i64>::new();
        let mut expected_capacity = DEFAULT_CAPACITY;

        for (index, value) in values.iter().enumerate() {
            let before = generated.capacity();
            generated.push(*value).unwrap();
            object.push(*value).unwrap();
            if let Some(grown) = grown_capacity(expected_capacity, index as i32 + 1).unwrap() {
                expected_capacity = grown;
            }
            prop_assert!(generated.capacity() >= before);
            prop_assert!(generated.capacity() >= generated.size());
            prop_assert_eq!(generated.capacity(), expected_capacity);
            prop_assert_eq!(object.capacity(), expected_capacity);
        }

        prop_assert_eq!(generated.size(), values.len() as i32);
        prop_assert_eq!(object.size(), values.len() as i32);
        for (index, value) in values.iter().enumerate() {
            prop_assert_eq!(generated.get(index as i32), Ok(*value));
            prop_assert_eq!(object.get(index as i32), Ok(*value));
        }
    }

    #[test]
    fn narrow_values_round_trip(values in prop::collection::vec(any::<i8>(), 1..40)) {
        let mut factory = CompactListFactory::default();
        let mut list = factory.new_compact_list::<i8>().unwrap();
        for value in &values {
            list.push(*value).unwrap();
        }
        for (index, value) in values.iter().enumerate() {
            prop_assert_eq!(list.get(index as i32), Ok(*value));
        }
    }

    #[test]
    fn out_of_range_reads_are_bounds_errors(len in 0i32..30, index in any::<i32>()) {
        prop_assume!(index < 0 || index >= len);
        let mut factory = CompactListFactory::default();
        let mut list = factory.new_compact_list::<bool>().unwrap();
        for i in 0..len {
            list.push(i % 2 == 0).unwrap();
        }
        prop_assert_eq!(list.get(index), Err(ListError::Bounds { index, size: len }));
    }

    #[test]
    fn growth_policy_never_shrinks(current in 1i32.., min_capacity in any::<i32>()) {
        match grown_capacity(current, min_capacity) {
            Err(err) => {
                prop_assert!(min_capacity <= 0);
                prop_assert_eq!(err, ListError::Capacity { current, requested: min_capacity });
            }
            Ok(None) => prop_assert!(current >= min_capacity && min_capacity > 0),
            Ok(Some(grown)) => {
                prop_assert!(grown >= min_capacity);
                prop_assert!(grown > current);
            }
        }
    }
}
