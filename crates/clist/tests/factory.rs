use clist::{
    parse_clist_toml, ClistConfig, CompactList, CompactListFactory, ElementKind, FactoryStats,
    KindTable, ListError, Value,
};

#[test]
fn repeated_requests_reuse_the_loaded_type() {
    let mut factory = CompactListFactory::default();
    let mut first = factory.new_compact_list::<i64>().unwrap();
    let mut second = factory.new_compact_list::<i64>().unwrap();
    assert_eq!(
        factory.stats(),
        FactoryStats {
            generated: 1,
            cache_hits: 1,
            fallbacks: 0
        }
    );

    first.push(1).unwrap();
    second.push(2).unwrap();
    second.push(3).unwrap();
    assert_eq!(first.size(), 1);
    assert_eq!(second.size(), 2);
    assert_eq!(first.get(0), Ok(1));
    assert_eq!(second.get(0), Ok(2));
}

#[test]
fn uncached_requests_generate_into_fresh_scopes() {
    let config = parse_clist_toml("[factory]\ncache_units = false\n").unwrap();
    let mut factory = CompactListFactory::from_config(config);
    let first = factory.list_type(ElementKind::Int).unwrap().unwrap();
    let second = factory.list_type(ElementKind::Int).unwrap().unwrap();
    assert_eq!(first.name(), "IntCompactList");
    assert_eq!(second.name(), "IntCompactList");
    assert_eq!(factory.stats().generated, 2);
    assert_eq!(factory.stats().cache_hits, 0);

    let mut a = first.instantiate::<i32>().unwrap();
    let mut b = second.instantiate::<i32>().unwrap();
    a.push(10).unwrap();
    b.push(20).unwrap();
    assert_eq!(a.get(0), Ok(10));
    assert_eq!(b.get(0), Ok(20));
}

#[test]
fn disabled_kinds_fall_back() {
    let config = parse_clist_toml("[kinds]\ndisabled = [\"double\"]\n").unwrap();
    let mut factory = CompactListFactory::from_config(config);
    assert!(factory.resolve(ElementKind::Double).is_none());
    assert!(factory.resolve(ElementKind::Float).is_some());

    let mut list = factory.new_compact_list::<f64>().unwrap();
    for i in 0..11 {
        list.push(f64::from(i)).unwrap();
    }
    assert_eq!(list.get(10), Ok(10.0));
    assert_eq!(factory.stats().fallbacks, 1);
    assert_eq!(factory.stats().generated, 0);
}

#[test]
fn empty_table_always_falls_back() {
    let mut factory = CompactListFactory::new(KindTable::empty(), ClistConfig::default());
    assert!(factory.list_type(ElementKind::Bool).unwrap().is_none());
    let mut list = factory.new_compact_list::<bool>().unwrap();
    list.push(false).unwrap();
    assert_eq!(list.get(0), Ok(false));
    assert_eq!(factory.stats().fallbacks, 1);
}

#[test]
fn non_primitive_kinds_have_no_list_type() {
    let mut factory = CompactListFactory::default();
    assert!(factory.list_type(ElementKind::Text).unwrap().is_none());
    assert!(factory.list_type(ElementKind::Any).unwrap().is_none());
    assert_eq!(factory.stats().generated, 0);
}

#[test]
fn lists_outlive_their_factory() {
    let mut list = {
        let mut factory = CompactListFactory::default();
        factory.new_compact_list::<char>().unwrap()
    };
    for c in "compact".chars() {
        list.push(c).unwrap();
    }
    assert_eq!(list.get(6), Ok('t'));
}

#[test]
fn value_lists_report_the_same_errors_on_both_paths() {
    let disabled = parse_clist_toml("[kinds]\ndisabled = [\"int\"]\n").unwrap();
    let mut specialized = CompactListFactory::default();
    let mut fallback = CompactListFactory::from_config(disabled);

    let lists = [
        specialized.new_value_list(ElementKind::Int).unwrap(),
        fallback.new_value_list(ElementKind::Int).unwrap(),
    ];
    assert_eq!(specialized.stats().generated, 1);
    assert_eq!(fallback.stats().fallbacks, 1);

    for mut list in lists {
        assert_eq!(list.add(Some(Value::Null)), Err(ListError::Null));
        assert_eq!(list.add(None), Err(ListError::Null));
        assert_eq!(
            list.add(Some(Value::Long(1))),
            Err(ListError::Type {
                expected: "Int",
                found: "Long"
            })
        );
        list.add(Some(Value::Int(-5))).unwrap();
        assert_eq!(list.size(), 1);
        assert_eq!(list.get(0), Ok(Value::Int(-5)));
        assert_eq!(list.get(1), Err(ListError::Bounds { index: 1, size: 1 }));
    }
}

#[test]
fn loaded_type_rejects_a_foreign_element_type() {
    let mut factory = CompactListFactory::default();
    let ty = factory.list_type(ElementKind::Byte).unwrap().unwrap();
    assert_eq!(ty.kind(), ElementKind::Byte);
    assert_eq!(
        ty.instantiate::<i32>().err(),
        Some(ListError::Type {
            expected: "Byte",
            found: "Int"
        })
    );
}
