//! Reference-slot implementation of [`CompactList`], used for every element
//! kind without a specialized generator.

use crate::contract::{check_range, grown_capacity, CompactList, DEFAULT_CAPACITY};
use crate::ListError;

pub struct ObjectCompactList<T> {
    /// Slots `0..size` are always `Some`.
    data: Box<[Option<T>]>,
    size: i32,
}

impl<T> ObjectCompactList<T> {
    pub fn new() -> Self {
        Self {
            data: empty_slots(DEFAULT_CAPACITY as usize),
            size: 0,
        }
    }

    fn ensure_capacity(&mut self, min_capacity: i32) -> Result<(), ListError> {
        let current = self.data.len() as i32;
        let Some(new_capacity) = grown_capacity(current, min_capacity)? else {
            return Ok(());
        };
        let mut grown =
            try_empty_slots(new_capacity as usize).ok_or(ListError::Capacity {
                current,
                requested: new_capacity,
            })?;
        for (slot, old) in grown.iter_mut().zip(self.data.iter_mut()) {
            *slot = old.take();
        }
        self.data = grown;
        Ok(())
    }
}

impl<T> Default for ObjectCompactList<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_slots<T>(len: usize) -> Box<[Option<T>]> {
    std::iter::repeat_with(|| None).take(len).collect()
}

/// Like [`empty_slots`], but reports an allocation failure instead of aborting.
fn try_empty_slots<T>(len: usize) -> Option<Box<[Option<T>]>> {
    let mut slots = Vec::new();
    slots.try_reserve_exact(len).ok()?;
    slots.resize_with(len, || None);
    Some(slots.into_boxed_slice())
}

impl<T: Clone> CompactList<T> for ObjectCompactList<T> {
    fn size(&self) -> i32 {
        self.size
    }

    fn get(&self, index: i32) -> Result<T, ListError> {
        check_range(index, self.size)?;
        self.data[index as usize].clone().ok_or(ListError::Bounds {
            index,
            size: self.size,
        })
    }

    fn add(&mut self, element: Option<T>) -> Result<(), ListError> {
        let element = element.ok_or(ListError::Null)?;
        self.ensure_capacity(self.size.wrapping_add(1))?;
        self.data[self.size as usize] = Some(element);
        self.size += 1;
        Ok(())
    }

    fn capacity(&self) -> i32 {
        self.data.len() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_list_is_empty_with_default_capacity() {
        let list = ObjectCompactList::<String>::new();
        assert_eq!(list.size(), 0);
        assert_eq!(list.capacity(), DEFAULT_CAPACITY);
        assert!(list.is_empty());
    }

    #[test]
    fn eleventh_add_doubles_capacity() {
        let mut list = ObjectCompactList::new();
        for i in 0..11 {
            list.push(format!("item{i}")).unwrap();
        }
        assert_eq!(list.size(), 11);
        assert_eq!(list.capacity(), 20);
        assert_eq!(list.get(10).unwrap(), "item10");
        assert_eq!(list.get(0).unwrap(), "item0");
    }

    #[test]
    fn null_is_rejected_without_changing_size() {
        let mut list = ObjectCompactList::<i64>::new();
        list.push(7).unwrap();
        assert_eq!(list.add(None), Err(ListError::Null));
        assert_eq!(list.size(), 1);
    }

    #[test]
    fn growth_does_not_require_clone() {
        struct Opaque(u8);
        let mut list = ObjectCompactList::<Opaque>::new();
        list.ensure_capacity(11).unwrap();
        assert_eq!(list.data.len(), 20);
        list.data[0] = Some(Opaque(3));
        list.ensure_capacity(41).unwrap();
        assert_eq!(list.data.len(), 41);
        assert!(matches!(list.data[0], Some(Opaque(3))));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn unallocatable_growth_is_a_capacity_error() {
        type Huge = [u8; 1 << 33];
        let mut list = ObjectCompactList::<Huge> {
            data: Vec::new().into_boxed_slice(),
            size: 0,
        };
        assert_eq!(
            list.ensure_capacity(1 << 30),
            Err(ListError::Capacity {
                current: 0,
                requested: 1 << 30
            })
        );
        assert!(list.data.is_empty());
    }

    #[test]
    fn out_of_range_reads_fail() {
        let list = ObjectCompactList::<i64>::new();
        assert_eq!(list.get(0), Err(ListError::Bounds { index: 0, size: 0 }));
        assert_eq!(list.get(-1), Err(ListError::Bounds { index: -1, size: 0 }));
    }
}
