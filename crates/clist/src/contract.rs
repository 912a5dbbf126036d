//! The list capability and the growth/bounds policy every implementation shares.

use crate::ListError;

/// Capacity of a freshly constructed list.
pub const DEFAULT_CAPACITY: i32 = 10;

/// An ordered collection with limited capabilities: append, indexed read and size.
///
/// `None` passed to [`CompactList::add`] plays the role of a null element and is
/// always rejected.
pub trait CompactList<T> {
    /// Number of elements in the list.
    fn size(&self) -> i32;

    /// Element at `index`, failing with [`ListError::Bounds`] outside `0..size`.
    fn get(&self, index: i32) -> Result<T, ListError>;

    /// Appends `element`, failing with [`ListError::Null`] when it is absent.
    fn add(&mut self, element: Option<T>) -> Result<(), ListError>;

    /// Length of the current buffer. Never smaller than `size` and never decreases.
    fn capacity(&self) -> i32;

    fn push(&mut self, element: T) -> Result<(), ListError> {
        self.add(Some(element))
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

pub(crate) fn check_range(index: i32, size: i32) -> Result<(), ListError> {
    if index < 0 || index >= size {
        return Err(ListError::Bounds { index, size });
    }
    Ok(())
}

/// Capacity a buffer of length `current` must grow to so that it holds
/// `min_capacity` elements, or `None` when it already does.
///
/// Doubling saturates at `i32::MAX`. A non-positive `min_capacity` means the
/// caller's `size + 1` overflowed and is reported as [`ListError::Capacity`].
pub fn grown_capacity(current: i32, min_capacity: i32) -> Result<Option<i32>, ListError> {
    if min_capacity <= 0 {
        return Err(ListError::Capacity {
            current,
            requested: min_capacity,
        });
    }
    if current >= min_capacity {
        return Ok(None);
    }
    let doubled = current.checked_mul(2).unwrap_or(i32::MAX);
    Ok(Some(doubled.max(min_capacity)))
}
