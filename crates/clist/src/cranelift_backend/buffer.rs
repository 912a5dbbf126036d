//! Packed scalar buffers owned by generated list instances.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use crate::kinds::ElementLayout;
use crate::ListError;

fn array_layout(len: i32, element: ElementLayout) -> Option<Layout> {
    let len = usize::try_from(len).ok().filter(|len| *len > 0)?;
    let bytes = len.checked_mul(element.size as usize)?;
    Layout::from_size_align(bytes, element.align as usize).ok()
}

/// Allocates a zeroed buffer of `len` elements.
pub(crate) fn allocate(len: i32, element: ElementLayout) -> Result<NonNull<u8>, ListError> {
    let failure = ListError::Capacity {
        current: 0,
        requested: len,
    };
    let layout = array_layout(len, element).ok_or(failure.clone())?;
    // SAFETY: `array_layout` never produces a zero-sized layout.
    let data = unsafe { alloc::alloc_zeroed(layout) };
    NonNull::new(data).ok_or(failure)
}

/// Moves the first `old_len` elements of `data` into a new buffer of `new_len`
/// elements and releases `data`. On failure `data` is left untouched.
///
/// # Safety
/// `data` must come from [`allocate`] or [`grow`] with the same `element` layout
/// and a length of `old_len`, and `old_len <= new_len`.
pub(crate) unsafe fn grow(
    data: *mut u8,
    old_len: i32,
    new_len: i32,
    element: ElementLayout,
) -> Result<NonNull<u8>, ListError> {
    let grown = allocate(new_len, element).map_err(|_| ListError::Capacity {
        current: old_len,
        requested: new_len,
    })?;
    let old_bytes = old_len.max(0) as usize * element.size as usize;
    // SAFETY: both buffers hold at least `old_bytes` and are distinct allocations.
    unsafe {
        ptr::copy_nonoverlapping(data, grown.as_ptr(), old_bytes);
        release(data, old_len, element);
    }
    Ok(grown)
}

/// # Safety
/// Same contract as [`grow`]; `data` must not be used afterwards.
pub(crate) unsafe fn release(data: *mut u8, len: i32, element: ElementLayout) {
    if data.is_null() {
        return;
    }
    if let Some(layout) = array_layout(len, element) {
        // SAFETY: the buffer was allocated with this exact layout.
        unsafe { alloc::dealloc(data, layout) };
    }
}
