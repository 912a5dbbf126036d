//! Calling convention between Rust and generated list code.
//!
//! Every generated method receives `*mut JitRuntimeCtx` as its first argument
//! and a pointer to the instance's [`ListHeader`] as its second. Methods that can
//! fail return an `i32` status; the details of a failure are recorded in the
//! context by the runtime helper that detected it.

use std::mem::offset_of;

use crate::{ListError, Value};

pub(crate) const STATUS_OK: i32 = 0;
pub(crate) const STATUS_BOUNDS: i32 = 1;
pub(crate) const STATUS_NULL: i32 = 2;
pub(crate) const STATUS_TYPE: i32 = 3;
pub(crate) const STATUS_CAPACITY: i32 = 4;

/// The two fields of a generated list type, plus the buffer length.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct ListHeader {
    pub(crate) data: *mut u8,
    pub(crate) capacity: i32,
    pub(crate) size: i32,
}

pub(crate) const DATA_OFFSET: i32 = offset_of!(ListHeader, data) as i32;
pub(crate) const CAPACITY_OFFSET: i32 = offset_of!(ListHeader, capacity) as i32;
pub(crate) const SIZE_OFFSET: i32 = offset_of!(ListHeader, size) as i32;

impl ListHeader {
    pub(crate) fn unallocated() -> Self {
        Self {
            data: std::ptr::null_mut(),
            capacity: 0,
            size: 0,
        }
    }
}

/// Per-call context threaded through generated code into the runtime helpers.
#[derive(Debug, Default)]
pub(crate) struct JitRuntimeCtx {
    error: Option<ListError>,
}

impl JitRuntimeCtx {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records `error` and returns the status generated code should propagate.
    pub(crate) fn raise(&mut self, error: ListError) -> i32 {
        let status = error.status();
        self.error = Some(error);
        status
    }

    pub(crate) fn finish(mut self, status: i32) -> Result<(), ListError> {
        if status == STATUS_OK {
            return Ok(());
        }
        Err(self.error.take().unwrap_or(ListError::Unreported(status)))
    }
}

pub(crate) type InitFn = unsafe extern "C" fn(*mut JitRuntimeCtx, *mut ListHeader) -> i32;
pub(crate) type SizeFn = unsafe extern "C" fn(*mut JitRuntimeCtx, *const ListHeader) -> i32;
pub(crate) type AddFn =
    unsafe extern "C" fn(*mut JitRuntimeCtx, *mut ListHeader, *const Value) -> i32;
pub(crate) type GetFn =
    unsafe extern "C" fn(*mut JitRuntimeCtx, *const ListHeader, i32, *mut Value) -> i32;
