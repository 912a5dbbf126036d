//! `extern "C"` runtime helpers callable from generated list code.
//!
//! Every helper receives `*mut JitRuntimeCtx` as its first argument. Helpers
//! never panic: failures are recorded in the context and reported back as a
//! status code (or a null buffer pointer for the allocation helpers).

use crate::kinds::ElementLayout;
use crate::{ListError, Value};

use super::abi::{JitRuntimeCtx, STATUS_OK};
use super::buffer;

pub(crate) const RT_ARRAY_NEW: &str = "rt_array_new";
pub(crate) const RT_ARRAY_GROW: &str = "rt_array_grow";
pub(crate) const RT_RAISE_BOUNDS: &str = "rt_raise_bounds";
pub(crate) const RT_RAISE_CAPACITY: &str = "rt_raise_capacity";

fn element_layout(size: i32, align: i32) -> ElementLayout {
    ElementLayout {
        size: size as u32,
        align: align as u32,
    }
}

// ---------------------------------------------------------------------------
// Buffer helpers
// ---------------------------------------------------------------------------

/// Allocate a zeroed buffer of `len` elements. Returns null on failure.
pub(crate) extern "C" fn rt_array_new(
    ctx: *mut JitRuntimeCtx,
    len: i32,
    elem_size: i32,
    elem_align: i32,
) -> *mut u8 {
    // SAFETY: generated code passes the live context of the current call.
    let ctx = unsafe { &mut *ctx };
    match buffer::allocate(len, element_layout(elem_size, elem_align)) {
        Ok(data) => data.as_ptr(),
        Err(err) => {
            ctx.raise(err);
            std::ptr::null_mut()
        }
    }
}

/// Copy `data` into a buffer of `new_len` elements and release it.
/// Returns null (leaving `data` intact) on failure. Only called by generated
/// `ensure_capacity` with the list's current buffer of `old_len` elements.
pub(crate) extern "C" fn rt_array_grow(
    ctx: *mut JitRuntimeCtx,
    data: *mut u8,
    old_len: i32,
    new_len: i32,
    elem_size: i32,
    elem_align: i32,
) -> *mut u8 {
    // SAFETY: generated code passes the live context of the current call.
    let ctx = unsafe { &mut *ctx };
    let layout = element_layout(elem_size, elem_align);
    // SAFETY: `data` is the header's buffer, allocated with `old_len` elements
    // of this layout by `rt_array_new` or a previous grow.
    match unsafe { buffer::grow(data, old_len, new_len, layout) } {
        Ok(grown) => grown.as_ptr(),
        Err(err) => {
            ctx.raise(err);
            std::ptr::null_mut()
        }
    }
}

// ---------------------------------------------------------------------------
// Error helpers
// ---------------------------------------------------------------------------

pub(crate) extern "C" fn rt_raise_bounds(ctx: *mut JitRuntimeCtx, index: i32, size: i32) -> i32 {
    // SAFETY: generated code passes the live context of the current call.
    let ctx = unsafe { &mut *ctx };
    ctx.raise(ListError::Bounds { index, size })
}

pub(crate) extern "C" fn rt_raise_capacity(
    ctx: *mut JitRuntimeCtx,
    current: i32,
    requested: i32,
) -> i32 {
    // SAFETY: generated code passes the live context of the current call.
    let ctx = unsafe { &mut *ctx };
    ctx.raise(ListError::Capacity { current, requested })
}

// ---------------------------------------------------------------------------
// Boxing / unboxing helpers
// ---------------------------------------------------------------------------

/// Defines `rt_unbox_<kind>`, which writes the scalar held by a `Value` into
/// `out` as the kind's in-flight type, and `rt_box_<kind>`, which wraps an
/// in-flight scalar back into a `Value` at `out`.
macro_rules! boxing_helpers {
    ($unbox:ident, $rebox:ident, $variant:ident, $stack:ty, |$v:ident| $widen:expr, |$s:ident| $narrow:expr) => {
        pub(crate) extern "C" fn $unbox(
            ctx: *mut JitRuntimeCtx,
            element: *const Value,
            out: *mut u8,
        ) -> i32 {
            // SAFETY: `ctx` is the live context of the current call and
            // `element` points at the caller's `Value` for the duration of `add`.
            let ctx = unsafe { &mut *ctx };
            match unsafe { &*element } {
                Value::$variant($v) => {
                    let scalar: $stack = $widen;
                    // SAFETY: `out` is the 8-byte stack slot reserved by generated `add`.
                    unsafe { out.cast::<$stack>().write_unaligned(scalar) };
                    STATUS_OK
                }
                Value::Null => ctx.raise(ListError::Null),
                other => ctx.raise(ListError::Type {
                    expected: stringify!($variant),
                    found: other.type_name(),
                }),
            }
        }

        pub(crate) extern "C" fn $rebox(_ctx: *mut JitRuntimeCtx, $s: $stack, out: *mut Value) {
            // SAFETY: `out` is the caller's uninitialized result slot of `get`.
            unsafe { out.write(Value::$variant($narrow)) };
        }
    };
}

boxing_helpers!(rt_unbox_bool, rt_box_bool, Bool, i32, |v| i32::from(*v), |s| s != 0);
boxing_helpers!(rt_unbox_byte, rt_box_byte, Byte, i32, |v| i32::from(*v), |s| s as i8);
boxing_helpers!(rt_unbox_short, rt_box_short, Short, i32, |v| i32::from(*v), |s| s as i16);
boxing_helpers!(
    rt_unbox_char,
    rt_box_char,
    Char,
    i32,
    |v| u32::from(*v) as i32,
    |s| char::from_u32(s as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
);
boxing_helpers!(rt_unbox_int, rt_box_int, Int, i32, |v| *v, |s| s);
boxing_helpers!(rt_unbox_long, rt_box_long, Long, i64, |v| *v, |s| s);
boxing_helpers!(rt_unbox_float, rt_box_float, Float, f32, |v| *v, |s| s);
boxing_helpers!(rt_unbox_double, rt_box_double, Double, f64, |v| *v, |s| s);

/// Symbol table registered with every JIT builder.
pub(crate) fn runtime_helper_symbols() -> Vec<(&'static str, *const u8)> {
    vec![
        (RT_ARRAY_NEW, rt_array_new as *const u8),
        (RT_ARRAY_GROW, rt_array_grow as *const u8),
        (RT_RAISE_BOUNDS, rt_raise_bounds as *const u8),
        (RT_RAISE_CAPACITY, rt_raise_capacity as *const u8),
        ("rt_unbox_bool", rt_unbox_bool as *const u8),
        ("rt_box_bool", rt_box_bool as *const u8),
        ("rt_unbox_byte", rt_unbox_byte as *const u8),
        ("rt_box_byte", rt_box_byte as *const u8),
        ("rt_unbox_short", rt_unbox_short as *const u8),
        ("rt_box_short", rt_box_short as *const u8),
        ("rt_unbox_char", rt_unbox_char as *const u8),
        ("rt_box_char", rt_box_char as *const u8),
        ("rt_unbox_int", rt_unbox_int as *const u8),
        ("rt_box_int", rt_box_int as *const u8),
        ("rt_unbox_long", rt_unbox_long as *const u8),
        ("rt_box_long", rt_box_long as *const u8),
        ("rt_unbox_float", rt_unbox_float as *const u8),
        ("rt_box_float", rt_box_float as *const u8),
        ("rt_unbox_double", rt_unbox_double as *const u8),
        ("rt_box_double", rt_box_double as *const u8),
    ]
}

pub(crate) fn is_runtime_helper(name: &str) -> bool {
    runtime_helper_symbols()
        .iter()
        .any(|(symbol, _)| *symbol == name)
}
