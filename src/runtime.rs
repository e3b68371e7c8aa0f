//! Built-ins called from generated code (System V, `extern "C"`).
//!
//! Printed lines go to the calling thread's capture buffer while
//! [`capture`] is running and to stdout otherwise.

use std::cell::{Cell, RefCell};
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

use crate::ir::Builtin;

/// Heap blocks are carved out of chunks of this size.
const ARENA_CHUNK: usize = 1 << 20;

/// Bytes per IR heap slot.
pub const SLOT_BYTES: usize = 4;

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
    /// Bump pointer and end of the current arena chunk.
    static ARENA: Cell<(usize, usize)> = const { Cell::new((0, 0)) };
}

fn emit(line: String) {
    CAPTURE.with(|c| match c.borrow_mut().as_mut() {
        Some(lines) => lines.push(line),
        None => println!("{}", line),
    });
}

/// Runs `f`, collecting every line the built-ins print meanwhile.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    let previous = CAPTURE.with(|c| c.replace(Some(Vec::new())));
    let result = f();
    let lines = CAPTURE.with(|c| c.replace(previous)).unwrap_or_default();
    (result, lines)
}

pub extern "C" fn print_int(value: i64) {
    emit((value as i32).to_string());
}

pub extern "C" fn print_bool(value: i64) {
    emit((value != 0).to_string());
}

/// # Safety
///
/// `s` must be null or point to a NUL-terminated string.
pub unsafe extern "C" fn print_str(s: *const c_char) {
    if s.is_null() {
        emit(String::new());
    } else {
        emit(CStr::from_ptr(s).to_string_lossy().into_owned());
    }
}

/// Zeroed pages below 2 GiB, so addresses survive 32-bit integer arithmetic.
fn map_low(len: usize) -> Option<usize> {
    // SAFETY: fresh anonymous private mapping, no existing memory is touched.
    let p = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_32BIT,
            -1,
            0,
        )
    };
    (p != libc::MAP_FAILED).then_some(p as usize)
}

fn alloc_low(bytes: usize) -> usize {
    let bytes = (bytes.max(1) + 7) & !7;
    if bytes > ARENA_CHUNK / 4 {
        return map_low(bytes).unwrap_or(0);
    }
    ARENA.with(|arena| {
        let (next, end) = arena.get();
        if next != 0 && next + bytes <= end {
            arena.set((next + bytes, end));
            return next;
        }
        match map_low(ARENA_CHUNK) {
            Some(base) => {
                arena.set((base + bytes, base + ARENA_CHUNK));
                base
            }
            None => 0,
        }
    })
}

/// Allocates `slots` zeroed 32-bit slots. Never freed. Returns 0 on failure
/// or for a negative count.
pub extern "C" fn malloc(slots: i64) -> i64 {
    match usize::try_from(slots)
        .ok()
        .and_then(|n| n.checked_mul(SLOT_BYTES))
    {
        Some(bytes) => alloc_low(bytes) as i64,
        None => 0,
    }
}

/// Absolute address generated code calls for `builtin`.
pub fn address(builtin: Builtin) -> usize {
    match builtin {
        Builtin::PrintInt => print_int as usize,
        Builtin::PrintBool => print_bool as usize,
        Builtin::PrintStr => print_str as usize,
        Builtin::Malloc => malloc as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_lines() {
        let ((), lines) = capture(|| {
            print_int(42);
            print_int(0x1_0000_0005);
            print_bool(2);
            print_bool(0);
            unsafe {
                print_str(ptr::null());
                print_str(b"hi\0".as_ptr() as *const c_char);
            }
        });
        assert_eq!(lines, vec!["42", "5", "true", "false", "", "hi"]);
    }

    #[test]
    fn test_nested_capture_restores_outer() {
        let ((), outer) = capture(|| {
            print_int(1);
            let ((), inner) = capture(|| print_int(2));
            assert_eq!(inner, vec!["2"]);
            print_int(3);
        });
        assert_eq!(outer, vec!["1", "3"]);
    }

    #[test]
    fn test_malloc_is_zeroed_and_low() {
        let a = malloc(4);
        let b = malloc(4);
        assert!(a > 0 && b > 0 && a != b);
        assert!(a < i32::MAX as i64 && b < i32::MAX as i64);
        let slots = unsafe { std::slice::from_raw_parts(a as *const i32, 4) };
        assert!(slots.iter().all(|&v| v == 0));
        assert_eq!(malloc(-1), 0);
    }
}
