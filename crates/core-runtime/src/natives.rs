//! Native implementations of the runtime-callable functions.
//!
//! Everything here is `extern "C"` and AAPCS-shaped: integer/pointer values
//! travel as `i64`, floats as `f64`. A string value is a pointer to a 64-bit
//! length word followed by that many 32-bit character cells. A vector value
//! points at its first element; the element count lives in the word
//! immediately below the base pointer.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Read a runtime string into an owned Rust `String`.
///
/// # Safety
/// `ptr` must point at a valid length-prefixed string allocation.
pub unsafe fn read_string(ptr: i64) -> String {
    if ptr == 0 {
        return String::new();
    }
    unsafe {
        let len = *(ptr as *const i64);
        let cells = (ptr + 8) as *const u32;
        (0..len)
            .map(|i| char::from_u32(*cells.add(i as usize)).unwrap_or('\u{FFFD}'))
            .collect()
    }
}

/// Allocate a runtime string from a Rust `&str`. The caller owns the
/// allocation (released through `FREEVEC`).
pub fn alloc_string(s: &str) -> i64 {
    let chars: Vec<u32> = s.chars().map(|c| c as u32).collect();
    // Length word plus cells, padded to 16 so heap strings share the rodata
    // image shape; allocated through GETVEC so FREEVEC releases them.
    let bytes = (8 + chars.len() * 4 + 15) & !15;
    let p = bcpl_getvec((bytes / 8) as i64);
    if p == 0 {
        return 0;
    }
    unsafe {
        *(p as *mut i64) = chars.len() as i64;
        let cells = (p + 8) as *mut u32;
        for (i, c) in chars.iter().enumerate() {
            *cells.add(i) = *c;
        }
    }
    p
}

fn flush() {
    let _ = std::io::stdout().flush();
}

// --- Core I/O ------------------------------------------------------------

pub extern "C" fn bcpl_writes(string_ptr: i64) {
    let s = unsafe { read_string(string_ptr) };
    print!("{s}");
    flush();
}

pub extern "C" fn bcpl_writen(value: i64) {
    print!("{value}");
    flush();
}

pub extern "C" fn bcpl_fwrite(value: f64) {
    print!("{value}");
    flush();
}

pub extern "C" fn bcpl_writec(char_value: i64) {
    if let Some(c) = char::from_u32(char_value as u32) {
        print!("{c}");
        flush();
    }
}

pub extern "C" fn bcpl_newline() {
    println!();
    flush();
}

/// `WRITEF` with the BCPL directive set: `%N` decimal, `%S` string, `%C`
/// character, `%F` float bits, `%%` literal percent. Extra arguments arrive
/// in x1..x7; only those the format names are read.
pub extern "C" fn bcpl_writef(
    format_ptr: i64,
    a1: i64,
    a2: i64,
    a3: i64,
    a4: i64,
    a5: i64,
    a6: i64,
    a7: i64,
) {
    let format = unsafe { read_string(format_ptr) };
    let args = [a1, a2, a3, a4, a5, a6, a7];
    let mut next = 0usize;
    let mut take = || {
        let v = args.get(next).copied().unwrap_or(0);
        next += 1;
        v
    };
    let mut chars = format.chars().peekable();
    let mut out = String::new();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('N' | 'n' | 'D' | 'd') => out.push_str(&take().to_string()),
            Some('S' | 's') => out.push_str(&unsafe { read_string(take()) }),
            Some('C' | 'c') => {
                if let Some(ch) = char::from_u32(take() as u32) {
                    out.push(ch);
                }
            }
            Some('F' | 'f') => out.push_str(&f64::from_bits(take() as u64).to_string()),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    print!("{out}");
    flush();
}

pub extern "C" fn bcpl_rdch() -> i64 {
    use std::io::Read;
    let mut buf = [0u8; 1];
    match std::io::stdin().read_exact(&mut buf) {
        Ok(()) => buf[0] as i64,
        Err(_) => -1, // ENDSTREAMCH
    }
}

// --- Memory management ---------------------------------------------------

/// Allocate `count` 8-byte cells. The count is stored in the word below the
/// returned base pointer, zero-filled payload.
pub extern "C" fn bcpl_getvec(count: i64) -> i64 {
    if count < 0 {
        return 0;
    }
    let bytes = (count as usize + 1) * 8;
    unsafe {
        let p = libc::malloc(bytes) as *mut i64;
        if p.is_null() {
            return 0;
        }
        std::ptr::write_bytes(p as *mut u8, 0, bytes);
        *p = count;
        p.add(1) as i64
    }
}

pub extern "C" fn bcpl_fgetvec(count: i64) -> i64 {
    bcpl_getvec(count)
}

/// General allocation used by `NEW`: `size_bytes` rounded up to 8.
pub extern "C" fn bcpl_alloc(size_bytes: i64) -> i64 {
    let words = (size_bytes.max(0) + 7) / 8;
    bcpl_getvec(words)
}

pub extern "C" fn bcpl_freevec(ptr: i64) {
    if ptr == 0 {
        return;
    }
    unsafe { libc::free((ptr - 8) as *mut libc::c_void) }
}

// --- String/list operations ----------------------------------------------

/// Cons cell layout: [tag][head][tail], 8 bytes each.
const LIST_CELL_WORDS: i64 = 3;

pub extern "C" fn bcpl_split(string_ptr: i64, delimiter_ptr: i64) -> i64 {
    let s = unsafe { read_string(string_ptr) };
    let delim = unsafe { read_string(delimiter_ptr) };
    let parts: Vec<&str> = if delim.is_empty() {
        s.split_whitespace().collect()
    } else {
        s.split(delim.as_str()).collect()
    };
    let mut tail = 0i64;
    for part in parts.iter().rev() {
        let cell = bcpl_getvec(LIST_CELL_WORDS);
        if cell == 0 {
            return 0;
        }
        unsafe {
            let p = cell as *mut i64;
            *p = 2; // string tag
            *p.add(1) = alloc_string(part);
            *p.add(2) = tail;
        }
        tail = cell;
    }
    tail
}

pub extern "C" fn bcpl_join(list_ptr: i64, delimiter_ptr: i64) -> i64 {
    let delim = unsafe { read_string(delimiter_ptr) };
    let mut parts = Vec::new();
    let mut cell = list_ptr;
    while cell != 0 {
        unsafe {
            let p = cell as *const i64;
            parts.push(read_string(*p.add(1)));
            cell = *p.add(2);
        }
    }
    alloc_string(&parts.join(&delim))
}

// --- Math ----------------------------------------------------------------

static RAND_STATE: AtomicU64 = AtomicU64::new(0x9E37_79B9_7F4A_7C15);

fn next_rand() -> u64 {
    // xorshift*; good enough for the runtime's RAND contract.
    let mut x = RAND_STATE.load(Ordering::Relaxed);
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    RAND_STATE.store(x, Ordering::Relaxed);
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

pub extern "C" fn bcpl_rand(max_val: i64) -> i64 {
    if max_val <= 0 {
        return 0;
    }
    (next_rand() % (max_val as u64)) as i64
}

pub extern "C" fn bcpl_rnd(max_val: i64) -> f64 {
    (next_rand() as f64 / u64::MAX as f64) * max_val as f64
}

pub extern "C" fn bcpl_frnd() -> f64 {
    next_rand() as f64 / u64::MAX as f64
}

pub extern "C" fn bcpl_fsin(v: f64) -> f64 {
    v.sin()
}

pub extern "C" fn bcpl_fcos(v: f64) -> f64 {
    v.cos()
}

pub extern "C" fn bcpl_ftan(v: f64) -> f64 {
    v.tan()
}

pub extern "C" fn bcpl_fabs(v: f64) -> f64 {
    v.abs()
}

pub extern "C" fn bcpl_flog(v: f64) -> f64 {
    v.ln()
}

pub extern "C" fn bcpl_fexp(v: f64) -> f64 {
    v.exp()
}

pub extern "C" fn bcpl_fix(v: f64) -> i64 {
    v as i64
}

// --- File I/O ------------------------------------------------------------

pub extern "C" fn bcpl_file_open_read(filename_ptr: i64) -> i64 {
    open_with(filename_ptr, "r")
}

pub extern "C" fn bcpl_file_open_write(filename_ptr: i64) -> i64 {
    open_with(filename_ptr, "w")
}

pub extern "C" fn bcpl_file_open_append(filename_ptr: i64) -> i64 {
    open_with(filename_ptr, "a")
}

fn open_with(filename_ptr: i64, mode: &str) -> i64 {
    let name = unsafe { read_string(filename_ptr) };
    let Ok(cname) = std::ffi::CString::new(name) else {
        return 0;
    };
    let Ok(cmode) = std::ffi::CString::new(mode) else {
        return 0;
    };
    unsafe { libc::fopen(cname.as_ptr(), cmode.as_ptr()) as i64 }
}

pub extern "C" fn bcpl_file_close(handle: i64) -> i64 {
    if handle == 0 {
        return -1;
    }
    unsafe { libc::fclose(handle as *mut libc::FILE) as i64 }
}

pub extern "C" fn bcpl_file_writes(handle: i64, string_ptr: i64) -> i64 {
    if handle == 0 {
        return -1;
    }
    let s = unsafe { read_string(string_ptr) };
    let bytes = s.as_bytes();
    let written = unsafe {
        libc::fwrite(
            bytes.as_ptr() as *const libc::c_void,
            1,
            bytes.len(),
            handle as *mut libc::FILE,
        )
    };
    written as i64
}

pub extern "C" fn bcpl_file_reads(handle: i64) -> i64 {
    if handle == 0 {
        return 0;
    }
    let mut out = String::new();
    unsafe {
        loop {
            let c = libc::fgetc(handle as *mut libc::FILE);
            if c == libc::EOF {
                break;
            }
            out.push(c as u8 as char);
        }
    }
    alloc_string(&out)
}

// --- System --------------------------------------------------------------

pub extern "C" fn bcpl_finish() {
    flush();
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip_through_runtime_layout() {
        let p = alloc_string("hello");
        assert_ne!(p, 0);
        unsafe {
            assert_eq!(*(p as *const i64), 5);
            assert_eq!(read_string(p), "hello");
        }
        bcpl_freevec(p);
    }

    #[test]
    fn getvec_stores_length_below_base() {
        let v = bcpl_getvec(8);
        assert_ne!(v, 0);
        unsafe {
            assert_eq!(*((v - 8) as *const i64), 8);
            // Payload is zeroed.
            for i in 0..8 {
                assert_eq!(*((v + i * 8) as *const i64), 0);
            }
        }
        bcpl_freevec(v);
    }

    #[test]
    fn split_then_join_restores_content() {
        let s = alloc_string("a,b,c");
        let d = alloc_string(",");
        let list = bcpl_split(s, d);
        let joined = bcpl_join(list, d);
        assert_eq!(unsafe { read_string(joined) }, "a,b,c");
    }

    #[test]
    fn rand_respects_bound() {
        for _ in 0..100 {
            let v = bcpl_rand(10);
            assert!((0..10).contains(&v));
        }
    }
}
