//! A minimal UTF-8 encoder.
//!
//! The lexer works on raw bytes and never decodes source text. The only place
//! UTF-8 gets produced is the `\u` and `\U` escapes inside string literals,
//! which need to turn an arbitrary code point into bytes. [`char`] can't be used
//! for that because escapes are allowed to name surrogates.

/// The largest code point that can be encoded.
pub const MAX_CODE_POINT: u32 = 0x10ffff;

/// Number of bytes needed to encode `code_point`, or `0` if it is above
/// [`MAX_CODE_POINT`] and can't be encoded at all.
pub const fn encoded_len(code_point: u32) -> usize {
    if code_point <= 0x7f {
        1
    } else if code_point <= 0x7ff {
        2
    } else if code_point <= 0xffff {
        3
    } else if code_point <= MAX_CODE_POINT {
        4
    } else {
        0
    }
}

/// Encode `code_point` into the front of `out`, returning the number of bytes
/// written.
///
/// # Panics
///
/// Panics if `code_point` is above [`MAX_CODE_POINT`], or if `out` is shorter
/// than [`encoded_len`] of it. Check with [`encoded_len`] first.
pub fn encode(code_point: u32, out: &mut [u8]) -> usize {
    let len = encoded_len(code_point);
    assert!(len != 0, "code point {:#x} is out of range", code_point);
    assert!(
        out.len() >= len,
        "{} bytes are needed to encode {:#x}",
        len,
        code_point
    );

    match len {
        1 => {
            out[0] = code_point as u8;
        }
        // 110xxxxx 10xxxxxx
        2 => {
            out[0] = 0xc0 | (code_point >> 6) as u8;
            out[1] = continuation(code_point);
        }
        // 1110xxxx 10xxxxxx 10xxxxxx
        3 => {
            out[0] = 0xe0 | (code_point >> 12) as u8;
            out[1] = continuation(code_point >> 6);
            out[2] = continuation(code_point);
        }
        // 11110xxx 10xxxxxx 10xxxxxx 10xxxxxx
        _ => {
            out[0] = 0xf0 | (code_point >> 18) as u8;
            out[1] = continuation(code_point >> 12);
            out[2] = continuation(code_point >> 6);
            out[3] = continuation(code_point);
        }
    }

    len
}

/// A continuation byte carrying the low 6 bits of `bits`.
#[inline]
const fn continuation(bits: u32) -> u8 {
    0x80 | (bits & 0x3f) as u8
}
