//! Utility macros and functions for the environ crate.
//!
//! This module provides helper macros and functions that are used internally
//! by the tokenizer and the request builder.

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
///
/// # Example
///
/// ```ignore
/// ensure!(method_len < MAX_METHOD_LEN, ParseError::InvalidMethod);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Decodes `%XX` escapes of a request path into a new buffer.
///
/// Returns `None` when an escape is truncated or is not followed by two hex digits.
/// A `+` is kept as-is, paths have no form encoding.
pub(crate) fn unquote_path(raw: &[u8]) -> Option<Vec<u8>> {
    let mut decoded = Vec::with_capacity(raw.len());
    let mut index = 0;

    while index < raw.len() {
        match raw[index] {
            b'%' => {
                let hi = hex_value(*raw.get(index + 1)?)?;
                let lo = hex_value(*raw.get(index + 2)?)?;
                decoded.push((hi << 4) | lo);
                index += 3;
            }
            b => {
                decoded.push(b);
                index += 1;
            }
        }
    }

    Some(decoded)
}

#[inline]
fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
