//! Utility functions for text decoding, path comparison and number grouping.

use crate::error::{ExplorerError, Result};
use encoding_rs::{UTF_16LE, UTF_8};

/// Reads a UTF-16LE string from a byte slice, trimming null terminators.
///
/// Registry strings are typically null-terminated. This function decodes
/// UTF-16LE data and removes trailing null characters.
///
/// # Errors
///
/// Returns an error if the data length is not even (UTF-16 requires 2-byte units)
/// or if the UTF-16 decoding fails.
pub fn read_utf16_string(data: &[u8]) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }

    // UTF-16 requires even number of bytes
    if data.len() % 2 != 0 {
        return Err(ExplorerError::InvalidUtf16);
    }

    let (decoded, _encoding, had_errors) = UTF_16LE.decode(data);

    if had_errors {
        return Err(ExplorerError::InvalidUtf16);
    }

    // Trim null terminators (common in registry strings)
    Ok(decoded.trim_end_matches('\0').to_string())
}

/// Decodes bytes as UTF-8 without replacement characters.
///
/// Returns `None` for malformed input.
pub fn decode_utf8(data: &[u8]) -> Option<String> {
    UTF_8
        .decode_without_bom_handling_and_without_replacement(data)
        .map(|text| text.into_owned())
}

/// Decodes bytes as UTF-16LE without replacement characters.
///
/// Returns `None` for an odd byte count, unpaired surrogates and the like.
pub fn decode_utf16le(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    UTF_16LE
        .decode_without_bom_handling_and_without_replacement(data)
        .map(|text| text.into_owned())
}

/// Number of UTF-16 code units in `s`, which is how the registry measures string length.
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Formats `n` with `,` thousands separators (`1234567` -> `"1,234,567"`).
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Strips `prefix` from `s`, comparing characters case-insensitively.
///
/// Returns the remainder of `s` on success.
pub fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = s.char_indices();
    for p in prefix.chars() {
        let (_, c) = rest.next()?;
        if c != p && !c.to_lowercase().eq(p.to_lowercase()) {
            return None;
        }
    }
    match rest.next() {
        Some((idx, _)) => Some(&s[idx..]),
        None => Some(""),
    }
}

/// Case-insensitive equality under the same rules as [`strip_prefix_ignore_case`].
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    strip_prefix_ignore_case(a, b).map_or(false, str::is_empty)
}

/// Returns the last `separator`-delimited segment of `path`.
pub fn last_segment(path: &str, separator: char) -> &str {
    path.rsplit(separator).next().unwrap_or(path)
}
