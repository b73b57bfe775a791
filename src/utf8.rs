//! UTF-8 validation utilities.

/// Validate and convert bytes to UTF-8 string.
///
/// Uses simdutf8 for fast validation when available.
#[inline]
pub fn from_utf8(bytes: &[u8]) -> Option<&str> {
    #[cfg(not(miri))]
    {
        // Use simdutf8 for fast validation
        simdutf8::basic::from_utf8(bytes).ok()
    }

    #[cfg(miri)]
    {
        // Fall back to std validation under miri
        core::str::from_utf8(bytes).ok()
    }
}

/// Decode a Latin-1 (ISO 8859-1) byte string as used by BCPL names and
/// comments into an owned UTF-8 `String`. Every byte value maps to exactly
/// one Unicode scalar, so this never fails.
#[cfg(feature = "alloc")]
pub fn latin1_to_string(bytes: &[u8]) -> alloc::string::String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode `s` back to Latin-1 bytes for storage in a BCPL field, dropping
/// characters above U+00FF and truncating to `max_len` bytes.
#[cfg(feature = "alloc")]
pub fn string_to_latin1_truncated(s: &str, max_len: usize) -> alloc::vec::Vec<u8> {
    let mut out = alloc::vec::Vec::with_capacity(s.len().min(max_len));
    for c in s.chars() {
        if out.len() >= max_len {
            break;
        }
        if (c as u32) <= 0xFF {
            out.push(c as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_utf8() {
        assert_eq!(from_utf8(b"hello"), Some("hello"));
    }

    #[test]
    fn test_invalid_utf8() {
        // Invalid UTF-8 sequence
        assert_eq!(from_utf8(&[0xFF, 0xFE]), None);
    }

    #[test]
    fn test_utf8_multibyte() {
        assert_eq!(from_utf8("café".as_bytes()), Some("café"));
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_latin1_roundtrip_ascii() {
        let bytes = string_to_latin1_truncated("hello", 30);
        assert_eq!(latin1_to_string(&bytes), "hello");
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_latin1_truncates() {
        let bytes = string_to_latin1_truncated("a very long name indeed", 4);
        assert_eq!(bytes.len(), 4);
        assert_eq!(latin1_to_string(&bytes), "a ve");
    }
}
