// src/hexfmt.rs
use std::fmt::Write;

/// Renders identifier bytes as colon-joined uppercase hex ("04:A1:B2:C3").
/// This is the one canonical format for every display path; empty input
/// yields an empty string.
pub fn format_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_uppercase_with_colons() {
        assert_eq!(format_hex(&[0x04, 0xA1, 0xB2, 0xC3]), "04:A1:B2:C3");
    }

    #[test]
    fn single_byte_has_no_separator() {
        assert_eq!(format_hex(&[0x0F]), "0F");
    }

    #[test]
    fn empty_input_yields_empty_string() {
        assert_eq!(format_hex(&[]), "");
    }
}
