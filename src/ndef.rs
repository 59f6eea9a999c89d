// src/ndef.rs
use std::str;

use thiserror::Error;

// Header flag bits: MB, ME, CF, SR, IL, then the 3-bit TNF.
const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

const TNF_EMPTY: u8 = 0x00;
const TNF_WELL_KNOWN: u8 = 0x01;
const TNF_EXTERNAL: u8 = 0x04;

/// External type emitted for opaque payloads we cannot classify.
const EXTERNAL_TYPE: &[u8] = b"tagscan:raw";

/// The text-record status byte stores the language-code length in 6 bits.
const MAX_LANGUAGE_LEN: usize = 0x3F;

/// URI prefix codes from the NFC Forum RTD-URI specification. The payload's
/// first byte indexes this table; the rest of the payload is the suffix.
pub const URI_PREFIXES: &[&str] = &[
    "",                           // 0x00 - no prefix
    "http://www.",                // 0x01
    "https://www.",               // 0x02
    "http://",                    // 0x03
    "https://",                   // 0x04
    "tel:",                       // 0x05
    "mailto:",                    // 0x06
    "ftp://anonymous:anonymous@", // 0x07
    "ftp://ftp.",                 // 0x08
    "ftps://",                    // 0x09
    "sftp://",                    // 0x0A
    "smb://",                     // 0x0B
    "nfs://",                     // 0x0C
    "ftp://",                     // 0x0D
    "dav://",                     // 0x0E
    "news:",                      // 0x0F
    "telnet://",                  // 0x10
    "imap:",                      // 0x11
    "rtsp://",                    // 0x12
    "urn:",                       // 0x13
    "pop:",                       // 0x14
    "sip:",                       // 0x15
    "sips:",                      // 0x16
    "tftp:",                      // 0x17
    "btspp://",                   // 0x18
    "btl2cap://",                 // 0x19
    "btgoep://",                  // 0x1A
    "tcpobex://",                 // 0x1B
    "irdaobex://",                // 0x1C
    "file://",                    // 0x1D
    "urn:epc:id:",                // 0x1E
    "urn:epc:tag:",               // 0x1F
    "urn:epc:pat:",               // 0x20
    "urn:epc:raw:",               // 0x21
    "urn:epc:",                   // 0x22
    "urn:nfc:",                   // 0x23
];

/// A single decoded NDEF record. A `Text` language code longer than 63 bytes
/// is not representable on the wire and gets cut at that bound on encode;
/// IANA codes stay well under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdefRecord {
    Text { content: String, language: String },
    Uri(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed NDEF record: {0}")]
    Malformed(&'static str),
}

/// Decodes a raw NDEF message into its records, in wire order. Strict mode:
/// any malformed record aborts the whole message.
pub fn decode(raw: &[u8]) -> Result<Vec<NdefRecord>, DecodeError> {
    let mut records = Vec::new();
    let mut cursor = Cursor::new(raw);

    while !cursor.done() {
        let header = cursor.u8("record header")?;
        let tnf = header & TNF_MASK;
        let short_record = header & FLAG_SR != 0;
        let has_id = header & FLAG_IL != 0;
        let message_end = header & FLAG_ME != 0;

        let type_len = cursor.u8("type length")? as usize;
        let payload_len = if short_record {
            cursor.u8("payload length")? as usize
        } else {
            cursor.u32_be("payload length")? as usize
        };
        let id_len = if has_id {
            cursor.u8("id length")? as usize
        } else {
            0
        };

        let record_type = cursor.take(type_len, "record type")?.to_vec();
        let _id = cursor.take(id_len, "record id")?;
        let payload = cursor.take(payload_len, "record payload")?;

        // A zero-length empty record is the wire form of "no records".
        if tnf == TNF_EMPTY && type_len == 0 && payload_len == 0 {
            if message_end {
                break;
            }
            continue;
        }

        let record = if tnf == TNF_WELL_KNOWN && record_type == b"T" {
            decode_text_payload(payload)?
        } else if tnf == TNF_WELL_KNOWN && record_type == b"U" {
            decode_uri_payload(payload)?
        } else {
            NdefRecord::Binary(payload.to_vec())
        };
        records.push(record);

        if message_end {
            break;
        }
    }

    Ok(records)
}

/// Text payload: status byte (low 6 bits = language code length), language
/// code, then UTF-8 content.
fn decode_text_payload(payload: &[u8]) -> Result<NdefRecord, DecodeError> {
    let status = *payload
        .first()
        .ok_or(DecodeError::Malformed("empty text payload"))?;
    let lang_len = (status & 0x3F) as usize;

    if 1 + lang_len > payload.len() {
        return Err(DecodeError::Malformed(
            "language code length exceeds payload",
        ));
    }

    let language = str::from_utf8(&payload[1..1 + lang_len])
        .map_err(|_| DecodeError::Malformed("language code is not UTF-8"))?
        .to_string();
    let content = str::from_utf8(&payload[1 + lang_len..])
        .map_err(|_| DecodeError::Malformed("text content is not UTF-8"))?
        .to_string();

    Ok(NdefRecord::Text { content, language })
}

/// URI payload: prefix code byte, then the suffix appended to the resolved
/// prefix.
fn decode_uri_payload(payload: &[u8]) -> Result<NdefRecord, DecodeError> {
    let code = *payload
        .first()
        .ok_or(DecodeError::Malformed("empty URI payload"))?;
    let prefix = URI_PREFIXES
        .get(code as usize)
        .ok_or(DecodeError::Malformed("URI prefix code out of range"))?;
    let suffix = str::from_utf8(&payload[1..])
        .map_err(|_| DecodeError::Malformed("URI suffix is not UTF-8"))?;

    Ok(NdefRecord::Uri(format!("{}{}", prefix, suffix)))
}

/// Encodes one record with explicit message-begin/message-end flags.
/// Capacity checks are the caller's job; encoding itself cannot fail.
pub fn encode_record(record: &NdefRecord, mb: bool, me: bool) -> Vec<u8> {
    let (tnf, type_field, payload): (u8, &[u8], Vec<u8>) = match record {
        NdefRecord::Text { content, language } => {
            let lang = &language.as_bytes()[..language.len().min(MAX_LANGUAGE_LEN)];
            let mut payload = Vec::with_capacity(1 + lang.len() + content.len());
            // Status byte: UTF-8 (bit 7 = 0), bits 0-5 = language length.
            payload.push(lang.len() as u8);
            payload.extend_from_slice(lang);
            payload.extend_from_slice(content.as_bytes());
            (TNF_WELL_KNOWN, b"T", payload)
        }
        NdefRecord::Uri(url) => {
            let (code, suffix) = shortest_suffix_encoding(url);
            let mut payload = Vec::with_capacity(1 + suffix.len());
            payload.push(code);
            payload.extend_from_slice(suffix.as_bytes());
            (TNF_WELL_KNOWN, b"U", payload)
        }
        NdefRecord::Binary(raw) => (TNF_EXTERNAL, EXTERNAL_TYPE, raw.clone()),
    };

    let short_record = payload.len() < 256;
    let mut header = tnf;
    if mb {
        header |= FLAG_MB;
    }
    if me {
        header |= FLAG_ME;
    }
    if short_record {
        header |= FLAG_SR;
    }

    let mut out = Vec::with_capacity(6 + type_field.len() + payload.len());
    out.push(header);
    out.push(type_field.len() as u8);
    if short_record {
        out.push(payload.len() as u8);
    } else {
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(type_field);
    out.extend_from_slice(&payload);
    out
}

/// Encodes a whole message in the given record order. Zero records produce
/// the canonical empty message (a single zero-length empty record), which is
/// what a delete writes to the tag.
pub fn encode_message(records: &[NdefRecord]) -> Vec<u8> {
    if records.is_empty() {
        return vec![FLAG_MB | FLAG_ME | FLAG_SR | TNF_EMPTY, 0x00, 0x00];
    }

    let mut out = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let mb = i == 0;
        let me = i == records.len() - 1;
        out.extend(encode_record(record, mb, me));
    }
    out
}

/// Picks the prefix code yielding the shortest suffix. Longer prefixes win;
/// code 0x00 (no prefix) is the fallback.
fn shortest_suffix_encoding(url: &str) -> (u8, &str) {
    let mut best: (u8, &str) = (0x00, url);
    for (code, prefix) in URI_PREFIXES.iter().enumerate().skip(1) {
        if let Some(suffix) = url.strip_prefix(prefix) {
            if suffix.len() < best.1.len() {
                best = (code as u8, suffix);
            }
        }
    }
    best
}

/// Bounds-checked reader over the raw message buffer.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn done(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(DecodeError::Malformed(what))?;
        self.pos += 1;
        Ok(byte)
    }

    fn u32_be(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::Malformed(what))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str, language: &str) -> NdefRecord {
        NdefRecord::Text {
            content: content.into(),
            language: language.into(),
        }
    }

    #[test]
    fn text_record_payload_layout() {
        // "hello" in "en": status byte 2, language, then content.
        let encoded = encode_record(&text("hello", "en"), true, true);
        assert_eq!(encoded[0], 0xD1); // MB | ME | SR | WellKnown
        assert_eq!(encoded[1], 1); // type length
        assert_eq!(encoded[2], 8); // payload length
        assert_eq!(encoded[3], b'T');
        assert_eq!(&encoded[4..], [0x02, b'e', b'n', b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn decodes_uri_with_prefix_code_0x01() {
        let mut raw = vec![0xD1, 0x01, 0x0C, b'U', 0x01];
        raw.extend_from_slice(b"example.com");
        assert_eq!(
            decode(&raw).unwrap(),
            vec![NdefRecord::Uri("http://www.example.com".into())]
        );
    }

    #[test]
    fn uri_encoding_picks_longest_matching_prefix() {
        // Both 0x03 "http://" and 0x01 "http://www." match; the shorter
        // suffix must win.
        let encoded = encode_record(&NdefRecord::Uri("http://www.example.com".into()), true, true);
        assert_eq!(encoded[4], 0x01);
        assert_eq!(&encoded[5..], b"example.com");
    }

    #[test]
    fn uri_without_known_prefix_uses_code_zero() {
        let encoded = encode_record(&NdefRecord::Uri("geo:48.2,16.3".into()), true, true);
        assert_eq!(encoded[4], 0x00);
        assert_eq!(&encoded[5..], b"geo:48.2,16.3");
    }

    #[test]
    fn round_trips_each_variant() {
        let records = [
            text("hello", "en"),
            text("grüß dich", "de-AT"),
            NdefRecord::Uri("https://www.example.com/path?q=1".into()),
            NdefRecord::Uri("tel:+4312345".into()),
            NdefRecord::Uri("geo:48.2,16.3".into()),
            NdefRecord::Binary(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        ];
        for record in &records {
            let decoded = decode(&encode_message(std::slice::from_ref(record))).unwrap();
            assert_eq!(decoded, vec![record.clone()], "{:?}", record);
        }
    }

    #[test]
    fn oversized_language_code_is_cut_at_the_status_byte_bound() {
        // 70 bytes cannot fit the 6-bit length field; the status byte must
        // match the bytes actually emitted, not wrap to zero.
        let record = text("hello", &"x".repeat(70));
        let encoded = encode_record(&record, true, true);
        assert_eq!(encoded[4], 0x3F);
        assert_eq!(
            decode(&encoded).unwrap(),
            vec![text("hello", &"x".repeat(63))]
        );
    }

    #[test]
    fn multi_record_order_is_preserved() {
        let records = vec![
            text("first", "en"),
            NdefRecord::Uri("https://example.com".into()),
            NdefRecord::Binary(vec![1, 2, 3]),
        ];
        assert_eq!(decode(&encode_message(&records)).unwrap(), records);
    }

    #[test]
    fn long_record_uses_four_byte_length() {
        let content = "x".repeat(300);
        let record = text(&content, "en");
        let encoded = encode_record(&record, true, true);
        assert_eq!(encoded[0] & FLAG_SR, 0);
        assert_eq!(decode(&encoded).unwrap(), vec![record]);
    }

    #[test]
    fn empty_message_is_single_empty_record() {
        let raw = encode_message(&[]);
        assert_eq!(raw, vec![0xD0, 0x00, 0x00]);
        assert_eq!(decode(&raw).unwrap(), vec![]);
    }

    #[test]
    fn truncated_payload_is_malformed() {
        // Declares 8 payload bytes but carries 3.
        let raw = [0xD1, 0x01, 0x08, b'T', 0x02, b'e', b'n'];
        assert!(matches!(decode(&raw), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn oversized_language_length_is_malformed() {
        // Status byte claims a 10-byte language code in a 3-byte payload.
        let raw = [0xD1, 0x01, 0x03, b'T', 0x0A, b'e', b'n'];
        assert!(matches!(decode(&raw), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn malformed_record_aborts_whole_message() {
        let mut raw = encode_record(&text("ok", "en"), true, false);
        raw.extend_from_slice(&[0x51, 0x01, 0x7F, b'T']); // truncated second record
        assert!(decode(&raw).is_err());
    }

    #[test]
    fn unknown_type_decodes_as_binary() {
        // MIME record (TNF 2) with type "a/b".
        let raw = [0xD2, 0x03, 0x02, b'a', b'/', b'b', 0x10, 0x20];
        assert_eq!(
            decode(&raw).unwrap(),
            vec![NdefRecord::Binary(vec![0x10, 0x20])]
        );
    }

    #[test]
    fn uri_prefix_code_out_of_table_is_malformed() {
        let raw = [0xD1, 0x01, 0x02, b'U', 0x7F, b'x'];
        assert!(matches!(decode(&raw), Err(DecodeError::Malformed(_))));
    }
}

