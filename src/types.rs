// src/types.rs
use serde::{Deserialize, Serialize};

/// Hardware family reported by the radio layer during activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TagFamily {
    MifareUltralight,
    MifarePlus,
    MifareDesfire,
    Iso7816,
    Iso15693,
    FeliCa,
    Unknown,
}

impl TagFamily {
    /// Families for which an NDEF read is attempted at all.
    pub fn supports_ndef(&self) -> bool {
        matches!(
            self,
            TagFamily::MifareUltralight
                | TagFamily::MifarePlus
                | TagFamily::MifareDesfire
                | TagFamily::Iso7816
        )
    }
}

/// Everything the radio layer tells us about a detected tag.
/// Immutable once built; lives for exactly one scan.
#[derive(Debug, Clone)]
pub struct TagIdentity {
    pub id_bytes: Vec<u8>,
    pub family: TagFamily,
    pub historical_bytes: Option<Vec<u8>>,
}

/// Display record derived from a `TagIdentity` by the classifier.
/// Every field is always populated; recomputed on every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMetadata {
    pub tag_type: String,
    pub technologies: String,
    pub serial: String,
    pub atqa: String,
    pub sak: String,
    pub memory: String,
    pub data_format: String,
}

// Well-known ScanResult keys consumed by the frontend.
pub const KEY_TAG_TYPE: &str = "Tag Type";
pub const KEY_TECHNOLOGIES: &str = "Technologies";
pub const KEY_SERIAL: &str = "Serial Number";
pub const KEY_ATQA: &str = "ATQA";
pub const KEY_SAK: &str = "SAK";
pub const KEY_MEMORY: &str = "Memory Information";
pub const KEY_DATA_FORMAT: &str = "Data Format";
pub const KEY_SIZE: &str = "Size";
pub const KEY_DETECTED_URL: &str = "Detected URL";

/// Ordered key/value result of one scan or write attempt. Insertion order is
/// the order the frontend renders, so no map type here.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ScanResult {
    fields: Vec<(String, String)>,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any previous value for `key`, keeping its original position.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// Messages sent TO the WebSocket client (frontend).
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type")]
#[allow(non_camel_case_types)]
pub enum OutgoingMessage {
    READER_STATUS { success: bool },
    TAG_STATUS { success: bool, message: String },
    SCAN_RESULT { fields: ScanResult },
    SCAN_ERROR { error: String },
    WRITE_SUCCESS { message: String },
    WRITE_ERROR { error: String },
    OPEN_URL { url: String },
    READER_ERROR { error: String },
}

// Messages received FROM the WebSocket client.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
#[allow(non_camel_case_types)]
pub enum IncomingMessage {
    GET_READER_STATUS,
    REQUEST_SCAN,
    WRITE_TEXT { content: String },
    WRITE_URL { url: String },
    DELETE_TAG,
}

// Internal commands sent from the WS server to the coordinator thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCommand {
    Scan,
    WriteText { content: String },
    WriteUrl { url: String },
    Delete,
    CheckReaderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_result_preserves_insertion_order() {
        let mut result = ScanResult::new();
        result.set(KEY_TAG_TYPE, "MIFARE Ultralight");
        result.set(KEY_SERIAL, "04:A1:B2:C3");
        result.set(KEY_TAG_TYPE, "MIFARE Plus");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                ["Tag Type", "MIFARE Plus"],
                ["Serial Number", "04:A1:B2:C3"],
            ])
        );
    }

    #[test]
    fn clear_discards_previous_scan() {
        let mut result = ScanResult::new();
        result.set(KEY_DETECTED_URL, "http://example.com");
        result.clear();
        assert!(result.is_empty());
        assert_eq!(result.get(KEY_DETECTED_URL), None);
    }

    #[test]
    fn ndef_support_by_family() {
        assert!(TagFamily::Iso7816.supports_ndef());
        assert!(TagFamily::MifareUltralight.supports_ndef());
        assert!(!TagFamily::Iso15693.supports_ndef());
        assert!(!TagFamily::FeliCa.supports_ndef());
        assert!(!TagFamily::Unknown.supports_ndef());
    }
}
