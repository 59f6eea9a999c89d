// src/classify.rs
use crate::hexfmt::format_hex;
use crate::types::{TagFamily, TagIdentity, TagMetadata};

/// The platform withholds ATQA/SAK for ISO14443-4 tags, so those fields get
/// a fixed sentinel instead of a value we cannot obtain.
pub const RESTRICTED: &str = "Restricted by platform";

const UNKNOWN: &str = "Unknown";
const NONE: &str = "-";

// DESFire generation discriminators inside the ATS historical bytes.
const ATS_EV3: u8 = 0x77;
const ATS_EV2: u8 = 0x75;

/// Maps a detected tag to display metadata. Pure and total: every branch
/// fills every field, no I/O, no failure mode.
pub fn classify(identity: &TagIdentity) -> TagMetadata {
    let serial = format_hex(&identity.id_bytes);

    match identity.family {
        TagFamily::Iso7816 => classify_type4(identity, serial),
        TagFamily::MifareUltralight => TagMetadata {
            tag_type: "MIFARE Ultralight".into(),
            technologies: "Type A".into(),
            serial,
            atqa: RESTRICTED.into(),
            sak: RESTRICTED.into(),
            memory: "512 Bytes".into(),
            data_format: UNKNOWN.into(),
        },
        TagFamily::MifarePlus => TagMetadata {
            tag_type: "MIFARE Plus".into(),
            technologies: "Type A".into(),
            serial,
            atqa: RESTRICTED.into(),
            sak: RESTRICTED.into(),
            memory: "2K / 4K".into(),
            data_format: UNKNOWN.into(),
        },
        TagFamily::MifareDesfire => TagMetadata {
            tag_type: "MIFARE DESFire".into(),
            technologies: "Type A, ISO-DEP".into(),
            serial,
            atqa: RESTRICTED.into(),
            sak: RESTRICTED.into(),
            memory: "2K / 4K / 8K".into(),
            data_format: UNKNOWN.into(),
        },
        TagFamily::Unknown => TagMetadata {
            tag_type: UNKNOWN.into(),
            technologies: NONE.into(),
            serial,
            atqa: NONE.into(),
            sak: NONE.into(),
            memory: UNKNOWN.into(),
            data_format: NONE.into(),
        },
        // ISO15693 / FeliCa: label only, no NDEF read will be attempted.
        TagFamily::Iso15693 | TagFamily::FeliCa => TagMetadata {
            tag_type: "Unsupported".into(),
            technologies: NONE.into(),
            serial,
            atqa: NONE.into(),
            sak: NONE.into(),
            memory: NONE.into(),
            data_format: NONE.into(),
        },
    }
}

/// Type-4 tags are DESFire-class chips behind ISO7816 application selection.
/// Generation is a heuristic read off the ATS historical bytes; the EV3
/// discriminator is checked before EV2, and EV1 is the default.
fn classify_type4(identity: &TagIdentity, serial: String) -> TagMetadata {
    let historical: &[u8] = identity.historical_bytes.as_deref().unwrap_or(&[]);

    let (generation, memory) = if historical.contains(&ATS_EV3) {
        ("EV3", "8KB EEPROM")
    } else if historical.contains(&ATS_EV2) {
        ("EV2", "4KB EEPROM")
    } else {
        ("EV1", "2KB EEPROM")
    };

    TagMetadata {
        tag_type: format!("MIFARE DESFire {}", generation),
        technologies: "Type A, ISO-DEP".into(),
        serial,
        atqa: RESTRICTED.into(),
        sak: RESTRICTED.into(),
        memory: memory.into(),
        data_format: UNKNOWN.into(),
    }
}
