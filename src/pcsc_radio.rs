// src/pcsc_radio.rs
//
// PC/SC implementation of the radio layer. Detection waits on reader status
// changes; the tag family is guessed from the ATR, and the NDEF message area
// is reached through the storage-card pseudo-APDUs in `apdu`.
use std::ffi::CString;
use std::time::{Duration, Instant};

use log::{debug, info};
use pcsc::{Context, Protocols, ReaderState, Scope, ShareMode, State};

use crate::apdu;
use crate::radio::{NdefStatus, Radio, SessionError, TagHandle};
use crate::types::{TagFamily, TagIdentity};

const NDEF_TLV: u8 = 0x03;
const TERMINATOR_TLV: u8 = 0xFE;
/// First page of the NDEF message area on Type-2 storage cards.
const DATA_START_BLOCK: u8 = 4;
/// Largest TLV span the page loop can address: pages run from
/// DATA_START_BLOCK to 0xFF, 4 bytes each.
const MAX_MESSAGE_AREA: usize = (0x100 - DATA_START_BLOCK as usize) * 4;

pub struct PcscRadio {
    ctx: Context,
    detect_timeout: Duration,
}

impl PcscRadio {
    pub fn new() -> Result<Self, pcsc::Error> {
        Ok(Self {
            ctx: Context::establish(Scope::User)?,
            detect_timeout: Duration::from_secs(30),
        })
    }

    fn first_reader(&self) -> Option<CString> {
        let mut buf = [0; 2048];
        match self.ctx.list_readers(&mut buf) {
            Ok(mut readers) => readers.next().map(CString::from),
            Err(_) => None,
        }
    }
}

impl Radio for PcscRadio {
    fn await_tag(&mut self) -> Result<Box<dyn TagHandle>, SessionError> {
        let reader = self
            .first_reader()
            .ok_or_else(|| SessionError::ConnectFailure("no reader attached".into()))?;
        let mut states = vec![ReaderState::new(reader.clone(), State::UNAWARE)];
        let deadline = Instant::now() + self.detect_timeout;

        loop {
            if let Err(err) = self
                .ctx
                .get_status_change(Duration::from_millis(500), &mut states)
            {
                if err != pcsc::Error::Timeout {
                    return Err(SessionError::SessionInvalidated(err.to_string()));
                }
            }

            if states[0].event_state().intersects(State::PRESENT) {
                let (family, historical_bytes) = family_from_atr(states[0].atr());
                info!("Tag detected on {:?} ({:?})", reader, family);
                return Ok(Box::new(PcscTag {
                    ctx: self.ctx.clone(),
                    reader,
                    identity: TagIdentity {
                        id_bytes: Vec::new(),
                        family,
                        historical_bytes,
                    },
                    card: None,
                }));
            }
            states[0].sync_current_state();

            if Instant::now() >= deadline {
                return Err(SessionError::NoTag);
            }
        }
    }

    fn invalidate(&mut self) {
        // The card handle disconnects on drop; nothing else to release.
        debug!("radio session released");
    }

    fn reader_available(&mut self) -> bool {
        self.first_reader().is_some()
    }
}

struct PcscTag {
    ctx: Context,
    reader: CString,
    identity: TagIdentity,
    card: Option<pcsc::Card>,
}

impl PcscTag {
    fn card(&self) -> Result<&pcsc::Card, SessionError> {
        self.card
            .as_ref()
            .ok_or_else(|| SessionError::ConnectFailure("tag not connected".into()))
    }
}

impl TagHandle for PcscTag {
    fn identity(&self) -> &TagIdentity {
        &self.identity
    }

    fn connect(&mut self) -> Result<(), SessionError> {
        let card = self
            .ctx
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            .map_err(|e| SessionError::ConnectFailure(e.to_string()))?;
        // UID is only reachable once connected.
        if let Ok(uid) = apdu::get_uid(&card) {
            self.identity.id_bytes = uid;
        }
        self.card = Some(card);
        Ok(())
    }

    fn ndef_status(&mut self) -> Result<NdefStatus, SessionError> {
        if self.identity.family == TagFamily::Iso7816 {
            // Type-4 NDEF application selection is not wired into this
            // backend; the coordinator reports these tags as Non-NDEF.
            return Err(SessionError::NotNdefCapable);
        }
        let card = self.card()?;

        // Capability container in page 3: magic, version, size/8, access.
        let cc = apdu::read_binary(card, 3, 4).map_err(SessionError::ReadFailure)?;
        if cc.len() < 4 || cc[0] != 0xE1 {
            return Err(SessionError::NotNdefCapable);
        }
        let capacity = cc[2] as usize * 8;
        let writable = cc[3] & 0x0F == 0;

        let first = apdu::read_binary(card, DATA_START_BLOCK, 4).map_err(SessionError::ReadFailure)?;
        let ndef_present = first.first() == Some(&NDEF_TLV) && first.get(1) != Some(&0x00);

        Ok(NdefStatus {
            capacity,
            writable,
            ndef_present,
        })
    }

    fn read_raw(&mut self) -> Result<Vec<u8>, SessionError> {
        let card = self.card()?;

        let head = apdu::read_binary(card, DATA_START_BLOCK, 4).map_err(SessionError::ReadFailure)?;
        let (offset, len) = message_span(&head).map_err(SessionError::ReadFailure)?;

        let total = offset + len;
        let mut data = Vec::with_capacity(total);
        let pages = total.div_ceil(4);
        for page in 0..pages {
            let chunk = apdu::read_binary(card, DATA_START_BLOCK + page as u8, 4)
                .map_err(SessionError::ReadFailure)?;
            data.extend(chunk);
        }

        if data.len() < total {
            return Err(SessionError::ReadFailure(
                "card ended before declared NDEF length".into(),
            ));
        }
        Ok(data[offset..total].to_vec())
    }

    fn write_raw(&mut self, raw: &[u8]) -> Result<(), SessionError> {
        let card = self.card()?;

        let mut framed = wrap_in_tlv(raw);
        while framed.len() % 4 != 0 {
            framed.push(0x00);
        }

        // Type-2 cards take one 4-byte page per write.
        for (page, chunk) in framed.chunks(4).enumerate() {
            apdu::update_binary(card, DATA_START_BLOCK + page as u8, chunk)
                .map_err(SessionError::WriteFailure)?;
        }
        Ok(())
    }
}

/// Frames an NDEF message for the tag's data area: 0x03 TLV with short or
/// three-byte length, then the terminator TLV.
fn wrap_in_tlv(ndef: &[u8]) -> Vec<u8> {
    let mut tlv = Vec::with_capacity(ndef.len() + 5);
    tlv.push(NDEF_TLV);
    if ndef.len() < 0xFF {
        tlv.push(ndef.len() as u8);
    } else {
        tlv.push(0xFF);
        tlv.extend_from_slice(&(ndef.len() as u16).to_be_bytes());
    }
    tlv.extend_from_slice(ndef);
    tlv.push(TERMINATOR_TLV);
    tlv
}

/// Locates the NDEF value inside the TLV header read from the first data
/// page. Returns (value offset, value length).
fn tlv_frame(head: &[u8]) -> Result<(usize, usize), String> {
    if head.first() != Some(&NDEF_TLV) {
        return Err("no NDEF container (0x03 TLV missing)".into());
    }
    match head.get(1) {
        Some(&0xFF) => {
            let hi = *head.get(2).ok_or("truncated TLV length")? as usize;
            let lo = *head.get(3).ok_or("truncated TLV length")? as usize;
            Ok((4, (hi << 8) | lo))
        }
        Some(&len) => Ok((2, len as usize)),
        None => Err("truncated TLV header".into()),
    }
}

/// TLV header parse plus a sanity bound: the length field comes off the card
/// and a corrupt value must not walk the page loop past addressable pages.
fn message_span(head: &[u8]) -> Result<(usize, usize), String> {
    let (offset, len) = tlv_frame(head)?;
    if offset + len > MAX_MESSAGE_AREA {
        return Err(format!(
            "declared NDEF length {} exceeds the message area",
            len
        ));
    }
    Ok((offset, len))
}

/// Guesses the tag family from the ATR. PC/SC part-3 storage cards carry the
/// contactless RID plus a standard byte and card-name bytes in their
/// historical bytes; anything else with historical bytes is treated as an
/// ISO14443-4 smart card whose historical bytes mirror the ATS.
fn family_from_atr(atr: &[u8]) -> (TagFamily, Option<Vec<u8>>) {
    let Some(historical) = atr_historical_bytes(atr) else {
        return (TagFamily::Unknown, None);
    };

    const STORAGE_PREFIX: [u8; 8] = [0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06];
    if historical.len() >= 11 && historical[..8] == STORAGE_PREFIX {
        let standard = historical[8];
        let name = [historical[9], historical[10]];
        let family = match (standard, name) {
            (0x03, [0x00, 0x03]) => TagFamily::MifareUltralight,
            (0x03, [0x00, 0x3A]) => TagFamily::MifareUltralight, // Ultralight C
            // MIFARE Classic would need sector authentication, which is out
            // of scope; leave it unclassified.
            (0x03, _) => TagFamily::Unknown,
            (0x0B, _) => TagFamily::Iso15693,
            (0x11, _) => TagFamily::FeliCa,
            _ => TagFamily::Unknown,
        };
        return (family, None);
    }

    (TagFamily::Iso7816, Some(historical))
}

/// Extracts the historical bytes from an ATR by walking the interface-byte
/// chain (TA/TB/TC/TD per Y nibble).
fn atr_historical_bytes(atr: &[u8]) -> Option<Vec<u8>> {
    let t0 = *atr.get(1)?;
    let k = (t0 & 0x0F) as usize;
    let mut y = t0 >> 4;
    let mut pos = 2usize;

    while y != 0 {
        let mut next_y = 0;
        if y & 0x1 != 0 {
            pos += 1; // TA
        }
        if y & 0x2 != 0 {
            pos += 1; // TB
        }
        if y & 0x4 != 0 {
            pos += 1; // TC
        }
        if y & 0x8 != 0 {
            next_y = *atr.get(pos)? >> 4; // TD
            pos += 1;
        }
        y = next_y;
    }

    atr.get(pos..pos + k).map(|bytes| bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ACR122-style ATR for an NTAG/Ultralight storage card.
    const ULTRALIGHT_ATR: [u8; 20] = [
        0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x03,
        0x00, 0x00, 0x00, 0x00, 0x68,
    ];

    #[test]
    fn storage_card_atr_maps_to_ultralight() {
        let (family, historical) = family_from_atr(&ULTRALIGHT_ATR);
        assert_eq!(family, TagFamily::MifareUltralight);
        assert_eq!(historical, None);
    }

    #[test]
    fn smart_card_atr_keeps_historical_bytes() {
        // T=1 card; historical bytes carry the ATS discriminators.
        let atr = [0x3B, 0x86, 0x80, 0x01, 0x06, 0x75, 0x77, 0x81, 0x02, 0x80];
        let (family, historical) = family_from_atr(&atr);
        assert_eq!(family, TagFamily::Iso7816);
        assert_eq!(historical, Some(vec![0x06, 0x75, 0x77, 0x81, 0x02, 0x80]));
    }

    #[test]
    fn classic_storage_card_stays_unknown() {
        let mut atr = ULTRALIGHT_ATR;
        atr[13] = 0x00;
        atr[14] = 0x01; // MIFARE Classic 1K card name
        let (family, _) = family_from_atr(&atr);
        assert_eq!(family, TagFamily::Unknown);
    }

    #[test]
    fn truncated_atr_is_unknown() {
        assert_eq!(family_from_atr(&[0x3B]).0, TagFamily::Unknown);
        assert_eq!(family_from_atr(&[]).0, TagFamily::Unknown);
    }

    #[test]
    fn short_tlv_frame_round_trip() {
        let framed = wrap_in_tlv(&[0xD0, 0x00, 0x00]);
        assert_eq!(framed, vec![0x03, 0x03, 0xD0, 0x00, 0x00, 0xFE]);
        assert_eq!(tlv_frame(&framed).unwrap(), (2, 3));
    }

    #[test]
    fn long_tlv_uses_three_byte_length() {
        let ndef = vec![0xAA; 300];
        let framed = wrap_in_tlv(&ndef);
        assert_eq!(&framed[..4], &[0x03, 0xFF, 0x01, 0x2C]);
        assert_eq!(tlv_frame(&framed).unwrap(), (4, 300));
        assert_eq!(*framed.last().unwrap(), 0xFE);
    }

    #[test]
    fn oversized_declared_length_is_rejected() {
        // 0x0400 = 1024 bytes claimed, past the 1008-byte addressable area;
        // must fail instead of wrapping the page counter.
        assert!(message_span(&[0x03, 0xFF, 0x04, 0x00]).is_err());
        // Largest span that still fits.
        let max_len = MAX_MESSAGE_AREA - 4;
        let head = [0x03, 0xFF, (max_len >> 8) as u8, (max_len & 0xFF) as u8];
        assert_eq!(message_span(&head).unwrap(), (4, max_len));
    }

    #[test]
    fn missing_container_is_an_error() {
        assert!(tlv_frame(&[0x00, 0x00, 0x00, 0x00]).is_err());
        assert!(tlv_frame(&[]).is_err());
    }
}
