// src/apdu.rs
use pcsc::Card;

// PC/SC pseudo-APDUs for contactless storage cards (ACR122-class readers).

fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>, String> {
    let mut recv_buffer = [0u8; 256];
    match card.transmit(apdu, &mut recv_buffer) {
        Ok(resp) => {
            // 90 00 trailer is success
            if resp.len() >= 2 && resp[resp.len() - 2] == 0x90 && resp[resp.len() - 1] == 0x00 {
                Ok(resp[..resp.len() - 2].to_vec())
            } else {
                Err(format!("status {}", hex::encode_upper(resp)))
            }
        }
        Err(e) => Err(format!("transmit error: {}", e)),
    }
}

/// UID via GET DATA: FF CA 00 00 00
pub fn get_uid(card: &Card) -> Result<Vec<u8>, String> {
    transmit(card, &[0xFF, 0xCA, 0x00, 0x00, 0x00])
}

/// READ BINARY: FF B0 00 Block Len
pub fn read_binary(card: &Card, block: u8, length: u8) -> Result<Vec<u8>, String> {
    transmit(card, &[0xFF, 0xB0, 0x00, block, length])
}

/// UPDATE BINARY: FF D6 00 Block Len [Data]
pub fn update_binary(card: &Card, block: u8, data: &[u8]) -> Result<(), String> {
    let mut apdu = vec![0xFF, 0xD6, 0x00, block, data.len() as u8];
    apdu.extend_from_slice(data);
    transmit(card, &apdu).map(|_| ())
}
