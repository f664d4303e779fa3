//! DLMS application layer: general-glo-ciphering wrapper and data-notification.

use aes::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use aes::Aes128;

use super::axdr::{DataValue, Reader};
use super::{DecodedDocument, MeterKey};
use crate::error::DecodeError;

type Aes128Ctr = ctr::Ctr32BE<Aes128>;

const TAG_DATA_NOTIFICATION: u8 = 0x0F;
const TAG_GENERAL_GLO_CIPHERING: u8 = 0xDB;

const SECURITY_AUTHENTICATED: u8 = 0x10;
const SECURITY_ENCRYPTED: u8 = 0x20;
const AUTH_TAG_LEN: usize = 12;
const SYSTEM_TITLE_LEN: usize = 8;
const COSEM_DATE_TIME_LEN: usize = 12;

/// Decodes a reassembled APDU into a document, deciphering it first if needed.
pub fn decode_apdu(apdu: &[u8], key: &MeterKey) -> Result<DecodedDocument, DecodeError> {
    match apdu.first() {
        Some(&TAG_GENERAL_GLO_CIPHERING) => {
            let plain = decipher(apdu, key)?;
            match plain.first() {
                Some(&TAG_DATA_NOTIFICATION) => decode_data_notification(&plain),
                Some(&tag) => Err(DecodeError::UnsupportedApdu(tag)),
                None => Err(DecodeError::Truncated {
                    offset: 0,
                    needed: 1,
                }),
            }
        }
        Some(&TAG_DATA_NOTIFICATION) => decode_data_notification(apdu),
        Some(&tag) => Err(DecodeError::UnsupportedApdu(tag)),
        None => Err(DecodeError::Truncated {
            offset: 0,
            needed: 1,
        }),
    }
}

/// Strips the general-glo-ciphering header and returns the plaintext APDU
fn decipher(apdu: &[u8], key: &MeterKey) -> Result<Vec<u8>, DecodeError> {
    let mut reader = Reader::new(apdu);
    reader.u8()?;

    let title_len = reader.length()?;
    if title_len != SYSTEM_TITLE_LEN {
        return Err(DecodeError::Cipher(format!(
            "system title has {title_len} bytes, expected {SYSTEM_TITLE_LEN}"
        )));
    }
    let system_title = reader.take(title_len)?;

    let content_len = reader.length()?;
    let content = reader.take(content_len)?;
    let mut content = Reader::new(content);

    let security = content.u8()?;
    let invocation_counter: [u8; 4] = content.array()?;
    let mut payload = content.rest().to_vec();

    if security & SECURITY_AUTHENTICATED != 0 {
        if payload.len() < AUTH_TAG_LEN {
            return Err(DecodeError::Cipher("missing authentication tag".to_string()));
        }
        payload.truncate(payload.len() - AUTH_TAG_LEN);
    }
    if security & SECURITY_ENCRYPTED != 0 {
        apply_keystream(key, system_title, &invocation_counter, &mut payload);
    }
    Ok(payload)
}

/// GCM encryption without the tag: AES-CTR over IV || counter, counter starting at 2.
///
/// The same operation encrypts and decrypts.
pub(crate) fn apply_keystream(
    key: &MeterKey,
    system_title: &[u8],
    invocation_counter: &[u8; 4],
    data: &mut [u8],
) {
    let mut iv = [0u8; 16];
    iv[..SYSTEM_TITLE_LEN].copy_from_slice(&system_title[..SYSTEM_TITLE_LEN]);
    iv[SYSTEM_TITLE_LEN..12].copy_from_slice(invocation_counter);
    iv[15] = 2;
    let mut cipher = Aes128Ctr::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(&iv),
    );
    cipher.apply_keystream(data);
}

fn decode_data_notification(apdu: &[u8]) -> Result<DecodedDocument, DecodeError> {
    let mut reader = Reader::new(apdu);
    reader.u8()?;
    let invoke_id = u32::from_be_bytes(reader.array()?);

    let timestamp = match reader.length()? {
        0 => None,
        COSEM_DATE_TIME_LEN => Some(reader.take(COSEM_DATE_TIME_LEN)?.to_vec()),
        other => {
            return Err(DecodeError::Malformed(format!(
                "date-time has {other} bytes, expected {COSEM_DATE_TIME_LEN}"
            )))
        }
    };

    let body = DataValue::read(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(DecodeError::Malformed(format!(
            "{} trailing bytes after notification body",
            reader.remaining()
        )));
    }

    Ok(DecodedDocument {
        invoke_id,
        timestamp,
        body,
    })
}
