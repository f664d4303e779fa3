//! Frame builders for codec tests.

use super::apdu::apply_keystream;
use super::{DataValue, MeterKey};

pub const TEST_KEY: [u8; 16] = [
    0x36, 0xC6, 0x66, 0x39, 0xE4, 0x8A, 0x8C, 0xA4, 0xD6, 0xBC, 0x8B, 0x28, 0x2A, 0x79, 0x3B, 0xBB,
];
pub const TEST_SYSTEM_TITLE: [u8; 8] = [0x4B, 0x46, 0x4D, 0x10, 0x20, 0x01, 0x02, 0x03];
pub const TEST_COUNTER: [u8; 4] = [0x00, 0x01, 0x2C, 0x3F];
pub const TEST_INVOKE_ID: u32 = 0x0001_2345;
pub const TEST_TIMESTAMP: [u8; 12] = [
    0x07, 0xE8, 0x03, 0x0F, 0x05, 0x0C, 0x1E, 0x00, 0x00, 0x80, 0x00, 0x00,
];

/// APDU bytes carried per M-Bus segment, as on the EVN dongles
const SEGMENT_PAYLOAD: usize = 245;

/// Notification body interleaving OBIS codes, values and scaler/unit pairs
pub fn sample_body(uint32s: &[u32], uint16s: &[u16]) -> DataValue {
    let mut items = Vec::new();
    for value in uint32s {
        items.push(DataValue::OctetString(vec![1, 0, 1, 8, 0, 255]));
        items.push(DataValue::UInt32(*value));
        items.push(DataValue::Structure(vec![
            DataValue::Int8(0),
            DataValue::Enum(30),
        ]));
    }
    for value in uint16s {
        items.push(DataValue::OctetString(vec![1, 0, 32, 7, 0, 255]));
        items.push(DataValue::UInt16(*value));
        items.push(DataValue::Structure(vec![
            DataValue::Int8(-1),
            DataValue::Enum(35),
        ]));
    }
    DataValue::Structure(items)
}

pub fn encode_length(len: usize) -> Vec<u8> {
    match len {
        0..=0x7F => vec![len as u8],
        0x80..=0xFF => vec![0x81, len as u8],
        _ => vec![0x82, (len >> 8) as u8, len as u8],
    }
}

pub fn encode_value(value: &DataValue) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        DataValue::Null => out.push(0x00),
        DataValue::Array(items) | DataValue::Structure(items) => {
            out.push(if matches!(value, DataValue::Array(_)) { 0x01 } else { 0x02 });
            out.extend(encode_length(items.len()));
            for item in items {
                out.extend(encode_value(item));
            }
        }
        DataValue::OctetString(bytes) => {
            out.push(0x09);
            out.extend(encode_length(bytes.len()));
            out.extend(bytes);
        }
        DataValue::UInt32(v) => {
            out.push(0x06);
            out.extend(v.to_be_bytes());
        }
        DataValue::UInt16(v) => {
            out.push(0x12);
            out.extend(v.to_be_bytes());
        }
        DataValue::Int8(v) => {
            out.push(0x0F);
            out.extend(v.to_be_bytes());
        }
        DataValue::Enum(v) => {
            out.extend([0x16, *v]);
        }
        other => panic!("fixture encoder does not handle {other:?}"),
    }
    out
}

pub fn data_notification(body: &DataValue) -> Vec<u8> {
    let mut apdu = vec![0x0F];
    apdu.extend(TEST_INVOKE_ID.to_be_bytes());
    apdu.push(TEST_TIMESTAMP.len() as u8);
    apdu.extend(TEST_TIMESTAMP);
    apdu.extend(encode_value(body));
    apdu
}

pub fn ciphered_apdu(key: &[u8; 16], plain: &[u8], security: u8) -> Vec<u8> {
    let mut payload = plain.to_vec();
    if security & 0x20 != 0 {
        apply_keystream(
            &MeterKey::new(*key),
            &TEST_SYSTEM_TITLE,
            &TEST_COUNTER,
            &mut payload,
        );
    }
    if security & 0x10 != 0 {
        payload.extend([0xA5; 12]);
    }
    let mut content = vec![security];
    content.extend(TEST_COUNTER);
    content.extend(payload);

    let mut apdu = vec![0xDB, TEST_SYSTEM_TITLE.len() as u8];
    apdu.extend(TEST_SYSTEM_TITLE);
    apdu.extend(encode_length(content.len()));
    apdu.extend(content);
    apdu
}

pub fn mbus_segment(ci: u8, data: &[u8]) -> Vec<u8> {
    let mut user = vec![0x53, 0xFF, ci];
    user.extend(data);
    let checksum = user.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    let mut frame = vec![0x68, user.len() as u8, user.len() as u8, 0x68];
    frame.extend(user);
    frame.extend([checksum, 0x16]);
    frame
}

/// Splits an APDU into a chain of M-Bus segments
pub fn segment_chain(apdu: &[u8]) -> Vec<u8> {
    let chunks: Vec<&[u8]> = apdu.chunks(SEGMENT_PAYLOAD).collect();
    let mut out = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        let mut ci = index as u8 & 0x0F;
        if index + 1 == chunks.len() {
            ci |= 0x10;
        }
        let mut data = vec![0x01, 0x67];
        data.extend(*chunk);
        out.extend(mbus_segment(ci, &data));
    }
    out
}

/// Complete encrypted wire frame for `body`
pub fn encrypted_frame(key: &[u8; 16], body: &DataValue) -> Vec<u8> {
    segment_chain(&ciphered_apdu(key, &data_notification(body), 0x20))
}
