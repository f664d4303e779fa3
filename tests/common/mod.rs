//! Builders for meter wire data and in-memory collaborators.

#![allow(dead_code)]

use aes::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use async_trait::async_trait;
use smart_meter_mqtt::error::{BrokerError, TransportError};
use smart_meter_mqtt::{Broker, Transport};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const KEY_HEX: &str = "36C66639E48A8CA4D6BC8B282A793BBB";
pub const KEY: [u8; 16] = [
    0x36, 0xC6, 0x66, 0x39, 0xE4, 0x8A, 0x8C, 0xA4, 0xD6, 0xBC, 0x8B, 0x28, 0x2A, 0x79, 0x3B, 0xBB,
];
const SYSTEM_TITLE: [u8; 8] = [0x4B, 0x46, 0x4D, 0x10, 0x20, 0x01, 0x02, 0x03];
const TIMESTAMP: [u8; 12] = [
    0x07, 0xEA, 0x0A, 0x12, 0x07, 0x0C, 0x00, 0x05, 0x00, 0x80, 0x00, 0x00,
];
const SEGMENT_PAYLOAD: usize = 245;
pub const CHUNK_SIZE: usize = 282;

fn push_length(out: &mut Vec<u8>, len: usize) {
    match len {
        0..=0x7F => out.push(len as u8),
        0x80..=0xFF => out.extend([0x81, len as u8]),
        _ => out.extend([0x82, (len >> 8) as u8, len as u8]),
    }
}

/// A-XDR structure of (OBIS, value, scaler/unit) triples, uint32 registers first
pub fn notification_body(uint32s: &[u32], uint16s: &[u16]) -> Vec<u8> {
    let mut body = vec![0x02];
    push_length(&mut body, (uint32s.len() + uint16s.len()) * 3);
    for value in uint32s {
        body.extend([0x09, 0x06, 1, 0, 1, 8, 0, 255, 0x06]);
        body.extend(value.to_be_bytes());
        body.extend([0x02, 0x02, 0x0F, 0x00, 0x16, 0x1E]);
    }
    for value in uint16s {
        body.extend([0x09, 0x06, 1, 0, 32, 7, 0, 255, 0x12]);
        body.extend(value.to_be_bytes());
        body.extend([0x02, 0x02, 0x0F, 0xFF, 0x16, 0x23]);
    }
    body
}

/// Encrypted data-notification split into M-Bus segments
pub fn meter_frame(key: &[u8; 16], invocation_counter: u32, body: &[u8]) -> Vec<u8> {
    let mut plain = vec![0x0F, 0x00, 0x01, 0x23, 0x45, TIMESTAMP.len() as u8];
    plain.extend(TIMESTAMP);
    plain.extend(body);

    let counter = invocation_counter.to_be_bytes();
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&SYSTEM_TITLE);
    iv[8..12].copy_from_slice(&counter);
    iv[15] = 2;
    let mut cipher = ctr::Ctr32BE::<aes::Aes128>::new(
        GenericArray::from_slice(key),
        GenericArray::from_slice(&iv),
    );
    cipher.apply_keystream(&mut plain);

    let mut content = vec![0x20];
    content.extend(counter);
    content.extend(plain);
    let mut apdu = vec![0xDB, SYSTEM_TITLE.len() as u8];
    apdu.extend(SYSTEM_TITLE);
    push_length(&mut apdu, content.len());
    apdu.extend(content);

    let segments: Vec<&[u8]> = apdu.chunks(SEGMENT_PAYLOAD).collect();
    let mut wire = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        let mut ci = index as u8;
        if index + 1 == segments.len() {
            ci |= 0x10;
        }
        let mut user = vec![0x53, 0xFF, ci, 0x01, 0x67];
        user.extend(*segment);
        let checksum = user.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        wire.extend([0x68, user.len() as u8, user.len() as u8, 0x68]);
        wire.extend(user);
        wire.extend([checksum, 0x16]);
    }
    wire
}

/// Body laid out the way the interleaved field map expects
pub fn interleaved_body(uint32_values: [u32; 4], uint16_values: [u16; 7]) -> Vec<u8> {
    let mut uint32s = vec![0u32; 13];
    for (slot, value) in uint32_values.into_iter().enumerate() {
        uint32s[slot * 4] = value;
    }
    let mut uint16s = vec![0u16; 25];
    for (slot, value) in uint16_values.into_iter().enumerate() {
        uint16s[slot * 4] = value;
    }
    notification_body(&uint32s, &uint16s)
}

/// Replays a byte stream in fixed-size reads, then reports the port closed
pub struct ReplayTransport {
    reads: VecDeque<Result<Vec<u8>, TransportError>>,
}

impl ReplayTransport {
    pub fn new(stream: &[u8]) -> Self {
        Self {
            reads: stream.chunks(CHUNK_SIZE).map(|c| Ok(c.to_vec())).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.reads.len()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn read_chunk(&mut self) -> Result<Vec<u8>, TransportError> {
        self.reads.pop_front().unwrap_or(Err(TransportError::Closed))
    }
}

/// Broker whose outages are switched from the test
#[derive(Clone, Default)]
pub struct MockBroker {
    pub published: Arc<Mutex<Vec<(String, String)>>>,
    pub connects: Arc<Mutex<u32>>,
    pub failing_connects: Arc<Mutex<u32>>,
    pub failing_publish_at: Arc<Mutex<Option<usize>>>,
}

impl MockBroker {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> u32 {
        *self.connects.lock().unwrap()
    }

    pub fn fail_next_connects(&self, count: u32) {
        *self.failing_connects.lock().unwrap() = count;
    }

    /// Fails the publish that would deliver message number `index` (0-based overall)
    pub fn fail_publish_at(&self, index: usize) {
        *self.failing_publish_at.lock().unwrap() = Some(index);
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        *self.connects.lock().unwrap() += 1;
        let mut failing = self.failing_connects.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(BrokerError::Connection("Connection refused".to_string()));
        }
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let mut published = self.published.lock().unwrap();
        let mut failing_at = self.failing_publish_at.lock().unwrap();
        if *failing_at == Some(published.len()) {
            *failing_at = None;
            return Err(BrokerError::Connection("Broken pipe".to_string()));
        }
        published.push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}
