//! Reassembles frames from fixed-size transport chunks.

use bytes::BytesMut;
use tracing::{debug, error, warn};

use crate::codec::{Codec, DecodedDocument};

/// Buffered bytes beyond which leading noise is discarded
pub const DEFAULT_MAX_BUFFERED: usize = 64 * 1024;

/// Accumulates transport bytes and hands complete frames to the codec.
///
/// Partial frames stay buffered until a later chunk completes them. A frame
/// that fails to decode is dropped, never retried.
pub struct FrameAccumulator<C> {
    codec: C,
    buffer: BytesMut,
    max_buffered: usize,
    dropped_frames: u64,
}

impl<C: Codec> FrameAccumulator<C> {
    pub fn new(codec: C) -> Self {
        Self::with_max_buffered(codec, DEFAULT_MAX_BUFFERED)
    }

    pub fn with_max_buffered(codec: C, max_buffered: usize) -> Self {
        Self {
            codec,
            buffer: BytesMut::with_capacity(1024),
            max_buffered,
            dropped_frames: 0,
        }
    }

    /// Appends `chunk` and returns every document that is now complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedDocument> {
        self.buffer.extend_from_slice(chunk);

        let mut documents = Vec::new();
        while let Some(range) = self.codec.find_frame(&self.buffer) {
            // Drained before decoding so the same bytes are never decoded twice
            let frame = self.buffer.split_to(range.end);
            if range.start > 0 {
                debug!(skipped = range.start, "Skipped noise in front of frame");
            }
            match self.codec.decode(&frame[range.start..]) {
                Ok(document) => documents.push(document),
                Err(e) => {
                    self.dropped_frames += 1;
                    error!(
                        frame_len = range.len(),
                        frame = %hex::encode(&frame[range.start..]),
                        "Dropping undecodable frame: {e:?}"
                    );
                }
            }
        }

        if self.buffer.len() > self.max_buffered {
            let noise = self.codec.noise_prefix(&self.buffer);
            if noise > 0 {
                warn!(
                    buffered = self.buffer.len(),
                    discarded = noise,
                    "Buffer limit reached, discarding bytes that cannot start a frame"
                );
                let _ = self.buffer.split_to(noise);
            }
        }

        documents
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Frames dropped because they failed to decode
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }
}
