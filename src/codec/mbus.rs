//! Wired M-Bus long frames and DLMS segment chains.
//!
//! A long frame is `68 L L 68 | C A CI data.. | CS 16` where `L` counts the
//! bytes from `C` to the end of the data and `CS` is their byte sum. The CI
//! field of a DLMS segment carries the sequence number in its low nibble and
//! a final-segment flag in bit 4. STSAP and DTSAP follow the CI field.

use std::ops::Range;

use crate::error::DecodeError;

const START: u8 = 0x68;
const STOP: u8 = 0x16;
const HEADER_LEN: usize = 4;
/// Checksum and stop byte
const TRAILER_LEN: usize = 2;
/// C, A and CI fields
const CONTROL_LEN: usize = 3;
/// STSAP and DTSAP
const SAP_LEN: usize = 2;
const CI_FINAL_SEGMENT: u8 = 0x10;
const CI_SEQUENCE_MASK: u8 = 0x0F;
const MAX_SEGMENTS: usize = 16;

struct Segment<'a> {
    ci: u8,
    /// User data after the CI field
    data: &'a [u8],
    /// Total frame length on the wire
    len: usize,
}

impl Segment<'_> {
    fn is_final(&self) -> bool {
        self.ci & CI_FINAL_SEGMENT != 0
    }

    fn sequence(&self) -> u8 {
        self.ci & CI_SEQUENCE_MASK
    }
}

enum Scan<'a> {
    Valid(Segment<'a>),
    NeedMore,
    Invalid,
}

fn scan_segment(buf: &[u8]) -> Scan<'_> {
    if buf.len() < HEADER_LEN {
        return if buf.first().is_some_and(|b| *b != START) {
            Scan::Invalid
        } else {
            Scan::NeedMore
        };
    }
    let l = buf[1] as usize;
    if buf[0] != START || buf[3] != START || buf[1] != buf[2] || l < CONTROL_LEN {
        return Scan::Invalid;
    }
    let len = HEADER_LEN + l + TRAILER_LEN;
    if buf.len() < len {
        return Scan::NeedMore;
    }
    let user = &buf[HEADER_LEN..HEADER_LEN + l];
    let checksum = user.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if buf[HEADER_LEN + l] != checksum || buf[len - 1] != STOP {
        return Scan::Invalid;
    }
    Scan::Valid(Segment {
        ci: user[2],
        data: &user[CONTROL_LEN..],
        len,
    })
}

/// Length of the segment chain starting at `buf[0]`, `Err(())` if no chain starts there
fn scan_chain(buf: &[u8]) -> Result<Option<usize>, ()> {
    let mut offset = 0;
    for index in 0..MAX_SEGMENTS {
        match scan_segment(&buf[offset..]) {
            // A segment out of sequence starts the next telegram
            Scan::Valid(segment)
                if index > 0 && segment.sequence() != index as u8 & CI_SEQUENCE_MASK =>
            {
                return Ok(Some(offset));
            }
            Scan::Valid(segment) => {
                offset += segment.len;
                if segment.is_final() {
                    return Ok(Some(offset));
                }
            }
            Scan::NeedMore => return Ok(None),
            // The chain broke after at least one good segment: hand it over so
            // decoding reports it and the bytes get dropped
            Scan::Invalid if index > 0 => return Ok(Some(offset)),
            Scan::Invalid => return Err(()),
        }
    }
    Ok(Some(offset))
}

/// Finds the first complete segment chain, skipping bytes that cannot start a frame.
pub(crate) fn find_segment_chain(buf: &[u8]) -> Option<Range<usize>> {
    let mut start = 0;
    while start < buf.len() {
        start += buf[start..].iter().position(|b| *b == START)?;
        match scan_chain(&buf[start..]) {
            Ok(Some(len)) => return Some(start..start + len),
            Ok(None) => return None,
            Err(()) => start += 1,
        }
    }
    None
}

/// Length of the prefix of `buf` in which no segment chain can start.
pub(crate) fn noise_prefix(buf: &[u8]) -> usize {
    let mut start = 0;
    while start < buf.len() {
        let Some(found) = buf[start..].iter().position(|b| *b == START) else {
            return buf.len();
        };
        start += found;
        match scan_chain(&buf[start..]) {
            Ok(_) => return start,
            Err(()) => start += 1,
        }
    }
    buf.len()
}

/// Concatenates the APDU fragments of a chain returned by [`find_segment_chain`].
pub(crate) fn reassemble(frame: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let start = frame
        .iter()
        .position(|b| *b == START)
        .ok_or_else(|| DecodeError::SegmentChain("no start byte".to_string()))?;

    let mut apdu = Vec::with_capacity(frame.len());
    let mut offset = start;
    let mut expected_sequence = 0u8;
    while offset < frame.len() {
        let segment = match scan_segment(&frame[offset..]) {
            Scan::Valid(segment) => segment,
            _ => {
                return Err(DecodeError::SegmentChain(format!(
                    "invalid segment at offset {offset}"
                )))
            }
        };
        if segment.sequence() != expected_sequence {
            return Err(DecodeError::SegmentChain(format!(
                "expected segment {expected_sequence}, got {}",
                segment.sequence()
            )));
        }
        if segment.data.len() < SAP_LEN {
            return Err(DecodeError::SegmentChain(format!(
                "segment {expected_sequence} has no transport header"
            )));
        }
        apdu.extend_from_slice(&segment.data[SAP_LEN..]);
        offset += segment.len;
        if segment.is_final() {
            return Ok(apdu);
        }
        expected_sequence = (expected_sequence + 1) & CI_SEQUENCE_MASK;
    }
    Err(DecodeError::SegmentChain(
        "chain ended without a final segment".to_string(),
    ))
}
