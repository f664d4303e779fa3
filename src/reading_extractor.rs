//! Positional field extraction from decoded meter documents.
//!
//! Meters report their registers as an ordered sequence of tagged values without
//! names. Which uint32/uint16 occurrence holds which quantity depends on the
//! meter firmware, so the positions live in a [`FieldMap`].

use std::fmt;
use std::str::FromStr;

use crate::codec::DecodedDocument;
use crate::error::{ConfigError, ExtractionError};
use crate::reading::{Reading, ReadingField};

/// The typed field sequence a position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldList {
    UInt32,
    UInt16,
}

impl fmt::Display for FieldList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldList::UInt32 => f.write_str("u32"),
            FieldList::UInt16 => f.write_str("u16"),
        }
    }
}

/// 1-based occurrence of a tag type within the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPosition {
    pub list: FieldList,
    pub position: usize,
}

impl FieldPosition {
    pub const fn u32(position: usize) -> Self {
        Self {
            list: FieldList::UInt32,
            position,
        }
    }

    pub const fn u16(position: usize) -> Self {
        Self {
            list: FieldList::UInt16,
            position,
        }
    }
}

/// Mapping of every measured field to its position in the document.
///
/// Positions are stored in [`ReadingField::MEASURED`] order, so every field has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    positions: [FieldPosition; ReadingField::MEASURED.len()],
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::interleaved()
    }
}

impl FieldMap {
    /// Builds a map, requiring each measured field exactly once
    pub fn new(entries: Vec<(ReadingField, FieldPosition)>) -> Result<Self, String> {
        if let Some((field, _)) = entries
            .iter()
            .find(|(f, _)| !ReadingField::MEASURED.contains(f))
        {
            return Err(format!("{field} is derived and cannot be mapped"));
        }
        if let Some((field, _)) = entries.iter().find(|(_, p)| p.position == 0) {
            return Err(format!("{field}: positions start at 1"));
        }

        let mut positions = [FieldPosition::u32(1); ReadingField::MEASURED.len()];
        for (slot, field) in ReadingField::MEASURED.into_iter().enumerate() {
            let mut mapped = entries.iter().filter(|(f, _)| *f == field);
            positions[slot] = match (mapped.next(), mapped.next()) {
                (Some((_, position)), None) => *position,
                (None, _) => return Err(format!("no position for {field}")),
                (Some(_), Some(_)) => return Err(format!("{field} mapped more than once")),
            };
        }
        Ok(Self { positions })
    }

    /// Every fourth occurrence: uint32 #1/5/9/13, uint16 #1/5/.../25
    pub fn interleaved() -> Self {
        Self {
            positions: [
                FieldPosition::u32(1),
                FieldPosition::u32(5),
                FieldPosition::u32(9),
                FieldPosition::u32(13),
                FieldPosition::u16(1),
                FieldPosition::u16(5),
                FieldPosition::u16(9),
                FieldPosition::u16(13),
                FieldPosition::u16(17),
                FieldPosition::u16(21),
                FieldPosition::u16(25),
            ],
        }
    }

    /// Consecutive occurrences: uint32 #1-4, uint16 #1-7
    pub fn compact() -> Self {
        Self {
            positions: [
                FieldPosition::u32(1),
                FieldPosition::u32(2),
                FieldPosition::u32(3),
                FieldPosition::u32(4),
                FieldPosition::u16(1),
                FieldPosition::u16(2),
                FieldPosition::u16(3),
                FieldPosition::u16(4),
                FieldPosition::u16(5),
                FieldPosition::u16(6),
                FieldPosition::u16(7),
            ],
        }
    }

    /// `None` for the derived net power
    pub fn position(&self, field: ReadingField) -> Option<FieldPosition> {
        self.entries()
            .find(|(f, _)| *f == field)
            .map(|(_, position)| position)
    }

    /// (field, position) pairs in [`ReadingField::MEASURED`] order
    pub fn entries(&self) -> impl Iterator<Item = (ReadingField, FieldPosition)> + '_ {
        ReadingField::MEASURED
            .into_iter()
            .zip(self.positions.iter().copied())
    }
}

impl FromStr for FieldMap {
    type Err = ConfigError;

    /// `interleaved`, `compact` or `Topic=u32:N,Topic=u16:N,...`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::invalid("FIELD_LAYOUT", s, reason);
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "interleaved" => return Ok(Self::interleaved()),
            "compact" => return Ok(Self::compact()),
            _ => {}
        }

        let mut entries = Vec::new();
        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (topic, position) = item
                .split_once('=')
                .ok_or_else(|| invalid(format!("'{item}' is not Topic=list:position")))?;
            let field = ReadingField::from_topic(topic.trim())
                .ok_or_else(|| invalid(format!("unknown field '{topic}'")))?;
            let (list, index) = position
                .split_once(':')
                .ok_or_else(|| invalid(format!("'{position}' is not list:position")))?;
            let list = match list.trim() {
                "u32" => FieldList::UInt32,
                "u16" => FieldList::UInt16,
                other => return Err(invalid(format!("unknown list '{other}'"))),
            };
            let position = index
                .trim()
                .parse()
                .map_err(|e| invalid(format!("bad position '{index}': {e}")))?;
            entries.push((field, FieldPosition { list, position }));
        }
        Self::new(entries).map_err(invalid)
    }
}

/// Turns decoded documents into scaled [`Reading`]s.
#[derive(Debug, Clone, Default)]
pub struct ReadingExtractor {
    map: FieldMap,
}

impl ReadingExtractor {
    pub fn new(map: FieldMap) -> Self {
        Self { map }
    }

    pub fn extract(&self, document: &DecodedDocument) -> Result<Reading, ExtractionError> {
        let uint32s = document.uint32_fields();
        let uint16s: Vec<u32> = document
            .uint16_fields()
            .into_iter()
            .map(u32::from)
            .collect();

        let mut raw = [0u32; ReadingField::MEASURED.len()];
        for (slot, (field, FieldPosition { list, position })) in self.map.entries().enumerate() {
            let values = match list {
                FieldList::UInt32 => &uint32s,
                FieldList::UInt16 => &uint16s,
            };
            raw[slot] = values
                .get(position - 1)
                .copied()
                .ok_or(ExtractionError::MissingField {
                    field,
                    list,
                    position,
                    available: values.len(),
                })?;
        }

        // Slots follow ReadingField::MEASURED
        let scaled =
            |slot: usize| f64::from(raw[slot]) / f64::from(ReadingField::MEASURED[slot].divisor());
        Ok(Reading {
            active_energy_import: raw[0],
            active_energy_export: raw[1],
            instant_power_import: raw[2],
            instant_power_export: raw[3],
            voltage_l1: scaled(4),
            voltage_l2: scaled(5),
            voltage_l3: scaled(6),
            current_l1: scaled(7),
            current_l2: scaled(8),
            current_l3: scaled(9),
            power_factor: scaled(10),
        })
    }
}
