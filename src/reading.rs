use serde_derive::Serialize;
use std::fmt;

/// Every value published per cycle, in publish order.
///
/// The topic names are the ones existing dashboards subscribe to, so they stay German.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingField {
    ActiveEnergyImport,
    ActiveEnergyExport,
    InstantPowerImport,
    InstantPowerExport,
    NetPower,
    VoltageL1,
    VoltageL2,
    VoltageL3,
    CurrentL1,
    CurrentL2,
    CurrentL3,
    PowerFactor,
}

impl ReadingField {
    pub const ALL: [ReadingField; 12] = [
        ReadingField::ActiveEnergyImport,
        ReadingField::ActiveEnergyExport,
        ReadingField::InstantPowerImport,
        ReadingField::InstantPowerExport,
        ReadingField::NetPower,
        ReadingField::VoltageL1,
        ReadingField::VoltageL2,
        ReadingField::VoltageL3,
        ReadingField::CurrentL1,
        ReadingField::CurrentL2,
        ReadingField::CurrentL3,
        ReadingField::PowerFactor,
    ];

    /// Fields read from the meter document; everything except the derived net power
    pub const MEASURED: [ReadingField; 11] = [
        ReadingField::ActiveEnergyImport,
        ReadingField::ActiveEnergyExport,
        ReadingField::InstantPowerImport,
        ReadingField::InstantPowerExport,
        ReadingField::VoltageL1,
        ReadingField::VoltageL2,
        ReadingField::VoltageL3,
        ReadingField::CurrentL1,
        ReadingField::CurrentL2,
        ReadingField::CurrentL3,
        ReadingField::PowerFactor,
    ];

    /// Topic name below the configured prefix
    pub fn topic(self) -> &'static str {
        match self {
            ReadingField::ActiveEnergyImport => "WirkenergieP",
            ReadingField::ActiveEnergyExport => "WirkenergieN",
            ReadingField::InstantPowerImport => "MomentanleistungP",
            ReadingField::InstantPowerExport => "MomentanleistungN",
            ReadingField::NetPower => "Momentanleistung",
            ReadingField::VoltageL1 => "SpannungL1",
            ReadingField::VoltageL2 => "SpannungL2",
            ReadingField::VoltageL3 => "SpannungL3",
            ReadingField::CurrentL1 => "StromL1",
            ReadingField::CurrentL2 => "StromL2",
            ReadingField::CurrentL3 => "StromL3",
            ReadingField::PowerFactor => "Leistungsfaktor",
        }
    }

    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.topic() == topic)
    }

    /// Divisor turning the raw register value into engineering units
    pub fn divisor(self) -> u32 {
        match self {
            ReadingField::VoltageL1 | ReadingField::VoltageL2 | ReadingField::VoltageL3 => 10,
            ReadingField::CurrentL1 | ReadingField::CurrentL2 | ReadingField::CurrentL3 => 100,
            ReadingField::PowerFactor => 1000,
            _ => 1,
        }
    }

    /// Decimal places in the published payload
    pub fn decimals(self) -> usize {
        match self.divisor() {
            10 => 1,
            100 => 2,
            1000 => 3,
            _ => 0,
        }
    }
}

impl fmt::Display for ReadingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// One scaled snapshot of the meter, built once per decoded document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// A+ in Wh
    pub active_energy_import: u32,
    /// A- in Wh
    pub active_energy_export: u32,
    /// P+ in W
    pub instant_power_import: u32,
    /// P- in W
    pub instant_power_export: u32,
    pub voltage_l1: f64,
    pub voltage_l2: f64,
    pub voltage_l3: f64,
    pub current_l1: f64,
    pub current_l2: f64,
    pub current_l3: f64,
    pub power_factor: f64,
}

impl Reading {
    /// Import minus export, negative while feeding into the grid
    pub fn net_power(&self) -> i64 {
        i64::from(self.instant_power_import) - i64::from(self.instant_power_export)
    }

    /// Value of a field in engineering units
    pub fn value(&self, field: ReadingField) -> f64 {
        match field {
            ReadingField::ActiveEnergyImport => f64::from(self.active_energy_import),
            ReadingField::ActiveEnergyExport => f64::from(self.active_energy_export),
            ReadingField::InstantPowerImport => f64::from(self.instant_power_import),
            ReadingField::InstantPowerExport => f64::from(self.instant_power_export),
            ReadingField::NetPower => self.net_power() as f64,
            ReadingField::VoltageL1 => self.voltage_l1,
            ReadingField::VoltageL2 => self.voltage_l2,
            ReadingField::VoltageL3 => self.voltage_l3,
            ReadingField::CurrentL1 => self.current_l1,
            ReadingField::CurrentL2 => self.current_l2,
            ReadingField::CurrentL3 => self.current_l3,
            ReadingField::PowerFactor => self.power_factor,
        }
    }

    /// Payload text for a field
    pub fn payload(&self, field: ReadingField) -> String {
        match field {
            ReadingField::ActiveEnergyImport => self.active_energy_import.to_string(),
            ReadingField::ActiveEnergyExport => self.active_energy_export.to_string(),
            ReadingField::InstantPowerImport => self.instant_power_import.to_string(),
            ReadingField::InstantPowerExport => self.instant_power_export.to_string(),
            ReadingField::NetPower => self.net_power().to_string(),
            _ => format!("{:.*}", field.decimals(), self.value(field)),
        }
    }

    /// All (field, payload) pairs in publish order
    pub fn messages(&self) -> Vec<(ReadingField, String)> {
        ReadingField::ALL
            .into_iter()
            .map(|field| (field, self.payload(field)))
            .collect()
    }
}
