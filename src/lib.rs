//! Smart Meter MQTT Bridge Library
//!
//! Reads encrypted push telegrams from a smart meter's customer interface over a
//! serial dongle, decodes them into readings and publishes every value to an MQTT broker.

pub mod acquisition_loop;
pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame_accumulator;
pub mod logging;
pub mod publish_supervisor;
pub mod reading;
pub mod reading_extractor;
pub mod retry;
pub mod transport;

// Re-export commonly used types for easier access
pub use acquisition_loop::{AcquisitionLoop, CycleReport};
pub use broker::{Broker, MqttBroker, MqttSettings};
pub use codec::{Codec, DecodedDocument, MbusDlmsCodec, MeterKey};
pub use config::Config;
pub use frame_accumulator::FrameAccumulator;
pub use publish_supervisor::PublishSupervisor;
pub use reading::{Reading, ReadingField};
pub use reading_extractor::{FieldMap, ReadingExtractor};
pub use retry::RetryPolicy;
pub use transport::{SerialSettings, SerialTransport, Transport};
