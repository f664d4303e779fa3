use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::codec::Codec;
use crate::frame_accumulator::FrameAccumulator;
use crate::publish_supervisor::PublishSupervisor;
use crate::reading::Reading;
use crate::reading_extractor::ReadingExtractor;
use crate::transport::Transport;

/// What happened during one read/decode/publish cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub transport_failed: bool,
    pub documents: usize,
    pub published: usize,
    pub extraction_failures: usize,
    pub publish_failures: usize,
}

/// Drives transport reads through decoding, extraction and publishing, one stage after the other.
pub struct AcquisitionLoop<T, C, B> {
    transport: T,
    accumulator: FrameAccumulator<C>,
    extractor: ReadingExtractor,
    supervisor: PublishSupervisor<B>,
}

impl<T: Transport, C: Codec, B: Broker> AcquisitionLoop<T, C, B> {
    pub fn new(
        transport: T,
        accumulator: FrameAccumulator<C>,
        extractor: ReadingExtractor,
        supervisor: PublishSupervisor<B>,
    ) -> Self {
        Self {
            transport,
            accumulator,
            extractor,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &PublishSupervisor<B> {
        &self.supervisor
    }

    /// Runs until the process is stopped
    pub async fn run(mut self) {
        info!("Acquisition loop started");
        loop {
            self.run_cycle().await;
        }
    }

    /// Reads one chunk and handles every document it completes
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let chunk = match self.transport.read_chunk().await {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("Transport read failed: {e:?}");
                report.transport_failed = true;
                return report;
            }
        };

        for document in self.accumulator.feed(&chunk) {
            report.documents += 1;

            let reading = match self.extractor.extract(&document) {
                Ok(reading) => reading,
                Err(e) => {
                    report.extraction_failures += 1;
                    error!(invoke_id = document.invoke_id, "Skipping document: {e}");
                    continue;
                }
            };
            log_reading(&reading);

            match self.supervisor.publish(&reading).await {
                Ok(_) => report.published += 1,
                Err(e) => {
                    report.publish_failures += 1;
                    error!("Publishing reading failed: {e:?}");
                }
            }
        }

        debug!(?report, pending = self.accumulator.pending(), "Cycle done");
        report
    }
}

fn log_reading(reading: &Reading) {
    match serde_json::to_string(reading) {
        Ok(json) => info!(net_power = reading.net_power(), reading = %json, "Meter reading"),
        Err(e) => warn!("Could not serialize reading: {e}"),
    }
}
