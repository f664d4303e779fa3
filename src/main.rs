use anyhow::Context;
use smart_meter_mqtt::broker::resolve_broker_address;
use smart_meter_mqtt::logging::{self, LoggingStatus, LOGGING_DISABLED};
use smart_meter_mqtt::{
    AcquisitionLoop, Config, FrameAccumulator, MbusDlmsCodec, MqttBroker, PublishSupervisor,
    ReadingExtractor, SerialTransport,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Starting smart meter MQTT bridge");

    let config = Config::from_env().context("Invalid configuration")?;
    config.print_summary();

    // Held until exit so the file writers keep flushing
    let logging_handle = logging::init(&config.logging)?;
    match &logging_handle.status {
        LoggingStatus::Enabled(dir) => println!("Logging to {}", dir.display()),
        LoggingStatus::Disabled => {
            println!("{LOGGING_DISABLED}");
            info!("{LOGGING_DISABLED}");
        }
    }

    let broker_address = resolve_broker_address(&config.mqtt.host, config.mqtt.port).await?;
    info!(%broker_address, "Broker address resolved");

    let mut transport = SerialTransport::new(config.serial.clone(), config.retry);
    transport.open().await?;

    let supervisor = PublishSupervisor::new(
        MqttBroker::new(config.mqtt.clone()),
        config.mqtt.topic_prefix.clone(),
        config.retry,
    );
    let acquisition = AcquisitionLoop::new(
        transport,
        FrameAccumulator::new(MbusDlmsCodec::new(config.meter_key.clone())),
        ReadingExtractor::new(config.field_map.clone()),
        supervisor,
    );

    acquisition.run().await;
    Ok(())
}
