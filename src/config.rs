use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::broker::MqttSettings;
use crate::codec::MeterKey;
use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::reading_extractor::FieldMap;
use crate::retry::RetryPolicy;
use crate::transport::SerialSettings;

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub meter_key: MeterKey,
    pub serial: SerialSettings,
    pub mqtt: MqttSettings,
    pub field_map: FieldMap,
    pub logging: LoggingConfig,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| setting(lookup(name));

        let meter_key = var("SMART_METER_KEY").ok_or(ConfigError::Missing("SMART_METER_KEY"))?;
        let meter_key = MeterKey::from_hex(&meter_key)?;

        let port = var("COM_PORT").ok_or(ConfigError::Missing("COM_PORT"))?;
        let mut serial = SerialSettings::new(port);
        if let Some(secs) = var("SERIAL_READ_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| {
                ConfigError::invalid("SERIAL_READ_TIMEOUT_SECS", &secs, format!("{e}"))
            })?;
            serial.read_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        let mut mqtt = MqttSettings::default();
        if let Some(host) = var("MQTT_BROKER") {
            mqtt.host = host;
        }
        if let Some(port) = var("MQTT_PORT") {
            mqtt.port = port
                .parse()
                .map_err(|e| ConfigError::invalid("MQTT_PORT", &port, format!("{e}")))?;
        }
        if let Some(client_id) = var("MQTT_CLIENT_ID") {
            mqtt.client_id = client_id;
        }
        if let Some(prefix) = var("MQTT_TOPIC_PREFIX") {
            mqtt.topic_prefix = prefix.trim_end_matches('/').to_string();
        }
        if let Some(user) = var("MQTT_USER") {
            mqtt.credentials = Some((user, var("MQTT_PASSWORD").unwrap_or_default()));
        }

        let field_map = match var("FIELD_LAYOUT") {
            Some(layout) => layout.parse()?,
            None => FieldMap::default(),
        };

        let logging = LoggingConfig {
            dir: var("LOG_FILE_PATH").map(PathBuf::from),
            verbose: parse_bool_safe(lookup("VERBOSE")) || parse_bool_safe(lookup("DEBUG")),
        };

        Ok(Self {
            meter_key,
            serial,
            mqtt,
            field_map,
            logging,
            retry: RetryPolicy::default(),
        })
    }

    /// Prints the effective settings, secrets left out
    pub fn print_summary(&self) {
        println!("Smart meter config:");
        println!("  Serial device: {}", self.serial.path);
        println!(
            "  Broker: {}:{} as {}",
            self.mqtt.host, self.mqtt.port, self.mqtt.client_id
        );
        println!(
            "  Broker user: {}",
            self.mqtt
                .credentials
                .as_ref()
                .map_or("none", |(user, _)| user.as_str())
        );
        println!("  Topic prefix: {}", self.mqtt.topic_prefix);
        println!(
            "  Log directory: {}",
            self.logging
                .dir
                .as_ref()
                .map_or("none".to_string(), |dir| dir.display().to_string())
        );
        println!("  Verbose: {}", self.logging.verbose);
    }
}

/// Unset, empty and the literal `None` all mean "not configured"
fn setting(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "None")
}

/// Safely parses a boolean from an optional string, defaulting to false
fn parse_bool_safe(val: Option<String>) -> bool {
    val.unwrap_or_default()
        .to_ascii_lowercase()
        .parse()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::ReadingField;
    use crate::reading_extractor::{FieldList, FieldPosition};
    use std::collections::HashMap;

    const KEY: &str = "36C66639E48A8CA4D6BC8B282A793BBB";

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![("SMART_METER_KEY", KEY), ("COM_PORT", "/dev/ttyUSB0")]
    }

    #[test]
    fn test_parse_bool_safe() {
        // Test None input
        assert_eq!(parse_bool_safe(None), false);

        // Test empty string
        assert_eq!(parse_bool_safe(Some("".to_string())), false);

        // Test "true" variations
        assert_eq!(parse_bool_safe(Some("true".to_string())), true);
        assert_eq!(parse_bool_safe(Some("True".to_string())), true);
        assert_eq!(parse_bool_safe(Some("TRUE".to_string())), true);

        // Test invalid strings (should default to false)
        assert_eq!(parse_bool_safe(Some("yes".to_string())), false);
        assert_eq!(parse_bool_safe(Some("1".to_string())), false);
        assert_eq!(parse_bool_safe(Some("False".to_string())), false);
    }

    #[test]
    fn test_defaults() {
        let config = config(&required()).unwrap();
        assert_eq!(config.meter_key.as_bytes()[0], 0x36);
        assert_eq!(config.serial.path, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 2400);
        assert_eq!(config.serial.chunk_size, 282);
        assert_eq!(config.serial.read_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.mqtt, MqttSettings::default());
        assert_eq!(config.field_map, FieldMap::interleaved());
        assert_eq!(config.logging.dir, None);
        assert!(!config.logging.verbose);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_missing_key_or_port() {
        assert!(matches!(
            config(&[("COM_PORT", "/dev/ttyUSB0")]),
            Err(ConfigError::Missing("SMART_METER_KEY"))
        ));
        assert!(matches!(
            config(&[("SMART_METER_KEY", KEY), ("COM_PORT", "None")]),
            Err(ConfigError::Missing("COM_PORT"))
        ));
    }

    #[test]
    fn test_invalid_key_is_not_echoed() {
        let error = config(&[("SMART_METER_KEY", "not-a-key"), ("COM_PORT", "/dev/ttyUSB0")])
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "SMART_METER_KEY",
                ..
            }
        ));
        assert!(!error.to_string().contains("not-a-key"));
    }

    #[test]
    fn test_overrides() {
        let mut vars = required();
        vars.extend([
            ("MQTT_BROKER", "broker.lan"),
            ("MQTT_PORT", "8883"),
            ("MQTT_USER", "meter"),
            ("MQTT_PASSWORD", "secret"),
            ("MQTT_CLIENT_ID", "Keller"),
            ("MQTT_TOPIC_PREFIX", "home/meter/"),
            ("SERIAL_READ_TIMEOUT_SECS", "0"),
            ("FIELD_LAYOUT", "compact"),
            ("LOG_FILE_PATH", "/var/log/smartmeter"),
            ("VERBOSE", "TRUE"),
        ]);
        let config = config(&vars).unwrap();
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(
            config.mqtt.credentials,
            Some(("meter".to_string(), "secret".to_string()))
        );
        assert_eq!(config.mqtt.client_id, "Keller");
        assert_eq!(config.mqtt.topic_prefix, "home/meter");
        assert_eq!(config.serial.read_timeout, None);
        assert_eq!(
            config.field_map.position(ReadingField::PowerFactor),
            Some(FieldPosition {
                list: FieldList::UInt16,
                position: 7
            })
        );
        assert_eq!(
            config.logging.dir,
            Some(PathBuf::from("/var/log/smartmeter"))
        );
        assert!(config.logging.verbose);
    }

    #[test]
    fn test_debug_flag_enables_verbose() {
        let mut vars = required();
        vars.push(("DEBUG", "true"));
        assert!(config(&vars).unwrap().logging.verbose);
    }

    #[test]
    fn test_log_path_none_disables_logging() {
        let mut vars = required();
        vars.push(("LOG_FILE_PATH", "None"));
        assert_eq!(config(&vars).unwrap().logging.dir, None);
    }

    #[test]
    fn test_invalid_numbers() {
        let mut vars = required();
        vars.push(("MQTT_PORT", "70000"));
        assert!(matches!(
            config(&vars),
            Err(ConfigError::Invalid {
                name: "MQTT_PORT",
                ..
            })
        ));

        let mut vars = required();
        vars.push(("SERIAL_READ_TIMEOUT_SECS", "soon"));
        assert!(matches!(
            config(&vars),
            Err(ConfigError::Invalid {
                name: "SERIAL_READ_TIMEOUT_SECS",
                ..
            })
        ));
    }

    #[test]
    fn test_bad_field_layout() {
        let mut vars = required();
        vars.push(("FIELD_LAYOUT", "WirkenergieP=u32:1"));
        assert!(matches!(
            config(&vars),
            Err(ConfigError::Invalid {
                name: "FIELD_LAYOUT",
                ..
            })
        ));
    }
}
