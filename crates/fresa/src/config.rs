use anyhow::{Context, Result};
use fresa_core::Machine;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Runtime configuration for fresa
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Machine limits and reference points
    #[serde(default)]
    pub machine: Machine,

    /// MQTT link to the machine controller, if any
    pub telemetry: Option<TelemetryConfig>,
}

/// MQTT broker and topics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Broker hostname or address
    #[serde(default = "default_broker_addr")]
    pub broker_addr: String,

    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    /// Topic setpoints are published to
    #[serde(default = "default_pub_topic")]
    pub pub_topic: String,

    /// Topic filter for position and tracking error feedback
    #[serde(default = "default_sub_topic")]
    pub sub_topic: String,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// How long to wait for the broker to accept the connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            broker_addr: default_broker_addr(),
            broker_port: default_broker_port(),
            pub_topic: default_pub_topic(),
            sub_topic: default_sub_topic(),
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl TelemetryConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_broker_addr() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_pub_topic() -> String {
    "fresa/setpoint".to_string()
}

fn default_sub_topic() -> String {
    "fresa/status/#".to_string()
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from a file, auto-detecting TOML or JSON format
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content).or_else(|_| Self::from_json(&content)),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config as TOML")
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse config as JSON")
    }

    pub fn validate(&self) -> Result<()> {
        self.machine.validate().context("invalid [machine] section")?;

        if let Some(telemetry) = &self.telemetry {
            if telemetry.broker_addr.is_empty() {
                anyhow::bail!("telemetry.broker_addr cannot be empty");
            }
            if telemetry.pub_topic.is_empty() || telemetry.sub_topic.is_empty() {
                anyhow::bail!("telemetry topics cannot be empty");
            }
            if telemetry.keep_alive_secs < 5 {
                anyhow::bail!("telemetry.keep_alive_secs must be at least 5");
            }
        }

        Ok(())
    }
}
