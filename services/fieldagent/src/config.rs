//! Field agent configuration: YAML file layered with environment
//! overrides, grounded on the teacher's `netsrv::config::load_config`
//! (shared pattern with `gatewaysrv::config`).

use anyhow::Result;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::rtu::LineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The device name this agent answers for on `+/<device>/mbnet`.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            broker: BrokerConfig::default(),
            serial: SerialConfig::default(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            port: default_broker_port(),
            client_id: default_client_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud: default_baud(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

impl SerialConfig {
    /// Project this config into the plain numbers `rtu::LineConfig`
    /// needs to derive the inter-symbol silence.
    pub fn line_config(&self) -> LineConfig {
        LineConfig {
            baud: self.baud,
            data_bits: self.data_bits,
            parity_bit: self.parity != "None",
            stop_bits: self.stop_bits,
        }
    }

    pub fn tokio_serial_parity(&self) -> tokio_serial::Parity {
        match self.parity.as_str() {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }

    pub fn tokio_serial_data_bits(&self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    pub fn tokio_serial_stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }
}

fn default_device_id() -> String {
    "dev1".to_string()
}

fn default_broker_url() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "fieldagent".to_string()
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "None".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &str) -> Result<Config> {
    let figment = Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed("FIELDAGENT_").split("_"));
    Ok(figment.extract()?)
}
