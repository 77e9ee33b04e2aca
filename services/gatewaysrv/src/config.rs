//! Gateway configuration: YAML file layered with environment
//! overrides, grounded on the teacher's `netsrv::config::load_config`.

use anyhow::Result;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            queue: QueueConfig::default(),
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
pub struct QueueConfig {
    /// How long to wait for a single ADU's response before the whole
    /// request is marked timed out (spec.md §4.8).
    #[serde(default = "default_per_adu_timeout_ms")]
    pub per_adu_timeout_ms: u64,
    /// Per-device lane capacity; requests beyond this are rejected
    /// synchronously with "Queue Full" (spec.md §9, Open Question 1).
    #[serde(default = "default_lane_capacity")]
    pub lane_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            per_adu_timeout_ms: default_per_adu_timeout_ms(),
            lane_capacity: default_lane_capacity(),
        }
    }
}

fn default_broker_url() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "gatewaysrv".to_string()
}

fn default_per_adu_timeout_ms() -> u64 {
    3000
}

fn default_lane_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &str) -> Result<Config> {
    let figment = Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed("GATEWAYSRV_").split("_"));
    Ok(figment.extract()?)
}
