use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use tracing::{error, info, warn};

use gatewaysrv::broker::mqtt::MqttBroker;
use gatewaysrv::config::load_config;
use gatewaysrv::gateway;
use gatewaysrv::queue::DeviceQueue;
use gatewaysrv::shutdown::wait_for_shutdown;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[clap(short, long, value_parser, default_value = "config/gatewaysrv.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args.config.to_string_lossy()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    info!(broker_url = %config.broker.url, client_id = %config.broker.client_id, "starting gatewaysrv");

    let field_broker = Arc::new(
        MqttBroker::connect(&config.broker.url, config.broker.port, &config.broker.client_id).await?,
    );
    let queue = Arc::new(DeviceQueue::new(
        field_broker,
        Duration::from_millis(config.queue.per_adu_timeout_ms),
        config.queue.lane_capacity,
    ));

    let mut options = MqttOptions::new(
        format!("{}-front", config.broker.client_id),
        &config.broker.url,
        config.broker.port,
    );
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(options, 64);
    client.subscribe("+/+/request", QoS::AtLeastOnce).await?;

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("shutdown signal received, draining in-flight requests");
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some((client_id, device_id)) = parse_request_topic(&publish.topic) else {
                            continue;
                        };
                        let Ok(raw) = serde_json::from_slice::<Value>(&publish.payload) else {
                            warn!(topic = %publish.topic, "request payload was not valid JSON");
                            continue;
                        };
                        let Some(raw) = raw.as_object().cloned() else {
                            warn!(topic = %publish.topic, "request payload was not a JSON object");
                            continue;
                        };
                        let queue = Arc::clone(&queue);
                        let client = client.clone();
                        tokio::spawn(async move {
                            let response = gateway::handle_request(&queue, raw, client_id.clone(), device_id.clone()).await;
                            let topic = format!("{client_id}/{device_id}/response");
                            if let Ok(body) = serde_json::to_vec(&response) {
                                if let Err(err) = client.publish(topic, QoS::AtLeastOnce, false, body).await {
                                    error!(error = %err, "failed to publish response");
                                }
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "front-end mqtt event loop error, retrying");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Split a `<client>/<device>/request` topic into `(client, device)`.
fn parse_request_topic(topic: &str) -> Option<(String, String)> {
    let mut parts = topic.splitn(3, '/');
    let client_id = parts.next()?;
    let device_id = parts.next()?;
    let tail = parts.next()?;
    if tail == "request" {
        Some((client_id.to_string(), device_id.to_string()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_topic() {
        assert_eq!(
            parse_request_topic("client1/dev-a/request"),
            Some(("client1".to_string(), "dev-a".to_string()))
        );
    }

    #[test]
    fn rejects_non_request_topic() {
        assert_eq!(parse_request_topic("client1/dev-a/response"), None);
    }
}
