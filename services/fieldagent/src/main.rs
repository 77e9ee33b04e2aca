use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio_serial::SerialPortBuilderExt;
use tracing::{error, info, warn};

use fieldagent::agent;
use fieldagent::config::load_config;
use fieldagent::shutdown::wait_for_shutdown;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[clap(short, long, value_parser, default_value = "config/fieldagent.yml")]
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

    info!(device_id = %config.device_id, port = %config.serial.port, baud = config.serial.baud, "starting fieldagent");

    let mut serial = tokio_serial::new(&config.serial.port, config.serial.baud)
        .data_bits(config.serial.tokio_serial_data_bits())
        .parity(config.serial.tokio_serial_parity())
        .stop_bits(config.serial.tokio_serial_stop_bits())
        .open_native_async()?;
    #[cfg(unix)]
    serial.set_exclusive(false)?;
    let line = config.serial.line_config();

    let mut options = MqttOptions::new(
        config.broker.client_id.clone(),
        &config.broker.url,
        config.broker.port,
    );
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(options, 16);
    client
        .subscribe(format!("+/{}/mbnet", config.device_id), QoS::AtLeastOnce)
        .await?;

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("shutdown signal received");
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some((client_id, device_id)) = agent::parse_mbnet_topic(&publish.topic) else {
                            continue;
                        };
                        if device_id != config.device_id {
                            continue;
                        }
                        let Some(reply) = agent::handle_mbnet_payload(&mut serial, line, &publish.payload).await else {
                            continue;
                        };
                        let topic = format!("{client_id}/{device_id}/mbnet");
                        if let Err(err) = client.publish(topic, QoS::AtLeastOnce, false, reply).await {
                            error!(error = %err, "failed to publish field reply");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "mqtt event loop error, retrying");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }
    }

    Ok(())
}
