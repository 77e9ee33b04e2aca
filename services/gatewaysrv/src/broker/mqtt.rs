//! rumqttc-backed [`BrokerAdapter`](super::BrokerAdapter), grounded on
//! the teacher's `netsrv::network::mqtt::MqttClient` (background event
//! loop task, `AsyncClient` handle kept alongside it).
//!
//! The gateway's own MQTT client id is just its connection identity —
//! the topic's `<client>` segment is the *requesting* client's id, so
//! the gateway subscribes to the wildcard `+/+/mbnet` and fans
//! incoming field-origin (tag byte 0x01) messages out to channels
//! keyed by `<client>/<device>`, created lazily the first time either
//! a publish arrives or a lane asks to receive for that pair.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use gateway_errors::{GatewayError, Result};

use super::BrokerAdapter;

const BROKER_ORIGIN_TAG: u8 = 0x00;
const FIELD_ORIGIN_TAG: u8 = 0x01;

type ResponseSenders = DashMap<String, mpsc::UnboundedSender<Vec<u8>>>;
type ResponseReceivers = DashMap<String, Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

pub struct MqttBroker {
    client: AsyncClient,
    senders: Arc<ResponseSenders>,
    receivers: Arc<ResponseReceivers>,
}

impl MqttBroker {
    pub async fn connect(broker_url: &str, port: u16, client_id: &str) -> Result<Self> {
        let mut options = MqttOptions::new(client_id, broker_url, port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, 64);
        client
            .subscribe("+/+/mbnet", QoS::AtLeastOnce)
            .await
            .map_err(|e| GatewayError::Mqtt(e.to_string()))?;

        let senders: Arc<ResponseSenders> = Arc::new(DashMap::new());
        let receivers: Arc<ResponseReceivers> = Arc::new(DashMap::new());

        tokio::spawn(run_event_loop(
            eventloop,
            Arc::clone(&senders),
            Arc::clone(&receivers),
        ));

        Ok(Self { client, senders, receivers })
    }
}

fn lane_key(client_id: &str, device_id: &str) -> String {
    format!("{client_id}/{device_id}")
}

fn ensure_channel(
    senders: &ResponseSenders,
    receivers: &ResponseReceivers,
    key: &str,
) -> mpsc::UnboundedSender<Vec<u8>> {
    if let Some(tx) = senders.get(key) {
        return tx.clone();
    }
    let (tx, rx) = mpsc::unbounded_channel();
    match senders.entry(key.to_string()) {
        Entry::Occupied(e) => e.get().clone(),
        Entry::Vacant(e) => {
            e.insert(tx.clone());
            receivers.insert(key.to_string(), Mutex::new(rx));
            tx
        }
    }
}

/// Split a `<client>/<device>/mbnet` topic into its `<client>/<device>`
/// lane key.
fn parse_mbnet_topic(topic: &str) -> Option<String> {
    let mut parts = topic.splitn(3, '/');
    let client_id = parts.next()?;
    let device_id = parts.next()?;
    let tail = parts.next()?;
    if tail == "mbnet" {
        Some(lane_key(client_id, device_id))
    } else {
        None
    }
}

async fn run_event_loop(
    mut eventloop: rumqttc::EventLoop,
    senders: Arc<ResponseSenders>,
    receivers: Arc<ResponseReceivers>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(key) = parse_mbnet_topic(&publish.topic) else {
                    continue;
                };
                if publish.payload.first().copied() != Some(FIELD_ORIGIN_TAG) {
                    continue;
                }
                let body = publish.payload[1..].to_vec();
                let sender = ensure_channel(&senders, &receivers, &key);
                if sender.send(body).is_err() {
                    debug!(lane = %key, "no lane currently listening for this pair's responses");
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

#[async_trait]
impl BrokerAdapter for MqttBroker {
    async fn send_adu(&self, client_id: &str, device_id: &str, adu: &[u8]) -> Result<()> {
        let topic = format!("{client_id}/{device_id}/mbnet");
        let mut payload = Vec::with_capacity(1 + adu.len());
        payload.push(BROKER_ORIGIN_TAG);
        payload.extend_from_slice(adu);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| GatewayError::Mqtt(e.to_string()))
    }

    async fn recv_response(&self, client_id: &str, device_id: &str) -> Result<Vec<u8>> {
        let key = lane_key(client_id, device_id);
        ensure_channel(&self.senders, &self.receivers, &key);
        let entry = self
            .receivers
            .get(&key)
            .ok_or_else(|| GatewayError::Mqtt("response channel vanished".into()))?;
        let mut rx = entry.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| GatewayError::Mqtt("response channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_device_mbnet_topic() {
        assert_eq!(
            parse_mbnet_topic("client1/dev-a/mbnet"),
            Some("client1/dev-a".to_string())
        );
    }

    #[test]
    fn rejects_non_mbnet_topic() {
        assert_eq!(parse_mbnet_topic("client1/dev-a/request"), None);
    }

    #[test]
    fn rejects_topic_with_too_few_segments() {
        assert_eq!(parse_mbnet_topic("dev-a/mbnet"), None);
    }
}
