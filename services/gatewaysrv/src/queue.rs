//! Per-Device Request Queue (spec.md §4.8, §5).
//!
//! Each device gets its own lane: a bounded channel drained by a
//! single worker task, so at most one request is ever in flight on
//! the wire for that device and responses are matched to requests
//! purely by arrival order (Modbus RTU carries no transaction id).
//! Enqueueing past a lane's capacity surfaces synchronously as
//! [`GatewayError::QueueFull`] rather than blocking or silently
//! dropping the request.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gateway_errors::{GatewayError, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::broker::BrokerAdapter;
use crate::request::ClientRequest;

struct LaneJob {
    request: ClientRequest,
    respond_to: oneshot::Sender<ClientRequest>,
}

pub struct DeviceQueue {
    lanes: DashMap<String, mpsc::Sender<LaneJob>>,
    broker: Arc<dyn BrokerAdapter>,
    per_adu_timeout: Duration,
    lane_capacity: usize,
}

impl DeviceQueue {
    pub fn new(broker: Arc<dyn BrokerAdapter>, per_adu_timeout: Duration, lane_capacity: usize) -> Self {
        Self {
            lanes: DashMap::new(),
            broker,
            per_adu_timeout,
            lane_capacity,
        }
    }

    /// Enqueue a request on its device's lane and await the completed
    /// (possibly timed-out) request. Returns `Err(QueueFull)` if the
    /// lane is already saturated.
    pub async fn submit(&self, request: ClientRequest) -> Result<ClientRequest> {
        let device_id = request.canonical.id;
        let sender = self.lane_for(&request.device_id);
        let (respond_to, response) = oneshot::channel();
        if sender.try_send(LaneJob { request, respond_to }).is_err() {
            return Err(GatewayError::QueueFull(device_id));
        }
        response.await.map_err(|_| GatewayError::FieldFailure)
    }

    fn lane_for(&self, device_id: &str) -> mpsc::Sender<LaneJob> {
        if let Some(sender) = self.lanes.get(device_id) {
            return sender.clone();
        }
        let (sender, receiver) = mpsc::channel(self.lane_capacity);
        match self.lanes.entry(device_id.to_string()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                e.insert(sender.clone());
                let broker = Arc::clone(&self.broker);
                let per_adu_timeout = self.per_adu_timeout;
                let lane_device_id = device_id.to_string();
                tokio::spawn(run_lane(receiver, broker, per_adu_timeout, lane_device_id));
                sender
            }
        }
    }
}

async fn run_lane(
    mut receiver: mpsc::Receiver<LaneJob>,
    broker: Arc<dyn BrokerAdapter>,
    per_adu_timeout: Duration,
    device_id: String,
) {
    while let Some(job) = receiver.recv().await {
        let mut request = job.request;
        process_request(broker.as_ref(), &mut request, per_adu_timeout).await;
        if job.respond_to.send(request).is_err() {
            warn!(device_id = %device_id, "caller dropped before lane finished processing");
        }
    }
}

async fn process_request(broker: &dyn BrokerAdapter, request: &mut ClientRequest, per_adu_timeout: Duration) {
    for adu in &request.adus {
        if let Err(err) = broker.send_adu(&request.client_id, &request.device_id, adu).await {
            warn!(device_id = %request.device_id, error = %err, "failed to publish request frame");
            request.timed_out = true;
            return;
        }
        let wait = broker.recv_response(&request.client_id, &request.device_id);
        match tokio::time::timeout(per_adu_timeout, wait).await {
            Ok(Ok(bytes)) => request.responses.push(bytes),
            Ok(Err(err)) => {
                warn!(device_id = %request.device_id, error = %err, "field response error");
                request.responses.push(Vec::new());
            }
            Err(_elapsed) => {
                request.timed_out = true;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bufferiser;
    use crate::encoder::encode;
    use crate::validator::validate;
    use async_trait::async_trait;
    use mb_keywords::Format;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    struct EchoBroker {
        responses: TokioMutex<Vec<Vec<u8>>>,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl BrokerAdapter for EchoBroker {
        async fn send_adu(&self, _client_id: &str, _device_id: &str, _adu: &[u8]) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn recv_response(&self, _client_id: &str, _device_id: &str) -> Result<Vec<u8>> {
            let mut responses = self.responses.lock().await;
            Ok(responses.remove(0))
        }
    }

    /// A broker whose `recv_response` never resolves on its own, so the
    /// lane worker stays busy with whatever job it pulled until the
    /// caller's per-ADU timeout cuts it off — making lane saturation
    /// deterministic to test instead of racing real completion.
    struct StallingBroker;

    #[async_trait]
    impl BrokerAdapter for StallingBroker {
        async fn send_adu(&self, _client_id: &str, _device_id: &str, _adu: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn recv_response(&self, _client_id: &str, _device_id: &str) -> Result<Vec<u8>> {
            std::future::pending().await
        }
    }

    fn build_request(device_id: &str) -> ClientRequest {
        let raw: Map<String, Value> =
            json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 1]}).as_object().unwrap().clone();
        let canonical = validate(&raw, Format::Terse).unwrap();
        let frames = encode(&canonical).unwrap();
        let adus = frames.iter().map(|f| bufferiser::serialize(f).unwrap()).collect();
        ClientRequest::new(
            "client1".into(),
            device_id.into(),
            raw,
            Format::Terse,
            canonical,
            frames,
            adus,
        )
    }

    #[tokio::test]
    async fn completes_request_with_matching_response() {
        let broker = Arc::new(EchoBroker {
            responses: TokioMutex::new(vec![vec![0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]]),
            sent: AtomicUsize::new(0),
        });
        let queue = DeviceQueue::new(broker, Duration::from_millis(200), 4);
        let result = queue.submit(build_request("dev1")).await.unwrap();
        assert!(!result.timed_out);
        assert_eq!(result.responses.len(), 1);
    }

    #[tokio::test]
    async fn queue_full_is_surfaced_synchronously() {
        let queue = Arc::new(DeviceQueue::new(Arc::new(StallingBroker), Duration::from_millis(200), 1));

        // First job: the lane worker pulls it off the channel immediately,
        // leaving the channel's one buffer slot empty, and then stalls on
        // it for the full per-ADU timeout.
        let q1 = Arc::clone(&queue);
        let first = tokio::spawn(async move { q1.submit(build_request("dev2")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Second job: lands in the now-empty buffer slot.
        let q2 = Arc::clone(&queue);
        let second = tokio::spawn(async move { q2.submit(build_request("dev2")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Third job: both the worker and the buffer slot are occupied,
        // so this must be rejected synchronously.
        let third_result = queue.submit(build_request("dev2")).await;
        assert!(matches!(third_result, Err(GatewayError::QueueFull(_))));

        let first_result = first.await.unwrap().unwrap();
        assert!(first_result.timed_out);
        let second_result = second.await.unwrap().unwrap();
        assert!(second_result.timed_out);
    }
}
