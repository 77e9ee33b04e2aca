//! Broker transport seam (spec.md §6): the gateway only ever talks to
//! `BrokerAdapter`. Device authorization is explicitly out of scope —
//! no hook for it exists here (see DESIGN.md). The MQTT implementation
//! lives in [`mqtt`], grounded on the teacher's `netsrv` MQTT client.

use async_trait::async_trait;
use gateway_errors::Result;

/// Abstracts the pub/sub substrate a [`crate::queue::DeviceQueue`] lane
/// uses to exchange ADUs with a field device over the binary
/// `<client>/<device>/mbnet` topic. Both the requesting client's id
/// and the target device's id are part of the topic, so both are
/// threaded through every call.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Publish a single pre-CRC ADU to `<client_id>/<device_id>/mbnet`,
    /// tagged as broker-origin (spec.md §6 tag byte 0x00). The field
    /// agent is responsible for CRC, framing, and the half-duplex UART
    /// exchange.
    async fn send_adu(&self, client_id: &str, device_id: &str, adu: &[u8]) -> Result<()>;

    /// Wait indefinitely for the next field-origin (tag byte 0x01)
    /// reply on that same topic. Callers apply their own per-ADU
    /// timeout around this call; a cancelled future simply leaves the
    /// next reply to be picked up out of order, which is why only one
    /// call to `recv_response` is ever in flight per device lane.
    async fn recv_response(&self, client_id: &str, device_id: &str) -> Result<Vec<u8>>;
}

pub mod mqtt;
