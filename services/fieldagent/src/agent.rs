//! Field Agent glue (spec.md §4.10): binds the `<client>/<device>/mbnet`
//! MQTT topic to the RTU exchange. Strictly single-threaded and
//! cooperative — one broker-origin message is fully handled (including
//! its blocking UART round trip) before the next is read off the
//! event loop, matching spec.md §5's field-side concurrency model.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::rtu::{self, LineConfig};

pub const BROKER_ORIGIN_TAG: u8 = 0x00;
pub const FIELD_ORIGIN_TAG: u8 = 0x01;

/// Body the field agent reports in place of a real reply when the UART
/// exchange times out or fails CRC (spec.md §6, §4.10).
pub const NULL_SENTINEL: &[u8] = b"Null";

/// Split a `<client>/<device>/mbnet` topic into `(client, device)`.
pub fn parse_mbnet_topic(topic: &str) -> Option<(String, String)> {
    let mut parts = topic.splitn(3, '/');
    let client_id = parts.next()?;
    let device_id = parts.next()?;
    let tail = parts.next()?;
    if tail == "mbnet" {
        Some((client_id.to_string(), device_id.to_string()))
    } else {
        None
    }
}

/// Handle one inbound `mbnet` publish payload (tag byte included).
/// Returns `None` if the message is field-origin (an echo of this
/// agent's own previous reply, or another agent's on a shared topic)
/// and should be ignored, per spec.md §4.10.
pub async fn handle_mbnet_payload<T>(
    serial: &mut T,
    line: LineConfig,
    payload: &[u8],
) -> Option<Vec<u8>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (&tag, pdu) = payload.split_first()?;
    if tag != BROKER_ORIGIN_TAG {
        return None;
    }

    let mut reply = vec![FIELD_ORIGIN_TAG];
    match rtu::exchange(serial, pdu, line).await {
        Ok(frame) => {
            debug!(bytes = frame.len(), "field exchange succeeded");
            reply.extend_from_slice(&frame);
        }
        Err(err) => {
            warn!(?err, "field exchange failed, reporting null sentinel");
            reply.extend_from_slice(NULL_SENTINEL);
        }
    }
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_device_mbnet_topic() {
        assert_eq!(
            parse_mbnet_topic("client1/dev-a/mbnet"),
            Some(("client1".to_string(), "dev-a".to_string()))
        );
    }

    #[test]
    fn rejects_non_mbnet_topic() {
        assert_eq!(parse_mbnet_topic("client1/dev-a/request"), None);
    }

    #[tokio::test]
    async fn ignores_field_origin_echo() {
        let (mut local, _remote) = tokio::io::duplex(64);
        let line = LineConfig {
            baud: 9600,
            data_bits: 8,
            parity_bit: false,
            stop_bits: 1,
        };
        let payload = [FIELD_ORIGIN_TAG, 0x01, 0x03, 0x00, 0x01, 0x00, 0x02];
        let result = handle_mbnet_payload(&mut local, line, &payload).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn successful_exchange_strips_tag_and_crc() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut local, mut remote) = tokio::io::duplex(256);
        let line = LineConfig {
            baud: 115_200,
            data_bits: 8,
            parity_bit: false,
            stop_bits: 1,
        };
        let remote_task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = remote.read(&mut buf).await.unwrap();
            let mut reply = vec![0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14];
            crate::crc::append(&mut reply);
            remote.write_all(&reply).await.unwrap();
        });

        let payload = [BROKER_ORIGIN_TAG, 0x01, 0x03, 0x00, 0x01, 0x00, 0x02];
        let result = handle_mbnet_payload(&mut local, line, &payload).await;
        remote_task.await.unwrap();
        assert_eq!(
            result,
            Some(vec![FIELD_ORIGIN_TAG, 0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14])
        );
    }

    #[tokio::test]
    async fn failed_exchange_reports_null_sentinel() {
        let (mut local, _remote) = tokio::io::duplex(64);
        let line = LineConfig {
            baud: 9600,
            data_bits: 8,
            parity_bit: false,
            stop_bits: 1,
        };
        let payload = [BROKER_ORIGIN_TAG, 0x01, 0x03, 0x00, 0x01, 0x00, 0x02];
        let result = handle_mbnet_payload(&mut local, line, &payload).await;
        let mut expected = vec![FIELD_ORIGIN_TAG];
        expected.extend_from_slice(NULL_SENTINEL);
        assert_eq!(result, Some(expected));
    }
}
