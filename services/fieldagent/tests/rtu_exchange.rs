//! End-to-end field-side scenarios (spec.md §4.10): drives
//! `agent::handle_mbnet_payload` over a `tokio::io::duplex` mock UART,
//! exercising the tag-strip, CRC, and timeout paths without real
//! hardware.

use fieldagent::agent::{handle_mbnet_payload, BROKER_ORIGIN_TAG, FIELD_ORIGIN_TAG, NULL_SENTINEL};
use fieldagent::crc;
use fieldagent::rtu::LineConfig;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

fn fast_line() -> LineConfig {
    LineConfig { baud: 115_200, data_bits: 8, parity_bit: false, stop_bits: 1 }
}

#[tokio::test]
async fn relays_a_broker_origin_request_and_tags_the_field_reply() {
    let (mut local, mut remote) = duplex(256);

    let device_task = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let n = remote.read(&mut buf).await.unwrap();
        let mut expected = vec![0x01, 0x03, 0x00, 0x01, 0x00, 0x02];
        crc::append(&mut expected);
        assert_eq!(&buf[..n], expected.as_slice());

        let mut reply = vec![0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14];
        crc::append(&mut reply);
        remote.write_all(&reply).await.unwrap();
    });

    let mut payload = vec![BROKER_ORIGIN_TAG];
    payload.extend_from_slice(&[0x01, 0x03, 0x00, 0x01, 0x00, 0x02]);

    let reply = handle_mbnet_payload(&mut local, fast_line(), &payload).await;
    device_task.await.unwrap();

    let mut expected_reply = vec![FIELD_ORIGIN_TAG];
    expected_reply.extend_from_slice(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]);
    assert_eq!(reply, Some(expected_reply));
}

#[tokio::test]
async fn a_silent_device_produces_the_null_sentinel() {
    let (mut local, _remote) = duplex(64);
    let mut payload = vec![BROKER_ORIGIN_TAG];
    payload.extend_from_slice(&[0x01, 0x03, 0x00, 0x01, 0x00, 0x02]);

    let reply = handle_mbnet_payload(&mut local, fast_line(), &payload).await;

    let mut expected = vec![FIELD_ORIGIN_TAG];
    expected.extend_from_slice(NULL_SENTINEL);
    assert_eq!(reply, Some(expected));
}

#[tokio::test]
async fn field_origin_echoes_on_the_shared_topic_are_ignored() {
    let (mut local, _remote) = duplex(64);
    let mut payload = vec![FIELD_ORIGIN_TAG];
    payload.extend_from_slice(NULL_SENTINEL);

    let reply = handle_mbnet_payload(&mut local, fast_line(), &payload).await;
    assert_eq!(reply, None);
}
