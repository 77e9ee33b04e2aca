//! Response Decoder (spec.md §4.7).
//!
//! Validates each response's header against the frame that produced
//! it, debufferises the data-carrying families, and reassembles
//! per-frame results into one decoded response for the client: reads
//! with `rg` are concatenated in address order, reads with `ls` are
//! re-projected into the caller's original (possibly unsorted) list
//! order, and writes/diagnosis/raw each follow their own shape.

use std::collections::HashMap;

use serde_json::Value;

use crate::debufferiser::{self, DecodeOutcome, DecodedFrame};
use crate::encoder::{AbstractFrame, FrameKind};
use crate::request::ClientRequest;
use crate::validator::Function;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    pub status: bool,
    pub message: Option<String>,
    pub fetched_data: Option<Value>,
}

#[derive(Clone, Copy)]
enum FetchedValue {
    Num(i64),
    Bool(bool),
}

fn fail_decode() -> DecodedResponse {
    DecodedResponse {
        status: false,
        message: Some("Error Retrieving Data".to_string()),
        fetched_data: None,
    }
}

fn success(fetched_data: Option<Value>) -> DecodedResponse {
    DecodedResponse {
        status: true,
        message: None,
        fetched_data,
    }
}

/// Body the field agent emits in place of a real response when its UART
/// exchange times out or the reply fails CRC (spec.md §6, §4.10).
const NULL_SENTINEL: &[u8] = b"Null";

fn header_matches(adu: &[u8], response: &[u8], k: usize) -> bool {
    adu.len() >= k && response.len() >= k && adu[..k] == response[..k]
}

pub fn decode_response(creq: &ClientRequest) -> DecodedResponse {
    if creq.timed_out {
        return DecodedResponse {
            status: false,
            message: Some("Timed Out".to_string()),
            fetched_data: None,
        };
    }
    if creq.responses.len() != creq.frames.len() {
        return fail_decode();
    }
    if creq.responses.iter().any(|r| r.as_slice() == NULL_SENTINEL) {
        return fail_decode();
    }

    match creq.canonical.function {
        Function::Diagnosis => decode_diagnosis(creq),
        Function::Modbus => decode_raw(creq),
        Function::Read => decode_read(creq),
        Function::Write => decode_write(creq),
    }
}

fn insert_values(
    map: &mut HashMap<i64, FetchedValue>,
    base_addr: u16,
    values: impl Iterator<Item = FetchedValue>,
) {
    for (i, v) in values.enumerate() {
        map.insert(base_addr as i64 + i as i64, v);
    }
}

fn decode_read(creq: &ClientRequest) -> DecodedResponse {
    let mut value_map: HashMap<i64, FetchedValue> = HashMap::new();
    for (frame, body) in creq.frames.iter().zip(creq.responses.iter()) {
        if !header_matches(adu_for(creq, frame), body, frame.kind.header_len()) {
            return fail_decode();
        }
        match debufferiser::decode(frame, body, creq.canonical.subfunction) {
            DecodeOutcome::Data(DecodedFrame::Numeric(values)) => {
                insert_values(&mut value_map, frame.address, values.into_iter().map(FetchedValue::Num))
            }
            DecodeOutcome::Data(DecodedFrame::Boolean(values)) => {
                insert_values(&mut value_map, frame.address, values.into_iter().map(FetchedValue::Bool))
            }
            _ => return fail_decode(),
        }
    }

    let addresses: Vec<i64> = if let Some((lo, hi)) = creq.canonical.range {
        (lo..=hi).collect()
    } else if let Some(list) = &creq.canonical.list {
        list.clone()
    } else {
        return fail_decode();
    };

    let mut ordered = Vec::with_capacity(addresses.len());
    for addr in addresses {
        match value_map.get(&addr) {
            Some(v) => ordered.push(*v),
            None => return fail_decode(),
        }
    }

    let fetched = Value::Array(
        ordered
            .into_iter()
            .map(|v| match v {
                FetchedValue::Num(n) => Value::Number(n.into()),
                FetchedValue::Bool(b) => Value::Bool(b),
            })
            .collect(),
    );
    success(Some(fetched))
}

fn decode_write(creq: &ClientRequest) -> DecodedResponse {
    for (frame, body) in creq.frames.iter().zip(creq.responses.iter()) {
        if !header_matches(adu_for(creq, frame), body, FrameKind::header_len(frame.kind)) {
            return fail_decode();
        }
    }
    success(None)
}

fn decode_diagnosis(creq: &ClientRequest) -> DecodedResponse {
    let (Some(frame), Some(body)) = (creq.frames.first(), creq.responses.first()) else {
        return fail_decode();
    };
    if !header_matches(adu_for(creq, frame), body, frame.kind.header_len()) {
        return fail_decode();
    }
    match debufferiser::decode(frame, body, creq.canonical.subfunction) {
        DecodeOutcome::NoData => success(None),
        DecodeOutcome::Data(DecodedFrame::Diagnostic(v)) => {
            success(Some(Value::Array(vec![Value::Number(v.into())])))
        }
        _ => fail_decode(),
    }
}

fn decode_raw(creq: &ClientRequest) -> DecodedResponse {
    let (Some(frame), Some(body)) = (creq.frames.first(), creq.responses.first()) else {
        return fail_decode();
    };
    if !header_matches(adu_for(creq, frame), body, frame.kind.header_len()) {
        return fail_decode();
    }
    let bytes = body.iter().map(|&b| Value::Number(b.into())).collect();
    success(Some(Value::Array(bytes)))
}

fn adu_for<'a>(creq: &'a ClientRequest, frame: &AbstractFrame) -> &'a [u8] {
    let idx = creq
        .frames
        .iter()
        .position(|f| std::ptr::eq(f, frame))
        .unwrap_or(0);
    creq.adus.get(idx).map(Vec::as_slice).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bufferiser;
    use crate::encoder::encode;
    use crate::validator::validate;
    use mb_keywords::Format;
    use serde_json::{json, Map};

    fn client_request(v: Value) -> ClientRequest {
        let raw: Map<String, Value> = v.as_object().unwrap().clone();
        let canonical = validate(&raw, Format::Terse).unwrap();
        let frames = encode(&canonical).unwrap();
        let adus = frames.iter().map(|f| bufferiser::serialize(f).unwrap()).collect();
        ClientRequest::new(
            "client1".into(),
            "dev1".into(),
            raw,
            Format::Terse,
            canonical,
            frames,
            adus,
        )
    }

    #[test]
    fn decodes_successful_range_read() {
        let mut creq = client_request(json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 1]}));
        creq.responses.push(vec![0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]);
        let decoded = decode_response(&creq);
        assert!(decoded.status);
        assert_eq!(decoded.fetched_data, Some(json!([10, 20])));
    }

    #[test]
    fn decodes_list_read_in_original_order() {
        let mut creq = client_request(json!({"id": 1, "fn": "r", "dt": "no", "ls": [5, 0, 1]}));
        // two coalesced frames: [0,1] and [5,5]
        creq.responses.push(vec![0x01, 0x03, 0x04, 0x00, 0x01, 0x00, 0x02]); // addr0=1, addr1=2
        creq.responses.push(vec![0x01, 0x03, 0x02, 0x00, 0x09]); // addr5=9
        let decoded = decode_response(&creq);
        assert!(decoded.status);
        assert_eq!(decoded.fetched_data, Some(json!([9, 1, 2])));
    }

    #[test]
    fn header_mismatch_fails_request() {
        let mut creq = client_request(json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 1]}));
        creq.responses.push(vec![0x02, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]);
        let decoded = decode_response(&creq);
        assert!(!decoded.status);
        assert_eq!(decoded.message.as_deref(), Some("Error Retrieving Data"));
    }

    #[test]
    fn timeout_short_circuits_before_header_check() {
        let mut creq = client_request(json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 1]}));
        creq.timed_out = true;
        let decoded = decode_response(&creq);
        assert!(!decoded.status);
        assert_eq!(decoded.message.as_deref(), Some("Timed Out"));
    }

    #[test]
    fn null_sentinel_response_fails_the_request() {
        let mut creq = client_request(json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 1]}));
        creq.responses.push(b"Null".to_vec());
        let decoded = decode_response(&creq);
        assert!(!decoded.status);
        assert_eq!(decoded.message.as_deref(), Some("Error Retrieving Data"));
    }

    #[test]
    fn write_ack_succeeds_with_no_fetched_data() {
        let mut creq = client_request(json!({"id": 1, "fn": "u", "dt": "no", "rg": [0, 1], "dv": [1, 2]}));
        creq.responses.push(vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x02]);
        let decoded = decode_response(&creq);
        assert!(decoded.status);
        assert_eq!(decoded.fetched_data, None);
    }
}
