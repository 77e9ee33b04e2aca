//! Request Bufferiser (spec.md §4.5).
//!
//! Serialises an [`AbstractFrame`] into the pre-CRC Modbus ADU bytes
//! that the field agent appends a CRC-16 to and puts on the wire.

use gateway_errors::{GatewayError, Result};

use crate::encoder::{AbstractFrame, FrameKind, FramePayload};

pub fn serialize(frame: &AbstractFrame) -> Result<Vec<u8>> {
    if let FramePayload::Raw(bytes) = &frame.payload {
        let mut buf = Vec::with_capacity(1 + bytes.len());
        buf.push(frame.unit_id);
        buf.extend_from_slice(bytes);
        return Ok(buf);
    }

    let mut buf = Vec::new();
    buf.push(frame.unit_id);
    buf.push(frame.func_code);

    match frame.kind {
        FrameKind::Diagnosis => {
            buf.extend_from_slice(&frame.address.to_be_bytes());
            buf.extend_from_slice(&frame.count.to_be_bytes());
        }
        FrameKind::WriteBool => {
            let FramePayload::Coils(coils) = &frame.payload else {
                return Err(GatewayError::Decode(
                    "bufferiser: write-bool frame missing coil payload".into(),
                ));
            };
            buf.extend_from_slice(&frame.address.to_be_bytes());
            buf.extend_from_slice(&frame.count.to_be_bytes());
            let byte_count = coils.len().div_ceil(8);
            buf.push(byte_count as u8);
            let mut packed = vec![0u8; byte_count];
            for (i, &bit) in coils.iter().enumerate() {
                if bit {
                    packed[i / 8] |= 1 << (i % 8);
                }
            }
            buf.extend_from_slice(&packed);
        }
        FrameKind::WriteNumeric => {
            let FramePayload::Registers(regs) = &frame.payload else {
                return Err(GatewayError::Decode(
                    "bufferiser: write-numeric frame missing register payload".into(),
                ));
            };
            buf.extend_from_slice(&frame.address.to_be_bytes());
            buf.extend_from_slice(&frame.count.to_be_bytes());
            buf.push((regs.len() * 2) as u8);
            for r in regs {
                buf.extend_from_slice(&r.to_be_bytes());
            }
        }
        FrameKind::ReadBool | FrameKind::ReadNumeric => {
            buf.extend_from_slice(&frame.address.to_be_bytes());
            buf.extend_from_slice(&frame.count.to_be_bytes());
        }
        FrameKind::Raw => unreachable!("handled above via FramePayload::Raw"),
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use crate::validator::validate;
    use mb_keywords::Format;
    use serde_json::{json, Map, Value};

    fn frame(v: Value) -> AbstractFrame {
        let map: Map<String, Value> = v.as_object().unwrap().clone();
        let req = validate(&map, Format::Terse).unwrap();
        encode(&req).unwrap().remove(0)
    }

    #[test]
    fn serializes_read_holding_registers_request() {
        let f = frame(json!({"id": 1, "fn": "r", "dt": "no", "rg": [1, 2]}));
        let bytes = serialize(&f).unwrap();
        assert_eq!(bytes, vec![0x01, 0x03, 0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn serializes_write_single_coil_run() {
        let f = frame(json!({"id": 1, "fn": "u", "dt": "bo", "rg": [0, 1], "dv": [1, 0]}));
        let bytes = serialize(&f).unwrap();
        assert_eq!(bytes[0..2], [0x01, 0x0F]);
        assert_eq!(bytes[2..4], [0x00, 0x00]);
        assert_eq!(bytes[4..6], [0x00, 0x02]);
        assert_eq!(bytes[6], 0x01);
        assert_eq!(bytes[7], 0b0000_0001);
    }

    #[test]
    fn serializes_diagnosis_request() {
        let f = frame(json!({"id": 1, "fn": "d", "sf": "rqdt"}));
        let bytes = serialize(&f).unwrap();
        assert_eq!(bytes, vec![0x01, 0x08, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn serializes_raw_modbus_packet_verbatim() {
        let f = frame(json!({"id": 1, "fn": "m", "pk": [0x03, 0x00, 0x01, 0x00, 0x02]}));
        let bytes = serialize(&f).unwrap();
        assert_eq!(bytes, vec![0x01, 0x03, 0x00, 0x01, 0x00, 0x02]);
    }
}
