//! Request Encoder (spec.md §4.4).
//!
//! Turns a [`CanonicalRequest`] into one or more [`AbstractFrame`]s.
//! `ls` addresses are coalesced into maximal contiguous ascending runs
//! so a list read/write emits the fewest possible Modbus ADUs; the
//! original (unsorted) `ls`→`dv` pairing is preserved by building an
//! address→value map before sorting.
//!
//! Dispatch is keyed on `kind` (the request's `(fn, dt)` family), not
//! on the wire function-code byte, so a raw `modbus` packet whose
//! first byte happens to collide with a real function code is never
//! misinterpreted downstream.

use std::collections::HashMap;

use gateway_errors::{GatewayError, Result};

use crate::validator::{CanonicalRequest, Datatype, Function};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    ReadBool,
    ReadNumeric,
    WriteBool,
    WriteNumeric,
    Diagnosis,
    Raw,
}

impl FrameKind {
    /// Number of leading bytes of the outgoing ADU that must match the
    /// corresponding bytes of the response for the response to be
    /// accepted as belonging to this frame (spec.md §4.7).
    pub fn header_len(self) -> usize {
        match self {
            FrameKind::ReadBool | FrameKind::ReadNumeric | FrameKind::Raw => 2,
            FrameKind::WriteBool | FrameKind::WriteNumeric | FrameKind::Diagnosis => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    None,
    Registers(Vec<u16>),
    Coils(Vec<bool>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractFrame {
    pub kind: FrameKind,
    pub unit_id: u8,
    pub func_code: u8,
    pub address: u16,
    pub count: u16,
    pub payload: FramePayload,
}

pub fn encode(req: &CanonicalRequest) -> Result<Vec<AbstractFrame>> {
    match req.function {
        Function::Read | Function::Write => encode_read_write(req),
        Function::Diagnosis => encode_diagnosis(req),
        Function::Modbus => encode_modbus(req),
    }
}

fn function_code(function: Function, datatype: Option<Datatype>) -> Option<u8> {
    match (function, datatype) {
        (Function::Read, Some(Datatype::BooleanOutput)) => Some(0x01),
        (Function::Read, Some(Datatype::BooleanInput)) => Some(0x02),
        (Function::Read, Some(Datatype::NumericOutput)) => Some(0x03),
        (Function::Read, Some(Datatype::NumericInput)) => Some(0x04),
        (Function::Write, Some(Datatype::BooleanOutput)) => Some(0x0F),
        (Function::Write, Some(Datatype::NumericOutput)) => Some(0x10),
        _ => None,
    }
}

fn frame_kind(function: Function, datatype: Option<Datatype>) -> Option<FrameKind> {
    match (function, datatype) {
        (Function::Read, Some(Datatype::BooleanOutput | Datatype::BooleanInput)) => {
            Some(FrameKind::ReadBool)
        }
        (Function::Read, Some(Datatype::NumericOutput | Datatype::NumericInput)) => {
            Some(FrameKind::ReadNumeric)
        }
        (Function::Write, Some(Datatype::BooleanOutput)) => Some(FrameKind::WriteBool),
        (Function::Write, Some(Datatype::NumericOutput)) => Some(FrameKind::WriteNumeric),
        _ => None,
    }
}

/// Coalesce a sorted, deduplicated address list into maximal
/// contiguous ascending runs.
fn contiguous_runs(mut addresses: Vec<i64>) -> Vec<(i64, i64)> {
    addresses.sort_unstable();
    let mut runs = Vec::new();
    let mut iter = addresses.into_iter();
    if let Some(first) = iter.next() {
        let (mut start, mut end) = (first, first);
        for addr in iter {
            if addr == end + 1 {
                end = addr;
            } else {
                runs.push((start, end));
                start = addr;
                end = addr;
            }
        }
        runs.push((start, end));
    }
    runs
}

fn address_value_map(req: &CanonicalRequest) -> Result<HashMap<i64, i64>> {
    let values = req
        .values
        .as_ref()
        .ok_or_else(|| GatewayError::Decode("encoder: write request missing values".into()))?;
    if let Some((lo, _)) = req.range {
        Ok(values
            .iter()
            .enumerate()
            .map(|(offset, &v)| (lo + offset as i64, v))
            .collect())
    } else if let Some(list) = &req.list {
        Ok(list.iter().zip(values.iter()).map(|(&a, &v)| (a, v)).collect())
    } else {
        Err(GatewayError::Decode(
            "encoder: write request has neither 'rg' nor 'ls'".into(),
        ))
    }
}

fn values_for_run(map: &HashMap<i64, i64>, lo: i64, hi: i64) -> Result<Vec<i64>> {
    let mut out = Vec::with_capacity((hi - lo + 1) as usize);
    for addr in lo..=hi {
        let v = map
            .get(&addr)
            .ok_or_else(|| GatewayError::Decode(format!("encoder: missing value for address {addr}")))?;
        out.push(*v);
    }
    Ok(out)
}

fn payload_from_values(datatype: Option<Datatype>, values: Vec<i64>) -> Result<FramePayload> {
    match datatype {
        Some(Datatype::BooleanOutput) => {
            Ok(FramePayload::Coils(values.into_iter().map(|v| v != 0).collect()))
        }
        Some(Datatype::NumericOutput) => {
            Ok(FramePayload::Registers(values.into_iter().map(|v| v as u16).collect()))
        }
        _ => Err(GatewayError::Decode(
            "encoder: unsupported datatype for write payload".into(),
        )),
    }
}

fn encode_read_write(req: &CanonicalRequest) -> Result<Vec<AbstractFrame>> {
    let code = function_code(req.function, req.datatype).ok_or_else(|| {
        GatewayError::Decode(format!(
            "encoder: no function code for {:?}/{:?}",
            req.function, req.datatype
        ))
    })?;
    let kind = frame_kind(req.function, req.datatype).ok_or_else(|| {
        GatewayError::Decode(format!(
            "encoder: no frame kind for {:?}/{:?}",
            req.function, req.datatype
        ))
    })?;
    let is_write = req.function == Function::Write;
    let value_map = if is_write {
        Some(address_value_map(req)?)
    } else {
        None
    };

    let runs: Vec<(i64, i64)> = if let Some((lo, hi)) = req.range {
        vec![(lo, hi)]
    } else {
        let list = req.list.as_ref().ok_or_else(|| {
            GatewayError::Decode("encoder: read/write request has neither 'rg' nor 'ls'".into())
        })?;
        contiguous_runs(list.clone())
    };

    let mut frames = Vec::with_capacity(runs.len());
    for (lo, hi) in runs {
        let address = lo as u16;
        let count = (hi - lo + 1) as u16;
        let payload = match &value_map {
            Some(map) => payload_from_values(req.datatype, values_for_run(map, lo, hi)?)?,
            None => FramePayload::None,
        };
        frames.push(AbstractFrame {
            kind,
            unit_id: req.id,
            func_code: code,
            address,
            count,
            payload,
        });
    }
    Ok(frames)
}

fn encode_diagnosis(req: &CanonicalRequest) -> Result<Vec<AbstractFrame>> {
    let sf = req
        .subfunction
        .ok_or_else(|| GatewayError::Decode("encoder: diagnosis request missing subfunction".into()))?;
    Ok(vec![AbstractFrame {
        kind: FrameKind::Diagnosis,
        unit_id: req.id,
        func_code: 0x08,
        address: sf.code,
        count: 0x0000,
        payload: FramePayload::None,
    }])
}

fn encode_modbus(req: &CanonicalRequest) -> Result<Vec<AbstractFrame>> {
    let packet = req
        .packet
        .clone()
        .ok_or_else(|| GatewayError::Decode("encoder: modbus request missing packet".into()))?;
    let func_code = packet.first().copied().unwrap_or(0);
    Ok(vec![AbstractFrame {
        kind: FrameKind::Raw,
        unit_id: req.id,
        func_code,
        address: 0,
        count: 0,
        payload: FramePayload::Raw(packet),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use mb_keywords::Format;
    use serde_json::{json, Map, Value};

    fn canonical(v: Value) -> CanonicalRequest {
        let map: Map<String, Value> = v.as_object().unwrap().clone();
        validate(&map, Format::Terse).unwrap()
    }

    #[test]
    fn read_range_emits_single_frame() {
        let req = canonical(json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 4]}));
        let frames = encode(&req).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].func_code, 0x03);
        assert_eq!(frames[0].address, 0);
        assert_eq!(frames[0].count, 5);
    }

    #[test]
    fn read_list_coalesces_contiguous_runs() {
        let req = canonical(json!({"id": 1, "fn": "r", "dt": "no", "ls": [0, 1, 2, 10, 11]}));
        let frames = encode(&req).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[0].address, frames[0].count), (0, 3));
        assert_eq!((frames[1].address, frames[1].count), (10, 2));
    }

    #[test]
    fn write_list_preserves_unsorted_value_alignment() {
        let req = canonical(json!({
            "id": 1, "fn": "u", "dt": "no",
            "ls": [5, 0, 1],
            "dv": [500, 0, 100]
        }));
        let frames = encode(&req).unwrap();
        assert_eq!(frames.len(), 2);
        let run_0 = frames.iter().find(|f| f.address == 0).unwrap();
        match &run_0.payload {
            FramePayload::Registers(regs) => assert_eq!(regs, &vec![0, 100]),
            _ => panic!("expected registers"),
        }
        let run_5 = frames.iter().find(|f| f.address == 5).unwrap();
        match &run_5.payload {
            FramePayload::Registers(regs) => assert_eq!(regs, &vec![500]),
            _ => panic!("expected registers"),
        }
    }

    #[test]
    fn write_bool_range_packs_coils() {
        let req = canonical(json!({"id": 1, "fn": "u", "dt": "bo", "rg": [0, 2], "dv": [1, 0, 1]}));
        let frames = encode(&req).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].func_code, 0x0F);
        match &frames[0].payload {
            FramePayload::Coils(bits) => assert_eq!(bits, &vec![true, false, true]),
            _ => panic!("expected coils"),
        }
    }

    #[test]
    fn diagnosis_emits_subfunction_code_as_address() {
        let req = canonical(json!({"id": 1, "fn": "d", "sf": "rqdt"}));
        let frames = encode(&req).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].func_code, 0x08);
        assert_eq!(frames[0].address, 0x0000);
    }

    #[test]
    fn modbus_raw_packet_passes_through() {
        let req = canonical(json!({"id": 1, "fn": "m", "pk": [0x03, 0x00, 0x01, 0x00, 0x02]}));
        let frames = encode(&req).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Raw);
        match &frames[0].payload {
            FramePayload::Raw(bytes) => assert_eq!(bytes, &vec![0x03, 0x00, 0x01, 0x00, 0x02]),
            _ => panic!("expected raw"),
        }
    }
}
