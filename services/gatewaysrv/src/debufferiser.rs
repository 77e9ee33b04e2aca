//! Response Debufferiser (spec.md §4.6).
//!
//! Parses the data portion of a field response for a single
//! [`AbstractFrame`]. Distinguishes "nothing to fetch, still a
//! success" ([`DecodeOutcome::NoData`] — write acks, non-data-fetching
//! diagnostics) from "malformed, mark the whole request failed"
//! ([`DecodeOutcome::Error`]).

use mb_keywords::Subfunction;

use crate::encoder::{AbstractFrame, FrameKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    Numeric(Vec<i64>),
    Boolean(Vec<bool>),
    Diagnostic(i64),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    NoData,
    Data(DecodedFrame),
    Error,
}

pub fn decode(frame: &AbstractFrame, body: &[u8], subfunction: Option<&'static Subfunction>) -> DecodeOutcome {
    match frame.kind {
        FrameKind::ReadBool => decode_bool(frame, body),
        FrameKind::ReadNumeric => decode_numeric(frame, body),
        FrameKind::WriteBool | FrameKind::WriteNumeric => DecodeOutcome::NoData,
        FrameKind::Diagnosis => decode_diagnosis(body, subfunction),
        FrameKind::Raw => DecodeOutcome::Data(DecodedFrame::Raw(body.to_vec())),
    }
}

fn decode_bool(frame: &AbstractFrame, body: &[u8]) -> DecodeOutcome {
    if body.len() < 3 {
        return DecodeOutcome::Error;
    }
    let byte_count = body[2] as usize;
    let Some(data) = body.get(3..3 + byte_count) else {
        return DecodeOutcome::Error;
    };
    let count = frame.count as usize;
    if data.len() * 8 < count {
        return DecodeOutcome::Error;
    }
    let bits = (0..count)
        .map(|i| (data[i / 8] >> (i % 8)) & 1 == 1)
        .collect();
    DecodeOutcome::Data(DecodedFrame::Boolean(bits))
}

fn decode_numeric(frame: &AbstractFrame, body: &[u8]) -> DecodeOutcome {
    if body.len() < 3 {
        return DecodeOutcome::Error;
    }
    let byte_count = body[2] as usize;
    let Some(data) = body.get(3..3 + byte_count) else {
        return DecodeOutcome::Error;
    };
    let count = frame.count as usize;
    if data.len() < count * 2 {
        return DecodeOutcome::Error;
    }
    let values = (0..count)
        .map(|i| u16::from_be_bytes([data[i * 2], data[i * 2 + 1]]) as i64)
        .collect();
    DecodeOutcome::Data(DecodedFrame::Numeric(values))
}

fn decode_diagnosis(body: &[u8], subfunction: Option<&'static Subfunction>) -> DecodeOutcome {
    let Some(sf) = subfunction else {
        return DecodeOutcome::Error;
    };
    if !sf.data_fetching {
        return DecodeOutcome::NoData;
    }
    if body.len() < 6 {
        return DecodeOutcome::Error;
    }
    let datum = u16::from_be_bytes([body[4], body[5]]) as i64;
    DecodeOutcome::Data(DecodedFrame::Diagnostic(datum))
}
