//! Client Request envelope: the canonical form plus everything the
//! queue, decoder, and formatter need to carry a request end-to-end
//! (spec.md §3, §4.8).

use serde_json::{Map, Value};

use mb_keywords::Format;

use crate::encoder::AbstractFrame;
use crate::validator::CanonicalRequest;

/// A single in-flight client request, from arrival to decoded
/// response. One `ClientRequest` maps to one or more [`AbstractFrame`]s
/// (address-list requests may coalesce into several), each with its
/// own pre-CRC ADU and — once the field side replies — its own
/// response bytes.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub client_id: String,
    pub device_id: String,
    pub raw: Map<String, Value>,
    pub format: Format,
    pub canonical: CanonicalRequest,
    pub frames: Vec<AbstractFrame>,
    pub adus: Vec<Vec<u8>>,
    pub responses: Vec<Vec<u8>>,
    pub timed_out: bool,
}

impl ClientRequest {
    pub fn new(
        client_id: String,
        device_id: String,
        raw: Map<String, Value>,
        format: Format,
        canonical: CanonicalRequest,
        frames: Vec<AbstractFrame>,
        adus: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            client_id,
            device_id,
            raw,
            format,
            canonical,
            frames,
            adus,
            responses: Vec::new(),
            timed_out: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.timed_out || self.responses.len() == self.frames.len()
    }
}
