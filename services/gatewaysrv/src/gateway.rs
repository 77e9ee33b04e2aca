//! Gateway Glue (spec.md §4.9): wires formatter → validator → encoder
//! → bufferiser → per-device queue → decoder → formatter into the
//! single entry point the MQTT request/response topics call through.

use mb_keywords::Format;
use serde_json::{Map, Value};
use tracing::{info, warn};

use gateway_errors::{GatewayError, ValidationFailure};

use crate::bufferiser;
use crate::decoder::{self, DecodedResponse};
use crate::encoder;
use crate::formatter;
use crate::queue::DeviceQueue;
use crate::request::ClientRequest;
use crate::validator;

/// Run one client request through the full pipeline and return the
/// response object to publish back on `<client>/<device>/response`.
pub async fn handle_request(
    queue: &DeviceQueue,
    raw: Map<String, Value>,
    client_id: String,
    device_id: String,
) -> Map<String, Value> {
    let format = formatter::detect_format(&raw);
    let normalized = formatter::normalize(&raw, format);

    let canonical = match validator::validate(&normalized, format) {
        Ok(canonical) => canonical,
        Err(failure) => return validation_response(&raw, format, &failure),
    };

    let frames = match encoder::encode(&canonical) {
        Ok(frames) => frames,
        Err(err) => return error_response(&raw, format, &err),
    };

    let mut adus = Vec::with_capacity(frames.len());
    for frame in &frames {
        match bufferiser::serialize(frame) {
            Ok(bytes) => adus.push(bytes),
            Err(err) => return error_response(&raw, format, &err),
        }
    }

    info!(
        client_id = %client_id,
        device_id = %device_id,
        unit_id = canonical.id,
        frame_count = frames.len(),
        "dispatching request to device lane"
    );

    let client_request = ClientRequest::new(
        client_id.clone(),
        device_id.clone(),
        raw.clone(),
        format,
        canonical,
        frames,
        adus,
    );

    let completed = match queue.submit(client_request).await {
        Ok(completed) => completed,
        Err(err) => {
            warn!(client_id = %client_id, device_id = %device_id, error = %err, "request did not complete");
            return error_response(&raw, format, &err);
        }
    };

    let decoded = decoder::decode_response(&completed);
    decoded_response(&raw, &normalized, format, &decoded)
}

fn validation_response(raw: &Map<String, Value>, format: Format, failure: &ValidationFailure) -> Map<String, Value> {
    let mut response = Map::new();
    response.insert("status".to_string(), Value::Bool(false));
    response.insert("message".to_string(), Value::String(failure.message.clone()));
    if let Some(allowed) = &failure.allowed_values {
        response.insert(
            "allowed-values".to_string(),
            Value::Array(allowed.iter().cloned().map(Value::String).collect()),
        );
    }
    formatter::project_format(&response, raw, format)
}

fn error_response(raw: &Map<String, Value>, format: Format, err: &GatewayError) -> Map<String, Value> {
    let mut response = Map::new();
    response.insert("status".to_string(), Value::Bool(false));
    response.insert("message".to_string(), Value::String(err.response_message()));
    if let Some(allowed) = err.allowed_values() {
        response.insert(
            "allowed-values".to_string(),
            Value::Array(allowed.into_iter().map(Value::String).collect()),
        );
    }
    formatter::project_format(&response, raw, format)
}

/// Reassembles the client-facing response by cloning the canonical
/// (terse-keyed, already-normalized) request so its fields survive as
/// echoes, then adding status/message/fetched-data (spec.md §4.7).
fn decoded_response(
    raw: &Map<String, Value>,
    normalized: &Map<String, Value>,
    format: Format,
    decoded: &DecodedResponse,
) -> Map<String, Value> {
    let mut response = normalized.clone();
    response.insert("status".to_string(), Value::Bool(decoded.status));
    if let Some(message) = &decoded.message {
        response.insert("message".to_string(), Value::String(message.clone()));
    }
    if let Some(data) = &decoded.fetched_data {
        response.insert("fetched-data".to_string(), data.clone());
    }
    formatter::project_format(&response, raw, format)
}
