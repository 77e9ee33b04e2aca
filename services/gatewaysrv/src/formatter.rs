//! Request Formatter (spec.md §4.2).
//!
//! Detects terse vs verbose wire format, normalises an inbound request
//! into the terse canonical form, and re-projects a response back into
//! the caller's original vocabulary.

use mb_keywords::Format;
use serde_json::{Map, Value};

/// The eight canonical request field names, in terse spelling.
const REQUEST_FIELDS: &[&str] = &["id", "fn", "dt", "rg", "ls", "dv", "sf", "pk"];

/// Detect format from the discriminator field: presence of `id`
/// implies terse, presence of `identifier` implies verbose.
pub fn detect_format(raw: &Map<String, Value>) -> Format {
    if raw.contains_key("id") {
        Format::Terse
    } else {
        Format::Verbose
    }
}

/// Normalise an inbound request into the terse canonical form: field
/// names become terse, and string values that are recognised enum
/// tokens (for `fn`/`dt`/`sf`) become their terse spelling. Unknown
/// tokens are kept verbatim — the validator is responsible for
/// rejecting them.
pub fn normalize(raw: &Map<String, Value>, format: Format) -> Map<String, Value> {
    let mut out = Map::new();
    for &field in REQUEST_FIELDS {
        let key = mb_keywords::project_field(field, format);
        if let Some(value) = raw.get(&key) {
            out.insert(field.to_string(), canonicalize_value(field, value));
        }
    }
    out
}

fn canonicalize_value(field: &str, value: &Value) -> Value {
    if let Value::String(s) = value {
        let canonical = match field {
            "fn" => mb_keywords::canonical_function_value(s),
            "dt" => mb_keywords::canonical_datatype_value(s),
            "sf" => mb_keywords::subfunction_by_token(s).map(|sf| sf.terse.to_string()),
            _ => None,
        };
        if let Some(c) = canonical {
            return Value::String(c);
        }
    }
    value.clone()
}

/// Project a terse-keyed response back into the caller's original
/// vocabulary. For each key in the response: if the original request
/// carried a value at the projected key, that original value is
/// echoed verbatim (preserving exact casing/spelling); otherwise the
/// new value is projected into the requested format.
pub fn project_format(
    response: &Map<String, Value>,
    original: &Map<String, Value>,
    format: Format,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (terse_key, value) in response {
        let projected_key = mb_keywords::project_field(terse_key, format);
        if let Some(original_value) = original.get(&projected_key) {
            out.insert(projected_key, original_value.clone());
        } else {
            out.insert(projected_key, project_value(terse_key, value, format));
        }
    }
    out
}

fn project_value(terse_key: &str, value: &Value, format: Format) -> Value {
    if let Value::String(s) = value {
        let projected = match terse_key {
            "fn" => mb_keywords::project_function_value(s, format),
            "dt" => mb_keywords::project_datatype_value(s, format),
            "sf" => mb_keywords::subfunction_by_token(s).map(|sf| match format {
                Format::Terse => sf.terse.to_string(),
                Format::Verbose => sf.verbose.to_string(),
            }),
            _ => None,
        };
        if let Some(p) = projected {
            return Value::String(p);
        }
    }
    value.clone()
}
