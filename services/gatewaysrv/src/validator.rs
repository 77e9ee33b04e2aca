//! Request Validator (spec.md §4.3).
//!
//! Consumes the formatter's normalised (terse-keyed) request object and
//! produces either a [`CanonicalRequest`] ready for encoding, or the
//! first validation failure encountered. Validation is deterministic
//! and does not mutate its input — field-level checks run first
//! (structural shape of each present key), then cross-field checks run
//! per `fn` family.

use std::collections::HashSet;

use gateway_errors::ValidationFailure;
use mb_keywords::{Format, Subfunction};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Read,
    Write,
    Diagnosis,
    Modbus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    BooleanInput,
    BooleanOutput,
    NumericInput,
    NumericOutput,
}

impl Datatype {
    fn from_terse(s: &str) -> Option<Self> {
        match s {
            "bi" => Some(Datatype::BooleanInput),
            "bo" => Some(Datatype::BooleanOutput),
            "ni" => Some(Datatype::NumericInput),
            "no" => Some(Datatype::NumericOutput),
            _ => None,
        }
    }
}

/// A structurally and cross-field valid request, ready for encoding.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub id: u8,
    pub function: Function,
    pub datatype: Option<Datatype>,
    pub range: Option<(i64, i64)>,
    pub list: Option<Vec<i64>>,
    pub values: Option<Vec<i64>>,
    pub subfunction: Option<&'static Subfunction>,
    pub packet: Option<Vec<u8>>,
}

pub fn validate(
    normalized: &Map<String, Value>,
    format: Format,
) -> Result<CanonicalRequest, ValidationFailure> {
    let id = validate_id(normalized, format)?;
    let function = validate_function(normalized, format)?;
    let range = validate_range(normalized, format)?;
    let list = validate_list(normalized, format)?;
    if range.is_some() && list.is_some() {
        return Err(fail("rg", "'rg' and 'ls' are mutually exclusive", format));
    }
    let values = validate_values(normalized, format)?;
    let packet = validate_packet(normalized, format)?;
    let subfunction = validate_subfunction(normalized, format)?;
    let datatype = validate_datatype(normalized, format)?;

    let request = CanonicalRequest {
        id,
        function,
        datatype,
        range,
        list,
        values,
        subfunction,
        packet,
    };
    check_cross_field(&request, format)?;
    Ok(request)
}

fn fail(field: &str, message: &str, format: Format) -> ValidationFailure {
    ValidationFailure::new(mb_keywords::project_field(field, format), message.to_string())
}

fn fail_allowed(field: &str, message: &str, allowed: Vec<String>, format: Format) -> ValidationFailure {
    fail(field, message, format).with_allowed(allowed)
}

fn allowed_function_tokens(format: Format) -> Vec<String> {
    mb_keywords::FUNCTION_TOKENS
        .iter()
        .map(|p| match format {
            Format::Terse => p.terse.to_string(),
            Format::Verbose => p.verbose.to_string(),
        })
        .collect()
}

fn allowed_datatype_tokens(format: Format) -> Vec<String> {
    mb_keywords::DATATYPE_TOKENS
        .iter()
        .map(|p| match format {
            Format::Terse => p.terse.to_string(),
            Format::Verbose => p.verbose.to_string(),
        })
        .collect()
}

fn allowed_subfunction_tokens(format: Format) -> Vec<String> {
    mb_keywords::SUBFUNCTIONS
        .iter()
        .map(|s| match format {
            Format::Terse => s.terse.to_string(),
            Format::Verbose => s.verbose.to_string(),
        })
        .collect()
}

fn validate_id(normalized: &Map<String, Value>, format: Format) -> Result<u8, ValidationFailure> {
    let value = normalized
        .get("id")
        .ok_or_else(|| fail("id", "missing required field 'id'", format))?;
    let id = value
        .as_i64()
        .ok_or_else(|| fail("id", "'id' must be an integer", format))?;
    if !(1..=247).contains(&id) {
        return Err(fail(
            "id",
            &format!("'id' must be between 1 and 247, got {id}"),
            format,
        ));
    }
    Ok(id as u8)
}

fn validate_function(
    normalized: &Map<String, Value>,
    format: Format,
) -> Result<Function, ValidationFailure> {
    let token = normalized
        .get("fn")
        .and_then(Value::as_str)
        .ok_or_else(|| fail("fn", "missing required field 'fn'", format))?;
    match token {
        "r" => Ok(Function::Read),
        "u" => Ok(Function::Write),
        "d" => Ok(Function::Diagnosis),
        "m" => Ok(Function::Modbus),
        other => Err(fail_allowed(
            "fn",
            &format!("unknown function '{other}'"),
            allowed_function_tokens(format),
            format,
        )),
    }
}

fn validate_range(
    normalized: &Map<String, Value>,
    format: Format,
) -> Result<Option<(i64, i64)>, ValidationFailure> {
    let Some(value) = normalized.get("rg") else {
        return Ok(None);
    };
    let arr = value
        .as_array()
        .ok_or_else(|| fail("rg", "'rg' must be an array of two integers", format))?;
    if arr.len() != 2 {
        return Err(fail("rg", "'rg' must contain exactly two integers", format));
    }
    let lo = arr[0]
        .as_i64()
        .ok_or_else(|| fail("rg", "'rg' values must be integers", format))?;
    let hi = arr[1]
        .as_i64()
        .ok_or_else(|| fail("rg", "'rg' values must be integers", format))?;
    if lo >= hi {
        return Err(fail(
            "rg",
            "'rg' must be strictly ascending: lo < hi",
            format,
        ));
    }
    Ok(Some((lo, hi)))
}

fn validate_list(
    normalized: &Map<String, Value>,
    format: Format,
) -> Result<Option<Vec<i64>>, ValidationFailure> {
    let Some(value) = normalized.get("ls") else {
        return Ok(None);
    };
    let arr = value
        .as_array()
        .ok_or_else(|| fail("ls", "'ls' must be an array of integers", format))?;
    if arr.is_empty() {
        return Err(fail("ls", "'ls' must be a non-empty array", format));
    }
    let mut ints = Vec::with_capacity(arr.len());
    for item in arr {
        ints.push(
            item.as_i64()
                .ok_or_else(|| fail("ls", "'ls' values must be integers", format))?,
        );
    }
    let mut seen = HashSet::with_capacity(ints.len());
    for &i in &ints {
        if !seen.insert(i) {
            return Err(fail(
                "ls",
                &format!("'ls' must contain unique integers, duplicate {i}"),
                format,
            ));
        }
    }
    Ok(Some(ints))
}

fn validate_values(
    normalized: &Map<String, Value>,
    format: Format,
) -> Result<Option<Vec<i64>>, ValidationFailure> {
    let Some(value) = normalized.get("dv") else {
        return Ok(None);
    };
    let arr = value
        .as_array()
        .ok_or_else(|| fail("dv", "'dv' must be an array of integers", format))?;
    if arr.is_empty() {
        return Err(fail("dv", "'dv' must be a non-empty array", format));
    }
    let mut ints = Vec::with_capacity(arr.len());
    for item in arr {
        ints.push(
            item.as_i64()
                .ok_or_else(|| fail("dv", "'dv' values must be integers", format))?,
        );
    }
    Ok(Some(ints))
}

fn validate_packet(
    normalized: &Map<String, Value>,
    format: Format,
) -> Result<Option<Vec<u8>>, ValidationFailure> {
    let Some(value) = normalized.get("pk") else {
        return Ok(None);
    };
    let arr = value
        .as_array()
        .ok_or_else(|| fail("pk", "'pk' must be an array of bytes", format))?;
    let mut bytes = Vec::with_capacity(arr.len());
    for item in arr {
        let n = item
            .as_i64()
            .ok_or_else(|| fail("pk", "'pk' values must be integers", format))?;
        if !(0..=255).contains(&n) {
            return Err(fail(
                "pk",
                &format!("'pk' bytes must be in [0,255], got {n}"),
                format,
            ));
        }
        bytes.push(n as u8);
    }
    Ok(Some(bytes))
}

fn validate_subfunction(
    normalized: &Map<String, Value>,
    format: Format,
) -> Result<Option<&'static Subfunction>, ValidationFailure> {
    let Some(value) = normalized.get("sf") else {
        return Ok(None);
    };
    let token = value
        .as_str()
        .ok_or_else(|| fail("sf", "'sf' must be a string", format))?;
    let sf = mb_keywords::subfunction_by_token(token).ok_or_else(|| {
        fail_allowed(
            "sf",
            &format!("unknown subfunction '{token}'"),
            allowed_subfunction_tokens(format),
            format,
        )
    })?;
    Ok(Some(sf))
}

fn validate_datatype(
    normalized: &Map<String, Value>,
    format: Format,
) -> Result<Option<Datatype>, ValidationFailure> {
    let Some(value) = normalized.get("dt") else {
        return Ok(None);
    };
    let token = value
        .as_str()
        .ok_or_else(|| fail("dt", "'dt' must be a string", format))?;
    let dt = Datatype::from_terse(token).ok_or_else(|| {
        fail_allowed(
            "dt",
            &format!("unknown datatype '{token}'"),
            allowed_datatype_tokens(format),
            format,
        )
    })?;
    Ok(Some(dt))
}

fn check_cross_field(req: &CanonicalRequest, format: Format) -> Result<(), ValidationFailure> {
    match req.function {
        Function::Read => {
            if req.range.is_none() && req.list.is_none() {
                return Err(fail(
                    "rg",
                    "read requires exactly one of 'rg' or 'ls'",
                    format,
                ));
            }
            if req.values.is_some() {
                return Err(fail("dv", "'dv' must be absent for read", format));
            }
            if req.subfunction.is_some() {
                return Err(fail("sf", "'sf' must be absent for read", format));
            }
            if req.packet.is_some() {
                return Err(fail("pk", "'pk' must be absent for read", format));
            }
            if req.datatype.is_none() {
                return Err(fail("dt", "'dt' is required for read", format));
            }
        }
        Function::Write => {
            if req.range.is_none() && req.list.is_none() {
                return Err(fail(
                    "rg",
                    "write requires exactly one of 'rg' or 'ls'",
                    format,
                ));
            }
            let expected_len = match req.range {
                Some((lo, hi)) => (hi - lo + 1) as usize,
                None => req.list.as_ref().map(Vec::len).unwrap_or(0),
            };
            match &req.values {
                None => return Err(fail("dv", "'dv' is required for write", format)),
                Some(v) if v.len() != expected_len => {
                    return Err(fail(
                        "dv",
                        &format!(
                            "'dv' length {} does not match target size {expected_len}",
                            v.len()
                        ),
                        format,
                    ))
                }
                _ => {}
            }
            match req.datatype {
                Some(Datatype::BooleanOutput) | Some(Datatype::NumericOutput) => {}
                _ => {
                    return Err(fail_allowed(
                        "dt",
                        "'dt' must be boolean-output or numeric-output for write",
                        vec![
                            mb_keywords::project_datatype_value("bo", format).unwrap_or_default(),
                            mb_keywords::project_datatype_value("no", format).unwrap_or_default(),
                        ],
                        format,
                    ))
                }
            }
            if req.subfunction.is_some() {
                return Err(fail("sf", "'sf' must be absent for write", format));
            }
            if req.packet.is_some() {
                return Err(fail("pk", "'pk' must be absent for write", format));
            }
        }
        Function::Diagnosis => {
            if req.subfunction.is_none() {
                return Err(fail("sf", "diagnosis requires 'sf'", format));
            }
            if req.values.is_some() {
                return Err(fail("dv", "'dv' must be absent for diagnosis", format));
            }
            if req.datatype.is_some() {
                return Err(fail("dt", "'dt' must be absent for diagnosis", format));
            }
            if req.range.is_some() {
                return Err(fail("rg", "'rg' must be absent for diagnosis", format));
            }
            if req.list.is_some() {
                return Err(fail("ls", "'ls' must be absent for diagnosis", format));
            }
            if req.packet.is_some() {
                return Err(fail("pk", "'pk' must be absent for diagnosis", format));
            }
        }
        Function::Modbus => {
            if req.packet.is_none() {
                return Err(fail("pk", "modbus requires 'pk'", format));
            }
            if req.datatype.is_some()
                || req.range.is_some()
                || req.list.is_some()
                || req.values.is_some()
                || req.subfunction.is_some()
            {
                return Err(fail(
                    "pk",
                    "a raw 'modbus' request must carry only 'pk'",
                    format,
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn rejects_id_out_of_range() {
        let req = obj(json!({"id": 500, "fn": "r", "dt": "bo", "rg": [0, 4]}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "id");
    }

    #[test]
    fn rejects_missing_function() {
        let req = obj(json!({"id": 1}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "fn");
    }

    #[test]
    fn accepts_well_formed_read_range_request() {
        let req = obj(json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 4]}));
        let canonical = validate(&req, Format::Terse).unwrap();
        assert_eq!(canonical.id, 1);
        assert_eq!(canonical.function, Function::Read);
        assert_eq!(canonical.range, Some((0, 4)));
    }

    #[test]
    fn rejects_rg_and_ls_together() {
        let req = obj(json!({"id": 1, "fn": "r", "dt": "no", "rg": [0, 4], "ls": [1, 2]}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "rg");
    }

    #[test]
    fn rejects_duplicate_list_entries() {
        let req = obj(json!({"id": 1, "fn": "r", "dt": "no", "ls": [1, 1, 2]}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "ls");
    }

    #[test]
    fn write_requires_matching_value_count() {
        let req = obj(json!({"id": 1, "fn": "u", "dt": "no", "rg": [0, 2], "dv": [1, 2]}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "dv");
    }

    #[test]
    fn write_accepts_matching_value_count() {
        let req = obj(json!({"id": 1, "fn": "u", "dt": "no", "rg": [0, 2], "dv": [1, 2, 3]}));
        let canonical = validate(&req, Format::Terse).unwrap();
        assert_eq!(canonical.values, Some(vec![1, 2, 3]));
    }

    #[test]
    fn write_rejects_input_datatype() {
        let req = obj(json!({"id": 1, "fn": "u", "dt": "ni", "rg": [0, 0], "dv": [1]}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "dt");
    }

    #[test]
    fn diagnosis_requires_subfunction() {
        let req = obj(json!({"id": 1, "fn": "d"}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "sf");
    }

    #[test]
    fn diagnosis_accepts_known_subfunction() {
        let req = obj(json!({"id": 1, "fn": "d", "sf": "rqdt"}));
        let canonical = validate(&req, Format::Terse).unwrap();
        assert_eq!(canonical.subfunction.unwrap().terse, "rqdt");
    }

    #[test]
    fn modbus_requires_packet_only() {
        let req = obj(json!({"id": 1, "fn": "m", "pk": [1, 3, 0, 1, 0, 2]}));
        let canonical = validate(&req, Format::Terse).unwrap();
        assert_eq!(canonical.packet, Some(vec![1, 3, 0, 1, 0, 2]));
    }

    #[test]
    fn modbus_rejects_extra_fields() {
        let req = obj(json!({"id": 1, "fn": "m", "pk": [1, 3], "dt": "no"}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "pk");
    }

    #[test]
    fn rejects_packet_byte_out_of_range() {
        let req = obj(json!({"id": 1, "fn": "m", "pk": [1, 300]}));
        let err = validate(&req, Format::Terse).unwrap_err();
        assert_eq!(err.field, "pk");
    }
}
