//! Static keyword registry (spec.md §4.1).
//!
//! Single source of truth for the terse/verbose wire vocabulary: field
//! names, enumerated `fn`/`dt` values, and diagnostic subfunction
//! tokens. No other component may hard-code a wire name — they all
//! call through here.

/// Which vocabulary a request/response uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Terse,
    Verbose,
}

/// A terse/verbose token pair, unique within its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPair {
    pub terse: &'static str,
    pub verbose: &'static str,
}

/// The eight canonical request fields plus the four response-only
/// fields. The response-only fields (`status`, `message`,
/// `fetched-data`, `allowed-values`) have no shorter terse spelling in
/// spec.md's examples, so terse and verbose coincide for them.
pub const FIELD_TOKENS: &[TokenPair] = &[
    TokenPair { terse: "id", verbose: "identifier" },
    TokenPair { terse: "fn", verbose: "function" },
    TokenPair { terse: "dt", verbose: "datatype" },
    TokenPair { terse: "rg", verbose: "range" },
    TokenPair { terse: "ls", verbose: "list" },
    TokenPair { terse: "dv", verbose: "values" },
    TokenPair { terse: "sf", verbose: "subfunction" },
    TokenPair { terse: "pk", verbose: "packet" },
    TokenPair { terse: "status", verbose: "status" },
    TokenPair { terse: "message", verbose: "message" },
    TokenPair { terse: "fetched-data", verbose: "fetched-data" },
    TokenPair { terse: "allowed-values", verbose: "allowed-values" },
];

/// `fn` enum values.
pub const FUNCTION_TOKENS: &[TokenPair] = &[
    TokenPair { terse: "r", verbose: "read" },
    TokenPair { terse: "u", verbose: "write" },
    TokenPair { terse: "d", verbose: "diagnosis" },
    TokenPair { terse: "m", verbose: "modbus" },
];

/// `dt` enum values.
pub const DATATYPE_TOKENS: &[TokenPair] = &[
    TokenPair { terse: "bi", verbose: "boolean-input" },
    TokenPair { terse: "bo", verbose: "boolean-output" },
    TokenPair { terse: "ni", verbose: "numeric-input" },
    TokenPair { terse: "no", verbose: "numeric-output" },
];

/// A diagnostic (function 0x08) subfunction entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subfunction {
    pub terse: &'static str,
    pub verbose: &'static str,
    pub code: u16,
    /// Whether the subfunction's response carries a fetched datum
    /// (spec.md §4.6/§9: "mirrored from that table rather than
    /// hard-coded").
    pub data_fetching: bool,
}

pub const SUBFUNCTIONS: &[Subfunction] = &[
    Subfunction { terse: "rqdt", verbose: "return-query-data", code: 0x0000, data_fetching: true },
    Subfunction { terse: "restart", verbose: "restart-communications-option", code: 0x0001, data_fetching: false },
    Subfunction { terse: "rddr", verbose: "return-diagnostic-register", code: 0x0002, data_fetching: true },
    Subfunction { terse: "flom", verbose: "force-listen-only-mode", code: 0x0004, data_fetching: false },
    Subfunction { terse: "clrc", verbose: "clear-counters-and-diagnostic-register", code: 0x000A, data_fetching: false },
    Subfunction { terse: "rbmc", verbose: "return-bus-message-count", code: 0x000B, data_fetching: true },
    Subfunction { terse: "rbcec", verbose: "return-bus-communication-error-count", code: 0x000C, data_fetching: true },
    Subfunction { terse: "rbeec", verbose: "return-bus-exception-error-count", code: 0x000D, data_fetching: true },
    Subfunction { terse: "rsmc", verbose: "return-server-message-count", code: 0x000E, data_fetching: true },
    Subfunction { terse: "rsnrc", verbose: "return-server-no-response-count", code: 0x000F, data_fetching: true },
    Subfunction { terse: "rsnc", verbose: "return-server-nak-count", code: 0x0010, data_fetching: true },
    Subfunction { terse: "rsbc", verbose: "return-server-busy-count", code: 0x0011, data_fetching: true },
    Subfunction { terse: "rbco", verbose: "return-bus-char-overrun-count", code: 0x0012, data_fetching: true },
    Subfunction { terse: "clroc", verbose: "clear-overrun-counter-and-flag", code: 0x0014, data_fetching: false },
];

fn find_pair<'a>(table: &'a [TokenPair], token: &str) -> Option<&'a TokenPair> {
    table.iter().find(|p| p.terse == token || p.verbose == token)
}

/// Canonicalise any recognised field-name token (terse or verbose) to
/// its terse form. Unrecognised tokens pass through unchanged — the
/// formatter relies on the validator having already rejected the
/// request by the time an unknown token would matter (spec.md §4.1).
pub fn canonical_field(token: &str) -> String {
    find_pair(FIELD_TOKENS, token)
        .map(|p| p.terse.to_string())
        .unwrap_or_else(|| token.to_string())
}

/// Project a terse field name into the requested format.
pub fn project_field(terse_field: &str, format: Format) -> String {
    match find_pair(FIELD_TOKENS, terse_field) {
        Some(p) => match format {
            Format::Terse => p.terse.to_string(),
            Format::Verbose => p.verbose.to_string(),
        },
        None => terse_field.to_string(),
    }
}

/// Canonicalise a recognised enum value token to its terse form,
/// searching the `fn` and `dt` value tables. Returns `None` if the
/// token isn't a recognised enum value in either table (callers that
/// know which field they're looking at should use
/// [`canonical_function_value`] / [`canonical_datatype_value`]
/// instead).
pub fn canonical_enum_value(token: &str) -> Option<String> {
    find_pair(FUNCTION_TOKENS, token)
        .or_else(|| find_pair(DATATYPE_TOKENS, token))
        .map(|p| p.terse.to_string())
}

pub fn canonical_function_value(token: &str) -> Option<String> {
    find_pair(FUNCTION_TOKENS, token).map(|p| p.terse.to_string())
}

pub fn canonical_datatype_value(token: &str) -> Option<String> {
    find_pair(DATATYPE_TOKENS, token).map(|p| p.terse.to_string())
}

pub fn project_function_value(terse: &str, format: Format) -> Option<String> {
    find_pair(FUNCTION_TOKENS, terse).map(|p| match format {
        Format::Terse => p.terse.to_string(),
        Format::Verbose => p.verbose.to_string(),
    })
}

pub fn project_datatype_value(terse: &str, format: Format) -> Option<String> {
    find_pair(DATATYPE_TOKENS, terse).map(|p| match format {
        Format::Terse => p.terse.to_string(),
        Format::Verbose => p.verbose.to_string(),
    })
}

/// Look up a subfunction by either its terse or verbose token.
pub fn subfunction_by_token(token: &str) -> Option<&'static Subfunction> {
    SUBFUNCTIONS
        .iter()
        .find(|s| s.terse == token || s.verbose == token)
}

/// All registered subfunction tokens in their terse spelling, for
/// building the `allowed-values` list on a validation failure.
pub fn subfunction_terse_tokens() -> Vec<String> {
    SUBFUNCTIONS.iter().map(|s| s.terse.to_string()).collect()
}
