//! Normalization of raw provider responses into [`ParsedResponse`]s

pub mod coerce;
pub mod prompt;
pub mod pseudo;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::catalog::NameMap;
use crate::transport::RawResponse;
use crate::types::{FunctionCall, ParsedResponse, Usage};

/// Phrases that mark a provider-side failure inside an otherwise ordinary payload
pub const SENTINEL_PHRASES: &[&str] = &["JSON serializable", "Execution failed"];

const ERROR_WRAPPER_PREFIX: &str = "ResponseError(";

/// Options for the legacy compatibility path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeOptions {
    /// Parameter-name fragments whose 0/1 values become booleans
    pub boolean_hints: Vec<String>,
}

/// Result of decoding one raw response
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Decoded without losing anything
    Clean(ParsedResponse),
    /// Decoded through a salvage path; some content may be missing
    Degraded(ParsedResponse, DegradeReason),
    /// The provider reported a known failure; no calls are usable
    Failed(FailReason, Usage),
}

/// Why a decode was [`Decoded::Degraded`]
#[derive(Debug, Clone, PartialEq)]
pub enum DegradeReason {
    /// Body was not JSON or had no usable `choices[0].message`
    MalformedBody,
    /// These calls had undecodable arguments and were dropped
    ArgumentDecode { dropped: Vec<String> },
    /// A legacy function call was present but could not be decoded
    LegacyCall(String),
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradeReason::MalformedBody => write!(f, "malformed response body"),
            DegradeReason::ArgumentDecode { dropped } => {
                write!(f, "dropped calls with bad arguments: {}", dropped.join(", "))
            }
            DegradeReason::LegacyCall(detail) => {
                write!(f, "undecodable legacy function call: {}", detail)
            }
        }
    }
}

/// Why a decode was [`Decoded::Failed`]
#[derive(Debug, Clone, PartialEq)]
pub enum FailReason {
    /// A sentinel phrase was found in the named field
    Sentinel { phrase: &'static str, field: &'static str },
    /// Content was a stringified error wrapper
    ErrorWrapper,
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailReason::Sentinel { phrase, field } => {
                write!(f, "provider failure '{}' in {}", phrase, field)
            }
            FailReason::ErrorWrapper => write!(f, "provider returned an error wrapper"),
        }
    }
}

impl Decoded {
    /// Collapse into a [`ParsedResponse`]; failures become an empty response
    pub fn into_parsed(self) -> ParsedResponse {
        match self {
            Decoded::Clean(parsed) | Decoded::Degraded(parsed, _) => parsed,
            Decoded::Failed(_, usage) => ParsedResponse::text(String::new(), usage),
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Decoded::Clean(_))
    }

    /// Short status label for traces and reports
    pub fn status(&self) -> String {
        match self {
            Decoded::Clean(_) => "clean".into(),
            Decoded::Degraded(_, reason) => format!("degraded: {}", reason),
            Decoded::Failed(reason, _) => format!("failed: {}", reason),
        }
    }
}

#[derive(Debug, Error)]
enum ArgumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// Decode a raw response
///
/// Checks run in order: failure sentinels, structured `tool_calls`, the legacy
/// `function_call` (object, literal string or wrapped content), then plain text.
/// A body without `choices[0].message` falls back to its raw text.
pub fn normalize(raw: &RawResponse, names: &NameMap, options: &NormalizeOptions) -> Decoded {
    trace!("Response: status {}, {} bytes", raw.status, raw.body.len());

    let body: Value = match serde_json::from_str(&raw.body) {
        Ok(body) => body,
        Err(e) => {
            if let Some(phrase) = find_sentinel(&raw.body) {
                warn!("Provider failure sentinel in unparseable body: {}", phrase);
                return Decoded::Failed(FailReason::Sentinel { phrase, field: "body" }, Usage::default());
            }
            warn!("Response body is not JSON ({}), keeping raw text", e);
            return Decoded::Degraded(
                ParsedResponse::text(raw.body.clone(), Usage::default()),
                DegradeReason::MalformedBody,
            );
        }
    };
    let usage = extract_usage(&body);

    if let Some(reason) = body_sentinel(&body) {
        warn!("Provider failure: {}", reason);
        return Decoded::Failed(reason, usage);
    }

    let Some(message) = first_message(&body) else {
        warn!(
            "Response (status {}) has no choices[0].message, keeping raw text",
            raw.status
        );
        return Decoded::Degraded(
            ParsedResponse::text(raw.body.clone(), usage),
            DegradeReason::MalformedBody,
        );
    };
    let content = message_content(message);

    if let Some(reason) = content_sentinel(&content) {
        warn!("Provider failure: {}", reason);
        return Decoded::Failed(reason, usage);
    }

    if let Some(calls) = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .filter(|calls| !calls.is_empty())
    {
        return decode_tool_calls(calls, content, names, usage);
    }

    if let Some(function_call) = message.get("function_call").filter(|v| !v.is_null()) {
        return decode_legacy_call(function_call, content, names, options, usage);
    }

    if content.trim_start().starts_with(pseudo::WRAPPER_PREFIX) {
        let wrapped = Value::String(content.trim().to_string());
        return decode_legacy_call(&wrapped, String::new(), names, options, usage);
    }

    debug!("No function call in response, returning {} chars of text", content.len());
    Decoded::Clean(ParsedResponse::text(content, usage))
}

/// Token usage from `usage`, defaulting to zero
pub fn extract_usage(body: &Value) -> Usage {
    let Some(usage) = body.get("usage") else {
        return Usage::default();
    };
    let count = |primary: &str, alternate: &str| {
        usage
            .get(primary)
            .or_else(|| usage.get(alternate))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    Usage {
        input_tokens: count("prompt_tokens", "input_tokens"),
        output_tokens: count("completion_tokens", "output_tokens"),
    }
}

fn first_message(body: &Value) -> Option<&Value> {
    body.get("choices")?
        .as_array()?
        .first()?
        .get("message")
        .filter(|message| message.is_object())
}

/// Message text; content-part arrays are joined, null is empty
fn message_content(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str).or_else(|| part.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn find_sentinel(text: &str) -> Option<&'static str> {
    SENTINEL_PHRASES
        .iter()
        .copied()
        .find(|phrase| text.contains(phrase))
}

/// Sentinels carried in top-level `info` or `error` fields
fn body_sentinel(body: &Value) -> Option<FailReason> {
    for field in ["info", "error"] {
        let text = match body.get(field) {
            Some(Value::String(text)) => Some(text.as_str()),
            Some(Value::Object(error)) => error.get("message").and_then(Value::as_str),
            _ => None,
        };
        if let Some(phrase) = text.and_then(find_sentinel) {
            return Some(FailReason::Sentinel { phrase, field });
        }
    }
    None
}

/// Error wrappers or sentinel phrases in message content
fn content_sentinel(content: &str) -> Option<FailReason> {
    let trimmed = content.trim_start();
    if trimmed.starts_with(ERROR_WRAPPER_PREFIX) {
        return Some(FailReason::ErrorWrapper);
    }
    find_sentinel(trimmed).map(|phrase| FailReason::Sentinel {
        phrase,
        field: "content",
    })
}

fn decode_tool_calls(
    calls: &[Value],
    content: String,
    names: &NameMap,
    usage: Usage,
) -> Decoded {
    let mut decoded = Vec::with_capacity(calls.len());
    let mut dropped = Vec::new();

    for (index, call) in calls.iter().enumerate() {
        let function = call.get("function").unwrap_or(call);
        let Some(sanitized) = function.get("name").and_then(Value::as_str) else {
            warn!("Dropping tool call #{}: missing function name", index);
            dropped.push(format!("#{}", index));
            continue;
        };
        let name = names.resolve(sanitized).to_string();
        match parse_arguments(function.get("arguments")) {
            Ok(arguments) => decoded.push(FunctionCall::new(name, arguments)),
            Err(e) => {
                warn!("Dropping tool call #{} '{}': {}", index, name, e);
                dropped.push(name);
            }
        }
    }

    debug!("Decoded {} of {} tool calls", decoded.len(), calls.len());
    let parsed = ParsedResponse::with_calls(content, decoded, usage);
    if dropped.is_empty() {
        Decoded::Clean(parsed)
    } else {
        Decoded::Degraded(parsed, DegradeReason::ArgumentDecode { dropped })
    }
}

/// Arguments of a structured call: JSON text, an object, or absent
fn parse_arguments(raw: Option<&Value>) -> Result<Map<String, Value>, ArgumentError> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(text)) => into_object(serde_json::from_str(text)?),
        Some(other) => Err(ArgumentError::NotAnObject(json_kind(other))),
    }
}

/// Arguments of a legacy call, which may be escaped or encoded twice
fn parse_legacy_arguments(text: &str) -> Result<Map<String, Value>, ArgumentError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Map::new());
    }
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => serde_json::from_str::<Value>(&pseudo::unescape_quotes(text))?,
    };
    match value {
        Value::String(inner) => into_object(serde_json::from_str(&inner)?),
        value => into_object(value),
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, ArgumentError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ArgumentError::NotAnObject(json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn decode_legacy_call(
    function_call: &Value,
    content: String,
    names: &NameMap,
    options: &NormalizeOptions,
    usage: Usage,
) -> Decoded {
    let (sanitized, arguments, text) = match function_call {
        Value::Object(object) => {
            let Some(name) = object.get("name").and_then(Value::as_str) else {
                return legacy_failure(content, usage, "missing function name".into());
            };
            let arguments = match object.get("arguments") {
                Some(Value::String(text)) => parse_legacy_arguments(text),
                other => parse_arguments(other),
            };
            (name.to_string(), arguments, content)
        }
        Value::String(literal) => {
            let Some(call) = pseudo::scan_function_call(literal) else {
                return legacy_failure(
                    content,
                    usage,
                    "no name/arguments in function call literal".into(),
                );
            };
            let text = match call.message {
                Some(message) if content.is_empty() => pseudo::unescape_quotes(message),
                _ => content,
            };
            let arguments = if call.arguments.trim_start().starts_with('{') {
                parse_legacy_arguments(call.arguments)
            } else {
                parse_legacy_arguments(&format!("\"{}\"", call.arguments))
            };
            (pseudo::unescape_quotes(call.name), arguments, text)
        }
        other => {
            return legacy_failure(
                content,
                usage,
                format!("function_call is a {}", json_kind(other)),
            );
        }
    };

    let name = names.resolve(&sanitized).to_string();
    match arguments {
        Ok(mut arguments) => {
            let coerced = coerce::coerce_booleans(&mut arguments, &options.boolean_hints);
            if coerced > 0 {
                debug!("Coerced {} integer flags to booleans for '{}'", coerced, name);
            }
            Decoded::Clean(ParsedResponse::with_calls(
                text,
                vec![FunctionCall::new(name, arguments)],
                usage,
            ))
        }
        Err(e) => {
            warn!("Dropping legacy call '{}': {}", name, e);
            legacy_failure(text, usage, format!("'{}': {}", name, e))
        }
    }
}

fn legacy_failure(text: String, usage: Usage, detail: String) -> Decoded {
    Decoded::Degraded(
        ParsedResponse::text(text, usage),
        DegradeReason::LegacyCall(detail),
    )
}

/// Normalize, then read a Python-style call list out of plain text
///
/// Used for prompt-mode models that answer in text instead of native calls.
/// Text that decodes into calls is consumed, so `text_content` is empty then.
pub fn normalize_prompting(
    raw: &RawResponse,
    names: &NameMap,
    options: &NormalizeOptions,
) -> Decoded {
    let decoded = normalize(raw, names, options);
    let Decoded::Clean(parsed) = decoded else {
        return decoded;
    };
    if !parsed.function_calls.is_empty() || parsed.text_content.trim().is_empty() {
        return Decoded::Clean(parsed);
    }

    match prompt::decode_call_list(&parsed.text_content) {
        Ok(calls) => {
            let calls = calls
                .into_iter()
                .map(|call| FunctionCall::new(names.resolve(&call.name).to_string(), call.arguments))
                .collect();
            Decoded::Clean(ParsedResponse::with_calls(String::new(), calls, parsed.usage()))
        }
        Err(e) => {
            debug!("Text is not a call list ({}), keeping it as text", e);
            Decoded::Clean(parsed)
        }
    }
}
