use serde_json::{Map, Value};

/// Parameter-name fragments that mark an integer 0/1 as a boolean in legacy calls
pub const DEFAULT_BOOLEAN_HINTS: &[&str] = &[
    "formatted",
    "detailed",
    "include",
    "specific",
    "enabled",
    "active",
    "visible",
    "required",
    "show",
    "display",
    "verbose",
    "debug",
];

pub fn default_boolean_hints() -> Vec<String> {
    DEFAULT_BOOLEAN_HINTS.iter().map(|hint| hint.to_string()).collect()
}

/// Turn integer `0`/`1` arguments into booleans when the parameter name
/// contains one of `hints` (case-insensitive). Returns the number of values changed.
///
/// This is a name heuristic: an integer parameter such as `include_count`
/// is coerced as well.
pub fn coerce_booleans(arguments: &mut Map<String, Value>, hints: &[String]) -> usize {
    let mut coerced = 0;
    for (key, value) in arguments.iter_mut() {
        let flag = match value.as_i64() {
            Some(0) => false,
            Some(1) => true,
            _ => continue,
        };
        let key = key.to_lowercase();
        if hints.iter().any(|hint| key.contains(&hint.to_lowercase())) {
            *value = Value::Bool(flag);
            coerced += 1;
        }
    }
    coerced
}
