//! Scanner for stringified Python-literal function calls such as
//! `ResponseFnCall(value={'function_call': {'name': 'f', 'arguments': '{"a": 1}'}, 'message': ''}, info='')`
//!
//! Values are located by walking quotes and bracket depth, so argument JSON
//! containing braces, commas or stray quotes does not end a value early.

use std::ops::Range;

/// Prefix of the wrapper some session servers put around a legacy function call
pub const WRAPPER_PREFIX: &str = "ResponseFnCall(";

/// Raw slices of a legacy call found in literal text, still escaped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoCall<'a> {
    pub name: &'a str,
    pub arguments: &'a str,
    pub message: Option<&'a str>,
}

/// Locate `name`, `arguments` and (optionally) `message` in a pseudo-object literal
pub fn scan_function_call(literal: &str) -> Option<PseudoCall<'_>> {
    let name = value_span(literal, "name", 0)?;
    // Arguments follow the name; starting there skips any `'arguments'` text
    // that might appear earlier in a wrapper prefix.
    let arguments = value_span(literal, "arguments", name.end)?;
    let message = value_span(literal, "message", arguments.end);

    let name_text = literal[name].trim();
    if name_text.is_empty() {
        return None;
    }
    Some(PseudoCall {
        name: name_text,
        arguments: &literal[arguments],
        message: message.map(|span| &literal[span]),
    })
}

/// Undo quote escaping introduced when a string was embedded in a literal
pub fn unescape_quotes(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\'", "'")
}

/// Span of the value that follows `'key':` (or `"key":`) at or after `from`
///
/// For quoted values the span excludes the quotes.
fn value_span(text: &str, key: &str, from: usize) -> Option<Range<usize>> {
    let colon = find_key(text, key, from)?;
    let start = skip_whitespace(text, colon + 1);
    let first = text[start..].chars().next()?;

    match first {
        '\'' | '"' => {
            let inner = start + 1;
            // A quoted object or array is scanned by depth first; the quoted
            // scan is the fallback when the structure does not close cleanly.
            if let Some(open @ ('{' | '[')) = text[inner..].chars().next() {
                if let Some(end) = balanced_end(text, inner, open) {
                    if text[end..].starts_with(first) {
                        return Some(inner..end);
                    }
                }
            }
            let end = quoted_end(text, inner, first)?;
            Some(inner..end)
        }
        '{' | '[' => {
            let end = balanced_end(text, start, first)?;
            Some(start..end)
        }
        _ => {
            let end = bare_end(text, start);
            Some(start..end)
        }
    }
}

/// Byte offset of the `:` following the first quoted `key` at or after `from`
fn find_key(text: &str, key: &str, from: usize) -> Option<usize> {
    for quote in ['\'', '"'] {
        let needle = format!("{quote}{key}{quote}");
        let mut cursor = from;
        while let Some(found) = text.get(cursor..).and_then(|rest| rest.find(&needle)) {
            let after = skip_whitespace(text, cursor + found + needle.len());
            if text[after..].starts_with(':') {
                return Some(after);
            }
            cursor += found + needle.len();
        }
    }
    None
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, ch)| !ch.is_whitespace())
        .map_or(text.len(), |(offset, _)| from + offset)
}

/// End offset (exclusive) of the bracket structure opened at `start`
///
/// Double-quoted JSON strings inside the structure are skipped with their
/// backslash escapes honoured.
fn balanced_end(text: &str, start: usize, open: char) -> Option<usize> {
    let close = if open == '{' { '}' } else { ']' };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (ch == close).then_some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Offset of the unescaped closing `quote` for a string starting at `start`
fn quoted_end(text: &str, start: usize, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return Some(start + offset);
        }
    }
    None
}

/// End of an unquoted token such as `None` or `42`
fn bare_end(text: &str, start: usize) -> usize {
    text[start..]
        .char_indices()
        .find(|(_, ch)| matches!(ch, ',' | '}' | ')'))
        .map_or(text.len(), |(offset, _)| start + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_wrapped_call() {
        let literal = r#"ResponseFnCall(value={'function_call': {'name': 'get_weather', 'arguments': '{"city": "Paris"}'}, 'message': 'Checking'}, info='Checking')"#;
        let call = scan_function_call(literal).unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, r#"{"city": "Paris"}"#);
        assert_eq!(call.message, Some("Checking"));
    }

    #[test]
    fn test_scan_arguments_with_nested_braces_and_quotes() {
        let literal = r#"{'name': 'save', 'arguments': '{"doc": {"title": "O'Brien's {draft}", "tags": ["a", "b"]}}'}"#;
        let call = scan_function_call(literal).unwrap();
        assert_eq!(
            call.arguments,
            r#"{"doc": {"title": "O'Brien's {draft}", "tags": ["a", "b"]}}"#
        );
        assert_eq!(call.message, None);
    }

    #[test]
    fn test_scan_escaped_quote_arguments_falls_back_to_quoted_scan() {
        let literal = r#"{'name': 'f', 'arguments': '{\"x\": \"}\"}'}"#;
        let call = scan_function_call(literal).unwrap();
        assert_eq!(call.arguments, r#"{\"x\": \"}\"}"#);
        assert_eq!(unescape_quotes(call.arguments), r#"{"x": "}"}"#);
    }

    #[test]
    fn test_scan_double_quoted_keys() {
        let literal = r#"{"name": "lookup", "arguments": {"id": 7}}"#;
        let call = scan_function_call(literal).unwrap();
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments, r#"{"id": 7}"#);
    }

    #[test]
    fn test_scan_message_with_escaped_quote() {
        let literal = r#"ResponseFnCall(value={'function_call': {'name': 'f', 'arguments': '{}'}, 'message': 'it\'s done'}, info='')"#;
        let call = scan_function_call(literal).unwrap();
        assert_eq!(call.message.map(unescape_quotes), Some("it's done".to_string()));
    }

    #[test]
    fn test_scan_missing_arguments() {
        assert_eq!(scan_function_call("{'name': 'f'}"), None);
    }

    #[test]
    fn test_scan_empty_name() {
        assert_eq!(scan_function_call("{'name': '', 'arguments': '{}'}"), None);
    }

    #[test]
    fn test_key_without_colon_is_skipped() {
        let literal = r#"{'note': 'name', 'name': 'real', 'arguments': '{}'}"#;
        let call = scan_function_call(literal).unwrap();
        assert_eq!(call.name, "real");
    }
}
