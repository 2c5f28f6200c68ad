//! Decoding of Python-style call lists emitted by prompt-mode models,
//! e.g. `[get_weather(city='Paris'), math.add(a=1, b=2.5)]`, and the
//! reverse rendering used to hand calls to an executor.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::types::FunctionCall;

/// Deepest list/tuple/dict nesting accepted inside an argument value
pub const MAX_NESTING: usize = 128;

#[derive(Debug, Error, PartialEq)]
pub enum PromptDecodeError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("positional argument in call to '{0}' (keyword arguments only)")]
    PositionalArgument(String),
    #[error("no function calls found")]
    Empty,
    #[error("literal nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Decode a bracketed (or bare) list of keyword-argument calls
///
/// Markdown code fences and backticks around the list are tolerated.
pub fn decode_call_list(text: &str) -> Result<Vec<FunctionCall>, PromptDecodeError> {
    let cleaned = strip_fences(text);
    let mut parser = Parser::new(&cleaned);
    parser.skip_whitespace();

    let bracketed = parser.peek() == Some('[');
    if bracketed {
        parser.bump();
    }
    let mut calls = Vec::new();
    loop {
        parser.skip_whitespace();
        match parser.peek() {
            None if !bracketed => break,
            Some(']') if bracketed => {
                parser.bump();
                break;
            }
            None => return Err(PromptDecodeError::UnexpectedEnd),
            Some(_) => {}
        }
        calls.push(parser.call()?);
        parser.skip_whitespace();
        if parser.peek() == Some(',') {
            parser.bump();
        }
    }

    parser.skip_whitespace();
    if let Some(found) = parser.peek() {
        return Err(PromptDecodeError::Unexpected {
            found,
            offset: parser.pos,
        });
    }
    if calls.is_empty() {
        return Err(PromptDecodeError::Empty);
    }
    Ok(calls)
}

/// Render calls as `name(key=value,...)` strings with Python literal values
pub fn to_execution_strings(calls: &[FunctionCall]) -> Vec<String> {
    calls
        .iter()
        .map(|call| {
            let arguments: Vec<String> = call
                .arguments
                .iter()
                .map(|(key, value)| format!("{}={}", key, python_repr(value)))
                .collect();
            format!("{}({})", call.name, arguments.join(","))
        })
        .collect()
}

fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".into(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => python_string(text),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(python_repr).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}: {}", python_string(key), python_repr(value)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// Python `repr` of a str: single quotes unless the text holds only single quotes
fn python_string(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ch if ch == quote => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out.push(quote);
    out
}

fn strip_fences(text: &str) -> String {
    let mut text = text.trim();
    for prefix in ["```python", "```json", "```"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest;
            break;
        }
    }
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim().trim_matches('`').trim().to_string()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), PromptDecodeError> {
        self.skip_whitespace();
        match self.bump() {
            Some(ch) if ch == expected => Ok(()),
            Some(found) => Err(PromptDecodeError::Unexpected {
                found,
                offset: self.pos - found.len_utf8(),
            }),
            None => Err(PromptDecodeError::UnexpectedEnd),
        }
    }

    fn unexpected(&self) -> PromptDecodeError {
        match self.peek() {
            Some(found) => PromptDecodeError::Unexpected {
                found,
                offset: self.pos,
            },
            None => PromptDecodeError::UnexpectedEnd,
        }
    }

    /// Dotted identifier such as `math.factorial`
    fn path(&mut self) -> Result<&'a str, PromptDecodeError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_' || ch == '.')
        {
            self.bump();
        }
        if self.pos == start {
            return Err(self.unexpected());
        }
        Ok(&self.src[start..self.pos])
    }

    fn call(&mut self) -> Result<FunctionCall, PromptDecodeError> {
        let name = self.path()?.to_string();
        self.expect('(')?;
        let mut arguments = Map::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.bump();
                break;
            }
            let key = match self.path() {
                Ok(key) => key.to_string(),
                Err(_) => return Err(PromptDecodeError::PositionalArgument(name)),
            };
            self.skip_whitespace();
            if self.peek() != Some('=') {
                return Err(PromptDecodeError::PositionalArgument(name));
            }
            self.bump();
            self.skip_whitespace();
            let value = self.value()?;
            arguments.insert(key, value);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(')') => {}
                _ => return Err(self.unexpected()),
            }
        }
        Ok(FunctionCall::new(name, arguments))
    }

    fn value(&mut self) -> Result<Value, PromptDecodeError> {
        self.skip_whitespace();
        match self.peek() {
            Some(quote @ ('\'' | '"')) => self.string(quote).map(Value::String),
            Some('[') => self.nested(|parser| parser.sequence('[', ']')),
            Some('(') => self.nested(|parser| parser.sequence('(', ')')),
            Some('{') => self.nested(Self::dict),
            Some(ch) if ch == '-' || ch == '+' || ch == '.' || ch.is_ascii_digit() => {
                self.number()
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let start = self.pos;
                let word = self.path()?;
                match word {
                    "True" | "true" => Ok(Value::Bool(true)),
                    "False" | "false" => Ok(Value::Bool(false)),
                    "None" | "null" => Ok(Value::Null),
                    _ => {
                        self.pos = start;
                        Err(self.unexpected())
                    }
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, PromptDecodeError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump().ok_or(PromptDecodeError::UnexpectedEnd)? {
                ch if ch == quote => return Ok(out),
                '\\' => {
                    let escaped = self.bump().ok_or(PromptDecodeError::UnexpectedEnd)?;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                ch => out.push(ch),
            }
        }
    }

    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Value, PromptDecodeError>,
    ) -> Result<Value, PromptDecodeError> {
        if self.depth >= MAX_NESTING {
            return Err(PromptDecodeError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Value, PromptDecodeError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(ch) if ch == close => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn dict(&mut self) -> Result<Value, PromptDecodeError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(key) => key,
                other => other.to_string(),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn number(&mut self) -> Result<Value, PromptDecodeError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        while self
            .peek()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '+' | '-'))
        {
            // A sign is only part of the literal right after an exponent marker
            if matches!(self.peek(), Some('+' | '-'))
                && !matches!(self.src[..self.pos].chars().last(), Some('e' | 'E'))
            {
                break;
            }
            self.bump();
        }
        let literal = &self.src[start..self.pos];
        let cleaned = literal.trim_start_matches('+').replace('_', "");

        if let Ok(int) = cleaned.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        cleaned
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| PromptDecodeError::InvalidNumber(literal.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_single_call() {
        let calls = decode_call_list("[get_weather(city='Paris', days=3)]").unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments["city"], json!("Paris"));
        assert_eq!(calls[0].arguments["days"], json!(3));
    }

    #[test]
    fn test_decode_multiple_calls_in_order() {
        let calls = decode_call_list("[math.add(a=1, b=2.5), math.neg(x=-4)]").unwrap();
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["math.add", "math.neg"]);
        assert_eq!(calls[0].arguments["b"], json!(2.5));
        assert_eq!(calls[1].arguments["x"], json!(-4));
    }

    #[test]
    fn test_decode_nested_literals() {
        let calls = decode_call_list(
            r#"[plot(points=[(1, 2), (3, 4)], style={'color': "red", 'width': 2}, legend=None, grid=True)]"#,
        )
        .unwrap();
        let arguments = &calls[0].arguments;
        assert_eq!(arguments["points"], json!([[1, 2], [3, 4]]));
        assert_eq!(arguments["style"], json!({"color": "red", "width": 2}));
        assert_eq!(arguments["legend"], Value::Null);
        assert_eq!(arguments["grid"], json!(true));
    }

    #[test]
    fn test_decode_fenced_bare_call() {
        let calls = decode_call_list("```python\nsearch(query='rust')\n```").unwrap();
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments["query"], json!("rust"));
    }

    #[test]
    fn test_decode_escaped_string() {
        let calls = decode_call_list(r"[say(text='it\'s fine')]").unwrap();
        assert_eq!(calls[0].arguments["text"], json!("it's fine"));
    }

    #[test]
    fn test_decode_exponent_number() {
        let calls = decode_call_list("[scale(factor=1e-3)]").unwrap();
        assert_eq!(calls[0].arguments["factor"], json!(0.001));
    }

    #[test]
    fn test_decode_rejects_positional_argument() {
        assert_eq!(
            decode_call_list("[add(1, 2)]"),
            Err(PromptDecodeError::PositionalArgument("add".into()))
        );
    }

    #[test]
    fn test_decode_rejects_prose() {
        assert!(decode_call_list("I cannot help with that.").is_err());
    }

    #[test]
    fn test_decode_rejects_empty_list() {
        assert_eq!(decode_call_list("[]"), Err(PromptDecodeError::Empty));
    }

    #[test]
    fn test_decode_limits_nesting_depth() {
        let runaway = format!("[f(a={})]", "[".repeat(200_000));
        assert_eq!(
            decode_call_list(&runaway),
            Err(PromptDecodeError::TooDeep(MAX_NESTING))
        );

        let deepest = format!(
            "[f(a={}{})]",
            "[".repeat(MAX_NESTING),
            "]".repeat(MAX_NESTING)
        );
        assert!(decode_call_list(&deepest).is_ok());
        let too_deep = format!(
            "[f(a={}{})]",
            "(".repeat(MAX_NESTING + 1),
            ")".repeat(MAX_NESTING + 1)
        );
        assert_eq!(
            decode_call_list(&too_deep),
            Err(PromptDecodeError::TooDeep(MAX_NESTING))
        );
    }

    #[test]
    fn test_execution_strings() {
        let calls = decode_call_list("[f(a='x', b=[1, True], c=None)]").unwrap();
        assert_eq!(
            to_execution_strings(&calls),
            vec!["f(a='x',b=[1, True],c=None)".to_string()]
        );
    }

    #[test]
    fn test_execution_string_quotes_like_python_repr() {
        let arguments = match json!({"a": "it's", "b": "say \"hi\" it's"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let call = FunctionCall::new("echo", arguments);
        assert_eq!(
            to_execution_strings(&[call]),
            vec![r#"echo(a="it's",b='say "hi" it\'s')"#]
        );
    }
}
