use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Speaker of a conversation message
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of the conversation history
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Decoded call name, set on tool-result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Tool-result message answering the call named `name`
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: Some(name.into()),
        }
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }
}

/// Canonical function documentation as supplied by a test entry
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionDoc {
    /// Function name, dots allowed (e.g. `math.factorial`)
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: FunctionParameters,
}

/// Parameter block of a [`FunctionDoc`]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FunctionParameters {
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// A decoded function invocation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Token accounting reported by the provider
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Provider response reduced to text, calls and usage
///
/// When `function_calls` is non-empty, `text_content` is the message that came
/// with the calls (possibly empty). Otherwise it is the whole fallback text.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ParsedResponse {
    pub text_content: String,
    pub function_calls: Vec<FunctionCall>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ParsedResponse {
    /// Response carrying only text
    pub fn text(text_content: impl Into<String>, usage: Usage) -> Self {
        Self::with_calls(text_content, Vec::new(), usage)
    }

    pub fn with_calls(
        text_content: impl Into<String>,
        function_calls: Vec<FunctionCall>,
        usage: Usage,
    ) -> Self {
        Self {
            text_content: text_content.into(),
            function_calls,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }

    pub fn usage(&self) -> Usage {
        Usage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        }
    }
}

/// One benchmark test case: a function catalog plus user turns
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TestEntry {
    pub id: String,
    /// User messages, grouped per turn
    pub question: Vec<Vec<Message>>,
    #[serde(default)]
    pub function: Vec<FunctionDoc>,
}

impl TestEntry {
    /// Category of the entry: the id without its trailing `_<index>`
    pub fn category(&self) -> &str {
        self.id
            .rsplit_once('_')
            .map(|(category, _)| category)
            .unwrap_or(self.id.as_str())
    }
}
