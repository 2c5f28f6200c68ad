use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::catalog::{CompiledCatalog, NameMap, OpenApiCaster, ToolPayload, ToolStyle, Verbatim};
use crate::request::{self, MessagesKey, RequestEnvelope, ToolAttachment};
use crate::response::{self, Decoded, NormalizeOptions, coerce};
use crate::transport::{DEFAULT_TIMEOUT_SECS, RawResponse};
use crate::types::{FunctionDoc, Message};

/// How a provider is asked to call functions
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Tools are sent with the request and calls come back as structured data
    #[default]
    FunctionCalling,
    /// No tools are sent; calls are read from a Python-style list in the reply text
    Prompting,
}

/// Builds a request envelope for a turn buffer
pub type BuildFn = for<'a> fn(
    &'a ProviderProfile,
    &'a [Message],
    Option<&'a [ToolPayload]>,
) -> RequestEnvelope<'a>;

/// Decodes a raw response against a compiled name map
pub type NormalizeFn = fn(&RawResponse, &NameMap, &NormalizeOptions) -> Decoded;

/// Request/response strategy pair for one provider mode
#[derive(Clone, Copy)]
pub struct Strategy {
    pub build: BuildFn,
    pub normalize: NormalizeFn,
}

/// Everything that varies between providers
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ProviderProfile {
    /// Base URL of the API (e.g. https://openrouter.ai/api/v1)
    pub base_url: String,
    /// Path appended to `base_url` for each request
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model name sent in every request
    pub model: String,
    /// Whether the server keeps conversation state and expects `type: start|continue`
    #[serde(default)]
    pub session: bool,
    /// When to attach the tool list
    #[serde(default)]
    pub tool_attachment: ToolAttachment,
    /// Shape of each tool entry
    #[serde(default)]
    pub tool_style: ToolStyle,
    /// Envelope key carrying the conversation history
    #[serde(default)]
    pub messages_key: MessagesKey,
    /// Mark every tool `strict: true`
    #[serde(default)]
    pub strict_tools: bool,
    /// Sampling temperature (omitted from requests when unset)
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key, sent as `Authorization: Bearer`
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Parameter-name fragments whose 0/1 values become booleans in legacy calls.
    /// An empty list disables the coercion.
    #[serde(default = "coerce::default_boolean_hints")]
    pub boolean_hints: Vec<String>,
    /// Map loose parameter types (dict, float, tuple, ...) onto OpenAPI types
    #[serde(default = "default_openapi_types")]
    pub openapi_types: bool,
    /// Function-calling or prompting
    #[serde(default)]
    pub mode: Mode,
    /// Extra HTTP headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_endpoint() -> String {
    "/chat/completions".into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_openapi_types() -> bool {
    true
}

impl ProviderProfile {
    /// Stateless OpenAI-compatible router; tools ride along on every request
    pub fn openai_router() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".into(),
            endpoint: default_endpoint(),
            model: "openai/gpt-4o-2024-11-20".into(),
            session: false,
            tool_attachment: ToolAttachment::EveryTurn,
            tool_style: ToolStyle::Structured,
            messages_key: MessagesKey::Messages,
            strict_tools: false,
            temperature: Some(0.001),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_key_env: Some("OPENROUTER_API_KEY".into()),
            boolean_hints: coerce::default_boolean_hints(),
            openapi_types: true,
            mode: Mode::FunctionCalling,
            headers: HashMap::new(),
        }
    }

    /// Local server that keeps the conversation and only needs tools once
    pub fn session_server() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            endpoint: "/v1/chat/completions".into(),
            model: "gpt-4".into(),
            session: true,
            tool_attachment: ToolAttachment::FirstTurn,
            tool_style: ToolStyle::Structured,
            messages_key: MessagesKey::Messages,
            strict_tools: true,
            temperature: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_key_env: None,
            boolean_hints: coerce::default_boolean_hints(),
            openapi_types: true,
            mode: Mode::FunctionCalling,
            headers: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            boolean_hints: self.boolean_hints.clone(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self.mode {
            Mode::FunctionCalling => Strategy {
                build: request::build,
                normalize: response::normalize,
            },
            Mode::Prompting => Strategy {
                build: request::build_prompting,
                normalize: response::normalize_prompting,
            },
        }
    }

    /// Compile a function list with this profile's tool style and type casting
    pub fn compile(&self, functions: &[FunctionDoc]) -> CompiledCatalog {
        if self.openapi_types {
            crate::catalog::compile(functions, self.tool_style, self.strict_tools, &OpenApiCaster)
        } else {
            crate::catalog::compile(functions, self.tool_style, self.strict_tools, &Verbatim)
        }
    }

    /// Configured headers plus `Authorization` from `api_key_env` when set
    pub fn request_headers(&self) -> HashMap<String, String> {
        let mut headers = self.headers.clone();
        if let Some(var) = &self.api_key_env {
            match std::env::var(var) {
                Ok(key) if !key.is_empty() => {
                    headers.insert("Authorization".into(), format!("Bearer {}", key));
                }
                _ => warn!("API key variable {} is not set, sending no Authorization", var),
            }
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sanitize_name;
    use serde_json::json;

    #[test]
    fn test_minimal_profile_uses_defaults() {
        let profile: ProviderProfile =
            toml::from_str("base_url = \"http://x\"\nmodel = \"m\"").unwrap();
        assert_eq!(profile.endpoint, "/chat/completions");
        assert_eq!(profile.timeout(), Duration::from_secs(30));
        assert_eq!(profile.tool_attachment, ToolAttachment::EveryTurn);
        assert_eq!(profile.mode, Mode::FunctionCalling);
        assert!(profile.openapi_types);
        assert!(!profile.session);
        assert_eq!(profile.boolean_hints, coerce::default_boolean_hints());
    }

    #[test]
    fn test_profile_enums_parse_snake_case() {
        let profile: ProviderProfile = toml::from_str(
            r#"
            base_url = "http://x"
            model = "m"
            tool_attachment = "first_turn"
            tool_style = "flat"
            messages_key = "input"
            mode = "prompting"
            boolean_hints = []
            "#,
        )
        .unwrap();
        assert_eq!(profile.tool_attachment, ToolAttachment::FirstTurn);
        assert_eq!(profile.tool_style, ToolStyle::Flat);
        assert_eq!(profile.messages_key, MessagesKey::Input);
        assert_eq!(profile.mode, Mode::Prompting);
        assert!(profile.normalize_options().boolean_hints.is_empty());
    }

    #[test]
    fn test_prompting_strategy_reads_call_list() {
        let profile = ProviderProfile {
            mode: Mode::Prompting,
            ..ProviderProfile::openai_router()
        };
        let strategy = profile.strategy();
        let raw = RawResponse::new(
            200,
            json!({"choices": [{"message": {"content": "[ping(host='a')]"}}]}).to_string(),
        );
        let decoded = (strategy.normalize)(&raw, &NameMap::new(), &profile.normalize_options());
        assert_eq!(decoded.into_parsed().function_calls[0].name, "ping");
    }

    #[test]
    fn test_function_calling_strategy_keeps_call_list_as_text() {
        let profile = ProviderProfile::openai_router();
        let raw = RawResponse::new(
            200,
            json!({"choices": [{"message": {"content": "[ping(host='a')]"}}]}).to_string(),
        );
        let decoded = (profile.strategy().normalize)(&raw, &NameMap::new(), &profile.normalize_options());
        let parsed = decoded.into_parsed();
        assert!(parsed.function_calls.is_empty());
        assert_eq!(parsed.text_content, "[ping(host='a')]");
    }

    #[test]
    fn test_compile_respects_openapi_types() {
        let doc: FunctionDoc = serde_json::from_value(json!({
            "name": "stats.mean",
            "parameters": {"properties": {"values": {"type": "tuple"}}}
        }))
        .unwrap();

        let cast = ProviderProfile::openai_router().compile(std::slice::from_ref(&doc));
        let cast = serde_json::to_value(&cast.tools[0]).unwrap();
        assert_eq!(cast["function"]["parameters"]["properties"]["values"]["type"], "array");

        let verbatim = ProviderProfile {
            openapi_types: false,
            ..ProviderProfile::openai_router()
        }
        .compile(std::slice::from_ref(&doc));
        assert_eq!(verbatim.names.resolve(&sanitize_name(&doc.name)), "stats.mean");
        let verbatim = serde_json::to_value(&verbatim.tools[0]).unwrap();
        assert_eq!(verbatim["function"]["parameters"]["properties"]["values"]["type"], "tuple");
    }

    #[test]
    fn test_request_headers_without_key_env() {
        let profile = ProviderProfile {
            headers: HashMap::from([("x-extra".to_string(), "1".to_string())]),
            ..ProviderProfile::session_server()
        };
        let headers = profile.request_headers();
        assert_eq!(headers.get("x-extra").map(String::as_str), Some("1"));
        assert!(!headers.contains_key("Authorization"));
    }

    #[test]
    fn test_request_headers_with_missing_key_env() {
        let profile = ProviderProfile {
            api_key_env: Some("TOOLBRIDGE_TEST_KEY_THAT_IS_NEVER_SET".into()),
            ..ProviderProfile::session_server()
        };
        assert!(!profile.request_headers().contains_key("Authorization"));
    }
}
