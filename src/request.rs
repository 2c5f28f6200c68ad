use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::catalog::ToolPayload;
use crate::provider::ProviderProfile;
use crate::types::{FunctionDoc, Message, Role};

const FUNCTION_PROMPT_HEADER: &str = "You can call the functions listed below. When a call is needed, reply \
with only a Python-style list of calls such as [func_a(x=1, y='text'), module.func_b(z=[1, 2])] and \
no other text. When no call is needed, answer in plain text.\n\nFunctions (JSON):\n";

/// When the tool list rides along with a request
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolAttachment {
    /// Only on the opening request of a conversation
    FirstTurn,
    /// On every request
    #[default]
    EveryTurn,
}

/// Envelope key carrying the conversation history
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessagesKey {
    #[default]
    Messages,
    Input,
}

/// Session marker sent to providers that keep server-side conversation state
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Start,
    Continue,
}

/// Request body sent to a provider
#[derive(Serialize, Debug, Clone)]
pub struct RequestEnvelope<'a> {
    pub model: &'a str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<&'a [Message]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<&'a [Message]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [ToolPayload]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A conversation is on its opening request while it holds at most one message
pub fn is_first_request(messages: &[Message]) -> bool {
    messages.len() <= 1
}

/// A prompt-mode buffer is on its opening request until the model has replied
///
/// The function prompt is injected as a system message, so message count
/// alone cannot tell the opening turn apart.
pub fn is_opening_turn(messages: &[Message]) -> bool {
    messages
        .iter()
        .all(|message| matches!(message.role, Role::System | Role::User))
}

/// Build the envelope for native function-calling requests
pub fn build<'a>(
    profile: &'a ProviderProfile,
    messages: &'a [Message],
    tools: Option<&'a [ToolPayload]>,
) -> RequestEnvelope<'a> {
    let first = is_first_request(messages);
    let attach = match profile.tool_attachment {
        ToolAttachment::FirstTurn => first,
        ToolAttachment::EveryTurn => true,
    };
    let tools = tools.filter(|tools| attach && !tools.is_empty());
    envelope(profile, messages, tools, first)
}

/// Build the envelope for prompt-mode requests, which never carry tools
pub fn build_prompting<'a>(
    profile: &'a ProviderProfile,
    messages: &'a [Message],
    _tools: Option<&'a [ToolPayload]>,
) -> RequestEnvelope<'a> {
    envelope(profile, messages, None, is_opening_turn(messages))
}

/// System prompt describing `functions` for prompt-mode providers
pub fn function_prompt(functions: &[FunctionDoc]) -> String {
    let listing = serde_json::to_string_pretty(functions).unwrap_or_default();
    format!("{}{}", FUNCTION_PROMPT_HEADER, listing)
}

/// Put the function prompt in front of a first turn
///
/// An existing leading system message gets the prompt prepended to its
/// content; otherwise a new system message is inserted.
pub fn with_function_prompt(mut turn: Vec<Message>, functions: &[FunctionDoc]) -> Vec<Message> {
    let prompt = function_prompt(functions);
    match turn.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content = format!("{}\n\n{}", prompt, first.content);
        }
        _ => turn.insert(0, Message::system(prompt)),
    }
    turn
}

fn envelope<'a>(
    profile: &'a ProviderProfile,
    messages: &'a [Message],
    tools: Option<&'a [ToolPayload]>,
    first: bool,
) -> RequestEnvelope<'a> {
    let session = profile.session.then_some(if first {
        SessionPhase::Start
    } else {
        SessionPhase::Continue
    });
    trace!(
        "Request: {} messages, {} tools, session={:?}",
        messages.len(),
        tools.map_or(0, <[ToolPayload]>::len),
        session
    );

    let (messages, input) = match profile.messages_key {
        MessagesKey::Messages => (Some(messages), None),
        MessagesKey::Input => (None, Some(messages)),
    };
    RequestEnvelope {
        model: &profile.model,
        session,
        messages,
        input,
        tools,
        temperature: profile.temperature,
    }
}
