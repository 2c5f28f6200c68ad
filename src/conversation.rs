use thiserror::Error;
use tracing::trace;

use crate::types::{FunctionCall, Message, ParsedResponse};

/// Lifecycle of one test case's message history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    AwaitingFirstTurn,
    InConversation,
    Terminated,
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConversationState::AwaitingFirstTurn => "awaiting first turn",
            ConversationState::InConversation => "in conversation",
            ConversationState::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConversationError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: ConversationState,
    },
    #[error("{results} tool result(s) for {calls} decoded call(s)")]
    ZipLengthMismatch { results: usize, calls: usize },
}

/// Append-only message history with explicit turn transitions
#[derive(Debug, Clone)]
pub struct Conversation {
    state: ConversationState,
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            state: ConversationState::AwaitingFirstTurn,
            messages: Vec::new(),
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Open the conversation with the first turn's messages
    pub fn start(&mut self, first_turn: Vec<Message>) -> Result<(), ConversationError> {
        self.require(ConversationState::AwaitingFirstTurn, "start")?;
        trace!("Starting conversation with {} message(s)", first_turn.len());
        self.messages.extend(first_turn);
        self.state = ConversationState::InConversation;
        Ok(())
    }

    /// Append the messages of a follow-up user turn
    pub fn push_user(&mut self, turn: Vec<Message>) -> Result<(), ConversationError> {
        self.require(ConversationState::InConversation, "append user turn")?;
        self.messages.extend(turn);
        Ok(())
    }

    /// Append the assistant reply carried by `response.text_content`
    pub fn push_assistant(&mut self, response: &ParsedResponse) -> Result<(), ConversationError> {
        self.require(ConversationState::InConversation, "append assistant message")?;
        self.messages
            .push(Message::assistant(response.text_content.clone()));
        Ok(())
    }

    /// Append one tool message per call, pairing `results[i]` with `calls[i]`
    ///
    /// Nothing is appended when the two lists differ in length.
    pub fn push_tool_results(
        &mut self,
        calls: &[FunctionCall],
        results: Vec<String>,
    ) -> Result<(), ConversationError> {
        self.require(ConversationState::InConversation, "append tool results")?;
        if calls.len() != results.len() {
            return Err(ConversationError::ZipLengthMismatch {
                results: results.len(),
                calls: calls.len(),
            });
        }
        self.messages.extend(
            calls
                .iter()
                .zip(results)
                .map(|(call, result)| Message::tool(call.name.clone(), result)),
        );
        Ok(())
    }

    /// End the case and hand back the full history
    pub fn finish(&mut self) -> Result<Vec<Message>, ConversationError> {
        self.require(ConversationState::InConversation, "finish")?;
        self.state = ConversationState::Terminated;
        Ok(std::mem::take(&mut self.messages))
    }

    fn require(
        &self,
        state: ConversationState,
        action: &'static str,
    ) -> Result<(), ConversationError> {
        if self.state == state {
            Ok(())
        } else {
            Err(ConversationError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }
}
