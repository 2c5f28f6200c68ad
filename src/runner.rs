use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::catalog::{DocPreprocessor, PassthroughDocs};
use crate::conversation::{Conversation, ConversationError};
use crate::provider::{Mode, ProviderProfile};
use crate::request;
use crate::transport::{Transport, TransportError};
use crate::types::{FunctionCall, Message, TestEntry};

/// Model steps allowed within one user turn when an executor feeds results back
pub const DEFAULT_MAX_STEPS_PER_TURN: usize = 20;

/// Executes decoded calls for a case and returns one result string per call
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, case_id: &str, calls: &[FunctionCall]) -> Result<Vec<String>, String>;
}

#[derive(Debug, Error)]
pub enum CaseError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("tool execution failed: {0}")]
    Executor(String),
}

/// One request/response exchange
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub http_status: u16,
    pub text: String,
    pub calls: Vec<FunctionCall>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_secs: f64,
    /// Decode status (`clean`, `degraded: ...` or `failed: ...`)
    pub status: String,
}

/// All steps taken for one user turn
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnRecord {
    pub steps: Vec<StepRecord>,
}

/// Outcome of one test case
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub id: String,
    pub turns: Vec<TurnRecord>,
    /// Set when the case stopped early; completed turns are kept
    pub error: Option<String>,
    pub elapsed_secs: f64,
}

impl CaseReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn total_tokens(&self) -> (u64, u64) {
        self.turns
            .iter()
            .flat_map(|turn| &turn.steps)
            .fold((0, 0), |(input, output), step| {
                (input + step.input_tokens, output + step.output_tokens)
            })
    }
}

/// Drives test cases through a provider
pub struct Runner<'a> {
    transport: &'a dyn Transport,
    profile: &'a ProviderProfile,
    executor: Option<&'a dyn ToolExecutor>,
    preprocessor: &'a dyn DocPreprocessor,
    max_steps_per_turn: usize,
}

impl<'a> Runner<'a> {
    pub fn new(transport: &'a dyn Transport, profile: &'a ProviderProfile) -> Self {
        Self {
            transport,
            profile,
            executor: None,
            preprocessor: &PassthroughDocs,
            max_steps_per_turn: DEFAULT_MAX_STEPS_PER_TURN,
        }
    }

    /// Feed decoded calls to `executor` and continue the turn with its results
    pub fn with_executor(mut self, executor: &'a dyn ToolExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: &'a dyn DocPreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn max_steps_per_turn(mut self, steps: usize) -> Self {
        self.max_steps_per_turn = steps.max(1);
        self
    }

    /// Run all entries, at most `max_parallel_cases` at a time
    ///
    /// Reports come back in entry order. A failed case never stops the others.
    pub async fn run_all(
        &self,
        entries: &[TestEntry],
        max_parallel_cases: Option<usize>,
    ) -> Vec<CaseReport> {
        let futures: Vec<_> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| async move { (index, self.run_case(entry).await) })
            .collect();

        if let Some(max) = max_parallel_cases {
            info!("Running {} cases with max parallelism: {}", entries.len(), max);
        } else {
            info!("Running {} cases with unlimited parallelism", entries.len());
        }

        let mut results = if let Some(max_cases) = max_parallel_cases {
            let mut stream = FuturesUnordered::new();
            let mut results = Vec::with_capacity(futures.len());
            let mut futures_iter = futures.into_iter();

            for _ in 0..max_cases.max(1).min(futures_iter.len()) {
                if let Some(fut) = futures_iter.next() {
                    stream.push(fut);
                }
            }

            while let Some(result) = stream.next().await {
                results.push(result);
                if let Some(fut) = futures_iter.next() {
                    stream.push(fut);
                }
            }

            results
        } else {
            join_all(futures).await
        };
        results.sort_by_key(|(index, _)| *index);

        let failed = results.iter().filter(|(_, r)| !r.is_success()).count();
        info!(
            "Run complete: {} succeeded, {} failed",
            results.len() - failed,
            failed
        );
        results.into_iter().map(|(_, report)| report).collect()
    }

    /// Run one entry through every turn
    pub async fn run_case(&self, entry: &TestEntry) -> CaseReport {
        let started = Instant::now();
        info!("[Case {}] Starting ({} turns)", entry.id, entry.question.len());

        let mut turns = Vec::with_capacity(entry.question.len());
        let error = match self.drive(entry, &mut turns).await {
            Ok(()) => {
                debug!("[Case {}] Completed", entry.id);
                None
            }
            Err(e) => {
                error!("[Case {}] Failed: {}", entry.id, e);
                Some(e.to_string())
            }
        };

        let elapsed_secs = started.elapsed().as_secs_f64();
        info!("[Case {}] Finished in {:.2}s", entry.id, elapsed_secs);
        CaseReport {
            id: entry.id.clone(),
            turns,
            error,
            elapsed_secs,
        }
    }

    async fn drive(&self, entry: &TestEntry, turns: &mut Vec<TurnRecord>) -> Result<(), CaseError> {
        let profile = self.profile;
        let functions = self
            .preprocessor
            .preprocess(entry.function.clone(), entry.category());
        let catalog = profile.compile(&functions);
        let strategy = profile.strategy();
        let options = profile.normalize_options();
        let headers = profile.request_headers();
        trace!(
            "[Case {}] {} tools, {} name mappings",
            entry.id,
            catalog.tools.len(),
            catalog.names.len()
        );

        let mut conversation = Conversation::new();
        for (turn_index, turn) in entry.question.iter().enumerate() {
            if turn_index == 0 {
                let first = match profile.mode {
                    Mode::Prompting => request::with_function_prompt(turn.clone(), &functions),
                    Mode::FunctionCalling => turn.clone(),
                };
                conversation.start(first)?;
            } else {
                conversation.push_user(turn.clone())?;
            }
            debug!("[Case {}] Turn {}", entry.id, turn_index);

            let mut record = TurnRecord::default();
            // The record is kept even when a step fails part way
            let outcome: Result<(), CaseError> = async {
                for step in 0..self.max_steps_per_turn {
                    let body = serde_json::to_value((strategy.build)(
                        profile,
                        conversation.messages(),
                        Some(catalog.tools.as_slice()),
                    ))?;
                    let raw = self
                        .transport
                        .send_request(&profile.endpoint, &body, &headers, profile.timeout())
                        .await?;

                    let decoded = (strategy.normalize)(&raw, &catalog.names, &options);
                    let status = decoded.status();
                    if !decoded.is_clean() {
                        warn!("[Case {}] Turn {} step {}: {}", entry.id, turn_index, step, status);
                    }
                    let parsed = decoded.into_parsed();
                    debug!(
                        "[Case {}] Turn {} step {}: {} call(s), {} chars of text",
                        entry.id,
                        turn_index,
                        step,
                        parsed.function_calls.len(),
                        parsed.text_content.len()
                    );
                    conversation.push_assistant(&parsed)?;
                    record.steps.push(StepRecord {
                        http_status: raw.status,
                        text: parsed.text_content.clone(),
                        calls: parsed.function_calls.clone(),
                        input_tokens: parsed.input_tokens,
                        output_tokens: parsed.output_tokens,
                        latency_secs: raw.elapsed.as_secs_f64(),
                        status,
                    });

                    let Some(executor) = self.executor else {
                        break;
                    };
                    if parsed.function_calls.is_empty() {
                        break;
                    }
                    let results = executor
                        .execute(&entry.id, &parsed.function_calls)
                        .await
                        .map_err(CaseError::Executor)?;
                    conversation.push_tool_results(&parsed.function_calls, results)?;

                    if step + 1 == self.max_steps_per_turn {
                        warn!(
                            "[Case {}] Turn {} reached the step limit ({})",
                            entry.id, turn_index, self.max_steps_per_turn
                        );
                    }
                }
                Ok(())
            }
            .await;
            turns.push(record);
            outcome?;
        }

        let history: Vec<Message> = conversation.finish()?;
        trace!("[Case {}] Final history has {} messages", entry.id, history.len());
        Ok(())
    }
}
