//! Protocol adaptation between function-calling benchmarks and LLM providers
//!
//! Function docs are compiled into provider tool payloads ([`catalog`]), turn
//! buffers into request envelopes ([`request`]), and provider replies are
//! normalized back into [`types::ParsedResponse`]s ([`response`]).

pub mod catalog;
pub mod config;
pub mod conversation;
pub mod provider;
pub mod request;
pub mod response;
pub mod runner;
pub mod transport;
pub mod types;
