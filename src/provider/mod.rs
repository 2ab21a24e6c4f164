//! External reasoning provider: turns a cycle [`Context`] into decisions.
//!
//! From the core's point of view the provider is a pure function. Prompt
//! construction and model selection happen on the far side of the trait.

use crate::domain::{AccountSnapshot, Decision, Position, TimeMs, TradeOutcome};
use crate::engine::{MarketSnapshot, PerformanceSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod mock;

pub use http::HttpDecisionProvider;
pub use mock::{MockDecisionProvider, ProviderCall};

/// One candidate symbol with its derived indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMarket {
    pub symbol: String,
    pub price: f64,
    pub indicators: MarketSnapshot,
}

/// Everything the provider sees for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub current_time: TimeMs,
    pub runtime_minutes: i64,
    pub call_count: u64,
    pub account: AccountSnapshot,
    pub positions: Vec<Position>,
    pub candidates: Vec<CandidateMarket>,
    pub performance: Option<PerformanceSummary>,
    pub learning_summary: Option<String>,
    pub max_positions: usize,
    pub btc_eth_leverage: u32,
    pub altcoin_leverage: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub cot_trace: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Input for a learning-summary pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningRequest {
    /// Newest first.
    pub outcomes: Vec<TradeOutcome>,
    pub performance: PerformanceSummary,
}

/// Provider failure. Whatever prompt and trace were produced before the
/// failure travel with it so the cycle record can keep them.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub prompt: Option<String>,
    pub cot_trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderErrorKind {
    Network(String),
    Http { status: u16, message: String },
    Parse(String),
    Timeout,
    Other(String),
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind) -> Self {
        Self {
            kind,
            prompt: None,
            cot_trace: None,
        }
    }

    pub fn with_trace(mut self, prompt: Option<String>, cot_trace: Option<String>) -> Self {
        self.prompt = prompt;
        self.cot_trace = cot_trace;
        self
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Network(msg) => write!(f, "provider network error: {}", msg),
            ProviderErrorKind::Http { status, message } => {
                write!(f, "provider HTTP error {}: {}", status, message)
            }
            ProviderErrorKind::Parse(msg) => write!(f, "provider response invalid: {}", msg),
            ProviderErrorKind::Timeout => write!(f, "provider call timed out"),
            ProviderErrorKind::Other(msg) => write!(f, "provider error: {}", msg),
        }
    }
}

#[async_trait]
pub trait DecisionProvider: Send + Sync + fmt::Debug {
    /// Produce this cycle's decisions. Must not touch core state.
    async fn decide(&self, context: &Context) -> Result<DecisionResponse, ProviderError>;

    /// Summarize recent outcomes into free text for future prompts.
    async fn summarize(&self, request: &LearningRequest) -> Result<String, ProviderError>;
}
