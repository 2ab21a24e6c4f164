//! Scripted decision provider for tests.

use super::{
    Context, DecisionProvider, DecisionResponse, LearningRequest, ProviderError, ProviderErrorKind,
};
use crate::domain::Decision;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Decide(Context),
    Summarize(LearningRequest),
}

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<Result<DecisionResponse, ProviderError>>,
    summary: Option<Result<String, ProviderError>>,
    delay: Option<Duration>,
    calls: Vec<ProviderCall>,
}

/// Returns queued responses in order, then empty decision lists.
#[derive(Debug, Clone, Default)]
pub struct MockDecisionProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockDecisionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_decisions(self, decisions: Vec<Decision>) -> Self {
        self.push_decisions(decisions);
        self
    }

    pub fn with_response(self, response: Result<DecisionResponse, ProviderError>) -> Self {
        self.lock().responses.push_back(response);
        self
    }

    pub fn with_summary(self, summary: &str) -> Self {
        self.lock().summary = Some(Ok(summary.to_string()));
        self
    }

    pub fn with_failing_summary(self) -> Self {
        self.lock().summary = Some(Err(ProviderError::new(ProviderErrorKind::Other(
            "summary unavailable".to_string(),
        ))));
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    pub fn push_decisions(&self, decisions: Vec<Decision>) {
        self.lock().responses.push_back(Ok(DecisionResponse {
            decisions,
            cot_trace: Some("mock trace".to_string()),
            prompt: Some("mock prompt".to_string()),
        }));
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    pub fn decide_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProviderCall::Decide(_)))
            .count()
    }

    pub fn summarize_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProviderCall::Summarize(_)))
            .count()
    }

    /// Context passed to the most recent `decide` call.
    pub fn last_context(&self) -> Option<Context> {
        self.lock().calls.iter().rev().find_map(|c| match c {
            ProviderCall::Decide(ctx) => Some(ctx.clone()),
            ProviderCall::Summarize(_) => None,
        })
    }
}

#[async_trait]
impl DecisionProvider for MockDecisionProvider {
    async fn decide(&self, context: &Context) -> Result<DecisionResponse, ProviderError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(ProviderCall::Decide(context.clone()));
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lock()
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(DecisionResponse::default()))
    }

    async fn summarize(&self, request: &LearningRequest) -> Result<String, ProviderError> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::Summarize(request.clone()));
        state
            .summary
            .clone()
            .unwrap_or_else(|| Ok(format!("{} trades reviewed", request.outcomes.len())))
    }
}
