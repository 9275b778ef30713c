use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use tracing::{error, info, warn};

use super::llm_client::LLMClient;
use super::prompt::{PromptBuilder, PromptTemplate};
use super::repair::parse_content;
use super::response::{completion_content, LLMExtractionRequest, LLMExtractionResponse};
use crate::domain::ExtractionResult;
use crate::error::{ExtractionError, FailureKind};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Zero retries immediately. Otherwise doubles after every failure.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let step = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(step)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::ZERO)
    }
}

#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    last_failure: Option<FailureKind>,
}

/// Result of an extraction together with how it was obtained.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub result: ExtractionResult,
    pub attempts: u32,
    /// Set when the budget ran out; the result is then empty.
    pub exhausted_on: Option<FailureKind>,
}

pub struct Extractor<C: LLMClient> {
    llm: Arc<C>,
    prompt_builder: PromptBuilder,
    policy: RetryPolicy,
}

impl<C: LLMClient> Extractor<C> {
    pub fn new(llm: Arc<C>, template: PromptTemplate) -> Self {
        Self {
            llm,
            prompt_builder: PromptBuilder::new(template),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Never fails: an exhausted retry budget yields an empty result.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        self.extract_with_report(text).result
    }

    pub fn extract_with_report(&self, text: &str) -> ExtractionReport {
        let request = self.prompt_builder.build(text);
        let max_attempts = self.policy.max_attempts;
        let mut state = RetryState::default();

        while state.attempt < max_attempts {
            state.attempt += 1;
            match self.attempt(&request) {
                Ok(result) => {
                    info!(
                        attempt = state.attempt,
                        entities = result.entities().len(),
                        relations = result.relations().len(),
                        "extraction des entités et relations réussie"
                    );
                    return ExtractionReport {
                        result,
                        attempts: state.attempt,
                        exhausted_on: None,
                    };
                }
                Err(err) => {
                    state.last_failure = Some(err.kind());
                    if state.attempt < max_attempts {
                        warn!(
                            attempt = state.attempt,
                            max_attempts,
                            failure = %err.kind(),
                            erreur = %err,
                            "tentative d'extraction échouée, nouvel essai"
                        );
                        let delay = self.policy.delay_after(state.attempt);
                        if !delay.is_zero() {
                            sleep(delay);
                        }
                    } else {
                        error!(
                            attempt = state.attempt,
                            failure = %err.kind(),
                            erreur = %err,
                            "nombre maximal de tentatives atteint, aucune extraction"
                        );
                    }
                }
            }
        }

        ExtractionReport {
            result: ExtractionResult::empty(),
            attempts: state.attempt,
            exhausted_on: state.last_failure,
        }
    }

    fn attempt(&self, request: &LLMExtractionRequest) -> Result<ExtractionResult, ExtractionError> {
        let payload = self.llm.chat(request)?;
        let content = completion_content(&payload)?;
        let value = parse_content(content)?;
        let response = LLMExtractionResponse::from_value(value)?;
        Ok(response.into_result())
    }
}
