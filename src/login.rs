//! Login boundary: turns a login request carrying an optional typing sample
//! into an accept/retry/lockout response, and writes the audit trail.

use crate::audit::{AuditSink, AuthEvent, AuthEventKind, SecurityNotice};
use crate::compare::{compare_patterns, MatchResult};
use crate::config::Config;
use crate::error::{KeyprintError, Result};
use crate::keystroke::TypingSample;
use crate::pattern::{generate_pattern, TypingPattern};
use crate::store::PatternStore;
use crate::verification::{AttemptLedger, VerificationCoordinator, VerificationOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub customer_id: String,
    #[serde(default)]
    pub typing_sample: Option<TypingSample>,
    #[serde(default)]
    pub attempt_number: Option<u32>,
    /// Identifies one login transaction across retries.
    #[serde(default)]
    pub transaction_token: Option<String>,
}

impl LoginRequest {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            typing_sample: None,
            attempt_number: None,
            transaction_token: None,
        }
    }

    pub fn with_sample(mut self, sample: TypingSample) -> Self {
        self.typing_sample = Some(sample);
        self
    }

    pub fn with_attempt(mut self, attempt_number: u32) -> Self {
        self.attempt_number = Some(attempt_number);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.transaction_token = Some(token.into());
        self
    }

    /// Attempt ledger key: the transaction token, or one shared entry per customer without one.
    pub fn ledger_key(&self) -> String {
        match &self.transaction_token {
            Some(token) => format!("token:{token}"),
            None => format!("customer:{}", self.customer_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts_left: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_retry: Option<bool>,
    /// Attempt number the client should echo on its next submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_number: Option<u32>,
    pub message: String,
}

impl LoginResponse {
    fn credentials_only() -> Self {
        Self {
            accepted: true,
            score: None,
            attempts_left: None,
            can_retry: None,
            attempt_number: None,
            message: "Login successful".to_string(),
        }
    }
}

pub struct LoginGate<'a, S: PatternStore, A: AuditSink> {
    store: &'a S,
    audit: &'a A,
    coordinator: VerificationCoordinator,
    min_phrase_chars: usize,
    ledger: Option<&'a AttemptLedger>,
}

impl<'a, S: PatternStore, A: AuditSink> LoginGate<'a, S, A> {
    pub fn new(store: &'a S, audit: &'a A, config: &Config) -> Self {
        Self {
            store,
            audit,
            coordinator: VerificationCoordinator::new(config.acceptance_threshold, config.max_retries),
            min_phrase_chars: config.min_phrase_chars,
            ledger: None,
        }
    }

    /// Keep attempt counts server-side instead of trusting the client echo.
    pub fn with_ledger(mut self, ledger: &'a AttemptLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Decide the biometric half of a login whose credentials already checked out.
    pub fn verify(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let Some(sample) = &request.typing_sample else {
            tracing::debug!(customer_id = %request.customer_id, "no typing sample, credentials only");
            return Ok(LoginResponse::credentials_only());
        };

        let patterns = self
            .candidate(sample)
            .and_then(|candidate| Ok((candidate, self.reference(&request.customer_id)?)));
        let (candidate, reference) = match patterns {
            Ok(patterns) => patterns,
            Err(err) => {
                tracing::warn!(customer_id = %request.customer_id, error = %err, "typing sample not scored");
                self.audit_event(
                    AuthEvent::new(&request.customer_id, AuthEventKind::BiometricRejected, err.to_string())
                        .with_attempt(request.attempt_number.unwrap_or(0)),
                );
                return Err(err);
            }
        };
        let attempt_number = self.attempt_number(request);

        let result = compare_patterns(&reference, &candidate);
        let outcome = self.coordinator.decide(&result, attempt_number);
        let customer_id = request.customer_id.as_str();

        let response = match outcome {
            VerificationOutcome::Accepted { score } => {
                tracing::info!(customer_id, score, "typing pattern accepted");
                self.audit_event(
                    AuthEvent::new(customer_id, AuthEventKind::BiometricAccepted, result.message.clone())
                        .with_score(score)
                        .with_attempt(attempt_number),
                );
                if let Some(ledger) = self.ledger {
                    ledger.clear(&request.ledger_key());
                }
                LoginResponse {
                    accepted: true,
                    score: Some(score),
                    attempts_left: None,
                    can_retry: None,
                    attempt_number: None,
                    message: "Login successful".to_string(),
                }
            }
            VerificationOutcome::RetryOffered {
                score,
                attempt_number: next_attempt,
                attempts_left,
            } => {
                let reason = rejection_message(&result);
                tracing::warn!(customer_id, score, attempts_left, "typing pattern rejected");
                self.audit_event(
                    AuthEvent::new(customer_id, AuthEventKind::BiometricRejected, reason.clone())
                        .with_score(score)
                        .with_attempt(attempt_number),
                );
                if let Some(ledger) = self.ledger {
                    ledger.record_rejection(&request.ledger_key());
                }
                LoginResponse {
                    accepted: false,
                    score: Some(score),
                    attempts_left: Some(attempts_left),
                    can_retry: Some(true),
                    attempt_number: Some(next_attempt),
                    message: format!("{reason} {attempts_left} attempts remaining."),
                }
            }
            VerificationOutcome::Exhausted {
                score,
                attempts_left,
            } => {
                tracing::warn!(customer_id, score, "verification attempts exhausted");
                let error = KeyprintError::RetryBudgetExhausted { score };
                self.audit_event(
                    AuthEvent::new(customer_id, AuthEventKind::RetryBudgetExhausted, error.to_string())
                        .with_score(score)
                        .with_attempt(attempt_number),
                );
                let failures = attempt_number.saturating_add(1);
                if let Err(e) = self
                    .audit
                    .notify(&SecurityNotice::repeated_failures(customer_id, failures))
                {
                    tracing::warn!(error = %e, "failed to raise security notice");
                }
                LoginResponse {
                    accepted: false,
                    score: Some(score),
                    attempts_left: Some(attempts_left),
                    can_retry: Some(false),
                    attempt_number: None,
                    message: error.user_message(),
                }
            }
            VerificationOutcome::NoSample => LoginResponse::credentials_only(),
        };

        Ok(response)
    }

    /// Standalone "check my typing" comparison, judged against the configured threshold.
    pub fn verify_manual(&self, customer_id: &str, sample: &TypingSample) -> Result<MatchResult> {
        let candidate = self.candidate(sample)?;
        let reference = self.reference(customer_id)?;

        // the configured threshold can only tighten the comparator's own verdict
        let mut result = compare_patterns(&reference, &candidate);
        if result.is_match && result.score < self.coordinator.acceptance_threshold {
            result.is_match = false;
            result.message = KeyprintError::LowConfidence {
                score: result.score,
            }
            .user_message();
        }
        Ok(result)
    }

    fn candidate(&self, sample: &TypingSample) -> Result<TypingPattern> {
        sample.check_phrase(self.min_phrase_chars)?;
        generate_pattern(&sample.keystrokes, &sample.text)
    }

    fn reference(&self, customer_id: &str) -> Result<TypingPattern> {
        self.store
            .latest_pattern(customer_id)?
            .map(|stored| stored.pattern)
            .ok_or_else(|| KeyprintError::NoEnrolledPattern {
                customer_id: customer_id.to_string(),
            })
    }

    fn attempt_number(&self, request: &LoginRequest) -> u32 {
        match self.ledger {
            Some(ledger) => ledger.effective_attempt(&request.ledger_key(), request.attempt_number),
            None => request.attempt_number.unwrap_or(0),
        }
    }

    fn audit_event(&self, event: AuthEvent) {
        if let Err(e) = self.audit.record(&event) {
            tracing::warn!(error = %e, "failed to record audit entry");
        }
    }
}

fn rejection_message(result: &MatchResult) -> String {
    result
        .rejection()
        .map(|e| e.user_message())
        .unwrap_or_else(|| result.message.clone())
}
