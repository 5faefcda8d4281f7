use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    Enrolled,
    EnrollmentRejected,
    BiometricAccepted,
    BiometricRejected,
    RetryBudgetExhausted,
}

impl AuthEventKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "enrolled" => Some(AuthEventKind::Enrolled),
            "enrollment_rejected" => Some(AuthEventKind::EnrollmentRejected),
            "biometric_accepted" => Some(AuthEventKind::BiometricAccepted),
            "biometric_rejected" => Some(AuthEventKind::BiometricRejected),
            "retry_budget_exhausted" => Some(AuthEventKind::RetryBudgetExhausted),
            _ => None,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            AuthEventKind::EnrollmentRejected
                | AuthEventKind::BiometricRejected
                | AuthEventKind::RetryBudgetExhausted
        )
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    pub customer_id: String,
    pub kind: AuthEventKind,
    pub score: Option<f64>,
    pub attempt_number: Option<u32>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl AuthEvent {
    pub fn new(customer_id: impl Into<String>, kind: AuthEventKind, detail: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            kind,
            score: None,
            attempt_number: None,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_attempt(mut self, attempt_number: u32) -> Self {
        self.attempt_number = Some(attempt_number);
        self
    }
}

/// User-facing alert raised after repeated failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityNotice {
    pub customer_id: String,
    pub title: String,
    pub body: String,
    pub at: DateTime<Utc>,
}

impl SecurityNotice {
    pub fn repeated_failures(customer_id: impl Into<String>, attempts: u32) -> Self {
        Self {
            customer_id: customer_id.into(),
            title: "Failed sign-in attempts".to_string(),
            body: format!(
                "Typing verification failed {attempts} times in a row. If this wasn't you, change your password."
            ),
            at: Utc::now(),
        }
    }
}

/// Where the login and enrollment boundaries write their side effects.
pub trait AuditSink {
    fn record(&self, event: &AuthEvent) -> Result<()>;
    fn notify(&self, notice: &SecurityNotice) -> Result<()>;
}

/// Audit sink that only emits log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuthEvent) -> Result<()> {
        if event.kind.is_failure() {
            tracing::warn!(
                customer_id = %event.customer_id,
                kind = %event.kind,
                score = ?event.score,
                attempt = ?event.attempt_number,
                "{}",
                event.detail
            );
        } else {
            tracing::info!(customer_id = %event.customer_id, kind = %event.kind, score = ?event.score, "{}", event.detail);
        }
        Ok(())
    }

    fn notify(&self, notice: &SecurityNotice) -> Result<()> {
        tracing::warn!(customer_id = %notice.customer_id, title = %notice.title, "security notice raised");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips_through_db_text() {
        for kind in [
            AuthEventKind::Enrolled,
            AuthEventKind::EnrollmentRejected,
            AuthEventKind::BiometricAccepted,
            AuthEventKind::BiometricRejected,
            AuthEventKind::RetryBudgetExhausted,
        ] {
            assert_eq!(AuthEventKind::from_db(&kind.to_string()), Some(kind));
        }
        assert_eq!(AuthEventKind::from_db("password_reset"), None);
    }

    #[test]
    fn builder_sets_optional_fields() {
        let ev = AuthEvent::new("1234567890", AuthEventKind::BiometricRejected, "low confidence")
            .with_score(0.32)
            .with_attempt(1);
        assert_eq!(ev.score, Some(0.32));
        assert_eq!(ev.attempt_number, Some(1));
        assert!(ev.kind.is_failure());
        assert!(TracingAuditSink.record(&ev).is_ok());
    }
}
