use crate::audit::{AuditSink, AuthEvent, AuthEventKind};
use crate::config::Config;
use crate::error::{KeyprintError, Result};
use crate::keystroke::TypingSample;
use crate::pattern::generate_pattern;
use crate::quality::assess_quality;
use crate::store::PatternStore;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReceipt {
    pub pattern_id: i64,
    pub quality: f64,
    pub message: String,
}

/// Enrollment boundary: only patterns that pass the quality gate are stored.
pub struct Enrollment<'a, S: PatternStore, A: AuditSink> {
    store: &'a S,
    audit: &'a A,
    min_phrase_chars: usize,
}

impl<'a, S: PatternStore, A: AuditSink> Enrollment<'a, S, A> {
    pub fn new(store: &'a S, audit: &'a A, config: &Config) -> Self {
        Self {
            store,
            audit,
            min_phrase_chars: config.min_phrase_chars,
        }
    }

    pub fn enroll(&self, customer_id: &str, sample: &TypingSample) -> Result<EnrollmentReceipt> {
        sample.check_phrase(self.min_phrase_chars)?;
        let pattern = generate_pattern(&sample.keystrokes, &sample.text)?;

        let assessment = match assess_quality(&pattern).into_result() {
            Ok(assessment) => assessment,
            Err(err) => {
                if let KeyprintError::LowQuality { quality, message } = &err {
                    let event = AuthEvent::new(customer_id, AuthEventKind::EnrollmentRejected, message.clone())
                        .with_score(*quality);
                    if let Err(e) = self.audit.record(&event) {
                        tracing::warn!(error = %e, "failed to record audit entry");
                    }
                }
                return Err(err);
            }
        };

        let pattern_id = self.store.save_pattern(customer_id, &pattern, assessment.quality)?;
        tracing::info!(
            customer_id,
            pattern_id,
            keystrokes = pattern.keystrokes.len(),
            quality = assessment.quality,
            "enrolled typing pattern"
        );

        let event = AuthEvent::new(customer_id, AuthEventKind::Enrolled, assessment.message.clone())
            .with_score(assessment.quality);
        if let Err(e) = self.audit.record(&event) {
            tracing::warn!(error = %e, "failed to record audit entry");
        }

        Ok(EnrollmentReceipt {
            pattern_id,
            quality: assessment.quality,
            message: assessment.message,
        })
    }
}
