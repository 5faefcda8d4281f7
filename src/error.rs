//! Error types shared by the pattern engine and its boundaries.

/// What was too short when a sample was rejected as insufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortfall {
    /// Fewer keystrokes than the generator needs.
    Keystrokes { found: usize, required: usize },
    /// Typed phrase shorter than the capture-boundary minimum (in chars).
    Phrase { found: usize, required: usize },
}

impl std::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shortfall::Keystrokes { found, required } => {
                write!(f, "{found} keystrokes recorded, at least {required} needed")
            }
            Shortfall::Phrase { found, required } => {
                write!(f, "phrase has {found} characters, at least {required} needed")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyprintError {
    /// Not enough typing to build a pattern.
    #[error("insufficient data: {0}")]
    InsufficientData(Shortfall),

    /// Enrollment sample failed the quality gate.
    #[error("pattern quality too low ({quality:.2}): {message}")]
    LowQuality { quality: f64, message: String },

    /// Verification sample differs too much in length from the enrolled pattern.
    #[error("typing patterns are too different in length (score {score:.2})")]
    LengthMismatch { score: f64 },

    /// Verification sample scored below the acceptance threshold.
    #[error("typing pattern does not match (score {score:.2})")]
    LowConfidence { score: f64 },

    /// Retry budget for this login attempt is spent.
    #[error("verification attempts exhausted (last score {score:.2})")]
    RetryBudgetExhausted { score: f64 },

    #[error("no typing pattern enrolled for customer {customer_id}")]
    NoEnrolledPattern { customer_id: String },

    #[error("capture cancelled")]
    CaptureCancelled,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KeyprintError>;

impl KeyprintError {
    /// Core errors are all recovered by re-prompting the user.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            KeyprintError::Storage(_) | KeyprintError::Serialization(_) | KeyprintError::Io(_)
        )
    }

    /// Numeric score attached to a rejection, if any.
    pub fn score(&self) -> Option<f64> {
        match self {
            KeyprintError::LowQuality { quality, .. } => Some(*quality),
            KeyprintError::LengthMismatch { score }
            | KeyprintError::LowConfidence { score }
            | KeyprintError::RetryBudgetExhausted { score } => Some(*score),
            _ => None,
        }
    }

    /// Text that is safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            KeyprintError::InsufficientData(Shortfall::Keystrokes { required, .. }) => {
                format!("Please type at least {required} keystrokes for pattern analysis")
            }
            KeyprintError::InsufficientData(Shortfall::Phrase { required, .. }) => {
                format!("Please type at least {required} characters for a good pattern")
            }
            KeyprintError::LowQuality { message, .. } => message.clone(),
            KeyprintError::LengthMismatch { .. } => {
                "Typing patterns are too different in length".to_string()
            }
            KeyprintError::LowConfidence { .. } => {
                "Typing pattern does not match. Please try typing more consistently.".to_string()
            }
            KeyprintError::RetryBudgetExhausted { .. } => {
                "Too many failed attempts. Please restart the login.".to_string()
            }
            KeyprintError::NoEnrolledPattern { .. } => {
                "No typing pattern found for this user".to_string()
            }
            KeyprintError::CaptureCancelled => "Recording cancelled".to_string(),
            KeyprintError::Storage(_) | KeyprintError::Serialization(_) | KeyprintError::Io(_) => {
                "Internal error. Please try again later.".to_string()
            }
        }
    }
}
