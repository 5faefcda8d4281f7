// Library surface for the binary and for integration tests.
pub mod app_dirs;
pub mod audit;
pub mod capture;
pub mod compare;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod keystroke;
pub mod login;
pub mod pattern;
pub mod quality;
pub mod store;
pub mod util;
pub mod verification;

pub use compare::{compare_patterns, MatchResult};
pub use error::{KeyprintError, Result};
pub use keystroke::{KeystrokeEvent, TypingSample};
pub use pattern::{generate_pattern, TypingPattern};
pub use quality::{assess_quality, QualityAssessment};
pub use verification::{VerificationCoordinator, VerificationOutcome};
