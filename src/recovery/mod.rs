//! Recovery subsystem for kvguard
//!
//! # Components
//!
//! - `validator`: per-key structural rules
//! - `report`: integrity reports and recommendations
//! - `session`: registry of in-progress batch recoveries
//! - `coordinator`: checks, strategies, batches
//!
//! # Invariants
//!
//! - A checksum or parse failure is always reported as corruption
//! - Manual recovery never restores
//! - Conservative recovery never restores over a rule violation
//! - Every finished batch satisfies `recovered + failed == total`
//! - Terminal sessions are not retrievable

mod coordinator;
mod report;
mod session;
mod validator;

pub use coordinator::{
    RecoveryCoordinator, RecoveryOptions, RecoveryOutcome, RecoveryStrategy, NO_RECOVERY_NEEDED,
};
pub use report::{
    CorruptionType, IntegrityReport, KeyAction, OverallStatus, RecommendedAction,
    RecoveryRecommendations, Urgency,
};
pub use session::{RecoverySession, SessionRegistry, SessionStatus, SessionSummary};
pub use validator::{validate, RuleSet, ValidationOutcome, ValidationRules};
