//! Settled result of one authentication call

use serde::{Deserialize, Serialize};

use super::subsystem::NativeSignal;

/// Outcome of a single `authenticate` call.
///
/// Exactly one variant is produced per call. `Rejected` and `Error` are kept
/// apart even though a front-end may render them the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AuthOutcome {
    /// The biometric check passed
    Authenticated,
    /// The check ran and did not pass (wrong biometric or user dismissed)
    Rejected,
    /// The subsystem cannot be used on this device or configuration
    Unavailable(String),
    /// The subsystem reported a fault; the message is opaque diagnostic text
    Error(String),
}

impl AuthOutcome {
    /// Whether retrying in this session could change the result
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AuthOutcome::Unavailable(_))
    }
}

impl From<NativeSignal> for AuthOutcome {
    fn from(signal: NativeSignal) -> Self {
        match signal {
            NativeSignal::Succeeded => AuthOutcome::Authenticated,
            NativeSignal::Failed | NativeSignal::Cancelled => AuthOutcome::Rejected,
            NativeSignal::Error { message, .. } => AuthOutcome::Error(message),
        }
    }
}
