//! Native biometric subsystem trait definitions
//!
//! This is the only shape the bridge depends on: one synchronous capability
//! query and one prompt trigger that reports back through a callback.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of the synchronous capability query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Hardware present and a credential is enrolled
    Available,
    /// The subsystem cannot be used (no hardware, nothing enrolled, policy)
    Unavailable(String),
}

/// A terminal signal reported by the native subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeSignal {
    /// The presented credential matched
    Succeeded,
    /// A credential was presented and did not match
    Failed,
    /// The user dismissed the prompt or pressed the negative button
    Cancelled,
    /// Hardware fault, lockout or any other subsystem failure
    Error { code: i32, message: String },
}

/// Completion handler handed to the subsystem.
///
/// Subsystems may invoke it from any thread, possibly more than once.
pub type SignalCallback = Arc<dyn Fn(NativeSignal) + Send + Sync>;

/// Text shown on the system prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    /// Prompt title
    pub title: String,
    /// Prompt subtitle
    pub subtitle: String,
    /// Label of the dismiss button
    pub negative_button: String,
    /// Reason string for subsystems that take a single localized reason
    pub reason: String,
}

impl Default for PromptRequest {
    fn default() -> Self {
        Self {
            title: "Biometric Authentication".to_string(),
            subtitle: "Authenticate using biometrics".to_string(),
            negative_button: "Cancel".to_string(),
            reason: "Authenticate using biometrics".to_string(),
        }
    }
}

/// Handle to one presented prompt
pub trait PromptRegistration: Send {
    /// Dismiss the prompt if the platform allows it.
    ///
    /// Platforms without a dismiss API keep the default; the bridge then
    /// discards whatever result arrives later.
    fn cancel(self: Box<Self>) {}
}

/// Registration for subsystems that cannot dismiss their prompt
pub struct DetachedPrompt;

impl PromptRegistration for DetachedPrompt {}

/// Trait for native biometric subsystems
pub trait BiometricSubsystem: Send + Sync {
    /// Query availability without presenting any UI
    fn can_authenticate(&self) -> Availability;

    /// Present the prompt once and report through `on_result`
    fn present_prompt(
        &self,
        request: &PromptRequest,
        on_result: SignalCallback,
    ) -> Box<dyn PromptRegistration>;

    /// Get a human-readable name for this subsystem
    fn backend_name(&self) -> &'static str;
}
