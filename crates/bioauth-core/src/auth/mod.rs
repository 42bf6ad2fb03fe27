//! Biometric authentication bridge
//!
//! Reconciles callback-style native subsystems with a single awaitable,
//! cancellable call:
//! - `subsystem`: the native shape the bridge depends on
//! - `context`: threading model and UI-thread marshaling
//! - `bridge`: the adapter itself, built on a settle-once completion slot
//! - `scripted` and `process`: concrete subsystems

mod bridge;
mod context;
mod outcome;
mod process;
mod scripted;
mod settle;
mod subsystem;

pub use bridge::{BiometricAuthenticator, BiometricBridge, CLOSED_CALL_MESSAGE};
pub use context::{DispatchError, PlatformContext, UiHost, UiJob, UiThreadHost};
pub use outcome::AuthOutcome;
pub use process::{CommandSpec, ProcessSubsystem};
pub use scripted::{ScriptedResponse, ScriptedSubsystem};
pub use subsystem::{
    Availability, BiometricSubsystem, DetachedPrompt, NativeSignal, PromptRegistration,
    PromptRequest, SignalCallback,
};
