//! # bioauth-core
//!
//! Core of the biometric preference toggle:
//! - A bridge that turns callback-based native biometric subsystems into one
//!   awaitable, cancellable call with a settle-once outcome
//! - A process-wide handle that opens the preference store exactly once
//! - The toggle flow gating authentication on a stored preference

pub mod auth;
pub mod error;
pub mod settings;
pub mod store;
pub mod toggle;

pub use auth::{
    AuthOutcome, Availability, BiometricAuthenticator, BiometricBridge, BiometricSubsystem,
    CommandSpec, NativeSignal, PlatformContext, ProcessSubsystem, PromptRequest,
    ScriptedSubsystem, UiHost, UiThreadHost,
};
pub use error::{BioauthError, Result};
pub use settings::{default_data_dir, Settings, SettingsManager, SubsystemSettings};
pub use store::{get_store, PreferenceFileStore, PreferenceStore, Preferences, StoreHandle};
pub use toggle::{AuthAttempt, BiometricToggle, ToggleState, BIOMETRIC_PREFERENCE_KEY};
