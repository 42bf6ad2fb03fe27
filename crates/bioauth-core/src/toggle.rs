//! Biometric preference toggle
//!
//! Reads and writes the single string preference that gates the
//! authentication action, and remembers the last settled attempt.

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::auth::{AuthOutcome, BiometricAuthenticator, PlatformContext};
use crate::error::Result;
use crate::store::{PreferenceMutation, PreferenceStore, Preferences};

/// Key holding the toggle value
pub const BIOMETRIC_PREFERENCE_KEY: &str = "data_store";

/// Value of the biometric toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToggleState {
    Enabled,
    Disabled,
}

impl ToggleState {
    /// Stored string for this state
    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleState::Enabled => "Enabled",
            ToggleState::Disabled => "Disabled",
        }
    }

    /// Interpret a stored value; absent or unknown values are `Disabled`
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("Enabled") => ToggleState::Enabled,
            _ => ToggleState::Disabled,
        }
    }

    fn from_preferences(prefs: &Preferences) -> Self {
        Self::from_stored(prefs.get(BIOMETRIC_PREFERENCE_KEY))
    }
}

impl From<bool> for ToggleState {
    fn from(enabled: bool) -> Self {
        if enabled {
            ToggleState::Enabled
        } else {
            ToggleState::Disabled
        }
    }
}

impl fmt::Display for ToggleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A settled authentication attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAttempt {
    pub outcome: AuthOutcome,
    pub settled_at: DateTime<Utc>,
}

/// Toggle flow over a preference store and an authenticator
pub struct BiometricToggle {
    store: Arc<dyn PreferenceStore>,
    authenticator: Arc<dyn BiometricAuthenticator>,
    last_attempt: Mutex<Option<AuthAttempt>>,
}

impl BiometricToggle {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        authenticator: Arc<dyn BiometricAuthenticator>,
    ) -> Self {
        Self {
            store,
            authenticator,
            last_attempt: Mutex::new(None),
        }
    }

    /// Raw stored value, if any
    pub fn stored_value(&self) -> Option<String> {
        self.store
            .snapshot()
            .get(BIOMETRIC_PREFERENCE_KEY)
            .map(str::to_string)
    }

    /// Current toggle state
    pub fn state(&self) -> ToggleState {
        ToggleState::from_preferences(&self.store.snapshot())
    }

    /// Follow the toggle state; yields the current state first
    pub fn watch(&self) -> BoxStream<'static, ToggleState> {
        self.store
            .data()
            .map(|prefs| ToggleState::from_preferences(&prefs))
            .boxed()
    }

    /// Persist a new toggle value
    pub async fn set_enabled(&self, enabled: bool) -> Result<ToggleState> {
        let state = ToggleState::from(enabled);
        self.store
            .edit(vec![PreferenceMutation::set(
                BIOMETRIC_PREFERENCE_KEY,
                state.as_str(),
            )])
            .await?;

        info!("Biometric preference set to {}", state);
        Ok(state)
    }

    /// Whether the authenticate action is offered
    pub fn is_action_available(&self) -> bool {
        self.state() == ToggleState::Enabled
    }

    /// Authenticate if the toggle is enabled.
    ///
    /// Returns `None` without touching the authenticator when it is disabled.
    pub async fn authenticate(&self, context: &PlatformContext) -> Option<AuthOutcome> {
        if !self.is_action_available() {
            debug!("Authenticate requested while biometric preference is disabled");
            return None;
        }

        let outcome = self.authenticator.authenticate(context).await;
        *self.lock_attempt() = Some(AuthAttempt {
            outcome: outcome.clone(),
            settled_at: Utc::now(),
        });
        Some(outcome)
    }

    /// Last settled attempt; toggling never clears it
    pub fn last_attempt(&self) -> Option<AuthAttempt> {
        self.lock_attempt().clone()
    }

    fn lock_attempt(&self) -> std::sync::MutexGuard<'_, Option<AuthAttempt>> {
        self.last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BiometricBridge, NativeSignal, ScriptedSubsystem};
    use crate::store::{PreferenceFileStore, PREFERENCES_FILE_NAME};
    use tempfile::TempDir;

    fn toggle_with(dir: &TempDir, subsystem: Arc<ScriptedSubsystem>) -> BiometricToggle {
        let store = PreferenceFileStore::open_at(dir.path().join(PREFERENCES_FILE_NAME)).unwrap();
        BiometricToggle::new(Arc::new(store), Arc::new(BiometricBridge::new(subsystem)))
    }

    #[test]
    fn test_stored_values() {
        assert_eq!(ToggleState::from_stored(None), ToggleState::Disabled);
        assert_eq!(ToggleState::from_stored(Some("")), ToggleState::Disabled);
        assert_eq!(ToggleState::from_stored(Some("enabled")), ToggleState::Disabled);
        assert_eq!(ToggleState::from_stored(Some("Enabled")), ToggleState::Enabled);
        assert_eq!(ToggleState::Enabled.to_string(), "Enabled");
    }

    #[tokio::test]
    async fn test_disabled_never_reaches_authenticator() {
        let temp_dir = TempDir::new().unwrap();
        let subsystem = Arc::new(ScriptedSubsystem::with_signals(vec![NativeSignal::Succeeded]));
        let toggle = toggle_with(&temp_dir, subsystem.clone());

        assert_eq!(toggle.authenticate(&PlatformContext::FreeThreaded).await, None);
        assert_eq!(subsystem.prompts_presented(), 0);
        assert!(toggle.last_attempt().is_none());
    }

    #[tokio::test]
    async fn test_end_to_end_flow() {
        let temp_dir = TempDir::new().unwrap();
        let subsystem = Arc::new(ScriptedSubsystem::with_signals(vec![NativeSignal::Succeeded]));
        let toggle = toggle_with(&temp_dir, subsystem.clone());

        // Absent preference reads as disabled
        assert_eq!(toggle.stored_value(), None);
        assert_eq!(toggle.state(), ToggleState::Disabled);
        assert!(!toggle.is_action_available());

        toggle.set_enabled(true).await.unwrap();
        assert_eq!(toggle.stored_value().as_deref(), Some("Enabled"));
        assert!(toggle.is_action_available());

        let outcome = toggle.authenticate(&PlatformContext::FreeThreaded).await;
        assert_eq!(outcome, Some(AuthOutcome::Authenticated));

        toggle.set_enabled(false).await.unwrap();
        assert_eq!(toggle.stored_value().as_deref(), Some("Disabled"));
        assert!(!toggle.is_action_available());

        let attempt = toggle.last_attempt().unwrap();
        assert_eq!(attempt.outcome, AuthOutcome::Authenticated);
        assert_eq!(subsystem.prompts_presented(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_outcome_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let subsystem = Arc::new(ScriptedSubsystem::unavailable("No biometric hardware"));
        let toggle = toggle_with(&temp_dir, subsystem);

        toggle.set_enabled(true).await.unwrap();
        let outcome = toggle.authenticate(&PlatformContext::FreeThreaded).await;

        assert_eq!(
            outcome,
            Some(AuthOutcome::Unavailable("No biometric hardware".to_string()))
        );
        assert_eq!(toggle.last_attempt().unwrap().outcome, outcome.unwrap());
    }

    #[tokio::test]
    async fn test_watch_follows_changes() {
        let temp_dir = TempDir::new().unwrap();
        let toggle = toggle_with(&temp_dir, Arc::new(ScriptedSubsystem::manual()));

        let mut states = toggle.watch();
        assert_eq!(states.next().await, Some(ToggleState::Disabled));

        toggle.set_enabled(true).await.unwrap();
        assert_eq!(states.next().await, Some(ToggleState::Enabled));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        toggle_with(&temp_dir, Arc::new(ScriptedSubsystem::manual()))
            .set_enabled(true)
            .await
            .unwrap();

        let reopened = toggle_with(&temp_dir, Arc::new(ScriptedSubsystem::manual()));
        assert_eq!(reopened.state(), ToggleState::Enabled);
    }
}
