//! Callback-to-await bridge over a native biometric subsystem

use async_trait::async_trait;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::context::{PlatformContext, UiHost};
use super::outcome::AuthOutcome;
use super::settle::{completion_slot, SlotDetacher};
use super::subsystem::{
    Availability, BiometricSubsystem, PromptRegistration, PromptRequest, SignalCallback,
};

/// Reported when the subsystem drops its completion handler without a result
pub const CLOSED_CALL_MESSAGE: &str = "Biometric subsystem released the prompt without reporting a result";

/// Platform-neutral biometric capability
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    /// Run one authentication and wait for its settled outcome.
    ///
    /// Dropping the returned future before it completes cancels the call:
    /// the native callback is detached and the prompt dismissed where the
    /// platform supports it.
    async fn authenticate(&self, context: &PlatformContext) -> AuthOutcome;
}

enum PromptState {
    /// Trigger queued, prompt not shown yet
    Scheduled,
    Presented(Box<dyn PromptRegistration>),
    /// The caller gave up; nothing may be presented any more
    Abandoned,
}

type SharedPrompt = Arc<Mutex<PromptState>>;

fn lock_prompt(prompt: &SharedPrompt) -> MutexGuard<'_, PromptState> {
    prompt.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Trigger the native prompt unless the caller already gave up
fn present(
    subsystem: &dyn BiometricSubsystem,
    request: &PromptRequest,
    on_result: SignalCallback,
    prompt: &SharedPrompt,
) {
    let mut state = lock_prompt(prompt);
    if !matches!(*state, PromptState::Scheduled) {
        debug!("Caller cancelled before the prompt was shown");
        return;
    }

    let registration = subsystem.present_prompt(request, on_result);
    *state = PromptState::Presented(registration);
    debug!("Native prompt presented");
}

/// Cancels the call when the awaiting future is dropped early
struct PendingPrompt {
    detacher: SlotDetacher,
    prompt: SharedPrompt,
    host: Option<Arc<dyn UiHost>>,
    armed: bool,
}

impl PendingPrompt {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingPrompt {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let was_pending = self.detacher.detach();
        let previous = mem::replace(&mut *lock_prompt(&self.prompt), PromptState::Abandoned);
        if !was_pending {
            return;
        }
        info!("Authentication cancelled by caller");

        if let PromptState::Presented(registration) = previous {
            match &self.host {
                Some(host) => {
                    if host.dispatch(Box::new(move || registration.cancel())).is_err() {
                        warn!("Could not dismiss prompt: UI host stopped");
                    }
                }
                None => registration.cancel(),
            }
        }
    }
}

/// Adapts a [`BiometricSubsystem`] into a [`BiometricAuthenticator`].
///
/// The bridge keeps no per-call state; every call gets its own completion
/// slot and prompt registration, so overlapping calls stay independent.
pub struct BiometricBridge {
    subsystem: Arc<dyn BiometricSubsystem>,
    request: PromptRequest,
}

impl BiometricBridge {
    /// Create a bridge with the default prompt text
    pub fn new(subsystem: Arc<dyn BiometricSubsystem>) -> Self {
        Self {
            subsystem,
            request: PromptRequest::default(),
        }
    }

    /// Use custom prompt text
    pub fn with_request(mut self, request: PromptRequest) -> Self {
        self.request = request;
        self
    }

    /// Name of the wrapped subsystem
    pub fn backend_name(&self) -> &'static str {
        self.subsystem.backend_name()
    }

    async fn run(&self, call_id: Uuid, context: &PlatformContext) -> AuthOutcome {
        if let Availability::Unavailable(reason) = self.subsystem.can_authenticate() {
            info!(%reason, "Biometric subsystem unavailable");
            return AuthOutcome::Unavailable(reason);
        }

        let (callback, detacher, receiver) = completion_slot(call_id);
        let prompt: SharedPrompt = Arc::new(Mutex::new(PromptState::Scheduled));
        let mut pending = PendingPrompt {
            detacher,
            prompt: Arc::clone(&prompt),
            host: context.ui_host().cloned(),
            armed: true,
        };

        match context {
            PlatformContext::FreeThreaded => {
                present(self.subsystem.as_ref(), &self.request, callback, &prompt);
            }
            PlatformContext::UiThread(host) => {
                let subsystem = Arc::clone(&self.subsystem);
                let request = self.request.clone();
                let job = Box::new(move || {
                    present(subsystem.as_ref(), &request, callback, &prompt);
                });
                if let Err(e) = host.dispatch(job) {
                    pending.disarm();
                    error!("Could not marshal prompt onto UI thread: {}", e);
                    return AuthOutcome::Error(e.to_string());
                }
            }
        }

        let outcome = match receiver.await {
            Ok(signal) => AuthOutcome::from(signal),
            Err(_) => {
                error!("{}", CLOSED_CALL_MESSAGE);
                AuthOutcome::Error(CLOSED_CALL_MESSAGE.to_string())
            }
        };
        pending.disarm();

        info!(?outcome, "Authentication settled");
        outcome
    }
}

#[async_trait]
impl BiometricAuthenticator for BiometricBridge {
    async fn authenticate(&self, context: &PlatformContext) -> AuthOutcome {
        let call_id = Uuid::new_v4();
        let span = info_span!(
            "authenticate",
            %call_id,
            backend = self.subsystem.backend_name()
        );
        self.run(call_id, context).instrument(span).await
    }
}
