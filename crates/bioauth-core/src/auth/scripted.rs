//! Deterministic in-process subsystem
//!
//! Used by tests and the CLI `--simulate` mode. It never shows anything; it
//! records what the bridge asked of it and replies according to its script.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use tracing::debug;

use super::subsystem::{
    Availability, BiometricSubsystem, NativeSignal, PromptRegistration, PromptRequest,
    SignalCallback,
};

/// Error code reported to a held callback when its prompt is dismissed
pub const DISMISSED_CODE: i32 = 5;

/// How the subsystem answers a presented prompt
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Deliver these signals, in order, from a separate reply thread
    Immediate(Vec<NativeSignal>),
    /// Hold the callback until [`ScriptedSubsystem::fire`] is called
    Manual,
}

#[derive(Default)]
struct ScriptLog {
    held: Mutex<Option<SignalCallback>>,
    prompts: AtomicUsize,
    cancellations: AtomicUsize,
    prompt_threads: Mutex<Vec<ThreadId>>,
    cancel_threads: Mutex<Vec<ThreadId>>,
    requests: Mutex<Vec<PromptRequest>>,
}

/// Scripted biometric subsystem
pub struct ScriptedSubsystem {
    availability: Availability,
    response: ScriptedResponse,
    log: Arc<ScriptLog>,
}

impl ScriptedSubsystem {
    /// Create a subsystem with explicit availability and response
    pub fn new(availability: Availability, response: ScriptedResponse) -> Self {
        Self {
            availability,
            response,
            log: Arc::new(ScriptLog::default()),
        }
    }

    /// Available subsystem that replies with the given signals
    pub fn with_signals(signals: Vec<NativeSignal>) -> Self {
        Self::new(Availability::Available, ScriptedResponse::Immediate(signals))
    }

    /// Available subsystem that waits for [`fire`](Self::fire)
    pub fn manual() -> Self {
        Self::new(Availability::Available, ScriptedResponse::Manual)
    }

    /// Subsystem that reports itself unavailable
    pub fn unavailable(reason: &str) -> Self {
        Self::new(
            Availability::Unavailable(reason.to_string()),
            ScriptedResponse::Manual,
        )
    }

    /// Invoke the held callback; returns `false` if none is held
    pub fn fire(&self, signal: NativeSignal) -> bool {
        let callback = lock(&self.log.held).clone();
        match callback {
            Some(callback) => {
                callback(signal);
                true
            }
            None => false,
        }
    }

    /// Drop the held callback without ever reporting
    pub fn release(&self) {
        lock(&self.log.held).take();
    }

    /// Whether a manual prompt is waiting for a signal
    pub fn is_waiting(&self) -> bool {
        lock(&self.log.held).is_some()
    }

    /// Number of prompts presented so far
    pub fn prompts_presented(&self) -> usize {
        self.log.prompts.load(Ordering::SeqCst)
    }

    /// Number of prompts dismissed through their registration
    pub fn cancellations(&self) -> usize {
        self.log.cancellations.load(Ordering::SeqCst)
    }

    /// Threads each prompt was presented on
    pub fn prompt_threads(&self) -> Vec<ThreadId> {
        lock(&self.log.prompt_threads).clone()
    }

    /// Threads each dismissal ran on
    pub fn cancel_threads(&self) -> Vec<ThreadId> {
        lock(&self.log.cancel_threads).clone()
    }

    /// Requests seen by the subsystem
    pub fn requests(&self) -> Vec<PromptRequest> {
        lock(&self.log.requests).clone()
    }
}

impl BiometricSubsystem for ScriptedSubsystem {
    fn can_authenticate(&self) -> Availability {
        self.availability.clone()
    }

    fn present_prompt(
        &self,
        request: &PromptRequest,
        on_result: SignalCallback,
    ) -> Box<dyn PromptRegistration> {
        self.log.prompts.fetch_add(1, Ordering::SeqCst);
        lock(&self.log.prompt_threads).push(thread::current().id());
        lock(&self.log.requests).push(request.clone());

        match &self.response {
            ScriptedResponse::Immediate(signals) => {
                let signals = signals.clone();
                let reply = on_result.clone();
                let spawned = thread::Builder::new()
                    .name("scripted-reply".to_string())
                    .spawn(move || {
                        for signal in signals {
                            reply(signal);
                        }
                    });
                if let Err(e) = spawned {
                    debug!("Reply thread unavailable ({}), replying inline", e);
                    if let ScriptedResponse::Immediate(signals) = &self.response {
                        for signal in signals.iter().cloned() {
                            on_result(signal);
                        }
                    }
                }
            }
            ScriptedResponse::Manual => {
                *lock(&self.log.held) = Some(on_result);
            }
        }

        Box::new(ScriptedPrompt {
            log: Arc::clone(&self.log),
        })
    }

    fn backend_name(&self) -> &'static str {
        "Scripted"
    }
}

struct ScriptedPrompt {
    log: Arc<ScriptLog>,
}

impl PromptRegistration for ScriptedPrompt {
    fn cancel(self: Box<Self>) {
        self.log.cancellations.fetch_add(1, Ordering::SeqCst);
        lock(&self.log.cancel_threads).push(thread::current().id());

        // Dismissal is reported back like a platform would
        let held = lock(&self.log.held).take();
        if let Some(callback) = held {
            callback(NativeSignal::Error {
                code: DISMISSED_CODE,
                message: "Authentication canceled".to_string(),
            });
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
