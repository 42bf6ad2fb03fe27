//! Subsystem backed by external commands
//!
//! Desktop platforms expose biometrics through helper tools rather than an
//! in-process SDK. A probe command answers the capability query and a prompt
//! command drives the check; its exit status is the signal:
//! - `0`: success
//! - `1`: credential did not match
//! - `2`: user dismissed the prompt
//! - anything else: subsystem error, stderr is the message

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use super::subsystem::{
    Availability, BiometricSubsystem, DetachedPrompt, NativeSignal, PromptRegistration,
    PromptRequest, SignalCallback,
};
use crate::error::{BioauthError, Result};

/// Code used for failures that happen before the command reports anything
pub const SPAWN_FAILURE_CODE: i32 = -1;

/// Program plus arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command from a program and its arguments
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Parse a whitespace-separated command line (no quoting)
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| BioauthError::InvalidCommand("empty command line".to_string()))?;

        Ok(Self {
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        command
    }
}

/// Biometric subsystem driven by helper processes
pub struct ProcessSubsystem {
    availability: Availability,
    prompt: CommandSpec,
    poll_interval: Duration,
}

impl ProcessSubsystem {
    /// Create a subsystem, running the probe once to settle availability.
    ///
    /// Without a probe it is always considered available. The probe blocks
    /// the calling thread, so async callers should construct this from
    /// `spawn_blocking`.
    pub fn new(probe: Option<CommandSpec>, prompt: CommandSpec) -> Self {
        let availability = match &probe {
            Some(probe) => run_probe(probe),
            None => Availability::Available,
        };
        debug!("External command availability: {:?}", availability);

        Self {
            availability,
            prompt,
            poll_interval: Duration::from_millis(25),
        }
    }

    fn spawn_prompt(&self, request: &PromptRequest) -> std::io::Result<Child> {
        self.prompt
            .command()
            .env("BIOAUTH_PROMPT_TITLE", &request.title)
            .env("BIOAUTH_PROMPT_SUBTITLE", &request.subtitle)
            .env("BIOAUTH_PROMPT_CANCEL", &request.negative_button)
            .env("BIOAUTH_PROMPT_REASON", &request.reason)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
    }
}

impl BiometricSubsystem for ProcessSubsystem {
    fn can_authenticate(&self) -> Availability {
        self.availability.clone()
    }

    fn present_prompt(
        &self,
        request: &PromptRequest,
        on_result: SignalCallback,
    ) -> Box<dyn PromptRegistration> {
        let child = match self.spawn_prompt(request) {
            Ok(child) => child,
            Err(e) => {
                on_result(NativeSignal::Error {
                    code: SPAWN_FAILURE_CODE,
                    message: format!("{} could not run: {}", self.prompt.program, e),
                });
                return Box::new(DetachedPrompt);
            }
        };
        debug!("Started prompt command {} (pid {})", self.prompt.program, child.id());

        // The child stays here until the watcher is running
        let (handoff, pending) = mpsc::channel::<Child>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let watcher = {
            let cancelled = Arc::clone(&cancelled);
            let poll_interval = self.poll_interval;
            let on_result = Arc::clone(&on_result);
            thread::Builder::new()
                .name("bioauth-prompt".to_string())
                .spawn(move || {
                    if let Ok(child) = pending.recv() {
                        watch_child(child, &cancelled, poll_interval, on_result);
                    }
                })
        };

        let failure = match watcher {
            Ok(_) => match handoff.send(child) {
                Ok(()) => return Box::new(ProcessPrompt { cancelled }),
                Err(mpsc::SendError(child)) => ("watcher exited early".to_string(), child),
            },
            Err(e) => (e.to_string(), child),
        };

        let (reason, child) = failure;
        warn!("Could not start prompt watcher: {}", reason);
        abandon(child);
        on_result(NativeSignal::Error {
            code: SPAWN_FAILURE_CODE,
            message: format!("could not watch prompt command: {}", reason),
        });
        Box::new(DetachedPrompt)
    }

    fn backend_name(&self) -> &'static str {
        "External Command"
    }
}

struct ProcessPrompt {
    cancelled: Arc<AtomicBool>,
}

impl PromptRegistration for ProcessPrompt {
    fn cancel(self: Box<Self>) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn run_probe(probe: &CommandSpec) -> Availability {
    match probe.command().output() {
        Ok(output) if output.status.success() => Availability::Available,
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                Availability::Unavailable(format!("{} exited with {}", probe.program, output.status))
            } else {
                Availability::Unavailable(stderr)
            }
        }
        Err(e) => Availability::Unavailable(format!("{} could not run: {}", probe.program, e)),
    }
}

/// Kill and reap a prompt command nobody is watching
fn abandon(mut child: Child) -> Option<ExitStatus> {
    if let Err(e) = child.kill() {
        debug!("Prompt command already gone: {}", e);
    }
    child.wait().ok()
}

/// Read stderr to the end on its own thread so a chatty helper never fills the pipe
fn drain_stderr(pipe: ChildStderr) -> Option<JoinHandle<String>> {
    thread::Builder::new()
        .name("bioauth-prompt-stderr".to_string())
        .spawn(move || {
            let mut pipe = pipe;
            let mut stderr = String::new();
            if let Err(e) = pipe.read_to_string(&mut stderr) {
                debug!("Could not read prompt stderr: {}", e);
            }
            stderr
        })
        .map_err(|e| warn!("Could not start stderr reader: {}", e))
        .ok()
}

fn collect_stderr(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn watch_child(
    mut child: Child,
    cancelled: &AtomicBool,
    poll_interval: Duration,
    on_result: SignalCallback,
) {
    let stderr = child.stderr.take().and_then(drain_stderr);

    loop {
        if cancelled.load(Ordering::SeqCst) {
            // The reader finishes on its own once the pipe closes
            abandon(child);
            on_result(NativeSignal::Cancelled);
            return;
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                let stderr = collect_stderr(stderr);
                on_result(classify_exit(status, stderr.trim()));
                return;
            }
            Ok(None) => thread::sleep(poll_interval),
            Err(e) => {
                abandon(child);
                on_result(NativeSignal::Error {
                    code: SPAWN_FAILURE_CODE,
                    message: e.to_string(),
                });
                return;
            }
        }
    }
}

fn classify_exit(status: ExitStatus, stderr: &str) -> NativeSignal {
    match status.code() {
        Some(0) => NativeSignal::Succeeded,
        Some(1) => NativeSignal::Failed,
        Some(2) => NativeSignal::Cancelled,
        Some(code) => NativeSignal::Error {
            code,
            message: if stderr.is_empty() {
                format!("prompt command exited with status {}", code)
            } else {
                stderr.to_string()
            },
        },
        None => NativeSignal::Error {
            code: SPAWN_FAILURE_CODE,
            message: "prompt command was terminated by a signal".to_string(),
        },
    }
}
