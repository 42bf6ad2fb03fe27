//! Platform context and UI-thread marshaling
//!
//! Some subsystems deliver their reply on an internal queue and may be driven
//! from anywhere. Others require the prompt to be triggered (and dismissed) on
//! the thread that owns the UI. The context tells the bridge which one it is
//! talking to.

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use thiserror::Error;
use tracing::{debug, warn};

/// Unit of work marshaled onto a UI host
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Returned when a UI host no longer accepts work
#[derive(Debug, Error)]
#[error("UI host is not accepting work")]
pub struct DispatchError;

/// The UI-owning executor of the presentation layer
pub trait UiHost: Send + Sync {
    /// Queue a job to run on the UI thread
    fn dispatch(&self, job: UiJob) -> Result<(), DispatchError>;
}

/// Threading model of the platform the bridge is running on.
///
/// Chosen once at startup by whoever wires the subsystem in.
#[derive(Clone)]
pub enum PlatformContext {
    /// The prompt may be triggered from any thread
    FreeThreaded,
    /// The prompt must be triggered on the given host's thread
    UiThread(Arc<dyn UiHost>),
}

impl PlatformContext {
    /// UI host the prompt must be marshaled onto, if any
    pub fn ui_host(&self) -> Option<&Arc<dyn UiHost>> {
        match self {
            PlatformContext::FreeThreaded => None,
            PlatformContext::UiThread(host) => Some(host),
        }
    }
}

impl fmt::Debug for PlatformContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformContext::FreeThreaded => f.write_str("FreeThreaded"),
            PlatformContext::UiThread(_) => f.write_str("UiThread(..)"),
        }
    }
}

/// A dedicated thread draining a job queue, standing in for a UI main loop
pub struct UiThreadHost {
    sender: mpsc::Sender<UiJob>,
    thread_id: ThreadId,
}

impl UiThreadHost {
    /// Spawn the UI thread
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<UiJob>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                debug!("UI thread job queue closed");
            })?;

        Ok(Self {
            sender,
            thread_id: handle.thread().id(),
        })
    }

    /// Id of the thread jobs run on
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl UiHost for UiThreadHost {
    fn dispatch(&self, job: UiJob) -> Result<(), DispatchError> {
        self.sender.send(job).map_err(|_| {
            warn!("Dropping job for stopped UI thread");
            DispatchError
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_run_on_ui_thread() {
        let host = UiThreadHost::spawn("test-ui").unwrap();
        let (tx, rx) = mpsc::channel();

        host.dispatch(Box::new(move || {
            tx.send(thread::current().id()).unwrap();
        }))
        .unwrap();

        assert_eq!(rx.recv().unwrap(), host.thread_id());
        assert_ne!(host.thread_id(), thread::current().id());
    }

    #[test]
    fn test_jobs_run_in_order() {
        let host = UiThreadHost::spawn("test-ui-order").unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            host.dispatch(Box::new(move || tx.send(i).unwrap())).unwrap();
        }

        let seen: Vec<i32> = (0..5).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_context_exposes_host() {
        assert!(PlatformContext::FreeThreaded.ui_host().is_none());

        let host: Arc<dyn UiHost> = Arc::new(UiThreadHost::spawn("test-ui-ctx").unwrap());
        assert!(PlatformContext::UiThread(host).ui_host().is_some());
    }
}
