//! Settle-once completion slot
//!
//! The callback handed to a subsystem owns the only strong reference to the
//! cell. Dropping every copy of the callback without firing it closes the
//! receiver, so a subsystem that forgets to report can never leave a caller
//! suspended forever.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use super::subsystem::{NativeSignal, SignalCallback};

struct SettleCell {
    call_id: Uuid,
    sender: Mutex<Option<oneshot::Sender<NativeSignal>>>,
}

impl SettleCell {
    fn take_sender(&self) -> Option<oneshot::Sender<NativeSignal>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Deliver the first signal; every later one is dropped
    fn settle(&self, signal: NativeSignal) -> bool {
        match self.take_sender() {
            Some(sender) => {
                if sender.send(signal).is_err() {
                    debug!(call_id = %self.call_id, "Caller went away before the signal arrived");
                    return false;
                }
                true
            }
            None => {
                warn!(call_id = %self.call_id, ?signal, "Ignoring signal for a settled or detached call");
                false
            }
        }
    }
}

/// Caller-side handle used to detach the callback on cancellation
pub(crate) struct SlotDetacher {
    cell: Weak<SettleCell>,
}

impl SlotDetacher {
    /// Close the slot so any later signal is discarded.
    ///
    /// Returns `true` if the call had not settled yet.
    pub(crate) fn detach(&self) -> bool {
        match self.cell.upgrade() {
            Some(cell) => cell.take_sender().is_some(),
            None => false,
        }
    }
}

/// Create a fresh slot for one call
pub(crate) fn completion_slot(
    call_id: Uuid,
) -> (SignalCallback, SlotDetacher, oneshot::Receiver<NativeSignal>) {
    let (sender, receiver) = oneshot::channel();
    let cell = Arc::new(SettleCell {
        call_id,
        sender: Mutex::new(Some(sender)),
    });
    let detacher = SlotDetacher {
        cell: Arc::downgrade(&cell),
    };
    let callback: SignalCallback = Arc::new(move |signal| {
        cell.settle(signal);
    });

    (callback, detacher, receiver)
}
