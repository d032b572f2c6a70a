//! Background sync workers.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::JoinHandle;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::sync::SyncOutcome;

/// Handle to a sync running on its own thread.
///
/// The worker sends exactly one completion message. Dropping the
/// handle detaches the worker, which then runs to its natural end;
/// call [`cancel`] first when the work should actually stop.
///
/// [`cancel`]: SyncTask::cancel
pub struct SyncTask {
    handle: Option<JoinHandle<()>>,
    receiver: Receiver<Result<SyncOutcome>>,
    cancel: CancelToken,
    delivered: bool,
}

impl SyncTask {
    pub(crate) fn new(
        handle: JoinHandle<()>,
        receiver: Receiver<Result<SyncOutcome>>,
        cancel: CancelToken,
    ) -> Self {
        SyncTask {
            handle: Some(handle),
            receiver,
            cancel,
            delivered: false,
        }
    }

    /// Token the worker checks at batch boundaries.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Requests a stop at the worker's next batch boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Polls for the completion message without blocking.
    ///
    /// Returns `None` while the worker is still going, and again after
    /// the result has been taken once.
    pub fn try_result(&mut self) -> Option<Result<SyncOutcome>> {
        if self.delivered {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.delivered = true;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.delivered = true;
                Some(Err(EngineError::worker(
                    "sync worker exited without reporting a result",
                )))
            }
        }
    }

    /// Blocks until the worker finishes and returns its result.
    pub fn wait(mut self) -> Result<SyncOutcome> {
        let result = if self.delivered {
            Err(EngineError::worker("sync result was already taken"))
        } else {
            match self.receiver.recv() {
                Ok(result) => result,
                Err(_) => Err(EngineError::worker(
                    "sync worker exited without reporting a result",
                )),
            }
        };
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result
    }
}
