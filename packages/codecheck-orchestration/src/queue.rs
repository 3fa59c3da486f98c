//! Bounded file queue between the scanner and the worker pool.
//!
//! Backpressure comes from the channel bound: the scanner blocks on a full
//! queue, workers block on an empty one. A single sentinel, pushed exactly
//! once, tells all workers collectively that no more files are coming: the
//! first worker to receive it raises a shared done flag, and every consumer
//! checks the flag before pulling. The sentinel is never re-queued.

use crate::cancel::CancelToken;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default queue bound; hundreds to low-thousands of files keeps the scanner
/// usefully ahead of the workers without unbounded memory.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

enum ScanItem {
    File(PathBuf),
    Done,
}

/// Producer half, held by the scanner thread only.
///
/// Dropping the producer pushes the sentinel if `finish` was never called,
/// so workers are released even when the scanner unwinds.
pub struct FileProducer {
    tx: Sender<ScanItem>,
    finished: bool,
}

impl FileProducer {
    /// Blocking push with cancellation polling. Returns false once the
    /// queue is gone or the push was abandoned due to cancellation.
    pub fn push(&self, file: PathBuf, token: &CancelToken) -> bool {
        let mut item = ScanItem::File(file);
        loop {
            if token.is_cancelled() {
                return false;
            }
            match self.tx.send_timeout(item, POLL_INTERVAL) {
                Ok(()) => return true,
                Err(crossbeam_channel::SendTimeoutError::Timeout(unsent)) => item = unsent,
                Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Push the sentinel. Called exactly once, on completion or on the
    /// scanner's own cancellation. On cancellation the push degrades to a
    /// best-effort try: stopping workers are released by channel disconnect
    /// instead.
    pub fn finish(mut self, token: &CancelToken) {
        self.finished = true;
        let mut item = ScanItem::Done;
        loop {
            if token.is_cancelled() {
                let _ = self.tx.try_send(item);
                return;
            }
            match self.tx.send_timeout(item, POLL_INTERVAL) {
                Ok(()) => return,
                Err(crossbeam_channel::SendTimeoutError::Timeout(unsent)) => item = unsent,
                Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

impl Drop for FileProducer {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            let _ = self.tx.try_send(ScanItem::Done);
        }
    }
}

/// Consumer half, shared by all workers. The queue instance survives
/// write-lock pauses: not-yet-consumed files stay in place and are drained
/// when workers resume.
#[derive(Clone)]
pub struct FileQueue {
    rx: Receiver<ScanItem>,
    done: Arc<AtomicBool>,
}

impl FileQueue {
    pub fn bounded(capacity: usize) -> (FileProducer, FileQueue) {
        let (tx, rx) = bounded(capacity);
        (
            FileProducer {
                tx,
                finished: false,
            },
            FileQueue {
                rx,
                done: Arc::new(AtomicBool::new(false)),
            },
        )
    }

    /// Blocking take with cancellation polling. `None` means: no more files
    /// (sentinel observed or producer gone) or the caller was cancelled.
    pub fn take(&self, token: &CancelToken) -> Option<PathBuf> {
        loop {
            if self.done.load(Ordering::Acquire) || token.is_cancelled() {
                return None;
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(ScanItem::File(file)) => return Some(file),
                Ok(ScanItem::Done) => {
                    self.done.store(true, Ordering::Release);
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Whether the sentinel has been observed.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}
