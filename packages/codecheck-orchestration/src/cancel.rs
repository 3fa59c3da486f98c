//! Cooperative cancellation tokens and the external write-lock gate.
//!
//! A run carries one top-level token; every worker processes each file under
//! a derived child token. Cancelling the parent cancels all children.
//! Independently, a pending external write intent cancels all registered
//! derived tokens promptly (so the writer is never blocked behind analysis)
//! without touching the top-level token; workers observe the difference and
//! retry once the writer is done.

use crate::error::{OrchestratorError, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<Arc<TokenInner>>,
}

impl TokenInner {
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }
}

/// Cancellation token checked at suspension points: queue operations, file
/// boundaries, and between tool invocations.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// Derive a child token: cancelled when this token cancels, or on its
    /// own.
    pub fn child(&self) -> CancelToken {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Suspension-point check.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }
        Ok(())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

struct GateInner {
    write_pending: AtomicBool,
    lock: Mutex<()>,
    writer_done: Condvar,
    derived: Mutex<Vec<Weak<TokenInner>>>,
}

/// Priority boost for an external exclusive writer.
///
/// `begin_write` cancels every registered derived token; workers that see
/// their file token cancelled while the run token is alive wait on
/// `wait_write_complete` and then retry the same file.
#[derive(Clone)]
pub struct WriteGate {
    inner: Arc<GateInner>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GateInner {
                write_pending: AtomicBool::new(false),
                lock: Mutex::new(()),
                writer_done: Condvar::new(),
                derived: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derive a per-file token from the run token, registered for prompt
    /// cancellation on write intent.
    pub fn derive(&self, parent: &CancelToken) -> CancelToken {
        let token = parent.child();
        {
            let mut derived = self.inner.derived.lock();
            derived.retain(|weak| weak.strong_count() > 0);
            derived.push(Arc::downgrade(&token.inner));
        }
        // Registration may race a concurrent begin_write sweep; the check
        // after registering closes the window.
        if self.is_write_pending() {
            token.cancel();
        }
        token
    }

    pub fn is_write_pending(&self) -> bool {
        self.inner.write_pending.load(Ordering::Acquire)
    }

    /// Declare write intent: all derived tokens are cancelled promptly.
    pub fn begin_write(&self) {
        self.inner.write_pending.store(true, Ordering::Release);
        let mut derived = self.inner.derived.lock();
        for weak in derived.drain(..) {
            if let Some(token) = weak.upgrade() {
                token.cancelled.store(true, Ordering::Release);
            }
        }
    }

    /// Writer finished; paused workers resume.
    pub fn end_write(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.write_pending.store(false, Ordering::Release);
        self.inner.writer_done.notify_all();
    }

    /// Block until no write is pending.
    pub fn wait_write_complete(&self) {
        let mut guard = self.inner.lock.lock();
        while self.inner.write_pending.load(Ordering::Acquire) {
            self.inner.writer_done.wait(&mut guard);
        }
    }

    /// Run `f` under declared write intent.
    pub fn with_write<R>(&self, f: impl FnOnce() -> R) -> R {
        self.begin_write();
        let result = f();
        self.end_write();
        result
    }
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_child_follows_parent() {
        let parent = CancelToken::new();
        let child = parent.child();

        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(child.check().is_err());
    }

    #[test]
    fn test_child_cancel_leaves_parent_alive() {
        let parent = CancelToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_write_intent_cancels_derived_tokens() {
        let gate = WriteGate::new();
        let run = CancelToken::new();
        let file_token = gate.derive(&run);

        gate.begin_write();
        assert!(file_token.is_cancelled());
        assert!(!run.is_cancelled());
        gate.end_write();

        // a token derived after the write completes is fresh
        let retry_token = gate.derive(&run);
        assert!(!retry_token.is_cancelled());
    }

    #[test]
    fn test_derive_during_pending_write_is_born_cancelled() {
        let gate = WriteGate::new();
        let run = CancelToken::new();

        gate.begin_write();
        let token = gate.derive(&run);
        assert!(token.is_cancelled());
        gate.end_write();
    }

    #[test]
    fn test_wait_write_complete_unblocks() {
        let gate = WriteGate::new();
        gate.begin_write();

        let waiter = {
            let gate = gate.clone();
            std::thread::spawn(move || {
                gate.wait_write_complete();
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        gate.end_write();
        waiter.join().unwrap();
    }

    #[test]
    fn test_with_write_scopes_the_intent() {
        let gate = WriteGate::new();
        let result = gate.with_write(|| {
            assert!(gate.is_write_pending());
            7
        });
        assert_eq!(result, 7);
        assert!(!gate.is_write_pending());
    }
}
