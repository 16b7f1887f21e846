//! Ctrl-C routing between the approval prompt and the rest of the process.
//!
//! A single task listens for the signal and calls `deliver`. If a prompt is
//! waiting for input, the interrupt goes to that prompt only (the gate then
//! rejects that one request). Otherwise `deliver` reports that nobody took it,
//! and the caller shuts down.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// Shared slot for the prompt currently waiting for input.
#[derive(Clone, Default)]
pub struct InterruptRouter {
    waiting: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl InterruptRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiting prompt. The slot is cleared when the listener drops.
    pub fn listen(&self) -> InterruptListener {
        let (tx, rx) = oneshot::channel();
        *self.slot() = Some(tx);
        InterruptListener {
            rx,
            waiting: self.waiting.clone(),
        }
    }

    /// Hand an interrupt to the waiting prompt.
    ///
    /// Returns true if a prompt took it, false if no prompt was waiting.
    pub fn deliver(&self) -> bool {
        match self.slot().take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.slot().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by a prompt while it waits for a line.
pub struct InterruptListener {
    rx: oneshot::Receiver<()>,
    waiting: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl InterruptListener {
    /// Resolves when an interrupt is delivered to this prompt.
    pub async fn interrupted(&mut self) {
        if (&mut self.rx).await.is_err() {
            // Sender replaced without delivering; never fires.
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for InterruptListener {
    fn drop(&mut self) {
        self.rx.close();
        let mut slot = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|tx| tx.is_closed()) {
            *slot = None;
        }
    }
}
