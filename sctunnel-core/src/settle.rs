//! Single-fire completion cell
//!
//! Several event sources may race to complete one operation (the readiness
//! line and the agent exiting both complete `start`). A [`Settlement`] lets
//! each of them try; only the first value is delivered.

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

/// Completion cell that accepts exactly one value
#[derive(Debug)]
pub struct Settlement<T> {
    tx: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Settlement<T> {
    /// Create a cell and the receiver its value is delivered to
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Deliver `value` if nothing has been delivered yet
    ///
    /// Returns `true` if this call settled the cell.
    pub fn settle(&self, value: T) -> bool {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match tx {
            Some(tx) => {
                // The waiter may have given up already; the cell is settled regardless.
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
