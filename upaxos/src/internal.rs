//! # Summary
//!
//! This module abstracts over internal connections to other workers.
//!
//! Currently backed by bounded `tokio::sync::mpsc` channels. Sends never
//! block: a full queue means the receiving worker is stuck, which we report
//! as an internal error and drop the message (the transport underneath is
//! lossy, so every worker already tolerates missing messages). A closed
//! queue only happens while the participant is shutting down.

use log::{debug, error};
use tokio::sync::mpsc;

/// Intra-participant receiving channel.
#[derive(Debug)]
pub struct Rx<T>(mpsc::Receiver<T>);

/// Intra-participant transmission channel. All clones send to the same
/// receiving end.
#[derive(Debug)]
pub struct Tx<T>(mpsc::Sender<T>);

impl<T> Clone for Tx<T> {
    fn clone(&self) -> Self {
        Tx(self.0.clone())
    }
}

/// Create a new pair of linked transmitting and receiving channels.
pub fn channel<T>(depth: usize) -> (Tx<T>, Rx<T>) {
    let (tx, rx) = mpsc::channel(depth);
    (Tx(tx), Rx(rx))
}

impl<T> Tx<T> {
    /// Enqueue a message without waiting.
    pub fn send(&self, message: T) {
        match self.0.try_send(message) {
        | Ok(()) => (),
        | Err(mpsc::error::TrySendError::Full(_)) => {
            error!("[INTERNAL ERROR]: worker queue full, dropping message");
        }
        | Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("worker queue closed, dropping message");
        }
        }
    }
}

impl<T> Rx<T> {
    /// Receive the next message, or `None` once all transmitting ends have
    /// been dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.0.recv().await
    }

    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<T> {
        self.0.try_recv().ok()
    }
}
