//! FIFO buffer for outbound envelopes awaiting a sendable state

use crate::envelope::Envelope;
use crate::traits::Result;
use std::collections::VecDeque;

/// Ordered buffer of not-yet-sendable outbound messages
///
/// FIFO ordering is a hard invariant: envelopes enqueued while disconnected
/// are handed to the transport in the exact order they were enqueued. The
/// queue imposes no upper bound and never drops silently; a failed flush
/// puts the unsent envelope back at the front and stops.
#[derive(Default)]
pub struct PendingQueue {
    items: VecDeque<Envelope>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an envelope to the back of the queue
    pub fn enqueue(&mut self, envelope: Envelope) {
        self.items.push_back(envelope);
    }

    /// Drain the queue in order through `send`, returning the flushed count
    ///
    /// Stops at the first send failure; the failing envelope is re-queued at
    /// the front so a later flush retries it in the original order.
    pub fn drain_into<F>(&mut self, mut send: F) -> Result<usize>
    where
        F: FnMut(Envelope) -> Result<()>,
    {
        let mut flushed = 0;
        while let Some(envelope) = self.items.pop_front() {
            if let Err(e) = send(envelope.clone()) {
                self.items.push_front(envelope);
                return Err(e);
            }
            flushed += 1;
        }
        Ok(flushed)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
