//! Per-category observer registries for connection events
//!
//! Each event category (open/message/close/error/reconnect) has its own list
//! of callbacks; registration hands back an id that unregisters exactly that
//! entry. Ids are unique across categories.

use crate::envelope::Envelope;
use crate::traits::DuraSockError;
use std::sync::Arc;
use std::time::Duration;

pub type OpenObserver = Arc<dyn Fn() + Send + Sync>;
pub type MessageObserver = Arc<dyn Fn(&Envelope) + Send + Sync>;
pub type CloseObserver = Arc<dyn Fn(Option<u16>, &str) + Send + Sync>;
pub type ErrorObserver = Arc<dyn Fn(&DuraSockError) + Send + Sync>;
pub type ReconnectObserver = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// A callback being registered, tagged with its event category
pub(crate) enum ObserverKind {
    Open(OpenObserver),
    Message(MessageObserver),
    Close(CloseObserver),
    Error(ErrorObserver),
    ReconnectScheduled(ReconnectObserver),
}

#[derive(Default)]
pub(crate) struct ObserverSet {
    next_id: u64,
    open: Vec<(u64, OpenObserver)>,
    message: Vec<(u64, MessageObserver)>,
    close: Vec<(u64, CloseObserver)>,
    error: Vec<(u64, ErrorObserver)>,
    reconnect: Vec<(u64, ReconnectObserver)>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ObserverKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        match kind {
            ObserverKind::Open(cb) => self.open.push((id, cb)),
            ObserverKind::Message(cb) => self.message.push((id, cb)),
            ObserverKind::Close(cb) => self.close.push((id, cb)),
            ObserverKind::Error(cb) => self.error.push((id, cb)),
            ObserverKind::ReconnectScheduled(cb) => self.reconnect.push((id, cb)),
        }
        id
    }

    /// Remove a registration by id; no-op if already removed
    pub fn remove(&mut self, id: u64) {
        self.open.retain(|(i, _)| *i != id);
        self.message.retain(|(i, _)| *i != id);
        self.close.retain(|(i, _)| *i != id);
        self.error.retain(|(i, _)| *i != id);
        self.reconnect.retain(|(i, _)| *i != id);
    }

    pub fn notify_open(&self) {
        for (_, cb) in &self.open {
            cb();
        }
    }

    pub fn notify_message(&self, envelope: &Envelope) {
        for (_, cb) in &self.message {
            cb(envelope);
        }
    }

    pub fn notify_close(&self, code: Option<u16>, reason: &str) {
        for (_, cb) in &self.close {
            cb(code, reason);
        }
    }

    pub fn notify_error(&self, error: &DuraSockError) {
        for (_, cb) in &self.error {
            cb(error);
        }
    }

    pub fn notify_reconnect_scheduled(&self, attempt: u32, delay: Duration) {
        for (_, cb) in &self.reconnect {
            cb(attempt, delay);
        }
    }
}
