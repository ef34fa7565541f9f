//! Channel-backed listener for consumers that drain events on their own thread.
//!
//! RPC sessions, GUIs and archivers hold the receiving end and poll it at
//! their own pace. The bus never blocks on a slow consumer: a full channel
//! drops the event and reports a delivery failure.

use crate::bus::PointListener;
use crate::error::{EngineError, Result};
use crate::point::id::ListenerId;
use crate::types::ValueEvent;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub struct ChannelListener {
    id: ListenerId,
    name: String,
    tx: Sender<ValueEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiver its events arrive on.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, Receiver<ValueEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                id: ListenerId::next(),
                name: name.into(),
                tx,
            },
            rx,
        )
    }

    pub fn with_default_capacity(name: impl Into<String>) -> (Self, Receiver<ValueEvent>) {
        Self::new(name, DEFAULT_CHANNEL_CAPACITY)
    }
}

impl PointListener for ChannelListener {
    fn listener_id(&self) -> ListenerId {
        self.id
    }

    fn listener_name(&self) -> &str {
        &self.name
    }

    fn on_point_event(&self, event: &ValueEvent) -> Result<()> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EngineError::Delivery {
                listener: self.name.clone(),
                message: "channel full, event dropped".into(),
            }),
            Err(TrySendError::Disconnected(_)) => Err(EngineError::Delivery {
                listener: self.name.clone(),
                message: "receiver dropped".into(),
            }),
        }
    }
}

/// Drain every pending event without blocking.
pub fn drain(rx: &Receiver<ValueEvent>) -> Vec<ValueEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
