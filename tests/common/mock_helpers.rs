//! Mock construction helpers

use crossbeam_channel::Receiver;
use pointflow::bus::channel::drain;
use pointflow::error::EngineError;
use pointflow::point::ListenerId;
use pointflow::{ChannelListener, Notification, Notifier, PointListener, ValueEvent};
use std::sync::{Arc, Mutex};

/// Channel listener plus its receiving end
pub fn channel_listener(name: &str) -> (Arc<ChannelListener>, Receiver<ValueEvent>) {
    let (listener, rx) = ChannelListener::new(name, 256);
    (Arc::new(listener), rx)
}

/// Drain events and keep only their text payloads
pub fn drain_text(rx: &Receiver<ValueEvent>) -> Vec<String> {
    drain(rx)
        .into_iter()
        .filter_map(|e| e.value.value.as_str().map(str::to_string))
        .collect()
}

/// Listener that always fails (or panics)
pub struct FailingListener {
    pub id: ListenerId,
    pub panic: bool,
}

impl FailingListener {
    pub fn new(panic: bool) -> Arc<Self> {
        Arc::new(Self {
            id: ListenerId::next(),
            panic,
        })
    }
}

impl PointListener for FailingListener {
    fn listener_id(&self) -> ListenerId {
        self.id
    }

    fn on_point_event(&self, _event: &ValueEvent) -> pointflow::Result<()> {
        if self.panic {
            panic!("failing listener");
        }
        Err(EngineError::Delivery {
            listener: "failing".into(),
            message: "rejected".into(),
        })
    }
}

/// Notifier that records everything it is asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, message: &Notification) -> pointflow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
