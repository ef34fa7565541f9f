//! Per-point event bus.
//!
//! Listener sets are stored per [`PointId`] in a concurrent map, so
//! subscriptions on unrelated points never contend. Publishing takes a
//! snapshot of the target point's listener set and delivers to it
//! synchronously on the publisher's thread, which keeps delivery FIFO per
//! listener for a given point.
//!
//! ```text
//! publisher ──► publish(point, value) ──► snapshot ──► listener A
//!                                                 ├──► listener B (fails: logged)
//!                                                 └──► listener C
//! ```

pub mod channel;

pub use channel::ChannelListener;

use crate::error::Result;
use crate::point::id::{ListenerId, PointId};
use crate::point::Point;
use crate::types::{PointValue, ValueEvent};
use dashmap::DashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Something that wants to hear about new values of one or more points.
pub trait PointListener: Send + Sync {
    /// Stable identity used for unsubscription.
    fn listener_id(&self) -> ListenerId;

    /// Human-readable name for log messages.
    fn listener_name(&self) -> &str {
        "listener"
    }

    /// Called for every value published on a subscribed point.
    fn on_point_event(&self, event: &ValueEvent) -> Result<()>;
}

/// Destination for values produced by a pipeline.
///
/// The engine's implementation records the value as the point's latest
/// sample before handing it to the bus.
pub trait ValueSink: Send + Sync {
    fn publish(&self, point: &Point, value: PointValue, raw: bool) -> DeliveryReport;
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct EventBus {
    listeners: DashMap<PointId, Vec<Arc<dyn PointListener>>>,
}

impl ValueSink for EventBus {
    fn publish(&self, point: &Point, value: PointValue, raw: bool) -> DeliveryReport {
        EventBus::publish(self, point, value, raw)
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to `point`. Returns false if it was already subscribed.
    pub fn subscribe(&self, point: PointId, listener: Arc<dyn PointListener>) -> bool {
        let mut set = self.listeners.entry(point).or_default();
        let id = listener.listener_id();
        if set.iter().any(|l| l.listener_id() == id) {
            return false;
        }
        tracing::trace!("{} subscribed '{}' ({:?})", point, listener.listener_name(), id);
        set.push(listener);
        true
    }

    /// Remove a listener. A listener that never subscribed is a no-op.
    pub fn unsubscribe(&self, point: PointId, listener: ListenerId) -> bool {
        let Some(mut set) = self.listeners.get_mut(&point) else {
            return false;
        };
        let before = set.len();
        set.retain(|l| l.listener_id() != listener);
        before != set.len()
    }

    /// Drop every listener of `point`. Used when a point is torn down.
    pub fn remove_point(&self, point: PointId) -> usize {
        self.listeners
            .remove(&point)
            .map(|(_, set)| set.len())
            .unwrap_or(0)
    }

    pub fn listener_count(&self, point: PointId) -> usize {
        self.listeners.get(&point).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_subscribed(&self, point: PointId, listener: ListenerId) -> bool {
        self.listeners
            .get(&point)
            .map(|s| s.iter().any(|l| l.listener_id() == listener))
            .unwrap_or(false)
    }

    /// Publish a value on `point`.
    ///
    /// The event is always stamped with `point`'s own name. Listener failures
    /// and panics are logged and counted; they never reach the publisher.
    pub fn publish(&self, point: &Point, value: PointValue, raw: bool) -> DeliveryReport {
        let event = ValueEvent::new(point.shared_name(), value, raw);
        self.deliver(point.id(), &event)
    }

    fn deliver(&self, point: PointId, event: &ValueEvent) -> DeliveryReport {
        // Snapshot so that listeners may (un)subscribe from inside a callback.
        let snapshot: Vec<Arc<dyn PointListener>> = match self.listeners.get(&point) {
            Some(set) => set.clone(),
            None => return DeliveryReport::default(),
        };

        let mut report = DeliveryReport::default();
        for listener in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_point_event(event)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Delivery of '{}' to '{}' failed: {}",
                        event.point_name(),
                        listener.listener_name(),
                        e
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Listener '{}' panicked while handling '{}'",
                        listener.listener_name(),
                        event.point_name()
                    );
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("points", &self.listeners.len())
            .finish()
    }
}
