//! Latest-value buffer and the value-lookup contract.
//!
//! Check pipelines never talk to an archive directly; they ask a
//! [`ValueLookup`] for the most recent sample of a point. [`PointBuffer`] is
//! the in-process implementation: the engine records every published value
//! here before listeners are notified.

use crate::types::{PointValue, Tristate};
use dashmap::DashMap;

/// Source of the most recent sample of a point.
///
/// Absence is a normal answer (point unknown or never updated), not an error.
/// Implementations must be cheap and safe to call concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait ValueLookup: Send + Sync {
    fn latest_value(&self, point: &str) -> Option<PointValue>;
}

/// Concurrent map from point name to its latest sample.
#[derive(Debug, Default)]
pub struct PointBuffer {
    latest: DashMap<String, PointValue>,
}

impl PointBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as the latest sample of `point`.
    pub fn update(&self, point: &str, value: &PointValue) {
        match self.latest.get_mut(point) {
            Some(mut slot) => *slot = value.clone(),
            None => {
                self.latest.insert(point.to_string(), value.clone());
            }
        }
    }

    /// Alarm state derived from the latest sample.
    ///
    /// No sample or an invalid sample reads as `Unknown`.
    pub fn alarm_state(&self, point: &str) -> Tristate {
        match self.latest.get(point) {
            Some(v) if v.valid => Tristate::from_alarm(v.alarm),
            _ => Tristate::Unknown,
        }
    }

    pub fn forget(&self, point: &str) {
        self.latest.remove(point);
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

impl ValueLookup for PointBuffer {
    fn latest_value(&self, point: &str) -> Option<PointValue> {
        self.latest.get(point).map(|v| v.clone())
    }
}
