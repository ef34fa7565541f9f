//! Core data types for the point engine
//!
//! This module contains the values that flow between pipelines and listeners.
//!
//! # Main Types
//!
//! - [`Value`] - Polymorphic payload of a sample (number, text, boolean or absent)
//! - [`PointValue`] - A single timestamped sample with validity and alarm flags
//! - [`ValueEvent`] - A sample wrapped with its point's name, the unit of bus delivery
//! - [`Tristate`] - Three-valued good/bad/unknown result used by condition checks
//!
//! # Ownership
//!
//! A `PointValue` is built by the pipeline that publishes it. Once handed to
//! the event bus it is wrapped in an `Arc` and shared read-only with every
//! listener, so no listener can observe another listener's changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Payload of a point sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// Numeric reading
    Number(f64),
    /// Free-form text, e.g. the output strings of a limit check
    Text(String),
    /// Boolean reading
    Bool(bool),
    /// No value available
    #[default]
    Absent,
}

impl Value {
    /// Returns true if this is [`Value::Absent`]
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two values the way change detection needs to.
    ///
    /// Numbers compare by numeric value, so `NaN` never matches itself.
    pub fn same_as(&self, other: &Value) -> bool {
        self == other
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Absent => write!(f, "?"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// A single sample produced by a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointValue {
    /// The sample payload
    pub value: Value,
    /// Acquisition time of the sample
    pub timestamp: DateTime<Utc>,
    /// Whether the value can be trusted
    pub valid: bool,
    /// Whether the value is outside its limits
    pub alarm: bool,
}

impl PointValue {
    /// Create a valid, non-alarming sample
    pub fn new(value: impl Into<Value>, timestamp: DateTime<Utc>) -> Self {
        let value = value.into();
        Self {
            valid: !value.is_absent(),
            value,
            timestamp,
            alarm: false,
        }
    }

    /// Create a valid, non-alarming sample stamped with the current time
    pub fn now(value: impl Into<Value>) -> Self {
        Self::new(value, Utc::now())
    }

    /// Create an invalid sample carrying no value
    pub fn absent(timestamp: DateTime<Utc>) -> Self {
        Self {
            value: Value::Absent,
            timestamp,
            valid: false,
            alarm: false,
        }
    }

    /// Set the alarm flag
    pub fn with_alarm(mut self, alarm: bool) -> Self {
        self.alarm = alarm;
        self
    }

    /// Set the validity flag
    pub fn with_validity(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    /// Age of this sample relative to `now`. Samples from the future have zero age.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        let age = now - self.timestamp;
        if age < chrono::Duration::zero() {
            chrono::Duration::zero()
        } else {
            age
        }
    }
}

/// The unit of delivery on the event bus
#[derive(Debug, Clone)]
pub struct ValueEvent {
    /// Name of the point that published the value
    pub point: Arc<str>,
    /// Shared, immutable sample
    pub value: Arc<PointValue>,
    /// True for raw acquisitions, false for processed pipeline output
    pub raw: bool,
}

impl ValueEvent {
    pub fn new(point: Arc<str>, value: PointValue, raw: bool) -> Self {
        Self {
            point,
            value: Arc::new(value),
            raw,
        }
    }

    pub fn point_name(&self) -> &str {
        &self.point
    }
}

/// Three-valued result of a condition check.
///
/// Kept distinct from `Option<bool>` so that "no information" can never be
/// mistaken for "no alarm".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tristate {
    /// Not enough information to decide
    #[default]
    Unknown,
    /// Within limits
    Good,
    /// Outside limits
    Bad,
}

impl Tristate {
    pub fn is_bad(self) -> bool {
        self == Tristate::Bad
    }

    pub fn is_good(self) -> bool {
        self == Tristate::Good
    }

    pub fn is_unknown(self) -> bool {
        self == Tristate::Unknown
    }

    /// Classify a sample by its alarm flag
    pub fn from_alarm(alarm: bool) -> Self {
        if alarm {
            Tristate::Bad
        } else {
            Tristate::Good
        }
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tristate::Unknown => write!(f, "unknown"),
            Tristate::Good => write!(f, "good"),
            Tristate::Bad => write!(f, "bad"),
        }
    }
}
