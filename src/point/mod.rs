//! Points and the process-wide point registry.
//!
//! A [`Point`] is the immutable identity of a named value source: its name,
//! the source it belongs to and its update period. Everything that changes
//! at run time (latest value, listeners, pipeline state) lives in tables
//! keyed by [`PointId`] owned by other components.

pub mod id;
pub mod registry;

pub use id::{ListenerId, PointId};
pub use registry::PointRegistry;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Macro token in pipeline arguments replaced with the owning point's source.
pub const SOURCE_MACRO: &str = "$1";

/// A registered point.
#[derive(Debug, Clone)]
pub struct Point {
    id: PointId,
    name: Arc<str>,
    source: String,
    period: Duration,
    description: String,
}

impl Point {
    pub(crate) fn new(id: PointId, def: &PointDefinition) -> Self {
        Self {
            id,
            name: Arc::from(def.name.as_str()),
            source: def.source.clone(),
            period: def.period,
            description: def.description.clone(),
        }
    }

    pub fn id(&self) -> PointId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the name, used when wrapping published events.
    pub fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Configured update period. Zero means the point is aperiodic.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Replace the source macro in `template` with this point's source.
    pub fn substitute_source(&self, template: &str) -> String {
        substitute_source(template, &self.source)
    }
}

/// Identity fields needed to register a point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointDefinition {
    pub name: String,
    #[serde(default)]
    pub source: String,
    #[serde(with = "period_micros", default)]
    pub period: Duration,
    #[serde(default)]
    pub description: String,
}

impl PointDefinition {
    pub fn new(name: impl Into<String>, source: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            period,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Replace every occurrence of [`SOURCE_MACRO`] in `template` with `source`.
pub fn substitute_source(template: &str, source: &str) -> String {
    if template.contains(SOURCE_MACRO) {
        template.replace(SOURCE_MACRO, source)
    } else {
        template.to_string()
    }
}

/// Periods are written in microseconds in point definitions.
mod period_micros {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_micros(u64::deserialize(d)?))
    }
}
