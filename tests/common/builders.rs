//! Test data builders for creating test objects

use chrono::{DateTime, Utc};
use pointflow::{PointDefinition, PointSpec, PointValue, Value};
use std::time::Duration;

/// Builder for point specs
pub struct PointSpecBuilder {
    name: String,
    source: String,
    period: Duration,
    check: Option<(String, Vec<String>)>,
    derived: Option<(String, Vec<String>)>,
}

impl PointSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: "test".to_string(),
            period: Duration::ZERO,
            check: None,
            derived: None,
        }
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Limit check with the given period, window and inputs, outputs "OK"/"ALARM"
    pub fn limit_check(mut self, period: Duration, window: usize, inputs: &[&str]) -> Self {
        let mut args = vec![
            period.as_micros().to_string(),
            window.to_string(),
            "OK".to_string(),
            "ALARM".to_string(),
        ];
        args.extend(inputs.iter().map(|s| s.to_string()));
        self.check = Some(("limitcheck".to_string(), args));
        self
    }

    pub fn derived(mut self, kind: &str, inputs: &[&str], extra: &[&str]) -> Self {
        let mut args = vec![inputs.len().to_string()];
        args.extend(inputs.iter().map(|s| s.to_string()));
        args.extend(extra.iter().map(|s| s.to_string()));
        self.derived = Some((kind.to_string(), args));
        self
    }

    pub fn build(self) -> PointSpec {
        let mut spec = PointSpec::new(PointDefinition::new(self.name, self.source, self.period));
        if let Some((kind, args)) = self.check {
            spec = spec.with_check(kind, args);
        }
        if let Some((kind, args)) = self.derived {
            spec = spec.with_derived(kind, args);
        }
        spec
    }
}

/// Builder for point values
pub struct ValueBuilder {
    value: Value,
    timestamp: DateTime<Utc>,
    alarm: bool,
}

impl ValueBuilder {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            timestamp: Utc::now(),
            alarm: false,
        }
    }

    pub fn alarm(mut self, alarm: bool) -> Self {
        self.alarm = alarm;
        self
    }

    pub fn aged(mut self, age: Duration) -> Self {
        self.timestamp = Utc::now() - chrono::Duration::from_std(age).unwrap();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn build(self) -> PointValue {
        PointValue::new(self.value, self.timestamp).with_alarm(self.alarm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_spec_builder() {
        let spec = PointSpecBuilder::new("ant1.ok")
            .source("ant1")
            .limit_check(Duration::from_millis(50), 3, &["$1.temp"])
            .build();

        assert_eq!(spec.definition.name, "ant1.ok");
        assert_eq!(spec.check.kind, "limitcheck");
        assert_eq!(spec.check.args, vec!["50000", "3", "OK", "ALARM", "$1.temp"]);
    }
}
