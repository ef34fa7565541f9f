//! Debounced limit-alarm summary over a set of points.
//!
//! Periodically inspects the alarm flags of its input points and publishes a
//! summary string on the owning point. A single bad cycle is not enough to
//! raise the alarm string; the whole debounce window must be bad.
//!
//! ## Arguments
//!
//! ```text
//! [period_us, window_len, good_output, bad_output, input_1, input_2, ...]
//! ```
//!
//! `period_us` is in microseconds and should match the owning point's own
//! period. Input names may contain `$1`, replaced by the owning point's source.
//!
//! ## Per-cycle summary
//!
//! | inputs                          | summary   |
//! |---------------------------------|-----------|
//! | all available, none alarming    | `Good`    |
//! | any unavailable, none alarming  | `Unknown` |
//! | any available input alarming    | `Bad`     |
//!
//! An input is unavailable when its point is not registered, has no value,
//! or its value is older than twice that point's period.

use crate::check::window::CheckWindow;
use crate::check::{parse_arg, CheckContext};
use crate::error::{EngineError, Result};
use crate::point::Point;
use crate::types::{PointValue, Tristate, Value};
use std::time::Duration;

/// Minimum number of constructor arguments.
pub const MIN_ARGS: usize = 5;

pub struct LimitCheck {
    owner: String,
    period: Duration,
    window: CheckWindow,
    good_output: String,
    bad_output: String,
    inputs: Vec<String>,
}

impl LimitCheck {
    /// Build from point-definition arguments.
    pub fn from_args(parent: &Point, args: &[String]) -> Result<Self> {
        if args.len() < MIN_ARGS {
            return Err(EngineError::Config(format!(
                "({}) LimitCheck requires at least {} arguments, got {}",
                parent.name(),
                MIN_ARGS,
                args.len()
            )));
        }

        let period_us: u64 = parse_arg(parent, args, 0, "period (us)")?;
        if period_us == 0 {
            return Err(EngineError::Config(format!(
                "({}) LimitCheck period must be non-zero",
                parent.name()
            )));
        }
        let window_len: usize = parse_arg(parent, args, 1, "window length")?;
        if window_len == 0 {
            return Err(EngineError::Config(format!(
                "({}) LimitCheck window length must be at least 1",
                parent.name()
            )));
        }

        let inputs = args[4..]
            .iter()
            .map(|name| parent.substitute_source(name))
            .collect();

        Ok(Self::new(
            parent.name(),
            Duration::from_micros(period_us),
            window_len,
            args[2].clone(),
            args[3].clone(),
            inputs,
        ))
    }

    pub fn new(
        owner: impl Into<String>,
        period: Duration,
        window_len: usize,
        good_output: impl Into<String>,
        bad_output: impl Into<String>,
        inputs: Vec<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            period,
            window: CheckWindow::new(window_len),
            good_output: good_output.into(),
            bad_output: bad_output.into(),
            inputs,
        }
    }

    pub fn name(&self) -> &str {
        "LimitCheck"
    }

    pub fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn window(&self) -> &CheckWindow {
        &self.window
    }

    /// Run one cycle: summarise inputs, shift the window, decide the output.
    pub fn on_tick(&mut self, ctx: &CheckContext) -> Option<PointValue> {
        let summary = self.summarise(ctx);
        self.window.push(summary);
        tracing::trace!(
            "({}) tick {} summary={} window={:?}",
            self.owner,
            ctx.tick,
            summary,
            self.window.iter().collect::<Vec<_>>()
        );
        self.decide(ctx)
    }

    /// Classify one input for this cycle.
    fn classify(&self, ctx: &CheckContext, name: &str) -> Tristate {
        let Some(point) = ctx.registry.lookup(name) else {
            return Tristate::Unknown;
        };
        let Some(sample) = ctx.lookup.latest_value(name) else {
            return Tristate::Unknown;
        };

        let period = point.period();
        if !period.is_zero() {
            let max_age = chrono::Duration::from_std(period * 2).unwrap_or(chrono::Duration::MAX);
            if sample.age(ctx.now) > max_age {
                return Tristate::Unknown;
            }
        }

        Tristate::from_alarm(sample.alarm)
    }

    /// Fold every input into one cycle summary.
    ///
    /// All inputs are examined even after an unavailable one, so that a
    /// confirmed alarm is never hidden behind a missing input.
    fn summarise(&self, ctx: &CheckContext) -> Tristate {
        let states: Vec<Tristate> = self
            .inputs
            .iter()
            .map(|name| self.classify(ctx, name))
            .collect();

        let mut summary = Tristate::Good;
        if states.iter().any(|s| s.is_unknown()) {
            summary = Tristate::Unknown;
        }
        if states.iter().any(|s| s.is_bad()) {
            summary = Tristate::Bad;
        }
        summary
    }

    fn decide(&self, ctx: &CheckContext) -> Option<PointValue> {
        if self.window.all_bad() {
            return Some(
                PointValue::new(Value::Text(self.bad_output.clone()), ctx.now).with_alarm(true),
            );
        }
        match self.window.newest() {
            // Not (yet) a sustained alarm.
            Tristate::Good | Tristate::Bad => Some(PointValue::new(
                Value::Text(self.good_output.clone()),
                ctx.now,
            )),
            Tristate::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{MockValueLookup, PointBuffer, ValueLookup};
    use crate::point::{PointDefinition, PointId, PointRegistry};
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn parent() -> Point {
        Point::new(
            PointId(0),
            &PointDefinition::new("ant1.cryo.ok", "ant1", Duration::from_secs(1)),
        )
    }

    fn registry(names: &[&str]) -> PointRegistry {
        let registry = PointRegistry::new();
        for name in names {
            registry
                .register(&PointDefinition::new(*name, "ant1", Duration::from_secs(1)))
                .unwrap();
        }
        registry
    }

    fn ctx<'a>(
        registry: &'a PointRegistry,
        lookup: &'a dyn ValueLookup,
        now: DateTime<Utc>,
    ) -> CheckContext<'a> {
        CheckContext {
            registry,
            lookup,
            now,
            tick: 0,
        }
    }

    fn output(v: &Option<PointValue>) -> Option<&str> {
        v.as_ref().and_then(|v| v.value.as_str())
    }

    #[test]
    fn test_from_args() {
        let check = LimitCheck::from_args(
            &parent(),
            &args(&["10000000", "3", "OK", "ALARM", "$1.cryo.temp", "site.wind"]),
        )
        .unwrap();
        assert_eq!(check.period(), Some(Duration::from_secs(10)));
        assert_eq!(check.window().len(), 3);
        assert_eq!(check.inputs(), &["ant1.cryo.temp", "site.wind"]);
    }

    #[test]
    fn test_from_args_rejects_bad_input() {
        let p = parent();
        for bad in [
            args(&["1000", "3", "OK", "ALARM"]),
            args(&["abc", "3", "OK", "ALARM", "x"]),
            args(&["1000", "-1", "OK", "ALARM", "x"]),
            args(&["1000", "0", "OK", "ALARM", "x"]),
            args(&["0", "3", "OK", "ALARM", "x"]),
        ] {
            let err = LimitCheck::from_args(&p, &bad).err().unwrap();
            assert!(err.is_config(), "{:?} should be a config error", bad);
        }
    }

    #[test]
    fn test_debounce_scenario() {
        // Window 3, alarm sequence [F, F, T, T, T] → OK, OK, OK, OK, ALARM.
        let registry = registry(&["in"]);
        let buffer = PointBuffer::new();
        let mut check =
            LimitCheck::new("out", Duration::from_secs(1), 3, "OK", "ALARM", vec!["in".into()]);

        let mut outputs = Vec::new();
        for alarm in [false, false, true, true, true] {
            let now = Utc::now();
            buffer.update("in", &PointValue::new(1.0, now).with_alarm(alarm));
            let out = check.on_tick(&ctx(&registry, &buffer, now));
            outputs.push(output(&out).map(str::to_string));
        }
        assert_eq!(
            outputs,
            vec![
                Some("OK".to_string()),
                Some("OK".to_string()),
                Some("OK".to_string()),
                Some("OK".to_string()),
                Some("ALARM".to_string()),
            ]
        );
    }

    #[test]
    fn test_alarm_output_sets_alarm_flag() {
        let registry = registry(&["in"]);
        let buffer = PointBuffer::new();
        let mut check =
            LimitCheck::new("out", Duration::from_secs(1), 1, "OK", "ALARM", vec!["in".into()]);
        let now = Utc::now();

        buffer.update("in", &PointValue::new(1.0, now).with_alarm(true));
        let out = check.on_tick(&ctx(&registry, &buffer, now)).unwrap();
        assert_eq!(out.value.as_str(), Some("ALARM"));
        assert!(out.alarm);
        assert_eq!(out.timestamp, now);

        buffer.update("in", &PointValue::new(1.0, now));
        let out = check.on_tick(&ctx(&registry, &buffer, now)).unwrap();
        assert_eq!(out.value.as_str(), Some("OK"));
        assert!(!out.alarm);
    }

    #[test]
    fn test_bad_overrides_missing_input() {
        let registry = registry(&["a"]);
        let buffer = PointBuffer::new();
        let now = Utc::now();
        buffer.update("a", &PointValue::new(1.0, now).with_alarm(true));

        // Missing input listed first must not hide the alarm on `a`.
        let mut check = LimitCheck::new(
            "out",
            Duration::from_secs(1),
            1,
            "OK",
            "ALARM",
            vec!["b".into(), "a".into()],
        );
        let out = check.on_tick(&ctx(&registry, &buffer, now));
        assert_eq!(check.window().newest(), Tristate::Bad);
        assert_eq!(output(&out), Some("ALARM"));
    }

    #[test]
    fn test_unknown_latest_publishes_nothing() {
        let registry = registry(&["a"]);
        let buffer = PointBuffer::new();
        let now = Utc::now();
        let mut check =
            LimitCheck::new("out", Duration::from_secs(1), 2, "OK", "ALARM", vec!["a".into()]);

        buffer.update("a", &PointValue::new(1.0, now));
        assert_eq!(output(&check.on_tick(&ctx(&registry, &buffer, now))), Some("OK"));

        buffer.forget("a");
        assert!(check.on_tick(&ctx(&registry, &buffer, now)).is_none());
        assert_eq!(check.window().newest(), Tristate::Unknown);
    }

    #[test]
    fn test_stale_value_is_unavailable() {
        let registry = registry(&["a"]);
        let buffer = PointBuffer::new();
        let now = Utc::now();
        let mut check =
            LimitCheck::new("out", Duration::from_secs(1), 1, "OK", "ALARM", vec!["a".into()]);

        // Period is 1s; 2.5s old is stale even though it alarms.
        buffer.update(
            "a",
            &PointValue::new(1.0, now - chrono::Duration::milliseconds(2500)).with_alarm(true),
        );
        assert!(check.on_tick(&ctx(&registry, &buffer, now)).is_none());
        assert_eq!(check.window().newest(), Tristate::Unknown);

        // 1.5s old is still fresh.
        buffer.update(
            "a",
            &PointValue::new(1.0, now - chrono::Duration::milliseconds(1500)).with_alarm(true),
        );
        check.on_tick(&ctx(&registry, &buffer, now));
        assert_eq!(check.window().newest(), Tristate::Bad);
    }

    #[test]
    fn test_aperiodic_point_never_stale() {
        let registry = PointRegistry::new();
        registry
            .register(&PointDefinition::new("a", "s", Duration::ZERO))
            .unwrap();
        let buffer = PointBuffer::new();
        let now = Utc::now();
        buffer.update("a", &PointValue::new(1.0, now - chrono::Duration::days(3)));

        let mut check =
            LimitCheck::new("out", Duration::from_secs(1), 1, "OK", "ALARM", vec!["a".into()]);
        check.on_tick(&ctx(&registry, &buffer, now));
        assert_eq!(check.window().newest(), Tristate::Good);
    }

    #[test]
    fn test_unregistered_point_with_value_is_unavailable() {
        let registry = PointRegistry::new();
        let mut lookup = MockValueLookup::new();
        lookup
            .expect_latest_value()
            .returning(|_| Some(PointValue::now(1.0)));

        let mut check =
            LimitCheck::new("out", Duration::from_secs(1), 1, "OK", "ALARM", vec!["ghost".into()]);
        assert!(check.on_tick(&ctx(&registry, &lookup, Utc::now())).is_none());
    }

    #[test]
    fn test_every_input_is_looked_up_each_cycle() {
        let registry = registry(&["a", "b", "c"]);
        let mut lookup = MockValueLookup::new();
        lookup
            .expect_latest_value()
            .times(6)
            .returning(|_| Some(PointValue::now(0.0)));

        let mut check = LimitCheck::new(
            "out",
            Duration::from_secs(1),
            2,
            "OK",
            "ALARM",
            vec!["a".into(), "b".into(), "c".into()],
        );
        let now = Utc::now();
        check.on_tick(&ctx(&registry, &lookup, now));
        check.on_tick(&ctx(&registry, &lookup, now));
    }

    fn state_strategy() -> impl Strategy<Value = Option<bool>> {
        // None = missing input, Some(alarm)
        prop_oneof![Just(None), Just(Some(false)), Just(Some(true))]
    }

    proptest! {
        #[test]
        fn prop_output_follows_window(
            window_len in 1usize..6,
            cycles in prop::collection::vec(state_strategy(), 1..30),
        ) {
            let registry = registry(&["in"]);
            let buffer = PointBuffer::new();
            let mut check = LimitCheck::new(
                "out", Duration::from_secs(1), window_len, "OK", "ALARM", vec!["in".into()],
            );

            let mut history: Vec<Tristate> = vec![Tristate::Unknown; window_len];
            for cycle in cycles {
                let now = Utc::now();
                match cycle {
                    Some(alarm) => buffer.update("in", &PointValue::new(1.0, now).with_alarm(alarm)),
                    None => buffer.forget("in"),
                }
                let expected_state = match cycle {
                    None => Tristate::Unknown,
                    Some(alarm) => Tristate::from_alarm(alarm),
                };
                history.remove(0);
                history.push(expected_state);

                let out = check.on_tick(&ctx(&registry, &buffer, now));
                let all_bad = history.iter().all(|s| s.is_bad());
                if all_bad {
                    prop_assert_eq!(output(&out), Some("ALARM"));
                } else if expected_state.is_unknown() {
                    prop_assert!(out.is_none());
                } else {
                    prop_assert_eq!(output(&out), Some("OK"));
                }
            }
        }

        #[test]
        fn prop_any_bad_input_forces_bad(
            states in prop::collection::vec(state_strategy(), 1..8),
        ) {
            let names: Vec<String> = (0..states.len()).map(|i| format!("in{}", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let registry = registry(&refs);
            let buffer = PointBuffer::new();
            let now = Utc::now();
            for (name, state) in names.iter().zip(&states) {
                if let Some(alarm) = state {
                    buffer.update(name, &PointValue::new(1.0, now).with_alarm(*alarm));
                }
            }

            let mut check = LimitCheck::new(
                "out", Duration::from_secs(1), 1, "OK", "ALARM", names.clone(),
            );
            check.on_tick(&ctx(&registry, &buffer, now));

            let expected = if states.iter().any(|s| *s == Some(true)) {
                Tristate::Bad
            } else if states.iter().any(|s| s.is_none()) {
                Tristate::Unknown
            } else {
                Tristate::Good
            };
            prop_assert_eq!(check.window().newest(), expected);
        }
    }
}
