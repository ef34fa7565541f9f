//! Acquisition/check pipelines (the "transaction" stage of a point).
//!
//! Every point owns exactly one check pipeline. Periodic checks are driven by
//! the shared scheduler; on each tick they read whatever they need through a
//! [`CheckContext`] and may return a value to publish on the owning point.
//!
//! Two-layer design, like the rest of the engine's extensible stages:
//! - **`CheckPlugin` trait** for user-defined checks.
//! - **`BuiltinCheck` enum** for the checks shipped with the engine.
//!
//! `AnyCheck` wraps either so the engine handles both uniformly.

pub mod limit;
pub mod window;

pub use limit::LimitCheck;
pub use window::CheckWindow;

use crate::buffer::ValueLookup;
use crate::error::{EngineError, Result};
use crate::point::{Point, PointRegistry};
use crate::types::PointValue;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Everything a check may consult during one tick.
pub struct CheckContext<'a> {
    /// Registry, for input points' identity and periods.
    pub registry: &'a PointRegistry,
    /// Latest-value source for input points.
    pub lookup: &'a dyn ValueLookup,
    /// Acquisition time of this tick.
    pub now: DateTime<Utc>,
    /// Monotonic tick counter for this check instance.
    pub tick: u64,
}

/// Trait for pluggable/user-defined checks.
pub trait CheckPlugin: Send {
    /// Human-readable name of this check.
    fn name(&self) -> &str;

    /// How often to run. `None` means the check is never scheduled.
    fn period(&self) -> Option<Duration>;

    /// Run one evaluation cycle.
    fn on_tick(&mut self, ctx: &CheckContext) -> Option<PointValue>;
}

/// Check for points whose values are pushed in from outside.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveCheck;

impl PassiveCheck {
    pub fn name(&self) -> &str {
        "Passive"
    }

    pub fn period(&self) -> Option<Duration> {
        None
    }

    pub fn on_tick(&mut self, _ctx: &CheckContext) -> Option<PointValue> {
        None
    }
}

/// Enum dispatch for built-in checks.
pub enum BuiltinCheck {
    Passive(PassiveCheck),
    LimitCheck(LimitCheck),
}

impl BuiltinCheck {
    pub fn name(&self) -> &str {
        match self {
            BuiltinCheck::Passive(c) => c.name(),
            BuiltinCheck::LimitCheck(c) => c.name(),
        }
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            BuiltinCheck::Passive(c) => c.period(),
            BuiltinCheck::LimitCheck(c) => c.period(),
        }
    }

    pub fn on_tick(&mut self, ctx: &CheckContext) -> Option<PointValue> {
        match self {
            BuiltinCheck::Passive(c) => c.on_tick(ctx),
            BuiltinCheck::LimitCheck(c) => c.on_tick(ctx),
        }
    }
}

/// Wrapper that holds either a built-in check or a plugin.
pub enum AnyCheck {
    Builtin(BuiltinCheck),
    Plugin(Box<dyn CheckPlugin>),
}

impl AnyCheck {
    pub fn name(&self) -> &str {
        match self {
            AnyCheck::Builtin(c) => c.name(),
            AnyCheck::Plugin(c) => c.name(),
        }
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            AnyCheck::Builtin(c) => c.period(),
            AnyCheck::Plugin(c) => c.period(),
        }
    }

    pub fn on_tick(&mut self, ctx: &CheckContext) -> Option<PointValue> {
        match self {
            AnyCheck::Builtin(c) => c.on_tick(ctx),
            AnyCheck::Plugin(c) => c.on_tick(ctx),
        }
    }
}

impl From<LimitCheck> for AnyCheck {
    fn from(c: LimitCheck) -> Self {
        AnyCheck::Builtin(BuiltinCheck::LimitCheck(c))
    }
}

impl From<Box<dyn CheckPlugin>> for AnyCheck {
    fn from(c: Box<dyn CheckPlugin>) -> Self {
        AnyCheck::Plugin(c)
    }
}

/// Build a built-in check from its kind name and string arguments.
///
/// Recognised kinds: `"none"` / `"passive"` and `"limitcheck"`.
pub fn build_check(kind: &str, parent: &Point, args: &[String]) -> Result<AnyCheck> {
    match kind.to_ascii_lowercase().as_str() {
        "" | "none" | "passive" => Ok(AnyCheck::Builtin(BuiltinCheck::Passive(PassiveCheck))),
        "limitcheck" => Ok(LimitCheck::from_args(parent, args)?.into()),
        other => Err(EngineError::Config(format!(
            "({}) unknown check kind '{}'",
            parent.name(),
            other
        ))),
    }
}

/// Parse a required integer argument.
pub(crate) fn parse_arg<T: std::str::FromStr>(
    parent: &Point,
    args: &[String],
    index: usize,
    what: &str,
) -> Result<T> {
    let raw = args.get(index).ok_or_else(|| {
        EngineError::Config(format!("({}) missing argument: {}", parent.name(), what))
    })?;
    raw.trim().parse::<T>().map_err(|_| {
        EngineError::Config(format!(
            "({}) invalid {} '{}'",
            parent.name(),
            what,
            raw
        ))
    })
}
