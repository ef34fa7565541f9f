//! # pointflow: telemetry point-processing engine
//!
//! Every named *point* periodically produces a value, optionally transformed
//! and alarm-checked, and hands each update to whoever subscribed to it
//! (archivers, GUIs, RPC clients, notifiers).
//!
//! ## Architecture
//!
//! - **Scheduler**: one shared tokio runtime drives every periodic task
//! - **Registry**: process-wide name → [`Point`] map with a "loaded" latch
//! - **Event bus**: per-point listener sets, snapshot delivery, fault isolation
//! - **Check pipeline**: produces or validates a point's value each period
//!   (built-in: debounced [`LimitCheck`])
//! - **Derived pipeline**: listens to other points and republishes a computed
//!   value (built-in: pass-through, Rhai expressions, notify-on-change)
//!
//! ## Configuration
//!
//! Engine settings live in `pointflow.toml` under the platform config
//! directory (see [`config::default_config_path`]).
//!
//! ## Example
//!
//! ```no_run
//! use pointflow::{EngineConfig, PointDefinition, PointEngine, PointSpec, PointValue};
//! use std::time::Duration;
//!
//! # fn main() -> pointflow::Result<()> {
//! let engine = PointEngine::new(EngineConfig::load_or_default())?;
//! engine.load(&[
//!     PointSpec::new(PointDefinition::new("ant1.cryo.temp", "ant1", Duration::from_secs(1))),
//!     PointSpec::new(PointDefinition::new("ant1.cryo.ok", "ant1", Duration::from_secs(1)))
//!         .with_check("limitcheck", ["1000000", "3", "OK", "ALARM", "$1.cryo.temp"]),
//! ]);
//!
//! engine.push_value("ant1.cryo.temp", PointValue::now(14.2).with_alarm(true))?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod bus;
pub mod check;
pub mod config;
pub mod derived;
pub mod engine;
pub mod error;
pub mod notify;
pub mod point;
pub mod scheduler;
pub mod types;

// Re-export commonly used types
pub use buffer::{PointBuffer, ValueLookup};
pub use bus::{ChannelListener, EventBus, PointListener};
pub use check::LimitCheck;
pub use config::EngineConfig;
pub use derived::{DerivedPipeline, MatchPolicy};
pub use engine::{PointEngine, PointSpec};
pub use error::{EngineError, Result};
pub use notify::{Notification, Notifier};
pub use point::{Point, PointDefinition, PointId, PointRegistry};
pub use scheduler::Scheduler;
pub use types::{PointValue, Tristate, Value, ValueEvent};
