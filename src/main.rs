//! pointflow demo daemon
//!
//! Runs the engine against a handful of simulated points so the scheduler,
//! limit check and derived pipelines can be watched in the log.
//!
//! Usage: `pointflow [CONFIG] [SECONDS]`

use anyhow::Context;
use pointflow::{
    bus::channel::drain, config::LoggingConfig, ChannelListener, EngineConfig, PointDefinition,
    PointEngine, PointSpec, PointValue,
};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_RUN_SECONDS: u64 = 10;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => EngineConfig::load_or_default(),
    };
    let seconds: u64 = match args.next() {
        Some(s) => s.parse().context("run time must be whole seconds")?,
        None => DEFAULT_RUN_SECONDS,
    };

    let _guard = init_logging(&config.logging);
    tracing::info!("Starting pointflow demo for {}s", seconds);

    let engine = Arc::new(PointEngine::new(config)?);
    let report = engine.load(&demo_points());
    tracing::info!("{} demo points running", report.loaded);

    let (listener, rx) = ChannelListener::with_default_capacity("demo-log");
    let listener = Arc::new(listener);
    for name in ["ant1.cryo.ok", "ant1.power", "ant1.door.mirror"] {
        engine.subscribe(name, listener.clone())?;
    }

    // Simulated acquisition: temperature drifts into alarm and back.
    let feeder = engine.clone();
    let mut step = 0u32;
    let feed = engine.scheduler().schedule(
        "demo/feed",
        Duration::ZERO,
        Duration::from_millis(250),
        move || {
            step += 1;
            let temp = 12.0 + 6.0 * (f64::from(step) / 8.0).sin();
            let pushes = [
                ("ant1.cryo.temp", PointValue::now(temp).with_alarm(temp > 16.0)),
                ("ant1.volts", PointValue::now(48.0 + f64::from(step % 3))),
                ("ant1.amps", PointValue::now(1.5)),
                ("ant1.door", PointValue::now(if step % 20 < 10 { "closed" } else { "open" })),
            ];
            for (name, value) in pushes {
                if let Err(e) = feeder.push_value(name, value) {
                    tracing::warn!("push to {} failed: {}", name, e);
                }
            }
            ControlFlow::Continue(())
        },
    )?;

    let deadline = std::time::Instant::now() + Duration::from_secs(seconds);
    while std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(500));
        for event in drain(&rx) {
            tracing::info!(
                "{} = {} (alarm: {})",
                event.point_name(),
                event.value.value,
                event.value.alarm
            );
        }
    }

    tracing::info!("Shutting down...");
    engine.scheduler().cancel(&feed);
    engine.shutdown();
    Ok(())
}

fn demo_points() -> Vec<PointSpec> {
    let fast = Duration::from_millis(250);
    vec![
        PointSpec::new(PointDefinition::new("ant1.cryo.temp", "ant1", fast)),
        PointSpec::new(PointDefinition::new("ant1.volts", "ant1", fast)),
        PointSpec::new(PointDefinition::new("ant1.amps", "ant1", fast)),
        PointSpec::new(PointDefinition::new("ant1.door", "ant1", Duration::ZERO)),
        PointSpec::new(
            PointDefinition::new("ant1.cryo.ok", "ant1", Duration::from_secs(1))
                .with_description("Cryo temperature summary"),
        )
        .with_check("limitcheck", ["1000000", "3", "OK", "ALARM", "$1.cryo.temp"]),
        PointSpec::new(PointDefinition::new("ant1.power", "ant1", Duration::ZERO))
            .with_derived("expression", ["2", "$1.volts", "$1.amps", "x0 * x1"]),
        PointSpec::new(PointDefinition::new("ant1.door.mirror", "ant1", Duration::ZERO))
            .with_derived(
                "notifyonchange",
                ["1", "$1.door", "ops@example.org", "$N changed", "Door is now $V\\nat $T"],
            ),
    ]
}

/// Console logging plus, when configured, a daily rolling file.
fn init_logging(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pointflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}
