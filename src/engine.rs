//! Engine facade.
//!
//! [`PointEngine`] owns the shared pieces (registry, bus, latest-value
//! buffer, scheduler, notifier) and wires each point's pipelines to them.
//! It is also the surface an RPC or GUI layer talks to: list points, read
//! current values and alarm states, subscribe listeners and push raw values
//! into passive points.
//!
//! # Publish path
//!
//! Every value, raw or processed, goes through the same steps:
//!
//! 1. record it in the [`PointBuffer`] as the point's latest sample
//! 2. deliver it on the [`EventBus`] to the point's listeners
//!
//! so a listener that reads `current_value` from inside its callback sees the
//! value it is being told about.

use crate::buffer::{PointBuffer, ValueLookup};
use crate::bus::{DeliveryReport, EventBus, PointListener, ValueSink};
use crate::check::{build_check, AnyCheck, CheckContext};
use crate::config::EngineConfig;
use crate::derived::{build_derived, DerivedConfig, DerivedPipeline, MatchPolicy, ResolutionState};
use crate::error::{EngineError, Result, ResultExt};
use crate::notify::{Notifier, TracingNotifier};
use crate::point::{ListenerId, Point, PointDefinition, PointId, PointRegistry};
use crate::scheduler::{ScheduleHandle, Scheduler};
use crate::types::{PointValue, Tristate};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Kind and arguments of one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl PipelineSpec {
    pub fn new<S: Into<String>>(kind: impl Into<String>, args: impl IntoIterator<Item = S>) -> Self {
        Self {
            kind: kind.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Derived stage with its slot-matching policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedSpec {
    #[serde(flatten)]
    pub pipeline: PipelineSpec,
    #[serde(default)]
    pub policy: MatchPolicy,
}

/// Everything needed to create one point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointSpec {
    #[serde(flatten)]
    pub definition: PointDefinition,
    /// Check stage. An empty kind means passive.
    #[serde(default)]
    pub check: PipelineSpec,
    #[serde(default)]
    pub derived: Option<DerivedSpec>,
}

impl PointSpec {
    pub fn new(definition: PointDefinition) -> Self {
        Self {
            definition,
            check: PipelineSpec::default(),
            derived: None,
        }
    }

    pub fn with_check<S: Into<String>>(
        mut self,
        kind: impl Into<String>,
        args: impl IntoIterator<Item = S>,
    ) -> Self {
        self.check = PipelineSpec::new(kind, args);
        self
    }

    pub fn with_derived<S: Into<String>>(
        mut self,
        kind: impl Into<String>,
        args: impl IntoIterator<Item = S>,
    ) -> Self {
        self.derived = Some(DerivedSpec {
            pipeline: PipelineSpec::new(kind, args),
            policy: MatchPolicy::default(),
        });
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        if let Some(derived) = self.derived.as_mut() {
            derived.policy = policy;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// Outcome of [`PointEngine::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: Vec<String>,
}

/// Components shared with running pipelines.
struct Core {
    registry: PointRegistry,
    bus: EventBus,
    buffer: PointBuffer,
}

impl ValueSink for Core {
    fn publish(&self, point: &Point, value: PointValue, raw: bool) -> DeliveryReport {
        self.buffer.update(point.name(), &value);
        self.bus.publish(point, value, raw)
    }
}

/// Run-time state of one point.
struct PointRuntime {
    point: Arc<Point>,
    check_kind: String,
    passive: bool,
    check_task: Option<ScheduleHandle>,
    derived: Option<Arc<DerivedPipeline>>,
    resolve_task: Option<ScheduleHandle>,
}

/// Summary of a point's wiring, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct PointStatus {
    pub name: String,
    pub source: String,
    pub period: Duration,
    pub check: String,
    pub derived: Option<String>,
    pub inputs: Vec<(String, ResolutionState)>,
    pub listeners: usize,
}

pub struct PointEngine {
    config: EngineConfig,
    core: Arc<Core>,
    runtimes: DashMap<PointId, PointRuntime>,
    notifier: Arc<dyn Notifier>,
    scheduler: Scheduler,
}

impl PointEngine {
    /// Create an engine that sends notifications to the log.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_notifier(config, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(config: EngineConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate()?;
        let scheduler = Scheduler::new(&config.scheduler)?;
        Ok(Self {
            config,
            core: Arc::new(Core {
                registry: PointRegistry::new(),
                bus: EventBus::new(),
                buffer: PointBuffer::new(),
            }),
            runtimes: DashMap::new(),
            notifier,
            scheduler,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &PointRegistry {
        &self.core.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.core.bus
    }

    pub fn buffer(&self) -> &PointBuffer {
        &self.core.buffer
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Load a batch of point specs.
    ///
    /// A spec whose pipelines fail to build is logged and skipped; the rest
    /// of the batch still loads. The registry's "all points loaded" latch is
    /// set afterwards.
    pub fn load(&self, specs: &[PointSpec]) -> LoadReport {
        let mut report = LoadReport::default();
        for spec in specs {
            match self.add_point(spec) {
                Ok(_) => report.loaded += 1,
                Err(e) => {
                    tracing::error!("Skipping point '{}': {}", spec.name(), e);
                    report.failed.push(spec.name().to_string());
                }
            }
        }
        self.core.registry.mark_all_loaded();
        tracing::info!(
            "Loaded {} points ({} skipped)",
            report.loaded,
            report.failed.len()
        );
        report
    }

    /// Build, register and start one point.
    ///
    /// Pipelines are built before the name is registered, and a point whose
    /// pipelines fail to start is unregistered again, so an error leaves no
    /// trace in the registry.
    pub fn add_point(&self, spec: &PointSpec) -> Result<Arc<Point>> {
        let draft = Point::new(PointId::INVALID, &spec.definition);
        let check = build_check(&spec.check.kind, &draft, &spec.check.args)
            .with_context(|| format!("check stage of '{}'", spec.name()))?;
        let derived = match &spec.derived {
            Some(d) => Some(
                build_derived(
                    &d.pipeline.kind,
                    &draft,
                    &d.pipeline.args,
                    d.policy,
                    &self.notifier,
                )
                .with_context(|| format!("derived stage of '{}'", spec.name()))?,
            ),
            None => None,
        };

        self.install(&spec.definition, check, derived)
    }

    fn install(
        &self,
        definition: &PointDefinition,
        check: AnyCheck,
        derived: Option<DerivedConfig>,
    ) -> Result<Arc<Point>> {
        let point = self.core.registry.register(definition)?;
        match self.start(&point, check, derived) {
            Ok(runtime) => {
                self.runtimes.insert(point.id(), runtime);
                Ok(point)
            }
            Err(e) => {
                self.core.registry.remove(point.name());
                tracing::warn!("Failed to start '{}', unregistered: {}", point.name(), e);
                Err(e)
            }
        }
    }

    fn start(
        &self,
        point: &Arc<Point>,
        check: AnyCheck,
        derived: Option<DerivedConfig>,
    ) -> Result<PointRuntime> {
        let check_kind = check.name().to_string();
        let passive = check.period().is_none();
        let check_task = self.start_check(point, check)?;
        let (derived, resolve_task) = match derived.map(|config| self.start_derived(point, config)) {
            Some(Ok((pipeline, task))) => (Some(pipeline), task),
            Some(Err(e)) => {
                if let Some(handle) = &check_task {
                    self.scheduler.cancel(handle);
                }
                return Err(e);
            }
            None => (None, None),
        };

        tracing::debug!(
            "Started '{}' (check: {}, derived: {})",
            point.name(),
            check_kind,
            derived.as_ref().map(|d| d.aggregator_name()).unwrap_or_else(|| "-".into())
        );
        Ok(PointRuntime {
            point: point.clone(),
            check_kind,
            passive,
            check_task,
            derived,
            resolve_task,
        })
    }

    fn start_check(&self, point: &Arc<Point>, mut check: AnyCheck) -> Result<Option<ScheduleHandle>> {
        let Some(period) = check.period() else {
            return Ok(None);
        };
        let core = self.core.clone();
        let owner = point.clone();
        let mut tick = 0u64;
        let handle = self.scheduler.schedule(
            &format!("{}/check", point.name()),
            Duration::ZERO,
            period,
            move || {
                let ctx = CheckContext {
                    registry: &core.registry,
                    lookup: &core.buffer,
                    now: Utc::now(),
                    tick,
                };
                tick += 1;
                if let Some(value) = check.on_tick(&ctx) {
                    core.publish(&owner, value, false);
                }
                ControlFlow::Continue(())
            },
        )?;
        Ok(Some(handle))
    }

    fn start_derived(
        &self,
        point: &Arc<Point>,
        config: DerivedConfig,
    ) -> Result<(Arc<DerivedPipeline>, Option<ScheduleHandle>)> {
        let sink: Weak<dyn ValueSink> = Arc::downgrade(&self.core) as Weak<dyn ValueSink>;
        let pipeline = Arc::new(DerivedPipeline::new(point.clone(), config, sink));

        // Inputs loaded earlier bind immediately; the rest are polled for.
        if pipeline.resolve_pending(&self.core.registry, &self.core.bus).is_break() {
            return Ok((pipeline, None));
        }

        let core = self.core.clone();
        let task_pipeline = pipeline.clone();
        let scheduled = self.scheduler.schedule(
            &format!("{}/resolve", point.name()),
            self.config.resolution.poll_interval(),
            self.config.resolution.poll_interval(),
            move || task_pipeline.resolve_pending(&core.registry, &core.bus),
        );
        match scheduled {
            Ok(handle) => Ok((pipeline, Some(handle))),
            Err(e) => {
                pipeline.detach(&self.core.bus);
                Err(e)
            }
        }
    }

    /// Stop a point's pipelines and drop its listeners.
    ///
    /// The point stays registered; only future deliveries stop.
    pub fn teardown(&self, name: &str) -> Result<()> {
        let point = self.point(name)?;
        let Some((_, runtime)) = self.runtimes.remove(&point.id()) else {
            return Ok(());
        };
        if let Some(handle) = &runtime.check_task {
            self.scheduler.cancel(handle);
        }
        if let Some(handle) = &runtime.resolve_task {
            self.scheduler.cancel(handle);
        }
        if let Some(pipeline) = &runtime.derived {
            pipeline.detach(&self.core.bus);
        }
        let dropped = self.core.bus.remove_point(point.id());
        tracing::info!("Tore down '{}' ({} listeners dropped)", name, dropped);
        Ok(())
    }

    /// Tear down every point.
    pub fn shutdown(&self) {
        let names: Vec<String> = self
            .runtimes
            .iter()
            .map(|r| r.point.name().to_string())
            .collect();
        for name in names {
            if let Err(e) = self.teardown(&name) {
                tracing::warn!("Teardown of '{}' failed: {}", name, e);
            }
        }
    }

    fn point(&self, name: &str) -> Result<Arc<Point>> {
        self.core
            .registry
            .lookup(name)
            .ok_or_else(|| EngineError::UnknownPoint(name.to_string()))
    }

    /// Push an externally acquired value into a passive point.
    pub fn push_value(&self, name: &str, value: PointValue) -> Result<DeliveryReport> {
        let point = self.point(name)?;
        match self.runtimes.get(&point.id()).map(|r| r.passive) {
            Some(true) => {}
            Some(false) => {
                return Err(EngineError::Config(format!(
                    "'{}' is not a passive point",
                    name
                )))
            }
            None => return Err(EngineError::Config(format!("'{}' has been torn down", name))),
        }
        Ok(self.core.publish(&point, value, true))
    }

    /// Names of all registered points, in registration order.
    pub fn point_names(&self) -> Vec<String> {
        self.core.registry.names()
    }

    pub fn current_value(&self, name: &str) -> Option<PointValue> {
        self.core.buffer.latest_value(name)
    }

    pub fn alarm_state(&self, name: &str) -> Tristate {
        self.core.buffer.alarm_state(name)
    }

    /// Subscribe a listener to a point by name.
    pub fn subscribe(&self, name: &str, listener: Arc<dyn PointListener>) -> Result<bool> {
        let point = self
            .point(name)
            .context("Failed to subscribe")?;
        Ok(self.core.bus.subscribe(point.id(), listener))
    }

    /// Unsubscribe a listener. Unknown points and absent listeners are no-ops.
    pub fn unsubscribe(&self, name: &str, listener: ListenerId) -> bool {
        match self.core.registry.lookup(name) {
            Some(point) => self.core.bus.unsubscribe(point.id(), listener),
            None => false,
        }
    }

    pub fn status(&self, name: &str) -> Option<PointStatus> {
        let point = self.core.registry.lookup(name)?;
        let runtime = self.runtimes.get(&point.id());
        let (check, derived, inputs) = match runtime.as_deref() {
            Some(rt) => (
                rt.check_kind.clone(),
                rt.derived.as_ref().map(|d| d.aggregator_name()),
                rt.derived
                    .as_ref()
                    .map(|d| {
                        d.input_names()
                            .into_iter()
                            .zip(d.resolution())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
            ),
            None => ("stopped".to_string(), None, Vec::new()),
        };
        Some(PointStatus {
            name: point.name().to_string(),
            source: point.source().to_string(),
            period: point.period(),
            check,
            derived,
            inputs,
            listeners: self.core.bus.listener_count(point.id()),
        })
    }
}

impl Drop for PointEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PointEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointEngine")
            .field("points", &self.core.registry.len())
            .field("running", &self.runtimes.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
