//! Derived-value pipelines (the "translation" stage of a point).
//!
//! A derived pipeline listens to other points, collects their latest values
//! into ordered slots and, once the slots match, republishes a computed value
//! on its owning point. Inputs are named in configuration and may not exist
//! yet when the pipeline is built; a low-frequency resolution task keeps
//! looking them up until every one is bound.
//!
//! ```text
//!  input A ──┐
//!  input B ──┼─► slots [A, B, C] ──► match policy ──► aggregator ──► owning point
//!  input C ──┘        ▲
//!                     └── resolve_pending() binds + subscribes new inputs
//! ```
//!
//! Aggregation follows the same two-layer design as checks: a built-in enum
//! plus an [`Aggregator`] trait for custom computations.

pub mod expression;
pub mod notify;

pub use expression::ExpressionAggregator;
pub use notify::NotifyOnChange;

use crate::bus::{EventBus, PointListener, ValueSink};
use crate::check::parse_arg;
use crate::error::{EngineError, Result, ResultExt};
use crate::notify::Notifier;
use crate::point::{ListenerId, Point, PointId, PointRegistry};
use crate::scheduler::TaskFlow;
use crate::types::{PointValue, Value, ValueEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Binding state of one declared input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Name not (yet) found in the registry.
    Unresolved,
    /// Bound to this point and subscribed to it.
    Resolved(PointId),
}

impl ResolutionState {
    pub fn is_resolved(self) -> bool {
        matches!(self, ResolutionState::Resolved(_))
    }
}

/// When a set of slots is complete enough to compute an output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Every slot holds a non-absent value.
    #[default]
    AllPresent,
    /// Every slot holds a non-absent value and all timestamps are equal.
    EqualTimestamps,
}

impl MatchPolicy {
    pub fn matches(self, slots: &[Option<PointValue>]) -> bool {
        self.admits(slots, false)
    }

    /// Like [`matches`](Self::matches), but with `absent_ok` a slot holding
    /// an absent sample counts as filled.
    pub fn admits(self, slots: &[Option<PointValue>], absent_ok: bool) -> bool {
        let all_present = slots
            .iter()
            .all(|s| s.as_ref().is_some_and(|v| absent_ok || !v.value.is_absent()));
        if !all_present {
            return false;
        }
        match self {
            MatchPolicy::AllPresent => true,
            MatchPolicy::EqualTimestamps => {
                let mut stamps = slots.iter().flatten().map(|v| v.timestamp);
                match stamps.next() {
                    Some(first) => stamps.all(|t| t == first),
                    None => true,
                }
            }
        }
    }
}

/// What an aggregator knows about the output it is computing.
pub struct AggregateContext<'a> {
    /// Point the output will be published on.
    pub owner: &'a Point,
    /// Timestamp the output will carry.
    pub timestamp: DateTime<Utc>,
}

/// Trait for custom derived-value computations.
pub trait Aggregator: Send {
    fn name(&self) -> &str;

    /// Compute the output from the inputs in declaration order.
    /// Returning [`Value::Absent`] publishes nothing.
    fn calculate(&mut self, ctx: &AggregateContext, inputs: &[PointValue]) -> Result<Value>;

    /// Whether absent samples are passed to [`calculate`](Self::calculate)
    /// instead of holding the pipeline back.
    fn observes_absent(&self) -> bool {
        false
    }
}

/// Forwards the most recently timestamped input.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Passthrough {
    pub fn name(&self) -> &str {
        "Listener"
    }

    pub fn calculate(&mut self, _ctx: &AggregateContext, inputs: &[PointValue]) -> Result<Value> {
        Ok(inputs
            .iter()
            .max_by_key(|v| v.timestamp)
            .map(|v| v.value.clone())
            .unwrap_or_default())
    }
}

/// Enum dispatch for built-in aggregators.
pub enum BuiltinAggregator {
    Passthrough(Passthrough),
    Expression(ExpressionAggregator),
    NotifyOnChange(NotifyOnChange),
}

impl BuiltinAggregator {
    pub fn name(&self) -> &str {
        match self {
            BuiltinAggregator::Passthrough(a) => a.name(),
            BuiltinAggregator::Expression(a) => a.name(),
            BuiltinAggregator::NotifyOnChange(a) => a.name(),
        }
    }

    pub fn calculate(&mut self, ctx: &AggregateContext, inputs: &[PointValue]) -> Result<Value> {
        match self {
            BuiltinAggregator::Passthrough(a) => a.calculate(ctx, inputs),
            BuiltinAggregator::Expression(a) => a.calculate(ctx, inputs),
            BuiltinAggregator::NotifyOnChange(a) => a.calculate(ctx, inputs),
        }
    }

    pub fn observes_absent(&self) -> bool {
        matches!(self, BuiltinAggregator::NotifyOnChange(_))
    }
}

/// Wrapper that holds either a built-in aggregator or a plugin.
pub enum AnyAggregator {
    Builtin(BuiltinAggregator),
    Plugin(Box<dyn Aggregator>),
}

impl AnyAggregator {
    pub fn name(&self) -> &str {
        match self {
            AnyAggregator::Builtin(a) => a.name(),
            AnyAggregator::Plugin(a) => a.name(),
        }
    }

    pub fn calculate(&mut self, ctx: &AggregateContext, inputs: &[PointValue]) -> Result<Value> {
        match self {
            AnyAggregator::Builtin(a) => a.calculate(ctx, inputs),
            AnyAggregator::Plugin(a) => a.calculate(ctx, inputs),
        }
    }

    pub fn observes_absent(&self) -> bool {
        match self {
            AnyAggregator::Builtin(a) => a.observes_absent(),
            AnyAggregator::Plugin(a) => a.observes_absent(),
        }
    }
}

impl From<Passthrough> for AnyAggregator {
    fn from(a: Passthrough) -> Self {
        AnyAggregator::Builtin(BuiltinAggregator::Passthrough(a))
    }
}

impl From<ExpressionAggregator> for AnyAggregator {
    fn from(a: ExpressionAggregator) -> Self {
        AnyAggregator::Builtin(BuiltinAggregator::Expression(a))
    }
}

impl From<NotifyOnChange> for AnyAggregator {
    fn from(a: NotifyOnChange) -> Self {
        AnyAggregator::Builtin(BuiltinAggregator::NotifyOnChange(a))
    }
}

impl From<Box<dyn Aggregator>> for AnyAggregator {
    fn from(a: Box<dyn Aggregator>) -> Self {
        AnyAggregator::Plugin(a)
    }
}

/// A parsed derived-pipeline configuration, ready to be wired up.
pub struct DerivedConfig {
    pub inputs: Vec<String>,
    pub aggregator: AnyAggregator,
    pub policy: MatchPolicy,
}

/// Split `[N, name_1 .. name_N, rest..]` into substituted names and the rest.
pub fn parse_inputs<'a>(parent: &Point, args: &'a [String]) -> Result<(Vec<String>, &'a [String])> {
    let count: usize = parse_arg(parent, args, 0, "input count")?;
    if count == 0 {
        return Err(EngineError::Config(format!(
            "({}) derived pipeline needs at least one input",
            parent.name()
        )));
    }
    if args.len() < count + 1 {
        return Err(EngineError::Config(format!(
            "({}) expected {} input names, got {}",
            parent.name(),
            count,
            args.len() - 1
        )));
    }
    let inputs: Vec<String> = args[1..=count]
        .iter()
        .map(|name| parent.substitute_source(name))
        .collect();
    for (i, name) in inputs.iter().enumerate() {
        if name == parent.name() {
            return Err(EngineError::Config(format!(
                "({}) derived pipeline cannot take its own point as input",
                parent.name()
            )));
        }
        if inputs[..i].contains(name) {
            return Err(EngineError::Config(format!(
                "({}) input '{}' listed more than once",
                parent.name(),
                name
            )));
        }
    }
    Ok((inputs, &args[count + 1..]))
}

/// Build a built-in derived pipeline configuration from its kind name.
///
/// Recognised kinds: `"listener"`, `"expression"` and `"notifyonchange"`
/// (alias `"emailonchange"`).
pub fn build_derived(
    kind: &str,
    parent: &Point,
    args: &[String],
    policy: MatchPolicy,
    notifier: &Arc<dyn Notifier>,
) -> Result<DerivedConfig> {
    let (inputs, rest) = parse_inputs(parent, args)?;
    let aggregator: AnyAggregator = match kind.to_ascii_lowercase().as_str() {
        "listener" | "passthrough" => Passthrough.into(),
        "expression" => ExpressionAggregator::from_args(parent, rest)?.into(),
        "notifyonchange" | "emailonchange" => {
            if inputs.len() != 1 {
                return Err(EngineError::Config(format!(
                    "({}) {} takes exactly one input",
                    parent.name(),
                    kind
                )));
            }
            NotifyOnChange::from_args(parent, rest, notifier.clone())?.into()
        }
        other => {
            return Err(EngineError::Config(format!(
                "({}) unknown derived kind '{}'",
                parent.name(),
                other
            )))
        }
    };
    Ok(DerivedConfig {
        inputs,
        aggregator,
        policy,
    })
}

struct Slots {
    names: Vec<String>,
    resolution: Vec<ResolutionState>,
    latest: Vec<Option<PointValue>>,
    warned: Vec<bool>,
    aggregator: AnyAggregator,
    policy: MatchPolicy,
    detached: bool,
}

/// Outputs waiting to be published, in the order they were computed.
#[derive(Default)]
struct Outbox {
    queue: VecDeque<PointValue>,
    draining: bool,
}

thread_local! {
    /// Pipelines currently publishing on this thread.
    static PUBLISHING: RefCell<Vec<ListenerId>> = const { RefCell::new(Vec::new()) };
}

/// Marks a pipeline as publishing on the current thread until dropped.
struct PublishingGuard(ListenerId);

impl PublishingGuard {
    fn enter(id: ListenerId) -> Self {
        PUBLISHING.with(|p| p.borrow_mut().push(id));
        Self(id)
    }

    fn is_active(id: ListenerId) -> bool {
        PUBLISHING.with(|p| p.borrow().contains(&id))
    }
}

impl Drop for PublishingGuard {
    fn drop(&mut self) {
        PUBLISHING.with(|p| {
            let mut stack = p.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.0) {
                stack.remove(pos);
            }
        });
    }
}

/// A running derived-value pipeline.
///
/// Implements [`PointListener`] so it can be subscribed to its inputs.
/// Outputs are computed under the slot mutex and queued in that order; one
/// thread at a time drains the queue, so the owning point sees them in
/// computation order. An event that arrives while the same thread is
/// publishing this pipeline's output comes from an input cycle and is
/// dropped.
pub struct DerivedPipeline {
    id: ListenerId,
    owner: Arc<Point>,
    slots: Mutex<Slots>,
    outbox: Mutex<Outbox>,
    cycle_warned: AtomicBool,
    sink: Weak<dyn ValueSink>,
}

impl DerivedPipeline {
    pub fn new(owner: Arc<Point>, config: DerivedConfig, sink: Weak<dyn ValueSink>) -> Self {
        let n = config.inputs.len();
        Self {
            id: ListenerId::next(),
            owner,
            slots: Mutex::new(Slots {
                names: config.inputs,
                resolution: vec![ResolutionState::Unresolved; n],
                latest: vec![None; n],
                warned: vec![false; n],
                aggregator: config.aggregator,
                policy: config.policy,
                detached: false,
            }),
            outbox: Mutex::new(Outbox::default()),
            cycle_warned: AtomicBool::new(false),
            sink,
        }
    }

    pub fn owner(&self) -> &Arc<Point> {
        &self.owner
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn input_names(&self) -> Vec<String> {
        self.lock().names.clone()
    }

    pub fn resolution(&self) -> Vec<ResolutionState> {
        self.lock().resolution.clone()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.lock().resolution.iter().all(|r| r.is_resolved())
    }

    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }

    pub fn aggregator_name(&self) -> String {
        self.lock().aggregator.name().to_string()
    }

    /// Try to bind every unresolved input.
    ///
    /// Newly found inputs are subscribed on `bus`. Returns `Break` once all
    /// inputs are resolved, or once the pipeline has been detached, so the
    /// scheduled task removes itself.
    pub fn resolve_pending(self: &Arc<Self>, registry: &PointRegistry, bus: &EventBus) -> TaskFlow {
        let mut slots = self.lock();
        if slots.detached {
            return ControlFlow::Break(());
        }
        let loaded = registry.all_points_loaded();
        for i in 0..slots.names.len() {
            if slots.resolution[i].is_resolved() {
                continue;
            }
            match registry.lookup(&slots.names[i]) {
                Some(point) => {
                    slots.resolution[i] = ResolutionState::Resolved(point.id());
                    tracing::debug!("({}) resolved input '{}'", self.owner.name(), point.name());
                    // Subscribed under the slot lock so detach never misses it.
                    bus.subscribe(point.id(), self.clone() as Arc<dyn PointListener>);
                }
                None if loaded && !slots.warned[i] => {
                    slots.warned[i] = true;
                    let err = EngineError::UnresolvedReference {
                        owner: self.owner.name().to_string(),
                        target: slots.names[i].clone(),
                    };
                    tracing::warn!("{}; will keep retrying", err);
                }
                None => {}
            }
        }

        if slots.resolution.iter().all(|r| r.is_resolved()) {
            tracing::debug!("({}) all inputs resolved", self.owner.name());
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Unsubscribe from every resolved input and stop resolving.
    pub fn detach(&self, bus: &EventBus) {
        let mut slots = self.lock();
        slots.detached = true;
        for state in &slots.resolution {
            if let ResolutionState::Resolved(id) = state {
                bus.unsubscribe(*id, self.id);
            }
        }
    }

    /// Store an input value, compute the output if the slots now match and
    /// queue it for publishing. Returns whether an output was queued.
    fn accept(&self, event: &ValueEvent) -> Result<bool> {
        let mut slots = self.lock();
        if slots.detached {
            return Ok(false);
        }
        let Some(index) = slots.names.iter().position(|n| n == event.point_name()) else {
            tracing::warn!(
                "({}) ignoring unsolicited update from '{}'",
                self.owner.name(),
                event.point_name()
            );
            return Ok(false);
        };
        slots.latest[index] = Some(event.value.as_ref().clone());

        let absent_ok = slots.aggregator.observes_absent();
        if !slots.policy.admits(&slots.latest, absent_ok) {
            return Ok(false);
        }

        let inputs: Vec<PointValue> = slots.latest.iter().flatten().cloned().collect();
        let timestamp = match inputs.as_slice() {
            [single] => single.timestamp,
            _ => Utc::now(),
        };
        let ctx = AggregateContext {
            owner: &self.owner,
            timestamp,
        };
        let value = slots
            .aggregator
            .calculate(&ctx, &inputs)
            .with_context(|| format!("({}) derived calculation failed", self.owner.name()))?;

        if value.is_absent() {
            return Ok(false);
        }
        self.lock_outbox()
            .queue
            .push_back(PointValue::new(value, timestamp));
        Ok(true)
    }

    /// Publish queued outputs unless another thread is already doing so.
    fn drain(&self) {
        {
            let mut outbox = self.lock_outbox();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        let _publishing = PublishingGuard::enter(self.id);
        loop {
            let next = {
                let mut outbox = self.lock_outbox();
                match outbox.queue.pop_front() {
                    Some(output) => output,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            match self.sink.upgrade() {
                Some(sink) => {
                    sink.publish(&self.owner, next, false);
                }
                None => tracing::debug!("({}) sink dropped, output discarded", self.owner.name()),
            }
        }
    }
}

impl PointListener for DerivedPipeline {
    fn listener_id(&self) -> ListenerId {
        self.id
    }

    fn listener_name(&self) -> &str {
        self.owner.name()
    }

    fn on_point_event(&self, event: &ValueEvent) -> Result<()> {
        if PublishingGuard::is_active(self.id) {
            if !self.cycle_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "({}) input cycle through '{}', dropping re-entrant update",
                    self.owner.name(),
                    event.point_name()
                );
            }
            return Ok(());
        }
        if self.accept(event)? {
            self.drain();
        }
        Ok(())
    }
}

impl std::fmt::Debug for DerivedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedPipeline")
            .field("owner", &self.owner.name())
            .field("id", &self.id)
            .finish()
    }
}
