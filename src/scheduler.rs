//! Shared periodic scheduler.
//!
//! One scheduler drives every pipeline instance. Each registration is a
//! lightweight async task on a tokio runtime that waits for its next tick and
//! then runs the callback on the runtime's bounded blocking pool, so a slow
//! callback never holds up the timers of unrelated registrations.
//!
//! # Guarantees
//!
//! - A registration never runs concurrently with itself: the next tick is
//!   only awaited after the previous callback returned.
//! - Overrun ticks are coalesced. If a callback takes longer than its period,
//!   at most one catch-up invocation follows; the rest are skipped.
//! - A panicking callback is logged and stays registered.
//! - A callback returning `ControlFlow::Break(())` deregisters itself.

use crate::config::SchedulerConfig;
use crate::error::{EngineError, Result};
use dashmap::DashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

/// Return value of a scheduled callback.
pub type TaskFlow = ControlFlow<()>;

/// Identifies one registration for cancellation.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    id: u64,
    name: Arc<str>,
}

impl ScheduleHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct Scheduler {
    runtime: Option<Runtime>,
    handle: Handle,
    tasks: Arc<DashMap<u64, AbortHandle>>,
    next_id: AtomicU64,
}

impl Scheduler {
    /// Create a scheduler with its own multi-threaded runtime.
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_name("pointflow-sched")
            .enable_time()
            .build()
            .map_err(|e| EngineError::Scheduler(format!("failed to start runtime: {}", e)))?;
        let handle = runtime.handle().clone();
        tracing::info!(
            "Scheduler started: {} workers, {} blocking threads",
            config.worker_threads,
            config.max_blocking_threads
        );
        Ok(Self {
            runtime: Some(runtime),
            handle,
            tasks: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Create a scheduler on an existing runtime. The runtime must have the
    /// time driver enabled.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            runtime: None,
            handle,
            tasks: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register `callback` to run every `period`, first after `initial_delay`.
    pub fn schedule<F>(
        &self,
        name: &str,
        initial_delay: Duration,
        period: Duration,
        callback: F,
    ) -> Result<ScheduleHandle>
    where
        F: FnMut() -> TaskFlow + Send + 'static,
    {
        if period.is_zero() {
            return Err(EngineError::Scheduler(format!(
                "task '{}' needs a non-zero period",
                name
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name: Arc<str> = Arc::from(name);
        let callback = Arc::new(Mutex::new(callback));
        let tasks = self.tasks.clone();
        let task_name = name.clone();

        let join = self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let cb = callback.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    // A previous panic poisons the lock; the callback itself is still usable.
                    let mut f = cb.lock().unwrap_or_else(|e| e.into_inner());
                    (*f)()
                })
                .await;

                match outcome {
                    Ok(ControlFlow::Continue(())) => {}
                    Ok(ControlFlow::Break(())) => {
                        tracing::debug!("Task '{}' finished", task_name);
                        break;
                    }
                    Err(e) if e.is_panic() => {
                        tracing::warn!("Task '{}' panicked; keeping it scheduled", task_name);
                    }
                    Err(_) => break,
                }
            }
            tasks.remove(&id);
        });

        self.tasks.insert(id, join.abort_handle());
        if join.is_finished() {
            self.tasks.remove(&id);
        }

        tracing::trace!("Scheduled '{}' every {:?}", name, period);
        Ok(ScheduleHandle { id, name })
    }

    /// Cancel a registration. In-flight invocations run to completion.
    /// Returns false if it had already finished or been cancelled.
    pub fn cancel(&self, handle: &ScheduleHandle) -> bool {
        match self.tasks.remove(&handle.id) {
            Some((_, abort)) => {
                abort.abort();
                tracing::debug!("Cancelled task '{}'", handle.name);
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, handle: &ScheduleHandle) -> bool {
        self.tasks.contains_key(&handle.id)
    }

    /// Number of live registrations.
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn runtime_handle(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("active", &self.tasks.len())
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}
