//! Detection cycle tracker.
//!
//! Folds the 2D and 3D completions of one trigger into exactly one
//! judgement. The decision "this call dispatches" is taken under the cycle
//! lock on the edge where the completion predicate becomes satisfied, and a
//! `dispatched` latch set in the same critical section keeps every later
//! completion, timeout, or retry for that cycle from dispatching again.
//!
//! ```text
//!   start_cycle ──► [A pending, B pending] ──mark B──► arm 2D timeout
//!                        │                               │
//!                      mark A                         fire (A still pending)
//!                        ▼                               ▼
//!                  predicate satisfied ◄── sentinel for A, force A
//!                        │
//!                        ▼
//!        dispatch judgement (inline in SystemTest, spawned otherwise)
//!                        │
//!        advance hook ─► clear flags ─► deferred profile exit
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use inspect_types::{
    ChannelId, ChannelResult, CycleStatus, OperatingMode, SentinelReason, SystemState,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::InMemoryResultCache;
use crate::config::CycleConfig;
use crate::context::OperatingContext;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::events::{CycleEvent, EventSink, StatsCounters, TrackerStats};
use crate::timeout::TimeoutGuard;
use crate::traits::{
    ChannelResultCache, ContinuousDetectionDriver, DispatchTrigger, HardwareFaultResetter,
    HeadlessHost, HostSurfaceQuery, JudgementInvoker, JudgementRequest, ManualOnlyDriver,
    NoOpFaultResetter, NoShielding, ShieldingInput,
};

/// External collaborators driven by the tracker.
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn ChannelResultCache>,
    pub judgement: Arc<dyn JudgementInvoker>,
    pub fault_resetter: Arc<dyn HardwareFaultResetter>,
    pub continuous: Arc<dyn ContinuousDetectionDriver>,
    pub host: Arc<dyn HostSurfaceQuery>,
    pub shielding: Arc<dyn ShieldingInput>,
}

impl Collaborators {
    /// Collaborators with an in-memory cache and inert defaults for
    /// everything except judgement.
    pub fn new(judgement: Arc<dyn JudgementInvoker>) -> Self {
        Self {
            cache: Arc::new(InMemoryResultCache::new()),
            judgement,
            fault_resetter: Arc::new(NoOpFaultResetter),
            continuous: Arc::new(ManualOnlyDriver),
            host: Arc::new(HeadlessHost),
            shielding: Arc::new(NoShielding),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ChannelResultCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_fault_resetter(mut self, fault_resetter: Arc<dyn HardwareFaultResetter>) -> Self {
        self.fault_resetter = fault_resetter;
        self
    }

    pub fn with_continuous(mut self, continuous: Arc<dyn ContinuousDetectionDriver>) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn HostSurfaceQuery>) -> Self {
        self.host = host;
        self
    }

    pub fn with_shielding(mut self, shielding: Arc<dyn ShieldingInput>) -> Self {
        self.shielding = shielding;
        self
    }
}

/// What a completion call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Flag set; the cycle still waits on the other channel.
    Pending,

    /// The channel already reported, or the cycle was already judged.
    Duplicate,

    /// This call dispatched the judgement. `inline` tells whether it was
    /// awaited before returning.
    Dispatched { inline: bool },
}

#[derive(Debug, Default)]
struct CycleState {
    generation: u64,
    channel_a_completed: bool,
    channel_b_completed: bool,
    channel_b_enabled: bool,
    dispatched: bool,
}

impl CycleState {
    fn completed(&self, channel: ChannelId) -> bool {
        match channel {
            ChannelId::A => self.channel_a_completed,
            ChannelId::B => self.channel_b_completed,
        }
    }

    fn mark(&mut self, channel: ChannelId) {
        match channel {
            ChannelId::A => self.channel_a_completed = true,
            ChannelId::B => self.channel_b_completed = true,
        }
    }

    fn clear_flags(&mut self) {
        self.channel_a_completed = false;
        self.channel_b_completed = false;
    }

    /// Begin a new cycle identity. Stale timers compare against this.
    fn renew(&mut self) -> u64 {
        self.generation += 1;
        self.clear_flags();
        self.dispatched = false;
        self.generation
    }

    fn status(&self, timeout_armed: bool) -> CycleStatus {
        CycleStatus {
            generation: self.generation,
            channel_a_completed: self.channel_a_completed,
            channel_b_completed: self.channel_b_completed,
            channel_b_enabled: self.channel_b_enabled,
            timeout_armed,
            dispatched: self.dispatched,
        }
    }

    fn is_satisfied(&self, state: SystemState) -> bool {
        match state {
            // Profile editing judges exactly like production.
            SystemState::ConfiguringProfile => {
                if self.channel_b_enabled {
                    self.channel_a_completed && self.channel_b_completed
                } else {
                    self.channel_a_completed
                }
            }
            _ => self.status(false).is_satisfied(),
        }
    }
}

/// Channel results captured at dispatch time.
struct ChannelSnapshot {
    channel_a: ChannelResult,
    channel_b: ChannelResult,
}

struct TrackerInner {
    config: CycleConfig,
    cycle: Mutex<CycleState>,
    guard: TimeoutGuard,
    deferred_exit: AtomicBool,
    context: Arc<OperatingContext>,
    collaborators: Collaborators,
    events: EventSink,
    stats: StatsCounters,
}

impl TrackerInner {
    fn lock_cycle(&self) -> MutexGuard<'_, CycleState> {
        self.cycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached results for the cycle being judged. Called with the cycle
    /// lock held, before anything can start the next cycle.
    fn snapshot_results(&self, channel_b_enabled: bool) -> ChannelSnapshot {
        let cache = &self.collaborators.cache;
        ChannelSnapshot {
            channel_a: cache.get(ChannelId::A),
            channel_b: if channel_b_enabled {
                cache.get(ChannelId::B)
            } else {
                ChannelResult::Empty
            },
        }
    }

    fn record_judgement(&self, generation: u64, result: CollaboratorResult<()>) {
        if let Err(e) = result {
            StatsCounters::bump(&self.stats.judgement_failures);
            error!(generation = generation, error = %e, "Judgement failed");
            self.events.emit(CycleEvent::JudgementFailed {
                generation,
                error: e.to_string(),
            });
        }
    }
}

/// Owns the active detection cycle and its 2D timeout.
///
/// Cheap to clone; clones share the same cycle.
#[derive(Clone)]
pub struct DetectionCycleTracker {
    inner: Arc<TrackerInner>,
}

impl DetectionCycleTracker {
    pub fn new(
        config: CycleConfig,
        context: Arc<OperatingContext>,
        collaborators: Collaborators,
    ) -> Self {
        let events = EventSink::new(config.event_channel_capacity.max(1));
        Self {
            inner: Arc::new(TrackerInner {
                config,
                cycle: Mutex::new(CycleState::default()),
                guard: TimeoutGuard::new(ChannelId::A),
                deferred_exit: AtomicBool::new(false),
                context,
                collaborators,
                events,
                stats: StatsCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &Arc<OperatingContext> {
        &self.inner.context
    }

    pub fn cache(&self) -> &Arc<dyn ChannelResultCache> {
        &self.inner.collaborators.cache
    }

    /// Subscribe to cycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> TrackerStats {
        self.inner.stats.snapshot()
    }

    /// Begin a new cycle.
    ///
    /// Any armed timeout is cancelled before this returns, so a deadline
    /// from the previous cycle can never act on this one.
    pub fn start_cycle(&self, channel_b_requested: bool) {
        let inner = &self.inner;
        let shielded = inner.collaborators.shielding.is_channel_b_shielded();
        let channel_b_enabled = channel_b_requested && !shielded;

        let generation = {
            let mut cycle = inner.lock_cycle();
            inner.guard.disarm();
            let generation = cycle.renew();
            cycle.channel_b_enabled = channel_b_enabled;
            inner.collaborators.cache.reset_all();
            generation
        };

        StatsCounters::bump(&inner.stats.cycles_started);
        if channel_b_requested && shielded {
            warn!(generation = generation, "3D pass requested but shielded; running 2D only");
        }
        info!(
            generation = generation,
            channel_b_enabled = channel_b_enabled,
            "Detection cycle started"
        );
        inner.events.emit(CycleEvent::CycleStarted {
            generation,
            channel_b_enabled,
            shielded,
        });
    }

    /// Drop the active cycle's progress without touching cached results.
    pub fn reset(&self) {
        let inner = &self.inner;
        let generation = {
            let mut cycle = inner.lock_cycle();
            inner.guard.disarm();
            cycle.renew()
        };
        debug!(generation = generation, "Detection cycle reset");
        inner.events.emit(CycleEvent::Reset { generation });
    }

    /// The 2D optical pass reported.
    #[instrument(skip(self))]
    pub async fn mark_channel_a_completed(&self) -> CompletionOutcome {
        self.complete(ChannelId::A).await
    }

    /// The 3D height pass reported.
    #[instrument(skip(self))]
    pub async fn mark_channel_b_completed(&self) -> CompletionOutcome {
        self.complete(ChannelId::B).await
    }

    /// Exit profile configuration after the next judgement, once the host
    /// no longer shows the configuration surface.
    pub fn request_deferred_exit(&self) {
        self.inner.deferred_exit.store(true, Ordering::SeqCst);
        info!("Deferred profile exit requested");
    }

    pub fn has_pending_deferred_exit(&self) -> bool {
        self.inner.deferred_exit.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> CycleStatus {
        let cycle = self.inner.lock_cycle();
        cycle.status(self.inner.guard.is_armed())
    }

    pub fn is_2d_completed(&self) -> bool {
        self.inner.lock_cycle().channel_a_completed
    }

    pub fn is_3d_completed(&self) -> bool {
        self.inner.lock_cycle().channel_b_completed
    }

    pub fn is_3d_enabled(&self) -> bool {
        self.inner.lock_cycle().channel_b_enabled
    }

    pub fn status_description(&self) -> String {
        self.status().describe()
    }

    async fn complete(&self, channel: ChannelId) -> CompletionOutcome {
        let inner = &self.inner;
        let state = inner.context.state();

        let decision = {
            let mut cycle = inner.lock_cycle();
            let generation = cycle.generation;

            if cycle.dispatched || cycle.completed(channel) {
                StatsCounters::bump(&inner.stats.duplicates);
                warn!(
                    generation = generation,
                    channel = %channel,
                    judged = cycle.dispatched,
                    "Duplicate channel completion ignored"
                );
                inner
                    .events
                    .emit(CycleEvent::DuplicateCompletion { generation, channel });
                return CompletionOutcome::Duplicate;
            }

            cycle.mark(channel);
            match channel {
                // 2D is no longer the laggard.
                ChannelId::A => {
                    inner.guard.disarm();
                }
                ChannelId::B => {
                    if !cycle.is_satisfied(state) {
                        self.arm_timeout(generation);
                    }
                }
            }

            let snapshot = if cycle.is_satisfied(state) {
                cycle.dispatched = true;
                Some(inner.snapshot_results(cycle.channel_b_enabled))
            } else {
                None
            };
            (generation, cycle.channel_b_enabled, snapshot)
        };

        let (generation, channel_b_enabled, snapshot) = decision;
        debug!(generation = generation, channel = %channel, "Channel completed");
        inner
            .events
            .emit(CycleEvent::ChannelCompleted { generation, channel });

        let Some(snapshot) = snapshot else {
            return CompletionOutcome::Pending;
        };

        let inline = self
            .dispatch(
                generation,
                DispatchTrigger::Completion,
                channel_b_enabled,
                snapshot,
            )
            .await;
        CompletionOutcome::Dispatched { inline }
    }

    /// Arm the 2D deadline. Called with the cycle lock held.
    fn arm_timeout(&self, generation: u64) {
        let grace = self.inner.config.timeout_grace();
        let weak = Arc::downgrade(&self.inner);

        self.inner.guard.arm(grace, move |token| async move {
            if let Some(inner) = weak.upgrade() {
                DetectionCycleTracker { inner }
                    .on_timeout(token, generation)
                    .await;
            }
        });

        self.inner.events.emit(CycleEvent::TimeoutArmed {
            generation,
            grace_ms: self.inner.config.timeout_grace_ms,
        });
    }

    async fn on_timeout(&self, token: u64, generation: u64) {
        let inner = &self.inner;
        let state = inner.context.state();

        let decision = {
            let mut cycle = inner.lock_cycle();

            // The 2D pass may have landed between the deadline and now.
            let stale = !inner.guard.take_if_current(token)
                || cycle.generation != generation
                || cycle.channel_a_completed
                || cycle.dispatched;
            if stale {
                debug!(generation = generation, token = token, "Stale timeout ignored");
                None
            } else {
                inner
                    .collaborators
                    .cache
                    .set_sentinel(ChannelId::A, SentinelReason::ChannelTimeout);
                cycle.channel_a_completed = true;
                let snapshot = if cycle.is_satisfied(state) {
                    cycle.dispatched = true;
                    Some(inner.snapshot_results(cycle.channel_b_enabled))
                } else {
                    None
                };
                Some((snapshot, cycle.channel_b_enabled))
            }
        };

        let Some((snapshot, channel_b_enabled)) = decision else {
            return;
        };

        StatsCounters::bump(&inner.stats.timeouts);
        warn!(
            generation = generation,
            grace_ms = inner.config.timeout_grace_ms,
            "2D pass timed out, judging with sentinel"
        );
        inner.events.emit(CycleEvent::TimeoutFired { generation });

        if let Some(snapshot) = snapshot {
            self.dispatch(generation, DispatchTrigger::Timeout, channel_b_enabled, snapshot)
                .await;
        }

        match contain(inner.collaborators.fault_resetter.reset_silently()).await {
            Ok(()) => info!(generation = generation, "Line reset after 2D timeout"),
            Err(e) => {
                error!(generation = generation, error = %e, "Silent fault reset failed");
                inner.events.emit(CycleEvent::FaultResetFailed {
                    generation,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Run the judgement and the post-dispatch steps. Returns whether the
    /// judgement was awaited inline.
    async fn dispatch(
        &self,
        generation: u64,
        trigger: DispatchTrigger,
        channel_b_enabled: bool,
        snapshot: ChannelSnapshot,
    ) -> bool {
        let inner = &self.inner;
        let inline = inner.context.mode() == OperatingMode::SystemTest;
        let request = JudgementRequest {
            generation,
            channel_b_enabled,
            trigger,
            inline,
            channel_a: snapshot.channel_a,
            channel_b: snapshot.channel_b,
        };

        StatsCounters::bump(&inner.stats.dispatches);
        info!(
            generation = generation,
            trigger = %trigger,
            inline = inline,
            "Dispatching judgement"
        );
        inner.events.emit(CycleEvent::JudgementDispatched {
            generation,
            trigger,
            inline,
        });

        if inline {
            let result = contain(inner.collaborators.judgement.judge(request)).await;
            inner.record_judgement(generation, result);
        } else {
            let detached = Arc::clone(inner);
            tokio::spawn(async move {
                let result = contain(detached.collaborators.judgement.judge(request)).await;
                detached.record_judgement(generation, result);
            });
        }

        self.after_dispatch(generation).await;
        inline
    }

    async fn after_dispatch(&self, generation: u64) {
        let inner = &self.inner;

        if inner.collaborators.continuous.is_auto_mode_active() {
            if let Err(e) = contain(inner.collaborators.continuous.advance_to_next_cycle()).await {
                warn!(generation = generation, error = %e, "Continuous advance failed");
                inner.events.emit(CycleEvent::AdvanceFailed {
                    generation,
                    error: e.to_string(),
                });
            }
        }

        {
            // The advance hook may already have started the next cycle.
            let mut cycle = inner.lock_cycle();
            if cycle.generation == generation {
                cycle.clear_flags();
            }
        }

        self.apply_deferred_exit(generation);
    }

    fn apply_deferred_exit(&self, generation: u64) {
        let inner = &self.inner;
        if !inner.deferred_exit.load(Ordering::SeqCst) {
            return;
        }

        if inner.context.state() != SystemState::ConfiguringProfile {
            inner.deferred_exit.store(false, Ordering::SeqCst);
            debug!(generation = generation, "Deferred profile exit dropped, not configuring");
            return;
        }

        if inner.collaborators.host.is_configuration_surface_active() {
            debug!(generation = generation, "Deferred profile exit kept, surface still shown");
            return;
        }

        if inner.deferred_exit.swap(false, Ordering::SeqCst)
            && inner.context.transition_if(
                SystemState::ConfiguringProfile,
                SystemState::WaitingForTrigger,
            )
        {
            info!(generation = generation, "Left profile configuration after judgement");
            inner.events.emit(CycleEvent::DeferredExitApplied {
                generation,
                to: SystemState::WaitingForTrigger,
            });
        }
    }
}

/// Await a collaborator call, turning a panic into an error.
async fn contain<F>(call: F) -> CollaboratorResult<()>
where
    F: Future<Output = CollaboratorResult<()>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(CollaboratorError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
