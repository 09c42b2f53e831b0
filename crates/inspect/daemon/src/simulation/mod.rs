//! Simulated inspection line
//!
//! Fires triggers at a fixed interval. Each accepted trigger opens a cycle
//! and spawns the 2D and 3D passes with random latency; the 2D result is
//! sometimes lost so the grace window gets exercised.

mod line;

pub use line::{ConfiguredShielding, LoggingFaultResetter, LoggingJudgement};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use inspect_cycle::{
    ChannelResultCache, Collaborators, CycleConfig, CycleEvent, DetectionCycleTracker,
    InMemoryResultCache, OperatingContext, TrackerStats,
};
use inspect_mode::ModeController;
use inspect_types::{ChannelId, ChannelResult, SystemState};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use crate::config::{LatencyRange, SimulationConfig};
use crate::error::{DaemonError, DaemonResult};

/// Slack on top of the worst-case latency when waiting for a judgement
const DISPATCH_SLACK_MS: u64 = 1000;

/// Summary of a simulation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub triggers: u64,
    pub rejected: u64,
    pub judgements: u64,
    pub degraded: u64,
    pub fault_resets: u64,
    /// Triggers whose judgement never showed up in time
    pub missed: u64,
    pub tracker: TrackerStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives a [`ModeController`] with simulated channel completions
pub struct LineSimulation {
    controller: Arc<ModeController>,
    cache: Arc<InMemoryResultCache>,
    judgement: Arc<LoggingJudgement>,
    resetter: Arc<LoggingFaultResetter>,
    config: SimulationConfig,
    rng: StdRng,
    report: SimulationReport,
}

impl LineSimulation {
    pub fn new(cycle: CycleConfig, config: SimulationConfig) -> DaemonResult<Self> {
        cycle.validate()?;
        config.validate().map_err(DaemonError::Config)?;

        let cache = Arc::new(InMemoryResultCache::new());
        let judgement = Arc::new(LoggingJudgement::new());
        let resetter = Arc::new(LoggingFaultResetter::new());

        let collaborators = Collaborators::new(judgement.clone())
            .with_cache(cache.clone())
            .with_fault_resetter(resetter.clone())
            .with_shielding(Arc::new(ConfiguredShielding::new(config.shielded)));

        let tracker =
            DetectionCycleTracker::new(cycle, Arc::new(OperatingContext::new()), collaborators);
        let controller =
            Arc::new(ModeController::new(tracker).with_height_enabled(config.height_enabled));

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            controller,
            cache,
            judgement,
            resetter,
            config,
            rng,
            report: SimulationReport::default(),
        })
    }

    pub fn controller(&self) -> &Arc<ModeController> {
        &self.controller
    }

    /// Run until the configured trigger count is reached or `shutdown`
    /// flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DaemonResult<SimulationReport> {
        self.report.started_at = Utc::now();
        self.controller.initialize_system()?;

        if self.config.system_test {
            self.controller.set_state(SystemState::WaitingForTrigger)?;
            self.controller
                .start_system_test_mode(self.config.height_enabled)?;
        } else {
            // Leave profile configuration once the first part is judged
            self.controller.request_deferred_exit();
        }

        tracing::info!(
            cycles = self.config.cycles,
            interval_ms = self.config.interval_ms,
            system_test = self.config.system_test,
            "Line simulation started"
        );

        let mut index = 0u64;
        while self.config.cycles == 0 || index < self.config.cycles {
            if *shutdown.borrow() {
                break;
            }
            index += 1;

            self.trigger().await?;

            tokio::select! {
                _ = sleep(Duration::from_millis(self.config.interval_ms)) => {}
                _ = shutdown.changed() => {}
            }
        }

        if self.config.system_test {
            self.controller.stop_system_test_mode()?;
        }

        Ok(self.finish())
    }

    async fn trigger(&mut self) -> DaemonResult<()> {
        if !self.controller.should_process_detection() {
            self.report.rejected += 1;
            return Ok(());
        }
        self.report.triggers += 1;

        let tracker = self.controller.tracker().clone();
        let mut events = tracker.subscribe();
        tracker.start_cycle(self.controller.height_inspection_enabled());
        let status = tracker.status();
        let generation = status.generation;

        let steady = self.controller.state() == SystemState::WaitingForTrigger;
        if steady {
            self.controller.set_state(SystemState::Detecting)?;
        }

        let mut passes = Vec::with_capacity(2);
        let latency_a = sample(&mut self.rng, self.config.channel_a_latency);
        if self.rng.gen_bool(self.config.channel_a_drop_probability) {
            tracing::debug!(generation = generation, "Simulating a lost 2D result");
        } else {
            passes.push(self.spawn_pass(&tracker, ChannelId::A, generation, latency_a));
        }
        if status.channel_b_enabled {
            let latency_b = sample(&mut self.rng, self.config.channel_b_latency);
            passes.push(self.spawn_pass(&tracker, ChannelId::B, generation, latency_b));
        }

        let wait = tracker.config().timeout_grace_ms
            + self.config.channel_a_latency.max_ms.max(self.config.channel_b_latency.max_ms)
            + DISPATCH_SLACK_MS;
        if !wait_for_dispatch(&mut events, generation, Duration::from_millis(wait)).await {
            self.report.missed += 1;
            tracing::warn!(
                generation = generation,
                status = %tracker.status_description(),
                "No judgement for trigger"
            );
        }

        // Late passes must not leak into the next cycle
        for pass in passes {
            let _ = pass.await;
        }

        if steady {
            self.controller.set_state(SystemState::Processing)?;
            self.controller.set_state(SystemState::WaitingForTrigger)?;
        }
        Ok(())
    }

    fn spawn_pass(
        &self,
        tracker: &DetectionCycleTracker,
        channel: ChannelId,
        generation: u64,
        latency_ms: u64,
    ) -> JoinHandle<()> {
        let tracker = tracker.clone();
        let cache = self.cache.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(latency_ms)).await;
            cache.set_result(
                channel,
                ChannelResult::measured(format!("{}#{}", channel.label(), generation)),
            );
            let outcome = match channel {
                ChannelId::A => tracker.mark_channel_a_completed().await,
                ChannelId::B => tracker.mark_channel_b_completed().await,
            };
            tracing::debug!(
                generation = generation,
                channel = %channel,
                latency_ms = latency_ms,
                outcome = ?outcome,
                "Pass finished"
            );
        })
    }

    fn finish(mut self) -> SimulationReport {
        self.report.judgements = self.judgement.judged();
        self.report.degraded = self.judgement.degraded();
        self.report.fault_resets = self.resetter.resets();
        self.report.tracker = self.controller.tracker().stats();
        self.report.finished_at = Utc::now();
        self.report
    }
}

fn sample(rng: &mut StdRng, range: LatencyRange) -> u64 {
    rng.gen_range(range.min_ms..=range.max_ms)
}

async fn wait_for_dispatch(
    events: &mut broadcast::Receiver<CycleEvent>,
    generation: u64,
    within: Duration,
) -> bool {
    let seen = async {
        loop {
            match events.recv().await {
                Ok(CycleEvent::JudgementDispatched { generation: g, .. }) if g == generation => {
                    return true;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    };
    timeout(within, seen).await.unwrap_or(false)
}
