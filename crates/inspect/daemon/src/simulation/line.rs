//! Line-side collaborators for the simulated inspection line

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use inspect_cycle::{
    CollaboratorResult, HardwareFaultResetter, JudgementInvoker, JudgementRequest,
    ShieldingInput,
};
use tracing::{info, warn};

/// Scores nothing; logs what a real scorer would see and counts verdicts.
#[derive(Default)]
pub struct LoggingJudgement {
    judged: AtomicU64,
    degraded: AtomicU64,
}

impl LoggingJudgement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Judgements performed so far
    pub fn judged(&self) -> u64 {
        self.judged.load(Ordering::Relaxed)
    }

    /// Judgements that ran on a sentinel 2D result
    pub fn degraded(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl JudgementInvoker for LoggingJudgement {
    async fn judge(&self, request: JudgementRequest) -> CollaboratorResult<()> {
        let optical = &request.channel_a;
        let height = &request.channel_b;

        self.judged.fetch_add(1, Ordering::Relaxed);
        if optical.is_sentinel() {
            self.degraded.fetch_add(1, Ordering::Relaxed);
            warn!(
                generation = request.generation,
                optical = %optical,
                height = %height,
                trigger = %request.trigger,
                "Judged on degraded 2D result"
            );
        } else {
            info!(
                generation = request.generation,
                optical = %optical,
                height = %height,
                trigger = %request.trigger,
                inline = request.inline,
                "Judgement complete"
            );
        }
        Ok(())
    }
}

/// Logs the silent fault reset a PLC would receive.
#[derive(Default)]
pub struct LoggingFaultResetter {
    resets: AtomicU64,
}

impl LoggingFaultResetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HardwareFaultResetter for LoggingFaultResetter {
    async fn reset_silently(&self) -> CollaboratorResult<()> {
        self.resets.fetch_add(1, Ordering::Relaxed);
        info!("Line fault reset issued");
        Ok(())
    }
}

/// Shielding interlock taken from configuration.
pub struct ConfiguredShielding {
    shielded: AtomicBool,
}

impl ConfiguredShielding {
    pub fn new(shielded: bool) -> Self {
        Self {
            shielded: AtomicBool::new(shielded),
        }
    }
}

impl ShieldingInput for ConfiguredShielding {
    fn is_channel_b_shielded(&self) -> bool {
        self.shielded.load(Ordering::Relaxed)
    }
}
