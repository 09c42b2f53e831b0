//! Recording collaborators for tests and simulations.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CollaboratorError, CollaboratorResult};
use crate::traits::{
    ContinuousDetectionDriver, HardwareFaultResetter, HostSurfaceQuery, JudgementInvoker,
    JudgementRequest, ShieldingInput,
};

/// Judgement invoker that records every request.
///
/// Can be configured to fail, panic, or take time.
#[derive(Default)]
pub struct RecordingJudgement {
    requests: Mutex<Vec<JudgementRequest>>,
    calls: AtomicUsize,
    fail: AtomicBool,
    panic: AtomicBool,
    latency: Option<Duration>,
}

impl RecordingJudgement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each judgement takes `latency` before it is counted.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    pub fn fail_with_error(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn panic_on_call(&self, panic: bool) {
        self.panic.store(panic, Ordering::SeqCst);
    }

    /// Number of judgements that ran to completion (including failures).
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<JudgementRequest> {
        self.lock_requests().clone()
    }

    fn lock_requests(&self) -> MutexGuard<'_, Vec<JudgementRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until at least `n` judgements ran, or `within` elapses.
    pub async fn wait_for(&self, n: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.count() >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl JudgementInvoker for RecordingJudgement {
    async fn judge(&self, request: JudgementRequest) -> CollaboratorResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let generation = request.generation;
        self.lock_requests().push(request);
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.panic.load(Ordering::SeqCst) {
            panic!("judgement exploded on cycle {}", generation);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Judgement("actuator not ready".into()));
        }
        Ok(())
    }
}

/// Fault resetter that counts calls.
#[derive(Default)]
pub struct RecordingFaultResetter {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingFaultResetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resetter whose every call fails.
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(true),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HardwareFaultResetter for RecordingFaultResetter {
    async fn reset_silently(&self) -> CollaboratorResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::FaultReset("PLC did not acknowledge".into()));
        }
        Ok(())
    }
}

/// Continuous driver with a switchable auto mode.
#[derive(Default)]
pub struct ManualContinuousDriver {
    auto: AtomicBool,
    advances: AtomicUsize,
    fail: AtomicBool,
}

impl ManualContinuousDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_auto(&self, auto: bool) {
        self.auto.store(auto, Ordering::SeqCst);
    }

    pub fn fail_with_error(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContinuousDetectionDriver for ManualContinuousDriver {
    fn is_auto_mode_active(&self) -> bool {
        self.auto.load(Ordering::SeqCst)
    }

    async fn advance_to_next_cycle(&self) -> CollaboratorResult<()> {
        self.advances.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Advance("conveyor jammed".into()));
        }
        Ok(())
    }
}

/// Host whose configuration surface can be toggled.
#[derive(Default)]
pub struct StaticHostSurface {
    active: AtomicBool,
}

impl StaticHostSurface {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl HostSurfaceQuery for StaticHostSurface {
    fn is_configuration_surface_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Shielding interlock that can be flipped at runtime.
#[derive(Default)]
pub struct ToggleShielding {
    shielded: AtomicBool,
}

impl ToggleShielding {
    pub fn new(shielded: bool) -> Self {
        Self {
            shielded: AtomicBool::new(shielded),
        }
    }

    pub fn set(&self, shielded: bool) {
        self.shielded.store(shielded, Ordering::SeqCst);
    }
}

impl ShieldingInput for ToggleShielding {
    fn is_channel_b_shielded(&self) -> bool {
        self.shielded.load(Ordering::SeqCst)
    }
}
