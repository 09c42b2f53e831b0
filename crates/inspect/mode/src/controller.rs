//! Mode controller.
//!
//! Owns initialization, operating mode and system state changes, the
//! detection gate, and the system-test entry/exit pair. Mode and state live
//! in the [`OperatingContext`] shared with the cycle tracker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use inspect_cycle::{DetectionCycleTracker, OperatingContext};
use inspect_types::{detection_allowed, OperatingMode, SystemState};
use tracing::{debug, info, instrument, warn};

use crate::error::{ModeError, ModeResult};

/// Operating mode state machine and detection gate.
pub struct ModeController {
    context: Arc<OperatingContext>,
    tracker: DetectionCycleTracker,
    initialized: AtomicBool,
    /// Configured 3D participation for new cycles.
    height_enabled: AtomicBool,
}

impl ModeController {
    /// Controller over the tracker's operating context.
    pub fn new(tracker: DetectionCycleTracker) -> Self {
        Self {
            context: Arc::clone(tracker.context()),
            tracker,
            initialized: AtomicBool::new(false),
            height_enabled: AtomicBool::new(true),
        }
    }

    pub fn with_height_enabled(self, enabled: bool) -> Self {
        self.height_enabled.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn tracker(&self) -> &DetectionCycleTracker {
        &self.tracker
    }

    pub fn mode(&self) -> OperatingMode {
        self.context.mode()
    }

    pub fn state(&self) -> SystemState {
        self.context.state()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn height_inspection_enabled(&self) -> bool {
        self.height_enabled.load(Ordering::SeqCst)
    }

    /// Change the 3D setting used by cycles started from here on.
    pub fn set_height_inspection_enabled(&self, enabled: bool) {
        let previous = self.height_enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(enabled = enabled, "Height inspection setting changed");
        }
    }

    /// One-time bring-up: enter profile configuration in `Full` mode and
    /// open the first cycle.
    ///
    /// Returns `Ok(false)` if the system was already initialized.
    #[instrument(skip(self))]
    pub fn initialize_system(&self) -> ModeResult<bool> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("System already initialized");
            return Ok(false);
        }

        if let Err(e) = self
            .context
            .enter(OperatingMode::Full, SystemState::ConfiguringProfile)
        {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        self.tracker.start_cycle(self.height_inspection_enabled());
        info!("Inspection system initialized");
        Ok(true)
    }

    /// Change the operating mode.
    ///
    /// Rejected with `false` while a trigger is being detected or processed.
    pub fn set_mode(&self, mode: OperatingMode) -> bool {
        let accepted = self.context.try_set_mode(mode);
        if !accepted {
            warn!(
                requested = %mode,
                current = %self.context.mode(),
                state = %self.context.state(),
                "Mode change rejected while a trigger is in flight"
            );
        }
        accepted
    }

    /// Move to `state`.
    ///
    /// `Ok(false)` when already there; illegal transitions are rejected and
    /// leave the state unchanged.
    pub fn set_state(&self, state: SystemState) -> ModeResult<bool> {
        match self.context.transition(state) {
            Ok(changed) => Ok(changed),
            Err(e) => {
                warn!(error = %e, "State change rejected");
                Err(e.into())
            }
        }
    }

    /// The gate every inbound detection event must pass.
    pub fn should_process_detection(&self) -> bool {
        let (mode, state) = self.context.snapshot();
        let allowed = detection_allowed(self.is_initialized(), mode, state);
        if !allowed {
            debug!(
                initialized = self.is_initialized(),
                mode = %mode,
                state = %state,
                "Detection rejected at gate"
            );
        }
        allowed
    }

    /// Exit profile configuration after the next judgement.
    pub fn request_deferred_exit(&self) {
        self.tracker.request_deferred_exit();
    }

    /// Enter `(SystemTest, SystemTesting)` with a fresh cycle.
    #[instrument(skip(self))]
    pub fn start_system_test_mode(&self, enable_3d: bool) -> ModeResult<()> {
        self.context
            .enter(OperatingMode::SystemTest, SystemState::SystemTesting)?;
        self.tracker.reset();
        self.tracker.start_cycle(enable_3d);
        info!(enable_3d = enable_3d, "System test started");
        Ok(())
    }

    /// Leave system test, restoring `(Full, WaitingForTrigger)` with a fresh
    /// cycle.
    #[instrument(skip(self))]
    pub fn stop_system_test_mode(&self) -> ModeResult<()> {
        let left = self.context.enter_from(
            SystemState::SystemTesting,
            OperatingMode::Full,
            SystemState::WaitingForTrigger,
        )?;
        if !left {
            return Err(ModeError::NotInSystemTest(self.context.state()));
        }

        self.tracker.reset();
        self.tracker.start_cycle(self.height_inspection_enabled());
        info!("System test stopped");
        Ok(())
    }
}
