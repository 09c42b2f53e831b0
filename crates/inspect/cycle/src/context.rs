//! Shared operating mode and system state.
//!
//! The mode controller writes it; the cycle tracker reads the mode to pick
//! its dispatch semantics and applies deferred profile exits. All
//! check-and-set operations happen under one write lock.

use std::sync::RwLock;

use inspect_types::{IllegalTransition, OperatingMode, SystemState};
use tracing::info;

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    mode: OperatingMode,
    state: SystemState,
}

/// Lock-guarded `(OperatingMode, SystemState)` pair.
#[derive(Debug)]
pub struct OperatingContext {
    inner: RwLock<Snapshot>,
}

impl OperatingContext {
    /// Start in `Idle` with mode `Full`.
    pub fn new() -> Self {
        Self::with(OperatingMode::default(), SystemState::default())
    }

    pub fn with(mode: OperatingMode, state: SystemState) -> Self {
        Self {
            inner: RwLock::new(Snapshot { mode, state }),
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.read().mode
    }

    pub fn state(&self) -> SystemState {
        self.read().state
    }

    /// Both values, read under one lock.
    pub fn snapshot(&self) -> (OperatingMode, SystemState) {
        let s = self.read();
        (s.mode, s.state)
    }

    /// Change the mode unless the current state locks it.
    ///
    /// Returns `false` (and changes nothing) while a trigger is in flight.
    pub fn try_set_mode(&self, mode: OperatingMode) -> bool {
        let mut s = self.write();
        if s.state.locks_mode() {
            return false;
        }
        if s.mode != mode {
            info!(from = %s.mode, to = %mode, state = %s.state, "Operating mode changed");
            s.mode = mode;
        }
        true
    }

    /// Apply a validated state transition.
    ///
    /// `Ok(false)` when `state` is already current.
    pub fn transition(&self, state: SystemState) -> Result<bool, IllegalTransition> {
        let mut s = self.write();
        if s.state == state {
            return Ok(false);
        }
        s.state.transition_to(state)?;
        info!(from = %s.state, to = %state, mode = %s.mode, "System state changed");
        s.state = state;
        Ok(true)
    }

    /// Set mode and state together, validating only the state transition.
    pub fn enter(&self, mode: OperatingMode, state: SystemState) -> Result<(), IllegalTransition> {
        let mut s = self.write();
        if s.state != state {
            s.state.transition_to(state)?;
        }
        info!(
            from_mode = %s.mode,
            to_mode = %mode,
            from_state = %s.state,
            to_state = %state,
            "Operating context changed"
        );
        s.mode = mode;
        s.state = state;
        Ok(())
    }

    /// [`enter`](Self::enter), applied only while `from` is still current.
    ///
    /// `Ok(false)` leaves everything unchanged.
    pub fn enter_from(
        &self,
        from: SystemState,
        mode: OperatingMode,
        state: SystemState,
    ) -> Result<bool, IllegalTransition> {
        let mut s = self.write();
        if s.state != from {
            return Ok(false);
        }
        if from != state {
            from.transition_to(state)?;
        }
        info!(
            from_mode = %s.mode,
            to_mode = %mode,
            from_state = %from,
            to_state = %state,
            "Operating context changed"
        );
        s.mode = mode;
        s.state = state;
        Ok(true)
    }

    /// Move from `from` to `to` only if `from` is still current.
    ///
    /// Returns whether the transition was applied.
    pub fn transition_if(&self, from: SystemState, to: SystemState) -> bool {
        let mut s = self.write();
        if s.state != from || !from.can_transition_to(to) {
            return false;
        }
        info!(from = %from, to = %to, mode = %s.mode, "System state changed");
        s.state = to;
        true
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for OperatingContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let ctx = OperatingContext::new();
        assert_eq!(ctx.snapshot(), (OperatingMode::Full, SystemState::Idle));
    }

    #[test]
    fn test_mode_locked_while_detecting() {
        let ctx = OperatingContext::with(OperatingMode::Full, SystemState::Detecting);
        assert!(!ctx.try_set_mode(OperatingMode::Only2D));
        assert_eq!(ctx.mode(), OperatingMode::Full);

        ctx.transition(SystemState::WaitingForTrigger).unwrap();
        assert!(ctx.try_set_mode(OperatingMode::Only2D));
        assert_eq!(ctx.mode(), OperatingMode::Only2D);
    }

    #[test]
    fn test_same_state_is_noop() {
        let ctx = OperatingContext::with(OperatingMode::Full, SystemState::Maintenance);
        assert_eq!(ctx.transition(SystemState::Maintenance), Ok(false));
    }

    #[test]
    fn test_illegal_transition_leaves_state() {
        let ctx = OperatingContext::new();
        assert!(ctx.transition(SystemState::Detecting).is_err());
        assert_eq!(ctx.state(), SystemState::Idle);
    }

    #[test]
    fn test_enter_from_requires_expected_state() {
        let ctx = OperatingContext::with(OperatingMode::SystemTest, SystemState::Maintenance);
        assert_eq!(
            ctx.enter_from(
                SystemState::SystemTesting,
                OperatingMode::Full,
                SystemState::WaitingForTrigger
            ),
            Ok(false)
        );
        assert_eq!(
            ctx.snapshot(),
            (OperatingMode::SystemTest, SystemState::Maintenance)
        );

        ctx.transition(SystemState::WaitingForTrigger).unwrap();
        ctx.transition(SystemState::SystemTesting).unwrap();
        assert_eq!(
            ctx.enter_from(
                SystemState::SystemTesting,
                OperatingMode::Full,
                SystemState::WaitingForTrigger
            ),
            Ok(true)
        );
        assert_eq!(
            ctx.snapshot(),
            (OperatingMode::Full, SystemState::WaitingForTrigger)
        );
    }

    #[test]
    fn test_transition_if_requires_expected_state() {
        let ctx = OperatingContext::with(OperatingMode::Full, SystemState::Detecting);
        assert!(!ctx.transition_if(
            SystemState::ConfiguringProfile,
            SystemState::WaitingForTrigger
        ));
        assert_eq!(ctx.state(), SystemState::Detecting);

        ctx.transition(SystemState::ConfiguringProfile).unwrap();
        assert!(ctx.transition_if(
            SystemState::ConfiguringProfile,
            SystemState::WaitingForTrigger
        ));
        assert_eq!(ctx.state(), SystemState::WaitingForTrigger);
    }
}
