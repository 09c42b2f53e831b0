//! Operating modes and system states
//!
//! `SystemState` transitions are validated against a fixed table; see
//! [`SystemState::allowed_targets`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of inspection the line performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Detections are rejected at the gate.
    Disabled,
    /// Optical pass only.
    Only2D,
    /// Height pass only.
    Only3D,
    /// Optical and height passes.
    Full,
    /// Line paused by the operator.
    Paused,
    /// Benchmark run; judgement executes inline on the completing path.
    SystemTest,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 6] = [
        OperatingMode::Disabled,
        OperatingMode::Only2D,
        OperatingMode::Only3D,
        OperatingMode::Full,
        OperatingMode::Paused,
        OperatingMode::SystemTest,
    ];
}

impl Default for OperatingMode {
    fn default() -> Self {
        OperatingMode::Full
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingMode::Disabled => write!(f, "disabled"),
            OperatingMode::Only2D => write!(f, "2d-only"),
            OperatingMode::Only3D => write!(f, "3d-only"),
            OperatingMode::Full => write!(f, "full"),
            OperatingMode::Paused => write!(f, "paused"),
            OperatingMode::SystemTest => write!(f, "system-test"),
        }
    }
}

/// Where the line is in its operating lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemState {
    Idle,
    WaitingForTrigger,
    Detecting,
    Processing,
    /// Operator is adjusting a channel; detections are rejected.
    ChannelAdjusting,
    /// Line under maintenance; detections are rejected.
    Maintenance,
    /// Inspection profile is being edited on the host.
    ConfiguringProfile,
    SystemTesting,
}

impl SystemState {
    pub const ALL: [SystemState; 8] = [
        SystemState::Idle,
        SystemState::WaitingForTrigger,
        SystemState::Detecting,
        SystemState::Processing,
        SystemState::ChannelAdjusting,
        SystemState::Maintenance,
        SystemState::ConfiguringProfile,
        SystemState::SystemTesting,
    ];

    /// States reachable from `self` in one step.
    pub fn allowed_targets(self) -> &'static [SystemState] {
        use SystemState::*;
        match self {
            Idle => &[ConfiguringProfile, WaitingForTrigger, ChannelAdjusting, Maintenance],
            ConfiguringProfile => &[
                WaitingForTrigger,
                Detecting,
                Processing,
                SystemTesting,
                ChannelAdjusting,
                Maintenance,
            ],
            WaitingForTrigger => &[
                Detecting,
                Processing,
                ConfiguringProfile,
                SystemTesting,
                ChannelAdjusting,
                Maintenance,
            ],
            Detecting => &[
                Processing,
                WaitingForTrigger,
                ConfiguringProfile,
                ChannelAdjusting,
                Maintenance,
            ],
            Processing => &[
                WaitingForTrigger,
                Detecting,
                ConfiguringProfile,
                ChannelAdjusting,
                Maintenance,
            ],
            ChannelAdjusting => &[WaitingForTrigger, Maintenance, ConfiguringProfile],
            Maintenance => &[WaitingForTrigger, ChannelAdjusting, ConfiguringProfile],
            SystemTesting => &[WaitingForTrigger, ChannelAdjusting, Maintenance],
        }
    }

    /// Check whether `self -> target` is a legal transition.
    pub fn can_transition_to(self, target: SystemState) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Validate `self -> target`.
    pub fn transition_to(self, target: SystemState) -> Result<SystemState, IllegalTransition> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(IllegalTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Mode changes are locked while a trigger is in flight.
    pub fn locks_mode(self) -> bool {
        matches!(self, SystemState::Detecting | SystemState::Processing)
    }

    /// Operator-held states in which the line must not inspect.
    pub fn blocks_detection(self) -> bool {
        matches!(self, SystemState::ChannelAdjusting | SystemState::Maintenance)
    }
}

impl Default for SystemState {
    fn default() -> Self {
        SystemState::Idle
    }
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemState::Idle => write!(f, "idle"),
            SystemState::WaitingForTrigger => write!(f, "waiting-for-trigger"),
            SystemState::Detecting => write!(f, "detecting"),
            SystemState::Processing => write!(f, "processing"),
            SystemState::ChannelAdjusting => write!(f, "channel-adjusting"),
            SystemState::Maintenance => write!(f, "maintenance"),
            SystemState::ConfiguringProfile => write!(f, "configuring-profile"),
            SystemState::SystemTesting => write!(f, "system-testing"),
        }
    }
}

/// A transition that is not in the state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal state transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: SystemState,
    pub to: SystemState,
}

/// The detection gate.
///
/// Every inbound detection event must pass this before it reaches the
/// cycle tracker.
pub fn detection_allowed(initialized: bool, mode: OperatingMode, state: SystemState) -> bool {
    initialized && mode != OperatingMode::Disabled && !state.blocks_detection()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_truth_table() {
        for mode in OperatingMode::ALL {
            for state in SystemState::ALL {
                let expected = mode != OperatingMode::Disabled
                    && state != SystemState::ChannelAdjusting
                    && state != SystemState::Maintenance;
                assert_eq!(detection_allowed(true, mode, state), expected, "{mode} / {state}");
                assert!(!detection_allowed(false, mode, state));
            }
        }
    }

    #[test]
    fn test_no_self_transitions_in_table() {
        for state in SystemState::ALL {
            assert!(!state.can_transition_to(state), "{state} lists itself");
        }
    }

    #[test]
    fn test_operator_states_return_to_waiting() {
        for state in [SystemState::ChannelAdjusting, SystemState::Maintenance] {
            assert!(state.can_transition_to(SystemState::WaitingForTrigger));
        }
        // Maintenance is reachable from everywhere.
        for state in SystemState::ALL {
            if state != SystemState::Maintenance {
                assert!(state.can_transition_to(SystemState::Maintenance), "{state}");
            }
        }
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let err = SystemState::Idle
            .transition_to(SystemState::Processing)
            .unwrap_err();
        assert_eq!(err.from, SystemState::Idle);
        assert_eq!(err.to, SystemState::Processing);
        assert_eq!(
            err.to_string(),
            "illegal state transition: idle -> processing"
        );
    }

    #[test]
    fn test_system_testing_round_trip() {
        assert!(SystemState::WaitingForTrigger.can_transition_to(SystemState::SystemTesting));
        assert!(SystemState::SystemTesting.can_transition_to(SystemState::WaitingForTrigger));
        assert!(!SystemState::Detecting.can_transition_to(SystemState::SystemTesting));
    }

    #[test]
    fn test_mode_lock_states() {
        let locked: Vec<_> = SystemState::ALL
            .into_iter()
            .filter(|s| s.locks_mode())
            .collect();
        assert_eq!(locked, vec![SystemState::Detecting, SystemState::Processing]);
    }
}
