//! Seams to the collaborators the cycle tracker drives.
//!
//! Capture, the detection algorithms, PLC I/O and presentation all live on
//! the far side of these traits.

use async_trait::async_trait;
use inspect_types::{ChannelId, ChannelResult, SentinelReason};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorResult;

/// Holds the last result value per channel.
pub trait ChannelResultCache: Send + Sync {
    /// Store a real measurement.
    fn set_result(&self, channel: ChannelId, value: ChannelResult);

    /// Store a degraded placeholder.
    fn set_sentinel(&self, channel: ChannelId, reason: SentinelReason);

    /// Clear both channels.
    fn reset_all(&self);

    /// Read the cached value.
    fn get(&self, channel: ChannelId) -> ChannelResult;
}

/// What caused a judgement to be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchTrigger {
    /// The last required channel reported.
    Completion,
    /// The 2D grace window elapsed.
    Timeout,
}

impl std::fmt::Display for DispatchTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchTrigger::Completion => write!(f, "completion"),
            DispatchTrigger::Timeout => write!(f, "timeout"),
        }
    }
}

/// Input handed to the judgement collaborator.
///
/// Carries the channel results as they stood when the cycle was judged; a
/// detached judgement may run after the next cycle has cleared the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgementRequest {
    /// Cycle being judged.
    pub generation: u64,

    /// Height results take part in scoring.
    pub channel_b_enabled: bool,

    pub trigger: DispatchTrigger,

    /// Awaited on the completing path (system test) rather than detached.
    pub inline: bool,

    /// 2D result, or the timeout sentinel.
    pub channel_a: ChannelResult,

    /// 3D result; `Empty` when the height pass was not part of the cycle.
    pub channel_b: ChannelResult,
}

/// Performs scoring and actuation for a completed cycle.
#[async_trait]
pub trait JudgementInvoker: Send + Sync {
    async fn judge(&self, request: JudgementRequest) -> CollaboratorResult<()>;
}

/// Returns the line to a ready state after a timeout, without asking the
/// operator.
#[async_trait]
pub trait HardwareFaultResetter: Send + Sync {
    async fn reset_silently(&self) -> CollaboratorResult<()>;
}

/// Drives back-to-back cycles when the line runs in auto mode.
#[async_trait]
pub trait ContinuousDetectionDriver: Send + Sync {
    fn is_auto_mode_active(&self) -> bool;

    async fn advance_to_next_cycle(&self) -> CollaboratorResult<()>;
}

/// Answers questions about what the host currently shows.
pub trait HostSurfaceQuery: Send + Sync {
    fn is_configuration_surface_active(&self) -> bool;
}

/// Safety interlock that can force the height pass off.
pub trait ShieldingInput: Send + Sync {
    fn is_channel_b_shielded(&self) -> bool;
}

/// Fault resetter that does nothing.
pub struct NoOpFaultResetter;

#[async_trait]
impl HardwareFaultResetter for NoOpFaultResetter {
    async fn reset_silently(&self) -> CollaboratorResult<()> {
        Ok(())
    }
}

/// Continuous driver for lines that never run in auto mode.
pub struct ManualOnlyDriver;

#[async_trait]
impl ContinuousDetectionDriver for ManualOnlyDriver {
    fn is_auto_mode_active(&self) -> bool {
        false
    }

    async fn advance_to_next_cycle(&self) -> CollaboratorResult<()> {
        Ok(())
    }
}

/// Host without a configuration surface.
pub struct HeadlessHost;

impl HostSurfaceQuery for HeadlessHost {
    fn is_configuration_surface_active(&self) -> bool {
        false
    }
}

/// Interlock that never shields.
pub struct NoShielding;

impl ShieldingInput for NoShielding {
    fn is_channel_b_shielded(&self) -> bool {
        false
    }
}
