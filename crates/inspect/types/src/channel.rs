//! Detection channels and their cached results

use serde::{Deserialize, Serialize};

/// One of the two detection channels of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    /// 2D optical pass.
    A,
    /// 3D height pass.
    B,
}

impl ChannelId {
    pub const BOTH: [ChannelId; 2] = [ChannelId::A, ChannelId::B];

    pub fn label(self) -> &'static str {
        match self {
            ChannelId::A => "2D",
            ChannelId::B => "3D",
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Why a placeholder was written instead of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentinelReason {
    /// The channel did not report within the grace window.
    ChannelTimeout,
}

impl std::fmt::Display for SentinelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentinelReason::ChannelTimeout => write!(f, "channel timeout"),
        }
    }
}

/// Last result cached for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelResult {
    #[default]
    Empty,
    /// A real measurement, opaque to the orchestrator.
    Measured(String),
    /// Degraded placeholder.
    Sentinel(SentinelReason),
}

impl ChannelResult {
    pub fn measured(value: impl Into<String>) -> Self {
        ChannelResult::Measured(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ChannelResult::Empty)
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, ChannelResult::Sentinel(_))
    }
}

impl std::fmt::Display for ChannelResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelResult::Empty => write!(f, "<empty>"),
            ChannelResult::Measured(value) => write!(f, "{}", value),
            ChannelResult::Sentinel(reason) => write!(f, "<{}>", reason),
        }
    }
}
