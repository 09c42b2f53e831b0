//! Cycle events and counters.
//!
//! Events go out on a broadcast channel; having no subscriber is fine.

use std::sync::atomic::{AtomicU64, Ordering};

use inspect_types::{ChannelId, SystemState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::traits::DispatchTrigger;

/// Something that happened to a detection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleEvent {
    CycleStarted {
        generation: u64,
        channel_b_enabled: bool,
        shielded: bool,
    },

    ChannelCompleted {
        generation: u64,
        channel: ChannelId,
    },

    /// A completion arrived for a channel that already reported.
    DuplicateCompletion {
        generation: u64,
        channel: ChannelId,
    },

    TimeoutArmed {
        generation: u64,
        grace_ms: u64,
    },

    /// The 2D pass was force-completed with a sentinel.
    TimeoutFired {
        generation: u64,
    },

    JudgementDispatched {
        generation: u64,
        trigger: DispatchTrigger,
        inline: bool,
    },

    JudgementFailed {
        generation: u64,
        error: String,
    },

    FaultResetFailed {
        generation: u64,
        error: String,
    },

    AdvanceFailed {
        generation: u64,
        error: String,
    },

    DeferredExitApplied {
        generation: u64,
        to: SystemState,
    },

    Reset {
        generation: u64,
    },
}

impl CycleEvent {
    pub fn generation(&self) -> u64 {
        match self {
            CycleEvent::CycleStarted { generation, .. }
            | CycleEvent::ChannelCompleted { generation, .. }
            | CycleEvent::DuplicateCompletion { generation, .. }
            | CycleEvent::TimeoutArmed { generation, .. }
            | CycleEvent::TimeoutFired { generation }
            | CycleEvent::JudgementDispatched { generation, .. }
            | CycleEvent::JudgementFailed { generation, .. }
            | CycleEvent::FaultResetFailed { generation, .. }
            | CycleEvent::AdvanceFailed { generation, .. }
            | CycleEvent::DeferredExitApplied { generation, .. }
            | CycleEvent::Reset { generation } => *generation,
        }
    }
}

/// Counter snapshot for a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackerStats {
    pub cycles_started: u64,
    pub dispatches: u64,
    pub timeouts: u64,
    pub duplicates: u64,
    pub judgement_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub cycles_started: AtomicU64,
    pub dispatches: AtomicU64,
    pub timeouts: AtomicU64,
    pub duplicates: AtomicU64,
    pub judgement_failures: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TrackerStats {
        TrackerStats {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            judgement_failures: self.judgement_failures.load(Ordering::Relaxed),
        }
    }
}

/// Sending half of the cycle event stream.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: broadcast::Sender<CycleEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: CycleEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let sink = EventSink::new(8);
        sink.emit(CycleEvent::Reset { generation: 1 });

        let mut rx = sink.subscribe();
        sink.emit(CycleEvent::TimeoutFired { generation: 2 });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation(), 2);
    }

    #[test]
    fn test_stats_snapshot() {
        let counters = StatsCounters::default();
        StatsCounters::bump(&counters.dispatches);
        StatsCounters::bump(&counters.dispatches);
        StatsCounters::bump(&counters.timeouts);

        let stats = counters.snapshot();
        assert_eq!(stats.dispatches, 2);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.cycles_started, 0);
    }
}
