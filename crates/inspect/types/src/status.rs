//! Read-only snapshot of the active detection cycle

use serde::{Deserialize, Serialize};

/// Snapshot of the active cycle, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CycleStatus {
    /// Identity of the active cycle.
    pub generation: u64,

    /// 2D optical pass reported.
    pub channel_a_completed: bool,

    /// 3D height pass reported.
    pub channel_b_completed: bool,

    /// Height pass participates in this cycle (request AND NOT shielded).
    pub channel_b_enabled: bool,

    /// Grace timer waiting on the 2D pass.
    pub timeout_armed: bool,

    /// Judgement already dispatched for this cycle.
    pub dispatched: bool,
}

impl CycleStatus {
    /// Completion predicate.
    pub fn is_satisfied(&self) -> bool {
        if self.channel_b_enabled {
            self.channel_a_completed && self.channel_b_completed
        } else {
            self.channel_a_completed
        }
    }

    /// Human-readable one-liner for status bars and logs.
    pub fn describe(&self) -> String {
        let a = if self.channel_a_completed { "done" } else { "pending" };
        let b = match (self.channel_b_enabled, self.channel_b_completed) {
            (false, _) => "disabled",
            (true, true) => "done",
            (true, false) => "pending",
        };
        let mut text = format!("cycle #{}: 2D {}, 3D {}", self.generation, a, b);
        if self.timeout_armed {
            text.push_str(", waiting on 2D timeout");
        }
        if self.dispatched {
            text.push_str(", judged");
        }
        text
    }
}
