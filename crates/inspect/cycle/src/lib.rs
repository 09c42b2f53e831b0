//! # Inspect Cycle - Dual-channel detection cycle orchestration
//!
//! Each inspection trigger produces a 2D optical result (channel A) and,
//! when enabled and not shielded, a 3D height result (channel B). The two
//! arrive independently and in any order. This crate turns them into exactly
//! one judgement-and-actuation call per trigger.
//!
//! ## Key Components
//!
//! - [`DetectionCycleTracker`]: completion flags and exactly-once dispatch
//! - [`TimeoutGuard`]: the grace window that force-completes a lost 2D pass
//! - [`OperatingContext`]: shared operating mode and system state
//! - [`traits`]: seams to the judgement, fault reset, continuous driver,
//!   host and shielding collaborators
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use inspect_cycle::{
//!     mocks::RecordingJudgement, Collaborators, CycleConfig, DetectionCycleTracker,
//!     OperatingContext,
//! };
//!
//! # async fn example() {
//! let context = Arc::new(OperatingContext::new());
//! let judgement = Arc::new(RecordingJudgement::new());
//! let tracker = DetectionCycleTracker::new(
//!     CycleConfig::default(),
//!     context,
//!     Collaborators::new(judgement),
//! );
//!
//! tracker.start_cycle(true);
//! tracker.mark_channel_b_completed().await; // arms the 2D grace window
//! tracker.mark_channel_a_completed().await; // dispatches the judgement
//! # }
//! ```
//!
//! ## Dispatch Semantics
//!
//! In `SystemTest` mode the judgement is awaited on the completing path so
//! benchmark timings stay honest. In every other mode it is spawned and its
//! failures are logged, never returned.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod mocks;
pub mod timeout;
pub mod tracker;
pub mod traits;

pub use cache::InMemoryResultCache;
pub use config::CycleConfig;
pub use context::OperatingContext;
pub use error::{CollaboratorError, CollaboratorResult, CycleError, CycleResult};
pub use events::{CycleEvent, TrackerStats};
pub use timeout::TimeoutGuard;
pub use tracker::{Collaborators, CompletionOutcome, DetectionCycleTracker};
pub use traits::{
    ChannelResultCache, ContinuousDetectionDriver, DispatchTrigger, HardwareFaultResetter,
    HostSurfaceQuery, JudgementInvoker, JudgementRequest, ShieldingInput,
};
