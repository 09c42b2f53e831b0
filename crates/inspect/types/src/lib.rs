//! Inspect Types - Core types for the inspection line
//!
//! An inspection line runs two detection channels per trigger:
//!
//! - **Channel A**: the fast 2D optical pass, always present
//! - **Channel B**: the slower 3D height pass, optional per cycle and
//!   subject to a hardware shielding interlock
//!
//! Both channels complete asynchronously. The `inspect-cycle` crate folds
//! them into exactly one judgement per trigger; this crate holds the data
//! shared by that orchestrator, the mode controller, and the host.
//!
//! ## Key Concepts
//!
//! - **OperatingMode**: what kind of inspection the line performs
//! - **SystemState**: where the line is in its operating lifecycle
//! - **ChannelResult**: the last value cached for a channel
//! - **CycleStatus**: a read-only snapshot of the active cycle

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod channel;
pub mod mode;
pub mod status;

pub use channel::{ChannelId, ChannelResult, SentinelReason};
pub use mode::{detection_allowed, IllegalTransition, OperatingMode, SystemState};
pub use status::CycleStatus;
