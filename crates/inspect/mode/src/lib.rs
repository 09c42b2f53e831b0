//! Inspect Mode - operating mode controller for the inspection line
//!
//! The [`ModeController`] decides whether detection events are processed at
//! all and moves the line between its operating states:
//!
//! ```text
//! Idle ─► ConfiguringProfile ─► { WaitingForTrigger ⇄ Detecting ⇄ Processing }
//!                                        │    ▲
//!                  ChannelAdjusting ◄────┤    ├──── SystemTesting
//!                  Maintenance      ◄────┘    │
//! ```
//!
//! Transitions outside the table in `inspect_types::SystemState` are
//! rejected.

#![deny(unsafe_code)]

pub mod controller;
pub mod error;

pub use controller::ModeController;
pub use error::{ModeError, ModeResult};
