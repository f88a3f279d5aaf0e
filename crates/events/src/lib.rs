//! Real-time event structures broadcast by each bot task and consumed by
//! the dashboard (`web-server`) and the `notifier`.
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the
//! definitive language for cross-task state synchronization.

pub mod error;
pub mod messages;

pub use error::EventsError;
pub use messages::{
    BotEvent, CrashEvent, CycleSummary, ExitEvent, HaltEvent, OrphanAdoptedEvent, StateTransition,
};
