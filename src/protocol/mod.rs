//! Realtime wire protocol
//!
//! Defines the JSON envelope, the typed event names and payloads, and the
//! room identifiers used by the event channel.

mod envelope;
mod events;

pub use envelope::*;
pub use events::*;
