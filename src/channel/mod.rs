//! Realtime event channel
//!
//! Handles:
//! - Session lifecycle and reconnection
//! - Local listener registration and dispatch
//! - Liveness probing

mod client;
mod listeners;
mod probe;
mod reconnect;

pub use client::{
    AuthClassifier, ClientBuilder, ClientConfig, ConnectionHandle, ConnectionState,
    ConnectionStatus, EventChannelClient,
};
pub use listeners::{listener, Handler, ListenerRegistry};
pub use probe::{AvailabilityProbe, HttpProbe, HEALTH_PATH};
pub use reconnect::ReconnectPolicy;
