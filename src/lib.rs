//! Resilient realtime event-channel client
//!
//! Owns one logical connection to a realtime event server, probes it before
//! dialing, re-dispatches server-pushed events to local listeners, manages
//! room membership requests and recovers from transient failures with
//! bounded exponential backoff.
//!
//! ```no_run
//! use realtime_client::channel::{listener, ClientConfig, EventChannelClient};
//! use realtime_client::protocol::{Event, EventName, ServerEvent};
//!
//! # async fn demo() -> realtime_client::error::Result<()> {
//! let client = EventChannelClient::new(ClientConfig::default())?;
//! client.on(ServerEvent::TaskUpdated, listener(|event| println!("{:?}", event.data())));
//!
//! // Room requests only go out while connected
//! let joiner = client.clone();
//! client.on(
//!     EventName::ConnectionStatus,
//!     listener(move |event| {
//!         if matches!(event, Event::ConnectionStatus(s) if s.connected) {
//!             joiner.join_project("p42");
//!         }
//!     }),
//! );
//!
//! if client.connect("session-token").await.is_none() {
//!     // Server unavailable; live updates stay off
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transport;
pub mod version;

pub use channel::{listener, ClientConfig, ConnectionHandle, ConnectionState, EventChannelClient};
pub use error::{Error, ErrorReport, Result};
pub use protocol::{Event, EventName, Room, ServerEvent};
