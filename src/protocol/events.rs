//! Event names, payloads and room identifiers
//!
//! Server-pushed events are re-dispatched to local listeners under the
//! same name they arrived with. The client also synthesizes three
//! lifecycle events of its own (`connection_status`, `connection_error`,
//! `socket_error`).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorReport;

// ─────────────────────────────────────────────────────────────────
// Server Events
// ─────────────────────────────────────────────────────────────────

/// Named events pushed by the realtime server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    ProjectUpdated,
    ProjectCreated,
    ProjectDeleted,
    MilestoneUpdated,
    MilestoneCreated,
    MilestoneDeleted,
    TaskUpdated,
    TaskCreated,
    TaskDeleted,
    TaskStatusChanged,
    TaskAssigned,
    CommentAdded,
    TeamMemberAdded,
    TeamMemberRemoved,
    ProgressUpdated,
    JoinedRoom,
    LeftRoom,
}

impl ServerEvent {
    /// Every server event, in wire-documentation order
    pub const ALL: [ServerEvent; 17] = [
        ServerEvent::ProjectUpdated,
        ServerEvent::ProjectCreated,
        ServerEvent::ProjectDeleted,
        ServerEvent::MilestoneUpdated,
        ServerEvent::MilestoneCreated,
        ServerEvent::MilestoneDeleted,
        ServerEvent::TaskUpdated,
        ServerEvent::TaskCreated,
        ServerEvent::TaskDeleted,
        ServerEvent::TaskStatusChanged,
        ServerEvent::TaskAssigned,
        ServerEvent::CommentAdded,
        ServerEvent::TeamMemberAdded,
        ServerEvent::TeamMemberRemoved,
        ServerEvent::ProgressUpdated,
        ServerEvent::JoinedRoom,
        ServerEvent::LeftRoom,
    ];

    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerEvent::ProjectUpdated => "project_updated",
            ServerEvent::ProjectCreated => "project_created",
            ServerEvent::ProjectDeleted => "project_deleted",
            ServerEvent::MilestoneUpdated => "milestone_updated",
            ServerEvent::MilestoneCreated => "milestone_created",
            ServerEvent::MilestoneDeleted => "milestone_deleted",
            ServerEvent::TaskUpdated => "task_updated",
            ServerEvent::TaskCreated => "task_created",
            ServerEvent::TaskDeleted => "task_deleted",
            ServerEvent::TaskStatusChanged => "task_status_changed",
            ServerEvent::TaskAssigned => "task_assigned",
            ServerEvent::CommentAdded => "comment_added",
            ServerEvent::TeamMemberAdded => "team_member_added",
            ServerEvent::TeamMemberRemoved => "team_member_removed",
            ServerEvent::ProgressUpdated => "progress_updated",
            ServerEvent::JoinedRoom => "joined_room",
            ServerEvent::LeftRoom => "left_room",
        }
    }

    /// Look up a server event by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.as_str() == name)
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Event Names
// ─────────────────────────────────────────────────────────────────

pub const CONNECTION_STATUS: &str = "connection_status";
pub const CONNECTION_ERROR: &str = "connection_error";
pub const SOCKET_ERROR: &str = "socket_error";

/// Key of the listener registry.
///
/// Equality and hashing go through the wire name, so
/// `EventName::Custom("task_updated".into())` and
/// `EventName::Server(ServerEvent::TaskUpdated)` address the same listeners.
#[derive(Debug, Clone)]
pub enum EventName {
    /// Pushed by the server
    Server(ServerEvent),
    /// Synthesized on connect / disconnect
    ConnectionStatus,
    /// Synthesized when the handshake fails or is rejected
    ConnectionError,
    /// Synthesized when the live transport reports an error
    SocketError,
    /// Any other name (local-only publishes)
    Custom(String),
}

impl EventName {
    /// Wire name
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Server(e) => e.as_str(),
            EventName::ConnectionStatus => CONNECTION_STATUS,
            EventName::ConnectionError => CONNECTION_ERROR,
            EventName::SocketError => SOCKET_ERROR,
            EventName::Custom(name) => name,
        }
    }
}

impl PartialEq for EventName {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for EventName {}

impl Hash for EventName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            CONNECTION_STATUS => EventName::ConnectionStatus,
            CONNECTION_ERROR => EventName::ConnectionError,
            SOCKET_ERROR => EventName::SocketError,
            other => match ServerEvent::from_name(other) {
                Some(e) => EventName::Server(e),
                None => EventName::Custom(other.to_string()),
            },
        })
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(name) => name,
            Err(never) => match never {},
        }
    }
}

impl From<ServerEvent> for EventName {
    fn from(e: ServerEvent) -> Self {
        EventName::Server(e)
    }
}

// ─────────────────────────────────────────────────────────────────
// Event Payloads
// ─────────────────────────────────────────────────────────────────

/// Payload of the `connection_status` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub connected: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StatusChange {
    pub fn connected() -> Self {
        Self {
            connected: true,
            reason: None,
        }
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self {
            connected: false,
            reason: Some(reason.into()),
        }
    }
}

/// An event delivered to local listeners
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Pushed by the server; the payload shape is owned by the server
    Server { kind: ServerEvent, data: Value },

    /// Connection came up or went down
    ConnectionStatus(StatusChange),

    /// Handshake failed or the server rejected the session
    ConnectionError(ErrorReport),

    /// The live transport reported an error
    SocketError(ErrorReport),

    /// Local-only publish under an arbitrary name
    Custom { name: String, data: Value },
}

impl Event {
    /// Build an event from a wire name and payload.
    ///
    /// Known server event names become [`Event::Server`]; anything else
    /// becomes [`Event::Custom`].
    pub fn named(name: &str, data: Value) -> Self {
        match ServerEvent::from_name(name) {
            Some(kind) => Event::Server { kind, data },
            None => Event::Custom {
                name: name.to_string(),
                data,
            },
        }
    }

    /// Registry key this event dispatches under
    pub fn name(&self) -> EventName {
        match self {
            Event::Server { kind, .. } => EventName::Server(*kind),
            Event::ConnectionStatus(_) => EventName::ConnectionStatus,
            Event::ConnectionError(_) => EventName::ConnectionError,
            Event::SocketError(_) => EventName::SocketError,
            Event::Custom { name, .. } => EventName::Custom(name.clone()),
        }
    }

    /// JSON view of the payload
    pub fn data(&self) -> Value {
        match self {
            Event::Server { data, .. } | Event::Custom { data, .. } => data.clone(),
            Event::ConnectionStatus(status) => {
                serde_json::to_value(status).unwrap_or(Value::Null)
            }
            Event::ConnectionError(report) | Event::SocketError(report) => {
                serde_json::to_value(report).unwrap_or(Value::Null)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Rooms
// ─────────────────────────────────────────────────────────────────

/// Kind of resource a room is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    Project,
    Milestone,
    Task,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Project => "project",
            RoomKind::Milestone => "milestone",
            RoomKind::Task => "task",
        }
    }
}

/// A server-side broadcast group, identified as `<kind>:<id>`.
///
/// The server is authoritative on membership; the client only asks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Room {
    pub kind: RoomKind,
    pub id: String,
}

impl Room {
    pub fn new(kind: RoomKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn project(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Project, id)
    }

    pub fn milestone(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Milestone, id)
    }

    pub fn task(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Task, id)
    }

    /// Outbound event requesting membership
    pub fn join_event(&self) -> &'static str {
        match self.kind {
            RoomKind::Project => "join_project",
            RoomKind::Milestone => "join_milestone",
            RoomKind::Task => "join_task",
        }
    }

    /// Outbound event giving up membership
    pub fn leave_event(&self) -> &'static str {
        match self.kind {
            RoomKind::Project => "leave_project",
            RoomKind::Milestone => "leave_milestone",
            RoomKind::Task => "leave_task",
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}
