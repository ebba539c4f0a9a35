//! Connection lifecycle events published to the registry owner.

use crate::connection::ConnectionState;
use tickgate_core::ConnectionId;

/// What happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEventKind {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
        attempt: u32,
    },
    /// Socket-level error or remote close; a reconnect follows unless closing.
    Error(String),
    /// Reconnect attempts exhausted. Terminal until the connection is recreated.
    Failed { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub id: ConnectionId,
    pub kind: ConnectionEventKind,
}

impl ConnectionEvent {
    pub fn new(id: ConnectionId, kind: ConnectionEventKind) -> Self {
        Self { id, kind }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.kind, ConnectionEventKind::Failed { .. })
    }
}
