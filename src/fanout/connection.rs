//! Lifecycle of a single stream or status client connection.

use super::SubscriberId;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Where a client connection is in its life.
///
/// `Connecting -> Active -> (Disconnected | Error)`. Both end states are
/// terminal; a client that comes back gets a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Active,
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    fn can_become(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Active) | (Connecting | Active, Disconnected | Error)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// State tracker for one client, used by the web handlers.
#[derive(Debug)]
pub struct Connection {
    id: SubscriberId,
    kind: &'static str,
    state: ConnectionState,
}

impl Connection {
    /// A new connection of the given kind (`"stream"`, `"status"`), in `Connecting`.
    pub fn new(kind: &'static str) -> Self {
        let id = SubscriberId::new();
        debug!("{} client {} connecting", kind, id);
        Self {
            id,
            kind,
            state: ConnectionState::Connecting,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Subscription succeeded.
    pub fn activate(&mut self) -> bool {
        let changed = self.transition(ConnectionState::Active);
        if changed {
            info!("{} client {} active", self.kind, self.id);
        }
        changed
    }

    /// The client went away cleanly.
    pub fn disconnect(&mut self) -> bool {
        let changed = self.transition(ConnectionState::Disconnected);
        if changed {
            info!("{} client {} disconnected", self.kind, self.id);
        }
        changed
    }

    /// Delivery to the client failed.
    pub fn fail(&mut self, reason: impl fmt::Display) -> bool {
        let changed = self.transition(ConnectionState::Error);
        if changed {
            warn!("{} client {} failed: {}", self.kind, self.id, reason);
        }
        changed
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_become(next) {
            debug!(
                "{} client {} ignoring {} -> {}",
                self.kind, self.id, self.state, next
            );
            return false;
        }
        self.state = next;
        true
    }
}
