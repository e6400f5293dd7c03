//! Building blocks shared by the frame broker and the telemetry sampler.

pub mod connection;
pub mod queue;

pub use connection::{Connection, ConnectionState};
pub use queue::DropOldestQueue;

use std::fmt;

/// Identity of one stream or status subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(uuid::Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First uuid group is plenty to tell clients apart in logs
        let id = self.0.simple().to_string();
        f.write_str(&id[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_subscriber_ids_are_unique_and_short() {
        let ids: HashSet<SubscriberId> = (0..64).map(|_| SubscriberId::new()).collect();
        assert_eq!(ids.len(), 64);

        let id = SubscriberId::default();
        assert_eq!(id.to_string().len(), 8);
        assert_eq!(id.to_string(), id.to_string());
    }
}
