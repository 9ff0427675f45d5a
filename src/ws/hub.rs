//! Connected session tracking

use dashmap::DashMap;
use uuid::Uuid;

use crate::util::time::unix_millis;

#[derive(Debug, Clone, Copy)]
pub struct SessionInfo {
    pub connected_at: u64,
}

/// Every live socket, keyed by its server-assigned player id
#[derive(Default)]
pub struct SessionHub {
    sessions: DashMap<Uuid, SessionInfo>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, player_id: Uuid) {
        self.sessions.insert(
            player_id,
            SessionInfo {
                connected_at: unix_millis(),
            },
        );
    }

    pub fn unregister(&self, player_id: Uuid) -> Option<SessionInfo> {
        self.sessions.remove(&player_id).map(|(_, info)| info)
    }

    pub fn connected(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_connects_and_disconnects() {
        let hub = SessionHub::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        hub.register(a);
        hub.register(b);
        assert_eq!(hub.connected(), 2);

        assert!(hub.unregister(a).is_some_and(|info| info.connected_at > 0));
        assert!(hub.unregister(a).is_none());
        assert_eq!(hub.connected(), 1);
    }
}
