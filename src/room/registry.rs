//! Room registry - room codes, player membership and the lobby feed

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GameRules;
use crate::ws::protocol::{RoomListing, RoomView, ServerMsg};

use super::actor::{RoomHandle, RoomTask};
use super::RoomError;

const LOBBY_CAPACITY: usize = 64;
const ROOM_CODE_LEN: usize = 8;

/// Both maps live under one lock so join and leave update them together
#[derive(Default)]
struct RegistryMaps {
    rooms: HashMap<String, RoomHandle>,
    player_rooms: HashMap<Uuid, String>,
}

impl RegistryMaps {
    fn available(&self) -> Vec<RoomListing> {
        let mut rooms: Vec<RoomListing> = self
            .rooms
            .values()
            .map(RoomHandle::summary)
            .filter(|s| s.phase.is_lobby())
            .map(|s| s.listing)
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }
}

/// Pushes `room_list` to every connected session
#[derive(Clone)]
pub struct LobbyFeed {
    tx: broadcast::Sender<ServerMsg>,
    maps: Arc<Mutex<RegistryMaps>>,
}

impl LobbyFeed {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.tx.subscribe()
    }

    pub fn publish(&self) {
        let rooms = self.maps.lock().available();
        let _ = self.tx.send(ServerMsg::RoomList { rooms });
    }
}

/// Result of a player leaving their room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub room_id: String,
    pub room_deleted: bool,
}

pub struct RoomRegistry {
    maps: Arc<Mutex<RegistryMaps>>,
    lobby: LobbyFeed,
    rules: GameRules,
}

impl RoomRegistry {
    pub fn new(rules: GameRules) -> Self {
        let maps = Arc::new(Mutex::new(RegistryMaps::default()));
        let (tx, _) = broadcast::channel(LOBBY_CAPACITY);
        Self {
            lobby: LobbyFeed {
                tx,
                maps: maps.clone(),
            },
            maps,
            rules,
        }
    }

    /// Create a room with `host_id` as its first player and spawn its task
    pub fn create_room(&self, host_id: Uuid, player_name: &str) -> Result<RoomHandle, RoomError> {
        let name = validate_name(player_name)?;

        let handle = {
            let mut maps = self.maps.lock();
            if maps.player_rooms.contains_key(&host_id) {
                return Err(RoomError::AlreadyInRoom);
            }

            let code = loop {
                let candidate = room_code();
                if !maps.rooms.contains_key(&candidate) {
                    break candidate;
                }
            };

            let (task, handle) = RoomTask::new(
                code.clone(),
                host_id,
                name,
                self.rules.clone(),
                rand::random::<u64>(),
                self.lobby.clone(),
            );
            tokio::spawn(task.run());

            maps.rooms.insert(code.clone(), handle.clone());
            maps.player_rooms.insert(host_id, code);
            handle
        };

        info!(room_id = %handle.id, host_id = %host_id, "Room created");
        self.lobby.publish();
        Ok(handle)
    }

    /// Add a player to an existing room by code
    pub async fn join_room(
        &self,
        player_id: Uuid,
        room_id: &str,
        player_name: &str,
    ) -> Result<RoomView, RoomError> {
        let name = validate_name(player_name)?;
        let code = room_id.trim().to_uppercase();

        let handle = {
            let maps = self.maps.lock();
            if maps.player_rooms.contains_key(&player_id) {
                return Err(RoomError::AlreadyInRoom);
            }
            maps.rooms
                .get(&code)
                .filter(|h| !h.is_closed())
                .cloned()
                .ok_or(RoomError::RoomNotFound)?
        };

        let view = handle.join(player_id, name).await?;
        self.maps.lock().player_rooms.insert(player_id, code);
        Ok(view)
    }

    /// Remove a player from whatever room they are in. The room is dropped
    /// from the registry when its last player leaves.
    pub async fn leave_room(&self, player_id: Uuid) -> Result<LeaveOutcome, RoomError> {
        let (code, handle) = {
            let mut maps = self.maps.lock();
            let code = maps
                .player_rooms
                .remove(&player_id)
                .ok_or(RoomError::NotInRoom)?;
            let handle = maps.rooms.get(&code).cloned();
            (code, handle)
        };

        let room_deleted = match handle {
            Some(handle) => match handle.leave(player_id).await {
                Ok(Some(departure)) => departure.empty,
                Ok(None) => false,
                Err(_) => {
                    warn!(room_id = %code, "Room task gone before leave");
                    true
                }
            },
            None => true,
        };

        if room_deleted {
            self.maps.lock().rooms.remove(&code);
            info!(room_id = %code, "Room destroyed");
            self.lobby.publish();
        }

        Ok(LeaveOutcome {
            room_id: code,
            room_deleted,
        })
    }

    pub fn room_of(&self, player_id: Uuid) -> Option<RoomHandle> {
        let maps = self.maps.lock();
        let code = maps.player_rooms.get(&player_id)?;
        maps.rooms.get(code).cloned()
    }

    pub fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.maps.lock().rooms.get(&room_id.to_uppercase()).cloned()
    }

    /// Rooms still accepting players
    pub fn available_rooms(&self) -> Vec<RoomListing> {
        self.maps.lock().available()
    }

    pub fn active_rooms(&self) -> usize {
        self.maps.lock().rooms.len()
    }

    pub fn subscribe_lobby(&self) -> broadcast::Receiver<ServerMsg> {
        self.lobby.subscribe()
    }
}

fn validate_name(raw: &str) -> Result<String, RoomError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RoomError::EmptyName);
    }
    Ok(name.to_string())
}

/// Eight uppercase characters from a fresh v4 uuid
fn room_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(ROOM_CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}
