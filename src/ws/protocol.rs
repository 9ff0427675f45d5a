//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AnimalKind;
use crate::game::items::Item;
use crate::room::state::{Bet, RoomPhase};

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// List rooms that can still be joined
    GetRooms,

    /// Create a room and become its host.
    /// A missing name is rejected as `empty_name`, not as malformed input.
    CreateRoom {
        #[serde(default)]
        player_name: String,
    },

    /// Join an existing room by its code
    JoinRoom {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        player_name: String,
    },

    /// Leave the current room
    LeaveRoom,

    /// Host only: open the betting phase
    StartGame,

    /// Wager on an animal for the current round.
    /// Kept signed so out-of-range input is a validation error, not a parse error.
    PlaceBet { animal_id: i64, amount: i64 },

    /// Room chat
    SendChat { message: String },

    /// +1 hp to the animal the caller bet on
    Cheer,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Sent once after connection with the server-assigned player id
    Welcome { player_id: Uuid, server_time: u64 },

    RoomList { rooms: Vec<RoomListing> },

    RoomCreated { room_id: String, room: RoomView },

    RoomUpdate { room: RoomView },

    PlayerJoined { player: PlayerView },

    PlayerLeft { player_id: Uuid },

    BettingStart {
        room: RoomView,
        /// Betting window in milliseconds
        betting_time: u64,
        animals: Vec<AnimalKind>,
    },

    BetConfirmed { bet: Bet, animal: AnimalKind },

    GameStart { room: RoomView, animals: Vec<AnimalKind> },

    /// Full combatant state, every tick
    PositionUpdate { positions: Vec<CombatantSnapshot> },

    Damage { animal1: DamageSide, animal2: DamageSide },

    AnimalEaten {
        winner: CombatantSnapshot,
        loser: CombatantSnapshot,
        remaining_count: usize,
    },

    ItemSpawn { item: Item },

    ItemPickup { animal_id: u8, item: Item },

    GameResult {
        winner: CombatantSnapshot,
        /// Round length in milliseconds
        duration: u64,
        round: u32,
        winning_animal_id: u8,
        results: Vec<PlayerResult>,
        eliminated: Vec<EliminatedPlayer>,
        is_game_over: bool,
    },

    GameOver {
        eliminated: Vec<EliminatedPlayer>,
        final_results: Vec<FinalStanding>,
    },

    ChatMessage {
        player_id: Uuid,
        player_name: String,
        message: String,
        timestamp: u64,
    },

    CheerEffect {
        player_id: Uuid,
        player_name: String,
        animal_id: u8,
        animal_name: String,
        animal_emoji: String,
        new_hp: u32,
        max_hp: u32,
    },

    Error { code: String, message: String },
}

/// Lobby entry for a joinable room
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    pub room_id: String,
    pub host_name: String,
    pub player_count: usize,
    pub max_players: usize,
}

/// Full room state as shown to its members
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub room_id: String,
    pub host_id: Uuid,
    pub state: RoomPhase,
    pub players: Vec<PlayerView>,
    pub current_round: u32,
    pub player_count: usize,
    pub min_players: usize,
    pub can_start: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: Uuid,
    pub name: String,
    pub coins: u32,
    /// Not eliminated and able to cover the minimum bet
    pub is_ready: bool,
    pub has_bet: bool,
    pub eliminated: bool,
}

/// Combatant state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatantSnapshot {
    pub id: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub emoji: String,
    pub x: f32,
    pub y: f32,
    pub is_alive: bool,
    pub hp: u32,
    pub max_hp: u32,
}

/// One side of a resolved collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageSide {
    pub id: u8,
    /// Damage received, after modifiers
    pub damage: u32,
    pub hp: u32,
    pub max_hp: u32,
}

/// Per-player settlement of a round
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub player_id: Uuid,
    pub player_name: String,
    pub won: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet_animal_id: Option<u8>,
    pub bet_amount: u32,
    pub reward: u32,
    pub profit: i64,
    pub new_balance: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EliminatedPlayer {
    pub player_id: Uuid,
    pub player_name: String,
}

/// Match ranking entry, best balance first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalStanding {
    pub rank: usize,
    pub player_id: Uuid,
    pub player_name: String,
    pub coins: u32,
    pub eliminated: bool,
}

impl ServerMsg {
    /// Structured error for the requesting player
    pub fn error(err: &crate::room::RoomError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Reply to a frame that is not a valid client message
    pub fn bad_request(err: &serde_json::Error) -> Self {
        Self::Error {
            code: "bad_request".to_string(),
            message: err.to_string(),
        }
    }
}
