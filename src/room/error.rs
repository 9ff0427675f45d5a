//! Room validation and lookup errors

/// Errors reported back to the requesting player; none of them change room state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Please enter a player name")]
    EmptyName,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("A game is already in progress")]
    NotJoinable,

    #[error("Already in a room")]
    AlreadyInRoom,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Only the host can start the game")]
    NotHost,

    #[error("The game cannot be started yet")]
    CannotStart,

    #[error("Betting is not open")]
    NotBetting,

    #[error("Player not found")]
    PlayerNotFound,

    #[error("Bet must be between {min} and {max}")]
    BetOutOfRange { min: u32, max: u32 },

    #[error("Not enough coins")]
    InsufficientCoins,

    #[error("Invalid animal")]
    InvalidAnimal,
}

impl RoomError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::RoomNotFound => "room_not_found",
            Self::RoomFull => "room_full",
            Self::NotJoinable => "not_joinable",
            Self::AlreadyInRoom => "already_in_room",
            Self::NotInRoom => "not_in_room",
            Self::NotHost => "not_host",
            Self::CannotStart => "cannot_start",
            Self::NotBetting => "not_betting",
            Self::PlayerNotFound => "player_not_found",
            Self::BetOutOfRange { .. } => "bet_out_of_range",
            Self::InsufficientCoins => "insufficient_coins",
            Self::InvalidAnimal => "invalid_animal",
        }
    }
}
