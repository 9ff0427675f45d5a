//! Game rules: the animal roster and the product parameters of a room

use serde::Serialize;

use super::{env_or, ConfigError};

/// A fixed entry of the animal roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnimalKind {
    pub id: u8,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub emoji: &'static str,
}

/// The eight animals that fight every round, indexed by id
pub const ANIMALS: [AnimalKind; 8] = [
    AnimalKind { id: 0, kind: "lion", name: "Lion", emoji: "🦁" },
    AnimalKind { id: 1, kind: "tiger", name: "Tiger", emoji: "🐯" },
    AnimalKind { id: 2, kind: "bear", name: "Bear", emoji: "🐻" },
    AnimalKind { id: 3, kind: "wolf", name: "Wolf", emoji: "🐺" },
    AnimalKind { id: 4, kind: "eagle", name: "Eagle", emoji: "🦅" },
    AnimalKind { id: 5, kind: "shark", name: "Shark", emoji: "🦈" },
    AnimalKind { id: 6, kind: "snake", name: "Snake", emoji: "🐍" },
    AnimalKind { id: 7, kind: "crocodile", name: "Crocodile", emoji: "🐊" },
];

pub const ANIMAL_COUNT: usize = ANIMALS.len();

/// Room and round parameters
#[derive(Debug, Clone)]
pub struct GameRules {
    /// Coins every player starts a match with
    pub initial_coins: u32,
    pub min_bet: u32,
    pub max_bet: u32,
    /// Fraction of a winning payout withheld by the house
    pub house_cut: f64,
    pub min_players: usize,
    pub max_players: usize,
    /// Betting window before the round starts anyway
    pub betting_time_ms: u64,
    /// Bounds of the pacing target duration
    pub round_min_ms: u64,
    pub round_max_ms: u64,
    /// Simulation tick period
    pub tick_ms: u64,
    pub arena_width: f32,
    pub arena_height: f32,
    /// Pause between the result broadcast and the room becoming READY again
    pub round_end_delay_ms: u64,
    /// Item pickups during rounds
    pub items_enabled: bool,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            initial_coins: 300,
            min_bet: 10,
            max_bet: 100,
            house_cut: 0.05,
            min_players: 3,
            max_players: 8,
            betting_time_ms: 15_000,
            round_min_ms: 50_000,
            round_max_ms: 60_000,
            tick_ms: 50,
            arena_width: 800.0,
            arena_height: 600.0,
            round_end_delay_ms: 5_000,
            items_enabled: true,
        }
    }
}

impl GameRules {
    /// Defaults overridden by any rule variables present in the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let rules = Self {
            initial_coins: env_or("INITIAL_COINS", d.initial_coins)?,
            min_bet: env_or("MIN_BET", d.min_bet)?,
            max_bet: env_or("MAX_BET", d.max_bet)?,
            house_cut: env_or("HOUSE_CUT", d.house_cut)?,
            min_players: env_or("MIN_PLAYERS", d.min_players)?,
            max_players: env_or("MAX_PLAYERS", d.max_players)?,
            betting_time_ms: env_or("BETTING_TIME_MS", d.betting_time_ms)?,
            round_min_ms: env_or("ROUND_MIN_MS", d.round_min_ms)?,
            round_max_ms: env_or("ROUND_MAX_MS", d.round_max_ms)?,
            tick_ms: env_or("TICK_MS", d.tick_ms)?,
            arena_width: env_or("ARENA_WIDTH", d.arena_width)?,
            arena_height: env_or("ARENA_HEIGHT", d.arena_height)?,
            round_end_delay_ms: env_or("ROUND_END_DELAY_MS", d.round_end_delay_ms)?,
            items_enabled: env_or("ITEMS_ENABLED", d.items_enabled)?,
        };
        rules.validate()?;
        Ok(rules)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_bet == 0 || self.min_bet > self.max_bet {
            return Err(ConfigError::Invalid("MIN_BET"));
        }
        if !(0.0..1.0).contains(&self.house_cut) {
            return Err(ConfigError::Invalid("HOUSE_CUT"));
        }
        if self.min_players == 0 || self.min_players > self.max_players {
            return Err(ConfigError::Invalid("MIN_PLAYERS"));
        }
        if self.round_min_ms == 0 || self.round_min_ms > self.round_max_ms {
            return Err(ConfigError::Invalid("ROUND_MIN_MS"));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("TICK_MS"));
        }
        if self.arena_width <= 100.0 || self.arena_height <= 100.0 {
            return Err(ConfigError::Invalid("ARENA_WIDTH"));
        }
        Ok(())
    }

    /// House cut in basis points, so payouts stay integer arithmetic
    pub fn house_cut_bps(&self) -> u64 {
        (self.house_cut * 10_000.0).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_ids_match_indices() {
        for (idx, animal) in ANIMALS.iter().enumerate() {
            assert_eq!(animal.id as usize, idx);
        }
        assert_eq!(ANIMAL_COUNT, 8);
    }

    #[test]
    fn default_rules_are_valid() {
        let rules = GameRules::default();
        assert!(rules.validate().is_ok());
        assert_eq!(rules.house_cut_bps(), 500);
    }

    #[test]
    fn inverted_bet_bounds_are_rejected() {
        let rules = GameRules {
            min_bet: 200,
            ..GameRules::default()
        };
        assert!(matches!(rules.validate(), Err(ConfigError::Invalid("MIN_BET"))));
    }
}
