//! Room state machine - roster, bet ledger, coins and the round lifecycle
//!
//! `WAITING <-> READY -> BETTING -> PLAYING -> RESULT -> READY | GAME_OVER`
//!
//! Everything here is synchronous; the room task owns one instance and
//! supplies the clock.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{GameRules, ANIMALS, ANIMAL_COUNT};
use crate::game::{EngineSettings, SimEvent, SimulationEngine};
use crate::ws::protocol::{
    EliminatedPlayer, FinalStanding, PlayerResult, PlayerView, RoomListing, RoomView, ServerMsg,
};

use super::RoomError;

/// Minimum pause between two cheers from the same player
pub const CHEER_COOLDOWN_MS: u64 = 1_000;
/// Chat messages are cut to this many characters
pub const MAX_CHAT_CHARS: usize = 200;
const CHEER_HEAL: u32 = 1;

/// Room lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// Fewer than the minimum players
    Waiting,
    /// Enough players, waiting for the host
    Ready,
    Betting,
    Playing,
    Result,
    /// Someone ran out of coins; terminal for the match
    GameOver,
}

impl RoomPhase {
    /// Lobby phases accept joins and show up in room listings
    pub fn is_lobby(self) -> bool {
        matches!(self, Self::Waiting | Self::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub animal_id: u8,
    pub amount: u32,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub coins: u32,
    pub last_cheer_at: Option<u64>,
    pub eliminated: bool,
}

/// Result of removing a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub empty: bool,
    pub new_host: Option<Uuid>,
}

/// Settlement of a finished round
#[derive(Debug, Clone)]
pub struct RoundSettlement {
    pub round: u32,
    pub winning_animal_id: u8,
    pub results: Vec<PlayerResult>,
    pub eliminated: Vec<EliminatedPlayer>,
    pub is_game_over: bool,
    pub final_standings: Vec<FinalStanding>,
}

pub struct RoomStateMachine {
    id: String,
    host_id: Uuid,
    phase: RoomPhase,
    /// Join order; the first entry inherits the host role
    players: Vec<Player>,
    bets: HashMap<Uuid, Bet>,
    current_round: u32,
    rules: GameRules,
    engine: SimulationEngine,
}

impl RoomStateMachine {
    /// New room seeded with its host
    pub fn new(id: String, host_id: Uuid, host_name: String, rules: GameRules, seed: u64) -> Self {
        let engine = SimulationEngine::new(EngineSettings::from(&rules), seed);
        let mut room = Self {
            id,
            host_id,
            phase: RoomPhase::Waiting,
            players: Vec::new(),
            bets: HashMap::new(),
            current_round: 0,
            rules,
            engine,
        };
        let host = room.new_player(host_id, host_name);
        room.players.push(host);
        room.refresh_lobby_phase();
        room
    }

    fn new_player(&self, id: Uuid, name: String) -> Player {
        Player {
            id,
            name,
            coins: self.rules.initial_coins,
            last_cheer_at: None,
            eliminated: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    pub fn host_id(&self) -> Uuid {
        self.host_id
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    #[cfg(test)]
    pub fn bet_of(&self, id: Uuid) -> Option<Bet> {
        self.bets.get(&id).copied()
    }

    pub fn host_name(&self) -> String {
        self.player(self.host_id)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    /// WAITING and READY follow the roster size
    fn refresh_lobby_phase(&mut self) {
        if self.phase.is_lobby() {
            self.phase = if self.players.len() >= self.rules.min_players {
                RoomPhase::Ready
            } else {
                RoomPhase::Waiting
            };
        }
    }

    pub fn add_player(&mut self, id: Uuid, name: String) -> Result<PlayerView, RoomError> {
        if self.player(id).is_some() {
            return Err(RoomError::AlreadyInRoom);
        }
        if self.players.len() >= self.rules.max_players {
            return Err(RoomError::RoomFull);
        }
        if !self.phase.is_lobby() {
            return Err(RoomError::NotJoinable);
        }

        let player = self.new_player(id, name);
        let view = self.player_view(&player);
        self.players.push(player);
        self.refresh_lobby_phase();
        Ok(view)
    }

    /// Remove a player and any bet. The wagered animal keeps fighting and
    /// nothing is refunded.
    pub fn remove_player(&mut self, id: Uuid) -> Option<Departure> {
        let idx = self.players.iter().position(|p| p.id == id)?;
        self.players.remove(idx);
        self.bets.remove(&id);

        let empty = self.players.is_empty();
        let mut new_host = None;
        if self.host_id == id {
            if let Some(next) = self.players.first() {
                self.host_id = next.id;
                new_host = Some(next.id);
            }
        }

        self.refresh_lobby_phase();
        if empty {
            self.engine.stop();
        }

        Some(Departure { empty, new_host })
    }

    pub fn can_start(&self) -> bool {
        self.phase == RoomPhase::Ready && self.players.len() >= self.rules.min_players
    }

    /// READY -> BETTING, host only
    pub fn start_betting(&mut self, requester: Uuid) -> Result<(), RoomError> {
        if self.player(requester).is_none() {
            return Err(RoomError::PlayerNotFound);
        }
        if requester != self.host_id {
            return Err(RoomError::NotHost);
        }
        if !self.can_start() {
            return Err(RoomError::CannotStart);
        }

        self.phase = RoomPhase::Betting;
        self.bets.clear();
        self.current_round += 1;
        Ok(())
    }

    /// Validate and record a bet, replacing any earlier bet this round
    pub fn place_bet(&mut self, player_id: Uuid, animal_id: i64, amount: i64) -> Result<Bet, RoomError> {
        if self.phase != RoomPhase::Betting {
            return Err(RoomError::NotBetting);
        }
        let player = self.player(player_id).ok_or(RoomError::PlayerNotFound)?;

        let (min, max) = (self.rules.min_bet, self.rules.max_bet);
        if amount < i64::from(min) || amount > i64::from(max) {
            return Err(RoomError::BetOutOfRange { min, max });
        }
        if amount > i64::from(player.coins) {
            return Err(RoomError::InsufficientCoins);
        }
        if animal_id < 0 || animal_id >= ANIMAL_COUNT as i64 {
            return Err(RoomError::InvalidAnimal);
        }

        let bet = Bet {
            animal_id: animal_id as u8,
            amount: amount as u32,
        };
        self.bets.insert(player_id, bet);
        Ok(bet)
    }

    pub fn all_players_bet(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| self.bets.contains_key(&p.id))
    }

    /// BETTING -> PLAYING: debit every wager and start the simulation
    pub fn start_round(&mut self, now: u64) -> Result<(), RoomError> {
        if self.phase != RoomPhase::Betting {
            return Err(RoomError::NotBetting);
        }

        self.phase = RoomPhase::Playing;
        for player in self.players.iter_mut() {
            if let Some(bet) = self.bets.get(&player.id) {
                player.coins = player.coins.saturating_sub(bet.amount);
            }
        }

        self.engine.start(now);
        Ok(())
    }

    /// Advance the running round
    pub fn tick(&mut self, now: u64) -> Vec<SimEvent> {
        if self.phase != RoomPhase::Playing {
            return Vec::new();
        }
        self.engine.tick(now)
    }

    /// PLAYING -> RESULT, then GAME_OVER if anyone ran out of coins
    pub fn finish_round(&mut self, winning_animal_id: u8) -> RoundSettlement {
        self.phase = RoomPhase::Result;
        self.engine.stop();

        let cut_bps = self.rules.house_cut_bps().min(10_000);
        let mut results = Vec::with_capacity(self.players.len());

        for player in self.players.iter_mut() {
            let Some(bet) = self.bets.get(&player.id).copied() else {
                results.push(PlayerResult {
                    player_id: player.id,
                    player_name: player.name.clone(),
                    won: false,
                    bet_animal_id: None,
                    bet_amount: 0,
                    reward: 0,
                    profit: 0,
                    new_balance: player.coins,
                });
                continue;
            };

            let won = bet.animal_id == winning_animal_id;
            let reward = if won {
                payout(bet.amount, ANIMAL_COUNT as u64, cut_bps)
            } else {
                0
            };
            player.coins = player.coins.saturating_add(reward);

            results.push(PlayerResult {
                player_id: player.id,
                player_name: player.name.clone(),
                won,
                bet_animal_id: Some(bet.animal_id),
                bet_amount: bet.amount,
                reward,
                profit: i64::from(reward) - i64::from(bet.amount),
                new_balance: player.coins,
            });
        }

        let mut eliminated = Vec::new();
        for player in self.players.iter_mut().filter(|p| p.coins == 0) {
            player.eliminated = true;
            eliminated.push(EliminatedPlayer {
                player_id: player.id,
                player_name: player.name.clone(),
            });
        }

        let is_game_over = !eliminated.is_empty();
        if is_game_over {
            self.phase = RoomPhase::GameOver;
        }

        RoundSettlement {
            round: self.current_round,
            winning_animal_id,
            results,
            eliminated,
            is_game_over,
            final_standings: self.final_standings(),
        }
    }

    /// Players by balance, richest first
    pub fn final_standings(&self) -> Vec<FinalStanding> {
        let mut ranked: Vec<&Player> = self.players.iter().collect();
        ranked.sort_by(|a, b| b.coins.cmp(&a.coins));
        ranked
            .into_iter()
            .enumerate()
            .map(|(idx, p)| FinalStanding {
                rank: idx + 1,
                player_id: p.id,
                player_name: p.name.clone(),
                coins: p.coins,
                eliminated: p.eliminated,
            })
            .collect()
    }

    /// RESULT -> READY (or WAITING if the roster shrank). Returns false
    /// when the room was not showing a result.
    pub fn prepare_next_round(&mut self) -> bool {
        if self.phase != RoomPhase::Result {
            return false;
        }
        self.phase = RoomPhase::Ready;
        self.bets.clear();
        self.engine.stop();
        self.refresh_lobby_phase();
        true
    }

    /// +1 hp to the caller's animal. `None` means the cheer was ignored.
    pub fn cheer(&mut self, player_id: Uuid, now: u64) -> Option<ServerMsg> {
        if self.phase != RoomPhase::Playing {
            return None;
        }
        let bet = self.bets.get(&player_id).copied()?;
        let player = self.players.iter_mut().find(|p| p.id == player_id)?;

        if player
            .last_cheer_at
            .is_some_and(|last| now.saturating_sub(last) < CHEER_COOLDOWN_MS)
        {
            return None;
        }
        player.last_cheer_at = Some(now);
        let player_name = player.name.clone();

        let new_hp = self.engine.heal(bet.animal_id, CHEER_HEAL)?;
        let animal = ANIMALS[bet.animal_id as usize];
        let max_hp = self.engine.combatants()[bet.animal_id as usize].max_hp;

        Some(ServerMsg::CheerEffect {
            player_id,
            player_name,
            animal_id: animal.id,
            animal_name: animal.name.to_string(),
            animal_emoji: animal.emoji.to_string(),
            new_hp,
            max_hp,
        })
    }

    /// Room chat line, or `None` for unknown players and blank messages
    pub fn chat(&self, player_id: Uuid, message: &str, timestamp: u64) -> Option<ServerMsg> {
        let player = self.player(player_id)?;
        let message: String = message.trim().chars().take(MAX_CHAT_CHARS).collect();
        if message.is_empty() {
            return None;
        }
        Some(ServerMsg::ChatMessage {
            player_id,
            player_name: player.name.clone(),
            message,
            timestamp,
        })
    }

    fn player_view(&self, player: &Player) -> PlayerView {
        PlayerView {
            id: player.id,
            name: player.name.clone(),
            coins: player.coins,
            is_ready: !player.eliminated && player.coins >= self.rules.min_bet,
            has_bet: self.bets.contains_key(&player.id),
            eliminated: player.eliminated,
        }
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            room_id: self.id.clone(),
            host_id: self.host_id,
            state: self.phase,
            players: self.players.iter().map(|p| self.player_view(p)).collect(),
            current_round: self.current_round,
            player_count: self.players.len(),
            min_players: self.rules.min_players,
            can_start: self.can_start(),
        }
    }

    pub fn listing(&self) -> RoomListing {
        RoomListing {
            room_id: self.id.clone(),
            host_name: self.host_name(),
            player_count: self.players.len(),
            max_players: self.rules.max_players,
        }
    }
}

/// `floor(amount * animals * (1 - cut))` in integer arithmetic
fn payout(amount: u32, animals: u64, cut_bps: u64) -> u32 {
    let reward = u64::from(amount) * animals * (10_000 - cut_bps) / 10_000;
    u32::try_from(reward).unwrap_or(u32::MAX)
}
