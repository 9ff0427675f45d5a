//! Room task and its handle
//!
//! Each room runs as one tokio task that exclusively owns its
//! [`RoomStateMachine`]. Requests arrive over an mpsc channel and are
//! answered through oneshot replies; everything the room tells its players
//! goes out on a broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{GameRules, ANIMALS};
use crate::game::SimEvent;
use crate::util::time::{unix_millis, RoomClock};
use crate::ws::protocol::{CombatantSnapshot, RoomListing, RoomView, ServerMsg};
use crate::ws::session::Outbound;

use super::registry::LobbyFeed;
use super::state::{Bet, Departure, RoomPhase, RoomStateMachine};
use super::RoomError;

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// Requests a room task serves
pub enum RoomCommand {
    Join {
        player_id: Uuid,
        player_name: String,
        reply: oneshot::Sender<Result<RoomView, RoomError>>,
    },
    Leave {
        player_id: Uuid,
        reply: oneshot::Sender<Option<Departure>>,
    },
    StartGame {
        player_id: Uuid,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// `confirm` receives `bet_confirmed` before anything the bet triggers
    PlaceBet {
        player_id: Uuid,
        animal_id: i64,
        amount: i64,
        confirm: mpsc::Sender<Outbound>,
        reply: oneshot::Sender<Result<Bet, RoomError>>,
    },
    Cheer {
        player_id: Uuid,
    },
    Chat {
        player_id: Uuid,
        message: String,
    },
    Snapshot {
        reply: oneshot::Sender<RoomView>,
    },
}

/// Lobby-facing view of a room, readable without a round trip to its task
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub phase: RoomPhase,
    pub listing: RoomListing,
}

impl RoomSummary {
    fn of(room: &RoomStateMachine) -> Self {
        Self {
            phase: room.phase(),
            listing: room.listing(),
        }
    }

    fn lobby_key(&self) -> (bool, usize, &str) {
        (
            self.phase.is_lobby(),
            self.listing.player_count,
            &self.listing.host_name,
        )
    }
}

/// Cheap, cloneable handle to a running room
#[derive(Clone, Debug)]
pub struct RoomHandle {
    pub id: String,
    commands: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<ServerMsg>,
    summary: Arc<RwLock<RoomSummary>>,
}

impl RoomHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events.subscribe()
    }

    pub fn summary(&self) -> RoomSummary {
        self.summary.read().clone()
    }

    /// A room whose task has exited is gone for good
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| RoomError::RoomNotFound)?;
        rx.await.map_err(|_| RoomError::RoomNotFound)
    }

    pub async fn join(&self, player_id: Uuid, player_name: String) -> Result<RoomView, RoomError> {
        self.request(|reply| RoomCommand::Join {
            player_id,
            player_name,
            reply,
        })
        .await?
    }

    pub async fn leave(&self, player_id: Uuid) -> Result<Option<Departure>, RoomError> {
        self.request(|reply| RoomCommand::Leave { player_id, reply })
            .await
    }

    pub async fn start_game(&self, player_id: Uuid) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StartGame { player_id, reply })
            .await?
    }

    pub async fn place_bet(
        &self,
        player_id: Uuid,
        animal_id: i64,
        amount: i64,
        confirm: &mpsc::Sender<Outbound>,
    ) -> Result<Bet, RoomError> {
        let confirm = confirm.clone();
        self.request(|reply| RoomCommand::PlaceBet {
            player_id,
            animal_id,
            amount,
            confirm,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<RoomView, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    /// Fire and forget; cheers for a vanished room are dropped
    pub async fn cheer(&self, player_id: Uuid) {
        let _ = self.commands.send(RoomCommand::Cheer { player_id }).await;
    }

    pub async fn chat(&self, player_id: Uuid, message: String) {
        let _ = self
            .commands
            .send(RoomCommand::Chat { player_id, message })
            .await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The task that owns one room
pub struct RoomTask {
    room: RoomStateMachine,
    commands: mpsc::Receiver<RoomCommand>,
    events: broadcast::Sender<ServerMsg>,
    summary: Arc<RwLock<RoomSummary>>,
    lobby: LobbyFeed,
    clock: RoomClock,
    ticker: Interval,
    betting_deadline: Instant,
    resume_at: Instant,
}

impl RoomTask {
    /// Create a room with its host and the handle used to reach it
    pub fn new(
        id: String,
        host_id: Uuid,
        host_name: String,
        rules: GameRules,
        seed: u64,
        lobby: LobbyFeed,
    ) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let tick = Duration::from_millis(rules.tick_ms.max(1));
        let room = RoomStateMachine::new(id.clone(), host_id, host_name, rules, seed);
        let summary = Arc::new(RwLock::new(RoomSummary::of(&room)));

        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let handle = RoomHandle {
            id,
            commands: command_tx,
            events: event_tx.clone(),
            summary: summary.clone(),
        };

        let now = Instant::now();
        let task = Self {
            room,
            commands: command_rx,
            events: event_tx,
            summary,
            lobby,
            clock: RoomClock::new(),
            ticker,
            betting_deadline: now,
            resume_at: now,
        };

        (task, handle)
    }

    /// Serve the room until its last player leaves
    pub async fn run(mut self) {
        info!(room_id = %self.room.id(), "Room task started");

        loop {
            let phase = self.room.phase();
            let betting_deadline = self.betting_deadline;
            let resume_at = self.resume_at;

            let flow = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => Flow::Stop,
                },
                _ = self.ticker.tick(), if phase == RoomPhase::Playing => {
                    self.on_tick();
                    Flow::Continue
                }
                _ = sleep_until(betting_deadline), if phase == RoomPhase::Betting => {
                    debug!(room_id = %self.room.id(), "Betting time elapsed");
                    self.begin_round();
                    Flow::Continue
                }
                _ = sleep_until(resume_at), if phase == RoomPhase::Result => {
                    self.on_round_end_delay();
                    Flow::Continue
                }
            };

            if flow == Flow::Stop {
                break;
            }
        }

        info!(room_id = %self.room.id(), "Room task stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join {
                player_id,
                player_name,
                reply,
            } => {
                let result = self.room.add_player(player_id, player_name);
                if let Ok(player) = &result {
                    info!(room_id = %self.room.id(), player_id = %player_id, "Player joined room");
                    self.broadcast(ServerMsg::PlayerJoined {
                        player: player.clone(),
                    });
                    self.broadcast_room_update();
                    self.sync_summary();
                }
                let _ = reply.send(result.map(|_| self.room.view()));
            }

            RoomCommand::Leave { player_id, reply } => {
                let departure = self.room.remove_player(player_id);
                let _ = reply.send(departure);

                if let Some(departure) = departure {
                    info!(room_id = %self.room.id(), player_id = %player_id, "Player left room");
                    if departure.empty {
                        return Flow::Stop;
                    }
                    if let Some(host) = departure.new_host {
                        info!(room_id = %self.room.id(), host_id = %host, "Host reassigned");
                    }

                    self.broadcast(ServerMsg::PlayerLeft { player_id });
                    self.broadcast_room_update();
                    self.sync_summary();

                    if self.room.phase() == RoomPhase::Betting && self.room.all_players_bet() {
                        self.begin_round();
                    }
                }
            }

            RoomCommand::StartGame { player_id, reply } => {
                let result = self.room.start_betting(player_id);
                if result.is_ok() {
                    self.open_betting();
                }
                let _ = reply.send(result);
            }

            RoomCommand::PlaceBet {
                player_id,
                animal_id,
                amount,
                confirm,
                reply,
            } => {
                let result = self.room.place_bet(player_id, animal_id, amount);
                if let Ok(bet) = &result {
                    let confirmed = ServerMsg::BetConfirmed {
                        bet: *bet,
                        animal: ANIMALS[bet.animal_id as usize],
                    };
                    if confirm.try_send(Outbound::Direct(confirmed)).is_err() {
                        warn!(room_id = %self.room.id(), player_id = %player_id, "Bet confirmation dropped");
                    }

                    self.broadcast_room_update();
                    if self.room.all_players_bet() {
                        self.begin_round();
                    }
                }
                let _ = reply.send(result);
            }

            RoomCommand::Cheer { player_id } => {
                if let Some(effect) = self.room.cheer(player_id, self.clock.now_ms()) {
                    self.broadcast(effect);
                }
            }

            RoomCommand::Chat { player_id, message } => {
                if let Some(line) = self.room.chat(player_id, &message, unix_millis()) {
                    self.broadcast(line);
                }
            }

            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.room.view());
            }
        }

        Flow::Continue
    }

    fn open_betting(&mut self) {
        let betting_time = self.room.rules().betting_time_ms;
        self.betting_deadline = self.clock.instant_at(self.clock.now_ms() + betting_time);

        info!(
            room_id = %self.room.id(),
            round = self.room.current_round(),
            "Betting started"
        );

        self.broadcast(ServerMsg::BettingStart {
            room: self.room.view(),
            betting_time,
            animals: ANIMALS.to_vec(),
        });
        self.sync_summary();
    }

    /// BETTING -> PLAYING, from the deadline or once every player has bet
    fn begin_round(&mut self) {
        if self.room.start_round(self.clock.now_ms()).is_err() {
            return;
        }
        self.ticker.reset();

        info!(
            room_id = %self.room.id(),
            round = self.room.current_round(),
            "Round started"
        );

        self.broadcast(ServerMsg::GameStart {
            room: self.room.view(),
            animals: ANIMALS.to_vec(),
        });
        if let Some(msg) = SimEvent::Positions(self.room.engine().positions()).into_server_msg() {
            self.broadcast(msg);
        }
        self.sync_summary();
    }

    fn on_tick(&mut self) {
        let events = self.room.tick(self.clock.now_ms());

        for event in events {
            match event {
                SimEvent::RoundEnded {
                    winner,
                    duration_ms,
                } => {
                    let settlement = self.room.finish_round(winner.id);
                    info!(
                        room_id = %self.room.id(),
                        round = settlement.round,
                        winner = winner.kind.name,
                        game_over = settlement.is_game_over,
                        "Round settled"
                    );

                    self.broadcast(ServerMsg::GameResult {
                        winner: CombatantSnapshot::from(&winner),
                        duration: duration_ms,
                        round: settlement.round,
                        winning_animal_id: settlement.winning_animal_id,
                        results: settlement.results,
                        eliminated: settlement.eliminated.clone(),
                        is_game_over: settlement.is_game_over,
                    });

                    if settlement.is_game_over {
                        self.broadcast(ServerMsg::GameOver {
                            eliminated: settlement.eliminated,
                            final_results: settlement.final_standings,
                        });
                    } else {
                        let delay = self.room.rules().round_end_delay_ms;
                        self.resume_at = self.clock.instant_at(self.clock.now_ms() + delay);
                    }
                    self.sync_summary();
                }
                other => {
                    if let Some(msg) = other.into_server_msg() {
                        self.broadcast(msg);
                    }
                }
            }
        }
    }

    fn on_round_end_delay(&mut self) {
        if self.room.prepare_next_round() {
            self.broadcast_room_update();
            self.sync_summary();
        }
    }

    fn broadcast(&self, msg: ServerMsg) {
        // No subscribers is fine, the simulation keeps going
        let _ = self.events.send(msg);
    }

    fn broadcast_room_update(&self) {
        self.broadcast(ServerMsg::RoomUpdate {
            room: self.room.view(),
        });
    }

    /// Refresh the shared summary and push the lobby when discovery changed
    fn sync_summary(&self) {
        let next = RoomSummary::of(&self.room);
        let changed = {
            let mut current = self.summary.write();
            let changed = current.lobby_key() != next.lobby_key();
            *current = next;
            changed
        };
        if changed {
            self.lobby.publish();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::RecvError;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::room::registry::RoomRegistry;

    async fn next_matching<F>(rx: &mut broadcast::Receiver<ServerMsg>, mut pred: F) -> ServerMsg
    where
        F: FnMut(&ServerMsg) -> bool,
    {
        loop {
            match rx.recv().await {
                Ok(msg) if pred(&msg) => return msg,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("room closed"),
            }
        }
    }

    fn bettor() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(16)
    }

    async fn ready_room(registry: &RoomRegistry) -> (RoomHandle, Vec<Uuid>) {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let handle = assert_ok!(registry.create_room(ids[0], "host"));
        for id in &ids[1..] {
            assert_ok!(registry.join_room(*id, &handle.id, "guest").await);
        }
        (handle, ids)
    }

    #[tokio::test(start_paused = true)]
    async fn full_round_runs_to_a_result_and_back_to_ready() {
        let registry = RoomRegistry::new(GameRules::default());
        let (handle, ids) = ready_room(&registry).await;
        let mut events = handle.subscribe();

        let (confirm, _confirmed) = bettor();

        assert_ok!(handle.start_game(ids[0]).await);
        for (i, id) in ids.iter().enumerate() {
            assert_ok!(handle.place_bet(*id, i as i64, 50, &confirm).await);
        }

        let start = next_matching(&mut events, |m| matches!(m, ServerMsg::GameStart { .. })).await;
        let ServerMsg::GameStart { room, .. } = start else {
            unreachable!()
        };
        assert_eq!(room.state, RoomPhase::Playing);
        assert!(room.players.iter().all(|p| p.coins == 250));

        let result = next_matching(&mut events, |m| matches!(m, ServerMsg::GameResult { .. })).await;
        let ServerMsg::GameResult {
            winner,
            round,
            winning_animal_id,
            results,
            is_game_over,
            ..
        } = result
        else {
            unreachable!()
        };
        assert_eq!(round, 1);
        assert_eq!(winner.id, winning_animal_id);
        assert!(!is_game_over);
        assert_eq!(results.len(), 3);
        for r in &results {
            let expected = if r.won { 250 + 380 } else { 250 };
            assert_eq!(r.new_balance, expected);
        }

        let update = next_matching(&mut events, |m| matches!(m, ServerMsg::RoomUpdate { .. })).await;
        let ServerMsg::RoomUpdate { room } = update else {
            unreachable!()
        };
        assert_eq!(room.state, RoomPhase::Ready);
        assert!(room.players.iter().all(|p| !p.has_bet));
    }

    #[tokio::test(start_paused = true)]
    async fn betting_deadline_starts_the_round_without_all_bets() {
        let registry = RoomRegistry::new(GameRules::default());
        let (handle, ids) = ready_room(&registry).await;
        let mut events = handle.subscribe();

        let (confirm, mut confirmed) = bettor();

        assert_ok!(handle.start_game(ids[0]).await);
        assert_ok!(handle.place_bet(ids[1], 2, 20, &confirm).await);
        assert!(matches!(
            confirmed.try_recv(),
            Ok(Outbound::Direct(ServerMsg::BetConfirmed { .. }))
        ));

        let start = next_matching(&mut events, |m| matches!(m, ServerMsg::GameStart { .. })).await;
        let ServerMsg::GameStart { room, .. } = start else {
            unreachable!()
        };
        assert_eq!(room.state, RoomPhase::Playing);
        assert_eq!(room.players[1].coins, 280);
        assert_eq!(room.players[0].coins, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn all_bets_start_the_round_without_waiting() {
        let registry = RoomRegistry::new(GameRules::default());
        let (handle, ids) = ready_room(&registry).await;
        let (confirm, _confirmed) = bettor();

        assert_ok!(handle.start_game(ids[0]).await);
        let before = Instant::now();
        for (i, id) in ids.iter().enumerate() {
            assert_ok!(handle.place_bet(*id, i as i64, 10, &confirm).await);
        }

        let view = assert_ok!(handle.snapshot().await);
        assert_eq!(view.state, RoomPhase::Playing);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn bet_confirmation_is_queued_before_game_start() {
        let registry = RoomRegistry::new(GameRules::default());
        let (handle, ids) = ready_room(&registry).await;
        let (confirm, mut confirmed) = bettor();

        assert_ok!(handle.start_game(ids[0]).await);
        assert_ok!(handle.place_bet(ids[0], 0, 10, &confirm).await);
        assert_ok!(handle.place_bet(ids[1], 1, 10, &confirm).await);
        while confirmed.try_recv().is_ok() {}

        let mut events = handle.subscribe();
        assert_ok!(handle.place_bet(ids[2], 2, 10, &confirm).await);

        let Ok(Outbound::Direct(ServerMsg::BetConfirmed { bet, .. })) = confirmed.try_recv() else {
            panic!("expected bet_confirmed");
        };
        assert_eq!(bet.animal_id, 2);
        let started = std::iter::from_fn(|| events.try_recv().ok())
            .any(|m| matches!(m, ServerMsg::GameStart { .. }));
        assert!(started);
    }

    #[tokio::test]
    async fn rejected_requests_leave_the_room_unchanged() {
        let registry = RoomRegistry::new(GameRules::default());
        let (handle, ids) = ready_room(&registry).await;

        assert_eq!(assert_err!(handle.start_game(ids[1]).await), RoomError::NotHost);
        let (confirm, mut confirmed) = bettor();
        assert_eq!(
            assert_err!(handle.place_bet(ids[0], 1, 50, &confirm).await),
            RoomError::NotBetting
        );
        assert!(confirmed.try_recv().is_err());

        let view = assert_ok!(handle.snapshot().await);
        assert_eq!(view.state, RoomPhase::Ready);
        assert_eq!(view.current_round, 0);
    }

    #[tokio::test]
    async fn chat_is_broadcast_to_the_room() {
        let registry = RoomRegistry::new(GameRules::default());
        let (handle, ids) = ready_room(&registry).await;
        let mut events = handle.subscribe();

        handle.chat(ids[1], "  hello  ".to_string()).await;
        let msg = next_matching(&mut events, |m| matches!(m, ServerMsg::ChatMessage { .. })).await;
        let ServerMsg::ChatMessage {
            player_id, message, ..
        } = msg
        else {
            unreachable!()
        };
        assert_eq!(player_id, ids[1]);
        assert_eq!(message, "hello");
    }

    #[tokio::test]
    async fn last_leave_stops_the_task() {
        let registry = RoomRegistry::new(GameRules::default());
        let host = Uuid::new_v4();
        let handle = assert_ok!(registry.create_room(host, "solo"));

        let departure = assert_ok!(handle.leave(host).await).unwrap();
        assert!(departure.empty);

        assert_eq!(
            assert_err!(handle.join(Uuid::new_v4(), "late".into()).await),
            RoomError::RoomNotFound
        );
    }
}
