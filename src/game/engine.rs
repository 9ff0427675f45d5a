//! Per-round simulation engine and its fixed-rate tick
//!
//! The engine never reads a clock: the owning room passes `now` (monotonic
//! milliseconds) into [`SimulationEngine::tick`]. Every tick runs, in order,
//! motion, item pickups, the pacing nudge, collision resolution, the snapshot
//! and finally the win check, and returns the events it produced in that
//! order.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::config::{GameRules, ANIMALS, ANIMAL_COUNT};

use super::collision::{CollisionResolver, HitReport};
use super::combatant::{Arena, Combatant};
use super::items::{Item, ItemField};
use super::pacing::{force_collision, PacingController};
use super::snapshot::{build_positions, CombatantState};

/// A round still running this long after its longest target is wound up
const RUNAWAY_FACTOR: u64 = 2;

/// Engine parameters taken from the room's rules
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub tick_ms: u64,
    pub arena: Arena,
    pub round_min_ms: u64,
    pub round_max_ms: u64,
    pub items_enabled: bool,
}

impl From<&GameRules> for EngineSettings {
    fn from(rules: &GameRules) -> Self {
        Self {
            tick_ms: rules.tick_ms,
            arena: Arena {
                width: rules.arena_width,
                height: rules.arena_height,
            },
            round_min_ms: rules.round_min_ms,
            round_max_ms: rules.round_max_ms,
            items_enabled: rules.items_enabled,
        }
    }
}

/// Events a tick emits, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Damage {
        first: HitReport,
        second: HitReport,
    },
    AnimalEaten {
        winner: CombatantState,
        loser: CombatantState,
        remaining_count: usize,
    },
    ItemSpawned(Item),
    ItemPickedUp {
        animal_id: u8,
        item: Item,
    },
    Positions(Vec<CombatantState>),
    /// Terminal: exactly one combatant is left
    RoundEnded {
        winner: CombatantState,
        duration_ms: u64,
    },
}

/// Owns one room's eight combatant slots, reset in place every round
pub struct SimulationEngine {
    settings: EngineSettings,
    combatants: [Combatant; ANIMAL_COUNT],
    pacing: PacingController,
    resolver: CollisionResolver,
    items: ItemField,
    rng: ChaCha8Rng,
    running: bool,
    started_at: u64,
}

impl SimulationEngine {
    pub fn new(settings: EngineSettings, seed: u64) -> Self {
        Self {
            settings,
            combatants: ANIMALS.map(Combatant::new),
            pacing: PacingController::new(),
            resolver: CollisionResolver::new(),
            items: ItemField::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            running: false,
            started_at: 0,
        }
    }

    /// Lay the animals out on the starting circle and start pacing.
    /// Any round still running is stopped first.
    pub fn start(&mut self, now: u64) {
        self.stop();

        let arena = self.settings.arena;
        for (idx, combatant) in self.combatants.iter_mut().enumerate() {
            let (x, y) = arena.spawn_point(idx, ANIMAL_COUNT);
            combatant.respawn(x, y, &arena, &mut self.rng);
        }

        self.resolver.reset();
        self.pacing.start(
            now,
            ANIMAL_COUNT,
            self.settings.round_min_ms,
            self.settings.round_max_ms,
            &mut self.rng,
        );
        if self.settings.items_enabled {
            self.items.start(now);
        }

        self.started_at = now;
        self.running = true;

        info!(
            target_duration_ms = self.pacing.target_duration_ms(),
            "Simulation round started"
        );
    }

    /// Stop ticking and cancel the item timer; safe to call repeatedly
    pub fn stop(&mut self) {
        self.running = false;
        self.items.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    #[cfg(test)]
    pub(crate) fn combatants_mut(&mut self) -> &mut [Combatant] {
        &mut self.combatants
    }

    pub fn alive_count(&self) -> usize {
        self.combatants.iter().filter(|c| c.alive).count()
    }

    pub fn positions(&self) -> Vec<CombatantState> {
        build_positions(&self.combatants)
    }

    /// Heal an alive, hurt combatant. Returns the new hp if anything changed.
    pub fn heal(&mut self, animal_id: u8, amount: u32) -> Option<u32> {
        if !self.running {
            return None;
        }
        let combatant = self.combatants.get_mut(animal_id as usize)?;
        if !combatant.alive || combatant.hp >= combatant.max_hp {
            return None;
        }
        Some(combatant.heal(amount))
    }

    /// Run one simulation step
    pub fn tick(&mut self, now: u64) -> Vec<SimEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }

        self.advance_motion(now);

        if self.items.is_active() {
            self.resolve_items(now, &mut events);
        }

        if self.pacing.should_force_collision(now) {
            force_collision(&mut self.combatants);
        }

        self.resolve_collisions(now, &mut events);
        self.enforce_runaway_limit(now, &mut events);

        events.push(SimEvent::Positions(self.positions()));

        let mut alive = self.combatants.iter().filter(|c| c.alive);
        let survivor = match (alive.next(), alive.next()) {
            (Some(last), None) => Some(CombatantState::from(last)),
            _ => None,
        };

        if let Some(winner) = survivor {
            let duration_ms = now.saturating_sub(self.started_at);
            self.stop();

            info!(winner = winner.kind.name, duration_ms, "Simulation round finished");
            events.push(SimEvent::RoundEnded {
                winner,
                duration_ms,
            });
        }

        events
    }

    fn advance_motion(&mut self, now: u64) {
        let bias = self.pacing.center_bias(now);
        let speed = self.pacing.speed_multiplier(now);
        let arena = self.settings.arena;
        let delta_ms = self.settings.tick_ms as f64;

        for combatant in self.combatants.iter_mut().filter(|c| c.alive) {
            combatant.center_bias = bias;
            combatant.advance(delta_ms, &arena, &mut self.rng);
            let buff = combatant.speed_buff_multiplier(now);
            combatant.set_speed(speed * buff);
        }
    }

    fn resolve_items(&mut self, now: u64, events: &mut Vec<SimEvent>) {
        if let Some(item) = self
            .items
            .maybe_spawn(now, &self.settings.arena, &mut self.rng)
        {
            events.push(SimEvent::ItemSpawned(item));
        }

        for (animal_id, item) in self.items.collect_pickups(&mut self.combatants, now) {
            events.push(SimEvent::ItemPickedUp { animal_id, item });
        }
    }

    fn resolve_collisions(&mut self, now: u64, events: &mut Vec<SimEvent>) {
        let alive_before = self.alive_count();
        let outcomes = self
            .resolver
            .resolve(&mut self.combatants, now, &mut self.rng);

        let mut eaten = 0;
        for outcome in outcomes {
            events.push(SimEvent::Damage {
                first: outcome.first,
                second: outcome.second,
            });

            if let Some(death) = outcome.death {
                eaten += 1;
                self.pacing.on_elimination(now);
                events.push(SimEvent::AnimalEaten {
                    winner: CombatantState::from(&self.combatants[death.winner as usize]),
                    loser: CombatantState::from(&self.combatants[death.loser as usize]),
                    remaining_count: alive_before - eaten,
                });
            }
        }
    }

    /// Wind up a round that failed to converge: the strongest alive animal
    /// eats the weakest, one per tick
    fn enforce_runaway_limit(&mut self, now: u64, events: &mut Vec<SimEvent>) {
        let limit = self.settings.round_max_ms * RUNAWAY_FACTOR;
        if now.saturating_sub(self.started_at) <= limit || self.alive_count() < 2 {
            return;
        }

        let alive = || self.combatants.iter().filter(|c| c.alive);
        let strongest = alive().max_by(|a, b| a.hp.cmp(&b.hp).then(b.id.cmp(&a.id)));
        let weakest = alive().min_by(|a, b| a.hp.cmp(&b.hp).then(b.id.cmp(&a.id)));
        let (Some(winner), Some(loser)) = (strongest.map(|c| c.id), weakest.map(|c| c.id)) else {
            return;
        };

        warn!(winner, loser, "Round exceeded runaway limit, resolving elimination");

        let loser_slot = &mut self.combatants[loser as usize];
        loser_slot.hp = 0;
        loser_slot.alive = false;
        self.pacing.on_elimination(now);

        events.push(SimEvent::AnimalEaten {
            winner: CombatantState::from(&self.combatants[winner as usize]),
            loser: CombatantState::from(&self.combatants[loser as usize]),
            remaining_count: self.alive_count(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EngineSettings {
        EngineSettings::from(&GameRules::default())
    }

    /// Tick until the round ends, returning every event and the end time
    fn run_round(engine: &mut SimulationEngine, start: u64) -> (Vec<SimEvent>, u64) {
        let tick = engine.settings.tick_ms;
        let mut now = start;
        let mut all = Vec::new();
        // Runaway limit plus one tick per elimination bounds the loop
        let max_ticks = (engine.settings.round_max_ms * RUNAWAY_FACTOR) / tick + 100;

        for _ in 0..max_ticks {
            now += tick;
            let events = engine.tick(now);
            let ended = events
                .iter()
                .any(|e| matches!(e, SimEvent::RoundEnded { .. }));
            all.extend(events);
            if ended {
                return (all, now);
            }
        }
        panic!("round did not finish within {max_ticks} ticks");
    }

    #[test]
    fn start_lays_out_eight_alive_combatants() {
        let mut engine = SimulationEngine::new(settings(), 1);
        engine.start(0);
        assert!(engine.is_running());
        assert_eq!(engine.alive_count(), 8);
        assert!(engine.combatants().iter().all(|c| c.hp == c.max_hp));
        assert_eq!(engine.positions().len(), 8);
    }

    #[test]
    fn completed_round_leaves_exactly_one_alive() {
        for seed in 0..5 {
            let mut engine = SimulationEngine::new(settings(), seed);
            engine.start(1_000);
            let (events, _) = run_round(&mut engine, 1_000);

            assert_eq!(engine.alive_count(), 1);
            assert!(!engine.is_running());

            let remaining: Vec<usize> = events
                .iter()
                .filter_map(|e| match e {
                    SimEvent::AnimalEaten {
                        remaining_count, ..
                    } => Some(*remaining_count),
                    _ => None,
                })
                .collect();
            assert_eq!(remaining, vec![7, 6, 5, 4, 3, 2, 1]);

            let Some(SimEvent::RoundEnded { winner, .. }) = events.last() else {
                panic!("round end must be the final event");
            };
            let survivor = engine.combatants().iter().find(|c| c.alive).unwrap();
            assert_eq!(winner.id, survivor.id);
            assert!(winner.hp >= 1);
        }
    }

    #[test]
    fn every_tick_ends_with_a_full_snapshot() {
        let mut engine = SimulationEngine::new(settings(), 42);
        engine.start(0);
        for step in 1..=200u64 {
            let events = engine.tick(step * 50);
            let positions = events
                .iter()
                .rposition(|e| matches!(e, SimEvent::Positions(_)))
                .expect("snapshot every tick");
            // Damage and deaths come before the snapshot of the same tick
            assert!(events[positions + 1..]
                .iter()
                .all(|e| matches!(e, SimEvent::RoundEnded { .. })));
            if let SimEvent::Positions(snapshots) = &events[positions] {
                assert_eq!(snapshots.len(), 8);
            }
            if !engine.is_running() {
                break;
            }
        }
    }

    #[test]
    fn stop_is_idempotent_and_freezes_the_round() {
        let mut engine = SimulationEngine::new(settings(), 3);
        engine.start(0);
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
        assert!(engine.tick(50).is_empty());
        assert_eq!(engine.heal(0, 1), None);
    }

    #[test]
    fn restart_resets_slots_in_place() {
        let mut engine = SimulationEngine::new(settings(), 8);
        engine.start(0);
        run_round(&mut engine, 0);
        assert_eq!(engine.alive_count(), 1);

        engine.start(500_000);
        assert_eq!(engine.alive_count(), 8);
        assert!(engine.combatants().iter().all(|c| c.hp == 100 && c.damage_buff.is_none()));
    }

    #[test]
    fn heal_only_tops_up_hurt_alive_animals() {
        let mut engine = SimulationEngine::new(settings(), 5);
        engine.start(0);
        assert_eq!(engine.heal(2, 1), None);

        engine.combatants[2].hp = 50;
        assert_eq!(engine.heal(2, 1), Some(51));
        assert_eq!(engine.heal(99, 1), None);

        engine.combatants[3].alive = false;
        engine.combatants[3].hp = 0;
        assert_eq!(engine.heal(3, 1), None);
    }

    #[test]
    fn runaway_limit_forces_the_round_to_finish() {
        let mut engine = SimulationEngine::new(
            EngineSettings {
                items_enabled: false,
                ..settings()
            },
            13,
        );
        engine.start(0);
        // Jump far past the limit: one elimination per tick from here on
        let far = engine.settings.round_max_ms * RUNAWAY_FACTOR + 1;
        let mut now = far;
        for _ in 0..20 {
            engine.tick(now);
            now += 50;
            if !engine.is_running() {
                break;
            }
        }
        assert!(!engine.is_running());
        assert_eq!(engine.alive_count(), 1);
    }
}
