//! Snapshot building for network transmission
//!
//! The simulation only deals in [`CombatantState`] and [`SimEvent`]; this
//! module turns them into wire messages.

use crate::config::AnimalKind;
use crate::ws::protocol::{CombatantSnapshot, DamageSide, ServerMsg};

use super::collision::HitReport;
use super::combatant::Combatant;
use super::engine::SimEvent;

/// Copy of a combatant taken at a point inside a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatantState {
    pub id: u8,
    pub kind: AnimalKind,
    pub x: f32,
    pub y: f32,
    pub alive: bool,
    pub hp: u32,
    pub max_hp: u32,
}

impl From<&Combatant> for CombatantState {
    fn from(c: &Combatant) -> Self {
        Self {
            id: c.id,
            kind: c.kind,
            x: c.x,
            y: c.y,
            alive: c.alive,
            hp: c.hp,
            max_hp: c.max_hp,
        }
    }
}

impl From<&CombatantState> for CombatantSnapshot {
    fn from(c: &CombatantState) -> Self {
        Self {
            id: c.id,
            kind: c.kind.kind.to_string(),
            name: c.kind.name.to_string(),
            emoji: c.kind.emoji.to_string(),
            x: c.x,
            y: c.y,
            is_alive: c.alive,
            hp: c.hp,
            max_hp: c.max_hp,
        }
    }
}

impl From<HitReport> for DamageSide {
    fn from(hit: HitReport) -> Self {
        Self {
            id: hit.id,
            damage: hit.damage,
            hp: hit.hp,
            max_hp: hit.max_hp,
        }
    }
}

/// Full state of every combatant, dead ones included, in id order
pub fn build_positions(combatants: &[Combatant]) -> Vec<CombatantState> {
    combatants.iter().map(CombatantState::from).collect()
}

impl SimEvent {
    /// Room broadcast for this event; the round end is settled by the room
    pub fn into_server_msg(self) -> Option<ServerMsg> {
        let msg = match self {
            Self::Damage { first, second } => ServerMsg::Damage {
                animal1: first.into(),
                animal2: second.into(),
            },
            Self::AnimalEaten {
                winner,
                loser,
                remaining_count,
            } => ServerMsg::AnimalEaten {
                winner: CombatantSnapshot::from(&winner),
                loser: CombatantSnapshot::from(&loser),
                remaining_count,
            },
            Self::ItemSpawned(item) => ServerMsg::ItemSpawn { item },
            Self::ItemPickedUp { animal_id, item } => ServerMsg::ItemPickup { animal_id, item },
            Self::Positions(states) => ServerMsg::PositionUpdate {
                positions: states.iter().map(CombatantSnapshot::from).collect(),
            },
            Self::RoundEnded { .. } => return None,
        };
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANIMALS;

    fn state(id: u8, hp: u32) -> CombatantState {
        CombatantState {
            id,
            kind: ANIMALS[id as usize],
            x: 1.0,
            y: 2.0,
            alive: hp > 0,
            hp,
            max_hp: 100,
        }
    }

    #[test]
    fn events_map_to_wire_messages() {
        let eaten = SimEvent::AnimalEaten {
            winner: state(0, 40),
            loser: state(7, 0),
            remaining_count: 3,
        };
        let Some(ServerMsg::AnimalEaten {
            winner,
            loser,
            remaining_count,
        }) = eaten.into_server_msg()
        else {
            panic!("expected animal_eaten");
        };
        assert_eq!(winner.kind, "lion");
        assert_eq!(loser.name, "Crocodile");
        assert!(!loser.is_alive);
        assert_eq!(remaining_count, 3);

        let hit = HitReport {
            id: 2,
            damage: 20,
            hp: 80,
            max_hp: 100,
        };
        let damage = SimEvent::Damage {
            first: hit,
            second: HitReport { id: 5, ..hit },
        };
        let Some(ServerMsg::Damage { animal1, animal2 }) = damage.into_server_msg() else {
            panic!("expected damage");
        };
        assert_eq!((animal1.id, animal1.damage, animal1.hp), (2, 20, 80));
        assert_eq!(animal2.id, 5);
    }

    #[test]
    fn round_end_is_not_broadcast_directly() {
        let ended = SimEvent::RoundEnded {
            winner: state(3, 12),
            duration_ms: 55_000,
        };
        assert!(ended.into_server_msg().is_none());
    }
}
