//! Item pickups spawned during a round

use rand::Rng;
use serde::Serialize;

use super::combatant::{Arena, Combatant, SpeedBuff};

pub const ITEM_SIZE: f32 = 30.0;
pub const MAX_ITEMS: usize = 3;
pub const ITEM_SPAWN_INTERVAL_MS: u64 = 5_000;
/// Items never spawn closer than this to a wall
const SPAWN_MARGIN: f32 = 50.0;

const HEAL_AMOUNT: u32 = 30;
const SPEED_MULTIPLIER: f32 = 1.5;
const SPEED_DURATION_MS: u64 = 5_000;
const DAMAGE_MULTIPLIER: f32 = 1.5;
const SHIELD_REDUCTION: f32 = 0.5;

/// What an item does to the animal that picks it up
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ItemEffect {
    Health { amount: u32 },
    Speed { multiplier: f32, duration_ms: u64 },
    Damage { multiplier: f32 },
    Shield { reduction: f32 },
}

impl ItemEffect {
    fn random<R: Rng>(rng: &mut R) -> Self {
        match rng.gen_range(0..4) {
            0 => Self::Health {
                amount: HEAL_AMOUNT,
            },
            1 => Self::Speed {
                multiplier: SPEED_MULTIPLIER,
                duration_ms: SPEED_DURATION_MS,
            },
            2 => Self::Damage {
                multiplier: DAMAGE_MULTIPLIER,
            },
            _ => Self::Shield {
                reduction: SHIELD_REDUCTION,
            },
        }
    }

    pub fn apply(&self, combatant: &mut Combatant, now: u64) {
        match *self {
            Self::Health { amount } => {
                combatant.heal(amount);
            }
            Self::Speed {
                multiplier,
                duration_ms,
            } => {
                combatant.speed_buff = Some(SpeedBuff {
                    multiplier,
                    expires_at: now + duration_ms,
                });
            }
            Self::Damage { multiplier } => combatant.damage_buff = Some(multiplier),
            Self::Shield { reduction } => combatant.shield = Some(reduction),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: u32,
    #[serde(flatten)]
    pub effect: ItemEffect,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

/// Items on the field plus the spawn timer
#[derive(Debug, Default)]
pub struct ItemField {
    items: Vec<Item>,
    next_id: u32,
    next_spawn_at: Option<u64>,
}

impl ItemField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, now: u64) {
        self.items.clear();
        self.next_spawn_at = Some(now + ITEM_SPAWN_INTERVAL_MS);
    }

    /// Cancel the spawn timer and clear the field; safe to repeat
    pub fn stop(&mut self) {
        self.items.clear();
        self.next_spawn_at = None;
    }

    #[cfg(test)]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn is_active(&self) -> bool {
        self.next_spawn_at.is_some()
    }

    /// Spawn one item when the timer is due and the field is not full
    pub fn maybe_spawn<R: Rng>(&mut self, now: u64, arena: &Arena, rng: &mut R) -> Option<Item> {
        let due = self.next_spawn_at?;
        if now < due {
            return None;
        }
        self.next_spawn_at = Some(now + ITEM_SPAWN_INTERVAL_MS);

        if self.items.len() >= MAX_ITEMS {
            return None;
        }

        self.next_id += 1;
        let item = Item {
            id: self.next_id,
            effect: ItemEffect::random(rng),
            x: rng.gen_range(SPAWN_MARGIN..(arena.width - SPAWN_MARGIN)),
            y: rng.gen_range(SPAWN_MARGIN..(arena.height - SPAWN_MARGIN)),
            size: ITEM_SIZE,
        };
        self.items.push(item.clone());
        Some(item)
    }

    /// Hand items to the alive combatants touching them
    pub fn collect_pickups(&mut self, combatants: &mut [Combatant], now: u64) -> Vec<(u8, Item)> {
        let mut picked = Vec::new();

        for combatant in combatants.iter_mut().filter(|c| c.alive) {
            let reach = |item: &Item| {
                let dx = item.x - combatant.x;
                let dy = item.y - combatant.y;
                (dx * dx + dy * dy).sqrt() < (combatant.size + item.size) / 2.0
            };

            if let Some(idx) = self.items.iter().position(reach) {
                let item = self.items.remove(idx);
                item.effect.apply(combatant, now);
                picked.push((combatant.id, item));
            }
        }

        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANIMALS;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const ARENA: Arena = Arena {
        width: 800.0,
        height: 600.0,
    };

    #[test]
    fn spawns_on_timer_up_to_the_cap() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut field = ItemField::new();
        field.start(0);

        assert!(field.maybe_spawn(4_999, &ARENA, &mut rng).is_none());
        let mut now = 5_000;
        for _ in 0..MAX_ITEMS {
            let item = field.maybe_spawn(now, &ARENA, &mut rng).expect("spawn due");
            assert!(item.x >= SPAWN_MARGIN && item.x < ARENA.width - SPAWN_MARGIN);
            now += ITEM_SPAWN_INTERVAL_MS;
        }
        assert!(field.maybe_spawn(now, &ARENA, &mut rng).is_none());
        assert_eq!(field.items().len(), MAX_ITEMS);
    }

    #[test]
    fn stop_is_idempotent_and_cancels_spawning() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut field = ItemField::new();
        field.start(0);
        field.stop();
        field.stop();
        assert!(!field.is_active());
        assert!(field.maybe_spawn(60_000, &ARENA, &mut rng).is_none());
    }

    #[test]
    fn pickup_applies_effect_and_removes_item() {
        let mut field = ItemField::new();
        field.items.push(Item {
            id: 1,
            effect: ItemEffect::Health { amount: 30 },
            x: 200.0,
            y: 200.0,
            size: ITEM_SIZE,
        });
        field.items.push(Item {
            id: 2,
            effect: ItemEffect::Shield { reduction: 0.5 },
            x: 600.0,
            y: 400.0,
            size: ITEM_SIZE,
        });

        let mut animals: Vec<Combatant> = ANIMALS.iter().map(|k| Combatant::new(*k)).collect();
        for c in animals.iter_mut() {
            c.x = 50.0;
            c.y = 50.0;
        }
        animals[2].x = 210.0;
        animals[2].y = 200.0;
        animals[2].hp = 90;

        let picked = field.collect_pickups(&mut animals, 0);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].0, 2);
        assert_eq!(animals[2].hp, 100);
        assert_eq!(field.items().len(), 1);
    }

    #[test]
    fn speed_item_grants_timed_buff() {
        let mut c = Combatant::new(ANIMALS[0]);
        ItemEffect::Speed {
            multiplier: 1.5,
            duration_ms: 5_000,
        }
        .apply(&mut c, 1_000);
        assert_eq!(
            c.speed_buff,
            Some(SpeedBuff {
                multiplier: 1.5,
                expires_at: 6_000
            })
        );
    }

    #[test]
    fn item_serializes_flat_with_type_tag() {
        let item = Item {
            id: 7,
            effect: ItemEffect::Damage { multiplier: 1.5 },
            x: 1.0,
            y: 2.0,
            size: ITEM_SIZE,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "damage");
        assert_eq!(json["multiplier"], 1.5);
        assert_eq!(json["id"], 7);
    }
}
