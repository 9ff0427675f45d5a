//! Collision resolution - hit detection, damage, death adjudication, bounce

use std::collections::HashMap;

use rand::Rng;

use super::combatant::Combatant;

/// Raw damage per hit, inclusive
pub const MIN_DAMAGE: u32 = 15;
pub const MAX_DAMAGE: u32 = 35;
/// A pair cannot resolve twice within this window
pub const COLLISION_COOLDOWN_MS: u64 = 500;

/// Damage one side took in a collision, and where that left it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitReport {
    pub id: u8,
    /// After modifiers
    pub damage: u32,
    pub hp: u32,
    pub max_hp: u32,
}

/// Outcome of one resolved collision
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionOutcome {
    pub first: HitReport,
    pub second: HitReport,
    pub death: Option<Death>,
}

/// Ids of the surviving and the eaten combatant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Death {
    pub winner: u8,
    pub loser: u8,
}

/// Detects and resolves combatant collisions, tracking per-pair cooldowns
#[derive(Debug, Default)]
pub struct CollisionResolver {
    /// Sorted id pair -> time the cooldown ends
    cooldowns: HashMap<(u8, u8), u64>,
}

impl CollisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.cooldowns.clear();
    }

    /// Circle overlap using combined half-sizes
    pub fn is_colliding(a: &Combatant, b: &Combatant) -> bool {
        a.distance_to(b) < (a.size + b.size) / 2.0
    }

    pub fn is_on_cooldown(&self, a: u8, b: u8, now: u64) -> bool {
        self.cooldowns
            .get(&pair_key(a, b))
            .is_some_and(|&ends_at| now < ends_at)
    }

    fn start_cooldown(&mut self, a: u8, b: u8, now: u64) {
        self.cooldowns
            .insert(pair_key(a, b), now + COLLISION_COOLDOWN_MS);
    }

    /// Resolve every colliding pair of alive combatants, in pair order
    pub fn resolve<R: Rng>(
        &mut self,
        combatants: &mut [Combatant],
        now: u64,
        rng: &mut R,
    ) -> Vec<CollisionOutcome> {
        let mut outcomes = Vec::new();

        for i in 0..combatants.len() {
            for j in (i + 1)..combatants.len() {
                let (a, b) = pair_mut(combatants, i, j);

                // Re-checked per pair: a combatant eaten earlier this tick is out
                if !a.alive || !b.alive {
                    continue;
                }
                if !Self::is_colliding(a, b) || self.is_on_cooldown(a.id, b.id, now) {
                    continue;
                }

                outcomes.push(exchange_blows(a, b, rng));
                bounce(a, b);
                self.start_cooldown(a.id, b.id, now);
            }
        }

        outcomes
    }
}

/// Draw a raw damage roll
pub fn roll_damage<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(MIN_DAMAGE..=MAX_DAMAGE)
}

/// Both sides hit each other; one-shot buffs are consumed here
fn exchange_blows<R: Rng>(a: &mut Combatant, b: &mut Combatant, rng: &mut R) -> CollisionOutcome {
    let mut to_a = roll_damage(rng) as f32;
    let mut to_b = roll_damage(rng) as f32;

    // Outgoing buffs first, then the receiver's shield
    if let Some(buff) = b.damage_buff.take() {
        to_a *= buff;
    }
    if let Some(buff) = a.damage_buff.take() {
        to_b *= buff;
    }
    if let Some(shield) = a.shield.take() {
        to_a *= 1.0 - shield;
    }
    if let Some(shield) = b.shield.take() {
        to_b *= 1.0 - shield;
    }

    let to_a = to_a.floor().max(0.0) as u32;
    let to_b = to_b.floor().max(0.0) as u32;

    a.take_damage(to_a);
    b.take_damage(to_b);

    let first = HitReport {
        id: a.id,
        damage: to_a,
        hp: a.hp,
        max_hp: a.max_hp,
    };
    let second = HitReport {
        id: b.id,
        damage: to_b,
        hp: b.hp,
        max_hp: b.max_hp,
    };

    CollisionOutcome {
        first,
        second,
        death: adjudicate(a, b, rng),
    }
}

/// Decide who is eaten when at least one side is out of hp.
/// On a double knockout the winner is revived to 1 hp.
fn adjudicate<R: Rng>(a: &mut Combatant, b: &mut Combatant, rng: &mut R) -> Option<Death> {
    let (winner, loser) = match (a.is_dead(), b.is_dead()) {
        (false, false) => return None,
        (true, false) => (b, a),
        (false, true) => (a, b),
        (true, true) => {
            let a_wins = match a.hp.cmp(&b.hp) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => rng.gen_bool(0.5),
            };
            let (winner, loser) = if a_wins { (a, b) } else { (b, a) };
            winner.hp = 1;
            (winner, loser)
        }
    };

    loser.alive = false;
    Some(Death {
        winner: winner.id,
        loser: loser.id,
    })
}

/// Push both apart at twice their max speed and remove any overlap
pub fn bounce(a: &mut Combatant, b: &mut Combatant) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dist = (dx * dx + dy * dy).sqrt();
    let dist = if dist > 0.0 { dist } else { 1.0 };

    let nx = dx / dist;
    let ny = dy / dist;

    a.vx = -nx * a.max_speed * 2.0;
    a.vy = -ny * a.max_speed * 2.0;
    b.vx = nx * b.max_speed * 2.0;
    b.vy = ny * b.max_speed * 2.0;

    let overlap = (a.size + b.size) / 2.0 - dist;
    if overlap > 0.0 {
        let push = overlap / 2.0;
        a.x -= nx * push;
        a.y -= ny * push;
        b.x += nx * push;
        b.y += ny * push;
    }
}

fn pair_key(a: u8, b: u8) -> (u8, u8) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Two distinct mutable elements, `i < j`
pub(crate) fn pair_mut<T>(items: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    debug_assert!(i < j);
    let (left, right) = items.split_at_mut(j);
    (&mut left[i], &mut right[0])
}
