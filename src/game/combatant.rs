//! Animal combatant state and wandering motion

use rand::Rng;

use crate::config::AnimalKind;

/// Combatant diameter in arena units
pub const ANIMAL_SIZE: f32 = 50.0;
/// Base speed in arena units per tick
pub const MAX_SPEED: f32 = 5.0;
pub const MAX_HP: u32 = 100;
/// Radius of the starting circle
pub const SPAWN_RADIUS: f32 = 180.0;
const INITIAL_CENTER_BIAS: f32 = 0.3;
/// Heading changes every 500..2000 ms
const DIRECTION_CHANGE_MIN_MS: f64 = 500.0;
const DIRECTION_CHANGE_JITTER_MS: f64 = 1_500.0;

/// Rectangular arena, origin at the top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
}

impl Arena {
    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Position of slot `index` out of `count` on the starting circle
    pub fn spawn_point(&self, index: usize, count: usize) -> (f32, f32) {
        let (cx, cy) = self.center();
        let radius = SPAWN_RADIUS.min(self.width.min(self.height) / 2.0 - ANIMAL_SIZE);
        let angle = index as f32 / count.max(1) as f32 * std::f32::consts::TAU;
        (cx + angle.cos() * radius, cy + angle.sin() * radius)
    }
}

/// Timed speed multiplier granted by an item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedBuff {
    pub multiplier: f32,
    pub expires_at: u64,
}

/// One animal's physical and combat state for a round
#[derive(Debug, Clone)]
pub struct Combatant {
    pub id: u8,
    pub kind: AnimalKind,

    // Position and movement
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub size: f32,
    pub max_speed: f32,
    /// Weight of the pull toward the arena center, 0..=1
    pub center_bias: f32,

    // Combat
    pub hp: u32,
    pub max_hp: u32,
    pub alive: bool,

    // One-shot and timed buffs
    pub damage_buff: Option<f32>,
    pub shield: Option<f32>,
    pub speed_buff: Option<SpeedBuff>,

    direction_timer_ms: f64,
}

impl Combatant {
    pub fn new(kind: AnimalKind) -> Self {
        Self {
            id: kind.id,
            kind,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            size: ANIMAL_SIZE,
            max_speed: MAX_SPEED,
            center_bias: INITIAL_CENTER_BIAS,
            hp: MAX_HP,
            max_hp: MAX_HP,
            alive: true,
            damage_buff: None,
            shield: None,
            speed_buff: None,
            direction_timer_ms: 0.0,
        }
    }

    /// Reset in place for a new round at the given spawn point
    pub fn respawn<R: Rng>(&mut self, x: f32, y: f32, arena: &Arena, rng: &mut R) {
        *self = Self::new(self.kind);
        self.x = x;
        self.y = y;
        self.change_direction(arena, rng);
    }

    pub fn is_dead(&self) -> bool {
        self.hp == 0
    }

    /// Apply damage, returns true if this hit emptied the hp pool
    pub fn take_damage(&mut self, damage: u32) -> bool {
        self.hp = self.hp.saturating_sub(damage);
        self.is_dead()
    }

    /// Restore hp up to the maximum, returns the new hp.
    /// Dead combatants are never revived this way.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if self.alive {
            self.hp = (self.hp + amount).min(self.max_hp);
        }
        self.hp
    }

    pub fn distance_to(&self, other: &Combatant) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Advance one tick: maybe pick a new heading, move, reflect off walls
    pub fn advance<R: Rng>(&mut self, delta_ms: f64, arena: &Arena, rng: &mut R) {
        if !self.alive {
            return;
        }

        self.direction_timer_ms -= delta_ms;
        if self.direction_timer_ms <= 0.0 {
            self.change_direction(arena, rng);
        }

        self.x += self.vx;
        self.y += self.vy;

        self.reflect_off_walls(arena);
    }

    /// Random heading blended with the direction to the arena center
    pub fn change_direction<R: Rng>(&mut self, arena: &Arena, rng: &mut R) {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let speed = self.max_speed * (0.5 + rng.gen::<f32>() * 0.5);

        let (cx, cy) = arena.center();
        let to_cx = cx - self.x;
        let to_cy = cy - self.y;
        let dist = (to_cx * to_cx + to_cy * to_cy).sqrt();
        let dist = if dist > 0.0 { dist } else { 1.0 };

        let bias = self.center_bias.clamp(0.0, 1.0);
        self.vx = angle.cos() * speed * (1.0 - bias) + (to_cx / dist) * speed * bias;
        self.vy = angle.sin() * speed * (1.0 - bias) + (to_cy / dist) * speed * bias;

        self.direction_timer_ms =
            DIRECTION_CHANGE_MIN_MS + rng.gen::<f64>() * DIRECTION_CHANGE_JITTER_MS;
    }

    /// Hard reflect: clamp to the wall and invert that axis
    pub fn reflect_off_walls(&mut self, arena: &Arena) {
        let half = self.size / 2.0;

        if self.x < half {
            self.x = half;
            self.vx = -self.vx;
        } else if self.x > arena.width - half {
            self.x = arena.width - half;
            self.vx = -self.vx;
        }

        if self.y < half {
            self.y = half;
            self.vy = -self.vy;
        } else if self.y > arena.height - half {
            self.y = arena.height - half;
            self.vy = -self.vy;
        }
    }

    /// Rescale velocity to `max_speed * multiplier`, keeping the heading
    pub fn set_speed(&mut self, multiplier: f32) {
        let current = (self.vx * self.vx + self.vy * self.vy).sqrt();
        if current > 0.0 {
            self.vx = self.vx / current * self.max_speed * multiplier;
            self.vy = self.vy / current * self.max_speed * multiplier;
        }
    }

    /// Speed buff multiplier at `now`, clearing the buff once expired
    pub fn speed_buff_multiplier(&mut self, now: u64) -> f32 {
        match self.speed_buff {
            Some(buff) if now < buff.expires_at => buff.multiplier,
            Some(_) => {
                self.speed_buff = None;
                1.0
            }
            None => 1.0,
        }
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
    fn spawn_points_are_evenly_spaced_around_center() {
        let (cx, cy) = ARENA.center();
        for i in 0..8 {
            let (x, y) = ARENA.spawn_point(i, 8);
            let r = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
            assert!((r - SPAWN_RADIUS).abs() < 0.01);
        }
        let (x0, _) = ARENA.spawn_point(0, 8);
        assert!((x0 - (cx + SPAWN_RADIUS)).abs() < 0.01);
    }

    #[test]
    fn wall_reflection_clamps_and_inverts() {
        let mut c = Combatant::new(ANIMALS[0]);
        c.x = 10.0;
        c.y = 590.0;
        c.vx = -3.0;
        c.vy = 4.0;
        c.reflect_off_walls(&ARENA);
        assert_eq!(c.x, 25.0);
        assert_eq!(c.y, 575.0);
        assert_eq!(c.vx, 3.0);
        assert_eq!(c.vy, -4.0);
    }

    #[test]
    fn full_center_bias_points_at_center() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut c = Combatant::new(ANIMALS[1]);
        c.x = 100.0;
        c.y = 300.0;
        c.center_bias = 1.0;
        c.change_direction(&ARENA, &mut rng);
        assert!(c.vx > 0.0);
        assert!(c.vy.abs() < 1e-4);
        let speed = (c.vx * c.vx + c.vy * c.vy).sqrt();
        assert!(speed >= MAX_SPEED * 0.5 - 1e-4 && speed <= MAX_SPEED + 1e-4);
    }

    #[test]
    fn movement_stays_inside_arena() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut c = Combatant::new(ANIMALS[2]);
        let (x, y) = ARENA.spawn_point(2, 8);
        c.respawn(x, y, &ARENA, &mut rng);
        for _ in 0..2_000 {
            c.advance(50.0, &ARENA, &mut rng);
            c.set_speed(1.5);
            assert!(c.x >= c.size / 2.0 && c.x <= ARENA.width - c.size / 2.0);
            assert!(c.y >= c.size / 2.0 && c.y <= ARENA.height - c.size / 2.0);
        }
    }

    #[test]
    fn damage_saturates_and_heal_never_revives() {
        let mut c = Combatant::new(ANIMALS[3]);
        assert!(!c.take_damage(60));
        assert_eq!(c.heal(500), MAX_HP);
        assert!(c.take_damage(250));
        assert_eq!(c.hp, 0);
        c.alive = false;
        assert_eq!(c.heal(10), 0);
    }

    #[test]
    fn speed_buff_expires() {
        let mut c = Combatant::new(ANIMALS[4]);
        c.speed_buff = Some(SpeedBuff {
            multiplier: 1.5,
            expires_at: 1_000,
        });
        assert_eq!(c.speed_buff_multiplier(999), 1.5);
        assert_eq!(c.speed_buff_multiplier(1_000), 1.0);
        assert!(c.speed_buff.is_none());
    }
}
