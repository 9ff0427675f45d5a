//! Round pacing - steers the random simulation toward a target duration
//!
//! At round start a target duration is drawn and one checkpoint per required
//! elimination is spread across it. The engine reads motion bias and speed
//! from the elapsed fraction, and nudges the two closest animals together
//! when the round falls more than [`FORCE_COLLISION_GRACE_MS`] behind.

use std::collections::VecDeque;

use rand::Rng;
use tracing::debug;

use super::collision::pair_mut;
use super::combatant::Combatant;

/// Each checkpoint is jittered by up to this fraction of the even interval
pub const CHECKPOINT_JITTER: f64 = 0.15;
/// How far behind the next checkpoint the round may drift before a nudge
pub const FORCE_COLLISION_GRACE_MS: u64 = 5_000;

#[derive(Debug, Clone, Default)]
pub struct PacingController {
    started_at: u64,
    target_duration_ms: u64,
    remaining: usize,
    /// Absolute checkpoint times, ascending
    checkpoints: VecDeque<u64>,
    last_elimination_at: u64,
}

impl PacingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the target duration and lay out `combatants - 1` checkpoints
    pub fn start<R: Rng>(
        &mut self,
        now: u64,
        combatants: usize,
        min_duration_ms: u64,
        max_duration_ms: u64,
        rng: &mut R,
    ) {
        self.started_at = now;
        self.target_duration_ms = rng.gen_range(min_duration_ms..=max_duration_ms);
        self.remaining = combatants;
        self.last_elimination_at = now;

        let eliminations = combatants.saturating_sub(1);
        let interval = self.target_duration_ms as f64 / eliminations.max(1) as f64;

        let mut offsets: Vec<f64> = (0..eliminations)
            .map(|i| {
                let base = interval * (i + 1) as f64;
                let jitter = (rng.gen::<f64>() - 0.5) * 2.0 * CHECKPOINT_JITTER * interval;
                (base + jitter).max(0.0)
            })
            .collect();
        offsets.sort_by(|a, b| a.total_cmp(b));

        self.checkpoints = offsets
            .into_iter()
            .map(|offset| now + offset.round() as u64)
            .collect();
    }

    pub fn target_duration_ms(&self) -> u64 {
        self.target_duration_ms
    }

    /// Pending checkpoints relative to round start
    #[cfg(test)]
    pub fn checkpoint_offsets(&self) -> Vec<u64> {
        self.checkpoints
            .iter()
            .map(|t| t.saturating_sub(self.started_at))
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn elapsed_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }

    /// Elapsed fraction of the target duration, clamped to 0..=1
    pub fn progress(&self, now: u64) -> f32 {
        if self.target_duration_ms == 0 {
            return 0.0;
        }
        (self.elapsed_ms(now) as f64 / self.target_duration_ms as f64).clamp(0.0, 1.0) as f32
    }

    pub fn center_bias(&self, now: u64) -> f32 {
        0.2 + 0.5 * self.progress(now)
    }

    pub fn speed_multiplier(&self, now: u64) -> f32 {
        1.0 + 0.5 * self.progress(now)
    }

    /// True when the round is meaningfully behind its elimination cadence.
    /// The latest elimination also counts as a baseline, so a late kill
    /// earns a fresh grace period before the next nudge.
    pub fn should_force_collision(&self, now: u64) -> bool {
        if self.remaining <= 1 {
            return false;
        }
        match self.checkpoints.front() {
            Some(&next) => now > next.max(self.last_elimination_at) + FORCE_COLLISION_GRACE_MS,
            None => false,
        }
    }

    /// Record an elimination, consuming the next checkpoint
    pub fn on_elimination(&mut self, now: u64) {
        self.remaining = self.remaining.saturating_sub(1);
        self.checkpoints.pop_front();
        self.last_elimination_at = now;
    }
}

/// Launch the two closest alive combatants at each other at twice their
/// max speed. Returns the ids of the pair, if there was one.
pub fn force_collision(combatants: &mut [Combatant]) -> Option<(u8, u8)> {
    let mut closest: Option<(usize, usize, f32)> = None;

    for i in 0..combatants.len() {
        for j in (i + 1)..combatants.len() {
            if !combatants[i].alive || !combatants[j].alive {
                continue;
            }
            let dist = combatants[i].distance_to(&combatants[j]);
            if closest.map_or(true, |(_, _, best)| dist < best) {
                closest = Some((i, j, dist));
            }
        }
    }

    let (i, j, dist) = closest?;
    let (a, b) = pair_mut(combatants, i, j);
    let dist = if dist > 0.0 { dist } else { 1.0 };
    let nx = (b.x - a.x) / dist;
    let ny = (b.y - a.y) / dist;

    a.vx = nx * a.max_speed * 2.0;
    a.vy = ny * a.max_speed * 2.0;
    b.vx = -nx * b.max_speed * 2.0;
    b.vy = -ny * b.max_speed * 2.0;

    debug!(first = a.id, second = b.id, "Forcing collision");
    Some((a.id, b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ANIMALS;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn started(seed: u64, now: u64) -> PacingController {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut pacing = PacingController::new();
        pacing.start(now, 8, 50_000, 60_000, &mut rng);
        pacing
    }

    #[test]
    fn checkpoints_are_increasing_and_bounded() {
        for seed in 0..100 {
            let pacing = started(seed, 10_000);
            let target = pacing.target_duration_ms();
            assert!((50_000..=60_000).contains(&target));

            let offsets = pacing.checkpoint_offsets();
            assert_eq!(offsets.len(), 7);
            assert!(offsets.windows(2).all(|w| w[0] < w[1]));
            let upper = (target as f64 * (1.0 + CHECKPOINT_JITTER)).ceil() as u64;
            assert!(offsets.iter().all(|&o| o <= upper));
        }
    }

    #[test]
    fn signals_ramp_with_progress() {
        let pacing = started(1, 0);
        let target = pacing.target_duration_ms();

        assert!((pacing.center_bias(0) - 0.2).abs() < 1e-6);
        assert!((pacing.speed_multiplier(0) - 1.0).abs() < 1e-6);
        assert!((pacing.center_bias(target / 2) - 0.45).abs() < 1e-3);
        assert!((pacing.center_bias(target * 3) - 0.7).abs() < 1e-6);
        assert!((pacing.speed_multiplier(target * 3) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn force_signal_fires_only_when_behind_schedule() {
        let mut pacing = started(2, 0);
        let first = pacing.checkpoint_offsets()[0];

        assert!(!pacing.should_force_collision(first));
        assert!(!pacing.should_force_collision(first + FORCE_COLLISION_GRACE_MS));
        assert!(pacing.should_force_collision(first + FORCE_COLLISION_GRACE_MS + 1));

        // An elimination consumes the checkpoint and resets the baseline
        let late = first + FORCE_COLLISION_GRACE_MS + 1;
        pacing.on_elimination(late);
        assert_eq!(pacing.remaining(), 7);
        assert_eq!(pacing.checkpoint_offsets().len(), 6);
        assert!(!pacing.should_force_collision(late + 1));
    }

    #[test]
    fn no_force_signal_once_one_remains() {
        let mut pacing = started(3, 0);
        for _ in 0..7 {
            pacing.on_elimination(1_000);
        }
        assert_eq!(pacing.remaining(), 1);
        assert!(!pacing.should_force_collision(1_000_000));
    }

    #[test]
    fn forced_pair_is_the_closest_and_heads_inward() {
        let mut combatants: Vec<Combatant> = ANIMALS.iter().map(|k| Combatant::new(*k)).collect();
        for (i, c) in combatants.iter_mut().enumerate() {
            c.x = 100.0 * i as f32;
            c.y = 50.0;
        }
        combatants[5].x = 410.0; // closest to #4 at x=400
        combatants[0].alive = false;

        assert_eq!(force_collision(&mut combatants), Some((4, 5)));
        assert!(combatants[4].vx > 0.0);
        assert!(combatants[5].vx < 0.0);
        assert!((combatants[4].vx - combatants[4].max_speed * 2.0).abs() < 1e-4);
    }

    #[test]
    fn force_collision_needs_two_alive() {
        let mut combatants: Vec<Combatant> = ANIMALS.iter().map(|k| Combatant::new(*k)).collect();
        for c in combatants.iter_mut().skip(1) {
            c.alive = false;
        }
        assert_eq!(force_collision(&mut combatants), None);
    }
}
