//! Time utilities for rooms and the simulation clock

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Monotonic millisecond clock owned by a room task.
///
/// Built on tokio's `Instant` so a paused test runtime drives it. The
/// simulation only ever sees the millisecond values this produces.
#[derive(Debug, Clone)]
pub struct RoomClock {
    start: tokio::time::Instant,
}

impl RoomClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Tokio deadline for a clock reading
    pub fn instant_at(&self, ms: u64) -> tokio::time::Instant {
        self.start + Duration::from_millis(ms)
    }
}

impl Default for RoomClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn room_clock_follows_paused_runtime() {
        let clock = RoomClock::new();
        assert_eq!(clock.now_ms(), 0);
        tokio::time::advance(Duration::from_millis(1_250)).await;
        assert_eq!(clock.now_ms(), 1_250);
        assert_eq!(clock.instant_at(2_000) - clock.instant_at(500), Duration::from_millis(1_500));
    }
}
