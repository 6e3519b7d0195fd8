use std::time::{Duration, Instant};

use rand::Rng;

use crate::HEARTBEAT_DEDUP_WINDOW;

/// Base delay between two heartbeats from one tab.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum random offset applied to each heartbeat delay.
pub const HEARTBEAT_JITTER: Duration = Duration::from_secs(5);

/// Generate a fresh anonymous session id (UUID v4).
///
/// Clients persist it (localStorage on the site) and reuse it for every page
/// view and heartbeat; the server never derives one.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Caller-side heartbeat schedule.
///
/// The store already drops heartbeats inside its 20 s window; pacing on the
/// client keeps several tabs from firing at the same instant in the first
/// place. One pacer per tab:
///
/// - first heartbeat after a uniform delay in `[0, jitter)`,
/// - then every `interval ± jitter`,
/// - skipped while a previous call is still in flight,
/// - skipped for the same path within the dedup window.
#[derive(Debug, Clone)]
pub struct HeartbeatPacer {
    interval: Duration,
    jitter: Duration,
    debounce: Duration,
    pending: bool,
    last_sent: Option<(Instant, String)>,
}

impl Default for HeartbeatPacer {
    fn default() -> Self {
        Self::new(HEARTBEAT_INTERVAL, HEARTBEAT_JITTER, HEARTBEAT_DEDUP_WINDOW)
    }
}

impl HeartbeatPacer {
    pub fn new(interval: Duration, jitter: Duration, debounce: Duration) -> Self {
        Self {
            interval,
            jitter,
            debounce,
            pending: false,
            last_sent: None,
        }
    }

    pub fn initial_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        rng.gen_range(Duration::ZERO..self.jitter)
    }

    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let low = self.interval.saturating_sub(self.jitter);
        let high = self.interval + self.jitter;
        rng.gen_range(low..=high)
    }

    /// Decide whether to send a heartbeat for `path` now. On `true` the pacer
    /// is marked in flight until [`HeartbeatPacer::finish`] is called.
    pub fn try_begin(&mut self, path: &str, now: Instant) -> bool {
        if self.pending {
            return false;
        }
        if let Some((at, last_path)) = &self.last_sent {
            if last_path == path && now.saturating_duration_since(*at) < self.debounce {
                return false;
            }
        }
        self.pending = true;
        self.last_sent = Some((now, path.to_string()));
        true
    }

    /// Mark the in-flight heartbeat as done, whatever its outcome.
    pub fn finish(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn session_ids_are_uuid_shaped_and_distinct() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn delays_stay_within_jitter_bounds() {
        let pacer = HeartbeatPacer::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let first = pacer.initial_delay(&mut rng);
            assert!(first < Duration::from_secs(5));
            let next = pacer.next_delay(&mut rng);
            assert!(next >= Duration::from_secs(25) && next <= Duration::from_secs(35));
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let pacer = HeartbeatPacer::new(Duration::from_secs(30), Duration::ZERO, Duration::ZERO);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pacer.initial_delay(&mut rng), Duration::ZERO);
        assert_eq!(pacer.next_delay(&mut rng), Duration::from_secs(30));
    }

    #[test]
    fn in_flight_heartbeat_blocks_the_next_one() {
        let mut pacer = HeartbeatPacer::default();
        let t0 = Instant::now();
        assert!(pacer.try_begin("/a", t0));
        assert!(!pacer.try_begin("/b", t0 + Duration::from_secs(1)));
        pacer.finish();
        assert!(pacer.try_begin("/b", t0 + Duration::from_secs(1)));
    }

    #[test]
    fn same_path_is_debounced_but_new_path_is_not() {
        let mut pacer = HeartbeatPacer::default();
        let t0 = Instant::now();
        assert!(pacer.try_begin("/a", t0));
        pacer.finish();
        assert!(!pacer.try_begin("/a", t0 + Duration::from_secs(10)));
        assert!(pacer.try_begin("/b", t0 + Duration::from_secs(10)));
        pacer.finish();
        assert!(pacer.try_begin("/b", t0 + Duration::from_secs(31)));
    }
}
