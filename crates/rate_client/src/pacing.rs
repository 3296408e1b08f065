//! Global pacing: token reservoir + concurrency cap + minimum spacing,
//! and the per-call adaptive delay.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Burst capacity of the reservoir; `0` disables the reservoir.
    pub reservoir: u32,
    pub refill_per_minute: u32,
    pub max_concurrent: usize,
    pub min_spacing: Duration,
    pub base_delay_min: Duration,
    pub base_delay_max: Duration,
    pub progressive_step: Duration,
    pub progressive_cap: Duration,
    pub retry_unit: Duration,
    pub min_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            reservoir: 100,
            refill_per_minute: 50,
            max_concurrent: 2,
            min_spacing: Duration::from_secs(2),
            base_delay_min: Duration::from_secs(2),
            base_delay_max: Duration::from_secs(5),
            progressive_step: Duration::from_millis(150),
            progressive_cap: Duration::from_secs(8),
            retry_unit: Duration::from_secs(5),
            min_delay: Duration::from_secs(1),
        }
    }
}

impl PacingConfig {
    /// No reservoir, no delays; only the concurrency cap remains.
    pub fn unpaced() -> Self {
        Self {
            reservoir: 0,
            refill_per_minute: 0,
            max_concurrent: 2,
            min_spacing: Duration::ZERO,
            base_delay_min: Duration::ZERO,
            base_delay_max: Duration::ZERO,
            progressive_step: Duration::ZERO,
            progressive_cap: Duration::ZERO,
            retry_unit: Duration::ZERO,
            min_delay: Duration::ZERO,
        }
    }

    /// base + progressive + exponential, minus the time already elapsed
    /// since the previous request, floored at `min_delay`.
    pub fn adaptive_delay<R: Rng + ?Sized>(
        &self,
        request_count: u64,
        retry: u32,
        since_last: Duration,
        rng: &mut R,
    ) -> Duration {
        let base = if self.base_delay_max > self.base_delay_min {
            rng.gen_range(self.base_delay_min..=self.base_delay_max)
        } else {
            self.base_delay_min
        };
        let steps = u32::try_from(request_count).unwrap_or(u32::MAX);
        let progressive = self.progressive_step.saturating_mul(steps).min(self.progressive_cap);
        let exponential = if retry > 0 {
            self.retry_unit.saturating_mul(2u32.saturating_pow(retry))
        } else {
            Duration::ZERO
        };
        (base + progressive + exponential)
            .saturating_sub(since_last)
            .max(self.min_delay)
    }
}

/// Shared gate every outbound request passes.
pub struct RateGate {
    limiter: Option<DefaultDirectRateLimiter>,
    slots: Arc<Semaphore>,
    next_slot: Mutex<Option<Instant>>,
    min_spacing: Duration,
}

impl RateGate {
    pub fn new(cfg: &PacingConfig) -> Self {
        let limiter = NonZeroU32::new(cfg.reservoir).map(|burst| {
            let refill = NonZeroU32::new(cfg.refill_per_minute).unwrap_or(NonZeroU32::MIN);
            RateLimiter::direct(Quota::per_minute(refill).allow_burst(burst))
        });
        Self {
            limiter,
            slots: Arc::new(Semaphore::new(cfg.max_concurrent.max(1))),
            next_slot: Mutex::new(None),
            min_spacing: cfg.min_spacing,
        }
    }

    /// Waits for a reservoir token, a concurrency slot and the spacing
    /// window, in that order. The permit frees the slot when dropped.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let permit = Arc::clone(&self.slots).acquire_owned().await.ok()?;

        let start = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let start = next.map_or(now, |slot| slot.max(now));
            *next = Some(start + self.min_spacing);
            start
        };
        sleep_until(start).await;
        Some(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn first_attempt_has_no_exponential_component() {
        let cfg = PacingConfig {
            base_delay_min: Duration::from_secs(3),
            base_delay_max: Duration::from_secs(3),
            ..PacingConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        // 3s base + 10 * 150ms
        assert_eq!(cfg.adaptive_delay(10, 0, Duration::ZERO, &mut rng), Duration::from_millis(4500));
        // 3s base + 8s cap + 2^2 * 5s
        assert_eq!(cfg.adaptive_delay(500, 2, Duration::ZERO, &mut rng), Duration::from_secs(31));
    }

    #[test]
    fn elapsed_time_is_subtracted_down_to_the_floor() {
        let cfg = PacingConfig::default();
        let mut rng = StdRng::seed_from_u64(0);
        let d = cfg.adaptive_delay(0, 0, Duration::from_secs(60), &mut rng);
        assert_eq!(d, Duration::from_secs(1));
        let base = cfg.adaptive_delay(0, 0, Duration::ZERO, &mut rng);
        assert!(base >= Duration::from_secs(2) && base <= Duration::from_secs(5));
    }

    #[test]
    fn unpaced_config_never_waits() {
        let cfg = PacingConfig::unpaced();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(cfg.adaptive_delay(99, 3, Duration::ZERO, &mut rng), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_spaces_request_starts() {
        let cfg = PacingConfig { reservoir: 0, ..PacingConfig::default() };
        let gate = RateGate::new(&cfg);
        let t0 = Instant::now();
        drop(gate.acquire().await);
        drop(gate.acquire().await);
        drop(gate.acquire().await);
        assert!(Instant::now() - t0 >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_caps_concurrency() {
        let cfg = PacingConfig::unpaced();
        let gate = RateGate::new(&cfg);
        let a = gate.acquire().await;
        let b = gate.acquire().await;
        assert!(a.is_some() && b.is_some());
        let third = tokio::time::timeout(Duration::from_secs(1), gate.acquire()).await;
        assert!(third.is_err());
        drop(a);
        assert!(gate.acquire().await.is_some());
    }
}
