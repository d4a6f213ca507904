use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use quanta::Clock;
use quanta::Instant;

use crate::error::FlowError;
use crate::node::StatNode;

/// Cold factor applied when a rule does not specify one.
pub const DEFAULT_COLD_FACTOR: u32 = 3;

/// Token-bucket shaping that ramps the permitted QPS from cold to stable.
///
/// Tokens measure unused capacity: `count` tokens are credited per idle
/// second, and every admitted call in a second drains the bucket by that
/// second's traffic. While the bucket holds more than `warning_token` tokens
/// the system is considered cold, and the permitted QPS is throttled below
/// `count` on a linear interval schedule that relaxes as tokens drain. Below
/// the warning line the full stable rate applies.
///
/// The shape of the ramp is fixed by three derived constants:
///
/// * `warning_token` — bucket level above which shaping applies,
/// * `max_token` — bucket capacity,
/// * `slope` — per-token growth of the admission interval above the warning
///   line.
///
/// Tokens only accumulate above the warning line when the previous second's
/// traffic was clearly below capacity (`prev_qps < count / cold_factor`), so
/// a short dip in traffic does not re-enter warm-up.
#[derive(Debug)]
pub struct WarmUpController {
    count: f64,
    cold_factor: u32,
    warning_token: u64,
    max_token: u64,
    slope: f64,
    /// Unused-capacity tokens. Can transiently dip negative inside the
    /// two-step update; readers clamp at 0.
    stored_tokens: AtomicI64,
    /// Millisecond timestamp of the last refill, always second-aligned.
    last_filled_ms: AtomicU64,
    clock: Clock,
    anchor: Instant,
}

impl WarmUpController {
    /// Builds a controller admitting `count` QPS once warm, ramping up over
    /// `warm_up_period_sec` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidRule`] if `cold_factor <= 1`.
    pub fn new(count: f64, warm_up_period_sec: u32, cold_factor: u32) -> Result<Self, FlowError> {
        Self::with_clock(count, warm_up_period_sec, cold_factor, Clock::new())
    }

    /// Same as [`new`](Self::new) with an injected clock, for deterministic
    /// tests.
    pub fn with_clock(
        count: f64,
        warm_up_period_sec: u32,
        cold_factor: u32,
        clock: Clock,
    ) -> Result<Self, FlowError> {
        if cold_factor <= 1 {
            return Err(FlowError::InvalidRule(
                "cold factor must be greater than 1".to_owned(),
            ));
        }

        // Integer truncation at each step is part of the wire contract:
        // ports sharing rule payloads must derive identical ramps.
        let warning_token =
            (f64::from(warm_up_period_sec) * count) as u64 / u64::from(cold_factor - 1);
        let max_token = warning_token
            + (2.0 * f64::from(warm_up_period_sec) * count / (1.0 + f64::from(cold_factor))) as u64;
        let slope = f64::from(cold_factor - 1) / count / (max_token - warning_token) as f64;

        let anchor = clock.now();
        Ok(Self {
            count,
            cold_factor,
            warning_token,
            max_token,
            slope,
            // A fresh controller is fully cold.
            stored_tokens: AtomicI64::new(max_token as i64),
            last_filled_ms: AtomicU64::new(0),
            clock,
            anchor,
        })
    }

    /// Whether `acquire` more calls may pass this second, given the node's
    /// admitted traffic.
    pub fn can_pass(&self, node: &dyn StatNode, acquire: u32) -> bool {
        let pass_qps = node.pass_qps();
        let previous_qps = node.previous_pass_qps();
        self.sync_token(previous_qps);

        let rest = self.stored_tokens.load(Ordering::Acquire).max(0) as u64;
        if rest >= self.warning_token {
            let above = (rest - self.warning_token) as f64;
            // current interval = above * slope + 1 / count; next_up biases
            // the comparison strictly, so an exact-equality boundary cannot
            // flip admit/deny across seconds.
            let warning_qps = (1.0 / (above * self.slope + 1.0 / self.count)).next_up();
            (pass_qps + u64::from(acquire)) as f64 <= warning_qps
        } else {
            (pass_qps + u64::from(acquire)) as f64 <= self.count
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.now().duration_since(self.anchor).as_millis() as u64
    }

    /// Advances token state to the current second. At most one refill per
    /// wall-clock second; racers that lose the CAS skip the tick.
    fn sync_token(&self, previous_qps: u64) {
        let now = self.now_ms();
        let now_sec = now - now % 1000;
        let last_filled = self.last_filled_ms.load(Ordering::Acquire);
        if now_sec <= last_filled {
            return;
        }

        let old = self.stored_tokens.load(Ordering::Acquire);
        let refilled = self.cool_down(old, now_sec, last_filled, previous_qps);
        if self
            .stored_tokens
            .compare_exchange(old, refilled, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // Two sequential updates: publish the refill, then drain the
            // previous second's traffic, clamping at 0.
            let remaining =
                self.stored_tokens.fetch_sub(previous_qps as i64, Ordering::AcqRel)
                    - previous_qps as i64;
            if remaining < 0 {
                self.stored_tokens.store(0, Ordering::Release);
            }
            self.last_filled_ms.store(now_sec, Ordering::Release);
        }
    }

    fn cool_down(&self, old: i64, now_sec: u64, last_filled: u64, previous_qps: u64) -> i64 {
        let warning = self.warning_token as i64;
        let linear_refill =
            old + ((now_sec - last_filled) as f64 * self.count / 1000.0) as i64;

        let refilled = if old < warning {
            linear_refill
        } else if old > warning && previous_qps < self.count as u64 / u64::from(self.cold_factor) {
            // Above the warning line tokens only accumulate while the system
            // is clearly under-used.
            linear_refill
        } else {
            old
        };
        refilled.min(self.max_token as i64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Default)]
    struct StubNode {
        pass: AtomicU64,
        prev: AtomicU64,
    }

    impl StatNode for StubNode {
        fn pass_qps(&self) -> u64 {
            self.pass.load(Ordering::SeqCst)
        }

        fn previous_pass_qps(&self) -> u64 {
            self.prev.load(Ordering::SeqCst)
        }

        fn cluster_node(&self) -> Option<std::sync::Arc<dyn StatNode>> {
            None
        }
    }

    /// Admits through `can_pass` until the controller denies, mimicking the
    /// statistic slot feeding admitted traffic back into the node.
    fn drain_second(controller: &WarmUpController, node: &StubNode) -> u64 {
        let mut admitted = 0;
        while controller.can_pass(node, 1) {
            node.pass.fetch_add(1, Ordering::SeqCst);
            admitted += 1;
            assert!(admitted <= 10_000, "controller never denied");
        }
        admitted
    }

    fn roll_second(node: &StubNode, admitted: u64) {
        node.prev.store(admitted, Ordering::SeqCst);
        node.pass.store(0, Ordering::SeqCst);
    }

    #[test]
    fn derived_constants_for_the_standard_shape() {
        let c = WarmUpController::new(100.0, 10, 3).unwrap();
        assert_eq!(c.warning_token, 500);
        assert_eq!(c.max_token, 1000);
        assert!((c.slope - 4e-5).abs() < 1e-18, "slope was {}", c.slope);
    }

    #[test]
    fn rejects_cold_factor_of_one() {
        let err = WarmUpController::new(100.0, 10, 1).unwrap_err();
        assert!(matches!(err, FlowError::InvalidRule(_)));
    }

    #[test]
    fn cold_start_throttles_to_the_warm_up_rate() {
        let (clock, _mock) = Clock::mock();
        let c = WarmUpController::with_clock(100.0, 10, 3, clock).unwrap();
        let node = StubNode::default();

        // Fully cold: allowed QPS is nextUp(1 / (500 * 4e-5 + 1/100)) = 33.33…
        assert_eq!(drain_second(&c, &node), 33);
    }

    #[test]
    fn stable_regime_admits_the_full_count() {
        let (clock, _mock) = Clock::mock();
        let c = WarmUpController::with_clock(100.0, 10, 3, clock).unwrap();
        c.stored_tokens.store(0, Ordering::SeqCst);
        let node = StubNode::default();

        assert_eq!(drain_second(&c, &node), 100);
    }

    #[test]
    fn sustained_traffic_ramps_up_to_stable() {
        let (clock, mock) = Clock::mock();
        let c = WarmUpController::with_clock(100.0, 10, 3, clock).unwrap();
        let node = StubNode::default();

        let mut admitted = drain_second(&c, &node);
        assert_eq!(admitted, 33);

        // Drive saturating traffic second by second; the allowance must rise
        // monotonically and settle at the stable rate within a few multiples
        // of the warm-up period.
        let mut reached_stable_at = None;
        for second in 1..=30u64 {
            mock.increment(Duration::from_secs(1));
            roll_second(&node, admitted);
            let next = drain_second(&c, &node);
            assert!(
                next >= admitted,
                "allowance dropped from {admitted} to {next} during warm-up"
            );
            admitted = next;
            if admitted == 100 && reached_stable_at.is_none() {
                reached_stable_at = Some(second);
            }

            let stored = c.stored_tokens.load(Ordering::SeqCst);
            assert!(
                stored >= 0 && stored <= c.max_token as i64,
                "token invariant violated: {stored}"
            );
        }
        let reached = reached_stable_at.expect("never reached the stable rate");
        assert!(
            (8..=15).contains(&reached),
            "warm-up took {reached}s for a 10s period"
        );
    }

    #[test]
    fn idle_system_stays_cold() {
        let (clock, mock) = Clock::mock();
        let c = WarmUpController::with_clock(100.0, 10, 3, clock).unwrap();
        let node = StubNode::default();

        // prev QPS 10 is below count / cold_factor (33): the bucket refills
        // and hovers at capacity minus the trickle of traffic.
        for _ in 0..2 {
            mock.increment(Duration::from_secs(1));
            node.prev.store(10, Ordering::SeqCst);
            let _ = c.can_pass(&node, 1);
        }
        assert_eq!(c.stored_tokens.load(Ordering::SeqCst), 990);
    }

    #[test]
    fn moderate_traffic_drains_the_bucket_without_refill() {
        let (clock, mock) = Clock::mock();
        let c = WarmUpController::with_clock(100.0, 10, 3, clock).unwrap();
        let node = StubNode::default();

        // prev QPS 50 is above count / cold_factor: no refill, the bucket
        // drains by 50 per tick until it crosses the warning line.
        for tick in 1..=11u64 {
            mock.increment(Duration::from_secs(1));
            node.prev.store(50, Ordering::SeqCst);
            node.pass.store(0, Ordering::SeqCst);
            let _ = c.can_pass(&node, 1);
            assert_eq!(
                c.stored_tokens.load(Ordering::SeqCst),
                1000 - 50 * tick as i64
            );
        }

        // Below the warning line the stable allowance applies again.
        node.pass.store(0, Ordering::SeqCst);
        assert_eq!(drain_second(&c, &node), 100);
    }

    #[test]
    fn exact_warning_level_neither_fills_nor_drains_by_refill() {
        let (clock, mock) = Clock::mock();
        let c = WarmUpController::with_clock(100.0, 10, 3, clock).unwrap();
        c.stored_tokens.store(500, Ordering::SeqCst);
        let node = StubNode::default();

        // old == warning_token is a refill no-op even when idle.
        mock.increment(Duration::from_secs(1));
        node.prev.store(0, Ordering::SeqCst);
        let _ = c.can_pass(&node, 1);
        assert_eq!(c.stored_tokens.load(Ordering::SeqCst), 500);
    }

    #[test]
    fn drain_clamps_at_zero() {
        let (clock, mock) = Clock::mock();
        let c = WarmUpController::with_clock(100.0, 10, 3, clock).unwrap();
        c.stored_tokens.store(10, Ordering::SeqCst);
        let node = StubNode::default();

        mock.increment(Duration::from_secs(1));
        node.prev.store(500, Ordering::SeqCst);
        let _ = c.can_pass(&node, 1);
        assert_eq!(c.stored_tokens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn refill_happens_at_most_once_per_second() {
        let (clock, mock) = Clock::mock();
        let c = WarmUpController::with_clock(100.0, 10, 3, clock).unwrap();
        c.stored_tokens.store(0, Ordering::SeqCst);
        let node = StubNode::default();

        // Mid-second: still in the construction second, no refill.
        mock.increment(Duration::from_millis(500));
        let _ = c.can_pass(&node, 1);
        assert_eq!(c.stored_tokens.load(Ordering::SeqCst), 0);
        assert_eq!(c.last_filled_ms.load(Ordering::SeqCst), 0);

        // Crossing the boundary refills once and aligns the fill time.
        mock.increment(Duration::from_millis(600));
        let _ = c.can_pass(&node, 1);
        assert_eq!(c.stored_tokens.load(Ordering::SeqCst), 100);
        assert_eq!(c.last_filled_ms.load(Ordering::SeqCst), 1000);

        // Same second again: no further refill.
        mock.increment(Duration::from_millis(100));
        let _ = c.can_pass(&node, 1);
        assert_eq!(c.stored_tokens.load(Ordering::SeqCst), 100);
    }
}
