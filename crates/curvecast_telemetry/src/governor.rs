// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deadline scheduling for the telemetry send loop.
//!
//! The governor tracks one absolute deadline and corrects drift by advancing
//! it in whole periods. All decisions take the current instant as an
//! argument, so the scheduling math runs unchanged under simulated time.

use std::time::{Duration, Instant};

/// Drift-corrected periodic scheduler.
///
/// Armed at play-start, the first cycle becomes due one full period later,
/// never immediately. A late wake advances the deadline past `now` in whole
/// periods, skipping missed cycles instead of bursting catch-up work.
#[derive(Debug)]
pub struct RateGovernor {
    period: Duration,
    next_deadline: Option<Instant>,
}

impl RateGovernor {
    /// Create a disarmed governor with the given period
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_nanos(1)),
            next_deadline: None,
        }
    }

    /// Create a disarmed governor for a send rate in Hz
    pub fn from_rate(rate_hz: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1))))
    }

    /// Current period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Change the period. The pending deadline is kept: a cycle in progress
    /// completes honoring the period that began it, and the new period takes
    /// effect from the next advance.
    pub fn set_period(&mut self, period: Duration) {
        self.period = period.max(Duration::from_nanos(1));
    }

    /// Arm the governor: the first cycle is due at `now + period`
    pub fn arm(&mut self, now: Instant) {
        self.next_deadline = Some(now + self.period);
    }

    /// Drop the pending deadline; the next play re-arms
    pub fn disarm(&mut self) {
        self.next_deadline = None;
    }

    /// Whether a deadline is pending
    pub fn is_armed(&self) -> bool {
        self.next_deadline.is_some()
    }

    /// Time remaining until the pending deadline, zero when already due.
    /// `None` while disarmed.
    pub fn wait_hint(&self, now: Instant) -> Option<Duration> {
        self.next_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Check whether a cycle is due at `now`, consuming it if so.
    ///
    /// On a late wake the deadline is advanced by whole periods until it is
    /// strictly in the future, so one fire covers any number of missed
    /// deadlines.
    pub fn fire(&mut self, now: Instant) -> bool {
        let Some(mut deadline) = self.next_deadline else {
            return false;
        };
        if now < deadline {
            return false;
        }

        while deadline <= now {
            deadline += self.period;
        }
        self.next_deadline = Some(deadline);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD_60HZ: Duration = Duration::from_nanos(16_666_667);

    #[test]
    fn never_fires_before_arming() {
        let mut governor = RateGovernor::from_rate(60);
        assert!(!governor.fire(Instant::now()));
    }

    #[test]
    fn first_cycle_waits_a_full_period() {
        let mut governor = RateGovernor::from_rate(60);
        let start = Instant::now();
        governor.arm(start);

        assert!(!governor.fire(start));
        assert!(!governor.fire(start + PERIOD_60HZ / 2));
        assert!(governor.fire(start + PERIOD_60HZ));
    }

    #[test]
    fn one_second_at_sixty_hertz_yields_sixty_cycles() {
        let mut governor = RateGovernor::from_rate(60);
        let start = Instant::now();
        governor.arm(start);

        let mut fired = 0;
        // Simulated 1 ms polling for one second of virtual time.
        for ms in 0..=1000 {
            if governor.fire(start + Duration::from_millis(ms)) {
                fired += 1;
            }
        }
        assert!((59..=61).contains(&fired), "fired {fired} cycles");
    }

    #[test]
    fn late_wake_fires_once_without_burst() {
        let mut governor = RateGovernor::from_rate(60);
        let start = Instant::now();
        governor.arm(start);

        // Wake half a second late: dozens of deadlines were missed.
        let late = start + Duration::from_millis(500);
        assert!(governor.fire(late));
        // The very next poll must not fire again.
        assert!(!governor.fire(late));
        // The following deadline is one period out, not in the past.
        assert!(governor.fire(late + PERIOD_60HZ));
    }

    #[test]
    fn cycle_count_is_bounded_under_jittered_wakes() {
        let mut governor = RateGovernor::from_rate(60);
        let start = Instant::now();
        governor.arm(start);

        // Irregular polling with stalls; window of 2 s.
        let mut fired = 0;
        let mut now = start;
        let stalls = [1u64, 3, 40, 2, 120, 7, 5, 300, 16, 16, 16, 90];
        while now < start + Duration::from_secs(2) {
            for &stall_ms in &stalls {
                now += Duration::from_millis(stall_ms);
                if governor.fire(now) {
                    fired += 1;
                }
            }
        }
        let window_secs = (now - start).as_secs_f64();
        let bound = (window_secs * 60.0).ceil() as u32 + 1;
        assert!(fired <= bound, "fired {fired}, bound {bound}");
    }

    #[test]
    fn disarm_clears_the_pending_deadline() {
        let mut governor = RateGovernor::from_rate(60);
        let start = Instant::now();
        governor.arm(start);
        governor.disarm();
        assert!(!governor.is_armed());
        assert!(!governor.fire(start + Duration::from_secs(1)));
    }

    #[test]
    fn wait_hint_counts_down_to_zero() {
        let mut governor = RateGovernor::new(Duration::from_millis(100));
        let start = Instant::now();
        assert_eq!(governor.wait_hint(start), None);

        governor.arm(start);
        assert_eq!(
            governor.wait_hint(start + Duration::from_millis(40)),
            Some(Duration::from_millis(60))
        );
        assert_eq!(
            governor.wait_hint(start + Duration::from_millis(150)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn set_period_keeps_the_pending_deadline() {
        let mut governor = RateGovernor::new(Duration::from_millis(100));
        let start = Instant::now();
        governor.arm(start);
        governor.set_period(Duration::from_millis(10));

        // The in-flight deadline still honors the original period.
        assert!(!governor.fire(start + Duration::from_millis(50)));
        assert!(governor.fire(start + Duration::from_millis(100)));
        // Subsequent deadlines use the new period.
        assert!(governor.fire(start + Duration::from_millis(110)));
    }
}
