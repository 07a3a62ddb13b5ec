//! The single timer armed by the monitor

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Which timer is armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires every sample interval while scanning
    Sampling,
    /// Fires every second while alerting
    Cooldown,
}

/// Holds at most one repeating timer.
///
/// Arming replaces whatever was armed before, so sampling and cooldown can
/// never run together.
#[derive(Debug, Default)]
pub struct Schedule {
    armed: Option<(TimerKind, Interval)>,
}

impl Schedule {
    pub fn new() -> Self {
        Self { armed: None }
    }

    /// Arm `kind`, first firing one `period` from now
    pub fn arm(&mut self, kind: TimerKind, period: Duration) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.armed = Some((kind, interval));
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn armed(&self) -> Option<TimerKind> {
        self.armed.as_ref().map(|(kind, _)| *kind)
    }

    /// Wait for the armed timer; pends forever when nothing is armed.
    pub async fn tick(&mut self) -> TimerKind {
        match &mut self.armed {
            Some((kind, interval)) => {
                interval.tick().await;
                *kind
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let mut schedule = Schedule::new();
        let start = Instant::now();
        schedule.arm(TimerKind::Sampling, Duration::from_millis(2000));

        assert_eq!(schedule.tick().await, TimerKind::Sampling);
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
        schedule.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arming_replaces_previous_timer() {
        let mut schedule = Schedule::new();
        schedule.arm(TimerKind::Sampling, Duration::from_millis(2000));
        schedule.arm(TimerKind::Cooldown, Duration::from_secs(1));
        assert_eq!(schedule.armed(), Some(TimerKind::Cooldown));
        assert_eq!(schedule.tick().await, TimerKind::Cooldown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_never_fires() {
        let mut schedule = Schedule::new();
        schedule.arm(TimerKind::Sampling, Duration::from_millis(10));
        schedule.disarm();
        assert_eq!(schedule.armed(), None);
        let fired = tokio::time::timeout(Duration::from_secs(60), schedule.tick()).await;
        assert!(fired.is_err());
    }
}
