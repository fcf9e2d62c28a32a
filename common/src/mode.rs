use crate::{override_timer::OverrideTimer, types::OperatingMode};

/// Decides who owns the fan: the hysteresis controller (`Automated`) or a
/// manual override. Mode changes only through these methods.
#[derive(Debug, Clone, Default)]
pub struct FanArbiter {
    mode: OperatingMode,
    timer: OverrideTimer,
}

impl FanArbiter {
    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn timer(&self) -> &OverrideTimer {
        &self.timer
    }

    pub fn permanent_on(&mut self, now_ms: u64) {
        self.mode = OperatingMode::ManualPermanent;
        self.timer.start(now_ms, None);
    }

    pub fn timed_on(&mut self, now_ms: u64, duration_ms: u64) {
        self.mode = OperatingMode::ManualTimed;
        self.timer.start(now_ms, Some(duration_ms));
    }

    pub fn off(&mut self) {
        self.mode = OperatingMode::Automated;
        self.timer.clear();
    }

    /// Returns `true` on the single tick the timed override lapses.
    pub fn expire_if_due(&mut self, now_ms: u64) -> bool {
        if !self.timer.is_expired(now_ms) {
            return false;
        }
        self.off();
        true
    }

    /// The fan level a manual mode imposes, `None` while automated.
    pub fn forced_state(&self) -> Option<bool> {
        self.mode.is_manual().then_some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_override_returns_to_automated_once() {
        let mut arbiter = FanArbiter::default();
        arbiter.timed_on(1_000, 5_000);
        assert_eq!(arbiter.mode(), OperatingMode::ManualTimed);
        assert_eq!(arbiter.forced_state(), Some(true));

        assert!(!arbiter.expire_if_due(5_999));
        assert!(arbiter.expire_if_due(6_000));
        assert!(!arbiter.expire_if_due(6_001));
        assert_eq!(arbiter.mode(), OperatingMode::Automated);
        assert_eq!(arbiter.forced_state(), None);
    }

    #[test]
    fn permanent_override_only_leaves_on_off_command() {
        let mut arbiter = FanArbiter::default();
        arbiter.permanent_on(0);

        assert!(!arbiter.expire_if_due(u64::MAX / 2));
        assert_eq!(arbiter.mode(), OperatingMode::ManualPermanent);

        arbiter.off();
        assert_eq!(arbiter.mode(), OperatingMode::Automated);
        assert!(!arbiter.timer().is_active());
    }

    #[test]
    fn permanent_on_replaces_running_timer() {
        let mut arbiter = FanArbiter::default();
        arbiter.timed_on(0, 1_000);
        arbiter.permanent_on(500);

        assert!(!arbiter.expire_if_due(2_000));
        assert_eq!(arbiter.timer().duration_ms(), None);
    }
}
