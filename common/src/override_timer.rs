use crate::clock::elapsed_ms;

/// Manual forcing of an actuator with an optional expiry.
/// `duration_ms == None` is a permanent override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideTimer {
    active: bool,
    start_ms: u64,
    duration_ms: Option<u64>,
}

impl OverrideTimer {
    pub fn start(&mut self, now_ms: u64, duration_ms: Option<u64>) {
        self.active = true;
        self.start_ms = now_ms;
        self.duration_ms = duration_ms;
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.duration_ms {
            Some(duration) if self.active => elapsed_ms(now_ms, self.start_ms) >= duration,
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Time left on a timed override, `None` when inactive or permanent.
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        let duration = self.duration_ms.filter(|_| self.active)?;
        Some(duration.saturating_sub(elapsed_ms(now_ms, self.start_ms)))
    }
}
