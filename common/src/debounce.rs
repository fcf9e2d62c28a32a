use crate::clock::elapsed_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    RisingLatched,
    FallingLatched,
}

/// Filters a frequently sampled boolean into a stable, edge-reporting value.
///
/// The stable value follows the raw sample only once the raw sample has held
/// for at least `window_ms` since its last transition.
#[derive(Debug, Clone)]
pub struct DebouncedInput {
    last_raw: bool,
    stable: bool,
    last_change_ms: u64,
    window_ms: u64,
}

impl DebouncedInput {
    pub fn new(initial: bool, now_ms: u64, window_ms: u64) -> Self {
        Self {
            last_raw: initial,
            stable: initial,
            last_change_ms: now_ms,
            window_ms,
        }
    }

    pub fn update(&mut self, raw_sample: bool, now_ms: u64) -> Option<Edge> {
        if raw_sample != self.last_raw {
            self.last_change_ms = now_ms;
            self.last_raw = raw_sample;
        }

        if raw_sample == self.stable || elapsed_ms(now_ms, self.last_change_ms) < self.window_ms {
            return None;
        }

        self.stable = raw_sample;
        Some(if raw_sample {
            Edge::RisingLatched
        } else {
            Edge::FallingLatched
        })
    }

    pub fn stable(&self) -> bool {
        self.stable
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Changes the window without discarding an in-flight transition.
    pub fn set_window_ms(&mut self, window_ms: u64) {
        self.window_ms = window_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_edge_after_raw_holds_for_window() {
        let mut input = DebouncedInput::new(false, 0, 50);

        assert_eq!(input.update(true, 100), None);
        assert_eq!(input.update(true, 149), None);
        assert_eq!(input.update(true, 150), Some(Edge::RisingLatched));
        assert_eq!(input.update(true, 400), None);
        assert!(input.stable());
    }

    #[test]
    fn bounce_shorter_than_window_is_ignored() {
        let mut input = DebouncedInput::new(false, 0, 50);

        for (i, raw) in [true, false, true, false, true, false].into_iter().enumerate() {
            assert_eq!(input.update(raw, 100 + i as u64 * 10), None);
        }
        assert_eq!(input.update(false, 500), None);
        assert!(!input.stable());
    }

    #[test]
    fn bouncy_press_latches_exactly_once() {
        let mut input = DebouncedInput::new(false, 0, 50);
        let samples = [
            (100, true),
            (105, false),
            (110, true),
            (118, false),
            (125, true),
            (180, true),
            (200, true),
            (260, true),
        ];

        let edges: Vec<Edge> = samples
            .into_iter()
            .filter_map(|(now, raw)| input.update(raw, now))
            .collect();

        assert_eq!(edges, vec![Edge::RisingLatched]);
    }

    #[test]
    fn release_reports_falling_edge() {
        let mut input = DebouncedInput::new(true, 0, 20);

        assert_eq!(input.update(false, 10), None);
        assert_eq!(input.update(false, 30), Some(Edge::FallingLatched));
    }

    #[test]
    fn window_change_keeps_pending_transition() {
        let mut input = DebouncedInput::new(false, 0, 1_000);

        assert_eq!(input.update(true, 100), None);
        input.set_window_ms(50);
        assert_eq!(input.window_ms(), 50);
        assert_eq!(input.update(true, 150), Some(Edge::RisingLatched));
    }

    #[test]
    fn zero_window_follows_raw_immediately() {
        let mut input = DebouncedInput::new(false, 0, 0);

        assert_eq!(input.update(true, 1), Some(Edge::RisingLatched));
        assert_eq!(input.update(false, 2), Some(Edge::FallingLatched));
    }
}
