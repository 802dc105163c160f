/// Adaptive gossip pacing (spec.md §4.2 "Adaptive interval"). Every
/// `adjust_interval_period` seconds the caller reports how many messages
/// were sent in that window; the interval is remapped from a
/// messages-per-second estimate and smoothed so it never moves by more
/// than 20% in one step.
pub struct AdaptiveInterval {
    min: f64,
    max: f64,
    current: f64,
}

impl AdaptiveInterval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max, current: max }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// `messages_per_second`: `<1 -> min`, `1..=5 -> linear interpolation`,
    /// `>5 -> max`. The new interval is clamped to within ±20% of the
    /// previous one before being applied.
    pub fn adjust(&mut self, messages_per_second: f64) -> f64 {
        let target = if messages_per_second < 1.0 {
            self.min
        } else if messages_per_second > 5.0 {
            self.max
        } else {
            let t = (messages_per_second - 1.0) / 4.0;
            self.min + t * (self.max - self.min)
        };

        let lower = self.current * 0.8;
        let upper = self.current * 1.2;
        self.current = target.clamp(lower, upper).clamp(self.min, self.max);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_traffic_relaxes_toward_max() {
        let mut interval = AdaptiveInterval::new(0.2, 2.0);
        let before = interval.current();
        let after = interval.adjust(0.1);
        assert!(after >= before || (after - 2.0).abs() < 1e-9);
    }

    #[test]
    fn high_traffic_tightens_toward_min_gradually() {
        let mut interval = AdaptiveInterval::new(0.2, 2.0);
        let first = interval.adjust(10.0);
        // Can't jump straight to min in one step: bounded by the 20% rule.
        assert!(first >= 2.0 * 0.8 - 1e-9);
        let mut steps = 0;
        while (interval.current() - 0.2).abs() > 1e-6 && steps < 100 {
            interval.adjust(10.0);
            steps += 1;
        }
        assert!((interval.current() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn never_leaves_configured_bounds() {
        let mut interval = AdaptiveInterval::new(0.2, 2.0);
        for _ in 0..50 {
            let v = interval.adjust(3.0);
            assert!(v >= 0.2 && v <= 2.0);
        }
    }
}
