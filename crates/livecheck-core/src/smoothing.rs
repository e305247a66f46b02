//! Moving-average primitives for per-frame signals.
//!
//! Raw EAR jitters by several hundredths between frames at detector rates of
//! 10-15 Hz, enough to flip a hysteresis detector on its own. Gates only ever
//! see the EMA-smoothed value.

/// Exponential moving average step.
///
/// A zero or non-finite `previous` means there is no history yet, and
/// `current` is returned unchanged.
pub fn ema(current: f32, previous: f32, alpha: f32) -> f32 {
    if previous == 0.0 || !previous.is_finite() {
        return current;
    }
    alpha * current + (1.0 - alpha) * previous
}

/// Arithmetic mean, or 0 for an empty sequence.
pub fn sma<I>(values: I) -> f32
where
    I: IntoIterator<Item = f32>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0f32, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// EMA with its previous output retained between frames.
#[derive(Debug, Clone)]
pub struct EmaFilter {
    alpha: f32,
    value: f32,
}

impl EmaFilter {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: 0.0 }
    }

    /// Feed one sample and return the smoothed value.
    pub fn update(&mut self, sample: f32) -> f32 {
        self.value = ema(sample, self.value, self.alpha);
        self.value
    }

    /// Last smoothed value, 0 before the first sample.
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_cold_start_identity() {
        for alpha in [0.0, 0.1, 0.5, 0.9, 1.0] {
            for x in [0.0, 0.27, 1.5, -3.0] {
                assert_eq!(ema(x, 0.0, alpha), x);
            }
        }
        assert_eq!(ema(0.3, f32::NAN, 0.5), 0.3);
    }

    #[test]
    fn test_ema_blend() {
        assert!((ema(0.2, 0.4, 0.25) - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_sma() {
        assert_eq!(sma(Vec::<f32>::new()), 0.0);
        assert!((sma([0.1, 0.2, 0.3]) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_filter_converges_on_constant_input() {
        let mut filter = EmaFilter::new(0.5);
        assert_eq!(filter.update(0.3), 0.3);
        for _ in 0..10 {
            filter.update(0.3);
        }
        assert!((filter.value() - 0.3).abs() < 1e-6);

        filter.reset();
        assert_eq!(filter.value(), 0.0);
    }

    #[test]
    fn test_filter_lags_a_step_change() {
        let mut filter = EmaFilter::new(0.5);
        filter.update(0.30);
        let dipped = filter.update(0.10);
        assert!((dipped - 0.20).abs() < 1e-6);
    }
}
