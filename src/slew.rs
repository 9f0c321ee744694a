//! Portamento and parameter smoothing

/// Glide amounts below this jump straight to the target.
pub const GLIDE_THRESHOLD: f64 = 0.01;

/// Minimum glide applied while droning.
pub const DRONE_MIN_GLIDE: f64 = 0.85;

const GLIDE_BASE_RATE: f64 = 20.0;
const DRONE_BASE_RATE: f64 = 5.0;

/// Exponential portamento in the semitone domain.
///
/// The glide amount (0..1) maps quadratically onto a rate:
///
/// ```text
/// speed = (1 - amount)²
/// coeff = 1 - exp(-speed · base / fs)     // base = 20, or 5 in drone mode
/// ```
///
/// so 0 is instant and values near 1 crawl. Drone mode also raises the
/// amount to at least 0.85, so a drone never jumps between steps.
#[derive(Debug, Clone, Default)]
pub struct Glide {
    current: f64,
    target: f64,
}

impl Glide {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_target(&mut self, semitones: f64) {
        self.target = semitones;
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Per-sample approach coefficient; `None` means jump.
    pub fn coefficient(amount: f64, drone: bool, sample_rate: f64) -> Option<f64> {
        let mut amount = amount.clamp(0.0, 1.0);
        if drone {
            amount = amount.max(DRONE_MIN_GLIDE);
        }
        if amount < GLIDE_THRESHOLD || sample_rate <= 0.0 {
            return None;
        }

        let speed = (1.0 - amount) * (1.0 - amount);
        let base = if drone { DRONE_BASE_RATE } else { GLIDE_BASE_RATE };
        Some(1.0 - libm::exp(-speed * base / sample_rate))
    }

    /// Advance one sample toward the target and return the current pitch.
    pub fn process(&mut self, amount: f64, drone: bool, sample_rate: f64) -> f64 {
        match Self::coefficient(amount, drone, sample_rate) {
            None => self.current = self.target,
            Some(coeff) => self.current += (self.target - self.current) * coeff,
        }
        self.current
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
        self.target = 0.0;
    }
}

/// One-pole parameter smoother: `y += (x - y) · (1 - exp(-rate / fs))`.
#[derive(Debug, Clone)]
pub struct Smoother {
    value: f64,
    coefficient: f64,
}

impl Smoother {
    /// `rate` is the inverse time constant in 1/s.
    pub fn new(initial: f64, rate: f64, sample_rate: f64) -> Self {
        let mut smoother = Self {
            value: initial,
            coefficient: 1.0,
        };
        smoother.set_rate(rate, sample_rate);
        smoother
    }

    pub fn set_rate(&mut self, rate: f64, sample_rate: f64) {
        self.coefficient = if sample_rate > 0.0 {
            1.0 - libm::exp(-rate / sample_rate)
        } else {
            1.0
        };
    }

    #[inline]
    pub fn process(&mut self, target: f64) -> f64 {
        self.value += (target - self.value) * self.coefficient;
        self.value
    }

    /// Jump to `value` without smoothing.
    pub fn set(&mut self, value: f64) {
        self.value = value;
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}
