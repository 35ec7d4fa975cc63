//! Curve Bank (waveshaper)
//!
//! Bias and "dirt" pre-emphasis feed one of four transfer curves, followed
//! by an optional stochastic crackle layer.
//!
//! # Signal Path
//! 1. `x + bias`
//! 2. Dirt: sign-preserving quadratic boost `dirt * x^2 * 0.5 * sign(x)`
//! 3. Chaos jitter: `jitter * 0.015 * chaos/7`
//! 4. Curve (index modulo 4): tanh, cubic soft clip, diode, foldback
//! 5. Crackle: with probability `0.01 + 0.04 * chaos/7`, add a bounded spike
//!    and re-clip to [-1, 1]
//!
//! # Determinism
//! All randomness comes from `ChaosRng`, two seeded LCG streams owned by the
//! bank. No entropy source is ever consulted, and with chaos at zero neither
//! stream is touched.

/// Jitter depth at full chaos.
const JITTER_DEPTH: f32 = 0.015;
/// Chaos control span (0..7 steps on the hardware).
const CHAOS_MAX: f32 = 7.0;
/// Crackle probability floor and per-chaos slope.
const CRACKLE_BASE_PROB: f32 = 0.01;
const CRACKLE_PROB_SLOPE: f32 = 0.04;
/// Peak spike size at full chaos.
const CRACKLE_DEPTH: f32 = 0.3;
/// Diode knee sharpness.
const DIODE_K: f32 = 3.5;

pub const DEFAULT_CHAOS_SEED: u32 = 1;

/// Deterministic pseudo-random source for jitter and crackle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChaosRng {
    seed: u32,
    jitter: u32,
    crackle: u32,
}

impl ChaosRng {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            jitter: seed,
            crackle: seed,
        }
    }

    /// Rewind both streams to the seed.
    pub fn reset(&mut self) {
        self.jitter = self.seed;
        self.crackle = self.seed;
    }

    /// Next jitter value in [-1, 1).
    #[inline]
    pub fn next_jitter(&mut self) -> f32 {
        self.jitter = self
            .jitter
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        (self.jitter >> 8) as f32 / 16_777_216.0 * 2.0 - 1.0
    }

    /// Next crackle decision value in [0, 1).
    #[inline]
    pub fn next_crackle(&mut self) -> f32 {
        self.crackle = self.crackle.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (self.crackle >> 8) as f32 / 16_777_216.0
    }
}

impl Default for ChaosRng {
    fn default() -> Self {
        Self::new(DEFAULT_CHAOS_SEED)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurveShape {
    /// Hyperbolic tangent saturation.
    Tanh,
    /// `x - x^3/3` on the clamped input.
    Cubic,
    /// Exponential diode-style clip, mirrored for negative input.
    Diode,
    /// Triangular foldback above unity.
    Fold,
}

impl CurveShape {
    pub const COUNT: u8 = 4;

    pub fn from_index(index: u8) -> Self {
        match index % Self::COUNT {
            0 => CurveShape::Tanh,
            1 => CurveShape::Cubic,
            2 => CurveShape::Diode,
            _ => CurveShape::Fold,
        }
    }

    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            CurveShape::Tanh => x.tanh(),
            CurveShape::Cubic => {
                let x = x.clamp(-1.0, 1.0);
                x - x * x * x / 3.0
            }
            CurveShape::Diode => {
                if x >= 0.0 {
                    1.0 - (-DIODE_K * x).exp()
                } else {
                    -(1.0 - (DIODE_K * x).exp())
                }
            }
            CurveShape::Fold => {
                let mag = x.abs();
                if mag <= 1.0 {
                    x
                } else {
                    let folded = (1.0 - (mag - 1.0) % 2.0).abs();
                    folded.copysign(x)
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct CurveBank {
    shape: CurveShape,
    bias: f32,
    dirt: f32,
    chaos_norm: f32,
    rng: ChaosRng,
}

impl CurveBank {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_CHAOS_SEED)
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            shape: CurveShape::Tanh,
            bias: 0.0,
            dirt: 0.0,
            chaos_norm: 0.0,
            rng: ChaosRng::new(seed),
        }
    }

    pub fn set_index(&mut self, index: u8) {
        self.shape = CurveShape::from_index(index);
    }

    pub fn set_bias(&mut self, bias: f32) {
        self.bias = bias;
    }

    pub fn set_dirt(&mut self, dirt: f32) {
        self.dirt = dirt;
    }

    /// Chaos amount on the 0..7 scale; stored normalized.
    pub fn set_chaos(&mut self, chaos: f32) {
        self.chaos_norm = chaos.clamp(0.0, CHAOS_MAX) / CHAOS_MAX;
    }

    pub fn reseed(&mut self, seed: u32) {
        self.rng = ChaosRng::new(seed);
    }

    /// Rewind the chaos generator so the bank replays from its seed.
    pub fn reset(&mut self) {
        self.rng.reset();
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let mut shaped = input + self.bias;
        shaped += self.dirt * shaped * shaped * 0.5 * shaped.signum();

        let chaotic = self.chaos_norm > 0.0;
        if chaotic {
            shaped += self.rng.next_jitter() * JITTER_DEPTH * self.chaos_norm;
        }

        let mut out = self.shape.apply(shaped);

        if chaotic {
            let probability = CRACKLE_BASE_PROB + CRACKLE_PROB_SLOPE * self.chaos_norm;
            if self.rng.next_crackle() < probability {
                let spike = (self.rng.next_crackle() * 2.0 - 1.0) * CRACKLE_DEPTH * self.chaos_norm;
                out = (out + spike).clamp(-1.0, 1.0);
            }
        }

        out
    }
}

impl Default for CurveBank {
    fn default() -> Self {
        Self::new()
    }
}
