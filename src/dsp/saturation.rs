/// Gentle hyperbolic-tangent saturation.
///
/// Last-resort catch for the limiter. `process_against` is identity up to a
/// knee 0.5 dB under the ceiling, then bends the remaining headroom through
/// tanh. The curve is continuous with unit slope at the knee, monotone, and
/// approaches the ceiling without ever crossing it.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftSaturation;

/// Knee start as a fraction of the ceiling (-0.5 dB).
pub const KNEE_START: f32 = 0.944_061;

impl SoftSaturation {
    #[inline]
    pub fn process(&self, x: f32) -> f32 {
        x.tanh()
    }

    /// Saturate against `ceiling` (linear).
    #[inline]
    pub fn process_against(&self, x: f32, ceiling: f32) -> f32 {
        let ceiling = ceiling.max(1e-6);
        let knee = ceiling * KNEE_START;
        let mag = x.abs();
        if mag <= knee {
            return x;
        }
        let width = ceiling - knee;
        let bent = knee + width * self.process((mag - knee) / width);
        bent.min(ceiling).copysign(x)
    }
}
