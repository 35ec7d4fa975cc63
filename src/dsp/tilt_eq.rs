//! Tilt EQ (pre-shaper tone)
//!
//! Splits the signal around a fixed ~650 Hz pivot with a one-pole low-pass
//! and rebalances the two bands with complementary gains:
//! `high_gain = 10^(slope/20)`, `low_gain = 1/high_gain`.
//!
//! Positive slope tilts bright, negative tilts warm. At zero slope the
//! stage is transparent.
//!
//! # Design Notes
//! - Coefficients live on the stage, filter memory lives in `TiltState`;
//!   the caller owns one `TiltState` per channel.

use crate::dsp::utils::{db_to_lin, split_coeff};

/// Pivot frequency of the low/high split.
pub const TILT_PIVOT_HZ: f32 = 650.0;

/// Per-channel filter memory (low-band accumulator).
#[derive(Clone, Copy, Debug, Default)]
pub struct TiltState {
    low: f32,
}

impl TiltState {
    pub fn reset(&mut self) {
        self.low = 0.0;
    }
}

#[derive(Clone, Debug)]
pub struct TiltEq {
    sample_rate: f32,
    slope_db: f32,
    coeff: f32,
    low_gain: f32,
    high_gain: f32,
}

impl TiltEq {
    pub fn new(sample_rate: f32) -> Self {
        let mut eq = Self {
            sample_rate,
            slope_db: 0.0,
            coeff: 0.0,
            low_gain: 1.0,
            high_gain: 1.0,
        };
        eq.update_coeff();
        eq
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_coeff();
    }

    /// Slope in dB per octave.
    pub fn set_slope(&mut self, slope_db: f32) {
        self.slope_db = slope_db;
        self.update_gains();
    }

    #[inline]
    pub fn process(&self, input: f32, state: &mut TiltState) -> f32 {
        state.low += self.coeff * (input - state.low);
        let high = input - state.low;
        state.low * self.low_gain + high * self.high_gain
    }

    fn update_coeff(&mut self) {
        self.coeff = split_coeff(TILT_PIVOT_HZ, self.sample_rate);
        self.update_gains();
    }

    fn update_gains(&mut self) {
        self.high_gain = db_to_lin(self.slope_db);
        self.low_gain = 1.0 / self.high_gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(eq: &TiltEq, state: &mut TiltState, pattern: impl Fn(usize) -> f32) -> f32 {
        let mut out = 0.0;
        for i in 0..20_000 {
            out = eq.process(pattern(i), state);
        }
        out
    }

    #[test]
    fn test_flat_slope_is_transparent() {
        let eq = TiltEq::new(48000.0);
        let mut state = TiltState::default();
        for i in 0..1000 {
            let x = ((i as f32) * 0.37).sin() * 0.8;
            let y = eq.process(x, &mut state);
            assert!((y - x).abs() < 1e-6);
        }
    }

    #[test]
    fn test_positive_slope_brightens() {
        let mut eq = TiltEq::new(48000.0);
        eq.set_slope(6.0);

        // DC sits entirely in the low band
        let mut dc = TiltState::default();
        let dc_out = settle(&eq, &mut dc, |_| 0.5);
        assert!((dc_out - 0.5 / db_to_lin(6.0)).abs() < 1e-3);

        // Nyquist is mostly high band
        let mut nyq = TiltState::default();
        let nyq_out = settle(&eq, &mut nyq, |i| if i % 2 == 0 { 0.5 } else { -0.5 }).abs();
        assert!(nyq_out > 0.5 * 1.5);
    }

    #[test]
    fn test_negative_slope_warms() {
        let mut eq = TiltEq::new(44100.0);
        eq.set_slope(-6.0);
        let mut dc = TiltState::default();
        let dc_out = settle(&eq, &mut dc, |_| 0.25);
        assert!(dc_out > 0.25 * 1.9);
    }

    #[test]
    fn test_channels_do_not_share_memory() {
        let mut eq = TiltEq::new(48000.0);
        eq.set_slope(3.0);
        let mut left = TiltState::default();
        let mut right = TiltState::default();
        for _ in 0..500 {
            eq.process(1.0, &mut left);
        }
        // Right channel has only ever seen silence
        assert_eq!(eq.process(0.0, &mut right), 0.0);
        assert!(left.low > 0.9);
    }
}
