//! Air EQ (post-shaper high shelf)
//!
//! One-pole high shelf anchored at a fixed 10 kHz. Only the band above the
//! split is scaled: `out = low + (x - low) * gain`.

use crate::dsp::utils::{db_to_lin, split_coeff};

/// Shelf corner. Not user settable.
pub const AIR_CUTOFF_HZ: f32 = 10_000.0;

/// Per-channel filter memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct AirState {
    low: f32,
}

impl AirState {
    pub fn reset(&mut self) {
        self.low = 0.0;
    }
}

#[derive(Clone, Debug)]
pub struct AirEq {
    sample_rate: f32,
    coeff: f32,
    gain: f32,
}

impl AirEq {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            coeff: split_coeff(AIR_CUTOFF_HZ.min(sample_rate * 0.45), sample_rate),
            gain: 1.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        // Keep the corner below Nyquist at low host rates
        self.coeff = split_coeff(AIR_CUTOFF_HZ.min(sample_rate * 0.45), sample_rate);
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain = db_to_lin(gain_db);
    }

    #[inline]
    pub fn process(&self, input: f32, state: &mut AirState) -> f32 {
        state.low += self.coeff * (input - state.low);
        state.low + (input - state.low) * self.gain
    }
}
