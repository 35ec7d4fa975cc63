//! Parameter Smoother
//!
//! One-pole low-pass for control values (drive in dB) so a knob jump never
//! lands as a step in the audio. This is a filter for control values, NOT
//! for audio.

use crate::dsp::utils::time_constant_coeff;

#[derive(Clone, Debug)]
pub struct ParamSmoother {
    sample_rate: f32,
    time_ms: f32,
    coeff: f32,
    state: f32,
    target: f32,
}

impl ParamSmoother {
    pub fn new(sample_rate: f32, time_ms: f32) -> Self {
        Self {
            sample_rate,
            time_ms,
            coeff: time_constant_coeff(time_ms, sample_rate),
            state: 0.0,
            target: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.coeff = time_constant_coeff(self.time_ms, self.sample_rate);
    }

    pub fn set_time_ms(&mut self, ms: f32) {
        self.time_ms = ms;
        self.coeff = time_constant_coeff(self.time_ms, self.sample_rate);
    }

    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Advance one sample toward the target.
    #[inline]
    pub fn process(&mut self) -> f32 {
        self.state = self.coeff * self.state + (1.0 - self.coeff) * self.target;
        self.state
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.state
    }

    /// Snap state and target to `value` (no transient).
    pub fn reset(&mut self, value: f32) {
        self.state = value;
        self.target = value;
    }
}
