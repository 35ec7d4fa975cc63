//! Envelope Follower
//!
//! Rectified peak follower with independent attack and release. Drives the
//! gate/compressor gain and the envelope-to-drive modulation of the engine.
//!
//! # Design Notes
//! - One instance runs on the mono sum, so both channels see the same
//!   modulation and stereo correlation is preserved.
//! - Coefficients are recomputed only when a time constant or the sample
//!   rate changes.
//! - **No Allocations**: sample-accurate, deterministic, stack-only.

use crate::dsp::utils::{follow, time_constant_coeff};

pub const DEFAULT_ATTACK_MS: f32 = 5.0;
pub const DEFAULT_RELEASE_MS: f32 = 50.0;

#[derive(Clone, Debug)]
pub struct EnvelopeFollower {
    sample_rate: f32,
    attack_ms: f32,
    release_ms: f32,

    attack_coeff: f32,
    release_coeff: f32,

    state: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32) -> Self {
        let mut follower = Self {
            sample_rate,
            attack_ms: DEFAULT_ATTACK_MS,
            release_ms: DEFAULT_RELEASE_MS,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            state: 0.0,
        };
        follower.update_coeffs();
        follower
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_coeffs();
    }

    pub fn set_attack_ms(&mut self, ms: f32) {
        self.attack_ms = ms;
        self.update_coeffs();
    }

    pub fn set_release_ms(&mut self, ms: f32) {
        self.release_ms = ms;
        self.update_coeffs();
    }

    /// Advance by one sample and return the new envelope (always >= 0).
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.state = follow(
            self.state,
            input.abs(),
            self.attack_coeff,
            self.release_coeff,
        );
        self.state
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.state
    }

    pub fn reset(&mut self) {
        self.reset_to(0.0);
    }

    pub fn reset_to(&mut self, value: f32) {
        self.state = value;
    }

    fn update_coeffs(&mut self) {
        self.attack_coeff = time_constant_coeff(self.attack_ms, self.sample_rate);
        self.release_coeff = time_constant_coeff(self.release_ms, self.sample_rate);
    }
}
