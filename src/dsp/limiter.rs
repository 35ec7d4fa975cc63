//! Lookahead Limiter
//!
//! # Perceptual Contract
//! - **Target Source**: Post-shaper wet signal.
//! - **Intended Effect**: Hold peaks at the ceiling without audible overshoot.
//! - **Failure Modes**:
//!   - Pumping if the release is very short relative to the material.
//! - **Will Not Do**:
//!   - Loudness maximizing or makeup gain.
//!
//! # How it works
//! The detector watches the *incoming* sample while the audio itself is read
//! out of a fixed delay line, so gain reduction is already in place when the
//! peak leaves the buffer. Gain moves through an explicit per-channel state
//! machine:
//!
//! ```text
//! Idle (unity) --desired < gain--> Reducing --desired > gain--> Recovering
//!      ^                              ^                              |
//!      |                              +------desired < gain----------+
//!      +----------------- gain back at unity ------------------------+
//! ```
//!
//! Reducing only accepts targets at or below the current gain and drops with
//! the detector attack coefficient. Recovering relaxes toward the desired
//! gain with the detector release coefficient. The gained sample then goes
//! through the `SoftSaturation` knee, which is transparent until 0.5 dB
//! under the ceiling and bends smoothly into it above that, so the output
//! magnitude never exceeds the ceiling and louder input never comes out
//! quieter.
//!
//! # Lifecycle
//! Delay lines are (re)allocated only by `new`, `set_sample_rate`,
//! `set_lookahead_ms` and `set_channel_count`. `process` never allocates.

use crate::dsp::saturation::SoftSaturation;
use crate::dsp::utils::{db_to_lin, follow, time_constant_coeff, DB_EPS};

pub const DEFAULT_LOOKAHEAD_MS: f32 = 2.0;
pub const DEFAULT_ATTACK_MS: f32 = 0.1;
pub const DEFAULT_RELEASE_MS: f32 = 50.0;
pub const DEFAULT_CEILING_DB: f32 = -1.0;

/// Gain within this distance of unity counts as fully recovered.
const UNITY_SNAP: f32 = 1e-4;

/// Delay length for a lookahead time: `round(ms * sr / 1000)`, at least 1.
pub fn lookahead_samples_for(lookahead_ms: f32, sample_rate: f32) -> usize {
    let samples = (lookahead_ms * sample_rate / 1000.0).round();
    if samples >= 1.0 {
        samples as usize
    } else {
        1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GainStage {
    /// Unity gain, nothing to do.
    Idle,
    /// Gain falling toward a lower target.
    Reducing,
    /// Gain relaxing back up toward the desired gain.
    Recovering,
}

/// Complete limiter state for one channel.
#[derive(Clone, Debug)]
pub struct LimiterChannel {
    delay: Vec<f32>,
    index: usize,
    envelope: f32,
    gain: f32,
    stage: GainStage,
}

impl LimiterChannel {
    fn new(len: usize) -> Self {
        Self {
            delay: vec![0.0; len.max(1)],
            index: 0,
            envelope: 0.0,
            gain: 1.0,
            stage: GainStage::Idle,
        }
    }

    fn clear(&mut self) {
        self.delay.iter_mut().for_each(|s| *s = 0.0);
        self.index = 0;
        self.envelope = 0.0;
        self.gain = 1.0;
        self.stage = GainStage::Idle;
    }

    /// Read the delayed sample out of the current slot and store `input` in
    /// its place.
    #[inline]
    fn push(&mut self, input: f32) -> f32 {
        let out = self.delay[self.index];
        self.delay[self.index] = input;
        self.index = (self.index + 1) % self.delay.len();
        out
    }

    #[inline]
    fn step_gain(&mut self, desired: f32, attack: f32, release: f32) {
        if desired < self.gain {
            // Only a target at or below the current gain is accepted here
            self.stage = GainStage::Reducing;
            let target = desired.min(self.gain);
            let next = attack * self.gain + (1.0 - attack) * target;
            self.gain = if next < self.gain { next } else { target };
        } else if desired > self.gain {
            self.stage = GainStage::Recovering;
            let next = release * self.gain + (1.0 - release) * desired;
            // Rounding can stall the approach just short of the target
            self.gain = if next > self.gain { next } else { desired };
            if 1.0 - self.gain < UNITY_SNAP {
                self.gain = 1.0;
                self.stage = GainStage::Idle;
            }
        }
    }
}

pub struct LookaheadLimiter {
    sample_rate: f32,
    lookahead_ms: f32,
    lookahead_samples: usize,
    attack_ms: f32,
    release_ms: f32,

    ceiling: f32,

    attack_coeff: f32,
    release_coeff: f32,

    channels: Vec<LimiterChannel>,
    sat: SoftSaturation,
}

impl LookaheadLimiter {
    pub fn new(sample_rate: f32, channels: usize) -> Self {
        let lookahead_samples = lookahead_samples_for(DEFAULT_LOOKAHEAD_MS, sample_rate);
        let mut limiter = Self {
            sample_rate,
            lookahead_ms: DEFAULT_LOOKAHEAD_MS,
            lookahead_samples,
            attack_ms: DEFAULT_ATTACK_MS,
            release_ms: DEFAULT_RELEASE_MS,
            ceiling: db_to_lin(DEFAULT_CEILING_DB),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            channels: (0..channels.max(1))
                .map(|_| LimiterChannel::new(lookahead_samples))
                .collect(),
            sat: SoftSaturation,
        };
        limiter.update_detector_coeffs();
        limiter
    }

    /// Reconfigure for a new rate. Resizes the delay lines and clears state.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_detector_coeffs();
        self.resize_delays();
    }

    /// Change the lookahead window. Resizes the delay lines and clears state.
    pub fn set_lookahead_ms(&mut self, ms: f32) {
        self.lookahead_ms = ms;
        self.resize_delays();
    }

    pub fn set_attack_ms(&mut self, ms: f32) {
        self.attack_ms = ms;
        self.update_detector_coeffs();
    }

    pub fn set_release_ms(&mut self, ms: f32) {
        self.release_ms = ms;
        self.update_detector_coeffs();
    }

    pub fn set_ceiling_db(&mut self, db: f32) {
        self.ceiling = db_to_lin(db);
    }

    pub fn set_channel_count(&mut self, channels: usize) {
        let channels = channels.max(1);
        let len = self.lookahead_samples;
        self.channels
            .resize_with(channels, || LimiterChannel::new(len));
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Exact delay in samples; this is the latency the limiter introduces.
    pub fn lookahead_samples(&self) -> usize {
        self.lookahead_samples
    }

    #[inline]
    pub fn process(&mut self, input: f32, channel: usize) -> f32 {
        let idx = channel % self.channels.len();
        let ceiling = self.ceiling;
        let attack = self.attack_coeff;
        let release = self.release_coeff;
        let state = &mut self.channels[idx];

        state.envelope = follow(state.envelope, input.abs(), attack, release);
        let desired = if state.envelope > ceiling {
            ceiling / (state.envelope + DB_EPS)
        } else {
            1.0
        };
        state.step_gain(desired, attack, release);

        let delayed = state.push(input);
        self.sat.process_against(delayed * state.gain, ceiling)
    }

    /// Single-channel convenience, channel 0.
    #[inline]
    pub fn process_mono(&mut self, input: f32) -> f32 {
        self.process(input, 0)
    }

    pub fn envelope(&self, channel: usize) -> f32 {
        self.channel(channel).envelope
    }

    pub fn gain(&self, channel: usize) -> f32 {
        self.channel(channel).gain
    }

    pub fn gain_stage(&self, channel: usize) -> GainStage {
        self.channel(channel).stage
    }

    pub fn reset(&mut self) {
        for state in &mut self.channels {
            state.clear();
        }
    }

    fn channel(&self, channel: usize) -> &LimiterChannel {
        &self.channels[channel % self.channels.len()]
    }

    fn update_detector_coeffs(&mut self) {
        self.attack_coeff = time_constant_coeff(self.attack_ms, self.sample_rate);
        self.release_coeff = time_constant_coeff(self.release_ms, self.sample_rate);
    }

    fn resize_delays(&mut self) {
        self.lookahead_samples = lookahead_samples_for(self.lookahead_ms, self.sample_rate);
        let len = self.lookahead_samples;
        for state in &mut self.channels {
            *state = LimiterChannel::new(len);
        }
    }
}
