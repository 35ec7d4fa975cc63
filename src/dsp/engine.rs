//! DustPress engine (top-level pipeline)
//!
//! Owns one instance of every stage plus the per-channel filter memory, and
//! runs them in a fixed order for every frame:
//!
//! 1. Envelope of the mono-summed dry signal
//! 2. Gate/comp gain `(1 - g) + g * env^2` with makeup `1 + 0.2 * g`
//! 3. Smoothed drive plus envelope modulation, converted to linear
//! 4. Tilt -> curve bank -> air -> lookahead limiter, per channel
//! 5. Wet/dry mix, output trim, hard clamp to [-1, 1]
//!
//! # Real-time Contract
//! - `process_block*` never allocates, locks or logs. In debug builds the
//!   block loop runs inside `assert_no_alloc`.
//! - Allocation only happens at construction, `set_sample_rate` and
//!   `set_lookahead_ms` (delay-line resize).
//! - The only latency is the limiter lookahead, see `latency_samples()`.
//!
//! # Parameters
//! Setters trust the caller to pre-clamp; range policy lives in the host
//! layer. Every setter is a no-op when the value is unchanged, and
//! `coefficient_revision()` counts the ones that were not.

use serde::{Deserialize, Serialize};

use crate::dsp::air_eq::{AirEq, AirState};
use crate::dsp::curve_bank::{CurveBank, DEFAULT_CHAOS_SEED};
use crate::dsp::envelope::{self, EnvelopeFollower};
use crate::dsp::limiter::{self, LookaheadLimiter};
use crate::dsp::smoother::ParamSmoother;
use crate::dsp::tilt_eq::{TiltEq, TiltState};
use crate::dsp::utils::db_to_lin;

pub const CHANNELS: usize = 2;

/// Makeup gain per unit of gate/comp amount.
const GATE_MAKEUP: f32 = 0.2;
const DEFAULT_DRIVE_SMOOTHING_MS: f32 = 5.0;

pub const DEFAULT_DRIVE_DB: f32 = 12.0;
pub const DEFAULT_BIAS: f32 = 0.0;
pub const DEFAULT_CURVE_INDEX: u8 = 0;
pub const DEFAULT_CHAOS: f32 = 0.0;
pub const DEFAULT_ENV_TO_DRIVE_DB: f32 = 6.0;
pub const DEFAULT_GATE_COMP: f32 = 0.2;
pub const DEFAULT_PRE_TILT: f32 = 0.0;
pub const DEFAULT_POST_AIR_DB: f32 = 0.0;
pub const DEFAULT_DIRT: f32 = 0.1;
pub const DEFAULT_CEILING_DB: f32 = limiter::DEFAULT_CEILING_DB;
pub const DEFAULT_OUTPUT_TRIM_DB: f32 = 0.0;
pub const DEFAULT_MIX: f32 = 0.5;

/// Fixed timing of the engine. Not exposed as live controls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub env_attack_ms: f32,
    pub env_release_ms: f32,
    pub drive_smoothing_ms: f32,
    pub lookahead_ms: f32,
    pub limiter_attack_ms: f32,
    pub limiter_release_ms: f32,
    pub chaos_seed: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            env_attack_ms: envelope::DEFAULT_ATTACK_MS,
            env_release_ms: envelope::DEFAULT_RELEASE_MS,
            drive_smoothing_ms: DEFAULT_DRIVE_SMOOTHING_MS,
            lookahead_ms: limiter::DEFAULT_LOOKAHEAD_MS,
            limiter_attack_ms: limiter::DEFAULT_ATTACK_MS,
            limiter_release_ms: limiter::DEFAULT_RELEASE_MS,
            chaos_seed: DEFAULT_CHAOS_SEED,
        }
    }
}

/// Per-frame diagnostic record for offline tooling.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TelemetrySample {
    pub env: f32,
    pub gate_gain: f32,
    pub drive_db_applied: f32,
    /// Loudest channel's limiter detector.
    pub limiter_env: f32,
    /// Deepest gain reduction across channels.
    pub limiter_gain: f32,
}

/// Control-side values computed once per frame, shared by both channels.
#[derive(Clone, Copy)]
struct FrameControl {
    env: f32,
    gate_gain: f32,
    drive_db: f32,
}

pub struct DustPress {
    sample_rate: f32,
    settings: EngineSettings,

    // Controls
    drive_db: f32,
    bias: f32,
    curve_index: u8,
    chaos: f32,
    env_to_drive_db: f32,
    gate_comp: f32,
    pre_tilt: f32,
    post_air_db: f32,
    dirt: f32,
    ceiling_db: f32,
    output_trim_db: f32,
    mix: f32,

    // Derived
    makeup: f32,
    output_trim: f32,
    coefficient_revision: u64,

    // Stages
    envelope: EnvelopeFollower,
    drive_smoother: ParamSmoother,
    tilt: TiltEq,
    curves: CurveBank,
    air: AirEq,
    limiter: LookaheadLimiter,

    // Per-channel filter memory
    tilt_state: [TiltState; CHANNELS],
    air_state: [AirState; CHANNELS],
}

impl DustPress {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_settings(sample_rate, EngineSettings::default())
    }

    pub fn with_settings(sample_rate: f32, settings: EngineSettings) -> Self {
        let mut envelope = EnvelopeFollower::new(sample_rate);
        envelope.set_attack_ms(settings.env_attack_ms);
        envelope.set_release_ms(settings.env_release_ms);

        let mut drive_smoother = ParamSmoother::new(sample_rate, settings.drive_smoothing_ms);
        drive_smoother.reset(DEFAULT_DRIVE_DB);

        let mut limiter = LookaheadLimiter::new(sample_rate, CHANNELS);
        limiter.set_attack_ms(settings.limiter_attack_ms);
        limiter.set_release_ms(settings.limiter_release_ms);
        limiter.set_lookahead_ms(settings.lookahead_ms);
        limiter.set_ceiling_db(DEFAULT_CEILING_DB);

        let mut curves = CurveBank::with_seed(settings.chaos_seed);
        curves.set_index(DEFAULT_CURVE_INDEX);
        curves.set_bias(DEFAULT_BIAS);
        curves.set_dirt(DEFAULT_DIRT);
        curves.set_chaos(DEFAULT_CHAOS);

        let mut tilt = TiltEq::new(sample_rate);
        tilt.set_slope(DEFAULT_PRE_TILT);
        let mut air = AirEq::new(sample_rate);
        air.set_gain_db(DEFAULT_POST_AIR_DB);

        log::debug!(
            "DustPress created at {} Hz, lookahead {} samples",
            sample_rate,
            limiter.lookahead_samples()
        );

        Self {
            sample_rate,
            settings,
            drive_db: DEFAULT_DRIVE_DB,
            bias: DEFAULT_BIAS,
            curve_index: DEFAULT_CURVE_INDEX,
            chaos: DEFAULT_CHAOS,
            env_to_drive_db: DEFAULT_ENV_TO_DRIVE_DB,
            gate_comp: DEFAULT_GATE_COMP,
            pre_tilt: DEFAULT_PRE_TILT,
            post_air_db: DEFAULT_POST_AIR_DB,
            dirt: DEFAULT_DIRT,
            ceiling_db: DEFAULT_CEILING_DB,
            output_trim_db: DEFAULT_OUTPUT_TRIM_DB,
            mix: DEFAULT_MIX,
            makeup: 1.0 + DEFAULT_GATE_COMP * GATE_MAKEUP,
            output_trim: db_to_lin(DEFAULT_OUTPUT_TRIM_DB),
            coefficient_revision: 0,
            envelope,
            drive_smoother,
            tilt,
            curves,
            air,
            limiter,
            tilt_state: [TiltState::default(); CHANNELS],
            air_state: [AirState::default(); CHANNELS],
        }
    }

    // ---------------------------------------------------------------------
    // Configuration (non-realtime)
    // ---------------------------------------------------------------------

    /// Reconfigure every stage for a new rate and clear all state.
    /// Same rate is a no-op.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.envelope.set_sample_rate(sample_rate);
        self.drive_smoother.set_sample_rate(sample_rate);
        self.tilt.set_sample_rate(sample_rate);
        self.air.set_sample_rate(sample_rate);
        self.limiter.set_sample_rate(sample_rate);
        self.coefficient_revision += 1;
        self.reset();

        log::info!(
            "DustPress sample rate {} Hz, latency {} samples",
            sample_rate,
            self.latency_samples()
        );
    }

    /// Change the limiter lookahead window. Resizes the delay lines, clears
    /// limiter state and changes `latency_samples()`.
    pub fn set_lookahead_ms(&mut self, ms: f32) {
        if ms == self.settings.lookahead_ms {
            return;
        }
        self.settings.lookahead_ms = ms;
        self.limiter.set_lookahead_ms(ms);
        self.coefficient_revision += 1;

        log::info!(
            "DustPress lookahead {} ms, latency {} samples",
            ms,
            self.latency_samples()
        );
    }

    /// Clear filter, envelope and delay state and rewind the chaos generator.
    /// Sample rate and control values are kept.
    pub fn reset(&mut self) {
        self.envelope.reset();
        self.drive_smoother.reset(self.drive_db);
        for state in &mut self.tilt_state {
            state.reset();
        }
        for state in &mut self.air_state {
            state.reset();
        }
        self.curves.reseed(self.settings.chaos_seed);
        self.limiter.reset();
    }

    // ---------------------------------------------------------------------
    // Controls
    // ---------------------------------------------------------------------

    pub fn set_drive_db(&mut self, db: f32) {
        if db == self.drive_db {
            return;
        }
        self.drive_db = db;
        self.drive_smoother.set_target(db);
        self.coefficient_revision += 1;
    }

    pub fn set_bias(&mut self, bias: f32) {
        if bias == self.bias {
            return;
        }
        self.bias = bias;
        self.curves.set_bias(bias);
        self.coefficient_revision += 1;
    }

    /// Curve family; wraps modulo the number of curves.
    pub fn set_curve_index(&mut self, index: u8) {
        if index == self.curve_index {
            return;
        }
        self.curve_index = index;
        self.curves.set_index(index);
        self.coefficient_revision += 1;
    }

    /// Chaos amount, 0..7.
    pub fn set_chaos(&mut self, chaos: f32) {
        if chaos == self.chaos {
            return;
        }
        self.chaos = chaos;
        self.curves.set_chaos(chaos);
        self.coefficient_revision += 1;
    }

    pub fn set_env_to_drive_db(&mut self, db: f32) {
        if db == self.env_to_drive_db {
            return;
        }
        self.env_to_drive_db = db;
        self.coefficient_revision += 1;
    }

    pub fn set_gate_comp(&mut self, amount: f32) {
        if amount == self.gate_comp {
            return;
        }
        self.gate_comp = amount;
        self.makeup = 1.0 + amount * GATE_MAKEUP;
        self.coefficient_revision += 1;
    }

    /// Pre-shaper tilt in dB per octave.
    pub fn set_pre_tilt(&mut self, slope_db: f32) {
        if slope_db == self.pre_tilt {
            return;
        }
        self.pre_tilt = slope_db;
        self.tilt.set_slope(slope_db);
        self.coefficient_revision += 1;
    }

    /// Post-shaper air shelf gain in dB.
    pub fn set_post_air(&mut self, gain_db: f32) {
        if gain_db == self.post_air_db {
            return;
        }
        self.post_air_db = gain_db;
        self.air.set_gain_db(gain_db);
        self.coefficient_revision += 1;
    }

    pub fn set_dirt(&mut self, dirt: f32) {
        if dirt == self.dirt {
            return;
        }
        self.dirt = dirt;
        self.curves.set_dirt(dirt);
        self.coefficient_revision += 1;
    }

    pub fn set_ceiling_db(&mut self, db: f32) {
        if db == self.ceiling_db {
            return;
        }
        self.ceiling_db = db;
        self.limiter.set_ceiling_db(db);
        self.coefficient_revision += 1;
    }

    pub fn set_output_trim_db(&mut self, db: f32) {
        if db == self.output_trim_db {
            return;
        }
        self.output_trim_db = db;
        self.output_trim = db_to_lin(db);
        self.coefficient_revision += 1;
    }

    pub fn set_mix(&mut self, mix: f32) {
        if mix == self.mix {
            return;
        }
        self.mix = mix;
        self.coefficient_revision += 1;
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Exact algorithmic latency (the limiter lookahead).
    pub fn latency_samples(&self) -> usize {
        self.limiter.lookahead_samples()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn limiter(&self) -> &LookaheadLimiter {
        &self.limiter
    }

    /// Number of accepted control or configuration changes so far.
    pub fn coefficient_revision(&self) -> u64 {
        self.coefficient_revision
    }

    // ---------------------------------------------------------------------
    // Processing
    // ---------------------------------------------------------------------

    /// Process `frames = min(len)` frames from the inputs into the outputs.
    pub fn process_block(
        &mut self,
        in_l: &[f32],
        in_r: &[f32],
        out_l: &mut [f32],
        out_r: &mut [f32],
    ) {
        debug_assert!(
            in_l.len() == in_r.len() && in_l.len() == out_l.len() && in_l.len() == out_r.len(),
            "process_block buffers differ in length"
        );
        let frames = in_l.len().min(in_r.len()).min(out_l.len()).min(out_r.len());
        if frames == 0 {
            return;
        }

        #[cfg(debug_assertions)]
        assert_no_alloc::assert_no_alloc(|| {
            self.run_block(&in_l[..frames], &in_r[..frames], out_l, out_r);
        });
        #[cfg(not(debug_assertions))]
        self.run_block(&in_l[..frames], &in_r[..frames], out_l, out_r);
    }

    /// Same result as `process_block`, written over the input buffers.
    pub fn process_block_in_place(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len(), "channel buffers differ in length");
        if left.is_empty() || right.is_empty() {
            return;
        }

        #[cfg(debug_assertions)]
        assert_no_alloc::assert_no_alloc(|| {
            self.run_block_in_place(left, right);
        });
        #[cfg(not(debug_assertions))]
        self.run_block_in_place(left, right);
    }

    /// `process_block` plus one `TelemetrySample` per frame. Frames beyond
    /// `telemetry.len()` are processed but not recorded.
    pub fn process_block_with_telemetry(
        &mut self,
        in_l: &[f32],
        in_r: &[f32],
        out_l: &mut [f32],
        out_r: &mut [f32],
        telemetry: &mut [TelemetrySample],
    ) {
        let frames = in_l.len().min(in_r.len()).min(out_l.len()).min(out_r.len());
        debug_assert!(telemetry.len() >= frames, "telemetry buffer too short");

        for i in 0..frames {
            let (l, r, control) = self.process_frame(in_l[i], in_r[i]);
            out_l[i] = l;
            out_r[i] = r;
            if let Some(slot) = telemetry.get_mut(i) {
                *slot = self.telemetry_for(control);
            }
        }
    }

    fn run_block(&mut self, in_l: &[f32], in_r: &[f32], out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = in_l.iter().zip(in_r).zip(out_l.iter_mut().zip(out_r.iter_mut()));
        for ((&dry_l, &dry_r), (l, r)) in frames {
            let (wet_l, wet_r, _) = self.process_frame(dry_l, dry_r);
            *l = wet_l;
            *r = wet_r;
        }
    }

    fn run_block_in_place(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r, _) = self.process_frame(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    #[inline]
    fn process_frame(&mut self, dry_l: f32, dry_r: f32) -> (f32, f32, FrameControl) {
        // Mono-summed envelope keeps the modulation identical on both sides
        let env = self.envelope.process(0.5 * (dry_l.abs() + dry_r.abs()));

        let gate_gain = (1.0 - self.gate_comp) + self.gate_comp * env * env;
        let drive_db = self.drive_smoother.process() + env * self.env_to_drive_db;
        let pre_gain = gate_gain * self.makeup * db_to_lin(drive_db);

        let wet_l = self.shape_channel(dry_l * pre_gain, 0);
        let wet_r = self.shape_channel(dry_r * pre_gain, 1);

        let out_l = self.finish(wet_l, dry_l);
        let out_r = self.finish(wet_r, dry_r);

        (
            out_l,
            out_r,
            FrameControl {
                env,
                gate_gain,
                drive_db,
            },
        )
    }

    #[inline]
    fn shape_channel(&mut self, input: f32, channel: usize) -> f32 {
        let tilted = self.tilt.process(input, &mut self.tilt_state[channel]);
        let shaped = self.curves.process(tilted);
        let aired = self.air.process(shaped, &mut self.air_state[channel]);
        self.limiter.process(aired, channel)
    }

    #[inline]
    fn finish(&self, wet: f32, dry: f32) -> f32 {
        let mixed = wet * self.mix + dry * (1.0 - self.mix);
        (mixed * self.output_trim).clamp(-1.0, 1.0)
    }

    fn telemetry_for(&self, control: FrameControl) -> TelemetrySample {
        let mut limiter_env: f32 = 0.0;
        let mut limiter_gain: f32 = 1.0;
        for ch in 0..self.limiter.channel_count() {
            limiter_env = limiter_env.max(self.limiter.envelope(ch));
            limiter_gain = limiter_gain.min(self.limiter.gain(ch));
        }
        TelemetrySample {
            env: control.env,
            gate_gain: control.gate_gain,
            drive_db_applied: control.drive_db,
            limiter_env,
            limiter_gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::limiter::lookahead_samples_for;

    /// The scenario configuration: 12 dB drive into tanh, -1 dBFS ceiling,
    /// everything else neutral.
    fn scenario_engine(sample_rate: f32) -> DustPress {
        let mut engine = DustPress::new(sample_rate);
        engine.set_drive_db(12.0);
        engine.set_bias(0.0);
        engine.set_curve_index(0);
        engine.set_chaos(0.0);
        engine.set_env_to_drive_db(0.0);
        engine.set_gate_comp(0.0);
        engine.set_pre_tilt(0.0);
        engine.set_post_air(0.0);
        engine.set_dirt(0.0);
        engine.set_ceiling_db(-1.0);
        engine.set_mix(1.0);
        engine.set_output_trim_db(0.0);
        engine
    }

    fn program(len: usize, sample_rate: f32) -> (Vec<f32>, Vec<f32>) {
        let mut noise: u32 = 0x1234_5678;
        let mut left = Vec::with_capacity(len);
        let mut right = Vec::with_capacity(len);
        for i in 0..len {
            noise = noise.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let n = (noise >> 8) as f32 / 16_777_216.0 - 0.5;
            let t = i as f32 / sample_rate;
            let burst = if (i / 4800) % 3 == 0 { 1.0 } else { 0.2 };
            left.push(((t * 2.0 * std::f32::consts::PI * 110.0).sin() * 0.7 + n * 0.2) * burst);
            right.push(((t * 2.0 * std::f32::consts::PI * 330.0).sin() * 0.5 - n * 0.2) * burst);
        }
        (left, right)
    }

    fn render(engine: &mut DustPress, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut out_l = vec![0.0; left.len()];
        let mut out_r = vec![0.0; right.len()];
        engine.process_block(left, right, &mut out_l, &mut out_r);
        (out_l, out_r)
    }

    #[test]
    fn test_impulse_emerges_after_lookahead_under_ceiling() {
        let mut engine = scenario_engine(48000.0);
        let latency = engine.latency_samples();
        assert_eq!(latency, 96);

        let mut left = vec![0.0f32; 512];
        let mut right = vec![0.0f32; 512];
        left[0] = 0.9;
        right[0] = 0.9;
        let (out_l, out_r) = render(&mut engine, &left, &right);

        let ceiling = db_to_lin(-1.0);
        for (i, (&l, &r)) in out_l.iter().zip(&out_r).enumerate() {
            if i == latency {
                // tanh(0.9 * 3.98) ~= 0.998 lands at the top of the knee
                assert!(l > 0.88 && l <= ceiling, "peak {}", l);
                assert_eq!(l, r);
            } else {
                assert!(l.abs() < 1e-6, "sample {} = {}", i, l);
                assert!(r.abs() < 1e-6, "sample {} = {}", i, r);
            }
        }
    }

    #[test]
    fn test_zero_mix_is_bypass() {
        let (left, right) = program(9600, 48000.0);
        let mut engine = DustPress::new(48000.0);
        engine.set_drive_db(30.0);
        engine.set_bias(0.7);
        engine.set_curve_index(3);
        engine.set_chaos(7.0);
        engine.set_env_to_drive_db(12.0);
        engine.set_gate_comp(1.0);
        engine.set_pre_tilt(6.0);
        engine.set_post_air(-6.0);
        engine.set_dirt(1.0);
        engine.set_ceiling_db(-6.0);
        engine.set_mix(0.0);

        let (out_l, out_r) = render(&mut engine, &left, &right);
        assert_eq!(out_l, left);
        assert_eq!(out_r, right);
    }

    #[test]
    fn test_silence_in_silence_out() {
        for curve in 0..4u8 {
            let mut engine = DustPress::new(44100.0);
            engine.set_curve_index(curve);
            engine.set_drive_db(36.0);
            engine.set_dirt(1.0);
            engine.set_gate_comp(0.5);
            engine.set_pre_tilt(-6.0);
            engine.set_post_air(6.0);
            engine.set_mix(1.0);
            engine.set_output_trim_db(6.0);

            let silence = vec![0.0f32; 4096];
            let (out_l, out_r) = render(&mut engine, &silence, &silence);
            assert!(out_l.iter().chain(&out_r).all(|&s| s == 0.0), "curve {}", curve);
        }
    }

    #[test]
    fn test_full_chaos_is_deterministic() {
        let (left, right) = program(24_000, 48000.0);
        let run = || {
            let mut engine = DustPress::new(48000.0);
            engine.set_chaos(7.0);
            engine.set_mix(1.0);
            render(&mut engine, &left, &right)
        };
        let (a_l, a_r) = run();
        let (b_l, b_r) = run();
        assert!(a_l.iter().zip(&b_l).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(a_r.iter().zip(&b_r).all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_reset_replays_bit_identically() {
        let (left, right) = program(4800, 48000.0);
        let mut engine = DustPress::new(48000.0);
        engine.set_chaos(5.0);
        engine.set_mix(0.8);
        let first = render(&mut engine, &left, &right);
        engine.reset();
        let second = render(&mut engine, &left, &right);
        assert_eq!(first, second);
    }

    #[test]
    fn test_setters_are_idempotent() {
        let mut engine = scenario_engine(48000.0);
        let revision = engine.coefficient_revision();

        engine.set_drive_db(12.0);
        engine.set_bias(0.0);
        engine.set_curve_index(0);
        engine.set_chaos(0.0);
        engine.set_env_to_drive_db(0.0);
        engine.set_gate_comp(0.0);
        engine.set_pre_tilt(0.0);
        engine.set_post_air(0.0);
        engine.set_dirt(0.0);
        engine.set_ceiling_db(-1.0);
        engine.set_output_trim_db(0.0);
        engine.set_mix(1.0);
        engine.set_sample_rate(48000.0);
        engine.set_lookahead_ms(limiter::DEFAULT_LOOKAHEAD_MS);
        assert_eq!(engine.coefficient_revision(), revision);

        engine.set_post_air(1.5);
        assert_eq!(engine.coefficient_revision(), revision + 1);
        engine.set_post_air(1.5);
        assert_eq!(engine.coefficient_revision(), revision + 1);
    }

    #[test]
    fn test_sample_rate_change_clears_state() {
        let (left, right) = program(9600, 48000.0);
        let configure = |engine: &mut DustPress| {
            engine.set_chaos(4.0);
            engine.set_pre_tilt(2.0);
            engine.set_post_air(3.0);
            engine.set_mix(1.0);
        };

        // Dirty every stage at 48 kHz, then move to 96 kHz
        let mut moved = DustPress::new(48000.0);
        configure(&mut moved);
        render(&mut moved, &left, &right);
        moved.set_sample_rate(96000.0);
        assert_eq!(moved.sample_rate(), 96000.0);

        let mut fresh = DustPress::new(96000.0);
        configure(&mut fresh);

        let (moved_l, moved_r) = render(&mut moved, &left, &right);
        let (fresh_l, fresh_r) = render(&mut fresh, &left, &right);
        assert!(moved_l.iter().zip(&fresh_l).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(moved_r.iter().zip(&fresh_r).all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_unchanged_sample_rate_keeps_state() {
        let (left, right) = program(9600, 48000.0);
        let mut split = DustPress::new(48000.0);
        let mut whole = DustPress::new(48000.0);
        for engine in [&mut split, &mut whole] {
            engine.set_chaos(4.0);
            engine.set_mix(1.0);
        }

        let half = left.len() / 2;
        let (mut out_l, mut out_r) = render(&mut split, &left[..half], &right[..half]);
        let revision = split.coefficient_revision();
        split.set_sample_rate(48000.0);
        assert_eq!(split.coefficient_revision(), revision);
        let (tail_l, tail_r) = render(&mut split, &left[half..], &right[half..]);
        out_l.extend(tail_l);
        out_r.extend(tail_r);

        assert_eq!((out_l, out_r), render(&mut whole, &left, &right));
    }

    #[test]
    fn test_latency_tracks_configuration() {
        let mut engine = DustPress::new(48000.0);
        assert_eq!(engine.latency_samples(), 96);

        let (left, right) = program(2048, 48000.0);
        for chunk in [7usize, 64, 512, 1] {
            let mut out_l = vec![0.0; chunk];
            let mut out_r = vec![0.0; chunk];
            engine.process_block(&left[..chunk], &right[..chunk], &mut out_l, &mut out_r);
            engine.set_drive_db(20.0);
            assert_eq!(engine.latency_samples(), 96);
        }

        engine.set_sample_rate(96000.0);
        assert_eq!(engine.latency_samples(), 192);
        engine.set_sample_rate(44100.0);
        assert_eq!(engine.latency_samples(), lookahead_samples_for(2.0, 44100.0));
        assert_eq!(engine.latency_samples(), 88);
        engine.set_lookahead_ms(5.0);
        assert_eq!(engine.latency_samples(), 221);
    }

    #[test]
    fn test_output_bounded_by_ceiling() {
        let (left, right) = program(48_000, 48000.0);
        let left: Vec<f32> = left.iter().map(|s| s * 4.0).collect();
        let right: Vec<f32> = right.iter().map(|s| s * 4.0).collect();

        let mut engine = DustPress::new(48000.0);
        engine.set_curve_index(3);
        engine.set_drive_db(24.0);
        engine.set_post_air(6.0);
        engine.set_ceiling_db(-3.0);
        engine.set_mix(1.0);

        let (out_l, out_r) = render(&mut engine, &left, &right);
        let ceiling = db_to_lin(-3.0) * (1.0 + 1e-6);
        assert!(out_l.iter().chain(&out_r).all(|s| s.abs() <= ceiling));
    }

    #[test]
    fn test_trim_and_clamp() {
        let mut engine = DustPress::new(48000.0);
        engine.set_mix(0.0);
        engine.set_output_trim_db(6.0);
        let input = vec![0.8f32; 64];
        let (out_l, _) = render(&mut engine, &input, &input);
        assert!(out_l.iter().all(|&s| s == 1.0));

        engine.set_output_trim_db(-6.0);
        let (out_l, _) = render(&mut engine, &input, &input);
        assert!(out_l.iter().all(|&s| (s - 0.8 * db_to_lin(-6.0)).abs() < 1e-6));
    }

    #[test]
    fn test_block_size_does_not_matter() {
        let (left, right) = program(6000, 48000.0);
        let mut whole = DustPress::new(48000.0);
        whole.set_chaos(3.0);
        let (ref_l, ref_r) = render(&mut whole, &left, &right);

        let mut chunked = DustPress::new(48000.0);
        chunked.set_chaos(3.0);
        let mut out_l = vec![0.0; left.len()];
        let mut out_r = vec![0.0; right.len()];
        let mut start = 0;
        let mut size = 1;
        while start < left.len() {
            let end = (start + size).min(left.len());
            chunked.process_block(
                &left[start..end],
                &right[start..end],
                &mut out_l[start..end],
                &mut out_r[start..end],
            );
            start = end;
            size = size * 3 % 509 + 1;
        }
        assert_eq!(out_l, ref_l);
        assert_eq!(out_r, ref_r);
    }

    #[test]
    fn test_in_place_matches_out_of_place() {
        let (left, right) = program(4096, 44100.0);
        let mut a = DustPress::new(44100.0);
        let mut b = DustPress::new(44100.0);
        for engine in [&mut a, &mut b] {
            engine.set_chaos(2.0);
            engine.set_pre_tilt(3.0);
            engine.set_mix(0.7);
        }

        let (ref_l, ref_r) = render(&mut a, &left, &right);
        let mut io_l = left.clone();
        let mut io_r = right.clone();
        b.process_block_in_place(&mut io_l, &mut io_r);
        assert_eq!(io_l, ref_l);
        assert_eq!(io_r, ref_r);
    }

    #[test]
    fn test_telemetry_leaves_audio_untouched() {
        let (left, right) = program(4800, 48000.0);
        let mut plain = DustPress::new(48000.0);
        let mut traced = DustPress::new(48000.0);
        for engine in [&mut plain, &mut traced] {
            engine.set_chaos(7.0);
            engine.set_ceiling_db(-6.0);
            engine.set_mix(1.0);
        }

        let (ref_l, ref_r) = render(&mut plain, &left, &right);
        let mut out_l = vec![0.0; left.len()];
        let mut out_r = vec![0.0; right.len()];
        let mut telemetry = vec![TelemetrySample::default(); left.len()];
        traced.process_block_with_telemetry(&left, &right, &mut out_l, &mut out_r, &mut telemetry);

        assert_eq!(out_l, ref_l);
        assert_eq!(out_r, ref_r);
        assert!(telemetry.iter().all(|t| t.env >= 0.0 && t.limiter_gain <= 1.0));
        assert!(telemetry.iter().any(|t| t.limiter_gain < 1.0));
        // Envelope modulation pushes drive above the 12 dB base
        assert!(telemetry.iter().any(|t| t.drive_db_applied > DEFAULT_DRIVE_DB + 0.5));
        assert!(telemetry.iter().all(|t| (t.gate_gain - (0.8 + 0.2 * t.env * t.env)).abs() < 1e-6));
    }

    #[test]
    fn test_zero_length_block_is_noop() {
        let (left, right) = program(1024, 48000.0);
        let mut touched = DustPress::new(48000.0);
        touched.process_block(&[], &[], &mut [], &mut []);
        touched.process_block_in_place(&mut [], &mut []);
        touched.process_block_with_telemetry(&[], &[], &mut [], &mut [], &mut []);

        let mut fresh = DustPress::new(48000.0);
        assert_eq!(
            render(&mut touched, &left, &right),
            render(&mut fresh, &left, &right)
        );
    }

    #[test]
    fn test_channels_stay_independent() {
        let (left, _) = program(4800, 48000.0);
        let silence = vec![0.0f32; left.len()];
        let mut engine = DustPress::new(48000.0);
        engine.set_mix(1.0);
        engine.set_pre_tilt(4.0);
        engine.set_post_air(4.0);

        let (out_l, out_r) = render(&mut engine, &left, &silence);
        assert!(out_l.iter().any(|&s| s.abs() > 0.1));
        assert!(out_r.iter().all(|&s| s == 0.0));
        assert_eq!(engine.limiter().gain(1), 1.0);
    }

    #[test]
    fn test_drive_changes_are_smoothed() {
        let mut engine = scenario_engine(48000.0);
        engine.set_drive_db(0.0);
        let input = vec![0.01f32; 8];
        let mut out_l = vec![0.0; 8];
        let mut out_r = vec![0.0; 8];
        let mut telemetry = vec![TelemetrySample::default(); 8];
        engine.process_block_with_telemetry(&input, &input, &mut out_l, &mut out_r, &mut telemetry);
        // 5 ms smoothing: the first few samples are still near 12 dB
        assert!(telemetry[0].drive_db_applied > 11.5);
        assert!(telemetry[7].drive_db_applied < telemetry[0].drive_db_applied);
    }

    #[test]
    fn test_settings_round_trip_through_json() {
        let settings = EngineSettings {
            lookahead_ms: 3.0,
            chaos_seed: 42,
            ..EngineSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: EngineSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);

        let partial: EngineSettings = serde_json::from_str(r#"{"lookahead_ms": 1.0}"#).unwrap();
        assert_eq!(partial.env_attack_ms, envelope::DEFAULT_ATTACK_MS);
        assert_eq!(DustPress::with_settings(48000.0, partial).latency_samples(), 48);
    }

    #[test]
    fn test_block_processing_does_not_allocate() {
        let (left, right) = program(2048, 48000.0);
        let mut out_l = vec![0.0; left.len()];
        let mut out_r = vec![0.0; right.len()];
        let mut engine = DustPress::new(48000.0);
        engine.set_chaos(7.0);
        assert_no_alloc::assert_no_alloc(|| {
            engine.process_block(&left, &right, &mut out_l, &mut out_r);
        });
    }
}
