//! Small numeric helpers shared by every stage.

use std::f32::consts::PI;

/// Floor used when dividing by (or taking the log of) an envelope.
pub const DB_EPS: f32 = 1e-9;

#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// One-pole smoothing coefficient for a time constant in milliseconds.
///
/// Time constants shorter than one sample give `0.0` (instant response).
#[inline]
pub fn time_constant_coeff(ms: f32, sample_rate: f32) -> f32 {
    let samples = ms * 0.001 * sample_rate;
    if samples > 1.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

/// Leak coefficient of a one-pole split filter at `cutoff_hz`.
///
/// Used as `low += coeff * (x - low)`, so the split stays anchored to the
/// cutoff frequency regardless of sample rate.
#[inline]
pub fn split_coeff(cutoff_hz: f32, sample_rate: f32) -> f32 {
    1.0 - (-2.0 * PI * cutoff_hz / sample_rate).exp()
}

/// Single attack/release step of a peak follower.
#[inline]
pub fn follow(state: f32, rectified: f32, attack: f32, release: f32) -> f32 {
    let coeff = if rectified > state { attack } else { release };
    coeff * state + (1.0 - coeff) * rectified
}
