//! Procedural synthesis bank.
//!
//! Each category renders a fixed-length mono buffer that is a pure function of
//! the descriptor's duration, seed and (for ambient beds) theme. Every generator
//! draws exactly one noise value per sample from an [`Lcg`] seeded with the
//! descriptor's seed.
//!
//! Time is `t = i / sr` in seconds. Fixed-pitch oscillators are evaluated
//! directly from `t`; only the water body glides and accumulates phase.

use std::f32::consts::PI;

use tingle_core::dsp::{exp, fast_sin, TAU};
use tingle_core::noise::Lcg;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::nodes::SineOsc;
use crate::sound::{AmbientTheme, SampleBuffer, SoundCategory, SoundDescriptor};

#[inline]
fn osc(freq_hz: f32, t: f32) -> f32 {
    fast_sin(TAU * freq_hz * t)
}

/// Render the buffer for `descriptor` at `sample_rate`.
///
/// Length is `ceil(duration * sample_rate)`. A user sound without its own buffer
/// is rendered as a whisper.
pub fn render_synth_buffer(descriptor: &SoundDescriptor, sample_rate: u32) -> Result<SampleBuffer> {
    let duration = descriptor.duration();
    if !duration.is_finite() || duration <= 0.0 {
        return Err(EngineError::invalid(format!(
            "duration of {} must be positive, got {duration}",
            descriptor.id()
        )));
    }
    if sample_rate == 0 {
        return Err(EngineError::invalid("sample rate must be positive"));
    }

    let sr = sample_rate as f32;
    let len = (f64::from(duration) * f64::from(sample_rate)).ceil() as usize;
    let mut rng = Lcg::new(descriptor.seed());
    let mut out = vec![0.0f32; len.max(1)];

    match descriptor.category() {
        SoundCategory::Whisper => whisper(&mut out, &mut rng),
        SoundCategory::Tapping => tapping(&mut out, &mut rng, sr),
        SoundCategory::Scratching => scratching(&mut out, &mut rng, sr),
        SoundCategory::Brushing => brushing(&mut out, &mut rng, sr),
        SoundCategory::Water => water(&mut out, &mut rng, sr),
        SoundCategory::EarCleaning => ear_cleaning(&mut out, &mut rng, sr),
        SoundCategory::Ambient => ambient(&mut out, &mut rng, sr, descriptor.theme()),
        SoundCategory::User => {
            debug!(sound = %descriptor.id(), "user sound has no buffer, rendering whisper");
            whisper(&mut out, &mut rng);
        }
    }

    SampleBuffer::new(out, sample_rate)
}

/// Breath-like noise under a half-sine envelope with a slow undertone.
fn whisper(out: &mut [f32], rng: &mut Lcg) {
    let len = out.len() as f32;
    for (i, s) in out.iter_mut().enumerate() {
        let i = i as f32;
        let env = fast_sin(PI * i / len).max(0.0).powf(0.7);
        // Undertone runs on the sample index, not on time.
        let tone = fast_sin(i * 0.012) * 0.18;
        *s = (rng.next_bipolar() * 0.5 + tone) * env * 0.32;
    }
}

/// A 270 Hz click plus noise under a fast exponential decay.
fn tapping(out: &mut [f32], rng: &mut Lcg, sr: f32) {
    for (i, s) in out.iter_mut().enumerate() {
        let t = i as f32 / sr;
        let env = exp(-24.0 * t);
        let click = osc(270.0, t) * env;
        let n = rng.next_bipolar() * env;
        *s = (click * 0.8 + n * 0.4) * 0.75;
    }
}

/// Gated noise with an 820 Hz edge, fading linearly over the buffer.
fn scratching(out: &mut [f32], rng: &mut Lcg, sr: f32) {
    let len = out.len() as f32;
    for (i, s) in out.iter_mut().enumerate() {
        let t = i as f32 / sr;
        let gate = if osc(18.0, t) > 0.35 { 1.0 } else { 0.25 };
        let mix = osc(820.0, t) * 0.2 + rng.next_bipolar() * 0.8;
        let fade = 1.0 - i as f32 / len;
        *s = mix * gate * fade * 0.24;
    }
}

/// Noise with a 3.5 Hz depth sway and a faint 210 Hz body.
fn brushing(out: &mut [f32], rng: &mut Lcg, sr: f32) {
    for (i, s) in out.iter_mut().enumerate() {
        let t = i as f32 / sr;
        let depth = 0.2 + 0.8 * (osc(3.5, t) + 1.0) * 0.5;
        *s = (rng.next_bipolar() * depth + osc(210.0, t) * 0.08) * 0.3;
    }
}

/// A downward-gliding droplet body with a short noise sparkle.
fn water(out: &mut [f32], rng: &mut Lcg, sr: f32) {
    // Gliding pitch needs accumulated phase.
    let mut body_osc = SineOsc::new(190.0);
    for (i, s) in out.iter_mut().enumerate() {
        let t = i as f32 / sr;
        body_osc.set_freq((190.0 - 140.0 * t).max(40.0));
        let body = body_osc.next(sr) * exp(-6.5 * t);
        let sparkle = rng.next_bipolar() * 0.35 * exp(-14.0 * t);
        *s = (body + sparkle) * 0.44;
    }
}

/// Low rumble and fuzz, pulsed at 7 Hz, decaying slowly.
fn ear_cleaning(out: &mut [f32], rng: &mut Lcg, sr: f32) {
    for (i, s) in out.iter_mut().enumerate() {
        let t = i as f32 / sr;
        let pattern = osc(36.0, t) * 0.4;
        let fuzz = rng.next_bipolar() * 0.6;
        let env = exp(-1.4 * t);
        let gate = if osc(7.0, t) > 0.0 { 1.0 } else { 0.55 };
        *s = (pattern + fuzz) * env * gate * 0.24;
    }
}

/// Loopable bed: quiet noise, two slow drifts and a themed layer.
fn ambient(out: &mut [f32], rng: &mut Lcg, sr: f32, theme: AmbientTheme) {
    for (i, s) in out.iter_mut().enumerate() {
        let t = i as f32 / sr;
        let noise = rng.next_bipolar();
        let base = noise * 0.11 + osc(0.24, t) * 0.05 + osc(0.53, t) * 0.035;
        let layer = match theme {
            AmbientTheme::Rain if osc(19.0, t) > 0.82 => noise * 0.35,
            AmbientTheme::Fire if osc(7.5, t) > 0.74 => noise * noise.abs() * 0.5,
            AmbientTheme::Forest => osc(2.6, t) * 0.06,
            AmbientTheme::Night => osc(1.1, t) * 0.05,
            _ => 0.0,
        };
        *s = (base + layer) * 0.34;
    }
}
