//! Building blocks (nodes) for the synthesis bank and the render graph.
//!
//! These are zero-allocation, per-sample components designed for realtime use.
//!
//! Contents:
//! - `SineOsc`        : phase-accumulating sine for gliding-pitch generators
//! - `BinauralPanner` : lightweight HRTF approximation (ITD + head shadow + distance)
//!
//! Notes:
//! - Frequency is **Hz**; methods expect the current **sample rate** when stepping.

use glam::Vec3;
use tingle_core::dsp::{clamp, fast_sin, lerp, TAU};
use tingle_core::filters::OnePoleLP;
use tingle_core::param::{AutomatedParam, ParamEvent};

use crate::sound::AudioPosition;
use crate::spatial::PannerConfig;

/// Free-running sine. Returns the value at the current phase, then advances,
/// so the first sample is `sin(0)`.
#[derive(Copy, Clone, Debug)]
pub struct SineOsc {
    phase: f32, // [0,1)
    freq: f32,  // Hz
}

impl SineOsc {
    #[inline] pub fn new(freq_hz: f32) -> Self { Self { phase: 0.0, freq: freq_hz } }
    #[inline] pub fn set_freq(&mut self, hz: f32) { self.freq = hz.max(0.0); }

    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        let s = fast_sin(TAU * self.phase);
        self.phase = (self.phase + self.freq / sr) % 1.0;
        s
    }
}

// ---------------------------------- Binaural -------------------------------------

/// Spherical-head radius (m) for the Woodworth ITD model.
const HEAD_RADIUS_M: f32 = 0.0875;
const SPEED_OF_SOUND_M_S: f32 = 343.0;
/// Delay line length; covers the maximum ITD (~0.66 ms) up to 192 kHz.
const ITD_RING: usize = 128;
/// Far-ear head-shadow cutoff at full lateral displacement.
const SHADOW_MIN_HZ: f32 = 2_400.0;
const OPEN_EAR_HZ: f32 = 18_000.0;
/// Far-ear level drop at full lateral displacement.
const SHADOW_LEVEL_DROP: f32 = 0.45;

/// Binaural panner with automatable x/y/z.
///
/// The source position feeds three cues per sample:
/// - interaural time difference (Woodworth) via a fractional delay on the far ear,
/// - interaural level/spectral difference via a one-pole head shadow on the far ear,
/// - inverse-law distance attenuation shared by both ears.
#[derive(Copy, Clone, Debug)]
pub struct BinauralPanner {
    sr: f32,
    config: PannerConfig,
    x: AutomatedParam,
    y: AutomatedParam,
    z: AutomatedParam,
    ring: [f32; ITD_RING],
    w: usize,
    shadow_l: OnePoleLP,
    shadow_r: OnePoleLP,
}

impl BinauralPanner {
    pub fn new(sr: f32, config: PannerConfig, at: AudioPosition) -> Self {
        let open = OPEN_EAR_HZ.min(0.45 * sr);
        Self {
            sr,
            config,
            x: AutomatedParam::new(at.x, sr),
            y: AutomatedParam::new(at.y, sr),
            z: AutomatedParam::new(at.z, sr),
            ring: [0.0; ITD_RING],
            w: 0,
            shadow_l: OnePoleLP::new(open, sr),
            shadow_r: OnePoleLP::new(open, sr),
        }
    }

    #[inline] pub fn x_mut(&mut self) -> &mut AutomatedParam { &mut self.x }
    #[inline] pub fn y_mut(&mut self) -> &mut AutomatedParam { &mut self.y }
    #[inline] pub fn z_mut(&mut self) -> &mut AutomatedParam { &mut self.z }

    /// Schedule the same event shape on all three axes.
    pub fn schedule_position(&mut self, event: impl Fn(f32) -> ParamEvent, to: AudioPosition) {
        self.x.schedule(event(to.x));
        self.y.schedule(event(to.y));
        self.z.schedule(event(to.z));
    }

    /// Current (possibly mid-ramp) position.
    pub fn position(&self) -> AudioPosition {
        AudioPosition::new(self.x.value(), self.y.value(), self.z.value())
    }

    /// Process one mono sample at context time `t`, returning `(left, right)`.
    #[inline]
    pub fn process(&mut self, t: f64, input: f32) -> (f32, f32) {
        let pos = Vec3::new(self.x.tick(t), self.y.tick(t), self.z.tick(t));
        let distance = pos.length();
        let gain = self.config.distance_gain(distance);

        // Lateral component in [-1, 1]: sine of the angle off the median plane.
        let lateral = if distance > 1e-4 { clamp(pos.x / distance, -1.0, 1.0) } else { 0.0 };
        let side = lateral.abs();

        let theta = side.asin();
        let itd = HEAD_RADIUS_M / SPEED_OF_SOUND_M_S * (theta + theta.sin());
        let delay = clamp(itd * self.sr, 0.0, (ITD_RING - 2) as f32);

        self.ring[self.w] = input;
        let delayed = self.read_delayed(delay);
        self.w = (self.w + 1) % ITD_RING;

        let open = OPEN_EAR_HZ.min(0.45 * self.sr);
        let far_cut = lerp(open, SHADOW_MIN_HZ, side);
        let far_level = 1.0 - SHADOW_LEVEL_DROP * side;

        let (near, far) = (input, delayed * far_level);
        let (l, r) = if lateral >= 0.0 {
            self.shadow_l.set_cutoff_hz(far_cut);
            self.shadow_r.set_cutoff_hz(open);
            (self.shadow_l.process(far), self.shadow_r.process(near))
        } else {
            self.shadow_l.set_cutoff_hz(open);
            self.shadow_r.set_cutoff_hz(far_cut);
            (self.shadow_l.process(near), self.shadow_r.process(far))
        };
        (l * gain, r * gain)
    }

    #[inline]
    fn read_delayed(&self, delay: f32) -> f32 {
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let a = self.ring[(self.w + ITD_RING - whole) % ITD_RING];
        let b = self.ring[(self.w + ITD_RING - whole - 1) % ITD_RING];
        lerp(a, b, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    fn energy(panner: &mut BinauralPanner) -> (f32, f32) {
        let mut osc = SineOsc::new(440.0);
        let (mut el, mut er) = (0.0, 0.0);
        for i in 0..4800 {
            let (l, r) = panner.process(f64::from(i) / f64::from(SR), osc.next(SR));
            el += l * l;
            er += r * r;
        }
        (el, er)
    }

    #[test]
    fn sine_osc_starts_at_zero_and_cycles() {
        let mut osc = SineOsc::new(SR / 4.0);
        let v: Vec<f32> = (0..4).map(|_| osc.next(SR)).collect();
        assert!(v[0].abs() < 1e-3);
        assert!((v[1] - 1.0).abs() < 2e-3);
        assert!((v[3] + 1.0).abs() < 2e-3);
    }

    #[test]
    fn source_on_the_right_is_louder_right() {
        let mut p = BinauralPanner::new(SR, PannerConfig::default(), AudioPosition::new(1.0, 0.0, 0.0));
        let (l, r) = energy(&mut p);
        assert!(r > l * 2.0, "l={l} r={r}");
    }

    #[test]
    fn source_on_the_left_is_louder_left() {
        let mut p = BinauralPanner::new(SR, PannerConfig::default(), AudioPosition::new(-1.0, 0.0, 0.0));
        let (l, r) = energy(&mut p);
        assert!(l > r * 2.0, "l={l} r={r}");
    }

    #[test]
    fn centered_source_is_balanced() {
        let mut p = BinauralPanner::new(SR, PannerConfig::default(), AudioPosition::new(0.0, 0.0, -1.0));
        let (l, r) = energy(&mut p);
        assert!((l - r).abs() / l < 1e-3, "l={l} r={r}");
    }

    #[test]
    fn distance_attenuates() {
        let mut near = BinauralPanner::new(SR, PannerConfig::default(), AudioPosition::new(0.0, 0.0, -1.0));
        let mut far = BinauralPanner::new(SR, PannerConfig::default(), AudioPosition::new(0.0, 0.0, -2.0));
        let (nl, _) = energy(&mut near);
        let (fl, _) = energy(&mut far);
        // Inverse law: gain 1/2 → energy 1/4.
        assert!((fl / nl - 0.25).abs() < 0.01, "ratio={}", fl / nl);
    }

    #[test]
    fn scheduled_position_glides() {
        let mut p = BinauralPanner::new(SR, PannerConfig::default(), AudioPosition::new(-1.0, 0.0, 0.0));
        p.schedule_position(|v| ParamEvent::set_target(0.0, v, 0.05), AudioPosition::new(1.0, 0.0, 0.0));
        p.process(0.0, 0.0);
        let early = p.position().x;
        assert!(early > -1.0 && early < 0.0, "x={early}");
    }
}
