//! Filters: a one-pole low-pass and a TPT state-variable filter.
//!
//! - `OnePoleLP` : "RC-style" smoother, used for the binaural head-shadow.
//! - `SvfTpt`    : Zavalishin state-variable low-pass, used for the ambient tone stage.
//!
//! Both are allocation free and stable under per-sample cutoff modulation.

use crate::dsp::{kill_denormals, one_pole_coeff_hz, tpt_g};

/// One-pole low-pass `y += a * (x - y)` with `a = 1 - exp(-2π fc / sr)`.
#[derive(Copy, Clone, Debug)]
pub struct OnePoleLP {
    a: f32,
    y: f32,
    sr: f32,
    fc: f32,
}

impl OnePoleLP {
    /// Create a low-pass with cutoff `cut_hz` and sample rate `sr`.
    #[inline]
    pub fn new(cut_hz: f32, sr: f32) -> Self {
        let mut s = Self {
            a: 0.0,
            y: 0.0,
            sr: sr.max(1.0),
            fc: cut_hz.max(0.0),
        };
        s.update_coeffs();
        s
    }

    /// Retune; skipped when the cutoff moved by less than 1 Hz.
    #[inline]
    pub fn set_cutoff_hz(&mut self, cut_hz: f32) {
        let fc = cut_hz.max(0.0);
        if (fc - self.fc).abs() < 1.0 {
            return;
        }
        self.fc = fc;
        self.update_coeffs();
    }

    #[inline]
    fn update_coeffs(&mut self) {
        self.a = 1.0 - one_pole_coeff_hz(self.fc, self.sr);
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.y += self.a * (x - self.y);
        self.y = kill_denormals(self.y);
        self.y
    }
}

/// Topology-Preserving Transform SVF, low-pass tap.
///
/// - `g = tan(π fc / sr)`
/// - `R = 1 / (2Q)`
#[derive(Copy, Clone, Debug)]
pub struct SvfTpt {
    sr: f32,
    cut: f32,
    q: f32,
    g: f32,
    r: f32,
    ic1eq: f32,
    ic2eq: f32,
}

impl SvfTpt {
    #[inline]
    pub fn new(cut_hz: f32, q: f32, sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            cut: cut_hz.max(0.0),
            q: q.max(1e-4),
            g: 0.0,
            r: 0.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
        };
        s.recalc();
        s
    }

    #[inline] pub fn cutoff_hz(&self) -> f32 { self.cut }

    #[inline]
    fn recalc(&mut self) {
        self.g = tpt_g(self.cut, self.sr);
        self.r = 1.0 / (2.0 * self.q);
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        // Solve the zero-delay feedback loop, then update both integrators.
        let hp = (x - (2.0 * self.r + self.g) * self.ic1eq - self.ic2eq)
            / (1.0 + 2.0 * self.r * self.g + self.g * self.g);
        let bp = self.g * hp + self.ic1eq;
        let lp = self.g * bp + self.ic2eq;

        self.ic1eq = kill_denormals(self.g * hp + bp);
        self.ic2eq = kill_denormals(self.g * bp + lp);
        lp
    }
}

// ------------------------------------ Tests --------------------------------------
