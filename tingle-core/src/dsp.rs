//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Optional `fast-math` approximations for the synthesis hot paths
//! - Side-effect free helpers that are easy to test
//!
//! Features used by this file:
//! - `fast-math` : polynomial sine used by the synthesis bank
//! - `simd`      : `wide`-backed bus mixing in [`mix_in_place`]

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] fn m_tan(x: f32) -> f32 { (x.sin()) / (x.cos()) }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] fn m_exp(x: f32) -> f32 { libm::expf(x) }
        #[inline] fn m_tan(x: f32) -> f32 { libm::tanf(x) }
    // std backend
    } else {
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] fn m_tan(x: f32) -> f32 { x.tan() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

// --------------------------------- Utilities -------------------------------------

/// Clamp `x` into `[lo, hi]`. NaN passes through unchanged.
#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

#[inline]
pub fn exp(x: f32) -> f32 {
    m_exp(x)
}

// --------------------------------- Fast trig -------------------------------------

/// Sine used by the synthesis bank.
///
/// With `fast-math` this is a range-reduced 5th-order polynomial (max abs error
/// ~1e-3); otherwise it is the backend's exact `sin`. Both are deterministic for a
/// given build, which is all buffer caching relies on.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = x;
            let k = (xr / TAU).round();
            xr -= k * TAU;

            // sin(x) ≈ x * (a + b x^2 + c x^4)
            let x2 = xr * xr;
            xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
        } else {
            m_sin(x)
        }
    }
}

// --------------------------------- Exponentials / smoothing ----------------------

/// One-pole coefficient `a = exp(-1/(tau*sr))` for a time constant `tau_s` in seconds.
///
/// Used as `y = target + (y - target) * a` per sample, which is exactly the
/// discrete form of an exponential approach with time constant `tau_s`.
/// A non-positive time constant yields `0.0` (jump straight to the target).
#[inline]
pub fn one_pole_coeff_s(tau_s: f32, sr: f32) -> f32 {
    if tau_s <= 0.0 || sr <= 0.0 {
        return 0.0;
    }
    m_exp(-1.0 / (tau_s * sr))
}

/// Convert cutoff in Hz to a simple one-pole (non-TPT) coefficient `exp(-2π fc / sr)`.
#[inline]
pub fn one_pole_coeff_hz(cut_hz: f32, sr: f32) -> f32 {
    let fc = clamp(cut_hz, 0.0, 0.499 * sr);
    m_exp(-2.0 * PI * fc / sr)
}

/// TPT (Topology-Preserving Transform) `g = tan(π fc / sr)` helper for state-variable filters.
#[inline]
pub fn tpt_g(cut_hz: f32, sr: f32) -> f32 {
    let fc = clamp(cut_hz, 0.0, 0.499 * sr);
    m_tan(PI * (fc / sr))
}

// --------------------------------- Bus mixing ------------------------------------

/// In-place mix: `dst[i] += src[i] * gain`. Mismatched lengths mix the common prefix.
#[inline]
pub fn mix_in_place(dst: &mut [f32], src: &[f32], gain: f32) {
    let n = dst.len().min(src.len());
    let (dst, src) = (&mut dst[..n], &src[..n]);

    cfg_if! {
        if #[cfg(feature = "simd")] {
            use wide::f32x8;

            let g = f32x8::splat(gain);
            let mut d_chunks = dst.chunks_exact_mut(8);
            let mut s_chunks = src.chunks_exact(8);
            for (d, s) in (&mut d_chunks).zip(&mut s_chunks) {
                let mut a = [0.0f32; 8];
                let mut b = [0.0f32; 8];
                a.copy_from_slice(d);
                b.copy_from_slice(s);
                let y = f32x8::from(a) + f32x8::from(b) * g;
                d.copy_from_slice(&y.to_array());
            }
            for (d, s) in d_chunks.into_remainder().iter_mut().zip(s_chunks.remainder()) {
                *d += *s * gain;
            }
        } else {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s * gain;
            }
        }
    }
}

// --------------------------------- Tests (std only) ------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_both_bounds() {
        assert_eq!(clamp(3.0, -2.5, 2.5), 2.5);
        assert_eq!(clamp(-3.0, -2.5, 2.5), -2.5);
        assert_eq!(clamp(0.4, -2.5, 2.5), 0.4);
    }

    #[test]
    fn coeff_matches_time_constant() {
        // After tau seconds an exponential approach covers ~63%.
        let sr = 48_000.0;
        let a = one_pole_coeff_s(0.05, sr);
        let mut y = 0.0f32;
        for _ in 0..(0.05 * sr) as usize {
            y = 1.0 + (y - 1.0) * a;
        }
        assert!((y - (1.0 - (-1.0f32).exp())).abs() < 1e-3, "y={y}");
        assert_eq!(one_pole_coeff_s(0.0, sr), 0.0);
    }

    #[test]
    fn mix_adds_scaled_source() {
        let mut dst = [1.0f32; 11];
        let src = [2.0f32; 11];
        mix_in_place(&mut dst, &src, 0.5);
        assert!(dst.iter().all(|v| (*v - 2.0).abs() < 1e-6));
    }
}
