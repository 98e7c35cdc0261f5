//! Per-event loudness and playback-speed scaling.
//!
//! Faster strokes sound louder and slightly brighter; every result is bounded so
//! a request can never go silent or clip.

use crate::sound::{GestureKind, SoundCategory};

/// Gain floor and ceiling for any single event.
pub const MIN_GAIN: f32 = 0.01;
pub const MAX_GAIN: f32 = 1.2;

/// Extra scale applied to drag gestures.
pub const DRAG_GAIN_SCALE: f32 = 0.7;
/// Speed (px/s) that maps to a full playback-rate term.
pub const RATE_SPEED_REF: f32 = 700.0;
/// Saturation of the normalized speed term.
pub const MAX_SPEED_TERM: f32 = 1.3;
/// Speed (px/s) divisor of the drag loudness term.
pub const GAIN_SPEED_REF: f32 = 820.0;

#[inline]
fn sanitized_speed(speed: f32) -> f32 {
    if speed.is_nan() { 0.0 } else { speed.max(0.0) }
}

/// `clamp(speed / 700, 0, 1.3)`; NaN or negative speeds count as 0.
#[inline]
pub fn normalized_speed(speed: f32) -> f32 {
    (sanitized_speed(speed) / RATE_SPEED_REF).clamp(0.0, MAX_SPEED_TERM)
}

/// Loudness for one event, always within `[MIN_GAIN, MAX_GAIN]`.
pub fn compute_gain(base_gain: f32, intensity: f32, gesture: GestureKind, stroke_speed: f32) -> f32 {
    let raw = match gesture {
        GestureKind::Tap => base_gain * intensity,
        GestureKind::Drag => {
            let speed_scale = (0.6 + sanitized_speed(stroke_speed) / GAIN_SPEED_REF).clamp(0.6, 1.45);
            base_gain * intensity * DRAG_GAIN_SCALE * speed_scale
        }
    };
    if raw.is_nan() {
        return MIN_GAIN;
    }
    raw.clamp(MIN_GAIN, MAX_GAIN)
}

/// Playback-rate multiplier for one event.
pub fn compute_playback_rate(category: SoundCategory, gesture: GestureKind, stroke_speed: f32) -> f32 {
    match gesture {
        GestureKind::Tap => match category {
            SoundCategory::Tapping => 1.08,
            _ => 1.0,
        },
        GestureKind::Drag => {
            let term = normalized_speed(stroke_speed);
            match category {
                SoundCategory::EarCleaning => 0.82 + term * 0.22,
                SoundCategory::Water => 0.88 + term * 0.2,
                _ => 0.9 + term * 0.22,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn tap_whisper_scenario() {
        assert_abs_diff_eq!(compute_gain(0.36, 1.0, GestureKind::Tap, 0.0), 0.36);
        assert_eq!(compute_playback_rate(SoundCategory::Whisper, GestureKind::Tap, 0.0), 1.0);
        assert_eq!(compute_playback_rate(SoundCategory::Tapping, GestureKind::Tap, 0.0), 1.08);
    }

    #[test]
    fn fast_water_drag_scenario() {
        assert_abs_diff_eq!(
            compute_playback_rate(SoundCategory::Water, GestureKind::Drag, 700.0),
            1.08,
            epsilon = 1e-6
        );
    }

    #[test]
    fn drag_rate_boundaries() {
        let at = |c, s| compute_playback_rate(c, GestureKind::Drag, s);
        assert_abs_diff_eq!(at(SoundCategory::Brushing, 0.0), 0.9);
        assert_abs_diff_eq!(at(SoundCategory::EarCleaning, 0.0), 0.82);
        assert_abs_diff_eq!(at(SoundCategory::Water, 0.0), 0.88);
        assert_abs_diff_eq!(at(SoundCategory::Brushing, 700.0), 1.12, epsilon = 1e-6);
        assert_abs_diff_eq!(at(SoundCategory::EarCleaning, 700.0), 1.04, epsilon = 1e-6);
        // Saturates at 1.3 from 910 px/s on.
        assert_abs_diff_eq!(at(SoundCategory::Brushing, 910.0), 0.9 + 1.3 * 0.22, epsilon = 1e-6);
        assert_abs_diff_eq!(at(SoundCategory::Brushing, 5000.0), 0.9 + 1.3 * 0.22, epsilon = 1e-6);
    }

    #[test]
    fn drag_gain_responds_to_speed() {
        let slow = compute_gain(0.5, 1.0, GestureKind::Drag, 0.0);
        let fast = compute_gain(0.5, 1.0, GestureKind::Drag, 2000.0);
        assert_abs_diff_eq!(slow, 0.5 * 0.7 * 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(fast, 0.5 * 0.7 * 1.45, epsilon = 1e-6);
    }

    #[test]
    fn gain_is_always_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let base = rng.gen_range(-2.0..4.0);
            let intensity = rng.gen_range(0.0..3.0);
            let speed = rng.gen_range(-100.0..5000.0);
            let gesture = if rng.gen_bool(0.5) { GestureKind::Tap } else { GestureKind::Drag };
            let g = compute_gain(base, intensity, gesture, speed);
            assert!((MIN_GAIN..=MAX_GAIN).contains(&g), "g={g}");
        }
        assert_eq!(compute_gain(f32::NAN, 1.0, GestureKind::Tap, 0.0), MIN_GAIN);
    }

    #[test]
    fn rate_is_finite_for_any_speed() {
        for speed in [0.0, 1.0, 699.0, 700.0, 910.0, 1e9, f32::INFINITY, f32::NAN, -5.0] {
            for category in SoundCategory::ALL {
                let r = compute_playback_rate(category, GestureKind::Drag, speed);
                assert!(r.is_finite() && r > 0.0, "{category:?} {speed} -> {r}");
            }
        }
    }
}
