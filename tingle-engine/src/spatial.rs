//! Spatial positioning: touch point → audio space → smoothed panner motion.

use glam::{Quat, Vec3};
use tingle_core::param::ParamEvent;

use crate::error::{EngineError, Result};
use crate::graph::{Command, GraphSink, ParamTarget, VoiceId};
use crate::modulation::normalized_speed;
use crate::sound::AudioPosition;

/// Head-local units → audio units.
pub const POSITION_SCALE: f32 = 1.35;
/// Audio-space bounds applied on ingestion.
pub const MAX_ABS_XZ: f32 = 2.5;
pub const MAX_ABS_Y: f32 = 1.6;

/// Position smoothing bounds (seconds) for continuous strokes.
pub const MIN_SMOOTHING_S: f32 = 0.018;
pub const MAX_SMOOTHING_S: f32 = 0.072;

/// Distance model of the binaural panner: inverse law.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PannerConfig {
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
}

impl Default for PannerConfig {
    fn default() -> Self {
        Self {
            ref_distance: 1.0,
            max_distance: 8.0,
            rolloff: 1.0,
        }
    }
}

impl PannerConfig {
    /// `ref / (ref + rolloff * (clamp(d, ref, max) - ref))`
    #[inline]
    pub fn distance_gain(&self, distance: f32) -> f32 {
        let d = distance.clamp(self.ref_distance, self.max_distance);
        self.ref_distance / (self.ref_distance + self.rolloff * (d - self.ref_distance))
    }
}

/// Map a world-space hit on the head model into audio space.
///
/// The hit is moved into head-local space (subtract the center, undo the head
/// rotation) and scaled by [`POSITION_SCALE`]. The local x axis is mirrored: the
/// model faces the viewer, so the model's right side is the listener's left.
pub fn touch_to_audio_position(hit: Vec3, head_center: Vec3, head_rotation: Quat) -> Result<AudioPosition> {
    if !hit.is_finite() || !head_center.is_finite() || !head_rotation.is_finite() {
        return Err(EngineError::invalid("touch geometry must be finite"));
    }
    if head_rotation.length_squared() < 1e-12 {
        return Err(EngineError::invalid("head rotation is a zero quaternion"));
    }

    let local = head_rotation.normalize().inverse() * (hit - head_center);
    Ok(AudioPosition::new(
        -local.x * POSITION_SCALE,
        local.y * POSITION_SCALE,
        local.z * POSITION_SCALE,
    ))
}

/// Clamp x/z to ±2.5 and y to ±1.6. Non-finite axes collapse to 0.
pub fn clamp_position(p: AudioPosition) -> AudioPosition {
    let axis = |v: f32, limit: f32| if v.is_finite() { v.clamp(-limit, limit) } else { 0.0 };
    AudioPosition::new(axis(p.x, MAX_ABS_XZ), axis(p.y, MAX_ABS_Y), axis(p.z, MAX_ABS_XZ))
}

/// Position time constant for a stroke: fast strokes track tightly, slow ones glide.
pub fn compute_position_smoothing(stroke_speed: f32) -> f32 {
    (MAX_SMOOTHING_S - normalized_speed(stroke_speed) * 0.04).clamp(MIN_SMOOTHING_S, MAX_SMOOTHING_S)
}

/// Clamp `position` and glide the voice's panner toward it from `now`.
pub fn apply_position(
    sink: &mut dyn GraphSink,
    voice: VoiceId,
    position: AudioPosition,
    now: f64,
    smoothing_s: f32,
) -> AudioPosition {
    let p = clamp_position(position);
    for (param, value) in [
        (ParamTarget::PositionX, p.x),
        (ParamTarget::PositionY, p.y),
        (ParamTarget::PositionZ, p.z),
    ] {
        sink.submit(Command::Automate {
            voice,
            param,
            event: ParamEvent::set_target(now, value, smoothing_s),
        });
    }
    p
}
