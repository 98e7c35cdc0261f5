//! C ABI wrapper for the Tingle engine.
//!
//! Exposes the engine facade to a non-Rust scene/UI layer. Sounds are addressed
//! by their built-in catalog id.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `TingleEngine` (heap-allocated; release with `tingle_destroy`).
//! - Fallible calls return a [`TingleStatus`]; `TINGLE_OK` is zero, errors are negative.
//! - Strings are NUL-terminated UTF-8.
//!
//! Threading
//! - The object is NOT thread-safe; call all functions from the same thread.
//!   Audio is rendered on the device thread (or by `tingle_render_interleaved_f32`
//!   for engines from `tingle_create_offline`).

use std::ffi::{c_char, CStr};

use glam::{Quat, Vec3};
use tingle_engine::{
    touch_to_audio_position, AudioPosition, Catalog, EngineConfig, EngineError, OfflineHandle, PlaybackRequest,
    SoundDescriptor, TouchAudioEngine,
};
use tracing::debug;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TingleStatus {
    Ok = 0,
    NullPointer = -1,
    InvalidUtf8 = -2,
    UnknownSound = -3,
    Unsupported = -4,
    InvalidParameter = -5,
    Disposed = -6,
    Backend = -7,
}

impl From<EngineError> for TingleStatus {
    fn from(e: EngineError) -> Self {
        debug!("engine call failed: {e}");
        match e {
            EngineError::Unsupported(_) => Self::Unsupported,
            EngineError::InvalidParameter(_) => Self::InvalidParameter,
            EngineError::Disposed => Self::Disposed,
            EngineError::Backend(_) => Self::Backend,
        }
    }
}

fn status(r: tingle_engine::Result<impl Sized>) -> TingleStatus {
    match r {
        Ok(_) => TingleStatus::Ok,
        Err(e) => e.into(),
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TingleVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TingleQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl From<TingleVec3> for Vec3 {
    fn from(v: TingleVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

impl From<TingleVec3> for AudioPosition {
    fn from(v: TingleVec3) -> Self {
        AudioPosition::new(v.x, v.y, v.z)
    }
}

/// Opaque engine wrapper we hand to C.
#[repr(C)]
pub struct TingleEngine {
    catalog: Catalog,
    offline: Option<OfflineHandle>,
    inner: TouchAudioEngine,
}

fn lookup(catalog: &Catalog, id: *const c_char) -> Result<&SoundDescriptor, TingleStatus> {
    if id.is_null() {
        return Err(TingleStatus::NullPointer);
    }
    let id = unsafe { CStr::from_ptr(id) }.to_str().map_err(|_| TingleStatus::InvalidUtf8)?;
    catalog.get(id).ok_or(TingleStatus::UnknownSound)
}

fn into_handle(engine: TingleEngine) -> *mut TingleEngine {
    Box::into_raw(Box::new(engine))
}

/// Run `f` on a live handle; null handles report `NullPointer`.
fn with_engine(engine: *mut TingleEngine, f: impl FnOnce(&mut TingleEngine) -> TingleStatus) -> TingleStatus {
    if engine.is_null() {
        return TingleStatus::NullPointer;
    }
    f(unsafe { &mut *engine })
}

// --- Creation / destruction -------------------------------------------------------

/// Create an engine on the default output device. `sample_rate` 0 takes the
/// device default. The device is opened lazily, on first use.
#[no_mangle]
pub extern "C" fn tingle_create(sample_rate: u32) -> *mut TingleEngine {
    let config = EngineConfig {
        sample_rate: (sample_rate > 0).then_some(sample_rate),
        ..EngineConfig::default()
    };
    into_handle(TingleEngine {
        catalog: Catalog::builtin(),
        offline: None,
        inner: TouchAudioEngine::with_default_output(config),
    })
}

/// Create an engine without a device; pull audio with `tingle_render_interleaved_f32`.
#[no_mangle]
pub extern "C" fn tingle_create_offline(sample_rate: u32, channels: u16) -> *mut TingleEngine {
    let config = EngineConfig {
        channels: Some(channels.max(1)),
        ..EngineConfig::offline(if sample_rate > 0 { sample_rate } else { EngineConfig::OFFLINE_SAMPLE_RATE })
    };
    let (inner, handle) = TouchAudioEngine::offline(config);
    into_handle(TingleEngine { catalog: Catalog::builtin(), offline: Some(handle), inner })
}

/// Dispose and free an engine previously returned by `tingle_create*`.
#[no_mangle]
pub extern "C" fn tingle_destroy(engine: *mut TingleEngine) {
    if !engine.is_null() {
        unsafe { drop(Box::from_raw(engine)); }
    }
}

// --- Lifecycle --------------------------------------------------------------------

/// Start output. Call from a user-gesture handler.
#[no_mangle]
pub extern "C" fn tingle_resume(engine: *mut TingleEngine) -> TingleStatus {
    with_engine(engine, |e| status(e.inner.resume_context()))
}

#[no_mangle]
pub extern "C" fn tingle_is_ready(engine: *const TingleEngine) -> bool {
    !engine.is_null() && unsafe { &*engine }.inner.is_ready()
}

/// Master gain, clamped to [0, 1.5] and ramped.
#[no_mangle]
pub extern "C" fn tingle_set_master_gain(engine: *mut TingleEngine, gain: f32) -> TingleStatus {
    with_engine(engine, |e| status(e.inner.set_master_gain(gain)))
}

// --- Playback ---------------------------------------------------------------------

/// One-shot. `drag` selects drag loudness/rate scaling; `stroke_speed` is px/s.
#[no_mangle]
pub extern "C" fn tingle_play(
    engine: *mut TingleEngine,
    sound_id: *const c_char,
    position: TingleVec3,
    intensity: f32,
    drag: bool,
    stroke_speed: f32,
) -> TingleStatus {
    with_engine(engine, |e| {
        let sound = match lookup(&e.catalog, sound_id) {
            Ok(s) => s,
            Err(st) => return st,
        };
        let request = if drag {
            PlaybackRequest::drag(sound, position.into(), stroke_speed)
        } else {
            PlaybackRequest::tap(sound, position.into())
        }
        .with_intensity(intensity);
        status(e.inner.play(&request))
    })
}

/// Start or continue the drag stroke on `sound_id`.
#[no_mangle]
pub extern "C" fn tingle_update_stroke(
    engine: *mut TingleEngine,
    sound_id: *const c_char,
    position: TingleVec3,
    intensity: f32,
    stroke_speed: f32,
) -> TingleStatus {
    with_engine(engine, |e| {
        let sound = match lookup(&e.catalog, sound_id) {
            Ok(s) => s,
            Err(st) => return st,
        };
        let request = PlaybackRequest::drag(sound, position.into(), stroke_speed).with_intensity(intensity);
        status(e.inner.update_stroke(&request))
    })
}

#[no_mangle]
pub extern "C" fn tingle_end_stroke(engine: *mut TingleEngine) {
    with_engine(engine, |e| {
        e.inner.end_stroke();
        TingleStatus::Ok
    });
}

/// Switch the ambient bed; a null `sound_id` stops it.
#[no_mangle]
pub extern "C" fn tingle_set_ambient(engine: *mut TingleEngine, sound_id: *const c_char, gain: f32) -> TingleStatus {
    with_engine(engine, |e| {
        if sound_id.is_null() {
            return status(e.inner.set_ambient_track(None, gain));
        }
        let sound = match lookup(&e.catalog, sound_id) {
            Ok(s) => s,
            Err(st) => return st,
        };
        status(e.inner.set_ambient_track(Some(sound), gain))
    })
}

#[no_mangle]
pub extern "C" fn tingle_stop_ambient(engine: *mut TingleEngine) {
    with_engine(engine, |e| {
        e.inner.stop_ambient_track();
        TingleStatus::Ok
    });
}

// --- Rendering / geometry ---------------------------------------------------------

/// Render `frames` interleaved frames into `out`, which must hold
/// `frames * channels` floats (channels as passed to `tingle_create_offline`).
///
/// Returns the number of frames rendered (0 on error or for device engines).
#[no_mangle]
pub extern "C" fn tingle_render_interleaved_f32(engine: *mut TingleEngine, out: *mut f32, frames: u32) -> u32 {
    if engine.is_null() || out.is_null() || frames == 0 {
        return 0;
    }
    let e = unsafe { &mut *engine };
    let Some(handle) = e.offline.as_ref() else {
        return 0;
    };
    let block = handle.render(frames as usize);
    let out = unsafe { std::slice::from_raw_parts_mut(out, block.len()) };
    out.copy_from_slice(&block);
    e.inner.collect_ended();
    frames
}

/// Map a world-space hit on the head model into audio space.
#[no_mangle]
pub extern "C" fn tingle_touch_to_audio_position(
    hit: TingleVec3,
    head_center: TingleVec3,
    head_rotation: TingleQuat,
    out: *mut TingleVec3,
) -> TingleStatus {
    if out.is_null() {
        return TingleStatus::NullPointer;
    }
    let rot = Quat::from_xyzw(head_rotation.x, head_rotation.y, head_rotation.z, head_rotation.w);
    match touch_to_audio_position(hit.into(), head_center.into(), rot) {
        Ok(p) => {
            unsafe { *out = TingleVec3 { x: p.x, y: p.y, z: p.z } };
            TingleStatus::Ok
        }
        Err(e) => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: TingleQuat = TingleQuat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    fn v(x: f32, y: f32, z: f32) -> TingleVec3 {
        TingleVec3 { x, y, z }
    }

    #[test]
    fn offline_roundtrip_through_the_abi() {
        let e = tingle_create_offline(48_000, 2);
        assert_eq!(tingle_resume(e), TingleStatus::Ok);
        assert!(tingle_is_ready(e));
        assert_eq!(tingle_play(e, c"tap-light".as_ptr(), v(-1.0, 0.0, -0.5), 1.0, false, 0.0), TingleStatus::Ok);

        let mut buf = vec![0.0f32; 4_800 * 2];
        assert_eq!(tingle_render_interleaved_f32(e, buf.as_mut_ptr(), 4_800), 4_800);
        assert!(buf.iter().any(|s| s.abs() > 0.01));
        tingle_destroy(e);
    }

    #[test]
    fn sessions_and_errors_map_to_status_codes() {
        let e = tingle_create_offline(48_000, 2);
        assert_eq!(tingle_play(e, c"no-such-sound".as_ptr(), v(0.0, 0.0, -1.0), 1.0, false, 0.0), TingleStatus::UnknownSound);
        assert_eq!(tingle_play(e, std::ptr::null(), v(0.0, 0.0, -1.0), 1.0, false, 0.0), TingleStatus::NullPointer);
        assert_eq!(tingle_update_stroke(e, c"brush-soft".as_ptr(), v(0.5, 0.0, -1.0), 1.0, 300.0), TingleStatus::Ok);
        tingle_end_stroke(e);
        tingle_end_stroke(e);
        assert_eq!(tingle_set_ambient(e, c"ambient-rain".as_ptr(), 0.3), TingleStatus::Ok);
        assert_eq!(tingle_set_ambient(e, c"ambient-rain".as_ptr(), f32::NAN), TingleStatus::InvalidParameter);
        assert_eq!(tingle_set_ambient(e, std::ptr::null(), 0.0), TingleStatus::Ok);
        tingle_stop_ambient(e);
        assert_eq!(tingle_set_master_gain(e, 0.5), TingleStatus::Ok);
        tingle_destroy(e);
    }

    #[test]
    fn null_handles_are_tolerated() {
        let null = std::ptr::null_mut();
        assert_eq!(tingle_resume(null), TingleStatus::NullPointer);
        assert!(!tingle_is_ready(null));
        tingle_end_stroke(null);
        tingle_stop_ambient(null);
        tingle_destroy(null);
        assert_eq!(tingle_render_interleaved_f32(null, std::ptr::null_mut(), 16), 0);
    }

    #[test]
    fn touch_mapping_mirrors_x() {
        let mut out = TingleVec3::default();
        let st = tingle_touch_to_audio_position(v(1.0, 0.0, 0.0), v(0.0, 0.0, 0.0), IDENTITY, &mut out);
        assert_eq!(st, TingleStatus::Ok);
        assert!((out.x + 1.35).abs() < 1e-6);

        let zero = TingleQuat { x: 0.0, y: 0.0, z: 0.0, w: 0.0 };
        let st = tingle_touch_to_audio_position(v(1.0, 0.0, 0.0), v(0.0, 0.0, 0.0), zero, &mut out);
        assert_eq!(st, TingleStatus::InvalidParameter);
    }
}
