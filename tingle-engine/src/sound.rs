//! Sound descriptors, sample buffers and playback requests.

use std::sync::Arc;

use glam::Vec3;

use crate::error::{EngineError, Result};

/// Globally unique sound identifier. Cheap to clone.
pub type SoundId = Arc<str>;

/// Synthesis family of a sound.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SoundCategory {
    Whisper,
    Tapping,
    Scratching,
    Brushing,
    Water,
    EarCleaning,
    Ambient,
    /// Recorded or imported by the user; normally carries its own buffer.
    User,
}

impl SoundCategory {
    pub const ALL: [SoundCategory; 8] = [
        Self::Whisper,
        Self::Tapping,
        Self::Scratching,
        Self::Brushing,
        Self::Water,
        Self::EarCleaning,
        Self::Ambient,
        Self::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Whisper => "whisper",
            Self::Tapping => "tapping",
            Self::Scratching => "scratching",
            Self::Brushing => "brushing",
            Self::Water => "water",
            Self::EarCleaning => "ear_cleaning",
            Self::Ambient => "ambient",
            Self::User => "user",
        }
    }
}

/// Which gestures a sound answers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    TapOnly,
    DragOnly,
    Both,
    /// Only ever played as an ambient bed.
    Background,
}

impl TriggerMode {
    pub fn accepts(self, gesture: GestureKind) -> bool {
        matches!(
            (self, gesture),
            (Self::Both, _) | (Self::TapOnly, GestureKind::Tap) | (Self::DragOnly, GestureKind::Drag)
        )
    }
}

/// Additive layer the ambient generator mixes on top of its base texture.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AmbientTheme {
    #[default]
    None,
    Rain,
    Fire,
    Forest,
    Night,
}

impl AmbientTheme {
    /// Derive a theme from a catalog id such as `"ambient-rain"`.
    ///
    /// Only meant for catalog construction; the synthesis bank reads the
    /// descriptor's theme field and never looks at id text.
    pub fn from_sound_id(id: &str) -> Self {
        let id = id.to_ascii_lowercase();
        if id.contains("rain") {
            Self::Rain
        } else if id.contains("fire") {
            Self::Fire
        } else if id.contains("forest") {
            Self::Forest
        } else if id.contains("night") {
            Self::Night
        } else {
            Self::None
        }
    }
}

/// Mono samples plus the rate they were produced at.
///
/// Clones share the same allocation; [`SampleBuffer::ptr_eq`] is the identity test
/// the buffer cache relies on.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Result<Self> {
        let samples = samples.into();
        if samples.is_empty() {
            return Err(EngineError::invalid("sample buffer is empty"));
        }
        if sample_rate == 0 {
            return Err(EngineError::invalid("sample buffer rate must be positive"));
        }
        Ok(Self { samples, sample_rate })
    }

    #[inline] pub fn samples(&self) -> &[f32] { &self.samples }
    #[inline] pub fn sample_rate(&self) -> u32 { self.sample_rate }
    #[inline] pub fn len(&self) -> usize { self.samples.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.samples.is_empty() }

    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn ptr_eq(&self, other: &SampleBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// Static metadata for one playable sound. Immutable once built.
#[derive(Clone, Debug)]
pub struct SoundDescriptor {
    id: SoundId,
    category: SoundCategory,
    base_gain: f32,
    duration: f32,
    looping: bool,
    seed: u32,
    trigger: TriggerMode,
    theme: AmbientTheme,
    sample: Option<SampleBuffer>,
}

impl SoundDescriptor {
    /// A synthesized sound with a 1 s duration and unit base gain.
    ///
    /// Ambient sounds get their theme from the id, loop, and use background triggering.
    pub fn new(id: impl Into<SoundId>, category: SoundCategory, seed: u32) -> Self {
        let id: SoundId = id.into();
        let ambient = category == SoundCategory::Ambient;
        Self {
            theme: if ambient { AmbientTheme::from_sound_id(&id) } else { AmbientTheme::None },
            id,
            category,
            base_gain: 1.0,
            duration: 1.0,
            looping: ambient,
            seed,
            trigger: if ambient { TriggerMode::Background } else { TriggerMode::Both },
            sample: None,
        }
    }

    /// A user sound backed by an already-decoded buffer.
    pub fn user(id: impl Into<SoundId>, sample: SampleBuffer) -> Self {
        let duration = sample.duration_s() as f32;
        Self {
            duration,
            sample: Some(sample),
            ..Self::new(id, SoundCategory::User, 0)
        }
    }

    pub fn with_base_gain(mut self, gain: f32) -> Self {
        self.base_gain = gain;
        self
    }

    pub fn with_duration(mut self, seconds: f32) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerMode) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_theme(mut self, theme: AmbientTheme) -> Self {
        self.theme = theme;
        self
    }

    #[inline] pub fn id(&self) -> &SoundId { &self.id }
    #[inline] pub fn category(&self) -> SoundCategory { self.category }
    #[inline] pub fn base_gain(&self) -> f32 { self.base_gain }
    #[inline] pub fn duration(&self) -> f32 { self.duration }
    #[inline] pub fn looping(&self) -> bool { self.looping }
    #[inline] pub fn seed(&self) -> u32 { self.seed }
    #[inline] pub fn trigger(&self) -> TriggerMode { self.trigger }
    #[inline] pub fn theme(&self) -> AmbientTheme { self.theme }
    #[inline] pub fn sample(&self) -> Option<&SampleBuffer> { self.sample.as_ref() }
}

/// Tap or drag, as classified by the gesture layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GestureKind {
    Tap,
    Drag,
}

/// A point in audio space. Listener at the origin, facing −z, +x to the right.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AudioPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl AudioPosition {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Vec3> for AudioPosition {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// One interaction handed to the engine by the gesture layer.
///
/// `position` is already in audio space (see [`crate::spatial::touch_to_audio_position`]).
#[derive(Copy, Clone, Debug)]
pub struct PlaybackRequest<'a> {
    pub sound: &'a SoundDescriptor,
    pub position: AudioPosition,
    pub intensity: f32,
    pub gesture: GestureKind,
    /// Pixels per second; only meaningful for drags.
    pub stroke_speed: f32,
}

impl<'a> PlaybackRequest<'a> {
    pub fn tap(sound: &'a SoundDescriptor, position: AudioPosition) -> Self {
        Self {
            sound,
            position,
            intensity: 1.0,
            gesture: GestureKind::Tap,
            stroke_speed: 0.0,
        }
    }

    pub fn drag(sound: &'a SoundDescriptor, position: AudioPosition, stroke_speed: f32) -> Self {
        Self {
            sound,
            position,
            intensity: 1.0,
            gesture: GestureKind::Drag,
            stroke_speed,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambient_theme_comes_from_id_at_construction() {
        let rain = SoundDescriptor::new("ambient-rain", SoundCategory::Ambient, 5);
        assert_eq!(rain.theme(), AmbientTheme::Rain);
        assert!(rain.looping());
        assert_eq!(rain.trigger(), TriggerMode::Background);

        let tap = SoundDescriptor::new("rain-tap", SoundCategory::Tapping, 5);
        assert_eq!(tap.theme(), AmbientTheme::None);
    }

    #[test]
    fn trigger_modes_filter_gestures() {
        assert!(TriggerMode::Both.accepts(GestureKind::Drag));
        assert!(TriggerMode::TapOnly.accepts(GestureKind::Tap));
        assert!(!TriggerMode::TapOnly.accepts(GestureKind::Drag));
        assert!(!TriggerMode::Background.accepts(GestureKind::Tap));
    }

    #[test]
    fn empty_buffers_are_rejected() {
        assert!(matches!(
            SampleBuffer::new(Vec::<f32>::new(), 48_000),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(SampleBuffer::new(vec![0.0; 4], 0).is_err());
    }

    #[test]
    fn user_sound_takes_duration_from_buffer() {
        let buf = SampleBuffer::new(vec![0.1; 24_000], 48_000).unwrap();
        let s = SoundDescriptor::user("user-1", buf.clone());
        assert_eq!(s.category(), SoundCategory::User);
        assert!((s.duration() - 0.5).abs() < 1e-6);
        assert!(s.sample().unwrap().ptr_eq(&buf));
    }
}
