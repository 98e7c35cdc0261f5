//! Built-in sound catalog.

use crate::error::{EngineError, Result};
use crate::sound::{SoundCategory, SoundDescriptor, TriggerMode};

/// Loop length of the built-in ambient beds (seconds).
pub const AMBIENT_LOOP_S: f32 = 8.0;

/// An ordered set of sounds with unique ids.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    sounds: Vec<SoundDescriptor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sounds shipped with the engine.
    pub fn builtin() -> Self {
        let touch = [
            ("whisper-soft", SoundCategory::Whisper, 11, 1.8, 0.36, TriggerMode::Both),
            ("tap-light", SoundCategory::Tapping, 23, 0.45, 0.62, TriggerMode::TapOnly),
            ("scratch-gentle", SoundCategory::Scratching, 37, 1.2, 0.42, TriggerMode::Both),
            ("brush-soft", SoundCategory::Brushing, 41, 1.6, 0.48, TriggerMode::DragOnly),
            ("water-drop", SoundCategory::Water, 53, 0.9, 0.55, TriggerMode::Both),
            ("ear-clean", SoundCategory::EarCleaning, 67, 1.4, 0.4, TriggerMode::Both),
        ];
        let beds = [
            ("ambient-rain", 101, 0.3),
            ("ambient-fire", 103, 0.28),
            ("ambient-forest", 107, 0.3),
            ("ambient-night", 109, 0.26),
        ];

        let mut sounds: Vec<SoundDescriptor> = touch
            .into_iter()
            .map(|(id, category, seed, duration, gain, trigger)| {
                SoundDescriptor::new(id, category, seed)
                    .with_duration(duration)
                    .with_base_gain(gain)
                    .with_trigger(trigger)
            })
            .collect();
        sounds.extend(beds.into_iter().map(|(id, seed, gain)| {
            SoundDescriptor::new(id, SoundCategory::Ambient, seed)
                .with_duration(AMBIENT_LOOP_S)
                .with_base_gain(gain)
        }));
        Self { sounds }
    }

    pub fn get(&self, id: &str) -> Option<&SoundDescriptor> {
        self.sounds.iter().find(|s| &**s.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoundDescriptor> {
        self.sounds.iter()
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    /// Add a sound; ids must stay unique.
    pub fn push(&mut self, sound: SoundDescriptor) -> Result<()> {
        if self.get(sound.id()).is_some() {
            return Err(EngineError::invalid(format!("duplicate sound id {}", sound.id())));
        }
        self.sounds.push(sound);
        Ok(())
    }
}
