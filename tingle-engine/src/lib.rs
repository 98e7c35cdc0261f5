//! Tingle Engine — spatial touch-to-sound playback.
//!
//! Crate layout:
//! - [`engine`]     : `TouchAudioEngine`, the facade the gesture layer talks to
//! - [`synth`]      : procedural synthesis bank (one generator per sound category)
//! - [`spatial`]    : touch point → audio space, clamping, position smoothing
//! - [`modulation`] : per-event gain and playback rate
//! - [`sessions`]   : one-shot / stroke / ambient session lifecycle
//! - [`mixer`]      : master gain stage
//! - [`graph`]      : realtime render graph (voices, command ring, ended events)
//! - [`nodes`]      : sine oscillator, binaural panner
//! - [`context`]    : execution context and backends (offline always, `cpal` with `realtime`)
//! - [`catalog`]    : built-in sounds
//!
//! The engine thread never blocks on audio except in `resume_context`; every
//! other call enqueues graph changes that the render thread applies at the next
//! block boundary.

pub mod catalog;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod mixer;
pub mod modulation;
pub mod nodes;
#[cfg(feature = "realtime")]
pub mod output;
pub mod sessions;
pub mod sound;
pub mod spatial;
pub mod synth;

// Re-export some commonly used items to make downstream imports ergonomic.
pub use catalog::Catalog;
pub use config::EngineConfig;
pub use context::{Backend, OfflineBackend, OfflineHandle};
pub use engine::TouchAudioEngine;
pub use error::{EngineError, Result};
pub use sound::{
    AmbientTheme, AudioPosition, GestureKind, PlaybackRequest, SampleBuffer, SoundCategory, SoundDescriptor,
    SoundId, TriggerMode,
};
pub use spatial::touch_to_audio_position;
pub use synth::render_synth_buffer;

pub use glam;
