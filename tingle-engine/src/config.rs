//! Engine configuration.

use crate::mixer::DEFAULT_MASTER_GAIN;

/// Configuration for a [`TouchAudioEngine`](crate::engine::TouchAudioEngine) and its context.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Preferred output sample rate. `None` takes the device default
    /// (offline rendering falls back to 48 kHz).
    pub sample_rate: Option<u32>,
    /// Preferred output channel count. `None` takes the device default (offline: stereo).
    pub channels: Option<u16>,
    /// Output device name; `None` selects the host default.
    pub device_name: Option<String>,
    /// Master gain applied when the mixer is first connected.
    pub master_gain: f32,
    /// Capacity of the engine → render command ring.
    pub command_capacity: usize,
    /// Capacity of the render → engine event ring.
    pub event_capacity: usize,
    /// Upper bound on simultaneously rendered voices.
    pub max_voices: usize,
    /// Frames rendered per internal block.
    pub block_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            channels: None,
            device_name: None,
            master_gain: DEFAULT_MASTER_GAIN,
            command_capacity: 1024,
            event_capacity: 256,
            max_voices: 64,
            block_frames: 256,
        }
    }
}

impl EngineConfig {
    pub const OFFLINE_SAMPLE_RATE: u32 = 48_000;

    /// Config for offline rendering at a fixed rate and stereo output.
    pub fn offline(sample_rate: u32) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            channels: Some(2),
            ..Self::default()
        }
    }
}
