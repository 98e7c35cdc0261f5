//! The engine facade used by the gesture/scene layer.
//!
//! [`TouchAudioEngine`] owns the context lifecycle, the buffer cache, the master
//! stage and the session manager. It is single-threaded and owned by one caller;
//! every operation only enqueues graph changes, except
//! [`TouchAudioEngine::resume_context`], which waits for the output to run.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::{Backend, Context, OfflineBackend, OfflineHandle};
use crate::error::{EngineError, Result};
use crate::graph::VoiceId;
use crate::mixer::Mixer;
use crate::modulation::{compute_gain, compute_playback_rate, MAX_GAIN};
use crate::sessions::{SessionManager, Voicing};
use crate::sound::{PlaybackRequest, SampleBuffer, SoundDescriptor, SoundId};
use crate::spatial::{compute_position_smoothing, PannerConfig};
use crate::synth::render_synth_buffer;

/// Creates the output backend the first time the engine needs a context.
pub type BackendFactory = Box<dyn FnMut(&EngineConfig) -> Result<Box<dyn Backend>>>;

struct Live {
    context: Context,
    mixer: Mixer,
    sample_rate: u32,
}

enum Lifecycle {
    Uninitialized,
    Initialized(Live),
    Disposed,
}

pub struct TouchAudioEngine {
    config: EngineConfig,
    factory: BackendFactory,
    state: Lifecycle,
    sessions: SessionManager,
    cache: HashMap<SoundId, SampleBuffer>,
    syntheses: u64,
}

impl fmt::Debug for TouchAudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Initialized(_) => "initialized",
            Lifecycle::Disposed => "disposed",
        };
        f.debug_struct("TouchAudioEngine")
            .field("state", &state)
            .field("sessions", &self.sessions)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl TouchAudioEngine {
    /// An engine that opens its backend through `factory` on first use.
    pub fn new(config: EngineConfig, factory: BackendFactory) -> Self {
        Self {
            config,
            factory,
            state: Lifecycle::Uninitialized,
            sessions: SessionManager::new(PannerConfig::default()),
            cache: HashMap::new(),
            syntheses: 0,
        }
    }

    /// An engine on the system's output device.
    #[cfg(feature = "realtime")]
    pub fn with_default_output(config: EngineConfig) -> Self {
        use crate::output::CpalBackend;
        Self::new(
            config,
            Box::new(|c: &EngineConfig| -> Result<Box<dyn Backend>> { Ok(Box::new(CpalBackend::open(c)?)) }),
        )
    }

    /// An engine rendered on demand through the returned handle.
    pub fn offline(config: EngineConfig) -> (Self, OfflineHandle) {
        let sr = config.sample_rate.unwrap_or(EngineConfig::OFFLINE_SAMPLE_RATE);
        let channels = config.channels.unwrap_or(2);
        let (backend, handle) = OfflineBackend::new(sr, channels);
        let mut slot = Some(backend);
        let factory = move |_: &EngineConfig| -> Result<Box<dyn Backend>> {
            match slot.take() {
                Some(b) => Ok(Box::new(b)),
                None => Err(EngineError::Backend("offline backend already in use".into())),
            }
        };
        (Self::new(config, Box::new(factory)), handle)
    }

    // ------------------------------- Lifecycle -----------------------------------

    /// Create the context and master stage if they do not exist yet.
    fn ensure_context(&mut self) -> Result<()> {
        match self.state {
            Lifecycle::Disposed => return Err(EngineError::Disposed),
            Lifecycle::Initialized(_) => return Ok(()),
            Lifecycle::Uninitialized => {}
        }
        let backend = (self.factory)(&self.config)?;
        let sample_rate = backend.sample_rate();
        let mut context = Context::open(backend, &self.config)?;
        let mixer = Mixer::connect(&mut context, self.config.master_gain);
        self.state = Lifecycle::Initialized(Live { context, mixer, sample_rate });
        Ok(())
    }

    fn parts(&mut self) -> Result<(&mut Live, &mut SessionManager)> {
        match self {
            Self { state: Lifecycle::Initialized(live), sessions, .. } => Ok((live, sessions)),
            _ => Err(EngineError::Disposed),
        }
    }

    /// Context up, backlog flushed, finished voices reaped, and a resume
    /// attempted if the output is suspended.
    fn prepare(&mut self) -> Result<()> {
        self.ensure_context()?;
        self.collect_ended();
        let (live, _) = self.parts()?;
        if !live.context.is_running() {
            if let Err(e) = live.context.resume() {
                warn!("audio context still suspended, continuing: {e}");
            }
        }
        Ok(())
    }

    /// Wait for the output to run. Call from a user-gesture handler on
    /// platforms with autoplay restrictions.
    pub fn resume_context(&mut self) -> Result<()> {
        self.ensure_context()?;
        let (live, _) = self.parts()?;
        live.context.resume()
    }

    /// Context exists and is running.
    pub fn is_ready(&self) -> bool {
        matches!(&self.state, Lifecycle::Initialized(live) if live.context.is_running())
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, Lifecycle::Disposed)
    }

    /// Reap voices the render side has finished and return their ids.
    pub fn collect_ended(&mut self) -> Vec<VoiceId> {
        let Ok((live, sessions)) = self.parts() else {
            return Vec::new();
        };
        live.context.flush();
        let ended = live.context.drain_ended();
        for &voice in &ended {
            sessions.voice_ended(voice);
        }
        ended
    }

    /// End every session, clear the cache and release the context. Terminal.
    ///
    /// Every step runs even if one fails; the first failure is returned.
    pub fn dispose(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, Lifecycle::Disposed);
        let result = match state {
            Lifecycle::Initialized(mut live) => {
                self.sessions.shutdown(&mut live.context);
                live.context.close()
            }
            Lifecycle::Uninitialized | Lifecycle::Disposed => Ok(()),
        };
        self.sessions.clear();
        self.cache.clear();
        debug!("engine disposed");
        result
    }

    // ------------------------------- Buffers -------------------------------------

    /// Buffer for `sound`: its own sample if it carries one, else the cached
    /// synthesis for its id.
    fn resolve_buffer(&mut self, sound: &SoundDescriptor) -> Result<SampleBuffer> {
        if let Some(sample) = sound.sample() {
            return Ok(sample.clone());
        }
        if let Some(buf) = self.cache.get(sound.id()) {
            return Ok(buf.clone());
        }
        let (live, _) = self.parts()?;
        let buf = render_synth_buffer(sound, live.sample_rate)?;
        self.syntheses += 1;
        debug!(sound = %sound.id(), samples = buf.len(), "synthesized");
        self.cache.insert(sound.id().clone(), buf.clone());
        Ok(buf)
    }

    /// Number of buffers synthesized so far.
    #[inline] pub fn synth_count(&self) -> u64 { self.syntheses }
    #[inline] pub fn cached_buffers(&self) -> usize { self.cache.len() }

    // ------------------------------- Playback ------------------------------------

    /// One-shot at the requested position.
    pub fn play(&mut self, request: &PlaybackRequest<'_>) -> Result<VoiceId> {
        self.prepare()?;
        let sound = request.sound;
        let buffer = self.resolve_buffer(sound)?;
        let voicing = resolve_voicing(request);
        let (live, sessions) = self.parts()?;
        Ok(sessions.play_one_shot(&mut live.context, &buffer, sound.looping(), sound.duration(), voicing))
    }

    /// Start or continue the stroke for `request.sound`.
    pub fn update_stroke(&mut self, request: &PlaybackRequest<'_>) -> Result<VoiceId> {
        self.prepare()?;
        let buffer = self.resolve_buffer(request.sound)?;
        let voicing = resolve_voicing(request);
        let smoothing = compute_position_smoothing(request.stroke_speed);
        let (live, sessions) = self.parts()?;
        Ok(sessions.update_stroke(&mut live.context, request.sound.id(), &buffer, voicing, smoothing))
    }

    /// Fade out the stroke. No-op without one, before first use or after dispose.
    pub fn end_stroke(&mut self) {
        if let Ok((live, sessions)) = self.parts() {
            sessions.end_stroke(&mut live.context);
        }
    }

    /// Switch the ambient bed. `None` stops it. `gain` is clamped to `[0, 1.2]`.
    pub fn set_ambient_track(&mut self, sound: Option<&SoundDescriptor>, gain: f32) -> Result<()> {
        if self.is_disposed() {
            return Err(EngineError::Disposed);
        }
        let Some(sound) = sound else {
            self.stop_ambient_track();
            return Ok(());
        };
        if !gain.is_finite() {
            return Err(EngineError::invalid(format!("ambient gain must be finite, got {gain}")));
        }
        let gain = gain.clamp(0.0, MAX_GAIN);

        self.prepare()?;
        let buffer = self.resolve_buffer(sound)?;
        let (live, sessions) = self.parts()?;
        sessions.set_ambient(&mut live.context, Some((sound.id(), &buffer)), gain);
        Ok(())
    }

    /// Fade out the ambient bed. No-op without one, before first use or after dispose.
    pub fn stop_ambient_track(&mut self) {
        if let Ok((live, sessions)) = self.parts() {
            sessions.stop_ambient(&mut live.context);
        }
    }

    /// Ramp the master gain to `value`, clamped to `[0, 1.5]`.
    pub fn set_master_gain(&mut self, value: f32) -> Result<()> {
        self.ensure_context()?;
        let (live, _) = self.parts()?;
        live.mixer.set_gain(&mut live.context, value)?;
        Ok(())
    }

    // ------------------------------- Inspection ----------------------------------

    /// Context time in seconds, once a context exists.
    pub fn current_time(&self) -> Option<f64> {
        match &self.state {
            Lifecycle::Initialized(live) => Some(live.context.current_time()),
            _ => None,
        }
    }

    pub fn master_gain(&self) -> Option<f32> {
        match &self.state {
            Lifecycle::Initialized(live) => Some(live.mixer.gain()),
            _ => None,
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        match &self.state {
            Lifecycle::Initialized(live) => Some(live.sample_rate),
            _ => None,
        }
    }

    pub fn stroke_sound(&self) -> Option<&SoundId> {
        self.sessions.stroke_sound()
    }

    pub fn ambient_sound(&self) -> Option<&SoundId> {
        self.sessions.ambient_sound()
    }

    /// Voices fading out and not yet reported ended.
    pub fn retiring_voices(&self) -> &[VoiceId] {
        self.sessions.retiring()
    }
}

fn resolve_voicing(request: &PlaybackRequest<'_>) -> Voicing {
    let sound = request.sound;
    Voicing {
        gain: compute_gain(sound.base_gain(), request.intensity, request.gesture, request.stroke_speed),
        rate: compute_playback_rate(sound.category(), request.gesture, request.stroke_speed),
        position: request.position,
    }
}

impl Drop for TouchAudioEngine {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("dispose on drop failed: {e}");
        }
    }
}
