//! Playback sessions: one-shots, the continuous stroke and the ambient bed.
//!
//! At most one stroke and one ambient session are active, each keyed by the id of
//! the sound it plays. A request for the same id retargets the running voice; a
//! different id fades the old voice out and starts a new one. Faded voices are
//! kept on a retiring list until the render side reports them ended.

use std::mem;

use tingle_core::filters::SvfTpt;
use tingle_core::param::ParamEvent;
use tracing::{debug, trace};

use crate::graph::{Command, GraphSink, ParamTarget, Route, Voice, VoiceId};
use crate::nodes::BinauralPanner;
use crate::sound::{AudioPosition, SampleBuffer, SoundId};
use crate::spatial::{apply_position, clamp_position, PannerConfig};

/// Gain used as "silent" for fades; exponential ramps never reach 0.
pub const SILENT_GAIN: f32 = 0.0001;

pub const STROKE_START_RATE: f32 = 0.92;
pub const STROKE_GAIN_TAU_S: f32 = 0.05;
pub const STROKE_RATE_TAU_S: f32 = 0.08;
pub const STROKE_FADE_TAU_S: f32 = 0.05;
pub const STROKE_STOP_AFTER_S: f64 = 0.22;

pub const AMBIENT_RETARGET_TAU_S: f32 = 0.08;
pub const AMBIENT_FADE_IN_TAU_S: f32 = 0.15;
pub const AMBIENT_FADE_TAU_S: f32 = 0.1;
pub const AMBIENT_STOP_AFTER_S: f64 = 0.4;
pub const AMBIENT_CUTOFF_HZ: f32 = 2_800.0;
pub const AMBIENT_Q: f32 = 0.7;

/// Scheduling headroom for one-shots.
pub const ONE_SHOT_LOOKAHEAD_S: f64 = 0.004;

/// Resolved loudness, speed and place of one event.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Voicing {
    pub gain: f32,
    pub rate: f32,
    pub position: AudioPosition,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveSession {
    pub sound: SoundId,
    pub voice: VoiceId,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum SessionSlot {
    #[default]
    Absent,
    Active(ActiveSession),
}

impl SessionSlot {
    fn take(&mut self) -> Option<ActiveSession> {
        match mem::take(self) {
            Self::Absent => None,
            Self::Active(s) => Some(s),
        }
    }

    fn active(&self) -> Option<&ActiveSession> {
        match self {
            Self::Absent => None,
            Self::Active(s) => Some(s),
        }
    }

    fn playing(&self, sound: &str) -> Option<VoiceId> {
        self.active().filter(|s| &*s.sound == sound).map(|s| s.voice)
    }
}

#[derive(Debug, Default)]
pub struct SessionManager {
    panner: PannerConfig,
    stroke: SessionSlot,
    ambient: SessionSlot,
    retiring: Vec<VoiceId>,
}

fn automate(sink: &mut dyn GraphSink, voice: VoiceId, param: ParamTarget, event: ParamEvent) {
    sink.submit(Command::Automate { voice, param, event });
}

impl SessionManager {
    pub fn new(panner: PannerConfig) -> Self {
        Self { panner, ..Self::default() }
    }

    #[inline] pub fn stroke(&self) -> &SessionSlot { &self.stroke }
    #[inline] pub fn ambient(&self) -> &SessionSlot { &self.ambient }
    #[inline] pub fn retiring(&self) -> &[VoiceId] { &self.retiring }

    pub fn stroke_sound(&self) -> Option<&SoundId> {
        self.stroke.active().map(|s| &s.sound)
    }

    pub fn ambient_sound(&self) -> Option<&SoundId> {
        self.ambient.active().map(|s| &s.sound)
    }

    fn spatial_voice(&self, sink: &mut dyn GraphSink, buffer: &SampleBuffer, at: AudioPosition) -> Voice {
        let sr = sink.sample_rate();
        let id = sink.next_voice_id();
        let panner = BinauralPanner::new(sr, self.panner, clamp_position(at));
        Voice::new(id, buffer.clone(), Route::Spatial(panner), sr)
    }

    /// Fire-and-forget spatial voice. Non-looping sounds stop after `duration` seconds.
    pub fn play_one_shot(
        &mut self,
        sink: &mut dyn GraphSink,
        buffer: &SampleBuffer,
        looping: bool,
        duration: f32,
        voicing: Voicing,
    ) -> VoiceId {
        let start = sink.now() + ONE_SHOT_LOOKAHEAD_S;
        let mut voice = self.spatial_voice(sink, buffer, voicing.position).looping(looping).starting_at(start);
        voice.gain_mut().schedule(ParamEvent::set_value(start, voicing.gain));
        voice.rate_mut().schedule(ParamEvent::set_value(start, voicing.rate));
        if !looping {
            voice = voice.stopping_at(start + f64::from(duration.max(0.0)));
        }
        let id = voice.id();
        trace!(voice = id, gain = voicing.gain, rate = voicing.rate, "one-shot");
        sink.submit(Command::Start(Box::new(voice)));
        id
    }

    /// Continue the stroke on `sound`, starting or replacing it as needed.
    pub fn update_stroke(
        &mut self,
        sink: &mut dyn GraphSink,
        sound: &SoundId,
        buffer: &SampleBuffer,
        voicing: Voicing,
        smoothing_s: f32,
    ) -> VoiceId {
        let now = sink.now();
        if let Some(voice) = self.stroke.playing(sound) {
            automate(sink, voice, ParamTarget::Gain, ParamEvent::set_target(now, voicing.gain, STROKE_GAIN_TAU_S));
            automate(sink, voice, ParamTarget::Rate, ParamEvent::set_target(now, voicing.rate, STROKE_RATE_TAU_S));
            apply_position(sink, voice, voicing.position, now, smoothing_s);
            return voice;
        }

        self.end_stroke(sink);

        let mut voice = self.spatial_voice(sink, buffer, voicing.position).looping(true).starting_at(now);
        let gain = voice.gain_mut();
        gain.schedule(ParamEvent::set_value(now, SILENT_GAIN));
        gain.schedule(ParamEvent::set_target(now, voicing.gain, STROKE_GAIN_TAU_S));
        let rate = voice.rate_mut();
        rate.schedule(ParamEvent::set_value(now, STROKE_START_RATE));
        rate.schedule(ParamEvent::set_target(now, voicing.rate, STROKE_RATE_TAU_S));

        let id = voice.id();
        debug!(sound = %sound, voice = id, "stroke started");
        sink.submit(Command::Start(Box::new(voice)));
        self.stroke = SessionSlot::Active(ActiveSession { sound: sound.clone(), voice: id });
        id
    }

    /// Fade out and stop the stroke. No-op when none is active.
    pub fn end_stroke(&mut self, sink: &mut dyn GraphSink) {
        if let Some(old) = self.stroke.take() {
            debug!(sound = %old.sound, voice = old.voice, "stroke ended");
            self.retire(sink, old.voice, STROKE_FADE_TAU_S, STROKE_STOP_AFTER_S);
        }
    }

    /// Switch the ambient bed to `sound` at `gain`; `None` stops it.
    pub fn set_ambient(&mut self, sink: &mut dyn GraphSink, track: Option<(&SoundId, &SampleBuffer)>, gain: f32) {
        let Some((sound, buffer)) = track else {
            self.stop_ambient(sink);
            return;
        };
        let now = sink.now();
        if let Some(voice) = self.ambient.playing(sound) {
            automate(sink, voice, ParamTarget::Gain, ParamEvent::set_target(now, gain, AMBIENT_RETARGET_TAU_S));
            return;
        }

        self.stop_ambient(sink);

        let sr = sink.sample_rate();
        let id = sink.next_voice_id();
        let tone = SvfTpt::new(AMBIENT_CUTOFF_HZ, AMBIENT_Q, sr);
        let mut voice = Voice::new(id, buffer.clone(), Route::LowPass(tone), sr).looping(true).starting_at(now);
        let g = voice.gain_mut();
        g.schedule(ParamEvent::set_value(now, SILENT_GAIN));
        g.schedule(ParamEvent::set_target(now, gain, AMBIENT_FADE_IN_TAU_S));

        debug!(sound = %sound, voice = id, gain, "ambient started");
        sink.submit(Command::Start(Box::new(voice)));
        self.ambient = SessionSlot::Active(ActiveSession { sound: sound.clone(), voice: id });
    }

    /// Fade out and stop the ambient bed. No-op when none is active.
    pub fn stop_ambient(&mut self, sink: &mut dyn GraphSink) {
        if let Some(old) = self.ambient.take() {
            debug!(sound = %old.sound, voice = old.voice, "ambient stopped");
            self.retire(sink, old.voice, AMBIENT_FADE_TAU_S, AMBIENT_STOP_AFTER_S);
        }
    }

    fn retire(&mut self, sink: &mut dyn GraphSink, voice: VoiceId, tau_s: f32, stop_after_s: f64) {
        let now = sink.now();
        automate(sink, voice, ParamTarget::Gain, ParamEvent::set_target(now, SILENT_GAIN, tau_s));
        sink.submit(Command::Stop { voice, at: now + stop_after_s });
        self.retiring.push(voice);
    }

    /// The render side finished `voice`. Forget it; if it was still an active
    /// session (refused by a full graph), that session is gone too.
    pub fn voice_ended(&mut self, voice: VoiceId) {
        self.retiring.retain(|&v| v != voice);
        for slot in [&mut self.stroke, &mut self.ambient] {
            if slot.active().is_some_and(|s| s.voice == voice) {
                debug!(voice, "active session voice ended");
                *slot = SessionSlot::Absent;
            }
        }
    }

    /// Fade out every session.
    pub fn shutdown(&mut self, sink: &mut dyn GraphSink) {
        self.end_stroke(sink);
        self.stop_ambient(sink);
    }

    /// Drop all bookkeeping without touching the graph.
    pub fn clear(&mut self) {
        self.stroke = SessionSlot::Absent;
        self.ambient = SessionSlot::Absent;
        self.retiring.clear();
    }
}
