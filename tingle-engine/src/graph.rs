//! Realtime render graph.
//!
//! The engine thread never touches audio state directly. It builds [`Voice`]s and
//! sends [`Command`]s through a lock-free ring; the [`Renderer`] (owned by the
//! backend's audio thread) drains the ring at the start of every block, renders
//! all live voices into a stereo bus, applies the master stage and reports voices
//! that finished through a second ring so they are freed off the audio thread.
//! Finished voices that do not fit the event ring wait in a fixed-capacity
//! pending queue and are retried every block; command draining pauses while
//! that queue could not absorb another refusal.
//!
//! Design goals
//! - No allocations or locks in [`Renderer::process`]
//! - Sample-accurate scheduling against a shared frame clock
//! - Voices are plain structs: a buffer, a cursor, two params and a route

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};
use tingle_core::dsp::{clamp, lerp, mix_in_place};
use tingle_core::filters::SvfTpt;
use tingle_core::param::{AutomatedParam, ParamEvent};

use crate::nodes::BinauralPanner;
use crate::sound::SampleBuffer;

pub type VoiceId = u64;

/// Where the engine sends graph changes. Implemented by the live context and by
/// recording sinks in tests.
pub trait GraphSink {
    /// Current context time in seconds.
    fn now(&self) -> f64;
    fn sample_rate(&self) -> f32;
    fn next_voice_id(&mut self) -> VoiceId;
    fn submit(&mut self, command: Command);
}

/// Automatable parameter of a voice.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamTarget {
    Gain,
    Rate,
    PositionX,
    PositionY,
    PositionZ,
}

/// Signal path after the source.
#[derive(Clone, Debug)]
pub enum Route {
    /// Positioned through the binaural panner.
    Spatial(BinauralPanner),
    /// Tone-shaped through a low-pass and sent to both ears.
    LowPass(SvfTpt),
}

/// One playing source: buffer, cursor, gain/rate params and its route.
#[derive(Clone, Debug)]
pub struct Voice {
    id: VoiceId,
    buffer: SampleBuffer,
    cursor: f64,
    looping: bool,
    start_at: f64,
    stop_at: Option<f64>,
    gain: AutomatedParam,
    rate: AutomatedParam,
    route: Route,
}

impl Voice {
    pub fn new(id: VoiceId, buffer: SampleBuffer, route: Route, sr: f32) -> Self {
        Self {
            id,
            buffer,
            cursor: 0.0,
            looping: false,
            start_at: 0.0,
            stop_at: None,
            gain: AutomatedParam::new(1.0, sr),
            rate: AutomatedParam::new(1.0, sr),
            route,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn starting_at(mut self, t: f64) -> Self {
        self.start_at = t;
        self
    }

    pub fn stopping_at(mut self, t: f64) -> Self {
        self.stop_at = Some(t);
        self
    }

    #[inline] pub fn id(&self) -> VoiceId { self.id }
    #[inline] pub fn buffer(&self) -> &SampleBuffer { &self.buffer }
    #[inline] pub fn is_looping(&self) -> bool { self.looping }
    #[inline] pub fn start_time(&self) -> f64 { self.start_at }
    #[inline] pub fn stop_time(&self) -> Option<f64> { self.stop_at }
    #[inline] pub fn route(&self) -> &Route { &self.route }
    #[inline] pub fn gain_mut(&mut self) -> &mut AutomatedParam { &mut self.gain }
    #[inline] pub fn rate_mut(&mut self) -> &mut AutomatedParam { &mut self.rate }
    #[inline] pub fn gain(&self) -> &AutomatedParam { &self.gain }
    #[inline] pub fn rate(&self) -> &AutomatedParam { &self.rate }

    /// Earliest stop wins.
    pub fn stop(&mut self, at: f64) {
        self.stop_at = Some(self.stop_at.map_or(at, |s| s.min(at)));
    }

    /// Route an event to a parameter. Position events on a non-spatial voice are dropped.
    pub fn automate(&mut self, param: ParamTarget, event: ParamEvent) -> bool {
        let target = match (param, &mut self.route) {
            (ParamTarget::Gain, _) => &mut self.gain,
            (ParamTarget::Rate, _) => &mut self.rate,
            (ParamTarget::PositionX, Route::Spatial(p)) => p.x_mut(),
            (ParamTarget::PositionY, Route::Spatial(p)) => p.y_mut(),
            (ParamTarget::PositionZ, Route::Spatial(p)) => p.z_mut(),
            _ => return false,
        };
        target.schedule(event);
        true
    }

    /// Render `out_l.len()` frames starting at context time `t0`, adding into the
    /// outputs. Returns `false` once the voice has ended.
    fn render(&mut self, t0: f64, sr: f32, out_l: &mut [f32], out_r: &mut [f32]) -> bool {
        let samples = self.buffer.samples();
        let len = samples.len();
        let step = f64::from(self.buffer.sample_rate()) / f64::from(sr);
        let dt = 1.0 / f64::from(sr);

        for (i, (l, r)) in out_l.iter_mut().zip(out_r.iter_mut()).enumerate() {
            let t = t0 + i as f64 * dt;
            if self.stop_at.is_some_and(|s| t >= s) {
                return false;
            }
            let gain = self.gain.tick(t);
            let rate = self.rate.tick(t).max(0.0);
            if t < self.start_at {
                continue;
            }

            let idx = self.cursor as usize;
            let frac = (self.cursor - idx as f64) as f32;
            let a = samples[idx];
            let b = if idx + 1 < len {
                samples[idx + 1]
            } else if self.looping {
                samples[0]
            } else {
                0.0
            };
            let x = lerp(a, b, frac) * gain;

            let (yl, yr) = match &mut self.route {
                Route::Spatial(p) => p.process(t, x),
                Route::LowPass(f) => {
                    let y = f.process(x);
                    (y, y)
                }
            };
            *l += yl;
            *r += yr;

            self.cursor += f64::from(rate) * step;
            if self.cursor >= len as f64 {
                if self.looping {
                    self.cursor %= len as f64;
                } else {
                    return false;
                }
            }
        }
        true
    }
}

/// Graph changes, engine → audio thread.
#[derive(Debug)]
pub enum Command {
    Start(Box<Voice>),
    Automate { voice: VoiceId, param: ParamTarget, event: ParamEvent },
    Stop { voice: VoiceId, at: f64 },
    Master(ParamEvent),
}

/// Notifications, audio thread → engine.
#[derive(Debug)]
pub enum RenderEvent {
    /// The voice finished (or was refused for lack of room) and is handed back
    /// so its memory is released on the engine thread.
    Ended(Box<Voice>),
}

/// Audio-thread side of the graph.
pub struct Renderer {
    sr: f32,
    frame: u64,
    clock: Arc<AtomicU64>,
    commands: HeapCons<Command>,
    events: HeapProd<RenderEvent>,
    voices: Vec<Box<Voice>>,
    max_voices: usize,
    /// Ended voices waiting for room in the event ring. Holds at most
    /// `2 * max_voices`: one refusal batch plus every live voice ending.
    pending: VecDeque<Box<Voice>>,
    master: AutomatedParam,
    bus_l: Vec<f32>,
    bus_r: Vec<f32>,
    scratch_l: Vec<f32>,
    scratch_r: Vec<f32>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("sr", &self.sr)
            .field("frame", &self.frame)
            .field("voices", &self.voices.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Renderer {
    pub fn new(
        sr: f32,
        clock: Arc<AtomicU64>,
        commands: HeapCons<Command>,
        events: HeapProd<RenderEvent>,
        max_voices: usize,
        block_frames: usize,
    ) -> Self {
        let block = block_frames.max(1);
        let max_voices = max_voices.max(1);
        Self {
            sr,
            frame: clock.load(Ordering::Acquire),
            clock,
            commands,
            events,
            voices: Vec::with_capacity(max_voices),
            max_voices,
            pending: VecDeque::with_capacity(2 * max_voices),
            master: AutomatedParam::new(0.0, sr),
            bus_l: vec![0.0; block],
            bus_r: vec![0.0; block],
            scratch_l: vec![0.0; block],
            scratch_r: vec![0.0; block],
        }
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sr }
    #[inline] pub fn active_voices(&self) -> usize { self.voices.len() }
    /// Ended voices not yet handed to the engine.
    #[inline] pub fn pending_ended(&self) -> usize { self.pending.len() }

    #[inline]
    fn time_of(&self, frame: u64) -> f64 {
        frame as f64 / f64::from(self.sr)
    }

    /// Move pending ended voices into the event ring, oldest first, until it is full.
    fn flush_ended(&mut self) {
        while let Some(voice) = self.pending.pop_front() {
            if let Err(RenderEvent::Ended(voice)) = self.events.try_push(RenderEvent::Ended(voice)) {
                self.pending.push_front(voice);
                break;
            }
        }
    }

    /// Queue a finished voice for the engine. Never drops it.
    fn retire(&mut self, voice: Box<Voice>) {
        self.pending.push_back(voice);
        self.flush_ended();
    }

    fn drain_commands(&mut self) {
        // Leave commands queued while a refusal could overflow `pending`.
        while self.pending.len() < self.max_voices {
            let Some(cmd) = self.commands.try_pop() else { break };
            match cmd {
                Command::Start(voice) => {
                    if self.voices.len() < self.max_voices {
                        self.voices.push(voice);
                    } else {
                        // Full: refuse and hand it straight back.
                        self.retire(voice);
                    }
                }
                Command::Automate { voice, param, event } => {
                    if let Some(v) = self.voices.iter_mut().find(|v| v.id == voice) {
                        v.automate(param, event);
                    }
                }
                Command::Stop { voice, at } => {
                    if let Some(v) = self.voices.iter_mut().find(|v| v.id == voice) {
                        v.stop(at);
                    }
                }
                Command::Master(event) => self.master.schedule(event),
            }
        }
    }

    /// Fill an interleaved buffer with `channels` channels.
    ///
    /// Mono devices get the average of both ears; channels past the second are silent.
    pub fn process(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        self.flush_ended();
        self.drain_commands();

        let block = self.bus_l.len();
        let dt = 1.0 / f64::from(self.sr);
        for frames in out.chunks_mut(block * channels) {
            let n = frames.len() / channels;
            let t0 = self.time_of(self.frame);

            self.bus_l[..n].fill(0.0);
            self.bus_r[..n].fill(0.0);

            let mut i = 0;
            while i < self.voices.len() {
                self.scratch_l[..n].fill(0.0);
                self.scratch_r[..n].fill(0.0);
                let alive = self.voices[i].render(t0, self.sr, &mut self.scratch_l[..n], &mut self.scratch_r[..n]);
                mix_in_place(&mut self.bus_l[..n], &self.scratch_l[..n], 1.0);
                mix_in_place(&mut self.bus_r[..n], &self.scratch_r[..n], 1.0);
                if alive {
                    i += 1;
                } else {
                    let ended = self.voices.swap_remove(i);
                    self.retire(ended);
                }
            }

            for (k, frame) in frames.chunks_mut(channels).enumerate() {
                let g = self.master.tick(t0 + k as f64 * dt);
                let l = clamp(self.bus_l[k] * g, -1.0, 1.0);
                let r = clamp(self.bus_r[k] * g, -1.0, 1.0);
                match frame {
                    [mono] => *mono = 0.5 * (l + r),
                    [fl, fr, rest @ ..] => {
                        *fl = l;
                        *fr = r;
                        rest.fill(0.0);
                    }
                    [] => {}
                }
            }

            self.frame += n as u64;
        }
        self.clock.store(self.frame, Ordering::Release);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ringbuf::traits::Split;
    use ringbuf::HeapRb;
    use tingle_core::filters::SvfTpt;

    use crate::spatial::PannerConfig;
    use crate::sound::AudioPosition;

    pub(crate) const SR: f32 = 48_000.0;

    /// Test harness: a renderer plus the engine-side ends of both rings.
    pub(crate) struct Rig {
        pub renderer: Renderer,
        pub tx: HeapProd<Command>,
        pub rx: HeapCons<RenderEvent>,
    }

    impl Rig {
        pub fn new(max_voices: usize) -> Self {
            Self::with_event_capacity(max_voices, 64)
        }

        pub fn with_event_capacity(max_voices: usize, event_capacity: usize) -> Self {
            let (tx, commands) = HeapRb::<Command>::new(64).split();
            let (events, rx) = HeapRb::<RenderEvent>::new(event_capacity).split();
            let mut renderer = Renderer::new(SR, Arc::new(AtomicU64::new(0)), commands, events, max_voices, 128);
            renderer.master.schedule(ParamEvent::set_value(0.0, 1.0));
            Self { renderer, tx, rx }
        }

        pub fn send(&mut self, cmd: Command) {
            assert!(self.tx.try_push(cmd).is_ok());
        }

        pub fn render(&mut self, frames: usize) -> Vec<f32> {
            let mut out = vec![0.0; frames * 2];
            self.renderer.process(&mut out, 2);
            out
        }

        pub fn ended(&mut self) -> Vec<VoiceId> {
            let mut ids = Vec::new();
            while let Some(RenderEvent::Ended(v)) = self.rx.try_pop() {
                ids.push(v.id());
            }
            ids
        }
    }

    pub(crate) fn dc_buffer(len: usize) -> SampleBuffer {
        SampleBuffer::new(vec![0.5; len], SR as u32).unwrap()
    }

    fn lowpass_voice(id: VoiceId, len: usize) -> Voice {
        Voice::new(id, dc_buffer(len), Route::LowPass(SvfTpt::new(2800.0, 0.7, SR)), SR)
    }

    fn peak(out: &[f32]) -> f32 {
        out.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }

    #[test]
    fn one_shot_voice_ends_and_is_reported() {
        let mut rig = Rig::new(4);
        rig.send(Command::Start(Box::new(lowpass_voice(1, 480))));
        let out = rig.render(1024);
        assert!(peak(&out) > 0.1);
        assert_eq!(rig.renderer.active_voices(), 0);
        assert_eq!(rig.ended(), vec![1]);
        // Past the buffer end, silence.
        assert!(peak(&rig.render(256)) < 1e-3);
    }

    #[test]
    fn looping_voice_runs_until_stopped() {
        let mut rig = Rig::new(4);
        rig.send(Command::Start(Box::new(lowpass_voice(7, 100).looping(true))));
        rig.render(4800);
        assert_eq!(rig.renderer.active_voices(), 1);
        rig.send(Command::Stop { voice: 7, at: 0.11 });
        rig.render(4800);
        assert_eq!(rig.renderer.active_voices(), 0);
        assert_eq!(rig.ended(), vec![7]);
    }

    #[test]
    fn delayed_start_is_silent_until_due() {
        let mut rig = Rig::new(4);
        rig.send(Command::Start(Box::new(lowpass_voice(2, 4800).starting_at(0.01))));
        let out = rig.render(960);
        // 0.01 s = 480 frames of silence.
        assert!(peak(&out[..480 * 2]) == 0.0);
        assert!(peak(&out[480 * 2..]) > 0.01);
    }

    #[test]
    fn full_graph_refuses_new_voices() {
        let mut rig = Rig::new(1);
        rig.send(Command::Start(Box::new(lowpass_voice(1, 48_000))));
        rig.send(Command::Start(Box::new(lowpass_voice(2, 48_000))));
        rig.render(64);
        assert_eq!(rig.renderer.active_voices(), 1);
        assert_eq!(rig.ended(), vec![2]);
    }

    #[test]
    fn ended_voices_wait_for_room_in_the_event_ring() {
        let mut rig = Rig::with_event_capacity(1, 1);
        rig.send(Command::Start(Box::new(lowpass_voice(1, 48_000).looping(true))));
        rig.send(Command::Start(Box::new(lowpass_voice(2, 480))));
        rig.send(Command::Start(Box::new(lowpass_voice(3, 480))));
        rig.render(64);
        // The ring holds 2; 3 waits renderer-side.
        assert_eq!(rig.renderer.pending_ended(), 1);
        assert_eq!(rig.ended(), vec![2]);

        rig.render(64);
        assert_eq!(rig.renderer.pending_ended(), 0);
        assert_eq!(rig.ended(), vec![3]);
        assert_eq!(rig.renderer.active_voices(), 1);
    }

    #[test]
    fn commands_wait_while_ended_voices_are_pending() {
        let mut rig = Rig::with_event_capacity(1, 1);
        rig.send(Command::Start(Box::new(lowpass_voice(1, 48_000).looping(true))));
        for id in 2..6 {
            rig.send(Command::Start(Box::new(lowpass_voice(id, 480))));
        }
        // Nobody drains the event ring: refusals stop at one pending voice.
        rig.render(64);
        rig.render(64);
        assert_eq!(rig.renderer.pending_ended(), 1);

        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.extend(rig.ended());
            rig.render(64);
        }
        seen.extend(rig.ended());
        assert_eq!(seen, vec![2, 3, 4, 5]);
        assert_eq!(rig.renderer.pending_ended(), 0);
    }

    #[test]
    fn automation_reaches_the_voice() {
        let mut rig = Rig::new(4);
        let at = AudioPosition::new(2.0, 0.0, 0.0);
        let voice = Voice::new(3, dc_buffer(48_000), Route::Spatial(BinauralPanner::new(SR, PannerConfig::default(), at)), SR);
        rig.send(Command::Start(Box::new(voice)));
        rig.send(Command::Automate { voice: 3, param: ParamTarget::Gain, event: ParamEvent::set_value(0.0, 0.0) });
        let out = rig.render(256);
        assert_eq!(peak(&out), 0.0);
    }

    #[test]
    fn master_gain_scales_and_limits() {
        let mut rig = Rig::new(4);
        rig.send(Command::Master(ParamEvent::set_value(0.0, 10.0)));
        rig.send(Command::Start(Box::new(lowpass_voice(1, 48_000))));
        let out = rig.render(4800);
        assert!(peak(&out) <= 1.0);
        assert!(peak(&out) > 0.99);
    }

    #[test]
    fn clock_tracks_rendered_frames() {
        let mut rig = Rig::new(1);
        rig.render(300);
        rig.render(300);
        assert_eq!(rig.renderer.clock.load(Ordering::Acquire), 600);
    }
}
