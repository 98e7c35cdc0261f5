//! Execution context: the engine-side handle on a running render graph.
//!
//! A [`Context`] owns an output [`Backend`], the producer end of the command ring
//! and the consumer end of the event ring. The backend owns the [`Renderer`] and
//! drives it from whatever thread produces audio (the device callback for
//! [`CpalBackend`](crate::output::CpalBackend), the caller for [`OfflineBackend`]).
//!
//! Contexts start suspended. [`Context::resume`] is the one blocking call; it
//! returns once the backend reports that it is running.
//!
//! Commands that do not fit the ring wait in an ordered backlog. While the
//! output is suspended nothing drains the ring, so a set-target for a voice
//! parameter that already has one queued in the backlog replaces it in place.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tingle_core::param::ParamEvent;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{Command, GraphSink, RenderEvent, Renderer, VoiceId};

/// An audio output that can host a [`Renderer`].
pub trait Backend {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;

    /// Take ownership of the renderer. Called exactly once, before `resume`.
    fn attach(&mut self, renderer: Renderer) -> Result<()>;

    /// Start (or restart) rendering. Returns once the output is running.
    fn resume(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Stop rendering and release the output. Idempotent.
    fn close(&mut self) -> Result<()>;
}

// ---------------------------------- Offline --------------------------------------

#[derive(Debug)]
struct OfflineState {
    renderer: Option<Renderer>,
    running: bool,
    closed: bool,
    autoplay_blocked: bool,
    channels: u16,
}

/// Backend without a device: audio is pulled through an [`OfflineHandle`].
///
/// Used by the CLI's `render` command and by tests.
#[derive(Debug)]
pub struct OfflineBackend {
    sample_rate: u32,
    state: Arc<Mutex<OfflineState>>,
}

/// Caller-side handle of an [`OfflineBackend`]; renders on demand.
#[derive(Debug, Clone)]
pub struct OfflineHandle {
    state: Arc<Mutex<OfflineState>>,
}

fn lock(state: &Mutex<OfflineState>) -> MutexGuard<'_, OfflineState> {
    // Render state stays consistent across a panicking test thread.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OfflineBackend {
    pub fn new(sample_rate: u32, channels: u16) -> (Self, OfflineHandle) {
        let state = Arc::new(Mutex::new(OfflineState {
            renderer: None,
            running: false,
            closed: false,
            autoplay_blocked: false,
            channels: channels.max(1),
        }));
        let handle = OfflineHandle { state: Arc::clone(&state) };
        (Self { sample_rate, state }, handle)
    }
}

impl Backend for OfflineBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        lock(&self.state).channels
    }

    fn attach(&mut self, renderer: Renderer) -> Result<()> {
        let mut st = lock(&self.state);
        if st.closed {
            return Err(EngineError::Backend("offline backend is closed".into()));
        }
        st.renderer = Some(renderer);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let mut st = lock(&self.state);
        if st.closed {
            return Err(EngineError::Backend("offline backend is closed".into()));
        }
        if st.autoplay_blocked {
            return Err(EngineError::Backend("resume refused by autoplay policy".into()));
        }
        st.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    fn close(&mut self) -> Result<()> {
        let mut st = lock(&self.state);
        st.running = false;
        st.closed = true;
        st.renderer = None;
        Ok(())
    }
}

impl OfflineHandle {
    /// Render `frames` interleaved frames. A suspended or closed backend yields
    /// silence and does not advance the clock.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut st = lock(&self.state);
        let channels = usize::from(st.channels);
        let mut out = vec![0.0; frames * channels];
        if st.running {
            if let Some(renderer) = st.renderer.as_mut() {
                renderer.process(&mut out, channels);
            }
        }
        out
    }

    /// Make every `resume` fail until cleared, like a platform autoplay policy.
    pub fn set_autoplay_blocked(&self, blocked: bool) {
        lock(&self.state).autoplay_blocked = blocked;
    }

    pub fn channels(&self) -> u16 {
        lock(&self.state).channels
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Voices currently alive on the render side.
    pub fn active_voices(&self) -> usize {
        lock(&self.state).renderer.as_ref().map_or(0, Renderer::active_voices)
    }
}

// ---------------------------------- Context --------------------------------------

pub struct Context {
    backend: Box<dyn Backend>,
    sr: f32,
    clock: Arc<AtomicU64>,
    commands: HeapProd<Command>,
    events: HeapCons<RenderEvent>,
    backlog: VecDeque<Command>,
    next_id: VoiceId,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("sr", &self.sr)
            .field("time", &self.current_time())
            .field("running", &self.backend.is_running())
            .field("backlog", &self.backlog.len())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Wire a renderer into `backend`. The context comes up suspended.
    pub fn open(mut backend: Box<dyn Backend>, config: &EngineConfig) -> Result<Self> {
        let sr = backend.sample_rate();
        if sr == 0 {
            return Err(EngineError::Unsupported("backend reports a zero sample rate".into()));
        }
        let sr = sr as f32;

        let (commands, render_commands) = HeapRb::<Command>::new(config.command_capacity.max(1)).split();
        let (render_events, events) = HeapRb::<RenderEvent>::new(config.event_capacity.max(1)).split();
        let clock = Arc::new(AtomicU64::new(0));

        let renderer = Renderer::new(
            sr,
            Arc::clone(&clock),
            render_commands,
            render_events,
            config.max_voices,
            config.block_frames,
        );
        backend.attach(renderer)?;
        debug!(sample_rate = sr, channels = backend.channels(), "audio context opened");

        Ok(Self {
            backend,
            sr,
            clock,
            commands,
            events,
            backlog: VecDeque::new(),
            next_id: 1,
        })
    }

    /// Seconds rendered so far.
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / f64::from(self.sr)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.backend.is_running()
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.backend.channels()
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.backend.is_running() {
            return Ok(());
        }
        self.backend.resume()?;
        debug!("audio context running");
        Ok(())
    }

    /// Commands waiting for room in the ring.
    #[inline]
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    /// Move as much of the backlog into the ring as fits, preserving order.
    pub fn flush(&mut self) {
        while let Some(cmd) = self.backlog.pop_front() {
            if let Err(cmd) = self.commands.try_push(cmd) {
                self.backlog.push_front(cmd);
                break;
            }
        }
    }

    /// Collect the ids of voices the renderer has finished with.
    /// The voices themselves are dropped here, off the audio thread.
    pub fn drain_ended(&mut self) -> Vec<VoiceId> {
        let mut ended = Vec::new();
        while let Some(RenderEvent::Ended(voice)) = self.events.try_pop() {
            ended.push(voice.id());
        }
        ended
    }

    pub fn close(&mut self) -> Result<()> {
        self.backlog.clear();
        let pending = self.events.occupied_len();
        if pending > 0 {
            trace!(pending, "dropping unreaped render events");
        }
        self.backend.close()
    }
}

impl GraphSink for Context {
    fn now(&self) -> f64 {
        self.current_time()
    }

    fn sample_rate(&self) -> f32 {
        self.sr
    }

    fn next_voice_id(&mut self) -> VoiceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn submit(&mut self, command: Command) {
        self.flush();
        if !self.backlog.is_empty() {
            self.defer(command);
            return;
        }
        if let Err(command) = self.commands.try_push(command) {
            trace!("command ring full, deferring");
            self.defer(command);
        }
    }
}

impl Context {
    fn defer(&mut self, command: Command) {
        let command = if self.backend.is_running() { Some(command) } else { self.coalesce(command) };
        if let Some(command) = command {
            self.backlog.push_back(command);
        }
    }

    /// Fold a set-target into the latest queued set-target for the same voice
    /// parameter. Returns the command if it still has to be queued.
    ///
    /// The scan stops at anything that orders against it: a set-value on the
    /// same parameter, or the start or stop of the same voice.
    fn coalesce(&mut self, command: Command) -> Option<Command> {
        let Command::Automate { voice, param, event: event @ ParamEvent::SetTarget { .. } } = command else {
            return Some(command);
        };
        for queued in self.backlog.iter_mut().rev() {
            match queued {
                Command::Automate { voice: v, param: p, event: queued_event } if *v == voice && *p == param => {
                    if matches!(queued_event, ParamEvent::SetTarget { .. }) {
                        *queued_event = event;
                        return None;
                    }
                    break;
                }
                Command::Start(v) if v.id() == voice => break,
                Command::Stop { voice: v, .. } if *v == voice => break,
                _ => {}
            }
        }
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::dc_buffer;
    use crate::graph::{ParamTarget, Route, Voice};
    use tingle_core::filters::SvfTpt;

    fn offline(config: &EngineConfig) -> (Context, OfflineHandle) {
        let (backend, handle) = OfflineBackend::new(48_000, 2);
        (Context::open(Box::new(backend), config).unwrap(), handle)
    }

    fn start(ctx: &mut Context, len: usize) -> VoiceId {
        let id = ctx.next_voice_id();
        let sr = ctx.sr;
        let voice = Voice::new(id, dc_buffer(len), Route::LowPass(SvfTpt::new(2800.0, 0.7, sr)), sr);
        ctx.submit(Command::Start(Box::new(voice)));
        id
    }

    #[test]
    fn starts_suspended_and_silent() {
        let (mut ctx, handle) = offline(&EngineConfig::offline(48_000));
        assert!(!ctx.is_running());
        start(&mut ctx, 4800);
        let out = handle.render(256);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(ctx.current_time(), 0.0);
    }

    #[test]
    fn resume_runs_and_clock_advances() {
        let (mut ctx, handle) = offline(&EngineConfig::offline(48_000));
        ctx.resume().unwrap();
        assert!(handle.is_running());
        handle.render(480);
        assert!((ctx.current_time() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn autoplay_block_fails_resume() {
        let (mut ctx, handle) = offline(&EngineConfig::offline(48_000));
        handle.set_autoplay_blocked(true);
        assert!(matches!(ctx.resume(), Err(EngineError::Backend(_))));
        handle.set_autoplay_blocked(false);
        assert!(ctx.resume().is_ok());
    }

    #[test]
    fn ended_voices_come_back() {
        let (mut ctx, handle) = offline(&EngineConfig::offline(48_000));
        ctx.resume().unwrap();
        let id = start(&mut ctx, 100);
        handle.render(512);
        assert_eq!(ctx.drain_ended(), vec![id]);
        assert!(ctx.drain_ended().is_empty());
    }

    #[test]
    fn overflow_goes_to_backlog_in_order() {
        let config = EngineConfig { command_capacity: 2, ..EngineConfig::offline(48_000) };
        let (mut ctx, handle) = offline(&config);
        ctx.resume().unwrap();
        let ids: Vec<_> = (0..5).map(|_| start(&mut ctx, 100)).collect();
        assert_eq!(ctx.backlog(), 3);

        let mut ended = Vec::new();
        for _ in 0..4 {
            handle.render(256);
            ctx.flush();
            ended.extend(ctx.drain_ended());
        }
        assert_eq!(ctx.backlog(), 0);
        assert_eq!(ended, ids);
    }

    fn glide(ctx: &mut Context, voice: VoiceId, x: f32) {
        let now = ctx.now();
        ctx.submit(Command::Automate {
            voice,
            param: ParamTarget::PositionX,
            event: ParamEvent::set_target(now, x, 0.05),
        });
        ctx.submit(Command::Automate { voice, param: ParamTarget::Gain, event: ParamEvent::set_target(now, 0.5, 0.05) });
    }

    #[test]
    fn suspended_backlog_keeps_only_the_latest_targets() {
        let config = EngineConfig { command_capacity: 4, ..EngineConfig::offline(48_000) };
        let (mut ctx, _handle) = offline(&config);
        let a = start(&mut ctx, 48_000);
        let b = start(&mut ctx, 48_000);
        for k in 0..20_000 {
            glide(&mut ctx, a, k as f32 * 1e-4);
            glide(&mut ctx, b, -(k as f32) * 1e-4);
        }
        // Ring holds four commands; the backlog only one target per voice parameter.
        assert!(ctx.backlog() <= 4, "backlog {}", ctx.backlog());

        let last_x = ctx.backlog.iter().rev().find_map(|c| match c {
            Command::Automate { voice, param: ParamTarget::PositionX, event: ParamEvent::SetTarget { target, .. } }
                if *voice == a =>
            {
                Some(*target)
            }
            _ => None,
        });
        assert_eq!(last_x, Some(19_999.0 * 1e-4));
    }

    #[test]
    fn set_value_and_stop_are_never_folded() {
        let config = EngineConfig { command_capacity: 1, ..EngineConfig::offline(48_000) };
        let (mut ctx, _handle) = offline(&config);
        let a = start(&mut ctx, 48_000);
        ctx.submit(Command::Automate { voice: a, param: ParamTarget::Gain, event: ParamEvent::set_target(0.0, 0.2, 0.05) });
        ctx.submit(Command::Stop { voice: a, at: 1.0 });
        ctx.submit(Command::Automate { voice: a, param: ParamTarget::Gain, event: ParamEvent::set_target(0.0, 0.0, 0.05) });
        ctx.submit(Command::Automate { voice: a, param: ParamTarget::Rate, event: ParamEvent::set_value(0.0, 1.0) });
        ctx.submit(Command::Automate { voice: a, param: ParamTarget::Rate, event: ParamEvent::set_value(0.0, 1.1) });
        assert_eq!(ctx.backlog(), 5);
    }

    #[test]
    fn running_backlog_is_not_folded() {
        let config = EngineConfig { command_capacity: 1, ..EngineConfig::offline(48_000) };
        let (mut ctx, _handle) = offline(&config);
        ctx.resume().unwrap();
        let a = start(&mut ctx, 48_000);
        for k in 0..10 {
            glide(&mut ctx, a, k as f32 * 0.1);
        }
        assert_eq!(ctx.backlog(), 20);
    }

    #[test]
    fn closed_backend_is_silent() {
        let (mut ctx, handle) = offline(&EngineConfig::offline(48_000));
        ctx.resume().unwrap();
        start(&mut ctx, 48_000);
        ctx.close().unwrap();
        assert!(handle.render(128).iter().all(|&s| s == 0.0));
        assert!(ctx.resume().is_err());
    }
}
