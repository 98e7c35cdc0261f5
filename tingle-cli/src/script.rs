//! Scripted demo session: taps, strokes and ambient changes on a virtual head.

use anyhow::{anyhow, bail, Context as _, Result};
use glam::{Quat, Vec3};
use tingle_engine::{
    touch_to_audio_position, AudioPosition, Catalog, GestureKind, OfflineHandle, PlaybackRequest, SoundDescriptor,
    TouchAudioEngine,
};

/// Seconds between stroke updates while dragging.
const STROKE_STEP_S: f64 = 0.04;
/// Silence rendered after the last cue so fades can finish.
pub const TAIL_S: f64 = 1.0;

/// Head model in world space. Directions are in head-local space, +x being the
/// model's right (which faces the viewer, so the listener's left).
#[derive(Debug, Clone, Copy)]
pub struct Head {
    pub center: Vec3,
    pub rotation: Quat,
    pub radius: f32,
}

impl Head {
    pub fn new(yaw_deg: f32) -> Self {
        Self {
            center: Vec3::new(0.0, 1.6, 0.0),
            rotation: Quat::from_rotation_y(yaw_deg.to_radians()),
            radius: 1.0,
        }
    }

    /// World-space hit on the head surface in direction `dir`.
    pub fn hit(&self, dir: Vec3) -> Vec3 {
        self.center + self.rotation * (dir.normalize_or_zero() * self.radius)
    }

    pub fn audio_position(&self, dir: Vec3) -> Result<AudioPosition> {
        Ok(touch_to_audio_position(self.hit(dir), self.center, self.rotation)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tap { sound: &'static str, dir: Vec3 },
    Stroke { sound: &'static str, dir: Vec3, speed: f32 },
    EndStroke,
    Ambient(Option<&'static str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub at: f64,
    pub action: Action,
}

#[derive(Debug, Default)]
pub struct Script {
    cues: Vec<Cue>,
}

impl Script {
    fn push(&mut self, at: f64, action: Action) -> &mut Self {
        self.cues.push(Cue { at, action });
        self
    }

    /// A drag from `from` to `to`, sampled every [`STROKE_STEP_S`], then released.
    fn drag(&mut self, at: f64, seconds: f64, sound: &'static str, from: Vec3, to: Vec3, speed: f32) -> &mut Self {
        let steps = (seconds / STROKE_STEP_S).ceil().max(1.0) as usize;
        for k in 0..=steps {
            let u = k as f32 / steps as f32;
            let dir = from.normalize_or_zero().lerp(to.normalize_or_zero(), u);
            self.push(at + k as f64 * STROKE_STEP_S, Action::Stroke { sound, dir, speed });
        }
        self.push(at + (steps + 1) as f64 * STROKE_STEP_S, Action::EndStroke)
    }

    /// About twelve seconds touring every built-in sound.
    pub fn demo() -> Self {
        let mut s = Self::default();
        s.push(0.0, Action::Ambient(Some("ambient-rain")))
            .push(0.6, Action::Tap { sound: "tap-light", dir: Vec3::NEG_X })
            .push(1.3, Action::Tap { sound: "whisper-soft", dir: Vec3::X })
            .drag(2.0, 2.0, "brush-soft", Vec3::new(0.0, 0.4, 1.0), Vec3::new(0.0, 0.6, -1.0), 420.0)
            .drag(4.6, 1.4, "scratch-gentle", Vec3::new(-1.0, 0.5, 0.3), Vec3::new(-1.0, -0.3, -0.3), 820.0)
            .push(6.4, Action::Tap { sound: "water-drop", dir: Vec3::Z })
            .push(7.0, Action::Ambient(Some("ambient-night")))
            .drag(8.0, 2.0, "ear-clean", Vec3::new(1.0, 0.1, 0.2), Vec3::new(1.0, -0.1, -0.2), 300.0)
            .push(10.6, Action::Ambient(None));
        s.cues.sort_by(|a, b| a.at.total_cmp(&b.at));
        s
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    /// Time of the last cue plus the tail.
    pub fn length_s(&self) -> f64 {
        self.cues.last().map_or(0.0, |c| c.at) + TAIL_S
    }
}

fn lookup<'c>(catalog: &'c Catalog, id: &str) -> Result<&'c SoundDescriptor> {
    catalog.get(id).ok_or_else(|| anyhow!("unknown sound {id}"))
}

/// The sound for a touch gesture, refused if its trigger mode does not answer to it.
fn gesture_sound<'c>(catalog: &'c Catalog, id: &str, gesture: GestureKind) -> Result<&'c SoundDescriptor> {
    let sound = lookup(catalog, id)?;
    if !sound.trigger().accepts(gesture) {
        bail!("{id} ({:?}) does not answer to {gesture:?}", sound.trigger());
    }
    Ok(sound)
}

/// Apply one cue to the engine.
pub fn perform(engine: &mut TouchAudioEngine, catalog: &Catalog, head: &Head, action: &Action) -> Result<()> {
    match *action {
        Action::Tap { sound: id, dir } => {
            let sound = gesture_sound(catalog, id, GestureKind::Tap)?;
            let pos = head.audio_position(dir)?;
            engine.play(&PlaybackRequest::tap(sound, pos)).with_context(|| format!("tap {id}"))?;
        }
        Action::Stroke { sound: id, dir, speed } => {
            let sound = gesture_sound(catalog, id, GestureKind::Drag)?;
            let pos = head.audio_position(dir)?;
            engine
                .update_stroke(&PlaybackRequest::drag(sound, pos, speed))
                .with_context(|| format!("stroke {id}"))?;
        }
        Action::EndStroke => engine.end_stroke(),
        Action::Ambient(Some(id)) => {
            let bed = lookup(catalog, id)?;
            engine.set_ambient_track(Some(bed), bed.base_gain()).with_context(|| format!("ambient {id}"))?;
        }
        Action::Ambient(None) => engine.set_ambient_track(None, 0.0)?,
    }
    Ok(())
}

/// Run `script` against an offline engine, handing each rendered interleaved
/// block to `sink`.
pub fn drive_offline(
    engine: &mut TouchAudioEngine,
    handle: &OfflineHandle,
    catalog: &Catalog,
    head: &Head,
    script: &Script,
    sample_rate: u32,
    mut sink: impl FnMut(&[f32]) -> Result<()>,
) -> Result<u64> {
    const BLOCK: u64 = 1024;
    let sr = f64::from(sample_rate);
    let mut rendered = 0u64;
    let mut render_until = |frame: u64, rendered: &mut u64| -> Result<()> {
        while *rendered < frame {
            let n = (frame - *rendered).min(BLOCK);
            sink(&handle.render(n as usize))?;
            *rendered += n;
        }
        Ok(())
    };

    for cue in script.cues() {
        render_until((cue.at * sr).round() as u64, &mut rendered)?;
        perform(engine, catalog, head, &cue.action)?;
        engine.collect_ended();
    }
    render_until((script.length_s() * sr).round() as u64, &mut rendered)?;
    engine.collect_ended();
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tingle_engine::EngineConfig;

    #[test]
    fn demo_is_ordered_and_balanced() {
        let s = Script::demo();
        assert!(s.cues().windows(2).all(|w| w[0].at <= w[1].at));
        let ends = s.cues().iter().filter(|c| c.action == Action::EndStroke).count();
        assert_eq!(ends, 3);
        assert_eq!(s.cues().last().map(|c| &c.action), Some(&Action::Ambient(None)));
    }

    #[test]
    fn every_scripted_sound_exists() {
        let catalog = Catalog::builtin();
        for cue in Script::demo().cues() {
            let id = match cue.action {
                Action::Tap { sound, .. } | Action::Stroke { sound, .. } => sound,
                Action::Ambient(Some(sound)) => sound,
                _ => continue,
            };
            assert!(catalog.get(id).is_some(), "{id}");
        }
    }

    #[test]
    fn scripted_gestures_match_trigger_modes() {
        let catalog = Catalog::builtin();
        for cue in Script::demo().cues() {
            let (id, gesture) = match cue.action {
                Action::Tap { sound, .. } => (sound, GestureKind::Tap),
                Action::Stroke { sound, .. } => (sound, GestureKind::Drag),
                _ => continue,
            };
            assert!(gesture_sound(&catalog, id, gesture).is_ok(), "{id} {gesture:?}");
        }
    }

    #[test]
    fn wrong_gesture_is_refused_before_playback() {
        let catalog = Catalog::builtin();
        let (mut engine, _handle) = TouchAudioEngine::offline(EngineConfig::offline(16_000));
        let drag_tap = Action::Stroke { sound: "tap-light", dir: Vec3::X, speed: 300.0 };
        assert!(perform(&mut engine, &catalog, &Head::new(0.0), &drag_tap).is_err());
        let tap_brush = Action::Tap { sound: "brush-soft", dir: Vec3::X };
        assert!(perform(&mut engine, &catalog, &Head::new(0.0), &tap_brush).is_err());
        assert_eq!(engine.stroke_sound(), None);
        assert_eq!(engine.synth_count(), 0);
    }

    #[test]
    fn model_left_is_listener_right() {
        let head = Head::new(0.0);
        assert!(head.audio_position(Vec3::NEG_X).unwrap().x > 1.0);
        // A turned head still maps its own side consistently.
        let turned = Head::new(90.0);
        assert!(turned.audio_position(Vec3::NEG_X).unwrap().x > 1.0);
    }

    #[test]
    fn offline_demo_renders_audio() {
        let catalog = Catalog::builtin();
        let (mut engine, handle) = TouchAudioEngine::offline(EngineConfig::offline(16_000));
        engine.resume_context().unwrap();
        let script = Script::demo();
        let mut peak = 0.0f32;
        let frames = drive_offline(&mut engine, &handle, &catalog, &Head::new(0.0), &script, 16_000, |block| {
            peak = block.iter().fold(peak, |m, v| m.max(v.abs()));
            Ok(())
        })
        .unwrap();
        assert_eq!(frames, (script.length_s() * 16_000.0).round() as u64);
        assert!(peak > 0.05 && peak <= 1.0, "peak {peak}");
        assert_eq!(engine.stroke_sound(), None);
        assert_eq!(engine.ambient_sound(), None);
    }
}
