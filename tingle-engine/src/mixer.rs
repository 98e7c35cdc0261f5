//! Master gain stage shared by every session.

use tingle_core::param::ParamEvent;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::graph::{Command, GraphSink};

pub const DEFAULT_MASTER_GAIN: f32 = 0.85;
pub const MAX_MASTER_GAIN: f32 = 1.5;
/// Time constant of master gain changes (seconds).
pub const MASTER_SMOOTHING_S: f32 = 0.02;

/// Engine-side view of the master stage; the render side applies it and hard-limits the bus.
#[derive(Debug, Clone, Copy)]
pub struct Mixer {
    gain: f32,
}

impl Mixer {
    /// Bring the master stage up at `gain` (clamped) immediately.
    pub fn connect(sink: &mut dyn GraphSink, gain: f32) -> Self {
        let gain = if gain.is_finite() { gain.clamp(0.0, MAX_MASTER_GAIN) } else { DEFAULT_MASTER_GAIN };
        let now = sink.now();
        sink.submit(Command::Master(ParamEvent::set_value(now, gain)));
        debug!(gain, "master stage connected");
        Self { gain }
    }

    /// Last requested master gain.
    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Ramp to `value` clamped to `[0, 1.5]`. Returns the applied value.
    pub fn set_gain(&mut self, sink: &mut dyn GraphSink, value: f32) -> Result<f32> {
        if !value.is_finite() {
            return Err(EngineError::invalid(format!("master gain must be finite, got {value}")));
        }
        let gain = value.clamp(0.0, MAX_MASTER_GAIN);
        let now = sink.now();
        sink.submit(Command::Master(ParamEvent::set_target(now, gain, MASTER_SMOOTHING_S)));
        self.gain = gain;
        Ok(gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::tests::RecordingSink;

    #[test]
    fn connect_sets_initial_value() {
        let mut sink = RecordingSink::default();
        let m = Mixer::connect(&mut sink, DEFAULT_MASTER_GAIN);
        assert_eq!(m.gain(), 0.85);
        assert!(matches!(
            sink.commands.as_slice(),
            [Command::Master(ParamEvent::SetValue { value, .. })] if *value == 0.85
        ));
    }

    #[test]
    fn set_gain_clamps_and_ramps() {
        let mut sink = RecordingSink::default();
        let mut m = Mixer::connect(&mut sink, DEFAULT_MASTER_GAIN);
        assert_eq!(m.set_gain(&mut sink, 3.0).unwrap(), 1.5);
        assert_eq!(m.set_gain(&mut sink, -1.0).unwrap(), 0.0);
        assert!(matches!(
            sink.commands.last(),
            Some(Command::Master(ParamEvent::SetTarget { target, tau, .. })) if *target == 0.0 && *tau == 0.02
        ));
    }

    #[test]
    fn non_finite_gain_is_rejected() {
        let mut sink = RecordingSink::default();
        let mut m = Mixer::connect(&mut sink, DEFAULT_MASTER_GAIN);
        assert!(matches!(m.set_gain(&mut sink, f32::NAN), Err(EngineError::InvalidParameter(_))));
        assert_eq!(m.gain(), 0.85);
    }
}
