//! Sample-accurate parameter automation.
//!
//! An [`AutomatedParam`] holds a current value plus a short, time-sorted queue
//! of [`ParamEvent`]s. The render thread calls [`AutomatedParam::tick`] once per
//! sample with the context time; due events are applied in order and an active
//! set-target event moves the value with a one-pole exponential approach.
//!
//! The queue is a fixed array so scheduling never allocates on the audio thread.

use crate::dsp::one_pole_coeff_s;

/// Pending events per parameter. When full, the earliest event is applied early.
pub const MAX_PENDING: usize = 8;

/// A scheduled change, times in context seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamEvent {
    /// Jump to `value` at `time`, cancelling any active approach.
    SetValue { time: f64, value: f32 },
    /// From `time` on, approach `target` exponentially with time constant `tau` seconds.
    SetTarget { time: f64, target: f32, tau: f32 },
}

impl ParamEvent {
    #[inline]
    pub fn set_value(time: f64, value: f32) -> Self {
        Self::SetValue { time, value }
    }

    #[inline]
    pub fn set_target(time: f64, target: f32, tau: f32) -> Self {
        Self::SetTarget { time, target, tau }
    }

    #[inline]
    pub fn time(&self) -> f64 {
        match *self {
            Self::SetValue { time, .. } | Self::SetTarget { time, .. } => time,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Approach {
    target: f32,
    coeff: f32,
}

/// A parameter driven by scheduled events.
#[derive(Copy, Clone, Debug)]
pub struct AutomatedParam {
    value: f32,
    sr: f32,
    approach: Option<Approach>,
    pending: [ParamEvent; MAX_PENDING],
    len: usize,
}

impl AutomatedParam {
    #[inline]
    pub fn new(value: f32, sr: f32) -> Self {
        Self {
            value,
            sr: sr.max(1.0),
            approach: None,
            pending: [ParamEvent::set_value(0.0, value); MAX_PENDING],
            len: 0,
        }
    }

    #[inline] pub fn value(&self) -> f32 { self.value }
    #[inline] pub fn pending(&self) -> usize { self.len }

    /// Current approach target, if an exponential ramp is active.
    #[inline]
    pub fn target(&self) -> Option<f32> {
        self.approach.map(|a| a.target)
    }

    /// Queue an event. Events with equal times keep their scheduling order.
    pub fn schedule(&mut self, event: ParamEvent) {
        if self.len == MAX_PENDING {
            let earliest = self.pending[0];
            self.pending.copy_within(1.., 0);
            self.len -= 1;
            self.apply(earliest);
        }

        let t = event.time();
        let mut at = self.len;
        while at > 0 && self.pending[at - 1].time() > t {
            at -= 1;
        }
        self.pending.copy_within(at..self.len, at + 1);
        self.pending[at] = event;
        self.len += 1;
    }

    /// Drop every queued event and freeze the value where it is.
    pub fn cancel(&mut self) {
        self.len = 0;
        self.approach = None;
    }

    /// Advance one sample at context time `t` and return the new value.
    #[inline]
    pub fn tick(&mut self, t: f64) -> f32 {
        while self.len > 0 && self.pending[0].time() <= t {
            let ev = self.pending[0];
            self.pending.copy_within(1..self.len, 0);
            self.len -= 1;
            self.apply(ev);
        }

        if let Some(Approach { target, coeff }) = self.approach {
            self.value = target + (self.value - target) * coeff;
            if (self.value - target).abs() <= f32::EPSILON * target.abs().max(1e-3) {
                self.value = target;
            }
        }
        self.value
    }

    fn apply(&mut self, event: ParamEvent) {
        match event {
            ParamEvent::SetValue { value, .. } => {
                self.value = value;
                self.approach = None;
            }
            ParamEvent::SetTarget { target, tau, .. } => {
                if tau <= 0.0 {
                    self.value = target;
                    self.approach = None;
                } else {
                    self.approach = Some(Approach {
                        target,
                        coeff: one_pole_coeff_s(tau, self.sr),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SR: f32 = 48_000.0;

    fn run(p: &mut AutomatedParam, from: f64, seconds: f64) -> f32 {
        let n = (seconds * f64::from(SR)) as usize;
        let mut v = p.value();
        for i in 0..n {
            v = p.tick(from + i as f64 / f64::from(SR));
        }
        v
    }

    #[test]
    fn set_value_applies_at_its_time() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(ParamEvent::set_value(0.01, 1.0));
        assert_eq!(p.tick(0.005), 0.0);
        assert_eq!(p.tick(0.01), 1.0);
    }

    #[test]
    fn set_target_is_an_exponential_approach() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(ParamEvent::set_target(0.0, 1.0, 0.02));
        let after_tau = run(&mut p, 0.0, 0.02);
        assert_abs_diff_eq!(after_tau, 1.0 - (-1.0f32).exp(), epsilon = 2e-3);
        let settled = run(&mut p, 0.02, 0.3);
        assert_abs_diff_eq!(settled, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn value_never_jumps_under_a_ramp() {
        let mut p = AutomatedParam::new(1.2, SR);
        p.schedule(ParamEvent::set_target(0.0, 0.0001, 0.05));
        let mut prev = p.value();
        for i in 0..4800 {
            let v = p.tick(f64::from(i) / f64::from(SR));
            assert!((prev - v).abs() < 0.01, "step too large at {i}");
            prev = v;
        }
    }

    #[test]
    fn events_keep_time_order() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(ParamEvent::set_value(0.2, 2.0));
        p.schedule(ParamEvent::set_value(0.1, 1.0));
        assert_eq!(p.tick(0.15), 1.0);
        assert_eq!(p.tick(0.25), 2.0);
    }

    #[test]
    fn full_queue_applies_earliest_event() {
        let mut p = AutomatedParam::new(0.0, SR);
        for i in 0..=MAX_PENDING {
            p.schedule(ParamEvent::set_value(1.0 + i as f64, i as f32 + 1.0));
        }
        assert_eq!(p.pending(), MAX_PENDING);
        assert_eq!(p.value(), 1.0);
    }

    #[test]
    fn zero_tau_jumps() {
        let mut p = AutomatedParam::new(0.0, SR);
        p.schedule(ParamEvent::set_target(0.0, 0.5, 0.0));
        assert_eq!(p.tick(0.0), 0.5);
    }
}
