#![cfg_attr(not(feature = "std"), no_std)]
//! Tingle Core — no_std-ready DSP primitives for the touch-to-sound engine.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` and use `libm`/`micromath` math backends
//! - `fast-math`: polynomial sine for the synthesis bank
//! - `simd`     : `wide`-backed bus mixing
//!
//! Modules
//! - [`dsp`]     : math backend, clamps, one-pole coefficients, bus mixing
//! - [`noise`]   : seeded 32-bit LCG noise source
//! - [`param`]   : scheduled parameter automation (set-value / set-target)
//! - [`filters`] : one-pole low-pass, TPT SVF
//!
//! Nothing in this crate allocates; every primitive is safe to tick on an audio thread.

pub mod dsp;
pub mod filters;
pub mod noise;
pub mod param;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::dsp::{clamp, fast_sin, kill_denormals, lerp, mix_in_place, one_pole_coeff_s, TAU};
    pub use crate::filters::{OnePoleLP, SvfTpt};
    pub use crate::noise::Lcg;
    pub use crate::param::{AutomatedParam, ParamEvent};
}

#[cfg(test)]
mod smoke {

    #[test]
    fn prelude_exists() {
        use crate::prelude::*;
        let mut rng = Lcg::new(1);
        let mut p = AutomatedParam::new(0.0, 48_000.0);
        p.schedule(ParamEvent::set_target(0.0, 1.0, 0.01));
        let mut lp = OnePoleLP::new(1000.0, 48000.0);
        let _ = lp.process(rng.next_bipolar() * p.tick(0.0));
    }
}
