//! Seeded noise source.
//!
//! Every synthesized buffer draws from its own [`Lcg`] seeded with the sound's
//! seed, so "seed 23" renders the same samples on every run and every machine.

use rand::{Error, RngCore, SeedableRng};

/// Numerical Recipes LCG multiplier.
pub const LCG_MULTIPLIER: u32 = 1_664_525;
/// Numerical Recipes LCG increment.
pub const LCG_INCREMENT: u32 = 1_013_904_223;

const INV_2_POW_32: f64 = 1.0 / 4_294_967_296.0;

/// 32-bit linear congruential generator, modulo 2^32.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    #[inline]
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Advance and return the next value in `[0, 1)`.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        let u = f64::from(self.step()) * INV_2_POW_32;
        // f64 -> f32 may round up to exactly 1.0 for states near 2^32.
        let v = u as f32;
        if v >= 1.0 { f32::from_bits(0x3F7F_FFFF) } else { v }
    }

    /// Advance and return a bipolar sample in `[-1, 1)`.
    #[inline]
    pub fn next_bipolar(&mut self) -> f32 {
        self.next_f32() * 2.0 - 1.0
    }

    #[inline]
    fn step(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }
}

impl RngCore for Lcg {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.step()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.step());
        let lo = u64::from(self.step());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Lcg {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}
