//! Pseudo-random primitives shared by the effect pipeline.
//!
//! - [`XorShift64`] drives every random decision (glitch bands, shake, noise bursts)
//! - [`hash_noise`] is the coherent per-pixel noise sampled by the noise stage
//! - [`should_glitch`] is the probability gate for glitch bursts
//!
//! Nothing here touches global state; callers own the generator and pass it in.

/// Tiny PRNG (xorshift64*).
///
/// Seeded from the wall clock by the CLI so visuals differ run to run, or from
/// `--seed` when a reproducible render is wanted.
#[derive(Debug, Clone, Copy)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// `seed = 0` is remapped to a non-zero internal state so the generator
    /// cannot lock into an all-zero sequence.
    pub const fn from_seed(seed: u64) -> Self {
        let mixed = seed ^ 0x9E37_79B9_7F4A_7C15;
        let state = if mixed == 0 {
            0xA076_1D64_78BD_642F
        } else {
            mixed
        };
        Self { state }
    }

    #[inline(always)]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform value in `[0, 1)`.
    #[inline(always)]
    pub fn next_f32(&mut self) -> f32 {
        // 24 high bits fit exactly in an f32 mantissa.
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform integer in `[low, high]`.
    #[inline(always)]
    pub fn range_inclusive(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        let span = (high - low) as u64 + 1;
        let zone = u64::MAX - (u64::MAX % span);
        loop {
            let sample = self.next_u64();
            if sample < zone {
                return low + (sample % span) as i32;
            }
        }
    }

    /// Uniform float in `[-amplitude, amplitude)`.
    #[inline(always)]
    pub fn symmetric(&mut self, amplitude: f32) -> f32 {
        self.next_f32() * amplitude * 2.0 - amplitude
    }
}

/// Coherent hash noise in `[0, 1)`.
///
/// Classic `fract(sin(dot) * 43758.5453)` hash. Evaluated in f64 because the
/// argument grows with the time term and f32 `sin` loses all precision there.
#[inline(always)]
pub fn hash_noise(x: f32, y: f32, time: f32) -> f32 {
    let n = (f64::from(x) * 12.9898 + f64::from(y) * 78.233 + f64::from(time)).sin() * 43758.5453;
    (n - n.floor()) as f32
}

/// Probability gate. `probability <= 0` never fires, `>= 1` always fires.
pub fn should_glitch(rng: &mut XorShift64, probability: f32) -> bool {
    rng.next_f32() < probability
}

pub fn ease_out_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}
