use std::num::Wrapping;

use crate::ONE_MINUS_EPSILON;

const PCG32_DEFAULT_STATE: Wrapping<u64> = Wrapping(0x853c49e6748fea9b);
const PCG32_DEFAULT_STREAM: Wrapping<u64> = Wrapping(0xda3e39cb94b95bdb);
const PCG32_MULT: Wrapping<u64> = Wrapping(0x5851f42d4c957f2d);

/// PCG32 pseudo-random generator. Small state, decent quality, and cheap to
/// reseed per (tile, sample) for reproducible renders.
#[derive(Debug, Copy, Clone)]
pub struct Rng {
    state: Wrapping<u64>,
    inc: Wrapping<u64>,
}

impl Rng {
    pub fn new() -> Rng {
        Rng {
            state: PCG32_DEFAULT_STATE,
            inc: PCG32_DEFAULT_STREAM,
        }
    }

    pub fn with_sequence(seed: u64) -> Rng {
        let mut rng = Rng::new();
        rng.set_sequence(seed);
        rng
    }

    pub fn uniform_u32(&mut self) -> u32 {
        let oldstate = self.state;
        self.state = oldstate * PCG32_MULT + self.inc;
        let xorshifted = (((oldstate >> 18) ^ oldstate) >> 27).0 as u32;
        let rot = (oldstate >> 59).0 as u32;

        xorshifted.rotate_right(rot)
    }

    /// Uniform integer in [0, b), free of modulo bias.
    pub fn uniform_u32_bounded(&mut self, b: u32) -> u32 {
        let threshold = (!b + 1) % b;
        loop {
            let r = self.uniform_u32();
            if r >= threshold {
                return r % b;
            }
        }
    }

    pub fn uniform_f32(&mut self) -> f32 {
        (self.uniform_u32() as f32 * 2.3283064365386963e-10).min(ONE_MINUS_EPSILON)
    }

    pub fn set_sequence(&mut self, seed: u64) {
        self.state = Wrapping(0);
        self.inc = Wrapping((seed << 1) | 1);
        let _ = self.uniform_u32();
        self.state += PCG32_DEFAULT_STATE;
        let _ = self.uniform_u32();
    }
}

impl Default for Rng {
    fn default() -> Rng {
        Rng::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range() {
        let mut rng = Rng::with_sequence(7);
        for _ in 0..10_000 {
            let u = rng.uniform_f32();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_deterministic() {
        let mut a = Rng::with_sequence(42);
        let mut b = Rng::with_sequence(42);
        for _ in 0..100 {
            assert_eq!(a.uniform_u32(), b.uniform_u32());
        }
    }

    #[test]
    fn test_bounded() {
        let mut rng = Rng::with_sequence(3);
        for _ in 0..1000 {
            assert!(rng.uniform_u32_bounded(7) < 7);
        }
    }

    #[test]
    fn test_mean() {
        let mut rng = Rng::with_sequence(11);
        let n = 100_000;
        let mean: f32 = (0..n).map(|_| rng.uniform_f32()).sum::<f32>() / n as f32;
        assert!((mean - 0.5).abs() < 0.01);
    }
}
