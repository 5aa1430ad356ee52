use super::Sampler;
use crate::rng::Rng;
use crate::{Point2f, Point2i, ONE_MINUS_EPSILON};

const PRIMES: [u32; 64] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191,
    193, 197, 199, 211, 223, 227, 229, 233, 239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293,
    307, 311,
];

/// Van der Corput radical inverse of `a` in the given base.
pub fn radical_inverse(base: u32, mut a: u64) -> f32 {
    let inv_base = 1.0 / base as f64;
    let mut reversed: u64 = 0;
    let mut inv_base_n = 1.0f64;
    while a != 0 {
        let next = a / base as u64;
        let digit = a - next * base as u64;
        reversed = reversed * base as u64 + digit;
        inv_base_n *= inv_base;
        a = next;
    }
    ((reversed as f64 * inv_base_n) as f32).min(ONE_MINUS_EPSILON)
}

/// Radical inverse with a per-digit permutation applied, which decorrelates
/// the higher dimensions of the Halton sequence.
fn scrambled_radical_inverse(base: u32, mut a: u64, perm: &[u16]) -> f32 {
    let inv_base = 1.0 / base as f64;
    let mut reversed: u64 = 0;
    let mut inv_base_n = 1.0f64;
    while a != 0 {
        let next = a / base as u64;
        let digit = (a - next * base as u64) as usize;
        reversed = reversed * base as u64 + u64::from(perm[digit]);
        inv_base_n *= inv_base;
        a = next;
    }
    // Account for the infinite tail of permuted zero digits
    let tail = f64::from(perm[0]) * inv_base / (1.0 - inv_base);
    (((reversed as f64 + tail) * inv_base_n) as f32).min(ONE_MINUS_EPSILON)
}

/// Randomized Halton sampler: one low-discrepancy point stream per pixel
/// sample, scrambled with digit permutations drawn from the seed.
#[derive(Clone)]
pub struct HaltonSampler {
    spp: usize,
    // Digit permutations, one per dimension
    permutations: Vec<Vec<u16>>,
    rng: Rng,
    pixel_seed: u64,
    sample_index: u64,
    current_sample: usize,
    dimension: usize,
    array_1d: Vec<Vec<f32>>,
    array_2d: Vec<Vec<Point2f>>,
    array_1d_sizes: Vec<usize>,
    array_2d_sizes: Vec<usize>,
    array_1d_offset: usize,
    array_2d_offset: usize,
}

impl HaltonSampler {
    pub fn new(spp: usize, seed: u64) -> HaltonSampler {
        let mut rng = Rng::with_sequence(seed.wrapping_mul(0x9e3779b97f4a7c15).wrapping_add(1));
        let permutations = PRIMES
            .iter()
            .map(|&p| {
                let mut perm: Vec<u16> = (0..p as u16).collect();
                // Fisher-Yates with the sampler's own rng
                for i in (1..perm.len()).rev() {
                    let j = rng.uniform_u32_bounded(i as u32 + 1) as usize;
                    perm.swap(i, j);
                }
                perm
            })
            .collect();
        HaltonSampler {
            spp,
            permutations,
            rng,
            pixel_seed: 0,
            sample_index: 0,
            current_sample: 0,
            dimension: 0,
            array_1d: Vec::new(),
            array_2d: Vec::new(),
            array_1d_sizes: Vec::new(),
            array_2d_sizes: Vec::new(),
            array_1d_offset: 0,
            array_2d_offset: 0,
        }
    }

    fn sample_dimension(&mut self, dim: usize) -> f32 {
        if dim >= PRIMES.len() {
            // Ran out of precomputed primes; fall back to uniform noise
            return self.rng.uniform_f32();
        }
        scrambled_radical_inverse(
            PRIMES[dim],
            self.sample_index,
            &self.permutations[dim],
        )
    }

    fn next_dimension(&mut self) -> f32 {
        let d = self.dimension;
        self.dimension += 1;
        self.sample_dimension(d)
    }

    fn regenerate_arrays(&mut self) {
        let spp = self.spp;
        let rng = &mut self.rng;
        self.array_1d.clear();
        self.array_2d.clear();
        for &n in &self.array_1d_sizes {
            let v: Vec<f32> = (0..n * spp).map(|_| rng.uniform_f32()).collect();
            self.array_1d.push(v);
        }
        for &n in &self.array_2d_sizes {
            let v: Vec<Point2f> = (0..n * spp)
                .map(|_| {
                    let x = rng.uniform_f32();
                    let y = rng.uniform_f32();
                    Point2f::new(x, y)
                })
                .collect();
            self.array_2d.push(v);
        }
    }
}

impl Sampler for HaltonSampler {
    fn start_pixel(&mut self, p: Point2i) {
        // Each pixel gets its own slice of the global Halton stream. The
        // index is kept below 2^47 so the digit reversal cannot overflow.
        self.pixel_seed = ((p.y as u64).wrapping_mul(0x1fffffffffffffff)
            ^ ((p.x as u64) << 20)
            ^ 0x5bd1e995)
            & 0x3fff_ffff;
        self.sample_index = self.pixel_seed.wrapping_mul(self.spp as u64);
        self.current_sample = 0;
        self.dimension = 0;
        self.array_1d_offset = 0;
        self.array_2d_offset = 0;
        self.regenerate_arrays();
    }

    fn get_1d(&mut self) -> f32 {
        self.next_dimension()
    }

    fn get_2d(&mut self) -> Point2f {
        let x = self.next_dimension();
        let y = self.next_dimension();
        Point2f::new(x, y)
    }

    fn request_1d_array(&mut self, n: usize) {
        self.array_1d_sizes.push(n);
    }

    fn request_2d_array(&mut self, n: usize) {
        self.array_2d_sizes.push(n);
    }

    fn get_1d_array(&mut self, n: usize) -> Option<&[f32]> {
        if self.array_1d_offset == self.array_1d.len() {
            return None;
        }
        let start = self.current_sample * n;
        let idx = self.array_1d_offset;
        self.array_1d_offset += 1;
        Some(&self.array_1d[idx][start..start + n])
    }

    fn get_2d_array(&mut self, n: usize) -> Option<&[Point2f]> {
        if self.array_2d_offset == self.array_2d.len() {
            return None;
        }
        let start = self.current_sample * n;
        let idx = self.array_2d_offset;
        self.array_2d_offset += 1;
        Some(&self.array_2d[idx][start..start + n])
    }

    fn start_next_sample(&mut self) -> bool {
        self.current_sample += 1;
        self.sample_index = self.sample_index.wrapping_add(1);
        self.dimension = 0;
        self.array_1d_offset = 0;
        self.array_2d_offset = 0;
        self.current_sample < self.spp
    }

    fn set_sample_number(&mut self, n: usize) -> bool {
        self.current_sample = n;
        self.sample_index = self
            .pixel_seed
            .wrapping_mul(self.spp as u64)
            .wrapping_add(n as u64);
        self.dimension = 0;
        self.array_1d_offset = 0;
        self.array_2d_offset = 0;
        self.current_sample < self.spp
    }

    fn reseed(&mut self, seed: u64) {
        self.rng.set_sequence(seed);
    }

    fn samples_per_pixel(&self) -> usize {
        self.spp
    }

    fn current_sample_number(&self) -> usize {
        self.current_sample
    }

    fn box_clone(&self) -> Box<dyn Sampler> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radical_inverse_base2() {
        assert_eq!(radical_inverse(2, 0), 0.0);
        assert_eq!(radical_inverse(2, 1), 0.5);
        assert_eq!(radical_inverse(2, 2), 0.25);
        assert_eq!(radical_inverse(2, 3), 0.75);
    }

    #[test]
    fn test_values_in_unit_interval() {
        let mut s = HaltonSampler::new(4, 7);
        s.start_pixel(Point2i::new(5, 9));
        for _ in 0..200 {
            let u = s.get_1d();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn test_first_dimension_stratified() {
        // The first Halton dimension is base 2: with the identity or any
        // permutation, 2^k consecutive samples are perfectly stratified in
        // 2^k bins.
        let mut s = HaltonSampler::new(16, 3);
        s.start_pixel(Point2i::new(0, 0));
        let mut bins = [0u32; 16];
        loop {
            let u = s.get_1d();
            bins[(u * 16.0) as usize] += 1;
            if !s.start_next_sample() {
                break;
            }
        }
        for &b in &bins {
            assert!(b <= 2, "bins = {:?}", bins);
        }
    }
}
