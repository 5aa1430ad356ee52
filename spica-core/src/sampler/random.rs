use super::Sampler;
use crate::rng::Rng;
use crate::{Point2f, Point2i};

/// Uniform pseudo-random sampler backed by PCG32.
#[derive(Clone)]
pub struct RandomSampler {
    spp: usize,
    rng: Rng,
    current_sample: usize,
    // Pre-generated sample arrays for the current pixel
    array_1d: Vec<Vec<f32>>,
    array_2d: Vec<Vec<Point2f>>,
    array_1d_sizes: Vec<usize>,
    array_2d_sizes: Vec<usize>,
    array_1d_offset: usize,
    array_2d_offset: usize,
}

impl RandomSampler {
    pub fn new(spp: usize, seed: u64) -> RandomSampler {
        RandomSampler {
            spp,
            rng: Rng::with_sequence(seed),
            current_sample: 0,
            array_1d: Vec::new(),
            array_2d: Vec::new(),
            array_1d_sizes: Vec::new(),
            array_2d_sizes: Vec::new(),
            array_1d_offset: 0,
            array_2d_offset: 0,
        }
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

impl Sampler for RandomSampler {
    fn start_pixel(&mut self, _p: Point2i) {
        self.current_sample = 0;
        self.array_1d_offset = 0;
        self.array_2d_offset = 0;
        self.regenerate_arrays();
    }

    fn get_1d(&mut self) -> f32 {
        self.rng.uniform_f32()
    }

    fn get_2d(&mut self) -> Point2f {
        // Evaluation order of struct fields is defined, but be explicit
        let x = self.rng.uniform_f32();
        let y = self.rng.uniform_f32();
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
        debug_assert_eq!(self.array_1d_sizes[self.array_1d_offset], n);
        let start = self.current_sample * n;
        let idx = self.array_1d_offset;
        self.array_1d_offset += 1;
        Some(&self.array_1d[idx][start..start + n])
    }

    fn get_2d_array(&mut self, n: usize) -> Option<&[Point2f]> {
        if self.array_2d_offset == self.array_2d.len() {
            return None;
        }
        debug_assert_eq!(self.array_2d_sizes[self.array_2d_offset], n);
        let start = self.current_sample * n;
        let idx = self.array_2d_offset;
        self.array_2d_offset += 1;
        Some(&self.array_2d[idx][start..start + n])
    }

    fn start_next_sample(&mut self) -> bool {
        self.current_sample += 1;
        self.array_1d_offset = 0;
        self.array_2d_offset = 0;
        self.current_sample < self.spp
    }

    fn set_sample_number(&mut self, n: usize) -> bool {
        self.current_sample = n;
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
    fn test_reseed_reproducible() {
        let mut a = RandomSampler::new(4, 1);
        let mut b = RandomSampler::new(4, 2);
        a.reseed(99);
        b.reseed(99);
        a.start_pixel(Point2i::new(0, 0));
        b.start_pixel(Point2i::new(0, 0));
        for _ in 0..32 {
            assert_eq!(a.get_1d(), b.get_1d());
        }
    }

    #[test]
    fn test_arrays() {
        let mut s = RandomSampler::new(2, 0);
        s.request_2d_array(4);
        s.start_pixel(Point2i::new(3, 7));
        let arr = s.get_2d_array(4).expect("array requested");
        assert_eq!(arr.len(), 4);
        assert!(s.get_2d_array(4).is_none());
        assert!(s.start_next_sample());
        assert!(s.get_2d_array(4).is_some());
        assert!(!s.start_next_sample());
    }
}
