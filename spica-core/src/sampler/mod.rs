use crate::{Point2f, Point2i};

mod halton;
mod random;

pub use self::halton::HaltonSampler;
pub use self::random::RandomSampler;

/// Camera sample: film position plus lens position for depth of field.
#[derive(Debug, Copy, Clone, Default)]
pub struct CameraSample {
    pub p_film: Point2f,
    pub p_lens: Point2f,
}

/// Lazy stream of sample values in [0, 1). One sampler instance belongs to
/// one worker thread; workers clone the prototype and reseed per tile so the
/// render is reproducible under any scheduling.
pub trait Sampler: Send + Sync {
    fn start_pixel(&mut self, p: Point2i);

    fn get_1d(&mut self) -> f32;

    fn get_2d(&mut self) -> Point2f;

    fn get_camera_sample(&mut self, p_raster: Point2i) -> CameraSample {
        let jitter = self.get_2d();
        let p_film = Point2f::new(p_raster.x as f32 + jitter.x, p_raster.y as f32 + jitter.y);
        CameraSample {
            p_film,
            p_lens: self.get_2d(),
        }
    }

    /// Pre-request an array of n 1D samples for the current pixel.
    fn request_1d_array(&mut self, n: usize);

    fn request_2d_array(&mut self, n: usize);

    fn round_count(&self, count: usize) -> usize {
        count
    }

    fn get_1d_array(&mut self, n: usize) -> Option<&[f32]>;

    fn get_2d_array(&mut self, n: usize) -> Option<&[Point2f]>;

    /// Advance to the next sample of the current pixel. Returns false when
    /// the per-pixel sample budget is exhausted.
    fn start_next_sample(&mut self) -> bool;

    /// Jump directly to the given sample index of the current pixel, so a
    /// pass-based scheduler can render one sample per pass.
    fn set_sample_number(&mut self, n: usize) -> bool;

    fn reseed(&mut self, seed: u64);

    fn samples_per_pixel(&self) -> usize;

    fn current_sample_number(&self) -> usize;

    fn box_clone(&self) -> Box<dyn Sampler>;
}

impl Clone for Box<dyn Sampler> {
    fn clone(&self) -> Box<dyn Sampler> {
        self.box_clone()
    }
}
