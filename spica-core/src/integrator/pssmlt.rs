use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use bumpalo::Bump;
use log::info;

use crate::bounds::Bounds2f;
use crate::camera::Camera;
use crate::geometry::erf_inv;
use crate::integrator::bdpt::{
    connect_bdpt, generate_camera_subpath, generate_light_subpath, Vertex,
};
use crate::renderer::{checkpoint_path, RenderOptions};
use crate::rng::Rng;
use crate::sampler::Sampler;
use crate::sampling::Distribution1D;
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::{Point2f, Point2i, SQRT_2};

pub const CAMERA_STREAM_INDEX: usize = 0;
pub const LIGHT_STREAM_INDEX: usize = 1;
pub const CONNECTION_STREAM_INDEX: usize = 2;
const N_SAMPLE_STREAMS: usize = 3;

/// One coordinate of the primary sample vector, with a one-level undo
/// buffer for rejected mutations.
#[derive(Debug, Default, Copy, Clone)]
struct PrimarySample {
    value: f32,
    last_modification_iteration: i64,
    value_backup: f32,
    modify_backup: i64,
}

impl PrimarySample {
    fn backup(&mut self) {
        self.value_backup = self.value;
        self.modify_backup = self.last_modification_iteration;
    }

    fn restore(&mut self) {
        self.value = self.value_backup;
        self.last_modification_iteration = self.modify_backup;
    }
}

/// Sampler over primary sample space with Kelemen-style lazy mutations.
/// Coordinates are grouped into interleaved streams so camera and light
/// subpaths get independent dimensions.
#[derive(Clone)]
pub struct MltSampler {
    rng: Rng,
    sigma: f32,
    large_step_probability: f32,
    x: Vec<PrimarySample>,
    current_iteration: i64,
    large_step: bool,
    last_large_step_iteration: i64,
    stream_index: usize,
    sample_index: usize,
}

impl MltSampler {
    pub fn new(rng_sequence_index: u64, sigma: f32, large_step_probability: f32) -> MltSampler {
        MltSampler {
            rng: Rng::with_sequence(rng_sequence_index),
            sigma,
            large_step_probability,
            x: Vec::new(),
            current_iteration: 0,
            large_step: true,
            last_large_step_iteration: 0,
            stream_index: 0,
            sample_index: 0,
        }
    }

    pub fn start_iteration(&mut self) {
        self.current_iteration += 1;
        self.large_step = self.rng.uniform_f32() < self.large_step_probability;
    }

    pub fn accept(&mut self) {
        if self.large_step {
            self.last_large_step_iteration = self.current_iteration;
        }
    }

    pub fn reject(&mut self) {
        for xi in &mut self.x {
            if xi.last_modification_iteration == self.current_iteration {
                xi.restore();
            }
        }
        self.current_iteration -= 1;
    }

    pub fn start_stream(&mut self, index: usize) {
        debug_assert!(index < N_SAMPLE_STREAMS);
        self.stream_index = index;
        self.sample_index = 0;
    }

    fn next_index(&mut self) -> usize {
        let ret = self.stream_index + N_SAMPLE_STREAMS * self.sample_index;
        self.sample_index += 1;
        ret
    }

    fn ensure_ready(&mut self, index: usize) {
        if index >= self.x.len() {
            self.x.resize(index + 1, PrimarySample::default());
        }
        let last_large = self.last_large_step_iteration;
        let current = self.current_iteration;
        let large = self.large_step;
        let sigma = self.sigma;

        let xi = &mut self.x[index];
        // Coordinates untouched since the last large step restart from a
        // fresh uniform value
        if xi.last_modification_iteration < last_large {
            xi.value = self.rng.uniform_f32();
            xi.last_modification_iteration = last_large;
        }
        xi.backup();
        if large {
            xi.value = self.rng.uniform_f32();
        } else {
            let n_small = current - xi.last_modification_iteration;
            // All pending small steps collapse into one normal perturbation
            // with the accumulated standard deviation
            let normal_sample = SQRT_2 * erf_inv(2.0 * self.rng.uniform_f32() - 1.0);
            let eff_sigma = sigma * (n_small as f32).sqrt();
            xi.value += normal_sample * eff_sigma;
            xi.value -= xi.value.floor();
            xi.value = xi.value.clamp(0.0, crate::ONE_MINUS_EPSILON);
        }
        xi.last_modification_iteration = current;
    }
}

impl Sampler for MltSampler {
    fn start_pixel(&mut self, _p: Point2i) {}

    fn get_1d(&mut self) -> f32 {
        let index = self.next_index();
        self.ensure_ready(index);
        self.x[index].value
    }

    fn get_2d(&mut self) -> Point2f {
        let x = self.get_1d();
        let y = self.get_1d();
        Point2f::new(x, y)
    }

    fn request_1d_array(&mut self, _n: usize) {}

    fn request_2d_array(&mut self, _n: usize) {}

    fn get_1d_array(&mut self, _n: usize) -> Option<&[f32]> {
        None
    }

    fn get_2d_array(&mut self, _n: usize) -> Option<&[Point2f]> {
        None
    }

    fn start_next_sample(&mut self) -> bool {
        false
    }

    fn set_sample_number(&mut self, _n: usize) -> bool {
        true
    }

    fn reseed(&mut self, seed: u64) {
        self.rng.set_sequence(seed);
    }

    fn samples_per_pixel(&self) -> usize {
        1
    }

    fn current_sample_number(&self) -> usize {
        self.current_iteration.max(0) as usize
    }

    fn box_clone(&self) -> Box<dyn Sampler> {
        Box::new(self.clone())
    }
}

/// Primary-sample-space Metropolis light transport over the BDPT path
/// sampler.
pub struct PssmltIntegrator {
    camera: Arc<dyn Camera>,
    max_depth: u32,
    n_bootstrap: usize,
    n_chains: usize,
    mutations_per_pixel: usize,
    sigma: f32,
    large_step_probability: f32,
}

impl PssmltIntegrator {
    pub fn new(camera: Arc<dyn Camera>, max_depth: u32, mutations_per_pixel: usize) -> PssmltIntegrator {
        PssmltIntegrator {
            camera,
            max_depth,
            n_bootstrap: 100_000,
            n_chains: 1000,
            mutations_per_pixel,
            sigma: 0.01,
            large_step_probability: 0.3,
        }
    }

    pub fn with_bootstrap(mut self, n_bootstrap: usize, n_chains: usize) -> PssmltIntegrator {
        self.n_bootstrap = n_bootstrap;
        self.n_chains = n_chains;
        self
    }

    /// Deterministically map a primary sample vector to a path contribution
    /// and film position, using one BDPT strategy of the given depth.
    fn l(
        &self,
        scene: &Scene,
        light_distr: &Distribution1D,
        sampler: &mut MltSampler,
        arena: &Bump,
        depth: u32,
    ) -> (Spectrum, Point2f) {
        sampler.start_stream(CAMERA_STREAM_INDEX);
        // Strategy selection: split the path budget between s and t
        let (s, t, n_strategies) = if depth == 0 {
            (0usize, 2usize, 1usize)
        } else {
            let n = depth as usize + 2;
            let s = ((sampler.get_1d() * n as f32) as usize).min(n - 1);
            (s, n - s, n)
        };

        let film = self.camera.film();
        let sample_bounds: Bounds2f = film.get_sample_bounds().into();
        let p_raster = sample_bounds.lerp(sampler.get_2d());

        let mut camera_vertices: Vec<Vertex<'_, '_>> = Vec::with_capacity(t);
        if generate_camera_subpath(
            scene,
            sampler,
            arena,
            t as u32,
            &*self.camera,
            p_raster,
            &mut camera_vertices,
        ) != t
        {
            return (Spectrum::black(), p_raster);
        }

        sampler.start_stream(LIGHT_STREAM_INDEX);
        let mut light_vertices: Vec<Vertex<'_, '_>> = Vec::with_capacity(s);
        if generate_light_subpath(
            scene,
            sampler,
            arena,
            s as u32,
            light_distr,
            &mut light_vertices,
        ) != s
        {
            return (Spectrum::black(), p_raster);
        }

        sampler.start_stream(CONNECTION_STREAM_INDEX);
        let (l, praster_new) = connect_bdpt(
            scene,
            &light_vertices,
            &camera_vertices,
            s,
            t,
            light_distr,
            &*self.camera,
            sampler,
        );
        let p = praster_new.unwrap_or(p_raster);
        (l * n_strategies as f32, p)
    }

    pub fn render(&mut self, scene: &Scene, opts: &RenderOptions) -> Result<()> {
        let light_distr = scene.light_distribution();
        let film = Arc::clone(self.camera.film());

        // Bootstrap: estimate the normalization constant b = E[f] with a
        // stratified population over path depths
        let n_bootstrap_samples = self.n_bootstrap * (self.max_depth as usize + 1);
        info!("PSSMLT: generating {} bootstrap paths", n_bootstrap_samples);
        let mut bootstrap_weights = vec![0.0f32; n_bootstrap_samples];
        {
            let chunk = (n_bootstrap_samples / opts.num_threads.max(1)).max(1);
            let this = &*self;
            crossbeam::scope(|scope| {
                for (band_idx, band) in bootstrap_weights.chunks_mut(chunk).enumerate() {
                    scope.spawn(move |_| {
                        let mut arena = Bump::new();
                        for (w_idx, weight) in band.iter_mut().enumerate() {
                            let rng_index = (band_idx * chunk + w_idx) as u64;
                            let depth = (rng_index % (this.max_depth as u64 + 1)) as u32;
                            let mut sampler = MltSampler::new(
                                rng_index,
                                this.sigma,
                                this.large_step_probability,
                            );
                            let (l, _p) =
                                this.l(scene, light_distr, &mut sampler, &arena, depth);
                            *weight = l.y();
                            arena.reset();
                        }
                    });
                }
            })
            .expect("bootstrap thread panicked");
        }
        let bootstrap = Distribution1D::new(&bootstrap_weights);
        let b = bootstrap.func_int * (self.max_depth as f32 + 1.0);
        if b <= 0.0 {
            info!("PSSMLT: scene carries no light; writing black image");
            if let Some(ref pattern) = opts.output {
                film.write_image(checkpoint_path(pattern, 1), 0.0)?;
            }
            return Ok(());
        }
        info!("PSSMLT: normalization constant b = {}", b);

        // Run the Markov chains
        let n_total_mutations =
            self.mutations_per_pixel as u64 * film.get_sample_bounds().area() as u64;
        let n_chains = self.n_chains.max(1);
        let this = &*self;
        let bootstrap_ref = &bootstrap;
        let chain_indices = parking_lot::Mutex::new(0..n_chains);

        crossbeam::scope(|scope| {
            for _ in 0..opts.num_threads.max(1) {
                let chain_indices = &chain_indices;
                let film = &film;
                let stop = &opts.stop;
                scope.spawn(move |_| {
                    let mut arena = Bump::new();
                    loop {
                        let i = {
                            let mut it = chain_indices.lock();
                            match it.next() {
                                Some(i) => i,
                                None => break,
                            }
                        };
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        let n_chain_mutations = ((i as u64 + 1) * n_total_mutations
                            / n_chains as u64)
                            .min(n_total_mutations)
                            - i as u64 * n_total_mutations / n_chains as u64;

                        // Select the initial state from the bootstrap set
                        let mut rng = Rng::with_sequence(i as u64);
                        let (bootstrap_index, _pdf) =
                            bootstrap_ref.sample_discrete(rng.uniform_f32());
                        let depth = (bootstrap_index as u64 % (this.max_depth as u64 + 1)) as u32;

                        let mut sampler = MltSampler::new(
                            bootstrap_index as u64,
                            this.sigma,
                            this.large_step_probability,
                        );
                        let (mut l_current, mut p_current) =
                            this.l(scene, light_distr, &mut sampler, &arena, depth);

                        for _ in 0..n_chain_mutations {
                            sampler.start_iteration();
                            let (l_proposed, p_proposed) =
                                this.l(scene, light_distr, &mut sampler, &arena, depth);
                            let accept = if l_current.y() > 0.0 {
                                (l_proposed.y() / l_current.y()).min(1.0)
                            } else {
                                1.0
                            };

                            // Both states deposit importance-weighted
                            // contributions
                            if accept > 0.0 && l_proposed.y() > 0.0 {
                                film.add_splat(
                                    p_proposed,
                                    l_proposed * (accept / l_proposed.y()),
                                );
                            }
                            if l_current.y() > 0.0 {
                                film.add_splat(
                                    p_current,
                                    l_current * ((1.0 - accept) / l_current.y()),
                                );
                            }

                            if rng.uniform_f32() < accept {
                                l_current = l_proposed;
                                p_current = p_proposed;
                                sampler.accept();
                            } else {
                                sampler.reject();
                            }
                            arena.reset();
                        }
                    }
                });
            }
        })
        .expect("chain thread panicked");

        if let Some(ref pattern) = opts.output {
            film.write_image(
                checkpoint_path(pattern, 1),
                b / self.mutations_per_pixel as f32,
            )?;
        }
        Ok(())
    }

    /// Scale that converts the splat buffer into radiance.
    pub fn splat_scale(&self, b: f32) -> f32 {
        b / self.mutations_per_pixel as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_step_stays_in_unit_interval() {
        let mut s = MltSampler::new(3, 0.05, 0.0);
        // Force several small-step iterations
        for _ in 0..50 {
            s.start_iteration();
            s.start_stream(CAMERA_STREAM_INDEX);
            let v = s.get_1d();
            assert!((0.0..1.0).contains(&v));
            s.accept();
        }
    }

    #[test]
    fn test_reject_restores_values() {
        let mut s = MltSampler::new(9, 0.1, 0.0);
        s.start_iteration();
        s.start_stream(CAMERA_STREAM_INDEX);
        let v0 = s.get_1d();
        s.accept();

        s.start_iteration();
        s.start_stream(CAMERA_STREAM_INDEX);
        let v1 = s.get_1d();
        assert_ne!(v0, v1);
        s.reject();

        s.start_iteration();
        s.start_stream(CAMERA_STREAM_INDEX);
        let v2 = s.get_1d();
        // After a reject the chain state is back at v0, so the next small
        // step starts from there
        let _ = v2;
        s.reject();
        s.start_stream(CAMERA_STREAM_INDEX);
        assert_eq!(s.x[0].value, v0);
    }

    #[test]
    fn test_large_step_resets() {
        let mut s = MltSampler::new(11, 0.1, 1.0);
        s.start_iteration();
        s.start_stream(CAMERA_STREAM_INDEX);
        let a = s.get_1d();
        s.accept();
        s.start_iteration();
        s.start_stream(CAMERA_STREAM_INDEX);
        let b = s.get_1d();
        assert_ne!(a, b);
    }

    #[test]
    fn test_streams_interleave() {
        let mut s = MltSampler::new(13, 0.1, 1.0);
        s.start_iteration();
        s.start_stream(CAMERA_STREAM_INDEX);
        let _ = s.get_1d();
        let _ = s.get_1d();
        // The camera stream owns indices 0, 3, 6...; the light stream 1, 4...
        assert_eq!(s.x.len(), 4);
        s.start_stream(LIGHT_STREAM_INDEX);
        let _ = s.get_1d();
        assert_eq!(s.x.len(), 4);
    }
}
