use bumpalo::Bump;
use log::info;

use crate::bsdf::BxDFType;
use crate::integrator::photon_map::PhotonMap;
use crate::integrator::{
    russian_roulette, uniform_sample_one_light, SamplerIntegrator, ScatterSite,
};
use crate::material::TransportMode;
use crate::ray::Ray;
use crate::sampler::{RandomSampler, Sampler};
use crate::scene::Scene;
use crate::spectrum::Spectrum;

/// Progressive photon mapping, probabilistic flavor: every pass rebuilds the
/// photon map from scratch and the gather radius shrinks on a fixed
/// schedule, so the estimate converges in expectation.
pub struct PpmIntegrator {
    max_depth: u32,
    n_photons_per_pass: usize,
    gather_photons: usize,
    alpha: f32,
    photon_map: PhotonMap,
    global_radius: f32,
}

impl PpmIntegrator {
    pub fn new(max_depth: u32, n_photons_per_pass: usize, gather_photons: usize) -> PpmIntegrator {
        PpmIntegrator {
            max_depth,
            n_photons_per_pass,
            gather_photons,
            alpha: 0.7,
            photon_map: PhotonMap::empty(),
            global_radius: 1.0,
        }
    }

    pub fn radius(&self) -> f32 {
        self.global_radius
    }
}

impl SamplerIntegrator for PpmIntegrator {
    fn preprocess(&mut self, scene: &Scene, _sampler: &mut dyn Sampler) {
        // Start from half the scene diameter, like the original renderer
        let bounds = scene.world_bounds();
        self.global_radius = bounds.diagonal().length() * 0.5;
        info!("PPM initial gather radius {}", self.global_radius);
    }

    fn pass_started(&mut self, scene: &Scene, pass: usize) {
        // Fresh photon population per pass; the pass index seeds the
        // sampler so no two passes reuse paths
        let mut sampler = RandomSampler::new(1, 0x9e37 ^ (pass as u64));
        sampler.start_pixel(crate::Point2i::new(0, 0));
        self.photon_map =
            PhotonMap::construct(scene, &mut sampler, self.n_photons_per_pass, self.max_depth);
    }

    fn pass_finished(&mut self, _scene: &Scene, pass: usize) {
        let i = pass as f32;
        self.global_radius *= ((i + self.alpha) / (i + 1.0)).sqrt();
        info!(
            "PPM pass {} done, radius now {}",
            pass, self.global_radius
        );
    }

    fn li(
        &self,
        scene: &Scene,
        ray: Ray,
        sampler: &mut dyn Sampler,
        arena: &Bump,
        _depth: u32,
    ) -> Spectrum {
        let mut l = Spectrum::black();
        let mut beta = Spectrum::white();
        let mut ray = ray;
        let mut specular_bounce = true;
        let mut bounces = 0u32;

        loop {
            let mut found = scene.intersect(&mut ray);
            if specular_bounce {
                match found {
                    Some(ref isect) => l += beta * isect.le(&-ray.d),
                    None => {
                        for light in &scene.infinite_lights {
                            l += beta * light.le(&ray);
                        }
                    }
                }
            }
            if found.is_none() || bounces >= self.max_depth {
                break;
            }
            let isect = found.as_mut().unwrap();
            isect.compute_scattering_functions(TransportMode::Radiance, arena);
            if isect.bsdf.is_none() {
                ray = isect.spawn_ray(&ray.d);
                continue;
            }
            let bsdf = isect.bsdf.unwrap();

            if bsdf.num_components(BxDFType::all() & !BxDFType::BSDF_SPECULAR) > 0 {
                // Diffuse-ish vertex: direct light by NEE, indirect from the
                // photon density estimate; the walk ends here
                l += beta
                    * uniform_sample_one_light(
                        &ScatterSite::Surface(isect),
                        scene,
                        sampler,
                        false,
                    );
                l += beta
                    * self.photon_map.radiance_estimate(
                        isect,
                        self.gather_photons,
                        self.global_radius,
                    );
                break;
            }

            // Specular chain: keep following until a gatherable surface
            let wo = -ray.d;
            let (f, wi, pdf, flags) = bsdf.sample_f(&wo, sampler.get_2d(), BxDFType::all());
            if f.is_black() || pdf == 0.0 {
                break;
            }
            beta *= f * wi.dotn(&isect.shading.n).abs() / pdf;
            specular_bounce = flags.contains(BxDFType::BSDF_SPECULAR);
            ray = isect.spawn_ray(&wi);

            match russian_roulette(&beta, bounces, sampler.get_1d()) {
                Some(scale) => beta *= scale,
                None => break,
            }
            bounces += 1;
        }

        l
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_schedule() {
        // r_i = r_0 * prod_{j<i} sqrt((j + a)/(j + 1))
        let scene = crate::scenes::cornell_box();
        let mut ppm = PpmIntegrator::new(4, 10, 4);
        ppm.global_radius = 0.5;
        let r0 = ppm.global_radius;
        let alpha = ppm.alpha;
        let mut expected = r0;
        for pass in 0..8 {
            ppm.pass_finished(&scene, pass);
            expected *= ((pass as f32 + alpha) / (pass as f32 + 1.0)).sqrt();
            assert!((ppm.radius() - expected).abs() < 1e-6);
        }
        // Monotonically decreasing
        assert!(ppm.radius() < r0);
    }
}
