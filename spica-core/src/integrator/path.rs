use bumpalo::Bump;
use log::debug;

use crate::bsdf::BxDFType;
use crate::integrator::{
    russian_roulette, uniform_sample_one_light, SamplerIntegrator, ScatterSite,
};
use crate::interaction::MediumInteraction;
use crate::material::TransportMode;
use crate::ray::Ray;
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::spectrum::Spectrum;

/// Unidirectional path tracer with next event estimation and MIS, handling
/// surface scattering and participating media in the same loop.
pub struct PathIntegrator {
    max_depth: u32,
    rr_threshold: f32,
    /// Whether media and BSSRDFs participate; plain "path" mode skips both.
    volumetric: bool,
}

impl PathIntegrator {
    pub fn new(max_depth: u32) -> PathIntegrator {
        PathIntegrator {
            max_depth,
            rr_threshold: 1.0,
            volumetric: false,
        }
    }

    /// Volumetric variant: free-flight sampling in media plus subsurface
    /// scattering via the attached BSSRDFs.
    pub fn volumetric(max_depth: u32) -> PathIntegrator {
        PathIntegrator {
            max_depth,
            rr_threshold: 1.0,
            volumetric: true,
        }
    }
}

impl SamplerIntegrator for PathIntegrator {
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
        let mut specular_bounce = false;
        let mut ray = ray;
        let mut bounces = 0u32;
        // Track radiance scaling from refraction separately so Russian
        // roulette does not kill rays about to refract back out.
        let mut eta_scale = 1.0f32;

        loop {
            debug!("path bounce {}, beta = {}", bounces, beta);
            let mut found_intersection = scene.intersect(&mut ray);

            // Possibly scatter in the medium before reaching the surface
            let mut medium_interaction: Option<MediumInteraction> = None;
            if self.volumetric {
                if let Some(ref medium) = ray.medium {
                    let (weight, ms) = medium.sample(&ray, sampler);
                    beta *= weight;
                    if let Some(ms) = ms {
                        medium_interaction =
                            Some(MediumInteraction::new(&ms, ray.medium.clone()));
                    }
                }
            }
            if beta.is_black() {
                break;
            }

            if let Some(mi) = medium_interaction {
                // Volume vertex: NEE plus phase-function sampling
                if bounces >= self.max_depth {
                    break;
                }
                l += beta
                    * uniform_sample_one_light(
                        &ScatterSite::Medium(&mi),
                        scene,
                        sampler,
                        true,
                    );

                let (wi, _p) = mi.phase.sample_p(&mi.wo, sampler.get_2d());
                ray = mi.spawn_ray(&wi);
                specular_bounce = false;
            } else {
                // Surface vertex (or escaped ray)
                if bounces == 0 || specular_bounce {
                    // Emission is only collected here when NEE could not
                    // have found it
                    match found_intersection {
                        Some(ref isect) => l += beta * isect.le(&-ray.d),
                        None => {
                            for light in &scene.infinite_lights {
                                l += beta * light.le(&ray);
                            }
                        }
                    }
                }

                if found_intersection.is_none() || bounces >= self.max_depth {
                    break;
                }

                let isect = found_intersection.as_mut().unwrap();
                isect.compute_scattering_functions(TransportMode::Radiance, arena);
                if isect.bsdf.is_none() {
                    // Interface between media only; pass through
                    ray = isect.spawn_ray(&ray.d);
                    continue;
                }
                let bsdf = isect.bsdf.unwrap();

                // Next event estimation
                if bsdf.num_components(BxDFType::all() & !BxDFType::BSDF_SPECULAR) > 0 {
                    let ld = beta
                        * uniform_sample_one_light(
                            &ScatterSite::Surface(isect),
                            scene,
                            sampler,
                            self.volumetric,
                        );
                    debug_assert!(ld.y() >= 0.0);
                    l += ld;
                }

                // Sample the BSDF for the next direction
                let wo = -ray.d;
                let (f, wi, pdf, flags) = bsdf.sample_f(&wo, sampler.get_2d(), BxDFType::all());
                if f.is_black() || pdf == 0.0 {
                    break;
                }
                beta *= f * wi.dotn(&isect.shading.n).abs() / pdf;
                debug_assert!(beta.y() >= 0.0);
                specular_bounce = flags.contains(BxDFType::BSDF_SPECULAR);
                if flags.contains(BxDFType::BSDF_SPECULAR)
                    && flags.contains(BxDFType::BSDF_TRANSMISSION)
                {
                    let eta = bsdf.eta;
                    eta_scale *= if wo.dotn(&isect.hit.n) > 0.0 {
                        eta * eta
                    } else {
                        1.0 / (eta * eta)
                    };
                }
                ray = isect.spawn_ray(&wi);

                // Subsurface scattering: dive below the surface and come
                // back out somewhere else
                if self.volumetric && flags.contains(BxDFType::BSDF_TRANSMISSION) {
                    if let Some(bssrdf) = isect.bssrdf {
                        if let Some((sp, pi, pdf_sp)) =
                            bssrdf.sample_s(scene, sampler.get_1d(), sampler.get_2d(), arena)
                        {
                            if pdf_sp > 0.0 && !sp.is_black() {
                                beta *= sp / pdf_sp;

                                // Direct lighting at the exit point
                                l += beta
                                    * uniform_sample_one_light(
                                        &ScatterSite::Surface(&pi),
                                        scene,
                                        sampler,
                                        false,
                                    );

                                // Continue the path from the exit point
                                let exit_bsdf = pi.bsdf.unwrap();
                                let (f, wi, pdf, _fl) = exit_bsdf.sample_f(
                                    &pi.hit.wo,
                                    sampler.get_2d(),
                                    BxDFType::all(),
                                );
                                if f.is_black() || pdf == 0.0 {
                                    break;
                                }
                                beta *= f * wi.dotn(&pi.shading.n).abs() / pdf;
                                specular_bounce = false;
                                ray = pi.spawn_ray(&wi);
                            } else {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                }
            }

            // Russian roulette on the refraction-compensated throughput
            let rr_beta = beta * eta_scale;
            if rr_beta.max_component_value() < self.rr_threshold {
                match russian_roulette(&rr_beta, bounces, sampler.get_1d()) {
                    Some(scale) => beta *= scale,
                    None => break,
                }
            }
            bounces += 1;
        }

        l
    }
}
