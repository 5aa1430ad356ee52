pub mod bdpt;
mod hashgrid;
pub mod hierarchical;
mod kdtree;
mod path;
mod photon_map;
mod ppm;
mod pssmlt;
mod sppm;

pub use self::bdpt::BdptIntegrator;
pub use self::hashgrid::HashGrid;
pub use self::hierarchical::{HierarchicalIntegrator, SubsurfaceObject};
pub use self::kdtree::{KdItem, KdTree};
pub use self::path::PathIntegrator;
pub use self::photon_map::{Photon, PhotonMap};
pub use self::ppm::PpmIntegrator;
pub use self::pssmlt::{MltSampler, PssmltIntegrator};
pub use self::sppm::SppmIntegrator;

use bumpalo::Bump;

use crate::bsdf::BxDFType;
use crate::interaction::{MediumInteraction, SurfaceInteraction};
use crate::light::{is_delta_light, Light};
use crate::ray::Ray;
use crate::sampler::Sampler;
use crate::sampling::power_heuristic;
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::Point2f;

/// Integrators whose estimate is a pure function of one camera ray; they are
/// driven by the tile renderer in `renderer`.
pub trait SamplerIntegrator: Send + Sync {
    fn preprocess(&mut self, _scene: &Scene, _sampler: &mut dyn Sampler) {}

    /// Called before each sample pass, with exclusive access.
    fn pass_started(&mut self, _scene: &Scene, _pass: usize) {}

    /// Called after each sample pass completes (before the checkpoint is
    /// written).
    fn pass_finished(&mut self, _scene: &Scene, _pass: usize) {}

    fn li(
        &self,
        scene: &Scene,
        ray: Ray,
        sampler: &mut dyn Sampler,
        arena: &Bump,
        depth: u32,
    ) -> Spectrum;
}

/// Path vertex where direct lighting is being estimated: either on a surface
/// or inside a medium.
pub enum ScatterSite<'v, 'p, 'a> {
    Surface(&'v SurfaceInteraction<'p, 'a>),
    Medium(&'v MediumInteraction),
}

impl<'v, 'p, 'a> ScatterSite<'v, 'p, 'a> {
    fn base(&self) -> crate::interaction::Interaction {
        match self {
            ScatterSite::Surface(si) => si.hit,
            ScatterSite::Medium(mi) => mi.as_interaction(),
        }
    }
}

/// Next event estimation: pick one light from the scene's power
/// distribution and estimate its direct contribution with MIS.
pub fn uniform_sample_one_light(
    site: &ScatterSite<'_, '_, '_>,
    scene: &Scene,
    sampler: &mut dyn Sampler,
    handle_media: bool,
) -> Spectrum {
    if scene.lights.is_empty() {
        return Spectrum::black();
    }
    let (light_num, light_pdf) = scene.sample_light(sampler.get_1d());
    if light_pdf == 0.0 {
        return Spectrum::black();
    }
    let light = &scene.lights[light_num];
    let u_light = sampler.get_2d();
    let u_scattering = sampler.get_2d();
    estimate_direct(site, u_scattering, light, u_light, scene, sampler, handle_media) / light_pdf
}

/// One-sample MIS estimate of a single light's direct contribution: sample
/// the light, then sample the scattering function, weighting both with the
/// power heuristic.
pub fn estimate_direct(
    site: &ScatterSite<'_, '_, '_>,
    u_scattering: Point2f,
    light: &std::sync::Arc<dyn Light>,
    u_light: Point2f,
    scene: &Scene,
    sampler: &mut dyn Sampler,
    handle_media: bool,
) -> Spectrum {
    let bsdf_flags = BxDFType::all() & !BxDFType::BSDF_SPECULAR;
    let mut ld = Spectrum::black();
    let base = site.base();

    // Sample the light source
    let (mut li, wi, light_pdf, mut vis) = light.sample_li(&base, u_light);
    if light_pdf > 0.0 && !li.is_black() {
        // Scattering response toward the sampled direction
        let (f, scattering_pdf) = match site {
            ScatterSite::Surface(isect) => {
                let bsdf = isect.bsdf.as_ref().expect("BSDF missing at NEE vertex");
                let f = bsdf.f(&isect.hit.wo, &wi, bsdf_flags)
                    * wi.dotn(&isect.shading.n).abs();
                let pdf = bsdf.pdf(&isect.hit.wo, &wi, bsdf_flags);
                (f, pdf)
            }
            ScatterSite::Medium(mi) => {
                let p = mi.phase.p(&mi.wo, &wi);
                (Spectrum::grey(p), p)
            }
        };
        if !f.is_black() {
            // Visibility, through media if requested
            if handle_media {
                vis.medium = match site {
                    ScatterSite::Surface(isect) => isect.medium_for(&wi),
                    ScatterSite::Medium(mi) => mi.medium.clone(),
                };
                li *= vis.tr(scene, sampler);
            } else if !vis.unoccluded(scene) {
                li = Spectrum::black();
            }
            if !li.is_black() {
                if is_delta_light(light.flags()) {
                    ld += f * li / light_pdf;
                } else {
                    let weight = power_heuristic(1, light_pdf, 1, scattering_pdf);
                    ld += f * li * weight / light_pdf;
                }
            }
        }
    }

    // Sample the scattering function
    if !is_delta_light(light.flags()) {
        let (f, wi, scattering_pdf, sampled_specular) = match site {
            ScatterSite::Surface(isect) => {
                let bsdf = isect.bsdf.as_ref().expect("BSDF missing at NEE vertex");
                let (f, wi, pdf, sampled_type) =
                    bsdf.sample_f(&isect.hit.wo, u_scattering, bsdf_flags);
                (
                    f * wi.dotn(&isect.shading.n).abs(),
                    wi,
                    pdf,
                    sampled_type.contains(BxDFType::BSDF_SPECULAR),
                )
            }
            ScatterSite::Medium(mi) => {
                let (wi, p) = mi.phase.sample_p(&mi.wo, u_scattering);
                (Spectrum::grey(p), wi, p, false)
            }
        };

        if !f.is_black() && scattering_pdf > 0.0 {
            let weight = if !sampled_specular {
                let light_pdf = light.pdf_li(&base, &wi);
                if light_pdf == 0.0 {
                    return ld;
                }
                power_heuristic(1, scattering_pdf, 1, light_pdf)
            } else {
                1.0
            };

            // Trace toward the light and see what the sampled direction hits
            let ray = match site {
                ScatterSite::Surface(isect) => isect.spawn_ray(&wi),
                ScatterSite::Medium(mi) => mi.spawn_ray(&wi),
            };
            let (tr, hit) = if handle_media {
                scene.intersect_tr(ray, sampler)
            } else {
                let mut r = ray;
                (Spectrum::white(), scene.intersect(&mut r))
            };

            let li = match hit {
                Some(light_isect) => {
                    match light_isect.primitive.and_then(|p| p.area_light()) {
                        Some(area_light) if area_light.id() == light.id() => {
                            light_isect.le(&-wi)
                        }
                        _ => Spectrum::black(),
                    }
                }
                None => light.le(&Ray::new(base.p, wi)),
            };
            if !li.is_black() {
                ld += f * tr * li * weight / scattering_pdf;
            }
        }
    }

    ld
}

/// Russian roulette shared by the path-space integrators: returns the
/// survival scale or None to terminate.
pub fn russian_roulette(beta: &Spectrum, depth: u32, u: f32) -> Option<f32> {
    if depth <= 3 {
        return Some(1.0);
    }
    let q = (1.0 - beta.max_component_value()).max(0.05);
    if u < q {
        None
    } else {
        Some(1.0 / (1.0 - q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_russian_roulette_low_beta_terminates() {
        let beta = Spectrum::grey(0.01);
        // With u below q the path dies
        assert!(russian_roulette(&beta, 5, 0.5).is_none());
        // Early depths never terminate
        assert!(russian_roulette(&beta, 2, 0.99).is_some());
        // Survivors are scaled to stay unbiased
        let s = russian_roulette(&Spectrum::grey(0.5), 5, 0.9).unwrap();
        assert!((s - 2.0).abs() < 1e-4);
    }
}
