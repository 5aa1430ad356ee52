use bumpalo::Bump;
use log::info;

use crate::bsdf::BxDFType;
use crate::integrator::kdtree::{KdItem, KdTree};
use crate::interaction::SurfaceInteraction;
use crate::material::TransportMode;
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point3f, Vector3f};

/// A deposit of light flux on a surface: position, incident direction and
/// the path throughput that carried it.
#[derive(Debug, Clone)]
pub struct Photon {
    pub p: Point3f,
    pub wi: Vector3f,
    pub beta: Spectrum,
    pub n: Normal3f,
}

impl KdItem for Photon {
    fn position(&self) -> Point3f {
        self.p
    }
}

/// Photon map over a balanced k-d tree, shared by the photon-mapping
/// integrator family.
#[derive(Debug)]
pub struct PhotonMap {
    tree: KdTree<Photon>,
}

impl PhotonMap {
    pub fn empty() -> PhotonMap {
        PhotonMap {
            tree: KdTree::build(Vec::new()),
        }
    }

    /// Shoot `n_photons` from the scene lights and deposit photons at every
    /// non-specular surface interaction.
    pub fn construct(
        scene: &Scene,
        sampler: &mut dyn Sampler,
        n_photons: usize,
        max_depth: u32,
    ) -> PhotonMap {
        let mut photons = Vec::new();
        let mut arena = Bump::new();
        for _ in 0..n_photons {
            trace_photon(
                scene,
                sampler,
                &arena,
                max_depth,
                1.0 / n_photons as f32,
                &mut photons,
            );
            arena.reset();
        }
        info!(
            "photon map: {} photons stored from {} emitted",
            photons.len(),
            n_photons
        );
        PhotonMap {
            tree: KdTree::build(photons),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn photons(&self) -> &[Photon] {
        self.tree.items()
    }

    /// Density-estimated outgoing radiance at a surface point: gather the k
    /// nearest photons within `radius` and evaluate the BSDF against each.
    pub fn radiance_estimate(
        &self,
        isect: &SurfaceInteraction<'_, '_>,
        gather_photons: usize,
        radius: f32,
    ) -> Spectrum {
        if self.tree.is_empty() {
            return Spectrum::black();
        }
        let bsdf = match isect.bsdf {
            Some(ref b) => b,
            None => return Spectrum::black(),
        };
        let found = self.tree.knn(&isect.hit.p, gather_photons, radius);
        if found.is_empty() {
            return Spectrum::black();
        }

        let photons = self.tree.items();
        let mut max_dist2 = 0.0f32;
        let mut sum = Spectrum::black();
        for &i in &found {
            let photon = &photons[i];
            max_dist2 = max_dist2.max((photon.p - isect.hit.p).length_squared());
            // Photons on the far side of the surface carry no flux here
            if photon.n.dot(&isect.hit.n) < 0.0 {
                continue;
            }
            sum += bsdf.f(&isect.hit.wo, &photon.wi, BxDFType::all()) * photon.beta;
        }
        let r2 = if found.len() < gather_photons {
            radius * radius
        } else {
            max_dist2
        };
        if r2 <= 0.0 {
            return Spectrum::black();
        }
        sum / (std::f32::consts::PI * r2)
    }

    /// Irradiance arriving at a point with the given normal.
    pub fn irradiance_estimate(
        &self,
        p: &Point3f,
        n: &Normal3f,
        gather_photons: usize,
        radius: f32,
    ) -> Spectrum {
        if self.tree.is_empty() {
            return Spectrum::black();
        }
        let found = self.tree.knn(p, gather_photons, radius);
        if found.is_empty() {
            return Spectrum::black();
        }
        let photons = self.tree.items();
        let mut max_dist2 = 0.0f32;
        let mut sum = Spectrum::black();
        for &i in &found {
            let photon = &photons[i];
            max_dist2 = max_dist2.max((photon.p - *p).length_squared());
            if photon.wi.dotn(n) > 0.0 {
                sum += photon.beta;
            }
        }
        let r2 = if found.len() < gather_photons {
            radius * radius
        } else {
            max_dist2
        };
        if r2 <= 0.0 {
            return Spectrum::black();
        }
        sum / (std::f32::consts::PI * r2)
    }

    /// Total flux carried by the stored photons.
    pub fn total_flux(&self) -> Spectrum {
        self.tree
            .items()
            .iter()
            .fold(Spectrum::black(), |acc, p| acc + p.beta)
    }
}

/// Trace one photon path from the lights, with Russian roulette after a few
/// bounces.
pub fn trace_photon(
    scene: &Scene,
    sampler: &mut dyn Sampler,
    arena: &Bump,
    max_depth: u32,
    inv_n_photons: f32,
    out: &mut Vec<Photon>,
) {
    if scene.lights.is_empty() {
        return;
    }
    let (light_num, light_pdf) = scene.sample_light(sampler.get_1d());
    if light_pdf == 0.0 {
        return;
    }
    let light = &scene.lights[light_num];
    let u1 = sampler.get_2d();
    let u2 = sampler.get_2d();
    let (mut ray, n_light, pdf_pos, pdf_dir, le) = light.sample_le(u1, u2);
    if pdf_pos == 0.0 || pdf_dir == 0.0 || le.is_black() {
        return;
    }
    let mut beta =
        le * n_light.dotv(&ray.d).abs() * inv_n_photons / (light_pdf * pdf_pos * pdf_dir);
    if beta.is_black() {
        return;
    }

    for depth in 0..max_depth {
        let mut isect = match scene.intersect(&mut ray) {
            Some(isect) => isect,
            None => break,
        };
        isect.compute_scattering_functions(TransportMode::Importance, arena);
        let bsdf = match isect.bsdf {
            Some(b) => b,
            None => {
                ray = isect.spawn_ray(&ray.d);
                continue;
            }
        };

        let wo = -ray.d;
        // Deposit at diffuse/glossy surfaces only
        if bsdf.num_components(BxDFType::all() & !BxDFType::BSDF_SPECULAR) > 0 {
            out.push(Photon {
                p: isect.hit.p,
                wi: wo,
                beta,
                n: isect.hit.n,
            });
        }

        let (f, wi, pdf, _flags) = bsdf.sample_f(&wo, sampler.get_2d(), BxDFType::all());
        if f.is_black() || pdf == 0.0 {
            break;
        }
        let beta_new = beta * f * wi.dotn(&isect.shading.n).abs() / pdf;

        // Russian roulette on the relative throughput change
        let q = (1.0 - beta_new.y() / beta.y().max(1e-12)).max(0.0);
        if depth > 3 {
            if sampler.get_1d() < q {
                break;
            }
            beta = beta_new / (1.0 - q);
        } else {
            beta = beta_new;
        }
        ray = isect.spawn_ray(&wi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{RandomSampler, Sampler};
    use crate::scenes;

    #[test]
    fn test_photon_conservation() {
        let scene = scenes::cornell_box();
        let mut sampler = RandomSampler::new(1, 7);
        sampler.start_pixel(crate::Point2i::new(0, 0));
        let n = 2000;
        let map = PhotonMap::construct(&scene, &mut sampler, n, 8);
        assert!(!map.is_empty());

        // Each bounce can deposit at most the emitted power once, so the
        // stored flux is bounded by power times the depth limit
        let total_power: f32 = scene.lights.iter().map(|l| l.power().y()).sum();
        let flux = map.total_flux().y();
        assert!(
            flux <= total_power * 8.0,
            "flux {} exceeds bound for power {}",
            flux,
            total_power
        );
        // And no photon carries NaN or infinity
        for p in map.photons() {
            assert!(p.beta.is_finite());
            assert!(!p.p.has_nan());
        }
    }
}
