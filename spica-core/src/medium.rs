use std::f32::consts::PI;
use std::fmt::Debug;
use std::sync::Arc;

use crate::coordinate_system;
use crate::ray::Ray;
use crate::sampler::Sampler;
use crate::spectrum::Spectrum;
use crate::{Point2f, Vector3f, INV_4_PI};

/// Henyey-Greenstein phase function with asymmetry parameter g.
#[derive(Debug, Copy, Clone)]
pub struct HenyeyGreenstein {
    pub g: f32,
}

impl HenyeyGreenstein {
    pub fn new(g: f32) -> HenyeyGreenstein {
        HenyeyGreenstein { g }
    }

    /// Phase function value for the angle between `wo` and `wi`.
    pub fn p(&self, wo: &Vector3f, wi: &Vector3f) -> f32 {
        phase_hg(wo.dot(wi), self.g)
    }

    /// Importance-sample an incident direction; the phase function is its
    /// own pdf, so the returned pdf equals `p(wo, wi)`.
    pub fn sample_p(&self, wo: &Vector3f, u: Point2f) -> (Vector3f, f32) {
        let g = self.g;
        let cos_theta = if g.abs() < 1e-3 {
            1.0 - 2.0 * u.x
        } else {
            let sqr_term = (1.0 - g * g) / (1.0 + g - 2.0 * g * u.x);
            -(1.0 + g * g - sqr_term * sqr_term) / (2.0 * g)
        };

        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = 2.0 * PI * u.y;
        let (v1, v2) = coordinate_system(wo);
        let wi = crate::geometry::spherical_direction_vectors(sin_theta, cos_theta, phi, &v1, &v2, wo);
        (wi, phase_hg(cos_theta, g))
    }
}

#[inline]
pub fn phase_hg(cos_theta: f32, g: f32) -> f32 {
    let denom = 1.0 + g * g + 2.0 * g * cos_theta;
    INV_4_PI * (1.0 - g * g) / (denom * denom.max(0.0).sqrt())
}

/// Participating medium: beam transmittance and free-flight sampling.
pub trait Medium: Debug + Send + Sync {
    /// Transmittance along `ray` over [0, t_max]. `ray.d` must be normalized.
    fn tr(&self, ray: &Ray, sampler: &mut dyn Sampler) -> Spectrum;

    /// Sample a scattering distance along the ray. Returns the sampling
    /// weight beta and, if scattering happens before `t_max`, the medium
    /// interaction.
    fn sample(&self, ray: &Ray, sampler: &mut dyn Sampler) -> (Spectrum, Option<MediumSample>);

    fn phase(&self) -> HenyeyGreenstein;
}

/// Result of free-flight distance sampling: a scattering point inside the
/// medium.
#[derive(Debug, Clone, Copy)]
pub struct MediumSample {
    pub p: crate::Point3f,
    pub wo: Vector3f,
    pub phase: HenyeyGreenstein,
}

#[derive(Debug, Clone)]
pub struct HomogeneousMedium {
    sigma_a: Spectrum,
    sigma_s: Spectrum,
    sigma_t: Spectrum,
    phase: HenyeyGreenstein,
}

impl HomogeneousMedium {
    pub fn new(sigma_a: Spectrum, sigma_s: Spectrum, g: f32) -> HomogeneousMedium {
        HomogeneousMedium {
            sigma_a,
            sigma_s,
            sigma_t: sigma_a + sigma_s,
            phase: HenyeyGreenstein::new(g),
        }
    }
}

impl Medium for HomogeneousMedium {
    fn tr(&self, ray: &Ray, _sampler: &mut dyn Sampler) -> Spectrum {
        let d = (self.sigma_t * (ray.t_max * ray.d.length()).min(f32::MAX)).clamp_negative();
        (-d).exp()
    }

    fn sample(&self, ray: &Ray, sampler: &mut dyn Sampler) -> (Spectrum, Option<MediumSample>) {
        // Pick a channel uniformly and sample an exponential free-flight
        // distance from its extinction coefficient.
        let channel = crate::min(
            (sampler.get_1d() * 3.0) as usize,
            2,
        );
        let sigma_t_c = self.sigma_t[channel];
        if sigma_t_c == 0.0 {
            return (Spectrum::white(), None);
        }
        let dist = -(1.0 - sampler.get_1d()).ln() / sigma_t_c;
        let t = (dist / ray.d.length()).min(ray.t_max);
        let sampled_medium = t < ray.t_max;

        let tr = (-(self.sigma_t * (t * ray.d.length()).min(f32::MAX)).clamp_negative()).exp();

        // The pdf is the average over channels of the exponential densities
        // (or the remaining probability mass for surface events).
        let density = if sampled_medium { self.sigma_t * tr } else { tr };
        let mut pdf = (density.r + density.g + density.b) / 3.0;
        if pdf == 0.0 {
            debug_assert!(tr.is_black());
            pdf = 1.0;
        }

        if sampled_medium {
            let beta = tr * self.sigma_s / pdf;
            let mi = MediumSample {
                p: ray.at(t),
                wo: -ray.d,
                phase: self.phase,
            };
            (beta, Some(mi))
        } else {
            (tr / pdf, None)
        }
    }

    fn phase(&self) -> HenyeyGreenstein {
        self.phase
    }
}

/// The media on either side of a surface. `None` stands for vacuum.
#[derive(Debug, Clone, Default)]
pub struct MediumInterface {
    pub inside: Option<Arc<dyn Medium>>,
    pub outside: Option<Arc<dyn Medium>>,
}

impl MediumInterface {
    pub fn new(
        inside: Option<Arc<dyn Medium>>,
        outside: Option<Arc<dyn Medium>>,
    ) -> MediumInterface {
        MediumInterface { inside, outside }
    }

    pub fn vacuum() -> MediumInterface {
        MediumInterface {
            inside: None,
            outside: None,
        }
    }

    pub fn is_medium_transition(&self) -> bool {
        let same = match (&self.inside, &self.outside) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        !same
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{RandomSampler, Sampler};
    use crate::Point3f;

    #[test]
    fn test_tr_is_monotone_in_distance() {
        let m = HomogeneousMedium::new(Spectrum::grey(0.3), Spectrum::grey(0.4), 0.0);
        let mut sampler = RandomSampler::new(1, 0);
        let mut prev = 1.0f32;
        for i in 1..10 {
            let mut ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), crate::Vector3f::new(0.0, 0.0, 1.0));
            ray.t_max = i as f32 * 0.5;
            let tr = m.tr(&ray, &mut sampler);
            assert!(tr.r < prev);
            prev = tr.r;
        }
    }

    #[test]
    fn test_hg_normalized() {
        // MC estimate of the integral of p over the sphere should be ~1.
        let hg = HenyeyGreenstein::new(0.4);
        let wo = Vector3f::new(0.0, 0.0, 1.0);
        let mut rng = crate::rng::Rng::with_sequence(5);
        let n = 100_000;
        let mut sum = 0.0;
        for _ in 0..n {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let wi = crate::sampling::uniform_sample_sphere(u);
            sum += hg.p(&wo, &wi);
        }
        let integral = sum / n as f32 * 4.0 * PI;
        assert!((integral - 1.0).abs() < 0.02, "integral = {}", integral);
    }

    #[test]
    fn test_hg_sample_pdf_matches_eval() {
        let hg = HenyeyGreenstein::new(-0.6);
        let wo = Vector3f::new(0.0, 1.0, 0.0);
        let mut rng = crate::rng::Rng::with_sequence(9);
        for _ in 0..100 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let (wi, pdf) = hg.sample_p(&wo, u);
            assert!((pdf - hg.p(&wo, &wi)).abs() < 1e-4);
            assert!((wi.length() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_homogeneous_sample_weight() {
        // With a grey medium the single-channel estimator is exact:
        // beta * pdf recovers sigma_s * tr for medium events.
        let m = HomogeneousMedium::new(Spectrum::grey(0.5), Spectrum::grey(1.0), 0.0);
        let mut sampler = RandomSampler::new(1, 42);
        sampler.start_pixel(crate::Point2i::new(0, 0));
        let mut ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), crate::Vector3f::new(0.0, 0.0, 1.0));
        ray.t_max = 10.0;
        let (beta, mi) = m.sample(&ray, &mut sampler);
        assert!(beta.is_finite());
        if let Some(mi) = mi {
            assert!(mi.p.z > 0.0 && mi.p.z < 10.0);
        }
    }
}
