use std::f32::consts::PI;

use bumpalo::Bump;

use crate::bsdf::{fr_dielectric, Bsdf, BxDF, BxDFHolder, BxDFType};
use crate::geometry::{abs_cos_theta, same_hemisphere};
use crate::interaction::{Interaction, SurfaceInteraction};
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::{clamp, Normal3f, Point2f, Point3f, Vector3f};

/// First moment of the Fresnel reflectance function, used to normalize the
/// directional term of a separable BSSRDF.
pub fn fresnel_moment1(eta: f32) -> f32 {
    let eta2 = eta * eta;
    let eta3 = eta2 * eta;
    let eta4 = eta3 * eta;
    let eta5 = eta4 * eta;
    if eta < 1.0 {
        0.45966 - 1.73965 * eta + 3.37668 * eta2 - 3.904945 * eta3 + 2.49277 * eta4
            - 0.68441 * eta5
    } else {
        -4.61686 + 11.1136 * eta - 10.4646 * eta2 + 5.11455 * eta3 - 1.27198 * eta4
            + 0.12746 * eta5
    }
}

/// Classical dipole diffusion approximation of subsurface scattering,
/// separable into a spatial profile Rd(r) and a directional Fresnel factor.
#[derive(Debug, Clone, Copy)]
pub struct Bssrdf {
    /// Entry point and its shading frame
    pub po: Point3f,
    pub p_error: Vector3f,
    pub ns: Normal3f,
    pub ss: Vector3f,
    pub ts: Vector3f,
    pub wo: Vector3f,
    pub eta: f32,
    sigma_a: Spectrum,
    /// Reduced scattering coefficient sigma_s' = sigma_s (1 - g)
    sigma_sp: Spectrum,
    /// Opaque identity of the owning material, to keep probe hits on the
    /// same object
    pub material_id: usize,
}

impl Bssrdf {
    pub fn new(
        si: &SurfaceInteraction<'_, '_>,
        eta: f32,
        sigma_a: Spectrum,
        sigma_s: Spectrum,
        g: f32,
        material_id: usize,
    ) -> Bssrdf {
        let ss = si.shading.dpdu.normalize();
        Bssrdf {
            po: si.hit.p,
            p_error: si.hit.p_error,
            ns: si.shading.n,
            ss,
            ts: Vector3f::from(si.shading.n).cross(&ss),
            wo: si.hit.wo,
            eta,
            sigma_a,
            sigma_sp: sigma_s * (1.0 - g),
            material_id,
        }
    }

    fn sigma_tp(&self) -> Spectrum {
        self.sigma_a + self.sigma_sp
    }

    /// Effective transport coefficient per channel.
    fn sigma_tr(&self) -> Spectrum {
        (3.0 * self.sigma_a * self.sigma_tp()).sqrt()
    }

    /// Diffuse reflectance profile of the dipole at distance r.
    pub fn rd(&self, r: f32) -> Spectrum {
        let fdr = -1.440 / (self.eta * self.eta) + 0.710 / self.eta + 0.668 + 0.0636 * self.eta;
        let a = (1.0 + fdr) / (1.0 - fdr);
        let sigma_tp = self.sigma_tp();
        let sigma_tr = self.sigma_tr();

        let mut out = Spectrum::black();
        for c in 0..3 {
            if sigma_tp[c] <= 0.0 {
                continue;
            }
            let alpha_p = self.sigma_sp[c] / sigma_tp[c];
            let zr = 1.0 / sigma_tp[c];
            let zv = zr * (1.0 + 4.0 / 3.0 * a);
            let dr = (r * r + zr * zr).sqrt();
            let dv = (r * r + zv * zv).sqrt();
            let tr = sigma_tr[c];
            out[c] = alpha_p / (4.0 * PI)
                * (zr * (tr * dr + 1.0) * (-tr * dr).exp() / (dr * dr * dr)
                    + zv * (tr * dv + 1.0) * (-tr * dv).exp() / (dv * dv * dv));
        }
        out
    }

    /// Spatial term of the separable BSSRDF.
    pub fn sp(&self, pi: &Point3f) -> Spectrum {
        self.rd((*pi - self.po).length())
    }

    /// Directional term at the exit point.
    pub fn sw(&self, w: &Vector3f) -> f32 {
        let c = 1.0 - 2.0 * fresnel_moment1(1.0 / self.eta);
        (1.0 - fr_dielectric(w.z, 1.0, self.eta)) / (c * PI)
    }

    /// Full separable term S(po, wo, pi, wi) with wi in the exit frame.
    pub fn s(&self, pi: &Point3f, wi_local: &Vector3f) -> Spectrum {
        let ft = 1.0 - fr_dielectric(self.wo.dotn(&self.ns), 1.0, self.eta);
        self.sp(pi) * (ft * self.sw(wi_local))
    }

    /// Sample an exit radius for the given channel.
    fn sample_r(&self, channel: usize, u: f32) -> f32 {
        let tr = self.sigma_tr()[channel];
        if tr <= 0.0 {
            return -1.0;
        }
        -(1.0 - u).ln() / tr
    }

    fn pdf_r(&self, channel: usize, r: f32) -> f32 {
        let tr = self.sigma_tr()[channel];
        if tr <= 0.0 {
            return 0.0;
        }
        // Exponential radial density expressed over the plane
        tr * (-tr * r).exp() / (2.0 * PI * r.max(1e-6))
    }

    /// Sample an exit point on the surface around the entry point. Returns
    /// the spatial throughput S_p / pdf and the exit interaction with the
    /// adapter BSDF attached.
    pub fn sample_s<'s: 'a, 'a>(
        &self,
        scene: &'s Scene,
        u1: f32,
        u2: Point2f,
        arena: &'a Bump,
    ) -> Option<(Spectrum, SurfaceInteraction<'s, 'a>, f32)> {
        // Choose a projection axis: mostly the normal, sometimes the
        // tangents to cover grazing geometry
        let (vx, vy, vz, mut u1) = if u1 < 0.5 {
            (self.ss, self.ts, Vector3f::from(self.ns), u1 * 2.0)
        } else if u1 < 0.75 {
            (
                self.ts,
                Vector3f::from(self.ns),
                self.ss,
                (u1 - 0.5) * 4.0,
            )
        } else {
            (
                Vector3f::from(self.ns),
                self.ss,
                self.ts,
                (u1 - 0.75) * 4.0,
            )
        };

        // Choose a spectral channel for the radial sampling
        let channel = clamp((u1 * 3.0) as usize, 0, 2);
        u1 = u1 * 3.0 - channel as f32;

        let r = self.sample_r(channel, u2.x);
        if r < 0.0 {
            return None;
        }
        let phi = 2.0 * PI * u2.y;

        // Probe span: beyond r_max the profile carries negligible energy
        let r_max = self.sample_r(channel, 0.9995);
        if r >= r_max {
            return None;
        }
        let l = 2.0 * (r_max * r_max - r * r).max(0.0).sqrt();

        // Walk the probe segment and collect hits on the same material
        let base =
            self.po + r * (vx * phi.cos() + vy * phi.sin()) - vz * (l * 0.5);
        let target = base + vz * l;
        let mut chain: Vec<SurfaceInteraction<'s, 'a>> = Vec::new();
        let mut probe_it = Interaction::from_point(&base);
        for _ in 0..32 {
            if (target - probe_it.p).length_squared() < 1e-12 {
                break;
            }
            let mut ray = probe_it.spawn_ray_to(&target);
            match scene.intersect(&mut ray) {
                Some(si) => {
                    probe_it = si.hit;
                    let same = si
                        .primitive
                        .and_then(|p| p.material())
                        .map(|m| material_id_of(&m) == self.material_id)
                        .unwrap_or(false);
                    if same {
                        chain.push(si);
                    }
                    if chain.len() >= 8 {
                        break;
                    }
                }
                None => break,
            }
        }

        if chain.is_empty() {
            return None;
        }
        let selected = crate::min((u1 * chain.len() as f32) as usize, chain.len() - 1);
        let n_found = chain.len();
        let mut pi = chain.swap_remove(selected);

        let pdf = self.pdf_sp(&pi) / n_found as f32;
        if pdf <= 0.0 {
            return None;
        }
        let sp = self.sp(&pi.hit.p);

        // Attach the adapter BSDF accounting for the directional term
        let mut bxdfs = BxDFHolder::new();
        bxdfs.add(arena.alloc(BssrdfAdapter::new(self.eta)));
        pi.hit.wo = Vector3f::from(pi.shading.n);
        let bsdf = Bsdf::new(&pi, 1.0, bxdfs.into_slice(arena));
        pi.bsdf = Some(bsdf);

        Some((sp, pi, pdf))
    }

    /// Combined pdf of hitting the exit point through any axis/channel
    /// combination.
    pub fn pdf_sp(&self, pi: &SurfaceInteraction<'_, '_>) -> f32 {
        let d = pi.hit.p - self.po;
        let d_local = Vector3f::new(self.ss.dot(&d), self.ts.dot(&d), self.ns.dotv(&d));
        let n_local = Vector3f::new(
            self.ss.dotn(&pi.hit.n),
            self.ts.dotn(&pi.hit.n),
            self.ns.dot(&pi.hit.n),
        );

        // Projected radii on the three sampling axes
        let r_proj = [
            (d_local.y * d_local.y + d_local.z * d_local.z).sqrt(),
            (d_local.z * d_local.z + d_local.x * d_local.x).sqrt(),
            (d_local.x * d_local.x + d_local.y * d_local.y).sqrt(),
        ];

        let axis_prob = [0.25f32, 0.25, 0.5];
        let ch_prob = 1.0 / 3.0;
        let mut pdf = 0.0;
        for (axis, &r) in r_proj.iter().enumerate() {
            for ch in 0..3 {
                pdf += self.pdf_r(ch, r.max(1e-6))
                    * n_local[axis].abs()
                    * ch_prob
                    * axis_prob[axis];
            }
        }
        pdf
    }
}

/// Opaque identity for a material, used only for equality.
pub fn material_id_of(m: &std::sync::Arc<dyn crate::material::Material>) -> usize {
    std::sync::Arc::as_ptr(m) as *const () as usize
}

/// BxDF standing in for the directional part of the BSSRDF at the exit
/// point.
#[derive(Debug, Copy, Clone)]
pub struct BssrdfAdapter {
    eta: f32,
}

impl BssrdfAdapter {
    pub fn new(eta: f32) -> BssrdfAdapter {
        BssrdfAdapter { eta }
    }
}

impl BxDF for BssrdfAdapter {
    fn f(&self, _wo: &Vector3f, wi: &Vector3f) -> Spectrum {
        let c = 1.0 - 2.0 * fresnel_moment1(1.0 / self.eta);
        let f = (1.0 - fr_dielectric(abs_cos_theta(wi), 1.0, self.eta)) / (c * PI);
        Spectrum::grey(f)
    }

    fn pdf(&self, wo: &Vector3f, wi: &Vector3f) -> f32 {
        if same_hemisphere(wo, wi) {
            abs_cos_theta(wi) / PI
        } else {
            0.0
        }
    }

    fn get_type(&self) -> BxDFType {
        BxDFType::BSDF_DIFFUSE | BxDFType::BSDF_REFLECTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bssrdf() -> Bssrdf {
        Bssrdf {
            po: Point3f::new(0.0, 0.0, 0.0),
            p_error: Vector3f::new(0.0, 0.0, 0.0),
            ns: Normal3f::new(0.0, 0.0, 1.0),
            ss: Vector3f::new(1.0, 0.0, 0.0),
            ts: Vector3f::new(0.0, 1.0, 0.0),
            wo: Vector3f::new(0.0, 0.0, 1.0),
            eta: 1.3,
            sigma_a: Spectrum::grey(0.05),
            sigma_sp: Spectrum::grey(1.0),
            material_id: 0,
        }
    }

    #[test]
    fn test_rd_decreases_with_distance() {
        let b = test_bssrdf();
        let mut prev = f32::MAX;
        for i in 1..10 {
            let r = i as f32 * 0.2;
            let v = b.rd(r).y();
            assert!(v < prev, "Rd must fall off with distance");
            assert!(v >= 0.0);
            prev = v;
        }
    }

    #[test]
    fn test_rd_energy_bounded() {
        // Integral of Rd over the plane (2 pi r dr) is at most 1 (albedo)
        let b = test_bssrdf();
        let mut integral = 0.0f64;
        let dr = 0.005;
        let mut r = dr / 2.0;
        while r < 20.0 {
            integral += (b.rd(r).y() * 2.0 * PI * r * dr) as f64;
            r += dr;
        }
        assert!(integral < 1.0 + 1e-2, "integral = {}", integral);
        assert!(integral > 0.1);
    }

    #[test]
    fn test_radial_sampling_pdf() {
        let b = test_bssrdf();
        // pdf integrates to ~1 over the plane
        let mut integral = 0.0f64;
        let dr = 0.005;
        let mut r = dr / 2.0;
        while r < 30.0 {
            integral += (b.pdf_r(0, r) * 2.0 * PI * r * dr) as f64;
            r += dr;
        }
        assert!((integral - 1.0).abs() < 0.02, "integral = {}", integral);
    }
}
