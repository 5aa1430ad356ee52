mod bxdf;
mod fresnel;
mod lambertian;
mod microfacet;
mod specular;

pub use self::bxdf::{BxDF, ScaledBxDF};
pub use self::fresnel::{
    fr_conductor, fr_dielectric, Fresnel, FresnelConductor, FresnelDielectric, FresnelNoOp,
};
pub use self::lambertian::{LambertianReflection, LambertianTransmission};
pub use self::microfacet::{
    MicrofacetDistribution, MicrofacetReflection, MicrofacetTransmission, TrowbridgeReitz,
};
pub use self::specular::{FresnelSpecular, SpecularReflection, SpecularTransmission};

use std::cmp;

use bitflags::bitflags;
use bumpalo::Bump;

use crate::interaction::SurfaceInteraction;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Vector3f, ONE_MINUS_EPSILON};

bitflags! {
    pub struct BxDFType: u32 {
        const BSDF_REFLECTION   = 0b_0000_0001;
        const BSDF_TRANSMISSION = 0b_0000_0010;
        const BSDF_DIFFUSE      = 0b_0000_0100;
        const BSDF_GLOSSY       = 0b_0000_1000;
        const BSDF_SPECULAR     = 0b_0001_0000;
    }
}

const MAX_BXDFS: usize = 8;

/// Collects the BxDFs a material instantiates for one shading point, then
/// freezes them into an arena slice.
pub struct BxDFHolder<'a> {
    bxdfs: [Option<&'a (dyn BxDF + 'a)>; MAX_BXDFS],
    n: usize,
}

impl<'a> BxDFHolder<'a> {
    pub fn new() -> BxDFHolder<'a> {
        BxDFHolder {
            bxdfs: [None; MAX_BXDFS],
            n: 0,
        }
    }

    pub fn add(&mut self, bxdf: &'a (dyn BxDF + 'a)) {
        assert!(self.n < MAX_BXDFS);
        self.bxdfs[self.n] = Some(bxdf);
        self.n += 1;
    }

    pub fn into_slice(self, arena: &'a Bump) -> &'a [&'a (dyn BxDF + 'a)] {
        arena.alloc_slice_fill_with(self.n, |i| self.bxdfs[i].unwrap())
    }
}

impl<'a> Default for BxDFHolder<'a> {
    fn default() -> Self {
        BxDFHolder::new()
    }
}

/// The full scattering response of a surface point: a small bundle of BxDFs
/// expressed in the local shading frame.
#[derive(Copy, Clone)]
pub struct Bsdf<'a> {
    /// Relative index of refraction of the surface
    pub eta: f32,
    /// Shading normal
    ns: Normal3f,
    /// Geometric normal
    ng: Normal3f,
    ss: Vector3f,
    ts: Vector3f,
    bxdfs: &'a [&'a (dyn BxDF + 'a)],
}

impl<'a> Bsdf<'a> {
    pub fn new(
        isect: &SurfaceInteraction<'_, '_>,
        eta: f32,
        bxdfs: &'a [&'a (dyn BxDF + 'a)],
    ) -> Bsdf<'a> {
        let ss = isect.shading.dpdu.normalize();
        Bsdf {
            eta,
            ns: isect.shading.n,
            ng: isect.hit.n,
            ss,
            ts: Vector3f::from(isect.shading.n).cross(&ss),
            bxdfs,
        }
    }

    /// Evaluate the BSDF for a pair of world-space directions. Components
    /// are only evaluated on the side of the surface consistent with the
    /// geometric configuration of (wo, wi).
    pub fn f(&self, wo_w: &Vector3f, wi_w: &Vector3f, flags: BxDFType) -> Spectrum {
        let wi = self.world_to_local(wi_w);
        let wo = self.world_to_local(wo_w);
        if wo.z == 0.0 {
            return Spectrum::black();
        }
        let reflect = wi_w.dotn(&self.ng) * wo_w.dotn(&self.ng) > 0.0;
        self.bxdfs
            .iter()
            .filter(|b| {
                b.matches(flags)
                    && ((reflect && b.get_type().contains(BxDFType::BSDF_REFLECTION))
                        || (!reflect && b.get_type().contains(BxDFType::BSDF_TRANSMISSION)))
            })
            .fold(Spectrum::black(), |c, b| c + b.f(&wo, &wi))
    }

    /// Average of the matching non-specular component pdfs.
    pub fn pdf(&self, wo_w: &Vector3f, wi_w: &Vector3f, flags: BxDFType) -> f32 {
        if self.bxdfs.is_empty() {
            return 0.0;
        }
        let wo = self.world_to_local(wo_w);
        if wo.z == 0.0 {
            return 0.0;
        }
        let wi = self.world_to_local(wi_w);

        let mut matched_comps = 0;
        let mut pdf = 0.0;
        for bxdf in self.bxdfs {
            if bxdf.matches(flags) {
                matched_comps += 1;
                pdf += bxdf.pdf(&wo, &wi);
            }
        }
        if matched_comps == 0 {
            0.0
        } else {
            pdf / matched_comps as f32
        }
    }

    /// Sample an incident direction. One matching component is chosen
    /// uniformly; for non-specular choices f and pdf are then recomputed over
    /// all matching components.
    pub fn sample_f(
        &self,
        wo_w: &Vector3f,
        u: Point2f,
        flags: BxDFType,
    ) -> (Spectrum, Vector3f, f32, BxDFType) {
        let matching_comps: Vec<&&dyn BxDF> =
            self.bxdfs.iter().filter(|b| b.matches(flags)).collect();
        if matching_comps.is_empty() {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                BxDFType::empty(),
            );
        }
        let comp = cmp::min(
            (u[0] * matching_comps.len() as f32).floor() as usize,
            matching_comps.len() - 1,
        );
        let bxdf = matching_comps[comp];

        // Remap the sample to [0,1)^2 so the chosen component sees a fresh
        // uniform value.
        let u_remapped = Point2f::new(
            (u[0] * matching_comps.len() as f32 - comp as f32).min(ONE_MINUS_EPSILON),
            u[1],
        );

        let wo = self.world_to_local(wo_w);
        if wo.z == 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                bxdf.get_type(),
            );
        }
        let (mut f, wi, mut pdf, sampled_type) = bxdf.sample_f(&wo, u_remapped);
        let sampled_type = if sampled_type.is_empty() {
            bxdf.get_type()
        } else {
            sampled_type
        };
        if pdf == 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                BxDFType::empty(),
            );
        }
        let wi_w = self.local_to_world(&wi);

        // Overall pdf over all matching, non-specular components
        if !bxdf.get_type().contains(BxDFType::BSDF_SPECULAR) && matching_comps.len() > 1 {
            for (i, c) in matching_comps.iter().enumerate() {
                if i != comp {
                    pdf += c.pdf(&wo, &wi);
                }
            }
        }
        if matching_comps.len() > 1 {
            pdf /= matching_comps.len() as f32;
        }

        // Recompute f with the reflect/transmit side filter applied
        if !bxdf.get_type().contains(BxDFType::BSDF_SPECULAR) && matching_comps.len() > 1 {
            let reflect = wi_w.dotn(&self.ng) * wo_w.dotn(&self.ng) > 0.0;
            f = matching_comps
                .iter()
                .filter(|b| {
                    (reflect && b.get_type().contains(BxDFType::BSDF_REFLECTION))
                        || (!reflect && b.get_type().contains(BxDFType::BSDF_TRANSMISSION))
                })
                .fold(Spectrum::black(), |f, b| f + b.f(&wo, &wi));
        }

        (f, wi_w, pdf, sampled_type)
    }

    pub fn world_to_local(&self, v: &Vector3f) -> Vector3f {
        Vector3f::new(v.dot(&self.ss), v.dot(&self.ts), v.dotn(&self.ns))
    }

    pub fn local_to_world(&self, v: &Vector3f) -> Vector3f {
        Vector3f::new(
            self.ss.x * v.x + self.ts.x * v.y + self.ns.x * v.z,
            self.ss.y * v.x + self.ts.y * v.y + self.ns.y * v.z,
            self.ss.z * v.x + self.ts.z * v.y + self.ns.z * v.z,
        )
    }

    /// Number of BxDFs matching the given flags.
    pub fn num_components(&self, flags: BxDFType) -> usize {
        self.bxdfs.iter().filter(|b| b.matches(flags)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let flags = BxDFType::BSDF_SPECULAR | BxDFType::BSDF_REFLECTION;
        let bxdf_type =
            BxDFType::BSDF_SPECULAR | BxDFType::BSDF_REFLECTION | BxDFType::BSDF_TRANSMISSION;

        assert_eq!(bxdf_type & flags, flags);
    }
}
