use std::sync::Arc;

use bumpalo::Bump;

use crate::bsdf::{
    Bsdf, BxDFHolder, FresnelDielectric, FresnelSpecular, MicrofacetReflection,
    MicrofacetTransmission, SpecularReflection, SpecularTransmission, TrowbridgeReitz,
};
use crate::interaction::SurfaceInteraction;
use crate::material::{Material, TransportMode};
use crate::spectrum::Spectrum;
use crate::texture::{ConstantTexture, Texture};

/// Dielectric interface: smooth glass uses the sampled Fresnel-specular
/// lobe, rough glass the Trowbridge-Reitz microfacet pair.
#[derive(Debug)]
pub struct GlassMaterial {
    kr: Arc<dyn Texture<Spectrum>>,
    kt: Arc<dyn Texture<Spectrum>>,
    eta: Arc<dyn Texture<f32>>,
    roughness: Arc<dyn Texture<f32>>,
    remap_roughness: bool,
}

impl GlassMaterial {
    pub fn new(
        kr: Arc<dyn Texture<Spectrum>>,
        kt: Arc<dyn Texture<Spectrum>>,
        eta: Arc<dyn Texture<f32>>,
        roughness: Arc<dyn Texture<f32>>,
        remap_roughness: bool,
    ) -> GlassMaterial {
        GlassMaterial {
            kr,
            kt,
            eta,
            roughness,
            remap_roughness,
        }
    }

    /// Smooth glass with the given index of refraction.
    pub fn smooth(eta: f32) -> GlassMaterial {
        GlassMaterial {
            kr: Arc::new(ConstantTexture::new(Spectrum::white())),
            kt: Arc::new(ConstantTexture::new(Spectrum::white())),
            eta: Arc::new(ConstantTexture::new(eta)),
            roughness: Arc::new(ConstantTexture::new(0.0)),
            remap_roughness: true,
        }
    }
}

impl Material for GlassMaterial {
    fn compute_scattering_functions<'p, 'a>(
        &self,
        si: &mut SurfaceInteraction<'p, 'a>,
        mode: TransportMode,
        arena: &'a Bump,
    ) {
        let eta = self.eta.evaluate(si);
        let rough = self.roughness.evaluate(si);
        let r = self.kr.evaluate(si).clamp_negative();
        let t = self.kt.evaluate(si).clamp_negative();

        let mut bxdfs = BxDFHolder::new();
        if !r.is_black() || !t.is_black() {
            if rough == 0.0 {
                if !r.is_black() && !t.is_black() {
                    bxdfs.add(arena.alloc(FresnelSpecular::new(r, t, 1.0, eta, mode)));
                } else if !r.is_black() {
                    let fresnel = arena.alloc(FresnelDielectric::new(1.0, eta));
                    bxdfs.add(arena.alloc(SpecularReflection::new(r, fresnel)));
                } else {
                    bxdfs.add(arena.alloc(SpecularTransmission::new(t, 1.0, eta, mode)));
                }
            } else {
                let alpha = if self.remap_roughness {
                    TrowbridgeReitz::roughness_to_alpha(rough)
                } else {
                    rough
                };
                let distrib = &*arena.alloc(TrowbridgeReitz::new(alpha, alpha));
                if !r.is_black() {
                    let fresnel = arena.alloc(FresnelDielectric::new(1.0, eta));
                    bxdfs.add(arena.alloc(MicrofacetReflection::new(r, distrib, fresnel)));
                }
                if !t.is_black() {
                    bxdfs.add(arena.alloc(MicrofacetTransmission::new(t, distrib, 1.0, eta, mode)));
                }
            }
        }

        let bsdf = Bsdf::new(si, eta, bxdfs.into_slice(arena));
        si.bsdf = Some(bsdf);
    }
}
