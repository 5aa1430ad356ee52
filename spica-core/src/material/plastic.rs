use std::sync::Arc;

use bumpalo::Bump;

use crate::bsdf::{
    Bsdf, BxDFHolder, FresnelDielectric, LambertianReflection, MicrofacetReflection,
    TrowbridgeReitz,
};
use crate::interaction::SurfaceInteraction;
use crate::material::{Material, TransportMode};
use crate::spectrum::Spectrum;
use crate::texture::{ConstantTexture, Texture};

/// Diffuse substrate with a rough dielectric coat.
#[derive(Debug)]
pub struct PlasticMaterial {
    kd: Arc<dyn Texture<Spectrum>>,
    ks: Arc<dyn Texture<Spectrum>>,
    roughness: Arc<dyn Texture<f32>>,
    remap_roughness: bool,
}

impl PlasticMaterial {
    pub fn new(
        kd: Arc<dyn Texture<Spectrum>>,
        ks: Arc<dyn Texture<Spectrum>>,
        roughness: Arc<dyn Texture<f32>>,
        remap_roughness: bool,
    ) -> PlasticMaterial {
        PlasticMaterial {
            kd,
            ks,
            roughness,
            remap_roughness,
        }
    }

    pub fn constant(kd: Spectrum, ks: Spectrum, roughness: f32) -> PlasticMaterial {
        PlasticMaterial {
            kd: Arc::new(ConstantTexture::new(kd)),
            ks: Arc::new(ConstantTexture::new(ks)),
            roughness: Arc::new(ConstantTexture::new(roughness)),
            remap_roughness: true,
        }
    }
}

impl Material for PlasticMaterial {
    fn compute_scattering_functions<'p, 'a>(
        &self,
        si: &mut SurfaceInteraction<'p, 'a>,
        _mode: TransportMode,
        arena: &'a Bump,
    ) {
        let mut bxdfs = BxDFHolder::new();

        let kd = self.kd.evaluate(si).clamp_negative();
        if !kd.is_black() {
            bxdfs.add(arena.alloc(LambertianReflection::new(kd)));
        }

        let ks = self.ks.evaluate(si).clamp_negative();
        if !ks.is_black() {
            let fresnel = arena.alloc(FresnelDielectric::new(1.5, 1.0));
            let mut rough = self.roughness.evaluate(si);
            if self.remap_roughness {
                rough = TrowbridgeReitz::roughness_to_alpha(rough);
            }
            let distrib = arena.alloc(TrowbridgeReitz::new(rough, rough));
            bxdfs.add(arena.alloc(MicrofacetReflection::new(ks, distrib, fresnel)));
        }

        let bsdf = Bsdf::new(si, 1.0, bxdfs.into_slice(arena));
        si.bsdf = Some(bsdf);
    }
}
