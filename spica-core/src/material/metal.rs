use std::sync::Arc;

use bumpalo::Bump;

use crate::bsdf::{Bsdf, BxDFHolder, FresnelConductor, MicrofacetReflection, TrowbridgeReitz};
use crate::interaction::SurfaceInteraction;
use crate::material::{Material, TransportMode};
use crate::spectrum::Spectrum;
use crate::texture::{ConstantTexture, Texture};

/// Rough conductor with a wavelength-dependent complex index.
#[derive(Debug)]
pub struct MetalMaterial {
    eta: Arc<dyn Texture<Spectrum>>,
    k: Arc<dyn Texture<Spectrum>>,
    roughness: Arc<dyn Texture<f32>>,
    remap_roughness: bool,
}

impl MetalMaterial {
    pub fn new(
        eta: Arc<dyn Texture<Spectrum>>,
        k: Arc<dyn Texture<Spectrum>>,
        roughness: Arc<dyn Texture<f32>>,
        remap_roughness: bool,
    ) -> MetalMaterial {
        MetalMaterial {
            eta,
            k,
            roughness,
            remap_roughness,
        }
    }

    /// Gold-ish defaults with the given roughness.
    pub fn gold(roughness: f32) -> MetalMaterial {
        MetalMaterial {
            eta: Arc::new(ConstantTexture::new(Spectrum::rgb(0.1431, 0.3749, 1.4424))),
            k: Arc::new(ConstantTexture::new(Spectrum::rgb(3.9831, 2.3857, 1.6032))),
            roughness: Arc::new(ConstantTexture::new(roughness)),
            remap_roughness: true,
        }
    }
}

impl Material for MetalMaterial {
    fn compute_scattering_functions<'p, 'a>(
        &self,
        si: &mut SurfaceInteraction<'p, 'a>,
        _mode: TransportMode,
        arena: &'a Bump,
    ) {
        let mut bxdfs = BxDFHolder::new();

        let mut rough = self.roughness.evaluate(si);
        if self.remap_roughness {
            rough = TrowbridgeReitz::roughness_to_alpha(rough);
        }
        let fresnel = arena.alloc(FresnelConductor::new(
            Spectrum::white(),
            self.eta.evaluate(si),
            self.k.evaluate(si),
        ));
        let distrib = arena.alloc(TrowbridgeReitz::new(rough, rough));
        bxdfs.add(arena.alloc(MicrofacetReflection::new(
            Spectrum::white(),
            distrib,
            fresnel,
        )));

        let bsdf = Bsdf::new(si, 1.0, bxdfs.into_slice(arena));
        si.bsdf = Some(bsdf);
    }
}
