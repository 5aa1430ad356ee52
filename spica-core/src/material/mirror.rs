use std::sync::Arc;

use bumpalo::Bump;

use crate::bsdf::{Bsdf, BxDFHolder, FresnelNoOp, SpecularReflection};
use crate::interaction::SurfaceInteraction;
use crate::material::{Material, TransportMode};
use crate::spectrum::Spectrum;
use crate::texture::{ConstantTexture, Texture};

/// Ideal mirror.
#[derive(Debug)]
pub struct MirrorMaterial {
    kr: Arc<dyn Texture<Spectrum>>,
}

impl MirrorMaterial {
    pub fn new(kr: Arc<dyn Texture<Spectrum>>) -> MirrorMaterial {
        MirrorMaterial { kr }
    }

    pub fn constant(kr: Spectrum) -> MirrorMaterial {
        MirrorMaterial {
            kr: Arc::new(ConstantTexture::new(kr)),
        }
    }
}

impl Material for MirrorMaterial {
    fn compute_scattering_functions<'p, 'a>(
        &self,
        si: &mut SurfaceInteraction<'p, 'a>,
        _mode: TransportMode,
        arena: &'a Bump,
    ) {
        let mut bxdfs = BxDFHolder::new();
        let r = self.kr.evaluate(si).clamp_negative();
        if !r.is_black() {
            let fresnel = arena.alloc(FresnelNoOp);
            bxdfs.add(arena.alloc(SpecularReflection::new(r, fresnel)));
        }
        let bsdf = Bsdf::new(si, 1.0, bxdfs.into_slice(arena));
        si.bsdf = Some(bsdf);
    }
}
