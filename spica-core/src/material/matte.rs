use std::sync::Arc;

use bumpalo::Bump;

use crate::bsdf::{Bsdf, BxDFHolder, LambertianReflection};
use crate::interaction::SurfaceInteraction;
use crate::material::{Material, TransportMode};
use crate::spectrum::Spectrum;
use crate::texture::{ConstantTexture, Texture};

/// Purely diffuse surface.
#[derive(Debug)]
pub struct MatteMaterial {
    kd: Arc<dyn Texture<Spectrum>>,
}

impl MatteMaterial {
    pub fn new(kd: Arc<dyn Texture<Spectrum>>) -> MatteMaterial {
        MatteMaterial { kd }
    }

    pub fn constant(kd: Spectrum) -> MatteMaterial {
        MatteMaterial {
            kd: Arc::new(ConstantTexture::new(kd)),
        }
    }
}

impl Material for MatteMaterial {
    fn compute_scattering_functions<'p, 'a>(
        &self,
        si: &mut SurfaceInteraction<'p, 'a>,
        _mode: TransportMode,
        arena: &'a Bump,
    ) {
        let mut bxdfs = BxDFHolder::new();

        let r = self.kd.evaluate(si).clamp_negative();
        if !r.is_black() {
            bxdfs.add(arena.alloc(LambertianReflection::new(r)));
        }

        let bsdf = Bsdf::new(si, 1.0, bxdfs.into_slice(arena));
        si.bsdf = Some(bsdf);
    }
}
