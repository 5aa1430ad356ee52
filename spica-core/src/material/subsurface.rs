use std::sync::Arc;

use bumpalo::Bump;

use crate::bsdf::{Bsdf, BxDFHolder, FresnelSpecular};
use crate::bssrdf::Bssrdf;
use crate::interaction::SurfaceInteraction;
use crate::material::{Material, TransportMode};
use crate::spectrum::Spectrum;
use crate::texture::{ConstantTexture, Texture};

/// Translucent material: a smooth dielectric boundary over a homogeneous
/// scattering interior, summarized by a dipole BSSRDF.
#[derive(Debug)]
pub struct SubsurfaceMaterial {
    scale: f32,
    kr: Arc<dyn Texture<Spectrum>>,
    kt: Arc<dyn Texture<Spectrum>>,
    sigma_a: Arc<dyn Texture<Spectrum>>,
    sigma_s: Arc<dyn Texture<Spectrum>>,
    g: f32,
    eta: f32,
}

impl SubsurfaceMaterial {
    pub fn new(
        scale: f32,
        sigma_a: Spectrum,
        sigma_s: Spectrum,
        g: f32,
        eta: f32,
    ) -> SubsurfaceMaterial {
        SubsurfaceMaterial {
            scale,
            kr: Arc::new(ConstantTexture::new(Spectrum::white())),
            kt: Arc::new(ConstantTexture::new(Spectrum::white())),
            sigma_a: Arc::new(ConstantTexture::new(sigma_a)),
            sigma_s: Arc::new(ConstantTexture::new(sigma_s)),
            g,
            eta,
        }
    }

    pub fn eta(&self) -> f32 {
        self.eta
    }
}

impl Material for SubsurfaceMaterial {
    fn compute_scattering_functions<'p, 'a>(
        &self,
        si: &mut SurfaceInteraction<'p, 'a>,
        mode: TransportMode,
        arena: &'a Bump,
    ) {
        let r = self.kr.evaluate(si).clamp_negative();
        let t = self.kt.evaluate(si).clamp_negative();
        let sigma_a = self.sigma_a.evaluate(si) * self.scale;
        let sigma_s = self.sigma_s.evaluate(si) * self.scale;

        let mut bxdfs = BxDFHolder::new();
        if !r.is_black() || !t.is_black() {
            bxdfs.add(arena.alloc(FresnelSpecular::new(r, t, 1.0, self.eta, mode)));
        }
        let bsdf = Bsdf::new(si, self.eta, bxdfs.into_slice(arena));
        si.bsdf = Some(bsdf);
        // The owning primitive stamps the material identity afterwards, so
        // probe rays can tell same-object hits apart.
        let bssrdf = Bssrdf::new(si, self.eta, sigma_a, sigma_s, self.g, 0);
        si.bssrdf = Some(bssrdf);
    }
}
