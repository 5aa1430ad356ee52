mod glass;
mod matte;
mod metal;
mod mirror;
mod plastic;
mod subsurface;

pub use self::glass::GlassMaterial;
pub use self::matte::MatteMaterial;
pub use self::metal::MetalMaterial;
pub use self::mirror::MirrorMaterial;
pub use self::plastic::PlasticMaterial;
pub use self::subsurface::SubsurfaceMaterial;

use std::fmt::Debug;

use bumpalo::Bump;

use crate::interaction::SurfaceInteraction;

/// Whether a path carries radiance (from the camera) or importance (from a
/// light). Refraction scales differently for the two.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Radiance,
    Importance,
}

/// Turns a surface interaction into a BSDF (and possibly a BSSRDF), using
/// textures evaluated at the hit.
pub trait Material: Debug + Send + Sync {
    fn compute_scattering_functions<'p, 'a>(
        &self,
        si: &mut SurfaceInteraction<'p, 'a>,
        mode: TransportMode,
        arena: &'a Bump,
    );
}
