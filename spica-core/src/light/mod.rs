mod diffuse;
mod infinite;
mod point;

pub use self::diffuse::DiffuseAreaLight;
pub use self::infinite::InfiniteAreaLight;
pub use self::point::PointLight;

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::interaction::Interaction;
use crate::medium::Medium;
use crate::ray::Ray;
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Vector3f};

bitflags! {
    pub struct LightFlags: u32 {
        const DELTA_POSITION  = 0b_0000_0001;
        const DELTA_DIRECTION = 0b_0000_0010;
        const AREA            = 0b_0000_0100;
        const INFINITE        = 0b_0000_1000;
    }
}

#[inline]
pub fn is_delta_light(flags: LightFlags) -> bool {
    flags.contains(LightFlags::DELTA_POSITION) || flags.contains(LightFlags::DELTA_DIRECTION)
}

static LIGHT_ID: AtomicU32 = AtomicU32::new(0);

pub fn next_light_id() -> u32 {
    LIGHT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Deferred shadow query between two points. The caller sets `medium` to the
/// medium at `p0` toward `p1` before asking for transmittance.
pub struct VisibilityTester {
    pub p0: Interaction,
    pub p1: Interaction,
    pub medium: Option<Arc<dyn Medium>>,
}

impl VisibilityTester {
    pub fn new(p0: Interaction, p1: Interaction) -> VisibilityTester {
        VisibilityTester {
            p0,
            p1,
            medium: None,
        }
    }

    /// Binary visibility; media are ignored.
    pub fn unoccluded(&self, scene: &Scene) -> bool {
        let r = self.p0.spawn_ray_to_interaction(&self.p1);
        !scene.intersect_p(&r)
    }

    /// Transmittance along the segment, stepping across non-opaque
    /// boundaries and attenuating through any media in between.
    pub fn tr(&self, scene: &Scene, sampler: &mut dyn Sampler) -> Spectrum {
        let mut ray = self.p0.spawn_ray_to_interaction(&self.p1);
        ray.medium = self.medium.clone();
        let mut tr = Spectrum::white();
        for _ in 0..64 {
            let hit = scene.intersect(&mut ray);
            // An opaque surface blocks the segment outright
            if let Some(ref isect) = hit {
                if isect.primitive.and_then(|p| p.material()).is_some() {
                    return Spectrum::black();
                }
            }
            if let Some(ref medium) = ray.medium {
                tr *= medium.tr(&ray, sampler);
            }
            match hit {
                Some(isect) => {
                    // Step across the boundary and keep going toward p1
                    let d = ray.d;
                    let next_medium = isect.medium_for(&d);
                    ray = isect.hit.spawn_ray_to_interaction(&self.p1);
                    ray.medium = next_medium;
                }
                None => break,
            }
        }
        tr
    }
}

/// Emitter interface. Solid-angle pdfs are used for incoming queries, area x
/// direction pdfs for emitted rays.
pub trait Light: Debug + Send + Sync {
    fn id(&self) -> u32;

    /// Sample an incoming direction at `re` that may carry light from this
    /// emitter. Returns (radiance, wi, solid-angle pdf, visibility tester).
    fn sample_li(
        &self,
        re: &Interaction,
        u: Point2f,
    ) -> (Spectrum, Vector3f, f32, VisibilityTester);

    fn pdf_li(&self, re: &Interaction, wi: &Vector3f) -> f32;

    /// Sample an emitted ray. Returns (ray, light normal, positional pdf in
    /// area measure, directional pdf in solid angle, emitted radiance).
    fn sample_le(&self, u1: Point2f, u2: Point2f) -> (Ray, Normal3f, f32, f32, Spectrum);

    /// (pdf_pos, pdf_dir) of `sample_le` producing this ray.
    fn pdf_le(&self, ray: &Ray, n_light: &Normal3f) -> (f32, f32);

    fn power(&self) -> Spectrum;

    fn flags(&self) -> LightFlags;

    fn preprocess(&self, _scene: &Scene) {}

    /// Radiance carried by a ray that escaped the scene. Non-zero only for
    /// infinite lights.
    fn le(&self, _ray: &Ray) -> Spectrum {
        Spectrum::black()
    }
}

/// Shape-backed emitters also answer emitted-radiance queries at a surface
/// point.
pub trait AreaLight: Light {
    fn l(&self, it: &Interaction, w: &Vector3f) -> Spectrum;
}
