use std::sync::Arc;

use crate::bounds::Bounds3f;
use crate::interaction::SurfaceInteraction;
use crate::light::{Light, LightFlags};
use crate::lightdistrib::power_light_distribution;
use crate::primitive::Primitive;
use crate::ray::Ray;
use crate::sampler::Sampler;
use crate::sampling::Distribution1D;
use crate::spectrum::Spectrum;

/// Everything the integrators see: the acceleration structure over all
/// primitives, the lights, and the power distribution used to pick among
/// them.
pub struct Scene {
    pub lights: Vec<Arc<dyn Light>>,
    pub infinite_lights: Vec<Arc<dyn Light>>,
    light_distribution: Distribution1D,
    aggregate: Arc<dyn Primitive>,
    world_bounds: Bounds3f,
}

impl Scene {
    pub fn new(aggregate: Arc<dyn Primitive>, lights: Vec<Arc<dyn Light>>) -> Scene {
        let world_bounds = aggregate.world_bounds();
        let scene = Scene {
            lights: Vec::new(),
            infinite_lights: Vec::new(),
            light_distribution: Distribution1D::new(&[1.0]),
            aggregate,
            world_bounds,
        };

        // preprocess() may need the scene's bounds, so fill lights in last
        let mut scene = scene;
        for l in &lights {
            l.preprocess(&scene);
        }
        scene.infinite_lights = lights
            .iter()
            .filter(|l| l.flags().contains(LightFlags::INFINITE))
            .map(Arc::clone)
            .collect();
        scene.light_distribution = power_light_distribution(&lights);
        scene.lights = lights;

        scene
    }

    pub fn intersect(&self, ray: &mut Ray) -> Option<SurfaceInteraction<'_, '_>> {
        debug_assert!(ray.d.length_squared() > 0.0);
        self.aggregate.intersect(ray)
    }

    pub fn intersect_p(&self, ray: &Ray) -> bool {
        debug_assert!(ray.d.length_squared() > 0.0);
        self.aggregate.intersect_p(ray)
    }

    /// Intersection plus accumulated transmittance: steps over material-less
    /// boundary surfaces, attenuating through any media along the way.
    pub fn intersect_tr(
        &self,
        ray: Ray,
        sampler: &mut dyn Sampler,
    ) -> (Spectrum, Option<SurfaceInteraction<'_, '_>>) {
        let mut tr = Spectrum::white();
        let mut ray = ray;
        loop {
            let hit = self.aggregate.intersect(&mut ray);
            if let Some(ref medium) = ray.medium {
                tr *= medium.tr(&ray, sampler);
            }
            match hit {
                None => return (tr, None),
                Some(isect) => {
                    if isect.primitive.and_then(|p| p.material()).is_some() {
                        return (tr, Some(isect));
                    }
                    // Transition surface only: restart beyond it
                    let d = ray.d;
                    ray = isect.spawn_ray(&d);
                }
            }
        }
    }

    pub fn world_bounds(&self) -> Bounds3f {
        self.world_bounds
    }

    /// Pick a light with probability proportional to power. Returns the
    /// light index and its discrete probability.
    pub fn sample_light(&self, u: f32) -> (usize, f32) {
        self.light_distribution.sample_discrete(u)
    }

    pub fn light_pdf(&self, index: usize) -> f32 {
        self.light_distribution.discrete_pdf(index)
    }

    pub fn light_distribution(&self) -> &Distribution1D {
        &self.light_distribution
    }
}
