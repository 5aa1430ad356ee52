use std::fmt::Debug;
use std::sync::Arc;

use bumpalo::Bump;

use crate::bounds::Bounds3f;
use crate::interaction::SurfaceInteraction;
use crate::light::AreaLight;
use crate::material::{Material, TransportMode};
use crate::medium::MediumInterface;
use crate::ray::Ray;
use crate::shapes::Shape;

/// A shape bundled with its appearance: material, optional emission, and the
/// media on either side of the surface.
pub trait Primitive: Debug + Send + Sync {
    fn world_bounds(&self) -> Bounds3f;

    fn intersect(&self, ray: &mut Ray) -> Option<SurfaceInteraction<'_, '_>>;

    fn intersect_p(&self, ray: &Ray) -> bool;

    fn area_light(&self) -> Option<Arc<dyn AreaLight>>;

    fn material(&self) -> Option<Arc<dyn Material>>;

    fn medium_interface(&self) -> Option<&MediumInterface>;

    fn compute_scattering_functions<'p, 'a>(
        &self,
        isect: &mut SurfaceInteraction<'p, 'a>,
        mode: TransportMode,
        arena: &'a Bump,
    );
}

#[derive(Debug)]
pub struct GeometricPrimitive {
    pub shape: Arc<dyn Shape>,
    pub material: Option<Arc<dyn Material>>,
    pub area_light: Option<Arc<dyn AreaLight>>,
    pub medium_interface: Option<MediumInterface>,
}

impl GeometricPrimitive {
    pub fn new(shape: Arc<dyn Shape>, material: Arc<dyn Material>) -> GeometricPrimitive {
        GeometricPrimitive {
            shape,
            material: Some(material),
            area_light: None,
            medium_interface: None,
        }
    }

    pub fn with_light(mut self, light: Arc<dyn AreaLight>) -> GeometricPrimitive {
        self.area_light = Some(light);
        self
    }

    pub fn with_medium_interface(mut self, mi: MediumInterface) -> GeometricPrimitive {
        self.medium_interface = Some(mi);
        self
    }
}

impl Primitive for GeometricPrimitive {
    fn world_bounds(&self) -> Bounds3f {
        self.shape.world_bounds()
    }

    fn intersect(&self, ray: &mut Ray) -> Option<SurfaceInteraction<'_, '_>> {
        self.shape.intersect(ray).map(|(mut isect, t_hit)| {
            isect.primitive = Some(self);
            ray.t_max = t_hit;
            isect
        })
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.shape.intersect_p(ray)
    }

    fn area_light(&self) -> Option<Arc<dyn AreaLight>> {
        self.area_light.clone()
    }

    fn material(&self) -> Option<Arc<dyn Material>> {
        self.material.clone()
    }

    fn medium_interface(&self) -> Option<&MediumInterface> {
        self.medium_interface.as_ref()
    }

    fn compute_scattering_functions<'p, 'a>(
        &self,
        isect: &mut SurfaceInteraction<'p, 'a>,
        mode: TransportMode,
        arena: &'a Bump,
    ) {
        if let Some(ref material) = self.material {
            material.compute_scattering_functions(isect, mode, arena);
            if let Some(ref mut bssrdf) = isect.bssrdf {
                bssrdf.material_id = crate::bssrdf::material_id_of(material);
            }
        }
    }
}
