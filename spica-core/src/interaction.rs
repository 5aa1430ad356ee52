use std::sync::Arc;

use bumpalo::Bump;
use num::zero;

use crate::bsdf::Bsdf;
use crate::bssrdf::Bssrdf;
use crate::geometry::{face_forward_n, offset_ray_origin};
use crate::material::TransportMode;
use crate::medium::{HenyeyGreenstein, Medium, MediumSample};
use crate::primitive::Primitive;
use crate::ray::Ray;
use crate::shapes::Shape;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Point3f, Vector3f};

/// Minimal record of a point on a surface (or in space): enough to spawn
/// offset rays and to serve as the reference point for light sampling.
#[derive(Copy, Clone, Default)]
pub struct Interaction {
    /// The point where the ray hit the primitive
    pub p: Point3f,
    /// Error bound for the intersection point
    pub p_error: Vector3f,
    /// Outgoing direction of the light at the intersection point (usually `-ray.d`)
    pub wo: Vector3f,
    /// Geometric normal (zero for points in free space / media)
    pub n: Normal3f,
}

impl Interaction {
    pub fn new(p: Point3f, p_error: Vector3f, wo: Vector3f, n: Normal3f) -> Interaction {
        Interaction {
            p,
            p_error,
            wo,
            n,
        }
    }

    pub fn from_point(p: &Point3f) -> Interaction {
        Interaction {
            p: *p,
            p_error: zero(),
            wo: zero(),
            n: zero(),
        }
    }

    pub fn is_surface_interaction(&self) -> bool {
        self.n != zero()
    }

    pub fn spawn_ray(&self, dir: &Vector3f) -> Ray {
        debug_assert!(dir.x != 0.0 || dir.y != 0.0 || dir.z != 0.0);
        let o = offset_ray_origin(&self.p, &self.p_error, &self.n, dir);
        Ray::new(o, *dir)
    }

    pub fn spawn_ray_to(&self, p: &Point3f) -> Ray {
        let d = *p - self.p;
        debug_assert!(d.x != 0.0 || d.y != 0.0 || d.z != 0.0);
        let o = offset_ray_origin(&self.p, &self.p_error, &self.n, &d);
        Ray::segment(o, d, 1.0 - 1e-4)
    }

    /// Connection segment between two interactions, with both endpoints
    /// offset off their surfaces.
    pub fn spawn_ray_to_interaction(&self, it: &Interaction) -> Ray {
        let origin = offset_ray_origin(&self.p, &self.p_error, &self.n, &(it.p - self.p));
        let target = offset_ray_origin(&it.p, &it.p_error, &it.n, &(origin - it.p));
        let d = target - origin;
        debug_assert!(d.x != 0.0 || d.y != 0.0 || d.z != 0.0);
        Ray::segment(origin, d, 1.0 - 1e-4)
    }
}

/// Normal and partial derivatives used for shading. Can differ from the
/// geometric frame due to interpolated vertex normals.
#[derive(Copy, Clone, Default)]
pub struct Shading {
    pub n: Normal3f,
    pub dpdu: Vector3f,
    pub dpdv: Vector3f,
    pub dndu: Normal3f,
    pub dndv: Normal3f,
}

/// Full differential geometry at a ray/surface intersection, plus the
/// scattering functions attached by the hit primitive's material.
#[derive(Clone)]
pub struct SurfaceInteraction<'p, 'a> {
    pub hit: Interaction,
    /// Texture coordinates
    pub uv: Point2f,
    /// Partial derivatives at the intersection point
    pub dpdu: Vector3f,
    pub dpdv: Vector3f,
    /// Partial derivatives of the normal
    pub dndu: Normal3f,
    pub dndv: Normal3f,
    /// Hit shape
    pub shape: Option<&'p dyn Shape>,
    /// Hit primitive
    pub primitive: Option<&'p dyn Primitive>,
    /// Shading geometry
    pub shading: Shading,
    /// BSDF of the surface at the intersection point
    pub bsdf: Option<Bsdf<'a>>,
    /// Subsurface term, present for translucent materials
    pub bssrdf: Option<Bssrdf>,
}

impl<'p, 'a> SurfaceInteraction<'p, 'a> {
    pub fn new(
        p: Point3f,
        p_error: Vector3f,
        uv: Point2f,
        wo: Vector3f,
        dpdu: Vector3f,
        dpdv: Vector3f,
        dndu: Normal3f,
        dndv: Normal3f,
        shape: &'p dyn Shape,
    ) -> SurfaceInteraction<'p, 'a> {
        let mut n = Normal3f::from(dpdu.cross(&dpdv).normalize());
        if shape.reverse_orientation() ^ shape.transform_swaps_handedness() {
            n *= -1.0;
        }
        SurfaceInteraction {
            hit: Interaction::new(p, p_error, wo.normalize(), n),
            uv,
            dpdu,
            dpdv,
            dndu,
            dndv,
            shape: Some(shape),
            primitive: None,
            // Shading geometry defaults to the true geometry
            shading: Shading {
                n,
                dpdu,
                dpdv,
                dndu,
                dndv,
            },
            bsdf: None,
            bssrdf: None,
        }
    }

    /// Emitted radiance in direction `w` if the hit primitive is an emitter.
    pub fn le(&self, w: &Vector3f) -> Spectrum {
        self.primitive
            .and_then(|p| p.area_light())
            .map(|light| light.l(&self.hit, w))
            .unwrap_or_else(Spectrum::black)
    }

    pub fn compute_scattering_functions(&mut self, mode: TransportMode, arena: &'a Bump) {
        if let Some(primitive) = self.primitive {
            primitive.compute_scattering_functions(self, mode, arena);
        }
    }

    /// The medium on the side of the surface that direction `d` points into.
    pub fn medium_for(&self, d: &Vector3f) -> Option<Arc<dyn Medium>> {
        let interface = self.primitive.and_then(|p| p.medium_interface());
        match interface {
            Some(mi) => {
                if d.dotn(&self.hit.n) > 0.0 {
                    mi.outside.clone()
                } else {
                    mi.inside.clone()
                }
            }
            None => None,
        }
    }

    pub fn spawn_ray(&self, dir: &Vector3f) -> Ray {
        self.hit.spawn_ray(dir).with_medium(self.medium_for(dir))
    }

    pub fn spawn_ray_to(&self, p: &Point3f) -> Ray {
        let d = *p - self.hit.p;
        self.hit.spawn_ray_to(p).with_medium(self.medium_for(&d))
    }

    pub fn set_shading_geometry(
        &mut self,
        dpdus: &Vector3f,
        dpdvs: &Vector3f,
        dndus: &Normal3f,
        dndvs: &Normal3f,
        is_orientation_authoritative: bool,
    ) {
        self.shading.n = Normal3f::from(dpdus.cross(dpdvs).normalize());
        if let Some(shape) = self.shape {
            if shape.reverse_orientation() ^ shape.transform_swaps_handedness() {
                self.shading.n *= -1.0;
            }
        }
        // Keep the geometric and shading normals in the same hemisphere; the
        // caller decides which one wins.
        if is_orientation_authoritative {
            self.hit.n = face_forward_n(&self.hit.n, &self.shading.n);
        } else {
            self.shading.n = face_forward_n(&self.shading.n, &self.hit.n);
        }

        self.shading.dpdu = *dpdus;
        self.shading.dpdv = *dpdvs;
        self.shading.dndu = *dndus;
        self.shading.dndv = *dndvs;
    }
}

/// Scattering event inside a participating medium.
#[derive(Clone)]
pub struct MediumInteraction {
    pub p: Point3f,
    pub wo: Vector3f,
    pub phase: HenyeyGreenstein,
    pub medium: Option<Arc<dyn Medium>>,
}

impl MediumInteraction {
    pub fn new(
        sample: &MediumSample,
        medium: Option<Arc<dyn Medium>>,
    ) -> MediumInteraction {
        MediumInteraction {
            p: sample.p,
            wo: sample.wo,
            phase: sample.phase,
            medium,
        }
    }

    pub fn as_interaction(&self) -> Interaction {
        Interaction {
            p: self.p,
            p_error: zero(),
            wo: self.wo,
            n: zero(),
        }
    }

    pub fn spawn_ray(&self, dir: &Vector3f) -> Ray {
        Ray::new(self.p, *dir).with_medium(self.medium.clone())
    }
}
