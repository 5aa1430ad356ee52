use std::f32::consts::PI;

use super::sphere::transform_interaction;
use super::Shape;
use crate::bounds::Bounds3f;
use crate::interaction::{Interaction, SurfaceInteraction};
use crate::ray::Ray;
use crate::sampling::concentric_sample_disk;
use crate::transform::Transform;
use crate::{Normal3f, Point2f, Point3f, Vector3f};

/// Disk in the z = height object-space plane, facing +z.
#[derive(Debug)]
pub struct Disk {
    object_to_world: Transform,
    world_to_object: Transform,
    height: f32,
    radius: f32,
    inner_radius: f32,
    reverse_orientation: bool,
}

impl Disk {
    pub fn new(
        object_to_world: Transform,
        height: f32,
        radius: f32,
        inner_radius: f32,
        reverse_orientation: bool,
    ) -> Disk {
        Disk {
            world_to_object: object_to_world.inverse(),
            object_to_world,
            height,
            radius,
            inner_radius,
            reverse_orientation,
        }
    }

    /// Object-space hit: plane intersection plus the radial band test.
    fn hit(&self, ray: &Ray) -> Option<(f32, Point3f, Ray)> {
        let obj_ray = self.world_to_object.transform_ray(ray);
        if obj_ray.d.z == 0.0 {
            return None;
        }
        let t_shape_hit = (self.height - obj_ray.o.z) / obj_ray.d.z;
        if t_shape_hit <= 0.0 || t_shape_hit >= obj_ray.t_max {
            return None;
        }
        let p_hit = obj_ray.at(t_shape_hit);
        let dist2 = p_hit.x * p_hit.x + p_hit.y * p_hit.y;
        if dist2 > self.radius * self.radius || dist2 < self.inner_radius * self.inner_radius {
            return None;
        }
        Some((t_shape_hit, p_hit, obj_ray))
    }
}

impl Shape for Disk {
    fn object_bounds(&self) -> Bounds3f {
        Bounds3f::from_points(
            &Point3f::new(-self.radius, -self.radius, self.height - 1e-4),
            &Point3f::new(self.radius, self.radius, self.height + 1e-4),
        )
    }

    fn world_bounds(&self) -> Bounds3f {
        self.object_to_world.transform_bounds(&self.object_bounds())
    }

    fn intersect(&self, ray: &Ray) -> Option<(SurfaceInteraction<'_, '_>, f32)> {
        let (t_shape_hit, mut p_hit, obj_ray) = self.hit(ray)?;

        let mut phi = p_hit.y.atan2(p_hit.x);
        if phi < 0.0 {
            phi += 2.0 * PI;
        }
        let dist2 = p_hit.x * p_hit.x + p_hit.y * p_hit.y;
        let r_hit = dist2.sqrt();
        let u = phi / (2.0 * PI);
        let one_minus_v = (r_hit - self.inner_radius) / (self.radius - self.inner_radius);
        let v = 1.0 - one_minus_v;
        let dpdu = Vector3f::new(-2.0 * PI * p_hit.y, 2.0 * PI * p_hit.x, 0.0);
        let dpdv =
            Vector3f::new(p_hit.x, p_hit.y, 0.0) * ((self.inner_radius - self.radius) / r_hit);
        // The hit lies exactly in the plane
        p_hit.z = self.height;

        let isect = SurfaceInteraction::new(
            p_hit,
            Vector3f::new(0.0, 0.0, 0.0),
            Point2f::new(u, v),
            -obj_ray.d,
            dpdu,
            dpdv,
            Normal3f::new(0.0, 0.0, 0.0),
            Normal3f::new(0.0, 0.0, 0.0),
            self,
        );
        Some((
            transform_interaction(&self.object_to_world, isect),
            t_shape_hit,
        ))
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.hit(ray).is_some()
    }

    fn area(&self) -> f32 {
        PI * (self.radius * self.radius - self.inner_radius * self.inner_radius)
    }

    fn sample(&self, u: Point2f) -> (Interaction, f32) {
        let pd = concentric_sample_disk(u);
        let p_obj = Point3f::new(pd.x * self.radius, pd.y * self.radius, self.height);
        let mut n = self
            .object_to_world
            .transform_normal(&Normal3f::new(0.0, 0.0, 1.0))
            .normalize();
        if self.reverse_orientation {
            n = -n;
        }
        let (p, p_error) = self.object_to_world.transform_point_with_error(&p_obj);
        (
            Interaction::new(p, p_error, Vector3f::new(0.0, 0.0, 0.0), n),
            1.0 / self.area(),
        )
    }

    fn reverse_orientation(&self) -> bool {
        self.reverse_orientation
    }

    fn transform_swaps_handedness(&self) -> bool {
        self.object_to_world.swaps_handedness()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_through_center() {
        let d = Disk::new(Transform::default(), 0.0, 1.0, 0.0, false);
        let r = Ray::new(Point3f::new(0.2, 0.1, 3.0), Vector3f::new(0.0, 0.0, -1.0));
        let (isect, t) = d.intersect(&r).expect("hit");
        assert!((t - 3.0).abs() < 1e-5);
        assert!((isect.hit.p.z).abs() < 1e-6);
    }

    #[test]
    fn test_annulus_hole() {
        let d = Disk::new(Transform::default(), 0.0, 1.0, 0.5, false);
        let through_hole = Ray::new(Point3f::new(0.1, 0.0, 3.0), Vector3f::new(0.0, 0.0, -1.0));
        assert!(!d.intersect_p(&through_hole));
        let through_ring = Ray::new(Point3f::new(0.75, 0.0, 3.0), Vector3f::new(0.0, 0.0, -1.0));
        assert!(d.intersect_p(&through_ring));
    }

    #[test]
    fn test_area() {
        let d = Disk::new(Transform::default(), 0.0, 2.0, 1.0, false);
        assert!((d.area() - PI * 3.0).abs() < 1e-5);
    }
}
