use std::f32::consts::PI;

use super::Shape;
use crate::bounds::Bounds3f;
use crate::efloat::{solve_quadratic, EFloat};
use crate::geometry::{coordinate_system, distance_squared, spherical_direction_vectors};
use crate::interaction::{Interaction, SurfaceInteraction};
use crate::ray::Ray;
use crate::sampling::{uniform_cone_pdf, uniform_sample_sphere};
use crate::transform::Transform;
use crate::{clamp, gamma, Normal3f, Point2f, Point3f, Vector3f};

/// Full sphere of the given radius, centered at the object-space origin.
#[derive(Debug)]
pub struct Sphere {
    object_to_world: Transform,
    world_to_object: Transform,
    radius: f32,
    reverse_orientation: bool,
}

impl Sphere {
    pub fn new(object_to_world: Transform, radius: f32, reverse_orientation: bool) -> Sphere {
        Sphere {
            world_to_object: object_to_world.inverse(),
            object_to_world,
            radius,
            reverse_orientation,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn center(&self) -> Point3f {
        self.object_to_world.transform_point(&Point3f::new(0.0, 0.0, 0.0))
    }

    /// Object-space hit testing shared by intersect and intersect_p.
    fn hit_quadratic(&self, ray: &Ray) -> Option<(EFloat, Point3f, Ray)> {
        let obj_ray = self.world_to_object.transform_ray(ray);
        let (ox, oy, oz) = (
            EFloat::new(obj_ray.o.x, 0.0),
            EFloat::new(obj_ray.o.y, 0.0),
            EFloat::new(obj_ray.o.z, 0.0),
        );
        let (dx, dy, dz) = (
            EFloat::new(obj_ray.d.x, 0.0),
            EFloat::new(obj_ray.d.y, 0.0),
            EFloat::new(obj_ray.d.z, 0.0),
        );
        let a = dx * dx + dy * dy + dz * dz;
        let b = 2.0 * (dx * ox + dy * oy + dz * oz);
        let c = ox * ox + oy * oy + oz * oz - EFloat::from(self.radius) * EFloat::from(self.radius);

        let (t0, t1) = solve_quadratic(a, b, c)?;
        if t0.upper_bound() > obj_ray.t_max || t1.lower_bound() <= 0.0 {
            return None;
        }
        let mut t_shape_hit = t0;
        if t_shape_hit.lower_bound() <= 0.0 {
            t_shape_hit = t1;
            if t_shape_hit.upper_bound() > obj_ray.t_max {
                return None;
            }
        }
        // Refine the hit point by reprojecting onto the sphere
        let mut p_hit = obj_ray.at(f32::from(t_shape_hit));
        let dist = (p_hit - Point3f::new(0.0, 0.0, 0.0)).length();
        p_hit = Point3f::from(Vector3f::from(p_hit) * (self.radius / dist));
        if p_hit.x == 0.0 && p_hit.y == 0.0 {
            p_hit.x = 1e-5 * self.radius;
        }
        Some((t_shape_hit, p_hit, obj_ray))
    }
}

impl Shape for Sphere {
    fn object_bounds(&self) -> Bounds3f {
        Bounds3f::from_points(
            &Point3f::new(-self.radius, -self.radius, -self.radius),
            &Point3f::new(self.radius, self.radius, self.radius),
        )
    }

    fn world_bounds(&self) -> Bounds3f {
        self.object_to_world.transform_bounds(&self.object_bounds())
    }

    fn intersect(&self, ray: &Ray) -> Option<(SurfaceInteraction<'_, '_>, f32)> {
        let (t_shape_hit, p_hit, obj_ray) = self.hit_quadratic(ray)?;

        let mut phi = p_hit.y.atan2(p_hit.x);
        if phi < 0.0 {
            phi += 2.0 * PI;
        }
        let theta = clamp(p_hit.z / self.radius, -1.0, 1.0).acos();

        // Parametric representation with the full (theta, phi) ranges
        let u = phi / (2.0 * PI);
        let v = theta / PI;

        let z_radius = (p_hit.x * p_hit.x + p_hit.y * p_hit.y).sqrt();
        let inv_z_radius = 1.0 / z_radius;
        let cos_phi = p_hit.x * inv_z_radius;
        let sin_phi = p_hit.y * inv_z_radius;
        let dpdu = Vector3f::new(-2.0 * PI * p_hit.y, 2.0 * PI * p_hit.x, 0.0);
        let sin_theta = (1.0 - (p_hit.z / self.radius) * (p_hit.z / self.radius))
            .max(0.0)
            .sqrt();
        let dpdv = PI * Vector3f::new(
            p_hit.z * cos_phi,
            p_hit.z * sin_phi,
            -self.radius * sin_theta,
        );

        // For a sphere the Weingarten normal derivatives have a closed form
        let dndu = Normal3f::from(dpdu * (1.0 / self.radius));
        let dndv = Normal3f::from(dpdv * (1.0 / self.radius));

        let p_error = gamma(5) * Vector3f::from(p_hit).abs();

        let isect = SurfaceInteraction::new(
            p_hit,
            p_error,
            Point2f::new(u, v),
            -obj_ray.d,
            dpdu,
            dpdv,
            dndu,
            dndv,
            self,
        );
        let world_isect = transform_interaction(&self.object_to_world, isect);
        Some((world_isect, f32::from(t_shape_hit)))
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.hit_quadratic(ray).is_some()
    }

    fn area(&self) -> f32 {
        4.0 * PI * self.radius * self.radius
    }

    fn sample(&self, u: Point2f) -> (Interaction, f32) {
        let p_obj = Point3f::from(uniform_sample_sphere(u) * self.radius);
        let n = self
            .object_to_world
            .transform_normal(&Normal3f::new(p_obj.x, p_obj.y, p_obj.z))
            .normalize();
        let n = if self.reverse_orientation { -n } else { n };
        // Reproject and carry the transform error
        let (p, p_error) = self
            .object_to_world
            .transform_point_with_error(&p_obj);
        let it = Interaction::new(p, p_error, Vector3f::new(0.0, 0.0, 0.0), n);
        (it, 1.0 / self.area())
    }

    fn sample_from(&self, re: &Interaction, u: Point2f) -> (Interaction, f32) {
        let p_center = self.center();
        // Inside the sphere: fall back to uniform area sampling
        if distance_squared(&re.p, &p_center) <= self.radius * self.radius {
            let (intr, mut pdf) = self.sample(u);
            let mut wi = intr.p - re.p;
            if wi.length_squared() == 0.0 {
                return (intr, 0.0);
            }
            wi = wi.normalize();
            pdf *= distance_squared(&re.p, &intr.p) / intr.n.dotv(&-wi).abs();
            if pdf.is_infinite() {
                return (intr, 0.0);
            }
            return (intr, pdf);
        }

        // Sample inside the cone the sphere subtends from re
        let dc = (re.p - p_center).length();
        let wc = (p_center - re.p).normalize();
        let (wc_x, wc_y) = coordinate_system(&wc);

        let sin_theta_max2 = self.radius * self.radius / (dc * dc);
        let cos_theta_max = (1.0 - sin_theta_max2).max(0.0).sqrt();
        let cos_theta = (1.0 - u[0]) + u[0] * cos_theta_max;
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

        // Project the sampled direction onto the sphere surface
        let ds = dc * cos_theta
            - (self.radius * self.radius - dc * dc * sin_theta * sin_theta)
                .max(0.0)
                .sqrt();
        let cos_alpha = (dc * dc + self.radius * self.radius - ds * ds)
            / (2.0 * dc * self.radius);
        let sin_alpha = (1.0 - cos_alpha * cos_alpha).max(0.0).sqrt();
        let phi = u[1] * 2.0 * PI;
        let n_world =
            spherical_direction_vectors(sin_alpha, cos_alpha, phi, &wc_x, &wc_y, &-wc);
        let p_world = p_center + Vector3f::new(n_world.x, n_world.y, n_world.z) * self.radius;

        let mut n = Normal3f::from(n_world);
        if self.reverse_orientation {
            n = -n;
        }
        let p_error = gamma(5) * Vector3f::from(p_world).abs();
        let it = Interaction::new(p_world, p_error, Vector3f::new(0.0, 0.0, 0.0), n);
        (it, uniform_cone_pdf(cos_theta_max))
    }

    fn pdf_from(&self, re: &Interaction, wi: &Vector3f) -> f32 {
        let p_center = self.center();
        if distance_squared(&re.p, &p_center) <= self.radius * self.radius {
            // Inside: area-sampling pdf through the default conversion
            let ray = re.spawn_ray(wi);
            return match self.intersect(&ray) {
                Some((isect, _)) => {
                    let d2 = distance_squared(&re.p, &isect.hit.p);
                    let cos = isect.hit.n.dotv(&-(*wi)).abs();
                    if cos == 0.0 {
                        0.0
                    } else {
                        d2 / (cos * self.area())
                    }
                }
                None => 0.0,
            };
        }
        let sin_theta_max2 = self.radius * self.radius / distance_squared(&re.p, &p_center);
        let cos_theta_max = (1.0 - sin_theta_max2).max(0.0).sqrt();
        // Only directions inside the cone can hit the sphere
        let wc = (p_center - re.p).normalize();
        if wc.dot(wi) < cos_theta_max {
            0.0
        } else {
            uniform_cone_pdf(cos_theta_max)
        }
    }

    fn reverse_orientation(&self) -> bool {
        self.reverse_orientation
    }

    fn transform_swaps_handedness(&self) -> bool {
        self.object_to_world.swaps_handedness()
    }
}

/// Bring an object-space interaction into world space.
pub(crate) fn transform_interaction<'p, 'a>(
    t: &Transform,
    mut si: SurfaceInteraction<'p, 'a>,
) -> SurfaceInteraction<'p, 'a> {
    let (p, p_error) = t.transform_point_propagate_error(&si.hit.p, &si.hit.p_error);
    si.hit.p = p;
    si.hit.p_error = p_error;
    si.hit.wo = t.transform_vector(&si.hit.wo).normalize();
    si.hit.n = t.transform_normal(&si.hit.n).normalize();
    si.dpdu = t.transform_vector(&si.dpdu);
    si.dpdv = t.transform_vector(&si.dpdv);
    si.dndu = t.transform_normal(&si.dndu);
    si.dndv = t.transform_normal(&si.dndv);
    si.shading.n = t.transform_normal(&si.shading.n).normalize();
    si.shading.dpdu = t.transform_vector(&si.shading.dpdu);
    si.shading.dpdv = t.transform_vector(&si.shading.dpdv);
    si.shading.dndu = t.transform_normal(&si.shading.dndu);
    si.shading.dndv = t.transform_normal(&si.shading.dndv);
    si.shading.n = crate::geometry::face_forward_n(&si.shading.n, &si.hit.n);
    si
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_unit_sphere() {
        let s = Sphere::new(Transform::default(), 1.0, false);
        let r = Ray::new(Point3f::new(0.0, 0.0, -3.0), Vector3f::new(0.0, 0.0, 1.0));
        let (isect, t) = s.intersect(&r).expect("should hit");
        assert!((t - 2.0).abs() < 1e-4);
        assert!((isect.hit.p.z + 1.0).abs() < 1e-4);
        // Normal points back toward the ray origin
        assert!(isect.hit.n.z < 0.0);
        assert!(s.intersect_p(&r));
    }

    #[test]
    fn test_miss() {
        let s = Sphere::new(Transform::default(), 1.0, false);
        let r = Ray::new(Point3f::new(0.0, 2.0, -3.0), Vector3f::new(0.0, 0.0, 1.0));
        assert!(s.intersect(&r).is_none());
        assert!(!s.intersect_p(&r));
    }

    #[test]
    fn test_translated() {
        let t = Transform::translate(&Vector3f::new(5.0, 0.0, 0.0));
        let s = Sphere::new(t, 2.0, false);
        let r = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vector3f::new(1.0, 0.0, 0.0));
        let (isect, t_hit) = s.intersect(&r).expect("should hit");
        assert!((t_hit - 3.0).abs() < 1e-3);
        assert!((isect.hit.p.x - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_cone_pdf_consistency() {
        let s = Sphere::new(Transform::default(), 1.0, false);
        let re = Interaction::from_point(&Point3f::new(0.0, 0.0, 5.0));
        let mut rng = crate::rng::Rng::with_sequence(12);
        for _ in 0..50 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let (it, pdf) = s.sample_from(&re, u);
            let wi = (it.p - re.p).normalize();
            let pdf2 = s.pdf_from(&re, &wi);
            assert!(pdf > 0.0);
            assert!(
                (pdf - pdf2).abs() / pdf < 1e-2,
                "pdf {} vs {}",
                pdf,
                pdf2
            );
        }
    }

    #[test]
    fn test_area() {
        let s = Sphere::new(Transform::default(), 2.0, false);
        assert!((s.area() - 16.0 * PI).abs() < 1e-4);
    }
}
