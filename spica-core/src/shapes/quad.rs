use super::Shape;
use crate::bounds::Bounds3f;
use crate::interaction::{Interaction, SurfaceInteraction};
use crate::ray::Ray;
use crate::{gamma, Normal3f, Point2f, Point3f, Vector3f};

/// Planar parallelogram: p(u, v) = origin + u*edge_u + v*edge_v with
/// (u, v) in [0,1]^2. The workhorse for box-like scene geometry.
#[derive(Debug)]
pub struct Quad {
    origin: Point3f,
    edge_u: Vector3f,
    edge_v: Vector3f,
    normal: Normal3f,
    reverse_orientation: bool,
}

impl Quad {
    pub fn new(origin: Point3f, edge_u: Vector3f, edge_v: Vector3f) -> Quad {
        Quad::with_orientation(origin, edge_u, edge_v, false)
    }

    pub fn with_orientation(
        origin: Point3f,
        edge_u: Vector3f,
        edge_v: Vector3f,
        reverse_orientation: bool,
    ) -> Quad {
        let mut normal = Normal3f::from(edge_u.cross(&edge_v).normalize());
        if reverse_orientation {
            normal = -normal;
        }
        Quad {
            origin,
            edge_u,
            edge_v,
            normal,
            reverse_orientation,
        }
    }

    /// Plane hit plus the parallelogram parameter test.
    fn hit(&self, ray: &Ray) -> Option<(f32, f32, f32)> {
        let n = Vector3f::from(self.normal);
        let denom = ray.d.dot(&n);
        if denom.abs() < 1e-9 {
            return None;
        }
        let t = (self.origin - ray.o).dot(&n) / denom;
        if t <= 1e-5 || t >= ray.t_max {
            return None;
        }
        let p = ray.at(t);
        let d = p - self.origin;
        // Solve d = u*eu + v*ev in the plane basis
        let uu = self.edge_u.dot(&self.edge_u);
        let uv = self.edge_u.dot(&self.edge_v);
        let vv = self.edge_v.dot(&self.edge_v);
        let du = d.dot(&self.edge_u);
        let dv = d.dot(&self.edge_v);
        let det = uu * vv - uv * uv;
        if det.abs() < 1e-12 {
            return None;
        }
        let u = (vv * du - uv * dv) / det;
        let v = (uu * dv - uv * du) / det;
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return None;
        }
        Some((t, u, v))
    }
}

impl Shape for Quad {
    fn object_bounds(&self) -> Bounds3f {
        self.world_bounds()
    }

    fn world_bounds(&self) -> Bounds3f {
        let mut b = Bounds3f::from_point(&self.origin);
        b.extend(&(self.origin + self.edge_u));
        b.extend(&(self.origin + self.edge_v));
        b.extend(&(self.origin + self.edge_u + self.edge_v));
        b
    }

    fn intersect(&self, ray: &Ray) -> Option<(SurfaceInteraction<'_, '_>, f32)> {
        let (t, u, v) = self.hit(ray)?;
        let p_hit = self.origin + self.edge_u * u + self.edge_v * v;
        let p_error = gamma(6) * Vector3f::from(p_hit).abs();

        let mut isect = SurfaceInteraction::new(
            p_hit,
            p_error,
            Point2f::new(u, v),
            -ray.d,
            self.edge_u,
            self.edge_v,
            Normal3f::new(0.0, 0.0, 0.0),
            Normal3f::new(0.0, 0.0, 0.0),
            self,
        );
        isect.hit.n = self.normal;
        isect.shading.n = self.normal;
        Some((isect, t))
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.hit(ray).is_some()
    }

    fn area(&self) -> f32 {
        self.edge_u.cross(&self.edge_v).length()
    }

    fn sample(&self, u: Point2f) -> (Interaction, f32) {
        let p = self.origin + self.edge_u * u.x + self.edge_v * u.y;
        let p_error = gamma(6) * Vector3f::from(p).abs();
        (
            Interaction::new(p, p_error, Vector3f::new(0.0, 0.0, 0.0), self.normal),
            1.0 / self.area(),
        )
    }

    fn reverse_orientation(&self) -> bool {
        self.reverse_orientation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> Quad {
        Quad::new(
            Point3f::new(0.0, 0.0, 0.0),
            Vector3f::new(1.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn test_hit_inside() {
        let q = unit_quad();
        let r = Ray::new(Point3f::new(0.3, 0.8, 2.0), Vector3f::new(0.0, 0.0, -1.0));
        let (isect, t) = q.intersect(&r).expect("hit");
        assert!((t - 2.0).abs() < 1e-5);
        assert!((isect.uv.x - 0.3).abs() < 1e-5);
        assert!((isect.uv.y - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_miss_outside() {
        let q = unit_quad();
        let r = Ray::new(Point3f::new(1.3, 0.8, 2.0), Vector3f::new(0.0, 0.0, -1.0));
        assert!(q.intersect(&r).is_none());
    }

    #[test]
    fn test_area_skewed() {
        let q = Quad::new(
            Point3f::new(0.0, 0.0, 0.0),
            Vector3f::new(2.0, 0.0, 0.0),
            Vector3f::new(1.0, 3.0, 0.0),
        );
        assert!((q.area() - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_sample_on_surface() {
        let q = unit_quad();
        let (it, pdf) = q.sample(Point2f::new(0.25, 0.5));
        assert_eq!(it.p, Point3f::new(0.25, 0.5, 0.0));
        assert!((pdf - 1.0).abs() < 1e-6);
    }
}
