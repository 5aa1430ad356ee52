use std::sync::Arc;

use super::Shape;
use crate::bounds::Bounds3f;
use crate::interaction::{Interaction, SurfaceInteraction};
use crate::ray::Ray;
use crate::sampling::uniform_sample_triangle;
use crate::transform::Transform;
use crate::{
    gamma, max_component, max_dimension, permute_p, permute_v, Normal3f, Point2f, Point3f,
    Vector3f,
};

/// Shared vertex data for a set of triangles. Vertices are stored in world
/// space so the per-ray transform work disappears.
#[derive(Debug)]
pub struct TriangleMesh {
    pub indices: Vec<usize>,
    pub positions: Vec<Point3f>,
    pub normals: Option<Vec<Normal3f>>,
    pub uvs: Option<Vec<Point2f>>,
    reverse_orientation: bool,
    transform_swaps_handedness: bool,
}

impl TriangleMesh {
    pub fn new(
        object_to_world: &Transform,
        indices: Vec<usize>,
        positions: Vec<Point3f>,
        normals: Option<Vec<Normal3f>>,
        uvs: Option<Vec<Point2f>>,
        reverse_orientation: bool,
    ) -> TriangleMesh {
        assert_eq!(indices.len() % 3, 0);
        let positions = positions
            .iter()
            .map(|p| object_to_world.transform_point(p))
            .collect();
        let normals = normals.map(|ns| {
            ns.iter()
                .map(|n| object_to_world.transform_normal(n).normalize())
                .collect()
        });
        TriangleMesh {
            indices,
            positions,
            normals,
            uvs,
            reverse_orientation,
            transform_swaps_handedness: object_to_world.swaps_handedness(),
        }
    }

    pub fn n_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Instantiate one `Triangle` shape per face of the mesh.
    pub fn to_triangles(mesh: Arc<TriangleMesh>) -> Vec<Arc<dyn Shape>> {
        (0..mesh.n_triangles())
            .map(|i| Arc::new(Triangle::new(Arc::clone(&mesh), i)) as Arc<dyn Shape>)
            .collect()
    }
}

/// One face of a `TriangleMesh`.
#[derive(Debug, Clone)]
pub struct Triangle {
    mesh: Arc<TriangleMesh>,
    index: usize,
}

impl Triangle {
    pub fn new(mesh: Arc<TriangleMesh>, index: usize) -> Triangle {
        Triangle { mesh, index }
    }

    fn vertices(&self) -> (Point3f, Point3f, Point3f) {
        let i = 3 * self.index;
        (
            self.mesh.positions[self.mesh.indices[i]],
            self.mesh.positions[self.mesh.indices[i + 1]],
            self.mesh.positions[self.mesh.indices[i + 2]],
        )
    }

    fn uvs(&self) -> [Point2f; 3] {
        match self.mesh.uvs {
            Some(ref uvs) => {
                let i = 3 * self.index;
                [
                    uvs[self.mesh.indices[i]],
                    uvs[self.mesh.indices[i + 1]],
                    uvs[self.mesh.indices[i + 2]],
                ]
            }
            None => [
                Point2f::new(0.0, 0.0),
                Point2f::new(1.0, 0.0),
                Point2f::new(1.0, 1.0),
            ],
        }
    }

    /// Watertight ray/triangle test. Returns (t, b0, b1, b2) on a hit.
    fn intersect_coords(&self, ray: &Ray) -> Option<(f32, f32, f32, f32)> {
        let (p0, p1, p2) = self.vertices();

        // Translate to ray origin and permute so the dominant direction
        // component lands on z
        let mut p0t = p0 - Vector3f::from(ray.o);
        let mut p1t = p1 - Vector3f::from(ray.o);
        let mut p2t = p2 - Vector3f::from(ray.o);
        let kz = max_dimension(&ray.d.abs());
        let kx = (kz + 1) % 3;
        let ky = (kx + 1) % 3;
        let d = permute_v(&ray.d, kx, ky, kz);
        p0t = permute_p(&p0t, kx, ky, kz);
        p1t = permute_p(&p1t, kx, ky, kz);
        p2t = permute_p(&p2t, kx, ky, kz);

        // Shear to align the ray with +z
        let sx = -d.x / d.z;
        let sy = -d.y / d.z;
        let sz = 1.0 / d.z;
        p0t.x += sx * p0t.z;
        p0t.y += sy * p0t.z;
        p1t.x += sx * p1t.z;
        p1t.y += sy * p1t.z;
        p2t.x += sx * p2t.z;
        p2t.y += sy * p2t.z;

        // Signed edge functions, recomputed in double precision when the
        // single-precision result is ambiguous
        let mut e0 = p1t.x * p2t.y - p1t.y * p2t.x;
        let mut e1 = p2t.x * p0t.y - p2t.y * p0t.x;
        let mut e2 = p0t.x * p1t.y - p0t.y * p1t.x;
        if e0 == 0.0 || e1 == 0.0 || e2 == 0.0 {
            e0 = (f64::from(p1t.x) * f64::from(p2t.y) - f64::from(p1t.y) * f64::from(p2t.x)) as f32;
            e1 = (f64::from(p2t.x) * f64::from(p0t.y) - f64::from(p2t.y) * f64::from(p0t.x)) as f32;
            e2 = (f64::from(p0t.x) * f64::from(p1t.y) - f64::from(p0t.y) * f64::from(p1t.x)) as f32;
        }

        if (e0 < 0.0 || e1 < 0.0 || e2 < 0.0) && (e0 > 0.0 || e1 > 0.0 || e2 > 0.0) {
            return None;
        }
        let det = e0 + e1 + e2;
        if det == 0.0 {
            return None;
        }

        // Scaled hit distance and depth test
        p0t.z *= sz;
        p1t.z *= sz;
        p2t.z *= sz;
        let t_scaled = e0 * p0t.z + e1 * p1t.z + e2 * p2t.z;
        if det < 0.0 && (t_scaled >= 0.0 || t_scaled < ray.t_max * det) {
            return None;
        }
        if det > 0.0 && (t_scaled <= 0.0 || t_scaled > ray.t_max * det) {
            return None;
        }

        let inv_det = 1.0 / det;
        let b0 = e0 * inv_det;
        let b1 = e1 * inv_det;
        let b2 = e2 * inv_det;
        let t = t_scaled * inv_det;

        // Conservative bound to reject hits closer than the accumulated
        // floating point error
        let max_zt = max_component(&Vector3f::new(p0t.z, p1t.z, p2t.z).abs());
        let delta_z = gamma(3) * max_zt;
        let max_xt = max_component(&Vector3f::new(p0t.x, p1t.x, p2t.x).abs());
        let max_yt = max_component(&Vector3f::new(p0t.y, p1t.y, p2t.y).abs());
        let delta_x = gamma(5) * (max_xt + max_zt);
        let delta_y = gamma(5) * (max_yt + max_zt);
        let delta_e = 2.0 * (gamma(2) * max_xt * max_yt + delta_y * max_xt + delta_x * max_yt);
        let max_e = max_component(&Vector3f::new(e0, e1, e2).abs());
        let delta_t =
            3.0 * (gamma(3) * max_e * max_zt + delta_e * max_zt + delta_z * max_e) * inv_det.abs();
        if t <= delta_t {
            return None;
        }

        Some((t, b0, b1, b2))
    }
}

impl Shape for Triangle {
    fn object_bounds(&self) -> Bounds3f {
        // Vertices already live in world space
        self.world_bounds()
    }

    fn world_bounds(&self) -> Bounds3f {
        let (p0, p1, p2) = self.vertices();
        Bounds3f::union_point(&Bounds3f::from_points(&p0, &p1), &p2)
    }

    fn intersect(&self, ray: &Ray) -> Option<(SurfaceInteraction<'_, '_>, f32)> {
        let (t, b0, b1, b2) = self.intersect_coords(ray)?;
        let (p0, p1, p2) = self.vertices();
        let uv = self.uvs();

        // Partial derivatives from the UV parameterization
        let duv02 = uv[0] - uv[2];
        let duv12 = uv[1] - uv[2];
        let dp02 = p0 - p2;
        let dp12 = p1 - p2;
        let determinant = duv02[0] * duv12[1] - duv02[1] * duv12[0];
        let (dpdu, dpdv) = if determinant.abs() < 1e-8 {
            let ng = (p2 - p0).cross(&(p1 - p0)).normalize();
            let (u, v) = crate::coordinate_system(&ng);
            (u, v)
        } else {
            let invdet = 1.0 / determinant;
            (
                (dp02 * duv12[1] - dp12 * duv02[1]) * invdet,
                (dp02 * (-duv12[0]) + dp12 * duv02[0]) * invdet,
            )
        };

        let p_hit = Point3f::from(
            Vector3f::from(p0) * b0 + Vector3f::from(p1) * b1 + Vector3f::from(p2) * b2,
        );
        let uv_hit = Point2f::new(
            b0 * uv[0].x + b1 * uv[1].x + b2 * uv[2].x,
            b0 * uv[0].y + b1 * uv[1].y + b2 * uv[2].y,
        );

        let x_abs_sum = (b0 * p0.x).abs() + (b1 * p1.x).abs() + (b2 * p2.x).abs();
        let y_abs_sum = (b0 * p0.y).abs() + (b1 * p1.y).abs() + (b2 * p2.y).abs();
        let z_abs_sum = (b0 * p0.z).abs() + (b1 * p1.z).abs() + (b2 * p2.z).abs();
        let p_error = gamma(7) * Vector3f::new(x_abs_sum, y_abs_sum, z_abs_sum);

        let mut isect = SurfaceInteraction::new(
            p_hit,
            p_error,
            uv_hit,
            -ray.d,
            dpdu,
            dpdv,
            Normal3f::new(0.0, 0.0, 0.0),
            Normal3f::new(0.0, 0.0, 0.0),
            self,
        );
        // The geometric normal from the winding is more reliable than the
        // one derived from the UV gradients
        let ng = Normal3f::from(dp02.cross(&dp12).normalize());
        isect.hit.n = if self.mesh.reverse_orientation ^ self.mesh.transform_swaps_handedness {
            -ng
        } else {
            ng
        };
        isect.shading.n = isect.hit.n;

        // Interpolated shading normal, if the mesh carries vertex normals
        if let Some(ref normals) = self.mesh.normals {
            let i = 3 * self.index;
            let ns = normals[self.mesh.indices[i]] * b0
                + normals[self.mesh.indices[i + 1]] * b1
                + normals[self.mesh.indices[i + 2]] * b2;
            if ns.length_squared() > 0.0 {
                let ns = ns.normalize();
                // Solve for shading tangents consistent with ns
                let ss = isect.dpdu.normalize();
                let ts = Vector3f::from(ns).cross(&ss);
                let (ss, ts) = if ts.length_squared() > 0.0 {
                    let ts = ts.normalize();
                    (ts.cross(&Vector3f::from(ns)), ts)
                } else {
                    crate::coordinate_system(&Vector3f::from(ns))
                };
                // Normal derivatives across the face
                let dn02 = normals[self.mesh.indices[i]] - normals[self.mesh.indices[i + 2]];
                let dn12 = normals[self.mesh.indices[i + 1]] - normals[self.mesh.indices[i + 2]];
                let (dndu, dndv) = if determinant.abs() < 1e-8 {
                    (Normal3f::new(0.0, 0.0, 0.0), Normal3f::new(0.0, 0.0, 0.0))
                } else {
                    let invdet = 1.0 / determinant;
                    (
                        (dn02 * duv12[1] - dn12 * duv02[1]) * invdet,
                        (dn02 * (-duv12[0]) + dn12 * duv02[0]) * invdet,
                    )
                };
                isect.set_shading_geometry(&ss, &ts, &dndu, &dndv, true);
                isect.shading.n = ns;
                isect.hit.n = crate::geometry::face_forward_n(&isect.hit.n, &isect.shading.n);
            }
        }

        Some((isect, t))
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        self.intersect_coords(ray).is_some()
    }

    fn area(&self) -> f32 {
        let (p0, p1, p2) = self.vertices();
        0.5 * (p1 - p0).cross(&(p2 - p0)).length()
    }

    fn sample(&self, u: Point2f) -> (Interaction, f32) {
        let b = uniform_sample_triangle(u);
        let (p0, p1, p2) = self.vertices();
        let p = Point3f::from(
            Vector3f::from(p0) * b[0]
                + Vector3f::from(p1) * b[1]
                + Vector3f::from(p2) * (1.0 - b[0] - b[1]),
        );
        let mut n = Normal3f::from((p1 - p0).cross(&(p2 - p0)).normalize());
        if let Some(ref normals) = self.mesh.normals {
            let i = 3 * self.index;
            let ns = normals[self.mesh.indices[i]] * b[0]
                + normals[self.mesh.indices[i + 1]] * b[1]
                + normals[self.mesh.indices[i + 2]] * (1.0 - b[0] - b[1]);
            n = crate::geometry::face_forward_n(&n, &ns);
        } else if self.mesh.reverse_orientation ^ self.mesh.transform_swaps_handedness {
            n = -n;
        }

        let x_abs_sum = (b[0] * p0.x).abs() + (b[1] * p1.x).abs() + ((1.0 - b[0] - b[1]) * p2.x).abs();
        let y_abs_sum = (b[0] * p0.y).abs() + (b[1] * p1.y).abs() + ((1.0 - b[0] - b[1]) * p2.y).abs();
        let z_abs_sum = (b[0] * p0.z).abs() + (b[1] * p1.z).abs() + ((1.0 - b[0] - b[1]) * p2.z).abs();
        let p_error = gamma(6) * Vector3f::new(x_abs_sum, y_abs_sum, z_abs_sum);

        let it = Interaction::new(p, p_error, Vector3f::new(0.0, 0.0, 0.0), n);
        (it, 1.0 / self.area())
    }

    fn reverse_orientation(&self) -> bool {
        self.mesh.reverse_orientation
    }

    fn transform_swaps_handedness(&self) -> bool {
        self.mesh.transform_swaps_handedness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> (Arc<TriangleMesh>, Triangle) {
        let mesh = Arc::new(TriangleMesh::new(
            &Transform::default(),
            vec![0, 1, 2],
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            None,
            None,
            false,
        ));
        let tri = Triangle::new(Arc::clone(&mesh), 0);
        (mesh, tri)
    }

    #[test]
    fn test_hit_and_barycentric_position() {
        let (_m, tri) = unit_triangle();
        let r = Ray::new(Point3f::new(0.25, 0.25, 1.0), Vector3f::new(0.0, 0.0, -1.0));
        let (isect, t) = tri.intersect(&r).expect("hit");
        assert!((t - 1.0).abs() < 1e-5);
        assert!((isect.hit.p.x - 0.25).abs() < 1e-5);
        assert!((isect.hit.p.y - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_miss_outside() {
        let (_m, tri) = unit_triangle();
        let r = Ray::new(Point3f::new(0.9, 0.9, 1.0), Vector3f::new(0.0, 0.0, -1.0));
        assert!(tri.intersect(&r).is_none());
    }

    #[test]
    fn test_parallel_ray_misses() {
        let (_m, tri) = unit_triangle();
        let r = Ray::new(Point3f::new(-1.0, 0.2, 0.5), Vector3f::new(1.0, 0.0, 0.0));
        assert!(tri.intersect(&r).is_none());
    }

    #[test]
    fn test_area_and_sampling() {
        let (_m, tri) = unit_triangle();
        assert!((tri.area() - 0.5).abs() < 1e-6);
        let mut rng = crate::rng::Rng::with_sequence(8);
        for _ in 0..100 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let (it, pdf) = tri.sample(u);
            assert!((pdf - 2.0).abs() < 1e-5);
            assert!(it.p.x >= -1e-6 && it.p.y >= -1e-6);
            assert!(it.p.x + it.p.y <= 1.0 + 1e-5);
        }
    }
}
