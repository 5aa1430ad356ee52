use std::f32::consts::PI;

use parking_lot::RwLock;

use crate::geometry::{coordinate_system, spherical_phi, spherical_theta};
use crate::interaction::Interaction;
use crate::light::{Light, LightFlags, VisibilityTester};
use crate::ray::Ray;
use crate::sampling::{concentric_sample_disk, Distribution2D};
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::transform::Transform;
use crate::{clamp, Normal3f, Point2f, Point3f, Vector3f, INV_2_PI, INV_PI};

/// Environment light: an equirectangular radiance map on the sphere at
/// infinity, importance-sampled through a luminance-weighted 2D
/// distribution.
#[derive(Debug)]
pub struct InfiniteAreaLight {
    id: u32,
    light_to_world: Transform,
    world_to_light: Transform,
    width: usize,
    height: usize,
    texels: Vec<Spectrum>,
    distribution: Distribution2D,
    world_center: RwLock<Point3f>,
    world_radius: RwLock<f32>,
}

impl InfiniteAreaLight {
    pub fn new(
        light_to_world: Transform,
        width: usize,
        height: usize,
        texels: Vec<Spectrum>,
    ) -> InfiniteAreaLight {
        assert_eq!(texels.len(), width * height);
        // Importance function over (u, v), weighted by sin(theta) so the
        // measure matches the sphere
        let mut img = Vec::with_capacity(width * height);
        for v in 0..height {
            let sin_theta = (PI * (v as f32 + 0.5) / height as f32).sin();
            for u in 0..width {
                img.push(texels[v * width + u].y() * sin_theta);
            }
        }
        let distribution = Distribution2D::new(&img[..], width, height);

        InfiniteAreaLight {
            id: super::next_light_id(),
            world_to_light: light_to_world.inverse(),
            light_to_world,
            width,
            height,
            texels,
            distribution,
            world_center: RwLock::new(Point3f::new(0.0, 0.0, 0.0)),
            world_radius: RwLock::new(1.0),
        }
    }

    /// Uniform environment of the given radiance.
    pub fn constant(radiance: Spectrum) -> InfiniteAreaLight {
        InfiniteAreaLight::new(Transform::default(), 1, 1, vec![radiance])
    }

    fn lookup(&self, st: Point2f) -> Spectrum {
        let x = clamp((st.x * self.width as f32) as usize, 0, self.width - 1);
        let y = clamp((st.y * self.height as f32) as usize, 0, self.height - 1);
        self.texels[y * self.width + x]
    }
}

impl Light for InfiniteAreaLight {
    fn id(&self) -> u32 {
        self.id
    }

    fn preprocess(&self, scene: &Scene) {
        let (center, radius) = scene.world_bounds().bounding_sphere();
        *self.world_center.write() = center;
        *self.world_radius.write() = radius.max(1e-2);
    }

    fn sample_li(
        &self,
        re: &Interaction,
        u: Point2f,
    ) -> (Spectrum, Vector3f, f32, VisibilityTester) {
        let (uv, map_pdf) = self.distribution.sample_continuous(&u);
        if map_pdf == 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 1.0),
                0.0,
                VisibilityTester::new(*re, *re),
            );
        }
        let theta = uv[1] * PI;
        let phi = uv[0] * 2.0 * PI;
        let (sin_theta, cos_theta) = theta.sin_cos();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let wi = self.light_to_world.transform_vector(&Vector3f::new(
            sin_theta * cos_phi,
            sin_theta * sin_phi,
            cos_theta,
        ));
        let pdf = if sin_theta == 0.0 {
            0.0
        } else {
            map_pdf / (2.0 * PI * PI * sin_theta)
        };
        let world_radius = *self.world_radius.read();
        let target = re.p + wi * (2.0 * world_radius);
        let vis = VisibilityTester::new(*re, Interaction::from_point(&target));
        (self.lookup(uv), wi, pdf, vis)
    }

    fn pdf_li(&self, _re: &Interaction, w: &Vector3f) -> f32 {
        let wi = self.world_to_light.transform_vector(w).normalize();
        let theta = spherical_theta(&wi);
        let phi = spherical_phi(&wi);
        let sin_theta = theta.sin();
        if sin_theta == 0.0 {
            return 0.0;
        }
        self.distribution
            .pdf(&Point2f::new(phi * INV_2_PI, theta * INV_PI))
            / (2.0 * PI * PI * sin_theta)
    }

    fn sample_le(&self, u1: Point2f, u2: Point2f) -> (Ray, Normal3f, f32, f32, Spectrum) {
        // Direction toward the scene is the negated env-map direction
        let (uv, map_pdf) = self.distribution.sample_continuous(&u1);
        if map_pdf == 0.0 {
            let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vector3f::new(0.0, 0.0, 1.0));
            return (ray, Normal3f::new(0.0, 0.0, 1.0), 0.0, 0.0, Spectrum::black());
        }
        let theta = uv[1] * PI;
        let phi = uv[0] * 2.0 * PI;
        let (sin_theta, cos_theta) = theta.sin_cos();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let d = -self.light_to_world.transform_vector(&Vector3f::new(
            sin_theta * cos_phi,
            sin_theta * sin_phi,
            cos_theta,
        ));

        // Pick a starting point on a world-sized disk perpendicular to d
        let world_center = *self.world_center.read();
        let world_radius = *self.world_radius.read();
        let (v1, v2) = coordinate_system(&(-d));
        let cd = concentric_sample_disk(u2);
        let p_disk = world_center + world_radius * (v1 * cd.x + v2 * cd.y);
        let origin = p_disk + (-d) * world_radius;
        let ray = Ray::new(origin, d);

        let pdf_dir = if sin_theta == 0.0 {
            0.0
        } else {
            map_pdf / (2.0 * PI * PI * sin_theta)
        };
        let pdf_pos = 1.0 / (PI * world_radius * world_radius);
        (ray, Normal3f::from(d), pdf_pos, pdf_dir, self.lookup(uv))
    }

    fn pdf_le(&self, ray: &Ray, _n_light: &Normal3f) -> (f32, f32) {
        let d = -ray.d;
        let wi = self.world_to_light.transform_vector(&d).normalize();
        let theta = spherical_theta(&wi);
        let phi = spherical_phi(&wi);
        let sin_theta = theta.sin();
        let world_radius = *self.world_radius.read();
        let pdf_dir = if sin_theta == 0.0 {
            0.0
        } else {
            self.distribution
                .pdf(&Point2f::new(phi * INV_2_PI, theta * INV_PI))
                / (2.0 * PI * PI * sin_theta)
        };
        (1.0 / (PI * world_radius * world_radius), pdf_dir)
    }

    fn power(&self) -> Spectrum {
        let world_radius = *self.world_radius.read();
        let mean = self
            .texels
            .iter()
            .fold(Spectrum::black(), |acc, t| acc + *t)
            / self.texels.len() as f32;
        PI * world_radius * world_radius * mean
    }

    fn flags(&self) -> LightFlags {
        LightFlags::INFINITE
    }

    fn le(&self, ray: &Ray) -> Spectrum {
        let w = self.world_to_light.transform_vector(&ray.d).normalize();
        let st = Point2f::new(spherical_phi(&w) * INV_2_PI, spherical_theta(&w) * INV_PI);
        self.lookup(st)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_le() {
        let l = InfiniteAreaLight::constant(Spectrum::grey(0.7));
        let r = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vector3f::new(0.3, 0.6, -0.8).normalize());
        assert!((l.le(&r).g - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_sample_pdf_consistency() {
        // A 4x2 map with a bright strip: sampled directions must report the
        // same pdf through pdf_li.
        let mut texels = vec![Spectrum::grey(0.1); 8];
        texels[5] = Spectrum::grey(10.0);
        let l = InfiniteAreaLight::new(Transform::default(), 4, 2, texels);
        let re = Interaction::from_point(&Point3f::new(0.0, 0.0, 0.0));
        let mut rng = crate::rng::Rng::with_sequence(31);
        for _ in 0..100 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let (_li, wi, pdf, _vis) = l.sample_li(&re, u);
            if pdf > 0.0 {
                let pdf2 = l.pdf_li(&re, &wi);
                assert!(
                    (pdf - pdf2).abs() / pdf < 0.05,
                    "pdf {} vs {}",
                    pdf,
                    pdf2
                );
            }
        }
    }
}
