use std::f32::consts::PI;
use std::sync::Arc;

use crate::geometry::coordinate_system;
use crate::interaction::Interaction;
use crate::light::{AreaLight, Light, LightFlags, VisibilityTester};
use crate::ray::Ray;
use crate::sampling::{cosine_hemisphere_pdf, cosine_sample_hemisphere};
use crate::shapes::Shape;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Vector3f};

/// Area light emitting constant radiance from one (or both) sides of a
/// shape.
#[derive(Debug)]
pub struct DiffuseAreaLight {
    id: u32,
    l_emit: Spectrum,
    shape: Arc<dyn Shape>,
    two_sided: bool,
    area: f32,
}

impl DiffuseAreaLight {
    pub fn new(l_emit: Spectrum, shape: Arc<dyn Shape>, two_sided: bool) -> DiffuseAreaLight {
        let area = shape.area();
        DiffuseAreaLight {
            id: super::next_light_id(),
            l_emit,
            shape,
            two_sided,
            area,
        }
    }
}

impl Light for DiffuseAreaLight {
    fn id(&self) -> u32 {
        self.id
    }

    fn sample_li(
        &self,
        re: &Interaction,
        u: Point2f,
    ) -> (Spectrum, Vector3f, f32, VisibilityTester) {
        let (p_shape, pdf) = self.shape.sample_from(re, u);
        if pdf == 0.0 || (p_shape.p - re.p).length_squared() == 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 1.0),
                0.0,
                VisibilityTester::new(*re, p_shape),
            );
        }
        let wi = (p_shape.p - re.p).normalize();
        let vis = VisibilityTester::new(*re, p_shape);

        (self.l(&p_shape, &-wi), wi, pdf, vis)
    }

    fn pdf_li(&self, re: &Interaction, wi: &Vector3f) -> f32 {
        self.shape.pdf_from(re, wi)
    }

    fn sample_le(&self, u1: Point2f, u2: Point2f) -> (Ray, Normal3f, f32, f32, Spectrum) {
        let (p_shape, pdf_pos) = self.shape.sample(u1);
        let mut n = p_shape.n;

        // Cosine-sample the outgoing direction around the surface normal;
        // for two-sided lights pick a side first.
        let mut u2 = u2;
        let mut w_local = if self.two_sided {
            if u2.x < 0.5 {
                u2.x = (u2.x * 2.0).min(crate::ONE_MINUS_EPSILON);
                cosine_sample_hemisphere(u2)
            } else {
                u2.x = ((u2.x - 0.5) * 2.0).min(crate::ONE_MINUS_EPSILON);
                let mut w = cosine_sample_hemisphere(u2);
                w.z *= -1.0;
                w
            }
        } else {
            cosine_sample_hemisphere(u2)
        };

        let pdf_dir = if self.two_sided {
            0.5 * cosine_hemisphere_pdf(w_local.z.abs())
        } else {
            cosine_hemisphere_pdf(w_local.z)
        };
        if pdf_dir == 0.0 {
            w_local.z = 1e-4;
        }

        let nv = Vector3f::from(n);
        let (v1, v2) = coordinate_system(&nv);
        let w = v1 * w_local.x + v2 * w_local.y + nv * w_local.z;
        if self.two_sided && w_local.z < 0.0 {
            n = -n;
        }
        let ray = p_shape.spawn_ray(&w);
        (ray, n, pdf_pos, pdf_dir.max(1e-9), self.l(&p_shape, &w))
    }

    fn pdf_le(&self, ray: &Ray, n_light: &Normal3f) -> (f32, f32) {
        let pdf_pos = 1.0 / self.area;
        let cos = n_light.dotv(&ray.d);
        let pdf_dir = if self.two_sided {
            0.5 * cosine_hemisphere_pdf(cos.abs())
        } else if cos > 0.0 {
            cosine_hemisphere_pdf(cos)
        } else {
            0.0
        };
        (pdf_pos, pdf_dir)
    }

    fn power(&self) -> Spectrum {
        let factor = if self.two_sided { 2.0 } else { 1.0 };
        factor * self.l_emit * PI * self.area
    }

    fn flags(&self) -> LightFlags {
        LightFlags::AREA
    }
}

impl AreaLight for DiffuseAreaLight {
    fn l(&self, it: &Interaction, w: &Vector3f) -> Spectrum {
        if self.two_sided || it.n.dotv(w) > 0.0 {
            self.l_emit
        } else {
            Spectrum::black()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::Quad;
    use crate::Point3f;

    fn quad_light() -> DiffuseAreaLight {
        let quad = Arc::new(Quad::new(
            Point3f::new(-1.0, -1.0, 2.0),
            Vector3f::new(2.0, 0.0, 0.0),
            Vector3f::new(0.0, 2.0, 0.0),
        ));
        DiffuseAreaLight::new(Spectrum::grey(5.0), quad, false)
    }

    #[test]
    fn test_power() {
        let l = quad_light();
        // L * pi * area = 5 * pi * 4
        assert!((l.power().r - 5.0 * PI * 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_sample_li_pdf_matches_query() {
        let l = quad_light();
        let re = Interaction::from_point(&Point3f::new(0.0, 0.0, 0.0));
        let mut rng = crate::rng::Rng::with_sequence(21);
        for _ in 0..50 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let (li, wi, pdf, _vis) = l.sample_li(&re, u);
            if pdf > 0.0 {
                // Light faces -z so the emission toward the origin is seen
                assert!(!li.is_black());
                let pdf2 = l.pdf_li(&re, &wi);
                assert!((pdf - pdf2).abs() / pdf < 1e-2, "{} vs {}", pdf, pdf2);
            }
        }
    }

    #[test]
    fn test_one_sided_emission() {
        let l = quad_light();
        let it = Interaction::new(
            Point3f::new(0.0, 0.0, 2.0),
            Vector3f::new(0.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 1.0),
            Normal3f::new(0.0, 0.0, 1.0),
        );
        assert!(!l.l(&it, &Vector3f::new(0.0, 0.0, 1.0)).is_black());
        assert!(l.l(&it, &Vector3f::new(0.0, 0.0, -1.0)).is_black());
    }
}
