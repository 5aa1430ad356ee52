use std::f32::consts::PI;

use crate::interaction::Interaction;
use crate::light::{Light, LightFlags, VisibilityTester};
use crate::ray::Ray;
use crate::sampling::{uniform_sample_sphere, uniform_sphere_pdf};
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Point3f, Vector3f};

/// Isotropic point emitter.
#[derive(Debug)]
pub struct PointLight {
    id: u32,
    p: Point3f,
    intensity: Spectrum,
}

impl PointLight {
    pub fn new(p: Point3f, intensity: Spectrum) -> PointLight {
        PointLight {
            id: super::next_light_id(),
            p,
            intensity,
        }
    }
}

impl Light for PointLight {
    fn id(&self) -> u32 {
        self.id
    }

    fn sample_li(
        &self,
        re: &Interaction,
        _u: Point2f,
    ) -> (Spectrum, Vector3f, f32, VisibilityTester) {
        let d = self.p - re.p;
        let wi = d.normalize();
        let vis = VisibilityTester::new(*re, Interaction::from_point(&self.p));
        (self.intensity / d.length_squared(), wi, 1.0, vis)
    }

    fn pdf_li(&self, _re: &Interaction, _wi: &Vector3f) -> f32 {
        // Delta distribution: never matched by chance
        0.0
    }

    fn sample_le(&self, u1: Point2f, _u2: Point2f) -> (Ray, Normal3f, f32, f32, Spectrum) {
        let d = uniform_sample_sphere(u1);
        let ray = Ray::new(self.p, d);
        (
            ray,
            Normal3f::from(d),
            1.0,
            uniform_sphere_pdf(),
            self.intensity,
        )
    }

    fn pdf_le(&self, _ray: &Ray, _n_light: &Normal3f) -> (f32, f32) {
        (0.0, uniform_sphere_pdf())
    }

    fn power(&self) -> Spectrum {
        4.0 * PI * self.intensity
    }

    fn flags(&self) -> LightFlags {
        LightFlags::DELTA_POSITION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_square_falloff() {
        let l = PointLight::new(Point3f::new(0.0, 0.0, 0.0), Spectrum::grey(4.0));
        let near = Interaction::from_point(&Point3f::new(1.0, 0.0, 0.0));
        let far = Interaction::from_point(&Point3f::new(2.0, 0.0, 0.0));
        let (li_near, ..) = l.sample_li(&near, Point2f::new(0.5, 0.5));
        let (li_far, ..) = l.sample_li(&far, Point2f::new(0.5, 0.5));
        assert!((li_near.r / li_far.r - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_power() {
        let l = PointLight::new(Point3f::new(0.0, 0.0, 0.0), Spectrum::grey(1.0));
        assert!((l.power().r - 4.0 * PI).abs() < 1e-4);
    }
}
