use std::f32::consts;

use super::{BxDF, BxDFType};
use crate::geometry::{abs_cos_theta, same_hemisphere};
use crate::sampling::cosine_sample_hemisphere;
use crate::spectrum::Spectrum;
use crate::{Point2f, Vector3f};

#[derive(Copy, Clone, Debug)]
pub struct LambertianReflection {
    r: Spectrum,
}

impl LambertianReflection {
    pub fn new(r: Spectrum) -> LambertianReflection {
        LambertianReflection { r }
    }
}

impl BxDF for LambertianReflection {
    fn f(&self, _wo: &Vector3f, _wi: &Vector3f) -> Spectrum {
        self.r * consts::FRAC_1_PI
    }

    fn get_type(&self) -> BxDFType {
        BxDFType::BSDF_DIFFUSE | BxDFType::BSDF_REFLECTION
    }
}

#[derive(Copy, Clone, Debug)]
pub struct LambertianTransmission {
    t: Spectrum,
}

impl LambertianTransmission {
    pub fn new(t: Spectrum) -> LambertianTransmission {
        LambertianTransmission { t }
    }
}

impl BxDF for LambertianTransmission {
    fn f(&self, _wo: &Vector3f, _wi: &Vector3f) -> Spectrum {
        self.t * consts::FRAC_1_PI
    }

    fn sample_f(&self, wo: &Vector3f, u: Point2f) -> (Spectrum, Vector3f, f32, BxDFType) {
        // Cosine-sample the opposite hemisphere
        let mut wi = cosine_sample_hemisphere(u);
        if wo.z > 0.0 {
            wi.z *= -1.0;
        }
        let pdf = self.pdf(wo, &wi);
        (self.f(wo, &wi), wi, pdf, self.get_type())
    }

    fn pdf(&self, wo: &Vector3f, wi: &Vector3f) -> f32 {
        if same_hemisphere(wo, wi) {
            0.0
        } else {
            abs_cos_theta(wi) * consts::FRAC_1_PI
        }
    }

    fn get_type(&self) -> BxDFType {
        BxDFType::BSDF_DIFFUSE | BxDFType::BSDF_TRANSMISSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflection_f() {
        let b = LambertianReflection::new(Spectrum::grey(0.5));
        let wo = Vector3f::new(0.0, 0.0, 1.0);
        let wi = Vector3f::new(0.5, 0.0, 0.8).normalize();
        let f = b.f(&wo, &wi);
        assert!((f.r - 0.5 * consts::FRAC_1_PI).abs() < 1e-6);
        // Reciprocity is trivial for a constant lobe but assert it anyway
        assert_eq!(b.f(&wo, &wi), b.f(&wi, &wo));
    }

    #[test]
    fn test_transmission_samples_other_hemisphere() {
        let b = LambertianTransmission::new(Spectrum::grey(1.0));
        let wo = Vector3f::new(0.1, 0.2, 0.9).normalize();
        let (_f, wi, pdf, _ty) = b.sample_f(&wo, Point2f::new(0.3, 0.7));
        assert!(wi.z < 0.0);
        assert!(pdf > 0.0);
        assert!((pdf - b.pdf(&wo, &wi)).abs() < 1e-6);
    }
}
