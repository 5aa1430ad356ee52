use super::{fr_dielectric, BxDF, BxDFType, Fresnel, FresnelDielectric};
use crate::geometry::{abs_cos_theta, cos_theta, refract};
use crate::material::TransportMode;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Vector3f};

/// Perfect mirror reflection weighted by a Fresnel term.
#[derive(Debug)]
pub struct SpecularReflection<'a> {
    r: Spectrum,
    fresnel: &'a dyn Fresnel,
}

impl<'a> SpecularReflection<'a> {
    pub fn new(r: Spectrum, fresnel: &'a dyn Fresnel) -> SpecularReflection<'a> {
        SpecularReflection { r, fresnel }
    }
}

impl<'a> BxDF for SpecularReflection<'a> {
    fn f(&self, _wo: &Vector3f, _wi: &Vector3f) -> Spectrum {
        // A delta lobe never matches an arbitrary (wo, wi) pair
        Spectrum::black()
    }

    fn sample_f(&self, wo: &Vector3f, _u: Point2f) -> (Spectrum, Vector3f, f32, BxDFType) {
        let wi = Vector3f::new(-wo.x, -wo.y, wo.z);
        let f = self.fresnel.evaluate(cos_theta(&wi)) * self.r / abs_cos_theta(&wi);
        (f, wi, 1.0, self.get_type())
    }

    fn pdf(&self, _wo: &Vector3f, _wi: &Vector3f) -> f32 {
        0.0
    }

    fn get_type(&self) -> BxDFType {
        BxDFType::BSDF_SPECULAR | BxDFType::BSDF_REFLECTION
    }
}

/// Perfect specular transmission through a dielectric boundary.
#[derive(Debug)]
pub struct SpecularTransmission {
    t: Spectrum,
    eta_a: f32,
    eta_b: f32,
    fresnel: FresnelDielectric,
    mode: TransportMode,
}

impl SpecularTransmission {
    pub fn new(t: Spectrum, eta_a: f32, eta_b: f32, mode: TransportMode) -> SpecularTransmission {
        SpecularTransmission {
            t,
            eta_a,
            eta_b,
            fresnel: FresnelDielectric::new(eta_a, eta_b),
            mode,
        }
    }
}

impl BxDF for SpecularTransmission {
    fn f(&self, _wo: &Vector3f, _wi: &Vector3f) -> Spectrum {
        Spectrum::black()
    }

    fn sample_f(&self, wo: &Vector3f, _u: Point2f) -> (Spectrum, Vector3f, f32, BxDFType) {
        // Which side of the boundary are we on?
        let entering = cos_theta(wo) > 0.0;
        let (eta_i, eta_t) = if entering {
            (self.eta_a, self.eta_b)
        } else {
            (self.eta_b, self.eta_a)
        };

        let n = Normal3f::new(0.0, 0.0, if wo.z > 0.0 { 1.0 } else { -1.0 });
        let wi = match refract(wo, &n, eta_i / eta_t) {
            Some(wi) => wi,
            None => return (Spectrum::black(), Vector3f::new(0.0, 0.0, 0.0), 0.0, self.get_type()),
        };

        let mut ft = self.t * (Spectrum::white() - self.fresnel.evaluate(cos_theta(&wi)));
        // Radiance transport picks up the eta^2 compression factor;
        // importance transport does not.
        if self.mode == TransportMode::Radiance {
            ft *= (eta_i * eta_i) / (eta_t * eta_t);
        }
        (ft / abs_cos_theta(&wi), wi, 1.0, self.get_type())
    }

    fn pdf(&self, _wo: &Vector3f, _wi: &Vector3f) -> f32 {
        0.0
    }

    fn get_type(&self) -> BxDFType {
        BxDFType::BSDF_SPECULAR | BxDFType::BSDF_TRANSMISSION
    }
}

/// Combined specular reflection and transmission, choosing the branch by the
/// Fresnel reflectance itself so each sample is noise-free.
#[derive(Debug)]
pub struct FresnelSpecular {
    r: Spectrum,
    t: Spectrum,
    eta_a: f32,
    eta_b: f32,
    mode: TransportMode,
}

impl FresnelSpecular {
    pub fn new(
        r: Spectrum,
        t: Spectrum,
        eta_a: f32,
        eta_b: f32,
        mode: TransportMode,
    ) -> FresnelSpecular {
        FresnelSpecular {
            r,
            t,
            eta_a,
            eta_b,
            mode,
        }
    }
}

impl BxDF for FresnelSpecular {
    fn f(&self, _wo: &Vector3f, _wi: &Vector3f) -> Spectrum {
        Spectrum::black()
    }

    fn sample_f(&self, wo: &Vector3f, u: Point2f) -> (Spectrum, Vector3f, f32, BxDFType) {
        let fr = fr_dielectric(cos_theta(wo), self.eta_a, self.eta_b);
        if u[0] < fr {
            // Specular reflection, chosen with probability fr
            let wi = Vector3f::new(-wo.x, -wo.y, wo.z);
            let ty = BxDFType::BSDF_SPECULAR | BxDFType::BSDF_REFLECTION;
            (fr * self.r / abs_cos_theta(&wi), wi, fr, ty)
        } else {
            let entering = cos_theta(wo) > 0.0;
            let (eta_i, eta_t) = if entering {
                (self.eta_a, self.eta_b)
            } else {
                (self.eta_b, self.eta_a)
            };
            let n = Normal3f::new(0.0, 0.0, if wo.z > 0.0 { 1.0 } else { -1.0 });
            let wi = match refract(wo, &n, eta_i / eta_t) {
                Some(wi) => wi,
                None => {
                    return (
                        Spectrum::black(),
                        Vector3f::new(0.0, 0.0, 0.0),
                        0.0,
                        self.get_type(),
                    )
                }
            };
            let mut ft = self.t * (1.0 - fr);
            if self.mode == TransportMode::Radiance {
                ft *= (eta_i * eta_i) / (eta_t * eta_t);
            }
            let ty = BxDFType::BSDF_SPECULAR | BxDFType::BSDF_TRANSMISSION;
            (ft / abs_cos_theta(&wi), wi, 1.0 - fr, ty)
        }
    }

    fn pdf(&self, _wo: &Vector3f, _wi: &Vector3f) -> f32 {
        0.0
    }

    fn get_type(&self) -> BxDFType {
        BxDFType::BSDF_SPECULAR | BxDFType::BSDF_REFLECTION | BxDFType::BSDF_TRANSMISSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsdf::FresnelNoOp;

    #[test]
    fn test_mirror_direction() {
        let fresnel = FresnelNoOp;
        let b = SpecularReflection::new(Spectrum::white(), &fresnel);
        let wo = Vector3f::new(0.3, -0.4, 0.866).normalize();
        let (f, wi, pdf, _) = b.sample_f(&wo, Point2f::new(0.5, 0.5));
        assert_eq!(pdf, 1.0);
        assert!((wi.x + wo.x).abs() < 1e-6);
        assert!((wi.y + wo.y).abs() < 1e-6);
        assert!((wi.z - wo.z).abs() < 1e-6);
        assert!(!f.is_black());
    }

    #[test]
    fn test_transmission_bends_toward_normal() {
        let b = SpecularTransmission::new(Spectrum::white(), 1.0, 1.5, TransportMode::Radiance);
        let wo = Vector3f::new(0.6, 0.0, 0.8);
        let (_f, wi, pdf, _) = b.sample_f(&wo, Point2f::new(0.5, 0.5));
        assert_eq!(pdf, 1.0);
        assert!(wi.z < 0.0);
        // Entering a denser medium: the refracted direction is closer to the
        // axis than the mirrored incident direction.
        assert!(wi.x.abs() < wo.x.abs());
    }

    #[test]
    fn test_fresnel_specular_branches() {
        let b = FresnelSpecular::new(
            Spectrum::white(),
            Spectrum::white(),
            1.0,
            1.5,
            TransportMode::Radiance,
        );
        let wo = Vector3f::new(0.0, 0.0, 1.0);
        // u below fr picks reflection, above picks transmission
        let (_, wi_r, _, ty_r) = b.sample_f(&wo, Point2f::new(0.0, 0.5));
        assert!(ty_r.contains(BxDFType::BSDF_REFLECTION));
        assert!(wi_r.z > 0.0);
        let (_, wi_t, _, ty_t) = b.sample_f(&wo, Point2f::new(0.9, 0.5));
        assert!(ty_t.contains(BxDFType::BSDF_TRANSMISSION));
        assert!(wi_t.z < 0.0);
    }
}
