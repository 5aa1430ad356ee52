use std::f32::consts::PI;
use std::fmt::Debug;

use super::{BxDF, BxDFType, Fresnel, FresnelDielectric};
use crate::geometry::{
    abs_cos_theta, cos2_phi, cos2_theta, cos_phi, cos_theta, reflect, refract, same_hemisphere,
    sin2_phi, sin_phi, spherical_direction, tan2_theta, tan_theta,
};
use crate::material::TransportMode;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Vector3f};

/// Microfacet normal distribution, with Smith masking-shadowing.
pub trait MicrofacetDistribution: Debug + Send + Sync {
    /// Differential area of microfacets with half-vector `wh`.
    fn d(&self, wh: &Vector3f) -> f32;

    fn lambda(&self, w: &Vector3f) -> f32;

    fn g1(&self, w: &Vector3f) -> f32 {
        1.0 / (1.0 + self.lambda(w))
    }

    fn g(&self, wo: &Vector3f, wi: &Vector3f) -> f32 {
        1.0 / (1.0 + self.lambda(wo) + self.lambda(wi))
    }

    fn pdf(&self, wo: &Vector3f, wh: &Vector3f) -> f32 {
        if self.sample_visible_area() {
            self.d(wh) * self.g1(wo) * wo.dot(wh).abs() / abs_cos_theta(wo)
        } else {
            self.d(wh) * abs_cos_theta(wh)
        }
    }

    fn sample_wh(&self, wo: &Vector3f, u: Point2f) -> Vector3f;

    fn sample_visible_area(&self) -> bool;
}

/// Trowbridge-Reitz (GGX) distribution.
#[derive(Debug, Copy, Clone)]
pub struct TrowbridgeReitz {
    alpha_x: f32,
    alpha_y: f32,
    sample_visible_area: bool,
}

impl TrowbridgeReitz {
    pub fn new(alpha_x: f32, alpha_y: f32) -> TrowbridgeReitz {
        TrowbridgeReitz {
            alpha_x: alpha_x.max(1e-3),
            alpha_y: alpha_y.max(1e-3),
            sample_visible_area: true,
        }
    }

    /// Map a [0,1] "roughness" parameter to an alpha value.
    pub fn roughness_to_alpha(roughness: f32) -> f32 {
        let roughness = roughness.max(1e-3);
        let x = roughness.ln();
        1.62142
            + 0.819955 * x
            + 0.1734 * x * x
            + 0.0171201 * x * x * x
            + 0.000640711 * x * x * x * x
    }

    fn sample11(cos_theta: f32, u1: f32, u2: f32) -> (f32, f32) {
        // Normal incidence: sample the slopes from a uniform disk
        if cos_theta > 0.9999 {
            let r = (u1 / (1.0 - u1)).sqrt();
            let phi = 6.28318530718 * u2;
            return (r * phi.cos(), r * phi.sin());
        }

        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let tan_theta = sin_theta / cos_theta;
        let a = 1.0 / tan_theta;
        let g1 = 2.0 / (1.0 + (1.0 + 1.0 / (a * a)).sqrt());

        // Sample slope_x
        let a = 2.0 * u1 / g1 - 1.0;
        let mut tmp = 1.0 / (a * a - 1.0);
        if tmp > 1e10 {
            tmp = 1e10;
        }
        let b = tan_theta;
        let d = (b * b * tmp * tmp - (a * a - b * b) * tmp).max(0.0).sqrt();
        let slope_x_1 = b * tmp - d;
        let slope_x_2 = b * tmp + d;
        let slope_x = if a < 0.0 || slope_x_2 > 1.0 / tan_theta {
            slope_x_1
        } else {
            slope_x_2
        };

        // Sample slope_y
        let (s, u2) = if u2 > 0.5 {
            (1.0, 2.0 * (u2 - 0.5))
        } else {
            (-1.0, 2.0 * (0.5 - u2))
        };
        let z = (u2 * (u2 * (u2 * 0.27385 - 0.73369) + 0.46341))
            / (u2 * (u2 * (u2 * 0.093073 + 0.309420) - 1.000000) + 0.597999);
        let slope_y = s * z * (1.0 + slope_x * slope_x).sqrt();

        debug_assert!(!slope_y.is_infinite() && !slope_y.is_nan());
        (slope_x, slope_y)
    }

    fn sample_visible(&self, wi: &Vector3f, u1: f32, u2: f32) -> Vector3f {
        // 1. stretch wi
        let wi_stretched =
            Vector3f::new(self.alpha_x * wi.x, self.alpha_y * wi.y, wi.z).normalize();

        // 2. sample slopes for normal incidence configuration
        let (mut slope_x, mut slope_y) =
            TrowbridgeReitz::sample11(cos_theta(&wi_stretched), u1, u2);

        // 3. rotate
        let tmp = cos_phi(&wi_stretched) * slope_x - sin_phi(&wi_stretched) * slope_y;
        slope_y = sin_phi(&wi_stretched) * slope_x + cos_phi(&wi_stretched) * slope_y;
        slope_x = tmp;

        // 4. unstretch
        slope_x *= self.alpha_x;
        slope_y *= self.alpha_y;

        // 5. compute normal
        Vector3f::new(-slope_x, -slope_y, 1.0).normalize()
    }
}

impl MicrofacetDistribution for TrowbridgeReitz {
    fn d(&self, wh: &Vector3f) -> f32 {
        let tan2 = tan2_theta(wh);
        if tan2.is_infinite() {
            return 0.0;
        }
        let cos4_theta = cos2_theta(wh) * cos2_theta(wh);
        let e = (cos2_phi(wh) / (self.alpha_x * self.alpha_x)
            + sin2_phi(wh) / (self.alpha_y * self.alpha_y))
            * tan2;
        1.0 / (PI * self.alpha_x * self.alpha_y * cos4_theta * (1.0 + e) * (1.0 + e))
    }

    fn lambda(&self, w: &Vector3f) -> f32 {
        let abs_tan_theta = tan_theta(w).abs();
        if abs_tan_theta.is_infinite() {
            return 0.0;
        }
        let alpha = (cos2_phi(w) * self.alpha_x * self.alpha_x
            + sin2_phi(w) * self.alpha_y * self.alpha_y)
            .sqrt();
        let alpha2_tan2_theta = (alpha * abs_tan_theta) * (alpha * abs_tan_theta);
        (-1.0 + (1.0 + alpha2_tan2_theta).sqrt()) / 2.0
    }

    fn sample_wh(&self, wo: &Vector3f, u: Point2f) -> Vector3f {
        if self.sample_visible_area {
            let flip = wo.z < 0.0;
            let wh = if flip {
                -self.sample_visible(&-(*wo), u[0], u[1])
            } else {
                self.sample_visible(wo, u[0], u[1])
            };
            wh
        } else {
            let phi = (2.0 * PI) * u[1];
            let (cos_theta, _aniso) = if self.alpha_x == self.alpha_y {
                let tan_theta2 = self.alpha_x * self.alpha_x * u[0] / (1.0 - u[0]);
                (1.0 / (1.0 + tan_theta2).sqrt(), false)
            } else {
                // Isotropic sampling reused for the anisotropic case with the
                // mean alpha; good enough for the non-visible path.
                let alpha = 0.5 * (self.alpha_x + self.alpha_y);
                let tan_theta2 = alpha * alpha * u[0] / (1.0 - u[0]);
                (1.0 / (1.0 + tan_theta2).sqrt(), true)
            };
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
            let mut wh = spherical_direction(sin_theta, cos_theta, phi);
            if !same_hemisphere(wo, &wh) {
                wh = -wh;
            }
            wh
        }
    }

    fn sample_visible_area(&self) -> bool {
        self.sample_visible_area
    }
}

/// Torrance-Sparrow reflection from a rough surface.
#[derive(Debug)]
pub struct MicrofacetReflection<'a> {
    r: Spectrum,
    distribution: &'a dyn MicrofacetDistribution,
    fresnel: &'a dyn Fresnel,
}

impl<'a> MicrofacetReflection<'a> {
    pub fn new(
        r: Spectrum,
        distribution: &'a dyn MicrofacetDistribution,
        fresnel: &'a dyn Fresnel,
    ) -> MicrofacetReflection<'a> {
        MicrofacetReflection {
            r,
            distribution,
            fresnel,
        }
    }
}

impl<'a> BxDF for MicrofacetReflection<'a> {
    fn f(&self, wo: &Vector3f, wi: &Vector3f) -> Spectrum {
        let cos_theta_o = abs_cos_theta(wo);
        let cos_theta_i = abs_cos_theta(wi);
        let mut wh = *wi + *wo;

        // Degenerate cases at grazing angles
        if cos_theta_o == 0.0 || cos_theta_i == 0.0 {
            return Spectrum::black();
        }
        if wh.x == 0.0 && wh.y == 0.0 && wh.z == 0.0 {
            return Spectrum::black();
        }

        wh = wh.normalize();
        // Evaluate Fresnel with the half-vector on the same side as the
        // shading normal.
        let fr_wh = if wh.z < 0.0 { -wh } else { wh };
        let f = self.fresnel.evaluate(wi.dot(&fr_wh));
        self.r * self.distribution.d(&wh) * self.distribution.g(wo, wi) * f
            / (4.0 * cos_theta_i * cos_theta_o)
    }

    fn sample_f(&self, wo: &Vector3f, u: Point2f) -> (Spectrum, Vector3f, f32, BxDFType) {
        if wo.z == 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                self.get_type(),
            );
        }

        let wh = self.distribution.sample_wh(wo, u);
        if wo.dot(&wh) < 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                self.get_type(),
            );
        }
        let wi = reflect(wo, &wh);
        if !same_hemisphere(wo, &wi) {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                self.get_type(),
            );
        }
        let pdf = self.distribution.pdf(wo, &wh) / (4.0 * wo.dot(&wh));

        (self.f(wo, &wi), wi, pdf, self.get_type())
    }

    fn pdf(&self, wo: &Vector3f, wi: &Vector3f) -> f32 {
        if !same_hemisphere(wo, wi) {
            return 0.0;
        }
        let wh = (*wo + *wi).normalize();

        self.distribution.pdf(wo, &wh) / (4.0 * wo.dot(&wh))
    }

    fn get_type(&self) -> BxDFType {
        BxDFType::BSDF_REFLECTION | BxDFType::BSDF_GLOSSY
    }
}

/// Torrance-Sparrow transmission through a rough dielectric.
#[derive(Debug)]
pub struct MicrofacetTransmission<'a> {
    t: Spectrum,
    distribution: &'a dyn MicrofacetDistribution,
    eta_a: f32,
    eta_b: f32,
    fresnel: FresnelDielectric,
    mode: TransportMode,
}

impl<'a> MicrofacetTransmission<'a> {
    pub fn new(
        t: Spectrum,
        distribution: &'a dyn MicrofacetDistribution,
        eta_a: f32,
        eta_b: f32,
        mode: TransportMode,
    ) -> MicrofacetTransmission<'a> {
        MicrofacetTransmission {
            t,
            distribution,
            eta_a,
            eta_b,
            fresnel: FresnelDielectric::new(eta_a, eta_b),
            mode,
        }
    }
}

impl<'a> BxDF for MicrofacetTransmission<'a> {
    fn f(&self, wo: &Vector3f, wi: &Vector3f) -> Spectrum {
        if same_hemisphere(wo, wi) {
            return Spectrum::black();
        }

        let cos_theta_o = cos_theta(wo);
        let cos_theta_i = cos_theta(wi);
        if cos_theta_o == 0.0 || cos_theta_i == 0.0 {
            return Spectrum::black();
        }

        let eta = if cos_theta_o > 0.0 {
            self.eta_b / self.eta_a
        } else {
            self.eta_a / self.eta_b
        };

        let mut wh = (*wo + *wi * eta).normalize();
        if wh.z < 0.0 {
            wh = -wh;
        }
        // Discard back-facing microfacets
        if wo.dot(&wh) * wi.dot(&wh) > 0.0 {
            return Spectrum::black();
        }

        let f = self.fresnel.evaluate(wo.dot(&wh));

        let sqrt_denom = wo.dot(&wh) + eta * wi.dot(&wh);
        let factor = match self.mode {
            TransportMode::Radiance => 1.0 / eta,
            _ => 1.0,
        };

        (Spectrum::white() - f)
            * self.t
            * f32::abs(
                self.distribution.d(&wh)
                    * self.distribution.g(wo, wi)
                    * eta
                    * eta
                    * wi.dot(&wh).abs()
                    * wo.dot(&wh).abs()
                    * factor
                    * factor
                    / (cos_theta_i * cos_theta_o * sqrt_denom * sqrt_denom),
            )
    }

    fn sample_f(&self, wo: &Vector3f, u: Point2f) -> (Spectrum, Vector3f, f32, BxDFType) {
        if wo.z == 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                self.get_type(),
            );
        }

        let wh = self.distribution.sample_wh(wo, u);
        if wo.dot(&wh) < 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                self.get_type(),
            );
        }
        let eta = if cos_theta(wo) > 0.0 {
            self.eta_a / self.eta_b
        } else {
            self.eta_b / self.eta_a
        };

        if let Some(wi) = refract(wo, &Normal3f::from(wh), eta) {
            let pdf = self.pdf(wo, &wi);
            (self.f(wo, &wi), wi, pdf, self.get_type())
        } else {
            (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 0.0),
                0.0,
                self.get_type(),
            )
        }
    }

    fn pdf(&self, wo: &Vector3f, wi: &Vector3f) -> f32 {
        if same_hemisphere(wo, wi) {
            return 0.0;
        }

        let eta = if cos_theta(wo) > 0.0 {
            self.eta_b / self.eta_a
        } else {
            self.eta_a / self.eta_b
        };
        let wh = (*wo + *wi * eta).normalize();
        if wo.dot(&wh) * wi.dot(&wh) > 0.0 {
            return 0.0;
        }

        let sqrt_denom = wo.dot(&wh) + eta * wi.dot(&wh);
        let dwh_dwi = ((eta * eta * wi.dot(&wh)) / (sqrt_denom * sqrt_denom)).abs();

        self.distribution.pdf(wo, &wh) * dwh_dwi
    }

    fn get_type(&self) -> BxDFType {
        BxDFType::BSDF_TRANSMISSION | BxDFType::BSDF_GLOSSY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsdf::FresnelNoOp;
    use crate::rng::Rng;

    #[test]
    fn test_d_integrates_with_projection() {
        // Integral of D(wh) cos(wh) over the hemisphere is 1 by construction.
        let d = TrowbridgeReitz::new(0.3, 0.3);
        let mut rng = Rng::with_sequence(17);
        let n = 200_000;
        let mut sum = 0.0f64;
        for _ in 0..n {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let wh = crate::sampling::uniform_sample_hemisphere(u);
            sum += (d.d(&wh) * abs_cos_theta(&wh)) as f64;
        }
        let integral = sum / n as f64 * 2.0 * std::f64::consts::PI;
        assert!((integral - 1.0).abs() < 0.05, "integral = {}", integral);
    }

    #[test]
    fn test_sample_pdf_consistency() {
        let d = TrowbridgeReitz::new(0.25, 0.25);
        let fresnel = FresnelNoOp;
        let brdf = MicrofacetReflection::new(Spectrum::white(), &d, &fresnel);
        let wo = Vector3f::new(0.3, 0.1, 0.9).normalize();
        let mut rng = Rng::with_sequence(23);
        for _ in 0..200 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let (_f, wi, pdf, _) = brdf.sample_f(&wo, u);
            if pdf > 0.0 {
                let pdf2 = brdf.pdf(&wo, &wi);
                assert!(
                    (pdf - pdf2).abs() / pdf < 1e-3,
                    "pdf {} != {}",
                    pdf,
                    pdf2
                );
            }
        }
    }

    #[test]
    fn test_reciprocity() {
        let d = TrowbridgeReitz::new(0.4, 0.4);
        let fresnel = FresnelNoOp;
        let brdf = MicrofacetReflection::new(Spectrum::white(), &d, &fresnel);
        let wo = Vector3f::new(0.5, -0.2, 0.84).normalize();
        let wi = Vector3f::new(-0.3, 0.6, 0.74).normalize();
        let a = brdf.f(&wo, &wi);
        let b = brdf.f(&wi, &wo);
        assert!((a.r - b.r).abs() < 1e-4);
    }
}
