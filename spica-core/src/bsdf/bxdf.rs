use std::f32::consts;
use std::fmt::Debug;

use super::BxDFType;
use crate::geometry::{abs_cos_theta, same_hemisphere};
use crate::sampling::cosine_sample_hemisphere;
use crate::spectrum::Spectrum;
use crate::{Point2f, Vector3f};

/// A single reflection or transmission lobe, expressed in the local shading
/// frame (z up along the shading normal).
pub trait BxDF: Debug {
    /// Evaluate the BxDF for the given outgoing and incoming directions.
    fn f(&self, wo: &Vector3f, wi: &Vector3f) -> Spectrum;

    /// Sample an incident direction for `wo`.
    ///
    /// The default implementation cosine-samples the hemisphere, which is
    /// exact for Lambertian lobes and a serviceable default for the rest.
    fn sample_f(&self, wo: &Vector3f, u: Point2f) -> (Spectrum, Vector3f, f32, BxDFType) {
        let mut wi = cosine_sample_hemisphere(u);
        if wo.z < 0.0 {
            wi.z *= -1.0;
        }
        let pdf = self.pdf(wo, &wi);
        (self.f(wo, &wi), wi, pdf, BxDFType::empty())
    }

    fn matches(&self, flags: BxDFType) -> bool {
        self.get_type() & flags == self.get_type()
    }

    fn get_type(&self) -> BxDFType;

    /// Density of `sample_f` at (wo, wi). Must stay consistent with
    /// `sample_f`.
    fn pdf(&self, wo: &Vector3f, wi: &Vector3f) -> f32 {
        if same_hemisphere(wo, wi) {
            abs_cos_theta(wi) * consts::FRAC_1_PI
        } else {
            0.0
        }
    }
}

/// Wrapper scaling another BxDF by a constant spectrum.
#[derive(Debug, Clone, Copy)]
pub struct ScaledBxDF<'a> {
    bxdf: &'a dyn BxDF,
    scale: Spectrum,
}

impl<'a> ScaledBxDF<'a> {
    pub fn new(bxdf: &'a dyn BxDF, scale: Spectrum) -> ScaledBxDF<'a> {
        ScaledBxDF { bxdf, scale }
    }
}

impl<'a> BxDF for ScaledBxDF<'a> {
    fn f(&self, wo: &Vector3f, wi: &Vector3f) -> Spectrum {
        self.bxdf.f(wo, wi) * self.scale
    }

    fn sample_f(&self, wo: &Vector3f, sample: Point2f) -> (Spectrum, Vector3f, f32, BxDFType) {
        let (spectrum, wi, pdf, bxdftype) = self.bxdf.sample_f(wo, sample);
        (spectrum * self.scale, wi, pdf, bxdftype)
    }

    fn pdf(&self, wo: &Vector3f, wi: &Vector3f) -> f32 {
        self.bxdf.pdf(wo, wi)
    }

    fn get_type(&self) -> BxDFType {
        self.bxdf.get_type()
    }
}
