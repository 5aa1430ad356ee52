use std::sync::Arc;

use crate::light::Light;
use crate::sampling::Distribution1D;

/// Discrete distribution over the scene's lights, proportional to emitted
/// power. Falls back to uniform when every light reports zero power.
pub fn power_light_distribution(lights: &[Arc<dyn Light>]) -> Distribution1D {
    if lights.is_empty() {
        return Distribution1D::new(&[1.0]);
    }
    let power: Vec<f32> = lights.iter().map(|l| l.power().y()).collect();
    if power.iter().all(|p| *p <= 0.0) {
        Distribution1D::new(&vec![1.0; lights.len()])
    } else {
        Distribution1D::new(&power)
    }
}

/// Uniform distribution over the scene's lights.
pub fn uniform_light_distribution(lights: &[Arc<dyn Light>]) -> Distribution1D {
    Distribution1D::new(&vec![1.0; lights.len().max(1)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::PointLight;
    use crate::spectrum::Spectrum;
    use crate::Point3f;

    #[test]
    fn test_power_proportional() {
        let lights: Vec<Arc<dyn Light>> = vec![
            Arc::new(PointLight::new(Point3f::new(0.0, 0.0, 0.0), Spectrum::grey(1.0))),
            Arc::new(PointLight::new(Point3f::new(1.0, 0.0, 0.0), Spectrum::grey(3.0))),
        ];
        let d = power_light_distribution(&lights);
        let (idx, pdf) = d.sample_discrete(0.9);
        assert_eq!(idx, 1);
        assert!((pdf - 0.75).abs() < 1e-6);
    }
}
