use super::Filter;

/// Truncated Gaussian, shifted so it falls to zero at the filter radius.
#[derive(Debug, Copy, Clone)]
pub struct GaussianFilter {
    radius: (f32, f32),
    alpha: f32,
    exp_x: f32,
    exp_y: f32,
}

impl GaussianFilter {
    pub fn new(rx: f32, ry: f32, alpha: f32) -> GaussianFilter {
        GaussianFilter {
            radius: (rx, ry),
            alpha,
            exp_x: (-alpha * rx * rx).exp(),
            exp_y: (-alpha * ry * ry).exp(),
        }
    }

    fn gaussian(&self, d: f32, expv: f32) -> f32 {
        ((-self.alpha * d * d).exp() - expv).max(0.0)
    }
}

impl Default for GaussianFilter {
    fn default() -> GaussianFilter {
        GaussianFilter::new(1.0, 1.0, 2.0)
    }
}

impl Filter for GaussianFilter {
    fn evaluate(&self, x: f32, y: f32) -> f32 {
        self.gaussian(x, self.exp_x) * self.gaussian(y, self.exp_y)
    }

    fn radius(&self) -> (f32, f32) {
        self.radius
    }
}
