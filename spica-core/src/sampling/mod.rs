use std::f32::consts;

use crate::{Point2f, Vector2f, Vector3f, INV_2_PI, INV_4_PI, PI_OVER_2, PI_OVER_4};

mod distribution1d;
mod distribution2d;

pub use self::distribution1d::Distribution1D;
pub use self::distribution2d::Distribution2D;

pub fn uniform_sample_sphere(u: Point2f) -> Vector3f {
    let z = 1.0 - 2.0 * u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * consts::PI * u.y;

    Vector3f::new(r * phi.cos(), r * phi.sin(), z)
}

#[inline]
pub fn uniform_sphere_pdf() -> f32 {
    INV_4_PI
}

pub fn uniform_sample_hemisphere(u: Point2f) -> Vector3f {
    let z = u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * consts::PI * u.y;
    Vector3f::new(r * phi.cos(), r * phi.sin(), z)
}

#[inline]
pub fn uniform_hemisphere_pdf() -> f32 {
    INV_2_PI
}

pub fn cosine_sample_hemisphere(u: Point2f) -> Vector3f {
    let d = concentric_sample_disk(u);
    let z = (1.0 - d.x * d.x - d.y * d.y).max(0.0).sqrt();
    Vector3f::new(d.x, d.y, z)
}

#[inline]
pub fn cosine_hemisphere_pdf(cos_theta: f32) -> f32 {
    cos_theta * consts::FRAC_1_PI
}

pub fn concentric_sample_disk(u: Point2f) -> Point2f {
    // Map uniform random numbers to [-1, 1]^2
    let u_offset = 2.0 * u - Vector2f::new(1.0, 1.0);

    // Handle degeneracy at the origin
    if u_offset.x == 0.0 && u_offset.y == 0.0 {
        return Point2f::new(0.0, 0.0);
    }

    // Apply concentric mapping to point
    let (r, theta) = if u_offset.x.abs() > u_offset.y.abs() {
        (u_offset.x, PI_OVER_4 * (u_offset.y / u_offset.x))
    } else {
        (u_offset.y, PI_OVER_2 - PI_OVER_4 * (u_offset.x / u_offset.y))
    };
    r * Point2f::new(theta.cos(), theta.sin())
}

/// Uniform barycentrics over a triangle.
pub fn uniform_sample_triangle(u: Point2f) -> Point2f {
    let su0 = u[0].sqrt();
    Point2f::new(1.0 - su0, u[1] * su0)
}

pub fn uniform_sample_cone(u: Point2f, cos_theta_max: f32) -> Vector3f {
    let cos_theta = (1.0 - u[0]) + u[0] * cos_theta_max;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = u[1] * 2.0 * consts::PI;
    Vector3f::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

#[inline]
pub fn uniform_cone_pdf(cos_theta_max: f32) -> f32 {
    1.0 / (2.0 * consts::PI * (1.0 - cos_theta_max))
}

#[inline]
pub fn balance_heuristic(nf: u32, f_pdf: f32, ng: u32, g_pdf: f32) -> f32 {
    let f = nf as f32 * f_pdf;
    let g = ng as f32 * g_pdf;
    f / (f + g)
}

#[inline]
pub fn power_heuristic(nf: u32, f_pdf: f32, ng: u32, g_pdf: f32) -> f32 {
    let f = nf as f32 * f_pdf;
    let g = ng as f32 * g_pdf;
    (f * f) / (f * f + g * g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng;

    #[test]
    fn test_cosine_hemisphere_mean_cos() {
        // E[cos theta] under a cosine-weighted distribution is 2/3.
        let mut rng = Rng::with_sequence(1);
        let n = 100_000;
        let mut sum = 0.0;
        for _ in 0..n {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            sum += cosine_sample_hemisphere(u).z;
        }
        let mean = sum / n as f32;
        assert!((mean - 2.0 / 3.0).abs() < 0.01, "mean = {}", mean);
    }

    #[test]
    fn test_concentric_disk_in_unit_disk() {
        let mut rng = Rng::with_sequence(2);
        for _ in 0..10_000 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let d = concentric_sample_disk(u);
            assert!(d.x * d.x + d.y * d.y <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_uniform_sphere_unit_length() {
        let mut rng = Rng::with_sequence(3);
        for _ in 0..1000 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let v = uniform_sample_sphere(u);
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_triangle_barycentrics_valid() {
        let mut rng = Rng::with_sequence(4);
        for _ in 0..1000 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let b = uniform_sample_triangle(u);
            assert!(b.x >= 0.0 && b.y >= 0.0 && b.x + b.y <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_heuristics() {
        // Power heuristic weights sum to 1 over both strategies
        let w1 = power_heuristic(1, 0.5, 1, 2.0);
        let w2 = power_heuristic(1, 2.0, 1, 0.5);
        assert!((w1 + w2 - 1.0).abs() < 1e-6);
        let b1 = balance_heuristic(1, 0.5, 1, 2.0);
        let b2 = balance_heuristic(1, 2.0, 1, 0.5);
        assert!((b1 + b2 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cone_sampling() {
        let cos_theta_max = 0.8;
        let mut rng = Rng::with_sequence(5);
        for _ in 0..1000 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let v = uniform_sample_cone(u, cos_theta_max);
            assert!(v.z >= cos_theta_max - 1e-5);
        }
    }
}
