mod normal;
mod point;
mod vector;

pub use self::normal::Normal3;
pub use self::point::{Point2, Point3};
pub use self::vector::{Vector2, Vector3};

use std::f32::consts::PI;

use crate::{clamp, gamma, next_float_down, next_float_up, Normal3f, Point3f, Vector3f};

/// Create an orthogonal coordinate system from a single (normalized) vector.
pub fn coordinate_system(v1: &Vector3f) -> (Vector3f, Vector3f) {
    let v2 = if v1.x.abs() > v1.y.abs() {
        Vector3::new(-v1.z, 0.0, v1.x) / (v1.x * v1.x + v1.z * v1.z).sqrt()
    } else {
        Vector3::new(0.0, v1.z, -v1.y) / (v1.y * v1.y + v1.z * v1.z).sqrt()
    };

    let v3 = v1.cross(&v2);

    (v2, v3)
}

pub fn distance(p1: &Point3f, p2: &Point3f) -> f32 {
    (*p1 - *p2).length()
}

pub fn distance_squared(p1: &Point3f, p2: &Point3f) -> f32 {
    (*p1 - *p2).length_squared()
}

pub fn face_forward(v: &Vector3f, n: &Vector3f) -> Vector3f {
    if v.dot(n) < 0.0 {
        -(*v)
    } else {
        *v
    }
}

pub fn face_forward_n(n: &Normal3f, n2: &Normal3f) -> Normal3f {
    if n.dot(n2) < 0.0 {
        -(*n)
    } else {
        *n
    }
}

/// Reflect `wo` about `n`. Both in the same hemisphere.
pub fn reflect(wo: &Vector3f, n: &Vector3f) -> Vector3f {
    -(*wo) + 2.0 * wo.dot(n) * *n
}

/// Refract `wi` through a surface with normal `n` and relative index of
/// refraction `eta`. Returns `None` in case of total internal reflection.
pub fn refract(wi: &Vector3f, n: &Normal3f, eta: f32) -> Option<Vector3f> {
    let cos_theta_i = n.dotv(wi);
    let sin2_theta_i = (1.0 - cos_theta_i * cos_theta_i).max(0.0);
    let sin2_theta_t = eta * eta * sin2_theta_i;

    if sin2_theta_t >= 1.0 {
        None
    } else {
        let cos_theta_t = (1.0 - sin2_theta_t).sqrt();
        Some(eta * -(*wi) + (eta * cos_theta_i - cos_theta_t) * Vector3f::from(*n))
    }
}

pub fn spherical_direction(sin_theta: f32, cos_theta: f32, phi: f32) -> Vector3f {
    Vector3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

pub fn spherical_direction_vectors(
    sin_theta: f32,
    cos_theta: f32,
    phi: f32,
    x: &Vector3f,
    y: &Vector3f,
    z: &Vector3f,
) -> Vector3f {
    sin_theta * phi.cos() * *x + sin_theta * phi.sin() * *y + cos_theta * *z
}

pub fn spherical_theta(v: &Vector3f) -> f32 {
    clamp(v.z, -1.0, 1.0).acos()
}

pub fn spherical_phi(v: &Vector3f) -> f32 {
    let p = v.y.atan2(v.x);
    if p < 0.0 {
        p + 2.0 * PI
    } else {
        p
    }
}

// Trigonometric helpers for directions in the local shading frame, where the
// z-axis is aligned with the shading normal.

#[inline]
pub fn cos_theta(w: &Vector3f) -> f32 {
    w.z
}

#[inline]
pub fn cos2_theta(w: &Vector3f) -> f32 {
    w.z * w.z
}

#[inline]
pub fn abs_cos_theta(w: &Vector3f) -> f32 {
    w.z.abs()
}

#[inline]
pub fn sin2_theta(w: &Vector3f) -> f32 {
    (1.0 - cos2_theta(w)).max(0.0)
}

#[inline]
pub fn sin_theta(w: &Vector3f) -> f32 {
    sin2_theta(w).sqrt()
}

#[inline]
pub fn tan_theta(w: &Vector3f) -> f32 {
    sin_theta(w) / cos_theta(w)
}

#[inline]
pub fn tan2_theta(w: &Vector3f) -> f32 {
    sin2_theta(w) / cos2_theta(w)
}

#[inline]
pub fn cos_phi(w: &Vector3f) -> f32 {
    let s = sin_theta(w);
    if s == 0.0 {
        1.0
    } else {
        clamp(w.x / s, -1.0, 1.0)
    }
}

#[inline]
pub fn sin_phi(w: &Vector3f) -> f32 {
    let s = sin_theta(w);
    if s == 0.0 {
        0.0
    } else {
        clamp(w.y / s, -1.0, 1.0)
    }
}

#[inline]
pub fn cos2_phi(w: &Vector3f) -> f32 {
    cos_phi(w) * cos_phi(w)
}

#[inline]
pub fn sin2_phi(w: &Vector3f) -> f32 {
    sin_phi(w) * sin_phi(w)
}

#[inline]
pub fn same_hemisphere(w: &Vector3f, wp: &Vector3f) -> bool {
    w.z * wp.z > 0.0
}

/// Offset a spawned ray origin away from the surface so the next intersection
/// query cannot hit the surface it left. The offset scales with the error
/// bound of the intersection point and rounds away from the surface at the
/// bit level.
pub fn offset_ray_origin(
    p: &Point3f,
    p_error: &Vector3f,
    n: &Normal3f,
    w: &Vector3f,
) -> Point3f {
    let d = n.abs().dotv(p_error);
    let mut offset = d * Vector3f::from(*n);
    if w.dotn(n) < 0.0 {
        offset = -offset;
    }
    let mut po = *p + offset;
    // Round offset point away from p
    for i in 0..3 {
        if offset[i] > 0.0 {
            po[i] = next_float_up(po[i]);
        } else if offset[i] < 0.0 {
            po[i] = next_float_down(po[i]);
        }
    }

    po
}

/// Error function approximation (Abramowitz and Stegun 7.1.26 family).
pub fn erf(x: f32) -> f32 {
    const A1: f32 = 0.254829592;
    const A2: f32 = -0.284496736;
    const A3: f32 = 1.421413741;
    const A4: f32 = -1.453152027;
    const A5: f32 = 1.061405429;
    const P: f32 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}

/// Inverse error function (Giles' polynomial approximation).
pub fn erf_inv(x: f32) -> f32 {
    let x = clamp(x, -0.99999, 0.99999);
    let mut w = -((1.0 - x) * (1.0 + x)).ln();
    let mut p;
    if w < 5.0 {
        w -= 2.5;
        p = 2.81022636e-08;
        p = 3.43273939e-07 + p * w;
        p = -3.5233877e-06 + p * w;
        p = -4.39150654e-06 + p * w;
        p = 0.00021858087 + p * w;
        p = -0.00125372503 + p * w;
        p = -0.00417768164 + p * w;
        p = 0.246640727 + p * w;
        p = 1.50140941 + p * w;
    } else {
        w = w.sqrt() - 3.0;
        p = -0.000200214257;
        p = 0.000100950558 + p * w;
        p = 0.00134934322 + p * w;
        p = -0.00367342844 + p * w;
        p = 0.00573950773 + p * w;
        p = -0.0076224613 + p * w;
        p = 0.00943887047 + p * w;
        p = 1.00167406 + p * w;
        p = 2.83297682 + p * w;
    }

    p * x
}

/// Conservative error bound carried by a point transformed once.
pub fn transformed_point_error(p: &Point3f) -> Vector3f {
    gamma(3) * Vector3f::new(p.x.abs(), p.y.abs(), p.z.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_system() {
        let v1 = Vector3f::new(0.3, -0.6, 0.74).normalize();
        let (v2, v3) = coordinate_system(&v1);
        assert!(v1.dot(&v2).abs() < 1e-6);
        assert!(v1.dot(&v3).abs() < 1e-6);
        assert!(v2.dot(&v3).abs() < 1e-6);
        assert!((v2.length() - 1.0).abs() < 1e-5);
        assert!((v3.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_reflect() {
        let wo = Vector3f::new(1.0, 0.0, 1.0).normalize();
        let n = Vector3f::new(0.0, 0.0, 1.0);
        let wi = reflect(&wo, &n);
        assert!((wi.x + wo.x).abs() < 1e-6);
        assert!((wi.z - wo.z).abs() < 1e-6);
    }

    #[test]
    fn test_refract_tir() {
        // Grazing incidence from the dense side triggers total internal
        // reflection.
        let wi = Vector3f::new(0.99, 0.0, 0.141).normalize();
        let n = Normal3f::new(0.0, 0.0, 1.0);
        assert!(refract(&wi, &n, 1.5).is_none());
    }

    #[test]
    fn test_erf_inv_roundtrip() {
        for &x in &[-0.9f32, -0.5, -0.1, 0.0, 0.1, 0.5, 0.9] {
            let y = erf(erf_inv(x));
            assert!((y - x).abs() < 1e-3, "x={} y={}", x, y);
        }
    }

    #[test]
    fn test_spherical_direction() {
        let v = spherical_direction(0.0, 1.0, 0.0);
        assert!((v.z - 1.0).abs() < 1e-6);
        let theta = 1.2f32;
        let phi = 2.3f32;
        let w = spherical_direction(theta.sin(), theta.cos(), phi);
        assert!((spherical_theta(&w) - theta).abs() < 1e-5);
        assert!((spherical_phi(&w) - phi).abs() < 1e-5);
    }
}
