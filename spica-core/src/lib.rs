#![deny(unused_must_use)]
#![warn(rust_2018_idioms)]
#![allow(non_snake_case)]
// Clippy config
#![allow(
    clippy::float_cmp,
    clippy::many_single_char_names,
    clippy::excessive_precision,
    clippy::too_many_arguments
)]

use std::f32;
use std::ops::{Add, Mul, Sub};

use num::{Num, One, Signed};

pub mod bounds;
pub mod bsdf;
pub mod bssrdf;
pub mod bvh;
pub mod camera;
pub mod efloat;
pub mod film;
pub mod filter;
mod geometry;
pub mod imageio;
pub mod integrator;
pub mod interaction;
pub mod light;
pub mod lightdistrib;
pub mod material;
pub mod medium;
pub mod primitive;
pub mod ray;
pub mod renderer;
pub mod rng;
pub mod sampler;
pub mod sampling;
pub mod scene;
pub mod scenes;
pub mod shapes;
pub mod spectrum;
pub mod texture;
pub mod transform;

pub use crate::geometry::{Normal3, Point2, Point3, Vector2, Vector3};
use crate::spectrum::Spectrum;

pub type Vector2f = Vector2<f32>;
pub type Vector3f = Vector3<f32>;
pub type Point2f = Point2<f32>;
pub type Point2i = Point2<i32>;
pub type Point3f = Point3<f32>;
pub type Point3i = Point3<i32>;
pub type Normal3f = Normal3<f32>;

pub use crate::geometry::{
    coordinate_system, distance, distance_squared, face_forward, face_forward_n,
    offset_ray_origin, reflect, refract, same_hemisphere, spherical_direction, spherical_phi,
    spherical_theta,
};
pub use crate::transform::Transform;

pub const INV_PI: f32 = 0.31830988618379067154;
pub const INV_2_PI: f32 = 0.15915494309189533577;
pub const INV_4_PI: f32 = 0.07957747154594766788;
pub const PI_OVER_2: f32 = 1.57079632679489661923;
pub const PI_OVER_4: f32 = 0.78539816339744830961;
pub const SQRT_2: f32 = 1.41421356237309504880;

pub const MACHINE_EPSILON: f32 = f32::EPSILON * 0.5;

/// Conservative error bound for n chained floating point operations.
pub fn gamma(n: u32) -> f32 {
    (n as f32 * MACHINE_EPSILON) / (1.0 - n as f32 * MACHINE_EPSILON)
}

/// Smallest representable float strictly less than 1.
pub const ONE_MINUS_EPSILON: f32 = 0.99999994f32;

/// Kinds of failures a render run can report, so the shell can map them to
/// exit codes. Everything else travels as `anyhow` context.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad scene / integrator / parameter configuration.
    Config,
    /// File could not be opened or written.
    Io,
    /// Failure while rendering.
    Runtime,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Error {
        Error {
            kind: ErrorKind::Config,
            msg: msg.into(),
        }
    }

    pub fn io<S: Into<String>>(msg: S) -> Error {
        Error {
            kind: ErrorKind::Io,
            msg: msg.into(),
        }
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Error {
        Error {
            kind: ErrorKind::Runtime,
            msg: msg.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::Config => write!(f, "configuration error: {}", self.msg),
            ErrorKind::Io => write!(f, "i/o error: {}", self.msg),
            ErrorKind::Runtime => write!(f, "runtime error: {}", self.msg),
        }
    }
}

impl std::error::Error for Error {}

/// Linear interpolation between 2 values.
///
/// Generic enough to interpolate between 2 Spectrums with an f32 parameter.
pub fn lerp<S, T>(t: S, a: T, b: T) -> T
where
    S: One,
    S: Sub<S, Output = S>,
    S: Copy,
    T: Add<T, Output = T>,
    T: Mul<S, Output = T>,
{
    let one: S = num::one();
    a * (one - t) + b * t
}

/// Return the dimension index (0, 1 or 2) that contains the largest component.
pub fn max_dimension<T>(v: &Vector3<T>) -> usize
where
    T: Num + PartialOrd,
{
    if v.x > v.y {
        if v.x > v.z {
            0
        } else {
            2
        }
    } else if v.y > v.z {
        1
    } else {
        2
    }
}

pub fn max_component(v: &Vector3f) -> f32 {
    f32::max(v.x, f32::max(v.y, v.z))
}

/// Permute the components of a vector based on the given indices for x, y, z.
pub fn permute_v<T>(v: &Vector3<T>, x: usize, y: usize, z: usize) -> Vector3<T>
where
    T: Num + Copy,
{
    Vector3::new(v[x], v[y], v[z])
}

pub fn permute_p<T>(v: &Point3<T>, x: usize, y: usize, z: usize) -> Point3<T>
where
    T: Num + Signed + Copy,
{
    Point3::new(v[x], v[y], v[z])
}

/// Binary search over a virtual array, returning the index of the last
/// element for which `pred` holds, clamped to [0, size-2].
pub fn find_interval<P>(size: usize, pred: P) -> usize
where
    P: Fn(usize) -> bool,
{
    let mut first = 0;
    let mut len = size;
    while len > 0 {
        let half = len >> 1;
        let middle = first + half;
        if pred(middle) {
            first = middle + 1;
            len -= half + 1;
        } else {
            len = half;
        }
    }
    clamp(first as isize - 1, 0, size as isize - 2) as usize
}

/// Version of min() that works on `PartialOrd`, so it works for both u32 and f32.
pub fn min<T: PartialOrd + Copy>(a: T, b: T) -> T {
    if a.lt(&b) {
        a
    } else {
        b
    }
}

/// Version of max() that works on `PartialOrd`, so it works for both u32 and f32.
pub fn max<T: PartialOrd + Copy>(a: T, b: T) -> T {
    if a.gt(&b) {
        a
    } else {
        b
    }
}

#[inline]
pub fn next_float_up(v: f32) -> f32 {
    let mut v = v;
    if v.is_infinite() && v > 0.0 {
        return v;
    }

    if v == -0.0 {
        v = 0.0;
    }
    let mut ui = v.to_bits();
    if v >= 0.0 {
        ui += 1;
    } else {
        ui -= 1;
    }
    f32::from_bits(ui)
}

#[inline]
pub fn next_float_down(v: f32) -> f32 {
    let mut v = v;
    if v.is_infinite() && v < 0.0 {
        return v;
    }

    if v == 0.0 {
        v = -0.0;
    }
    let mut ui = v.to_bits();
    if v > 0.0 {
        ui -= 1;
    } else {
        ui += 1;
    }
    f32::from_bits(ui)
}

pub fn clamp<T>(val: T, low: T, high: T) -> T
where
    T: PartialOrd + Copy,
{
    if val < low {
        low
    } else if val > high {
        high
    } else {
        val
    }
}

pub trait Clampable {
    fn clamp(self, min: f32, max: f32) -> Self;
}

impl Clampable for f32 {
    fn clamp(self, min: f32, max: f32) -> f32 {
        clamp(self, min, max)
    }
}

impl Clampable for Spectrum {
    fn clamp(self, min: f32, max: f32) -> Spectrum {
        Spectrum::rgb(
            clamp(self.r, min, max),
            clamp(self.g, min, max),
            clamp(self.b, min, max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_interval() {
        let a = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

        // check clamping for out of range
        assert_eq!(0, find_interval(a.len(), |index| a[index] as isize <= -1));
        assert_eq!(a.len() - 2, find_interval(a.len(), |index| a[index] <= 100));

        for i in 0..a.len() - 1 {
            assert_eq!(i, find_interval(a.len(), |index| a[index] <= i));
            assert_eq!(
                i,
                find_interval(a.len(), |index| a[index] as f32 <= i as f32 + 0.5)
            );
            if i > 0 {
                assert_eq!(
                    i - 1,
                    find_interval(a.len(), |index| a[index] as f32 <= i as f32 - 0.5)
                );
            }
        }
    }

    #[test]
    fn test_next_float() {
        let x = 1.5f32;
        assert!(next_float_up(x) > x);
        assert!(next_float_down(x) < x);
        assert_eq!(next_float_down(next_float_up(x)), x);
        assert!(next_float_up(0.0) > 0.0);
        assert!(next_float_down(0.0) < 0.0);
    }

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(0.5, 1.0, 3.0), 2.0);
        assert_eq!(lerp(0.0, 1.0, 3.0), 1.0);
        assert_eq!(lerp(1.0, 1.0, 3.0), 3.0);
    }
}
