use std::f32::INFINITY;
use std::fmt;
use std::sync::Arc;

use crate::medium::Medium;
use crate::{Point3f, Vector3f};

/// Ray with parametric clipping. `t_max` shrinks as nearer intersections are
/// found; `medium` is the medium the ray currently travels through, if any.
#[derive(Clone)]
pub struct Ray {
    pub o: Point3f,
    pub d: Vector3f,
    pub t_max: f32,
    pub medium: Option<Arc<dyn Medium>>,
}

impl Ray {
    pub fn new(o: Point3f, d: Vector3f) -> Ray {
        debug_assert!(!o.has_nan() && !d.has_nan());
        debug_assert!(d.length_squared() != 0.0);
        Ray {
            o,
            d,
            t_max: INFINITY,
            medium: None,
        }
    }

    /// Ray clipped to a segment, used for shadow/visibility queries.
    pub fn segment(o: Point3f, d: Vector3f, t_max: f32) -> Ray {
        debug_assert!(!o.has_nan() && !d.has_nan());
        debug_assert!(d.length_squared() != 0.0);
        Ray {
            o,
            d,
            t_max,
            medium: None,
        }
    }

    pub fn with_medium(mut self, medium: Option<Arc<dyn Medium>>) -> Ray {
        self.medium = medium;
        self
    }

    pub fn at(&self, t: f32) -> Point3f {
        self.o + self.d * t
    }
}

impl fmt::Debug for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ray {{ o: {:?}, d: {:?}, t_max: {} }}",
            self.o, self.d, self.t_max
        )
    }
}

impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[o={}, d={}, t_max={}]", self.o, self.d, self.t_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transform;

    #[test]
    fn test_at() {
        let r = Ray::new(Point3f::new(1.0, 0.0, 0.0), Vector3f::new(0.0, 1.0, 0.0));
        assert_eq!(r.at(2.0), Point3f::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_transform() {
        let r = Ray::new(Point3f::new(1.0, 0.0, 0.0), Vector3f::new(0.0, 1.0, 0.0));
        let t = Transform::translate(&Vector3f::new(1.0, 1.0, 1.0));
        let s = t.transform_ray(&r);
        assert_eq!(s.o, Point3f::new(2.0, 1.0, 1.0));
        assert_eq!(s.d, r.d);
    }
}
