use std::mem;
use std::ops::{Add, Div, Mul, Sub};

use crate::{next_float_down, next_float_up, MACHINE_EPSILON};

/// Float carrying a conservative error interval, used by the shape
/// intersection routines so hit points can report how far off they may be.
#[derive(Debug, Clone, Copy, Default)]
pub struct EFloat {
    v: f32,
    low: f32,
    high: f32,
}

impl EFloat {
    pub fn new(v: f32, err: f32) -> EFloat {
        let (low, high) = if err == 0.0 {
            (v, v)
        } else {
            (next_float_down(v - err), next_float_up(v + err))
        };

        let r = EFloat { v, low, high };
        r.check();
        r
    }

    pub fn lower_bound(self) -> f32 {
        self.low
    }

    pub fn upper_bound(self) -> f32 {
        self.high
    }

    pub fn absolute_error(self) -> f32 {
        self.high - self.low
    }

    pub fn sqrt(self) -> EFloat {
        let r = EFloat {
            v: self.v.sqrt(),
            low: next_float_down(self.low.sqrt()),
            high: next_float_up(self.high.sqrt()),
        };
        r.check();
        r
    }

    pub fn abs(self) -> EFloat {
        let r = if self.low >= 0.0 {
            self
        } else if self.high <= 0.0 {
            EFloat {
                v: -self.v,
                low: -self.high,
                high: -self.low,
            }
        } else {
            // Interval straddles zero
            EFloat {
                v: self.v.abs(),
                low: 0.0,
                high: (-self.low).max(self.high),
            }
        };
        r.check();
        r
    }

    #[inline]
    fn check(&self) {
        debug_assert!(!self.v.is_nan());
        if self.low.is_finite() && self.high.is_finite() {
            debug_assert!(self.low <= self.high);
            debug_assert!(self.low <= self.v && self.v <= self.high);
        }
    }
}

/// Solve a*t^2 + b*t + c = 0, carrying error intervals through. The
/// discriminant is computed in double precision to dodge cancellation.
pub fn solve_quadratic(a: EFloat, b: EFloat, c: EFloat) -> Option<(EFloat, EFloat)> {
    let discrim = f64::from(b.v) * f64::from(b.v) - 4f64 * f64::from(a.v) * f64::from(c.v);
    if discrim < 0.0 {
        return None;
    }

    let root_discrim = discrim.sqrt();
    let float_root_discrim =
        EFloat::new(root_discrim as f32, MACHINE_EPSILON * root_discrim as f32);

    let q = if b.v < 0.0 {
        -0.5 * (b - float_root_discrim)
    } else {
        -0.5 * (b + float_root_discrim)
    };
    let mut t0 = q / a;
    let mut t1 = c / q;
    if t0.v > t1.v {
        mem::swap(&mut t0, &mut t1);
    }

    Some((t0, t1))
}

impl PartialEq for EFloat {
    fn eq(&self, other: &Self) -> bool {
        self.v == other.v
    }
}

impl Add<EFloat> for EFloat {
    type Output = EFloat;

    fn add(self, f: EFloat) -> EFloat {
        let r = EFloat {
            v: self.v + f.v,
            low: next_float_down(self.low + f.low),
            high: next_float_up(self.high + f.high),
        };
        r.check();
        r
    }
}

impl Sub<EFloat> for EFloat {
    type Output = EFloat;

    fn sub(self, f: EFloat) -> EFloat {
        let r = EFloat {
            v: self.v - f.v,
            low: next_float_down(self.low - f.high),
            high: next_float_up(self.high - f.low),
        };
        r.check();
        r
    }
}

impl Mul<EFloat> for EFloat {
    type Output = EFloat;

    fn mul(self, f: EFloat) -> EFloat {
        let prod = [
            self.low * f.low,
            self.high * f.low,
            self.low * f.high,
            self.high * f.high,
        ];

        let r = EFloat {
            v: self.v * f.v,
            low: next_float_down(f32::min(f32::min(prod[0], prod[1]), f32::min(prod[2], prod[3]))),
            high: next_float_up(f32::max(f32::max(prod[0], prod[1]), f32::max(prod[2], prod[3]))),
        };
        r.check();
        r
    }
}

impl Div<EFloat> for EFloat {
    type Output = EFloat;

    fn div(self, f: EFloat) -> EFloat {
        let (low, high) = if f.low < 0.0 && f.high > 0.0 {
            // Dividing by an interval containing zero blows the bound up.
            (f32::NEG_INFINITY, f32::INFINITY)
        } else {
            let div = [
                self.low / f.low,
                self.high / f.low,
                self.low / f.high,
                self.high / f.high,
            ];
            (
                next_float_down(f32::min(f32::min(div[0], div[1]), f32::min(div[2], div[3]))),
                next_float_up(f32::max(f32::max(div[0], div[1]), f32::max(div[2], div[3]))),
            )
        };
        EFloat {
            v: self.v / f.v,
            low,
            high,
        }
    }
}

impl From<f32> for EFloat {
    fn from(v: f32) -> EFloat {
        EFloat::new(v, 0.0)
    }
}

impl From<EFloat> for f32 {
    fn from(v: EFloat) -> f32 {
        v.v
    }
}

impl Add<f32> for EFloat {
    type Output = EFloat;
    fn add(self, f: f32) -> EFloat {
        self + EFloat::from(f)
    }
}

impl Sub<f32> for EFloat {
    type Output = EFloat;
    fn sub(self, f: f32) -> EFloat {
        self - EFloat::from(f)
    }
}

impl Mul<f32> for EFloat {
    type Output = EFloat;
    fn mul(self, f: f32) -> EFloat {
        self * EFloat::from(f)
    }
}

impl Div<f32> for EFloat {
    type Output = EFloat;
    fn div(self, f: f32) -> EFloat {
        self / EFloat::from(f)
    }
}

impl Add<EFloat> for f32 {
    type Output = EFloat;
    fn add(self, f: EFloat) -> EFloat {
        EFloat::from(self) + f
    }
}

impl Sub<EFloat> for f32 {
    type Output = EFloat;
    fn sub(self, f: EFloat) -> EFloat {
        EFloat::from(self) - f
    }
}

impl Mul<EFloat> for f32 {
    type Output = EFloat;
    fn mul(self, f: EFloat) -> EFloat {
        EFloat::from(self) * f
    }
}

impl Div<EFloat> for f32 {
    type Output = EFloat;
    fn div(self, f: EFloat) -> EFloat {
        EFloat::from(self) / f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_contains_value() {
        let a = EFloat::new(1.0, 1e-5);
        let b = EFloat::new(2.0, 1e-5);
        let c = a * b + a - b / a;
        assert!(c.lower_bound() <= f32::from(c));
        assert!(f32::from(c) <= c.upper_bound());
    }

    #[test]
    fn test_quadratic_roots() {
        // (t - 2)(t - 3) = t^2 - 5t + 6
        let (t0, t1) = solve_quadratic(EFloat::from(1.0), EFloat::from(-5.0), EFloat::from(6.0))
            .expect("real roots");
        assert!((f32::from(t0) - 2.0).abs() < 1e-5);
        assert!((f32::from(t1) - 3.0).abs() < 1e-5);
        // No real roots
        assert!(solve_quadratic(EFloat::from(1.0), EFloat::from(0.0), EFloat::from(1.0)).is_none());
    }
}
