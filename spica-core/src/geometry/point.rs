use std::fmt::{Display, Error, Formatter};
use std::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, Neg, Sub, SubAssign};

use num::{Num, Zero};

use super::{Vector2, Vector3};

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Point2<T> {
    pub x: T,
    pub y: T,
}

impl<T> Point2<T> {
    pub fn new(x: T, y: T) -> Point2<T> {
        Point2 { x, y }
    }
}

impl Point2<f32> {
    pub fn has_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }
}

impl<T> Add<Vector2<T>> for Point2<T>
where
    T: Add<Output = T> + Copy,
{
    type Output = Point2<T>;

    fn add(self, rhs: Vector2<T>) -> Point2<T> {
        Point2 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl<T> Add<Point2<T>> for Point2<T>
where
    T: Add<Output = T> + Copy,
{
    type Output = Point2<T>;

    fn add(self, rhs: Point2<T>) -> Point2<T> {
        Point2 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl<T> Sub<Point2<T>> for Point2<T>
where
    T: Sub<Output = T> + Copy,
{
    type Output = Vector2<T>;

    fn sub(self, rhs: Point2<T>) -> Vector2<T> {
        Vector2 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl<T> Sub<Vector2<T>> for Point2<T>
where
    T: Sub<Output = T> + Copy,
{
    type Output = Point2<T>;

    fn sub(self, rhs: Vector2<T>) -> Point2<T> {
        Point2 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl<T> Mul<T> for Point2<T>
where
    T: Mul<Output = T> + Copy,
{
    type Output = Point2<T>;

    fn mul(self, rhs: T) -> Point2<T> {
        Point2 {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Mul<Point2<f32>> for f32 {
    type Output = Point2<f32>;

    fn mul(self, p: Point2<f32>) -> Point2<f32> {
        p * self
    }
}

impl<T> Index<usize> for Point2<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match index {
            0 => &self.x,
            1 => &self.y,
            _ => panic!("Invalid index into point"),
        }
    }
}

impl<T> Zero for Point2<T>
where
    T: Num + Copy,
{
    fn zero() -> Point2<T> {
        Point2::new(T::zero(), T::zero())
    }

    fn is_zero(&self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }
}

impl From<Point2<i32>> for Point2<f32> {
    fn from(p: Point2<i32>) -> Point2<f32> {
        Point2::new(p.x as f32, p.y as f32)
    }
}

impl From<Point2<f32>> for Point2<i32> {
    fn from(p: Point2<f32>) -> Point2<i32> {
        Point2::new(p.x as i32, p.y as i32)
    }
}

impl<T> From<Vector2<T>> for Point2<T> {
    fn from(v: Vector2<T>) -> Point2<T> {
        Point2 { x: v.x, y: v.y }
    }
}

impl<T: Display> Display for Point2<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Point3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T> Point3<T> {
    pub fn new(x: T, y: T, z: T) -> Point3<T> {
        Point3 { x, y, z }
    }
}

impl Point3<f32> {
    pub fn has_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }

    pub fn abs(&self) -> Point3<f32> {
        Point3::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    pub fn min_componentwise(&self, other: &Point3<f32>) -> Point3<f32> {
        Point3::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    pub fn max_componentwise(&self, other: &Point3<f32>) -> Point3<f32> {
        Point3::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }
}

impl<T> Add<Vector3<T>> for Point3<T>
where
    T: Add<Output = T> + Copy,
{
    type Output = Point3<T>;

    fn add(self, rhs: Vector3<T>) -> Point3<T> {
        Point3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

// Adding two points only makes sense as part of a weighted sum; it is needed
// for expressions like the bounds centroid.
impl<T> Add<Point3<T>> for Point3<T>
where
    T: Add<Output = T> + Copy,
{
    type Output = Point3<T>;

    fn add(self, rhs: Point3<T>) -> Point3<T> {
        Point3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl<T> AddAssign<Vector3<T>> for Point3<T>
where
    T: AddAssign + Copy,
{
    fn add_assign(&mut self, rhs: Vector3<T>) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl<T> Sub<Point3<T>> for Point3<T>
where
    T: Sub<Output = T> + Copy,
{
    type Output = Vector3<T>;

    fn sub(self, rhs: Point3<T>) -> Vector3<T> {
        Vector3 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl<T> Sub<Vector3<T>> for Point3<T>
where
    T: Sub<Output = T> + Copy,
{
    type Output = Point3<T>;

    fn sub(self, rhs: Vector3<T>) -> Point3<T> {
        Point3 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl<T> SubAssign<Vector3<T>> for Point3<T>
where
    T: SubAssign + Copy,
{
    fn sub_assign(&mut self, rhs: Vector3<T>) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl<T> Mul<T> for Point3<T>
where
    T: Mul<Output = T> + Copy,
{
    type Output = Point3<T>;

    fn mul(self, rhs: T) -> Point3<T> {
        Point3 {
            x: self.x * rhs,
            y: self.y * rhs,
            z: self.z * rhs,
        }
    }
}

impl Mul<Point3<f32>> for f32 {
    type Output = Point3<f32>;

    fn mul(self, p: Point3<f32>) -> Point3<f32> {
        p * self
    }
}

impl<T> Div<T> for Point3<T>
where
    T: Div<Output = T> + Copy,
{
    type Output = Point3<T>;

    fn div(self, rhs: T) -> Point3<T> {
        Point3 {
            x: self.x / rhs,
            y: self.y / rhs,
            z: self.z / rhs,
        }
    }
}

impl<T> Neg for Point3<T>
where
    T: Neg<Output = T>,
{
    type Output = Point3<T>;

    fn neg(self) -> Point3<T> {
        Point3 {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl<T> Index<usize> for Point3<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Invalid index into point"),
        }
    }
}

impl<T> IndexMut<usize> for Point3<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        match index {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Invalid index into point"),
        }
    }
}

impl<T> Zero for Point3<T>
where
    T: Num + Copy,
{
    fn zero() -> Point3<T> {
        Point3::new(T::zero(), T::zero(), T::zero())
    }

    fn is_zero(&self) -> bool {
        self.x.is_zero() && self.y.is_zero() && self.z.is_zero()
    }
}

impl<T> From<Vector3<T>> for Point3<T> {
    fn from(v: Vector3<T>) -> Point3<T> {
        Point3 {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl<T: Display> Display for Point3<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
