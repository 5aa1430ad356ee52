use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spica_core::filter::{BoxFilter, Filter, GaussianFilter, TriangleFilter};

/// Sum the filter weights over all pixel centers inside the support around
/// an arbitrary sub-pixel sample position.
fn weight_sum(filter: &dyn Filter, px: f32, py: f32) -> f64 {
    let (rx, ry) = filter.radius();
    // Discrete pixel coordinates, as the film computes them
    let dx = px - 0.5;
    let dy = py - 0.5;
    let x0 = (dx - rx).ceil() as i32;
    let x1 = (dx + rx).floor() as i32;
    let y0 = (dy - ry).ceil() as i32;
    let y1 = (dy + ry).floor() as i32;
    let mut sum = 0.0f64;
    for y in y0..=y1 {
        for x in x0..=x1 {
            sum += f64::from(filter.evaluate(x as f32 - dx, y as f32 - dy));
        }
    }
    sum
}

#[test]
fn box_filter_partition_of_unity() {
    let f = BoxFilter;
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..1000 {
        let px = rng.gen_range(2.0..30.0);
        let py = rng.gen_range(2.0..30.0);
        let sum = weight_sum(&f, px, py);
        assert!((sum - 1.0).abs() < 1e-12, "sum = {} at ({}, {})", sum, px, py);
    }
}

#[test]
fn tent_filter_partition_of_unity() {
    let f = TriangleFilter::default();
    let mut rng = StdRng::seed_from_u64(18);
    for _ in 0..1000 {
        let px = rng.gen_range(2.0..30.0);
        let py = rng.gen_range(2.0..30.0);
        let sum = weight_sum(&f, px, py);
        assert!((sum - 1.0).abs() < 1e-5, "sum = {} at ({}, {})", sum, px, py);
    }
}

#[test]
fn gaussian_weights_positive_inside_support() {
    let f = GaussianFilter::default();
    let (rx, ry) = f.radius();
    assert!(f.evaluate(0.0, 0.0) > 0.0);
    assert!(f.evaluate(rx * 0.9, 0.0) > 0.0);
    // Zero at and beyond the radius
    assert!(f.evaluate(rx, 0.0).abs() < 1e-6);
    assert!(f.evaluate(0.0, ry + 0.1) == 0.0);
}
