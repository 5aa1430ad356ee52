use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spica_core::bvh::Bvh;
use spica_core::material::MatteMaterial;
use spica_core::primitive::{GeometricPrimitive, Primitive};
use spica_core::ray::Ray;
use spica_core::shapes::Sphere;
use spica_core::spectrum::Spectrum;
use spica_core::transform::Transform;
use spica_core::{Point3f, Vector3f};

fn random_spheres(n: usize, seed: u64) -> Vec<Arc<dyn Primitive>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let material = Arc::new(MatteMaterial::constant(Spectrum::grey(0.5)));
    (0..n)
        .map(|_| {
            let center = Vector3f::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
            );
            let radius = rng.gen_range(0.05..1.0);
            let sphere = Arc::new(Sphere::new(
                Transform::translate(&center),
                radius,
                false,
            ));
            Arc::new(GeometricPrimitive::new(sphere, material.clone())) as Arc<dyn Primitive>
        })
        .collect()
}

fn random_ray(rng: &mut StdRng) -> Ray {
    let o = Point3f::new(
        rng.gen_range(-15.0..15.0),
        rng.gen_range(-15.0..15.0),
        rng.gen_range(-15.0..15.0),
    );
    let d = Vector3f::new(
        rng.gen_range(-1.0..1.0f32),
        rng.gen_range(-1.0..1.0f32),
        rng.gen_range(-1.0..1.0f32),
    );
    if d.length_squared() < 1e-6 {
        Ray::new(o, Vector3f::new(1.0, 0.0, 0.0))
    } else {
        Ray::new(o, d.normalize())
    }
}

/// Exhaustive linear intersection over the same primitive list.
fn naive_intersect(prims: &[Arc<dyn Primitive>], ray: &Ray) -> Option<f32> {
    let mut r = ray.clone();
    let mut hit = false;
    for p in prims {
        if p.intersect(&mut r).is_some() {
            hit = true;
        }
    }
    if hit {
        Some(r.t_max)
    } else {
        None
    }
}

#[test]
fn bvh_agrees_with_naive_loop() {
    let prims = random_spheres(200, 99);
    let bvh = Bvh::new(4, prims.clone());
    let mut rng = StdRng::seed_from_u64(123);

    let mut hits = 0;
    for _ in 0..2000 {
        let ray = random_ray(&mut rng);
        let naive_t = naive_intersect(&prims, &ray);

        let mut bvh_ray = ray.clone();
        let bvh_hit = bvh.intersect(&mut bvh_ray);
        assert_eq!(
            naive_t.is_some(),
            bvh_hit.is_some(),
            "hit disagreement for {}",
            ray
        );
        if let Some(t) = naive_t {
            hits += 1;
            let rel = (bvh_ray.t_max - t).abs() / t.max(1e-6);
            assert!(rel < 1e-4, "t_hit {} vs naive {}", bvh_ray.t_max, t);
        }

        // The predicate fast path agrees too
        assert_eq!(bvh.intersect_p(&ray), naive_t.is_some());
    }
    // Sanity: the test actually exercised intersections
    assert!(hits > 100, "only {} hits", hits);
}

#[test]
fn bvh_respects_t_max() {
    let prims = random_spheres(50, 7);
    let bvh = Bvh::new(4, prims.clone());
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..500 {
        let ray = random_ray(&mut rng);
        let mut r = ray.clone();
        if let Some(_isect) = bvh.intersect(&mut r) {
            // Clipping just before the hit must make it vanish
            let mut clipped = ray.clone();
            clipped.t_max = r.t_max * 0.99;
            assert!(
                !bvh.intersect_p(&clipped)
                    || naive_intersect(&prims, &clipped).is_some(),
                "intersect_p found a hit beyond t_max"
            );
        }
    }
}

#[test]
fn bvh_single_and_empty() {
    let empty = Bvh::new(4, Vec::new());
    let mut ray = Ray::new(Point3f::new(0.0, 0.0, -5.0), Vector3f::new(0.0, 0.0, 1.0));
    assert!(empty.intersect(&mut ray).is_none());
    assert!(!empty.intersect_p(&ray));

    let one = random_spheres(1, 42);
    let bvh = Bvh::new(4, one.clone());
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..200 {
        let ray = random_ray(&mut rng);
        assert_eq!(bvh.intersect_p(&ray), naive_intersect(&one, &ray).is_some());
    }
}
