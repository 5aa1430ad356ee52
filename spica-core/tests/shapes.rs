use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spica_core::ray::Ray;
use spica_core::sampling;
use spica_core::shapes::{Disk, Quad, Shape, Sphere};
use spica_core::transform::Transform;
use spica_core::{Point2f, Point3f, Vector3f};

fn pexp<T: Rng>(rng: &mut T, exp: f32) -> f32 {
    let logu: f32 = rng.gen_range(-exp..=exp);
    10.0f32.powf(logu)
}

/// Spawn rays leaving a random intersection point and make sure none of
/// them re-hits the surface they left.
fn test_reintersection_convex(shape: &dyn Shape, rng: &mut StdRng) {
    let o = Point3f::new(pexp(rng, 4.0), pexp(rng, 4.0), pexp(rng, 4.0));
    let bounds = shape.world_bounds();
    let t = Point3f::new(rng.gen(), rng.gen(), rng.gen());
    let p = bounds.lerp(&t);
    let d = p - o;
    if d.length_squared() == 0.0 {
        return;
    }
    let ray = Ray::new(o, d.normalize());

    if let Some((isect, _t_hit)) = shape.intersect(&ray) {
        for _ in 0..500 {
            let u = Point2f::new(rng.gen(), rng.gen());
            let mut w = sampling::uniform_sample_sphere(u);
            if w.dotn(&isect.hit.n) < 0.0 {
                w = -w;
            }
            if w.dotn(&isect.hit.n) == 0.0 {
                continue;
            }
            let ray_out = isect.hit.spawn_ray(&w);
            assert!(!shape.intersect_p(&ray_out), "shadow ray re-hit the surface");
            assert!(shape.intersect(&ray_out).is_none(), "ray re-hit the surface");
        }
    }
}

#[test]
fn sphere_reintersect() {
    for i in 0..200 {
        let mut rng = StdRng::seed_from_u64(i);
        let radius = pexp(&mut rng, 3.0);
        let sphere = Sphere::new(Transform::default(), radius, false);
        test_reintersection_convex(&sphere, &mut rng);
    }
}

#[test]
fn translated_sphere_reintersect() {
    for i in 0..100 {
        let mut rng = StdRng::seed_from_u64(1000 + i);
        let radius = pexp(&mut rng, 2.0);
        let offset = Vector3f::new(
            pexp(&mut rng, 3.0),
            pexp(&mut rng, 3.0),
            pexp(&mut rng, 3.0),
        );
        let sphere = Sphere::new(Transform::translate(&offset), radius, false);
        test_reintersection_convex(&sphere, &mut rng);
    }
}

#[test]
fn quad_reintersect() {
    for i in 0..200 {
        let mut rng = StdRng::seed_from_u64(2000 + i);
        let scale = pexp(&mut rng, 2.0);
        let quad = Quad::new(
            Point3f::new(-scale, 0.0, -scale),
            Vector3f::new(2.0 * scale, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 2.0 * scale),
        );
        test_reintersection_convex(&quad, &mut rng);
    }
}

#[test]
fn disk_reintersect() {
    for i in 0..200 {
        let mut rng = StdRng::seed_from_u64(3000 + i);
        let radius = pexp(&mut rng, 2.0);
        let disk = Disk::new(Transform::default(), 0.0, radius, 0.0, false);
        test_reintersection_convex(&disk, &mut rng);
    }
}

#[test]
fn sphere_solid_angle_sampling_hits_sphere() {
    // Directions produced by cone sampling from an outside reference point
    // must actually intersect the sphere.
    let sphere = Sphere::new(Transform::default(), 1.0, false);
    let mut rng = StdRng::seed_from_u64(4000);
    let re = spica_core::interaction::Interaction::from_point(&Point3f::new(0.0, 0.0, 4.0));
    for _ in 0..500 {
        let u = Point2f::new(rng.gen(), rng.gen());
        let (it, pdf) = sphere.sample_from(&re, u);
        assert!(pdf > 0.0);
        let wi = (it.p - re.p).normalize();
        let probe = Ray::new(re.p, wi);
        assert!(sphere.intersect_p(&probe));
    }
}
