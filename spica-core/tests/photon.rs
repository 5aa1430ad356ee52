use std::sync::Arc;

use spica_core::film::Film;
use spica_core::filter::BoxFilter;
use spica_core::integrator::{PpmIntegrator, SamplerIntegrator, SppmIntegrator};
use spica_core::renderer::{self, RenderOptions};
use spica_core::sampler::{RandomSampler, Sampler};
use spica_core::scenes;
use spica_core::Point2i;

#[test]
fn ppm_radius_shrinks_monotonically() {
    let scene = scenes::caustic();
    let mut ppm = PpmIntegrator::new(5, 200, 16);
    let mut sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(1, 0));
    ppm.preprocess(&scene, sampler.as_mut());
    let r0 = ppm.radius();
    assert!(r0 > 0.0);

    let mut prev = r0;
    for pass in 0..16 {
        ppm.pass_finished(&scene, pass);
        assert!(ppm.radius() < prev);
        prev = ppm.radius();
    }
    // The schedule decays slowly: after 16 passes plenty of radius is left
    assert!(ppm.radius() > r0 * 0.1);
}

#[test]
fn ppm_renders_caustic_scene() {
    let scene = scenes::caustic();
    let film = Arc::new(Film::new(Point2i::new(20, 16), Arc::new(BoxFilter)));
    let camera = scenes::cameras::caustic(Arc::clone(&film));

    let mut sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(2, 0));
    let mut integrator = PpmIntegrator::new(5, 500, 16);
    let opts = RenderOptions {
        num_threads: 2,
        output: None,
        ..RenderOptions::default()
    };
    renderer::render(&scene, &camera, sampler.as_mut(), &mut integrator, &opts)
        .expect("ppm render failed");

    let rgb = film.to_rgb(1.0);
    let mut total = 0.0;
    for v in &rgb {
        assert!(v.is_finite());
        assert!(*v >= 0.0);
        total += v;
    }
    assert!(total > 0.0, "PPM image is completely black");
}

#[test]
fn sppm_renders_caustic_scene() {
    let scene = scenes::caustic();
    let film = Arc::new(Film::new(Point2i::new(16, 12), Arc::new(BoxFilter)));
    let camera = Arc::new(scenes::cameras::caustic(Arc::clone(&film)));

    let r0 = scene.world_bounds().diagonal().length() * 0.05;
    let mut integrator = SppmIntegrator::new(camera, 4, 500, 5, r0);
    let opts = RenderOptions {
        num_threads: 2,
        output: None,
        ..RenderOptions::default()
    };
    integrator.render(&scene, &opts).expect("sppm render failed");

    // The iteration loop splats into the film
    let rgb = film.to_rgb(1.0);
    let mut total = 0.0;
    for v in &rgb {
        assert!(v.is_finite());
        assert!(*v >= 0.0);
        total += v;
    }
    assert!(total > 0.0, "SPPM image is completely black");
}
