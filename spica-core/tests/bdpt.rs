use std::sync::Arc;

use spica_core::bounds::Bounds2i;
use spica_core::camera::Camera;
use spica_core::film::Film;
use spica_core::filter::BoxFilter;
use spica_core::integrator::{BdptIntegrator, PathIntegrator};
use spica_core::renderer::{self, RenderOptions};
use spica_core::sampler::{RandomSampler, Sampler};
use spica_core::scenes;
use spica_core::Point2i;

#[test]
fn bdpt_produces_finite_image() {
    let scene = scenes::cornell_box();
    let film = Arc::new(Film::new(Point2i::new(20, 16), Arc::new(BoxFilter)));
    let camera = Arc::new(scenes::cameras::cornell_box(Arc::clone(&film)));

    let sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(4, 0));
    let mut integrator = BdptIntegrator::new(camera, sampler, 5);
    let opts = RenderOptions {
        num_threads: 2,
        output: None,
        ..RenderOptions::default()
    };
    integrator.render(&scene, &opts).expect("bdpt render failed");

    let rgb = film.to_rgb(integrator.splat_scale());
    let mut total = 0.0;
    for v in &rgb {
        assert!(v.is_finite(), "non-finite BDPT pixel");
        assert!(*v >= 0.0);
        total += v;
    }
    assert!(total > 0.0, "BDPT image is completely black");
}

#[test]
fn bdpt_matches_path_tracing_in_the_mean() {
    // Both integrators are unbiased; their overall image brightness must
    // agree. Tolerances are loose because sample counts are tiny.
    let scene = scenes::cornell_box();

    let film_pt = Arc::new(Film::new(Point2i::new(16, 12), Arc::new(BoxFilter)));
    let cam_pt = scenes::cameras::cornell_box(Arc::clone(&film_pt));
    let mut sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(64, 0));
    let mut pt = PathIntegrator::new(5);
    let opts = RenderOptions {
        num_threads: 2,
        output: None,
        ..RenderOptions::default()
    };
    renderer::render(&scene, &cam_pt, sampler.as_mut(), &mut pt, &opts)
        .expect("path render failed");
    let region = Bounds2i::from_elements(0, 0, 16, 12);
    let mean_pt = film_pt.mean_over(&region, 1.0).y();

    let film_bdpt = Arc::new(Film::new(Point2i::new(16, 12), Arc::new(BoxFilter)));
    let cam_bdpt = Arc::new(scenes::cameras::cornell_box(Arc::clone(&film_bdpt)));
    let sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(64, 0));
    let mut bdpt = BdptIntegrator::new(cam_bdpt, sampler, 5);
    bdpt.render(&scene, &opts).expect("bdpt render failed");
    let mean_bdpt = film_bdpt.mean_over(&region, bdpt.splat_scale()).y();

    assert!(mean_pt > 0.0 && mean_bdpt > 0.0);
    let rel = (mean_pt - mean_bdpt).abs() / mean_pt;
    assert!(
        rel < 0.25,
        "PT mean {} vs BDPT mean {} differ by {}",
        mean_pt,
        mean_bdpt,
        rel
    );
}
