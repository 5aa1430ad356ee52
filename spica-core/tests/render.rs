use std::sync::Arc;

use spica_core::bounds::Bounds2i;
use spica_core::camera::Camera;
use spica_core::film::Film;
use spica_core::filter::BoxFilter;
use spica_core::integrator::PathIntegrator;
use spica_core::renderer::{self, RenderOptions};
use spica_core::sampler::{RandomSampler, Sampler};
use spica_core::scenes;
use spica_core::Point2i;

fn render_film(
    scene: &spica_core::scene::Scene,
    camera: &dyn Camera,
    spp: usize,
    threads: usize,
) -> Vec<f32> {
    let mut sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(spp, 0));
    let mut integrator = PathIntegrator::new(8);
    let opts = RenderOptions {
        num_threads: threads,
        output: None,
        ..RenderOptions::default()
    };
    renderer::render(scene, camera, sampler.as_mut(), &mut integrator, &opts)
        .expect("render failed");
    camera.film().to_rgb(1.0)
}

#[test]
fn white_furnace_reproduces_the_environment() {
    // A unit-albedo sphere in a unit radiance field disappears: every
    // silhouette pixel converges to radiance 1.
    let scene = scenes::white_furnace();
    let film = Arc::new(Film::new(Point2i::new(24, 24), Arc::new(BoxFilter)));
    let camera = scenes::cameras::white_furnace(Arc::clone(&film));

    let mut sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(64, 0));
    let mut integrator = PathIntegrator::new(8);
    let opts = RenderOptions {
        num_threads: 2,
        output: None,
        ..RenderOptions::default()
    };
    renderer::render(&scene, &camera, sampler.as_mut(), &mut integrator, &opts)
        .expect("render failed");

    // The central pixels look straight at the sphere
    let mean = film
        .mean_over(&Bounds2i::from_elements(10, 10, 14, 14), 1.0)
        .y();
    assert!(
        (mean - 1.0).abs() < 0.05,
        "furnace mean luminance {} should be ~1",
        mean
    );
}

#[test]
fn cornell_box_renders_finite_energy() {
    let scene = scenes::cornell_box();
    let film = Arc::new(Film::new(Point2i::new(32, 24), Arc::new(BoxFilter)));
    let camera = scenes::cameras::cornell_box(Arc::clone(&film));
    let rgb = render_film(&scene, &camera, 8, 2);

    let mut total = 0.0;
    for v in &rgb {
        assert!(v.is_finite(), "non-finite pixel value");
        assert!(*v >= 0.0, "negative pixel value");
        total += v;
    }
    assert!(total > 0.0, "image is completely black");
}

#[test]
fn render_is_deterministic_across_thread_counts() {
    let scene = scenes::cornell_box();

    let film1 = Arc::new(Film::new(Point2i::new(20, 16), Arc::new(BoxFilter)));
    let cam1 = scenes::cameras::cornell_box(Arc::clone(&film1));
    let rgb1 = render_film(&scene, &cam1, 2, 1);

    let film2 = Arc::new(Film::new(Point2i::new(20, 16), Arc::new(BoxFilter)));
    let cam2 = scenes::cameras::cornell_box(Arc::clone(&film2));
    let rgb2 = render_film(&scene, &cam2, 2, 4);

    assert_eq!(rgb1.len(), rgb2.len());
    for (a, b) in rgb1.iter().zip(rgb2.iter()) {
        assert_eq!(a.to_bits(), b.to_bits(), "thread count changed the image");
    }
}

#[test]
fn volumetric_path_handles_glass_ball_scene() {
    let scene = scenes::glass_ball();
    let film = Arc::new(Film::new(Point2i::new(24, 18), Arc::new(BoxFilter)));
    let camera = scenes::cameras::glass_ball(Arc::clone(&film));

    let mut sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(4, 0));
    let mut integrator = PathIntegrator::volumetric(8);
    let opts = RenderOptions {
        num_threads: 2,
        output: None,
        ..RenderOptions::default()
    };
    renderer::render(&scene, &camera, sampler.as_mut(), &mut integrator, &opts)
        .expect("render failed");

    for v in film.to_rgb(1.0) {
        assert!(v.is_finite());
        assert!(v >= 0.0);
    }
}
