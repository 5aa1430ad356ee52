mod argparse;

use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::ArgMatches;
use log::info;

use spica_core::camera::{Camera, PerspectiveCamera};
use spica_core::film::Film;
use spica_core::filter::{BoxFilter, Filter};
use spica_core::integrator::{
    BdptIntegrator, HierarchicalIntegrator, PathIntegrator, PpmIntegrator, PssmltIntegrator,
    SppmIntegrator, SubsurfaceObject,
};
use spica_core::renderer::{self, RenderOptions};
use spica_core::sampler::{RandomSampler, Sampler};
use spica_core::scene::Scene;
use spica_core::scenes;
use spica_core::{Error, ErrorKind, Point2i};

fn main() {
    let matches = argparse::parse_args();

    let spec = if matches.is_present("verbose") {
        "debug"
    } else {
        "info"
    };
    let _logger = flexi_logger::Logger::try_with_str(spec)
        .expect("logger spec is static")
        .start()
        .unwrap_or_else(|e| panic!("failed to initialize logger: {}", e));

    println!("spica 0.1 [{} cores detected]", num_cpus::get());
    if let Err(e) = run(&matches) {
        eprintln!("spica: {}", e);
        let code = match e.downcast_ref::<Error>() {
            Some(err) => match err.kind {
                ErrorKind::Config => 1,
                ErrorKind::Io => 2,
                ErrorKind::Runtime => 3,
            },
            None => 3,
        };
        process::exit(code);
    }
}

struct LoadedScene {
    scene: Scene,
    camera: Arc<PerspectiveCamera>,
    subsurface: Option<SubsurfaceObject>,
}

fn load_scene(name: &str, film: Arc<Film>) -> Result<LoadedScene> {
    let (scene, camera, subsurface) = match name {
        "cornell" => (
            scenes::cornell_box(),
            scenes::cameras::cornell_box(film),
            None,
        ),
        "furnace" => (
            scenes::white_furnace(),
            scenes::cameras::white_furnace(film),
            None,
        ),
        "caustic" => (scenes::caustic(), scenes::cameras::caustic(film), None),
        "glassball" => (
            scenes::glass_ball(),
            scenes::cameras::glass_ball(film),
            None,
        ),
        "subsurface" => {
            let (scene, object) = scenes::subsurface();
            (scene, scenes::cameras::subsurface(film), Some(object))
        }
        "plastic" => (
            scenes::plastic_sphere(),
            scenes::cameras::white_furnace(film),
            None,
        ),
        other => {
            return Err(anyhow!(Error::config(format!(
                "unknown scene '{}'",
                other
            ))))
        }
    };
    Ok(LoadedScene {
        scene,
        camera: Arc::new(camera),
        subsurface,
    })
}

fn run(matches: &ArgMatches<'_>) -> Result<()> {
    let samples: usize = matches
        .value_of("samples")
        .unwrap()
        .parse()
        .map_err(|_| anyhow!(Error::config("--samples expects an integer")))?;
    let width: i32 = matches
        .value_of("width")
        .unwrap()
        .parse()
        .map_err(|_| anyhow!(Error::config("--width expects an integer")))?;
    let height: i32 = matches
        .value_of("height")
        .unwrap()
        .parse()
        .map_err(|_| anyhow!(Error::config("--height expects an integer")))?;
    let num_threads = match matches.value_of("threads") {
        Some(t) => t
            .parse()
            .map_err(|_| anyhow!(Error::config("--threads expects an integer")))?,
        None => num_cpus::get(),
    };
    let output = matches.value_of("output").unwrap().to_owned();
    let integrator_name = matches.value_of("integrator").unwrap();
    let scene_name = matches.value_of("SCENE").unwrap();

    let filter: Arc<dyn Filter> = Arc::new(BoxFilter);
    let film = Arc::new(Film::new(Point2i::new(width, height), filter));
    let loaded = load_scene(scene_name, Arc::clone(&film))?;

    let opts = RenderOptions {
        num_threads,
        output: Some(output),
        ..RenderOptions::default()
    };
    info!(
        "rendering '{}' with the {} integrator at {}x{}, {} spp",
        scene_name, integrator_name, width, height, samples
    );

    let mut sampler: Box<dyn Sampler> = Box::new(RandomSampler::new(samples, 0));
    let camera: Arc<dyn Camera> = loaded.camera.clone();

    match integrator_name {
        "path" => {
            let mut integrator = PathIntegrator::new(8);
            renderer::render(
                &loaded.scene,
                &*camera,
                sampler.as_mut(),
                &mut integrator,
                &opts,
            )?;
        }
        "volpath" => {
            let mut integrator = PathIntegrator::volumetric(8);
            renderer::render(
                &loaded.scene,
                &*camera,
                sampler.as_mut(),
                &mut integrator,
                &opts,
            )?;
        }
        "bdpt" => {
            let mut integrator = BdptIntegrator::new(camera, sampler, 8);
            integrator.render(&loaded.scene, &opts)?;
        }
        "pssmlt" => {
            let mut integrator = PssmltIntegrator::new(camera, 8, samples);
            integrator.render(&loaded.scene, &opts)?;
        }
        "ppm" => {
            let mut integrator = PpmIntegrator::new(8, 100_000, 64);
            renderer::render(
                &loaded.scene,
                &*camera,
                sampler.as_mut(),
                &mut integrator,
                &opts,
            )?;
        }
        "sppm" => {
            let radius = loaded.scene.world_bounds().diagonal().length() * 0.02;
            let mut integrator = SppmIntegrator::new(camera, samples, 100_000, 8, radius);
            integrator.render(&loaded.scene, &opts)?;
        }
        "irrcache" => {
            let object = loaded.subsurface.clone().ok_or_else(|| {
                anyhow!(Error::config(
                    "the irrcache integrator needs the 'subsurface' scene"
                ))
            })?;
            let mut integrator = HierarchicalIntegrator::new(8, object, 4000, 200_000);
            renderer::render(
                &loaded.scene,
                &*camera,
                sampler.as_mut(),
                &mut integrator,
                &opts,
            )?;
        }
        other => {
            return Err(anyhow!(Error::config(format!(
                "unknown integrator '{}'",
                other
            ))))
        }
    }

    info!("done");
    Ok(())
}
