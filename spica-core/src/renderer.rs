use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use bumpalo::Bump;
use log::{error, info};
use parking_lot::Mutex;

use crate::bounds::Bounds2i;
use crate::camera::Camera;
use crate::film::FilmTile;
use crate::integrator::SamplerIntegrator;
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::Point2i;

/// Settings shared by all render entry points.
pub struct RenderOptions {
    pub num_threads: usize,
    pub block_size: i32,
    /// Checkpoint pattern, e.g. `image_%03d.png`. Written after every pass.
    pub output: Option<String>,
    /// Cooperative cancellation: workers drain their current tile and stop.
    pub stop: Arc<AtomicBool>,
}

impl Default for RenderOptions {
    fn default() -> RenderOptions {
        RenderOptions {
            num_threads: num_cpus::get(),
            block_size: 16,
            output: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Expand a `%03d`-style pattern with the checkpoint index and prepend
/// `SPICA_OUTPUT_DIR` for relative paths.
pub fn checkpoint_path(pattern: &str, index: usize) -> PathBuf {
    let name = if let Some(pos) = pattern.find("%03d") {
        format!("{}{:03}{}", &pattern[..pos], index, &pattern[pos + 4..])
    } else if let Some(pos) = pattern.find("%d") {
        format!("{}{}{}", &pattern[..pos], index, &pattern[pos + 2..])
    } else {
        pattern.to_owned()
    };
    let path = PathBuf::from(&name);
    if path.is_relative() {
        if let Ok(dir) = std::env::var("SPICA_OUTPUT_DIR") {
            return PathBuf::from(dir).join(path);
        }
    }
    path
}

/// Render the scene one sample pass at a time. Within a pass, tiles are
/// pulled from a shared queue by `num_threads` workers; finished tiles are
/// merged in tile order afterwards so the result is identical for any thread
/// count. A checkpoint image is written after every pass.
pub fn render(
    scene: &Scene,
    camera: &dyn Camera,
    sampler: &mut dyn Sampler,
    integrator: &mut dyn SamplerIntegrator,
    opts: &RenderOptions,
) -> Result<()> {
    integrator.preprocess(scene, sampler);

    let film = camera.film();
    let sample_bounds = film.get_sample_bounds();
    let sample_extent = sample_bounds.diagonal();
    let block_size = opts.block_size.max(1);
    let n_tiles = Point2i::new(
        (sample_extent.x + block_size - 1) / block_size,
        (sample_extent.y + block_size - 1) / block_size,
    );
    let spp = sampler.samples_per_pixel();
    info!(
        "Rendering {} tiles x {} passes on {} threads",
        n_tiles.x * n_tiles.y,
        spp,
        opts.num_threads
    );

    let pb = indicatif::ProgressBar::new((n_tiles.x * n_tiles.y) as u64 * spp as u64);
    pb.set_style(
        indicatif::ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar}] {percent}% [{pos}/{len}] {eta}",
        )
        .unwrap()
        .progress_chars("=>-"),
    );

    for pass in 0..spp {
        if opts.stop.load(Ordering::Relaxed) {
            info!("stop requested; finishing after pass {}", pass);
            break;
        }
        integrator.pass_started(scene, pass);

        let tile_indices = Mutex::new(0..(n_tiles.x * n_tiles.y));
        let finished_tiles: Mutex<Vec<(i32, FilmTile)>> = Mutex::new(Vec::new());
        let integrator_ref: &dyn SamplerIntegrator = integrator;

        crossbeam::scope(|scope| {
            for _ in 0..opts.num_threads.max(1) {
                let mut sampler = sampler.box_clone();
                let tile_indices = &tile_indices;
                let finished_tiles = &finished_tiles;
                let pb = &pb;
                let stop = &opts.stop;
                scope.spawn(move |_| {
                    let mut arena = Bump::new();
                    loop {
                        let tile_idx = {
                            let mut it = tile_indices.lock();
                            match it.next() {
                                Some(t) => t,
                                None => break,
                            }
                        };
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        let tile = Point2i::new(tile_idx % n_tiles.x, tile_idx / n_tiles.x);

                        // Deterministic seed per (tile, pass)
                        let seed = pass as u64 * (n_tiles.x * n_tiles.y) as u64 + tile_idx as u64;
                        sampler.reseed(seed);

                        let x0 = sample_bounds.p_min.x + tile.x * block_size;
                        let x1 = i32::min(x0 + block_size, sample_bounds.p_max.x);
                        let y0 = sample_bounds.p_min.y + tile.y * block_size;
                        let y1 = i32::min(y0 + block_size, sample_bounds.p_max.y);
                        let tile_bounds =
                            Bounds2i::from_points(&Point2i::new(x0, y0), &Point2i::new(x1, y1));

                        let mut film_tile = film.get_film_tile(&tile_bounds);
                        for p in &tile_bounds {
                            sampler.start_pixel(p);
                            if !sampler.set_sample_number(pass) {
                                continue;
                            }
                            let s = sampler.get_camera_sample(p);
                            let (ray, ray_weight) = camera.generate_ray(&s);
                            let mut radiance = integrator_ref.li(
                                scene,
                                ray,
                                sampler.as_mut(),
                                &arena,
                                0,
                            ) * ray_weight;
                            if radiance.has_nan() {
                                error!(
                                    "NaN radiance at pixel {}, sample {}; dropping sample",
                                    p, pass
                                );
                                radiance = Spectrum::black();
                            } else if radiance.y() < -1e-5 {
                                error!(
                                    "negative luminance {} at pixel {}, sample {}; dropping sample",
                                    radiance.y(),
                                    p,
                                    pass
                                );
                                radiance = Spectrum::black();
                            } else if radiance.y().is_infinite() {
                                error!(
                                    "infinite luminance at pixel {}, sample {}; dropping sample",
                                    p, pass
                                );
                                radiance = Spectrum::black();
                            }
                            film_tile.add_sample(s.p_film, radiance);
                            arena.reset();
                        }
                        finished_tiles.lock().push((tile_idx, film_tile));
                        pb.inc(1);
                    }
                });
            }
        })
        .expect("worker thread panicked");

        // Merge in tile order: float addition stays deterministic
        let mut tiles = finished_tiles.into_inner();
        tiles.sort_by_key(|(idx, _)| *idx);
        for (_, tile) in &tiles {
            film.merge_film_tile(tile);
        }

        integrator.pass_finished(scene, pass);

        if let Some(ref pattern) = opts.output {
            film.write_image(checkpoint_path(pattern, pass + 1), 1.0)?;
        }
    }
    pb.finish();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_path_expansion() {
        std::env::remove_var("SPICA_OUTPUT_DIR");
        assert_eq!(
            checkpoint_path("image_%03d.png", 7),
            PathBuf::from("image_007.png")
        );
        assert_eq!(checkpoint_path("out_%d.hdr", 12), PathBuf::from("out_12.hdr"));
        assert_eq!(checkpoint_path("fixed.png", 3), PathBuf::from("fixed.png"));
    }
}
