use std::f32::consts::PI;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use bumpalo::Bump;
use log::info;
use parking_lot::Mutex;

use crate::bounds::Bounds3f;
use crate::bsdf::BxDFType;
use crate::camera::Camera;
use crate::integrator::hashgrid::HashGrid;
use crate::integrator::{uniform_sample_one_light, ScatterSite};
use crate::material::TransportMode;
use crate::ray::Ray;
use crate::renderer::{checkpoint_path, RenderOptions};
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Point3f, Vector3f, INV_PI};

/// Where a camera path first met a gatherable surface.
#[derive(Clone)]
struct VisiblePoint {
    p: Point3f,
    /// Camera path throughput up to the point
    beta: Spectrum,
    /// Diffuse reflectance of the surface; photons couple through rho/pi
    rho: Spectrum,
    ns: Normal3f,
}

/// Per-pixel photon statistics, updated with the progressive estimator.
struct SppmPixel {
    radius: f32,
    /// Direct lighting and directly seen emission, averaged per iteration
    ld: Spectrum,
    n: f32,
    tau: Spectrum,
    vp: Option<VisiblePoint>,
}

/// Stochastic progressive photon mapping: per-pixel visible points gathered
/// into a hash grid, refreshed every iteration, with photon statistics
/// shrinking each pixel's radius independently.
pub struct SppmIntegrator {
    camera: Arc<dyn Camera>,
    n_iterations: usize,
    photons_per_iteration: usize,
    max_depth: u32,
    initial_radius: f32,
    alpha: f32,
}

impl SppmIntegrator {
    pub fn new(
        camera: Arc<dyn Camera>,
        n_iterations: usize,
        photons_per_iteration: usize,
        max_depth: u32,
        initial_radius: f32,
    ) -> SppmIntegrator {
        SppmIntegrator {
            camera,
            n_iterations,
            photons_per_iteration,
            max_depth,
            initial_radius,
            alpha: 0.7,
        }
    }

    pub fn render(&mut self, scene: &Scene, opts: &RenderOptions) -> Result<()> {
        let film = Arc::clone(self.camera.film());
        let res = film.full_resolution;
        let n_pixels = (res.x * res.y) as usize;
        let mut pixels: Vec<SppmPixel> = (0..n_pixels)
            .map(|_| SppmPixel {
                radius: self.initial_radius,
                ld: Spectrum::black(),
                n: 0.0,
                tau: Spectrum::black(),
                vp: None,
            })
            .collect();
        info!(
            "SPPM: {} iterations, {} photons each, r0 = {}",
            self.n_iterations, self.photons_per_iteration, self.initial_radius
        );

        let sampler_proto = crate::sampler::RandomSampler::new(1, 0);

        for iteration in 0..self.n_iterations {
            if opts.stop.load(Ordering::Relaxed) {
                break;
            }

            // ---- 1st pass: refresh visible points from the camera
            {
                let camera: &dyn Camera = &*self.camera;
                let max_depth = self.max_depth;
                let rows_per_band = ((res.y as usize) + opts.num_threads.max(1) - 1)
                    / opts.num_threads.max(1);
                let bands: Vec<(usize, &mut [SppmPixel])> = pixels
                    .chunks_mut(rows_per_band * res.x as usize)
                    .enumerate()
                    .collect();

                crossbeam::scope(|scope| {
                    for (band_idx, band) in bands {
                        let mut sampler = sampler_proto.box_clone();
                        scope.spawn(move |_| {
                            let mut arena = Bump::new();
                            let base_pixel = band_idx * rows_per_band * res.x as usize;
                            for (i, pixel) in band.iter_mut().enumerate() {
                                let pixel_idx = base_pixel + i;
                                let x = (pixel_idx % res.x as usize) as i32;
                                let y = (pixel_idx / res.x as usize) as i32;
                                sampler.reseed(
                                    (iteration * n_pixels + pixel_idx) as u64 ^ 0x51b9_c0de,
                                );
                                sampler.start_pixel(crate::Point2i::new(x, y));

                                let jitter = sampler.get_2d();
                                let p_film = Point2f::new(
                                    x as f32 + jitter.x,
                                    y as f32 + jitter.y,
                                );
                                let (ray, _w) = camera.generate_ray(&crate::sampler::CameraSample {
                                    p_film,
                                    p_lens: sampler.get_2d(),
                                });
                                trace_visible_point(
                                    scene,
                                    ray,
                                    sampler.as_mut(),
                                    &arena,
                                    max_depth,
                                    pixel,
                                );
                                arena.reset();
                            }
                        });
                    }
                })
                .expect("sppm camera pass panicked");
            }

            // ---- 2nd pass: hash the visible points
            let mut grid_bounds = Bounds3f::new();
            let mut max_radius = 0.0f32;
            for px in pixels.iter() {
                if let Some(ref vp) = px.vp {
                    let r = Vector3f::new(px.radius, px.radius, px.radius);
                    grid_bounds.extend(&(vp.p - r));
                    grid_bounds.extend(&(vp.p + r));
                    max_radius = max_radius.max(px.radius);
                }
            }
            let have_points = max_radius > 0.0;
            let mut grid = HashGrid::new(
                grid_bounds,
                (2.0 * max_radius).max(1e-4),
                n_pixels.next_power_of_two().max(64),
            );
            if have_points {
                for (i, px) in pixels.iter().enumerate() {
                    if let Some(ref vp) = px.vp {
                        let r = Vector3f::new(px.radius, px.radius, px.radius);
                        grid.add(i, &(vp.p - r), &(vp.p + r));
                    }
                }
            }

            // ---- 3rd pass: trace photons against the grid
            let contributions: Mutex<Vec<(usize, Vec<(usize, Spectrum)>)>> =
                Mutex::new(Vec::new());
            if have_points {
                let grid = &grid;
                let pixels_ref: &Vec<SppmPixel> = &pixels;
                let n_threads = opts.num_threads.max(1);
                let photons_per_chunk =
                    (self.photons_per_iteration + n_threads - 1) / n_threads;
                let max_depth = self.max_depth;
                let total = self.photons_per_iteration;

                crossbeam::scope(|scope| {
                    for chunk_idx in 0..n_threads {
                        let mut sampler = sampler_proto.box_clone();
                        let contributions = &contributions;
                        scope.spawn(move |_| {
                            let mut arena = Bump::new();
                            let mut local: Vec<(usize, Spectrum)> = Vec::new();
                            let begin = chunk_idx * photons_per_chunk;
                            let end = ((chunk_idx + 1) * photons_per_chunk).min(total);
                            for photon_idx in begin..end {
                                sampler.reseed(
                                    (iteration * total + photon_idx) as u64 ^ 0x0f07_1e55,
                                );
                                trace_photon_into_grid(
                                    scene,
                                    sampler.as_mut(),
                                    &arena,
                                    max_depth,
                                    grid,
                                    pixels_ref,
                                    &mut local,
                                );
                                arena.reset();
                            }
                            contributions.lock().push((chunk_idx, local));
                        });
                    }
                })
                .expect("sppm photon pass panicked");
            }

            // ---- 4th pass: update the progressive statistics
            let mut chunks = contributions.into_inner();
            chunks.sort_by_key(|(idx, _)| *idx);
            let mut phi = vec![Spectrum::black(); n_pixels];
            let mut m = vec![0u32; n_pixels];
            for (_, local) in chunks {
                for (pixel_idx, contribution) in local {
                    phi[pixel_idx] += contribution;
                    m[pixel_idx] += 1;
                }
            }
            for (i, px) in pixels.iter_mut().enumerate() {
                if m[i] > 0 {
                    let n_new = px.n + self.alpha * m[i] as f32;
                    let ratio = n_new / (px.n + m[i] as f32);
                    px.tau = (px.tau + phi[i]) * ratio;
                    px.radius *= ratio.sqrt();
                    px.n = n_new;
                }
                // Visible points are rebuilt next iteration
                px.vp = None;
            }

            // ---- checkpoint
            let total_photons =
                ((iteration + 1) * self.photons_per_iteration) as f32;
            let inv_iter = 1.0 / (iteration + 1) as f32;
            film.clear();
            let film_ref = &film;
            for (i, px) in pixels.iter().enumerate() {
                let x = (i % res.x as usize) as f32 + 0.5;
                let y = (i / res.x as usize) as f32 + 0.5;
                let mut l = px.ld * inv_iter;
                if px.radius > 0.0 {
                    l += px.tau / (PI * px.radius * px.radius * total_photons);
                }
                film_ref.add_splat(Point2f::new(x, y), l);
            }
            if let Some(ref pattern) = opts.output {
                film.write_image(checkpoint_path(pattern, iteration + 1), 1.0)?;
            }
        }

        Ok(())
    }
}

/// Walk a camera path to its first gatherable (diffuse) vertex, collecting
/// emission and next-event direct lighting along the way.
fn trace_visible_point(
    scene: &Scene,
    ray: Ray,
    sampler: &mut dyn Sampler,
    arena: &Bump,
    max_depth: u32,
    pixel: &mut SppmPixel,
) {
    let mut ray = ray;
    let mut beta = Spectrum::white();
    let mut specular_bounce = true;

    for _depth in 0..max_depth {
        let mut found = scene.intersect(&mut ray);
        if specular_bounce {
            match found {
                Some(ref isect) => pixel.ld += beta * isect.le(&-ray.d),
                None => {
                    for light in &scene.infinite_lights {
                        pixel.ld += beta * light.le(&ray);
                    }
                }
            }
        }
        let isect = match found.as_mut() {
            Some(isect) => isect,
            None => return,
        };
        isect.compute_scattering_functions(TransportMode::Radiance, arena);
        if isect.bsdf.is_none() {
            ray = isect.spawn_ray(&ray.d);
            continue;
        }
        let bsdf = isect.bsdf.unwrap();

        if bsdf.num_components(BxDFType::all() & !BxDFType::BSDF_SPECULAR) > 0 {
            // Direct lighting is handled by NEE; photons provide the rest
            pixel.ld += beta
                * uniform_sample_one_light(&ScatterSite::Surface(isect), scene, sampler, false);
            // The diffuse response: pi * f recovers the albedo of a
            // Lambertian lobe
            let probe = crate::geometry::face_forward(
                &isect.hit.wo,
                &Vector3f::from(isect.shading.n),
            );
            let rho = bsdf.f(&isect.hit.wo, &probe, BxDFType::all()) * std::f32::consts::PI;
            pixel.vp = Some(VisiblePoint {
                p: isect.hit.p,
                beta,
                rho,
                ns: isect.shading.n,
            });
            return;
        }

        // Specular: continue the walk
        let wo = -ray.d;
        let (f, wi, pdf, flags) = bsdf.sample_f(&wo, sampler.get_2d(), BxDFType::all());
        if f.is_black() || pdf == 0.0 {
            return;
        }
        beta *= f * wi.dotn(&isect.shading.n).abs() / pdf;
        specular_bounce = flags.contains(BxDFType::BSDF_SPECULAR);
        ray = isect.spawn_ray(&wi);
    }
}

/// Trace one photon and record its contributions to every visible point
/// whose radius reaches the deposit.
fn trace_photon_into_grid(
    scene: &Scene,
    sampler: &mut dyn Sampler,
    arena: &Bump,
    max_depth: u32,
    grid: &HashGrid,
    pixels: &[SppmPixel],
    out: &mut Vec<(usize, Spectrum)>,
) {
    if scene.lights.is_empty() {
        return;
    }
    let (light_num, light_pdf) = scene.sample_light(sampler.get_1d());
    if light_pdf == 0.0 {
        return;
    }
    let light = &scene.lights[light_num];
    let (mut ray, n_light, pdf_pos, pdf_dir, le) =
        light.sample_le(sampler.get_2d(), sampler.get_2d());
    if pdf_pos == 0.0 || pdf_dir == 0.0 || le.is_black() {
        return;
    }
    let mut beta = le * n_light.dotv(&ray.d).abs() / (light_pdf * pdf_pos * pdf_dir);

    for depth in 0..max_depth {
        let mut isect = match scene.intersect(&mut ray) {
            Some(isect) => isect,
            None => break,
        };

        if depth > 0 {
            // The first bounce is direct lighting, already estimated by NEE
            // at the visible points
            for &vp_idx in grid.lookup(&isect.hit.p) {
                let px = &pixels[vp_idx];
                if let Some(ref vp) = px.vp {
                    let d2 = (vp.p - isect.hit.p).length_squared();
                    if d2 > px.radius * px.radius {
                        continue;
                    }
                    let wi = -ray.d;
                    if wi.dotn(&vp.ns) <= 0.0 {
                        continue;
                    }
                    let phi = vp.beta * vp.rho * INV_PI * beta;
                    out.push((vp_idx, phi));
                }
            }
        }

        isect.compute_scattering_functions(TransportMode::Importance, arena);
        let bsdf = match isect.bsdf {
            Some(b) => b,
            None => {
                ray = isect.spawn_ray(&ray.d);
                continue;
            }
        };
        let wo = -ray.d;
        let (f, wi, pdf, _flags) = bsdf.sample_f(&wo, sampler.get_2d(), BxDFType::all());
        if f.is_black() || pdf == 0.0 {
            break;
        }
        let beta_new = beta * f * wi.dotn(&isect.shading.n).abs() / pdf;
        let q = (1.0 - beta_new.y() / beta.y().max(1e-12)).max(0.0);
        if sampler.get_1d() < q {
            break;
        }
        beta = beta_new / (1.0 - q);
        ray = isect.spawn_ray(&wi);
    }
}
