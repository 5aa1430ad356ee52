use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use parking_lot::Mutex;

use crate::bounds::{Bounds2f, Bounds2i};
use crate::filter::Filter;
use crate::imageio;
use crate::spectrum::Spectrum;
use crate::{Point2f, Point2i, Vector2f};

#[derive(Clone, Default)]
struct Pixel {
    contrib_sum: Spectrum,
    filter_weight_sum: f32,
    splat: Spectrum,
}

/// Accumulates weighted radiance samples into pixels. Regular samples go
/// through per-tile buffers merged under the mutex; light-traced
/// contributions bypass the filter through `add_splat`.
pub struct Film {
    pub full_resolution: Point2i,
    pub cropped_pixel_bounds: Bounds2i,
    filter: Arc<dyn Filter>,
    filter_radius: Vector2f,
    pixels: Mutex<Vec<Pixel>>,
}

impl Film {
    pub fn new(resolution: Point2i, filter: Arc<dyn Filter>) -> Film {
        let cropped_pixel_bounds =
            Bounds2i::from_points(&Point2i::new(0, 0), &Point2i::new(resolution.x, resolution.y));
        let (rx, ry) = filter.radius();
        info!(
            "Created film with resolution {} (pixel bounds {})",
            resolution, cropped_pixel_bounds
        );
        Film {
            full_resolution: resolution,
            cropped_pixel_bounds,
            filter,
            filter_radius: Vector2f::new(rx, ry),
            pixels: Mutex::new(vec![Pixel::default(); (resolution.x * resolution.y) as usize]),
        }
    }

    /// The region of raster space samples must be generated in so the filter
    /// support of every pixel is covered.
    pub fn get_sample_bounds(&self) -> Bounds2i {
        let half = Vector2f::new(0.5, 0.5);
        let p0 = Point2f::from(self.cropped_pixel_bounds.p_min) + half - self.filter_radius;
        let p1 = Point2f::from(self.cropped_pixel_bounds.p_max) - half + self.filter_radius;
        let float_bounds = Bounds2f::from_points(
            &Point2f::new(p0.x.floor(), p0.y.floor()),
            &Point2f::new(p1.x.ceil(), p1.y.ceil()),
        );
        float_bounds.into()
    }

    pub fn get_film_tile(&self, sample_bounds: &Bounds2i) -> FilmTile {
        let half_pixel = Vector2f::new(0.5, 0.5);
        let float_bounds: Bounds2f = (*sample_bounds).into();

        let p0 = float_bounds.p_min - half_pixel - self.filter_radius;
        let p0 = Point2f::new(p0.x.ceil(), p0.y.ceil());
        let p1 = float_bounds.p_max - half_pixel + self.filter_radius + Vector2f::new(1.0, 1.0);
        let p1 = Point2f::new(p1.x.floor(), p1.y.floor());
        let tile_pixel_bounds = Bounds2i::intersect(
            &Bounds2f::from_points(&p0, &p1).into(),
            &self.cropped_pixel_bounds,
        );

        FilmTile::new(tile_pixel_bounds, self.filter_radius, Arc::clone(&self.filter))
    }

    pub fn merge_film_tile(&self, tile: &FilmTile) {
        let mut pixels = self.pixels.lock();
        for pixel in &tile.pixel_bounds {
            let tile_pixel = tile.get_pixel(&pixel);
            let pidx = self.pixel_index(&pixel);
            pixels[pidx].contrib_sum += tile_pixel.contrib_sum;
            pixels[pidx].filter_weight_sum += tile_pixel.filter_weight_sum;
        }
    }

    /// Unfiltered splat, for light-tracing strategies that land on arbitrary
    /// film positions. Normalized separately at write time.
    pub fn add_splat(&self, p: Point2f, v: Spectrum) {
        if v.has_nan() {
            warn!("NaN splat value at {}; ignoring", p);
            return;
        }
        let pi = Point2i::new(p.x.floor() as i32, p.y.floor() as i32);
        if !self.cropped_pixel_bounds.inside_exclusive(&pi) {
            return;
        }
        let idx = self.pixel_index(&pi);
        let mut pixels = self.pixels.lock();
        pixels[idx].splat += v;
    }

    /// Final pixel values as a linear RGB buffer (row-major, 3 floats per
    /// pixel).
    pub fn to_rgb(&self, splat_scale: f32) -> Vec<f32> {
        let pixels = self.pixels.lock();
        let mut rgb = Vec::with_capacity(3 * pixels.len());
        for p in &self.cropped_pixel_bounds {
            let pixel = &pixels[self.pixel_index(&p)];
            let mut v = pixel.contrib_sum;
            if pixel.filter_weight_sum != 0.0 {
                v = (v / pixel.filter_weight_sum).clamp_negative();
            }
            v += pixel.splat * splat_scale;
            rgb.push(v.r);
            rgb.push(v.g);
            rgb.push(v.b);
        }
        rgb
    }

    /// Average radiance over a pixel rectangle, for tests and diagnostics.
    pub fn mean_over(&self, region: &Bounds2i, splat_scale: f32) -> Spectrum {
        let rgb = self.to_rgb(splat_scale);
        let width = self.full_resolution.x;
        let mut sum = Spectrum::black();
        let mut n = 0;
        for p in region {
            if !self.cropped_pixel_bounds.inside_exclusive(&p) {
                continue;
            }
            let i = ((p.y * width + p.x) * 3) as usize;
            sum += Spectrum::rgb(rgb[i], rgb[i + 1], rgb[i + 2]);
            n += 1;
        }
        if n > 0 {
            sum / n as f32
        } else {
            sum
        }
    }

    pub fn write_image<P: AsRef<Path>>(&self, path: P, splat_scale: f32) -> Result<()> {
        let rgb = self.to_rgb(splat_scale);
        info!(
            "Writing image {} ({}x{})",
            path.as_ref().display(),
            self.full_resolution.x,
            self.full_resolution.y
        );
        imageio::write_image(path, &rgb, self.full_resolution)
    }

    /// Drop all accumulated values, both weighted sums and splats.
    pub fn clear(&self) {
        let mut pixels = self.pixels.lock();
        for p in pixels.iter_mut() {
            *p = Pixel::default();
        }
    }

    fn pixel_index(&self, p: &Point2i) -> usize {
        debug_assert!(self.cropped_pixel_bounds.inside_exclusive(p));
        let width = self.cropped_pixel_bounds.p_max.x - self.cropped_pixel_bounds.p_min.x;
        ((p.y - self.cropped_pixel_bounds.p_min.y) * width
            + (p.x - self.cropped_pixel_bounds.p_min.x)) as usize
    }
}

/// Per-thread accumulation buffer covering one tile plus the filter apron.
pub struct FilmTile {
    pub pixel_bounds: Bounds2i,
    filter_radius: Vector2f,
    filter: Arc<dyn Filter>,
    pixels: Vec<FilmTilePixel>,
}

#[derive(Clone, Default)]
pub struct FilmTilePixel {
    pub contrib_sum: Spectrum,
    pub filter_weight_sum: f32,
}

impl FilmTile {
    fn new(pixel_bounds: Bounds2i, filter_radius: Vector2f, filter: Arc<dyn Filter>) -> FilmTile {
        FilmTile {
            pixel_bounds,
            filter_radius,
            filter,
            pixels: vec![FilmTilePixel::default(); pixel_bounds.area().max(0) as usize],
        }
    }

    /// Splat one radiance sample into every pixel whose filter support
    /// contains it. The filter is evaluated exactly at each pixel center.
    pub fn add_sample(&mut self, p_film: Point2f, colour: Spectrum) {
        if colour.has_nan() {
            warn!("sample with NaNs at {}; ignoring", p_film);
            return;
        }
        // Convert to discrete pixel space
        let p_film_discrete = p_film - Vector2f::new(0.5, 0.5);
        let p0x = (p_film_discrete.x - self.filter_radius.x).ceil() as i32;
        let p0y = (p_film_discrete.y - self.filter_radius.y).ceil() as i32;
        let p1x = (p_film_discrete.x + self.filter_radius.x).floor() as i32 + 1;
        let p1y = (p_film_discrete.y + self.filter_radius.y).floor() as i32 + 1;
        let bounds = Bounds2i::intersect(
            &Bounds2i::from_elements(p0x, p0y, p1x, p1y),
            &self.pixel_bounds,
        );

        for y in bounds.p_min.y..bounds.p_max.y {
            for x in bounds.p_min.x..bounds.p_max.x {
                let w = self.filter.evaluate(
                    x as f32 - p_film_discrete.x,
                    y as f32 - p_film_discrete.y,
                );
                if w == 0.0 {
                    continue;
                }
                let idx = self.pixel_index(&Point2i::new(x, y));
                let pixel = &mut self.pixels[idx];
                pixel.contrib_sum += colour * w;
                pixel.filter_weight_sum += w;
            }
        }
    }

    pub fn get_pixel(&self, p: &Point2i) -> &FilmTilePixel {
        &self.pixels[self.pixel_index(p)]
    }

    fn pixel_index(&self, p: &Point2i) -> usize {
        let width = self.pixel_bounds.p_max.x - self.pixel_bounds.p_min.x;
        ((p.y - self.pixel_bounds.p_min.y) * width + (p.x - self.pixel_bounds.p_min.x)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{BoxFilter, TriangleFilter};

    fn film_with(filter: Arc<dyn Filter>) -> Film {
        Film::new(Point2i::new(8, 8), filter)
    }

    #[test]
    fn test_single_sample_box() {
        let film = film_with(Arc::new(BoxFilter));
        let mut tile = film.get_film_tile(&film.get_sample_bounds());
        tile.add_sample(Point2f::new(3.5, 3.5), Spectrum::grey(2.0));
        film.merge_film_tile(&tile);
        let rgb = film.to_rgb(1.0);
        let idx = (3 * 8 + 3) * 3;
        assert!((rgb[idx] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_tent_weights_normalize() {
        // An off-center sample spreads over 4 pixels with a tent filter;
        // normalization by the weight sum recovers the sample value.
        let film = film_with(Arc::new(TriangleFilter::default()));
        let mut tile = film.get_film_tile(&film.get_sample_bounds());
        tile.add_sample(Point2f::new(4.25, 4.75), Spectrum::grey(1.0));
        film.merge_film_tile(&tile);
        let rgb = film.to_rgb(1.0);
        for &(x, y) in &[(3usize, 4usize), (4, 4), (3, 5), (4, 5)] {
            let idx = (y * 8 + x) * 3;
            assert!((rgb[idx] - 1.0).abs() < 1e-5, "pixel ({}, {})", x, y);
        }
    }

    #[test]
    fn test_splat_accumulates() {
        let film = film_with(Arc::new(BoxFilter));
        film.add_splat(Point2f::new(2.1, 2.9), Spectrum::grey(1.0));
        film.add_splat(Point2f::new(2.4, 2.2), Spectrum::grey(3.0));
        let rgb = film.to_rgb(0.5);
        let idx = (2 * 8 + 2) * 3;
        assert!((rgb[idx] - 2.0).abs() < 1e-6);
    }
}
