use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{anyhow, Result};
use image::codecs::hdr::HdrEncoder;
use image::{ImageBuffer, Rgb};
use log::debug;

use crate::spectrum::Spectrum;
use crate::Point2i;

/// Write a linear RGB buffer to disk. PNG/BMP go through sRGB conversion;
/// `.hdr` keeps linear radiance.
pub fn write_image<P: AsRef<Path>>(path: P, rgb: &[f32], resolution: Point2i) -> Result<()> {
    let path = path.as_ref();
    let (w, h) = (resolution.x as u32, resolution.y as u32);
    anyhow::ensure!(
        rgb.len() == (w * h * 3) as usize,
        "image buffer size {} does not match resolution {}x{}",
        rgb.len(),
        w,
        h
    );

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    debug!("writing {}x{} image to {}", w, h, path.display());

    match ext.as_str() {
        "png" | "bmp" => {
            let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(w, h, |x, y| {
                let i = ((y * w + x) * 3) as usize;
                let s = Spectrum::rgb(rgb[i], rgb[i + 1], rgb[i + 2]);
                Rgb(s.to_srgb())
            });
            img.save(path).map_err(|e| {
                anyhow!(crate::Error::io(format!(
                    "cannot write image {}: {}",
                    path.display(),
                    e
                )))
            })?;
            Ok(())
        }
        "hdr" => {
            let file = File::create(path).map_err(|e| {
                anyhow!(crate::Error::io(format!(
                    "cannot create {}: {}",
                    path.display(),
                    e
                )))
            })?;
            let pixels: Vec<Rgb<f32>> = (0..(w * h) as usize)
                .map(|i| Rgb([rgb[3 * i], rgb[3 * i + 1], rgb[3 * i + 2]]))
                .collect();
            HdrEncoder::new(BufWriter::new(file))
                .encode(&pixels, w as usize, h as usize)
                .map_err(|e| {
                    anyhow!(crate::Error::io(format!(
                        "cannot encode {}: {}",
                        path.display(),
                        e
                    )))
                })?;
            Ok(())
        }
        other => Err(anyhow!(crate::Error::io(format!(
            "unsupported image extension '{}' for {}",
            other,
            path.display()
        )))),
    }
}
