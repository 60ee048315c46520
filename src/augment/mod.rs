//! Randomized image augmentation
//!
//! Training-time augmentation simulates lighting and camera-angle variation
//! in field photos of leaves. Randomness is drawn fresh per sample and is
//! intentionally unseeded, so repeated epochs see different variants of the
//! same source image. With `training == false` the policy is the identity.

use crate::error::Result;
use crate::Error;
use image::{ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Augmentation transform bounds
///
/// A transform with a zero bound is never applied. Flips fire with
/// probability 0.5 each when enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Allow horizontal flips
    pub horizontal_flip: bool,
    /// Allow vertical flips
    pub vertical_flip: bool,
    /// Maximum rotation in degrees (±)
    pub rotation_degrees: f32,
    /// Maximum zoom deviation from 1.0 (±)
    pub zoom_delta: f32,
    /// Maximum translation as a fraction of image size (±)
    pub translate_fraction: f32,
    /// Maximum shear in degrees (±)
    pub shear_degrees: f32,
    /// Maximum brightness shift as a fraction of full scale (±)
    pub brightness_delta: f32,
    /// Maximum contrast deviation from 1.0 (±)
    pub contrast_delta: f32,
    /// Maximum per-channel shift as a fraction of full scale (±)
    pub channel_shift: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            horizontal_flip: true,
            vertical_flip: true,
            rotation_degrees: 25.0,
            zoom_delta: 0.15,
            translate_fraction: 0.1,
            shear_degrees: 10.0,
            brightness_delta: 0.15,
            contrast_delta: 0.15,
            channel_shift: 0.1,
        }
    }
}

impl AugmentConfig {
    /// Disable every transform
    pub fn none() -> Self {
        Self {
            horizontal_flip: false,
            vertical_flip: false,
            rotation_degrees: 0.0,
            zoom_delta: 0.0,
            translate_fraction: 0.0,
            shear_degrees: 0.0,
            brightness_delta: 0.0,
            contrast_delta: 0.0,
            channel_shift: 0.0,
        }
    }
}

/// Per-sample randomized augmentation policy
///
/// Holds no random state of its own.
#[derive(Debug, Clone)]
pub struct AugmentationPolicy {
    config: AugmentConfig,
}

impl AugmentationPolicy {
    pub fn new(config: AugmentConfig) -> Self {
        Self { config }
    }

    /// Identity policy for validation and inference streams
    pub fn identity() -> Self {
        Self::new(AugmentConfig::none())
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// Apply the policy to one image
    ///
    /// Returns the input unchanged when `training` is false; otherwise each
    /// enabled transform is sampled independently for this call.
    pub fn apply(&self, img: &RgbImage, training: bool) -> RgbImage {
        if !training {
            return img.clone();
        }

        let mut rng = rand::thread_rng();
        let cfg = &self.config;
        let mut result = img.clone();

        if cfg.horizontal_flip && rng.gen_bool(0.5) {
            result = image::imageops::flip_horizontal(&result);
        }
        if cfg.vertical_flip && rng.gen_bool(0.5) {
            result = image::imageops::flip_vertical(&result);
        }

        let angle = bounded(&mut rng, cfg.rotation_degrees);
        let zoom = 1.0 + bounded(&mut rng, cfg.zoom_delta);
        let shear = bounded(&mut rng, cfg.shear_degrees);
        let max_shift = cfg.translate_fraction * result.width() as f32;
        let tx = bounded(&mut rng, max_shift);
        let ty = bounded(&mut rng, max_shift);
        if angle != 0.0 || zoom != 1.0 || shear != 0.0 || tx != 0.0 || ty != 0.0 {
            result = affine_warp(&result, angle, zoom, shear, tx, ty);
        }

        let brightness = bounded(&mut rng, cfg.brightness_delta);
        let contrast = 1.0 + bounded(&mut rng, cfg.contrast_delta);
        let shifts = [
            bounded(&mut rng, cfg.channel_shift),
            bounded(&mut rng, cfg.channel_shift),
            bounded(&mut rng, cfg.channel_shift),
        ];
        if brightness != 0.0 || contrast != 1.0 || shifts.iter().any(|s| *s != 0.0) {
            result = photometric(&result, brightness, contrast, &shifts);
        }

        result
    }
}

fn bounded<R: Rng>(rng: &mut R, bound: f32) -> f32 {
    if bound <= 0.0 {
        0.0
    } else {
        rng.gen_range(-bound..=bound)
    }
}

/// Single combined affine warp: rotation, zoom, shear, and translation around
/// the image center, nearest-neighbour sampling with edge-clamp fill.
fn affine_warp(img: &RgbImage, angle_degrees: f32, zoom: f32, shear_degrees: f32, tx: f32, ty: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;

    let theta = angle_degrees.to_radians();
    let (sin_a, cos_a) = theta.sin_cos();
    let shear_t = shear_degrees.to_radians().tan();
    let inv_zoom = 1.0 / zoom.max(1e-3);

    let mut output = ImageBuffer::new(width, height);

    for y in 0..height {
        for x in 0..width {
            // Invert translation, shear, zoom, then rotation
            let dx = x as f32 - cx - tx;
            let dy = y as f32 - cy - ty;

            let ux = (dx - shear_t * dy) * inv_zoom;
            let uy = dy * inv_zoom;

            let src_x = cx + ux * cos_a + uy * sin_a;
            let src_y = cy - ux * sin_a + uy * cos_a;

            // Edge clamp keeps leaf borders instead of black wedges
            let sx = (src_x.round().max(0.0) as u32).min(width - 1);
            let sy = (src_y.round().max(0.0) as u32).min(height - 1);

            output.put_pixel(x, y, *img.get_pixel(sx, sy));
        }
    }

    output
}

/// Brightness shift, contrast scale around mid-grey, and per-channel shift,
/// fused into one pixel pass.
fn photometric(img: &RgbImage, brightness: f32, contrast: f32, shifts: &[f32; 3]) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);
    let bright = brightness * 255.0;

    for (x, y, pixel) in img.enumerate_pixels() {
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = pixel[c] as f32;
            let v = 128.0 + contrast * (v - 128.0);
            let v = v + bright + shifts[c] * 255.0;
            out[c] = v.clamp(0.0, 255.0) as u8;
        }
        output.put_pixel(x, y, Rgb(out));
    }

    output
}

/// Offline dataset expansion
///
/// Mirrors the class sub-directory layout of `src` under `dst` and writes
/// `per_image` independently augmented JPEG copies of every source image.
/// Returns the number of files written.
pub fn expand_dataset(src: &Path, dst: &Path, per_image: usize, config: &AugmentConfig) -> Result<usize> {
    if !src.is_dir() {
        return Err(Error::DataSource(format!(
            "augmentation source directory not found: {}",
            src.display()
        )));
    }

    let policy = AugmentationPolicy::new(config.clone());
    let mut written = 0;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let class_dst = dst.join(entry.file_name());
        fs::create_dir_all(&class_dst)?;

        for file in fs::read_dir(entry.path())? {
            let file = file?;
            let path = file.path();
            let img = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping undecodable image");
                    continue;
                }
            };

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());

            for i in 0..per_image {
                let variant = policy.apply(&img, true);
                let out_path = class_dst.join(format!("{stem}_aug{i}.jpg"));
                variant.save(&out_path)?;
                written += 1;
            }
        }
    }

    info!(written, dst = %dst.display(), "offline augmentation complete");
    Ok(written)
}
