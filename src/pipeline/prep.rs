//! Reference photo normalization.
//!
//! The segmentation and reconstruction models want a bounded, RGB, sRGB-ish
//! input; phone photos arrive huge and sometimes with alpha. This stage
//! resizes the longest side down to a limit (never up) and writes a
//! high-quality JPEG next to the original under `processed/`.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use log::info;

use crate::project::{Project, PROCESSED_MAX_SIZE};

#[derive(Debug, Clone, Copy)]
pub struct PrepOptions {
    pub max_size: u32,
}

impl Default for PrepOptions {
    fn default() -> Self {
        Self {
            max_size: PROCESSED_MAX_SIZE,
        }
    }
}

/// Normalize a scene's reference photo. Returns the processed path.
pub fn prep_scene(project: &Project, scene: &str, options: PrepOptions) -> Result<PathBuf> {
    let src = project.find_raw_reference(scene)?;
    let dst = project.processed_image(scene);

    let img = image::open(&src)
        .with_context(|| format!("failed to open reference image {}", src.display()))?
        .to_rgb8();

    let (w, h) = img.dimensions();
    let longest = w.max(h);
    let img = if longest > options.max_size {
        let scale = options.max_size as f32 / longest as f32;
        let nw = ((w as f32 * scale) as u32).max(1);
        let nh = ((h as f32 * scale) as u32).max(1);
        info!("resizing {w}x{h} -> {nw}x{nh}");
        image::imageops::resize(&img, nw, nh, FilterType::Lanczos3)
    } else {
        img
    };

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(&dst)
        .with_context(|| format!("failed to create {}", dst.display()))?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), 95);
    encoder
        .encode_image(&img)
        .with_context(|| format!("failed to encode {}", dst.display()))?;

    info!("saved normalized image to {}", dst.display());
    Ok(dst)
}
