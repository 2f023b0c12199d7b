//! Binary mask inspection.
//!
//! Masks are single-channel images where 0 is background and anything
//! non-zero is the segmented object. The non-zero pixel fraction gates
//! downstream use: empty masks are skipped by the occluder pass and flagged
//! in the operator summary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;

use crate::project::{Project, EMPTY_MASK_THRESHOLD};

#[derive(Debug, Clone)]
pub struct MaskStats {
    pub path: PathBuf,
    pub nonzero: u64,
    pub total: u64,
}

impl MaskStats {
    pub fn fraction(&self) -> f32 {
        self.nonzero as f32 / self.total.max(1) as f32
    }

    pub fn is_empty(&self) -> bool {
        self.fraction() < EMPTY_MASK_THRESHOLD
    }
}

/// Decode a mask and count its non-zero pixels.
pub fn mask_stats(path: &Path) -> Result<MaskStats> {
    let img = image::open(path)
        .with_context(|| format!("failed to open mask {}", path.display()))?
        .to_luma8();
    let total = (img.width() as u64) * (img.height() as u64);
    let nonzero = img.pixels().filter(|p| p.0[0] > 0).count() as u64;
    Ok(MaskStats {
        path: path.to_path_buf(),
        nonzero,
        total,
    })
}

/// Write an all-zero mask, the stub stand-in for a label no model produced.
pub fn write_empty_mask(path: &Path, width: u32, height: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let img = image::GrayImage::new(width, height);
    img.save(path)
        .with_context(|| format!("failed to write empty mask {}", path.display()))
}

/// Stats for every mask in a scene's mask directory, sorted by file name.
///
/// Undecodable files are reported as warnings and skipped rather than
/// aborting the summary.
pub fn scene_mask_summary(project: &Project, scene: &str) -> Result<Vec<MaskStats>> {
    let mask_dir = project.mask_dir(scene);
    let entries = fs::read_dir(&mask_dir)
        .with_context(|| format!("no mask directory for scene '{scene}' at {}", mask_dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut stats = Vec::new();
    for path in paths {
        match mask_stats(&path) {
            Ok(s) => stats.push(s),
            Err(e) => warn!("skipping unreadable mask {}: {e:#}", path.display()),
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("heroshot-mask-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn empty_mask_is_flagged() {
        let dir = scratch_dir("empty");
        let path = dir.join("monitor.png");
        write_empty_mask(&path, 64, 48).unwrap();

        let stats = mask_stats(&path).unwrap();
        assert_eq!(stats.total, 64 * 48);
        assert_eq!(stats.nonzero, 0);
        assert!(stats.is_empty());
    }

    #[test]
    fn painted_mask_reports_coverage() {
        let dir = scratch_dir("painted");
        let path = dir.join("pc_tower.png");

        let mut img = image::GrayImage::new(10, 10);
        for y in 0..5 {
            for x in 0..10 {
                img.put_pixel(x, y, image::Luma([255]));
            }
        }
        img.save(&path).unwrap();

        let stats = mask_stats(&path).unwrap();
        assert_eq!(stats.nonzero, 50);
        assert!((stats.fraction() - 0.5).abs() < 1e-6);
        assert!(!stats.is_empty());
    }
}
