//! Segmentation stage: one binary mask per requested label.
//!
//! The models are external and optional; the stage degrades through a fixed
//! backend order and always honors the file contract:
//!
//! 1. text-prompted model (`tools/segment_prompted.py`), one call per label;
//! 2. automatic mask generation (`tools/segment_auto.py`), one call per image,
//!    unlabeled masks assigned to labels largest-area-first;
//! 3. stub: an all-zero mask per label at the reference image's dimensions.
//!
//! A backend that fails for any label disqualifies itself with a warning and
//! the next backend rewrites the whole label set, so partial output never
//! survives a fallback.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::mask::{mask_stats, write_empty_mask};
use crate::project::{slugify, Project};

pub struct SegmentRequest<'a> {
    pub scene: &'a str,
    pub labels: &'a [String],
    pub reference: &'a Path,
    pub mask_dir: &'a Path,
}

pub trait SegmentBackend {
    fn name(&self) -> &'static str;

    /// Produce one mask file per label, returning them in label order.
    fn segment(&self, request: &SegmentRequest) -> Result<Vec<PathBuf>>;
}

/// Text-prompted segmentation: the external tool is invoked once per label
/// with the reference image and the label text, and must write the mask PNG
/// to the requested output path.
pub struct PromptedSegmenter {
    script: PathBuf,
}

impl PromptedSegmenter {
    pub fn discover(project: &Project) -> Option<Self> {
        let script = project.tools_dir().join("segment_prompted.py");
        script.exists().then_some(Self { script })
    }
}

impl SegmentBackend for PromptedSegmenter {
    fn name(&self) -> &'static str {
        "prompted"
    }

    fn segment(&self, request: &SegmentRequest) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for label in request.labels {
            let out = request.mask_dir.join(format!("{}.png", slugify(label)));
            info!("segmenting '{label}' -> {}", out.display());

            let output = Command::new("python3")
                .arg(&self.script)
                .arg("--image")
                .arg(request.reference)
                .arg("--prompt")
                .arg(label)
                .arg("--out")
                .arg(&out)
                .output()
                .with_context(|| format!("failed to launch {}", self.script.display()))?;

            if !output.status.success() {
                bail!(
                    "prompted segmentation failed for '{}': {}",
                    label,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }

            if !out.exists() {
                // The model ran but found nothing for this label; keep the
                // per-label file contract with an explicit empty mask.
                warn!("no mask produced for '{label}'; writing empty mask");
                let (w, h) = image::image_dimensions(request.reference)
                    .with_context(|| format!("failed to read {}", request.reference.display()))?;
                write_empty_mask(&out, w, h)?;
            }
            written.push(out);
        }
        Ok(written)
    }
}

/// Automatic mask generation: the external tool is invoked once and dumps
/// unlabeled masks into a scratch directory. It cannot honor text prompts, so
/// masks are assigned to labels in descending area order; labels beyond the
/// available masks get empty ones.
pub struct AutomaticSegmenter {
    script: PathBuf,
}

impl AutomaticSegmenter {
    pub fn discover(project: &Project) -> Option<Self> {
        let script = project.tools_dir().join("segment_auto.py");
        script.exists().then_some(Self { script })
    }
}

impl SegmentBackend for AutomaticSegmenter {
    fn name(&self) -> &'static str {
        "automatic"
    }

    fn segment(&self, request: &SegmentRequest) -> Result<Vec<PathBuf>> {
        let scratch = request.mask_dir.join(".auto");
        fs::create_dir_all(&scratch)
            .with_context(|| format!("failed to create {}", scratch.display()))?;

        let output = Command::new("python3")
            .arg(&self.script)
            .arg("--image")
            .arg(request.reference)
            .arg("--outdir")
            .arg(&scratch)
            .output()
            .with_context(|| format!("failed to launch {}", self.script.display()))?;
        if !output.status.success() {
            let _ = fs::remove_dir_all(&scratch);
            bail!(
                "automatic segmentation failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let written = assign_by_area(request, &scratch)?;
        let _ = fs::remove_dir_all(&scratch);
        Ok(written)
    }
}

/// Move scratch masks onto label slugs, largest coverage first.
fn assign_by_area(request: &SegmentRequest, scratch: &Path) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(scratch)
        .with_context(|| format!("failed to list {}", scratch.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "png") {
            match mask_stats(&path) {
                Ok(stats) => candidates.push(stats),
                Err(e) => warn!("ignoring unreadable candidate mask: {e:#}"),
            }
        }
    }
    candidates.sort_by(|a, b| b.nonzero.cmp(&a.nonzero));

    let (w, h) = image::image_dimensions(request.reference)
        .with_context(|| format!("failed to read {}", request.reference.display()))?;

    let mut written = Vec::new();
    for (i, label) in request.labels.iter().enumerate() {
        let out = request.mask_dir.join(format!("{}.png", slugify(label)));
        match candidates.get(i) {
            Some(stats) => {
                if out.exists() {
                    fs::remove_file(&out)
                        .with_context(|| format!("failed to replace {}", out.display()))?;
                }
                fs::rename(&stats.path, &out)
                    .with_context(|| format!("failed to move mask to {}", out.display()))?;
                info!(
                    "assigned mask to '{}' ({} non-zero pixels)",
                    label, stats.nonzero
                );
            }
            None => {
                warn!("no automatic mask left for '{label}'; writing empty mask");
                write_empty_mask(&out, w, h)?;
            }
        }
        written.push(out);
    }
    Ok(written)
}

/// Final fallback: placeholder masks keeping the file contract alive.
pub struct StubSegmenter;

impl SegmentBackend for StubSegmenter {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn segment(&self, request: &SegmentRequest) -> Result<Vec<PathBuf>> {
        let (w, h) = image::image_dimensions(request.reference)
            .with_context(|| format!("failed to read {}", request.reference.display()))?;
        let mut written = Vec::new();
        for label in request.labels {
            let out = request.mask_dir.join(format!("{}.png", slugify(label)));
            write_empty_mask(&out, w, h)?;
            warn!("[stub] placeholder mask for '{}' at {}", label, out.display());
            written.push(out);
        }
        warn!("segmentation models unavailable; all masks are empty placeholders");
        warn!("install the model tools under tools/ to enable real segmentation");
        Ok(written)
    }
}

/// Backend preference order for this project.
pub fn default_backends(project: &Project) -> Vec<Box<dyn SegmentBackend>> {
    let mut backends: Vec<Box<dyn SegmentBackend>> = Vec::new();
    if let Some(b) = PromptedSegmenter::discover(project) {
        backends.push(Box::new(b));
    } else {
        warn!("prompted segmentation tool not found under tools/");
    }
    if let Some(b) = AutomaticSegmenter::discover(project) {
        backends.push(Box::new(b));
    } else {
        warn!("automatic segmentation tool not found under tools/");
    }
    backends.push(Box::new(StubSegmenter));
    backends
}

/// Run the fallback chain for a scene. The last backend's errors propagate;
/// earlier failures only demote.
pub fn run_with_backends(
    project: &Project,
    scene: &str,
    labels: &[String],
    backends: &[Box<dyn SegmentBackend>],
) -> Result<Vec<PathBuf>> {
    let reference = project.find_reference(scene)?;
    let mask_dir = project.mask_dir(scene);
    fs::create_dir_all(&mask_dir)
        .with_context(|| format!("failed to create {}", mask_dir.display()))?;

    let request = SegmentRequest {
        scene,
        labels,
        reference: &reference,
        mask_dir: &mask_dir,
    };

    let (last, preferred) = backends
        .split_last()
        .context("no segmentation backends configured")?;
    for backend in preferred {
        match backend.segment(&request) {
            Ok(masks) => return Ok(masks),
            Err(e) => warn!("{} segmentation failed: {e:#}; falling back", backend.name()),
        }
    }
    last.segment(&request)
}

pub fn run_segmentation(project: &Project, scene: &str, labels: &[String]) -> Result<Vec<PathBuf>> {
    run_with_backends(project, scene, labels, &default_backends(project))
}
