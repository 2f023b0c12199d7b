//! Pipeline stages and the full-run orchestration.
//!
//! Stages run strictly in sequence (prep, segment, reconstruct, build), each
//! blocking on its external process or remote command. The first fatal error
//! (missing input, unreadable manifest, remote failure) stops the scene.

pub mod prep;
pub mod reconstruct;
pub mod segment;

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use log::{info, warn};

use crate::manifest::SceneManifest;
use crate::mask::scene_mask_summary;
use crate::project::Project;
use crate::remote::{RemoteClient, RemoteConfig};
use crate::scene::{build_script, BuildOptions};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub labels: Vec<String>,
    pub objects: Vec<String>,
    pub prep: prep::PrepOptions,
    pub remote: RemoteConfig,
    pub render: bool,
    /// Write the generated script here instead of submitting it.
    pub emit: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            objects: Vec::new(),
            prep: prep::PrepOptions::default(),
            remote: RemoteConfig::default(),
            render: true,
            emit: None,
        }
    }
}

/// Compose the scene script for an existing manifest and either submit it to
/// the running application or write it to a file for manual execution.
pub fn build_scene(
    project: &Project,
    scene: &str,
    remote: RemoteConfig,
    render: bool,
    emit: Option<&PathBuf>,
) -> Result<()> {
    let manifest_path = project.manifest_path(scene);
    if !manifest_path.exists() {
        bail!(
            "no manifest for scene '{}' at {}; run the reconstruct stage first",
            scene,
            manifest_path.display()
        );
    }
    let manifest = SceneManifest::load(&manifest_path)?;
    let script = build_script(project, &manifest, BuildOptions { render })?;

    match emit {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(path, script.source())
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote scene script to {}", path.display());
            Ok(())
        }
        None => {
            let mut client = RemoteClient::connect(remote)?;
            client.ping().context("the 3D application did not answer ping")?;
            client.submit_script(&script)?;
            Ok(())
        }
    }
}

/// The full pipeline for one scene: prep → segment → reconstruct → mask
/// report → build.
pub fn run_scene(project: &Project, scene: &str, options: &RunOptions) -> Result<()> {
    prep::prep_scene(project, scene, options.prep)?;

    let (labels, objects) = resolve_targets(project, scene, options)?;

    segment::run_segmentation(project, scene, &labels)?;
    let outcome = reconstruct::run_reconstruction(project, scene, &objects)?;
    if outcome.stubbed {
        warn!("scene '{scene}' was reconstructed from stubs only");
    }

    for stats in scene_mask_summary(project, scene)? {
        let name = stats
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let flag = if stats.is_empty() { " (empty)" } else { "" };
        info!("  {}: {:.2}% non-zero{}", name, stats.fraction() * 100.0, flag);
    }

    build_scene(
        project,
        scene,
        options.remote.clone(),
        options.render,
        options.emit.as_ref(),
    )
}

/// Labels and objects for a run: explicit arguments win, otherwise they are
/// derived from an existing manifest (recipe occluder labels + object names).
fn resolve_targets(
    project: &Project,
    scene: &str,
    options: &RunOptions,
) -> Result<(Vec<String>, Vec<String>)> {
    let mut labels = options.labels.clone();
    let mut objects = options.objects.clone();

    if labels.is_empty() || objects.is_empty() {
        let manifest_path = project.manifest_path(scene);
        if !manifest_path.exists() {
            bail!(
                "no labels/objects given and no manifest to derive them from (checked {})",
                manifest_path.display()
            );
        }
        let manifest = SceneManifest::load(&manifest_path)?;
        if objects.is_empty() {
            objects = manifest.objects.iter().map(|o| o.name.clone()).collect();
        }
        if labels.is_empty() {
            let recipe_labels = manifest
                .composite
                .as_ref()
                .map(|c| c.occluder_labels.clone())
                .unwrap_or_default();
            labels = recipe_labels
                .into_iter()
                .chain(objects.iter().cloned())
                .unique()
                .collect();
        }
    }

    if labels.is_empty() {
        bail!("nothing to segment for scene '{scene}'");
    }
    if objects.is_empty() {
        bail!("nothing to reconstruct for scene '{scene}'");
    }
    Ok((labels, objects))
}
