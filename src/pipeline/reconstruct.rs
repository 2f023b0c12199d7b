//! Reconstruction stage: one mesh per requested object, plus the manifest.
//!
//! The real backend is an external monocular-reconstruction checkout (located
//! via `SAM3D_REPO_DIR` or `external/sam-3d-objects` under the project root)
//! whose inference entry point is invoked as a subprocess per object. When the
//! checkout or its checkpoints are missing the stage degrades to commented
//! placeholder meshes, keeping the one-file-per-object contract so the scene
//! build can still run end to end.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::manifest::{SceneManifest, SceneObject};
use crate::mask::mask_stats;
use crate::project::{slugify, Project};

/// Fixed seed handed to the reconstruction model; keeps reruns reproducible.
const RECON_SEED: u32 = 42;

#[derive(Debug)]
pub struct ReconstructOutcome {
    pub manifest_path: PathBuf,
    pub objects: Vec<SceneObject>,
    /// True when every mesh came from the stub backend.
    pub stubbed: bool,
}

/// Locate a usable reconstruction checkout, or explain why there is none.
pub fn locate_model_checkout(project: &Project) -> Option<PathBuf> {
    let repo = project.recon_repo();
    if !repo.exists() {
        warn!("reconstruction checkout not found at {}", repo.display());
        return None;
    }
    let config = repo.join("checkpoints").join("hf").join("pipeline.yaml");
    if !config.exists() {
        warn!(
            "reconstruction checkpoints not found at {}; run the checkout's download script",
            config.display()
        );
        return None;
    }
    Some(repo)
}

pub fn run_reconstruction(
    project: &Project,
    scene: &str,
    objects: &[String],
) -> Result<ReconstructOutcome> {
    let reference = project.find_reference(scene)?;
    let mesh_dir = project.mesh_dir(scene);
    fs::create_dir_all(&mesh_dir)
        .with_context(|| format!("failed to create {}", mesh_dir.display()))?;

    let checkout = locate_model_checkout(project);
    let stubbed = checkout.is_none();
    if stubbed {
        warn!("reconstruction model unavailable; writing placeholder meshes");
        warn!(
            "set {} to a prepared checkout to enable real reconstruction",
            crate::project::RECON_REPO_ENV
        );
    }

    let mut scene_objects = Vec::new();
    for name in objects {
        let slug = slugify(name);
        let object = match &checkout {
            Some(repo) => {
                match find_mask(project, scene, &slug) {
                    Some(mask) => {
                        reconstruct_object(project, scene, name, &slug, &reference, &mask, repo)?
                    }
                    None => {
                        warn!(
                            "no mask found for '{}' in {}; skipping",
                            name,
                            project.mask_dir(scene).display()
                        );
                        continue;
                    }
                }
            }
            None => stub_object(project, scene, name, &slug, &mesh_dir)?,
        };
        scene_objects.push(object);
    }

    let manifest_path = write_manifest(project, scene, &reference, scene_objects.clone())?;
    Ok(ReconstructOutcome {
        manifest_path,
        objects: scene_objects,
        stubbed,
    })
}

fn find_mask(project: &Project, scene: &str, slug: &str) -> Option<PathBuf> {
    let mask_dir = project.mask_dir(scene);
    [
        mask_dir.join(format!("{slug}.png")),
        mask_dir.join(format!("{slug}.jpg")),
    ]
    .into_iter()
    .find(|p| p.exists())
}

/// Run the external model for one object. A model failure degrades to a
/// placeholder for that object only; the rest of the scene continues.
fn reconstruct_object(
    project: &Project,
    scene: &str,
    name: &str,
    slug: &str,
    reference: &Path,
    mask: &Path,
    repo: &Path,
) -> Result<SceneObject> {
    match mask_stats(mask) {
        Ok(stats) if stats.is_empty() => {
            warn!("mask for '{name}' is empty; reconstruction may fail");
        }
        Err(e) => warn!("could not inspect mask for '{name}': {e:#}"),
        _ => {}
    }

    let mesh_path = project.mesh_dir(scene).join(format!("{slug}.ply"));
    let entry_point = repo.join("notebook").join("inference.py");
    info!("reconstructing '{name}' -> {}", mesh_path.display());

    let result = Command::new("python3")
        .arg(&entry_point)
        .arg("--image")
        .arg(reference)
        .arg("--mask")
        .arg(mask)
        .arg("--output")
        .arg(&mesh_path)
        .arg("--seed")
        .arg(RECON_SEED.to_string())
        .output()
        .with_context(|| format!("failed to launch {}", entry_point.display()));

    let failure = match result {
        Ok(output) if output.status.success() && mesh_path.exists() => None,
        Ok(output) => Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        Err(e) => Some(format!("{e:#}")),
    };

    if let Some(reason) = failure {
        warn!("reconstruction failed for '{name}': {reason}; writing placeholder");
        fs::write(
            &mesh_path,
            format!("# reconstruction failed for {name}: {reason}\n"),
        )
        .with_context(|| format!("failed to write {}", mesh_path.display()))?;
    } else {
        info!("saved mesh: {}", mesh_path.display());
    }

    Ok(SceneObject::new(name, mesh_path, mask.to_path_buf()))
}

/// Stub backend: a commented placeholder `.obj`, written only once so reruns
/// stay byte-identical.
fn stub_object(
    project: &Project,
    scene: &str,
    name: &str,
    slug: &str,
    mesh_dir: &Path,
) -> Result<SceneObject> {
    let mesh_path = mesh_dir.join(format!("{slug}.obj"));
    if !mesh_path.exists() {
        fs::write(
            &mesh_path,
            format!("# placeholder mesh for {name}\n# source scene: {scene}\n"),
        )
        .with_context(|| format!("failed to write {}", mesh_path.display()))?;
    }
    warn!("[stub] placeholder mesh: {}", mesh_path.display());

    let mask_path = find_mask(project, scene, slug)
        .unwrap_or_else(|| project.mask_dir(scene).join(format!("{slug}.png")));
    Ok(SceneObject::new(name, mesh_path, mask_path))
}

fn write_manifest(
    project: &Project,
    scene: &str,
    reference: &Path,
    objects: Vec<SceneObject>,
) -> Result<PathBuf> {
    let path = project.manifest_path(scene);
    let mut manifest = SceneManifest {
        scene: scene.to_string(),
        reference_image: reference.to_path_buf(),
        objects,
        composite: None,
        notes: "generated by the reconstruct stage; transforms are placeholders until hand-tuned"
            .to_string(),
    };

    if path.exists() {
        match SceneManifest::load(&path) {
            Ok(previous) => manifest.adopt_from(&previous),
            Err(e) => warn!("ignoring unreadable previous manifest: {e:#}"),
        }
    }

    manifest.save(&path)?;
    info!("wrote manifest: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::PLACEHOLDER_MESH_MAX_BYTES;
    use std::env;

    fn test_project(tag: &str) -> Project {
        let root = env::temp_dir().join(format!("heroshot-recon-{tag}-{}", std::process::id()));
        let reference = root.join("assets").join("reference");
        fs::create_dir_all(&reference).unwrap();
        image::RgbImage::new(16, 16)
            .save(reference.join("desk.jpg"))
            .unwrap();
        Project::new(root)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn stub_writes_one_mesh_per_object_and_manifest() {
        let project = test_project("stub");
        let outcome =
            run_reconstruction(&project, "desk", &names(&["monitor", "pc tower"])).unwrap();

        assert!(outcome.stubbed);
        assert_eq!(outcome.objects.len(), 2);
        for object in &outcome.objects {
            assert!(object.mesh_path.exists(), "mesh file must exist");
            let size = fs::metadata(&object.mesh_path).unwrap().len();
            assert!(
                size <= PLACEHOLDER_MESH_MAX_BYTES,
                "stub meshes must be detectable as placeholders ({size} bytes)"
            );
        }
        assert!(outcome.objects[1].mesh_path.ends_with("pc_tower.obj"));

        let manifest = SceneManifest::load(&outcome.manifest_path).unwrap();
        assert_eq!(manifest.scene, "desk");
        assert_eq!(manifest.objects.len(), 2);
        assert_eq!(manifest.objects[0].scale, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn rerun_preserves_tuned_transforms() {
        let project = test_project("tuned");
        let outcome = run_reconstruction(&project, "desk", &names(&["monitor"])).unwrap();

        let mut manifest = SceneManifest::load(&outcome.manifest_path).unwrap();
        manifest.objects[0].location = [0.5, 0.0, 0.75];
        manifest.composite = Some(crate::manifest::CompositeRecipe::default());
        manifest.save(&outcome.manifest_path).unwrap();

        let outcome = run_reconstruction(&project, "desk", &names(&["monitor"])).unwrap();
        let reloaded = SceneManifest::load(&outcome.manifest_path).unwrap();
        assert_eq!(reloaded.objects[0].location, [0.5, 0.0, 0.75]);
        assert!(reloaded.composite.is_some(), "recipe survives reruns");
    }

    #[test]
    fn stub_meshes_are_byte_identical_across_reruns() {
        let project = test_project("idem");
        let first = run_reconstruction(&project, "desk", &names(&["lamp"])).unwrap();
        let bytes_first = fs::read(&first.objects[0].mesh_path).unwrap();
        let second = run_reconstruction(&project, "desk", &names(&["lamp"])).unwrap();
        let bytes_second = fs::read(&second.objects[0].mesh_path).unwrap();
        assert_eq!(bytes_first, bytes_second);
    }
}
