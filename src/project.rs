//! Project directory layout and per-scene path resolution.
//!
//! Every stage addresses its inputs and outputs through [`Project`] so the
//! on-disk contract lives in one place:
//!
//! ```text
//! assets/reference/<scene>.jpg|png          source photo
//! assets/reference/processed/<scene>.jpg    normalized copy
//! assets/masks/<scene>/<label>.png          segmentation masks
//! assets/meshes/<scene>/<object>.ply|obj    reconstructed meshes
//! manifests/<scene>_manifest.json           scene manifest
//! renders/<scene>/                          composite renders
//! ```

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use itertools::Itertools;

/// Longest-side bound applied by the prep stage.
pub const PROCESSED_MAX_SIZE: u32 = 2048;

/// A mask with a non-zero pixel fraction below this is considered empty.
pub const EMPTY_MASK_THRESHOLD: f32 = 0.01;

/// Mesh files at or below this size are treated as stub placeholders.
pub const PLACEHOLDER_MESH_MAX_BYTES: u64 = 100;

/// Environment override for the external reconstruction-model checkout.
pub const RECON_REPO_ENV: &str = "SAM3D_REPO_DIR";

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reference_dir(&self) -> PathBuf {
        self.root.join("assets").join("reference")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.reference_dir().join("processed")
    }

    pub fn processed_image(&self, scene: &str) -> PathBuf {
        self.processed_dir().join(format!("{scene}.jpg"))
    }

    pub fn mask_dir(&self, scene: &str) -> PathBuf {
        self.root.join("assets").join("masks").join(scene)
    }

    pub fn mask_path(&self, scene: &str, label: &str) -> PathBuf {
        self.mask_dir(scene).join(format!("{}.png", slugify(label)))
    }

    pub fn mesh_dir(&self, scene: &str) -> PathBuf {
        self.root.join("assets").join("meshes").join(scene)
    }

    pub fn manifest_path(&self, scene: &str) -> PathBuf {
        self.root
            .join("manifests")
            .join(format!("{scene}_manifest.json"))
    }

    pub fn render_dir(&self, scene: &str) -> PathBuf {
        self.root.join("renders").join(scene)
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    /// Candidate locations for a scene's reference photo, most preferred first.
    pub fn reference_candidates(&self, scene: &str) -> Vec<PathBuf> {
        let reference = self.reference_dir();
        let processed = self.processed_dir();
        vec![
            processed.join(format!("{scene}.jpg")),
            processed.join(format!("{scene}.png")),
            reference.join(format!("{scene}.jpg")),
            reference.join(format!("{scene}.png")),
        ]
    }

    /// Resolve the reference photo, preferring the processed copy.
    ///
    /// A missing photo is fatal for the scene; the error lists every path
    /// that was checked so the operator knows where to put the file.
    pub fn find_reference(&self, scene: &str) -> Result<PathBuf> {
        let candidates = self.reference_candidates(scene);
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Ok(path.clone()),
            None => bail!(
                "no reference image found for scene '{}' (checked: {})",
                scene,
                candidates.iter().map(|p| p.display().to_string()).join(", ")
            ),
        }
    }

    /// Like [`find_reference`](Self::find_reference) but restricted to the raw
    /// (unprocessed) photo, for the prep stage.
    pub fn find_raw_reference(&self, scene: &str) -> Result<PathBuf> {
        let reference = self.reference_dir();
        let candidates = [
            reference.join(format!("{scene}.jpg")),
            reference.join(format!("{scene}.png")),
        ];
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Ok(path.clone()),
            None => bail!(
                "no reference image found for scene '{}' (checked: {})",
                scene,
                candidates.iter().map(|p| p.display().to_string()).join(", ")
            ),
        }
    }

    /// Location of the external reconstruction-model checkout.
    pub fn recon_repo(&self) -> PathBuf {
        match env::var_os(RECON_REPO_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => self.root.join("external").join("sam-3d-objects"),
        }
    }
}

/// Filename-safe slug for a label or object name.
pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}
