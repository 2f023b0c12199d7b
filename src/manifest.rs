//! Per-scene manifest: the JSON record linking the reference photo, the masks
//! and meshes derived from it, and the hand-authored placement parameters for
//! the composite scene.
//!
//! The reconstruction stage writes the `objects` table; the `composite` recipe
//! is authored by the operator and preserved across reruns, as are any
//! hand-tuned object transforms.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneManifest {
    pub scene: String,
    pub reference_image: PathBuf,
    pub objects: Vec<SceneObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeRecipe>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub mesh_path: PathBuf,
    pub mask_path: PathBuf,
    #[serde(default)]
    pub location: [f32; 3],
    #[serde(default)]
    pub rotation_euler: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

impl SceneObject {
    pub fn new(name: impl Into<String>, mesh_path: PathBuf, mask_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            mesh_path,
            mask_path,
            location: [0.0; 3],
            rotation_euler: [0.0; 3],
            scale: unit_scale(),
        }
    }
}

/// Hand-authored parameters for the composite scene build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRecipe {
    #[serde(default)]
    pub camera: CameraRig,
    #[serde(default = "default_lights")]
    pub lights: Vec<LightRig>,
    #[serde(default)]
    pub hero: HeroSpec,
    #[serde(default)]
    pub desk: DeskSpec,
    #[serde(default)]
    pub wall: WallSpec,
    #[serde(default = "default_world_color")]
    pub world_color: [f32; 3],
    #[serde(default)]
    pub occluder_labels: Vec<String>,
    #[serde(default)]
    pub hero_materials: Vec<HeroMaterial>,
    #[serde(default)]
    pub render: RenderSettings,
}

impl Default for CompositeRecipe {
    fn default() -> Self {
        Self {
            camera: CameraRig::default(),
            lights: default_lights(),
            hero: HeroSpec::default(),
            desk: DeskSpec::default(),
            wall: WallSpec::default(),
            world_color: default_world_color(),
            occluder_labels: Vec::new(),
            hero_materials: Vec::new(),
            render: RenderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRig {
    #[serde(default = "default_focal_length")]
    pub focal_length_mm: f32,
    #[serde(default = "default_camera_location")]
    pub location: [f32; 3],
    #[serde(default = "default_camera_rotation")]
    pub rotation_euler: [f32; 3],
    /// When set, the camera is aimed at this point and `rotation_euler`
    /// is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub look_at: Option<[f32; 3]>,
    #[serde(default = "default_fstop")]
    pub fstop: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            focal_length_mm: default_focal_length(),
            location: default_camera_location(),
            rotation_euler: default_camera_rotation(),
            look_at: None,
            fstop: default_fstop(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightShape {
    Rect,
    Disk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightRig {
    pub name: String,
    pub shape: LightShape,
    pub size: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_y: Option<f32>,
    pub energy: f32,
    pub color: [f32; 3],
    pub location: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeroSpec {
    /// Hero asset file; `.blend` is appended natively, glTF is imported.
    pub asset_path: PathBuf,
    /// Case-insensitive substring used to locate the hero object after import.
    #[serde(default = "default_hero_hint")]
    pub object_hint: String,
    /// Real-world width the hero is normalized to before relative scaling.
    #[serde(default = "default_hero_width")]
    pub target_width_m: f32,
    /// Hero width as a fraction of the desk width.
    #[serde(default = "default_desk_ratio")]
    pub desk_ratio: f32,
    /// Distance from the desk front edge, along +Y.
    #[serde(default = "default_stand_off")]
    pub stand_off: f32,
}

impl Default for HeroSpec {
    fn default() -> Self {
        Self {
            asset_path: PathBuf::new(),
            object_hint: default_hero_hint(),
            target_width_m: default_hero_width(),
            desk_ratio: default_desk_ratio(),
            stand_off: default_stand_off(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskSpec {
    pub width_m: f32,
    pub depth_m: f32,
    pub height_m: f32,
}

impl Default for DeskSpec {
    fn default() -> Self {
        Self {
            width_m: 1.60,
            depth_m: 0.75,
            height_m: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallSpec {
    pub width_m: f32,
    pub height_m: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for WallSpec {
    fn default() -> Self {
        Self {
            width_m: 3.0,
            height_m: 2.5,
            y: -0.1,
            z: 1.5,
        }
    }
}

/// Principled material applied to hero parts whose names contain `assign_to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeroMaterial {
    pub name: String,
    /// Hex color without the leading `#`, e.g. `"540808"`.
    pub base_color_hex: String,
    #[serde(default)]
    pub metallic: f32,
    #[serde(default = "default_roughness")]
    pub roughness: f32,
    pub assign_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "default_render_width")]
    pub width: u32,
    #[serde(default = "default_render_height")]
    pub height: u32,
    #[serde(default = "default_samples")]
    pub samples: u32,
    /// Output path relative to the scene's render directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: default_render_width(),
            height: default_render_height(),
            samples: default_samples(),
            output: None,
        }
    }
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_focal_length() -> f32 {
    35.0
}

fn default_camera_location() -> [f32; 3] {
    [0.0, -2.0, 1.3]
}

fn default_camera_rotation() -> [f32; 3] {
    [1.1, 0.0, 0.0]
}

fn default_fstop() -> f32 {
    4.0
}

fn default_world_color() -> [f32; 3] {
    [0.05, 0.05, 0.05]
}

fn default_hero_hint() -> String {
    "hero".to_string()
}

fn default_hero_width() -> f32 {
    0.345
}

fn default_desk_ratio() -> f32 {
    0.35
}

fn default_stand_off() -> f32 {
    0.3
}

fn default_roughness() -> f32 {
    0.5
}

fn default_render_width() -> u32 {
    1920
}

fn default_render_height() -> u32 {
    1080
}

fn default_samples() -> u32 {
    1024
}

fn default_lights() -> Vec<LightRig> {
    vec![
        LightRig {
            name: "Key_monitor".to_string(),
            shape: LightShape::Rect,
            size: 1.0,
            size_y: Some(0.5),
            energy: 300.0,
            color: [0.7, 0.9, 1.0],
            location: [0.0, -1.0, 1.2],
        },
        LightRig {
            name: "Fill_top".to_string(),
            shape: LightShape::Disk,
            size: 2.5,
            size_y: None,
            energy: 120.0,
            color: [1.0, 0.98, 0.95],
            location: [0.0, 0.0, 2.2],
        },
    ]
}

impl SceneManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("malformed manifest {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut text = serde_json::to_string_pretty(self).context("failed to encode manifest")?;
        text.push('\n');
        fs::write(path, text)
            .with_context(|| format!("failed to write manifest {}", path.display()))
    }

    /// Carry hand-tuned state over from a previously written manifest:
    /// per-object transforms (matched by name) and the composite recipe.
    pub fn adopt_from(&mut self, previous: &SceneManifest) {
        for object in &mut self.objects {
            if let Some(prev) = previous.objects.iter().find(|o| o.name == object.name) {
                object.location = prev.location;
                object.rotation_euler = prev.rotation_euler;
                object.scale = prev.scale;
            }
        }
        if self.composite.is_none() {
            self.composite = previous.composite.clone();
        }
    }
}
