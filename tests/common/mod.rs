use std::fs;
use std::path::{Path, PathBuf};

use heroshot::project::Project;

/// Fresh project root under the system temp dir, unique per test.
pub fn test_project(tag: &str) -> Project {
    let root = std::env::temp_dir().join(format!("heroshot-e2e-{tag}-{}", std::process::id()));
    if root.exists() {
        let _ = fs::remove_dir_all(&root);
    }
    fs::create_dir_all(&root).unwrap();
    Project::new(root)
}

/// Drop a synthetic reference photo into the project.
pub fn seed_reference(project: &Project, scene: &str, width: u32, height: u32) -> PathBuf {
    let dir = project.root().join("assets").join("reference");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{scene}.jpg"));
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save(&path).unwrap();
    path
}

/// Write a half-covered binary mask at `path`.
pub fn seed_mask(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = image::GrayImage::from_fn(width, height, |_, y| {
        if y < height / 2 {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    });
    img.save(path).unwrap();
}
