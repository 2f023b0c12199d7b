//! End-to-end pipeline runs against the stub backends: no models, no network,
//! only the file contracts the stages promise.

mod common;

use std::fs;

use heroshot::manifest::SceneManifest;
use heroshot::mask::{mask_stats, scene_mask_summary};
use heroshot::pipeline::{self, RunOptions};
use heroshot::project::PLACEHOLDER_MESH_MAX_BYTES;

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn full_stub_pipeline_honors_the_file_contracts() {
    let project = common::test_project("full");
    common::seed_reference(&project, "desk", 320, 240);

    let script_path = project.root().join("out").join("desk_build.py");
    let options = RunOptions {
        labels: labels(&["monitor", "pc tower"]),
        objects: labels(&["monitor", "pc tower"]),
        render: false,
        emit: Some(script_path.clone()),
        ..RunOptions::default()
    };
    pipeline::run_scene(&project, "desk", &options).unwrap();

    // prep: bounded processed copy exists
    let processed = project.processed_image("desk");
    assert!(processed.exists());
    let (w, h) = image::image_dimensions(&processed).unwrap();
    assert!(w <= 2048 && h <= 2048);

    // segment: one mask per label, stubs decode as all-zero at reference dims
    for slug in ["monitor", "pc_tower"] {
        let mask = project.mask_path("desk", slug);
        assert!(mask.exists(), "missing mask for {slug}");
        let stats = mask_stats(&mask).unwrap();
        assert_eq!(stats.total, 320 * 240);
        assert!(stats.is_empty());
    }

    // reconstruct: one mesh per object, placeholder-sized
    for slug in ["monitor", "pc_tower"] {
        let mesh = project.mesh_dir("desk").join(format!("{slug}.obj"));
        assert!(mesh.exists(), "missing mesh for {slug}");
        assert!(fs::metadata(&mesh).unwrap().len() <= PLACEHOLDER_MESH_MAX_BYTES);
    }

    // manifest links the stage outputs
    let manifest = SceneManifest::load(&project.manifest_path("desk")).unwrap();
    assert_eq!(manifest.scene, "desk");
    assert_eq!(manifest.objects.len(), 2);
    for object in &manifest.objects {
        assert!(object.mesh_path.exists());
    }

    // build: the emitted script sets up the composite but imports nothing
    // (every mesh is a placeholder)
    let script = fs::read_to_string(&script_path).unwrap();
    assert!(script.contains("scene.render.engine = 'CYCLES'"));
    assert!(script.contains("is_shadow_catcher"));
    assert!(!script.contains("obj_import"), "placeholders must not import");
}

#[test]
fn rerunning_a_scene_overwrites_instead_of_duplicating() {
    let project = common::test_project("rerun");
    common::seed_reference(&project, "desk", 64, 64);

    let options = RunOptions {
        labels: labels(&["keyboard"]),
        objects: labels(&["keyboard"]),
        render: false,
        emit: Some(project.root().join("out").join("build.py")),
        ..RunOptions::default()
    };

    pipeline::run_scene(&project, "desk", &options).unwrap();
    let mask = project.mask_path("desk", "keyboard");
    let mesh = project.mesh_dir("desk").join("keyboard.obj");
    let manifest_path = project.manifest_path("desk");
    let first = (
        fs::read(&mask).unwrap(),
        fs::read(&mesh).unwrap(),
        fs::read(&manifest_path).unwrap(),
    );

    pipeline::run_scene(&project, "desk", &options).unwrap();
    let second = (
        fs::read(&mask).unwrap(),
        fs::read(&mesh).unwrap(),
        fs::read(&manifest_path).unwrap(),
    );

    assert_eq!(first.0, second.0, "mask must be overwritten byte-identically");
    assert_eq!(first.1, second.1, "stub mesh must be stable");
    assert_eq!(first.2, second.2, "manifest must be stable");

    let summary = scene_mask_summary(&project, "desk").unwrap();
    assert_eq!(summary.len(), 1, "no duplicate mask files");
}

#[test]
fn run_without_targets_or_manifest_is_fatal() {
    let project = common::test_project("notargets");
    common::seed_reference(&project, "desk", 32, 32);

    let options = RunOptions {
        render: false,
        ..RunOptions::default()
    };
    let err = pipeline::run_scene(&project, "desk", &options).unwrap_err();
    assert!(format!("{err:#}").contains("no manifest"));
}

#[test]
fn second_run_derives_targets_from_the_manifest() {
    let project = common::test_project("derived");
    common::seed_reference(&project, "desk", 32, 32);

    let explicit = RunOptions {
        labels: labels(&["lamp"]),
        objects: labels(&["lamp"]),
        render: false,
        emit: Some(project.root().join("out").join("build.py")),
        ..RunOptions::default()
    };
    pipeline::run_scene(&project, "desk", &explicit).unwrap();

    // A bare rerun picks targets up from the manifest instead of requiring
    // them again.
    let bare = RunOptions {
        render: false,
        emit: Some(project.root().join("out").join("build.py")),
        ..RunOptions::default()
    };
    pipeline::run_scene(&project, "desk", &bare).unwrap();

    let manifest = SceneManifest::load(&project.manifest_path("desk")).unwrap();
    assert_eq!(manifest.objects.len(), 1);
    assert_eq!(manifest.objects[0].name, "lamp");
}

#[test]
fn build_gates_occluders_on_mask_coverage() {
    use heroshot::manifest::{CompositeRecipe, SceneObject};
    use heroshot::remote::RemoteConfig;

    let project = common::test_project("occluders");
    let reference = common::seed_reference(&project, "desk", 64, 64);

    let mesh = project.mesh_dir("desk").join("monitor.ply");
    fs::create_dir_all(mesh.parent().unwrap()).unwrap();
    fs::write(&mesh, vec![b'x'; 2048]).unwrap();
    common::seed_mask(&project.mask_path("desk", "monitor"), 64, 64);

    let manifest = SceneManifest {
        scene: "desk".to_string(),
        reference_image: reference,
        objects: vec![SceneObject::new(
            "monitor",
            mesh,
            project.mask_path("desk", "monitor"),
        )],
        composite: Some(CompositeRecipe {
            occluder_labels: vec!["monitor".to_string(), "shelf".to_string()],
            ..CompositeRecipe::default()
        }),
        notes: String::new(),
    };
    manifest.save(&project.manifest_path("desk")).unwrap();

    let script_path = project.root().join("out").join("build.py");
    pipeline::build_scene(
        &project,
        "desk",
        RemoteConfig::default(),
        false,
        Some(&script_path),
    )
    .unwrap();

    let script = fs::read_to_string(&script_path).unwrap();
    assert!(script.contains("bpy.ops.wm.ply_import"), "real mesh imports");
    assert!(script.contains("Plane_monitor_occluder"), "covered mask occludes");
    assert!(
        !script.contains("Plane_shelf_occluder"),
        "label without a mask is skipped"
    );
    assert!(
        !script.contains("bpy.ops.render.render"),
        "render disabled must not trigger"
    );
}
