//! Composite scene assembly.
//!
//! Lowers a scene manifest and its hand-authored recipe into the ordered
//! script sections the remote application executes: renderer setup, camera
//! with the photo backdrop, desk/wall proxies with a shadow catcher,
//! manifest mesh import, mask-driven occluders, hero placement, lighting,
//! depth of field, the compositor overlay and the final render trigger.
//!
//! Every section is get-or-create / clear-before-fill so resubmitting the
//! script mutates the same objects instead of duplicating them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::manifest::{CompositeRecipe, LightShape, SceneManifest};
use crate::mask::mask_stats;
use crate::project::{slugify, Project, PLACEHOLDER_MESH_MAX_BYTES};
use crate::scene::camera::LookAt;
use crate::scene::materials::{emit_hero_material, emit_occluder_material};
use crate::scene::script::{py_f32, py_str, py_vec3, SceneScript};

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub render: bool,
}

/// Build the full scene script for a manifest.
pub fn build_script(
    project: &Project,
    manifest: &SceneManifest,
    options: BuildOptions,
) -> Result<SceneScript> {
    let scene = manifest.scene.as_str();
    let recipe = match &manifest.composite {
        Some(recipe) => recipe.clone(),
        None => {
            warn!("manifest has no composite recipe; using defaults");
            CompositeRecipe::default()
        }
    };
    let reference = resolve(project, &manifest.reference_image);
    if !reference.exists() {
        warn!(
            "reference image {} not found; the backdrop will fail to load remotely",
            reference.display()
        );
    }

    let mut script = SceneScript::new("import bpy");

    emit_scene_setup(&mut script, scene);
    emit_renderer(&mut script, &recipe);
    emit_world(&mut script, &recipe);
    emit_camera(&mut script, scene, &recipe, &reference);
    emit_proxies(&mut script, scene, &recipe);
    emit_environment(&mut script, project, manifest);
    emit_occluders(&mut script, project, scene, &recipe, &reference);
    emit_hero(&mut script, project, scene, &recipe)?;
    emit_lights(&mut script, &recipe);
    emit_dof(&mut script, scene, &recipe);
    emit_compositor(&mut script, &reference);
    if options.render {
        emit_render(&mut script, project, scene, &recipe);
    }

    info!("composed scene script: {} blocks", script.block_count());
    Ok(script)
}

fn resolve(project: &Project, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project.root().join(path)
    };
    fs::canonicalize(&joined).unwrap_or(joined)
}

fn composite_scene_name(scene: &str) -> String {
    format!("Composite_{scene}")
}

fn camera_name(scene: &str) -> String {
    format!("CAM_{scene}")
}

fn desk_name(scene: &str) -> String {
    format!("Desk_{scene}")
}

fn emit_scene_setup(script: &mut SceneScript, scene: &str) {
    script.push(format!(
        r#"sc = bpy.data.scenes.get({name})
if sc is None:
    sc = bpy.data.scenes.new({name})
if bpy.context.window is not None:
    bpy.context.window.scene = sc
sc.unit_settings.system = 'METRIC'
sc.unit_settings.scale_length = 1.0"#,
        name = py_str(&composite_scene_name(scene)),
    ));
}

fn emit_renderer(script: &mut SceneScript, recipe: &CompositeRecipe) {
    script.push(format!(
        r#"scene = bpy.context.scene
scene.render.engine = 'CYCLES'
scene.cycles.feature_set = 'SUPPORTED'
try:
    scene.cycles.device = 'GPU'
except Exception:
    scene.cycles.device = 'CPU'
scene.cycles.samples = {samples}
try:
    scene.view_settings.view_transform = 'AgX'
    scene.view_settings.look = 'Medium High Contrast'
except Exception:
    pass
scene.render.resolution_x = {width}
scene.render.resolution_y = {height}
scene.render.resolution_percentage = 100"#,
        samples = recipe.render.samples,
        width = recipe.render.width,
        height = recipe.render.height,
    ));
}

fn emit_world(script: &mut SceneScript, recipe: &CompositeRecipe) {
    let [r, g, b] = recipe.world_color;
    script.push(format!(
        r#"world = bpy.context.scene.world
if world is None:
    world = bpy.data.worlds.new('World')
    bpy.context.scene.world = world
world.use_nodes = True
nt = world.node_tree
bg = nt.nodes.get('Background')
out = nt.nodes.get('World Output')
if bg is None:
    bg = nt.nodes.new('ShaderNodeBackground')
if out is None:
    out = nt.nodes.new('ShaderNodeOutputWorld')
bg.inputs['Color'].default_value = ({r}, {g}, {b}, 1.0)
if not bg.outputs['Background'].is_linked:
    nt.links.new(bg.outputs['Background'], out.inputs['Surface'])"#,
        r = py_f32(r),
        g = py_f32(g),
        b = py_f32(b),
    ));
}

fn emit_camera(script: &mut SceneScript, scene: &str, recipe: &CompositeRecipe, reference: &Path) {
    let rotation = match recipe.camera.look_at {
        Some(target) => LookAt::new(recipe.camera.location, target).rotation_euler(),
        None => recipe.camera.rotation_euler,
    };
    script.push(format!(
        r#"cam = bpy.data.objects.get({name})
if cam is None:
    cam_data = bpy.data.cameras.new({name})
    cam = bpy.data.objects.new({name}, cam_data)
    bpy.context.collection.objects.link(cam)
cam.data.lens = {lens}
cam.location = {location}
cam.rotation_euler = {rotation}
bpy.context.scene.camera = cam
img = bpy.data.images.get({ref_name}) or bpy.data.images.load({ref_path})
bg_list = cam.data.background_images
bg = bg_list[0] if len(bg_list) else bg_list.new()
bg.image = img
bg.alpha = 1.0
bg.show_background_image = True
cam.data.show_background_images = True"#,
        name = py_str(&camera_name(scene)),
        lens = py_f32(recipe.camera.focal_length_mm),
        location = py_vec3(recipe.camera.location),
        rotation = py_vec3(rotation),
        ref_name = py_str(&file_name(reference)),
        ref_path = py_str(&reference.display().to_string()),
    ));
}

fn emit_proxies(script: &mut SceneScript, scene: &str, recipe: &CompositeRecipe) {
    let desk = &recipe.desk;
    let wall = &recipe.wall;
    script.push(format!(
        r#"def ensure_plane(name):
    obj = bpy.data.objects.get(name)
    if obj is None:
        bpy.ops.mesh.primitive_plane_add()
        obj = bpy.context.active_object
        obj.name = name
    return obj
desk = ensure_plane({desk_name})
desk.location = (0.0, 0.0, {desk_height})
desk.scale = ({desk_sx}, {desk_sy}, 1.0)
wall = ensure_plane({wall_name})
wall.location = (0.0, {wall_y}, {wall_z})
wall.scale = ({wall_sx}, 0.1, {wall_sz})
desk.cycles.is_shadow_catcher = True
bpy.context.scene.render.film_transparent = True"#,
        desk_name = py_str(&desk_name(scene)),
        desk_height = py_f32(desk.height_m),
        desk_sx = py_f32(desk.width_m / 2.0),
        desk_sy = py_f32(desk.depth_m / 2.0),
        wall_name = py_str(&format!("Wall_{scene}")),
        wall_y = py_f32(wall.y),
        wall_z = py_f32(wall.z),
        wall_sx = py_f32(wall.width_m / 2.0),
        wall_sz = py_f32(wall.height_m / 2.0),
    ));
}

/// Import the reconstructed environment meshes into the scene collection.
/// The collection is cleared first so resubmission never duplicates objects.
fn emit_environment(script: &mut SceneScript, project: &Project, manifest: &SceneManifest) {
    script.push(format!(
        r#"coll = bpy.data.collections.get({name})
if coll is not None:
    for obj in list(coll.objects):
        bpy.data.objects.remove(obj, do_unlink=True)"#,
        name = py_str(&manifest.scene),
    ));

    for object in &manifest.objects {
        let mesh = resolve(project, &object.mesh_path);
        match fs::metadata(&mesh) {
            Err(_) => {
                warn!("mesh not found, skipping: {}", mesh.display());
                continue;
            }
            Ok(meta) if meta.len() <= PLACEHOLDER_MESH_MAX_BYTES => {
                warn!("mesh appears to be a placeholder, skipping: {}", mesh.display());
                continue;
            }
            Ok(_) => {}
        }
        let import_op = match mesh.extension().and_then(|e| e.to_str()) {
            Some("obj") => "bpy.ops.wm.obj_import(filepath={path})",
            Some("ply") => "bpy.ops.wm.ply_import(filepath={path})",
            Some("glb") | Some("gltf") => "bpy.ops.import_scene.gltf(filepath={path})",
            _ => {
                warn!("unsupported mesh format, skipping: {}", mesh.display());
                continue;
            }
        };
        let import_op = import_op.replace("{path}", &py_str(&mesh.display().to_string()));
        script.push(format!(
            r#"coll = bpy.data.collections.get({coll_name})
if coll is None:
    coll = bpy.data.collections.new({coll_name})
    bpy.context.scene.collection.children.link(coll)
existing = set(bpy.data.objects.keys())
{import_op}
imported = [bpy.data.objects[n] for n in bpy.data.objects.keys() if n not in existing]
target = next((o for o in imported if o.type == 'MESH'), imported[0] if imported else None)
if target is None:
    raise RuntimeError('no objects imported from ' + {path})
for c in list(target.users_collection):
    c.objects.unlink(target)
coll.objects.link(target)
target.location = {location}
target.rotation_euler = {rotation}
target.scale = {scale}"#,
            coll_name = py_str(&manifest.scene),
            import_op = import_op,
            path = py_str(&mesh.display().to_string()),
            location = py_vec3(object.location),
            rotation = py_vec3(object.rotation_euler),
            scale = py_vec3(object.scale),
        ));
    }
}

/// One occluder plane per recipe label whose mask has real coverage.
fn emit_occluders(
    script: &mut SceneScript,
    project: &Project,
    scene: &str,
    recipe: &CompositeRecipe,
    reference: &Path,
) {
    for label in &recipe.occluder_labels {
        let mask = project.mask_path(scene, label);
        if !mask.exists() {
            warn!("occluder mask missing for '{label}': {}", mask.display());
            continue;
        }
        let stats = match mask_stats(&mask) {
            Ok(stats) => stats,
            Err(e) => {
                warn!("skipping occluder for '{label}': {e:#}");
                continue;
            }
        };
        info!("mask {}: {:.3} non-zero", file_name(&mask), stats.fraction());
        if stats.is_empty() {
            info!("skipping occluder for '{label}': mask below coverage threshold");
            continue;
        }

        let object_name = format!("Plane_{}_occluder", slugify(label));
        script.push(format!(
            r#"obj = bpy.data.objects.get({name})
if obj is None:
    bpy.ops.mesh.primitive_plane_add()
    obj = bpy.context.active_object
    obj.name = {name}
obj.location = (0.0, -0.05, 1.0)"#,
            name = py_str(&object_name),
        ));
        emit_occluder_material(script, &object_name, reference, &resolve(project, &mask));
    }
}

/// Import the hero asset, then normalize and place it on the desk:
/// real-world width first, then the desk-ratio scale, then drop the bounding
/// box onto the desk top at the configured stand-off.
fn emit_hero(
    script: &mut SceneScript,
    project: &Project,
    scene: &str,
    recipe: &CompositeRecipe,
) -> Result<()> {
    let hero = &recipe.hero;
    if hero.asset_path.as_os_str().is_empty() {
        warn!("no hero asset configured; building the environment only");
        return Ok(());
    }
    let asset = resolve(project, &hero.asset_path);
    if !asset.exists() {
        bail!("hero asset not found: {}", asset.display());
    }

    let hint = hero.object_hint.to_lowercase();
    match asset.extension().and_then(|e| e.to_str()) {
        Some("blend") => script.push(format!(
            r#"already = any({hint} in o.name.lower() for o in bpy.data.objects)
if not already:
    with bpy.data.libraries.load({path}, link=False) as (data_from, data_to):
        data_to.objects = [n for n in data_from.objects if {hint} in n.lower()]
    for obj in data_to.objects:
        if obj is not None and obj.name not in bpy.context.scene.collection.objects:
            bpy.context.scene.collection.objects.link(obj)"#,
            hint = py_str(&hint),
            path = py_str(&asset.display().to_string()),
        )),
        Some("glb") | Some("gltf") => script.push(format!(
            r#"already = any({hint} in o.name.lower() for o in bpy.data.objects)
if not already:
    bpy.ops.import_scene.gltf(filepath={path})"#,
            hint = py_str(&hint),
            path = py_str(&asset.display().to_string()),
        )),
        _ => bail!("unsupported hero asset format: {}", asset.display()),
    }

    script.push(format!(
        r#"from mathutils import Vector
hero = None
for obj in bpy.data.objects:
    if obj.type == 'MESH' and {hint} in obj.name.lower():
        hero = obj
        break
if hero is None:
    raise RuntimeError('hero object not found by hint: ' + {hint})
sf = {target_width} / max(hero.dimensions.x, 1e-9)
hero.scale = (hero.scale[0] * sf, hero.scale[1] * sf, hero.scale[2] * sf)
bpy.context.view_layer.update()
desk = bpy.data.objects.get({desk_name})
if desk is not None:
    sf = (desk.dimensions.x * {desk_ratio}) / max(hero.dimensions.x, 1e-6)
    hero.scale = (hero.scale[0] * sf, hero.scale[1] * sf, hero.scale[2] * sf)
    bpy.context.view_layer.update()
    bb = [hero.matrix_world @ Vector(c) for c in hero.bound_box]
    min_z = min(v.z for v in bb)
    hero.location.z += desk.location.z - min_z
    hero.location.x = 0.0
    hero.location.y = {stand_off}"#,
        hint = py_str(&hint),
        target_width = py_f32(hero.target_width_m),
        desk_ratio = py_f32(hero.desk_ratio),
        desk_name = py_str(&desk_name(scene)),
        stand_off = py_f32(hero.stand_off),
    ));

    for material in &recipe.hero_materials {
        emit_hero_material(script, material)
            .with_context(|| format!("bad hero material '{}'", material.name))?;
    }
    Ok(())
}

/// Replace the lighting rig wholesale; stale lights from earlier runs go away.
fn emit_lights(script: &mut SceneScript, recipe: &CompositeRecipe) {
    script.push(
        r#"for obj in list(bpy.context.scene.objects):
    if obj.type == 'LIGHT':
        bpy.data.objects.remove(obj, do_unlink=True)"#,
    );

    for light in &recipe.lights {
        let (shape, size_y) = match light.shape {
            LightShape::Rect => ("RECTANGLE", Some(light.size_y.unwrap_or(light.size))),
            LightShape::Disk => ("DISK", None),
        };
        let size_y_line = match size_y {
            Some(v) => format!("\nlight_data.size_y = {}", py_f32(v)),
            None => String::new(),
        };
        script.push(format!(
            r#"light_data = bpy.data.lights.new(name={name}, type='AREA')
light_data.shape = '{shape}'
light_data.size = {size}{size_y_line}
light_data.energy = {energy}
light_data.color = {color}
light_obj = bpy.data.objects.new({name}, light_data)
bpy.context.collection.objects.link(light_obj)
light_obj.location = {location}"#,
            name = py_str(&light.name),
            shape = shape,
            size = py_f32(light.size),
            size_y_line = size_y_line,
            energy = py_f32(light.energy),
            color = py_vec3(light.color),
            location = py_vec3(light.location),
        ));
    }
}

fn emit_dof(script: &mut SceneScript, scene: &str, recipe: &CompositeRecipe) {
    let hint = recipe.hero.object_hint.to_lowercase();
    script.push(format!(
        r#"cam = bpy.data.objects.get({cam_name})
focus = None
for obj in bpy.data.objects:
    if obj.type == 'MESH' and {hint} in obj.name.lower():
        focus = obj
        break
if cam is not None and focus is not None:
    cam.data.dof.use_dof = True
    cam.data.dof.focus_object = focus
    cam.data.dof.aperture_fstop = {fstop}"#,
        cam_name = py_str(&camera_name(scene)),
        hint = py_str(&hint),
        fstop = py_f32(recipe.camera.fstop),
    ));
}

/// Alpha-over the render layers onto the reference photo so shadows and the
/// hero composite onto the original photograph.
fn emit_compositor(script: &mut SceneScript, reference: &Path) {
    script.push(format!(
        r#"sc = bpy.context.scene
sc.use_nodes = True
nt = sc.node_tree
for n in list(nt.nodes):
    nt.nodes.remove(n)
rl = nt.nodes.new('CompositorNodeRLayers')
comp = nt.nodes.new('CompositorNodeComposite')
img_node = nt.nodes.new('CompositorNodeImage')
img_node.image = bpy.data.images.get({ref_name}) or bpy.data.images.load({ref_path})
alpha_over = nt.nodes.new('CompositorNodeAlphaOver')
alpha_over.inputs[0].default_value = 1.0
nt.links.new(rl.outputs['Image'], alpha_over.inputs[1])
nt.links.new(img_node.outputs['Image'], alpha_over.inputs[2])
nt.links.new(alpha_over.outputs['Image'], comp.inputs['Image'])"#,
        ref_name = py_str(&file_name(reference)),
        ref_path = py_str(&reference.display().to_string()),
    ));
}

fn emit_render(script: &mut SceneScript, project: &Project, scene: &str, recipe: &CompositeRecipe) {
    let output = render_output(project, scene, recipe);
    script.push(format!(
        r#"import os
os.makedirs(os.path.dirname({path}), exist_ok=True)
bpy.context.scene.render.filepath = {path}
bpy.ops.render.render(write_still=True)"#,
        path = py_str(&output.display().to_string()),
    ));
}

/// Final render target for a scene.
pub fn render_output(project: &Project, scene: &str, recipe: &CompositeRecipe) -> PathBuf {
    let dir = project.render_dir(scene);
    match &recipe.render.output {
        Some(rel) => dir.join(rel),
        None => dir.join(format!("{scene}_hero.png")),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{HeroSpec, SceneObject};
    use std::env;

    fn test_project(tag: &str) -> Project {
        let root = env::temp_dir().join(format!("heroshot-comp-{tag}-{}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        Project::new(root)
    }

    fn write_mask(path: &Path, covered: bool) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut img = image::GrayImage::new(20, 20);
        if covered {
            for y in 0..10 {
                for x in 0..20 {
                    img.put_pixel(x, y, image::Luma([255]));
                }
            }
        }
        img.save(path).unwrap();
    }

    fn manifest_for(project: &Project, scene: &str) -> SceneManifest {
        let reference = project.reference_dir().join(format!("{scene}.jpg"));
        fs::create_dir_all(reference.parent().unwrap()).unwrap();
        image::RgbImage::new(20, 20).save(&reference).unwrap();

        let mesh_dir = project.mesh_dir(scene);
        fs::create_dir_all(&mesh_dir).unwrap();
        let real_mesh = mesh_dir.join("monitor.ply");
        fs::write(&real_mesh, vec![b'x'; 4096]).unwrap();
        let stub_mesh = mesh_dir.join("lamp.obj");
        fs::write(&stub_mesh, "# placeholder mesh for lamp\n").unwrap();

        SceneManifest {
            scene: scene.to_string(),
            reference_image: reference,
            objects: vec![
                SceneObject::new("monitor", real_mesh, project.mask_path(scene, "monitor")),
                SceneObject::new("lamp", stub_mesh, project.mask_path(scene, "lamp")),
            ],
            composite: Some(CompositeRecipe {
                occluder_labels: vec!["monitor".to_string(), "lamp".to_string()],
                ..CompositeRecipe::default()
            }),
            notes: String::new(),
        }
    }

    #[test]
    fn script_covers_the_build_sections_in_order() {
        let project = test_project("sections");
        let manifest = manifest_for(&project, "desk");
        write_mask(&project.mask_path("desk", "monitor"), true);
        write_mask(&project.mask_path("desk", "lamp"), false);

        let script = build_script(&project, &manifest, BuildOptions { render: true }).unwrap();
        let source = script.source();

        let landmarks = [
            "scene.render.engine = 'CYCLES'",
            "'CAM_desk'",
            "desk.cycles.is_shadow_catcher = True",
            "bpy.ops.wm.ply_import",
            "'Plane_monitor_occluder'",
            "CompositorNodeAlphaOver",
            "bpy.ops.render.render(write_still=True)",
        ];
        let mut last = 0;
        for landmark in landmarks {
            let pos = source[last..]
                .find(landmark)
                .unwrap_or_else(|| panic!("missing or out of order: {landmark}"));
            last += pos;
        }
    }

    #[test]
    fn placeholder_meshes_and_empty_masks_are_skipped() {
        let project = test_project("skip");
        let manifest = manifest_for(&project, "desk");
        write_mask(&project.mask_path("desk", "monitor"), true);
        write_mask(&project.mask_path("desk", "lamp"), false);

        let script = build_script(&project, &manifest, BuildOptions::default()).unwrap();
        let source = script.source();

        assert!(source.contains("monitor.ply"), "real mesh must import");
        assert!(!source.contains("lamp.obj"), "placeholder mesh must be skipped");
        assert!(source.contains("Plane_monitor_occluder"));
        assert!(
            !source.contains("Plane_lamp_occluder"),
            "empty mask must not create an occluder"
        );
    }

    #[test]
    fn environment_collection_is_cleared_before_import() {
        let project = test_project("idem");
        let manifest = manifest_for(&project, "desk");
        write_mask(&project.mask_path("desk", "monitor"), true);
        write_mask(&project.mask_path("desk", "lamp"), false);

        let script = build_script(&project, &manifest, BuildOptions::default()).unwrap();
        let source = script.source();

        let clear = source
            .find("bpy.data.objects.remove(obj, do_unlink=True)")
            .expect("clear block missing");
        let import = source.find("bpy.ops.wm.ply_import").expect("import missing");
        assert!(clear < import, "collection must be cleared before importing");
    }

    #[test]
    fn missing_hero_asset_is_fatal() {
        let project = test_project("hero");
        let mut manifest = manifest_for(&project, "desk");
        let recipe = manifest.composite.as_mut().unwrap();
        recipe.hero = HeroSpec {
            asset_path: PathBuf::from("assets/hero/hero.blend"),
            ..HeroSpec::default()
        };
        write_mask(&project.mask_path("desk", "monitor"), true);
        write_mask(&project.mask_path("desk", "lamp"), false);

        let err = build_script(&project, &manifest, BuildOptions::default()).unwrap_err();
        assert!(format!("{err}").contains("hero asset not found"));
    }

    #[test]
    fn configured_hero_emits_placement() {
        let project = test_project("place");
        let mut manifest = manifest_for(&project, "desk");
        let asset = project.root().join("assets/hero/hero.blend");
        fs::create_dir_all(asset.parent().unwrap()).unwrap();
        fs::write(&asset, b"BLENDER").unwrap();
        let recipe = manifest.composite.as_mut().unwrap();
        recipe.hero.asset_path = asset;
        recipe.hero.object_hint = "K1".to_string();
        write_mask(&project.mask_path("desk", "monitor"), true);
        write_mask(&project.mask_path("desk", "lamp"), false);

        let script = build_script(&project, &manifest, BuildOptions::default()).unwrap();
        let source = script.source();

        assert!(source.contains("bpy.data.libraries.load"));
        assert!(source.contains("'k1' in obj.name.lower()"));
        assert!(source.contains("hero.location.z += desk.location.z - min_z"));
        assert!(source.contains("cam.data.dof.use_dof = True"));
    }
}
