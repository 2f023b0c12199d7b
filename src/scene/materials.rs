//! Material blocks for the generated scene script.
//!
//! Two families: principled finishes for the hero product (color, metallic,
//! roughness, assigned to parts by name keyword) and the occluder material
//! that shows the reference photo where a mask is set and is transparent
//! everywhere else.

use std::path::Path;

use anyhow::{bail, Result};

use crate::manifest::HeroMaterial;
use crate::scene::script::{py_f32, py_str, SceneScript};

/// Parse a hex color like `"540808"` (leading `#` allowed) into linear-ish RGB.
pub fn hex_to_rgb(hex: &str) -> Result<[f32; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid hex color '{hex}'");
    }
    let channel = |i: usize| -> f32 {
        u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0) as f32 / 255.0
    };
    Ok([channel(0), channel(2), channel(4)])
}

/// Get-or-create a principled material and assign it to every mesh object
/// whose name contains the keyword.
pub fn emit_hero_material(script: &mut SceneScript, material: &HeroMaterial) -> Result<()> {
    let [r, g, b] = hex_to_rgb(&material.base_color_hex)?;
    let name = format!("Mt_{}", material.name);
    script.push(format!(
        r#"mat = bpy.data.materials.get({name})
if mat is None:
    mat = bpy.data.materials.new(name={name})
mat.use_nodes = True
nodes = mat.node_tree.nodes
links = mat.node_tree.links
bsdf = nodes.get('Principled BSDF')
if bsdf is None:
    bsdf = nodes.new('ShaderNodeBsdfPrincipled')
out = next(n for n in nodes if n.type == 'OUTPUT_MATERIAL')
if not out.inputs['Surface'].is_linked:
    links.new(bsdf.outputs['BSDF'], out.inputs['Surface'])
bsdf.inputs['Base Color'].default_value = ({r}, {g}, {b}, 1.0)
bsdf.inputs['Metallic'].default_value = {metallic}
bsdf.inputs['Roughness'].default_value = {roughness}
for obj in bpy.data.objects:
    if obj.type == 'MESH' and {keyword} in obj.name.lower():
        if obj.data.materials:
            obj.data.materials[0] = mat
        else:
            obj.data.materials.append(mat)"#,
        name = py_str(&name),
        r = py_f32(r),
        g = py_f32(g),
        b = py_f32(b),
        metallic = py_f32(material.metallic),
        roughness = py_f32(material.roughness),
        keyword = py_str(&material.assign_to.to_lowercase()),
    ));
    Ok(())
}

/// Occluder material: reference photo as base color, mask as the mix factor
/// between transparent and shaded, so the plane hides anything behind the
/// masked region.
pub fn emit_occluder_material(
    script: &mut SceneScript,
    object_name: &str,
    reference: &Path,
    mask: &Path,
) {
    let mat_name = format!("Mat_{object_name}");
    script.push(format!(
        r#"obj = bpy.data.objects.get({object_name})
mat = bpy.data.materials.get({mat_name})
if mat is None:
    mat = bpy.data.materials.new(name={mat_name})
    mat.use_nodes = True
    nt = mat.node_tree
    for n in list(nt.nodes):
        if n.type != 'OUTPUT_MATERIAL':
            nt.nodes.remove(n)
    out = [n for n in nt.nodes if n.type == 'OUTPUT_MATERIAL'][0]
    bsdf = nt.nodes.new('ShaderNodeBsdfPrincipled')
    tex = nt.nodes.new('ShaderNodeTexImage')
    tex.image = bpy.data.images.get({ref_name}) or bpy.data.images.load({ref_path})
    tex_mask = nt.nodes.new('ShaderNodeTexImage')
    tex_mask.image = bpy.data.images.get({mask_name}) or bpy.data.images.load({mask_path})
    tex_mask.image.colorspace_settings.name = 'Non-Color'
    transparent = nt.nodes.new('ShaderNodeBsdfTransparent')
    mix = nt.nodes.new('ShaderNodeMixShader')
    nt.links.new(tex.outputs['Color'], bsdf.inputs['Base Color'])
    nt.links.new(tex_mask.outputs['Color'], mix.inputs['Fac'])
    nt.links.new(transparent.outputs['BSDF'], mix.inputs[1])
    nt.links.new(bsdf.outputs['BSDF'], mix.inputs[2])
    nt.links.new(mix.outputs['Shader'], out.inputs['Surface'])
    mat.blend_method = 'BLEND'
if obj is not None:
    if obj.data.materials:
        obj.data.materials[0] = mat
    else:
        obj.data.materials.append(mat)"#,
        object_name = py_str(object_name),
        mat_name = py_str(&mat_name),
        ref_name = py_str(&file_name(reference)),
        ref_path = py_str(&reference.display().to_string()),
        mask_name = py_str(&file_name(mask)),
        mask_path = py_str(&mask.display().to_string()),
    ));
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
