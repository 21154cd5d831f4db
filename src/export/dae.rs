use chrono::{SecondsFormat, Utc};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use xmltree::{Element, EmitterConfig};

use super::partition::{partition_mesh, PartBlock};
use super::xml::{
    build_source_float_array, build_source_mat4_array, build_source_name_array, element, input,
    join_floats, join_values, push, text_element,
};
use crate::error::{DaeError, Result};
use crate::model::{Mesh, Model};
use crate::skeleton::{BoneTree, SkeletonDatabase, SkeletonRecord, SkeletonSubset};

/// Authoring tool written by this exporter and recognized as native on import.
pub const NATIVE_AUTHORING_TOOL: &str = "FFXIV TexTools2";

const COLLADA_NAMESPACE: &str = "http://www.collada.org/2005/11/COLLADASchema";

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Configuration for DAE export
#[derive(Debug, Clone)]
pub struct DaeExportConfig {
    /// Multiplier applied to positions and matrix translations.
    pub scale_factor: f32,
    pub authoring_tool: String,
    /// Root bone names tried in order when writing the joint hierarchy.
    pub root_bone_names: Vec<String>,
}

impl Default for DaeExportConfig {
    fn default() -> Self {
        Self {
            scale_factor: 10.0,
            authoring_tool: NATIVE_AUTHORING_TOOL.to_string(),
            root_bone_names: vec!["n_root".to_string(), "j_kao".to_string()],
        }
    }
}

/// A LoD0 mesh that will be written, with its part blocks.
struct ExportMesh<'a> {
    index: usize,
    mesh: &'a Mesh,
    blocks: Vec<PartBlock>,
}

/// Everything resolved up front so the document is only built from valid data.
struct ExportScene<'a> {
    model: &'a Model,
    config: &'a DaeExportConfig,
    subset: SkeletonSubset,
    root_bone: String,
    /// Inverse bind matrices in bone list order, already in COLLADA layout.
    bind_poses: Vec<f32>,
    meshes: Vec<ExportMesh<'a>>,
}

impl ExportMesh<'_> {
    /// `{model}_{mesh}`, shared by the mesh's material, effect and images.
    fn base_name(&self, model: &Model) -> String {
        format!("{}_{}", model.name, self.index)
    }

    /// `{model}_{mesh}{suffix}` for one part.
    fn part_name(&self, model: &Model, block: &PartBlock) -> String {
        format!("{}_{}{}", model.name, self.index, block.id_suffix())
    }
}

fn build_export_scene<'a>(
    model: &'a Model,
    skeleton: &SkeletonDatabase,
    config: &'a DaeExportConfig,
) -> Result<ExportScene<'a>> {
    let subset = SkeletonSubset::resolve(skeleton, &model.bone_list)?;
    let root_bone = subset
        .find_root(&config.root_bone_names)
        .map(|record| record.bone_name.clone())
        .ok_or_else(|| DaeError::MissingRootBone {
            tried: config.root_bone_names.clone(),
        })?;

    let bind_poses = inverse_bind_poses(model, &subset, config.scale_factor);

    let mut meshes = Vec::new();
    for (index, mesh) in model.lod0_meshes().iter().enumerate() {
        if mesh.vertex_data.positions.is_empty() {
            log::warn!("Mesh {index} of {} has no positions and was skipped", model.name);
            continue;
        }
        check_streams(index, mesh)?;
        let blocks = partition_mesh(index, mesh)?;
        meshes.push(ExportMesh {
            index,
            mesh,
            blocks,
        });
    }

    Ok(ExportScene {
        model,
        config,
        subset,
        root_bone,
        bind_poses,
        meshes,
    })
}

/// Required streams must cover every position. Optional streams may be empty.
fn check_streams(mesh_index: usize, mesh: &Mesh) -> Result<()> {
    let data = &mesh.vertex_data;
    let expected = data.positions.len();

    let check = |stream: &'static str, len: usize, required: bool| {
        if (required || len > 0) && len < expected {
            Err(DaeError::StreamLength {
                mesh: mesh_index,
                stream,
                len,
                expected,
            })
        } else {
            Ok(())
        }
    };

    check("normals", data.normals.len(), true)?;
    check("texture coordinates 0", data.texture_coordinates0.len(), true)?;
    check("binormals", data.binormals.len(), true)?;
    check("tangents", data.tangents.len(), false)?;
    check("texture coordinates 1", data.texture_coordinates1.len(), false)?;
    if mesh.has_bone_weights() {
        check("bone weights", data.bone_weights.len(), true)?;
        check("bone indices", data.bone_indices.len(), true)?;
    }
    Ok(())
}

fn inverse_bind_poses(model: &Model, subset: &SkeletonSubset, scale: f32) -> Vec<f32> {
    let mut values = Vec::with_capacity(model.bone_list.len() * 16);
    for bone in &model.bone_list {
        match subset.get(bone) {
            Some(record) => values.extend(record.collada_inverse_pose(scale)),
            None => log::warn!("Bone {bone} has no skeleton record, its bind pose was omitted"),
        }
    }
    values
}

/// Export a model's first level of detail to a COLLADA (.dae) file including
/// materials, geometry, skinning and the joint hierarchy.
///
/// The document is built completely before the output file is created.
pub fn export_model_to_dae(
    model: &Model,
    skeleton: &SkeletonDatabase,
    output_path: &Path,
    config: &DaeExportConfig,
) -> Result<()> {
    let collada = build_collada_document(model, skeleton, config)?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    collada.write_with_config(&mut writer, EmitterConfig::new().perform_indent(true))?;
    writer.flush()?;

    log::info!("Exported {} to {}", model.name, output_path.display());
    Ok(())
}

/// Load the race skeleton from `skeleton_dir` and export.
pub fn export_model_to_dae_with_skeleton_dir(
    model: &Model,
    skeleton_dir: &Path,
    output_path: &Path,
    config: &DaeExportConfig,
) -> Result<()> {
    let skeleton = SkeletonDatabase::load_for_model(skeleton_dir, model)?;
    export_model_to_dae(model, &skeleton, output_path, config)
}

/// Build the `<COLLADA>` root element without writing it.
pub fn build_collada_document(
    model: &Model,
    skeleton: &SkeletonDatabase,
    config: &DaeExportConfig,
) -> Result<Element> {
    let scene = build_export_scene(model, skeleton, config)?;

    let mut collada = element(
        "COLLADA",
        &[("xmlns", COLLADA_NAMESPACE), ("version", "1.4.1")],
    );
    push(&mut collada, build_asset(config));
    push(&mut collada, build_library_images(&scene));
    push(&mut collada, build_library_effects(&scene));
    push(&mut collada, build_library_materials(&scene));
    push(&mut collada, build_library_geometries(&scene));
    push(&mut collada, build_library_controllers(&scene)?);
    push(&mut collada, build_library_visual_scenes(&scene)?);

    let mut scene_elem = Element::new("scene");
    push(
        &mut scene_elem,
        element("instance_visual_scene", &[("url", "#Scene")]),
    );
    push(&mut collada, scene_elem);

    Ok(collada)
}

fn build_asset(config: &DaeExportConfig) -> Element {
    let mut asset = Element::new("asset");

    let mut contributor = Element::new("contributor");
    push(
        &mut contributor,
        text_element("authoring_tool", &[], config.authoring_tool.clone()),
    );
    push(&mut asset, contributor);

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    push(&mut asset, text_element("created", &[], now.clone()));
    push(&mut asset, text_element("modified", &[], now));
    push(
        &mut asset,
        element("unit", &[("name", "inch"), ("meter", "0.0254")]),
    );
    push(&mut asset, text_element("up_axis", &[], "Y_UP".to_string()));

    asset
}

/// Texture slots referenced by a mesh's material, in document order.
fn texture_slots(is_body: bool) -> &'static [&'static str] {
    if is_body {
        &["Diffuse", "Normal"]
    } else {
        &["Diffuse", "Normal", "Specular", "Alpha"]
    }
}

fn build_library_images(scene: &ExportScene) -> Element {
    let mut library = Element::new("library_images");
    for mesh in &scene.meshes {
        let base = mesh.base_name(scene.model);
        for slot in texture_slots(mesh.mesh.is_body) {
            let id = format!("{base}_{slot}_bmp");
            let mut image = element("image", &[("id", id.as_str()), ("name", id.as_str())]);
            push(
                &mut image,
                text_element("init_from", &[], format!("{base}_{slot}.bmp")),
            );
            push(&mut library, image);
        }
    }
    library
}

fn build_library_effects(scene: &ExportScene) -> Element {
    let mut library = Element::new("library_effects");
    for mesh in &scene.meshes {
        push(&mut library, build_effect(&mesh.base_name(scene.model), mesh.mesh.is_body));
    }
    library
}

fn build_effect(base: &str, is_body: bool) -> Element {
    let texcoord = format!("geom-{base}-map1");
    let sampler = |slot: &str| format!("{base}_{slot}_bmp-sampler");
    let texture = |slot: &str| {
        element(
            "texture",
            &[("texture", sampler(slot).as_str()), ("texcoord", texcoord.as_str())],
        )
    };
    let wrapped = |name: &str, attributes: &[(&str, &str)], slot: &str| {
        let mut outer = element(name, attributes);
        push(&mut outer, texture(slot));
        outer
    };

    let mut profile = Element::new("profile_COMMON");
    for &slot in texture_slots(is_body) {
        let image = format!("{base}_{slot}_bmp");
        let surface_sid = format!("{image}-surface");

        let mut surface_param = element("newparam", &[("sid", surface_sid.as_str())]);
        let mut surface = element("surface", &[("type", "2D")]);
        push(&mut surface, text_element("init_from", &[], image.clone()));
        push(&mut surface_param, surface);
        push(&mut profile, surface_param);

        let mut sampler_param = element("newparam", &[("sid", sampler(slot).as_str())]);
        let mut sampler2d = Element::new("sampler2D");
        push(&mut sampler2d, text_element("source", &[], surface_sid));
        push(&mut sampler_param, sampler2d);
        push(&mut profile, sampler_param);
    }

    let mut phong = Element::new("phong");
    push(&mut phong, wrapped("diffuse", &[], "Diffuse"));
    if !is_body {
        push(&mut phong, wrapped("specular", &[], "Specular"));
        push(&mut phong, wrapped("transparent", &[("opaque", "A_ONE")], "Alpha"));
    }

    let mut max_technique = element("technique", &[("profile", "OpenCOLLADA3dsMax")]);
    if !is_body {
        push(&mut max_technique, wrapped("specularLevel", &[], "Specular"));
    }
    push(
        &mut max_technique,
        wrapped("bump", &[("bumptype", "HEIGHTFIELD")], "Normal"),
    );
    let mut extra = Element::new("extra");
    push(&mut extra, max_technique);

    let mut technique = element("technique", &[("sid", "common")]);
    push(&mut technique, phong);
    push(&mut technique, extra);
    push(&mut profile, technique);

    let mut effect = element("effect", &[("id", base), ("name", base)]);
    push(&mut effect, profile);
    effect
}

fn build_library_materials(scene: &ExportScene) -> Element {
    let mut library = Element::new("library_materials");
    for mesh in &scene.meshes {
        let base = mesh.base_name(scene.model);
        let id = format!("{base}-material");
        let mut material = element("material", &[("id", id.as_str()), ("name", base.as_str())]);
        push(
            &mut material,
            element("instance_effect", &[("url", format!("#{base}").as_str())]),
        );
        push(&mut library, material);
    }
    library
}

fn build_library_geometries(scene: &ExportScene) -> Element {
    let mut library = Element::new("library_geometries");
    for mesh in &scene.meshes {
        for block in &mesh.blocks {
            push(&mut library, build_geometry(scene, mesh, block));
        }
    }
    library
}

fn build_geometry(scene: &ExportScene, mesh: &ExportMesh, block: &PartBlock) -> Element {
    let data = &mesh.mesh.vertex_data;
    let rows = block.vertex_range.clone();
    let scale = scene.config.scale_factor;

    let name = mesh.part_name(scene.model, block);
    let geom_id = format!("geom-{name}");
    let positions_id = format!("{geom_id}-positions");
    let normals_id = format!("{geom_id}-normals");
    let map0_id = format!("{geom_id}-map0");
    let map1_id = format!("{geom_id}-map1");
    let tangents_id = format!("{geom_id}-map0-textangents");
    let binormals_id = format!("{geom_id}-map0-texbinormals");
    let vertices_id = format!("{geom_id}-vertices");

    let has_uv1 = !data.texture_coordinates1.is_empty();
    let has_tangents = !data.tangents.is_empty();

    let mut mesh_elem = Element::new("mesh");

    let positions: Vec<f32> = data.positions[rows.clone()]
        .iter()
        .flat_map(|p| (*p * scale).to_array())
        .collect();
    push(
        &mut mesh_elem,
        build_source_float_array(&positions_id, &positions, &["X", "Y", "Z"]),
    );

    let normals: Vec<f32> = data.normals[rows.clone()]
        .iter()
        .flat_map(|n| n.to_array())
        .collect();
    push(
        &mut mesh_elem,
        build_source_float_array(&normals_id, &normals, &["X", "Y", "Z"]),
    );

    // V runs down in the binary format.
    let map0: Vec<f32> = data.texture_coordinates0[rows.clone()]
        .iter()
        .flat_map(|t| [t.x, -t.y])
        .collect();
    push(
        &mut mesh_elem,
        build_source_float_array(&map0_id, &map0, &["S", "T"]),
    );

    if has_uv1 {
        let map1: Vec<f32> = data.texture_coordinates1[rows.clone()]
            .iter()
            .flat_map(|t| [t.x, -t.y])
            .collect();
        push(
            &mut mesh_elem,
            build_source_float_array(&map1_id, &map1, &["S", "T"]),
        );
    }

    if has_tangents {
        let tangents: Vec<f32> = data.tangents[rows.clone()]
            .iter()
            .flat_map(|t| t.to_array())
            .collect();
        push(
            &mut mesh_elem,
            build_source_float_array(&tangents_id, &tangents, &["X", "Y", "Z"]),
        );
    }

    let binormals: Vec<f32> = data.binormals[rows]
        .iter()
        .flat_map(|b| b.to_array())
        .collect();
    push(
        &mut mesh_elem,
        build_source_float_array(&binormals_id, &binormals, &["X", "Y", "Z"]),
    );

    let mut vertices = element("vertices", &[("id", vertices_id.as_str())]);
    push(&mut vertices, input("POSITION", &positions_id, None, None));
    push(&mut mesh_elem, vertices);

    let material = mesh.base_name(scene.model);
    let count = (block.indices.len() / 3).to_string();
    let mut triangles = element(
        "triangles",
        &[("material", material.as_str()), ("count", count.as_str())],
    );
    push(&mut triangles, input("VERTEX", &vertices_id, Some(0), None));
    push(&mut triangles, input("NORMAL", &normals_id, Some(1), None));
    push(&mut triangles, input("TEXCOORD", &map0_id, Some(2), Some(0)));
    if has_uv1 {
        push(&mut triangles, input("TEXCOORD", &map1_id, Some(2), Some(1)));
    }
    if has_tangents {
        push(&mut triangles, input("TEXTANGENT", &tangents_id, Some(3), Some(1)));
    }
    push(&mut triangles, input("TEXBINORMAL", &binormals_id, Some(3), Some(1)));

    // Every input reads the same vertex row, once per offset.
    let p: Vec<u32> = block
        .indices
        .iter()
        .flat_map(|&i| [i; 4])
        .collect();
    push(&mut triangles, text_element("p", &[], join_values(&p)));
    push(&mut mesh_elem, triangles);

    let mut geometry = element("geometry", &[("id", geom_id.as_str()), ("name", name.as_str())]);
    push(&mut geometry, mesh_elem);
    geometry
}

fn build_library_controllers(scene: &ExportScene) -> Result<Element> {
    let mut library = Element::new("library_controllers");
    for mesh in scene.meshes.iter().filter(|m| m.mesh.has_bone_weights()) {
        for block in &mesh.blocks {
            push(&mut library, build_controller(scene, mesh, block)?);
        }
    }
    Ok(library)
}

fn build_controller(scene: &ExportScene, mesh: &ExportMesh, block: &PartBlock) -> Result<Element> {
    let data = &mesh.mesh.vertex_data;

    let geom_id = format!("geom-{}", mesh.part_name(scene.model, block));
    let ctrl_id = format!("{geom_id}-skin1");
    let joints_id = format!("{ctrl_id}-joints");
    let bind_poses_id = format!("{ctrl_id}-bind_poses");
    let weights_id = format!("{ctrl_id}-weights");

    // Rows the part references, in ascending order.
    let rows: BTreeSet<usize> = block
        .indices
        .iter()
        .map(|&i| block.vertex_range.start + i as usize)
        .collect();

    let mut weights = Vec::new();
    let mut vcounts = Vec::with_capacity(rows.len());
    let mut pairs = Vec::new();
    for &row in &rows {
        let mut influences = 0;
        for (&weight, &local) in data.bone_weights[row].iter().zip(&data.bone_indices[row]) {
            if weight <= 0.0 {
                continue;
            }
            let global = scene
                .model
                .global_bone_index(mesh.mesh, local)
                .ok_or_else(|| DaeError::UnknownReference {
                    owner: format!("Mesh {} vertex {row}", mesh.index),
                    target: format!("local bone index {local}"),
                })?;
            pairs.push(global);
            pairs.push(weights.len());
            weights.push(weight);
            influences += 1;
        }
        vcounts.push(influences);
    }

    let mut skin = element("skin", &[("source", format!("#{geom_id}").as_str())]);
    push(
        &mut skin,
        text_element("bind_shape_matrix", &[], join_floats(&IDENTITY)),
    );
    push(
        &mut skin,
        build_source_name_array(&joints_id, &scene.model.bone_list),
    );
    push(
        &mut skin,
        build_source_mat4_array(&bind_poses_id, &scene.bind_poses),
    );
    push(
        &mut skin,
        build_source_float_array(&weights_id, &weights, &["WEIGHT"]),
    );

    let mut joints = Element::new("joints");
    push(&mut joints, input("JOINT", &joints_id, None, None));
    push(&mut joints, input("INV_BIND_MATRIX", &bind_poses_id, None, None));
    push(&mut skin, joints);

    let mut vertex_weights = element(
        "vertex_weights",
        &[("count", rows.len().to_string().as_str())],
    );
    push(&mut vertex_weights, input("JOINT", &joints_id, Some(0), None));
    push(&mut vertex_weights, input("WEIGHT", &weights_id, Some(1), None));
    push(&mut vertex_weights, text_element("vcount", &[], join_values(&vcounts)));
    push(&mut vertex_weights, text_element("v", &[], join_values(&pairs)));
    push(&mut skin, vertex_weights);

    let mut controller = element("controller", &[("id", ctrl_id.as_str())]);
    push(&mut controller, skin);
    Ok(controller)
}

fn build_library_visual_scenes(scene: &ExportScene) -> Result<Element> {
    let mut visual_scene = element("visual_scene", &[("id", "Scene"), ("name", "Scene")]);

    let root = scene
        .subset
        .get(&scene.root_bone)
        .ok_or_else(|| DaeError::MissingRootBone {
            tried: scene.config.root_bone_names.clone(),
        })?;
    let tree = BoneTree::new(&scene.subset);
    push(
        &mut visual_scene,
        build_bone_node(root, &tree, scene.config.scale_factor),
    );

    for mesh in &scene.meshes {
        let group_name = format!("Group_{}", mesh.index);
        let mut group = element(
            "node",
            &[
                ("id", format!("node-{group_name}").as_str()),
                ("name", group_name.as_str()),
            ],
        );
        for block in &mesh.blocks {
            push(&mut group, build_part_node(scene, mesh, block));
        }
        push(&mut visual_scene, group);
    }

    let mut library = Element::new("library_visual_scenes");
    push(&mut library, visual_scene);
    Ok(library)
}

fn build_bone_node(bone: &SkeletonRecord, tree: &BoneTree, scale: f32) -> Element {
    let name = bone.bone_name.as_str();
    let mut node = element(
        "node",
        &[
            ("id", format!("node-{name}").as_str()),
            ("name", name),
            ("sid", name),
            ("type", "JOINT"),
        ],
    );
    push(
        &mut node,
        text_element(
            "matrix",
            &[("sid", "matrix")],
            join_floats(&bone.collada_pose(scale)),
        ),
    );
    for child in tree.children(bone) {
        push(&mut node, build_bone_node(child, tree, scale));
    }
    node
}

fn build_part_node(scene: &ExportScene, mesh: &ExportMesh, block: &PartBlock) -> Element {
    let name = mesh.part_name(scene.model, block);
    let base = mesh.base_name(scene.model);
    let geom_id = format!("geom-{name}");

    let mut node = element(
        "node",
        &[("id", format!("node-{name}").as_str()), ("name", name.as_str())],
    );

    let mut instance = if mesh.mesh.has_bone_weights() {
        let mut instance = element(
            "instance_controller",
            &[("url", format!("#{geom_id}-skin1").as_str())],
        );
        push(
            &mut instance,
            text_element("skeleton", &[], format!("#node-{}", scene.root_bone)),
        );
        instance
    } else {
        element("instance_geometry", &[("url", format!("#{geom_id}").as_str())])
    };

    let mut instance_material = element(
        "instance_material",
        &[
            ("symbol", base.as_str()),
            ("target", format!("#{base}-material").as_str()),
        ],
    );
    push(
        &mut instance_material,
        element(
            "bind_vertex_input",
            &[
                ("semantic", format!("geom-{base}-map1").as_str()),
                ("input_semantic", "TEXCOORD"),
                ("input_set", "0"),
            ],
        ),
    );
    let mut technique = Element::new("technique_common");
    push(&mut technique, instance_material);
    let mut bind_material = Element::new("bind_material");
    push(&mut bind_material, technique);
    push(&mut instance, bind_material);

    push(&mut node, instance);
    node
}
