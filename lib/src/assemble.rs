//! Asset assembly: joins the model header, vertex pool and strip index
//! streams of one asset into an engine-agnostic skinned mesh.
//!
//! Granularity of failure follows the error design in the crate root:
//! header and checksum problems abort the asset, a skeleton problem drops
//! only the skeleton, and any per-mesh problem drops that mesh and marks
//! the output degraded.

use crate::{
    format::{
        mdl::{MdlFile, Skeleton},
        vtx::VtxFile,
        vvd::{VertexPool, VvdFile},
    },
    material::{AssetCatalog, MaterialResolver, ResolvedMaterial},
    DecodeError, Result,
};

/// Implied stride of the vertex pool records, used to convert the header's
/// declared per-model byte offsets for the cross-check.
const VERTEX_STRIDE: i32 = 48;

/// One drawable triangle group with its indices translated into the shared
/// vertex pool's space and its material fully resolved.
#[derive(Clone, Debug)]
pub struct AssembledMesh {
    pub indices: Vec<u32>,
    pub material: ResolvedMaterial,
}

/// One selectable variant of a bodygroup slot.
#[derive(Clone, Debug)]
pub struct AssembledVariant {
    pub name: String,
    pub meshes: Vec<AssembledMesh>,
}

/// A bodygroup slot and its interchangeable variants. `base` is the
/// bodygroup choice divisor from the header.
#[derive(Clone, Debug)]
pub struct BodyPartChoices {
    pub name: String,
    pub base: i32,
    pub variants: Vec<AssembledVariant>,
}

/// The reconstructed asset. `vertex_pool` is shared by every mesh; all
/// mesh indices point into it. `degraded` reports that at least one
/// sub-resource was dropped or substituted.
#[derive(Clone, Debug)]
pub struct AssembledModel {
    pub name: String,
    pub skeleton: Option<Skeleton>,
    pub vertex_pool: VertexPool,
    pub body_parts: Vec<BodyPartChoices>,
    pub degraded: bool,
}

/// Decodes and joins the three streams of one asset.
pub fn assemble<C: AssetCatalog>(
    mdl_bytes: &[u8],
    vvd_bytes: &[u8],
    vtx_bytes: &[u8],
    catalog: &C,
) -> Result<AssembledModel> {
    let mdl = MdlFile::parse(mdl_bytes)?;
    let vvd = VvdFile::parse(vvd_bytes)?;
    let vtx = VtxFile::parse(vtx_bytes)?;

    // The three files are only a valid set when built from the same
    // source; the shared checksum is the pairing proof.
    if mdl.header.checksum != vvd.header.checksum || mdl.header.checksum != vtx.header.checksum {
        return Err(DecodeError::MalformedHeader(format!(
            "checksum mismatch: model {:#x}, vertex pool {:#x}, strip index {:#x}",
            mdl.header.checksum, vvd.header.checksum, vtx.header.checksum
        )));
    }

    let mut degraded = false;

    let skeleton = match mdl.read_skeleton() {
        Ok(skeleton) => Some(skeleton),
        Err(e) => {
            log::warn!("skeleton decode failed, continuing without: {e}");
            degraded = true;
            None
        }
    };

    let mut vertex_pool = vvd.read_vertices(0)?;
    normalize_weights(&mut vertex_pool);

    let body_parts = mdl.read_body_parts()?;
    let texture_names = mdl.read_texture_names().unwrap_or_else(|e| {
        log::warn!("texture name table unreadable: {e}");
        degraded = true;
        Vec::new()
    });
    let search_paths = mdl.read_search_paths().unwrap_or_else(|e| {
        log::warn!("search path table unreadable: {e}");
        degraded = true;
        Vec::new()
    });
    let skin_table = mdl.read_skin_table().unwrap_or_else(|e| {
        log::warn!("skin table unreadable: {e}");
        degraded = true;
        Vec::new()
    });
    let resolver =
        MaterialResolver::new(catalog, &texture_names, &search_paths, &skin_table, &mdl.name());

    // Base vertex offsets accumulate across every preceding bodypart,
    // model and mesh, using counts the index data itself implies. The
    // header's declared offsets are only cross-checked; when the two
    // disagree the accumulated value wins.
    let mut base = 0usize;
    let mut out_parts = Vec::with_capacity(body_parts.len());
    for (bp_index, body_part) in body_parts.iter().enumerate() {
        let mut variants = Vec::with_capacity(body_part.models.len());
        for (model_index, model) in body_part.models.iter().enumerate() {
            let declared_base = model.vertex_index / VERTEX_STRIDE;
            if declared_base >= 0 && declared_base as usize != base {
                log::warn!(
                    "model {}/{}: declared base vertex {declared_base} != accumulated {base}",
                    body_part.name,
                    model.name
                );
            }

            let mut meshes = Vec::with_capacity(model.meshes.len());
            for (mesh_index, descriptor) in model.meshes.iter().enumerate() {
                let decoded = match vtx.read_mesh_indices(bp_index, model_index, 0, mesh_index) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        log::warn!(
                            "mesh {mesh_index} of {}/{}: index decode failed, dropping mesh: {e}",
                            body_part.name,
                            model.name
                        );
                        degraded = true;
                        base += descriptor.vertex_count.max(0) as usize;
                        continue;
                    }
                };

                // Inferred count is authoritative; fall back to the
                // declared one for meshes with no index data at all.
                let count = if decoded.inferred_vertex_count > 0 {
                    decoded.inferred_vertex_count
                } else {
                    descriptor.vertex_count.max(0) as usize
                };
                if descriptor.vertex_count >= 0 && count != descriptor.vertex_count as usize {
                    log::warn!(
                        "mesh {mesh_index} of {}/{}: inferred {count} vertices, header declares {}",
                        body_part.name,
                        model.name,
                        descriptor.vertex_count
                    );
                }

                let indices: Vec<u32> =
                    decoded.indices.iter().map(|&i| i + base as u32).collect();
                if indices.iter().any(|&i| i as usize >= vertex_pool.vertices.len()) {
                    log::warn!(
                        "mesh {mesh_index} of {}/{}: indices past the vertex pool, dropping mesh",
                        body_part.name,
                        model.name
                    );
                    degraded = true;
                    base += count;
                    continue;
                }

                let material = resolver.resolve(descriptor.material);
                meshes.push(AssembledMesh { indices, material });
                base += count;
            }

            variants.push(AssembledVariant { name: model.name.clone(), meshes });
        }
        out_parts.push(BodyPartChoices {
            name: body_part.name.clone(),
            base: body_part.base,
            variants,
        });
    }

    Ok(AssembledModel {
        name: mdl.name(),
        skeleton,
        vertex_pool,
        body_parts: out_parts,
        degraded,
    })
}

/// Pool weights are stored unnormalized; consumers need them summing to 1
/// over the active bone influences.
fn normalize_weights(pool: &mut VertexPool) {
    for vertex in &mut pool.vertices {
        let n = (vertex.bone_count as usize).min(vertex.weights.len());
        let sum: f32 = vertex.weights[..n].iter().sum();
        if sum > 0.0 {
            for weight in &mut vertex.weights[..n] {
                *weight /= sum;
            }
        } else if n > 0 {
            vertex.weights[0] = 1.0;
        }
    }
}
