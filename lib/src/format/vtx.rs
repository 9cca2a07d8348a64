//! Strip index format: the nested body part / model / LOD / mesh / strip
//! group tables that carry the per-mesh index buffers.
//!
//! All offsets inside records are relative to the record's own start. The
//! index buffers are u16 into a strip-group-local vertex table whose entries
//! point back into the mesh's original vertex order, so emitting triangles
//! is a two-hop remap.

use binrw::binrw;
use bitflags::bitflags;

use crate::{util::read::DataCursor, DecodeError, Result};

pub const VTX_VERSION: i32 = 7;

pub const VTX_HEADER_SIZE: u64 = 36;
const BODY_PART_STRIDE: u64 = 8;
const MODEL_STRIDE: u64 = 8;
const LOD_STRIDE: u64 = 12;
const MESH_STRIDE: u64 = 9;
const STRIP_GROUP_STRIDE: u64 = 25;
const STRIP_STRIDE: u64 = 27;

#[binrw]
#[derive(Clone, Debug)]
pub struct VtxHeader {
    pub version: i32,
    pub vertex_cache_size: i32,
    pub max_bones_per_strip: u16,
    pub max_bones_per_tri: u16,
    pub max_bones_per_vertex: i32,
    pub checksum: i32,
    pub lod_count: i32,
    pub material_replacement_list_offset: i32,
    pub body_part_count: i32,
    pub body_part_offset: i32,
}

#[binrw]
#[derive(Copy, Clone, Debug)]
struct RawBodyPart {
    model_count: i32,
    model_offset: i32,
}

#[binrw]
#[derive(Copy, Clone, Debug)]
struct RawModel {
    lod_count: i32,
    lod_offset: i32,
}

#[binrw]
#[derive(Copy, Clone, Debug)]
struct RawLod {
    mesh_count: i32,
    mesh_offset: i32,
    switch_point: f32,
}

#[binrw]
#[derive(Copy, Clone, Debug)]
struct RawMesh {
    strip_group_count: i32,
    strip_group_offset: i32,
    flags: u8,
}

#[binrw]
#[derive(Copy, Clone, Debug)]
struct RawStripGroup {
    vertex_count: i32,
    vertex_offset: i32,
    index_count: i32,
    index_offset: i32,
    strip_count: i32,
    strip_offset: i32,
    flags: u8,
}

#[binrw]
#[derive(Copy, Clone, Debug)]
pub(crate) struct RawStrip {
    index_count: i32,
    /// Element offset into the owning strip group's index buffer.
    index_offset: i32,
    vertex_count: i32,
    vertex_offset: i32,
    bone_count: i16,
    flags: u8,
    bone_state_change_count: i32,
    bone_state_change_offset: i32,
}

/// Strip-group vertex record, 9 bytes. `orig_mesh_vertex` is the hop back
/// into the mesh's original vertex order.
#[binrw]
#[derive(Copy, Clone, Debug)]
pub struct StripVertex {
    pub bone_weight_index: [u8; 3],
    pub bone_count: u8,
    pub orig_mesh_vertex: u16,
    pub bone_id: [i8; 3],
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct StripFlags: u8 {
        const IS_TRILIST = 0x01;
        const IS_TRISTRIP = 0x02;
    }
}

/// Triangle indices for one mesh, in the mesh's original vertex space.
/// `indices.len()` is always a multiple of 3.
#[derive(Clone, Debug, Default)]
pub struct MeshIndices {
    pub indices: Vec<u32>,
    /// Highest referenced original vertex + 1. The authoritative mesh
    /// vertex count; header-declared offsets are only cross-checked
    /// against it.
    pub inferred_vertex_count: usize,
}

pub struct VtxFile<'a> {
    data: &'a [u8],
    pub header: VtxHeader,
}

impl<'a> VtxFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut cursor = DataCursor::new(data);
        let header: VtxHeader = cursor.read()?;
        if header.version != VTX_VERSION {
            return Err(DecodeError::MalformedHeader(format!(
                "unsupported strip index version {}",
                header.version
            )));
        }
        Ok(Self { data, header })
    }

    pub fn body_part_count(&self) -> usize { self.header.body_part_count.max(0) as usize }

    pub fn model_count(&self, body_part: usize) -> Result<usize> {
        let (_, raw) = self.body_part(body_part)?;
        Ok(raw.model_count.max(0) as usize)
    }

    /// Decodes the triangle indices for every mesh of one
    /// (body part, model, LOD) coordinate, in mesh-table order.
    pub fn read_lod_meshes(
        &self,
        body_part: usize,
        model: usize,
        lod: usize,
    ) -> Result<Vec<MeshIndices>> {
        let (lod_pos, raw_lod) = self.lod(body_part, model, lod)?;
        let mut meshes = Vec::with_capacity(raw_lod.mesh_count.max(0) as usize);
        for mesh in 0..raw_lod.mesh_count.max(0) as usize {
            let mesh_pos = rel(lod_pos, raw_lod.mesh_offset) + mesh as u64 * MESH_STRIDE;
            meshes.push(self.read_mesh(mesh_pos)?);
        }
        Ok(meshes)
    }

    /// Decodes the triangle indices for a single mesh coordinate.
    pub fn read_mesh_indices(
        &self,
        body_part: usize,
        model: usize,
        lod: usize,
        mesh: usize,
    ) -> Result<MeshIndices> {
        let (lod_pos, raw_lod) = self.lod(body_part, model, lod)?;
        if mesh >= raw_lod.mesh_count.max(0) as usize {
            return Err(DecodeError::MalformedHeader(format!(
                "mesh {mesh} out of range (LOD has {})",
                raw_lod.mesh_count
            )));
        }
        let mesh_pos = rel(lod_pos, raw_lod.mesh_offset) + mesh as u64 * MESH_STRIDE;
        self.read_mesh(mesh_pos)
    }

    fn body_part(&self, body_part: usize) -> Result<(u64, RawBodyPart)> {
        if body_part >= self.body_part_count() {
            return Err(DecodeError::MalformedHeader(format!(
                "body part {body_part} out of range (file has {})",
                self.header.body_part_count
            )));
        }
        let pos = self.header.body_part_offset.max(0) as u64 + body_part as u64 * BODY_PART_STRIDE;
        let mut cursor = DataCursor::new(self.data);
        Ok((pos, cursor.read_at(pos)?))
    }

    fn lod(&self, body_part: usize, model: usize, lod: usize) -> Result<(u64, RawLod)> {
        let (bp_pos, raw_bp) = self.body_part(body_part)?;
        if model >= raw_bp.model_count.max(0) as usize {
            return Err(DecodeError::MalformedHeader(format!(
                "model {model} out of range (body part has {})",
                raw_bp.model_count
            )));
        }
        let mut cursor = DataCursor::new(self.data);
        let model_pos = rel(bp_pos, raw_bp.model_offset) + model as u64 * MODEL_STRIDE;
        let raw_model: RawModel = cursor.read_at(model_pos)?;
        if lod >= raw_model.lod_count.max(0) as usize {
            return Err(DecodeError::MalformedHeader(format!(
                "LOD {lod} out of range (model has {})",
                raw_model.lod_count
            )));
        }
        let lod_pos = rel(model_pos, raw_model.lod_offset) + lod as u64 * LOD_STRIDE;
        let raw_lod: RawLod = cursor.read_at(lod_pos)?;
        Ok((lod_pos, raw_lod))
    }

    fn read_mesh(&self, mesh_pos: u64) -> Result<MeshIndices> {
        let mut cursor = DataCursor::new(self.data);
        let raw_mesh: RawMesh = cursor.read_at(mesh_pos)?;

        let mut out = MeshIndices::default();
        for group in 0..raw_mesh.strip_group_count.max(0) as usize {
            let group_pos =
                rel(mesh_pos, raw_mesh.strip_group_offset) + group as u64 * STRIP_GROUP_STRIDE;
            self.read_strip_group(&mut cursor, group_pos, &mut out)?;
        }
        Ok(out)
    }

    fn read_strip_group(
        &self,
        cursor: &mut DataCursor<'a>,
        group_pos: u64,
        out: &mut MeshIndices,
    ) -> Result<()> {
        let raw: RawStripGroup = cursor.read_at(group_pos)?;

        cursor.seek(rel(group_pos, raw.vertex_offset));
        let vertices: Vec<StripVertex> = cursor.read_vec(raw.vertex_count.max(0) as usize)?;
        cursor.seek(rel(group_pos, raw.index_offset));
        let indices: Vec<u16> = cursor.read_vec(raw.index_count.max(0) as usize)?;

        for v in &vertices {
            out.inferred_vertex_count =
                out.inferred_vertex_count.max(v.orig_mesh_vertex as usize + 1);
        }

        for strip in 0..raw.strip_count.max(0) as usize {
            let strip_pos = rel(group_pos, raw.strip_offset) + strip as u64 * STRIP_STRIDE;
            let raw_strip: RawStrip = cursor.read_at(strip_pos)?;

            let start = raw_strip.index_offset.max(0) as usize;
            let end = start + raw_strip.index_count.max(0) as usize;
            if end > indices.len() {
                return Err(DecodeError::OutOfBounds {
                    offset: rel(group_pos, raw.index_offset) + 2 * end as u64,
                    size: self.data.len() as u64,
                });
            }
            let local = &indices[start..end];

            let flags = StripFlags::from_bits_retain(raw_strip.flags);
            if flags.contains(StripFlags::IS_TRISTRIP) {
                unroll_strip(local, &vertices, &mut out.indices)?;
            } else {
                if !flags.contains(StripFlags::IS_TRILIST) {
                    log::warn!("strip with neither list nor strip flag ({flags:?}), assuming list");
                }
                // Trailing indices that cannot form a triangle are dropped.
                for &local_index in &local[..local.len() / 3 * 3] {
                    out.indices.push(remap(local_index, &vertices)?);
                }
            }
        }
        Ok(())
    }
}

fn remap(local_index: u16, vertices: &[StripVertex]) -> Result<u32> {
    vertices
        .get(local_index as usize)
        .map(|v| v.orig_mesh_vertex as u32)
        .ok_or(DecodeError::OutOfBounds {
            offset: local_index as u64,
            size: vertices.len() as u64,
        })
}

/// Unrolls a triangle strip into list order, flipping winding on odd
/// triangles and dropping the degenerate stitches.
fn unroll_strip(local: &[u16], vertices: &[StripVertex], out: &mut Vec<u32>) -> Result<()> {
    for i in 0..local.len().saturating_sub(2) {
        let (a, b, c) = if i % 2 == 0 {
            (local[i], local[i + 1], local[i + 2])
        } else {
            (local[i + 1], local[i], local[i + 2])
        };
        if a == b || b == c || a == c {
            continue;
        }
        out.push(remap(a, vertices)?);
        out.push(remap(b, vertices)?);
        out.push(remap(c, vertices)?);
    }
    Ok(())
}

#[inline]
fn rel(record: u64, offset: i32) -> u64 {
    if offset <= 0 {
        record
    } else {
        record + offset as u64
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::format::mdl::tests::write_le;

    pub(crate) fn trilist(index_offset: i32, index_count: i32) -> RawStrip {
        RawStrip {
            index_count,
            index_offset,
            vertex_count: 0,
            vertex_offset: 0,
            bone_count: 1,
            flags: StripFlags::IS_TRILIST.bits(),
            bone_state_change_count: 0,
            bone_state_change_offset: 0,
        }
    }

    pub(crate) fn tristrip(index_offset: i32, index_count: i32) -> RawStrip {
        let mut strip = trilist(index_offset, index_count);
        strip.flags = StripFlags::IS_TRISTRIP.bits();
        strip
    }

    /// One model -> LOD -> mesh -> strip group chain over a shared vertex
    /// and index table, as a standalone blob with internal relative
    /// offsets. Placeable anywhere in a file.
    pub(crate) fn model_chain(strips: &[RawStrip], orig_ids: &[u16], indices: &[u16]) -> Vec<u8> {
        multi_mesh_chain(&[(strips, orig_ids, indices)])
    }

    /// Like [`model_chain`] but with several meshes under the single LOD,
    /// each given as (strips, vertex table, index buffer).
    pub(crate) fn multi_mesh_chain(meshes: &[(&[RawStrip], &[u16], &[u16])]) -> Vec<u8> {
        let mesh_table = (MODEL_STRIDE + LOD_STRIDE) as i32;

        let mut data = Vec::new();
        write_le(&mut data, &RawModel { lod_count: 1, lod_offset: MODEL_STRIDE as i32 });
        write_le(
            &mut data,
            &RawLod {
                mesh_count: meshes.len() as i32,
                mesh_offset: LOD_STRIDE as i32,
                switch_point: 0.0,
            },
        );
        assert_eq!(data.len() as i32, mesh_table);

        let mut group_pos = mesh_table + meshes.len() as i32 * MESH_STRIDE as i32;
        let mut groups = Vec::new();
        for (i, &(strips, orig_ids, indices)) in meshes.iter().enumerate() {
            let record = mesh_table + i as i32 * MESH_STRIDE as i32;
            write_le(
                &mut data,
                &RawMesh { strip_group_count: 1, strip_group_offset: group_pos - record, flags: 0 },
            );
            let group = strip_group_blob(strips, orig_ids, indices);
            group_pos += group.len() as i32;
            groups.push(group);
        }
        for group in groups {
            data.extend_from_slice(&group);
        }
        data
    }

    fn strip_group_blob(strips: &[RawStrip], orig_ids: &[u16], indices: &[u16]) -> Vec<u8> {
        let strip_table = STRIP_GROUP_STRIDE as i32;
        let vertex_table = strip_table + strips.len() as i32 * STRIP_STRIDE as i32;
        let index_table = vertex_table + orig_ids.len() as i32 * 9;

        let mut data = Vec::new();
        write_le(
            &mut data,
            &RawStripGroup {
                vertex_count: orig_ids.len() as i32,
                vertex_offset: vertex_table,
                index_count: indices.len() as i32,
                index_offset: index_table,
                strip_count: strips.len() as i32,
                strip_offset: strip_table,
                flags: 0,
            },
        );
        for strip in strips {
            write_le(&mut data, strip);
        }
        for &orig in orig_ids {
            write_le(
                &mut data,
                &StripVertex {
                    bone_weight_index: [0; 3],
                    bone_count: 1,
                    orig_mesh_vertex: orig,
                    bone_id: [0; 3],
                },
            );
        }
        for &index in indices {
            write_le(&mut data, &index);
        }
        data
    }

    /// A strip index file with one single-model body part per chain.
    pub(crate) fn build_file(checksum: i32, chains: &[Vec<u8>]) -> Vec<u8> {
        let header = VtxHeader {
            version: VTX_VERSION,
            vertex_cache_size: 24,
            max_bones_per_strip: 53,
            max_bones_per_tri: 9,
            max_bones_per_vertex: 3,
            checksum,
            lod_count: 1,
            material_replacement_list_offset: 0,
            body_part_count: chains.len() as i32,
            body_part_offset: VTX_HEADER_SIZE as i32,
        };
        let mut data = Vec::new();
        write_le(&mut data, &header);
        assert_eq!(data.len() as u64, VTX_HEADER_SIZE);
        let mut chain_start = VTX_HEADER_SIZE as i32 + chains.len() as i32 * BODY_PART_STRIDE as i32;
        for (i, chain) in chains.iter().enumerate() {
            let record = VTX_HEADER_SIZE as i32 + i as i32 * BODY_PART_STRIDE as i32;
            write_le(&mut data, &RawBodyPart { model_count: 1, model_offset: chain_start - record });
            chain_start += chain.len() as i32;
        }
        for chain in chains {
            data.extend_from_slice(chain);
        }
        data
    }

    #[test]
    fn trilist_remaps_through_vertex_table() {
        let chain = model_chain(&[trilist(0, 6)], &[10, 11, 12, 13], &[0, 1, 2, 2, 1, 3]);
        let data = build_file(77, &[chain]);

        let vtx = VtxFile::parse(&data).unwrap();
        let mesh = vtx.read_mesh_indices(0, 0, 0, 0).unwrap();
        assert_eq!(mesh.indices, vec![10, 11, 12, 12, 11, 13]);
        assert_eq!(mesh.inferred_vertex_count, 14);
    }

    #[test]
    fn trailing_partial_triangle_is_dropped() {
        let chain = model_chain(&[trilist(0, 5)], &[0, 1, 2, 3], &[0, 1, 2, 3, 0]);
        let data = build_file(77, &[chain]);

        let mesh = VtxFile::parse(&data).unwrap().read_mesh_indices(0, 0, 0, 0).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn strips_slice_the_shared_index_buffer() {
        let chain = model_chain(
            &[trilist(0, 3), trilist(3, 3)],
            &[5, 6, 7, 8],
            &[0, 1, 2, 1, 2, 3],
        );
        let data = build_file(77, &[chain]);

        let mesh = VtxFile::parse(&data).unwrap().read_mesh_indices(0, 0, 0, 0).unwrap();
        assert_eq!(mesh.indices, vec![5, 6, 7, 6, 7, 8]);
    }

    #[test]
    fn tristrip_unrolls_to_the_equivalent_trilist() {
        let orig = [10u16, 11, 12, 13];
        let stripped = build_file(77, &[model_chain(&[tristrip(0, 4)], &orig, &[0, 1, 2, 3])]);
        let listed = build_file(77, &[model_chain(&[trilist(0, 6)], &orig, &[0, 1, 2, 2, 1, 3])]);

        let a = VtxFile::parse(&stripped).unwrap().read_mesh_indices(0, 0, 0, 0).unwrap();
        let b = VtxFile::parse(&listed).unwrap().read_mesh_indices(0, 0, 0, 0).unwrap();
        assert_eq!(a.indices, b.indices);
    }

    #[test]
    fn tristrip_skips_degenerate_stitches() {
        // Repeated index stitches two runs together; only the first
        // triangle is real.
        let chain = model_chain(&[tristrip(0, 5)], &[0, 1, 2, 3], &[0, 1, 2, 2, 3]);
        let data = build_file(77, &[chain]);

        let mesh = VtxFile::parse(&data).unwrap().read_mesh_indices(0, 0, 0, 0).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn meshes_under_one_lod_decode_independently() {
        let chain = multi_mesh_chain(&[
            (&[trilist(0, 3)], &[0, 1, 2], &[0, 1, 2]),
            (&[trilist(0, 3)], &[4, 5, 6], &[2, 1, 0]),
        ]);
        let data = build_file(77, &[chain]);

        let vtx = VtxFile::parse(&data).unwrap();
        assert_eq!(vtx.read_mesh_indices(0, 0, 0, 0).unwrap().indices, vec![0, 1, 2]);
        let second = vtx.read_mesh_indices(0, 0, 0, 1).unwrap();
        assert_eq!(second.indices, vec![6, 5, 4]);
        assert_eq!(second.inferred_vertex_count, 7);
    }

    #[test]
    fn second_body_part_walks_its_own_chain() {
        let chains = [
            model_chain(&[trilist(0, 3)], &[0, 1, 2], &[0, 1, 2]),
            model_chain(&[trilist(0, 3)], &[7, 8, 9], &[2, 1, 0]),
        ];
        let data = build_file(77, &chains);

        let vtx = VtxFile::parse(&data).unwrap();
        assert_eq!(vtx.body_part_count(), 2);
        assert_eq!(vtx.model_count(1).unwrap(), 1);
        let meshes = vtx.read_lod_meshes(1, 0, 0).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].indices, vec![9, 8, 7]);
        assert_eq!(meshes[0].inferred_vertex_count, 10);
    }

    #[test]
    fn local_index_outside_vertex_table_is_out_of_bounds() {
        let chain = model_chain(&[trilist(0, 3)], &[0, 1], &[0, 1, 9]);
        let data = build_file(77, &[chain]);

        assert!(matches!(
            VtxFile::parse(&data).unwrap().read_mesh_indices(0, 0, 0, 0),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let data = build_file(77, &[]);
        let mut bad = data.clone();
        bad[0] = 6;
        assert!(matches!(
            VtxFile::parse(&bad),
            Err(DecodeError::MalformedHeader(_))
        ));
        assert!(VtxFile::parse(&data).is_ok());
    }
}
