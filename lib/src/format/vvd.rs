//! Vertex pool format: the flat per-model vertex stream, its optional
//! fixup table, and the parallel tangent stream.

use binrw::binrw;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::{format::FourCC, util::read::DataCursor, DecodeError, Result};

pub const VVD_MAGIC: [u8; 4] = *b"IDSV";
pub const VVD_VERSION: i32 = 4;
pub const MAX_LOD_COUNT: usize = 8;

pub const VVD_HEADER_SIZE: u64 = 64;

#[binrw]
#[derive(Clone, Debug)]
pub struct VvdHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub checksum: i32,
    pub lod_count: i32,
    pub lod_vertex_counts: [i32; MAX_LOD_COUNT],
    pub fixup_count: i32,
    pub fixup_offset: i32,
    pub vertex_offset: i32,
    pub tangent_offset: i32,
}

/// Remaps a run of raw storage order into per-LOD logical order.
#[binrw]
#[derive(Copy, Clone, Debug)]
pub struct Fixup {
    pub lod: i32,
    pub source_vertex: i32,
    pub vertex_count: i32,
}

/// On-disk vertex record, 48 bytes.
#[derive(FromBytes, FromZeroes, AsBytes, Copy, Clone, Debug, PartialEq)]
#[repr(C)]
pub struct RawVertex {
    pub weights: [f32; 3],
    pub bones: [u8; 3],
    pub bone_count: u8,
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// One skinned vertex with its tangent attached. Bone weights are carried
/// exactly as stored; renormalization is the consumer's job.
#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    /// w is the bitangent handedness.
    pub tangent: [f32; 4],
    pub bones: [u8; 3],
    pub weights: [f32; 3],
    pub bone_count: u8,
}

/// Ordered vertex list for one LOD. Index 0..N-1 is the global vertex
/// space that mesh vertex offsets are relative to. Built once per asset
/// and shared read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct VertexPool {
    pub vertices: Vec<Vertex>,
}

const DEFAULT_TANGENT: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

pub struct VvdFile<'a> {
    data: &'a [u8],
    pub header: VvdHeader,
}

impl<'a> VvdFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut cursor = DataCursor::new(data);
        let header: VvdHeader = cursor.read()?;
        if header.id != VVD_MAGIC {
            return Err(DecodeError::MalformedHeader(format!(
                "bad vertex pool magic {:?}",
                FourCC(header.id)
            )));
        }
        if header.version != VVD_VERSION {
            return Err(DecodeError::MalformedHeader(format!(
                "unsupported vertex pool version {}",
                header.version
            )));
        }
        Ok(Self { data, header })
    }

    /// Decodes the ordered vertex list for `lod`.
    ///
    /// With a fixup table the raw stream is stored out of logical order;
    /// the output is the concatenation, in fixup-table order, of every run
    /// whose target LOD covers the requested one. Without fixups the
    /// stream is already in LOD order.
    pub fn read_vertices(&self, lod: usize) -> Result<VertexPool> {
        let lod_count = self.header.lod_count.max(0) as usize;
        if lod >= lod_count.min(MAX_LOD_COUNT) {
            return Err(DecodeError::MalformedHeader(format!(
                "LOD {lod} out of range (file has {lod_count})"
            )));
        }
        let declared = self.header.lod_vertex_counts[lod].max(0) as usize;

        let mut cursor = DataCursor::new(self.data);
        let vertices = if self.header.fixup_count > 0 {
            cursor.seek(self.header.fixup_offset as u64);
            let fixups: Vec<Fixup> = cursor.read_vec(self.header.fixup_count as usize)?;

            // The raw pool must cover the furthest run any fixup touches.
            let raw_count = fixups
                .iter()
                .map(|f| f.source_vertex.max(0) as usize + f.vertex_count.max(0) as usize)
                .max()
                .unwrap_or(0);
            let raw = self.read_raw(&mut cursor, raw_count)?;

            let mut out = Vec::with_capacity(declared);
            for fixup in fixups.iter().filter(|f| f.lod >= lod as i32) {
                let start = fixup.source_vertex.max(0) as usize;
                let end = start + fixup.vertex_count.max(0) as usize;
                out.extend_from_slice(&raw[start..end]);
            }
            out
        } else {
            self.read_raw(&mut cursor, declared)?
        };

        if vertices.len() != declared {
            log::warn!(
                "vertex pool LOD {lod}: fixups produced {} vertices, header declares {declared}",
                vertices.len()
            );
        }
        Ok(VertexPool { vertices })
    }

    /// Reads `count` raw records plus the parallel tangent stream (or a
    /// synthesized default when the file carries none).
    fn read_raw(&self, cursor: &mut DataCursor<'a>, count: usize) -> Result<Vec<Vertex>> {
        cursor.seek(self.header.vertex_offset as u64);
        let raw: Vec<RawVertex> = cursor.read_pod_vec(count)?;

        let tangents: Vec<[f32; 4]> = if self.header.tangent_offset > 0 {
            cursor.seek(self.header.tangent_offset as u64);
            cursor.read_pod_vec(count)?
        } else {
            vec![DEFAULT_TANGENT; count]
        };

        Ok(raw
            .into_iter()
            .zip(tangents)
            .map(|(v, tangent)| Vertex {
                position: v.position,
                normal: v.normal,
                tex_coord: v.tex_coord,
                tangent,
                bones: v.bones,
                weights: v.weights,
                bone_count: v.bone_count,
            })
            .collect())
    }
}
