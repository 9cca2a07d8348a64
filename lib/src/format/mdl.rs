//! Model header format: skeleton, bodypart/model/mesh hierarchy, texture
//! names, material search paths and the skin family table.
//!
//! Offsets held by the file header are absolute; offsets held inside a
//! record are relative to that record's own start. Each table walk below
//! resolves offsets to absolute addresses immediately so a raw relative
//! offset never outlives the record that declared it.

use binrw::binrw;
use glam::{Quat, Vec3};

use crate::{
    format::FourCC,
    util::read::{fixed_cstr, DataCursor},
    DecodeError, Result,
};

pub const MDL_MAGIC: [u8; 4] = *b"IDST";
pub const MDL_VERSION: i32 = 48;

pub const MDL_HEADER_SIZE: u64 = 240;
pub const BONE_STRIDE: u64 = 216;
pub const BODY_PART_STRIDE: u64 = 16;
pub const MODEL_STRIDE: u64 = 148;
pub const MESH_STRIDE: u64 = 116;
pub const TEXTURE_STRIDE: u64 = 64;

/// Fixed header prefix. The on-disk header continues past
/// `body_part_offset`, but nothing this decoder needs lives there.
#[binrw]
#[derive(Clone, Debug)]
pub struct MdlHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub checksum: i32,
    pub name: [u8; 64],
    pub file_length: i32,
    pub eye_position: [f32; 3],
    pub illum_position: [f32; 3],
    pub hull_min: [f32; 3],
    pub hull_max: [f32; 3],
    pub view_min: [f32; 3],
    pub view_max: [f32; 3],
    pub flags: i32,
    pub bone_count: i32,
    pub bone_offset: i32,
    pub bone_controller_count: i32,
    pub bone_controller_offset: i32,
    pub hitbox_set_count: i32,
    pub hitbox_set_offset: i32,
    pub local_anim_count: i32,
    pub local_anim_offset: i32,
    pub local_seq_count: i32,
    pub local_seq_offset: i32,
    pub activity_list_version: i32,
    pub events_indexed: i32,
    pub texture_count: i32,
    pub texture_offset: i32,
    pub texture_dir_count: i32,
    pub texture_dir_offset: i32,
    pub skin_reference_count: i32,
    pub skin_family_count: i32,
    pub skin_offset: i32,
    pub body_part_count: i32,
    pub body_part_offset: i32,
}

#[binrw]
#[derive(Clone, Debug)]
pub struct RawBone {
    pub name_offset: i32,
    pub parent: i32,
    pub bone_controller: [i32; 6],
    pub position: [f32; 3],
    pub quat: [f32; 4],
    pub rotation: [f32; 3],
    pub position_scale: [f32; 3],
    pub rotation_scale: [f32; 3],
    pub pose_to_bone: [f32; 12],
    pub quat_alignment: [f32; 4],
    pub flags: i32,
    pub proc_type: i32,
    pub proc_offset: i32,
    pub physics_bone: i32,
    pub surface_prop_offset: i32,
    pub contents: i32,
    pub unused: [i32; 8],
}

#[binrw]
#[derive(Clone, Debug)]
pub struct RawBodyPart {
    pub name_offset: i32,
    pub model_count: i32,
    pub base: i32,
    pub model_offset: i32,
}

#[binrw]
#[derive(Clone, Debug)]
pub struct RawModel {
    pub name: [u8; 64],
    pub kind: i32,
    pub bounding_radius: f32,
    pub mesh_count: i32,
    pub mesh_offset: i32,
    pub vertex_count: i32,
    pub vertex_offset: i32,
    pub tangent_offset: i32,
    pub attachment_count: i32,
    pub attachment_offset: i32,
    pub eyeball_count: i32,
    pub eyeball_offset: i32,
    pub vertex_data: [i32; 2],
    pub unused: [i32; 8],
}

#[binrw]
#[derive(Clone, Debug)]
pub struct RawMesh {
    pub material: i32,
    pub model_offset: i32,
    pub vertex_count: i32,
    pub vertex_offset: i32,
    pub flex_count: i32,
    pub flex_offset: i32,
    pub material_type: i32,
    pub material_param: i32,
    pub mesh_id: i32,
    pub center: [f32; 3],
    pub model_vertex_data: i32,
    pub lod_vertex_counts: [i32; 8],
    pub unused: [i32; 8],
}

#[binrw]
#[derive(Clone, Debug)]
pub struct RawTexture {
    pub name_offset: i32,
    pub flags: i32,
    pub used: i32,
    pub unused1: i32,
    pub material: i32,
    pub client_material: i32,
    pub unused: [i32; 10],
}

/// One skeleton joint with both parent-relative and composed world
/// transforms.
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub local_position: Vec3,
    pub local_rotation: Quat,
    pub world_position: Vec3,
    pub world_rotation: Quat,
}

#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

/// One drawable triangle group. `vertex_count`/`vertex_offset` are the
/// counts the header declares within the owning model's local vertex space,
/// kept for cross-checking against accumulated offsets.
#[derive(Clone, Debug)]
pub struct MeshDescriptor {
    pub material: i32,
    pub vertex_count: i32,
    pub vertex_offset: i32,
}

/// One selectable option within a bodypart. `vertex_index` is the model's
/// declared byte offset into the vertex pool stream (stride 48 implied).
#[derive(Clone, Debug)]
pub struct ModelVariant {
    pub name: String,
    pub vertex_count: i32,
    pub vertex_index: i32,
    pub meshes: Vec<MeshDescriptor>,
}

/// A named slot offering interchangeable model variants. `base` is the
/// bodygroup choice divisor carried through for hosts that decode packed
/// bodygroup values.
#[derive(Clone, Debug)]
pub struct BodyPart {
    pub name: String,
    pub base: i32,
    pub models: Vec<ModelVariant>,
}

pub struct MdlFile<'a> {
    data: &'a [u8],
    pub header: MdlHeader,
}

impl<'a> MdlFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut cursor = DataCursor::new(data);
        let header: MdlHeader = cursor.read()?;
        if header.id != MDL_MAGIC {
            return Err(DecodeError::MalformedHeader(format!(
                "bad model magic {:?}",
                FourCC(header.id)
            )));
        }
        if header.version != MDL_VERSION {
            return Err(DecodeError::MalformedHeader(format!(
                "unsupported model version {}",
                header.version
            )));
        }
        Ok(Self { data, header })
    }

    pub fn name(&self) -> String { fixed_cstr(&self.header.name) }

    /// Reads the bone table and composes world transforms in a single
    /// forward pass. The format guarantees a bone's parent precedes it;
    /// a violation aborts the skeleton (and only the skeleton).
    pub fn read_skeleton(&self) -> Result<Skeleton> {
        let mut cursor = DataCursor::new(self.data);
        let count = table_len(self.header.bone_count, "bone count")?;
        let table = self.header.bone_offset as u64;

        let mut bones: Vec<Bone> = Vec::with_capacity(count);
        for i in 0..count {
            let record = table + i as u64 * BONE_STRIDE;
            let raw: RawBone = cursor.read_at(record)?;
            let name = cursor.cstr_at(rel_offset(record, raw.name_offset))?;

            let local_position = Vec3::from(raw.position);
            let local_rotation =
                Quat::from_xyzw(raw.quat[0], raw.quat[1], raw.quat[2], raw.quat[3]);

            let (parent, world_position, world_rotation) = match raw.parent {
                -1 => (None, local_position, local_rotation),
                p if p >= 0 && (p as usize) < i => {
                    let parent = &bones[p as usize];
                    (
                        Some(p as usize),
                        parent.world_position + parent.world_rotation * local_position,
                        parent.world_rotation * local_rotation,
                    )
                }
                p => return Err(DecodeError::MalformedSkeleton { bone: i, parent: p }),
            };

            bones.push(Bone {
                name,
                parent,
                local_position,
                local_rotation,
                world_position,
                world_rotation,
            });
        }
        Ok(Skeleton { bones })
    }

    /// Walks the bodypart -> model -> mesh tables. Only the LOD 0 mesh set
    /// exists at this level; per-LOD splits live in the strip index format.
    pub fn read_body_parts(&self) -> Result<Vec<BodyPart>> {
        let mut cursor = DataCursor::new(self.data);
        let count = table_len(self.header.body_part_count, "bodypart count")?;
        let table = self.header.body_part_offset as u64;

        let mut body_parts = Vec::with_capacity(count);
        for i in 0..count {
            let record = table + i as u64 * BODY_PART_STRIDE;
            let raw: RawBodyPart = cursor.read_at(record)?;
            let name = cursor.cstr_at(rel_offset(record, raw.name_offset))?;
            let models = self.read_models(&mut cursor, record, &raw)?;
            body_parts.push(BodyPart { name, base: raw.base, models });
        }
        Ok(body_parts)
    }

    fn read_models(
        &self,
        cursor: &mut DataCursor<'a>,
        body_part_record: u64,
        body_part: &RawBodyPart,
    ) -> Result<Vec<ModelVariant>> {
        let count = table_len(body_part.model_count, "model count")?;
        let table = rel_offset(body_part_record, body_part.model_offset);

        let mut models = Vec::with_capacity(count);
        for i in 0..count {
            let record = table + i as u64 * MODEL_STRIDE;
            let raw: RawModel = cursor.read_at(record)?;

            let mesh_count = table_len(raw.mesh_count, "mesh count")?;
            let mesh_table = rel_offset(record, raw.mesh_offset);
            let mut meshes = Vec::with_capacity(mesh_count);
            for j in 0..mesh_count {
                let mesh: RawMesh = cursor.read_at(mesh_table + j as u64 * MESH_STRIDE)?;
                meshes.push(MeshDescriptor {
                    material: mesh.material,
                    vertex_count: mesh.vertex_count,
                    vertex_offset: mesh.vertex_offset,
                });
            }

            models.push(ModelVariant {
                name: fixed_cstr(&raw.name),
                vertex_count: raw.vertex_count,
                vertex_index: raw.vertex_offset,
                meshes,
            });
        }
        Ok(models)
    }

    /// Texture table names, lowercased. These are logical material names,
    /// not paths; the resolver applies search-path prefixes.
    pub fn read_texture_names(&self) -> Result<Vec<String>> {
        let mut cursor = DataCursor::new(self.data);
        let count = table_len(self.header.texture_count, "texture count")?;
        let table = self.header.texture_offset as u64;

        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let record = table + i as u64 * TEXTURE_STRIDE;
            let raw: RawTexture = cursor.read_at(record)?;
            let name = cursor.cstr_at(rel_offset(record, raw.name_offset))?;
            names.push(name.replace('\\', "/").to_ascii_lowercase());
        }
        Ok(names)
    }

    /// Material search paths: an array of file-absolute string offsets.
    pub fn read_search_paths(&self) -> Result<Vec<String>> {
        let mut cursor = DataCursor::new(self.data);
        let count = table_len(self.header.texture_dir_count, "search path count")?;
        cursor.seek(self.header.texture_dir_offset as u64);
        let offsets: Vec<i32> = cursor.read_vec(count)?;

        let mut paths = Vec::with_capacity(count);
        for offset in offsets {
            let path = cursor.cstr_at(offset.max(0) as u64)?;
            paths.push(path.replace('\\', "/").to_ascii_lowercase());
        }
        Ok(paths)
    }

    /// Skin family remap table: `skin_family_count` rows of
    /// `skin_reference_count` texture-table indices. Row 0 is the default
    /// skin.
    pub fn read_skin_table(&self) -> Result<Vec<Vec<i16>>> {
        let mut cursor = DataCursor::new(self.data);
        let families = table_len(self.header.skin_family_count, "skin family count")?;
        let references = table_len(self.header.skin_reference_count, "skin reference count")?;
        cursor.seek(self.header.skin_offset as u64);

        let mut table = Vec::with_capacity(families);
        for _ in 0..families {
            table.push(cursor.read_vec(references)?);
        }
        Ok(table)
    }
}

/// Resolves a record-relative offset to an absolute address. Zero and
/// negative offsets collapse to 0 (the "no data" sentinel).
#[inline]
fn rel_offset(record: u64, offset: i32) -> u64 {
    if offset <= 0 {
        0
    } else {
        record + offset as u64
    }
}

fn table_len(count: i32, what: &str) -> Result<usize> {
    usize::try_from(count)
        .map_err(|_| DecodeError::MalformedHeader(format!("negative {what}: {count}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_relative_eq;
    use binrw::BinWriterExt;

    use super::*;

    pub(crate) fn empty_header() -> MdlHeader {
        MdlHeader {
            id: MDL_MAGIC,
            version: MDL_VERSION,
            checksum: 0,
            name: [0; 64],
            file_length: 0,
            eye_position: [0.0; 3],
            illum_position: [0.0; 3],
            hull_min: [0.0; 3],
            hull_max: [0.0; 3],
            view_min: [0.0; 3],
            view_max: [0.0; 3],
            flags: 0,
            bone_count: 0,
            bone_offset: 0,
            bone_controller_count: 0,
            bone_controller_offset: 0,
            hitbox_set_count: 0,
            hitbox_set_offset: 0,
            local_anim_count: 0,
            local_anim_offset: 0,
            local_seq_count: 0,
            local_seq_offset: 0,
            activity_list_version: 0,
            events_indexed: 0,
            texture_count: 0,
            texture_offset: 0,
            texture_dir_count: 0,
            texture_dir_offset: 0,
            skin_reference_count: 0,
            skin_family_count: 0,
            skin_offset: 0,
            body_part_count: 0,
            body_part_offset: 0,
        }
    }

    pub(crate) fn raw_bone(parent: i32, position: [f32; 3], quat: [f32; 4]) -> RawBone {
        RawBone {
            name_offset: 0,
            parent,
            bone_controller: [-1; 6],
            position,
            quat,
            rotation: [0.0; 3],
            position_scale: [0.0; 3],
            rotation_scale: [0.0; 3],
            pose_to_bone: [0.0; 12],
            quat_alignment: [0.0; 4],
            flags: 0,
            proc_type: 0,
            proc_offset: 0,
            physics_bone: 0,
            surface_prop_offset: 0,
            contents: 0,
            unused: [0; 8],
        }
    }

    pub(crate) fn write_le<T>(out: &mut Vec<u8>, value: &T)
    where T: binrw::BinWrite, for<'a> <T as binrw::BinWrite>::Args<'a>: Default {
        let mut cursor = std::io::Cursor::new(Vec::new());
        cursor
            .write_le_args(value, Default::default())
            .expect("fixture write");
        out.extend_from_slice(&cursor.into_inner());
    }

    fn build_mdl(header: &MdlHeader, bones: &[RawBone]) -> Vec<u8> {
        let mut data = Vec::new();
        write_le(&mut data, header);
        assert_eq!(data.len() as u64, MDL_HEADER_SIZE);
        for bone in bones {
            let start = data.len();
            write_le(&mut data, bone);
            assert_eq!((data.len() - start) as u64, BONE_STRIDE);
        }
        data
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut header = empty_header();
        header.id = *b"XXXX";
        let data = build_mdl(&header, &[]);
        assert!(matches!(
            MdlFile::parse(&data),
            Err(DecodeError::MalformedHeader(_))
        ));

        let mut header = empty_header();
        header.version = 44;
        let data = build_mdl(&header, &[]);
        assert!(matches!(
            MdlFile::parse(&data),
            Err(DecodeError::MalformedHeader(_))
        ));
    }

    #[test]
    fn root_bone_world_equals_local() {
        let mut header = empty_header();
        header.bone_count = 1;
        header.bone_offset = MDL_HEADER_SIZE as i32;
        let data = build_mdl(&header, &[raw_bone(-1, [1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0])]);

        let skeleton = MdlFile::parse(&data).unwrap().read_skeleton().unwrap();
        assert_eq!(skeleton.bones.len(), 1);
        let bone = &skeleton.bones[0];
        assert_eq!(bone.parent, None);
        assert_eq!(bone.world_position, bone.local_position);
        assert_eq!(bone.world_rotation, bone.local_rotation);
    }

    #[test]
    fn child_world_transform_composes_through_parent() {
        // Parent rotated 90 degrees about Z; the child's local +Y offset
        // lands at -X in world space.
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let mut header = empty_header();
        header.bone_count = 2;
        header.bone_offset = MDL_HEADER_SIZE as i32;
        let data = build_mdl(&header, &[
            raw_bone(-1, [1.0, 0.0, 0.0], [0.0, 0.0, half, half]),
            raw_bone(0, [0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
        ]);

        let skeleton = MdlFile::parse(&data).unwrap().read_skeleton().unwrap();
        let child = &skeleton.bones[1];
        assert_eq!(child.parent, Some(0));
        assert_relative_eq!(child.world_position.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(child.world_position.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(child.world_position.z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(child.world_rotation.z, half, epsilon = 1e-6);
        assert_relative_eq!(child.world_rotation.w, half, epsilon = 1e-6);
    }

    #[test]
    fn forward_parent_reference_is_malformed() {
        let mut header = empty_header();
        header.bone_count = 2;
        header.bone_offset = MDL_HEADER_SIZE as i32;
        for bad_parent in [1, 5] {
            let data = build_mdl(&header, &[
                raw_bone(-1, [0.0; 3], [0.0, 0.0, 0.0, 1.0]),
                raw_bone(bad_parent, [0.0; 3], [0.0, 0.0, 0.0, 1.0]),
            ]);
            let result = MdlFile::parse(&data).unwrap().read_skeleton();
            assert!(matches!(
                result,
                Err(DecodeError::MalformedSkeleton { bone: 1, parent }) if parent == bad_parent
            ));
        }
    }

    #[test]
    fn hierarchy_resolves_record_relative_offsets() {
        // Layout: header | bodypart record | model | mesh | name string.
        let bp_start = MDL_HEADER_SIZE;
        let model_start = bp_start + BODY_PART_STRIDE;
        let mesh_start = model_start + MODEL_STRIDE;
        let name_start = mesh_start + MESH_STRIDE;

        let mut header = empty_header();
        header.body_part_count = 1;
        header.body_part_offset = bp_start as i32;

        let mut data = Vec::new();
        write_le(&mut data, &header);
        write_le(&mut data, &RawBodyPart {
            name_offset: (name_start - bp_start) as i32,
            model_count: 1,
            base: 3,
            model_offset: (model_start - bp_start) as i32,
        });
        let mut model_name = [0u8; 64];
        model_name[..4].copy_from_slice(b"high");
        write_le(&mut data, &RawModel {
            name: model_name,
            kind: 0,
            bounding_radius: 0.0,
            mesh_count: 1,
            mesh_offset: (mesh_start - model_start) as i32,
            vertex_count: 12,
            vertex_offset: 0,
            tangent_offset: 0,
            attachment_count: 0,
            attachment_offset: 0,
            eyeball_count: 0,
            eyeball_offset: 0,
            vertex_data: [0; 2],
            unused: [0; 8],
        });
        write_le(&mut data, &RawMesh {
            material: 2,
            model_offset: 0,
            vertex_count: 12,
            vertex_offset: 0,
            flex_count: 0,
            flex_offset: 0,
            material_type: 0,
            material_param: 0,
            mesh_id: 0,
            center: [0.0; 3],
            model_vertex_data: 0,
            lod_vertex_counts: [0; 8],
            unused: [0; 8],
        });
        data.extend_from_slice(b"torso\0");

        let body_parts = MdlFile::parse(&data).unwrap().read_body_parts().unwrap();
        assert_eq!(body_parts.len(), 1);
        let part = &body_parts[0];
        assert_eq!(part.name, "torso");
        assert_eq!(part.base, 3);
        assert_eq!(part.models.len(), 1);
        assert_eq!(part.models[0].name, "high");
        assert_eq!(part.models[0].meshes.len(), 1);
        assert_eq!(part.models[0].meshes[0].material, 2);
        assert_eq!(part.models[0].meshes[0].vertex_count, 12);
    }

    #[test]
    fn skin_table_and_texture_names() {
        let texture_start = MDL_HEADER_SIZE;
        let skin_start = texture_start + 2 * TEXTURE_STRIDE;
        let name_table = skin_start + 2 * 3 * 2; // 2 families x 3 refs of i16

        let mut header = empty_header();
        header.texture_count = 2;
        header.texture_offset = texture_start as i32;
        header.skin_reference_count = 3;
        header.skin_family_count = 2;
        header.skin_offset = skin_start as i32;

        let mut data = Vec::new();
        write_le(&mut data, &header);
        for i in 0..2u64 {
            let record = texture_start + i * TEXTURE_STRIDE;
            write_le(&mut data, &RawTexture {
                name_offset: (name_table + i * 8 - record) as i32,
                flags: 0,
                used: 0,
                unused1: 0,
                material: 0,
                client_material: 0,
                unused: [0; 10],
            });
        }
        for v in [5i16, 3, 2, 0, 1, 0] {
            write_le(&mut data, &v);
        }
        data.extend_from_slice(b"BASE\0\0\0\0");
        data.extend_from_slice(b"Trim\0\0\0\0");

        let mdl = MdlFile::parse(&data).unwrap();
        assert_eq!(mdl.read_texture_names().unwrap(), vec!["base", "trim"]);
        let skins = mdl.read_skin_table().unwrap();
        assert_eq!(skins, vec![vec![5, 3, 2], vec![0, 1, 0]]);
    }
}
