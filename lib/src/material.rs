//! Material resolution: from a mesh's material reference through the skin
//! table, texture name table, script lookup and texture decode, down to
//! ready-to-use RGBA images.
//!
//! Lookups go through a caller-supplied catalog. Every miss along the way
//! degrades to a neutral default and is logged; resolution itself never
//! fails.

use image::{Rgba, RgbaImage};

use crate::format::{vmt::MaterialScript, vtf::VtfFile};

/// Content lookup capability supplied by the host. `None` means not found;
/// the resolver substitutes defaults.
pub trait AssetCatalog {
    fn find_material_script(&self, name: &str) -> Option<Vec<u8>>;
    fn find_texture(&self, name: &str) -> Option<Vec<u8>>;
}

/// A fully resolved mesh material. `base` and `normal` are always present
/// (flat white / flat mid-gray when nothing better could be found); the
/// warp and exponent maps exist only when the script declares them.
#[derive(Clone, Debug)]
pub struct ResolvedMaterial {
    /// Texture-table name after the skin remap.
    pub name: String,
    pub shader: String,
    pub base: RgbaImage,
    pub normal: RgbaImage,
    pub light_warp: Option<RgbaImage>,
    pub specular_warp: Option<RgbaImage>,
    pub specular_exponent: Option<RgbaImage>,
    /// The parsed script, for callers that need shader parameters beyond
    /// the decoded maps.
    pub script: Option<MaterialScript>,
}

const FLAT_WHITE: [u8; 4] = [255, 255, 255, 255];
const FLAT_MID_GRAY: [u8; 4] = [128, 128, 128, 255];

fn flat(color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(1, 1, Rgba(color))
}

pub struct MaterialResolver<'a, C> {
    catalog: &'a C,
    texture_names: &'a [String],
    search_paths: &'a [String],
    skin_table: &'a [Vec<i16>],
    /// Directory part of the model's own name, used as a lookup prefix.
    model_dir: String,
}

impl<'a, C: AssetCatalog> MaterialResolver<'a, C> {
    pub fn new(
        catalog: &'a C,
        texture_names: &'a [String],
        search_paths: &'a [String],
        skin_table: &'a [Vec<i16>],
        model_name: &str,
    ) -> Self {
        let normalized = normalize(model_name);
        let model_dir = match normalized.rfind('/') {
            Some(slash) => normalized[..=slash].to_string(),
            None => String::new(),
        };
        Self { catalog, texture_names, search_paths, skin_table, model_dir }
    }

    /// Resolves one mesh's material reference to decoded images.
    pub fn resolve(&self, material_reference: i32) -> ResolvedMaterial {
        let Ok(reference) = usize::try_from(material_reference) else {
            log::warn!("negative material reference {material_reference}, using defaults");
            return self.defaults(format!("#{material_reference}"), None);
        };
        let index = self.apply_skin(reference);
        let Some(name) = self.texture_names.get(index) else {
            log::warn!(
                "material reference {material_reference} (skin-remapped {index}) \
                 outside texture table of {}, using defaults",
                self.texture_names.len()
            );
            return self.defaults(format!("#{index}"), None);
        };

        let Some(script) = self.find_script(name) else {
            log::warn!("no material script found for {name}, using defaults");
            return self.defaults(name.clone(), None);
        };

        let base = match script.get("$basetexture") {
            Some(texture) => self.decode_texture(texture, FLAT_WHITE),
            None => flat(FLAT_WHITE),
        };
        let normal = match script.get("$bumpmap") {
            Some(texture) => self.decode_texture(texture, FLAT_MID_GRAY),
            None => flat(FLAT_MID_GRAY),
        };
        let light_warp = script
            .get("$lightwarptexture")
            .map(|t| self.decode_texture(t, FLAT_MID_GRAY));
        let specular_warp = script
            .get("$phongwarptexture")
            .map(|t| self.decode_texture(t, FLAT_WHITE));
        let specular_exponent = script
            .get("$phongexponenttexture")
            .map(|t| self.decode_texture(t, FLAT_WHITE));

        ResolvedMaterial {
            name: name.clone(),
            shader: script.shader.clone(),
            base,
            normal,
            light_warp,
            specular_warp,
            specular_exponent,
            script: Some(script),
        }
    }

    /// Skin family row 0 remaps the reference when the table is present
    /// and covers it; anything else passes through.
    fn apply_skin(&self, reference: usize) -> usize {
        match self.skin_table.first() {
            Some(row) if reference < row.len() => row[reference].max(0) as usize,
            _ => reference,
        }
    }

    /// Lookup names to try, in order: as given, under the model's own
    /// directory, under each declared search path.
    fn candidates(&self, name: &str) -> Vec<String> {
        let name = normalize(name);
        let mut out = Vec::with_capacity(2 + self.search_paths.len());
        out.push(name.clone());
        if !self.model_dir.is_empty() {
            out.push(format!("{}{name}", self.model_dir));
        }
        for path in self.search_paths {
            let mut prefixed = normalize(path);
            if !prefixed.is_empty() && !prefixed.ends_with('/') {
                prefixed.push('/');
            }
            prefixed.push_str(&name);
            out.push(prefixed);
        }
        out
    }

    fn find_script(&self, name: &str) -> Option<MaterialScript> {
        for candidate in self.candidates(name) {
            if let Some(bytes) = self.catalog.find_material_script(&candidate) {
                log::debug!("material {name}: script found at {candidate}");
                return Some(MaterialScript::from_bytes(&bytes));
            }
        }
        None
    }

    fn decode_texture(&self, name: &str, default: [u8; 4]) -> RgbaImage {
        for candidate in self.candidates(name) {
            let Some(bytes) = self.catalog.find_texture(&candidate) else { continue };
            match VtfFile::parse(&bytes).and_then(|vtf| vtf.decode()) {
                Ok(image) => return image,
                Err(e) => {
                    log::warn!("texture {candidate}: {e}, using default");
                    return flat(default);
                }
            }
        }
        log::warn!("texture {name} not found, using default");
        flat(default)
    }

    fn defaults(&self, name: String, script: Option<MaterialScript>) -> ResolvedMaterial {
        ResolvedMaterial {
            name,
            shader: script.as_ref().map(|s| s.shader.clone()).unwrap_or_default(),
            base: flat(FLAT_WHITE),
            normal: flat(FLAT_MID_GRAY),
            light_warp: None,
            specular_warp: None,
            specular_exponent: None,
            script,
        }
    }
}

fn normalize(name: &str) -> String {
    name.replace('\\', "/").to_lowercase()
}
