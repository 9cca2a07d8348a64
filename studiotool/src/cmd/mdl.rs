use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use argh::FromArgs;
use serde_json::json;
use studiolib::{
    assemble::assemble,
    format::{mdl::MdlFile, peek_four_cc},
    material::AssetCatalog,
    util::file::map_file,
};

#[derive(FromArgs, PartialEq, Debug)]
/// process model files
#[argh(subcommand, name = "mdl")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Info(InfoArgs),
    Assemble(AssembleArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// prints model header info
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    #[argh(positional)]
    /// input model
    input: PathBuf,
    #[argh(switch, short = 'j')]
    /// print as JSON
    json: bool,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// decodes a full asset (model + vertex pool + strip index)
#[argh(subcommand, name = "assemble")]
pub struct AssembleArgs {
    #[argh(positional)]
    /// input model; the vertex pool and strip index are looked up next to
    /// it by extension
    input: PathBuf,
    #[argh(option, short = 'r')]
    /// content root for material/texture lookups (default: the model's
    /// directory)
    root: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Info(c_args) => info(c_args),
        SubCommand::Assemble(c_args) => run_assemble(c_args),
    }
}

fn info(args: InfoArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    if let Some(tag) = peek_four_cc(&data) {
        log::debug!("File tag: {tag}");
    }
    let mdl = MdlFile::parse(&data)?;
    let skeleton = mdl.read_skeleton()?;
    let body_parts = mdl.read_body_parts()?;
    let textures = mdl.read_texture_names()?;
    let search_paths = mdl.read_search_paths()?;

    if args.json {
        let value = json!({
            "name": mdl.name(),
            "checksum": mdl.header.checksum,
            "bones": skeleton.bones.iter().map(|b| &b.name).collect::<Vec<_>>(),
            "body_parts": body_parts.iter().map(|bp| json!({
                "name": bp.name,
                "base": bp.base,
                "models": bp.models.iter().map(|m| json!({
                    "name": m.name,
                    "vertices": m.vertex_count,
                    "meshes": m.meshes.len(),
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            "textures": textures,
            "search_paths": search_paths,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    log::info!("Model info:");
    log::info!("  Name: {}", mdl.name());
    log::info!("  Checksum: {:#x}", mdl.header.checksum);
    log::info!("  Bones: {}", skeleton.bones.len());
    for body_part in &body_parts {
        log::info!("  Bodypart '{}' (base {}):", body_part.name, body_part.base);
        for model in &body_part.models {
            log::info!(
                "    Model '{}': {} vertices, {} meshes",
                model.name,
                model.vertex_count,
                model.meshes.len()
            );
        }
    }
    log::info!("  Textures: {}", textures.join(", "));
    log::info!("  Search paths: {}", search_paths.join(", "));
    Ok(())
}

/// Filesystem-backed content lookup rooted at one directory. Scripts and
/// textures live under it by logical name plus extension.
struct FsCatalog {
    root: PathBuf,
}

impl AssetCatalog for FsCatalog {
    fn find_material_script(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.root.join(format!("{name}.vmt"))).ok()
    }

    fn find_texture(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.root.join(format!("{name}.vtf"))).ok()
    }
}

fn run_assemble(args: AssembleArgs) -> Result<()> {
    let mdl_data = map_file(&args.input)?;
    let vvd_path = args.input.with_extension("vvd");
    let vvd_data = map_file(&vvd_path)
        .with_context(|| format!("Failed to open vertex pool '{}'", vvd_path.display()))?;
    let vtx_path = args.input.with_extension("vtx");
    let vtx_data = map_file(&vtx_path)
        .with_context(|| format!("Failed to open strip index '{}'", vtx_path.display()))?;

    let root = match args.root {
        Some(root) => root,
        None => args.input.parent().map(PathBuf::from).unwrap_or_default(),
    };
    let catalog = FsCatalog { root };

    let model = assemble(&mdl_data, &vvd_data, &vtx_data, &catalog)?;

    log::info!("Assembled '{}':", model.name);
    log::info!("  Vertices: {}", model.vertex_pool.vertices.len());
    log::info!(
        "  Bones: {}",
        model.skeleton.as_ref().map(|s| s.bones.len()).unwrap_or(0)
    );
    for body_part in &model.body_parts {
        log::info!("  Bodypart '{}':", body_part.name);
        for variant in &body_part.variants {
            let triangles: usize = variant.meshes.iter().map(|m| m.indices.len() / 3).sum();
            let materials: Vec<&str> =
                variant.meshes.iter().map(|m| m.material.name.as_str()).collect();
            log::info!(
                "    Variant '{}': {} meshes, {} triangles, materials [{}]",
                variant.name,
                variant.meshes.len(),
                triangles,
                materials.join(", ")
            );
        }
    }
    if model.degraded {
        log::warn!("Asset decoded with degraded parts");
    }
    Ok(())
}
