use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use image::ImageFormat;
use studiolib::{format::vtf::VtfFile, util::file::map_file};

#[derive(FromArgs, PartialEq, Debug)]
/// process texture container files
#[argh(subcommand, name = "vtf")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Info(InfoArgs),
    Convert(ConvertArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// prints texture container info
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    #[argh(positional)]
    /// input texture
    input: PathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// converts a texture to PNG
#[argh(subcommand, name = "convert")]
pub struct ConvertArgs {
    #[argh(positional)]
    /// input texture
    input: PathBuf,
    #[argh(option, short = 'o')]
    /// output path (default: input with .png extension)
    output: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Info(c_args) => info(c_args),
        SubCommand::Convert(c_args) => convert(c_args),
    }
}

fn info(args: InfoArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    let vtf = VtfFile::parse(&data)?;

    log::info!("Texture info:");
    log::info!("  Size: {}x{}", vtf.width(), vtf.height());
    match vtf.format() {
        Ok(format) => log::info!("  Format: {format:?}"),
        Err(_) => log::info!("  Format: unsupported ({})", vtf.header.high_res_format),
    }
    log::info!("  Mip count: {}", vtf.header.mip_count);
    log::info!("  Frames: {}", vtf.header.frames);
    Ok(())
}

fn convert(args: ConvertArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    let image = VtfFile::parse(&data)?.decode()?;

    let path = args.output.unwrap_or_else(|| args.input.with_extension("png"));
    log::info!("Writing {}", path.display());
    image
        .save_with_format(&path, ImageFormat::Png)
        .with_context(|| format!("Failed to write output file '{}'", path.display()))?;
    Ok(())
}
