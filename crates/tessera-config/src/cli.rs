//! Command-line argument parsing for the texture packer.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Texture packer command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "tessera-pack", about = "Pack block face textures into an atlas")]
pub struct CliArgs {
    /// Directory containing block textures (overrides `loader.asset_root`).
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Directory that receives the packed surface and manifest.
    #[arg(long, default_value = "out")]
    pub output: PathBuf,

    /// Initial atlas side length.
    #[arg(long)]
    pub initial_size: Option<u32>,

    /// Tile padding in texels.
    #[arg(long)]
    pub padding: Option<u32>,

    /// Pack into texture-array layers instead of a single atlas.
    #[arg(long)]
    pub texture_array: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref root) = args.assets {
            self.loader.asset_root = root.clone();
        }
        if let Some(size) = args.initial_size {
            self.atlas.initial_size = size;
        }
        if let Some(padding) = args.padding {
            self.atlas.padding = padding;
        }
        if let Some(array) = args.texture_array {
            self.atlas.prefer_texture_array = array;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
