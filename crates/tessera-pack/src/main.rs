//! Texture packer: runs a directory of block textures through the atlas and
//! writes the packed surface plus a RON manifest of coordinates.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p tessera-pack -- --assets assets --output out`.

mod manifest;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tessera_atlas::{DefaultDecoder, LoadError, SurfaceCapabilities, TextureContext};
use tessera_config::{CliArgs, Config, ConfigError};
use tracing::info;

use crate::manifest::PackManifest;

/// Base name of the written surface images.
const IMAGE_STEM: &str = "atlas";

/// Extensions picked up from the asset directory.
const TEXTURE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Errors that abort a packing run.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Configuration could not be resolved or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem access failed.
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The texture context could not start.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Writing the surface images failed.
    #[error("failed to write surface image: {0}")]
    Image(#[from] image::ImageError),

    /// The manifest could not be serialized.
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] ron::Error),

    /// The manifest could not be parsed.
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Texture keys under `root`, relative with `/` separators, sorted.
fn collect_textures(root: &Path) -> Result<Vec<String>, PackError> {
    fn walk(root: &Path, dir: &Path, keys: &mut Vec<String>) -> Result<(), PackError> {
        let entries = std::fs::read_dir(dir).map_err(|source| PackError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, keys)?;
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| TEXTURE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            {
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let key: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect();
                keys.push(key.join("/"));
            }
        }
        Ok(())
    }

    let mut keys = Vec::new();
    walk(root, root, &mut keys)?;
    keys.sort();
    Ok(keys)
}

/// Packs every texture under the configured asset root into `output`.
async fn pack(
    config: Config,
    capabilities: SurfaceCapabilities,
    output: &Path,
) -> Result<PackManifest, PackError> {
    let keys = collect_textures(&config.loader.asset_root)?;
    info!(
        count = keys.len(),
        root = %config.loader.asset_root.display(),
        "Found textures"
    );

    let error_texture = config.loader.error_texture.clone();
    let decoder = Arc::new(DefaultDecoder::new(&config.loader));
    let ctx = TextureContext::new(config, decoder, capabilities);
    ctx.initialize().await?;

    for key in &keys {
        ctx.queue_texture_for_loading(key);
    }
    ctx.wait_idle().await;
    ctx.rebuild_atlas();

    std::fs::create_dir_all(output).map_err(|source| PackError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    let snapshot = ctx.snapshot();
    let images = snapshot.save_png(output, IMAGE_STEM)?;
    let manifest = PackManifest::build(&ctx, &snapshot, &images, &error_texture);
    let path = manifest.write(output)?;

    let stats = ctx.stats();
    info!(
        tiles = stats.tiles,
        keys = stats.keys,
        missing = manifest.missing.len(),
        dimensions = ?stats.dimensions,
        utilization = stats.utilization,
        manifest = %path.display(),
        "Packed textures"
    );
    for key in &manifest.missing {
        tracing::warn!(key = %key, "texture missing from pack");
    }
    Ok(manifest)
}

fn run(args: CliArgs) -> Result<(), PackError> {
    // Resolve config directory
    let config_dir = match args.config.clone() {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    config.validate()?;

    let log_dir = config_dir.join("logs");
    tessera_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let capabilities = if config.atlas.prefer_texture_array {
        tessera_render::probe_default_adapter().unwrap_or_else(|| {
            info!("No GPU adapter found, packing into a 2D atlas");
            SurfaceCapabilities::atlas_only()
        })
    } else {
        SurfaceCapabilities::atlas_only()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| PackError::Io {
            path: PathBuf::from("<tokio runtime>"),
            source,
        })?;
    runtime.block_on(pack(config, capabilities, &args.output))?;
    Ok(())
}

fn main() -> ExitCode {
    match run(CliArgs::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Packing failed");
            eprintln!("tessera-pack: {err}");
            ExitCode::FAILURE
        }
    }
}
