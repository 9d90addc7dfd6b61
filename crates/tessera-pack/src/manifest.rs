//! RON manifest describing where every packed key landed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tessera_atlas::{BackendKind, SurfaceSnapshot, TextureContext, resolve_placement};

use crate::PackError;

/// File name of the manifest inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.ron";

/// One bound key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Tile id; aliases of one texture share it.
    pub tile: u64,
    /// Coordinate of offset `(0, 0)`.
    pub uv_min: [f32; 2],
    /// Coordinate of offset `(1, 1)`.
    pub uv_max: [f32; 2],
    /// Array layer for texture-array surfaces.
    pub layer: Option<u32>,
    /// Any texel is translucent.
    pub transparent: bool,
    /// The key fell back to the error placeholder.
    pub placeholder: bool,
}

/// Everything a consumer needs to sample the packed surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackManifest {
    /// Backend that produced the surface.
    pub backend: BackendKind,
    /// Surface size (layer size for arrays).
    pub dimensions: (u32, u32),
    /// Layer count (1 for an atlas).
    pub layers: u32,
    /// Snapshot generation the images were written from.
    pub generation: u64,
    /// Written image files, relative to the manifest.
    pub images: Vec<String>,
    /// Bound keys, sorted.
    pub textures: BTreeMap<String, ManifestEntry>,
    /// Keys that failed to load.
    pub missing: Vec<String>,
}

impl PackManifest {
    /// Builds the manifest from the context's bindings and a published snapshot.
    pub fn build(
        ctx: &TextureContext,
        snapshot: &SurfaceSnapshot,
        images: &[PathBuf],
        error_texture: &str,
    ) -> Self {
        let (width, height, layers) = snapshot.extent();
        let placeholder = ctx.get_texture_metadata(error_texture).map(|r| r.id);

        let textures = ctx
            .entries()
            .into_iter()
            .map(|(key, record)| {
                let lo = resolve_placement(&record.placement, (width, height), Vec2::ZERO);
                let hi = resolve_placement(&record.placement, (width, height), Vec2::ONE);
                let entry = ManifestEntry {
                    tile: record.id.0,
                    uv_min: [lo.u, lo.v],
                    uv_max: [hi.u, hi.v],
                    layer: lo.layer,
                    transparent: record.is_transparent,
                    placeholder: Some(record.id) == placeholder && key != record.source_key,
                };
                (key, entry)
            })
            .collect();

        let images = images
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();

        Self {
            backend: ctx.stats().backend,
            dimensions: (width, height),
            layers,
            generation: snapshot.generation,
            images,
            textures,
            missing: ctx.missing_textures(),
        }
    }

    /// Writes `manifest.ron` into `dir`. Returns its path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, PackError> {
        let path = dir.join(MANIFEST_FILE);
        let contents = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(&path, contents).map_err(|source| PackError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Reads a manifest written by [`write`](Self::write).
    pub fn read(path: &Path) -> Result<Self, PackError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(ron::from_str(&contents)?)
    }
}
