//! Surface backends: a growable 2D atlas or a fixed-size texture array.
//!
//! The backend is chosen once from [`SurfaceCapabilities`] before any texture
//! loads; callers only ever see tile placements and coordinates.

mod atlas;
mod layers;

use std::fmt;

use glam::Vec2;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tessera_config::AtlasConfig;

use crate::error::AllocError;
use crate::index::TilePlacement;
use crate::surface::SurfaceImage;
use crate::uv::{TexCoord, resolve_placement};

pub use atlas::AtlasBackend;
pub use layers::LayerBackend;

/// Which backend is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Single growable 2D surface.
    Atlas,
    /// One texture-array layer per texture.
    TextureArray,
}

/// What the host renderer can sample from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    /// 2D texture arrays are supported.
    pub texture_arrays: bool,
    /// Maximum layers in one array texture.
    pub max_array_layers: u32,
}

impl SurfaceCapabilities {
    /// A host with no array-texture support.
    pub fn atlas_only() -> Self {
        Self {
            texture_arrays: false,
            max_array_layers: 1,
        }
    }

    /// A host supporting arrays of up to `max_array_layers` layers.
    pub fn with_texture_arrays(max_array_layers: u32) -> Self {
        Self {
            texture_arrays: true,
            max_array_layers,
        }
    }

    /// Whether the array backend may be used under `config`.
    pub fn supports_layers(&self, config: &AtlasConfig) -> bool {
        config.prefer_texture_array
            && self.texture_arrays
            && self.max_array_layers >= config.min_array_layers
    }
}

/// Result of placing a raster on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Insertion {
    /// Where the tile went.
    pub placement: TilePlacement,
    /// The surface dimensions changed to make room.
    pub resized: bool,
}

/// Storage for packed textures.
pub trait SurfaceBackend: Send + fmt::Debug {
    /// Which implementation this is.
    fn kind(&self) -> BackendKind;

    /// Places a decoded raster. Existing placements never change.
    fn insert(&mut self, raster: &RgbaImage) -> Result<Insertion, AllocError>;

    /// Surface size in texels (layer size for arrays).
    fn dimensions(&self) -> (u32, u32);

    /// Number of tiles placed.
    fn tile_count(&self) -> usize;

    /// Share of capacity in use, in `[0, 1]`.
    fn utilization(&self) -> f32;

    /// Immutable handle to the current pixels.
    fn image(&self) -> SurfaceImage;

    /// Sampling coordinate for `offset` inside a placed tile.
    fn resolve(&self, placement: &TilePlacement, offset: Vec2) -> TexCoord {
        resolve_placement(placement, self.dimensions(), offset)
    }
}

/// Builds the backend the capabilities and config call for.
pub fn select_backend(
    capabilities: SurfaceCapabilities,
    config: &AtlasConfig,
) -> Box<dyn SurfaceBackend> {
    if capabilities.supports_layers(config) {
        let max_layers = config.max_layers.min(capabilities.max_array_layers);
        tracing::info!(
            layer_size = config.layer_size,
            max_layers,
            "using texture array surface"
        );
        Box::new(LayerBackend::new(config.layer_size, max_layers))
    } else {
        tracing::info!(
            initial_size = config.initial_size,
            max_size = config.max_size,
            "using atlas surface"
        );
        Box::new(AtlasBackend::new(
            config.initial_size,
            config.max_size,
            config.padding,
        ))
    }
}
