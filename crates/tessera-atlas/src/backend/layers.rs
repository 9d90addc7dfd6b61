use std::sync::Arc;

use image::RgbaImage;

use super::{BackendKind, Insertion, SurfaceBackend};
use crate::error::AllocError;
use crate::index::TilePlacement;
use crate::raster::fit_to_layer;
use crate::surface::SurfaceImage;

/// One texture per array layer, every layer `layer_size` square.
///
/// Layers are not padded: each covers the full `[0, 1]^2` range and a
/// clamp-to-edge sampler keeps neighbours apart.
#[derive(Debug)]
pub struct LayerBackend {
    layer_size: u32,
    max_layers: u32,
    layers: Vec<Arc<RgbaImage>>,
}

impl LayerBackend {
    /// Creates an empty array of at most `max_layers` layers.
    pub fn new(layer_size: u32, max_layers: u32) -> Self {
        Self {
            layer_size,
            max_layers,
            layers: Vec::new(),
        }
    }
}

impl SurfaceBackend for LayerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TextureArray
    }

    fn insert(&mut self, raster: &RgbaImage) -> Result<Insertion, AllocError> {
        let index = self.layers.len() as u32;
        if index >= self.max_layers {
            return Err(AllocError::LayersExhausted {
                max_layers: self.max_layers,
            });
        }
        self.layers
            .push(Arc::new(fit_to_layer(raster, self.layer_size)));
        Ok(Insertion {
            placement: TilePlacement::Layer {
                layer: index,
                texture_size: self.layer_size,
            },
            resized: false,
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.layer_size, self.layer_size)
    }

    fn tile_count(&self) -> usize {
        self.layers.len()
    }

    fn utilization(&self) -> f32 {
        self.layers.len() as f32 / self.max_layers as f32
    }

    fn image(&self) -> SurfaceImage {
        SurfaceImage::Layers {
            layer_size: self.layer_size,
            layers: self.layers.clone(),
        }
    }
}
