//! Immutable surface snapshots and the channel that publishes them.
//!
//! Renderers never touch the live surface. Each publish swaps in a new
//! [`SurfaceSnapshot`] on a [`watch`] channel; the previous snapshot stays
//! valid for as long as someone holds it.

use std::path::Path;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tokio::sync::watch;

use crate::uv::{TexCoord, texel_at};

/// Pixels of a surface at one point in time.
#[derive(Clone, Debug)]
pub enum SurfaceImage {
    /// Nothing published yet.
    Empty,
    /// A single 2D atlas.
    Atlas(Arc<RgbaImage>),
    /// Texture-array layers, all `layer_size` square.
    Layers {
        /// Side length of every layer.
        layer_size: u32,
        /// Layer pixels in layer-index order.
        layers: Vec<Arc<RgbaImage>>,
    },
}

/// A published surface with a monotonically increasing generation.
#[derive(Clone, Debug)]
pub struct SurfaceSnapshot {
    /// Incremented on every publish.
    pub generation: u64,
    /// The pixels.
    pub image: SurfaceImage,
}

impl SurfaceSnapshot {
    /// The initial, empty snapshot.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            image: SurfaceImage::Empty,
        }
    }

    /// `(width, height, layers)` of the snapshot.
    pub fn extent(&self) -> (u32, u32, u32) {
        match &self.image {
            SurfaceImage::Empty => (0, 0, 0),
            SurfaceImage::Atlas(img) => (img.width(), img.height(), 1),
            SurfaceImage::Layers { layer_size, layers } => {
                (*layer_size, *layer_size, layers.len() as u32)
            }
        }
    }

    /// The texel a coordinate samples with nearest filtering.
    pub fn pixel_at(&self, coord: TexCoord) -> Option<Rgba<u8>> {
        let img = match (&self.image, coord.layer) {
            (SurfaceImage::Atlas(img), None) => img,
            (SurfaceImage::Layers { layers, .. }, Some(layer)) => layers.get(layer as usize)?,
            _ => return None,
        };
        let (x, y) = texel_at(coord, img.dimensions());
        Some(*img.get_pixel(x, y))
    }

    /// Writes the surface as PNG: `<stem>.png` for an atlas, `<stem>_<n>.png`
    /// per layer. Returns the written paths.
    pub fn save_png(&self, dir: &Path, stem: &str) -> Result<Vec<std::path::PathBuf>, image::ImageError> {
        let mut written = Vec::new();
        match &self.image {
            SurfaceImage::Empty => {}
            SurfaceImage::Atlas(img) => {
                let path = dir.join(format!("{stem}.png"));
                img.save(&path)?;
                written.push(path);
            }
            SurfaceImage::Layers { layers, .. } => {
                for (i, layer) in layers.iter().enumerate() {
                    let path = dir.join(format!("{stem}_{i}.png"));
                    layer.save(&path)?;
                    written.push(path);
                }
            }
        }
        Ok(written)
    }
}

/// Latest-value channel of surface snapshots.
///
/// Any number of renderers can subscribe; each sees only the newest snapshot,
/// so a burst of uploads collapses into one rebind.
pub struct SurfaceWatch {
    tx: watch::Sender<SurfaceSnapshot>,
    rx: watch::Receiver<SurfaceSnapshot>,
}

impl Default for SurfaceWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceWatch {
    /// Creates a watch holding the empty snapshot.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(SurfaceSnapshot::empty());
        Self { tx, rx }
    }

    /// Publishes a new image, bumping the generation. Returns the generation.
    pub fn publish(&self, image: SurfaceImage) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|snapshot| {
            generation = snapshot.generation + 1;
            *snapshot = SurfaceSnapshot { generation, image };
        });
        generation
    }

    /// A new subscriber.
    pub fn subscribe(&self) -> watch::Receiver<SurfaceSnapshot> {
        self.rx.clone()
    }

    /// The latest snapshot.
    pub fn current(&self) -> SurfaceSnapshot {
        self.rx.borrow().clone()
    }
}
