use std::sync::Arc;

use image::RgbaImage;
use image::imageops;

use super::{BackendKind, Insertion, SurfaceBackend};
use crate::allocator::SpaceAllocator;
use crate::error::AllocError;
use crate::index::TilePlacement;
use crate::raster::extend_edges;
use crate::surface::SurfaceImage;

/// A single RGBA surface packed by [`SpaceAllocator`].
///
/// Pixels live behind an [`Arc`]: snapshots handed to renderers keep the old
/// buffer alive and the next write copies on demand, so a published image is
/// never mutated.
#[derive(Debug)]
pub struct AtlasBackend {
    allocator: SpaceAllocator,
    padding: u32,
    surface: Arc<RgbaImage>,
}

impl AtlasBackend {
    /// Creates an empty `initial_size` square surface.
    pub fn new(initial_size: u32, max_size: u32, padding: u32) -> Self {
        let allocator = SpaceAllocator::new(initial_size, max_size);
        let (w, h) = allocator.dimensions();
        Self {
            allocator,
            padding,
            surface: Arc::new(RgbaImage::new(w, h)),
        }
    }
}

impl SurfaceBackend for AtlasBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Atlas
    }

    fn insert(&mut self, raster: &RgbaImage) -> Result<Insertion, AllocError> {
        let tile = extend_edges(raster, self.padding);
        let (tw, th) = tile.image.dimensions();
        let allocation = self.allocator.allocate(tw, th)?;

        let resized = allocation.grew_from.is_some();
        if resized {
            let (w, h) = self.allocator.dimensions();
            let mut grown = RgbaImage::new(w, h);
            imageops::replace(&mut grown, self.surface.as_ref(), 0, 0);
            self.surface = Arc::new(grown);
            tracing::info!(
                from = ?allocation.grew_from,
                to = ?(w, h),
                "atlas surface grew"
            );
        }

        let rect = allocation.rect;
        imageops::replace(
            Arc::make_mut(&mut self.surface),
            &tile.image,
            rect.x as i64,
            rect.y as i64,
        );

        Ok(Insertion {
            placement: TilePlacement::Atlas {
                rect,
                padding: tile.padding,
            },
            resized,
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        self.allocator.dimensions()
    }

    fn tile_count(&self) -> usize {
        self.allocator.placed().len()
    }

    fn utilization(&self) -> f32 {
        self.allocator.utilization()
    }

    fn image(&self) -> SurfaceImage {
        SurfaceImage::Atlas(Arc::clone(&self.surface))
    }
}
