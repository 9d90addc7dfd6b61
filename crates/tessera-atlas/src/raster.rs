//! Tile preparation: clamp-to-edge padding, transparency detection, and the
//! generated error placeholder.

use image::{Rgba, RgbaImage};

/// Default border width, in texels, around every atlas tile.
pub const DEFAULT_PADDING: u32 = 2;

/// A decoded raster surrounded by a replicated border.
#[derive(Debug, Clone)]
pub struct PaddedTile {
    /// `(w + 2p) x (h + 2p)` pixels; the interior is the original raster.
    pub image: RgbaImage,
    /// Border width in texels.
    pub padding: u32,
}

/// Surrounds `src` with `padding` texels copied from its nearest edge or corner.
///
/// Border texels are clones of the clamped source texel, never black or
/// transparent, so bilinear or point sampling near a tile edge cannot pick up
/// a neighbouring tile.
pub fn extend_edges(src: &RgbaImage, padding: u32) -> PaddedTile {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return PaddedTile {
            image: src.clone(),
            padding: 0,
        };
    }

    let image = RgbaImage::from_fn(w + 2 * padding, h + 2 * padding, |x, y| {
        let sx = x.saturating_sub(padding).min(w - 1);
        let sy = y.saturating_sub(padding).min(h - 1);
        *src.get_pixel(sx, sy)
    });

    PaddedTile { image, padding }
}

/// True iff any alpha sample is below full opacity.
pub fn has_transparency(img: &RgbaImage) -> bool {
    img.pixels().any(|p| p.0[3] < u8::MAX)
}

/// Scales `src` to a `size x size` layer with nearest-neighbour filtering.
///
/// Block textures are pixel art; smoothing filters would blur them.
pub fn fit_to_layer(src: &RgbaImage, size: u32) -> RgbaImage {
    if src.width() == size && src.height() == size {
        return src.clone();
    }
    image::imageops::resize(src, size, size, image::imageops::FilterType::Nearest)
}

/// Magenta/black checkerboard used when no error texture file is configured.
pub fn error_checkerboard(size: u32) -> RgbaImage {
    let cell = (size / 2).max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba([255, 0, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    })
}
