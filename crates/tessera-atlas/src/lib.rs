//! Block texture atlas: packs irregularly arriving textures into one shared
//! surface (a growable 2D atlas or a texture array) and resolves logical
//! texture keys to sampling coordinates.

mod allocator;
mod backend;
mod context;
mod decoder;
mod error;
mod index;
mod key;
mod raster;
mod surface;
mod uv;

pub use allocator::{Allocation, PackedRect, SpaceAllocator};
pub use backend::{
    AtlasBackend, BackendKind, Insertion, LayerBackend, SurfaceBackend, SurfaceCapabilities,
    select_backend,
};
pub use context::{ApplyOptions, AtlasStats, BUILTIN_ERROR_TEXTURE, CustomTexture, TextureContext};
pub use decoder::{DefaultDecoder, ImageDecoder, TextureSource, decode_bytes};
pub use error::{AllocError, DecodeError, LoadError};
pub use index::{MetadataIndex, TileId, TilePlacement, TileRecord};
pub use key::{BlockFace, BlockRemap, TextureKey, data_uri_hash, decode_data_uri};
pub use raster::{DEFAULT_PADDING, PaddedTile, error_checkerboard, extend_edges, has_transparency};
pub use surface::{SurfaceImage, SurfaceSnapshot, SurfaceWatch};
pub use uv::{TexCoord, UvCache, resolve_placement, texel_at};
