//! Tile records and the many-to-one alias index over them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::allocator::PackedRect;
use crate::key::TextureKey;

/// Identity of a packed tile. Keys that alias the same tile share an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u64);

/// Where a tile lives on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TilePlacement {
    /// A rectangle of the 2D atlas, padding included.
    Atlas {
        /// Padded rectangle in surface texels.
        rect: PackedRect,
        /// Border width inside `rect`.
        padding: u32,
    },
    /// A full layer of a texture array.
    Layer {
        /// Array layer index.
        layer: u32,
        /// Side length of every layer.
        texture_size: u32,
    },
}

impl TilePlacement {
    /// The interior (unpadded) rectangle for atlas tiles.
    pub fn interior(&self) -> Option<PackedRect> {
        match *self {
            TilePlacement::Atlas { rect, padding } => Some(PackedRect {
                x: rect.x + padding,
                y: rect.y + padding,
                width: rect.width - 2 * padding,
                height: rect.height - 2 * padding,
            }),
            TilePlacement::Layer { .. } => None,
        }
    }

    /// Whether this tile is a texture-array layer.
    pub fn is_texture_array(&self) -> bool {
        matches!(self, TilePlacement::Layer { .. })
    }
}

/// Immutable metadata for one packed texture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Tile identity.
    pub id: TileId,
    /// Surface location.
    pub placement: TilePlacement,
    /// Whether any source texel is less than fully opaque.
    pub is_transparent: bool,
    /// Canonical key that produced the tile.
    pub source_key: String,
}

/// Maps canonical keys to shared tile records.
///
/// Entries are only replaced through [`MetadataIndex::reregister`] and only
/// removed wholesale or per block; there is no eviction.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    entries: HashMap<String, Arc<TileRecord>>,
}

impl MetadataIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `record` under every key in `keys` that is not already bound.
    ///
    /// Returns how many keys were newly bound.
    pub fn register(&mut self, keys: &[String], record: &Arc<TileRecord>) -> usize {
        let mut added = 0;
        for key in keys {
            if !self.entries.contains_key(key) {
                self.entries.insert(key.clone(), Arc::clone(record));
                added += 1;
            }
        }
        added
    }

    /// Binds every key in `keys` to `record`, replacing existing bindings.
    pub fn reregister(&mut self, keys: &[String], record: &Arc<TileRecord>) {
        for key in keys {
            self.entries.insert(key.clone(), Arc::clone(record));
        }
    }

    /// Record bound to exactly this canonical key.
    pub fn get(&self, canonical: &str) -> Option<&Arc<TileRecord>> {
        self.entries.get(canonical)
    }

    /// Whether the canonical key is bound.
    pub fn contains(&self, canonical: &str) -> bool {
        self.entries.contains_key(canonical)
    }

    /// Walks the key's lookup chain and returns the first bound record, with
    /// the canonical key that matched.
    pub fn resolve(&self, key: &TextureKey) -> Option<(String, &Arc<TileRecord>)> {
        key.lookup_chain()
            .into_iter()
            .find_map(|k| self.entries.get(&k).map(|r| (k, r)))
    }

    /// Unbinds a single key. Returns the record it pointed at.
    pub fn remove(&mut self, canonical: &str) -> Option<Arc<TileRecord>> {
        self.entries.remove(canonical)
    }

    /// Unbinds every key in `keys`. Returns how many were bound.
    pub fn remove_all(&mut self, keys: &[String]) -> usize {
        keys.iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count()
    }

    /// Number of bound keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of distinct records.
    pub fn record_count(&self) -> usize {
        self.entries
            .values()
            .map(|r| r.id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Every `(key, record)` binding.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<TileRecord>)> {
        self.entries.iter()
    }
}
