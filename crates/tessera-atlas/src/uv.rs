//! Normalized sampling coordinates and their memo cache.

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::index::TilePlacement;

/// A resolved sampling coordinate.
///
/// `layer` is set for texture-array tiles and consumed by an array sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TexCoord {
    /// Horizontal coordinate in `[0, 1]`.
    pub u: f32,
    /// Vertical coordinate in `[0, 1]`, origin at the bottom.
    pub v: f32,
    /// Array layer, for texture-array tiles.
    pub layer: Option<u32>,
}

impl TexCoord {
    /// `(u, v)` as a vector.
    pub fn uv(&self) -> Vec2 {
        Vec2::new(self.u, self.v)
    }
}

/// Maps `offset` in `[0, 1]^2` into the tile interior.
///
/// Offset `(0, 0)` is the interior's bottom-left corner and `(1, 1)` its
/// top-right, with `v` measured upward from the bottom of the surface.
pub fn resolve_placement(placement: &TilePlacement, surface: (u32, u32), offset: Vec2) -> TexCoord {
    match placement.interior() {
        Some(interior) => {
            let (sw, sh) = (surface.0 as f32, surface.1 as f32);
            let px = interior.x as f32 + offset.x * interior.width as f32;
            let py = interior.y as f32 + (1.0 - offset.y) * interior.height as f32;
            TexCoord {
                u: px / sw,
                v: 1.0 - py / sh,
                layer: None,
            }
        }
        None => {
            let layer = match *placement {
                TilePlacement::Layer { layer, .. } => Some(layer),
                TilePlacement::Atlas { .. } => None,
            };
            TexCoord {
                u: offset.x,
                v: offset.y,
                layer,
            }
        }
    }
}

/// Inverse of [`resolve_placement`] for atlas surfaces: the texel under `coord`.
pub fn texel_at(coord: TexCoord, surface: (u32, u32)) -> (u32, u32) {
    let x = (coord.u * surface.0 as f32).floor() as u32;
    let y = ((1.0 - coord.v) * surface.1 as f32).floor() as u32;
    (x.min(surface.0 - 1), y.min(surface.1 - 1))
}

/// Memoized `(canonical key, offset) -> coordinate` results.
///
/// Purely derived data: it is dropped wholesale whenever surface dimensions
/// or bindings change and never trimmed per entry.
#[derive(Debug, Default)]
pub struct UvCache {
    entries: HashMap<(String, [u32; 2]), TexCoord>,
    hits: u64,
    misses: u64,
}

impl UvCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(key: &str, offset: Vec2) -> (String, [u32; 2]) {
        (key.to_string(), [offset.x.to_bits(), offset.y.to_bits()])
    }

    /// Cached coordinate, counting hits and misses.
    pub fn get(&mut self, key: &str, offset: Vec2) -> Option<TexCoord> {
        let found = self.entries.get(&Self::slot(key, offset)).copied();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Stores a coordinate.
    pub fn insert(&mut self, key: &str, offset: Vec2, coord: TexCoord) {
        self.entries.insert(Self::slot(key, offset), coord);
    }

    /// Drops every entry.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    /// Number of cached coordinates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn counters(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
