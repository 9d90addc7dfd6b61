//! Append-only first-fit rectangle allocator for a growable atlas surface.
//!
//! Candidate origins are visited row-major. Only `y = 0` and the bottom edges
//! of placed rectangles can be the topmost free row, and within a row only
//! `x = 0` and right edges can be the leftmost free column, so scanning those
//! candidates finds the same origin a texel-by-texel scan would. When nothing
//! fits, the shorter dimension doubles (width first when square) and the scan
//! restarts; placed rectangles never move.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::AllocError;

/// An axis-aligned rectangle in surface texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackedRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width including padding.
    pub width: u32,
    /// Height including padding.
    pub height: u32,
}

impl PackedRect {
    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether the two rectangles share any texel.
    pub fn overlaps(&self, other: &PackedRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Result of a successful allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Where the tile was placed.
    pub rect: PackedRect,
    /// Surface size before the call, if the surface grew to make room.
    pub grew_from: Option<(u32, u32)>,
}

/// First-fit packer over a surface that only ever grows.
#[derive(Debug, Clone)]
pub struct SpaceAllocator {
    width: u32,
    height: u32,
    max_size: u32,
    placed: Vec<PackedRect>,
    /// Row origin -> smallest sizes already known not to fit there.
    /// Space only shrinks between growth events, so a larger request can skip
    /// the row without scanning it.
    exhausted: HashMap<u32, Vec<(u32, u32)>>,
}

impl SpaceAllocator {
    /// Creates an empty `initial_size x initial_size` surface that may grow to
    /// `max_size` along either axis.
    pub fn new(initial_size: u32, max_size: u32) -> Self {
        Self {
            width: initial_size.max(1),
            height: initial_size.max(1),
            max_size: max_size.max(initial_size),
            placed: Vec::new(),
            exhausted: HashMap::new(),
        }
    }

    /// Current surface dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Every rectangle placed so far, in placement order.
    pub fn placed(&self) -> &[PackedRect] {
        &self.placed
    }

    /// Fraction of the surface covered by placed rectangles.
    pub fn utilization(&self) -> f32 {
        let used: u64 = self
            .placed
            .iter()
            .map(|r| r.width as u64 * r.height as u64)
            .sum();
        used as f32 / (self.width as u64 * self.height as u64) as f32
    }

    /// Places a `width x height` rectangle, growing the surface if needed.
    pub fn allocate(&mut self, width: u32, height: u32) -> Result<Allocation, AllocError> {
        let out_of_space = AllocError::OutOfSpace {
            width,
            height,
            max_size: self.max_size,
        };
        if width == 0 || height == 0 || width > self.max_size || height > self.max_size {
            return Err(out_of_space);
        }

        let original = (self.width, self.height);
        loop {
            if let Some(rect) = self.find_free(width, height) {
                self.placed.push(rect);
                let grew_from = (original != (self.width, self.height)).then_some(original);
                return Ok(Allocation { rect, grew_from });
            }
            if !self.grow() {
                // Nothing was placed, so the surface keeps its size.
                (self.width, self.height) = original;
                return Err(out_of_space);
            }
        }
    }

    fn find_free(&mut self, width: u32, height: u32) -> Option<PackedRect> {
        if width > self.width || height > self.height {
            return None;
        }

        let rows: BTreeSet<u32> = std::iter::once(0)
            .chain(self.placed.iter().map(PackedRect::bottom))
            .filter(|&y| y + height <= self.height)
            .collect();

        for y in rows {
            if self.row_known_full(y, width, height) {
                continue;
            }
            match self.scan_row(y, width, height) {
                Some(x) => {
                    return Some(PackedRect {
                        x,
                        y,
                        width,
                        height,
                    });
                }
                None => self.mark_row_full(y, width, height),
            }
        }
        None
    }

    /// Leftmost free `x` in the band `[y, y + height)`.
    fn scan_row(&self, y: u32, width: u32, height: u32) -> Option<u32> {
        let band_bottom = y + height;
        let mut band: Vec<&PackedRect> = self
            .placed
            .iter()
            .filter(|r| r.y < band_bottom && y < r.bottom())
            .collect();
        band.sort_unstable_by_key(|r| r.x);

        let mut x = 0;
        for r in band {
            if x + width > self.width {
                return None;
            }
            if r.x >= x + width {
                return Some(x);
            }
            x = x.max(r.right());
        }
        (x + width <= self.width).then_some(x)
    }

    fn row_known_full(&self, y: u32, width: u32, height: u32) -> bool {
        self.exhausted
            .get(&y)
            .is_some_and(|sizes| sizes.iter().any(|&(w, h)| w <= width && h <= height))
    }

    fn mark_row_full(&mut self, y: u32, width: u32, height: u32) {
        let sizes = self.exhausted.entry(y).or_default();
        sizes.retain(|&(w, h)| !(width <= w && height <= h));
        sizes.push((width, height));
    }

    /// Doubles the shorter dimension (width when square). Returns false at the cap.
    fn grow(&mut self) -> bool {
        let grow_width = self.width <= self.height;
        let (primary, secondary) = if grow_width {
            (&mut self.width, &mut self.height)
        } else {
            (&mut self.height, &mut self.width)
        };

        if *primary < self.max_size {
            *primary = primary.saturating_mul(2).min(self.max_size);
        } else if *secondary < self.max_size {
            *secondary = secondary.saturating_mul(2).min(self.max_size);
        } else {
            return false;
        }
        self.exhausted.clear();
        true
    }
}
