//! Shadow Atlas Allocation
//!
//! Backend-agnostic tracking of which parts of the shared shadow-map texture
//! are in use. The atlas is a square texture split into square tiles; every
//! shadow source that holds a shadow map owns a rectangle of tiles.
//!
//! # Allocation Strategy
//!
//! Allocation is first-fit over a tile bitmap: candidate top-left corners are
//! scanned column by column (`x` outer, `y` inner) and the first position
//! whose tiles are all free is taken. Worst case is O(tiles²) per request.
//! First-fit fragments under adversarial allocate/free patterns; regions are
//! re-requested every time a source is re-rendered, so fragmentation heals
//! as sources cycle.

use serde::{Deserialize, Serialize};
use umbra_structures::BitSet;

use crate::error::AtlasError;

/// Rectangle in tile coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtlasRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRegion {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Number of tiles covered
    pub fn area(&self) -> u32 {
        self.width.saturating_mul(self.height)
    }

    /// Check if two regions share at least one tile
    pub fn intersects(&self, other: &AtlasRegion) -> bool {
        let (ax, ay) = (u64::from(self.x), u64::from(self.y));
        let (bx, by) = (u64::from(other.x), u64::from(other.y));
        ax < bx + u64::from(other.width)
            && bx < ax + u64::from(self.width)
            && ay < by + u64::from(other.height)
            && by < ay + u64::from(self.height)
    }

    fn to_array(self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Normalized texture-space rectangle `(u, v, du, dv)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionUv {
    pub u: f32,
    pub v: f32,
    pub du: f32,
    pub dv: f32,
}

impl RegionUv {
    pub fn to_array(self) -> [f32; 4] {
        [self.u, self.v, self.du, self.dv]
    }
}

/// Tile-quantized shadow atlas
#[derive(Clone, Debug)]
pub struct TileAtlas {
    size: u32,
    tile_size: u32,
    num_tiles: u32,
    tiles: BitSet,
    used_tiles: u32,
}

impl TileAtlas {
    /// Create an atlas of `size` pixels split into `tile_size` pixel tiles
    ///
    /// Requires `size > 1`, `0 < tile_size < size` and `size % tile_size == 0`.
    /// A tile size of 1 gives per-pixel granularity.
    pub fn new(size: u32, tile_size: u32) -> Result<Self, AtlasError> {
        Self::validate(size, tile_size)?;
        let num_tiles = size / tile_size;
        Ok(Self {
            size,
            tile_size,
            num_tiles,
            tiles: BitSet::new((num_tiles * num_tiles) as usize),
            used_tiles: 0,
        })
    }

    /// Check atlas geometry without allocating
    pub fn validate(size: u32, tile_size: u32) -> Result<(), AtlasError> {
        if size <= 1 || tile_size < 1 || tile_size >= size || size % tile_size != 0 {
            return Err(AtlasError::InvalidGeometry { size, tile_size });
        }
        Ok(())
    }

    #[inline]
    fn tile_index(&self, x: u32, y: u32) -> usize {
        (y * self.num_tiles + x) as usize
    }

    /// Number of tiles needed to hold a shadow map of `resolution` pixels
    pub fn tiles_for(&self, resolution: u32) -> u32 {
        resolution.div_ceil(self.tile_size)
    }

    fn region_is_free(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        (y..y + height).all(|ty| {
            let row = self.tile_index(x, ty);
            self.tiles.is_range_clear(row, width as usize)
        })
    }

    fn mark_region(&mut self, region: AtlasRegion, used: bool) {
        for ty in region.y..region.y + region.height {
            let row = self.tile_index(region.x, ty);
            if used {
                self.tiles.set_range(row, region.width as usize);
            } else {
                self.tiles.clear_range(row, region.width as usize);
            }
        }
    }

    /// Find the first free `width × height` tile region and reserve it
    ///
    /// A request larger than the tile grid can never fit and fails with
    /// [`AtlasError::NotFound`] like any other exhaustion; a zero dimension
    /// is an [`AtlasError::InvalidRequest`].
    pub fn find_and_reserve(&mut self, width: u32, height: u32) -> Result<AtlasRegion, AtlasError> {
        if width < 1 || height < 1 {
            return Err(AtlasError::InvalidRequest {
                width,
                height,
                grid: self.num_tiles,
            });
        }

        if width <= self.num_tiles && height <= self.num_tiles {
            for x in 0..=self.num_tiles - width {
                for y in 0..=self.num_tiles - height {
                    if self.region_is_free(x, y, width, height) {
                        let region = AtlasRegion::new(x, y, width, height);
                        self.mark_region(region, true);
                        self.used_tiles += region.area();
                        return Ok(region);
                    }
                }
            }
        }

        log::error!(
            target: "umbra::atlas",
            "Failed to find a free region of {} x {} tiles ({:.1}% used)",
            width,
            height,
            self.coverage() * 100.0
        );
        Err(AtlasError::NotFound { width, height })
    }

    /// Release a previously reserved region
    pub fn free(&mut self, region: AtlasRegion) -> Result<(), AtlasError> {
        let past_edge = |start: u32, extent: u32| {
            start.checked_add(extent).map_or(true, |end| end > self.num_tiles)
        };
        if region.width < 1
            || region.height < 1
            || past_edge(region.x, region.width)
            || past_edge(region.y, region.height)
        {
            return Err(AtlasError::OutOfBounds(region.to_array()));
        }
        let reserved = (region.y..region.y + region.height).all(|ty| {
            self.tiles
                .is_range_set(self.tile_index(region.x, ty), region.width as usize)
        });
        if !reserved {
            return Err(AtlasError::NotReserved(region.to_array()));
        }

        self.mark_region(region, false);
        self.used_tiles -= region.area();
        Ok(())
    }

    /// Map a tile region to normalized texture coordinates
    pub fn region_to_uv(&self, region: AtlasRegion) -> RegionUv {
        let scale = self.tile_size as f32 / self.size as f32;
        RegionUv {
            u: region.x as f32 * scale,
            v: region.y as f32 * scale,
            du: region.width as f32 * scale,
            dv: region.height as f32 * scale,
        }
    }

    /// Check whether a single tile is free
    pub fn is_free(&self, x: u32, y: u32) -> bool {
        x < self.num_tiles && y < self.num_tiles && !self.tiles.get(self.tile_index(x, y))
    }

    /// Atlas size in pixels
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Tile size in pixels
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Tiles per atlas side
    pub fn num_tiles(&self) -> u32 {
        self.num_tiles
    }

    /// Number of reserved tiles
    pub fn used_tile_count(&self) -> u32 {
        self.used_tiles
    }

    /// Fraction of tiles in use (0-1)
    pub fn coverage(&self) -> f32 {
        self.used_tiles as f32 / (self.num_tiles * self.num_tiles) as f32
    }

    /// Release every region
    pub fn reset(&mut self) {
        self.tiles.clear_all();
        self.used_tiles = 0;
    }
}

impl Default for TileAtlas {
    fn default() -> Self {
        Self {
            size: 4096,
            tile_size: 32,
            num_tiles: 128,
            tiles: BitSet::new(128 * 128),
            used_tiles: 0,
        }
    }
}
