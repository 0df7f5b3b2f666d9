//! Tile id <-> (z, x, y) conversion.
//!
//! Tiles are numbered along a Hilbert curve within each zoom level, and zoom
//! levels are laid out one after another:
//!
//! ```text
//! id(z, x, y) = (4^z - 1) / 3 + hilbert(z, x, y)
//! ```
//!
//! The first term counts every tile at lower zooms, so all ids at zoom `z`
//! precede all ids at zoom `z + 1`.

use crate::error::ArchiveError;

/// Highest zoom whose ids still fit in a u64.
pub const MAX_ZOOM: u8 = 31;

/// A validated tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Validate a coordinate parsed from untrusted input.
    ///
    /// # Errors
    /// - `UnsupportedZoom` if `z > 31`
    /// - `InvalidCoordinate` if `x` or `y` is outside `[0, 2^z)`
    pub fn new(z: u64, x: u64, y: u64) -> Result<Self, ArchiveError> {
        if z > MAX_ZOOM as u64 {
            return Err(ArchiveError::UnsupportedZoom { zoom: z, max: MAX_ZOOM });
        }
        let z = z as u8;
        let n = 1u64 << z;
        if x >= n || y >= n {
            return Err(ArchiveError::InvalidCoordinate { z, x, y });
        }
        Ok(Self {
            z,
            x: x as u32,
            y: y as u32,
        })
    }

    /// Compute the tile id of this coordinate.
    pub fn tile_id(&self) -> u64 {
        zoom_base(self.z) + hilbert_index(self.z, self.x as u64, self.y as u64)
    }
}

/// Number of tiles at all zoom levels below `z`.
#[inline]
fn zoom_base(z: u8) -> u64 {
    ((1u64 << (2 * z as u32)) - 1) / 3
}

fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

fn hilbert_index(z: u8, x: u64, y: u64) -> u64 {
    let n = 1u64 << z;
    let (mut x, mut y) = (x, y);
    let mut d = 0u64;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from(x & s > 0);
        let ry = u64::from(y & s > 0);
        d += s * s * ((3 * rx) ^ ry);
        rotate(n, &mut x, &mut y, rx, ry);
        s /= 2;
    }
    d
}

/// Convert a coordinate to a tile id.
///
/// # Errors
/// See [`TileCoord::new`].
pub fn zxy_to_tile_id(z: u32, x: u64, y: u64) -> Result<u64, ArchiveError> {
    Ok(TileCoord::new(z.into(), x, y)?.tile_id())
}

/// Convert a tile id back to its coordinate.
///
/// # Errors
/// `UnsupportedZoom` if the id lies beyond zoom 31.
pub fn tile_id_to_zxy(tile_id: u64) -> Result<TileCoord, ArchiveError> {
    let mut z = 0u8;
    loop {
        if z > MAX_ZOOM {
            return Err(ArchiveError::UnsupportedZoom {
                zoom: z as u64,
                max: MAX_ZOOM,
            });
        }
        let tiles_at_zoom = 1u64 << (2 * z as u32);
        let base = zoom_base(z);
        if tile_id < base + tiles_at_zoom {
            let (x, y) = hilbert_position(z, tile_id - base);
            return Ok(TileCoord {
                z,
                x: x as u32,
                y: y as u32,
            });
        }
        z += 1;
    }
}

fn hilbert_position(z: u8, index: u64) -> (u64, u64) {
    let n = 1u64 << z;
    let (mut x, mut y) = (0u64, 0u64);
    let mut t = index;
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (t / 2);
        let ry = 1 & (t ^ rx);
        rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        t /= 4;
        s *= 2;
    }
    (x, y)
}
