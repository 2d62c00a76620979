//! Provides utilities related to tile addressing and coordinates.

use std::{
    cmp::Ordering,
    f64::consts::PI,
    fmt,
    fmt::{Display, Formatter},
    ops::RangeInclusive,
};

use cgmath::Point2;
use serde::{Deserialize, Serialize};

use crate::util::math::Aabb2;

pub const EXTENT_UINT: u32 = 4096;
pub const EXTENT: f64 = EXTENT_UINT as f64;

/// Highest level a [`TileKey`] can be created for. The morton code of a level `n` key uses
/// `2n + 1` bits, the remaining high bits are reserved for the wrap-around offset.
pub const MAX_TILE_LEVEL: u8 = 30;

/// Default number of bits used to store the wrap-around offset of a tile.
/// Three bits store the offsets `-4..=3`.
pub const DEFAULT_OFFSET_BITSHIFT: u32 = 3;

/// Offset bitshifts accepted by [`encode_offset_key`] and [`decode_offset_key`].
pub const OFFSET_BITSHIFT_RANGE: RangeInclusive<u32> = 1..=16;

pub const EARTH_RADIUS: f64 = 6_378_137.0;
pub const EQUATORIAL_CIRCUMFERENCE: f64 = 2.0 * PI * EARTH_RADIUS;

#[derive(
    Ord, PartialOrd, Eq, PartialEq, Hash, Copy, Clone, Debug, Default, Serialize, Deserialize,
)]
pub struct ZoomLevel(u8);

impl ZoomLevel {
    pub const fn new(z: u8) -> Self {
        ZoomLevel(z)
    }

    pub fn is_root(self) -> bool {
        self.0 == 0
    }

    /// Number of tiles along one axis at this level.
    pub fn tiles_per_axis(self) -> u64 {
        1u64 << self.0
    }
}

impl std::ops::Add<u8> for ZoomLevel {
    type Output = ZoomLevel;

    fn add(self, rhs: u8) -> Self::Output {
        let zoom_level = self.0.checked_add(rhs).expect("zoom level overflowed");
        ZoomLevel(zoom_level)
    }
}

impl std::ops::Sub<u8> for ZoomLevel {
    type Output = ZoomLevel;

    fn sub(self, rhs: u8) -> Self::Output {
        let zoom_level = self.0.checked_sub(rhs).expect("zoom level underflowed");
        ZoomLevel(zoom_level)
    }
}

impl Display for ZoomLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ZoomLevel {
    fn from(zoom_level: u8) -> Self {
        ZoomLevel(zoom_level)
    }
}

impl From<ZoomLevel> for u8 {
    fn from(val: ZoomLevel) -> Self {
        val.0
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        LatLon {
            latitude,
            longitude,
        }
    }

    /// Converts web-mercator world coordinates (meters) to geographic coordinates.
    pub fn from_mercator(x: f64, y: f64) -> Self {
        let longitude = (x / EARTH_RADIUS).to_degrees();
        let latitude = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        LatLon {
            latitude,
            longitude,
        }
    }
}

impl Display for LatLon {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Position of a node within the tile quad tree.
///
/// Rows grow from north to south, columns from west to east. Keys are immutable and ordered
/// by their [morton code](TileKey::morton_code).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TileKey {
    row: u32,
    column: u32,
    level: ZoomLevel,
}

impl TileKey {
    /// Creates a tile key. Returns `None` if `row` or `column` exceed the bounds of `level`.
    pub fn new(row: u32, column: u32, level: ZoomLevel) -> Option<Self> {
        if level.0 > MAX_TILE_LEVEL {
            return None;
        }
        let bounds = level.tiles_per_axis();
        if row as u64 >= bounds || column as u64 >= bounds {
            return None;
        }
        Some(Self { row, column, level })
    }

    pub fn root() -> Self {
        Self {
            row: 0,
            column: 0,
            level: ZoomLevel::default(),
        }
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn level(&self) -> ZoomLevel {
        self.level
    }

    /// Interleaves the bits of column (even bits) and row (odd bits). The bit at position
    /// `2 * level` tags the level, so keys of different levels never collide.
    pub fn morton_code(&self) -> u64 {
        let mut result = 1u64 << (2 * self.level.0 as u32);
        for i in 0..self.level.0 as u32 {
            if self.column & (1 << i) != 0 {
                result |= 1u64 << (2 * i);
            }
            if self.row & (1 << i) != 0 {
                result |= 1u64 << (2 * i + 1);
            }
        }
        result
    }

    /// Inverse of [`TileKey::morton_code`].
    pub fn from_morton_code(code: u64) -> Option<Self> {
        if code == 0 {
            return None;
        }
        let tag_bit = 63 - code.leading_zeros();
        if tag_bit % 2 != 0 {
            return None;
        }
        let level = (tag_bit / 2) as u8;
        let mut row = 0u32;
        let mut column = 0u32;
        for i in 0..level as u32 {
            if code & (1u64 << (2 * i)) != 0 {
                column |= 1 << i;
            }
            if code & (1u64 << (2 * i + 1)) != 0 {
                row |= 1 << i;
            }
        }
        TileKey::new(row, column, ZoomLevel(level))
    }

    /// Get the tile which is one zoom level lower and contains this one
    pub fn parent(&self) -> Option<TileKey> {
        if self.level.is_root() {
            return None;
        }

        Some(TileKey {
            row: self.row >> 1,
            column: self.column >> 1,
            level: self.level - 1,
        })
    }

    /// The four tiles one zoom level higher which cover this one. `None` at
    /// [`MAX_TILE_LEVEL`].
    pub fn children(&self) -> Option<[TileKey; 4]> {
        if u8::from(self.level) >= MAX_TILE_LEVEL {
            return None;
        }
        let level = self.level + 1;
        let (row, column) = (self.row * 2, self.column * 2);
        Some([
            TileKey { row, column, level },
            TileKey {
                row,
                column: column + 1,
                level,
            },
            TileKey {
                row: row + 1,
                column,
                level,
            },
            TileKey {
                row: row + 1,
                column: column + 1,
                level,
            },
        ])
    }

    /// Edge length of this tile in web-mercator meters.
    pub fn size_in_meters(&self) -> f64 {
        EQUATORIAL_CIRCUMFERENCE / self.level.tiles_per_axis() as f64
    }

    /// Bounds of this tile in web-mercator meters, `y` pointing north.
    pub fn world_bounds(&self) -> Aabb2<f64> {
        let size = self.size_in_meters();
        let half = EQUATORIAL_CIRCUMFERENCE / 2.0;
        let min_x = -half + self.column as f64 * size;
        let max_y = half - self.row as f64 * size;
        Aabb2::new(
            Point2::new(min_x, max_y - size),
            Point2::new(min_x + size, max_y),
        )
    }

    pub fn geo_center(&self) -> LatLon {
        let center = self.world_bounds().center();
        LatLon::from_mercator(center.x, center.y)
    }
}

impl PartialOrd for TileKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TileKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.morton_code().cmp(&other.morton_code())
    }
}

impl Display for TileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TK(row={row},column={column},level={level})",
            row = self.row,
            column = self.column,
            level = self.level
        )
    }
}

/// Packs a wrap-around `offset` into the high `bitshift` bits of the morton code of `tile_key`.
///
/// The offset is wrapped into `-2^(bitshift-1)..2^(bitshift-1)` before it is stored.
pub fn encode_offset_key(tile_key: &TileKey, offset: i32, bitshift: u32) -> u64 {
    assert!(
        OFFSET_BITSHIFT_RANGE.contains(&bitshift),
        "offset bitshift must be within {OFFSET_BITSHIFT_RANGE:?}, got {bitshift}"
    );
    let morton_code = tile_key.morton_code();
    debug_assert!(
        morton_code >> (64 - bitshift) == 0,
        "morton code of {tile_key} collides with the offset bits"
    );

    let total = 1i64 << bitshift;
    let stored = (offset as i64 + total / 2).rem_euclid(total) as u64;
    (stored << (64 - bitshift)) | morton_code
}

/// Inverse of [`encode_offset_key`], returns the offset and the morton code.
pub fn decode_offset_key(key: u64, bitshift: u32) -> (i32, u64) {
    assert!(
        OFFSET_BITSHIFT_RANGE.contains(&bitshift),
        "offset bitshift must be within {OFFSET_BITSHIFT_RANGE:?}, got {bitshift}"
    );
    let stored = (key >> (64 - bitshift)) as i64;
    let morton_code = key & ((1u64 << (64 - bitshift)) - 1);
    ((stored - (1i64 << (bitshift - 1))) as i32, morton_code)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::coords::{
        decode_offset_key, encode_offset_key, TileKey, ZoomLevel, DEFAULT_OFFSET_BITSHIFT,
        EQUATORIAL_CIRCUMFERENCE, MAX_TILE_LEVEL,
    };

    fn expected_offset(offset: i32, bitshift: u32) -> i32 {
        let total = 1i64 << bitshift;
        let half = total / 2;
        ((offset as i64 + half).rem_euclid(total) - half) as i32
    }

    #[test]
    fn morton_code_of_known_keys() {
        assert_eq!(TileKey::root().morton_code(), 1);
        let key = TileKey::new(1, 0, ZoomLevel::new(1)).unwrap();
        assert_eq!(key.morton_code(), 0b110);
        let key = TileKey::new(0, 1, ZoomLevel::new(1)).unwrap();
        assert_eq!(key.morton_code(), 0b101);
    }

    #[test]
    fn morton_code_roundtrip() {
        let key = TileKey::new(11365, 17425, ZoomLevel::new(15)).unwrap();
        assert_eq!(TileKey::from_morton_code(key.morton_code()), Some(key));
        assert_eq!(TileKey::from_morton_code(0), None);
    }

    #[test]
    fn rejects_out_of_bounds() {
        assert!(TileKey::new(2, 0, ZoomLevel::new(1)).is_none());
        assert!(TileKey::new(0, 4, ZoomLevel::new(2)).is_none());
        assert!(TileKey::new(0, 0, ZoomLevel::new(31)).is_none());
    }

    #[test]
    fn parent_and_children() {
        let key = TileKey::new(5, 6, ZoomLevel::new(3)).unwrap();
        for child in key.children().unwrap() {
            assert_eq!(child.parent(), Some(key));
        }
        assert_eq!(TileKey::root().parent(), None);

        let deepest = TileKey::new(0, 0, ZoomLevel::new(MAX_TILE_LEVEL)).unwrap();
        assert!(deepest.children().is_none());
    }

    #[test]
    fn world_bounds_of_root() {
        let bounds = TileKey::root().world_bounds();
        assert!((bounds.max.x - bounds.min.x - EQUATORIAL_CIRCUMFERENCE).abs() < 1e-6);
        assert!((bounds.min.x + EQUATORIAL_CIRCUMFERENCE / 2.0).abs() < 1e-6);
        let center = TileKey::root().geo_center();
        assert!(center.latitude.abs() < 1e-9);
        assert!(center.longitude.abs() < 1e-9);
    }

    #[test]
    fn offset_codec_in_range() {
        let key = TileKey::new(3, 7, ZoomLevel::new(4)).unwrap();
        for offset in -4..=3 {
            let encoded = encode_offset_key(&key, offset, DEFAULT_OFFSET_BITSHIFT);
            assert_eq!(
                decode_offset_key(encoded, DEFAULT_OFFSET_BITSHIFT),
                (offset, key.morton_code())
            );
        }
    }

    #[test]
    fn offset_codec_wraps_around() {
        let key = TileKey::new(3, 7, ZoomLevel::new(4)).unwrap();
        let encoded = encode_offset_key(&key, 4, 3);
        assert_eq!(decode_offset_key(encoded, 3), (-4, key.morton_code()));
        let encoded = encode_offset_key(&key, -5, 3);
        assert_eq!(decode_offset_key(encoded, 3), (3, key.morton_code()));
        let encoded = encode_offset_key(&key, 17, 4);
        assert_eq!(decode_offset_key(encoded, 4), (1, key.morton_code()));
    }

    proptest! {
        #[test]
        fn offset_codec_matches_modular_definition(
            row in 0u32..1024,
            column in 0u32..1024,
            offset in -10_000i32..10_000,
            bitshift in 1u32..=8,
        ) {
            let key = TileKey::new(row, column, ZoomLevel::new(10)).unwrap();
            let (decoded_offset, morton_code) =
                decode_offset_key(encode_offset_key(&key, offset, bitshift), bitshift);
            prop_assert_eq!(decoded_offset, expected_offset(offset, bitshift));
            prop_assert_eq!(morton_code, key.morton_code());
        }
    }
}
