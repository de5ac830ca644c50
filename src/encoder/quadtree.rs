//! Hierarchical lat/lon quadtree encoder
//!
//! Values carry a Morton-interleaved cell position in the high bits and the
//! resolution level in the low five bits, so a value can be truncated to any
//! coarser level by masking. Level `L` splits the globe into `2^L x 2^L`
//! equal-angle cells (360/2^L degrees of longitude by 180/2^L of latitude).

use super::hull::{PlanarPolygon, Rect, Relation};
use super::SpatialEncoder;
use crate::types::{EncoderError, IndexValue, LatLon};

/// Deepest supported level
pub const MAX_LEVEL: u8 = 27;

const LEVEL_BITS: u32 = 5;
const LEVEL_MASK: u64 = 0x1f;

/// Quadtree encoder over the equirectangular plane
#[derive(Debug, Clone, Default)]
pub struct QuadtreeEncoder;

impl QuadtreeEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Value of the cell `(x, y)` at `level`, positions counted at that level
    fn cell_value(x: u64, y: u64, level: u8) -> IndexValue {
        let shift = (MAX_LEVEL - level) as u32;
        let morton = spread_bits(x << shift) | (spread_bits(y << shift) << 1);
        (morton << LEVEL_BITS) | level as u64
    }

    /// Cell position of a value at its own level
    fn cell_position(value: IndexValue) -> (u64, u64, u8) {
        let level = ((value & LEVEL_MASK) as u8).min(MAX_LEVEL);
        let morton = value >> LEVEL_BITS;
        let shift = (MAX_LEVEL - level) as u32;
        (
            compact_bits(morton) >> shift,
            compact_bits(morton >> 1) >> shift,
            level,
        )
    }

    /// Extent of the cell a value names
    pub fn cell_rect(value: IndexValue) -> Rect {
        let (x, y, level) = Self::cell_position(value);
        cell_rect_at(x, y, level)
    }

    /// Cell a value belongs to at a coarser level
    pub fn truncate(value: IndexValue, level: u8) -> IndexValue {
        let level = level.min(MAX_LEVEL);
        let morton = value >> LEVEL_BITS;
        let keep = 2 * (MAX_LEVEL - level) as u32;
        let morton = if keep == 0 { morton } else { (morton >> keep) << keep };
        (morton << LEVEL_BITS) | level as u64
    }

    /// True when `outer` names a cell containing the location of `inner`
    pub fn contains(outer: IndexValue, inner: IndexValue) -> bool {
        let level = (outer & LEVEL_MASK) as u8;
        level <= (inner & LEVEL_MASK) as u8 && Self::truncate(inner, level) == outer
    }

    /// Split a value into its location and its resolution level.
    ///
    /// The location is the centre of the finest-level cell the value was
    /// encoded from, so it survives resolution adaptation unchanged.
    pub fn decode(value: IndexValue) -> (LatLon, u8) {
        let (lat, lon) = Self::location(value);
        (LatLon::new(lat, lon), (value & LEVEL_MASK) as u8)
    }

    /// Centre of the finest-level cell holding the value's location
    fn location(value: IndexValue) -> (f64, f64) {
        let morton = value >> LEVEL_BITS;
        let rect = cell_rect_at(compact_bits(morton), compact_bits(morton >> 1), MAX_LEVEL);
        let (lon, lat) = rect.center();
        (lat, lon)
    }

    fn descend(
        polygon: &PlanarPolygon,
        x: u64,
        y: u64,
        level: u8,
        target: u8,
        cells: &mut Vec<IndexValue>,
    ) {
        match polygon.relate(&cell_rect_at(x, y, level)) {
            Relation::Outside => {}
            Relation::Inside => cells.push(Self::cell_value(x, y, level)),
            Relation::Partial if level == target => cells.push(Self::cell_value(x, y, level)),
            Relation::Partial => {
                for child in 0..4u64 {
                    Self::descend(
                        polygon,
                        2 * x + (child & 1),
                        2 * y + (child >> 1),
                        level + 1,
                        target,
                        cells,
                    );
                }
            }
        }
    }
}

fn cell_rect_at(x: u64, y: u64, level: u8) -> Rect {
    let n = (1u64 << level) as f64;
    let lon_size = 360.0 / n;
    let lat_size = 180.0 / n;
    let min_lon = -180.0 + x as f64 * lon_size;
    let min_lat = -90.0 + y as f64 * lat_size;
    Rect::new(min_lon, min_lon + lon_size, min_lat, min_lat + lat_size)
}

fn check_point(lat: f64, lon: f64) -> Result<(), String> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(format!("non-finite coordinate ({}, {})", lat, lon));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude {} out of range", lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("longitude {} out of range", lon));
    }
    Ok(())
}

/// Spread the low 32 bits of `v` onto the even bit positions
fn spread_bits(v: u64) -> u64 {
    let mut v = v & 0x0000_0000_ffff_ffff;
    v = (v | (v << 16)) & 0x0000_ffff_0000_ffff;
    v = (v | (v << 8)) & 0x00ff_00ff_00ff_00ff;
    v = (v | (v << 4)) & 0x0f0f_0f0f_0f0f_0f0f;
    v = (v | (v << 2)) & 0x3333_3333_3333_3333;
    (v | (v << 1)) & 0x5555_5555_5555_5555
}

fn compact_bits(v: u64) -> u64 {
    let mut v = v & 0x5555_5555_5555_5555;
    v = (v | (v >> 1)) & 0x3333_3333_3333_3333;
    v = (v | (v >> 2)) & 0x0f0f_0f0f_0f0f_0f0f;
    v = (v | (v >> 4)) & 0x00ff_00ff_00ff_00ff;
    v = (v | (v >> 8)) & 0x0000_ffff_0000_ffff;
    (v | (v >> 16)) & 0x0000_0000_ffff_ffff
}

/// Approximate angular distance in degrees between two nearby points
fn local_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dlat = b.0 - a.0;
    let mut dlon = b.1 - a.1;
    if dlon > 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }
    let mean_lat = (0.5 * (a.0 + b.0)).to_radians();
    (dlat * dlat + (dlon * mean_lat.cos()).powi(2)).sqrt()
}

impl SpatialEncoder for QuadtreeEncoder {
    fn max_level(&self) -> u8 {
        MAX_LEVEL
    }

    fn value_from_lat_lon(
        &self,
        lat: f64,
        lon: f64,
        level: u8,
    ) -> Result<IndexValue, EncoderError> {
        if level > MAX_LEVEL {
            return Err(EncoderError::new(format!(
                "level {} exceeds maximum {}",
                level, MAX_LEVEL
            )));
        }
        check_point(lat, lon).map_err(EncoderError::new)?;

        let cells = (1u64 << MAX_LEVEL) as f64;
        let max_pos = (1u64 << MAX_LEVEL) - 1;
        let x = (((lon + 180.0) / 360.0 * cells).floor() as u64).min(max_pos);
        let y = (((lat + 90.0) / 180.0 * cells).floor() as u64).min(max_pos);

        let full = Self::cell_value(x, y, MAX_LEVEL);
        Ok(Self::truncate(full, level))
    }

    /// Lower each value's level so its cell is no smaller than the spacing
    /// to its nearest along-row neighbour.
    fn adapt_resolution(&self, row: &mut [IndexValue]) -> Result<(), EncoderError> {
        if row.len() < 2 {
            return Ok(());
        }
        let points: Vec<(f64, f64)> = row.iter().map(|&v| Self::location(v)).collect();

        for (k, value) in row.iter_mut().enumerate() {
            let mut spacing = f64::INFINITY;
            if k > 0 {
                spacing = spacing.min(local_distance(points[k - 1], points[k]));
            }
            if k + 1 < points.len() {
                spacing = spacing.min(local_distance(points[k], points[k + 1]));
            }
            if !spacing.is_finite() || spacing <= 0.0 {
                continue;
            }

            let current = (*value & LEVEL_MASK) as u8;
            let estimate = (180.0 / spacing).log2().floor();
            let level = if estimate <= 0.0 {
                0
            } else {
                (estimate as u8).min(current)
            };
            *value = (*value & !LEVEL_MASK) | level as u64;
        }
        Ok(())
    }

    fn resolution_level(&self, value: IndexValue) -> u8 {
        (value & LEVEL_MASK) as u8
    }

    fn non_convex_hull(
        &self,
        perimeter: &[LatLon],
        level: u8,
    ) -> Result<Vec<IndexValue>, EncoderError> {
        if level > MAX_LEVEL {
            return Err(EncoderError::new(format!(
                "cover level {} exceeds maximum {}",
                level, MAX_LEVEL
            )));
        }
        if perimeter.len() < 3 {
            return Err(EncoderError::new(format!(
                "perimeter needs at least 3 vertices, got {}",
                perimeter.len()
            )));
        }
        for (k, p) in perimeter.iter().enumerate() {
            check_point(p.lat, p.lon).map_err(|msg| EncoderError::at(msg, k))?;
        }

        let polygon = PlanarPolygon::from_ring(perimeter);
        let mut cells = Vec::new();
        Self::descend(&polygon, 0, 0, 0, level, &mut cells);
        Ok(cells)
    }
}
