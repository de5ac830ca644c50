//! Spatial encoder capability consumed by the indexing and cover stages

pub mod hull;
pub mod quadtree;

use crate::types::{EncoderError, IndexValue, LatLon};

pub use quadtree::QuadtreeEncoder;

/// Point-to-index encoding and hull construction.
///
/// Implementations are pure functions of their inputs and are shared across
/// worker threads.
pub trait SpatialEncoder: Send + Sync {
    /// Deepest level this encoder can represent
    fn max_level(&self) -> u8;

    /// Encode one point at the given level
    fn value_from_lat_lon(&self, lat: f64, lon: f64, level: u8)
        -> Result<IndexValue, EncoderError>;

    /// Refine the resolution estimates of one row of along-scan neighbours.
    ///
    /// The default leaves the values at the level they were encoded at.
    fn adapt_resolution(&self, _row: &mut [IndexValue]) -> Result<(), EncoderError> {
        Ok(())
    }

    /// Resolution level carried by an encoded value
    fn resolution_level(&self, value: IndexValue) -> u8;

    /// Cells conservatively covering the polygon bounded by `perimeter`
    fn non_convex_hull(
        &self,
        perimeter: &[LatLon],
        level: u8,
    ) -> Result<Vec<IndexValue>, EncoderError>;
}
