//! Geolocation derivation, indexing and cover construction

pub mod cover;
pub mod dataset;
pub mod granule;
pub mod index;
pub mod interpolate;
pub mod perimeter;

// Re-export main types
pub use cover::CoverBuilder;
pub use dataset::{CoverSet, DatasetMetadata, GeoDataset, ResolutionSet};
pub use granule::{GranuleOutcome, GranuleProcessor};
pub use index::{IndexParams, SpatialIndexAssigner};
pub use interpolate::{unwrap_longitude_delta, InterpolationParams, ResolutionInterpolator};
pub use perimeter::PerimeterBuilder;
