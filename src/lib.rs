//! geosidecar: spatial index sidecars for satellite swath granules
//!
//! For one granule the crate encodes every geolocated pixel at each of the
//! product's resolutions, derives finer grids from the native one where the
//! product needs them, and builds a compact footprint cover. The result is a
//! [`GeoDataset`] that a [`SidecarStore`] writes next to the granule.

pub mod core;
pub mod encoder;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    CoverLevelPolicy, GeoError, GeoResult, IndexValue, LatLon, PerimeterSource, SidecarConfig,
};

pub use crate::core::{GeoDataset, GranuleOutcome, GranuleProcessor, ResolutionSet};
pub use encoder::{QuadtreeEncoder, SpatialEncoder};
pub use io::{sidecar_path, BinarySidecarStore, MemorySwathReader, SidecarStore, SwathReader};
