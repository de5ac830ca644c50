use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encoded spatial index value (cell id with the level in its low bits)
pub type IndexValue = u64;

/// Default sanity threshold between adjacent coarse pixels, in degrees
pub const DEFAULT_MERIDIAN_THRESHOLD_DEGREES: f64 = 0.4;

/// Default level at which pixels are encoded before resolution adaptation
pub const DEFAULT_INDEX_LEVEL: u8 = 27;

/// Geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Ordered, implicitly closed boundary ring (first vertex is not repeated)
pub type PerimeterRing = Vec<LatLon>;

/// Which coordinate a geometry check failed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaAxis {
    Latitude,
    Longitude,
}

impl fmt::Display for DeltaAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaAxis::Latitude => write!(f, "latitude"),
            DeltaAxis::Longitude => write!(f, "longitude"),
        }
    }
}

/// Failure reported by a spatial encoder
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct EncoderError {
    pub message: String,
    /// Offending input position (pixel in a row, or perimeter vertex), if known
    pub position: Option<usize>,
}

impl EncoderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

/// Error types for sidecar generation
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error(
        "Geometry inconsistency in '{resolution}' at coarse pixel {coarse_pixel:?} \
         (fine pixel {fine_pixel:?}): {axis} delta {delta} exceeds {threshold} degrees"
    )]
    GeometryInconsistency {
        resolution: String,
        coarse_pixel: (usize, usize),
        fine_pixel: (usize, usize),
        axis: DeltaAxis,
        delta: f64,
        threshold: f64,
    },

    #[error("Boundary metadata unavailable for cover '{cover}': {reason}")]
    BoundaryMetadataUnavailable { cover: String, reason: String },

    #[error("Encoder failure for '{target}' at index {index:?}: {source}")]
    EncoderFailure {
        target: String,
        index: Option<usize>,
        #[source]
        source: EncoderError,
    },

    #[error("Allocation of {elements} elements failed for '{target}'")]
    AllocationFailure { target: String, elements: usize },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid resolution plan: {0}")]
    InvalidPlan(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid sidecar format: {0}")]
    Format(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl GeoError {
    /// Failures that only invalidate one resolution set or cover
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GeoError::GeometryInconsistency { .. } | GeoError::BoundaryMetadataUnavailable { .. }
        )
    }
}

/// Result type for sidecar operations
pub type GeoResult<T> = Result<T, GeoError>;

/// Level used for the granule cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoverLevelPolicy {
    /// Use the finest level observed while indexing the native grid
    #[default]
    Auto,
    Explicit(u8),
}

impl fmt::Display for CoverLevelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverLevelPolicy::Auto => write!(f, "auto"),
            CoverLevelPolicy::Explicit(level) => write!(f, "{}", level),
        }
    }
}

impl FromStr for CoverLevelPolicy {
    type Err = GeoError;

    fn from_str(s: &str) -> GeoResult<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(CoverLevelPolicy::Auto);
        }
        s.parse::<u8>()
            .map(CoverLevelPolicy::Explicit)
            .map_err(|_| GeoError::InvalidConfig(format!("Invalid cover level: {}", s)))
    }
}

/// Where the cover perimeter comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerimeterSource {
    /// Walk the native grid edge, sampling every `stride`-th cell
    StridedWalk { stride: usize },
    /// Four corner points from product metadata
    BoundaryMetadata,
}

impl Default for PerimeterSource {
    fn default() -> Self {
        PerimeterSource::StridedWalk { stride: 1 }
    }
}

impl fmt::Display for PerimeterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerimeterSource::StridedWalk { stride } => write!(f, "strided-walk:{}", stride),
            PerimeterSource::BoundaryMetadata => write!(f, "boundary-metadata"),
        }
    }
}

impl FromStr for PerimeterSource {
    type Err = GeoError;

    fn from_str(s: &str) -> GeoResult<Self> {
        let s = s.trim();
        match s {
            "boundary-metadata" | "gring" => Ok(PerimeterSource::BoundaryMetadata),
            "strided-walk" => Ok(PerimeterSource::default()),
            _ => {
                let stride = s
                    .strip_prefix("strided-walk:")
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| {
                        GeoError::InvalidConfig(format!("Invalid perimeter source: {}", s))
                    })?;
                if stride == 0 {
                    return Err(GeoError::InvalidConfig(
                        "Perimeter stride must be positive".to_string(),
                    ));
                }
                Ok(PerimeterSource::StridedWalk { stride })
            }
        }
    }
}

/// Configuration surface for building one granule's sidecar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    pub cover_level: CoverLevelPolicy,
    pub perimeter_source: PerimeterSource,
    /// Largest believable step between adjacent coarse pixels (instrument specific)
    pub meridian_threshold_degrees: f64,
    /// Level pixels are encoded at before resolution adaptation
    pub index_level: u8,
    /// Worker threads for indexing and interpolation (None = rayon global pool)
    pub worker_threads: Option<usize>,
    /// Keep going when a derived resolution set fails
    pub allow_partial: bool,
    /// Warn when a cover has more cells than this
    pub cover_size_warning: Option<usize>,
    /// Institution recorded in the sidecar metadata
    pub institution: Option<String>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            cover_level: CoverLevelPolicy::Auto,
            perimeter_source: PerimeterSource::default(),
            meridian_threshold_degrees: DEFAULT_MERIDIAN_THRESHOLD_DEGREES,
            index_level: DEFAULT_INDEX_LEVEL,
            worker_threads: None,
            allow_partial: true,
            cover_size_warning: Some(100_000),
            institution: None,
        }
    }
}

impl SidecarConfig {
    /// Check parameter ranges before any work is done
    pub fn validate(&self) -> GeoResult<()> {
        if let PerimeterSource::StridedWalk { stride } = self.perimeter_source {
            if stride == 0 {
                return Err(GeoError::InvalidConfig(
                    "Perimeter stride must be positive".to_string(),
                ));
            }
        }
        if !self.meridian_threshold_degrees.is_finite() || self.meridian_threshold_degrees <= 0.0 {
            return Err(GeoError::InvalidConfig(format!(
                "Meridian threshold must be a positive number of degrees, got {}",
                self.meridian_threshold_degrees
            )));
        }
        if self.meridian_threshold_degrees >= 180.0 {
            return Err(GeoError::InvalidConfig(format!(
                "Meridian threshold {} would treat every step as a wraparound",
                self.meridian_threshold_degrees
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(GeoError::InvalidConfig(
                "Worker thread count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
