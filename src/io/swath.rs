//! Swath granule access and product resolution plans

use crate::io::gring::parse_gring_metadata;
use crate::types::{GeoError, GeoResult, LatLon};
use ndarray::Array2;
use std::fmt;
use std::path::Path;

/// Supported granule products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductKind {
    /// MODIS L2 precipitable water (MOD05_L2 / MYD05_L2)
    Mod05L2,
    /// MODIS L2 surface reflectance (MOD09 / MYD09)
    Mod09L2,
    /// Any other gridded geolocation
    Generic,
}

impl ProductKind {
    /// Detect the product from a granule file name
    pub fn from_file_name(path: impl AsRef<Path>) -> Self {
        let name = path
            .as_ref()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if name.starts_with("MOD05_L2.") || name.starts_with("MYD05_L2.") {
            ProductKind::Mod05L2
        } else if name.starts_with("MOD09.") || name.starts_with("MYD09.") {
            ProductKind::Mod09L2
        } else {
            ProductKind::Generic
        }
    }

    pub fn profile(&self) -> ProductProfile {
        match self {
            ProductKind::Mod05L2 => ProductProfile::mod05_l2(),
            ProductKind::Mod09L2 => ProductProfile::mod09_l2(),
            ProductKind::Generic => ProductProfile::generic(),
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductKind::Mod05L2 => write!(f, "MOD05_L2"),
            ProductKind::Mod09L2 => write!(f, "MOD09_L2"),
            ProductKind::Generic => write!(f, "generic"),
        }
    }
}

/// How one resolution set is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Read from the granule's geolocation arrays
    Native,
    /// Interpolated from an earlier set by `factor`
    Derived { from: String, factor: usize },
}

/// One named resolution set in a product plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlanEntry {
    pub name: String,
    pub source: ResolutionSource,
    /// Product variables geolocated by this set
    pub variables: Vec<String>,
}

impl ResolutionPlanEntry {
    pub fn native(name: &str, variables: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            source: ResolutionSource::Native,
            variables: variables.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn derived(name: &str, from: &str, factor: usize, variables: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            source: ResolutionSource::Derived {
                from: from.to_string(),
                factor,
            },
            variables: variables.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Product-specific layout: native grid, derived sets and cover naming
#[derive(Debug, Clone, PartialEq)]
pub struct ProductProfile {
    pub kind: ProductKind,
    /// Nominal native grid shape, when the product fixes one
    pub native_shape: Option<(usize, usize)>,
    /// Resolution sets in declaration order, native first
    pub plan: Vec<ResolutionPlanEntry>,
    /// Name of the cover built from the native grid
    pub cover_name: String,
}

impl ProductProfile {
    pub fn mod05_l2() -> Self {
        Self {
            kind: ProductKind::Mod05L2,
            native_shape: Some((406, 270)),
            plan: vec![ResolutionPlanEntry::native(
                "5km",
                &[
                    "Scan_Start_Time",
                    "Solar_Zenith",
                    "Solar_Azimuth",
                    "Water_Vapor_Infrared",
                    "Quality_Assurance_Infrared",
                ],
            )],
            cover_name: "5km".to_string(),
        }
    }

    pub fn mod09_l2() -> Self {
        Self {
            kind: ProductKind::Mod09L2,
            native_shape: Some((2030, 1354)),
            plan: vec![
                ResolutionPlanEntry::native(
                    "1km",
                    &[
                        "1km Atmospheric Optical Depth Band 1",
                        "1km Atmospheric Optical Depth Band 3",
                        "1km Atmospheric Optical Depth Band 8",
                        "1km Atmospheric Optical Depth Model",
                        "1km water_vapor",
                        "1km Atmospheric Optical Depth Band QA",
                        "1km Atmospheric Optical Depth Band CM",
                    ],
                ),
                ResolutionPlanEntry::derived(
                    "500m",
                    "1km",
                    2,
                    &[
                        "500m Surface Reflectance Band 1",
                        "500m Surface Reflectance Band 2",
                        "500m Surface Reflectance Band 3",
                        "500m Surface Reflectance Band 4",
                        "500m Surface Reflectance Band 5",
                        "500m Surface Reflectance Band 6",
                        "500m Surface Reflectance Band 7",
                    ],
                ),
                ResolutionPlanEntry::derived(
                    "250m",
                    "1km",
                    4,
                    &[
                        "250m Surface Reflectance Band 1",
                        "250m Surface Reflectance Band 2",
                        "250m Surface Reflectance Band 3",
                        "250m Surface Reflectance Band 4",
                        "250m Surface Reflectance Band 5",
                        "250m Surface Reflectance Band 6",
                        "250m Surface Reflectance Band 7",
                    ],
                ),
            ],
            cover_name: "1km".to_string(),
        }
    }

    pub fn generic() -> Self {
        Self {
            kind: ProductKind::Generic,
            native_shape: None,
            plan: vec![ResolutionPlanEntry::native("native", &[])],
            cover_name: "native".to_string(),
        }
    }

    /// The leading native entry of the plan
    pub fn native_entry(&self) -> GeoResult<&ResolutionPlanEntry> {
        match self.plan.first() {
            Some(entry) if entry.source == ResolutionSource::Native => Ok(entry),
            _ => Err(GeoError::InvalidPlan(format!(
                "{} plan does not start with a native set",
                self.kind
            ))),
        }
    }

    /// Check plan ordering, references and name uniqueness
    pub fn validate(&self) -> GeoResult<()> {
        self.native_entry()?;
        for (k, entry) in self.plan.iter().enumerate() {
            let earlier = &self.plan[..k];
            if entry.name.is_empty() {
                return Err(GeoError::InvalidPlan(format!("entry {} has an empty name", k)));
            }
            if earlier.iter().any(|e| e.name == entry.name) {
                return Err(GeoError::InvalidPlan(format!(
                    "resolution set '{}' declared twice",
                    entry.name
                )));
            }
            match &entry.source {
                ResolutionSource::Native if k > 0 => {
                    return Err(GeoError::InvalidPlan(format!(
                        "'{}' is a second native set",
                        entry.name
                    )));
                }
                ResolutionSource::Native => {}
                ResolutionSource::Derived { from, factor } => {
                    if *factor < 2 {
                        return Err(GeoError::InvalidPlan(format!(
                            "'{}' has interpolation factor {}, expected at least 2",
                            entry.name, factor
                        )));
                    }
                    if !earlier.iter().any(|e| &e.name == from) {
                        return Err(GeoError::InvalidPlan(format!(
                            "'{}' derives from '{}', which is not declared before it",
                            entry.name, from
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Native geolocation of a granule
#[derive(Debug, Clone, PartialEq)]
pub struct NativeGrid {
    pub latitude: Array2<f64>,
    pub longitude: Array2<f64>,
    /// Variables on the native grid, as found in the granule
    pub variable_names: Vec<String>,
}

impl NativeGrid {
    pub fn size_i(&self) -> usize {
        self.latitude.nrows()
    }

    pub fn size_j(&self) -> usize {
        self.latitude.ncols()
    }
}

/// Access to one granule's geolocation
pub trait SwathReader {
    /// Product layout of the granule
    fn profile(&self) -> &ProductProfile;

    /// Short identifier recorded as the sidecar source
    fn source_name(&self) -> String;

    fn read_native_grid(&self) -> GeoResult<NativeGrid>;

    /// Boundary corners from product metadata; fails with
    /// `BoundaryMetadataUnavailable` when absent or malformed
    fn read_boundary_corners(&self) -> GeoResult<[LatLon; 4]>;
}

/// Reader over geolocation that has already been decoded into memory
#[derive(Debug, Clone)]
pub struct MemorySwathReader {
    source: String,
    profile: ProductProfile,
    grid: NativeGrid,
    archive_metadata: Option<String>,
}

impl MemorySwathReader {
    /// Build a reader; the native grid's variable list defaults to the
    /// profile's native entry when empty
    pub fn new(
        source: impl Into<String>,
        profile: ProductProfile,
        latitude: Array2<f64>,
        longitude: Array2<f64>,
    ) -> GeoResult<Self> {
        profile.validate()?;
        if latitude.dim() != longitude.dim() {
            return Err(GeoError::InvalidGrid(format!(
                "Latitude {:?} and longitude {:?} shapes differ",
                latitude.dim(),
                longitude.dim()
            )));
        }
        if let Some(shape) = profile.native_shape {
            if shape != latitude.dim() {
                log::warn!(
                    "{} native grid is {:?}, expected {:?}",
                    profile.kind,
                    latitude.dim(),
                    shape
                );
            }
        }
        let variable_names = profile.native_entry()?.variables.clone();
        Ok(Self {
            source: source.into(),
            profile,
            grid: NativeGrid {
                latitude,
                longitude,
                variable_names,
            },
            archive_metadata: None,
        })
    }

    /// Reader whose profile is detected from the granule file name
    pub fn for_granule(
        path: impl AsRef<Path>,
        latitude: Array2<f64>,
        longitude: Array2<f64>,
    ) -> GeoResult<Self> {
        let path = path.as_ref();
        let kind = ProductKind::from_file_name(path);
        log::debug!("Detected product {} for {}", kind, path.display());
        Self::new(path.display().to_string(), kind.profile(), latitude, longitude)
    }

    /// Attach ECS archive metadata text holding the G-ring
    pub fn with_archive_metadata(mut self, text: impl Into<String>) -> Self {
        self.archive_metadata = Some(text.into());
        self
    }
}

impl SwathReader for MemorySwathReader {
    fn profile(&self) -> &ProductProfile {
        &self.profile
    }

    fn source_name(&self) -> String {
        self.source.clone()
    }

    fn read_native_grid(&self) -> GeoResult<NativeGrid> {
        Ok(self.grid.clone())
    }

    fn read_boundary_corners(&self) -> GeoResult<[LatLon; 4]> {
        let text = self
            .archive_metadata
            .as_deref()
            .ok_or_else(|| GeoError::BoundaryMetadataUnavailable {
                cover: self.profile.cover_name.clone(),
                reason: format!("{} carries no archive metadata", self.source),
            })?;
        parse_gring_metadata(text)
    }
}
