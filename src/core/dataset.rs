use crate::types::{GeoError, GeoResult, IndexValue};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Allocate a `rows x cols` array, reporting exhaustion instead of aborting
pub fn allocate_grid<T: Clone>(target: &str, shape: (usize, usize), fill: T) -> GeoResult<Array2<T>> {
    let (rows, cols) = shape;
    let elements = rows.checked_mul(cols).ok_or_else(|| GeoError::AllocationFailure {
        target: target.to_string(),
        elements: usize::MAX,
    })?;

    let mut data: Vec<T> = Vec::new();
    data.try_reserve_exact(elements)
        .map_err(|_| GeoError::AllocationFailure {
            target: target.to_string(),
            elements,
        })?;
    data.resize(elements, fill);

    Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| GeoError::InvalidGrid(format!("Shape error for '{}': {}", target, e)))
}

/// Geolocation and spatial index at one named resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionSet {
    name: String,
    latitude: Array2<f64>,
    longitude: Array2<f64>,
    index_values: Array2<IndexValue>,
    variable_names: Vec<String>,
    finest_level: Option<u8>,
}

impl ResolutionSet {
    /// Create an unindexed set from geolocation arrays
    pub fn new(
        name: impl Into<String>,
        latitude: Array2<f64>,
        longitude: Array2<f64>,
        variable_names: Vec<String>,
    ) -> GeoResult<Self> {
        let name = name.into();
        let index_values = allocate_grid(&name, latitude.dim(), 0 as IndexValue)?;
        Self::from_parts(name, latitude, longitude, index_values, variable_names, None)
    }

    /// Reassemble a set, e.g. after loading it from a sidecar
    pub fn from_parts(
        name: impl Into<String>,
        latitude: Array2<f64>,
        longitude: Array2<f64>,
        index_values: Array2<IndexValue>,
        variable_names: Vec<String>,
        finest_level: Option<u8>,
    ) -> GeoResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GeoError::InvalidGrid("Resolution set name is empty".to_string()));
        }
        let (size_i, size_j) = latitude.dim();
        if size_i == 0 || size_j == 0 {
            return Err(GeoError::InvalidGrid(format!(
                "Resolution set '{}' has empty shape {}x{}",
                name, size_i, size_j
            )));
        }
        if longitude.dim() != latitude.dim() || index_values.dim() != latitude.dim() {
            return Err(GeoError::InvalidGrid(format!(
                "Resolution set '{}' arrays disagree: lat {:?}, lon {:?}, index {:?}",
                name,
                latitude.dim(),
                longitude.dim(),
                index_values.dim()
            )));
        }

        let mut names: Vec<String> = Vec::with_capacity(variable_names.len());
        for var in variable_names {
            if !names.contains(&var) {
                names.push(var);
            }
        }

        Ok(Self {
            name,
            latitude,
            longitude,
            index_values,
            variable_names: names,
            finest_level,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size_i(&self) -> usize {
        self.latitude.nrows()
    }

    pub fn size_j(&self) -> usize {
        self.latitude.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.latitude.dim()
    }

    pub fn latitude(&self) -> &Array2<f64> {
        &self.latitude
    }

    pub fn longitude(&self) -> &Array2<f64> {
        &self.longitude
    }

    pub fn index_values(&self) -> &Array2<IndexValue> {
        &self.index_values
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    /// Finest encoded level seen while indexing, once indexed
    pub fn finest_level(&self) -> Option<u8> {
        self.finest_level
    }

    pub fn is_indexed(&self) -> bool {
        self.finest_level.is_some()
    }

    /// Comma separated variable list, for display
    pub fn variables_attribute(&self) -> String {
        self.variable_names.join(", ")
    }

    pub fn has_variable(&self, variable: &str) -> bool {
        self.variable_names.iter().any(|v| v == variable)
    }

    /// Split-borrow for the index assigner: read coordinates, write indices
    pub(crate) fn index_parts_mut(&mut self) -> (&Array2<f64>, &Array2<f64>, &mut Array2<IndexValue>) {
        (&self.latitude, &self.longitude, &mut self.index_values)
    }

    pub(crate) fn set_finest_level(&mut self, level: u8) {
        self.finest_level = Some(level);
    }

    /// Check coordinate ranges and shape invariants
    pub fn validate(&self) -> GeoResult<()> {
        if self.longitude.dim() != self.latitude.dim() || self.index_values.dim() != self.latitude.dim() {
            return Err(GeoError::InvalidGrid(format!(
                "Resolution set '{}' arrays disagree in shape",
                self.name
            )));
        }
        let size_j = self.size_j();
        for (k, (&lat, &lon)) in self.latitude.iter().zip(self.longitude.iter()).enumerate() {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(GeoError::InvalidGrid(format!(
                    "Resolution set '{}' pixel ({}, {}) out of range: lat {}, lon {}",
                    self.name,
                    k / size_j,
                    k % size_j,
                    lat,
                    lon
                )));
            }
        }
        Ok(())
    }
}

/// Conservative footprint cover of a granule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverSet {
    pub name: String,
    pub cells: Vec<IndexValue>,
    pub resolution_level: u8,
}

impl CoverSet {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Provenance recorded alongside the index data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Granule the sidecar describes
    pub source: String,
    pub product: String,
    pub institution: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DatasetMetadata {
    pub fn new(source: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            product: product.into(),
            institution: None,
            created_at: Utc::now(),
        }
    }
}

/// All resolution sets and covers derived for one granule
#[derive(Debug, Clone, PartialEq)]
pub struct GeoDataset {
    pub metadata: DatasetMetadata,
    resolution_sets: Vec<ResolutionSet>,
    cover_sets: Vec<CoverSet>,
}

impl GeoDataset {
    pub fn new(metadata: DatasetMetadata) -> Self {
        Self {
            metadata,
            resolution_sets: Vec::new(),
            cover_sets: Vec::new(),
        }
    }

    pub fn resolution_sets(&self) -> &[ResolutionSet] {
        &self.resolution_sets
    }

    pub fn cover_sets(&self) -> &[CoverSet] {
        &self.cover_sets
    }

    pub fn add_resolution_set(&mut self, set: ResolutionSet) -> GeoResult<()> {
        if self.resolution_set(set.name()).is_some() {
            return Err(GeoError::DuplicateName(format!("resolution set '{}'", set.name())));
        }
        log::debug!("Adding resolution set '{}' ({}x{})", set.name(), set.size_i(), set.size_j());
        self.resolution_sets.push(set);
        Ok(())
    }

    pub fn add_cover_set(&mut self, cover: CoverSet) -> GeoResult<()> {
        if self.cover_set(&cover.name).is_some() {
            return Err(GeoError::DuplicateName(format!("cover '{}'", cover.name)));
        }
        log::debug!("Adding cover '{}' with {} cells", cover.name, cover.len());
        self.cover_sets.push(cover);
        Ok(())
    }

    pub fn resolution_set(&self, name: &str) -> Option<&ResolutionSet> {
        self.resolution_sets.iter().find(|s| s.name() == name)
    }

    pub fn cover_set(&self, name: &str) -> Option<&CoverSet> {
        self.cover_sets.iter().find(|c| c.name == name)
    }

    /// Index values geolocating a product variable
    pub fn indices_for_variable(&self, variable: &str) -> GeoResult<&Array2<IndexValue>> {
        self.resolution_sets
            .iter()
            .find(|s| s.has_variable(variable))
            .map(|s| s.index_values())
            .ok_or_else(|| GeoError::NotFound(format!("no resolution set lists variable '{}'", variable)))
    }

    /// Full invariant check, used after loading a sidecar
    pub fn validate(&self) -> GeoResult<()> {
        if self.resolution_sets.is_empty() {
            return Err(GeoError::InvalidGrid("Dataset has no resolution sets".to_string()));
        }
        for (k, set) in self.resolution_sets.iter().enumerate() {
            if self.resolution_sets[..k].iter().any(|s| s.name() == set.name()) {
                return Err(GeoError::DuplicateName(format!("resolution set '{}'", set.name())));
            }
            set.validate()?;
        }
        for (k, cover) in self.cover_sets.iter().enumerate() {
            if self.cover_sets[..k].iter().any(|c| c.name == cover.name) {
                return Err(GeoError::DuplicateName(format!("cover '{}'", cover.name)));
            }
        }
        Ok(())
    }
}
