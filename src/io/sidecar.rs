//! Sidecar persistence
//!
//! A sidecar starts with the magic bytes `GSSC` and a little-endian `u16`
//! format version, followed by a gzip stream holding a bincode payload.
//! Arrays are stored as flat row-major vectors next to their shape.

use crate::core::dataset::{CoverSet, DatasetMetadata, GeoDataset, ResolutionSet};
use crate::types::{GeoError, GeoResult, IndexValue};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SIDECAR_MAGIC: [u8; 4] = *b"GSSC";
pub const SIDECAR_VERSION: u16 = 2;
pub const SIDECAR_SUFFIX: &str = "_stare.sidecar";

/// Persists and reloads a granule's dataset
pub trait SidecarStore {
    fn write(&self, dataset: &GeoDataset, path: &Path) -> GeoResult<()>;
    fn read(&self, path: &Path) -> GeoResult<GeoDataset>;
}

/// Sidecar location for a granule: the extension is replaced by the sidecar
/// suffix, and the file moves into `output_dir` when one is given
pub fn sidecar_path(input: impl AsRef<Path>, output_dir: Option<&Path>) -> PathBuf {
    let input = input.as_ref();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{}{}", stem, SIDECAR_SUFFIX);

    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input.with_file_name(file_name),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ResolutionRecord {
    name: String,
    size_i: u64,
    size_j: u64,
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    index_values: Vec<IndexValue>,
    variables: Vec<String>,
    finest_level: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SidecarRecord {
    metadata: DatasetMetadata,
    resolution_sets: Vec<ResolutionRecord>,
    cover_sets: Vec<CoverSet>,
}

impl ResolutionRecord {
    fn from_set(set: &ResolutionSet) -> Self {
        Self {
            name: set.name().to_string(),
            size_i: set.size_i() as u64,
            size_j: set.size_j() as u64,
            latitude: set.latitude().iter().copied().collect(),
            longitude: set.longitude().iter().copied().collect(),
            index_values: set.index_values().iter().copied().collect(),
            variables: set.variable_names().to_vec(),
            finest_level: set.finest_level(),
        }
    }

    fn into_set(self) -> GeoResult<ResolutionSet> {
        let shape = (self.size_i as usize, self.size_j as usize);
        let name = self.name;
        let shaped = |what: &str, data: Vec<f64>| {
            Array2::from_shape_vec(shape, data).map_err(|e| {
                GeoError::Format(format!("{} of '{}' does not fit {:?}: {}", what, name, shape, e))
            })
        };
        let latitude = shaped("latitude", self.latitude)?;
        let longitude = shaped("longitude", self.longitude)?;
        let index_values = Array2::from_shape_vec(shape, self.index_values).map_err(|e| {
            GeoError::Format(format!("index values of '{}' do not fit {:?}: {}", name, shape, e))
        })?;

        ResolutionSet::from_parts(
            name.clone(),
            latitude,
            longitude,
            index_values,
            self.variables,
            self.finest_level,
        )
    }
}

/// Gzip-compressed binary sidecar files
#[derive(Debug, Clone)]
pub struct BinarySidecarStore {
    compression: Compression,
}

impl Default for BinarySidecarStore {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
        }
    }
}

impl BinarySidecarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gzip level 0-9
    pub fn with_compression_level(level: u32) -> Self {
        Self {
            compression: Compression::new(level.min(9)),
        }
    }
}

impl SidecarStore for BinarySidecarStore {
    fn write(&self, dataset: &GeoDataset, path: &Path) -> GeoResult<()> {
        dataset.validate()?;

        let record = SidecarRecord {
            metadata: dataset.metadata.clone(),
            resolution_sets: dataset
                .resolution_sets()
                .iter()
                .map(ResolutionRecord::from_set)
                .collect(),
            cover_sets: dataset.cover_sets().to_vec(),
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // Write next to the destination so the final rename stays on one filesystem
        let mut temp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            writer.write_all(&SIDECAR_MAGIC)?;
            writer.write_all(&SIDECAR_VERSION.to_le_bytes())?;

            let mut encoder = GzEncoder::new(writer, self.compression);
            bincode::serialize_into(&mut encoder, &record)
                .map_err(|e| GeoError::Serialization(format!("Failed to encode sidecar: {}", e)))?;
            let mut writer = encoder.finish()?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| GeoError::Io(e.error))?;

        log::info!(
            "Wrote sidecar {} ({} resolution sets, {} covers)",
            path.display(),
            record.resolution_sets.len(),
            record.cover_sets.len()
        );
        Ok(())
    }

    fn read(&self, path: &Path) -> GeoResult<GeoDataset> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| GeoError::Format(format!("{}: missing header: {}", path.display(), e)))?;
        if magic != SIDECAR_MAGIC {
            return Err(GeoError::Format(format!(
                "{}: bad magic {:?}, expected {:?}",
                path.display(),
                magic,
                SIDECAR_MAGIC
            )));
        }

        let mut version_bytes = [0u8; 2];
        reader
            .read_exact(&mut version_bytes)
            .map_err(|e| GeoError::Format(format!("{}: missing version: {}", path.display(), e)))?;
        let version = u16::from_le_bytes(version_bytes);
        if version != SIDECAR_VERSION {
            return Err(GeoError::Format(format!(
                "{}: unsupported version {} (supported: {})",
                path.display(),
                version,
                SIDECAR_VERSION
            )));
        }

        let record: SidecarRecord = bincode::deserialize_from(GzDecoder::new(reader))
            .map_err(|e| GeoError::Serialization(format!("Failed to decode sidecar: {}", e)))?;

        let mut dataset = GeoDataset::new(record.metadata);
        for set in record.resolution_sets {
            dataset.add_resolution_set(set.into_set()?)?;
        }
        for cover in record.cover_sets {
            dataset.add_cover_set(cover)?;
        }
        dataset.validate()?;

        log::debug!(
            "Read sidecar {} ({} resolution sets, {} covers)",
            path.display(),
            dataset.resolution_sets().len(),
            dataset.cover_sets().len()
        );
        Ok(dataset)
    }
}

/// Shape and variables of one stored resolution set
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionSummary {
    pub name: String,
    pub shape: (usize, usize),
    pub variables: Vec<String>,
    pub finest_level: Option<u8>,
}

/// Level and size of one stored cover
#[derive(Debug, Clone, PartialEq)]
pub struct CoverSummary {
    pub name: String,
    pub level: u8,
    pub cells: usize,
}

/// Contents of a sidecar file, without the arrays
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarSummary {
    pub source: String,
    pub product: String,
    pub institution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolution_sets: Vec<ResolutionSummary>,
    pub covers: Vec<CoverSummary>,
}

impl SidecarSummary {
    pub fn from_dataset(dataset: &GeoDataset) -> Self {
        Self {
            source: dataset.metadata.source.clone(),
            product: dataset.metadata.product.clone(),
            institution: dataset.metadata.institution.clone(),
            created_at: dataset.metadata.created_at,
            resolution_sets: dataset
                .resolution_sets()
                .iter()
                .map(|s| ResolutionSummary {
                    name: s.name().to_string(),
                    shape: s.dim(),
                    variables: s.variable_names().to_vec(),
                    finest_level: s.finest_level(),
                })
                .collect(),
            covers: dataset
                .cover_sets()
                .iter()
                .map(|c| CoverSummary {
                    name: c.name.clone(),
                    level: c.resolution_level,
                    cells: c.len(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for SidecarSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "source: {} ({})", self.source, self.product)?;
        if let Some(institution) = &self.institution {
            writeln!(f, "institution: {}", institution)?;
        }
        writeln!(f, "created: {}", self.created_at.to_rfc3339())?;
        for set in &self.resolution_sets {
            writeln!(
                f,
                "resolution {}: {}x{}, finest level {}, variables [{}]",
                set.name,
                set.shape.0,
                set.shape.1,
                set.finest_level
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                set.variables.join(", ")
            )?;
        }
        for cover in &self.covers {
            writeln!(f, "cover {}: level {}, {} cells", cover.name, cover.level, cover.cells)?;
        }
        Ok(())
    }
}

/// Read a sidecar and describe what it holds
pub fn inspect_sidecar(path: impl AsRef<Path>) -> GeoResult<SidecarSummary> {
    let dataset = BinarySidecarStore::new().read(path.as_ref())?;
    Ok(SidecarSummary::from_dataset(&dataset))
}
