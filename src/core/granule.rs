//! End-to-end sidecar generation for one granule

use crate::core::cover::CoverBuilder;
use crate::core::dataset::{DatasetMetadata, GeoDataset, ResolutionSet};
use crate::core::index::{IndexParams, SpatialIndexAssigner};
use crate::core::interpolate::{InterpolationParams, ResolutionInterpolator};
use crate::core::perimeter::PerimeterBuilder;
use crate::encoder::SpatialEncoder;
use crate::io::swath::{ResolutionSource, SwathReader};
use crate::types::{CoverLevelPolicy, GeoError, GeoResult, PerimeterSource, SidecarConfig};

/// Result of processing one granule
#[derive(Debug)]
pub struct GranuleOutcome {
    pub dataset: GeoDataset,
    /// Derived resolution sets that could not be built
    pub resolution_failures: Vec<GeoError>,
    /// Why the cover is missing, if it is
    pub cover_failure: Option<GeoError>,
}

impl GranuleOutcome {
    /// Every planned set and the cover were produced
    pub fn is_complete(&self) -> bool {
        self.resolution_failures.is_empty() && self.cover_failure.is_none()
    }
}

/// Drives reader, interpolator, assigner and cover builder for a granule
pub struct GranuleProcessor<'a, E: SpatialEncoder + ?Sized> {
    encoder: &'a E,
    config: SidecarConfig,
}

impl<'a, E: SpatialEncoder + ?Sized> GranuleProcessor<'a, E> {
    /// Levels are checked against the encoder here, before any indexing runs
    pub fn new(encoder: &'a E, config: SidecarConfig) -> GeoResult<Self> {
        config.validate()?;
        let max_level = encoder.max_level();
        if config.index_level > max_level {
            return Err(GeoError::InvalidConfig(format!(
                "Index level {} exceeds encoder maximum {}",
                config.index_level, max_level
            )));
        }
        if let CoverLevelPolicy::Explicit(level) = config.cover_level {
            if level > max_level {
                return Err(GeoError::InvalidConfig(format!(
                    "Cover level {} exceeds encoder maximum {}",
                    level, max_level
                )));
            }
        }
        Ok(Self { encoder, config })
    }

    pub fn config(&self) -> &SidecarConfig {
        &self.config
    }

    fn assigner(&self) -> SpatialIndexAssigner<'_, E> {
        SpatialIndexAssigner::new(
            self.encoder,
            IndexParams {
                level: self.config.index_level,
                worker_threads: self.config.worker_threads,
            },
        )
    }

    /// Build every resolution set in the product plan plus the cover.
    ///
    /// Native grid failures abort. A derived set that fails its geometry
    /// check or its encoding is recorded in the outcome and its siblings
    /// still run, unless `allow_partial` is off. Any cover failure is
    /// recorded in `cover_failure` and the resolution sets are kept; see
    /// [`GranuleProcessor::retry_cover`].
    pub fn process<R: SwathReader + ?Sized>(&self, reader: &R) -> GeoResult<GranuleOutcome> {
        let profile = reader.profile();
        profile.validate()?;
        let native_entry = profile.native_entry()?;

        log::info!(
            "Processing {} granule {} ({} resolution sets planned)",
            profile.kind,
            reader.source_name(),
            profile.plan.len()
        );

        let grid = reader.read_native_grid()?;
        let mut native = ResolutionSet::new(
            native_entry.name.clone(),
            grid.latitude,
            grid.longitude,
            grid.variable_names,
        )?;
        let native_level = self.assigner().assign(&mut native)?;

        let mut metadata = DatasetMetadata::new(reader.source_name(), profile.kind.to_string());
        metadata.institution = self.config.institution.clone();
        let mut dataset = GeoDataset::new(metadata);
        dataset.add_resolution_set(native)?;

        let mut resolution_failures = Vec::new();
        for entry in profile.plan.iter().skip(1) {
            let ResolutionSource::Derived { from, factor } = &entry.source else {
                continue;
            };
            match self.derive_set(&dataset, &entry.name, from, *factor, entry.variables.clone()) {
                Ok(set) => dataset.add_resolution_set(set)?,
                Err(e)
                    if e.is_recoverable()
                        || matches!(e, GeoError::NotFound(_) | GeoError::EncoderFailure { .. }) =>
                {
                    if !self.config.allow_partial {
                        return Err(e);
                    }
                    log::warn!("Skipping resolution set '{}': {}", entry.name, e);
                    resolution_failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        let mut outcome = GranuleOutcome {
            dataset,
            resolution_failures,
            cover_failure: None,
        };

        match self.add_cover(&mut outcome.dataset, reader, self.config.perimeter_source, native_level) {
            Ok(()) => {}
            Err(e) => {
                if e.is_recoverable() {
                    log::warn!(
                        "Cover '{}' not built: {}; retry with a strided perimeter walk",
                        profile.cover_name,
                        e
                    );
                } else {
                    log::warn!("Cover '{}' not built: {}", profile.cover_name, e);
                }
                outcome.cover_failure = Some(e);
            }
        }

        log::info!(
            "Granule {} done: {} resolution sets, {} covers, {} failures",
            reader.source_name(),
            outcome.dataset.resolution_sets().len(),
            outcome.dataset.cover_sets().len(),
            outcome.resolution_failures.len() + usize::from(outcome.cover_failure.is_some())
        );
        Ok(outcome)
    }

    /// Build the cover again with an explicitly chosen perimeter source,
    /// typically a strided walk after boundary metadata was unavailable
    pub fn retry_cover<R: SwathReader + ?Sized>(
        &self,
        outcome: &mut GranuleOutcome,
        reader: &R,
        source: PerimeterSource,
    ) -> GeoResult<()> {
        let native_level = outcome
            .dataset
            .resolution_sets()
            .first()
            .and_then(|s| s.finest_level())
            .ok_or_else(|| GeoError::InvalidGrid("Native resolution set is not indexed".to_string()))?;

        log::info!("Retrying cover '{}' with {}", reader.profile().cover_name, source);
        self.add_cover(&mut outcome.dataset, reader, source, native_level)?;
        outcome.cover_failure = None;
        Ok(())
    }

    fn derive_set(
        &self,
        dataset: &GeoDataset,
        name: &str,
        from: &str,
        factor: usize,
        variables: Vec<String>,
    ) -> GeoResult<ResolutionSet> {
        let coarse = dataset.resolution_set(from).ok_or_else(|| {
            GeoError::NotFound(format!("resolution set '{}' needed for '{}'", from, name))
        })?;

        let interpolator = ResolutionInterpolator::new(InterpolationParams {
            factor,
            meridian_threshold_degrees: self.config.meridian_threshold_degrees,
            worker_threads: self.config.worker_threads,
        });
        let mut set = interpolator.derive(coarse, name, variables)?;
        self.assigner().assign(&mut set)?;
        Ok(set)
    }

    fn add_cover<R: SwathReader + ?Sized>(
        &self,
        dataset: &mut GeoDataset,
        reader: &R,
        source: PerimeterSource,
        native_level: u8,
    ) -> GeoResult<()> {
        let cover_name = reader.profile().cover_name.clone();
        let native = dataset
            .resolution_sets()
            .first()
            .ok_or_else(|| GeoError::InvalidGrid("Dataset has no native resolution set".to_string()))?;

        let perimeter = PerimeterBuilder::new(source)
            .build(&cover_name, native, || reader.read_boundary_corners())?;
        let cover = CoverBuilder::new(self.encoder)
            .with_size_warning(self.config.cover_size_warning)
            .build_cover(&cover_name, &perimeter, self.config.cover_level, native_level)?;
        dataset.add_cover_set(cover)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::QuadtreeEncoder;
    use crate::io::swath::{MemorySwathReader, ProductProfile, ResolutionPlanEntry};
    use crate::types::{EncoderError, IndexValue, LatLon};
    use ndarray::Array2;

    /// Quadtree encoder that refuses points north of `max_lat` and,
    /// optionally, every hull
    struct PickyEncoder {
        inner: QuadtreeEncoder,
        max_lat: f64,
        refuse_hull: bool,
    }

    impl PickyEncoder {
        fn new(max_lat: f64, refuse_hull: bool) -> Self {
            Self {
                inner: QuadtreeEncoder::new(),
                max_lat,
                refuse_hull,
            }
        }
    }

    impl SpatialEncoder for PickyEncoder {
        fn max_level(&self) -> u8 {
            self.inner.max_level()
        }

        fn value_from_lat_lon(&self, lat: f64, lon: f64, level: u8) -> Result<IndexValue, EncoderError> {
            if lat > self.max_lat {
                return Err(EncoderError::new(format!("latitude {} refused", lat)));
            }
            self.inner.value_from_lat_lon(lat, lon, level)
        }

        fn adapt_resolution(&self, values: &mut [IndexValue]) -> Result<(), EncoderError> {
            self.inner.adapt_resolution(values)
        }

        fn resolution_level(&self, value: IndexValue) -> u8 {
            self.inner.resolution_level(value)
        }

        fn non_convex_hull(&self, perimeter: &[LatLon], level: u8) -> Result<Vec<IndexValue>, EncoderError> {
            if self.refuse_hull {
                return Err(EncoderError::at("hull refused", 0));
            }
            self.inner.non_convex_hull(perimeter, level)
        }
    }

    fn smooth_grid(rows: usize, cols: usize) -> (Array2<f64>, Array2<f64>) {
        (
            Array2::from_shape_fn((rows, cols), |(i, _)| 30.0 + 0.05 * i as f64),
            Array2::from_shape_fn((rows, cols), |(_, j)| 60.0 + 0.05 * j as f64),
        )
    }

    fn two_level_profile() -> ProductProfile {
        let mut profile = ProductProfile::generic();
        profile.plan.push(ResolutionPlanEntry::derived("half", "native", 2, &["fine_var"]));
        profile
    }

    #[test]
    fn test_generic_granule() {
        let (lat, lon) = smooth_grid(5, 6);
        let reader = MemorySwathReader::new("grid.nc", two_level_profile(), lat, lon).unwrap();
        let encoder = QuadtreeEncoder::new();
        let processor = GranuleProcessor::new(&encoder, SidecarConfig::default()).unwrap();

        let outcome = processor.process(&reader).unwrap();
        assert!(outcome.is_complete());

        let dataset = &outcome.dataset;
        assert_eq!(dataset.resolution_sets().len(), 2);
        assert_eq!(dataset.resolution_set("half").unwrap().dim(), (10, 12));
        assert!(dataset.resolution_sets().iter().all(|s| s.is_indexed()));

        let cover = dataset.cover_set("native").unwrap();
        let native_level = dataset.resolution_sets()[0].finest_level().unwrap();
        assert_eq!(cover.resolution_level, native_level);
        assert!(!cover.is_empty());
        assert!(dataset.indices_for_variable("fine_var").is_ok());
    }

    #[test]
    fn test_derived_failure_is_collected() {
        // 0.5 degree steps trip the default 0.4 degree check on derivation only
        let lat = Array2::from_shape_fn((4, 4), |(i, _)| 30.0 + 0.5 * i as f64);
        let lon = Array2::from_shape_fn((4, 4), |(_, j)| 60.0 + 0.5 * j as f64);
        let mut profile = two_level_profile();
        profile.plan.push(ResolutionPlanEntry::derived("quarter", "half", 2, &[]));
        let reader = MemorySwathReader::new("grid.nc", profile, lat, lon).unwrap();
        let encoder = QuadtreeEncoder::new();

        let processor = GranuleProcessor::new(&encoder, SidecarConfig::default()).unwrap();
        let outcome = processor.process(&reader).unwrap();
        assert_eq!(outcome.dataset.resolution_sets().len(), 1);
        assert_eq!(outcome.resolution_failures.len(), 2);
        assert!(matches!(
            outcome.resolution_failures[0],
            GeoError::GeometryInconsistency { .. }
        ));
        assert!(matches!(outcome.resolution_failures[1], GeoError::NotFound(_)));
        assert!(outcome.cover_failure.is_none());

        let strict = SidecarConfig {
            allow_partial: false,
            ..Default::default()
        };
        let processor = GranuleProcessor::new(&encoder, strict).unwrap();
        assert!(matches!(
            processor.process(&reader),
            Err(GeoError::GeometryInconsistency { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let encoder = QuadtreeEncoder::new();
        let config = SidecarConfig {
            worker_threads: Some(0),
            ..Default::default()
        };
        assert!(GranuleProcessor::new(&encoder, config).is_err());
    }

    #[test]
    fn test_cover_level_above_encoder_maximum_rejected_up_front() {
        let encoder = QuadtreeEncoder::new();
        let config = SidecarConfig {
            cover_level: CoverLevelPolicy::Explicit(30),
            ..Default::default()
        };
        assert!(matches!(
            GranuleProcessor::new(&encoder, config),
            Err(GeoError::InvalidConfig(_))
        ));

        let config = SidecarConfig {
            index_level: 28,
            ..Default::default()
        };
        assert!(matches!(
            GranuleProcessor::new(&encoder, config),
            Err(GeoError::InvalidConfig(_))
        ));

        let config = SidecarConfig {
            cover_level: CoverLevelPolicy::Explicit(27),
            ..Default::default()
        };
        assert!(GranuleProcessor::new(&encoder, config).is_ok());
    }

    #[test]
    fn test_single_row_grid_keeps_sets_without_cover() {
        let (lat, lon) = smooth_grid(1, 5);
        let reader = MemorySwathReader::new("row.nc", ProductProfile::generic(), lat, lon).unwrap();
        let encoder = QuadtreeEncoder::new();
        let processor = GranuleProcessor::new(&encoder, SidecarConfig::default()).unwrap();

        let outcome = processor.process(&reader).unwrap();
        assert!(matches!(outcome.cover_failure, Some(GeoError::InvalidGrid(_))));
        assert!(outcome.resolution_failures.is_empty());
        assert!(outcome.dataset.cover_sets().is_empty());
        let native = &outcome.dataset.resolution_sets()[0];
        assert_eq!(native.dim(), (1, 5));
        assert!(native.is_indexed());
    }

    #[test]
    fn test_hull_failure_keeps_resolution_sets() {
        let (lat, lon) = smooth_grid(5, 6);
        let reader = MemorySwathReader::new("grid.nc", two_level_profile(), lat, lon).unwrap();
        let encoder = PickyEncoder::new(90.0, true);
        let processor = GranuleProcessor::new(&encoder, SidecarConfig::default()).unwrap();

        let outcome = processor.process(&reader).unwrap();
        match &outcome.cover_failure {
            Some(GeoError::EncoderFailure { target, index, .. }) => {
                assert_eq!(target, "native");
                assert_eq!(*index, Some(0));
            }
            other => panic!("unexpected cover failure: {:?}", other),
        }
        assert!(outcome.resolution_failures.is_empty());
        assert_eq!(outcome.dataset.resolution_sets().len(), 2);
        assert!(outcome.dataset.resolution_sets().iter().all(|s| s.is_indexed()));
        assert!(outcome.dataset.validate().is_ok());
    }

    #[test]
    fn test_derived_encoder_failure_is_collected() {
        // Native rows end at 30.2; the derived grid extrapolates to 30.225.
        let (lat, lon) = smooth_grid(5, 6);
        let mut profile = two_level_profile();
        profile.plan.push(ResolutionPlanEntry::derived("third", "native", 3, &[]));
        let reader = MemorySwathReader::new("grid.nc", profile, lat, lon).unwrap();
        let encoder = PickyEncoder::new(30.21, false);

        let processor = GranuleProcessor::new(&encoder, SidecarConfig::default()).unwrap();
        let outcome = processor.process(&reader).unwrap();
        assert_eq!(outcome.resolution_failures.len(), 2);
        assert!(outcome
            .resolution_failures
            .iter()
            .all(|e| matches!(e, GeoError::EncoderFailure { .. })));
        assert_eq!(outcome.dataset.resolution_sets().len(), 1);
        assert!(outcome.cover_failure.is_none());

        let strict = SidecarConfig {
            allow_partial: false,
            ..Default::default()
        };
        let processor = GranuleProcessor::new(&encoder, strict).unwrap();
        assert!(matches!(
            processor.process(&reader),
            Err(GeoError::EncoderFailure { .. })
        ));
    }

    #[test]
    fn test_derived_grid_near_pole_is_kept() {
        let lat = Array2::from_shape_fn((3, 3), |(i, _)| [89.7, 89.8, 89.95][i]);
        let lon = Array2::from_shape_fn((3, 3), |(_, j)| 10.0 + 0.1 * j as f64);
        let mut profile = ProductProfile::generic();
        profile.plan.push(ResolutionPlanEntry::derived("x4", "native", 4, &[]));
        let reader = MemorySwathReader::new("polar.nc", profile, lat, lon).unwrap();
        let encoder = QuadtreeEncoder::new();
        let processor = GranuleProcessor::new(&encoder, SidecarConfig::default()).unwrap();

        let outcome = processor.process(&reader).unwrap();
        assert!(outcome.resolution_failures.is_empty());
        let fine = outcome.dataset.resolution_set("x4").unwrap();
        assert_eq!(fine.dim(), (12, 12));
        assert!(fine.is_indexed());
        assert!(fine.latitude().iter().all(|v| (-90.0..=90.0).contains(v)));
        assert!(outcome.dataset.validate().is_ok());
    }

    #[test]
    fn test_strided_walk_through_processor() {
        let (lat, lon) = smooth_grid(10, 12);
        let corners = [(0usize, 0usize), (0, 11), (9, 11), (9, 0)].map(|p| (lat[p], lon[p]));
        let reader = MemorySwathReader::new("grid.nc", ProductProfile::generic(), lat, lon).unwrap();
        let encoder = QuadtreeEncoder::new();

        let cover_for = |stride: usize| {
            let config = SidecarConfig {
                perimeter_source: PerimeterSource::StridedWalk { stride },
                ..Default::default()
            };
            let processor = GranuleProcessor::new(&encoder, config).unwrap();
            let outcome = processor.process(&reader).unwrap();
            assert!(outcome.is_complete());
            outcome.dataset.cover_set("native").unwrap().clone()
        };

        let coarse = cover_for(5);
        let fine = cover_for(1);
        assert!(!coarse.is_empty());
        assert_eq!(coarse.resolution_level, fine.resolution_level);

        // Corner pixels survive the stride and land inside the cover.
        let level = coarse.resolution_level;
        for (lat, lon) in corners {
            let pixel = encoder.value_from_lat_lon(lat, lon, 27).unwrap();
            let cell = QuadtreeEncoder::truncate(pixel, level);
            assert!(
                coarse.cells.iter().any(|&c| QuadtreeEncoder::contains(c, cell)),
                "corner ({}, {}) not covered",
                lat,
                lon
            );
        }
    }
}
