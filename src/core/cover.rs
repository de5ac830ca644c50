use crate::core::dataset::CoverSet;
use crate::encoder::SpatialEncoder;
use crate::types::{CoverLevelPolicy, GeoError, GeoResult, LatLon};

/// Turns a perimeter ring into an encoded footprint cover
pub struct CoverBuilder<'a, E: SpatialEncoder + ?Sized> {
    encoder: &'a E,
    size_warning: Option<usize>,
}

impl<'a, E: SpatialEncoder + ?Sized> CoverBuilder<'a, E> {
    pub fn new(encoder: &'a E) -> Self {
        Self {
            encoder,
            size_warning: None,
        }
    }

    /// Warn when a cover grows beyond `cells`
    pub fn with_size_warning(mut self, cells: Option<usize>) -> Self {
        self.size_warning = cells;
        self
    }

    /// Level a policy resolves to
    pub fn resolve_level(policy: CoverLevelPolicy, observed_finest_level: u8) -> u8 {
        match policy {
            CoverLevelPolicy::Auto => observed_finest_level,
            CoverLevelPolicy::Explicit(level) => level,
        }
    }

    pub fn build_cover(
        &self,
        name: &str,
        perimeter: &[LatLon],
        policy: CoverLevelPolicy,
        observed_finest_level: u8,
    ) -> GeoResult<CoverSet> {
        let level = Self::resolve_level(policy, observed_finest_level);
        if level > self.encoder.max_level() {
            return Err(GeoError::InvalidConfig(format!(
                "Cover level {} for '{}' exceeds encoder maximum {}",
                level,
                name,
                self.encoder.max_level()
            )));
        }

        log::debug!(
            "Building cover '{}' from {} perimeter vertices at level {} ({})",
            name,
            perimeter.len(),
            level,
            policy
        );

        let cells = self
            .encoder
            .non_convex_hull(perimeter, level)
            .map_err(|source| GeoError::EncoderFailure {
                target: name.to_string(),
                index: source.position,
                source,
            })?;

        log::info!("Cover '{}' at level {}: {} cells", name, level, cells.len());
        if let Some(limit) = self.size_warning {
            if cells.len() > limit {
                log::warn!(
                    "Cover '{}' has {} cells (warning threshold {}); consider a coarser cover level",
                    name,
                    cells.len(),
                    limit
                );
            }
        }

        Ok(CoverSet {
            name: name.to_string(),
            cells,
            resolution_level: level,
        })
    }
}
