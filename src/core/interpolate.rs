use crate::core::dataset::{allocate_grid, ResolutionSet};
use crate::core::index::run_with_workers;
use crate::types::{DeltaAxis, GeoError, GeoResult, DEFAULT_MERIDIAN_THRESHOLD_DEGREES};
use ndarray::{Array2, Zip};

/// Parameters for deriving a finer geolocation grid
#[derive(Debug, Clone)]
pub struct InterpolationParams {
    /// Integer subdivision of each coarse pixel along both axes
    pub factor: usize,
    /// Largest believable step between adjacent coarse pixels, in degrees
    pub meridian_threshold_degrees: f64,
    /// Worker threads (None = rayon global pool)
    pub worker_threads: Option<usize>,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        Self {
            factor: 2,
            meridian_threshold_degrees: DEFAULT_MERIDIAN_THRESHOLD_DEGREES,
            worker_threads: None,
        }
    }
}

/// Correct a longitude step that crosses the antimeridian.
///
/// A step at least `threshold` degrees long is taken to be a wraparound and
/// replaced by the equivalent short step of magnitude `360 - |delta|`. The
/// sign keeps the direction of travel: `-359.5` becomes `0.5` (eastwards
/// across 180) and `359.5` becomes `-0.5` (westwards).
pub fn unwrap_longitude_delta(delta: f64, threshold: f64) -> f64 {
    if delta.abs() >= threshold {
        delta - 360.0 * delta.signum()
    } else {
        delta
    }
}

/// Bring a longitude back into [-180, 180]
pub fn normalize_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

/// Derives finer geolocation grids from a coarse one by local linear steps
pub struct ResolutionInterpolator {
    params: InterpolationParams,
}

impl ResolutionInterpolator {
    pub fn new(params: InterpolationParams) -> Self {
        Self { params }
    }

    /// Interpolator for a given factor with default threshold
    pub fn with_factor(factor: usize) -> Self {
        Self::new(InterpolationParams {
            factor,
            ..Default::default()
        })
    }

    pub fn params(&self) -> &InterpolationParams {
        &self.params
    }

    /// Derive a complete, unindexed resolution set named `name`
    pub fn derive(
        &self,
        coarse: &ResolutionSet,
        name: &str,
        variable_names: Vec<String>,
    ) -> GeoResult<ResolutionSet> {
        let (latitude, longitude) = self.interpolate(coarse.latitude(), coarse.longitude(), name)?;
        ResolutionSet::new(name, latitude, longitude, variable_names)
    }

    /// Interpolate latitude and longitude onto a grid `factor` times finer.
    ///
    /// `name` labels the grid being produced in errors.
    pub fn interpolate(
        &self,
        latitude: &Array2<f64>,
        longitude: &Array2<f64>,
        name: &str,
    ) -> GeoResult<(Array2<f64>, Array2<f64>)> {
        let k = self.params.factor;
        if k == 0 {
            return Err(GeoError::InvalidConfig(format!(
                "Interpolation factor for '{}' must be positive",
                name
            )));
        }
        let threshold = self.params.meridian_threshold_degrees;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(GeoError::InvalidConfig(format!(
                "Meridian threshold must be positive, got {}",
                threshold
            )));
        }
        if latitude.dim() != longitude.dim() {
            return Err(GeoError::InvalidGrid(format!(
                "Latitude {:?} and longitude {:?} shapes differ for '{}'",
                latitude.dim(),
                longitude.dim(),
                name
            )));
        }

        let (rows, cols) = latitude.dim();
        if rows == 0 || cols == 0 {
            return Err(GeoError::InvalidGrid(format!("Empty coarse grid for '{}'", name)));
        }
        let fine_rows = rows.checked_mul(k).ok_or_else(|| GeoError::AllocationFailure {
            target: name.to_string(),
            elements: usize::MAX,
        })?;
        let fine_cols = cols.checked_mul(k).ok_or_else(|| GeoError::AllocationFailure {
            target: name.to_string(),
            elements: usize::MAX,
        })?;

        log::info!(
            "Interpolating '{}': {}x{} -> {}x{} (factor {})",
            name, rows, cols, fine_rows, fine_cols, k
        );

        let (lat_delta, lon_delta) = self.coarse_deltas(latitude, longitude, name)?;

        let mut lat_out = allocate_grid(name, (fine_rows, fine_cols), 0.0f64)?;
        let mut lon_out = allocate_grid(name, (fine_rows, fine_cols), 0.0f64)?;
        let kf = k as f64;

        let fill_row = |i: usize,
                        mut lat_row: ndarray::ArrayViewMut1<f64>,
                        mut lon_row: ndarray::ArrayViewMut1<f64>| {
            let m = i / k;
            let row_offset = (i % k) as f64 / kf;
            for j in 0..fine_cols {
                let n = j / k;
                let col_offset = (j % k) as f64 / kf;
                // Extrapolation past the last coarse row can overshoot a pole.
                lat_row[j] = (latitude[[m, n]] + row_offset * lat_delta[[m, n]]).clamp(-90.0, 90.0);
                lon_row[j] = normalize_longitude(longitude[[m, n]] + col_offset * lon_delta[[m, n]]);
            }
        };

        run_with_workers(self.params.worker_threads, || {
            #[cfg(feature = "parallel")]
            {
                Zip::indexed(lat_out.rows_mut())
                    .and(lon_out.rows_mut())
                    .par_for_each(|i, lat_row, lon_row| fill_row(i, lat_row, lon_row));
            }

            #[cfg(not(feature = "parallel"))]
            {
                Zip::indexed(lat_out.rows_mut())
                    .and(lon_out.rows_mut())
                    .for_each(|i, lat_row, lon_row| fill_row(i, lat_row, lon_row));
            }
        })?;

        log::debug!("Interpolation of '{}' complete", name);
        Ok((lat_out, lon_out))
    }

    /// Signed per-coarse-cell steps along rows (latitude) and columns
    /// (longitude), validated against the threshold.
    fn coarse_deltas(
        &self,
        latitude: &Array2<f64>,
        longitude: &Array2<f64>,
        name: &str,
    ) -> GeoResult<(Array2<f64>, Array2<f64>)> {
        let (rows, _) = latitude.dim();

        let row_results: Vec<GeoResult<Vec<(f64, f64)>>> =
            run_with_workers(self.params.worker_threads, || {
                #[cfg(feature = "parallel")]
                {
                    use rayon::prelude::*;
                    (0..rows)
                        .into_par_iter()
                        .map(|m| self.row_deltas(latitude, longitude, m, name))
                        .collect()
                }

                #[cfg(not(feature = "parallel"))]
                {
                    (0..rows)
                        .map(|m| self.row_deltas(latitude, longitude, m, name))
                        .collect()
                }
            })?;

        let (_, cols) = latitude.dim();
        let mut lat_delta = allocate_grid(name, (rows, cols), 0.0f64)?;
        let mut lon_delta = allocate_grid(name, (rows, cols), 0.0f64)?;

        // Row order, so the reported pixel does not depend on scheduling.
        for (m, result) in row_results.into_iter().enumerate() {
            for (n, (dlat, dlon)) in result?.into_iter().enumerate() {
                lat_delta[[m, n]] = dlat;
                lon_delta[[m, n]] = dlon;
            }
        }
        Ok((lat_delta, lon_delta))
    }

    fn row_deltas(
        &self,
        latitude: &Array2<f64>,
        longitude: &Array2<f64>,
        m: usize,
        name: &str,
    ) -> GeoResult<Vec<(f64, f64)>> {
        let (rows, cols) = latitude.dim();
        let k = self.params.factor;
        let threshold = self.params.meridian_threshold_degrees;
        let mut deltas = Vec::with_capacity(cols);

        for n in 0..cols {
            let lat_delta = if rows == 1 {
                0.0
            } else if m > 0 {
                latitude[[m, n]] - latitude[[m - 1, n]]
            } else {
                latitude[[m + 1, n]] - latitude[[m, n]]
            };

            let raw_lon_delta = if cols == 1 {
                0.0
            } else if n > 0 {
                longitude[[m, n]] - longitude[[m, n - 1]]
            } else {
                longitude[[m, n + 1]] - longitude[[m, n]]
            };
            let lon_delta = unwrap_longitude_delta(raw_lon_delta, threshold);

            let failure = |axis: DeltaAxis, delta: f64| GeoError::GeometryInconsistency {
                resolution: name.to_string(),
                coarse_pixel: (m, n),
                fine_pixel: (m * k, n * k),
                axis,
                delta,
                threshold,
            };

            // NaN deltas fail too, hence the negated comparisons.
            if !(lon_delta.abs() < threshold) {
                return Err(failure(DeltaAxis::Longitude, raw_lon_delta));
            }
            if !(lat_delta.abs() < threshold) {
                return Err(failure(DeltaAxis::Latitude, lat_delta));
            }
            deltas.push((lat_delta, lon_delta));
        }
        Ok(deltas)
    }
}
