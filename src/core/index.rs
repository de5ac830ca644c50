use crate::core::dataset::ResolutionSet;
use crate::encoder::SpatialEncoder;
use crate::types::{GeoError, GeoResult, IndexValue, DEFAULT_INDEX_LEVEL};
use ndarray::{ArrayView1, ArrayViewMut1, Axis};

/// Run `f` on a dedicated pool of `threads` workers, or on the global pool.
pub(crate) fn run_with_workers<R, F>(threads: Option<usize>, f: F) -> GeoResult<R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match threads {
        None => Ok(f()),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| GeoError::ThreadPool(e.to_string()))?;
            Ok(pool.install(f))
        }
    }
}

/// Parameters for per-pixel index assignment
#[derive(Debug, Clone)]
pub struct IndexParams {
    /// Level each pixel is encoded at before resolution adaptation
    pub level: u8,
    /// Worker threads (None = rayon global pool)
    pub worker_threads: Option<usize>,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            level: DEFAULT_INDEX_LEVEL,
            worker_threads: None,
        }
    }
}

/// Encodes every pixel of a resolution set and tracks the finest level seen
pub struct SpatialIndexAssigner<'a, E: SpatialEncoder + ?Sized> {
    encoder: &'a E,
    params: IndexParams,
}

impl<'a, E: SpatialEncoder + ?Sized> SpatialIndexAssigner<'a, E> {
    pub fn new(encoder: &'a E, params: IndexParams) -> Self {
        Self { encoder, params }
    }

    /// Populate `set`'s index values in place.
    ///
    /// Returns the maximum resolution level over all pixels. Rows are
    /// independent; errors report the first failing pixel in row-major order.
    pub fn assign(&self, set: &mut ResolutionSet) -> GeoResult<u8> {
        if self.params.level > self.encoder.max_level() {
            return Err(GeoError::InvalidConfig(format!(
                "Index level {} exceeds encoder maximum {}",
                self.params.level,
                self.encoder.max_level()
            )));
        }

        let name = set.name().to_string();
        let (size_i, size_j) = set.dim();
        log::info!(
            "Assigning spatial index to '{}' ({}x{}) at level {}",
            name, size_i, size_j, self.params.level
        );

        let (latitude, longitude, index_values) = set.index_parts_mut();

        let row_levels: Vec<GeoResult<u8>> = run_with_workers(self.params.worker_threads, || {
            #[cfg(feature = "parallel")]
            {
                use rayon::prelude::*;
                index_values
                    .axis_iter_mut(Axis(0))
                    .into_par_iter()
                    .enumerate()
                    .map(|(i, row)| {
                        self.assign_row(&name, i, latitude.row(i), longitude.row(i), row)
                    })
                    .collect()
            }

            #[cfg(not(feature = "parallel"))]
            {
                index_values
                    .axis_iter_mut(Axis(0))
                    .enumerate()
                    .map(|(i, row)| {
                        self.assign_row(&name, i, latitude.row(i), longitude.row(i), row)
                    })
                    .collect()
            }
        })?;

        let mut finest = 0u8;
        for level in row_levels {
            finest = finest.max(level?);
        }

        set.set_finest_level(finest);
        log::info!("Finest resolution level observed in '{}': {}", name, finest);
        Ok(finest)
    }

    fn assign_row(
        &self,
        name: &str,
        i: usize,
        latitude: ArrayView1<f64>,
        longitude: ArrayView1<f64>,
        mut out: ArrayViewMut1<IndexValue>,
    ) -> GeoResult<u8> {
        let size_j = out.len();
        let mut values: Vec<IndexValue> = Vec::with_capacity(size_j);

        for (j, (&lat, &lon)) in latitude.iter().zip(longitude.iter()).enumerate() {
            let value = self
                .encoder
                .value_from_lat_lon(lat, lon, self.params.level)
                .map_err(|source| GeoError::EncoderFailure {
                    target: name.to_string(),
                    index: Some(i * size_j + j),
                    source,
                })?;
            values.push(value);
        }

        self.encoder
            .adapt_resolution(&mut values)
            .map_err(|source| GeoError::EncoderFailure {
                target: name.to_string(),
                index: source.position.map(|j| i * size_j + j),
                source,
            })?;

        let mut finest = 0u8;
        for (dst, value) in out.iter_mut().zip(values) {
            finest = finest.max(self.encoder.resolution_level(value));
            *dst = value;
        }
        Ok(finest)
    }
}
