use crate::core::dataset::ResolutionSet;
use crate::types::{GeoError, GeoResult, LatLon, PerimeterRing, PerimeterSource};
use ndarray::Array2;

/// Builds the closed boundary ring a cover is computed from
#[derive(Debug, Clone, Copy, Default)]
pub struct PerimeterBuilder {
    source: PerimeterSource,
}

impl PerimeterBuilder {
    pub fn new(source: PerimeterSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> PerimeterSource {
        self.source
    }

    /// Ring for cover `cover` of `set`.
    ///
    /// `read_corners` is only called for `BoundaryMetadata`; any failure it
    /// reports surfaces as `BoundaryMetadataUnavailable` and is not retried.
    pub fn build<F>(&self, cover: &str, set: &ResolutionSet, read_corners: F) -> GeoResult<PerimeterRing>
    where
        F: FnOnce() -> GeoResult<[LatLon; 4]>,
    {
        match self.source {
            PerimeterSource::StridedWalk { stride } => {
                Self::strided_walk(set.latitude(), set.longitude(), stride)
            }
            PerimeterSource::BoundaryMetadata => match read_corners() {
                Ok(corners) => {
                    log::debug!("Using boundary metadata corners for cover '{}'", cover);
                    Ok(Self::from_corners(&corners))
                }
                Err(GeoError::BoundaryMetadataUnavailable { reason, .. }) => {
                    Err(GeoError::BoundaryMetadataUnavailable {
                        cover: cover.to_string(),
                        reason,
                    })
                }
                Err(e) => Err(GeoError::BoundaryMetadataUnavailable {
                    cover: cover.to_string(),
                    reason: e.to_string(),
                }),
            },
        }
    }

    /// Walk the edge of a lat/lon grid, sampling every `stride`-th cell
    pub fn strided_walk(
        latitude: &Array2<f64>,
        longitude: &Array2<f64>,
        stride: usize,
    ) -> GeoResult<PerimeterRing> {
        if latitude.dim() != longitude.dim() {
            return Err(GeoError::InvalidGrid(format!(
                "Latitude {:?} and longitude {:?} shapes differ",
                latitude.dim(),
                longitude.dim()
            )));
        }
        let (rows, cols) = latitude.dim();
        let ring: PerimeterRing = Self::walk_indices(rows, cols, stride)?
            .into_iter()
            .map(|(i, j)| LatLon::new(latitude[[i, j]], longitude[[i, j]]))
            .collect();

        log::debug!(
            "Strided walk over {}x{} grid with stride {}: {} vertices",
            rows,
            cols,
            stride,
            ring.len()
        );
        Ok(ring)
    }

    /// Grid positions visited by the strided walk, in ring order
    pub fn walk_indices(rows: usize, cols: usize, stride: usize) -> GeoResult<Vec<(usize, usize)>> {
        if rows < 2 || cols < 2 {
            return Err(GeoError::InvalidGrid(format!(
                "Perimeter walk needs at least a 2x2 grid, got {}x{}",
                rows, cols
            )));
        }
        if stride == 0 {
            return Err(GeoError::InvalidConfig(
                "Perimeter stride must be positive".to_string(),
            ));
        }

        let bottom: Vec<(usize, usize)> = (0..cols).map(|j| (0, j)).collect();
        let right: Vec<(usize, usize)> = (1..rows).map(|i| (i, cols - 1)).collect();
        let top: Vec<(usize, usize)> = (0..cols - 1).rev().map(|j| (rows - 1, j)).collect();
        let left: Vec<(usize, usize)> = (1..rows - 1).rev().map(|i| (i, 0)).collect();

        let mut ring = Vec::with_capacity(2 * (rows + cols) / stride + 4);
        for segment in [bottom, right, top, left] {
            sample_segment(&segment, stride, &mut ring);
        }
        Ok(ring)
    }

    /// Four-vertex ring from boundary metadata, kept in the supplied order
    pub fn from_corners(corners: &[LatLon; 4]) -> PerimeterRing {
        corners.to_vec()
    }
}

fn sample_segment(segment: &[(usize, usize)], stride: usize, ring: &mut Vec<(usize, usize)>) {
    let Some(&last) = segment.last() else {
        return;
    };
    ring.extend(segment.iter().step_by(stride).copied());
    if (segment.len() - 1) % stride != 0 {
        ring.push(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn corners_of(rows: usize, cols: usize) -> [(usize, usize); 4] {
        [(0, 0), (0, cols - 1), (rows - 1, cols - 1), (rows - 1, 0)]
    }

    #[test]
    fn test_walk_order_on_4x4() {
        let ring = PerimeterBuilder::walk_indices(4, 4, 1).unwrap();
        let expected = vec![
            (0, 0), (0, 1), (0, 2), (0, 3),
            (1, 3), (2, 3), (3, 3),
            (3, 2), (3, 1), (3, 0),
            (2, 0), (1, 0),
        ];
        assert_eq!(ring, expected);
    }

    #[test]
    fn test_unit_stride_vertex_count() {
        for (rows, cols) in [(2, 2), (2, 5), (7, 3), (406, 270)] {
            let ring = PerimeterBuilder::walk_indices(rows, cols, 1).unwrap();
            assert_eq!(ring.len(), 2 * rows + 2 * cols - 4);
        }
    }

    #[test]
    fn test_strided_walk_keeps_corners_without_duplicates() {
        for stride in [1, 2, 3, 5, 10, 50] {
            let ring = PerimeterBuilder::walk_indices(23, 11, stride).unwrap();
            for corner in corners_of(23, 11) {
                assert!(ring.contains(&corner), "stride {} lost corner {:?}", stride, corner);
            }
            let unique: HashSet<_> = ring.iter().collect();
            assert_eq!(unique.len(), ring.len(), "stride {} repeated a cell", stride);
        }
    }

    #[test]
    fn test_stride_samples_segment_ends() {
        // bottom row of 6 with stride 2 -> 0, 2, 4 then the last cell 5
        let ring = PerimeterBuilder::walk_indices(2, 6, 2).unwrap();
        assert_eq!(&ring[..4], &[(0, 0), (0, 2), (0, 4), (0, 5)]);
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        assert!(PerimeterBuilder::walk_indices(1, 5, 1).is_err());
        assert!(PerimeterBuilder::walk_indices(5, 1, 1).is_err());
        assert!(matches!(
            PerimeterBuilder::walk_indices(5, 5, 0),
            Err(GeoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_walk_reads_coordinates() {
        let lat = Array2::from_shape_fn((3, 3), |(i, _)| 10.0 + i as f64);
        let lon = Array2::from_shape_fn((3, 3), |(_, j)| 20.0 + j as f64);
        let ring = PerimeterBuilder::strided_walk(&lat, &lon, 1).unwrap();
        assert_eq!(ring.len(), 8);
        assert_eq!(ring[0], LatLon::new(10.0, 20.0));
        assert_eq!(ring[2], LatLon::new(10.0, 22.0));
        assert_eq!(ring[4], LatLon::new(12.0, 22.0));
        assert_eq!(ring[7], LatLon::new(11.0, 20.0));
    }

    #[test]
    fn test_corner_ring_keeps_supplied_order() {
        let corners = [
            LatLon::new(1.0, 1.0),
            LatLon::new(1.0, 2.0),
            LatLon::new(2.0, 2.0),
            LatLon::new(2.0, 1.0),
        ];
        assert_eq!(PerimeterBuilder::from_corners(&corners), corners.to_vec());
    }

    #[test]
    fn test_missing_metadata_names_the_cover() {
        let lat = Array2::from_elem((2, 2), 0.0);
        let lon = Array2::from_elem((2, 2), 0.0);
        let set = ResolutionSet::new("5km", lat, lon, vec![]).unwrap();
        let builder = PerimeterBuilder::new(PerimeterSource::BoundaryMetadata);

        let err = builder
            .build("5km", &set, || Err(GeoError::NotFound("ArchiveMetadata.0".to_string())))
            .unwrap_err();
        match err {
            GeoError::BoundaryMetadataUnavailable { cover, reason } => {
                assert_eq!(cover, "5km");
                assert!(reason.contains("ArchiveMetadata.0"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_walk_ignores_corner_reader() {
        let lat = Array2::from_elem((2, 2), 0.0);
        let lon = Array2::from_elem((2, 2), 0.0);
        let set = ResolutionSet::new("native", lat, lon, vec![]).unwrap();
        let builder = PerimeterBuilder::new(PerimeterSource::StridedWalk { stride: 1 });
        let ring = builder
            .build("native", &set, || panic!("corners must not be read"))
            .unwrap();
        assert_eq!(ring.len(), 4);
    }
}
