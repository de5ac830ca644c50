//! Planar lat/lon geometry used by the quadtree cover

use crate::types::LatLon;

/// Axis-aligned box in (lon, lat) degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Rect {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.min_lon + self.max_lon),
            0.5 * (self.min_lat + self.max_lat),
        )
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn shifted(&self, dlon: f64) -> Self {
        Self::new(self.min_lon + dlon, self.max_lon + dlon, self.min_lat, self.max_lat)
    }
}

/// How a cell relates to a polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Outside,
    Partial,
    Inside,
}

/// Polygon in the plane with longitudes unwrapped to be continuous
#[derive(Debug, Clone)]
pub struct PlanarPolygon {
    vertices: Vec<(f64, f64)>,
    bounds: Rect,
}

impl PlanarPolygon {
    /// Build from a ring, unwrapping longitudes so no edge jumps more than 180°.
    pub fn from_ring(ring: &[LatLon]) -> Self {
        let mut vertices = Vec::with_capacity(ring.len());
        let mut prev_lon: Option<f64> = None;
        for p in ring {
            let mut lon = p.lon;
            if let Some(prev) = prev_lon {
                while lon - prev > 180.0 {
                    lon -= 360.0;
                }
                while lon - prev < -180.0 {
                    lon += 360.0;
                }
            }
            prev_lon = Some(lon);
            vertices.push((lon, p.lat));
        }

        let mut bounds = Rect::new(f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for &(lon, lat) in &vertices {
            bounds.min_lon = bounds.min_lon.min(lon);
            bounds.max_lon = bounds.max_lon.max(lon);
            bounds.min_lat = bounds.min_lat.min(lat);
            bounds.max_lat = bounds.max_lat.max(lat);
        }

        Self { vertices, bounds }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |k| (self.vertices[k], self.vertices[(k + 1) % n]))
    }

    /// Even-odd point-in-polygon test
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let mut inside = false;
        for ((x0, y0), (x1, y1)) in self.edges() {
            if (y0 > lat) != (y1 > lat) {
                let x_cross = x0 + (lat - y0) * (x1 - x0) / (y1 - y0);
                if lon < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Relation of one rect to the polygon, without longitude shifts
    fn relate_once(&self, rect: &Rect) -> Relation {
        if rect.max_lon < self.bounds.min_lon
            || rect.min_lon > self.bounds.max_lon
            || rect.max_lat < self.bounds.min_lat
            || rect.min_lat > self.bounds.max_lat
        {
            return Relation::Outside;
        }
        if self.edges().any(|(a, b)| segment_intersects_rect(a, b, rect)) {
            return Relation::Partial;
        }
        // No edge touches the rect: it is wholly inside or wholly outside.
        let (cx, cy) = rect.center();
        if self.contains(cx, cy) {
            Relation::Inside
        } else {
            Relation::Outside
        }
    }

    /// Relation of a cell to the polygon, also checking the cell one turn
    /// east and west so unwrapped rings crossing the antimeridian match.
    pub fn relate(&self, rect: &Rect) -> Relation {
        let mut result = Relation::Outside;
        for shift in [0.0, 360.0, -360.0] {
            match self.relate_once(&rect.shifted(shift)) {
                Relation::Partial => return Relation::Partial,
                Relation::Inside => result = Relation::Inside,
                Relation::Outside => {}
            }
        }
        result
    }
}

/// Liang-Barsky clip of segment `a`-`b` against a closed rect
pub fn segment_intersects_rect(a: (f64, f64), b: (f64, f64), rect: &Rect) -> bool {
    if rect.contains(a.0, a.1) || rect.contains(b.0, b.1) {
        return true;
    }
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;

    let checks = [
        (-dx, a.0 - rect.min_lon),
        (dx, rect.max_lon - a.0),
        (-dy, a.1 - rect.min_lat),
        (dy, rect.max_lat - a.1),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return false;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return false;
                }
                t1 = t1.min(r);
            }
        }
    }
    t0 <= t1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<LatLon> {
        vec![
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, 10.0),
            LatLon::new(10.0, 10.0),
            LatLon::new(10.0, 0.0),
        ]
    }

    #[test]
    fn test_point_in_polygon() {
        let poly = PlanarPolygon::from_ring(&square());
        assert!(poly.contains(5.0, 5.0));
        assert!(!poly.contains(15.0, 5.0));
        assert!(!poly.contains(5.0, -1.0));
    }

    #[test]
    fn test_segment_rect_intersection() {
        let rect = Rect::new(0.0, 1.0, 0.0, 1.0);
        assert!(segment_intersects_rect((-1.0, 0.5), (2.0, 0.5), &rect));
        assert!(segment_intersects_rect((0.5, 0.5), (3.0, 3.0), &rect));
        assert!(!segment_intersects_rect((-1.0, 2.0), (2.0, 2.0), &rect));
        assert!(!segment_intersects_rect((2.0, -1.0), (2.0, 3.0), &rect));
        // diagonal passing just outside the corner
        assert!(!segment_intersects_rect((1.2, 0.0), (2.0, 0.8), &rect));
    }

    #[test]
    fn test_relation() {
        let poly = PlanarPolygon::from_ring(&square());
        assert_eq!(poly.relate(&Rect::new(2.0, 3.0, 2.0, 3.0)), Relation::Inside);
        assert_eq!(poly.relate(&Rect::new(9.0, 11.0, 2.0, 3.0)), Relation::Partial);
        assert_eq!(poly.relate(&Rect::new(20.0, 30.0, 2.0, 3.0)), Relation::Outside);
        // rect enclosing the whole polygon
        assert_eq!(poly.relate(&Rect::new(-5.0, 15.0, -5.0, 15.0)), Relation::Partial);
    }

    #[test]
    fn test_antimeridian_ring_is_unwrapped() {
        let ring = vec![
            LatLon::new(0.0, 179.0),
            LatLon::new(0.0, -179.0),
            LatLon::new(2.0, -179.0),
            LatLon::new(2.0, 179.0),
        ];
        let poly = PlanarPolygon::from_ring(&ring);
        let bounds = poly.bounds();
        assert!((bounds.max_lon - bounds.min_lon - 2.0).abs() < 1e-12);

        // Cells on both sides of the antimeridian are inside.
        assert_eq!(poly.relate(&Rect::new(179.2, 179.5, 0.5, 1.5)), Relation::Inside);
        assert_eq!(poly.relate(&Rect::new(-179.5, -179.2, 0.5, 1.5)), Relation::Inside);
        assert_eq!(poly.relate(&Rect::new(0.0, 1.0, 0.5, 1.5)), Relation::Outside);
    }
}
