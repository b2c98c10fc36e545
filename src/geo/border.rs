//! Geodesic distance from a point to the US–Mexico border.

use haversine::{distance, Location as HaversineLocation, Units};
use ordered_float::OrderedFloat;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Simplified US–Mexico land border from the Pacific (Tijuana) to the Gulf (Brownsville),
/// as (latitude, longitude) vertices.
pub const US_MEXICO_BORDER: [(f64, f64); 17] = [
    (32.5343, -117.1241),
    (32.7181, -114.7196),
    (32.4945, -114.8130),
    (31.3322, -111.0750),
    (31.3323, -108.2086),
    (31.7838, -108.2086),
    (31.7838, -106.5286),
    (31.3000, -105.9000),
    (29.7698, -104.5449),
    (29.1000, -103.3000),
    (29.8000, -101.4000),
    (29.3625, -100.8968),
    (28.7091, -100.4995),
    (27.5064, -99.5075),
    (26.4000, -99.0000),
    (26.0000, -97.5000),
    (25.9567, -97.1466),
];

/// Maximum spacing of interpolated points along each border segment.
const DENSIFY_STEP_KM: f64 = 5.0;
/// How many planar nearest neighbours are re-ranked by haversine distance.
const CANDIDATES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl RTreeObject for BorderPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.latitude, self.longitude])
    }
}

impl PointDistance for BorderPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.latitude - point[0];
        let dy = self.longitude - point[1];
        dx * dx + dy * dy
    }
}

/// A border polyline indexed for nearest-point lookups.
#[derive(Debug, Clone)]
pub struct BorderLine {
    rtree: RTree<BorderPoint>,
}

impl BorderLine {
    pub fn us_mexico() -> Self {
        Self::from_vertices(&US_MEXICO_BORDER)
    }

    /// Builds the index from (latitude, longitude) vertices. Segments are densified so that
    /// the nearest indexed point is within a few kilometres of the true nearest border point.
    pub fn from_vertices(vertices: &[(f64, f64)]) -> Self {
        let mut points = Vec::new();
        for pair in vertices.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            let length = km_between(start, end);
            let steps = (length / DENSIFY_STEP_KM).ceil().max(1.0) as usize;
            for i in 0..steps {
                let t = i as f64 / steps as f64;
                points.push(BorderPoint {
                    latitude: start.0 + (end.0 - start.0) * t,
                    longitude: start.1 + (end.1 - start.1) * t,
                });
            }
        }
        if let Some(&(latitude, longitude)) = vertices.last() {
            points.push(BorderPoint {
                latitude,
                longitude,
            });
        }
        Self {
            rtree: RTree::bulk_load(points),
        }
    }

    /// Kilometres from (`latitude`, `longitude`) to the closest indexed border point, rounded
    /// to two decimals. `None` if the border is empty.
    ///
    /// Candidates come from planar nearest-neighbour queries at the point and at its
    /// longitude shifted by ±360°, so points across the antimeridian are ranked fairly.
    pub fn distance_km(&self, latitude: f64, longitude: f64) -> Option<f64> {
        [longitude, longitude - 360.0, longitude + 360.0]
            .iter()
            .flat_map(|lon| {
                let query = [latitude, *lon];
                self.rtree
                    .nearest_neighbor_iter(&query)
                    .take(CANDIDATES)
                    .collect::<Vec<_>>()
            })
            .map(|p| OrderedFloat(km_between((latitude, longitude), (p.latitude, p.longitude))))
            .min()
            .map(|d| (d.0 * 100.0).round() / 100.0)
    }
}

fn km_between(a: (f64, f64), b: (f64, f64)) -> f64 {
    distance(
        HaversineLocation {
            latitude: a.0,
            longitude: a.1,
        },
        HaversineLocation {
            latitude: b.0,
            longitude: b.1,
        },
        Units::Kilometers,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_on_border_is_near_zero() {
        let border = BorderLine::us_mexico();
        // El Paso / Ciudad Juárez crossing.
        let d = border.distance_km(31.7838, -106.5286).unwrap();
        assert!(d < 1.0, "distance was {d}");
    }

    #[test]
    fn test_distances_grow_with_remoteness() {
        let border = BorderLine::us_mexico();
        let guatemala = border.distance_km(15.7835, -90.2308).unwrap();
        let colombia = border.distance_km(4.5709, -74.2973).unwrap();
        let india = border.distance_km(20.5937, 78.9629).unwrap();
        assert!(guatemala > 1000.0 && guatemala < 2500.0, "guatemala {guatemala}");
        assert!(colombia > guatemala);
        assert!(india > 10_000.0, "india {india}");
    }

    #[test]
    fn test_rounded_to_two_decimals() {
        let border = BorderLine::us_mexico();
        let d = border.distance_km(19.4326, -99.1332).unwrap();
        assert_eq!((d * 100.0).round() / 100.0, d);
    }

    #[test]
    fn test_empty_border() {
        let border = BorderLine::from_vertices(&[]);
        assert_eq!(border.distance_km(0.0, 0.0), None);
    }
}
