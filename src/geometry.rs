//! Random test-geometry generation for spatial queries.

use geo::GeodesicArea;
use geo_types::{Coord, LineString, Polygon};
use rand::Rng;
use serde_json::{json, Value};

/// Lon/lat bounding box of a layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    /// Fallback box over the continental US, used when a layer does not report its extent.
    pub fn conus() -> Self {
        Self {
            xmin: -120.0,
            ymin: 32.0,
            xmax: -82.0,
            ymax: 46.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }
}

/// Generate a random polygon with `vertices` corners inside the extent.
///
/// Picks one anchor point uniformly in the extent, then scatters the corners
/// around it within a quarter of the extent width, so the polygon covers very
/// roughly a sixteenth of the layer.
pub fn random_polygon<R: Rng>(rng: &mut R, extent: &Extent, vertices: usize) -> Polygon<f64> {
    let anchor = Coord {
        x: rng.random_range(extent.xmin..extent.xmax),
        y: rng.random_range(extent.ymin..extent.ymax),
    };
    let radius = (extent.width() / 4.0).abs();

    let mut ring: Vec<Coord<f64>> = (0..vertices)
        .map(|_| Coord {
            x: anchor.x + rng.random_range(-radius..radius),
            y: anchor.y + rng.random_range(-radius..radius),
        })
        .collect();

    // Close the ring
    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }

    Polygon::new(LineString::new(ring), vec![])
}

/// Encode a polygon's exterior ring as Esri geometry JSON (wkid 4326).
pub fn to_esri_json(polygon: &Polygon<f64>) -> Value {
    let ring: Vec<[f64; 2]> = polygon
        .exterior()
        .coords()
        .map(|c| [c.x, c.y])
        .collect();

    json!({
        "spatialReference": { "wkid": 4326 },
        "rings": [ring],
    })
}

/// WGS84 geodesic area of a polygon, in square kilometers.
pub fn geodesic_area_km2(polygon: &Polygon<f64>) -> f64 {
    polygon.geodesic_area_unsigned() / 1.0e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_random_polygon_ring_is_closed() {
        let mut rng = StdRng::seed_from_u64(7);
        let polygon = random_polygon(&mut rng, &Extent::conus(), 3);

        let ring: Vec<Coord<f64>> = polygon.exterior().coords().copied().collect();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_random_polygon_vertex_count_grows() {
        let mut rng = StdRng::seed_from_u64(7);
        let polygon = random_polygon(&mut rng, &Extent::conus(), 6);

        // 6 distinct corners plus the closing coordinate
        assert_eq!(polygon.exterior().coords().count(), 7);
    }

    #[test]
    fn test_esri_json_shape() {
        let mut rng = StdRng::seed_from_u64(42);
        let polygon = random_polygon(&mut rng, &Extent::conus(), 3);
        let doc = to_esri_json(&polygon);

        assert_eq!(doc["spatialReference"]["wkid"], 4326);
        let rings = doc["rings"].as_array().expect("rings array");
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].as_array().expect("ring").len(), 4);
    }

    #[test]
    fn test_geodesic_area_of_unit_square() {
        // A 1x1 degree square at the equator covers roughly 12,300 km^2
        let ring = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 0.0, y: 0.0 },
        ];
        let polygon = Polygon::new(LineString::new(ring), vec![]);

        let area = geodesic_area_km2(&polygon);
        assert!(area > 12_000.0 && area < 12_700.0, "area = {}", area);
    }
}
