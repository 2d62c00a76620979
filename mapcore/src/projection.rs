//! Projection of tile local coordinates into world space.

use cgmath::{InnerSpace, Vector3};
use serde::{Deserialize, Serialize};

use crate::coords::{LatLon, TileKey, EARTH_RADIUS, EXTENT};

/// Maximum edge length in tile units at level 0 before a ring is subdivided on the sphere.
const SPHERE_MAX_EDGE_AT_ROOT: f64 = EXTENT / 64.0;

/// The projection of the map scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Projection {
    /// Planar web-mercator, world units are mercator meters.
    #[default]
    Mercator,
    /// Earth centered, earth fixed coordinates on a sphere.
    Sphere,
}

impl Projection {
    pub fn is_spherical(&self) -> bool {
        matches!(self, Projection::Sphere)
    }

    /// Projects the tile local point `(x, y)` at `altitude` meters into world space.
    pub fn project_tile_point(&self, key: &TileKey, x: f64, y: f64, altitude: f64) -> Vector3<f64> {
        let bounds = key.world_bounds();
        let size = key.size_in_meters();
        let mx = bounds.min.x + x / EXTENT * size;
        let my = bounds.max.y - y / EXTENT * size;
        match self {
            Projection::Mercator => Vector3::new(mx, my, altitude),
            Projection::Sphere => {
                let geo = LatLon::from_mercator(mx, my);
                let (lat, lon) = (geo.latitude.to_radians(), geo.longitude.to_radians());
                let radius = EARTH_RADIUS + altitude;
                Vector3::new(
                    radius * lat.cos() * lon.cos(),
                    radius * lat.cos() * lon.sin(),
                    radius * lat.sin(),
                )
            }
        }
    }

    /// Direction in which heights are extruded at `world_point`.
    pub fn surface_normal(&self, world_point: Vector3<f64>) -> Vector3<f64> {
        match self {
            Projection::Mercator => Vector3::unit_z(),
            Projection::Sphere => world_point.normalize(),
        }
    }

    /// Factor which converts meters at the center of `key` into world units. Mercator stretches
    /// distances by `1 / cos(latitude)`.
    pub fn scale_factor(&self, key: &TileKey) -> f64 {
        match self {
            Projection::Mercator => 1.0 / key.geo_center().latitude.to_radians().cos(),
            Projection::Sphere => 1.0,
        }
    }

    /// Width of the world in world units, used to shift wrap-around tiles.
    pub fn world_width(&self) -> Option<f64> {
        match self {
            Projection::Mercator => Some(crate::coords::EQUATORIAL_CIRCUMFERENCE),
            Projection::Sphere => None,
        }
    }

    /// Subdivides a ring or line so that straight edges follow the curvature of the sphere.
    /// Planar projections return the input unchanged.
    pub fn subdivide(&self, key: &TileKey, points: &[[f64; 2]], closed: bool) -> Vec<[f64; 2]> {
        if !self.is_spherical() || points.len() < 2 {
            return points.to_vec();
        }

        let max_edge = SPHERE_MAX_EDGE_AT_ROOT * key.level().tiles_per_axis() as f64;
        let mut result = Vec::with_capacity(points.len());
        let segments = if closed {
            points.len()
        } else {
            points.len() - 1
        };
        for i in 0..segments {
            let [x0, y0] = points[i];
            let [x1, y1] = points[(i + 1) % points.len()];
            result.push([x0, y0]);
            let length = (x1 - x0).hypot(y1 - y0);
            let steps = (length / max_edge).ceil() as usize;
            for step in 1..steps {
                let t = step as f64 / steps as f64;
                result.push([x0 + (x1 - x0) * t, y0 + (y1 - y0) * t]);
            }
        }
        if !closed {
            result.push(points[points.len() - 1]);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        coords::{TileKey, ZoomLevel, EARTH_RADIUS, EXTENT},
        projection::Projection,
    };

    #[test]
    fn mercator_tile_corners() {
        let key = TileKey::new(0, 1, ZoomLevel::new(1)).unwrap();
        let bounds = key.world_bounds();
        let top_left = Projection::Mercator.project_tile_point(&key, 0.0, 0.0, 0.0);
        assert!((top_left.x - bounds.min.x).abs() < 1e-6);
        assert!((top_left.y - bounds.max.y).abs() < 1e-6);
        let bottom_right = Projection::Mercator.project_tile_point(&key, EXTENT, EXTENT, 5.0);
        assert!((bottom_right.x - bounds.max.x).abs() < 1e-6);
        assert!((bottom_right.y - bounds.min.y).abs() < 1e-6);
        assert_eq!(bottom_right.z, 5.0);
    }

    #[test]
    fn sphere_points_lie_on_radius() {
        let key = TileKey::new(3, 5, ZoomLevel::new(3)).unwrap();
        let p = Projection::Sphere.project_tile_point(&key, 100.0, 200.0, 0.0);
        let length = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
        assert!((length - EARTH_RADIUS).abs() < 1e-3);
    }

    #[test]
    fn subdivision_only_on_sphere() {
        let key = TileKey::root();
        let line = [[0.0, 0.0], [EXTENT, 0.0]];
        assert_eq!(Projection::Mercator.subdivide(&key, &line, false).len(), 2);
        let subdivided = Projection::Sphere.subdivide(&key, &line, false);
        assert_eq!(subdivided.len(), 65);
        assert_eq!(subdivided.first(), Some(&[0.0, 0.0]));
        assert_eq!(subdivided.last(), Some(&[EXTENT, 0.0]));
    }
}
