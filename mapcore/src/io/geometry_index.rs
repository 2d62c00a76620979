//! Road picking.
//!
//! Lines rendered with line techniques are kept by the decoder when
//! [`gather_road_segments`](crate::decoder::DecodeOptions::gather_road_segments) is set. They
//! are indexed per tile in an R-tree and queried with a point in tile local coordinates.

use geo::{BoundingRect, EuclideanDistance};
use geo_types::{LineString, Point};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::{style::AttributeMap, tessellation::PathGeometry};

/// A line of a road feature with its bounds.
#[derive(Debug, Clone)]
pub struct IndexedRoad {
    pub bounds: AABB<[f64; 2]>,
    pub exact: LineString<f64>,
    pub feature_id: Option<u64>,
    pub properties: AttributeMap,
}

impl IndexedRoad {
    fn from_path(path: &PathGeometry) -> Option<Self> {
        if path.path.len() < 2 {
            return None;
        }
        let exact: LineString<f64> = path.path.iter().map(|[x, y]| (*x, *y)).collect();
        let rect = exact.bounding_rect()?;

        Some(Self {
            bounds: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            exact,
            feature_id: path.feature_id,
            properties: path.obj_info.clone(),
        })
    }

    pub fn distance(&self, point: &Point<f64>) -> f64 {
        point.euclidean_distance(&self.exact)
    }
}

impl RTreeObject for IndexedRoad {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

impl PointDistance for IndexedRoad {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let distance = self.distance(&Point::new(point[0], point[1]));
        distance * distance
    }
}

/// A road found by [`RoadIndex::pick`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoadHit<'a> {
    pub feature_id: Option<u64>,
    pub properties: &'a AttributeMap,
    /// Distance of the picked point to the road in tile units.
    pub distance: f64,
}

/// Spatial index of the roads of one tile.
pub struct RoadIndex {
    tree: RTree<IndexedRoad>,
}

impl RoadIndex {
    /// Builds the index. Returns `None` if there are no roads to index.
    pub fn build(paths: &[PathGeometry]) -> Option<Self> {
        let roads: Vec<IndexedRoad> = paths.iter().filter_map(IndexedRoad::from_path).collect();
        if roads.is_empty() {
            return None;
        }
        Some(Self {
            tree: RTree::bulk_load(roads),
        })
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Returns the closest road within `tolerance` of `point`, in tile units.
    pub fn pick(&self, point: [f64; 2], tolerance: f64) -> Option<RoadHit<'_>> {
        self.tree
            .nearest_neighbor(&point)
            .map(|road| RoadHit {
                feature_id: road.feature_id,
                properties: &road.properties,
                distance: road.distance(&Point::new(point[0], point[1])),
            })
            .filter(|hit| hit.distance <= tolerance)
    }
}
