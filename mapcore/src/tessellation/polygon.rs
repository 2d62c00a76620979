//! Triangulation of polygons by ear clipping.

use earcutr::earcut;
use thiserror::Error;

use crate::{coords::EXTENT, tessellation::IndexDataType, util::math::signed_ring_area};

#[derive(Error, Debug, PartialEq)]
pub enum TriangulationError {
    #[error("ring has less than three distinct vertices")]
    Degenerate,
    #[error("ear clipping failed: {0}")]
    EarClipping(String),
}

/// A triangulated polygon in tile local coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Footprint {
    /// Vertices of the outer ring followed by the vertices of the holes.
    pub vertices: Vec<[f64; 2]>,
    pub triangles: Vec<IndexDataType>,
    /// For every vertex the following vertex of its ring, if the edge between both is an outline
    /// edge. Edges lying on the tile border are excluded, the neighbour tile has the same edge.
    pub next_edge: Vec<Option<IndexDataType>>,
    /// Like `next_edge`, but border edges are included when boundary walls are forced.
    pub next_wall: Vec<Option<IndexDataType>>,
}

/// Removes the closing vertex of a ring if it repeats the first one.
pub fn open_ring(mut ring: Vec<[f64; 2]>) -> Vec<[f64; 2]> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Groups a flat list of rings into polygons. A ring with the winding of the first ring starts
/// a new polygon, a ring with the inverse winding is a hole of the current polygon.
///
/// Degenerate rings are logged and skipped.
pub fn group_rings(rings: Vec<Vec<[f64; 2]>>) -> Vec<Vec<Vec<[f64; 2]>>> {
    let mut polygons: Vec<Vec<Vec<[f64; 2]>>> = Vec::new();
    let mut outer_is_positive = None;

    for ring in rings {
        let ring = open_ring(ring);
        let area = signed_ring_area(&ring);
        if ring.len() < 3 || area == 0.0 {
            log::warn!("skipping degenerate ring with {} vertices", ring.len());
            continue;
        }

        let is_positive = area > 0.0;
        let outer = *outer_is_positive.get_or_insert(is_positive);
        if is_positive == outer {
            polygons.push(vec![ring]);
        } else if let Some(polygon) = polygons.last_mut() {
            polygon.push(ring);
        } else {
            log::warn!("skipping hole without outer ring");
        }
    }

    polygons
}

fn is_border_edge(a: [f64; 2], b: [f64; 2]) -> bool {
    let on_vertical = a[0] == b[0] && (a[0] <= 0.0 || a[0] >= EXTENT);
    let on_horizontal = a[1] == b[1] && (a[1] <= 0.0 || a[1] >= EXTENT);
    on_vertical || on_horizontal
}

/// Triangulates a polygon given as outer ring followed by its holes.
pub fn triangulate(
    polygon: &[Vec<[f64; 2]>],
    boundary_walls: bool,
) -> Result<Footprint, TriangulationError> {
    let Some(outer) = polygon.first() else {
        return Err(TriangulationError::Degenerate);
    };
    if outer.len() < 3 {
        return Err(TriangulationError::Degenerate);
    }

    let mut footprint = Footprint::default();
    let mut data = Vec::new();
    let mut hole_indices = Vec::new();

    for (ring_index, ring) in polygon.iter().enumerate() {
        if ring_index > 0 {
            hole_indices.push(footprint.vertices.len());
        }
        let base = footprint.vertices.len() as IndexDataType;
        for (i, vertex) in ring.iter().enumerate() {
            let next = (i + 1) % ring.len();
            let next_index = base + next as IndexDataType;
            let on_border = is_border_edge(*vertex, ring[next]);
            footprint
                .next_edge
                .push((!on_border).then_some(next_index));
            footprint
                .next_wall
                .push((!on_border || boundary_walls).then_some(next_index));
            footprint.vertices.push(*vertex);
            data.extend_from_slice(vertex);
        }
    }

    let triangles = earcut(&data, &hole_indices, 2)
        .map_err(|e| TriangulationError::EarClipping(format!("{e:?}")))?;
    if triangles.is_empty() {
        return Err(TriangulationError::Degenerate);
    }
    footprint.triangles = triangles
        .into_iter()
        .map(|i| i as IndexDataType)
        .collect();
    Ok(footprint)
}
