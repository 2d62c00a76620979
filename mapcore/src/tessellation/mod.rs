//! Tessellation of lines and polygons, and the buffers of a decoded tile.

use std::sync::Arc;

use bytemuck::Pod;
use cgmath::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    coords::TileKey,
    style::{AttributeMap, Technique},
    util::math::Aabb3,
};

pub mod emitter;
pub mod line;
pub mod polygon;

pub(crate) const DEFAULT_TOLERANCE: f32 = 0.02;

/// Vertex buffers index data type.
pub type IndexDataType = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    Line,
    SolidLine,
    Polygon,
    ExtrudedLine,
    ExtrudedPolygon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferElementType {
    Float32,
    Uint32,
}

impl BufferElementType {
    pub fn size(&self) -> usize {
        match self {
            BufferElementType::Float32 | BufferElementType::Uint32 => 4,
        }
    }
}

/// A named, typed vertex or index attribute. The data is stored as raw bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferAttribute {
    pub name: String,
    pub element_type: BufferElementType,
    /// Number of elements per item, e.g. 3 for positions.
    pub item_count: usize,
    pub buffer: Vec<u8>,
}

impl BufferAttribute {
    pub fn from_f32(name: &str, item_count: usize, data: &[f32]) -> Self {
        Self {
            name: name.to_owned(),
            element_type: BufferElementType::Float32,
            item_count,
            buffer: bytemuck::cast_slice(data).to_vec(),
        }
    }

    pub fn from_u32(name: &str, data: &[u32]) -> Self {
        Self {
            name: name.to_owned(),
            element_type: BufferElementType::Uint32,
            item_count: 1,
            buffer: bytemuck::cast_slice(data).to_vec(),
        }
    }

    /// Number of items in this attribute.
    pub fn len(&self) -> usize {
        self.buffer.len() / (self.element_type.size() * self.item_count)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Copies the raw bytes into a typed vector.
    pub fn read<T: Pod>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec(&self.buffer)
    }
}

/// Several attributes stored in one buffer with a fixed `stride` in bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct InterleavedBufferAttribute {
    pub buffer: Vec<u8>,
    pub stride: usize,
    /// `(name, item_count, byte offset)` of each attribute, all elements are `f32`.
    pub attributes: Vec<(String, usize, usize)>,
}

/// A range of the index buffer which is drawn with one technique.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Group {
    pub start: u32,
    pub count: u32,
    pub technique_index: usize,
    pub render_order_offset: i32,
}

impl Group {
    pub fn end(&self) -> u32 {
        self.start + self.count
    }
}

/// The buffers of one technique within a decoded tile.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    pub geometry_type: GeometryType,
    pub vertex_attributes: Vec<BufferAttribute>,
    pub interleaved_vertex_attributes: Option<InterleavedBufferAttribute>,
    pub index: Option<BufferAttribute>,
    pub edge_index: Option<BufferAttribute>,
    pub groups: Vec<Group>,
    /// Ids of the features in this geometry, parallel to `feature_starts`.
    pub feature_ids: Option<Vec<u64>>,
    /// Offset into the index buffer at which the geometry of a feature starts.
    pub feature_starts: Option<Vec<u32>>,
    pub obj_infos: Option<Vec<AttributeMap>>,
}

impl Geometry {
    pub fn attribute(&self, name: &str) -> Option<&BufferAttribute> {
        self.vertex_attributes.iter().find(|a| a.name == name)
    }

    pub fn index_count(&self) -> u32 {
        self.index.as_ref().map_or(0, |index| index.len() as u32)
    }

    pub fn technique_index(&self) -> Option<usize> {
        self.groups.first().map(|group| group.technique_index)
    }

    /// Returns the index range `[start, end)` of every feature, if feature starts were gathered.
    pub fn feature_ranges(&self) -> Option<Vec<(u64, u32, u32)>> {
        let ids = self.feature_ids.as_ref()?;
        let starts = self.feature_starts.as_ref()?;
        let total = self.index_count();
        Some(
            ids.iter()
                .zip(starts.iter())
                .enumerate()
                .map(|(i, (id, start))| {
                    let end = starts.get(i + 1).copied().unwrap_or(total);
                    (*id, *start, end)
                })
                .collect(),
        )
    }

    /// Moves the vertex attributes into one interleaved buffer.
    pub fn interleave(&mut self) {
        let float_attributes: Vec<_> = self
            .vertex_attributes
            .iter()
            .filter(|a| a.element_type == BufferElementType::Float32)
            .collect();
        let Some(vertex_count) = float_attributes.first().map(|a| a.len()) else {
            return;
        };
        if float_attributes.iter().any(|a| a.len() != vertex_count) {
            log::warn!("vertex attributes differ in length, not interleaving");
            return;
        }

        let mut attributes = Vec::new();
        let mut stride = 0;
        for attribute in &float_attributes {
            attributes.push((attribute.name.clone(), attribute.item_count, stride));
            stride += attribute.item_count * 4;
        }
        let sources: Vec<Vec<f32>> = float_attributes.iter().map(|a| a.read()).collect();
        let mut interleaved: Vec<f32> = Vec::with_capacity(vertex_count * stride / 4);
        for vertex in 0..vertex_count {
            for (source, (_, item_count, _)) in sources.iter().zip(attributes.iter()) {
                interleaved.extend_from_slice(
                    &source[vertex * item_count..(vertex + 1) * item_count],
                );
            }
        }

        self.vertex_attributes
            .retain(|a| a.element_type != BufferElementType::Float32);
        self.interleaved_vertex_attributes = Some(InterleavedBufferAttribute {
            buffer: bytemuck::cast_slice(&interleaved).to_vec(),
            stride,
            attributes,
        });
    }
}

/// Labels anchored at points.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextGeometry {
    pub technique_index: usize,
    /// Positions relative to the tile center.
    pub positions: Vec<[f32; 3]>,
    pub texts: Vec<String>,
    pub feature_ids: Vec<Option<u64>>,
    pub obj_infos: Option<Vec<AttributeMap>>,
}

/// Icons with optional labels, anchored at points or at line vertices (line markers).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoiGeometry {
    pub technique_index: usize,
    pub positions: Vec<[f32; 3]>,
    pub texts: Vec<String>,
    pub image_textures: Vec<Option<String>>,
    /// Line markers with the same technique, text and icon share a group within a tile.
    pub shield_group_indices: Vec<Option<u32>>,
    pub feature_ids: Vec<Option<u64>>,
    pub obj_infos: Option<Vec<AttributeMap>>,
}

/// A label which follows a line.
#[derive(Clone, Debug, PartialEq)]
pub struct TextPathGeometry {
    pub technique_index: usize,
    /// Path relative to the tile center.
    pub path: Vec<[f32; 3]>,
    pub text: String,
    pub feature_id: Option<u64>,
    pub obj_info: Option<AttributeMap>,
}

/// A line in tile local coordinates, kept for picking.
#[derive(Clone, Debug, PartialEq)]
pub struct PathGeometry {
    pub path: Vec<[f64; 2]>,
    pub feature_id: Option<u64>,
    pub obj_info: AttributeMap,
}

/// The result of decoding one tile.
#[derive(Clone, Debug)]
pub struct DecodedTile {
    pub tile_key: TileKey,
    /// World space center of the tile, vertex positions are relative to it.
    pub center: Vector3<f64>,
    pub bounding_box: Aabb3,
    pub geometries: Vec<Geometry>,
    pub text_geometries: Vec<TextGeometry>,
    pub poi_geometries: Vec<PoiGeometry>,
    pub text_path_geometries: Vec<TextPathGeometry>,
    pub path_geometries: Vec<PathGeometry>,
    pub techniques: Vec<Arc<Technique>>,
    pub copyright_holder_ids: Vec<String>,
    pub enable_elevation_overlay: bool,
}

impl DecodedTile {
    pub fn technique(&self, index: usize) -> Option<&Arc<Technique>> {
        self.techniques.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
            && self.text_geometries.is_empty()
            && self.poi_geometries.is_empty()
            && self.text_path_geometries.is_empty()
    }
}
