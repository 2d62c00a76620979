//! Per frame selection of the objects of tiles, and their draw order.

use std::sync::Arc;

use cgmath::Vector3;

use crate::{
    coords::TileKey,
    style::{Env, Technique},
    tessellation::{Geometry, GeometryType, Group},
    text::render_order::{compose_render_order, RenderOrder},
};

pub mod groups;
pub mod renderer;

/// Enabled state and zoom range of a technique which does not depend on the camera or on the
/// feature state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticVisibility {
    pub enabled: bool,
    pub min_zoom_level: f64,
    /// Exclusive.
    pub max_zoom_level: f64,
}

impl StaticVisibility {
    pub fn is_visible_at(&self, zoom_level: f64) -> bool {
        self.enabled && zoom_level >= self.min_zoom_level && zoom_level < self.max_zoom_level
    }
}

/// A renderable object of a tile. Every geometry of a decoded tile becomes one object.
#[derive(Clone, Debug)]
pub struct TileObject {
    /// Index of the object within its tile.
    pub object_id: u32,
    pub geometry_index: usize,
    pub geometry_type: GeometryType,
    pub technique: Arc<Technique>,
    pub render_order: RenderOrder,
    pub program_id: u32,
    pub material_id: u32,
    pub transparent: bool,
    pub visible: bool,
    /// Set for techniques which can be evaluated once.
    pub static_visibility: Option<StaticVisibility>,
}

impl TileObject {
    pub fn new(
        object_id: u32,
        geometry_index: usize,
        geometry: &Geometry,
        technique: Arc<Technique>,
    ) -> Self {
        let render_order_offset = geometry
            .groups
            .first()
            .map_or(0, |group| group.render_order_offset);
        let env = Env::default();
        let static_visibility = technique.is_static().then(|| {
            let (min_zoom_level, max_zoom_level) = technique.zoom_range(&env);
            StaticVisibility {
                enabled: technique.enabled(&env),
                min_zoom_level,
                max_zoom_level,
            }
        });
        let transparent = technique.color(&env).map_or(false, |color| color[3] < 1.0);

        Self {
            object_id,
            geometry_index,
            geometry_type: geometry.geometry_type,
            render_order: compose_render_order(
                technique.render_order as i64,
                render_order_offset as i64,
            ),
            program_id: program_id(geometry.geometry_type),
            material_id: technique.index as u32,
            transparent,
            visible: true,
            static_visibility,
            technique,
        }
    }
}

/// Every geometry type is drawn with its own shader program.
fn program_id(geometry_type: GeometryType) -> u32 {
    match geometry_type {
        GeometryType::Point => 0,
        GeometryType::Line => 1,
        GeometryType::SolidLine => 2,
        GeometryType::Polygon => 3,
        GeometryType::ExtrudedLine => 4,
        GeometryType::ExtrudedPolygon => 5,
    }
}

/// A tile object selected for drawing in the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderItem {
    pub tile_key: TileKey,
    pub data_source_order: i32,
    pub object_id: u32,
    pub geometry_index: usize,
    pub program_id: u32,
    pub material_id: u32,
    pub render_order: RenderOrder,
    pub transparent: bool,
    pub is_building: bool,
    /// True if the tile is stored at the level which is displayed.
    pub matches_level: bool,
    /// Distance of the tile center to the camera.
    pub depth: f64,
    pub stencil_ref: u32,
    /// Position of the tile center relative to the camera.
    pub camera_offset: Vector3<f32>,
    /// Ranges of the index buffer to draw, `None` to draw all of it.
    pub groups: Option<Vec<Group>>,
}

/// The objects drawn in one frame.
#[derive(Default)]
pub struct RootNode {
    items: Vec<RenderItem>,
}

impl RootNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: RenderItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sorts the items into draw order, see [`renderer::compare_draw_order`].
    pub fn sort(&mut self) {
        self.items.sort_by(renderer::compare_draw_order);
    }
}
