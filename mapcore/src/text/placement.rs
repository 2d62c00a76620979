//! Placement of text elements on screen.

use std::cmp::Ordering;

use cgmath::{Matrix4, Point2, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::{
    coords::TileKey,
    text::{grid_index::GridIndex, TextElement},
    util::math::Aabb2,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlacementSettings {
    /// Cell size of the collision grid in pixels.
    pub grid_cell_size: u32,
    /// Estimated width of a glyph relative to the font size.
    pub glyph_width_factor: f64,
    /// Space kept free around every label in pixels.
    pub label_padding: f64,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            grid_cell_size: 32,
            glyph_width_factor: 0.6,
            label_padding: 2.0,
        }
    }
}

/// A label which was placed on screen.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedLabel {
    pub tile_key: TileKey,
    pub technique_index: usize,
    pub feature_id: Option<u64>,
    pub text: String,
    /// Index of the label in its text geometry.
    pub array_index: usize,
    /// Index into the positions of merged elements.
    pub position_index: usize,
    pub screen_position: Point2<f64>,
    pub bounds: Aabb2<f64>,
}

/// Places labels front to back by importance and drops those which collide with labels placed
/// earlier.
pub struct LabelPlacer {
    settings: PlacementSettings,
    width: f64,
    height: f64,
    grid: GridIndex<usize>,
}

impl LabelPlacer {
    pub fn new(settings: PlacementSettings, width: f64, height: f64) -> Self {
        let grid = GridIndex::new(width, height, settings.grid_cell_size);
        Self {
            settings,
            width,
            height,
            grid,
        }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.grid = GridIndex::new(width, height, self.settings.grid_cell_size);
    }

    /// Places `elements` for one frame. Elements are tried in the order priority (descending),
    /// render order, tile morton code and their order in `elements`.
    #[tracing::instrument(skip_all)]
    pub fn place(
        &mut self,
        elements: &[TextElement],
        view_projection: &Matrix4<f64>,
        zoom_level: f64,
    ) -> Vec<PlacedLabel> {
        self.grid.clear();
        if !(self.width > 0.0 && self.height > 0.0) {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..elements.len()).collect();
        order.sort_by(|&a, &b| compare_placement_order(&elements[a], &elements[b]).then(a.cmp(&b)));

        let mut placed = Vec::new();
        for index in order {
            let element = &elements[index];
            if !element.is_visible_at(zoom_level) {
                continue;
            }

            let anchors: Vec<Vector3<f64>> = match element.anchor() {
                Some(anchor) if element.path.is_some() => vec![anchor],
                Some(_) => element.positions.clone(),
                None => continue,
            };

            for (position_index, anchor) in anchors.into_iter().enumerate() {
                let Some(screen_position) = self.project(view_projection, anchor) else {
                    continue;
                };
                let bounds = self.label_bounds(element, screen_position);
                if !element.may_overlap && self.grid.hit_test(&bounds) {
                    continue;
                }
                if element.reserve_space {
                    self.grid.insert(placed.len(), bounds);
                }
                placed.push(PlacedLabel {
                    tile_key: element.tile_key,
                    technique_index: element.technique_index,
                    feature_id: element.feature_id,
                    text: element.text.clone(),
                    array_index: element.array_index,
                    position_index,
                    screen_position,
                    bounds,
                });
            }
        }

        log::trace!("placed {} of {} labels", placed.len(), elements.len());
        placed
    }

    /// Projects a world position into screen pixels, `y` pointing down. `None` if the position
    /// is behind the camera or outside the viewport.
    fn project(
        &self,
        view_projection: &Matrix4<f64>,
        position: Vector3<f64>,
    ) -> Option<Point2<f64>> {
        let clip = *view_projection * Vector4::new(position.x, position.y, position.z, 1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        if !(-1.0..=1.0).contains(&ndc_x) || !(-1.0..=1.0).contains(&ndc_y) {
            return None;
        }
        Some(Point2::new(
            (ndc_x + 1.0) / 2.0 * self.width,
            (1.0 - ndc_y) / 2.0 * self.height,
        ))
    }

    fn label_bounds(&self, element: &TextElement, center: Point2<f64>) -> Aabb2<f64> {
        let font_size = element.layout_style.font_size;
        let half_width = element.text.chars().count() as f64
            * font_size
            * self.settings.glyph_width_factor
            / 2.0
            + self.settings.label_padding;
        let half_height = font_size / 2.0 + self.settings.label_padding;
        Aabb2::new(
            Point2::new(center.x - half_width, center.y - half_height),
            Point2::new(center.x + half_width, center.y + half_height),
        )
    }
}

fn compare_placement_order(a: &TextElement, b: &TextElement) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then(a.render_order.cmp(&b.render_order))
        .then(a.tile_key.morton_code().cmp(&b.tile_key.morton_code()))
}
