//! Text labels and icons: creation of [`TextElement`]s from decoded text geometry, and their
//! placement on screen.

use std::sync::Arc;

use cgmath::Vector3;
use thiserror::Error;

use crate::{
    coords::TileKey,
    text::{
        builder::{TextLayoutStyle, TextRenderStyle},
        render_order::RenderOrder,
    },
};

pub mod batch;
pub mod builder;
pub mod grid_index;
pub mod placement;
pub mod render_order;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TextError {
    #[error("a text element can not be built before a technique is set")]
    MissingTechnique,
}

/// Icon related information of a point of interest.
#[derive(Clone, Debug, PartialEq)]
pub struct PoiInfo {
    pub image_texture: Option<String>,
    pub shield_group_index: Option<u32>,
}

/// An immutable label which is ready for placement.
#[derive(Clone, Debug)]
pub struct TextElement {
    pub text: String,
    /// Anchor positions in world space. Merged duplicates have more than one position.
    pub positions: Vec<Vector3<f64>>,
    /// The line the label follows, for path labels.
    pub path: Option<Vec<Vector3<f64>>>,
    pub technique_index: usize,
    pub priority: f64,
    pub render_order: RenderOrder,
    pub min_zoom_level: f64,
    /// Exclusive.
    pub max_zoom_level: f64,
    pub may_overlap: bool,
    pub reserve_space: bool,
    pub render_style: Arc<TextRenderStyle>,
    pub layout_style: Arc<TextLayoutStyle>,
    pub poi_info: Option<PoiInfo>,
    pub feature_id: Option<u64>,
    /// Index of the label in the text geometry it was created from.
    pub array_index: usize,
    pub tile_key: TileKey,
}

impl TextElement {
    pub fn is_visible_at(&self, zoom_level: f64) -> bool {
        zoom_level >= self.min_zoom_level && zoom_level < self.max_zoom_level
    }

    /// Anchor of the label: its first position, or the middle vertex of its path.
    pub fn anchor(&self) -> Option<Vector3<f64>> {
        match &self.path {
            Some(path) if !path.is_empty() => Some(path[path.len() / 2]),
            _ => self.positions.first().copied(),
        }
    }
}
