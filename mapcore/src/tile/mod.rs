//! Tiles, their cache and the data sources which create them.

use std::{fmt, sync::Arc};

use cgmath::Vector3;

use crate::{
    coords::TileKey,
    decoder::pool::{DecodeHandle, DecodePoll},
    io::geometry_index::RoadIndex,
    projection::Projection,
    render::TileObject,
    style::Technique,
    tessellation::DecodedTile,
    text::{batch::TextElementsBatch, builder::TextElementBuilder, TextElement},
    tile::feature_state::SharedFeatureState,
    util::math::Aabb3,
};

pub mod cache;
pub mod data_source;
pub mod feature_state;

/// What a tile knows about the data source it belongs to.
#[derive(Clone, Debug)]
pub struct TileAttachment {
    pub data_source: String,
    pub data_source_order: i32,
    pub projection: Projection,
    pub feature_state: SharedFeatureState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileState {
    /// Waiting for decoded data, or the decode was cancelled.
    Pending,
    Ready,
    Failed,
    Disposed,
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            TileState::Pending => "pending",
            TileState::Ready => "ready",
            TileState::Failed => "failed",
            TileState::Disposed => "disposed",
        };
        f.write_str(state)
    }
}

/// A tile of one data source. The decoded data is turned into [`TileObject`]s and
/// [`TextElement`]s whenever it changes.
pub struct Tile {
    tile_key: TileKey,
    /// Number of world copies the tile is shifted by horizontally.
    offset: i32,
    attachment: Option<TileAttachment>,
    state: TileState,
    decode: Option<DecodeHandle>,
    decoded_tile: Option<DecodedTile>,
    objects: Vec<TileObject>,
    text_elements: Vec<TextElement>,
    road_index: Option<RoadIndex>,
    error: Option<String>,
    pub visible: bool,
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("tile_key", &self.tile_key)
            .field("offset", &self.offset)
            .field("state", &self.state)
            .field("objects", &self.objects.len())
            .field("text_elements", &self.text_elements.len())
            .finish()
    }
}

impl Tile {
    pub fn new(tile_key: TileKey, offset: i32) -> Self {
        Self {
            tile_key,
            offset,
            attachment: None,
            state: TileState::Pending,
            decode: None,
            decoded_tile: None,
            objects: Vec::new(),
            text_elements: Vec::new(),
            road_index: None,
            error: None,
            visible: true,
        }
    }

    pub fn tile_key(&self) -> TileKey {
        self.tile_key
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    /// The error of a failed decode.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attach(&mut self, attachment: TileAttachment) {
        self.attachment = Some(attachment);
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// # Panics
    ///
    /// If the tile is not attached to a data source.
    pub fn attachment(&self) -> &TileAttachment {
        match &self.attachment {
            Some(attachment) => attachment,
            None => panic!(
                "tile {} must be attached to a data source before it is used",
                self.tile_key
            ),
        }
    }

    /// # Panics
    ///
    /// If the tile is not attached to a data source.
    pub fn projection(&self) -> &Projection {
        &self.attachment().projection
    }

    pub fn data_source_order(&self) -> i32 {
        self.attachment().data_source_order
    }

    pub fn feature_state(&self) -> &SharedFeatureState {
        &self.attachment().feature_state
    }

    /// World space center of the tile including its world copy offset.
    pub fn center(&self) -> Option<Vector3<f64>> {
        let decoded = self.decoded_tile.as_ref()?;
        Some(decoded.center + self.offset_translation())
    }

    pub fn bounding_box(&self) -> Option<Aabb3> {
        let decoded = self.decoded_tile.as_ref()?;
        let translation = self.offset_translation();
        Some(Aabb3 {
            min: decoded.bounding_box.min + translation,
            max: decoded.bounding_box.max + translation,
        })
    }

    fn offset_translation(&self) -> Vector3<f64> {
        let world_width = self.projection().world_width().unwrap_or(0.0);
        Vector3::new(self.offset as f64 * world_width, 0.0, 0.0)
    }

    /// Tracks a scheduled decode. A decode which is still running is cancelled.
    pub fn set_decode(&mut self, handle: DecodeHandle) {
        if let Some(previous) = self.decode.replace(handle) {
            previous.cancel();
        }
        if self.state != TileState::Ready {
            self.state = TileState::Pending;
        }
    }

    pub fn is_decoding(&self) -> bool {
        self.decode.is_some()
    }

    /// Takes the result of a finished decode. Returns `true` if the content of the tile changed.
    ///
    /// A cancelled decode leaves the tile without new content.
    pub fn poll_decode(&mut self) -> bool {
        let Some(handle) = self.decode.as_mut() else {
            return false;
        };
        match handle.try_take() {
            DecodePoll::Pending => false,
            DecodePoll::Cancelled => {
                log::debug!("decode of {} was cancelled", self.tile_key);
                self.decode = None;
                false
            }
            DecodePoll::Ready(Ok(decoded)) => {
                self.decode = None;
                self.set_decoded_tile(decoded);
                true
            }
            DecodePoll::Ready(Err(e)) => {
                log::warn!("decoding {} failed: {e}", self.tile_key);
                self.decode = None;
                self.error = Some(e.to_string());
                self.state = TileState::Failed;
                true
            }
        }
    }

    /// Replaces the decoded data and rebuilds objects and text elements from it.
    ///
    /// # Panics
    ///
    /// If the tile is not attached to a data source.
    #[tracing::instrument(skip_all)]
    pub fn set_decoded_tile(&mut self, decoded: DecodedTile) {
        if self.state == TileState::Disposed {
            log::debug!("ignoring decoded data of disposed tile {}", self.tile_key);
            return;
        }
        self.road_index = RoadIndex::build(&decoded.path_geometries);
        self.decoded_tile = Some(decoded);
        self.error = None;
        self.state = TileState::Ready;
        self.rebuild();
    }

    /// Rebuilds objects and text elements from the current decoded data. Rebuilding twice yields
    /// the same result.
    pub fn rebuild(&mut self) {
        self.objects.clear();
        self.text_elements.clear();
        let Some(decoded) = self.decoded_tile.as_ref() else {
            return;
        };

        for (index, geometry) in decoded.geometries.iter().enumerate() {
            let Some(technique) = geometry
                .technique_index()
                .and_then(|i| decoded.technique(i))
            else {
                log::warn!("geometry {index} of {} has no technique", self.tile_key);
                continue;
            };
            self.objects.push(TileObject::new(
                self.objects.len() as u32,
                index,
                geometry,
                technique.clone(),
            ));
        }

        self.text_elements = self.create_text_elements(decoded);
    }

    fn create_text_elements(&self, decoded: &DecodedTile) -> Vec<TextElement> {
        let center = decoded.center + self.offset_translation();
        let world = |p: &[f32; 3]| center + Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        let technique = |index| text_technique(decoded, index, self.tile_key);

        let mut builder = TextElementBuilder::new(self.tile_key, self.data_source_order() as i64);
        let mut batch = TextElementsBatch::new();

        for text in &decoded.text_geometries {
            let Some(technique) = technique(text.technique_index) else {
                continue;
            };
            builder.with_technique(technique);
            for (i, (position, label)) in text.positions.iter().zip(&text.texts).enumerate() {
                let feature_id = text.feature_ids.get(i).copied().flatten();
                if let Ok(element) = builder.build(label, world(position), feature_id, i) {
                    batch.add(element);
                }
            }
        }

        for poi in &decoded.poi_geometries {
            let Some(technique) = technique(poi.technique_index) else {
                continue;
            };
            builder.with_technique(technique);
            for (i, (position, label)) in poi.positions.iter().zip(&poi.texts).enumerate() {
                let image_texture = poi.image_textures.get(i).cloned().flatten();
                let feature_id = poi.feature_ids.get(i).copied().flatten();
                let shield_group_index = poi.shield_group_indices.get(i).copied().flatten();
                builder.with_icon(image_texture, shield_group_index);
                if let Ok(element) = builder.build(label, world(position), feature_id, i) {
                    batch.add(element);
                }
            }
        }

        for (i, path) in decoded.text_path_geometries.iter().enumerate() {
            let Some(technique) = technique(path.technique_index) else {
                continue;
            };
            builder.with_technique(technique);
            let points = path.path.iter().map(world).collect();
            if let Ok(element) = builder.build_path(&path.text, points, path.feature_id, i) {
                batch.add(element);
            }
        }

        batch.finish()
    }

    pub fn decoded_tile(&self) -> Option<&DecodedTile> {
        self.decoded_tile.as_ref()
    }

    pub fn has_content(&self) -> bool {
        self.decoded_tile.is_some()
    }

    pub fn objects(&self) -> &[TileObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [TileObject] {
        &mut self.objects
    }

    pub fn text_elements(&self) -> &[TextElement] {
        &self.text_elements
    }

    /// Index of the roads of this tile. `None` if the tile has no decoded data or no roads.
    pub fn road_index(&self) -> Option<&RoadIndex> {
        self.road_index.as_ref()
    }

    /// Cancels a running decode and releases all data. A disposed tile is never used again.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.decode.take() {
            handle.cancel();
        }
        self.decoded_tile = None;
        self.objects.clear();
        self.text_elements.clear();
        self.road_index = None;
        self.state = TileState::Disposed;
    }
}

fn text_technique(
    decoded: &DecodedTile,
    index: usize,
    tile_key: TileKey,
) -> Option<&Arc<Technique>> {
    let technique = decoded.technique(index);
    if technique.is_none() {
        log::warn!("text of {tile_key} references unknown technique {index}");
    }
    technique
}
