//! Decoding of vector tiles into [`DecodedTile`]s.

use std::sync::Arc;

use geozero::mvt::{Message, Tile};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    coords::{TileKey, EXTENT_UINT},
    decoder::feature::{read_layer, Feature},
    projection::Projection,
    style::{
        expr::{GEOMETRY_TYPE_BINDING, ID_BINDING, LAYER_BINDING, LEVEL_BINDING, ZOOM_BINDING},
        Env, StyleSet, StyleSetEvaluator, Value,
    },
    tessellation::{emitter::DecodedTileEmitter, DecodedTile},
};

pub mod feature;
pub mod pool;

#[cfg(test)]
pub(crate) mod test_data;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("tile data is not a valid vector tile: {0}")]
    Protobuf(String),
    /// A geometry references a technique which the style set evaluator did not produce.
    #[error("geometry references unknown technique {0}")]
    InvalidTechniqueIndex(usize),
}

/// Options of one decode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecodeOptions {
    /// Store feature ids and start offsets with every geometry, and the attributes of
    /// features for picking.
    pub gather_feature_ids: bool,
    /// Drop line labels which do not fit on their line.
    pub skip_short_labels: bool,
    pub enable_elevation_overlay: bool,
    /// Preferred label languages, `name:<language>` is used before `name`.
    pub languages: Vec<String>,
    /// Size of a tile on screen in pixels, used to estimate the length of labels.
    pub tile_size_on_screen: f64,
    pub projection: Projection,
    pub copyright_holder_ids: Vec<String>,
    /// Keep the lines of features rendered with line techniques for picking.
    pub gather_road_segments: bool,
    pub interleave_vertex_attributes: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            gather_feature_ids: false,
            skip_short_labels: true,
            enable_elevation_overlay: false,
            languages: Vec::new(),
            tile_size_on_screen: 256.0,
            projection: Projection::default(),
            copyright_holder_ids: Vec::new(),
            gather_road_segments: false,
            interleave_vertex_attributes: false,
        }
    }
}

/// Builds the environment in which the style rules are evaluated for `feature`.
pub fn feature_env(key: &TileKey, layer: &str, feature: &Feature) -> Env {
    let mut env = Env::new(feature.properties.clone());
    let level = u8::from(key.level()) as f64;
    env.insert(LAYER_BINDING, Value::from(layer));
    env.insert(GEOMETRY_TYPE_BINDING, Value::from(feature.geometry.name()));
    env.insert(LEVEL_BINDING, Value::Number(level));
    env.insert(ZOOM_BINDING, Value::Number(level));
    if let Some(id) = feature.id {
        env.insert(ID_BINDING, Value::Number(id as f64));
    }
    env
}

/// Decodes already parsed layers. Coordinates are expected in tile units of
/// [`EXTENT`](crate::coords::EXTENT).
pub fn decode_features<I>(
    key: TileKey,
    layers: I,
    style_set: &Arc<StyleSet>,
    options: &DecodeOptions,
) -> Result<DecodedTile, DecodeError>
where
    I: IntoIterator<Item = (String, Vec<Feature>)>,
{
    let mut evaluator = StyleSetEvaluator::new(style_set.clone());
    let mut emitter = DecodedTileEmitter::new(key, options);

    for (layer, features) in layers {
        for feature in features {
            let env = feature_env(&key, &layer, &feature);
            let techniques = evaluator.get_matching_techniques(&env);
            if techniques.is_empty() {
                continue;
            }
            emitter.process_feature(&feature, &env, &techniques);
        }
    }

    emitter.get_decoded_tile(evaluator.into_techniques())
}

/// Decodes the raw bytes of a Mapbox vector tile.
///
/// Layers which fail to parse are logged and skipped.
#[tracing::instrument(skip_all)]
pub fn decode_tile(
    key: TileKey,
    data: &[u8],
    style_set: &Arc<StyleSet>,
    options: &DecodeOptions,
) -> Result<DecodedTile, DecodeError> {
    let tile = Tile::decode(data).map_err(|e| DecodeError::Protobuf(e.to_string()))?;

    let mut layers = Vec::with_capacity(tile.layers.len());
    for mut layer in tile.layers {
        let extent = layer.extent.unwrap_or(EXTENT_UINT);
        let mut features = match read_layer(&mut layer) {
            Ok(features) => features,
            Err(e) => {
                warn!("skipping layer {} of {key}: {e}", layer.name);
                continue;
            }
        };
        if extent != EXTENT_UINT && extent != 0 {
            let factor = EXTENT_UINT as f64 / extent as f64;
            for feature in &mut features {
                feature.geometry.scale(factor);
            }
        }
        layers.push((layer.name, features));
    }

    decode_features(key, layers, style_set, options)
}
