//! Data sources create the tiles of one layer of map data.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    coords::{TileKey, ZoomLevel, MAX_TILE_LEVEL},
    decoder::{pool::DecodePool, DecodeOptions},
    projection::Projection,
    style::{AttributeMap, StyleSet},
    tile::{feature_state::SharedFeatureState, Tile, TileAttachment},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("a data source named {0} is already registered")]
    DuplicateName(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FetchError {
    #[error("tile {0} is not available")]
    NotFound(TileKey),
}

/// How a data source divides the world into tiles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TilingScheme {
    pub projection: Projection,
    pub min_level: ZoomLevel,
    pub max_level: ZoomLevel,
}

impl Default for TilingScheme {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            min_level: ZoomLevel::new(0),
            max_level: ZoomLevel::new(MAX_TILE_LEVEL),
        }
    }
}

/// A source of tiles.
///
/// Only [`name`](Self::name), [`tiling_scheme`](Self::tiling_scheme),
/// [`feature_state`](Self::feature_state) and [`get_tile`](Self::get_tile) must be
/// implemented. The remaining hooks do nothing by default.
pub trait DataSource {
    fn name(&self) -> &str;

    fn tiling_scheme(&self) -> &TilingScheme;

    /// Tiles of data sources with a lower order are drawn first.
    fn data_source_order(&self) -> i32 {
        0
    }

    /// Added to the display zoom level to get the level of the tiles which are loaded, e.g. -1
    /// loads tiles one level coarser than displayed.
    fn storage_level_offset(&self) -> i32 {
        0
    }

    /// Level of the tiles shown at `zoom_level`, within the levels of the tiling scheme.
    fn storage_level(&self, zoom_level: ZoomLevel) -> ZoomLevel {
        let scheme = self.tiling_scheme();
        let level = (u8::from(zoom_level) as i32 + self.storage_level_offset())
            .min(u8::from(scheme.max_level) as i32)
            .max(u8::from(scheme.min_level) as i32);
        ZoomLevel::new(level as u8)
    }

    /// Whether tiles of the data source should be shown when the map displays `zoom_level`.
    fn can_get_tile(&self, zoom_level: ZoomLevel, tile_key: &TileKey) -> bool {
        let scheme = self.tiling_scheme();
        tile_key.level() <= self.storage_level(zoom_level)
            && tile_key.level() >= scheme.min_level
            && tile_key.level() <= scheme.max_level
    }

    /// Whether `tile_key` should be replaced by its children when the map displays `zoom_level`.
    fn should_subdivide(&self, zoom_level: ZoomLevel, tile_key: &TileKey) -> bool {
        tile_key.level() < self.storage_level(zoom_level)
    }

    /// Creates the tile `tile_key`, shifted by `offset` world copies. `None` if the data source
    /// has no data for it.
    fn get_tile(&mut self, tile_key: TileKey, offset: i32) -> Option<Tile>;

    fn set_theme(&mut self, _style_set: Arc<StyleSet>) {}

    /// Refreshes the content of a tile, e.g. after the theme changed.
    fn update_tile(&mut self, _tile: &mut Tile) {}

    fn set_enable_elevation_overlay(&mut self, _enable: bool) {}

    fn feature_state(&self) -> &SharedFeatureState;

    fn get_feature_state(&self, id: u64) -> Option<AttributeMap> {
        self.feature_state().read().get(id).cloned()
    }

    fn set_feature_state(&self, id: u64, state: AttributeMap) {
        self.feature_state().write().set(id, state);
    }

    fn remove_feature_state(&self, id: u64) {
        self.feature_state().write().remove(id);
    }

    fn clear_feature_state(&self) {
        self.feature_state().write().clear();
    }

    fn attachment(&self) -> TileAttachment {
        TileAttachment {
            data_source: self.name().to_owned(),
            data_source_order: self.data_source_order(),
            projection: self.tiling_scheme().projection,
            feature_state: self.feature_state().clone(),
        }
    }
}

/// Owns the registered data sources and hands out unique names for them.
#[derive(Default)]
pub struct DataSourceRegistry {
    next_id: u64,
    sources: Vec<Box<dyn DataSource>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a name which was not handed out by this registry before.
    pub fn unique_name(&mut self, prefix: &str) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("{prefix}-{id}")
    }

    pub fn add(&mut self, source: Box<dyn DataSource>) -> Result<(), DataSourceError> {
        if self.get(source.name()).is_some() {
            return Err(DataSourceError::DuplicateName(source.name().to_owned()));
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn DataSource>> {
        let position = self.sources.iter().position(|s| s.name() == name)?;
        Some(self.sources.remove(position))
    }

    pub fn get(&self, name: &str) -> Option<&dyn DataSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn DataSource>> {
        self.sources.iter_mut().find(|s| s.name() == name)
    }

    /// Data sources in draw order.
    pub fn sorted(&self) -> Vec<&dyn DataSource> {
        let mut sources: Vec<&dyn DataSource> = self.sources.iter().map(|s| s.as_ref()).collect();
        sources.sort_by_key(|s| s.data_source_order());
        sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Provides the raw bytes of vector tiles.
pub trait TileProvider {
    fn fetch_tile(&self, tile_key: &TileKey) -> Result<Vec<u8>, FetchError>;
}

/// Serves tiles from memory.
#[derive(Default, Clone)]
pub struct StaticTileProvider {
    tiles: HashMap<TileKey, Vec<u8>>,
}

impl StaticTileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tile_key: TileKey, data: Vec<u8>) {
        self.tiles.insert(tile_key, data);
    }
}

impl TileProvider for StaticTileProvider {
    fn fetch_tile(&self, tile_key: &TileKey) -> Result<Vec<u8>, FetchError> {
        self.tiles
            .get(tile_key)
            .cloned()
            .ok_or(FetchError::NotFound(*tile_key))
    }
}

/// A data source of Mapbox vector tiles. Tiles are decoded on a [`DecodePool`].
pub struct VectorTileDataSource<P> {
    name: String,
    order: i32,
    storage_level_offset: i32,
    tiling_scheme: TilingScheme,
    provider: P,
    pool: Arc<DecodePool>,
    style_set: Arc<StyleSet>,
    options: Arc<DecodeOptions>,
    feature_state: SharedFeatureState,
}

impl<P: TileProvider> VectorTileDataSource<P> {
    pub fn new(
        name: String,
        provider: P,
        pool: Arc<DecodePool>,
        style_set: Arc<StyleSet>,
        options: DecodeOptions,
    ) -> Self {
        let tiling_scheme = TilingScheme {
            projection: options.projection,
            ..TilingScheme::default()
        };
        Self {
            name,
            order: 0,
            storage_level_offset: 0,
            tiling_scheme,
            provider,
            pool,
            style_set,
            options: Arc::new(options),
            feature_state: SharedFeatureState::default(),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_storage_level_offset(mut self, offset: i32) -> Self {
        self.storage_level_offset = offset;
        self
    }

    pub fn with_tiling_scheme(mut self, tiling_scheme: TilingScheme) -> Self {
        self.tiling_scheme = tiling_scheme;
        self
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Fetches the data of `tile` and schedules its decode. Returns `false` if there is no data.
    fn load(&self, tile: &mut Tile) -> bool {
        let data = match self.provider.fetch_tile(&tile.tile_key()) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("{}: {e}", self.name);
                return false;
            }
        };
        match self.pool.schedule(
            tile.tile_key(),
            data,
            self.style_set.clone(),
            self.options.clone(),
        ) {
            Ok(handle) => {
                tile.set_decode(handle);
                true
            }
            Err(e) => {
                log::warn!("{}: can not decode {}: {e}", self.name, tile.tile_key());
                false
            }
        }
    }
}

impl<P: TileProvider> DataSource for VectorTileDataSource<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn tiling_scheme(&self) -> &TilingScheme {
        &self.tiling_scheme
    }

    fn data_source_order(&self) -> i32 {
        self.order
    }

    fn storage_level_offset(&self) -> i32 {
        self.storage_level_offset
    }

    fn get_tile(&mut self, tile_key: TileKey, offset: i32) -> Option<Tile> {
        let mut tile = Tile::new(tile_key, offset);
        tile.attach(self.attachment());
        self.load(&mut tile).then_some(tile)
    }

    fn set_theme(&mut self, style_set: Arc<StyleSet>) {
        self.style_set = style_set;
    }

    fn update_tile(&mut self, tile: &mut Tile) {
        self.load(tile);
    }

    fn set_enable_elevation_overlay(&mut self, enable: bool) {
        if self.options.enable_elevation_overlay != enable {
            let mut options = (*self.options).clone();
            options.enable_elevation_overlay = enable;
            self.options = Arc::new(options);
        }
    }

    fn feature_state(&self) -> &SharedFeatureState {
        &self.feature_state
    }
}
