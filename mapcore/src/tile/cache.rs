//! Cache of the tiles of all data sources.

use std::{
    collections::BTreeMap,
    sync::mpsc::{channel, Receiver, Sender},
};

use serde::{Deserialize, Serialize};

use crate::{
    coords::{
        decode_offset_key, encode_offset_key, TileKey, DEFAULT_OFFSET_BITSHIFT,
        OFFSET_BITSHIFT_RANGE,
    },
    tile::{Tile, TileState},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TileCacheSettings {
    /// Maximum number of tiles kept in the cache.
    pub capacity: usize,
    /// Number of bits of the cache key which store the world copy offset. Clamped to
    /// [`OFFSET_BITSHIFT_RANGE`] by [`TileCache::new`].
    pub offset_bitshift: u32,
}

impl Default for TileCacheSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            offset_bitshift: DEFAULT_OFFSET_BITSHIFT,
        }
    }
}

/// Data source name and the tile key combined with the world copy offset.
pub type TileCacheKey = (String, u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileEventKind {
    Added,
    /// The content of the tile changed, e.g. because a decode finished.
    Updated,
    Evicted,
}

/// Notification about a change of a cached tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileEvent {
    pub kind: TileEventKind,
    pub data_source: String,
    pub tile_key: TileKey,
    pub offset: i32,
    pub state: TileState,
}

struct CachedTile {
    tile: Tile,
    last_used: u64,
}

/// A bounded cache of tiles. When it is full the least recently used tile is evicted and
/// disposed.
///
/// Changes are published to the receivers returned by [`TileCache::subscribe`].
pub struct TileCache {
    settings: TileCacheSettings,
    tiles: BTreeMap<TileCacheKey, CachedTile>,
    frame: u64,
    observers: Vec<Sender<TileEvent>>,
}

impl TileCache {
    pub fn new(mut settings: TileCacheSettings) -> Self {
        let bitshift = settings
            .offset_bitshift
            .clamp(*OFFSET_BITSHIFT_RANGE.start(), *OFFSET_BITSHIFT_RANGE.end());
        if bitshift != settings.offset_bitshift {
            log::warn!(
                "offset bitshift {} is out of range, using {bitshift}",
                settings.offset_bitshift
            );
            settings.offset_bitshift = bitshift;
        }
        Self {
            settings,
            tiles: BTreeMap::new(),
            frame: 0,
            observers: Vec::new(),
        }
    }

    pub fn settings(&self) -> &TileCacheSettings {
        &self.settings
    }

    pub fn subscribe(&mut self) -> Receiver<TileEvent> {
        let (sender, receiver) = channel();
        self.observers.push(sender);
        receiver
    }

    pub fn key(&self, data_source: &str, tile_key: &TileKey, offset: i32) -> TileCacheKey {
        (
            data_source.to_owned(),
            encode_offset_key(tile_key, offset, self.settings.offset_bitshift),
        )
    }

    /// Starts a new frame. Tiles used in this frame are evicted after those which were not.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, data_source: &str, tile_key: &TileKey, offset: i32) -> bool {
        self.tiles
            .contains_key(&self.key(data_source, tile_key, offset))
    }

    /// Looks up a tile and marks it as used.
    pub fn get(&mut self, data_source: &str, tile_key: &TileKey, offset: i32) -> Option<&mut Tile> {
        let key = self.key(data_source, tile_key, offset);
        let frame = self.frame;
        self.tiles.get_mut(&key).map(|cached| {
            cached.last_used = frame;
            &mut cached.tile
        })
    }

    /// Looks up a tile, creating it with `create` if it is not cached. `create` returns `None`
    /// if the tile can not be provided.
    pub fn get_or_create<F>(
        &mut self,
        data_source: &str,
        tile_key: &TileKey,
        offset: i32,
        create: F,
    ) -> Option<&mut Tile>
    where
        F: FnOnce() -> Option<Tile>,
    {
        let key = self.key(data_source, tile_key, offset);
        if !self.tiles.contains_key(&key) {
            let tile = create()?;
            self.tiles.insert(
                key.clone(),
                CachedTile {
                    tile,
                    last_used: self.frame,
                },
            );
            self.notify(TileEventKind::Added, &key);
            self.shrink_to_capacity(Some(&key));
        }
        self.get(data_source, tile_key, offset)
    }

    /// Polls the decodes of all tiles. Returns the number of tiles whose content changed.
    pub fn poll_decodes(&mut self) -> usize {
        let changed: Vec<TileCacheKey> = self
            .tiles
            .iter_mut()
            .filter_map(|(key, cached)| cached.tile.poll_decode().then(|| key.clone()))
            .collect();
        for key in &changed {
            self.notify(TileEventKind::Updated, key);
        }
        changed.len()
    }

    /// Notifies observers that a tile was updated from outside, e.g. by a data source.
    pub fn mark_updated(&mut self, data_source: &str, tile_key: &TileKey, offset: i32) {
        let key = self.key(data_source, tile_key, offset);
        if self.tiles.contains_key(&key) {
            self.notify(TileEventKind::Updated, &key);
        }
    }

    pub fn evict(&mut self, data_source: &str, tile_key: &TileKey, offset: i32) -> bool {
        let key = self.key(data_source, tile_key, offset);
        self.evict_key(&key)
    }

    /// Evicts all tiles of a data source, e.g. when it is removed.
    pub fn evict_data_source(&mut self, data_source: &str) {
        let keys: Vec<TileCacheKey> = self
            .tiles
            .keys()
            .filter(|(name, _)| name == data_source)
            .cloned()
            .collect();
        for key in keys {
            self.evict_key(&key);
        }
    }

    pub fn clear(&mut self) {
        let keys: Vec<TileCacheKey> = self.tiles.keys().cloned().collect();
        for key in keys {
            self.evict_key(&key);
        }
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values().map(|cached| &cached.tile)
    }

    pub fn tiles_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.values_mut().map(|cached| &mut cached.tile)
    }

    fn shrink_to_capacity(&mut self, keep: Option<&TileCacheKey>) {
        while self.tiles.len() > self.settings.capacity {
            let oldest = self
                .tiles
                .iter()
                .filter(|(key, _)| Some(*key) != keep)
                .min_by_key(|(_, cached)| cached.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    self.evict_key(&key);
                }
                None => break,
            }
        }
    }

    fn evict_key(&mut self, key: &TileCacheKey) -> bool {
        let Some(mut cached) = self.tiles.remove(key) else {
            return false;
        };
        cached.tile.dispose();
        log::trace!("evicted tile {} of {}", cached.tile.tile_key(), key.0);
        self.publish(TileEvent {
            kind: TileEventKind::Evicted,
            data_source: key.0.clone(),
            tile_key: cached.tile.tile_key(),
            offset: cached.tile.offset(),
            state: cached.tile.state(),
        });
        true
    }

    fn notify(&mut self, kind: TileEventKind, key: &TileCacheKey) {
        let Some(cached) = self.tiles.get(key) else {
            return;
        };
        let event = TileEvent {
            kind,
            data_source: key.0.clone(),
            tile_key: cached.tile.tile_key(),
            offset: cached.tile.offset(),
            state: cached.tile.state(),
        };
        self.publish(event);
    }

    fn publish(&mut self, event: TileEvent) {
        // Observers which dropped their receiver are removed.
        self.observers
            .retain(|observer| observer.send(event.clone()).is_ok());
    }
}

/// Splits a cache key into world copy offset and morton code of the tile.
pub fn split_cache_key(key: &TileCacheKey, bitshift: u32) -> (i32, u64) {
    decode_offset_key(key.1, bitshift)
}
