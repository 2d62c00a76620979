//! # mapcore
//!
//! The core of a 3D map renderer: decoding of vector tiles into typed geometry buffers,
//! a tile cache keyed by data source, tile key and wrap-around offset, style evaluation,
//! per-frame selection and sorting of tile objects, and placement of text labels.
//!
//! The crate does not draw anything by itself. Its output are CPU side buffers
//! ([`tessellation::DecodedTile`]), sorted draw lists ([`render::RootNode`]) and placed
//! labels ([`text::placement::PlacedLabel`]) which a rendering backend consumes.
//!
//! ### Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mapcore::{
//!     coords::{TileKey, ZoomLevel},
//!     decoder::{decode_tile, DecodeOptions},
//!     style::StyleSet,
//! };
//!
//! fn decode(bytes: &[u8]) -> Result<(), mapcore::Error> {
//!     let style_set = Arc::new(StyleSet::from_json(r##"[
//!         { "layer": "water", "technique": "fill", "attr": { "color": "#2277dd" } }
//!     ]"##)?);
//!     let key = TileKey::new(5, 3, ZoomLevel::new(4)).unwrap_or_else(TileKey::root);
//!     let decoded = decode_tile(key, bytes, &style_set, &DecodeOptions::default())?;
//!     println!("{} geometries", decoded.geometries.len());
//!     Ok(())
//! }
//! ```

pub mod coords;
pub mod decoder;
pub mod error;
pub mod io;
pub mod projection;
pub mod render;
pub mod style;
pub mod tessellation;
pub mod text;
pub mod tile;
pub mod util;

pub use error::Error;
