//! Errors which can happen in various parts of the library.

use thiserror::Error;

use crate::{
    decoder::{pool::ScheduleError, DecodeError},
    style::StyleError,
    text::TextError,
    tile::data_source::{DataSourceError, FetchError},
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("style set could not be loaded")]
    Style(#[from] StyleError),
    #[error("tile decoding failed")]
    Decode(#[from] DecodeError),
    #[error("scheduling decode work failed")]
    Schedule(#[from] ScheduleError),
    #[error("tile data could not be fetched")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Text(#[from] TextError),
}
