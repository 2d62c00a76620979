//! Lookups on decoded tile data.

pub mod geometry_index;
