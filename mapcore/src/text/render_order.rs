//! Composition of render orders.

use std::fmt;

/// A composed render order. The base order occupies the upper 64 bits and the technique order
/// the lower 64 bits of an `i128`, so neither part can overflow into the other for inputs in
/// the `i64` range.
///
/// A single `i64` key does not suffice: with `base << 32` a base of `0xffffffff` already
/// overflows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RenderOrder(i128);

impl RenderOrder {
    pub fn value(self) -> i128 {
        self.0
    }
}

impl fmt::Display for RenderOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composes the render order of a data source (`base`) with the render order of a technique.
///
/// For a fixed `base` the result increases with `order`, and any increase of `base` outweighs
/// every difference in `order`.
pub fn compose_render_order(base: i64, order: i64) -> RenderOrder {
    RenderOrder(((base as i128) << 64) + order as i128)
}
