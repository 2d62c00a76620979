//! Triangulation of lines into ribbons.

use lyon::{
    math::point,
    path::Path,
    tessellation::{
        BuffersBuilder, LineCap, LineJoin, StrokeOptions, StrokeTessellator, StrokeVertex,
        StrokeVertexConstructor, TessellationError, VertexBuffers,
    },
};

use crate::{
    coords::ZoomLevel,
    tessellation::{IndexDataType, DEFAULT_TOLERANCE},
};

/// Round caps are only added from this level on. Below it lines are too dense for the caps to
/// be visible.
pub const ROUND_CAPS_MIN_LEVEL: ZoomLevel = ZoomLevel::new(13);

struct RibbonVertexConstructor;

impl StrokeVertexConstructor<[f32; 2]> for RibbonVertexConstructor {
    fn new_vertex(&mut self, vertex: StrokeVertex) -> [f32; 2] {
        vertex.position().to_array()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Caps {
    None,
    Round,
    Square,
}

impl Caps {
    /// Parses the `caps` attribute. A missing attribute results in `default`.
    pub fn parse(caps: Option<&str>, default: Caps) -> Caps {
        match caps.map(str::to_ascii_lowercase).as_deref() {
            None => default,
            Some("round") => Caps::Round,
            Some("square") => Caps::Square,
            Some("none") | Some("butt") => Caps::None,
            Some(other) => {
                log::warn!("unknown line caps {other}");
                default
            }
        }
    }

    /// Round caps degrade to flat ends below [`ROUND_CAPS_MIN_LEVEL`].
    pub fn for_level(self, level: ZoomLevel) -> Caps {
        match self {
            Caps::Round if level < ROUND_CAPS_MIN_LEVEL => Caps::None,
            caps => caps,
        }
    }

    fn line_cap(self) -> LineCap {
        match self {
            Caps::None => LineCap::Butt,
            Caps::Round => LineCap::Round,
            Caps::Square => LineCap::Square,
        }
    }
}

/// Tessellates a polyline into a ribbon of triangles with a total width of `width`.
/// Coordinates and width are in tile units.
pub fn tessellate_ribbon(
    points: &[[f64; 2]],
    width: f64,
    caps: Caps,
) -> Result<VertexBuffers<[f32; 2], IndexDataType>, TessellationError> {
    let mut buffer = VertexBuffers::new();
    if points.len() < 2 || width <= 0.0 {
        return Ok(buffer);
    }

    let mut builder = Path::builder();
    builder.begin(point(points[0][0] as f32, points[0][1] as f32));
    for [x, y] in &points[1..] {
        builder.line_to(point(*x as f32, *y as f32));
    }
    builder.end(false);
    let path = builder.build();

    StrokeTessellator::new().tessellate_path(
        &path,
        &StrokeOptions::tolerance(DEFAULT_TOLERANCE)
            .with_line_width(width as f32)
            .with_line_cap(caps.line_cap())
            .with_line_join(LineJoin::Miter),
        &mut BuffersBuilder::new(&mut buffer, RibbonVertexConstructor),
    )?;
    Ok(buffer)
}

/// Index pairs of the segments of a polyline with `len` vertices starting at `base`.
pub fn segment_indices(base: IndexDataType, len: usize) -> Vec<IndexDataType> {
    (1..len as IndexDataType)
        .flat_map(|i| [base + i - 1, base + i])
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::{
        coords::ZoomLevel,
        tessellation::line::{segment_indices, tessellate_ribbon, Caps},
    };

    #[test]
    fn ribbon_covers_width() {
        let buffer = tessellate_ribbon(&[[0.0, 0.0], [100.0, 0.0]], 10.0, Caps::None).unwrap();
        assert_eq!(buffer.indices.len() % 3, 0);
        assert!(buffer.indices.len() >= 6);
        let max_y = buffer.vertices.iter().map(|v| v[1]).fold(f32::MIN, f32::max);
        let min_y = buffer.vertices.iter().map(|v| v[1]).fold(f32::MAX, f32::min);
        assert!((max_y - 5.0).abs() < 1e-3);
        assert!((min_y + 5.0).abs() < 1e-3);
    }

    #[test]
    fn round_caps_extend_the_ribbon() {
        let buffer = tessellate_ribbon(&[[0.0, 0.0], [100.0, 0.0]], 10.0, Caps::Round).unwrap();
        let min_x = buffer.vertices.iter().map(|v| v[0]).fold(f32::MAX, f32::min);
        assert!(min_x < -4.0);
    }

    #[test]
    fn degenerate_lines_produce_nothing() {
        let buffer = tessellate_ribbon(&[[0.0, 0.0]], 10.0, Caps::Round).unwrap();
        assert!(buffer.vertices.is_empty());
    }

    #[test]
    fn caps_by_level() {
        assert_eq!(Caps::parse(None, Caps::Round), Caps::Round);
        assert_eq!(Caps::parse(Some("Square"), Caps::Round), Caps::Square);
        assert_eq!(Caps::Round.for_level(ZoomLevel::new(10)), Caps::None);
        assert_eq!(Caps::Round.for_level(ZoomLevel::new(14)), Caps::Round);
    }

    #[test]
    fn segments() {
        assert_eq!(segment_indices(4, 3), vec![4, 5, 5, 6]);
    }
}
