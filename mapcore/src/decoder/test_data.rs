//! Hand encoded vector tiles.

use geozero::mvt::{
    tile::{Feature, GeomType, Layer, Value},
    Message, Tile,
};

fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

fn command(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

/// Encodes a ring or line starting at the first point, coordinates are absolute.
pub(crate) fn encode_path(points: &[(i32, i32)], close: bool) -> Vec<u32> {
    let mut geometry = vec![command(1, 1)];
    let (mut cx, mut cy) = (0, 0);
    for (i, (x, y)) in points.iter().enumerate() {
        if i == 1 {
            geometry.push(command(2, points.len() as u32 - 1));
        }
        geometry.push(zigzag(x - cx));
        geometry.push(zigzag(y - cy));
        cx = *x;
        cy = *y;
    }
    if close {
        geometry.push(command(7, 1));
    }
    geometry
}

fn string_value(value: &str) -> Value {
    Value {
        string_value: Some(value.to_owned()),
        ..Default::default()
    }
}

/// A tile with a full extent square in layer `water` and a labeled point in layer `places`.
pub(crate) fn sample_tile() -> Vec<u8> {
    let water = Layer {
        version: 2,
        name: "water".to_owned(),
        features: vec![Feature {
            id: Some(1),
            tags: vec![],
            r#type: Some(GeomType::Polygon as i32),
            geometry: encode_path(&[(0, 0), (4096, 0), (4096, 4096), (0, 4096)], true),
        }],
        keys: vec![],
        values: vec![],
        extent: Some(4096),
        ..Default::default()
    };
    let places = Layer {
        version: 2,
        name: "places".to_owned(),
        features: vec![Feature {
            id: Some(2),
            tags: vec![0, 0],
            r#type: Some(GeomType::Point as i32),
            geometry: encode_path(&[(100, 100)], false),
        }],
        keys: vec!["name".to_owned()],
        values: vec![string_value("Harbour")],
        extent: Some(4096),
        ..Default::default()
    };
    Tile {
        layers: vec![water, places],
        ..Default::default()
    }
    .encode_to_vec()
}
