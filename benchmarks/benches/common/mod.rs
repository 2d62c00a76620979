//! A synthetic city block tile shared by the benchmarks.

use std::sync::Arc;

use geozero::mvt::{
    tile::{Feature, GeomType, Layer, Value},
    Message, Tile,
};
use mapcore::style::StyleSet;

const BLOCKS_PER_AXIS: i32 = 16;
const BLOCK_SIZE: i32 = 4096 / BLOCKS_PER_AXIS;

pub const STYLE: &str = r##"[
    { "layer": "water", "technique": "fill", "renderOrder": 1, "attr": { "color": "#2277dd" } },
    { "layer": "building", "technique": "extruded-polygon", "renderOrder": 5, "kind": "building",
      "attr": { "height": ["get", "height"], "color": "#cccccc" } },
    { "layer": "road", "technique": "solid-line", "renderOrder": 3,
      "attr": { "lineWidth": 6, "color": "#ffffff" } },
    { "layer": "road", "technique": "text", "attr": { "priority": 2 } },
    { "layer": "poi", "technique": "labeled-icon", "attr": { "imageTexture": "pin" } }
]"##;

fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

fn command(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

fn encode_path(points: &[(i32, i32)], close: bool) -> Vec<u32> {
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

fn number_value(value: f64) -> Value {
    Value {
        double_value: Some(value),
        ..Default::default()
    }
}

fn layer(name: &str, features: Vec<Feature>, keys: Vec<String>, values: Vec<Value>) -> Layer {
    Layer {
        version: 2,
        name: name.to_owned(),
        features,
        keys,
        values,
        extent: Some(4096),
    }
}

/// A tile with one building per block, a road between the blocks and a point of interest in
/// every block.
pub fn city_tile() -> Vec<u8> {
    let mut buildings = Vec::new();
    let mut pois = Vec::new();
    let mut values = Vec::new();
    let mut id = 1;
    for row in 0..BLOCKS_PER_AXIS {
        for column in 0..BLOCKS_PER_AXIS {
            let (x, y) = (column * BLOCK_SIZE + 16, row * BLOCK_SIZE + 16);
            let size = BLOCK_SIZE - 32;
            values.push(number_value(10.0 + (id % 7) as f64 * 5.0));
            buildings.push(Feature {
                id: Some(id),
                tags: vec![0, values.len() as u32 - 1],
                r#type: Some(GeomType::Polygon as i32),
                geometry: encode_path(
                    &[(x, y), (x + size, y), (x + size, y + size), (x, y + size)],
                    true,
                ),
            });
            pois.push(Feature {
                id: Some(id + 10_000),
                tags: vec![0, 0],
                r#type: Some(GeomType::Point as i32),
                geometry: encode_path(&[(x + size / 2, y + size / 2)], false),
            });
            id += 1;
        }
    }

    let mut roads = Vec::new();
    let mut road_names = Vec::new();
    for i in 0..=BLOCKS_PER_AXIS {
        let offset = i * BLOCK_SIZE;
        road_names.push(string_value(&format!("Street {i}")));
        road_names.push(string_value(&format!("Avenue {i}")));
        let name = road_names.len() as u32;
        roads.push(Feature {
            id: Some(20_000 + i as u64),
            tags: vec![0, name - 2],
            r#type: Some(GeomType::Linestring as i32),
            geometry: encode_path(&[(0, offset), (4096, offset)], false),
        });
        roads.push(Feature {
            id: Some(30_000 + i as u64),
            tags: vec![0, name - 1],
            r#type: Some(GeomType::Linestring as i32),
            geometry: encode_path(&[(offset, 0), (offset, 4096)], false),
        });
    }

    let water = Feature {
        id: Some(40_000),
        tags: vec![],
        r#type: Some(GeomType::Polygon as i32),
        geometry: encode_path(&[(0, 0), (4096, 0), (4096, 4096), (0, 4096)], true),
    };

    Tile {
        layers: vec![
            layer("water", vec![water], vec![], vec![]),
            layer("building", buildings, vec!["height".to_owned()], values),
            layer("road", roads, vec!["name".to_owned()], road_names),
            layer(
                "poi",
                pois,
                vec!["name".to_owned()],
                vec![string_value("Cafe")],
            ),
        ],
    }
    .encode_to_vec()
}

pub fn style_set() -> Arc<StyleSet> {
    Arc::new(StyleSet::from_json(STYLE).expect("benchmark style is valid"))
}
