use cgmath::{ortho, Vector3};
use criterion::{criterion_group, criterion_main, Criterion};
use mapcore::{
    coords::{TileKey, ZoomLevel},
    decoder::{decode_tile, DecodeOptions},
    projection::Projection,
    render::{renderer::TileObjectRenderer, RootNode},
    text::placement::{LabelPlacer, PlacementSettings},
    tile::{Tile, TileAttachment},
};

mod common;

fn tiles() -> Vec<Tile> {
    let data = common::city_tile();
    let style_set = common::style_set();
    let options = DecodeOptions::default();
    let level = ZoomLevel::new(15);

    let mut tiles = Vec::new();
    for row in 0..4 {
        for column in 0..4 {
            let key = TileKey::new(11365 + row, 17425 + column, level).expect("valid tile key");
            let decoded =
                decode_tile(key, &data, &style_set, &options).expect("benchmark tile decodes");
            let mut tile = Tile::new(key, 0);
            tile.attach(TileAttachment {
                data_source: "city".to_owned(),
                data_source_order: 0,
                projection: Projection::Mercator,
                feature_state: Default::default(),
            });
            tile.set_decoded_tile(decoded);
            tiles.push(tile);
        }
    }
    tiles
}

fn bench_render(c: &mut Criterion) {
    let _ = env_logger::try_init();

    let tiles = tiles();
    let level = ZoomLevel::new(15);
    let camera = tiles[5].center().expect("tile is decoded") + Vector3::new(0.0, 0.0, 1500.0);

    c.bench_function("render_tile_objects", |b| {
        let mut renderer = TileObjectRenderer::new();
        let mut root = RootNode::new();
        b.iter(|| {
            root.clear();
            renderer.prepare_render();
            for tile in &tiles {
                renderer.render(tile, level, 15.5, camera, &mut root);
            }
            root.sort();
            root.len()
        })
    });

    c.bench_function("place_labels", |b| {
        let elements: Vec<_> = tiles
            .iter()
            .flat_map(|tile| tile.text_elements().iter().cloned())
            .collect();
        let size = 2500.0;
        let view_projection = ortho(
            camera.x - size,
            camera.x + size,
            camera.y - size,
            camera.y + size,
            -10_000.0,
            10_000.0,
        );
        let mut placer = LabelPlacer::new(PlacementSettings::default(), 1920.0, 1080.0);
        b.iter(|| placer.place(&elements, &view_projection, 15.5).len())
    });
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
