use criterion::{criterion_group, criterion_main, Criterion};
use mapcore::{
    coords::{TileKey, ZoomLevel},
    decoder::{decode_tile, DecodeOptions},
};

mod common;

fn bench_decode_tile(c: &mut Criterion) {
    let _ = env_logger::try_init();

    let data = common::city_tile();
    let style_set = common::style_set();
    let key = TileKey::new(11365, 17425, ZoomLevel::new(15)).expect("valid tile key");

    c.bench_function("decode_tile", |b| {
        let options = DecodeOptions::default();
        b.iter(|| decode_tile(key, &data, &style_set, &options))
    });

    c.bench_function("decode_tile_with_feature_ids", |b| {
        let options = DecodeOptions {
            gather_feature_ids: true,
            gather_road_segments: true,
            ..DecodeOptions::default()
        };
        b.iter(|| decode_tile(key, &data, &style_set, &options))
    });
}

criterion_group!(benches, bench_decode_tile);
criterion_main!(benches);
