//! Selection of the tile objects drawn in a frame.

use std::{cmp::Ordering, collections::HashMap};

use cgmath::{InnerSpace, Vector3};

use crate::{
    coords::ZoomLevel,
    render::{groups::regenerate_groups, RenderItem, RootNode},
    style::{expr::LEVEL_BINDING, Env, Value},
    text::render_order::RenderOrder,
    tile::Tile,
};

/// Adds the visible objects of tiles to the [`RootNode`] of a frame.
///
/// Stencil reference values are allocated per render order. The allocation starts at 1 every
/// frame, 0 is the value of a cleared stencil buffer.
pub struct TileObjectRenderer {
    stencil_refs: HashMap<RenderOrder, u32>,
    next_stencil_ref: u32,
}

impl Default for TileObjectRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TileObjectRenderer {
    pub fn new() -> Self {
        Self {
            stencil_refs: HashMap::new(),
            next_stencil_ref: 1,
        }
    }

    /// Starts a new frame.
    pub fn prepare_render(&mut self) {
        self.stencil_refs.clear();
        self.next_stencil_ref = 1;
    }

    /// Adds the objects of `tile` which are visible at `zoom_level`. Returns the number of added
    /// objects.
    ///
    /// `storage_level` is the level of the tiles which are displayed at `zoom_level`.
    #[tracing::instrument(skip_all)]
    pub fn render(
        &mut self,
        tile: &Tile,
        storage_level: ZoomLevel,
        zoom_level: f64,
        camera_position: Vector3<f64>,
        root: &mut RootNode,
    ) -> usize {
        if !tile.visible {
            return 0;
        }
        let (Some(decoded), Some(center)) = (tile.decoded_tile(), tile.center()) else {
            return 0;
        };

        let mut env = Env::with_zoom(zoom_level);
        env.insert(LEVEL_BINDING, Value::Number(u8::from(storage_level) as f64));

        let offset = center - camera_position;
        let camera_offset = Vector3::new(offset.x as f32, offset.y as f32, offset.z as f32);
        let depth = offset.magnitude();
        let matches_level = tile.tile_key().level() == storage_level;

        let mut added = 0;
        for object in tile.objects() {
            if !object.visible {
                continue;
            }

            let technique = &object.technique;
            let visible = match &object.static_visibility {
                Some(visibility) => visibility.is_visible_at(zoom_level),
                None => {
                    // A state dependent `enabled` is decided per feature group below.
                    let (min_zoom, max_zoom) = technique.zoom_range(&env);
                    (technique.is_state_dependent() || technique.enabled(&env))
                        && zoom_level >= min_zoom
                        && zoom_level < max_zoom
                }
            };
            if !visible {
                continue;
            }

            let groups = if technique.is_state_dependent() {
                let Some(geometry) = decoded.geometries.get(object.geometry_index) else {
                    continue;
                };
                let states = tile.feature_state().read();
                regenerate_groups(geometry, technique, &env, &states)
            } else {
                None
            };
            match &groups {
                Some(groups) if groups.is_empty() => continue,
                None if technique.is_state_dependent() && !technique.enabled(&env) => continue,
                _ => {}
            }

            root.add(RenderItem {
                tile_key: tile.tile_key(),
                data_source_order: tile.data_source_order(),
                object_id: object.object_id,
                geometry_index: object.geometry_index,
                program_id: object.program_id,
                material_id: object.material_id,
                render_order: object.render_order,
                transparent: object.transparent,
                is_building: technique.is_building(),
                matches_level,
                depth,
                stencil_ref: self.allocate_stencil_ref(object.render_order),
                camera_offset,
                groups,
            });
            added += 1;
        }
        added
    }

    pub fn stencil_ref(&self, render_order: RenderOrder) -> Option<u32> {
        self.stencil_refs.get(&render_order).copied()
    }

    fn allocate_stencil_ref(&mut self, render_order: RenderOrder) -> u32 {
        let next = &mut self.next_stencil_ref;
        *self.stencil_refs.entry(render_order).or_insert_with(|| {
            let stencil_ref = *next;
            *next += 1;
            stencil_ref
        })
    }
}

/// Ground objects of tiles from other levels are drawn first, then ground objects of the
/// displayed level, then buildings.
fn level_bucket(item: &RenderItem) -> u8 {
    match (item.is_building, item.matches_level) {
        (true, _) => 2,
        (false, true) => 1,
        (false, false) => 0,
    }
}

/// The draw order of render items. The tile morton code is compared before program, material
/// and object ids, which depend on the order in which tiles were loaded.
pub fn compare_draw_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    let depth = if a.transparent {
        b.depth.total_cmp(&a.depth)
    } else {
        a.depth.total_cmp(&b.depth)
    };
    a.data_source_order
        .cmp(&b.data_source_order)
        .then(level_bucket(a).cmp(&level_bucket(b)))
        .then(a.transparent.cmp(&b.transparent))
        .then(a.render_order.cmp(&b.render_order))
        .then(a.tile_key.morton_code().cmp(&b.tile_key.morton_code()))
        .then(a.program_id.cmp(&b.program_id))
        .then(a.material_id.cmp(&b.material_id))
        .then(depth)
        .then(a.object_id.cmp(&b.object_id))
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use crate::{
        coords::{TileKey, ZoomLevel},
        render::{renderer::TileObjectRenderer, RenderItem, RootNode},
        style::{AttributeMap, Value},
        text::render_order::compose_render_order,
        tile::{
            tests::{attachment, decoded_with_style},
            Tile,
        },
    };

    fn tile(key: TileKey, style: &str) -> Tile {
        let mut tile = Tile::new(key, 0);
        tile.attach(attachment());
        tile.set_decoded_tile(decoded_with_style(key, style));
        tile
    }

    fn camera() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, 1000.0)
    }

    const TWO_LAYERS: &str = r##"[
        { "layer": "water", "technique": "fill", "renderOrder": 1 },
        { "layer": "water", "technique": "solid-line", "renderOrder": 2, "attr": { "lineWidth": 4 } },
        { "layer": "water", "technique": "line", "renderOrder": 1, "attr": { "renderOrderOffset": 0 } }
    ]"##;

    #[test]
    fn stencil_refs_start_at_one_every_frame() {
        let key = TileKey::new(5, 3, ZoomLevel::new(4)).unwrap();
        let tile = tile(key, TWO_LAYERS);
        let mut renderer = TileObjectRenderer::new();
        let mut root = RootNode::new();

        renderer.prepare_render();
        let added = renderer.render(&tile, ZoomLevel::new(4), 4.0, camera(), &mut root);
        assert_eq!(added, 3);
        assert_eq!(renderer.stencil_ref(compose_render_order(1, 0)), Some(1));
        assert_eq!(renderer.stencil_ref(compose_render_order(2, 0)), Some(2));
        let refs: Vec<u32> = root.items().iter().map(|i| i.stencil_ref).collect();
        assert!(refs.iter().all(|r| *r == 1 || *r == 2));

        renderer.prepare_render();
        assert_eq!(renderer.stencil_ref(compose_render_order(1, 0)), None);
        root.clear();
        renderer.render(&tile, ZoomLevel::new(4), 4.0, camera(), &mut root);
        assert_eq!(root.items()[0].stencil_ref, 1);
    }

    #[test]
    fn camera_relative_offset() {
        let key = TileKey::new(5, 3, ZoomLevel::new(4)).unwrap();
        let tile = tile(key, TWO_LAYERS);
        let camera = tile.center().unwrap() + Vector3::new(10.0, -20.0, 500.0);
        let mut root = RootNode::new();
        TileObjectRenderer::new().render(&tile, ZoomLevel::new(4), 4.0, camera, &mut root);
        assert_eq!(
            root.items()[0].camera_offset,
            Vector3::new(-10.0f32, 20.0, -500.0)
        );
    }

    #[test]
    fn disabled_and_zoomed_out_objects_are_skipped() {
        let key = TileKey::new(5, 3, ZoomLevel::new(4)).unwrap();
        let tile = tile(
            key,
            r##"[
                { "layer": "water", "technique": "fill", "attr": { "maxZoomLevel": 10 } },
                { "layer": "water", "technique": "solid-line",
                  "attr": { "enabled": ["step", ["zoom"], false, 12, true] } }
            ]"##,
        );
        let mut renderer = TileObjectRenderer::new();

        let mut root = RootNode::new();
        renderer.render(&tile, ZoomLevel::new(4), 8.0, camera(), &mut root);
        assert_eq!(root.len(), 1);
        assert_eq!(root.items()[0].program_id, 3);

        root.clear();
        renderer.render(&tile, ZoomLevel::new(4), 12.5, camera(), &mut root);
        assert_eq!(root.len(), 1);
        assert_eq!(root.items()[0].program_id, 2);
    }

    #[test]
    fn feature_state_disables_feature_groups() {
        let key = TileKey::new(5, 3, ZoomLevel::new(4)).unwrap();
        let tile = tile(
            key,
            r##"[{ "layer": "water", "technique": "fill",
                   "attr": { "enabled": ["!", ["feature-state", "hidden"]] } }]"##,
        );
        let mut renderer = TileObjectRenderer::new();
        let mut root = RootNode::new();
        renderer.render(&tile, ZoomLevel::new(4), 4.0, camera(), &mut root);
        let groups = root.items()[0].groups.clone().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!((groups[0].start, groups[0].count), (0, 6));

        let mut state = AttributeMap::new();
        state.insert("hidden".to_owned(), Value::Bool(true));
        tile.feature_state().write().set(1, state);
        root.clear();
        assert_eq!(
            renderer.render(&tile, ZoomLevel::new(4), 4.0, camera(), &mut root),
            0
        );
    }

    #[test]
    fn state_can_enable_features() {
        let key = TileKey::new(5, 3, ZoomLevel::new(4)).unwrap();
        let tile = tile(
            key,
            r##"[{ "layer": "water", "technique": "fill",
                   "attr": { "enabled": ["==", ["feature-state", "selected"], true] } }]"##,
        );
        let mut renderer = TileObjectRenderer::new();
        let mut root = RootNode::new();
        assert_eq!(
            renderer.render(&tile, ZoomLevel::new(4), 4.0, camera(), &mut root),
            0
        );

        let mut state = AttributeMap::new();
        state.insert("selected".to_owned(), Value::Bool(true));
        tile.feature_state().write().set(1, state);
        assert_eq!(
            renderer.render(&tile, ZoomLevel::new(4), 4.0, camera(), &mut root),
            1
        );
        let groups = root.items()[0].groups.clone().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!((groups[0].start, groups[0].count), (0, 6));
    }

    fn item(tile_key: TileKey, object_id: u32, render_order: i64, building: bool) -> RenderItem {
        RenderItem {
            tile_key,
            data_source_order: 0,
            object_id,
            geometry_index: object_id as usize,
            program_id: 3,
            material_id: 0,
            render_order: compose_render_order(render_order, 0),
            transparent: false,
            is_building: building,
            matches_level: true,
            depth: 100.0,
            stencil_ref: 1,
            camera_offset: Vector3::new(0.0, 0.0, 0.0),
            groups: None,
        }
    }

    #[test]
    fn draw_order_is_independent_of_load_order() {
        let a = TileKey::new(0, 0, ZoomLevel::new(2)).unwrap();
        let b = TileKey::new(0, 1, ZoomLevel::new(2)).unwrap();
        let items = vec![
            item(b, 0, 1, false),
            item(a, 1, 1, false),
            item(a, 0, 2, true),
            item(b, 1, 0, false),
            item(a, 2, 1, false),
        ];

        let mut forward = RootNode::new();
        items.iter().cloned().for_each(|i| forward.add(i));
        let mut backward = RootNode::new();
        items.iter().rev().cloned().for_each(|i| backward.add(i));
        forward.sort();
        backward.sort();
        assert_eq!(forward.items(), backward.items());

        let order: Vec<(TileKey, u32)> = forward
            .items()
            .iter()
            .map(|i| (i.tile_key, i.object_id))
            .collect();
        assert_eq!(order, vec![(b, 1), (a, 1), (a, 2), (b, 0), (a, 0)]);
    }
}
