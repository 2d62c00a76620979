//! Creation of [`TextElement`]s.

use std::{collections::HashMap, sync::Arc};

use cgmath::Vector3;

use crate::{
    coords::{TileKey, ZoomLevel},
    style::{Env, Technique},
    text::{
        render_order::{compose_render_order, RenderOrder},
        PoiInfo, TextElement, TextError,
    },
};

const DEFAULT_FONT_SIZE: f64 = 16.0;
const DEFAULT_TEXT_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub struct TextRenderStyle {
    pub color: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextLayoutStyle {
    pub font_size: f64,
}

/// Text styles derived from techniques, keyed by technique index and zoom level.
#[derive(Default)]
pub struct TextStyleCache {
    render_styles: HashMap<(usize, ZoomLevel), Arc<TextRenderStyle>>,
    layout_styles: HashMap<(usize, ZoomLevel), Arc<TextLayoutStyle>>,
}

impl TextStyleCache {
    pub fn render_style(&mut self, technique: &Technique, zoom: ZoomLevel) -> Arc<TextRenderStyle> {
        self.render_styles
            .entry((technique.index, zoom))
            .or_insert_with(|| {
                let env = Env::with_zoom(u8::from(zoom) as f64);
                Arc::new(TextRenderStyle {
                    color: technique.color(&env).unwrap_or(DEFAULT_TEXT_COLOR),
                })
            })
            .clone()
    }

    pub fn layout_style(&mut self, technique: &Technique, zoom: ZoomLevel) -> Arc<TextLayoutStyle> {
        self.layout_styles
            .entry((technique.index, zoom))
            .or_insert_with(|| {
                let env = Env::with_zoom(u8::from(zoom) as f64);
                Arc::new(TextLayoutStyle {
                    font_size: technique
                        .number(&technique.attrs.font_size, &env)
                        .unwrap_or(DEFAULT_FONT_SIZE),
                })
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.render_styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.render_styles.is_empty()
    }

    pub fn clear(&mut self) {
        self.render_styles.clear();
        self.layout_styles.clear();
    }
}

/// Attributes shared by all elements built with one technique.
#[derive(Clone, Debug)]
struct TechniqueParams {
    technique_index: usize,
    priority: f64,
    zoom_range: (f64, f64),
    may_overlap: bool,
    reserve_space: bool,
    render_order: RenderOrder,
    render_style: Arc<TextRenderStyle>,
    layout_style: Arc<TextLayoutStyle>,
}

/// Builds [`TextElement`]s of one tile. The attributes derived from a technique are computed in
/// [`with_technique`](Self::with_technique) and reused by every following
/// [`build`](Self::build) call.
pub struct TextElementBuilder {
    tile_key: TileKey,
    base_render_order: i64,
    env: Env,
    style_cache: TextStyleCache,
    params: Option<TechniqueParams>,
    poi_info: Option<PoiInfo>,
}

impl TextElementBuilder {
    /// `base_render_order` is the order of the data source the tile belongs to.
    pub fn new(tile_key: TileKey, base_render_order: i64) -> Self {
        Self {
            tile_key,
            base_render_order,
            env: Env::with_zoom(u8::from(tile_key.level()) as f64),
            style_cache: TextStyleCache::default(),
            params: None,
            poi_info: None,
        }
    }

    /// Configures the attributes of the following elements from `technique`. Clears a
    /// previously configured icon.
    pub fn with_technique(&mut self, technique: &Technique) -> &mut Self {
        let env = &self.env;
        let attrs = &technique.attrs;
        let (min_zoom, max_zoom) = technique.zoom_range(env);
        let text_min = technique.number(&attrs.text_min_zoom_level, env).unwrap_or(min_zoom);
        let text_max = technique.number(&attrs.text_max_zoom_level, env).unwrap_or(max_zoom);
        let icon_min = technique.number(&attrs.icon_min_zoom_level, env).unwrap_or(min_zoom);
        let icon_max = technique.number(&attrs.icon_max_zoom_level, env).unwrap_or(max_zoom);

        let zoom = self.tile_key.level();
        self.params = Some(TechniqueParams {
            technique_index: technique.index,
            priority: technique.number(&attrs.priority, env).unwrap_or(0.0),
            zoom_range: (text_min.min(icon_min), text_max.max(icon_max)),
            may_overlap: technique.boolean(&attrs.may_overlap, env, false),
            reserve_space: technique.boolean(&attrs.reserve_space, env, true),
            render_order: compose_render_order(
                self.base_render_order,
                technique.render_order as i64,
            ),
            render_style: self.style_cache.render_style(technique, zoom),
            layout_style: self.style_cache.layout_style(technique, zoom),
        });
        self.poi_info = None;
        self
    }

    /// Configures the icon of the following elements.
    pub fn with_icon(
        &mut self,
        image_texture: Option<String>,
        shield_group_index: Option<u32>,
    ) -> &mut Self {
        self.poi_info = Some(PoiInfo {
            image_texture,
            shield_group_index,
        });
        self
    }

    pub fn build(
        &self,
        text: &str,
        position: Vector3<f64>,
        feature_id: Option<u64>,
        array_index: usize,
    ) -> Result<TextElement, TextError> {
        self.element(text, vec![position], None, feature_id, array_index)
    }

    /// Builds an element which follows `path`.
    pub fn build_path(
        &self,
        text: &str,
        path: Vec<Vector3<f64>>,
        feature_id: Option<u64>,
        array_index: usize,
    ) -> Result<TextElement, TextError> {
        self.element(text, Vec::new(), Some(path), feature_id, array_index)
    }

    fn element(
        &self,
        text: &str,
        positions: Vec<Vector3<f64>>,
        path: Option<Vec<Vector3<f64>>>,
        feature_id: Option<u64>,
        array_index: usize,
    ) -> Result<TextElement, TextError> {
        let params = self.params.as_ref().ok_or(TextError::MissingTechnique)?;
        Ok(TextElement {
            text: text.to_owned(),
            positions,
            path,
            technique_index: params.technique_index,
            priority: params.priority,
            render_order: params.render_order,
            min_zoom_level: params.zoom_range.0,
            max_zoom_level: params.zoom_range.1,
            may_overlap: params.may_overlap,
            reserve_space: params.reserve_space,
            render_style: params.render_style.clone(),
            layout_style: params.layout_style.clone(),
            poi_info: self.poi_info.clone(),
            feature_id,
            array_index,
            tile_key: self.tile_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;
    use serde_json::json;

    use crate::{
        coords::{TileKey, ZoomLevel},
        style::{Technique, TechniqueKind},
        text::{builder::TextElementBuilder, render_order::compose_render_order, TextError},
    };

    fn technique(index: usize, attrs: serde_json::Value) -> Technique {
        Technique {
            index,
            name: TechniqueKind::LabeledIcon,
            render_order: 7,
            kind: None,
            attrs: serde_json::from_value(attrs).unwrap(),
        }
    }

    #[test]
    fn rebuild_with_same_technique_only_changes_text() {
        let key = TileKey::new(3, 4, ZoomLevel::new(5)).unwrap();
        let mut builder = TextElementBuilder::new(key, 2);
        let technique = technique(
            0,
            json!({ "priority": 10, "mayOverlap": true, "minZoomLevel": 3, "maxZoomLevel": 12 }),
        );
        builder.with_technique(&technique);

        let first = builder
            .build("Harbour", Vector3::new(1.0, 2.0, 0.0), Some(1), 0)
            .unwrap();
        let second = builder
            .build("Station", Vector3::new(5.0, 6.0, 0.0), Some(2), 1)
            .unwrap();

        assert_eq!(first.priority, second.priority);
        assert_eq!(first.priority, 10.0);
        assert_eq!(first.may_overlap, second.may_overlap);
        assert_eq!(first.reserve_space, second.reserve_space);
        assert_eq!(
            (first.min_zoom_level, first.max_zoom_level),
            (second.min_zoom_level, second.max_zoom_level)
        );
        assert_eq!(first.render_order, compose_render_order(2, 7));
        assert_ne!(first.text, second.text);
        assert_ne!(first.positions, second.positions);
    }

    #[test]
    fn zoom_range_is_union_of_text_and_icon() {
        let mut builder = TextElementBuilder::new(TileKey::root(), 0);
        builder.with_technique(&technique(
            0,
            json!({
                "textMinZoomLevel": 5, "textMaxZoomLevel": 10,
                "iconMinZoomLevel": 3, "iconMaxZoomLevel": 8
            }),
        ));
        let element = builder.build("a", Vector3::new(0.0, 0.0, 0.0), None, 0).unwrap();
        assert_eq!((element.min_zoom_level, element.max_zoom_level), (3.0, 10.0));
        assert!(element.is_visible_at(9.5));
        assert!(!element.is_visible_at(10.0));
    }

    #[test]
    fn icon_is_reset_by_technique() {
        let mut builder = TextElementBuilder::new(TileKey::root(), 0);
        let technique = technique(1, json!({ "color": "#ff0000" }));
        builder
            .with_technique(&technique)
            .with_icon(Some("bus".to_owned()), Some(2));
        let with_icon = builder.build("a", Vector3::new(0.0, 0.0, 0.0), None, 0).unwrap();
        assert_eq!(with_icon.poi_info.unwrap().shield_group_index, Some(2));
        assert_eq!(with_icon.render_style.color, [1.0, 0.0, 0.0, 1.0]);

        builder.with_technique(&technique);
        let without_icon = builder.build("a", Vector3::new(0.0, 0.0, 0.0), None, 1).unwrap();
        assert!(without_icon.poi_info.is_none());
    }

    #[test]
    fn building_without_technique_fails() {
        let builder = TextElementBuilder::new(TileKey::root(), 0);
        assert_eq!(
            builder
                .build("a", Vector3::new(0.0, 0.0, 0.0), None, 0)
                .unwrap_err(),
            TextError::MissingTechnique
        );
    }
}
