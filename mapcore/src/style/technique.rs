//! Techniques are resolved style rules, i.e. the recipe with which a feature is rendered.

use std::fmt;

use csscolorparser::Color;
use serde::{Deserialize, Deserializer, Serialize};

use crate::style::expr::{Env, Expr, Value};

/// A style attribute, either a plain value or an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum StyleProperty {
    Constant(Value),
    Expression(Expr),
}

impl StyleProperty {
    pub fn evaluate(&self, env: &Env) -> Value {
        match self {
            StyleProperty::Constant(value) => value.clone(),
            StyleProperty::Expression(expr) => expr.evaluate(env),
        }
    }

    /// True if the property must be re-evaluated whenever the zoom level or feature state
    /// changes.
    pub fn is_dynamic(&self) -> bool {
        match self {
            StyleProperty::Constant(_) => false,
            StyleProperty::Expression(expr) => expr.is_dynamic(),
        }
    }

    pub fn references_state(&self) -> bool {
        match self {
            StyleProperty::Constant(_) => false,
            StyleProperty::Expression(expr) => expr.references_state(),
        }
    }

    /// Replaces a feature dependent expression with its value for `env`. Dynamic expressions
    /// are kept.
    pub fn resolve(&self, env: &Env) -> StyleProperty {
        match self {
            StyleProperty::Expression(expr) if !expr.is_dynamic() => {
                StyleProperty::Constant(expr.evaluate(env))
            }
            other => other.clone(),
        }
    }
}

impl<'de> Deserialize<'de> for StyleProperty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        if Expr::is_call(&v) {
            return Expr::parse(&v)
                .map(StyleProperty::Expression)
                .map_err(serde::de::Error::custom);
        }
        Value::from_json(&v)
            .map(StyleProperty::Constant)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid style property {v}")))
    }
}

impl From<Value> for StyleProperty {
    fn from(value: Value) -> Self {
        StyleProperty::Constant(value)
    }
}

/// The name of a technique, which selects the geometry that is emitted for a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TechniqueKind {
    Line,
    SolidLine,
    Fill,
    ExtrudedLine,
    ExtrudedPolygon,
    Text,
    LabeledIcon,
    LineMarker,
}

impl TechniqueKind {
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            TechniqueKind::Text | TechniqueKind::LabeledIcon | TechniqueKind::LineMarker
        )
    }

    pub fn is_line(&self) -> bool {
        matches!(
            self,
            TechniqueKind::Line | TechniqueKind::SolidLine | TechniqueKind::ExtrudedLine
        )
    }
}

impl fmt::Display for TechniqueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TechniqueKind::Line => "line",
            TechniqueKind::SolidLine => "solid-line",
            TechniqueKind::Fill => "fill",
            TechniqueKind::ExtrudedLine => "extruded-line",
            TechniqueKind::ExtrudedPolygon => "extruded-polygon",
            TechniqueKind::Text => "text",
            TechniqueKind::LabeledIcon => "labeled-icon",
            TechniqueKind::LineMarker => "line-marker",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextureCoordinateType {
    /// `u = x / extent`, `v = y / extent` in tile local coordinates.
    TileSpace,
    #[default]
    None,
}

/// Attributes of a technique. Every attribute is optional and falls back to a default of the
/// consumer.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TechniqueAttributes {
    pub enabled: Option<StyleProperty>,
    pub min_zoom_level: Option<StyleProperty>,
    pub max_zoom_level: Option<StyleProperty>,
    pub color: Option<StyleProperty>,
    pub opacity: Option<StyleProperty>,
    /// Line width in meters.
    pub line_width: Option<StyleProperty>,
    pub caps: Option<StyleProperty>,
    pub height: Option<StyleProperty>,
    pub min_height: Option<StyleProperty>,
    pub boundary_walls: Option<StyleProperty>,
    pub edges: Option<StyleProperty>,
    pub texture_coordinate_type: Option<TextureCoordinateType>,
    pub text: Option<StyleProperty>,
    pub priority: Option<StyleProperty>,
    pub text_min_zoom_level: Option<StyleProperty>,
    pub text_max_zoom_level: Option<StyleProperty>,
    pub icon_min_zoom_level: Option<StyleProperty>,
    pub icon_max_zoom_level: Option<StyleProperty>,
    pub image_texture: Option<StyleProperty>,
    pub may_overlap: Option<StyleProperty>,
    pub reserve_space: Option<StyleProperty>,
    pub font_size: Option<StyleProperty>,
    pub render_order_offset: Option<StyleProperty>,
}

impl TechniqueAttributes {
    /// Resolves attributes which only depend on the attributes of the feature in `env`.
    ///
    /// Attributes evaluated per feature by the emitter (`text`, `height`, `minHeight`,
    /// `lineWidth`) are kept as they are, so that features which only differ in those share one
    /// technique.
    pub fn resolve(&self, env: &Env) -> TechniqueAttributes {
        let resolve = |p: &Option<StyleProperty>| p.as_ref().map(|p| p.resolve(env));
        TechniqueAttributes {
            enabled: resolve(&self.enabled),
            min_zoom_level: resolve(&self.min_zoom_level),
            max_zoom_level: resolve(&self.max_zoom_level),
            color: resolve(&self.color),
            opacity: resolve(&self.opacity),
            line_width: self.line_width.clone(),
            caps: resolve(&self.caps),
            height: self.height.clone(),
            min_height: self.min_height.clone(),
            boundary_walls: resolve(&self.boundary_walls),
            edges: resolve(&self.edges),
            texture_coordinate_type: self.texture_coordinate_type,
            text: self.text.clone(),
            priority: resolve(&self.priority),
            text_min_zoom_level: resolve(&self.text_min_zoom_level),
            text_max_zoom_level: resolve(&self.text_max_zoom_level),
            icon_min_zoom_level: resolve(&self.icon_min_zoom_level),
            icon_max_zoom_level: resolve(&self.icon_max_zoom_level),
            image_texture: resolve(&self.image_texture),
            may_overlap: resolve(&self.may_overlap),
            reserve_space: resolve(&self.reserve_space),
            font_size: resolve(&self.font_size),
            render_order_offset: resolve(&self.render_order_offset),
        }
    }

    fn all(&self) -> [&Option<StyleProperty>; 22] {
        [
            &self.enabled,
            &self.min_zoom_level,
            &self.max_zoom_level,
            &self.color,
            &self.opacity,
            &self.line_width,
            &self.caps,
            &self.height,
            &self.min_height,
            &self.boundary_walls,
            &self.edges,
            &self.text,
            &self.priority,
            &self.text_min_zoom_level,
            &self.text_max_zoom_level,
            &self.icon_min_zoom_level,
            &self.icon_max_zoom_level,
            &self.image_texture,
            &self.may_overlap,
            &self.reserve_space,
            &self.font_size,
            &self.render_order_offset,
        ]
    }
}

/// A rendering recipe produced by the style set evaluator.
///
/// `index` is unique within one decode and is used to group geometry by technique.
#[derive(Clone, Debug, PartialEq)]
pub struct Technique {
    pub index: usize,
    pub name: TechniqueKind,
    pub render_order: i32,
    /// Content tag of the technique, e.g. `building`.
    pub kind: Option<String>,
    pub attrs: TechniqueAttributes,
}

impl Technique {
    /// True if any attribute reads the feature state. Such techniques are evaluated per feature
    /// group every frame.
    pub fn is_state_dependent(&self) -> bool {
        self.attrs
            .all()
            .iter()
            .any(|p| p.as_ref().map_or(false, StyleProperty::references_state))
    }

    /// True if `enabled` and the zoom range can be evaluated once, independent of the camera.
    pub fn is_static(&self) -> bool {
        [
            &self.attrs.enabled,
            &self.attrs.min_zoom_level,
            &self.attrs.max_zoom_level,
        ]
        .iter()
        .all(|p| p.as_ref().map_or(true, |p| !p.is_dynamic()))
    }

    pub fn is_building(&self) -> bool {
        self.kind.as_deref() == Some("building")
    }

    pub fn number(&self, property: &Option<StyleProperty>, env: &Env) -> Option<f64> {
        property.as_ref().and_then(|p| p.evaluate(env).as_f64())
    }

    pub fn boolean(&self, property: &Option<StyleProperty>, env: &Env, default: bool) -> bool {
        match property.as_ref().map(|p| p.evaluate(env)) {
            None | Some(Value::Null) => default,
            Some(value) => value.is_truthy(),
        }
    }

    pub fn string(&self, property: &Option<StyleProperty>, env: &Env) -> Option<String> {
        match property.as_ref().map(|p| p.evaluate(env)) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        }
    }

    pub fn enabled(&self, env: &Env) -> bool {
        self.boolean(&self.attrs.enabled, env, true)
    }

    /// Returns `(min, max)` zoom levels, the max level is exclusive.
    pub fn zoom_range(&self, env: &Env) -> (f64, f64) {
        (
            self.number(&self.attrs.min_zoom_level, env)
                .unwrap_or(f64::NEG_INFINITY),
            self.number(&self.attrs.max_zoom_level, env)
                .unwrap_or(f64::INFINITY),
        )
    }

    pub fn render_order_offset(&self, env: &Env) -> i32 {
        self.number(&self.attrs.render_order_offset, env)
            .map_or(0, |offset| offset as i32)
    }

    pub fn color(&self, env: &Env) -> Option<[f32; 4]> {
        let color = self.string(&self.attrs.color, env)?;
        match color.parse::<Color>() {
            Ok(color) => {
                let opacity = self.number(&self.attrs.opacity, env).unwrap_or(1.0);
                Some([
                    color.r as f32,
                    color.g as f32,
                    color.b as f32,
                    (color.a * opacity) as f32,
                ])
            }
            Err(e) => {
                log::warn!("technique {} has invalid color {color}: {e}", self.index);
                None
            }
        }
    }
}
