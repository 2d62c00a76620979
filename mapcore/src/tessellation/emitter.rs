//! Conversion of features and their techniques into the buffers of a [`DecodedTile`].

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use cgmath::{Point2, Vector3};
use log::{debug, warn};

use crate::{
    coords::{TileKey, EXTENT},
    decoder::{
        feature::{Feature, FeatureGeometry},
        DecodeError, DecodeOptions,
    },
    projection::Projection,
    style::{technique::TextureCoordinateType, AttributeMap, Env, Technique, TechniqueKind},
    tessellation::{
        line::{segment_indices, tessellate_ribbon, Caps},
        polygon::{group_rings, open_ring, triangulate},
        BufferAttribute, DecodedTile, Geometry, GeometryType, Group, IndexDataType,
        PathGeometry, PoiGeometry, TextGeometry, TextPathGeometry,
    },
    util::math::{Aabb2, Aabb3},
};

/// Estimated average width of a glyph in pixels.
pub const MIN_AVERAGE_CHAR_WIDTH: f64 = 5.0;

/// Labels may be somewhat longer than their line before they are dropped.
const SHORT_LABEL_FUDGE_FACTOR: f64 = 0.5;

/// Stored in the feature ids of a geometry for features without an id.
pub const UNKNOWN_FEATURE_ID: u64 = u64::MAX;

const DEFAULT_LINE_WIDTH: f64 = 1.0;

/// Projects tile local coordinates to positions relative to the tile center.
struct TileProjector {
    key: TileKey,
    projection: Projection,
    center: Vector3<f64>,
    bounding_box: Aabb3,
}

impl TileProjector {
    fn new(key: TileKey, projection: Projection) -> Self {
        let center = projection.project_tile_point(&key, EXTENT / 2.0, EXTENT / 2.0, 0.0);
        let mut bounding_box = Aabb3::empty();
        for (x, y) in [(0.0, 0.0), (EXTENT, 0.0), (EXTENT, EXTENT), (0.0, EXTENT)] {
            bounding_box.expand(projection.project_tile_point(&key, x, y, 0.0));
        }
        Self {
            key,
            projection,
            center,
            bounding_box,
        }
    }

    fn project(&mut self, x: f64, y: f64, altitude: f64) -> [f32; 3] {
        let world = self.projection.project_tile_point(&self.key, x, y, altitude);
        self.bounding_box.expand(world);
        let relative = world - self.center;
        [relative.x as f32, relative.y as f32, relative.z as f32]
    }

    fn meters_to_tile_units(&self, meters: f64) -> f64 {
        meters * self.projection.scale_factor(&self.key) / self.key.size_in_meters() * EXTENT
    }
}

/// Accumulates the buffers of one technique and render order offset.
struct MeshBuffers {
    geometry_type: GeometryType,
    technique_index: usize,
    render_order_offset: i32,
    positions: Vec<f32>,
    uvs: Vec<f32>,
    extrusion_axis: Vec<f32>,
    indices: Vec<IndexDataType>,
    edge_indices: Vec<IndexDataType>,
    feature_ids: Vec<u64>,
    feature_starts: Vec<u32>,
    obj_infos: Vec<AttributeMap>,
}

impl MeshBuffers {
    fn new(geometry_type: GeometryType, technique_index: usize, render_order_offset: i32) -> Self {
        Self {
            geometry_type,
            technique_index,
            render_order_offset,
            positions: Vec::new(),
            uvs: Vec::new(),
            extrusion_axis: Vec::new(),
            indices: Vec::new(),
            edge_indices: Vec::new(),
            feature_ids: Vec::new(),
            feature_starts: Vec::new(),
            obj_infos: Vec::new(),
        }
    }

    fn vertex_count(&self) -> IndexDataType {
        (self.positions.len() / 3) as IndexDataType
    }

    fn push_position(&mut self, position: [f32; 3]) {
        self.positions.extend_from_slice(&position);
    }

    fn push_tile_space_uv(&mut self, x: f64, y: f64) {
        self.uvs
            .extend_from_slice(&[(x / EXTENT) as f32, (y / EXTENT) as f32]);
    }

    fn begin_feature(&mut self, id: Option<u64>, obj_info: Option<&AttributeMap>) {
        self.feature_ids.push(id.unwrap_or(UNKNOWN_FEATURE_ID));
        self.feature_starts.push(self.indices.len() as u32);
        if let Some(obj_info) = obj_info {
            self.obj_infos.push(obj_info.clone());
        }
    }

    fn into_geometry(self) -> Geometry {
        let mut vertex_attributes = vec![BufferAttribute::from_f32("position", 3, &self.positions)];
        if !self.uvs.is_empty() {
            vertex_attributes.push(BufferAttribute::from_f32("uv", 2, &self.uvs));
        }
        if !self.extrusion_axis.is_empty() {
            vertex_attributes.push(BufferAttribute::from_f32(
                "extrusionAxis",
                4,
                &self.extrusion_axis,
            ));
        }

        let groups = vec![Group {
            start: 0,
            count: self.indices.len() as u32,
            technique_index: self.technique_index,
            render_order_offset: self.render_order_offset,
        }];
        let gathered = !self.feature_ids.is_empty();

        Geometry {
            geometry_type: self.geometry_type,
            vertex_attributes,
            interleaved_vertex_attributes: None,
            index: (!self.indices.is_empty())
                .then(|| BufferAttribute::from_u32("index", &self.indices)),
            edge_index: (!self.edge_indices.is_empty())
                .then(|| BufferAttribute::from_u32("edgeIndex", &self.edge_indices)),
            groups,
            feature_ids: gathered.then_some(self.feature_ids),
            feature_starts: gathered.then_some(self.feature_starts),
            obj_infos: (!self.obj_infos.is_empty()).then_some(self.obj_infos),
        }
    }
}

fn mesh_geometry_type(kind: TechniqueKind) -> Option<GeometryType> {
    match kind {
        TechniqueKind::Line => Some(GeometryType::Line),
        TechniqueKind::SolidLine => Some(GeometryType::SolidLine),
        TechniqueKind::ExtrudedLine => Some(GeometryType::ExtrudedLine),
        TechniqueKind::Fill => Some(GeometryType::Polygon),
        TechniqueKind::ExtrudedPolygon => Some(GeometryType::ExtrudedPolygon),
        TechniqueKind::Text | TechniqueKind::LabeledIcon | TechniqueKind::LineMarker => None,
    }
}

fn mesh_entry<'m>(
    meshes: &'m mut BTreeMap<(usize, i32), MeshBuffers>,
    technique: &Technique,
    env: &Env,
) -> Option<&'m mut MeshBuffers> {
    let geometry_type = mesh_geometry_type(technique.name)?;
    let render_order_offset = technique.render_order_offset(env);
    Some(
        meshes
            .entry((technique.index, render_order_offset))
            .or_insert_with(|| {
                MeshBuffers::new(geometry_type, technique.index, render_order_offset)
            }),
    )
}

/// Collects the geometry of all features of one tile.
pub struct DecodedTileEmitter<'a> {
    options: &'a DecodeOptions,
    projector: TileProjector,
    meshes: BTreeMap<(usize, i32), MeshBuffers>,
    text_geometries: BTreeMap<usize, TextGeometry>,
    poi_geometries: BTreeMap<usize, PoiGeometry>,
    shield_groups: HashMap<(usize, String, Option<String>), u32>,
    text_path_geometries: Vec<TextPathGeometry>,
    path_geometries: Vec<PathGeometry>,
}

impl<'a> DecodedTileEmitter<'a> {
    pub fn new(key: TileKey, options: &'a DecodeOptions) -> Self {
        Self {
            options,
            projector: TileProjector::new(key, options.projection),
            meshes: BTreeMap::new(),
            text_geometries: BTreeMap::new(),
            poi_geometries: BTreeMap::new(),
            shield_groups: HashMap::new(),
            text_path_geometries: Vec::new(),
            path_geometries: Vec::new(),
        }
    }

    /// Emits the geometry of `feature` for each of its matched `techniques`.
    pub fn process_feature(&mut self, feature: &Feature, env: &Env, techniques: &[Arc<Technique>]) {
        for technique in techniques {
            let statically_enabled = technique
                .attrs
                .enabled
                .as_ref()
                .map_or(true, |enabled| enabled.is_dynamic() || enabled.evaluate(env).is_truthy());
            if !statically_enabled {
                continue;
            }

            match (&feature.geometry, technique.name) {
                (FeatureGeometry::Points(points), TechniqueKind::Text) => {
                    self.add_point_labels(feature, env, technique, points)
                }
                (
                    FeatureGeometry::Points(points),
                    TechniqueKind::LabeledIcon | TechniqueKind::LineMarker,
                ) => self.add_pois(feature, env, technique, points),
                (FeatureGeometry::Lines(lines), TechniqueKind::Text) => {
                    self.add_text_paths(feature, env, technique, lines)
                }
                (FeatureGeometry::Lines(lines), TechniqueKind::LineMarker) => {
                    for line in lines {
                        self.add_pois(feature, env, technique, line);
                    }
                }
                (
                    FeatureGeometry::Lines(lines),
                    TechniqueKind::Line | TechniqueKind::SolidLine | TechniqueKind::ExtrudedLine,
                ) => self.add_lines(feature, env, technique, lines, false),
                (
                    FeatureGeometry::Rings(rings),
                    TechniqueKind::Line | TechniqueKind::SolidLine | TechniqueKind::ExtrudedLine,
                ) => self.add_lines(feature, env, technique, rings, true),
                (FeatureGeometry::Rings(rings), TechniqueKind::Fill) => {
                    self.add_polygons(feature, env, technique, rings, false)
                }
                (FeatureGeometry::Rings(rings), TechniqueKind::ExtrudedPolygon) => {
                    self.add_polygons(feature, env, technique, rings, true)
                }
                (
                    FeatureGeometry::Rings(rings),
                    TechniqueKind::Text | TechniqueKind::LabeledIcon,
                ) => {
                    let Some(center) = rings.first().and_then(|outer| ring_center(outer)) else {
                        continue;
                    };
                    if technique.name == TechniqueKind::Text {
                        self.add_point_labels(feature, env, technique, &[center]);
                    } else {
                        self.add_pois(feature, env, technique, &[center]);
                    }
                }
                (geometry, kind) => {
                    debug!(
                        "technique {kind} can not be applied to {} geometry",
                        geometry.name()
                    );
                }
            }
        }

        if let FeatureGeometry::Lines(lines) = &feature.geometry {
            if self.options.gather_road_segments && techniques.iter().any(|t| t.name.is_line()) {
                for line in lines {
                    self.path_geometries.push(PathGeometry {
                        path: line.clone(),
                        feature_id: feature.id,
                        obj_info: feature.properties.clone(),
                    });
                }
            }
        }
    }

    fn obj_info<'f>(&self, feature: &'f Feature) -> Option<&'f AttributeMap> {
        self.options
            .gather_feature_ids
            .then_some(&feature.properties)
    }

    fn gathers_features(&self, technique: &Technique) -> bool {
        self.options.gather_feature_ids || technique.is_state_dependent()
    }

    fn add_lines(
        &mut self,
        feature: &Feature,
        env: &Env,
        technique: &Technique,
        lines: &[Vec<[f64; 2]>],
        closed: bool,
    ) {
        let key = self.projector.key;
        let projection = self.projector.projection;
        let width = technique
            .number(&technique.attrs.line_width, env)
            .unwrap_or(DEFAULT_LINE_WIDTH);
        let width = self.projector.meters_to_tile_units(width);
        let default_caps = match technique.name {
            TechniqueKind::ExtrudedLine => Caps::Round,
            _ => Caps::None,
        };
        let caps = Caps::parse(
            technique.string(&technique.attrs.caps, env).as_deref(),
            default_caps,
        )
        .for_level(key.level());
        let tile_space_uvs =
            technique.attrs.texture_coordinate_type == Some(TextureCoordinateType::TileSpace);
        let gather = self.gathers_features(technique);
        let obj_info = self.obj_info(feature).cloned();

        let projector = &mut self.projector;
        let Some(mesh) = mesh_entry(&mut self.meshes, technique, env) else {
            return;
        };
        if gather {
            mesh.begin_feature(feature.id, obj_info.as_ref());
        }

        for line in lines {
            let line = if closed {
                let mut ring = projection.subdivide(&key, &open_ring(line.clone()), true);
                if let Some(first) = ring.first().copied() {
                    ring.push(first);
                }
                ring
            } else {
                projection.subdivide(&key, line, false)
            };
            if line.len() < 2 {
                continue;
            }

            let base = mesh.vertex_count();
            if mesh.geometry_type == GeometryType::Line {
                for [x, y] in &line {
                    mesh.push_position(projector.project(*x, *y, 0.0));
                    if tile_space_uvs {
                        mesh.push_tile_space_uv(*x, *y);
                    }
                }
                mesh.indices.extend(segment_indices(base, line.len()));
                continue;
            }

            let ribbon = match tessellate_ribbon(&line, width, caps) {
                Ok(ribbon) => ribbon,
                Err(e) => {
                    warn!("failed to tessellate line of feature {:?}: {e:?}", feature.id);
                    continue;
                }
            };
            for [x, y] in &ribbon.vertices {
                let (x, y) = (*x as f64, *y as f64);
                mesh.push_position(projector.project(x, y, 0.0));
                if tile_space_uvs {
                    mesh.push_tile_space_uv(x, y);
                }
            }
            mesh.indices.extend(ribbon.indices.iter().map(|i| base + i));
        }
    }

    fn add_polygons(
        &mut self,
        feature: &Feature,
        env: &Env,
        technique: &Technique,
        rings: &[Vec<[f64; 2]>],
        extruded: bool,
    ) {
        let key = self.projector.key;
        let projection = self.projector.projection;
        let boundary_walls = technique.boolean(&technique.attrs.boundary_walls, env, false);
        let edges = technique.boolean(&technique.attrs.edges, env, false);
        let tile_space_uvs =
            technique.attrs.texture_coordinate_type == Some(TextureCoordinateType::TileSpace);
        let scale = projection.scale_factor(&key);
        let height = technique.number(&technique.attrs.height, env).unwrap_or(0.0) * scale;
        let min_height = technique
            .number(&technique.attrs.min_height, env)
            .unwrap_or(0.0)
            * scale;
        let gather = self.gathers_features(technique);
        let obj_info = self.obj_info(feature).cloned();

        let rings = rings
            .iter()
            .map(|ring| projection.subdivide(&key, &open_ring(ring.clone()), true))
            .collect();
        let polygons = group_rings(rings);

        let projector = &mut self.projector;
        let Some(mesh) = mesh_entry(&mut self.meshes, technique, env) else {
            return;
        };
        if gather {
            mesh.begin_feature(feature.id, obj_info.as_ref());
        }

        for polygon in polygons {
            let footprint = match triangulate(&polygon, boundary_walls) {
                Ok(footprint) => footprint,
                Err(e) => {
                    warn!("skipping polygon of feature {:?}: {e}", feature.id);
                    continue;
                }
            };

            let base = mesh.vertex_count();
            if !extruded {
                for [x, y] in &footprint.vertices {
                    mesh.push_position(projector.project(*x, *y, 0.0));
                    if tile_space_uvs {
                        mesh.push_tile_space_uv(*x, *y);
                    }
                }
                mesh.indices
                    .extend(footprint.triangles.iter().map(|i| base + i));
                if edges {
                    for (a, next) in footprint.next_edge.iter().enumerate() {
                        if let Some(b) = next {
                            mesh.edge_indices
                                .extend_from_slice(&[base + a as IndexDataType, base + b]);
                        }
                    }
                }
                continue;
            }

            // Vertex 2i is the floor, 2i + 1 the roof of footprint vertex i.
            for [x, y] in &footprint.vertices {
                let floor = projector.project(*x, *y, min_height);
                let roof = projector.project(*x, *y, height);
                let axis = [roof[0] - floor[0], roof[1] - floor[1], roof[2] - floor[2]];
                mesh.push_position(floor);
                mesh.push_position(roof);
                mesh.extrusion_axis
                    .extend_from_slice(&[axis[0], axis[1], axis[2], 0.0]);
                mesh.extrusion_axis
                    .extend_from_slice(&[axis[0], axis[1], axis[2], 1.0]);
                if tile_space_uvs {
                    mesh.push_tile_space_uv(*x, *y);
                    mesh.push_tile_space_uv(*x, *y);
                }
            }
            let floor = |i: IndexDataType| base + 2 * i;
            let roof = |i: IndexDataType| base + 2 * i + 1;
            mesh.indices
                .extend(footprint.triangles.iter().map(|i| roof(*i)));
            for (a, next) in footprint.next_wall.iter().enumerate() {
                if let Some(b) = next {
                    let a = a as IndexDataType;
                    mesh.indices.extend_from_slice(&[
                        floor(a),
                        floor(*b),
                        roof(a),
                        roof(a),
                        floor(*b),
                        roof(*b),
                    ]);
                }
            }
            if edges {
                for (a, next) in footprint.next_edge.iter().enumerate() {
                    if let Some(b) = next {
                        let a = a as IndexDataType;
                        mesh.edge_indices
                            .extend_from_slice(&[roof(a), roof(*b), floor(a), roof(a)]);
                    }
                }
            }
        }
    }

    fn label_text(&self, feature: &Feature, env: &Env, technique: &Technique) -> Option<String> {
        if let Some(text) = technique.string(&technique.attrs.text, env) {
            return Some(text);
        }
        self.options
            .languages
            .iter()
            .map(|language| format!("name:{language}"))
            .chain(std::iter::once("name".to_owned()))
            .find_map(|name| feature.properties.get(&name).and_then(|v| v.as_str()))
            .map(str::to_owned)
    }

    fn add_point_labels(
        &mut self,
        feature: &Feature,
        env: &Env,
        technique: &Technique,
        points: &[[f64; 2]],
    ) {
        let Some(text) = self.label_text(feature, env, technique) else {
            return;
        };
        let obj_info = self.obj_info(feature).cloned();
        let geometry = self
            .text_geometries
            .entry(technique.index)
            .or_insert_with(|| TextGeometry {
                technique_index: technique.index,
                ..TextGeometry::default()
            });
        for [x, y] in points {
            geometry.positions.push(self.projector.project(*x, *y, 0.0));
            geometry.texts.push(text.clone());
            geometry.feature_ids.push(feature.id);
            if let Some(obj_info) = &obj_info {
                geometry
                    .obj_infos
                    .get_or_insert_with(Vec::new)
                    .push(obj_info.clone());
            }
        }
    }

    fn add_pois(
        &mut self,
        feature: &Feature,
        env: &Env,
        technique: &Technique,
        points: &[[f64; 2]],
    ) {
        let text = self.label_text(feature, env, technique).unwrap_or_default();
        let image_texture = technique.string(&technique.attrs.image_texture, env);
        let shield_group_index = (technique.name == TechniqueKind::LineMarker).then(|| {
            let next = self.shield_groups.len() as u32;
            *self
                .shield_groups
                .entry((technique.index, text.clone(), image_texture.clone()))
                .or_insert(next)
        });
        let obj_info = self.obj_info(feature).cloned();
        let geometry = self
            .poi_geometries
            .entry(technique.index)
            .or_insert_with(|| PoiGeometry {
                technique_index: technique.index,
                ..PoiGeometry::default()
            });
        for [x, y] in points {
            geometry.positions.push(self.projector.project(*x, *y, 0.0));
            geometry.texts.push(text.clone());
            geometry.image_textures.push(image_texture.clone());
            geometry.shield_group_indices.push(shield_group_index);
            geometry.feature_ids.push(feature.id);
            if let Some(obj_info) = &obj_info {
                geometry
                    .obj_infos
                    .get_or_insert_with(Vec::new)
                    .push(obj_info.clone());
            }
        }
    }

    /// True if the label does not fit on the line at the zoom level of the tile.
    fn is_short_label(&self, line: &[[f64; 2]], text: &str) -> bool {
        let Some(bounds) = Aabb2::from_points(line.iter().map(|[x, y]| Point2::new(*x, *y)))
        else {
            return true;
        };
        let tile_size = self.projector.key.size_in_meters();
        let diagonal_in_meters = bounds.diagonal() / EXTENT * tile_size;
        let meters_per_pixel = tile_size / self.options.tile_size_on_screen;
        let min_length = text.chars().count() as f64
            * MIN_AVERAGE_CHAR_WIDTH
            * meters_per_pixel
            * SHORT_LABEL_FUDGE_FACTOR;
        diagonal_in_meters < min_length
    }

    fn add_text_paths(
        &mut self,
        feature: &Feature,
        env: &Env,
        technique: &Technique,
        lines: &[Vec<[f64; 2]>],
    ) {
        let Some(text) = self.label_text(feature, env, technique) else {
            return;
        };
        let key = self.projector.key;
        let projection = self.projector.projection;
        for line in lines {
            if line.len() < 2 {
                continue;
            }
            if self.options.skip_short_labels && self.is_short_label(line, &text) {
                debug!("skipping short label {text} of feature {:?}", feature.id);
                continue;
            }
            let path = projection
                .subdivide(&key, line, false)
                .iter()
                .map(|[x, y]| self.projector.project(*x, *y, 0.0))
                .collect();
            self.text_path_geometries.push(TextPathGeometry {
                technique_index: technique.index,
                path,
                text: text.clone(),
                feature_id: feature.id,
                obj_info: self.obj_info(feature).cloned(),
            });
        }
    }

    /// Moves the collected buffers into a [`DecodedTile`].
    ///
    /// Every geometry must reference a technique of `techniques`, anything else is an internal
    /// error of the decoder.
    pub fn get_decoded_tile(
        self,
        techniques: Vec<Arc<Technique>>,
    ) -> Result<DecodedTile, DecodeError> {
        let check = |index: usize| {
            if index < techniques.len() {
                Ok(())
            } else {
                Err(DecodeError::InvalidTechniqueIndex(index))
            }
        };

        let mut geometries = Vec::with_capacity(self.meshes.len());
        for ((technique_index, _), mesh) in self.meshes {
            check(technique_index)?;
            let mut geometry = mesh.into_geometry();
            if self.options.interleave_vertex_attributes {
                geometry.interleave();
            }
            geometries.push(geometry);
        }
        for index in self
            .text_geometries
            .keys()
            .chain(self.poi_geometries.keys())
            .chain(self.text_path_geometries.iter().map(|g| &g.technique_index))
        {
            check(*index)?;
        }

        Ok(DecodedTile {
            tile_key: self.projector.key,
            center: self.projector.center,
            bounding_box: self.projector.bounding_box,
            geometries,
            text_geometries: self.text_geometries.into_values().collect(),
            poi_geometries: self.poi_geometries.into_values().collect(),
            text_path_geometries: self.text_path_geometries,
            path_geometries: self.path_geometries,
            techniques,
            copyright_holder_ids: self.options.copyright_holder_ids.clone(),
            enable_elevation_overlay: self.options.enable_elevation_overlay,
        })
    }
}

fn ring_center(ring: &[[f64; 2]]) -> Option<[f64; 2]> {
    let bounds = Aabb2::from_points(ring.iter().map(|[x, y]| Point2::new(*x, *y)))?;
    let center = bounds.center();
    Some([center.x, center.y])
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        coords::{TileKey, ZoomLevel, EXTENT},
        decoder::{
            decode_features,
            feature::{Feature, FeatureGeometry},
            DecodeError, DecodeOptions,
        },
        style::{AttributeMap, Env, StyleSet, Technique, TechniqueKind, Value},
        tessellation::{emitter::DecodedTileEmitter, DecodedTile, GeometryType},
    };

    fn feature(id: u64, geometry: FeatureGeometry, properties: &[(&str, &str)]) -> Feature {
        Feature {
            id: Some(id),
            geometry,
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(*v)))
                .collect::<AttributeMap>(),
        }
    }

    fn square(min: f64, max: f64) -> Vec<[f64; 2]> {
        vec![[min, min], [max, min], [max, max], [min, max], [min, min]]
    }

    fn decode(style: &str, features: Vec<Feature>, options: &DecodeOptions) -> DecodedTile {
        let style_set = Arc::new(StyleSet::from_json(style).unwrap());
        let key = TileKey::new(300, 500, ZoomLevel::new(10)).unwrap();
        decode_features(key, vec![("layer".to_owned(), features)], &style_set, options).unwrap()
    }

    #[test]
    fn full_tile_square_with_tile_space_uvs() {
        let decoded = decode(
            r#"[{ "technique": "fill", "attr": { "textureCoordinateType": "tile-space", "edges": true } }]"#,
            vec![feature(
                1,
                FeatureGeometry::Rings(vec![square(0.0, EXTENT)]),
                &[],
            )],
            &DecodeOptions::default(),
        );
        assert_eq!(decoded.geometries.len(), 1);
        let geometry = &decoded.geometries[0];
        assert_eq!(geometry.attribute("position").unwrap().len(), 4);
        assert_eq!(
            geometry.attribute("uv").unwrap().read::<f32>(),
            vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]
        );
        assert_eq!(geometry.index_count(), 6);
        // All edges lie on the tile border.
        assert!(geometry.edge_index.is_none());
    }

    #[test]
    fn short_labels_are_skipped() {
        let style = r#"[{ "technique": "text", "attr": { "text": ["get", "name"] } }]"#;
        let short = feature(
            1,
            FeatureGeometry::Lines(vec![vec![[100.0, 100.0], [200.0, 100.0]]]),
            &[("name", "Main Street")],
        );
        let long = feature(
            2,
            FeatureGeometry::Lines(vec![vec![[100.0, 100.0], [2100.0, 100.0]]]),
            &[("name", "Main Street")],
        );

        let decoded = decode(style, vec![short.clone()], &DecodeOptions::default());
        assert_eq!(decoded.text_path_geometries.len(), 0);
        let decoded = decode(style, vec![long], &DecodeOptions::default());
        assert_eq!(decoded.text_path_geometries.len(), 1);
        assert_eq!(decoded.text_path_geometries[0].text, "Main Street");

        let options = DecodeOptions {
            skip_short_labels: false,
            ..DecodeOptions::default()
        };
        let decoded = decode(style, vec![short], &options);
        assert_eq!(decoded.text_path_geometries.len(), 1);
    }

    #[test]
    fn degenerate_rings_do_not_abort_the_tile() {
        let decoded = decode(
            r#"[{ "technique": "fill" }]"#,
            vec![
                feature(
                    1,
                    FeatureGeometry::Rings(vec![vec![[0.0, 0.0], [10.0, 10.0], [20.0, 20.0]]]),
                    &[],
                ),
                feature(2, FeatureGeometry::Rings(vec![square(100.0, 200.0)]), &[]),
            ],
            &DecodeOptions::default(),
        );
        assert_eq!(decoded.geometries.len(), 1);
        assert_eq!(
            decoded.geometries[0].attribute("position").unwrap().len(),
            4
        );
    }

    #[test]
    fn extruded_walls_only_inside_the_tile() {
        let style = r#"[{ "technique": "extruded-polygon", "kind": "building",
                          "attr": { "height": 10, "edges": true } }]"#;
        let decoded = decode(
            style,
            vec![feature(1, FeatureGeometry::Rings(vec![square(100.0, 200.0)]), &[])],
            &DecodeOptions::default(),
        );
        let geometry = &decoded.geometries[0];
        assert_eq!(geometry.geometry_type, GeometryType::ExtrudedPolygon);
        assert_eq!(geometry.attribute("position").unwrap().len(), 8);
        assert_eq!(geometry.index_count(), 6 + 4 * 6);
        assert_eq!(geometry.edge_index.as_ref().unwrap().len(), 16);

        let positions = geometry.attribute("position").unwrap().read::<f32>();
        // Roof vertices are above their floor vertices.
        assert!(positions[5] > positions[2]);

        let decoded = decode(
            style,
            vec![feature(1, FeatureGeometry::Rings(vec![square(0.0, 100.0)]), &[])],
            &DecodeOptions::default(),
        );
        assert_eq!(decoded.geometries[0].index_count(), 6 + 2 * 6);

        let forced = r#"[{ "technique": "extruded-polygon",
                           "attr": { "height": 10, "boundaryWalls": true } }]"#;
        let decoded = decode(
            forced,
            vec![feature(1, FeatureGeometry::Rings(vec![square(0.0, 100.0)]), &[])],
            &DecodeOptions::default(),
        );
        assert_eq!(decoded.geometries[0].index_count(), 6 + 4 * 6);
    }

    #[test]
    fn state_dependent_lines_gather_feature_starts() {
        let decoded = decode(
            r#"[{ "technique": "solid-line",
                  "attr": { "lineWidth": 10, "enabled": ["!", ["feature-state", "hidden"]] } }]"#,
            vec![
                feature(
                    1,
                    FeatureGeometry::Lines(vec![vec![[0.0, 10.0], [100.0, 10.0]]]),
                    &[],
                ),
                feature(
                    2,
                    FeatureGeometry::Lines(vec![vec![[0.0, 50.0], [100.0, 50.0]]]),
                    &[],
                ),
            ],
            &DecodeOptions::default(),
        );
        let geometry = &decoded.geometries[0];
        assert_eq!(geometry.geometry_type, GeometryType::SolidLine);
        assert_eq!(geometry.feature_ids, Some(vec![1, 2]));
        let ranges = geometry.feature_ranges().unwrap();
        assert_eq!(ranges[0].1, 0);
        assert_eq!(ranges[0].2, ranges[1].1);
        assert_eq!(ranges[1].2, geometry.index_count());
        assert!(geometry.obj_infos.is_none());
    }

    #[test]
    fn labels_prefer_the_requested_language() {
        let options = DecodeOptions {
            languages: vec!["de".to_owned()],
            gather_road_segments: true,
            ..DecodeOptions::default()
        };
        let decoded = decode(
            r#"[{ "technique": "line" }, { "technique": "text" }]"#,
            vec![feature(
                1,
                FeatureGeometry::Lines(vec![vec![[0.0, 100.0], [4000.0, 100.0]]]),
                &[("name", "Main Street"), ("name:de", "Hauptstrasse")],
            )],
            &options,
        );
        assert_eq!(decoded.text_path_geometries[0].text, "Hauptstrasse");
        assert_eq!(decoded.path_geometries.len(), 1);
        assert_eq!(decoded.geometries[0].geometry_type, GeometryType::Line);
        assert_eq!(decoded.geometries[0].index_count(), 2);
    }

    #[test]
    fn line_markers_of_one_road_share_a_shield_group() {
        let decoded = decode(
            r#"[{ "technique": "line-marker", "attr": { "imageTexture": "shield" } }]"#,
            vec![
                feature(
                    1,
                    FeatureGeometry::Lines(vec![vec![[0.0, 100.0], [2000.0, 100.0]]]),
                    &[("name", "A1")],
                ),
                feature(
                    2,
                    FeatureGeometry::Lines(vec![vec![[0.0, 900.0], [2000.0, 900.0]]]),
                    &[("name", "A2")],
                ),
            ],
            &DecodeOptions::default(),
        );
        let pois = &decoded.poi_geometries[0];
        assert_eq!(pois.positions.len(), 4);
        assert_eq!(
            pois.shield_group_indices,
            vec![Some(0), Some(0), Some(1), Some(1)]
        );
        assert_eq!(pois.image_textures[0].as_deref(), Some("shield"));
    }

    #[test]
    fn invalid_technique_index_is_fatal() {
        let options = DecodeOptions::default();
        let key = TileKey::new(1, 1, ZoomLevel::new(1)).unwrap();
        let mut emitter = DecodedTileEmitter::new(key, &options);
        let technique = Arc::new(Technique {
            index: 3,
            name: TechniqueKind::Fill,
            render_order: 0,
            kind: None,
            attrs: Default::default(),
        });
        emitter.process_feature(
            &feature(1, FeatureGeometry::Rings(vec![square(10.0, 20.0)]), &[]),
            &Env::default(),
            &[technique],
        );
        assert!(matches!(
            emitter.get_decoded_tile(Vec::new()),
            Err(DecodeError::InvalidTechniqueIndex(3))
        ));
    }
}
