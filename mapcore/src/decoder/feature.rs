//! Reading of vector tile features with geozero.

use geozero::{
    error::GeozeroError, geo_types::GeoWriter, mvt::tile::Layer, ColumnValue, FeatureProcessor,
    GeomProcessor, GeozeroDatasource, PropertyProcessor,
};
use geo_types::{Geometry, LineString};
use log::debug;

use crate::style::{AttributeMap, Value};

/// Geometry of a feature in tile local coordinates, `y` pointing down.
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureGeometry {
    Points(Vec<[f64; 2]>),
    Lines(Vec<Vec<[f64; 2]>>),
    /// Outer rings and holes in the order they were encoded.
    Rings(Vec<Vec<[f64; 2]>>),
}

impl FeatureGeometry {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureGeometry::Points(_) => "point",
            FeatureGeometry::Lines(_) => "line",
            FeatureGeometry::Rings(_) => "polygon",
        }
    }

    /// Scales all coordinates by `factor`, e.g. to convert from the extent of a layer.
    pub fn scale(&mut self, factor: f64) {
        let scale = |points: &mut Vec<[f64; 2]>| {
            for [x, y] in points.iter_mut() {
                *x *= factor;
                *y *= factor;
            }
        };
        match self {
            FeatureGeometry::Points(points) => scale(points),
            FeatureGeometry::Lines(lines) | FeatureGeometry::Rings(lines) => {
                lines.iter_mut().for_each(scale)
            }
        }
    }

    fn from_geo(geometry: Geometry<f64>) -> Option<Self> {
        fn line(line: &LineString<f64>) -> Vec<[f64; 2]> {
            line.0.iter().map(|c| [c.x, c.y]).collect()
        }

        match geometry {
            Geometry::Point(p) => Some(FeatureGeometry::Points(vec![[p.x(), p.y()]])),
            Geometry::MultiPoint(points) => Some(FeatureGeometry::Points(
                points.iter().map(|p| [p.x(), p.y()]).collect(),
            )),
            Geometry::LineString(l) => Some(FeatureGeometry::Lines(vec![line(&l)])),
            Geometry::MultiLineString(lines) => Some(FeatureGeometry::Lines(
                lines.iter().map(line).collect(),
            )),
            Geometry::Polygon(polygon) => {
                let mut rings = vec![line(polygon.exterior())];
                rings.extend(polygon.interiors().iter().map(line));
                Some(FeatureGeometry::Rings(rings))
            }
            Geometry::MultiPolygon(polygons) => {
                let mut rings = Vec::new();
                for polygon in polygons.iter() {
                    rings.push(line(polygon.exterior()));
                    rings.extend(polygon.interiors().iter().map(line));
                }
                Some(FeatureGeometry::Rings(rings))
            }
            other => {
                debug!("Unsupported geometry {other:?} in vector tile");
                None
            }
        }
    }
}

/// A feature of a vector tile layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub id: Option<u64>,
    pub geometry: FeatureGeometry,
    pub properties: AttributeMap,
}

fn column_value(value: &ColumnValue) -> Value {
    match value {
        ColumnValue::Bool(b) => Value::Bool(*b),
        ColumnValue::Byte(v) => Value::Number(*v as f64),
        ColumnValue::UByte(v) => Value::Number(*v as f64),
        ColumnValue::Short(v) => Value::Number(*v as f64),
        ColumnValue::UShort(v) => Value::Number(*v as f64),
        ColumnValue::Int(v) => Value::Number(*v as f64),
        ColumnValue::UInt(v) => Value::Number(*v as f64),
        ColumnValue::Long(v) => Value::Number(*v as f64),
        ColumnValue::ULong(v) => Value::Number(*v as f64),
        ColumnValue::Float(v) => Value::Number(*v as f64),
        ColumnValue::Double(v) => Value::Number(*v),
        ColumnValue::String(s) => Value::String(s.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// A processor which collects the features of a layer using [`GeoWriter`].
struct FeatureCollector {
    geo_writer: GeoWriter,
    ids: Vec<Option<u64>>,
    current_id: Option<u64>,
    current_geometry: Option<FeatureGeometry>,
    properties: AttributeMap,
    features: Vec<Feature>,
}

impl GeomProcessor for FeatureCollector {
    fn xy(&mut self, x: f64, y: f64, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.xy(x, y, idx)
    }
    fn point_begin(&mut self, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.point_begin(idx)
    }
    fn point_end(&mut self, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.point_end(idx)
    }
    fn multipoint_begin(&mut self, size: usize, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.multipoint_begin(size, idx)
    }
    fn multipoint_end(&mut self, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.multipoint_end(idx)
    }
    fn linestring_begin(
        &mut self,
        tagged: bool,
        size: usize,
        idx: usize,
    ) -> Result<(), GeozeroError> {
        self.geo_writer.linestring_begin(tagged, size, idx)
    }
    fn linestring_end(&mut self, tagged: bool, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.linestring_end(tagged, idx)
    }
    fn multilinestring_begin(&mut self, size: usize, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.multilinestring_begin(size, idx)
    }
    fn multilinestring_end(&mut self, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.multilinestring_end(idx)
    }
    fn polygon_begin(&mut self, tagged: bool, size: usize, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.polygon_begin(tagged, size, idx)
    }
    fn polygon_end(&mut self, tagged: bool, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.polygon_end(tagged, idx)
    }
    fn multipolygon_begin(&mut self, size: usize, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.multipolygon_begin(size, idx)
    }
    fn multipolygon_end(&mut self, idx: usize) -> Result<(), GeozeroError> {
        self.geo_writer.multipolygon_end(idx)
    }
}

impl PropertyProcessor for FeatureCollector {
    fn property(
        &mut self,
        _idx: usize,
        name: &str,
        value: &ColumnValue,
    ) -> Result<bool, GeozeroError> {
        self.properties.insert(name.to_string(), column_value(value));
        Ok(false)
    }
}

impl FeatureProcessor for FeatureCollector {
    fn feature_begin(&mut self, idx: u64) -> Result<(), GeozeroError> {
        self.current_id = self.ids.get(idx as usize).copied().flatten();
        self.current_geometry = None;
        self.properties = AttributeMap::new();
        Ok(())
    }

    fn geometry_end(&mut self) -> Result<(), GeozeroError> {
        self.current_geometry = self
            .geo_writer
            .take_geometry()
            .and_then(FeatureGeometry::from_geo);
        Ok(())
    }

    fn feature_end(&mut self, _idx: u64) -> Result<(), GeozeroError> {
        if let Some(geometry) = self.current_geometry.take() {
            self.features.push(Feature {
                id: self.current_id,
                geometry,
                properties: std::mem::take(&mut self.properties),
            });
        }
        Ok(())
    }
}

/// Reads all features of a layer.
pub fn read_layer(layer: &mut Layer) -> Result<Vec<Feature>, GeozeroError> {
    let mut collector = FeatureCollector {
        geo_writer: GeoWriter::new(),
        ids: layer.features.iter().map(|f| f.id).collect(),
        current_id: None,
        current_geometry: None,
        properties: AttributeMap::new(),
        features: Vec::new(),
    };
    layer.process(&mut collector)?;
    Ok(collector.features)
}
