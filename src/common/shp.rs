use std::{fs, path::Path};

use anyhow::{Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use shapefile::{dbase::{FieldValue, Record}, Reader, Shape};

/// Reads all shapes + attribute records from a given `.shp` file path.
pub(crate) fn read_shapefile(path: &Path) -> Result<Vec<(Shape, Record)>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let mut items = Vec::with_capacity(reader.shape_count()?);
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result
            .with_context(|| format!("Error reading shape+record from {}", path.display()))?;
        items.push((shape, record));
    }
    Ok(items)
}

/// Guess the EPSG code of a shapefile from its `.prj` sidecar.
/// Missing sidecars default to NAD83 (4269), the Census TIGER/cartographic boundary CRS.
pub(crate) fn epsg_from_shapefile(path: &Path) -> u32 {
    let Ok(wkt) = fs::read_to_string(path.with_extension("prj")) else { return 4269 };
    let wkt = wkt.to_ascii_uppercase();
    if wkt.starts_with("PROJCS") { return 0 } // projected, units taken as meters
    if wkt.contains("NAD83") || wkt.contains("NORTH_AMERICAN_1983") { 4269 }
    else { 4326 }
}

/// Convert any polygon-like shape into a geo::MultiPolygon<f64>.
/// Null shapes become an empty MultiPolygon; other geometry kinds are rejected.
pub(crate) fn shape_to_multipolygon(shape: Shape) -> Result<MultiPolygon<f64>> {
    /// Collect x/y of each ring of a shapefile polygon
    macro_rules! rings {
        ($p:expr) => {
            $p.rings().iter()
                .map(|ring| ring.points().iter().map(|pt| Coord { x: pt.x, y: pt.y }).collect())
                .collect::<Vec<Vec<Coord<f64>>>>()
        };
    }

    match shape {
        Shape::Polygon(p) => Ok(rings_to_multipolygon(rings!(p))),
        Shape::PolygonM(p) => Ok(rings_to_multipolygon(rings!(p))),
        Shape::PolygonZ(p) => Ok(rings_to_multipolygon(rings!(p))),
        Shape::NullShape => Ok(MultiPolygon(Vec::new())),
        other => anyhow::bail!("unsupported shape type {:?}, expected polygons", other.shapetype()),
    }
}

/// Group shapefile rings into polygons: each clockwise exterior owns the
/// counter-clockwise holes that follow it.
fn rings_to_multipolygon(rings: Vec<Vec<Coord<f64>>>) -> MultiPolygon<f64> {
    /// Get the signed area of a ring (negative for clockwise)
    fn signed_area(pts: &[Coord<f64>]) -> f64 {
        pts.windows(2).map(|w| w[0].x * w[1].y - w[1].x * w[0].y).sum::<f64>() / 2.0
    }

    let mut polys: Vec<Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<LineString<f64>> = None;
    let mut current_holes: Vec<LineString<f64>> = Vec::new();

    for mut coords in rings {
        if coords.is_empty() { continue }
        if coords[0] != coords[coords.len() - 1] { coords.push(coords[0]) }
        let is_exterior = signed_area(&coords) < 0.0;
        let ls = LineString(coords);

        if is_exterior {
            if let Some(ext) = current_exterior.take() {
                polys.push(Polygon::new(ext, std::mem::take(&mut current_holes)));
            }
            current_exterior = Some(ls);
        } else {
            current_holes.push(ls);
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(Polygon::new(ext, current_holes));
    }

    MultiPolygon(polys)
}

/// A dbase attribute value reduced to the column types the unit tables use.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AttrValue {
    Text(Option<String>),
    Number(Option<f64>),
    Flag(Option<bool>),
}

impl From<FieldValue> for AttrValue {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Character(s) => AttrValue::Text(s.map(|s| s.trim().to_string())),
            FieldValue::Memo(s) => AttrValue::Text(Some(s)),
            FieldValue::Numeric(n) => AttrValue::Number(n),
            FieldValue::Float(f) => AttrValue::Number(f.map(f64::from)),
            FieldValue::Double(d) => AttrValue::Number(Some(d)),
            FieldValue::Integer(i) => AttrValue::Number(Some(i as f64)),
            FieldValue::Currency(c) => AttrValue::Number(Some(c)),
            FieldValue::Logical(b) => AttrValue::Flag(b),
            FieldValue::Date(d) => AttrValue::Text(d.map(|d| format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))),
            FieldValue::DateTime(dt) => {
                let d = dt.date();
                AttrValue::Text(Some(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())))
            }
            #[allow(unreachable_patterns)]
            _ => AttrValue::Text(None),
        }
    }
}

impl AttrValue {
    pub(crate) fn is_null(&self) -> bool {
        matches!(self, AttrValue::Text(None) | AttrValue::Number(None) | AttrValue::Flag(None))
    }

    /// Text rendering used for key columns and mixed-type columns.
    /// Integral numbers print without a fractional part.
    pub(crate) fn to_text(&self) -> Option<String> {
        match self {
            AttrValue::Text(s) => s.clone(),
            AttrValue::Number(Some(n)) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            AttrValue::Number(n) => n.map(|n| n.to_string()),
            AttrValue::Flag(b) => b.map(|b| b.to_string()),
        }
    }
}
