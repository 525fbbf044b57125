use std::collections::HashMap;

use anyhow::{bail, ensure, Context, Result};
use geo::MultiPolygon;
use polars::prelude::*;
use tracing::warn;

use super::{geoms::Geometries, unit_id::UnitId, unit_type::UnitType};

/// A collection of polygon units (counties, MSAs, ...) with their attribute table.
/// Row `i` of `data` describes shape `i` of `geoms`.
#[derive(Debug, Clone)]
pub struct UnitLayer {
    ty: UnitType,
    key_field: String,
    unit_ids: Vec<UnitId>,
    index: HashMap<UnitId, u32>, // first row holding each id
    data: DataFrame,
    geoms: Geometries,
}

impl UnitLayer {
    /// Assemble a layer from an attribute table and matching shapes.
    /// The key column must exist and be String-typed; one row per shape.
    pub fn from_parts(
        ty: UnitType,
        key_field: &str,
        data: DataFrame,
        shapes: Vec<MultiPolygon<f64>>,
        epsg: u32,
    ) -> Result<Self> {
        ensure!(
            data.height() == shapes.len(),
            "[unit] {} table has {} rows but {} shapes",
            ty, data.height(), shapes.len()
        );

        let unit_ids: Vec<UnitId> = data.column(key_field)
            .with_context(|| format!("[unit] {ty} table is missing key field {key_field:?}"))?
            .str().with_context(|| format!("[unit] key field {key_field:?} must be of type String"))?
            .into_iter()
            .enumerate()
            .map(|(row, id)| match id {
                Some(id) => Ok(UnitId::new(ty, id)),
                None => bail!("[unit] {ty} row {row} has a null {key_field}"),
            })
            .collect::<Result<_>>()?;

        let mut index = HashMap::with_capacity(unit_ids.len());
        for (i, id) in unit_ids.iter().enumerate() {
            if index.contains_key(id) {
                warn!("[unit] duplicate {} key {}; joins will pair every copy", ty, id.id());
            } else {
                index.insert(id.clone(), i as u32);
            }
        }

        Ok(Self {
            ty,
            key_field: key_field.to_string(),
            unit_ids,
            index,
            data,
            geoms: Geometries::new(shapes, epsg),
        })
    }

    #[inline] pub fn ty(&self) -> UnitType { self.ty }

    #[inline] pub fn key_field(&self) -> &str { &self.key_field }

    #[inline] pub fn len(&self) -> usize { self.unit_ids.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.unit_ids.is_empty() }

    #[inline] pub fn unit_ids(&self) -> &[UnitId] { &self.unit_ids }

    #[inline] pub fn data(&self) -> &DataFrame { &self.data }

    #[inline] pub fn geoms(&self) -> &Geometries { &self.geoms }

    /// Row of the first unit with the given id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(&UnitId::new(self.ty, id)).map(|&i| i as usize)
    }

    /// Keep only the units whose `field` equals `value`.
    /// Numeric columns compare against `value` parsed as a number.
    pub fn filter_by_attribute(&self, field: &str, value: &str) -> Result<Self> {
        let column = self.data.column(field)
            .with_context(|| format!("[unit] {} table has no field {field:?}", self.ty))?;

        let matches: Vec<bool> = match column.dtype() {
            DataType::String => column.str()?
                .into_iter()
                .map(|v| v == Some(value))
                .collect(),
            DataType::Boolean => {
                let wanted: bool = value.trim().to_ascii_lowercase().parse()
                    .with_context(|| format!("[unit] {value:?} is not a boolean for field {field:?}"))?;
                column.bool()?.into_iter().map(|v| v == Some(wanted)).collect()
            }
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
            | DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
            | DataType::Float32 | DataType::Float64 => {
                let wanted: f64 = value.trim().parse()
                    .with_context(|| format!("[unit] {value:?} is not a number for field {field:?}"))?;
                column.cast(&DataType::Float64)?.f64()?
                    .into_iter()
                    .map(|v| v == Some(wanted))
                    .collect()
            }
            dtype => bail!("[unit] cannot filter on field {field:?} of type {dtype}"),
        };

        let indices: Vec<usize> = matches.iter().enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        if indices.is_empty() {
            bail!("[unit] no {} feature has {field} = {value:?}", self.ty);
        }

        let mask = BooleanChunked::from_slice("mask".into(), &matches);
        let data = self.data.filter(&mask)?;
        let shapes = indices.iter().map(|&i| self.geoms.shapes()[i].clone()).collect();

        Self::from_parts(self.ty, &self.key_field, data, shapes, self.geoms.epsg())
    }

    /// All polygons of the layer gathered into one region of interest.
    pub fn region(&self) -> MultiPolygon<f64> {
        MultiPolygon(self.geoms.shapes().iter().flat_map(|mp| mp.0.iter().cloned()).collect())
    }
}
