use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{common::{self, AttrValue}, unit::{UnitLayer, UnitType}};

impl UnitLayer {
    /// Loads layer geometries and attributes from a given .shp file path,
    /// keyed by the unit type's default identifier field.
    pub fn from_shapefile(ty: UnitType, path: &Path) -> Result<Self> {
        Self::from_shapefile_keyed(ty, ty.key_field(), path)
    }

    /// Like `from_shapefile`, with an explicit key field.
    pub fn from_shapefile_keyed(ty: UnitType, key_field: &str, path: &Path) -> Result<Self> {
        common::require_file_exists(path)?;
        let items = common::read_shapefile(path)?;

        let mut shapes = Vec::with_capacity(items.len());
        let mut rows: Vec<HashMap<String, AttrValue>> = Vec::with_capacity(items.len());
        for (shape, record) in items {
            shapes.push(common::shape_to_multipolygon(shape)
                .with_context(|| format!("Error converting shapes to multipolygons in shapefile: {}", path.display()))?);
            rows.push(record.into_iter()
                .map(|(name, value)| (name, AttrValue::from(value)))
                .collect());
        }

        let data = super::attributes_to_dataframe(&rows, key_field)
            .with_context(|| format!("[unit] reading attributes of {}", path.display()))?;
        let epsg = common::epsg_from_shapefile(path);
        debug!("[unit] read {} {} shapes from {} (epsg {})", shapes.len(), ty, path.display(), epsg);

        Self::from_parts(ty, key_field, data, shapes, epsg)
    }
}
