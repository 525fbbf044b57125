use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use geo::MultiPolygon;
use tracing::{debug, info};

use crate::{
    config::{ObservationConfig, RunConfig, VegetationConfig},
    raster::{self, ImageCollection, Observation, Raster, YearWindow},
    unit::{UnitLayer, UnitType},
};

/// Supplies polygon units and the region of interest.
pub trait FeatureSource: Sync {
    /// Polygons of the region every raster is clipped to.
    fn region(&self) -> Result<MultiPolygon<f64>>;

    /// Units of analysis of one type, keyed by their identifier field.
    fn units(&self, ty: UnitType) -> Result<UnitLayer>;
}

/// Supplies raw imagery.
pub trait ImagerySource: Sync {
    /// Raw stable-lights band for a year.
    fn light(&self, year: i32) -> Result<Raster>;

    /// Vegetation observations for a window. When none fall inside it, the result
    /// still holds one observation from outside the window so the grid is known.
    fn vegetation(&self, window: &YearWindow) -> Result<ImageCollection>;
}

/// Load a polygon layer by file extension (`.shp`, `.geojson` / `.json`).
pub fn load_layer(ty: UnitType, key_field: &str, path: &Path) -> Result<UnitLayer> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("shp") => UnitLayer::from_shapefile_keyed(ty, key_field, path),
        Some("geojson") | Some("json") => UnitLayer::from_geojson_keyed(ty, key_field, path),
        _ => bail!("[source] unsupported polygon file {} (expected .shp or .geojson)", path.display()),
    }
}

/// Files on disk, as listed by a `RunConfig`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    config: RunConfig,
}

impl DirectorySource {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    #[inline] pub fn config(&self) -> &RunConfig { &self.config }

    /// Observations to read for `window`: those inside it, or the first configured one.
    fn select_observations(&self, window: &YearWindow) -> Result<(Vec<&ObservationConfig>, bool)> {
        let all = self.config.vegetation.observations();
        let inside: Vec<_> = all.iter().filter(|o| window.contains(o.date)).collect();
        if !inside.is_empty() { return Ok((inside, true)) }

        match all.first() {
            Some(first) => Ok((vec![first], false)),
            None => bail!("[source] no vegetation observations configured"),
        }
    }
}

impl FeatureSource for DirectorySource {
    fn region(&self) -> Result<MultiPolygon<f64>> {
        let filter = &self.config.boundaries.filter;
        let path = &self.config.boundaries.region;
        let layer = load_layer(UnitType::State, &filter.field, path)?
            .filter_by_attribute(&filter.field, &filter.value)
            .with_context(|| format!("[source] selecting the region from {}", path.display()))?;
        info!("[source] region {} = {:?}: {} feature(s)", filter.field, filter.value, layer.len());
        Ok(layer.region())
    }

    fn units(&self, ty: UnitType) -> Result<UnitLayer> {
        let path = self.config.unit_path(ty)?;
        let mut layer = load_layer(ty, self.config.key_field(ty), path)?;
        if let Some(filter) = &self.config.boundaries.unit_filter {
            layer = layer.filter_by_attribute(&filter.field, &filter.value)?;
        }
        info!("[source] {} {} units from {}", layer.len(), ty, path.display());
        Ok(layer)
    }
}

impl ImagerySource for DirectorySource {
    fn light(&self, year: i32) -> Result<Raster> {
        let path = self.config.light_image(year)?;
        debug!("[source] light {year}: {}", path.display());
        raster::read_geotiff(path, self.config.light.band)
    }

    fn vegetation(&self, window: &YearWindow) -> Result<ImageCollection> {
        let (selected, in_window) = self.select_observations(window)?;

        match &self.config.vegetation {
            VegetationConfig::Composite { band, .. } => {
                let observations = selected.iter()
                    .map(|o| Ok(Observation { date: o.date, raster: raster::read_geotiff(&o.path, *band)? }))
                    .collect::<Result<Vec<_>>>()?;
                ImageCollection::new(observations)
            }
            VegetationConfig::Reflectance { nir, red, quality, .. } => {
                // Placeholder outside the window: normalization sees no data for this year.
                if !in_window {
                    let o = selected[0];
                    return ImageCollection::new(vec![Observation { date: o.date, raster: raster::read_geotiff(&o.path, *nir)? }]);
                }

                let composite_band = |band: usize| -> Result<Raster> {
                    let observations = selected.iter()
                        .map(|o| Ok(Observation { date: o.date, raster: raster::read_geotiff(&o.path, band)? }))
                        .collect::<Result<Vec<_>>>()?;
                    ImageCollection::new(observations)?.mean_composite()
                };

                let nir_mean = composite_band(*nir)?;
                let red_mean = composite_band(*red)?;
                let quality_means = quality.iter().map(|&b| composite_band(b)).collect::<Result<Vec<_>>>()?;
                let quality_refs: Vec<&Raster> = quality_means.iter().collect();
                let ndvi = raster::reflectance_ndvi(&nir_mean, &red_mean, &quality_refs)?;

                let date = NaiveDate::from_ymd_opt(window.year(), 1, 1)
                    .with_context(|| format!("[source] invalid year {window}"))?;
                debug!("[source] reflectance NDVI for {window} from {} observations", selected.len());
                ImageCollection::new(vec![Observation { date, raster: ndvi }])
            }
        }
    }
}
