use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};

use anyhow::{bail, ensure, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{common, export::ExportFormat, raster::DMSP_MAX_DN, unit::UnitType};

fn default_scale() -> f64 { 1000.0 }
fn default_band() -> usize { 1 }
fn default_max_dn() -> f64 { DMSP_MAX_DN }
fn default_units() -> Vec<UnitType> { UnitType::analysis_units().to_vec() }
fn default_output_dir() -> PathBuf { PathBuf::from("output") }

/// A run of the NDUI pipeline, as read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub boundaries: BoundariesConfig,
    pub light: LightConfig,
    pub vegetation: VegetationConfig,
    #[serde(default = "default_scale")]
    pub scale_meters: f64,
    pub years: Vec<i32>,
    #[serde(default = "default_units")]
    pub units: Vec<UnitType>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub parallel: bool,
}

/// Attribute equality used to pick features out of a larger collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub field: String,
    pub value: String,
}

impl Default for AttributeFilter {
    fn default() -> Self {
        Self { field: "NAME".into(), value: "California".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundariesConfig {
    /// Polygons containing the region of interest (e.g. a state boundary file).
    pub region: PathBuf,
    #[serde(default)]
    pub filter: AttributeFilter,
    /// Applied to unit layers before aggregation (e.g. `STATEFP` = `06`).
    #[serde(default)]
    pub unit_filter: Option<AttributeFilter>,
    pub county: Option<PathBuf>,
    pub msa: Option<PathBuf>,
    /// Identifier field overrides per unit type.
    #[serde(default)]
    pub keys: BTreeMap<UnitType, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LightConfig {
    #[serde(default = "default_band")]
    pub band: usize,
    #[serde(default = "default_max_dn")]
    pub max_dn: f64,
    /// One stable-lights image per year.
    pub images: BTreeMap<i32, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationConfig {
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// Where vegetation observations come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VegetationConfig {
    /// Ready-made vegetation index images (e.g. MODIS NDVI), one band each.
    Composite {
        #[serde(default = "default_band")]
        band: usize,
        observations: Vec<ObservationConfig>,
    },
    /// Multi-band reflectance images; NDVI is derived from the yearly band composites.
    Reflectance {
        nir: usize,
        red: usize,
        #[serde(default)]
        quality: Vec<usize>,
        observations: Vec<ObservationConfig>,
    },
}

impl VegetationConfig {
    pub fn observations(&self) -> &[ObservationConfig] {
        match self {
            VegetationConfig::Composite { observations, .. } => observations,
            VegetationConfig::Reflectance { observations, .. } => observations,
        }
    }

    fn observations_mut(&mut self) -> &mut Vec<ObservationConfig> {
        match self {
            VegetationConfig::Composite { observations, .. } => observations,
            VegetationConfig::Reflectance { observations, .. } => observations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub format: ExportFormat,
    /// Prepended to every table name.
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub force: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_output_dir(), format: ExportFormat::default(), prefix: String::new(), force: false }
    }
}

impl RunConfig {
    /// Read, resolve relative paths against the file's directory, and validate.
    pub fn from_path(path: &Path) -> Result<Self> {
        common::assert_not_stdout(path)?;
        common::require_file_exists(path)?;
        let text = fs::read_to_string(path)
            .with_context(|| format!("[config] Failed to read {}", path.display()))?;
        let mut config: RunConfig = serde_json::from_str(&text)
            .with_context(|| format!("[config] Failed to parse {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| *p = common::resolve_path(base, p);

        resolve(&mut self.boundaries.region);
        self.boundaries.county.iter_mut().for_each(resolve);
        self.boundaries.msa.iter_mut().for_each(resolve);
        self.light.images.values_mut().for_each(resolve);
        self.vegetation.observations_mut().iter_mut().for_each(|o| resolve(&mut o.path));
        resolve(&mut self.output.dir);
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.years.is_empty(), "[config] no years to process");
        ensure!(!self.units.is_empty(), "[config] no unit types to process");
        ensure!(self.scale_meters > 0.0 && self.scale_meters.is_finite(),
            "[config] scale_meters must be positive, got {}", self.scale_meters);
        ensure!(self.light.band >= 1, "[config] light band numbers start at 1");
        ensure!(self.light.max_dn > 0.0, "[config] light max_dn must be positive");

        for year in &self.years {
            ensure!(self.light.images.contains_key(year), "[config] no light image configured for {year}");
        }
        for &ty in &self.units {
            self.unit_path(ty)?;
        }
        ensure!(!self.vegetation.observations().is_empty(), "[config] no vegetation observations configured");
        if let VegetationConfig::Composite { band, .. } = &self.vegetation {
            ensure!(*band >= 1, "[config] vegetation band numbers start at 1");
        }
        if let VegetationConfig::Reflectance { nir, red, quality, .. } = &self.vegetation {
            ensure!(*nir >= 1 && *red >= 1 && quality.iter().all(|&b| b >= 1),
                "[config] reflectance band numbers start at 1");
        }
        Ok(())
    }

    /// Polygon file for a unit type.
    pub fn unit_path(&self, ty: UnitType) -> Result<&Path> {
        match ty {
            UnitType::State => Ok(&self.boundaries.region),
            UnitType::County => self.boundaries.county.as_deref()
                .with_context(|| "[config] county polygons requested but boundaries.county is not set"),
            UnitType::Msa => self.boundaries.msa.as_deref()
                .with_context(|| "[config] MSA polygons requested but boundaries.msa is not set"),
        }
    }

    /// Identifier field for a unit type, honoring overrides.
    pub fn key_field(&self, ty: UnitType) -> &str {
        self.boundaries.keys.get(&ty).map(String::as_str).unwrap_or(ty.key_field())
    }

    pub fn light_image(&self, year: i32) -> Result<&Path> {
        match self.light.images.get(&year) {
            Some(path) => Ok(path),
            None => bail!("[config] no light image configured for {year}"),
        }
    }
}
