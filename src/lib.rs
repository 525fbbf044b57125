#![doc = "NDUI public API"]
mod common;
mod config;
mod export;
mod index;
mod join;
mod pipeline;
mod raster;
mod source;
mod summary;
mod unit;
mod zonal;

#[doc(inline)]
pub use unit::{Geometries, MetricFrame, UnitId, UnitLayer, UnitType};

#[doc(inline)]
pub use raster::{
    clip, composite_vegetation, normalize, normalize_light, polygon_mask, read_geotiff, reflectance_ndvi,
    write_geotiff, GeoTransform, ImageCollection, NormalizedLayers, Observation, Raster, YearWindow, DMSP_MAX_DN,
};

#[doc(inline)]
pub use zonal::{aggregate_means, MEAN_COLUMN};

#[doc(inline)]
pub use join::{attach_to_units, inner_join, JoinReport, PRIMARY_PREFIX, SECONDARY_PREFIX};

#[doc(inline)]
pub use index::{compute_ndui, with_ndui, NDUI_COLUMN};

#[doc(inline)]
pub use export::{export, read_table, write_csv, DirectorySink, ExportFormat, ExportSink, Manifest, ManifestEntry};

#[doc(inline)]
pub use summary::summarize;

#[doc(inline)]
pub use source::{load_layer, DirectorySource, FeatureSource, ImagerySource};

#[doc(inline)]
pub use config::{
    AttributeFilter, BoundariesConfig, LightConfig, ObservationConfig, OutputConfig, RunConfig, VegetationConfig,
};

#[doc(inline)]
pub use pipeline::{run, run_config, run_job, Job, RunBudget, RunSettings, RunSummary, Stage, TableSummary};
