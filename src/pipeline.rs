use std::{
    fmt,
    path::PathBuf,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};
use geo::MultiPolygon;
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    config::RunConfig,
    export::{DirectorySink, ExportSink},
    index::with_ndui,
    join::{inner_join, JoinReport, PRIMARY_PREFIX},
    raster::{normalize, NormalizedLayers, YearWindow},
    source::{DirectorySource, FeatureSource, ImagerySource},
    unit::{UnitLayer, UnitType},
    zonal::{aggregate_means, MEAN_COLUMN},
};

/// Named step of a run, reported in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadUnits,
    LoadLight,
    LoadVegetation,
    Normalize,
    AggregateLight,
    AggregateVegetation,
    Join,
    Index,
    Export,
}

impl Stage {
    pub fn to_str(&self) -> &'static str {
        match self {
            Stage::LoadUnits => "load-units",
            Stage::LoadLight => "load-light",
            Stage::LoadVegetation => "load-vegetation",
            Stage::Normalize => "normalize",
            Stage::AggregateLight => "aggregate-light",
            Stage::AggregateVegetation => "aggregate-vegetation",
            Stage::Join => "join",
            Stage::Index => "index",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

/// One (unit type, year) batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub unit: UnitType,
    pub year: i32,
}

impl Job {
    /// Table name, e.g. `County_NDUI_2013`.
    pub fn export_name(&self, prefix: &str) -> String {
        format!("{prefix}{}_NDUI_{}", self.unit.label(), self.year)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.unit.label(), self.year)
    }
}

/// Deadline and cancel flag, checked between stages.
#[derive(Debug, Clone, Default)]
pub struct RunBudget {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RunBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Some(Instant::now() + timeout), cancelled: Arc::default() }
    }

    /// Stop the run at the next stage boundary. Clones share the flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn check(&self, stage: Stage) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            bail!("[pipeline] run cancelled before {stage}");
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            bail!("[pipeline] run timed out before {stage}");
        }
        Ok(())
    }
}

/// Parameters of a run that do not depend on where data comes from.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub years: Vec<i32>,
    pub units: Vec<UnitType>,
    pub scale_meters: f64,
    pub max_dn: f64,
    pub prefix: String,
    pub parallel: bool,
}

impl From<&RunConfig> for RunSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            years: config.years.clone(),
            units: config.units.clone(),
            scale_meters: config.scale_meters,
            max_dn: config.light.max_dn,
            prefix: config.output.prefix.clone(),
            parallel: config.parallel,
        }
    }
}

/// Outcome of one exported table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
    pub join: JoinReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub tables: Vec<TableSummary>,
}

fn job_error(stage: Stage, job: &Job) -> String {
    format!("[pipeline] {stage} failed for {job}")
}

/// Index Rows for one unit layer: zonal means of both layers joined on the unit key,
/// with the unit attributes carried on the light side and NDUI appended.
pub fn run_job(
    job: &Job,
    units: &UnitLayer,
    layers: &NormalizedLayers,
    settings: &RunSettings,
    budget: &RunBudget,
) -> Result<(DataFrame, JoinReport)> {
    let key = units.key_field();
    let means_only = |df: DataFrame| df.select([key, MEAN_COLUMN]);

    budget.check(Stage::AggregateLight)?;
    let light = aggregate_means(&layers.light, units, settings.scale_meters)
        .with_context(|| job_error(Stage::AggregateLight, job))?;

    budget.check(Stage::AggregateVegetation)?;
    let vegetation = aggregate_means(&layers.vegetation, units, settings.scale_meters)
        .and_then(|df| Ok(means_only(df)?))
        .with_context(|| job_error(Stage::AggregateVegetation, job))?;

    budget.check(Stage::Join)?;
    let (joined, report) = inner_join(&light, &vegetation, key)
        .and_then(|(df, report)| Ok((unprefix_attributes(df, units.data(), key)?, report)))
        .with_context(|| job_error(Stage::Join, job))?;

    budget.check(Stage::Index)?;
    let indexed = with_ndui(&joined)
        .with_context(|| job_error(Stage::Index, job))?;

    debug!("[pipeline] {job}: {} index rows", indexed.height());
    Ok((indexed, report))
}

/// Restore the unit attribute names that the join prefixed on the light side.
fn unprefix_attributes(mut joined: DataFrame, attributes: &DataFrame, key: &str) -> Result<DataFrame> {
    for name in attributes.get_column_names() {
        if name.as_str() == key || name.as_str() == MEAN_COLUMN { continue }
        joined.rename(&format!("{PRIMARY_PREFIX}{name}"), name.clone())?;
    }
    Ok(joined)
}

/// Everything for one year: imagery, normalization, then one job per unit type.
fn run_year(
    year: i32,
    region: &MultiPolygon<f64>,
    layers_by_unit: &[UnitLayer],
    imagery: &dyn ImagerySource,
    sink: &dyn ExportSink,
    settings: &RunSettings,
    budget: &RunBudget,
) -> Result<Vec<TableSummary>> {
    let window = YearWindow::new(year);

    budget.check(Stage::LoadLight)?;
    let raw_light = imagery.light(year)
        .with_context(|| format!("[pipeline] {} failed for {year}", Stage::LoadLight))?;

    budget.check(Stage::LoadVegetation)?;
    let vegetation = imagery.vegetation(&window)
        .with_context(|| format!("[pipeline] {} failed for {year}", Stage::LoadVegetation))?;

    budget.check(Stage::Normalize)?;
    let layers = normalize(&raw_light, &vegetation, region, &window, settings.max_dn)
        .with_context(|| format!("[pipeline] {} failed for {year}", Stage::Normalize))?;

    let mut tables = Vec::with_capacity(layers_by_unit.len());
    for units in layers_by_unit {
        let job = Job { unit: units.ty(), year };
        let (table, report) = run_job(&job, units, &layers, settings, budget)?;

        budget.check(Stage::Export)?;
        let name = job.export_name(&settings.prefix);
        let path = sink.export(&name, &table).with_context(|| job_error(Stage::Export, &job))?;
        info!("[pipeline] {job}: {} rows -> {}", table.height(), path.display());

        tables.push(TableSummary { name, path, rows: table.height(), join: report });
    }
    Ok(tables)
}

/// Run every (unit type, year) job and export one table per job.
pub fn run(
    features: &dyn FeatureSource,
    imagery: &dyn ImagerySource,
    sink: &dyn ExportSink,
    settings: &RunSettings,
    budget: &RunBudget,
) -> Result<RunSummary> {
    budget.check(Stage::LoadUnits)?;
    let region = features.region()
        .with_context(|| format!("[pipeline] {} failed for the region", Stage::LoadUnits))?;
    let layers_by_unit = settings.units.iter()
        .map(|&ty| features.units(ty)
            .with_context(|| format!("[pipeline] {} failed for {}", Stage::LoadUnits, ty.label())))
        .collect::<Result<Vec<_>>>()?;
    info!("[pipeline] {} unit layer(s), {} year(s)", layers_by_unit.len(), settings.years.len());

    let per_year = |&year: &i32| run_year(year, &region, &layers_by_unit, imagery, sink, settings, budget);
    let results: Vec<Vec<TableSummary>> = if settings.parallel {
        settings.years.par_iter().map(per_year).collect::<Result<_>>()?
    } else {
        settings.years.iter().map(per_year).collect::<Result<_>>()?
    };

    sink.finish()?;
    Ok(RunSummary { tables: results.into_iter().flatten().collect() })
}

/// Run a configuration against files on disk, writing into its output directory.
pub fn run_config(config: &RunConfig, force: bool) -> Result<RunSummary> {
    let sink = DirectorySink::new(&config.output.dir, config.output.format, force || config.output.force)?;
    let source = DirectorySource::new(config.clone());
    let budget = match config.timeout_secs {
        Some(secs) => RunBudget::with_timeout(Duration::from_secs(secs)),
        None => RunBudget::unlimited(),
    };
    let settings = RunSettings::from(config);
    run(&source, &source, &sink, &settings, &budget)
}
