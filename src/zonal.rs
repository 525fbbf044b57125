use anyhow::{bail, ensure, Context, Result};
use geo::{BoundingRect, MapCoords, MultiPolygon};
use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{raster::{scanline_spans, Raster}, unit::{Geometries, MetricFrame, UnitLayer}};

/// Name of the aggregated value column.
pub const MEAN_COLUMN: &str = "mean";

/// Running sum over sample points.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Error unless the raster and the layer can share coordinates.
fn ensure_same_crs(raster: &Raster, geoms: &Geometries) -> Result<()> {
    let Some(raster_epsg) = raster.epsg() else { return Ok(()) };
    let raster_geographic = matches!(raster_epsg, 4326 | 4269 | 4267 | 4937);
    match geoms.epsg() {
        0 if raster_geographic => {
            bail!("[zonal] raster is EPSG:{raster_epsg} (geographic) but polygons have an unknown projected CRS; inputs must share a CRS")
        }
        0 => Ok(()),
        epsg if epsg == raster_epsg || (raster_geographic && geoms.is_geographic()) => Ok(()),
        epsg => bail!("[zonal] raster is EPSG:{raster_epsg} but polygons are EPSG:{epsg}; inputs must share a CRS"),
    }
}

/// Mean raster value inside every polygon of `layer`, sampled on a `scale_meters` grid.
///
/// Sample points sit at the centers of a grid aligned to multiples of `scale_meters`:
/// in UTM meters for geographic layers, native units otherwise. Each point takes the
/// value of the raster pixel containing it; missing or out-of-extent samples are skipped.
/// Returns the layer attributes plus a nullable `mean` column, one row per polygon.
pub fn aggregate_means(raster: &Raster, layer: &UnitLayer, scale_meters: f64) -> Result<DataFrame> {
    ensure!(scale_meters > 0.0 && scale_meters.is_finite(),
        "[zonal] scale must be a positive distance, got {scale_meters}");
    ensure_same_crs(raster, layer.geoms())?;

    let geoms = layer.geoms();
    let candidates = geoms.query_indices(raster.bounds());

    // one UTM zone for the whole layer
    let frame = geoms.bounds()
        .filter(|_| geoms.is_geographic())
        .map(|b| MetricFrame::for_center(b.center(), geoms.epsg()))
        .transpose()?;

    let means: Vec<Option<f64>> = geoms.shapes().par_iter().enumerate()
        .map(|(i, shape)| {
            if candidates.binary_search(&i).is_err() { return Ok(None) }
            polygon_mean(raster, shape, scale_meters, frame.as_ref())
                .with_context(|| format!("[zonal] sampling {}", layer.unit_ids()[i]))
        })
        .collect::<Result<_>>()?;

    let uncovered = means.iter().filter(|m| m.is_none()).count();
    if uncovered > 0 {
        info!("[zonal] {uncovered} of {} {} polygons have no raster coverage", means.len(), layer.ty());
        for (id, _) in layer.unit_ids().iter().zip(&means).filter(|(_, m)| m.is_none()) {
            debug!("[zonal] no coverage for {id}");
        }
    }

    let mut df = layer.data().clone();
    df.with_column(Column::new(MEAN_COLUMN.into(), means))?;
    Ok(df)
}

/// Mean over one polygon's sample points, `None` without any valid sample.
fn polygon_mean(raster: &Raster, shape: &MultiPolygon<f64>, scale: f64, frame: Option<&MetricFrame>) -> Result<Option<f64>> {
    let sampled = match frame {
        Some(frame) => shape.try_map_coords(|c| frame.to_metric(c))?,
        None => shape.clone(),
    };

    let mut acc = Accumulator::default();
    for polygon in &sampled.0 {
        let Some(bbox) = polygon.bounding_rect() else { continue };
        let first_row = (bbox.min().y / scale - 0.5).ceil() as i64;
        let last_row = (bbox.max().y / scale - 0.5).floor() as i64;

        for k in first_row..=last_row {
            let y = (k as f64 + 0.5) * scale;
            for (x0, x1) in scanline_spans(polygon, y) {
                // grid centers in [x0, x1)
                let first_col = (x0 / scale - 0.5).ceil() as i64;
                let end_col = (x1 / scale - 0.5).ceil() as i64;
                for j in first_col..end_col {
                    let x = (j as f64 + 0.5) * scale;
                    let value = match frame {
                        Some(frame) => {
                            let geog = frame.to_geog(geo::Coord { x, y })?;
                            raster.sample(geog.x, geog.y)
                        }
                        None => raster.sample(x, y),
                    };
                    acc.add(value);
                }
            }
        }
    }

    Ok(acc.mean())
}
