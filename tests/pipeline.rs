use std::{fs, path::PathBuf, sync::Mutex};

use anyhow::{bail, Result};
use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use geo::{polygon, MultiPolygon};
use polars::prelude::*;
use serde_json::json;

use ndui::{
    inner_join, read_table, run, run_config, with_ndui, write_geotiff, RunConfig, DirectorySink, ExportFormat, ExportSink, FeatureSource, GeoTransform,
    ImageCollection, ImagerySource, Manifest, Observation, Raster, RunBudget, RunSettings, UnitLayer, UnitType,
    YearWindow, NDUI_COLUMN,
};

fn square(x: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![(x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0), (x: x, y: 0.0)]])
}

/// Four unit squares side by side, keyed A through D.
struct Squares;

impl FeatureSource for Squares {
    fn region(&self) -> Result<MultiPolygon<f64>> {
        Ok(MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)]]))
    }

    fn units(&self, ty: UnitType) -> Result<UnitLayer> {
        let data = DataFrame::new(vec![
            Column::new(ty.key_field().into(), &["A", "B", "C", "D"]),
            Column::new("NAME".into(), &["Alpha", "Bravo", "Charlie", "Delta"]),
        ])?;
        let shapes = (0..4).map(|i| square(i as f64)).collect();
        UnitLayer::from_parts(ty, ty.key_field(), data, shapes, 0)
    }
}

/// One row of four pixels matching the squares.
struct Imagery;

fn row(values: [f64; 4]) -> Raster {
    Raster::from_vec(values.to_vec(), 1, 4, GeoTransform::new(0.0, 1.0, 1.0, -1.0), None).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

impl ImagerySource for Imagery {
    fn light(&self, year: i32) -> Result<Raster> {
        match year {
            // 31.5 / 63 = 0.5, 6.3 / 63 = 0.1, 255 clamps to 63
            2013 => Ok(row([31.5, 6.3, 0.0, 255.0])),
            _ => bail!("no light image for {year}"),
        }
    }

    fn vegetation(&self, _window: &YearWindow) -> Result<ImageCollection> {
        ImageCollection::new(vec![
            Observation { date: date(2012, 6, 1), raster: row([9.0, 9.0, 9.0, 9.0]) },
            Observation { date: date(2013, 3, 1), raster: row([0.0, 0.4, 0.0, 0.0]) },
            Observation { date: date(2013, 9, 1), raster: row([0.2, 0.6, 0.0, 0.0]) },
        ])
    }
}

#[derive(Default)]
struct MemorySink {
    tables: Mutex<Vec<(String, DataFrame)>>,
}

impl ExportSink for MemorySink {
    fn export(&self, name: &str, table: &DataFrame) -> Result<PathBuf> {
        self.tables.lock().unwrap().push((name.to_string(), table.clone()));
        Ok(PathBuf::from(name))
    }
}

fn settings(years: Vec<i32>, parallel: bool) -> RunSettings {
    RunSettings {
        years,
        units: vec![UnitType::County, UnitType::Msa],
        scale_meters: 1.0,
        max_dn: 63.0,
        prefix: String::new(),
        parallel,
    }
}

#[test]
fn ndui_tables_for_every_unit_type() {
    let sink = MemorySink::default();
    let summary = run(&Squares, &Imagery, &sink, &settings(vec![2013], false), &RunBudget::unlimited()).unwrap();

    let names: Vec<_> = summary.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["County_NDUI_2013", "MSA_NDUI_2013"]);
    assert!(summary.tables.iter().all(|t| t.rows == 4 && t.join.matched_rows == 4));

    let tables = sink.tables.lock().unwrap();
    let (_, county) = &tables[0];
    let ndui = county.column(NDUI_COLUMN).unwrap().f64().unwrap();
    assert_abs_diff_eq!(ndui.get(0).unwrap(), 0.6667, epsilon = 1e-4);  // A: light 0.5, vegetation 0.1
    assert_abs_diff_eq!(ndui.get(1).unwrap(), -0.6667, epsilon = 1e-4); // B: light 0.1, vegetation 0.5
    assert_eq!(ndui.get(2), None);                                       // C: both 0
    assert_abs_diff_eq!(ndui.get(3).unwrap(), 1.0, epsilon = 1e-12);    // D: saturated light, no vegetation

    assert_eq!(county.column("COUNTYFP").unwrap().str().unwrap().get(2), Some("C"));
    assert_eq!(county.column("NAME").unwrap().str().unwrap().get(3), Some("Delta"));

    let (_, msa) = &tables[1];
    assert!(msa.column("CBSAFP").is_ok());
}

#[test]
fn csv_output_keeps_missing_index_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = DirectorySink::new(tmp.path(), ExportFormat::Csv, false).unwrap();
    let mut settings = settings(vec![2013], false);
    settings.units = vec![UnitType::County];
    run(&Squares, &Imagery, &sink, &settings, &RunBudget::unlimited()).unwrap();

    let text = fs::read_to_string(tmp.path().join("County_NDUI_2013.csv")).unwrap();
    let mut lines = text.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(header, ["COUNTYFP", "NAME", "primary_mean", "secondary_mean", "NDUI"]);

    let c_row: Vec<&str> = lines.find(|l| l.starts_with("C,")).unwrap().split(',').collect();
    assert_eq!(c_row[1], "Charlie");
    assert_eq!(c_row[4], "");

    let manifest: Manifest = serde_json::from_slice(&fs::read(tmp.path().join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest.tables["County_NDUI_2013"].rows, 4);
}

#[test]
fn failures_name_stage_and_year() {
    let sink = MemorySink::default();
    let err = run(&Squares, &Imagery, &sink, &settings(vec![2013, 2014], true), &RunBudget::unlimited()).unwrap_err();
    assert_eq!(err.to_string(), "[pipeline] load-light failed for 2014");
}

#[test]
fn cancelled_run_stops_before_loading() {
    let budget = RunBudget::unlimited();
    budget.cancel();
    let sink = MemorySink::default();
    let err = run(&Squares, &Imagery, &sink, &settings(vec![2013], false), &budget).unwrap_err();
    assert!(err.to_string().contains("load-units"));
    assert!(sink.tables.lock().unwrap().is_empty());
}

#[test]
fn join_zonal_tables_from_csv() {
    let tmp = tempfile::tempdir().unwrap();
    let light = tmp.path().join("light.csv");
    let vegetation = tmp.path().join("vegetation.csv");
    fs::write(&light, "CBSAFP,mean\n001,0.5\n002,0.1\n003,0.0\n").unwrap();
    fs::write(&vegetation, "CBSAFP,mean\n002,0.5\n003,0.0\n004,0.3\n").unwrap();

    let (joined, report) = inner_join(
        &read_table(&light, "CBSAFP").unwrap(),
        &read_table(&vegetation, "CBSAFP").unwrap(),
        "CBSAFP",
    ).unwrap();
    assert_eq!((report.matched_rows, report.primary_dropped, report.secondary_dropped), (2, 1, 1));

    let indexed = with_ndui(&joined).unwrap();
    let keys: Vec<_> = indexed.column("CBSAFP").unwrap().str().unwrap().into_iter().flatten().collect();
    assert_eq!(keys, ["002", "003"]);
    let ndui = indexed.column(NDUI_COLUMN).unwrap().f64().unwrap();
    assert_abs_diff_eq!(ndui.get(0).unwrap(), -0.6667, epsilon = 1e-4);
    assert_eq!(ndui.get(1), None);
}

/// GeoJSON rectangle `[x0, x0 + width] x [0, 1000]` in California Albers meters.
fn feature(properties: serde_json::Value, x0: f64, width: f64) -> serde_json::Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": { "type": "Polygon", "coordinates": [[[x0, 0.0], [x0 + width, 0.0], [x0 + width, 1000.0], [x0, 1000.0], [x0, 0.0]]] }
    })
}

fn collection(features: Vec<serde_json::Value>) -> String {
    json!({
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3310" } },
        "features": features
    }).to_string()
}

#[test]
fn run_config_reads_geotiffs_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();

    fs::write(dir.join("states.geojson"), collection(vec![
        feature(json!({ "NAME": "California" }), 0.0, 4000.0),
        feature(json!({ "NAME": "Nevada" }), 4000.0, 4000.0),
    ])).unwrap();
    fs::write(dir.join("counties.geojson"), collection(
        ["001", "003", "005", "007"].iter().enumerate()
            .map(|(i, fp)| feature(json!({ "COUNTYFP": fp }), i as f64 * 1000.0, 1000.0))
            .collect(),
    )).unwrap();

    let grid = |values: [f64; 4]| {
        Raster::from_vec(values.to_vec(), 1, 4, GeoTransform::new(0.0, 1000.0, 1000.0, -1000.0), Some(3310)).unwrap()
    };
    write_geotiff(&grid([31.5, 6.3, 0.0, 255.0]), &dir.join("light2013.tif"), false).unwrap();
    write_geotiff(&grid([0.0, 0.375, 0.0, 0.0]), &dir.join("ndvi_a.tif"), false).unwrap();
    write_geotiff(&grid([0.25, 0.625, 0.0, 0.0]), &dir.join("ndvi_b.tif"), false).unwrap();

    let config = json!({
        "boundaries": { "region": "states.geojson", "county": "counties.geojson" },
        "light": { "images": { "2013": "light2013.tif" } },
        "vegetation": {
            "kind": "composite",
            "observations": [
                { "date": "2013-03-01", "path": "ndvi_a.tif" },
                { "date": "2013-09-01", "path": "ndvi_b.tif" }
            ]
        },
        "years": [2013],
        "units": ["county"],
        "output": { "dir": "out" }
    });
    fs::write(dir.join("run.json"), config.to_string()).unwrap();

    let config = RunConfig::from_path(&dir.join("run.json")).unwrap();
    let summary = run_config(&config, false).unwrap();
    assert_eq!(summary.tables.len(), 1);
    assert_eq!(summary.tables[0].rows, 4);

    let table = read_table(&dir.join("out/County_NDUI_2013.csv"), "COUNTYFP").unwrap();
    let keys: Vec<_> = table.column("COUNTYFP").unwrap().str().unwrap().into_iter().flatten().collect();
    assert_eq!(keys, ["001", "003", "005", "007"]);

    // light 0.5 / 0.1 / 0 / 1, vegetation 0.125 / 0.5 / 0 / 0 (stored as f32)
    let ndui = table.column(NDUI_COLUMN).unwrap().f64().unwrap();
    assert_abs_diff_eq!(ndui.get(0).unwrap(), 0.375 / 0.625, epsilon = 1e-6);
    assert_abs_diff_eq!(ndui.get(1).unwrap(), -0.4 / 0.6, epsilon = 1e-6);
    assert_eq!(ndui.get(2), None);
    assert_abs_diff_eq!(ndui.get(3).unwrap(), 1.0, epsilon = 1e-6);

    assert!(dir.join("out/manifest.json").is_file());
}
