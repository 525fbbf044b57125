use std::{collections::BTreeMap, fmt, fs::File, path::{Path, PathBuf}, str::FromStr, sync::{Arc, Mutex}};

use anyhow::{anyhow, bail, Context, Result};
use polars::{io::{SerReader, SerWriter}, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common;

/// Flat table encodings for exported index tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    #[cfg(feature = "parquet")]
    Parquet,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            #[cfg(feature = "parquet")]
            ExportFormat::Parquet => "parquet",
        }
    }

    /// Serialize a table: CSV with a header row, plain decimals and empty fields for missing values,
    /// JSON as an array of row objects with nulls.
    fn encode(&self, df: &DataFrame) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut df = df.clone();
        match self {
            ExportFormat::Csv => CsvWriter::new(&mut out)
                .include_header(true)
                .with_float_scientific(Some(false))
                .finish(&mut df)
                .context("[export] Failed to write CSV to bytes")?,
            ExportFormat::Json => JsonWriter::new(&mut out)
                .with_json_format(JsonFormat::Json)
                .finish(&mut df)
                .context("[export] Failed to write JSON to bytes")?,
            #[cfg(feature = "parquet")]
            ExportFormat::Parquet => {
                ParquetWriter::new(&mut out)
                    .finish(&mut df)
                    .context("[export] Failed to write Parquet to bytes")?;
            }
        }
        Ok(out)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            #[cfg(feature = "parquet")]
            "parquet" => Ok(ExportFormat::Parquet),
            other => bail!("[export] unknown format {other:?} (expected csv or json)"),
        }
    }
}

/// Atomically write `df` to `dir/name.<ext>`.
pub fn export(df: &DataFrame, dir: &Path, name: &str, format: ExportFormat, force: bool) -> Result<PathBuf> {
    common::ensure_dir_exists(dir)?;
    let path = dir.join(format!("{name}.{}", format.extension()));
    let bytes = format.encode(df)?;
    common::write_bytes_atomic(&path, &bytes, force)
        .with_context(|| format!("[export] writing {name}"))
}

/// Write a table to a CSV path (`-` is rejected).
pub fn write_csv(df: &DataFrame, path: &Path, force: bool) -> Result<PathBuf> {
    let bytes = ExportFormat::Csv.encode(df)?;
    common::write_bytes_atomic(path, &bytes, force)
}

/// Read a CSV table, keeping `key` as text so identifiers keep their leading zeros.
pub fn read_table(path: &Path, key: &str) -> Result<DataFrame> {
    common::assert_not_stdout(path)?;
    common::require_file_exists(path)?;
    let file = File::open(path)
        .with_context(|| format!("[export] Failed to open CSV file: {}", path.display()))?;

    let schema = Arc::new(Schema::from_iter([Field::new(key.into(), DataType::String)]));
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(Some(schema))
        .into_reader_with_file_handle(file)
        .finish()
        .with_context(|| format!("[export] Failed to read CSV from {}", path.display()))?;

    df.column(key)
        .with_context(|| format!("[export] {} has no key column {key:?}", path.display()))?;
    Ok(df)
}

/// Destination for named index tables.
pub trait ExportSink: Sync {
    /// Write one named table; returns where it went.
    fn export(&self, name: &str, table: &DataFrame) -> Result<PathBuf>;

    /// Called once after every table has been exported.
    fn finish(&self) -> Result<()> { Ok(()) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub file: String,
    pub format: ExportFormat,
    pub rows: usize,
    pub columns: Vec<String>,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: String,
    pub created: String,
    pub tables: BTreeMap<String, ManifestEntry>,
}

/// Writes each table into a directory and records it in `manifest.json`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    format: ExportFormat,
    force: bool,
    entries: Mutex<BTreeMap<String, ManifestEntry>>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>, format: ExportFormat, force: bool) -> Result<Self> {
        let dir = dir.into();
        common::ensure_dir_exists(&dir)?;
        Ok(Self { dir, format, force, entries: Mutex::new(BTreeMap::new()) })
    }

    #[inline] pub fn dir(&self) -> &Path { &self.dir }

    /// Snapshot of the tables exported so far.
    pub fn entries(&self) -> Result<BTreeMap<String, ManifestEntry>> {
        Ok(self.entries.lock().map_err(|_| anyhow!("[export] manifest lock poisoned"))?.clone())
    }
}

impl ExportSink for DirectorySink {
    fn export(&self, name: &str, table: &DataFrame) -> Result<PathBuf> {
        let path = self.dir.join(format!("{name}.{}", self.format.extension()));
        let bytes = self.format.encode(table)?;
        common::write_bytes_atomic(&path, &bytes, self.force)
            .with_context(|| format!("[export] writing {name}"))?;

        let entry = ManifestEntry {
            file: path.file_name().and_then(|s| s.to_str()).unwrap_or(name).to_string(),
            format: self.format,
            rows: table.height(),
            columns: table.get_column_names().into_iter().map(|c| c.to_string()).collect(),
            sha256: common::sha256_hex(&bytes),
        };
        self.entries.lock()
            .map_err(|_| anyhow!("[export] manifest lock poisoned"))?
            .insert(name.to_string(), entry);

        info!("[export] wrote {} ({} rows)", path.display(), table.height());
        Ok(path)
    }

    fn finish(&self) -> Result<()> {
        let manifest = Manifest {
            version: "1".into(),
            created: chrono::Utc::now().to_rfc3339(),
            tables: self.entries()?,
        };
        let json = serde_json::to_vec_pretty(&manifest).context("[export] serializing manifest")?;
        let path = common::write_bytes_atomic(&self.dir.join("manifest.json"), &json, true)?;
        info!("[export] wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn index_table() -> DataFrame {
        DataFrame::new(vec![
            Column::new("COUNTYFP".into(), &["001", "037"]),
            Column::new("NDUI".into(), &[Some(0.25), None]),
        ]).unwrap()
    }

    #[test]
    fn csv_missing_values_are_empty_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = export(&index_table(), tmp.path(), "County_NDUI_2013", ExportFormat::Csv, false).unwrap();
        assert_eq!(path.file_name().unwrap(), "County_NDUI_2013.csv");
        assert_eq!(fs::read_to_string(&path).unwrap(), "COUNTYFP,NDUI\n001,0.25\n037,\n");

        // refuse to clobber without force
        assert!(export(&index_table(), tmp.path(), "County_NDUI_2013", ExportFormat::Csv, false).is_err());
        assert!(export(&index_table(), tmp.path(), "County_NDUI_2013", ExportFormat::Csv, true).is_ok());
    }

    #[test]
    fn csv_small_values_stay_decimal() {
        let df = DataFrame::new(vec![
            Column::new("COUNTYFP".into(), &["001", "003"]),
            Column::new("NDUI".into(), &[1.0e-7, -2.5e-12]),
        ]).unwrap();
        let text = String::from_utf8(ExportFormat::Csv.encode(&df).unwrap()).unwrap();
        assert_eq!(text, "COUNTYFP,NDUI\n001,0.0000001\n003,-0.0000000000025\n");
    }

    #[test]
    fn json_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = export(&index_table(), tmp.path(), "t", ExportFormat::Json, false).unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(rows[0]["COUNTYFP"], "001");
        assert!(rows[1]["NDUI"].is_null());
    }

    #[test]
    fn read_table_keeps_leading_zeros() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("light.csv");
        fs::write(&path, "COUNTYFP,mean\n001,0.5\n037,0.1\n").unwrap();

        let df = read_table(&path, "COUNTYFP").unwrap();
        assert_eq!(df.column("COUNTYFP").unwrap().str().unwrap().get(0), Some("001"));
        assert!(read_table(&path, "CBSAFP").is_err());
        assert!(read_table(Path::new("-"), "COUNTYFP").is_err());
    }

    #[test]
    fn directory_sink_writes_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path().join("out"), ExportFormat::Csv, false).unwrap();
        sink.export("County_NDUI_2013", &index_table()).unwrap();
        sink.export("MSA_NDUI_2013", &index_table()).unwrap();
        sink.finish().unwrap();

        let manifest: Manifest = serde_json::from_slice(&fs::read(sink.dir().join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest.tables.len(), 2);
        let county = &manifest.tables["County_NDUI_2013"];
        assert_eq!(county.file, "County_NDUI_2013.csv");
        assert_eq!(county.rows, 2);
        let bytes = fs::read(sink.dir().join("County_NDUI_2013.csv")).unwrap();
        assert_eq!(county.sha256, common::sha256_hex(&bytes));
    }

    #[test]
    fn format_names() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::Json.to_string(), "json");
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
