use std::collections::HashSet;

use anyhow::{ensure, Context, Result};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

pub const PRIMARY_PREFIX: &str = "primary_";
pub const SECONDARY_PREFIX: &str = "secondary_";

/// Row accounting for one inner join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub matched_rows: usize,
    pub primary_dropped: usize,   // primary rows whose key is absent from secondary
    pub secondary_dropped: usize, // and vice versa
}

/// Key values of a table as text; null keys never match.
fn key_values(df: &DataFrame, key: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(key)?.cast(&DataType::String)?;
    Ok(column.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Prefix every column except `key`.
fn prefix_columns(df: &DataFrame, key: &str, prefix: &str) -> Result<DataFrame> {
    let mut out = df.clone();
    let names: Vec<String> = df.get_column_names().into_iter()
        .map(|name| name.to_string())
        .filter(|name| name != key)
        .collect();
    for name in names {
        out.rename(&name, format!("{prefix}{name}").into())?;
    }
    Ok(out)
}

/// Equality join of two tables on `key`.
///
/// Every pair of rows sharing a key value is emitted; rows whose key appears on
/// one side only are dropped and counted in the report. The key column appears
/// once; the other columns are prefixed `primary_` / `secondary_`.
pub fn inner_join(primary: &DataFrame, secondary: &DataFrame, key: &str) -> Result<(DataFrame, JoinReport)> {
    let primary_dtype = primary.column(key)
        .with_context(|| format!("[join] primary table has no key column {key:?}"))?.dtype().clone();
    let secondary_dtype = secondary.column(key)
        .with_context(|| format!("[join] secondary table has no key column {key:?}"))?.dtype().clone();
    ensure!(primary_dtype == secondary_dtype,
        "[join] key {key:?} is {primary_dtype} in the primary table but {secondary_dtype} in the secondary table");

    let primary_keys = key_values(primary, key)?;
    let secondary_keys = key_values(secondary, key)?;
    let in_primary: HashSet<&str> = primary_keys.iter().flatten().map(String::as_str).collect();
    let in_secondary: HashSet<&str> = secondary_keys.iter().flatten().map(String::as_str).collect();

    let dropped = |keys: &[Option<String>], other: &HashSet<&str>| keys.iter()
        .filter(|k| k.as_deref().is_none_or(|k| !other.contains(k)))
        .count();

    let left = prefix_columns(primary, key, PRIMARY_PREFIX)?;
    let right = prefix_columns(secondary, key, SECONDARY_PREFIX)?;
    let joined = left.inner_join(&right, [key], [key])
        .context("[join] polars inner join failed")?
        .sort([key], SortMultipleOptions::default())?;

    let report = JoinReport {
        matched_rows: joined.height(),
        primary_dropped: dropped(&primary_keys, &in_secondary),
        secondary_dropped: dropped(&secondary_keys, &in_primary),
    };

    if report.primary_dropped > 0 || report.secondary_dropped > 0 {
        warn!("[join] on {key}: dropped {} primary and {} secondary rows without a match",
            report.primary_dropped, report.secondary_dropped);
    }
    debug!("[join] on {key}: {} matched rows", report.matched_rows);

    Ok((joined, report))
}

/// Left join of `table` onto `units`: every unit row is kept, unmatched rows get nulls.
/// Columns of `table` that already exist in `units` are skipped.
pub fn attach_to_units(units: &DataFrame, table: &DataFrame, key: &str) -> Result<DataFrame> {
    let units_dtype = units.column(key)
        .with_context(|| format!("[join] unit table has no key column {key:?}"))?.dtype().clone();
    let table_dtype = table.column(key)
        .with_context(|| format!("[join] attached table has no key column {key:?}"))?.dtype().clone();
    ensure!(units_dtype == table_dtype,
        "[join] key {key:?} is {units_dtype} in the unit table but {table_dtype} in the attached table");

    let existing: HashSet<String> = units.get_column_names().into_iter().map(|n| n.to_string()).collect();
    let keep: Vec<String> = table.get_column_names().into_iter()
        .map(|n| n.to_string())
        .filter(|n| n == key || !existing.contains(n))
        .collect();
    let table = table.select(keep)?;

    let matched: HashSet<String> = key_values(&table, key)?.into_iter().flatten().collect();
    let unmatched = key_values(units, key)?.into_iter()
        .filter(|k| k.as_ref().is_none_or(|k| !matched.contains(k)))
        .count();
    if unmatched > 0 {
        debug!("[join] {unmatched} unit rows have no attached values");
    }

    Ok(units.left_join(&table, [key], [key]).context("[join] polars left join failed")?)
}
