use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::{debug, warn};

use crate::{join::{PRIMARY_PREFIX, SECONDARY_PREFIX}, zonal::MEAN_COLUMN};

pub const NDUI_COLUMN: &str = "NDUI";

/// `(primary - secondary) / (primary + secondary)`.
/// Missing when either mean is missing or the denominator is zero; never coerced to 0.
pub fn compute_ndui(primary: Option<f64>, secondary: Option<f64>) -> Option<f64> {
    let (p, s) = (primary?, secondary?);
    let sum = p + s;
    if sum == 0.0 || !sum.is_finite() { return None }
    Some((p - s) / sum).filter(|v| v.is_finite())
}

/// Append a nullable `NDUI` column computed from `primary_mean` and `secondary_mean`.
pub fn with_ndui(joined: &DataFrame) -> Result<DataFrame> {
    let primary_col = format!("{PRIMARY_PREFIX}{MEAN_COLUMN}");
    let secondary_col = format!("{SECONDARY_PREFIX}{MEAN_COLUMN}");

    let mean_of = |name: &str| -> Result<Float64Chunked> {
        Ok(joined.column(name)
            .with_context(|| format!("[index] joined table has no {name:?} column"))?
            .cast(&DataType::Float64)?
            .f64()?
            .clone())
    };
    let primary = mean_of(&primary_col)?;
    let secondary = mean_of(&secondary_col)?;

    let mut degenerate = 0usize;
    let ndui: Vec<Option<f64>> = primary.into_iter().zip(secondary.into_iter())
        .map(|(p, s)| {
            let value = compute_ndui(p, s);
            if value.is_none() && p.is_some() && s.is_some() { degenerate += 1 }
            value
        })
        .collect();

    if degenerate > 0 {
        warn!("[index] {degenerate} rows have a zero light + vegetation sum; NDUI left missing");
    }
    debug!("[index] computed NDUI for {} rows", ndui.len());

    let mut out = joined.clone();
    out.with_column(Column::new(NDUI_COLUMN.into(), ndui))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn ndui_values() {
        assert_abs_diff_eq!(compute_ndui(Some(0.5), Some(0.1)).unwrap(), 0.6667, epsilon = 1e-4);
        assert_abs_diff_eq!(compute_ndui(Some(0.1), Some(0.5)).unwrap(), -0.6667, epsilon = 1e-4);
        assert_eq!(compute_ndui(Some(0.3), Some(0.3)), Some(0.0));
        assert_eq!(compute_ndui(Some(0.0), Some(0.0)), None);
        assert_eq!(compute_ndui(None, Some(0.4)), None);
        assert_eq!(compute_ndui(Some(0.4), None), None);
    }

    #[test]
    fn ndui_stays_in_unit_range() {
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
        for &l in &steps {
            for &v in &steps {
                if let Some(n) = compute_ndui(Some(l), Some(v)) {
                    assert!((-1.0..=1.0).contains(&n), "NDUI({l}, {v}) = {n}");
                } else {
                    assert_eq!(l + v, 0.0);
                }
            }
        }
    }

    #[test]
    fn appends_nullable_column() {
        let joined = DataFrame::new(vec![
            Column::new("COUNTYFP".into(), &["A", "B", "C"]),
            Column::new("primary_mean".into(), &[Some(0.5), Some(0.1), Some(0.0)]),
            Column::new("secondary_mean".into(), &[Some(0.1), None, Some(0.0)]),
        ]).unwrap();

        let indexed = with_ndui(&joined).unwrap();
        let ndui = indexed.column(NDUI_COLUMN).unwrap().f64().unwrap();
        assert_abs_diff_eq!(ndui.get(0).unwrap(), 2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(ndui.get(1), None);
        assert_eq!(ndui.get(2), None);
        assert_eq!(indexed.height(), 3);

        assert!(with_ndui(&joined.drop("secondary_mean").unwrap()).is_err());
    }
}
