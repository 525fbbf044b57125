use anyhow::{Context, Result};
use polars::prelude::*;

/// Per-column count, mean and sample standard deviation of the non-missing values.
/// One output row per requested column: `field, count, mean, std`.
pub fn summarize(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut counts = Vec::with_capacity(columns.len());
    let mut means = Vec::with_capacity(columns.len());
    let mut stds = Vec::with_capacity(columns.len());

    for &name in columns {
        let values: Vec<f64> = df.column(name)
            .with_context(|| format!("[summary] table has no column {name:?}"))?
            .cast(&DataType::Float64)
            .with_context(|| format!("[summary] column {name:?} is not numeric"))?
            .f64()?
            .into_iter()
            .flatten()
            .filter(|v| !v.is_nan())
            .collect();

        let n = values.len();
        let mean = (n > 0).then(|| values.iter().sum::<f64>() / n as f64);
        let std = mean.filter(|_| n > 1).map(|m| {
            (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        });

        fields.push(name.to_string());
        counts.push(n as u64);
        means.push(mean);
        stds.push(std);
    }

    Ok(DataFrame::new(vec![
        Column::new("field".into(), fields),
        Column::new("count".into(), counts),
        Column::new("mean".into(), means),
        Column::new("std".into(), stds),
    ])?)
}
