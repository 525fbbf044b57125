mod geojson;
mod shp;

use std::collections::{BTreeSet, HashMap};

use anyhow::{ensure, Result};
use polars::prelude::*;

use crate::common::AttrValue;

/// Build a typed attribute table from per-feature property maps.
/// Columns are sorted by name with the key field first; the key column is always String.
fn attributes_to_dataframe(rows: &[HashMap<String, AttrValue>], key_field: &str) -> Result<DataFrame> {
    let mut names: Vec<&str> = rows.iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    ensure!(rows.is_empty() || names.contains(&key_field),
        "[unit] key field {key_field:?} not found among feature attributes");
    names.retain(|&name| name != key_field);
    names.insert(0, key_field);

    let columns = names.iter()
        .map(|&name| {
            let values: Vec<Option<&AttrValue>> = rows.iter().map(|row| row.get(name)).collect();
            attribute_column(name, &values, name == key_field)
        })
        .collect::<Vec<_>>();

    Ok(DataFrame::new(columns)?)
}

/// One attribute column, typed by its non-null values; mixed columns fall back to text.
fn attribute_column(name: &str, values: &[Option<&AttrValue>], force_text: bool) -> Column {
    let first = values.iter().flatten().find(|v| !v.is_null());
    let uniform = |kind: fn(&AttrValue) -> bool| values.iter().flatten().all(|v| v.is_null() || kind(v));

    match first {
        Some(AttrValue::Number(_)) if !force_text && uniform(|v| matches!(v, AttrValue::Number(_))) => Column::new(
            name.into(),
            values.iter()
                .map(|v| match v { Some(AttrValue::Number(n)) => *n, _ => None })
                .collect::<Vec<Option<f64>>>(),
        ),
        Some(AttrValue::Flag(_)) if !force_text && uniform(|v| matches!(v, AttrValue::Flag(_))) => Column::new(
            name.into(),
            values.iter()
                .map(|v| match v { Some(AttrValue::Flag(b)) => *b, _ => None })
                .collect::<Vec<Option<bool>>>(),
        ),
        _ => Column::new(
            name.into(),
            values.iter()
                .map(|v| v.and_then(AttrValue::to_text))
                .collect::<Vec<Option<String>>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, AttrValue)]) -> HashMap<String, AttrValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn typed_columns_with_key_first() {
        let rows = vec![
            row(&[("NAME", AttrValue::Text(Some("Alpine".into()))), ("COUNTYFP", AttrValue::Number(Some(3.0))), ("ALAND", AttrValue::Number(Some(1.5)))]),
            row(&[("NAME", AttrValue::Text(None)), ("COUNTYFP", AttrValue::Text(Some("005".into()))), ("ALAND", AttrValue::Number(None))]),
        ];
        let df = attributes_to_dataframe(&rows, "COUNTYFP").unwrap();

        let names: Vec<&str> = df.get_column_names().into_iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["COUNTYFP", "ALAND", "NAME"]);

        let keys = df.column("COUNTYFP").unwrap().str().unwrap();
        assert_eq!(keys.get(0), Some("3"));
        assert_eq!(keys.get(1), Some("005"));

        assert_eq!(df.column("ALAND").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("NAME").unwrap().str().unwrap().get(1), None);
    }

    #[test]
    fn missing_key_is_an_error() {
        let rows = vec![row(&[("NAME", AttrValue::Text(Some("x".into())))])];
        assert!(attributes_to_dataframe(&rows, "CBSAFP").is_err());
    }
}
