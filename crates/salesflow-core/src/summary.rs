use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::table::{float_values, is_numeric, require_column};

pub const PERCENTILES: [f64; 9] = [0.01, 0.05, 0.10, 0.25, 0.50, 0.75, 0.90, 0.95, 0.99];
const PERCENTILE_LABELS: [&str; 9] = ["P1", "P5", "P10", "P25", "P50", "P75", "P90", "P95", "P99"];

#[derive(Debug, Clone, PartialEq)]
pub struct NumericStats {
    pub count: usize,
    pub missing: usize,
    pub sum: f64,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub var: Option<f64>,
    pub min: Option<f64>,
    pub percentiles: [Option<f64>; 9],
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Descriptive statistics over the non-missing entries of `values`.
pub fn describe(values: &[Option<f64>]) -> NumericStats {
    let mut observed: Vec<f64> = values.iter().flatten().copied().collect();
    let count = observed.len();
    let missing = values.len() - count;
    let sum: f64 = observed.iter().sum();

    observed.sort_by(|a, b| a.total_cmp(b));

    let mean = (count > 0).then(|| sum / count as f64);
    let var = mean.filter(|_| count > 1).map(|mean| {
        observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64
    });

    let mut percentiles = [None; 9];
    for (slot, &q) in percentiles.iter_mut().zip(PERCENTILES.iter()) {
        *slot = quantile(&observed, q);
    }

    NumericStats {
        count,
        missing,
        sum,
        mean,
        median: quantile(&observed, 0.5),
        std: var.map(f64::sqrt),
        var,
        min: observed.first().copied(),
        percentiles,
        max: observed.last().copied(),
    }
}

/// Linear interpolation between the closest ranks of an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// One row per integer or float column of `df`.
pub fn numeric_summary(df: &DataFrame) -> Result<DataFrame> {
    let mut names = Vec::new();
    let mut rows = Vec::new();
    for column in df.get_columns() {
        if !is_numeric(column.dtype()) {
            continue;
        }
        let name = column.name().to_string();
        rows.push(describe(&float_values(df, &name)?));
        names.push(name);
    }

    let mut columns: Vec<Column> = vec![
        Series::new("column".into(), names).into(),
        Series::new(
            "N".into(),
            rows.iter().map(|s| s.count as u64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "NMISS".into(),
            rows.iter().map(|s| s.missing as u64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new("SUM".into(), rows.iter().map(|s| s.sum).collect::<Vec<_>>()).into(),
        stat_column("MEAN", &rows, |s| s.mean),
        stat_column("MEDIAN", &rows, |s| s.median),
        stat_column("STD", &rows, |s| s.std),
        stat_column("VAR", &rows, |s| s.var),
        stat_column("MIN", &rows, |s| s.min),
    ];
    for (idx, label) in PERCENTILE_LABELS.iter().enumerate() {
        columns.push(stat_column(label, &rows, |s| s.percentiles[idx]));
    }
    columns.push(stat_column("MAX", &rows, |s| s.max));

    Ok(DataFrame::new(columns)?)
}

fn stat_column<F>(name: &str, rows: &[NumericStats], pick: F) -> Column
where
    F: Fn(&NumericStats) -> Option<f64>,
{
    Series::new(name.into(), rows.iter().map(pick).collect::<Vec<_>>()).into()
}

/// Frequency table of `column` ordered by count (descending), ties broken by value.
/// Missing cells are not counted.
pub fn value_counts(df: &DataFrame, column: &str) -> Result<Vec<ValueCount>> {
    require_column(df, column)?;
    let counted = df
        .clone()
        .lazy()
        .select([col(column).cast(DataType::String)])
        .filter(col(column).is_not_null())
        .group_by([col(column)])
        .agg([len().alias("count")])
        .sort_by_exprs(
            [col("count"), col(column)],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?;

    let values = counted.column(column)?.str()?;
    let counts = counted.column("count")?.cast(&DataType::UInt64)?;
    let counts = counts.u64()?;
    Ok(values
        .into_iter()
        .zip(counts)
        .filter_map(|(value, count)| {
            Some(ValueCount {
                value: value?.to_string(),
                count: count? as usize,
            })
        })
        .collect())
}

/// One row per string column of `df`; the frequency table is a JSON array.
pub fn categorical_summary(df: &DataFrame) -> Result<DataFrame> {
    let mut names = Vec::new();
    let mut counts = Vec::new();
    let mut missing = Vec::new();
    let mut frequencies = Vec::new();

    for column in df.get_columns() {
        if column.dtype() != &DataType::String {
            continue;
        }
        let name = column.name().to_string();
        let missing_cells = column.null_count();
        counts.push((df.height() - missing_cells) as u64);
        missing.push(missing_cells as u64);
        frequencies.push(serde_json::to_string(&value_counts(df, &name)?)?);
        names.push(name);
    }

    Ok(DataFrame::new(vec![
        Series::new("column".into(), names).into(),
        Series::new("N".into(), counts).into(),
        Series::new("NMISS".into(), missing).into(),
        Series::new("VALUE_COUNTS".into(), frequencies).into(),
    ])?)
}
