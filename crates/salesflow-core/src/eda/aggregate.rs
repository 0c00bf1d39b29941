use polars::prelude::*;

use crate::error::Result;
use crate::summary::quantile;
use crate::table::{float_values, is_numeric, require_column};

/// Upper bound on histogram bins.
pub const MAX_HISTOGRAM_BINS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    /// Row-major; `None` where fewer than two complete pairs exist or a column is constant.
    pub values: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Pearson correlation of every numeric column pair, using rows where both are present.
pub fn correlation_matrix(df: &DataFrame) -> Result<CorrelationMatrix> {
    let mut labels = Vec::new();
    let mut columns = Vec::new();
    for column in df.get_columns() {
        if !is_numeric(column.dtype()) {
            continue;
        }
        let name = column.name().to_string();
        columns.push(float_values(df, &name)?);
        labels.push(name);
    }

    let n = columns.len();
    let mut values = vec![vec![None; n]; n];
    for i in 0..n {
        for j in i..n {
            let r = pearson(&columns[i], &columns[j]);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    Ok(CorrelationMatrix { labels, values })
}

pub fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}

/// Share of rows per value of `column`, largest share first.
pub fn normalized_value_counts(df: &DataFrame, column: &str) -> Result<Vec<(String, f64)>> {
    require_column(df, column)?;
    let shares = df
        .clone()
        .lazy()
        .filter(col(column).is_not_null())
        .group_by([col(column)])
        .agg([len().alias(VALUE)])
        .with_column(
            (col(VALUE).cast(DataType::Float64) / col(VALUE).sum().cast(DataType::Float64))
                .alias(VALUE),
        )
        .sort_by_exprs([col(VALUE), col(column)], largest_first())
        .collect()?;
    keyed_values(&shares, column)
}

/// Histogram with the larger bin count of Sturges' rule and Freedman-Diaconis, capped at
/// [`MAX_HISTOGRAM_BINS`].
pub fn histogram(values: &[f64]) -> Histogram {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Histogram {
            edges: Vec::new(),
            counts: Vec::new(),
        };
    };
    if min == max {
        return Histogram {
            edges: vec![min - 0.5, max + 0.5],
            counts: vec![sorted.len()],
        };
    }

    let n = sorted.len() as f64;
    let range = max - min;
    let sturges_bins = (n.log2() + 1.0).ceil() as usize;
    let iqr = quantile(&sorted, 0.75).unwrap_or(max) - quantile(&sorted, 0.25).unwrap_or(min);
    let fd_bins = if iqr > 0.0 {
        let width = 2.0 * iqr / n.cbrt();
        (range / width).ceil().min(MAX_HISTOGRAM_BINS as f64) as usize
    } else {
        0
    };
    let bins = sturges_bins.max(fd_bins).clamp(1, MAX_HISTOGRAM_BINS);

    let width = range / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0usize; bins];
    for value in &sorted {
        let idx = (((value - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Histogram { edges, counts }
}

/// Sum of `value` per `group`, largest total first.
pub fn grouped_sum(df: &DataFrame, group: &str, value: &str) -> Result<Vec<(String, f64)>> {
    let totals = group_frame(df, group, value)?
        .agg([col(value).cast(DataType::Float64).sum().alias(VALUE)])
        .sort_by_exprs([col(VALUE), col(group)], largest_first())
        .collect()?;
    keyed_values(&totals, group)
}

/// Mean of `value` per `group`, ordered by group key. Groups with no observed value
/// are left out.
pub fn grouped_mean(df: &DataFrame, group: &str, value: &str) -> Result<Vec<(String, f64)>> {
    let means = group_frame(df, group, value)?
        .agg([col(value).cast(DataType::Float64).mean().alias(VALUE)])
        .filter(col(VALUE).is_not_null())
        .sort([group], SortMultipleOptions::default())
        .collect()?;
    keyed_values(&means, group)
}

const VALUE: &str = "__value";

fn group_frame(df: &DataFrame, group: &str, value: &str) -> Result<LazyGroupBy> {
    require_column(df, group)?;
    require_column(df, value)?;
    Ok(df
        .clone()
        .lazy()
        .filter(col(group).is_not_null())
        .group_by([col(group)]))
}

/// Descending aggregate, then ascending key. Numeric keys sort numerically.
fn largest_first() -> SortMultipleOptions {
    SortMultipleOptions::default().with_order_descending_multi([true, false])
}

/// `(key, value)` pairs of an aggregated frame, keys rendered as text.
fn keyed_values(df: &DataFrame, key: &str) -> Result<Vec<(String, f64)>> {
    let keys = df.column(key)?.cast(&DataType::String)?;
    let values = df.column(VALUE)?.cast(&DataType::Float64)?;
    Ok(keys
        .str()?
        .into_iter()
        .zip(values.f64()?)
        .filter_map(|(key, value)| Some((key?.to_string(), value?)))
        .collect())
}
