use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::table::{
    float_values, is_float, is_numeric, read_csv, replace_float_column, require_column, write_csv,
};

/// Columns reset to zero when negative, per table.
pub const TRAIN_NON_NEGATIVE_COLUMNS: &[&str] = &["Weekly_Sales", "MarkDown2", "MarkDown3"];
pub const TEST_NON_NEGATIVE_COLUMNS: &[&str] = &["MarkDown1", "MarkDown2", "MarkDown3", "MarkDown5"];

/// Test-table columns imputed with the mean of their department.
pub const DEPT_MEAN_COLUMNS: &[&str] = &["CPI", "Unemployment"];
pub const DEPT_COLUMN: &str = "Dept";

pub const SALES_COLUMN: &str = "Weekly_Sales";
pub const SALES_CEILING: f64 = 100_000.0;

/// Placeholder written into missing text cells. One-hot encoding never treats it as a level.
pub const TEXT_FILL: &str = "0";

#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub negatives_cleared: usize,
    pub values_imputed: usize,
    pub values_zero_filled: usize,
    pub sales_capped: usize,
}

/// Result of a transformation together with the number of cells it changed.
#[derive(Debug, Clone)]
pub struct Treated {
    pub df: DataFrame,
    pub changed: usize,
}

pub fn clip_negatives(df: &DataFrame, columns: &[&str]) -> Result<Treated> {
    let mut output = df.clone();
    let mut changed = 0;
    for &name in columns {
        let values = float_values(&output, name)?;
        let clipped: Vec<Option<f64>> = values
            .iter()
            .map(|value| match value {
                Some(v) if *v < 0.0 => {
                    changed += 1;
                    Some(0.0)
                }
                other => *other,
            })
            .collect();
        output = replace_float_column(&output, name, clipped)?;
    }
    Ok(Treated { df: output, changed })
}

/// Fills missing entries of `columns` with the mean of the non-missing entries sharing
/// the same `group` value. Groups without any observation stay missing.
pub fn impute_group_mean(df: &DataFrame, group: &str, columns: &[&str]) -> Result<Treated> {
    require_column(df, group)?;
    let mut missing_before = 0;
    let mut fills = Vec::with_capacity(columns.len());
    for &name in columns {
        missing_before += require_column(df, name)?.null_count();
        fills.push(
            col(name)
                .fill_null(col(name).mean().over([col(group)]))
                .alias(name),
        );
    }

    let output = df.clone().lazy().with_columns(fills).collect()?;
    let mut missing_after = 0;
    for &name in columns {
        missing_after += require_column(&output, name)?.null_count();
    }

    Ok(Treated {
        df: output,
        changed: missing_before - missing_after,
    })
}

/// Replaces every remaining missing cell: `0` for numbers, `false` for booleans,
/// [`TEXT_FILL`] for text.
pub fn fill_missing_with_zero(df: &DataFrame) -> Result<Treated> {
    let mut output = df.clone();
    let mut changed = 0;

    for column in df.get_columns() {
        let name = column.name().clone();
        let dtype = column.dtype();
        let series = if is_numeric(dtype) {
            let values = float_values(df, name.as_str())?;
            changed += values.iter().filter(|v| v.is_none()).count();
            if is_float(dtype) {
                Series::new(name, values.iter().map(|v| v.unwrap_or(0.0)).collect::<Vec<_>>())
                    .cast(dtype)?
            } else {
                column
                    .as_materialized_series()
                    .fill_null(FillNullStrategy::Zero)?
            }
        } else if dtype == &DataType::Boolean {
            let values = column.bool()?;
            changed += values.null_count();
            Series::new(
                name,
                values.into_iter().map(|v| v.unwrap_or(false)).collect::<Vec<_>>(),
            )
        } else if dtype == &DataType::String {
            let values = column.str()?;
            changed += values.null_count();
            Series::new(
                name,
                values.into_iter().map(|v| v.unwrap_or(TEXT_FILL)).collect::<Vec<_>>(),
            )
        } else {
            continue;
        };
        output.with_column(series)?;
    }

    Ok(Treated { df: output, changed })
}

/// Clamps values of `column` above `ceiling` to exactly `ceiling`.
pub fn cap_outliers(df: &DataFrame, column: &str, ceiling: f64) -> Result<Treated> {
    let values = float_values(df, column)?;
    let mut changed = 0;
    let capped: Vec<Option<f64>> = values
        .into_iter()
        .map(|value| match value {
            Some(v) if v > ceiling => {
                changed += 1;
                Some(ceiling)
            }
            other => other,
        })
        .collect();
    Ok(Treated {
        df: replace_float_column(df, column, capped)?,
        changed,
    })
}

/// Negative treatment, then missing-value treatment, then outlier treatment.
pub fn preprocess_train(df: &DataFrame) -> Result<(DataFrame, PreprocessingCounts)> {
    let clipped = clip_negatives(df, TRAIN_NON_NEGATIVE_COLUMNS)?;
    let filled = fill_missing_with_zero(&clipped.df)?;
    let capped = cap_outliers(&filled.df, SALES_COLUMN, SALES_CEILING)?;
    Ok((
        capped.df,
        PreprocessingCounts {
            negatives_cleared: clipped.changed,
            values_imputed: 0,
            values_zero_filled: filled.changed,
            sales_capped: capped.changed,
        },
    ))
}

/// The test table has no sales column, so no outlier treatment applies.
pub fn preprocess_test(df: &DataFrame) -> Result<(DataFrame, PreprocessingCounts)> {
    let clipped = clip_negatives(df, TEST_NON_NEGATIVE_COLUMNS)?;
    let imputed = impute_group_mean(&clipped.df, DEPT_COLUMN, DEPT_MEAN_COLUMNS)?;
    let filled = fill_missing_with_zero(&imputed.df)?;
    Ok((
        filled.df,
        PreprocessingCounts {
            negatives_cleared: clipped.changed,
            values_imputed: imputed.changed,
            values_zero_filled: filled.changed,
            sales_capped: 0,
        },
    ))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessingCounts {
    pub negatives_cleared: usize,
    pub values_imputed: usize,
    pub values_zero_filled: usize,
    pub sales_capped: usize,
}

pub fn run(config: &PipelineConfig) -> Result<PreprocessingReport> {
    let train = read_csv(&config.merged_train_path())?;
    let test = read_csv(&config.merged_test_path())?;

    let (train, train_counts) = preprocess_train(&train)?;
    let (test, test_counts) = preprocess_test(&test)?;

    write_csv(&train, &config.processed_train_path())?;
    write_csv(&test, &config.processed_test_path())?;

    let report = PreprocessingReport {
        train_rows: train.height(),
        test_rows: test.height(),
        negatives_cleared: train_counts.negatives_cleared + test_counts.negatives_cleared,
        values_imputed: test_counts.values_imputed,
        values_zero_filled: train_counts.values_zero_filled + test_counts.values_zero_filled,
        sales_capped: train_counts.sales_capped,
    };
    info!(
        negatives_cleared = report.negatives_cleared,
        values_imputed = report.values_imputed,
        values_zero_filled = report.values_zero_filled,
        sales_capped = report.sales_capped,
        "Preprocessing complete"
    );
    Ok(report)
}
