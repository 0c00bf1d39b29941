use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::calendar::{parse_date, CalendarParts, HolidayKind};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::preprocessing::TEXT_FILL;
use crate::table::{
    column_names, drop_columns, float_values, is_float, is_numeric, read_csv, require_column,
    text_values, write_csv,
};

pub const DATE_COLUMN: &str = "Date";
pub const HOLIDAY_COLUMN: &str = "IsHoliday";
pub const TEMPERATURE_COLUMN: &str = "Temperature";

/// Columns removed before the final integer cast.
pub const FINAL_DROP_COLUMNS: &[&str] = &[
    "MarkDown1",
    "MarkDown5",
    "Year",
    "Day",
    "Month",
    "CPI",
    "Unemployment",
];

/// Category levels per text column, in sorted order.
pub type CategoryLevels = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Serialize)]
pub struct FeatureReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_columns: Vec<String>,
    pub test_columns: Vec<String>,
}

pub fn fahrenheit_to_celsius(df: &DataFrame) -> Result<DataFrame> {
    let celsius = float_values(df, TEMPERATURE_COLUMN)?
        .into_iter()
        .map(|value| value.map(|f| (f - 32.0) * 5.0 / 9.0))
        .collect::<Vec<_>>();
    let mut output = df.clone();
    output.with_column(Series::new(TEMPERATURE_COLUMN.into(), celsius))?;
    Ok(output)
}

pub fn parse_dates(df: &DataFrame) -> Result<Vec<chrono::NaiveDate>> {
    text_values(df, DATE_COLUMN)?
        .iter()
        .enumerate()
        .map(|(row, value)| parse_date(row, value.as_deref()))
        .collect()
}

/// Adds `Day`, `Week`, `Month` and `Year` derived from `Date`.
pub fn extract_calendar(df: &DataFrame) -> Result<DataFrame> {
    let parts: Vec<CalendarParts> = parse_dates(df)?
        .into_iter()
        .map(CalendarParts::from)
        .collect();
    let mut output = df.clone();
    output.hstack_mut(&mut [
        Series::new("Day".into(), parts.iter().map(|p| p.day).collect::<Vec<_>>()).into(),
        Series::new("Week".into(), parts.iter().map(|p| p.week).collect::<Vec<_>>()).into(),
        Series::new("Month".into(), parts.iter().map(|p| p.month).collect::<Vec<_>>()).into(),
        Series::new("Year".into(), parts.iter().map(|p| p.year).collect::<Vec<_>>()).into(),
    ])?;
    Ok(output)
}

/// Adds one 0/1 indicator column per [`HolidayKind`].
pub fn add_holiday_flags(df: &DataFrame) -> Result<DataFrame> {
    let dates = parse_dates(df)?;
    let mut flags: Vec<Column> = HolidayKind::ALL
        .iter()
        .map(|kind| {
            let values: Vec<i32> = dates
                .iter()
                .map(|date| i32::from(kind.matches(*date)))
                .collect();
            Series::new(kind.column_name().into(), values).into()
        })
        .collect();
    let mut output = df.clone();
    output.hstack_mut(flags.as_mut_slice())?;
    Ok(output)
}

/// ORs the holiday indicators into `IsHoliday` (as 0/1) and drops the indicators.
pub fn fold_holiday_flags(df: &DataFrame) -> Result<DataFrame> {
    let mut combined: Vec<i64> = float_values(df, HOLIDAY_COLUMN)?
        .into_iter()
        .map(|value| i64::from(value.is_some_and(|v| v != 0.0)))
        .collect();

    for kind in HolidayKind::ALL {
        let flags = float_values(df, kind.column_name())?;
        for (slot, flag) in combined.iter_mut().zip(flags) {
            if flag.is_some_and(|v| v != 0.0) {
                *slot = 1;
            }
        }
    }

    let mut output = df.clone();
    output.with_column(Series::new(HOLIDAY_COLUMN.into(), combined))?;
    let transient: Vec<&str> = HolidayKind::ALL.iter().map(|kind| kind.column_name()).collect();
    drop_columns(&output, &transient)
}

/// Per-table feature derivation up to (not including) categorical encoding.
pub fn derive_features(df: &DataFrame) -> Result<DataFrame> {
    let converted = fahrenheit_to_celsius(df)?;
    let with_calendar = extract_calendar(&converted)?;
    let with_flags = add_holiday_flags(&with_calendar)?;
    let folded = fold_holiday_flags(&with_flags)?;
    drop_columns(&folded, &[DATE_COLUMN])
}

/// Sorted category levels of every text column across `frames`. The zero-fill
/// placeholder is not a level, so filled cells encode as all-false indicators.
pub fn category_levels(frames: &[&DataFrame]) -> Result<CategoryLevels> {
    let mut levels = CategoryLevels::new();
    for df in frames {
        for column in df.get_columns() {
            if column.dtype() != &DataType::String {
                continue;
            }
            let name = column.name().to_string();
            let values = text_values(df, &name)?;
            levels
                .entry(name)
                .or_default()
                .extend(values.into_iter().flatten().filter(|value| value.as_str() != TEXT_FILL));
        }
    }
    Ok(levels)
}

/// Replaces each text column with boolean indicator columns `<column>_<level>`, omitting
/// the first (baseline) level. Indicators are appended after the remaining columns.
pub fn one_hot_encode(df: &DataFrame, levels: &CategoryLevels) -> Result<DataFrame> {
    let mut output = df.clone();
    let mut indicators: Vec<Column> = Vec::new();

    for column in df.get_columns() {
        if column.dtype() != &DataType::String {
            continue;
        }
        let name = column.name().to_string();
        let values = text_values(df, &name)?;
        let own_levels;
        let column_levels = match levels.get(&name) {
            Some(known) => known,
            None => {
                own_levels = values
                    .iter()
                    .flatten()
                    .filter(|value| value.as_str() != TEXT_FILL)
                    .cloned()
                    .collect::<BTreeSet<_>>();
                &own_levels
            }
        };

        for level in column_levels.iter().skip(1) {
            let flags: Vec<bool> = values
                .iter()
                .map(|value| value.as_deref() == Some(level.as_str()))
                .collect();
            indicators.push(Series::new(format!("{name}_{level}").into(), flags).into());
        }
        output = output.drop(&name)?;
        debug!(column = %name, levels = column_levels.len(), "One-hot encoded");
    }

    output.hstack_mut(indicators.as_mut_slice())?;
    Ok(output)
}

/// Drops [`FINAL_DROP_COLUMNS`] and truncates every floating column to `Int64`.
pub fn final_touch(df: &DataFrame) -> Result<DataFrame> {
    let mut output = drop_columns(df, FINAL_DROP_COLUMNS)?;
    for name in column_names(&output) {
        let column = require_column(&output, &name)?;
        if is_float(column.dtype()) {
            let truncated = column.cast(&DataType::Int64)?;
            output.with_column(truncated)?;
        }
    }
    Ok(output)
}

/// Runs the full feature transformation on both tables.
pub fn engineer(train: &DataFrame, test: &DataFrame) -> Result<(DataFrame, DataFrame)> {
    let train = derive_features(train)?;
    let test = derive_features(test)?;
    let levels = category_levels(&[&train, &test])?;
    let train = final_touch(&one_hot_encode(&train, &levels)?)?;
    let test = final_touch(&one_hot_encode(&test, &levels)?)?;
    Ok((train, test))
}

pub fn run(config: &PipelineConfig) -> Result<FeatureReport> {
    let train = read_csv(&config.processed_train_path())?;
    let test = read_csv(&config.processed_test_path())?;

    let (train, test) = engineer(&train, &test)?;

    write_csv(&train, &config.final_train_path())?;
    write_csv(&test, &config.final_test_path())?;

    let report = FeatureReport {
        train_rows: train.height(),
        test_rows: test.height(),
        train_columns: column_names(&train),
        test_columns: column_names(&test),
    };
    info!(
        train_columns = report.train_columns.len(),
        test_columns = report.test_columns.len(),
        "Feature tables written"
    );
    Ok(report)
}

/// True when no column of `df` is floating point.
pub fn is_integer_encoded(df: &DataFrame) -> bool {
    df.get_columns().iter().all(|column| {
        let dtype = column.dtype();
        !is_float(dtype) && (is_numeric(dtype) || dtype == &DataType::Boolean)
    })
}

