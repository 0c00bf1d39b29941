use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Columns holding a textual boolean in the raw extracts.
pub const BOOLEAN_COLUMNS: &[&str] = &["IsHoliday"];

/// Reads a CSV file with a header row, scanning every row for schema inference.
/// `NA` and empty fields are treated as missing.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::NotFound(path.to_path_buf()));
    }

    let csv_error = |source: PolarsError| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|opts| {
            opts.with_null_values(Some(NullValues::AllColumns(vec!["NA".into(), "".into()])))
        })
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(csv_error)?
        .finish()
        .map_err(csv_error)?;

    let df = normalize_booleans(&untyped_columns_as_float(&df)?)?;
    debug!(path = %path.display(), rows = df.height(), columns = df.width(), "CSV loaded");
    Ok(df)
}

/// Writes `df` with a header row, creating parent directories as needed.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    let mut file = File::create(path).map_err(|source| io_error(path, source))?;
    let mut out = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut out)?;
    debug!(path = %path.display(), rows = df.height(), "CSV written");
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        path: PathBuf::from(path),
        source,
    }
}

/// Columns with no observed value are read back as text; treat them as missing numbers.
pub fn untyped_columns_as_float(df: &DataFrame) -> Result<DataFrame> {
    let mut output = df.clone();
    for column in df.get_columns() {
        if df.height() > 0
            && column.dtype() == &DataType::String
            && column.null_count() == df.height()
        {
            output.with_column(column.cast(&DataType::Float64)?)?;
        }
    }
    Ok(output)
}

/// Converts textual booleans (`TRUE`/`False`/`1`/`0`) in [`BOOLEAN_COLUMNS`] to a boolean
/// column. Missing cells stay missing; any other token is a parse error.
pub fn normalize_booleans(df: &DataFrame) -> Result<DataFrame> {
    let mut output = df.clone();
    for &name in BOOLEAN_COLUMNS {
        let Ok(column) = df.column(name) else {
            continue;
        };
        if column.dtype() != &DataType::String {
            continue;
        }
        let values = column
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| value.map(|text| parse_bool(name, row, text)).transpose())
            .collect::<Result<Vec<Option<bool>>>>()?;
        output.with_column(Series::new(name.into(), values))?;
    }
    Ok(output)
}

fn parse_bool(column: &str, row: usize, text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(PipelineError::InvalidBoolean {
            column: column.to_string(),
            row,
            value: text.to_string(),
        }),
    }
}

pub fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

pub fn is_float(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Float32 | DataType::Float64)
}

pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))
}

/// Column values as `f64`. Floating NaN is reported as missing.
pub fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = require_column(df, name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| !v.is_nan()))
        .collect())
}

/// Column values rendered as text; used for grouping and join keys.
pub fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = require_column(df, name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Replaces column `name` with `values`, keeping its original dtype.
pub fn replace_float_column(
    df: &DataFrame,
    name: &str,
    values: Vec<Option<f64>>,
) -> Result<DataFrame> {
    let dtype = require_column(df, name)?.dtype().clone();
    let series = Series::new(name.into(), values).cast(&dtype)?;
    let mut output = df.clone();
    output.with_column(series)?;
    Ok(output)
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Drops every listed column; a missing column is an error.
pub fn drop_columns(df: &DataFrame, names: &[&str]) -> Result<DataFrame> {
    let mut output = df.clone();
    for &name in names {
        require_column(&output, name)?;
        output = output.drop(name)?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_booleans_accepts_any_case() {
        let df = df!(
            "IsHoliday" => &["FALSE", "True", "false"],
            "Store" => &[1i64, 2, 3],
        )
        .unwrap();
        let normalized = normalize_booleans(&df).unwrap();
        let flags = normalized.column("IsHoliday").unwrap().bool().unwrap();
        assert_eq!(flags.get(0), Some(false));
        assert_eq!(flags.get(1), Some(true));
        assert_eq!(flags.get(2), Some(false));
    }

    #[test]
    fn unknown_boolean_token_is_a_parse_error() {
        let df = df!("IsHoliday" => &[Some("FALSE"), None, Some("yes")]).unwrap();
        let err = normalize_booleans(&df).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidBoolean { ref column, row: 2, ref value }
                if column == "IsHoliday" && value == "yes"
        ));

        let ok = normalize_booleans(&df.head(Some(2))).unwrap();
        assert_eq!(ok.column("IsHoliday").unwrap().bool().unwrap().get(1), None);
    }

    #[test]
    fn all_missing_text_column_becomes_float() {
        let df = df!(
            "MarkDown1" => &[None::<&str>, None],
            "Type" => &[Some("A"), None],
        )
        .unwrap();
        let out = untyped_columns_as_float(&df).unwrap();
        assert_eq!(out.column("MarkDown1").unwrap().dtype(), &DataType::Float64);
        assert_eq!(out.column("Type").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn float_values_treat_nan_as_missing() {
        let df = df!("CPI" => &[Some(1.5f64), None, Some(f64::NAN)]).unwrap();
        let values = float_values(&df, "CPI").unwrap();
        assert_eq!(values, vec![Some(1.5), None, None]);
    }

    #[test]
    fn drop_columns_rejects_unknown_names() {
        let df = df!("Store" => &[1i64]).unwrap();
        let err = drop_columns(&df, &["Dept"]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(name) if name == "Dept"));
    }

    #[test]
    fn replace_float_column_keeps_integer_dtype() {
        let df = df!("Size" => &[10i64, -4]).unwrap();
        let out = replace_float_column(&df, "Size", vec![Some(10.0), Some(0.0)]).unwrap();
        let size = out.column("Size").unwrap();
        assert_eq!(size.dtype(), &DataType::Int64);
        assert_eq!(size.i64().unwrap().get(1), Some(0));
    }
}
