use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("join key column '{column}' missing from {table}")]
    MissingKey { table: String, column: String },
    #[error("key ({key}) matches more than one row of {table}")]
    AmbiguousKey { table: String, key: String },
}

const ROW_INDEX: &str = "__left_row";

/// Inner join preserving the row order of `left`.
///
/// Every key of `right` must identify exactly one row. Left rows whose key has no
/// match (or contains a missing component) are dropped. Right-hand columns that clash
/// with a left column get a `_right` suffix.
pub fn inner_join(
    left: &DataFrame,
    right: &DataFrame,
    on: &[&str],
    right_name: &str,
) -> Result<DataFrame, JoinError> {
    require_keys(left, on, "left table")?;
    require_keys(right, on, right_name)?;
    let right = align_key_types(left, right, on)?;
    reject_ambiguous_keys(&right, on, right_name)?;

    let keys: Vec<Expr> = on.iter().map(|&name| col(name)).collect();
    let joined = left
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(
            right.lazy().filter(complete_keys(on)),
            keys.clone(),
            keys,
            JoinArgs {
                validation: JoinValidation::ManyToOne,
                ..JoinArgs::new(JoinType::Inner)
            },
        )
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?;

    Ok(joined.drop(ROW_INDEX)?)
}

fn require_keys(df: &DataFrame, on: &[&str], table: &str) -> Result<(), JoinError> {
    match on.iter().find(|&&name| df.column(name).is_err()) {
        Some(&missing) => Err(JoinError::MissingKey {
            table: table.to_string(),
            column: missing.to_string(),
        }),
        None => Ok(()),
    }
}

/// Casts key columns of `right` to the dtype of the matching `left` column.
fn align_key_types(left: &DataFrame, right: &DataFrame, on: &[&str]) -> Result<DataFrame, JoinError> {
    let mut output = right.clone();
    for &name in on {
        let target = left.column(name)?.dtype();
        let current = output.column(name)?;
        if current.dtype() != target {
            let cast = current.cast(target)?;
            output.with_column(cast)?;
        }
    }
    Ok(output)
}

fn complete_keys(on: &[&str]) -> Expr {
    on.iter()
        .map(|&name| col(name).is_not_null())
        .reduce(|acc, expr| acc.and(expr))
        .unwrap_or_else(|| lit(true))
}

/// Fails with the first key of `right` (ignoring keys with a missing component) that
/// occurs more than once.
fn reject_ambiguous_keys(right: &DataFrame, on: &[&str], table: &str) -> Result<(), JoinError> {
    let keys: Vec<Expr> = on.iter().map(|&name| col(name)).collect();

    let duplicates = right
        .clone()
        .lazy()
        .filter(complete_keys(on))
        .group_by(keys)
        .agg([len().alias("rows")])
        .filter(col("rows").gt(lit(1)))
        .collect()?;
    if duplicates.height() == 0 {
        return Ok(());
    }

    let mut parts = Vec::with_capacity(on.len());
    for &name in on {
        let rendered = duplicates.column(name)?.cast(&DataType::String)?;
        parts.push(rendered.str()?.get(0).unwrap_or_default().to_string());
    }
    Err(JoinError::AmbiguousKey {
        table: table.to_string(),
        key: parts.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_and_null_keys_are_dropped() {
        let left = df!(
            "Store" => &[Some(1i64), Some(9), None, Some(2)],
            "Dept" => &[10i64, 11, 12, 13],
        )
        .unwrap();
        let right = df!(
            "Store" => &[2i64, 1],
            "Type" => &["B", "A"],
        )
        .unwrap();

        let joined = inner_join(&left, &right, &["Store"], "stores").unwrap();
        assert_eq!(joined.height(), 2);
        let dept = joined.column("Dept").unwrap().i64().unwrap();
        assert_eq!(dept.get(0), Some(10));
        assert_eq!(dept.get(1), Some(13));
        let kind = joined.column("Type").unwrap().str().unwrap();
        assert_eq!(kind.get(0), Some("A"));
        assert_eq!(kind.get(1), Some("B"));
    }

    #[test]
    fn duplicate_right_keys_are_rejected() {
        let left = df!("Store" => &[1i64]).unwrap();
        let right = df!("Store" => &[1i64, 1], "Size" => &[100i64, 200]).unwrap();
        let err = inner_join(&left, &right, &["Store"], "stores").unwrap_err();
        assert!(matches!(err, JoinError::AmbiguousKey { ref key, .. } if key == "1"));
    }

    #[test]
    fn duplicates_with_missing_key_component_are_ignored() {
        let left = df!("Store" => &[1i64, 2], "Date" => &["2010-02-05", "2010-02-05"]).unwrap();
        let right = df!(
            "Store" => &[Some(1i64), None, None],
            "Date" => &["2010-02-05", "2010-02-05", "2010-02-05"],
            "CPI" => &[211.1f64, 1.0, 2.0],
        )
        .unwrap();
        let joined = inner_join(&left, &right, &["Store", "Date"], "features").unwrap();
        assert_eq!(joined.height(), 1);
        assert_eq!(joined.column("CPI").unwrap().f64().unwrap().get(0), Some(211.1));
    }

    #[test]
    fn key_types_follow_the_left_table() {
        let left = df!("Store" => &[3i64, 1]).unwrap();
        let right = df!("Store" => &[1i32, 3], "Size" => &[100i64, 300]).unwrap();
        let joined = inner_join(&left, &right, &["Store"], "stores").unwrap();
        let size = joined.column("Size").unwrap().i64().unwrap();
        assert_eq!(size.get(0), Some(300));
        assert_eq!(size.get(1), Some(100));
    }

    #[test]
    fn overlapping_columns_get_suffix() {
        let left = df!("Store" => &[1i64], "Size" => &[5i64]).unwrap();
        let right = df!("Store" => &[1i64], "Size" => &[7i64]).unwrap();
        let joined = inner_join(&left, &right, &["Store"], "stores").unwrap();
        assert_eq!(
            joined.column("Size_right").unwrap().i64().unwrap().get(0),
            Some(7)
        );
    }
}
