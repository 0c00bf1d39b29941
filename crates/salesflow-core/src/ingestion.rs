use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::join::inner_join;
use crate::summary::{categorical_summary, numeric_summary};
use crate::table::{read_csv, write_csv};

pub const STORE_KEY: &[&str] = &["Store"];
pub const FEATURE_KEY: &[&str] = &["Store", "Date", "IsHoliday"];

/// The four raw extracts under `data/external`.
#[derive(Debug, Clone)]
pub struct RawTables {
    pub train: DataFrame,
    pub features: DataFrame,
    pub test: DataFrame,
    pub stores: DataFrame,
}

impl RawTables {
    pub fn load(external_dir: &Path) -> Result<Self> {
        Ok(Self {
            train: read_csv(&external_dir.join("train.csv"))?,
            features: read_csv(&external_dir.join("features.csv"))?,
            test: read_csv(&external_dir.join("test.csv"))?,
            stores: read_csv(&external_dir.join("stores.csv"))?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub rows: usize,
    pub blake3: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub train_rows_in: usize,
    pub train_rows_out: usize,
    pub test_rows_in: usize,
    pub test_rows_out: usize,
    pub artifacts: Vec<ArtifactRecord>,
}

/// Fact table ⋈ stores on `Store`, then ⋈ features on `(Store, Date, IsHoliday)`.
/// Unmatched fact rows are dropped.
pub fn merge_sales_tables(
    facts: &DataFrame,
    stores: &DataFrame,
    features: &DataFrame,
) -> Result<DataFrame> {
    let with_stores = inner_join(facts, stores, STORE_KEY, "stores")?;
    let merged = inner_join(&with_stores, features, FEATURE_KEY, "features")?;
    Ok(merged)
}

pub fn run(config: &PipelineConfig) -> Result<IngestionReport> {
    let raw = RawTables::load(&config.external_dir())?;
    info!(
        train_rows = raw.train.height(),
        test_rows = raw.test.height(),
        feature_rows = raw.features.height(),
        store_rows = raw.stores.height(),
        "Raw extracts loaded"
    );

    let train = merge_sales_tables(&raw.train, &raw.stores, &raw.features)?;
    let test = merge_sales_tables(&raw.test, &raw.stores, &raw.features)?;
    log_dropped("train", raw.train.height(), train.height());
    log_dropped("test", raw.test.height(), test.height());

    let raw_dir = config.raw_dir();
    let outputs = [
        (config.merged_train_path(), train.clone()),
        (config.merged_test_path(), test.clone()),
        (raw_dir.join("num_summary_train.csv"), numeric_summary(&train)?),
        (raw_dir.join("num_summary_test.csv"), numeric_summary(&test)?),
        (raw_dir.join("cat_summary_train.csv"), categorical_summary(&train)?),
        (raw_dir.join("cat_summary_test.csv"), categorical_summary(&test)?),
    ];

    let mut artifacts = Vec::with_capacity(outputs.len());
    for (path, df) in &outputs {
        write_csv(df, path)?;
        artifacts.push(ArtifactRecord {
            path: path.clone(),
            rows: df.height(),
            blake3: file_digest(path)?,
        });
    }

    info!(artifacts = artifacts.len(), dir = %raw_dir.display(), "Ingestion artifacts written");

    Ok(IngestionReport {
        train_rows_in: raw.train.height(),
        train_rows_out: train.height(),
        test_rows_in: raw.test.height(),
        test_rows_out: test.height(),
        artifacts,
    })
}

fn log_dropped(table: &str, before: usize, after: usize) {
    if after < before {
        warn!(
            table,
            dropped = before - after,
            "Rows without a matching store or feature record were dropped by the merge"
        );
    }
}

pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
