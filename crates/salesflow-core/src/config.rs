use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

pub const DEFAULT_PARAMS_FILE: &str = "params.toml";

/// Parameters shared by every stage. Built once at process start and passed by reference.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingBackend {
    Local,
    Mlflow,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub backend: TrackingBackend,
    pub local_dir: PathBuf,
    pub tracking_uri: String,
    pub experiment_name: String,
    #[serde(skip)]
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            backend: TrackingBackend::Local,
            local_dir: PathBuf::from("mlruns"),
            tracking_uri: String::new(),
            experiment_name: "walmart-sales-eda".to_string(),
            username: None,
            password: None,
        }
    }
}

impl TrackingConfig {
    /// Applies the standard MLflow environment variables on top of the file values.
    /// A tracking URI from the environment switches the backend to MLflow.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("MLFLOW_TRACKING_URI").filter(|v| !v.is_empty()) {
            self.tracking_uri = uri;
            self.backend = TrackingBackend::Mlflow;
        }
        if let Some(name) = lookup("MLFLOW_EXPERIMENT_NAME").filter(|v| !v.is_empty()) {
            self.experiment_name = name;
        }
        self.username = lookup("MLFLOW_TRACKING_USERNAME").or(self.username);
        self.password = lookup("MLFLOW_TRACKING_PASSWORD").or(self.password);
        self
    }
}

impl PipelineConfig {
    /// Loads the parameter file. An explicit path must exist; the default
    /// `params.toml` falls back to built-in values when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_PARAMS_FILE), false),
        };

        if !path.exists() {
            if required {
                return Err(PipelineError::NotFound(path));
            }
            debug!(path = %path.display(), "No parameter file; using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| PipelineError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml(&content, &path)?;
        info!(path = %path.display(), "Parameters loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|source| PipelineError::Config {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn external_dir(&self) -> PathBuf {
        self.paths.data_dir.join("external")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.paths.data_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.paths.data_dir.join("processed")
    }

    pub fn interim_dir(&self) -> PathBuf {
        self.paths.data_dir.join("interim")
    }

    pub fn merged_train_path(&self) -> PathBuf {
        self.raw_dir().join("merged_train.csv")
    }

    pub fn merged_test_path(&self) -> PathBuf {
        self.raw_dir().join("merged_test.csv")
    }

    pub fn processed_train_path(&self) -> PathBuf {
        self.processed_dir().join("processed_train.csv")
    }

    pub fn processed_test_path(&self) -> PathBuf {
        self.processed_dir().join("processed_test.csv")
    }

    pub fn final_train_path(&self) -> PathBuf {
        self.interim_dir().join("train.csv")
    }

    pub fn final_test_path(&self) -> PathBuf {
        self.interim_dir().join("test.csv")
    }
}
