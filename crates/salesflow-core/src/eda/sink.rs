// crates/salesflow-core/src/eda/sink.rs

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{TrackingBackend, TrackingConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MANIFEST_FILE: &str = "run.json";

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("tracking request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracking server returned {status} for {endpoint}: {body}")]
    Api {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    #[error("tracking I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode run manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact label '{0}' must be a relative path without '..'")]
    InvalidLabel(String),

    #[error("tracking backend is mlflow but no tracking URI is configured")]
    MissingTrackingUri,

    #[error("run {0} is already finished")]
    Finished(String),
}

/// Terminal state of a tracking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// Destination for exploratory artifacts. One sink corresponds to one tracking run.
pub trait TrackingSink {
    fn run_id(&self) -> &str;

    /// Stores `content` under the artifact path `label` (e.g. `plots/store_distribution.svg`).
    fn log_artifact(&mut self, label: &str, content: &[u8]) -> Result<(), TrackingError>;

    /// Closes the run with `status`. Logging after this call fails; closing twice is a no-op.
    fn finish(&mut self, status: RunStatus) -> Result<(), TrackingError>;
}

/// Opens a sink for the configured backend and starts a new run.
pub fn open_sink(config: &TrackingConfig) -> Result<Box<dyn TrackingSink>, TrackingError> {
    match config.backend {
        TrackingBackend::Local => Ok(Box::new(LocalSink::open(
            &config.local_dir,
            &config.experiment_name,
        )?)),
        TrackingBackend::Mlflow => Ok(Box::new(MlflowSink::open(config)?)),
    }
}

fn check_label(label: &str) -> Result<(), TrackingError> {
    let path = Path::new(label);
    let relative = !label.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if relative {
        Ok(())
    } else {
        Err(TrackingError::InvalidLabel(label.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: String,
    pub experiment_name: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub artifacts: Vec<String>,
}

/// Writes artifacts to `<root>/<run-id>/artifacts/<label>` and a `run.json` manifest
/// next to them when the run finishes.
#[derive(Debug)]
pub struct LocalSink {
    run_dir: PathBuf,
    manifest: RunManifest,
}

impl LocalSink {
    pub fn open(root: &Path, experiment_name: &str) -> Result<Self, TrackingError> {
        let run_id = Uuid::new_v4().simple().to_string();
        let run_dir = root.join(&run_id);
        let artifacts = run_dir.join("artifacts");
        std::fs::create_dir_all(&artifacts).map_err(|source| TrackingError::Io {
            path: artifacts.clone(),
            source,
        })?;
        info!(run_id = %run_id, dir = %run_dir.display(), "Started local tracking run");
        Ok(Self {
            run_dir,
            manifest: RunManifest {
                run_id,
                experiment_name: experiment_name.to_string(),
                status: "RUNNING".to_string(),
                started_at: Utc::now(),
                finished_at: None,
                artifacts: Vec::new(),
            },
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn manifest(&self) -> &RunManifest {
        &self.manifest
    }

    pub fn artifact_path(&self, label: &str) -> PathBuf {
        self.run_dir.join("artifacts").join(label)
    }
}

impl TrackingSink for LocalSink {
    fn run_id(&self) -> &str {
        &self.manifest.run_id
    }

    fn log_artifact(&mut self, label: &str, content: &[u8]) -> Result<(), TrackingError> {
        if self.manifest.finished_at.is_some() {
            return Err(TrackingError::Finished(self.manifest.run_id.clone()));
        }
        check_label(label)?;
        let path = self.artifact_path(label);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TrackingError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, content).map_err(|source| TrackingError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(label, bytes = content.len(), "Logged artifact");
        self.manifest.artifacts.push(label.to_string());
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) -> Result<(), TrackingError> {
        if self.manifest.finished_at.is_some() {
            return Ok(());
        }
        self.manifest.status = status.as_str().to_string();
        self.manifest.finished_at = Some(Utc::now());
        let path = self.run_dir.join(MANIFEST_FILE);
        let body = serde_json::to_vec_pretty(&self.manifest)?;
        std::fs::write(&path, body).map_err(|source| TrackingError::Io { path, source })?;
        info!(
            run_id = %self.manifest.run_id,
            status = status.as_str(),
            artifacts = self.manifest.artifacts.len(),
            "Closed local tracking run"
        );
        Ok(())
    }
}

#[derive(Deserialize)]
struct ExperimentEnvelope {
    experiment: ExperimentInfo,
}

#[derive(Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Deserialize)]
struct CreatedExperiment {
    experiment_id: String,
}

#[derive(Deserialize)]
struct RunEnvelope {
    run: RunBody,
}

#[derive(Deserialize)]
struct RunBody {
    info: RunInfo,
}

#[derive(Deserialize)]
struct RunInfo {
    run_id: String,
    #[serde(default)]
    artifact_uri: String,
}

/// Talks to an MLflow tracking server over its REST API. Artifacts are uploaded through
/// the server's artifact proxy.
pub struct MlflowSink {
    client: Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
    experiment_id: String,
    run_id: String,
    artifact_root: String,
    finished: bool,
}

impl MlflowSink {
    pub fn open(config: &TrackingConfig) -> Result<Self, TrackingError> {
        let base_url = config.tracking_uri.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(TrackingError::MissingTrackingUri);
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone()));

        let mut sink = Self {
            client,
            base_url,
            credentials,
            experiment_id: String::new(),
            run_id: String::new(),
            artifact_root: String::new(),
            finished: false,
        };
        sink.experiment_id = sink.ensure_experiment(&config.experiment_name)?;

        let created: RunEnvelope = sink.call(
            "runs/create",
            sink.client
                .post(sink.api_url("runs/create"))
                .json(&json!({
                    "experiment_id": sink.experiment_id,
                    "start_time": Utc::now().timestamp_millis(),
                })),
        )?;
        sink.run_id = created.run.info.run_id;
        sink.artifact_root = proxied_artifact_root(
            &created.run.info.artifact_uri,
            &sink.experiment_id,
            &sink.run_id,
        );
        info!(
            run_id = %sink.run_id,
            experiment_id = %sink.experiment_id,
            tracking_uri = %sink.base_url,
            "Started MLflow run"
        );
        Ok(sink)
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{endpoint}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_deref()),
            None => request,
        }
    }

    fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, TrackingError> {
        let response = self.authorize(request).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(TrackingError::Api {
            endpoint: endpoint.to_string(),
            status,
            body: response.text().unwrap_or_default(),
        })
    }

    fn call<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, TrackingError> {
        Ok(self.send(endpoint, request)?.json()?)
    }

    fn ensure_experiment(&self, name: &str) -> Result<String, TrackingError> {
        let lookup = self.client.get(self.api_url("experiments/get-by-name"))
            .query(&[("experiment_name", name)]);
        match self.call::<ExperimentEnvelope>("experiments/get-by-name", lookup) {
            Ok(found) => Ok(found.experiment.experiment_id),
            Err(TrackingError::Api { status, .. }) if status == StatusCode::NOT_FOUND => {
                let created: CreatedExperiment = self.call(
                    "experiments/create",
                    self.client
                        .post(self.api_url("experiments/create"))
                        .json(&json!({ "name": name })),
                )?;
                info!(experiment = name, id = %created.experiment_id, "Created MLflow experiment");
                Ok(created.experiment_id)
            }
            Err(err) => Err(err),
        }
    }
}

/// Path under `/api/2.0/mlflow-artifacts/artifacts/` for a run's artifacts. Runs whose
/// artifact URI is not proxied fall back to the server's default layout.
fn proxied_artifact_root(artifact_uri: &str, experiment_id: &str, run_id: &str) -> String {
    artifact_uri
        .strip_prefix("mlflow-artifacts:")
        .map(|rest| rest.trim_start_matches('/').trim_end_matches('/').to_string())
        .filter(|rest| !rest.is_empty())
        .unwrap_or_else(|| format!("{experiment_id}/{run_id}/artifacts"))
}

impl TrackingSink for MlflowSink {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn log_artifact(&mut self, label: &str, content: &[u8]) -> Result<(), TrackingError> {
        if self.finished {
            return Err(TrackingError::Finished(self.run_id.clone()));
        }
        check_label(label)?;
        let url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{label}",
            self.base_url, self.artifact_root
        );
        let content_type = if label.ends_with(".svg") {
            "image/svg+xml"
        } else {
            "application/octet-stream"
        };
        self.send(
            "mlflow-artifacts/artifacts",
            self.client
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(content.to_vec()),
        )?;
        debug!(label, bytes = content.len(), "Uploaded artifact");
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) -> Result<(), TrackingError> {
        if self.finished {
            return Ok(());
        }
        self.send(
            "runs/update",
            self.client.post(self.api_url("runs/update")).json(&json!({
                "run_id": self.run_id,
                "status": status.as_str(),
                "end_time": Utc::now().timestamp_millis(),
            })),
        )?;
        self.finished = true;
        info!(run_id = %self.run_id, status = status.as_str(), "Closed MLflow run");
        Ok(())
    }
}
