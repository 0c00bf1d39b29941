mod common;

use polars::prelude::*;
use salesflow_core::eda::sink::{LocalSink, RunStatus, TrackingError, TrackingSink};
use salesflow_core::eda::{self, log_exploratory_plots, PLOT_LABELS};
use salesflow_core::PipelineError;

/// Keeps artifacts in memory; optionally fails on the n-th upload.
#[derive(Default)]
struct RecordingSink {
    artifacts: Vec<(String, Vec<u8>)>,
    fail_at: Option<usize>,
    closed: Option<RunStatus>,
}

impl TrackingSink for RecordingSink {
    fn run_id(&self) -> &str {
        "recording"
    }

    fn log_artifact(&mut self, label: &str, content: &[u8]) -> Result<(), TrackingError> {
        if self.fail_at == Some(self.artifacts.len()) {
            return Err(TrackingError::InvalidLabel(label.to_string()));
        }
        self.artifacts.push((label.to_string(), content.to_vec()));
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) -> Result<(), TrackingError> {
        self.closed = Some(status);
        Ok(())
    }
}

fn merged() -> PolarsResult<(DataFrame, DataFrame)> {
    let train = df!(
        "Store" => &[1i64, 1, 2, 2, 3],
        "Dept" => &[1i64, 5, 1, 5, 1],
        "Weekly_Sales" => &[24924.5f64, 50.0, 30000.0, 1200.0, 6453.58],
        "Type" => &["A", "A", "B", "B", "C"],
        "CPI" => &[211.1f64, 211.2, 210.8, 210.9, 214.4],
        "IsHoliday" => &[false, true, false, true, false],
    )?;
    let test = df!(
        "Store" => &[1i64, 3],
        "Dept" => &[5i64, 1],
        "CPI" => &[Some(223.4f64), None],
    )?;
    Ok((train, test))
}

#[test]
fn seven_plots_are_logged_in_order() -> PolarsResult<()> {
    let (train, test) = merged()?;
    let mut sink = RecordingSink::default();
    let logged = log_exploratory_plots(&train, &test, &mut sink).unwrap();

    let labels: Vec<&str> = sink.artifacts.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, PLOT_LABELS.to_vec());
    assert_eq!(logged.len(), 7);
    for (label, body) in &sink.artifacts {
        let text = String::from_utf8(body.clone()).unwrap();
        assert!(text.starts_with("<svg"), "{label} is not an SVG document");
    }
    assert!(sink.closed.is_none());
    Ok(())
}

#[test]
fn first_sink_error_stops_the_stage() -> PolarsResult<()> {
    let (train, test) = merged()?;
    let mut sink = RecordingSink {
        fail_at: Some(2),
        ..RecordingSink::default()
    };
    let err = log_exploratory_plots(&train, &test, &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::Tracking(_)));
    assert_eq!(sink.artifacts.len(), 2);
    Ok(())
}

#[test]
fn missing_sales_column_is_reported() -> PolarsResult<()> {
    let (train, test) = merged()?;
    let mut sink = RecordingSink::default();
    let err = log_exploratory_plots(&train.drop("Weekly_Sales")?, &test, &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::MissingColumn(name) if name == "Weekly_Sales"));
    Ok(())
}

#[test]
fn run_logs_to_local_tracking_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fixture_config(dir.path());
    salesflow_core::ingestion::run(&config).unwrap();

    let mut sink = LocalSink::open(&config.tracking.local_dir, "fixture").unwrap();
    let report = eda::run(&config, &mut sink).unwrap();

    assert_eq!(report.artifacts.len(), 7);
    for label in PLOT_LABELS {
        assert!(sink.artifact_path(label).is_file(), "{label} not written");
    }
    let manifest = std::fs::read_to_string(sink.run_dir().join("run.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest["run_id"], report.run_id.as_str());
    assert_eq!(manifest["status"], "FINISHED");
    assert_eq!(manifest["artifacts"].as_array().unwrap().len(), 7);
}

#[test]
fn failed_upload_closes_the_run_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fixture_config(dir.path());
    salesflow_core::ingestion::run(&config).unwrap();

    let mut sink = RecordingSink {
        fail_at: Some(1),
        ..RecordingSink::default()
    };
    let err = eda::run(&config, &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::Tracking(_)));
    assert_eq!(sink.artifacts.len(), 1);
    assert_eq!(sink.closed, Some(RunStatus::Failed));
}

#[test]
fn missing_merged_tables_close_the_local_run_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fixture_config(dir.path());

    let mut sink = LocalSink::open(&config.tracking.local_dir, "fixture").unwrap();
    let err = eda::run(&config, &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));

    let manifest = std::fs::read_to_string(sink.run_dir().join("run.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest["status"], "FAILED");
    assert_eq!(manifest["artifacts"].as_array().unwrap().len(), 0);
}

#[test]
fn successful_run_is_closed_as_finished() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fixture_config(dir.path());
    salesflow_core::ingestion::run(&config).unwrap();

    let mut sink = RecordingSink::default();
    eda::run(&config, &mut sink).unwrap();
    assert_eq!(sink.closed, Some(RunStatus::Finished));
}
