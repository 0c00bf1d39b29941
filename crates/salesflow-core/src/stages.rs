use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::eda::{self, sink::open_sink, EdaReport};
use crate::error::Result;
use crate::features::{self, FeatureReport};
use crate::ingestion::{self, IngestionReport};
use crate::preprocessing::{self, PreprocessingReport};

/// Report produced by one stage run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    Ingestion(IngestionReport),
    Preprocessing(PreprocessingReport),
    Features(FeatureReport),
    Eda(EdaReport),
}

pub trait PipelineStage: Send + Sync {
    fn code_identifier(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn run(&self, config: &PipelineConfig) -> Result<StageOutput>;
}

#[derive(Debug, Clone, Serialize)]
pub struct StageDescriptor {
    pub code: &'static str,
    pub version: &'static str,
    /// Whether `run` executes the stage without `--with-eda`.
    pub include_in_pipeline: bool,
    pub description: &'static str,
}

struct IngestionStage;
struct PreprocessingStage;
struct FeatureStage;
struct EdaStage;

impl PipelineStage for IngestionStage {
    fn code_identifier(&self) -> &'static str {
        "ingest"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn description(&self) -> &'static str {
        "Join sales with stores and features; write merged tables and summaries"
    }

    fn run(&self, config: &PipelineConfig) -> Result<StageOutput> {
        ingestion::run(config).map(StageOutput::Ingestion)
    }
}

impl PipelineStage for PreprocessingStage {
    fn code_identifier(&self) -> &'static str {
        "preprocess"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn description(&self) -> &'static str {
        "Clear negatives, impute and zero-fill missing values, cap weekly sales"
    }

    fn run(&self, config: &PipelineConfig) -> Result<StageOutput> {
        preprocessing::run(config).map(StageOutput::Preprocessing)
    }
}

impl PipelineStage for FeatureStage {
    fn code_identifier(&self) -> &'static str {
        "features"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn description(&self) -> &'static str {
        "Celsius, calendar parts, holiday flags, one-hot encoding, integer cast"
    }

    fn run(&self, config: &PipelineConfig) -> Result<StageOutput> {
        features::run(config).map(StageOutput::Features)
    }
}

impl PipelineStage for EdaStage {
    fn code_identifier(&self) -> &'static str {
        "eda"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn description(&self) -> &'static str {
        "Render exploratory plots of the merged tables into a tracking run"
    }

    fn run(&self, config: &PipelineConfig) -> Result<StageOutput> {
        let mut sink = open_sink(&config.tracking)?;
        eda::run(config, sink.as_mut()).map(StageOutput::Eda)
    }
}

static STAGE_IMPLEMENTATIONS: Lazy<Vec<&'static dyn PipelineStage>> = Lazy::new(|| {
    vec![
        &IngestionStage as &dyn PipelineStage,
        &PreprocessingStage as &dyn PipelineStage,
        &FeatureStage as &dyn PipelineStage,
        &EdaStage as &dyn PipelineStage,
    ]
});

/// Every stage in pipeline order.
pub fn all_stages() -> &'static [&'static dyn PipelineStage] {
    STAGE_IMPLEMENTATIONS.as_slice()
}

static STAGES: Lazy<Vec<StageDescriptor>> = Lazy::new(|| {
    all_stages()
        .iter()
        .map(|stage| StageDescriptor {
            code: stage.code_identifier(),
            version: stage.version(),
            include_in_pipeline: stage.code_identifier() != "eda",
            description: stage.description(),
        })
        .collect()
});

pub fn all_stage_descriptors() -> &'static [StageDescriptor] {
    STAGES.as_slice()
}

pub fn find_stage(code: &str) -> Option<&'static dyn PipelineStage> {
    all_stages()
        .iter()
        .copied()
        .find(|stage| stage.code_identifier() == code)
}

/// Runs the stages in order, stopping at the first failure.
pub fn run_pipeline(config: &PipelineConfig, with_eda: bool) -> Result<Vec<StageOutput>> {
    let mut outputs = Vec::new();
    for (stage, descriptor) in all_stages().iter().zip(all_stage_descriptors()) {
        if !descriptor.include_in_pipeline && !with_eda {
            continue;
        }
        info!(stage = stage.code_identifier(), version = stage.version(), "Running stage");
        outputs.push(stage.run(config)?);
    }
    Ok(outputs)
}
