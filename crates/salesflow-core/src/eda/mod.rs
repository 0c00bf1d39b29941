//! Exploratory plots over the merged tables, logged to a tracking run.
//!
//! Every plot is computed, rendered to SVG and handed to the sink in turn. The first
//! failure aborts the stage and closes the run as failed; plots already logged stay in it.

pub mod aggregate;
pub mod render;
pub mod sink;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::table::{float_values, read_csv};

use aggregate::{
    correlation_matrix, grouped_mean, grouped_sum, histogram, normalized_value_counts,
};
use render::{bar_chart, correlation_heatmap, histogram_chart, point_chart, BarOptions, HeatmapOptions};
use sink::{RunStatus, TrackingSink};

pub const TRAIN_CORR_HEATMAP: &str = "plots/train_corr_heatmap.svg";
pub const TEST_CORR_HEATMAP: &str = "plots/test_corr_heatmap.svg";
pub const STORE_DISTRIBUTION: &str = "plots/store_distribution.svg";
pub const WEEKLY_SALES_DISTPLOT: &str = "plots/weekly_sales_distplot.svg";
pub const WEEKLY_SALES_BY_STORE: &str = "plots/weekly_sales_by_store.svg";
pub const WEEKLY_SALES_BY_TYPE: &str = "plots/weekly_sales_by_type.svg";
pub const WEEKLY_SALES_BY_DEPT: &str = "plots/weekly_sales_by_dept.svg";

/// Labels in the order they are logged.
pub const PLOT_LABELS: [&str; 7] = [
    TRAIN_CORR_HEATMAP,
    TEST_CORR_HEATMAP,
    STORE_DISTRIBUTION,
    WEEKLY_SALES_DISTPLOT,
    WEEKLY_SALES_BY_STORE,
    WEEKLY_SALES_BY_TYPE,
    WEEKLY_SALES_BY_DEPT,
];

const SALES: &str = "Weekly_Sales";

#[derive(Debug, Clone, Serialize)]
pub struct EdaReport {
    pub run_id: String,
    pub artifacts: Vec<String>,
}

fn publish(sink: &mut dyn TrackingSink, label: &str, svg: String, logged: &mut Vec<String>) -> Result<()> {
    sink.log_artifact(label, svg.as_bytes())?;
    info!(label, "Plot logged");
    logged.push(label.to_string());
    Ok(())
}

/// Renders the seven exploratory plots and logs each to `sink`. The sink is left open.
pub fn log_exploratory_plots(
    train: &DataFrame,
    test: &DataFrame,
    sink: &mut dyn TrackingSink,
) -> Result<Vec<String>> {
    let mut logged = Vec::with_capacity(PLOT_LABELS.len());

    let svg = correlation_heatmap(
        &correlation_matrix(train)?,
        &HeatmapOptions {
            title: "Train correlation",
            size: (2000, 1000),
            decimals: 2,
        },
    )?;
    publish(sink, TRAIN_CORR_HEATMAP, svg, &mut logged)?;

    let svg = correlation_heatmap(
        &correlation_matrix(test)?,
        &HeatmapOptions {
            title: "Test correlation",
            size: (1300, 600),
            decimals: 2,
        },
    )?;
    publish(sink, TEST_CORR_HEATMAP, svg, &mut logged)?;

    let svg = bar_chart(
        &normalized_value_counts(train, "Store")?,
        &BarOptions {
            title: "Normalized Store Distribution",
            x_desc: "Store",
            y_desc: "Share of rows",
            size: (1400, 600),
        },
    )?;
    publish(sink, STORE_DISTRIBUTION, svg, &mut logged)?;

    let sales: Vec<f64> = float_values(train, SALES)?.into_iter().flatten().collect();
    let svg = histogram_chart(
        &histogram(&sales),
        &BarOptions {
            title: "Weekly Sales Distribution",
            x_desc: SALES,
            y_desc: "Count",
            size: (500, 500),
        },
    )?;
    publish(sink, WEEKLY_SALES_DISTPLOT, svg, &mut logged)?;

    let svg = bar_chart(
        &grouped_sum(train, "Store", SALES)?,
        &BarOptions {
            title: "Total Weekly Sales per Store",
            x_desc: "Store",
            y_desc: SALES,
            size: (640, 480),
        },
    )?;
    publish(sink, WEEKLY_SALES_BY_STORE, svg, &mut logged)?;

    let svg = bar_chart(
        &grouped_mean(train, "Type", SALES)?,
        &BarOptions {
            title: "Weekly Sales by Store Type",
            x_desc: "Type",
            y_desc: SALES,
            size: (455, 325),
        },
    )?;
    publish(sink, WEEKLY_SALES_BY_TYPE, svg, &mut logged)?;

    let svg = point_chart(
        &grouped_mean(train, "Dept", SALES)?,
        &BarOptions {
            title: "Weekly Sales by Department",
            x_desc: "Dept",
            y_desc: SALES,
            size: (1800, 700),
        },
    )?;
    publish(sink, WEEKLY_SALES_BY_DEPT, svg, &mut logged)?;

    Ok(logged)
}

/// Reads the merged tables, logs every plot and closes the run. The run is closed as
/// failed when any step errors, and the original error is returned.
pub fn run(config: &PipelineConfig, sink: &mut dyn TrackingSink) -> Result<EdaReport> {
    let artifacts = match read_and_log(config, sink) {
        Ok(artifacts) => artifacts,
        Err(err) => {
            if let Err(close_err) = sink.finish(RunStatus::Failed) {
                warn!(run_id = sink.run_id(), error = %close_err, "Could not mark run as failed");
            }
            return Err(err);
        }
    };
    sink.finish(RunStatus::Finished)?;

    info!(run_id = sink.run_id(), plots = artifacts.len(), "Exploratory logging complete");
    Ok(EdaReport {
        run_id: sink.run_id().to_string(),
        artifacts,
    })
}

fn read_and_log(config: &PipelineConfig, sink: &mut dyn TrackingSink) -> Result<Vec<String>> {
    let train = read_csv(&config.merged_train_path())?;
    let test = read_csv(&config.merged_test_path())?;
    log_exploratory_plots(&train, &test, sink)
}
