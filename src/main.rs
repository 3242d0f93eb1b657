//! A/B Flow Experiment Analysis Engine
//!
//! Batch pipeline for the web-flow redesign experiment:
//! - Loads client demographics, partitioned web logs and group assignments
//! - Merges and cleans them into one experiment dataset
//! - Reconstructs sessions and computes per-variation metrics
//! - Runs one hypothesis test per metric
//! - Persists the merged dataset and renders the report

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use analysis::{run_pipeline, AnalysisConfig};
use dataset::{load_sources, write_dataset, DatasetConfig};
use report::{render_report, JsonSink, TextSink};
use telemetry::{init_tracing_from_env, metrics};

/// Where results go.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct OutputConfig {
    /// Persisted merged dataset
    #[serde(default = "default_merged_path")]
    merged_path: PathBuf,

    /// JSON copy of the report, skipped when unset
    #[serde(default)]
    report_json_path: Option<PathBuf>,
}

fn default_merged_path() -> PathBuf {
    PathBuf::from("variation_df.csv")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            merged_path: default_merged_path(),
            report_json_path: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    dataset: DatasetConfig,

    #[serde(default)]
    analysis: AnalysisConfig,

    #[serde(default)]
    output: OutputConfig,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting A/B test analysis engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        demographics = %config.dataset.demographics_path.display(),
        web_partitions = config.dataset.web_event_paths.len(),
        assignments = %config.dataset.assignments_path.display(),
        alpha = config.analysis.alpha,
        "Loaded configuration"
    );

    let sources = load_sources(&config.dataset).context("Failed to load sources")?;

    let output = run_pipeline(sources, &config.analysis).context("Analysis pipeline failed")?;

    write_dataset(&config.output.merged_path, &output.output_rows())
        .context("Failed to persist merged dataset")?;

    let stdout = std::io::stdout();
    let mut text = TextSink::new(stdout.lock());
    render_report(&output, &mut text).context("Failed to render text report")?;

    if let Some(path) = &config.output.report_json_path {
        let mut json = JsonSink::new(path);
        render_report(&output, &mut json).context("Failed to write JSON report")?;
    }

    info!(metrics = %metrics().snapshot().to_json(), "Run complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("ABTEST")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for the commonly set paths
    if let Ok(dir) = std::env::var("ABTEST_DATA_DIR") {
        config.dataset = DatasetConfig {
            delimiter: config.dataset.delimiter,
            ..DatasetConfig::in_dir(dir)
        };
    }
    if let Ok(path) = std::env::var("ABTEST_MERGED_PATH") {
        config.output.merged_path = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("ABTEST_REPORT_JSON") {
        config.output.report_json_path = Some(PathBuf::from(path));
    }

    config.analysis.validate().context("Invalid analysis configuration")?;

    Ok(config)
}
