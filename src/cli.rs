use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "nkir",
    version,
    about = "KCNA article queueing, extraction and full-text import pipeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy articles referenced by mirror diff logs into the extraction inbox.
    Queue(QueueArgs),
    /// Turn queued HTML articles into JSON records.
    Extract(ExtractArgs),
    /// Load JSON records into the article store and refresh the text index.
    Import(ImportArgs),
    /// Run queue, extract and import in order.
    Run(RunArgs),
    /// Show per-stage unit counts and article store state.
    Status(StatusArgs),
    /// Export per-term mention counts from the article store as CSV.
    Report(ReportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    #[arg(long, default_value = "data/collector_kcna")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub mirror_root: Option<PathBuf>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    #[arg(long)]
    pub lock_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DetectionArgs {
    /// JSON file holding the language detection API key; enables the filter.
    #[arg(long)]
    pub language_credentials: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    pub detect_timeout_secs: u64,

    #[arg(long, default_value = "http://www.kcna.co.jp")]
    pub url_root: String,
}

#[derive(Args, Debug, Clone)]
pub struct QueueArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub detection: DetectionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub detection: DetectionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Also report where this unit file name currently sits in each stage.
    #[arg(long)]
    pub unit: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[arg(long, default_value = "var/datasets/countries.txt")]
    pub countries_path: PathBuf,

    /// Search these terms instead of the countries list.
    #[arg(long = "term")]
    pub terms: Vec<String>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, default_value_t = 500)]
    pub limit: usize,
}
