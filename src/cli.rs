use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::SplitConfig;

#[derive(Parser, Debug)]
#[command(
    name = "casesplit",
    version,
    about = "Split a consolidated multi-case PDF into one PDF per case using OCR"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Split(SplitArgs),
    Plan(PlanArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub job_timeout_secs: Option<u64>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[arg(long)]
    pub pages: PathBuf,

    #[arg(long)]
    pub source_name: Option<String>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub manifest_path: PathBuf,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub case_pattern: Option<String>,

    #[arg(long)]
    pub page_counter_pattern: Option<String>,

    #[arg(long)]
    pub case_label: Option<String>,

    #[arg(long)]
    pub case_label_similarity: Option<f64>,

    #[arg(long)]
    pub confidence_threshold: Option<f32>,

    #[arg(long)]
    pub worker_count: Option<usize>,

    #[arg(long)]
    pub per_page_timeout_ms: Option<u64>,

    #[arg(long)]
    pub ocr_threads: Option<usize>,

    #[arg(long)]
    pub ocr_lang: Option<String>,

    #[arg(long)]
    pub dpi: Option<u32>,

    #[arg(long)]
    pub footer_fraction: Option<f32>,

    #[arg(long)]
    pub cancel_grace_ms: Option<u64>,
}

impl ConfigArgs {
    pub fn apply(&self, config: &mut SplitConfig) {
        if let Some(value) = &self.case_pattern {
            config.case_pattern = value.clone();
        }
        if let Some(value) = &self.page_counter_pattern {
            config.page_counter_pattern = value.clone();
        }
        if let Some(value) = &self.case_label {
            config.case_label = value.clone();
        }
        if let Some(value) = self.case_label_similarity {
            config.case_label_similarity = value;
        }
        if let Some(value) = self.confidence_threshold {
            config.confidence_threshold = value;
        }
        if let Some(value) = self.worker_count {
            config.worker_count = value;
        }
        if let Some(value) = self.per_page_timeout_ms {
            config.per_page_timeout_ms = value;
        }
        if let Some(value) = self.ocr_threads {
            config.ocr_threads = value;
        }
        if let Some(value) = &self.ocr_lang {
            config.ocr_lang = value.clone();
        }
        if let Some(value) = self.dpi {
            config.dpi = value;
        }
        if let Some(value) = self.footer_fraction {
            config.footer_fraction = Some(value);
        }
        if let Some(value) = self.cancel_grace_ms {
            config.cancel_grace_ms = value;
        }
    }
}
