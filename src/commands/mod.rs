pub mod plan;
pub mod split;
pub mod status;

use anyhow::Result;
use tracing::info;

use crate::cli::ConfigArgs;
use crate::config::SplitConfig;
use crate::model::{JobManifest, ToolVersions};
use crate::segmentation::SegmentationOutcome;
use crate::util::now_utc_string;

const MANIFEST_VERSION: u32 = 1;

fn resolve_config(args: &ConfigArgs) -> Result<SplitConfig> {
    let mut config = SplitConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        confidence_threshold = config.confidence_threshold,
        worker_count = config.worker_count,
        per_page_timeout_ms = config.per_page_timeout_ms,
        ocr_threads = config.ocr_threads,
        "resolved job configuration"
    );

    Ok(config)
}

struct ManifestSource {
    run_id: String,
    source_file: String,
    source_sha256: Option<String>,
    tool_versions: Option<ToolVersions>,
}

fn build_manifest(
    source: ManifestSource,
    config: &SplitConfig,
    outcome: &SegmentationOutcome,
    warnings: Vec<String>,
) -> JobManifest {
    JobManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: source.run_id,
        generated_at: now_utc_string(),
        source_file: source.source_file,
        source_sha256: source.source_sha256,
        tool_versions: source.tool_versions,
        config: config.clone(),
        counts: outcome.counts.clone(),
        entries: outcome
            .plans
            .iter()
            .map(|plan| plan.entry.clone())
            .collect(),
        warnings,
    }
}
