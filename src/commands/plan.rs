use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use super::{ManifestSource, build_manifest, resolve_config};
use crate::cli::PlanArgs;
use crate::joblog::TracingJobLog;
use crate::model::PageRecord;
use crate::segmentation::{PatternExtractor, run_segmentation};
use crate::util::{read_json, run_id_for, source_stem, write_json_pretty};

pub fn run(args: PlanArgs) -> Result<()> {
    let run_id = run_id_for(Utc::now());
    let config = resolve_config(&args.config)?;
    let extractor = PatternExtractor::new(&config)?;

    let records: Vec<PageRecord> = read_json(&args.pages)?;
    let (records, warnings) = normalize_records(records)?;
    for warning in &warnings {
        warn!(warning = %warning, "page records adjusted");
    }

    let source_name = args
        .source_name
        .clone()
        .unwrap_or_else(|| args.pages.display().to_string());
    let stem = source_stem(Path::new(&source_name));

    let outcome = run_segmentation(
        records,
        &extractor,
        &stem,
        &source_name,
        &mut TracingJobLog,
    )?;

    let manifest = build_manifest(
        ManifestSource {
            run_id,
            source_file: source_name,
            source_sha256: None,
            tool_versions: None,
        },
        &config,
        &outcome,
        warnings,
    );

    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| default_manifest_path(&args.pages));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        outputs = manifest.entries.len(),
        "wrote planned manifest"
    );
    Ok(())
}

fn default_manifest_path(pages_path: &Path) -> PathBuf {
    pages_path.with_file_name("manifest.json")
}

fn normalize_records(mut records: Vec<PageRecord>) -> Result<(Vec<PageRecord>, Vec<String>)> {
    records.sort_by_key(|record| record.index);
    if let Some(pair) = records.windows(2).find(|pair| pair[0].index == pair[1].index) {
        bail!("duplicate page record for index {}", pair[0].index);
    }

    let mut warnings = Vec::new();
    let mut normalized = Vec::with_capacity(records.len());
    for record in records {
        while normalized.len() < record.index {
            let missing = normalized.len();
            warnings.push(format!("page {missing} missing from input; treated as OCR failure"));
            normalized.push(PageRecord::failed(missing, "page missing from input"));
        }
        normalized.push(PageRecord::new(
            record.index,
            record.raw_text,
            record.confidence,
        ));
        if let Some(failure) = record.failure
            && let Some(last) = normalized.last_mut()
        {
            last.failure = Some(failure);
        }
    }

    Ok((normalized, warnings))
}
