use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::JobManifest;
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    info!(manifest = %args.manifest_path.display(), "status requested");

    let manifest: JobManifest = read_json(&args.manifest_path)?;

    info!(
        run_id = %manifest.run_id,
        generated_at = %manifest.generated_at,
        source = %manifest.source_file,
        source_sha256 = %manifest.source_sha256.as_deref().unwrap_or("-"),
        pages = manifest.counts.page_count,
        segments = manifest.counts.segment_count,
        unidentified = manifest.counts.unidentified_segment_count,
        flagged = manifest.counts.flagged_segment_count,
        ocr_failed = manifest.counts.ocr_failed_pages,
        "loaded job manifest"
    );

    for entry in manifest
        .entries
        .iter()
        .filter(|entry| !entry.anomaly_flags.is_empty())
    {
        warn!(
            file = %entry.output_file_name,
            case_id = %entry.case_id,
            first_page = entry.source_page_range[0],
            last_page = entry.source_page_range[1],
            anomalies = %entry.anomaly_flags.iter().cloned().collect::<Vec<_>>().join(","),
            "segment needs review"
        );
    }

    for (anomaly, segments) in anomaly_totals(&manifest) {
        info!(anomaly = %anomaly, segments, "anomaly total");
    }
    for warning in &manifest.warnings {
        warn!(warning = %warning, "manifest warning");
    }

    Ok(())
}

fn anomaly_totals(manifest: &JobManifest) -> BTreeMap<&str, usize> {
    let mut totals = BTreeMap::new();
    for flag in manifest
        .entries
        .iter()
        .flat_map(|entry| entry.anomaly_flags.iter())
    {
        *totals.entry(flag.as_str()).or_insert(0) += 1;
    }
    totals
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::config::SplitConfig;
    use crate::model::{JobCounts, ManifestEntry};
    use crate::util::write_json_pretty;

    fn entry(name: &str, flags: &[&str]) -> ManifestEntry {
        ManifestEntry {
            output_file_name: format!("{name}.pdf"),
            case_id: name.to_string(),
            source_page_range: [0, 0],
            page_count: 1,
            anomaly_flags: flags.iter().map(|flag| flag.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn manifest() -> JobManifest {
        JobManifest {
            manifest_version: 1,
            run_id: "run-20260101T000000Z".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            source_file: "bundle.pdf".to_string(),
            source_sha256: None,
            tool_versions: None,
            config: SplitConfig::default(),
            counts: JobCounts::default(),
            entries: vec![
                entry("A1", &["CounterMismatch", "OcrFailure"]),
                entry("B2", &[]),
                entry("C3", &["CounterMismatch"]),
            ],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn anomalies_are_counted_per_segment() {
        let manifest = manifest();
        let totals = anomaly_totals(&manifest);

        assert_eq!(totals.get("CounterMismatch"), Some(&2));
        assert_eq!(totals.get("OcrFailure"), Some(&1));
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn status_reads_written_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        write_json_pretty(&path, &manifest()).unwrap();

        run(StatusArgs {
            manifest_path: path,
        })
        .unwrap();
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(StatusArgs {
            manifest_path: dir.path().join("absent.json"),
        });
        assert!(result.is_err());
    }
}
