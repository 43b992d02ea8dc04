use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::{ManifestSource, build_manifest, resolve_config};
use crate::cli::SplitArgs;
use crate::config::SplitConfig;
use crate::error::JobError;
use crate::joblog::{JobLog, TracingJobLog};
use crate::model::JobManifest;
use crate::ocr::{CancelToken, PageRecognizer, TesseractRecognizer, recognize_pages};
use crate::pdf::{self, QpdfWriter, RangeWriter};
use crate::segmentation::{PatternExtractor, PlannedOutput, SegmentationJob, SegmentationOutcome};
use crate::util::{ensure_directory, run_id_for, sha256_file, source_stem, write_json_pretty};

const REQUIRED_TOOLS: [&str; 4] = ["pdfinfo", "pdftoppm", "tesseract", "qpdf"];

pub fn run(args: SplitArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = run_id_for(started_ts);
    let config = resolve_config(&args.config)?;
    let extractor = PatternExtractor::new(&config)?;

    info!(
        input = %args.input.display(),
        output_dir = %args.output_dir.display(),
        run_id = %run_id,
        "starting split"
    );

    let page_count = preflight(&args.input)?;
    let page_sizes = if config.footer_fraction.is_some() {
        pdf::page_sizes(&args.input, page_count).map_err(|error| JobError::SourceUnreadable {
            path: args.input.clone(),
            reason: format!("{error:#}"),
        })?
    } else {
        Vec::new()
    };
    let source_sha256 = sha256_file(&args.input)?;

    let cancel = CancelToken::new();
    if let Some(seconds) = args.job_timeout_secs {
        cancel.cancel_after(Duration::from_secs(seconds));
    }

    let recognizer = TesseractRecognizer::new(&args.input, &config, page_sizes);
    let source_name = args.input.display().to_string();
    let outcome = segment_document(
        &recognizer,
        page_count,
        &config,
        &extractor,
        &cancel,
        &source_stem(&args.input),
        &source_name,
        &mut TracingJobLog,
    )?;

    let manifest = build_manifest(
        ManifestSource {
            run_id: run_id.clone(),
            source_file: source_name,
            source_sha256: Some(source_sha256),
            tool_versions: Some(pdf::collect_tool_versions()),
        },
        &config,
        &outcome,
        Vec::new(),
    );

    if args.dry_run {
        for plan in &outcome.plans {
            info!(
                file = %plan.file_name,
                case_id = %plan.segment.case_id,
                identified = plan.segment.identified,
                first_page = plan.first_page,
                last_page = plan.last_page,
                "planned case file"
            );
        }
        info!(
            outputs = outcome.plans.len(),
            "dry-run complete; no files written"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| args.output_dir.join("manifest.json"));
    ensure_directory(&args.output_dir)?;
    if let Some(parent) = manifest_path.parent() {
        ensure_directory(parent)?;
    }
    write_outputs(
        &QpdfWriter,
        &args.input,
        &outcome.plans,
        &manifest,
        &args.output_dir,
        &manifest_path,
        &cancel,
    )?;

    info!(path = %manifest_path.display(), "wrote job manifest");
    info!(
        outputs = outcome.plans.len(),
        flagged = outcome.counts.flagged_segment_count,
        "split completed"
    );

    Ok(())
}

fn preflight(input: &Path) -> Result<usize, JobError> {
    let page_count = pdf::page_count(input).map_err(|error| JobError::SourceUnreadable {
        path: input.to_path_buf(),
        reason: format!("{error:#}"),
    })?;
    if page_count == 0 {
        return Err(JobError::EmptyDocument {
            path: input.to_path_buf(),
        });
    }

    let missing = REQUIRED_TOOLS
        .iter()
        .copied()
        .filter(|tool| !pdf::command_available(tool))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(JobError::WorkerUnavailable(format!(
            "missing external tools: {}",
            missing.join(", ")
        )));
    }

    Ok(page_count)
}

#[allow(clippy::too_many_arguments)]
fn segment_document<R>(
    recognizer: &R,
    page_count: usize,
    config: &SplitConfig,
    extractor: &PatternExtractor,
    cancel: &CancelToken,
    source_stem: &str,
    source_name: &str,
    log: &mut dyn JobLog,
) -> Result<SegmentationOutcome, JobError>
where
    R: PageRecognizer + ?Sized,
{
    let mut job = SegmentationJob::new(extractor, source_stem);

    let report = recognize_pages(
        recognizer,
        page_count,
        config.worker_count,
        cancel,
        |record| {
            let done = record.index + 1;
            if done % 10 == 0 || done == page_count {
                info!(page = done, total = page_count, "OCR progress");
            }
            job.push(record);
        },
    );

    if report.cancelled {
        warn!(
            completed = job.pages_seen(),
            total = page_count,
            "job cancelled; discarding partial segments"
        );
        return Err(JobError::Cancelled {
            completed: job.pages_seen(),
            total: page_count,
        });
    }
    if report.failed > 0 {
        warn!(
            delivered = report.delivered,
            failed = report.failed,
            "some pages could not be recognized"
        );
    }

    job.finish(source_name, log)
}

// The manifest is staged with the case files and published last, so a job
// either leaves every file in place or none of them.
fn write_outputs(
    writer: &dyn RangeWriter,
    source: &Path,
    plans: &[PlannedOutput],
    manifest: &JobManifest,
    output_dir: &Path,
    manifest_path: &Path,
    cancel: &CancelToken,
) -> Result<(), JobError> {
    let staging = output_dir.join(format!(".casesplit-staging-{}", manifest.run_id));
    fs::create_dir_all(&staging).map_err(|error| JobError::OutputFailed {
        file_name: staging.display().to_string(),
        reason: error.to_string(),
    })?;

    let staged = stage_outputs(writer, source, plans, &staging, output_dir, cancel).and_then(
        |mut files| {
            let staged_manifest = staging.join("manifest.json");
            write_json_pretty(&staged_manifest, manifest).map_err(|error| {
                JobError::OutputFailed {
                    file_name: manifest_path.display().to_string(),
                    reason: format!("{error:#}"),
                }
            })?;
            files.push((staged_manifest, manifest_path.to_path_buf()));
            Ok(files)
        },
    );
    let result = staged.and_then(|files| publish(&files));
    let _ = fs::remove_dir_all(&staging);
    result
}

fn stage_outputs(
    writer: &dyn RangeWriter,
    source: &Path,
    plans: &[PlannedOutput],
    staging: &Path,
    output_dir: &Path,
    cancel: &CancelToken,
) -> Result<Vec<(PathBuf, PathBuf)>, JobError> {
    let mut files = Vec::with_capacity(plans.len() + 1);
    for (written, plan) in plans.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled {
                completed: written,
                total: plans.len(),
            });
        }

        let staged_path = staging.join(&plan.file_name);
        writer
            .write_range(source, plan.first_page, plan.last_page, &staged_path)
            .map_err(|error| JobError::OutputFailed {
                file_name: plan.file_name.clone(),
                reason: format!("{error:#}"),
            })?;
        info!(
            file = %plan.file_name,
            first_page = plan.first_page + 1,
            last_page = plan.last_page + 1,
            "wrote case file"
        );
        files.push((staged_path, output_dir.join(&plan.file_name)));
    }
    Ok(files)
}

fn publish(files: &[(PathBuf, PathBuf)]) -> Result<(), JobError> {
    let mut moved = Vec::<&Path>::with_capacity(files.len());
    for (staged_path, target) in files {
        if let Err(error) = move_file(staged_path, target) {
            for path in &moved {
                let _ = fs::remove_file(path);
            }
            return Err(JobError::OutputFailed {
                file_name: target.display().to_string(),
                reason: error.to_string(),
            });
        }
        moved.push(target);
    }
    Ok(())
}

// rename fails across filesystems, e.g. a manifest path outside the output dir.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to).or_else(|_| fs::copy(from, to).map(|_| ()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::bail;

    use super::*;
    use crate::joblog::MemoryJobLog;
    use crate::ocr::Recognition;

    struct TextRecognizer {
        pages: Vec<Option<&'static str>>,
    }

    impl PageRecognizer for TextRecognizer {
        fn recognize(&self, page_index: usize, _cancel: &CancelToken) -> Result<Recognition> {
            match self.pages.get(page_index).copied().flatten() {
                Some(text) => Ok(Recognition {
                    text: text.to_string(),
                    confidence: 0.9,
                }),
                None => bail!("tesseract timed out"),
            }
        }
    }

    struct CopyWriter {
        fail_on: Option<String>,
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl RangeWriter for CopyWriter {
        fn write_range(&self, _source: &Path, first: usize, last: usize, dest: &Path) -> Result<()> {
            let name = dest.file_name().unwrap().to_string_lossy().to_string();
            if self.fail_on.as_deref() == Some(name.as_str()) {
                bail!("disk full");
            }
            self.calls.lock().unwrap().push((first, last));
            fs::write(dest, format!("{first}-{last}"))?;
            Ok(())
        }
    }

    fn writer() -> CopyWriter {
        CopyWriter {
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn manifest_for(outcome: &SegmentationOutcome) -> JobManifest {
        build_manifest(
            ManifestSource {
                run_id: "run-test".to_string(),
                source_file: "bundle.pdf".to_string(),
                source_sha256: None,
                tool_versions: None,
            },
            &SplitConfig::default(),
            outcome,
            Vec::new(),
        )
    }

    fn two_cases() -> SegmentationOutcome {
        outcome_for(vec![
            Some("Case Number: 24-001\nPage 1 of 1"),
            Some("Case Number: 24-002\nPage 1 of 1"),
        ])
    }

    fn outcome_for(pages: Vec<Option<&'static str>>) -> SegmentationOutcome {
        let config = SplitConfig {
            worker_count: 2,
            ..SplitConfig::default()
        };
        let extractor = PatternExtractor::new(&config).unwrap();
        let page_count = pages.len();
        let recognizer = TextRecognizer { pages };
        let mut log = MemoryJobLog::default();

        segment_document(
            &recognizer,
            page_count,
            &config,
            &extractor,
            &CancelToken::new(),
            "bundle",
            "bundle.pdf",
            &mut log,
        )
        .unwrap()
    }

    #[test]
    fn ocr_stream_is_segmented_in_page_order() {
        let outcome = outcome_for(vec![
            Some("Case Number: 24-001\nPage 1 of 2"),
            None,
            Some("Case Number: 24-002\nPage 1 of 1"),
            Some("Case Number: 24-001\nPage 1 of 1"),
        ]);

        let names = outcome
            .plans
            .iter()
            .map(|plan| (plan.file_name.as_str(), plan.first_page, plan.last_page))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                ("24-001.pdf", 0, 1),
                ("24-002.pdf", 2, 2),
                ("24-001_2.pdf", 3, 3)
            ]
        );
        assert!(outcome.plans[0].entry.anomaly_flags.contains("OcrFailure"));
        assert_eq!(outcome.counts.ocr_failed_pages, 1);
    }

    #[test]
    fn cancelled_job_returns_fatal_error() {
        let config = SplitConfig::default();
        let extractor = PatternExtractor::new(&config).unwrap();
        let recognizer = TextRecognizer {
            pages: vec![Some("Case Number: 1-1\nPage 1 of 1"); 4],
        };
        let cancel = CancelToken::new();
        cancel.cancel();

        let error = segment_document(
            &recognizer,
            4,
            &config,
            &extractor,
            &cancel,
            "bundle",
            "bundle.pdf",
            &mut MemoryJobLog::default(),
        )
        .unwrap_err();
        assert!(matches!(error, JobError::Cancelled { total: 4, .. }));
    }

    #[test]
    fn outputs_are_published_after_all_writes_succeed() {
        let outcome = two_cases();
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.json");
        let writer = writer();

        write_outputs(
            &writer,
            Path::new("bundle.pdf"),
            &outcome.plans,
            &manifest_for(&outcome),
            dir.path(),
            &manifest_path,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("24-002.pdf")).unwrap(),
            "1-1"
        );
        assert!(dir.path().join("24-001.pdf").exists());
        assert!(!dir.path().join(".casesplit-staging-run-test").exists());
        assert_eq!(*writer.calls.lock().unwrap(), vec![(0, 0), (1, 1)]);

        let manifest: JobManifest = crate::util::read_json(&manifest_path).unwrap();
        assert_eq!(manifest.entries.len(), 2);
    }

    #[test]
    fn failed_write_leaves_no_partial_output() {
        let outcome = two_cases();
        let dir = tempfile::tempdir().unwrap();
        let writer = CopyWriter {
            fail_on: Some("24-002.pdf".to_string()),
            calls: Mutex::new(Vec::new()),
        };

        let error = write_outputs(
            &writer,
            Path::new("bundle.pdf"),
            &outcome.plans,
            &manifest_for(&outcome),
            dir.path(),
            &dir.path().join("manifest.json"),
            &CancelToken::new(),
        )
        .unwrap_err();

        assert!(matches!(error, JobError::OutputFailed { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unwritable_manifest_withdraws_published_case_files() {
        let outcome = two_cases();
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let manifest_path = elsewhere.path().join("taken");
        fs::create_dir(&manifest_path).unwrap();
        fs::write(manifest_path.join("keep"), "x").unwrap();

        let error = write_outputs(
            &writer(),
            Path::new("bundle.pdf"),
            &outcome.plans,
            &manifest_for(&outcome),
            dir.path(),
            &manifest_path,
            &CancelToken::new(),
        )
        .unwrap_err();

        assert!(matches!(error, JobError::OutputFailed { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(manifest_path.join("keep").exists());
    }

    #[test]
    fn cancellation_during_writes_discards_staged_files() {
        let outcome = outcome_for(vec![Some("Case Number: 24-001\nPage 1 of 1")]);
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let error = write_outputs(
            &writer(),
            Path::new("bundle.pdf"),
            &outcome.plans,
            &manifest_for(&outcome),
            dir.path(),
            &dir.path().join("manifest.json"),
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(error, JobError::Cancelled { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_source_is_job_fatal() {
        let error = preflight(Path::new("/nonexistent/bundle.pdf")).unwrap_err();
        assert!(matches!(error, JobError::SourceUnreadable { .. }));
    }
}
