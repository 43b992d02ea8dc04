mod engine;
mod extract;
mod planner;
mod validate;

pub use engine::SegmentationEngine;
pub use extract::PatternExtractor;
pub use planner::{PlannedOutput, plan_outputs, verify_page_conservation};
pub use validate::validate_segments;

use crate::error::JobError;
use crate::joblog::{JobLog, JobSummary, PageEvent};
use crate::model::{JobCounts, MatchQuality, PageRecord, Segment, TaggedPage};

#[derive(Debug)]
pub struct SegmentationOutcome {
    pub plans: Vec<PlannedOutput>,
    pub counts: JobCounts,
}

pub struct SegmentationJob<'a> {
    extractor: &'a PatternExtractor,
    engine: SegmentationEngine,
    pages: Vec<TaggedPage>,
}

impl<'a> SegmentationJob<'a> {
    pub fn new(extractor: &'a PatternExtractor, source_stem: &str) -> Self {
        Self {
            extractor,
            engine: SegmentationEngine::new(source_stem),
            pages: Vec::new(),
        }
    }

    pub fn push(&mut self, record: PageRecord) {
        debug_assert_eq!(record.index, self.pages.len(), "page records must arrive in order");
        let markers = self.extractor.extract(&record);
        let page = TaggedPage { record, markers };
        self.engine.push(&page);
        self.pages.push(page);
    }

    pub fn pages_seen(&self) -> usize {
        self.pages.len()
    }

    pub fn finish(self, source: &str, log: &mut dyn JobLog) -> Result<SegmentationOutcome, JobError> {
        let segments = validate_segments(self.engine.finish(), &self.pages);
        verify_page_conservation(&segments, self.pages.len())?;

        for segment in &segments {
            for &index in &segment.page_indices {
                let Some(page) = self.pages.get(index) else {
                    continue;
                };
                log.page(&PageEvent {
                    index,
                    case_id: page.markers.case_id.clone(),
                    match_quality: page.markers.match_quality,
                    anomalies: segment.anomalies_at(index).into_iter().collect(),
                });
            }
        }

        let counts = count_job(&self.pages, &segments);
        log.summary(&JobSummary {
            source: source.to_string(),
            counts: counts.clone(),
        });

        Ok(SegmentationOutcome {
            plans: plan_outputs(segments),
            counts,
        })
    }
}

pub fn run_segmentation(
    records: impl IntoIterator<Item = PageRecord>,
    extractor: &PatternExtractor,
    source_stem: &str,
    source: &str,
    log: &mut dyn JobLog,
) -> Result<SegmentationOutcome, JobError> {
    let mut job = SegmentationJob::new(extractor, source_stem);
    for record in records {
        job.push(record);
    }
    job.finish(source, log)
}

fn count_job(pages: &[TaggedPage], segments: &[Segment]) -> JobCounts {
    let mut counts = JobCounts {
        page_count: pages.len(),
        segment_count: segments.len(),
        ..JobCounts::default()
    };

    for page in pages {
        match page.markers.match_quality {
            MatchQuality::Strong => counts.strong_pages += 1,
            MatchQuality::Weak => counts.weak_pages += 1,
            MatchQuality::None => counts.none_pages += 1,
        }
        if page.record.is_failed() {
            counts.ocr_failed_pages += 1;
        }
    }

    for segment in segments {
        if !segment.identified {
            counts.unidentified_segment_count += 1;
        }
        if !segment.findings.is_empty() {
            counts.flagged_segment_count += 1;
        }
    }

    counts
}
