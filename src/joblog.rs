use serde::Serialize;
use tracing::{info, warn};

use crate::model::{Anomaly, JobCounts, MatchQuality};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageEvent {
    pub index: usize,
    pub case_id: Option<String>,
    pub match_quality: MatchQuality,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub source: String,
    pub counts: JobCounts,
}

pub trait JobLog {
    fn page(&mut self, event: &PageEvent);
    fn summary(&mut self, summary: &JobSummary);
}

#[derive(Debug, Default)]
pub struct TracingJobLog;

impl JobLog for TracingJobLog {
    fn page(&mut self, event: &PageEvent) {
        let anomalies = event
            .anomalies
            .iter()
            .map(|anomaly| anomaly.as_str())
            .collect::<Vec<_>>()
            .join(",");

        if event.anomalies.is_empty() {
            info!(
                page = event.index,
                case_id = %event.case_id.as_deref().unwrap_or("-"),
                match_quality = %event.match_quality,
                "page classified"
            );
        } else {
            warn!(
                page = event.index,
                case_id = %event.case_id.as_deref().unwrap_or("-"),
                match_quality = %event.match_quality,
                anomalies = %anomalies,
                "page classified with anomalies"
            );
        }
    }

    fn summary(&mut self, summary: &JobSummary) {
        info!(
            source = %summary.source,
            pages = summary.counts.page_count,
            strong = summary.counts.strong_pages,
            weak = summary.counts.weak_pages,
            none = summary.counts.none_pages,
            ocr_failed = summary.counts.ocr_failed_pages,
            segments = summary.counts.segment_count,
            unidentified = summary.counts.unidentified_segment_count,
            flagged = summary.counts.flagged_segment_count,
            "segmentation summary"
        );
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryJobLog {
    pub pages: Vec<PageEvent>,
    pub summaries: Vec<JobSummary>,
}

#[cfg(test)]
impl JobLog for MemoryJobLog {
    fn page(&mut self, event: &PageEvent) {
        self.pages.push(event.clone());
    }

    fn summary(&mut self, summary: &JobSummary) {
        self.summaries.push(summary.clone());
    }
}
