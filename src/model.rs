use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SplitConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub index: usize,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PageRecord {
    pub fn new(index: usize, raw_text: impl Into<String>, confidence: f32) -> Self {
        Self {
            index,
            raw_text: raw_text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            failure: None,
        }
    }

    pub fn failed(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            raw_text: String::new(),
            confidence: 0.0,
            failure: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchQuality {
    Strong,
    Weak,
    None,
}

impl MatchQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Weak => "weak",
            Self::None => "none",
        }
    }
}

impl fmt::Display for MatchQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedMarkers {
    pub case_id: Option<String>,
    pub page_ordinal: Option<u32>,
    pub page_total: Option<u32>,
    pub match_quality: MatchQuality,
}

impl ExtractedMarkers {
    pub fn none() -> Self {
        Self {
            case_id: None,
            page_ordinal: None,
            page_total: None,
            match_quality: MatchQuality::None,
        }
    }

    pub fn is_strong(&self) -> bool {
        self.match_quality == MatchQuality::Strong
    }

    pub fn counter_out_of_range(&self) -> bool {
        matches!(
            (self.page_ordinal, self.page_total),
            (Some(ordinal), Some(total)) if ordinal > total
        )
    }
}

#[derive(Debug, Clone)]
pub struct TaggedPage {
    pub record: PageRecord,
    pub markers: ExtractedMarkers,
}

impl TaggedPage {
    pub fn index(&self) -> usize {
        self.record.index
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Anomaly {
    MissingCaseId,
    CounterMismatch,
    CounterRestart,
    CounterOutOfRange,
    MissingPages,
    LowConfidenceBoundary,
    OcrFailure,
}

impl Anomaly {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingCaseId => "MissingCaseId",
            Self::CounterMismatch => "CounterMismatch",
            Self::CounterRestart => "CounterRestart",
            Self::CounterOutOfRange => "CounterOutOfRange",
            Self::MissingPages => "MissingPages",
            Self::LowConfidenceBoundary => "LowConfidenceBoundary",
            Self::OcrFailure => "OcrFailure",
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Finding {
    pub page_index: usize,
    pub anomaly: Anomaly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub case_id: String,
    pub identified: bool,
    pub page_indices: Vec<usize>,
    pub findings: Vec<Finding>,
}

impl Segment {
    pub fn open(case_id: impl Into<String>, identified: bool, first_page: usize) -> Self {
        Self {
            case_id: case_id.into(),
            identified,
            page_indices: vec![first_page],
            findings: Vec::new(),
        }
    }

    pub fn push_page(&mut self, index: usize) {
        self.page_indices.push(index);
    }

    pub fn flag(&mut self, page_index: usize, anomaly: Anomaly) {
        let finding = Finding {
            page_index,
            anomaly,
        };
        if !self.findings.contains(&finding) {
            self.findings.push(finding);
        }
    }

    pub fn anomalies(&self) -> BTreeSet<Anomaly> {
        self.findings.iter().map(|finding| finding.anomaly).collect()
    }

    pub fn anomalies_at(&self, page_index: usize) -> BTreeSet<Anomaly> {
        self.findings
            .iter()
            .filter(|finding| finding.page_index == page_index)
            .map(|finding| finding.anomaly)
            .collect()
    }

    pub fn has(&self, anomaly: Anomaly) -> bool {
        self.findings.iter().any(|finding| finding.anomaly == anomaly)
    }

    pub fn first_page(&self) -> usize {
        self.page_indices.first().copied().unwrap_or_default()
    }

    pub fn last_page(&self) -> usize {
        self.page_indices.last().copied().unwrap_or_default()
    }

    pub fn page_count(&self) -> usize {
        self.page_indices.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub output_file_name: String,
    pub case_id: String,
    pub source_page_range: [usize; 2],
    pub page_count: usize,
    pub anomaly_flags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub page_count: usize,
    pub strong_pages: usize,
    pub weak_pages: usize,
    pub none_pages: usize,
    pub ocr_failed_pages: usize,
    pub segment_count: usize,
    pub unidentified_segment_count: usize,
    pub flagged_segment_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolVersions {
    pub pdfinfo: String,
    pub pdftoppm: String,
    pub tesseract: String,
    pub qpdf: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub source_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_versions: Option<ToolVersions>,
    pub config: SplitConfig,
    pub counts: JobCounts,
    pub entries: Vec<ManifestEntry>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_flag_deduplicates_same_page_findings() {
        let mut segment = Segment::open("A1", true, 0);
        segment.push_page(1);
        segment.flag(1, Anomaly::CounterMismatch);
        segment.flag(1, Anomaly::CounterMismatch);
        segment.flag(0, Anomaly::OcrFailure);

        assert_eq!(segment.findings.len(), 2);
        assert!(segment.has(Anomaly::OcrFailure));
        assert_eq!(
            segment.anomalies_at(1).into_iter().collect::<Vec<_>>(),
            vec![Anomaly::CounterMismatch]
        );
    }

    #[test]
    fn counter_out_of_range_requires_both_numbers() {
        let mut markers = ExtractedMarkers::none();
        markers.page_ordinal = Some(5);
        assert!(!markers.counter_out_of_range());

        markers.page_total = Some(3);
        assert!(markers.counter_out_of_range());

        markers.page_total = Some(5);
        assert!(!markers.counter_out_of_range());
    }

    #[test]
    fn failed_page_record_has_no_text_or_confidence() {
        let record = PageRecord::failed(4, "tesseract timed out");
        assert!(record.is_failed());
        assert!(record.raw_text.is_empty());
        assert_eq!(record.confidence, 0.0);
    }

    #[test]
    fn anomaly_serializes_as_variant_name() {
        let encoded = serde_json::to_string(&Anomaly::CounterRestart).unwrap();
        assert_eq!(encoded, "\"CounterRestart\"");
        assert_eq!(Anomaly::CounterRestart.to_string(), "CounterRestart");
    }
}
