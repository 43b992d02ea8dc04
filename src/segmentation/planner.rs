use std::collections::HashSet;

use crate::error::JobError;
use crate::model::{ManifestEntry, Segment};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOutput {
    pub segment: Segment,
    pub file_name: String,
    pub first_page: usize,
    pub last_page: usize,
    pub entry: ManifestEntry,
}

pub fn plan_outputs(segments: Vec<Segment>) -> Vec<PlannedOutput> {
    let mut used_stems = HashSet::<String>::new();

    segments
        .into_iter()
        .map(|segment| {
            let stem = sanitize_file_stem(&segment.case_id);
            let mut candidate = stem.clone();
            let mut suffix = 1usize;
            while used_stems.contains(&candidate.to_ascii_lowercase()) {
                suffix += 1;
                candidate = format!("{stem}_{suffix}");
            }
            used_stems.insert(candidate.to_ascii_lowercase());

            let file_name = format!("{candidate}.pdf");
            let first_page = segment.first_page();
            let last_page = segment.last_page();
            let entry = ManifestEntry {
                output_file_name: file_name.clone(),
                case_id: segment.case_id.clone(),
                source_page_range: [first_page, last_page],
                page_count: segment.page_count(),
                anomaly_flags: segment
                    .anomalies()
                    .into_iter()
                    .map(|anomaly| anomaly.as_str().to_string())
                    .collect(),
            };

            PlannedOutput {
                segment,
                file_name,
                first_page,
                last_page,
                entry,
            }
        })
        .collect()
}

pub fn verify_page_conservation(segments: &[Segment], page_count: usize) -> Result<(), JobError> {
    let mut expected = 0usize;
    for segment in segments {
        if segment.page_indices.is_empty() {
            return Err(JobError::PageConservation(format!(
                "segment {} holds no pages",
                segment.case_id
            )));
        }
        for &index in &segment.page_indices {
            if index != expected {
                return Err(JobError::PageConservation(format!(
                    "expected page {expected} but segment {} holds page {index}",
                    segment.case_id
                )));
            }
            expected += 1;
        }
    }

    if expected != page_count {
        return Err(JobError::PageConservation(format!(
            "segments cover {expected} of {page_count} pages"
        )));
    }

    Ok(())
}

fn sanitize_file_stem(case_id: &str) -> String {
    let stem = case_id
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | '.') {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();
    let stem = stem.trim_matches('.').to_string();

    if stem.is_empty() {
        "case".to_string()
    } else {
        stem
    }
}
