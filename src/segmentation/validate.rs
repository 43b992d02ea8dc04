use crate::model::{Anomaly, Segment, TaggedPage};

#[derive(Debug, Clone, Copy)]
struct CounterObservation {
    position: usize,
    page_index: usize,
    ordinal: u32,
    total: u32,
}

pub fn validate_segments(segments: Vec<Segment>, pages: &[TaggedPage]) -> Vec<Segment> {
    segments
        .into_iter()
        .map(|segment| validate_segment(segment, pages))
        .collect()
}

fn validate_segment(mut segment: Segment, pages: &[TaggedPage]) -> Segment {
    let observations = counter_observations(&segment, pages);

    for (offset, observation) in observations.iter().enumerate().skip(1) {
        let previous = observations[offset - 1];

        if observation.ordinal == 1 {
            reclassify(
                &mut segment,
                observation.page_index,
                Anomaly::CounterMismatch,
                Anomaly::CounterRestart,
            );
            segment.flag(observation.page_index, Anomaly::CounterRestart);
            continue;
        }

        let steps = (observation.position - previous.position) as u32;
        let expected = previous.ordinal.saturating_add(steps);
        if observation.ordinal > expected {
            reclassify(
                &mut segment,
                observation.page_index,
                Anomaly::CounterMismatch,
                Anomaly::MissingPages,
            );
        }
    }

    if let Some(first) = observations.first() {
        if first.ordinal as usize > first.position + 1 {
            segment.flag(first.page_index, Anomaly::MissingPages);
        }
    }

    if !segment.has(Anomaly::CounterRestart) {
        if let Some(last) = observations.last() {
            let trailing_pages = segment.page_count() - 1 - last.position;
            let covered = (last.ordinal as usize).saturating_add(trailing_pages);
            if covered < last.total as usize {
                let last_page = segment.last_page();
                segment.flag(last_page, Anomaly::MissingPages);
            }
        }
    }

    for &page_index in &segment.page_indices.clone() {
        let Some(page) = page_at(pages, page_index) else {
            continue;
        };
        if page.markers.is_strong() {
            continue;
        }
        if let Some(case_id) = page.markers.case_id.as_deref() {
            if case_id != segment.case_id {
                segment.flag(page_index, Anomaly::LowConfidenceBoundary);
            }
        }
    }

    segment
}

fn counter_observations(segment: &Segment, pages: &[TaggedPage]) -> Vec<CounterObservation> {
    segment
        .page_indices
        .iter()
        .enumerate()
        .filter_map(|(position, &page_index)| {
            let page = page_at(pages, page_index)?;
            if !page.markers.is_strong() {
                return None;
            }
            Some(CounterObservation {
                position,
                page_index,
                ordinal: page.markers.page_ordinal?,
                total: page.markers.page_total?,
            })
        })
        .collect()
}

fn reclassify(segment: &mut Segment, page_index: usize, from: Anomaly, to: Anomaly) {
    let before = segment.findings.len();
    segment
        .findings
        .retain(|finding| !(finding.page_index == page_index && finding.anomaly == from));
    if segment.findings.len() != before {
        segment.flag(page_index, to);
    }
}

fn page_at(pages: &[TaggedPage], page_index: usize) -> Option<&TaggedPage> {
    match pages.get(page_index) {
        Some(page) if page.index() == page_index => Some(page),
        _ => pages.iter().find(|page| page.index() == page_index),
    }
}
