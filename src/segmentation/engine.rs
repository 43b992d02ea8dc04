use crate::model::{Anomaly, Segment, TaggedPage};

enum EngineState {
    NoSegment,
    OpenSegment {
        segment: Segment,
        expected_next: Option<u32>,
    },
}

/// Single left-to-right pass over tagged pages. Pages must arrive in source
/// order; the engine never reorders, looks ahead or drops a page.
pub struct SegmentationEngine {
    source_stem: String,
    state: EngineState,
    closed: Vec<Segment>,
    unidentified_count: usize,
    last_index: Option<usize>,
}

impl SegmentationEngine {
    pub fn new(source_stem: impl Into<String>) -> Self {
        Self {
            source_stem: source_stem.into(),
            state: EngineState::NoSegment,
            closed: Vec::new(),
            unidentified_count: 0,
            last_index: None,
        }
    }

    pub fn push(&mut self, page: &TaggedPage) {
        let index = page.index();
        debug_assert!(
            self.last_index.is_none_or(|last| index > last),
            "pages must be pushed in source order"
        );
        self.last_index = Some(index);

        let markers = &page.markers;
        let strong_case = if markers.is_strong() {
            markers.case_id.as_deref()
        } else {
            None
        };

        let state = std::mem::replace(&mut self.state, EngineState::NoSegment);
        let (mut segment, expected_next) = match (state, strong_case) {
            (
                EngineState::OpenSegment {
                    mut segment,
                    expected_next,
                },
                Some(case_id),
            ) if segment.identified && segment.case_id == case_id => {
                segment.push_page(index);
                if let (Some(expected), Some(ordinal)) = (expected_next, markers.page_ordinal) {
                    if ordinal != expected {
                        segment.flag(index, Anomaly::CounterMismatch);
                    }
                }
                let expected_next = markers
                    .page_ordinal
                    .map(|ordinal| ordinal.saturating_add(1))
                    .or_else(|| expected_next.map(|expected| expected.saturating_add(1)));
                (segment, expected_next)
            }
            (state, Some(case_id)) => {
                self.close(state);
                let segment = Segment::open(case_id, true, index);
                let expected_next = markers.page_ordinal.map(|ordinal| ordinal.saturating_add(1));
                (segment, expected_next)
            }
            (
                EngineState::OpenSegment {
                    mut segment,
                    expected_next,
                },
                None,
            ) => {
                segment.push_page(index);
                (segment, expected_next.map(|expected| expected.saturating_add(1)))
            }
            (EngineState::NoSegment, None) => {
                self.unidentified_count += 1;
                let case_id = format!(
                    "UNIDENTIFIED-{}-{}",
                    self.source_stem, self.unidentified_count
                );
                let mut segment = Segment::open(case_id, false, index);
                segment.flag(index, Anomaly::MissingCaseId);
                (segment, None)
            }
        };

        if page.record.is_failed() {
            segment.flag(index, Anomaly::OcrFailure);
        }
        if markers.counter_out_of_range() {
            segment.flag(index, Anomaly::CounterOutOfRange);
        }

        self.state = EngineState::OpenSegment {
            segment,
            expected_next,
        };
    }

    pub fn finish(mut self) -> Vec<Segment> {
        let state = std::mem::replace(&mut self.state, EngineState::NoSegment);
        self.close(state);
        self.closed
    }

    fn close(&mut self, state: EngineState) {
        if let EngineState::OpenSegment { segment, .. } = state {
            self.closed.push(segment);
        }
    }
}
