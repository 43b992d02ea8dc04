use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, warn};

use super::{CancelToken, PageRecognizer};
use crate::model::PageRecord;

#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Stores `item` and returns every item that is now deliverable in index
    /// order. Indices already delivered or already pending are rejected.
    pub fn push(&mut self, index: usize, item: T) -> Result<Vec<T>, T> {
        if index < self.next || self.pending.contains_key(&index) {
            return Err(item);
        }
        self.pending.insert(index, item);
        Ok(self.drain_ready())
    }

    pub fn drain_with_gaps(&mut self, until: usize, fill: impl Fn(usize) -> T) -> Vec<T> {
        let mut ready = Vec::new();
        while self.next < until {
            let item = self
                .pending
                .remove(&self.next)
                .unwrap_or_else(|| fill(self.next));
            ready.push(item);
            self.next += 1;
        }
        ready
    }

    fn drain_ready(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push(item);
            self.next += 1;
        }
        ready
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub delivered: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Recognizes pages `0..page_count` on `worker_count` threads and hands the
/// resulting records to `consume` strictly in index order. A page whose
/// recognition fails or panics is delivered as a failed record.
pub fn recognize_pages<R>(
    recognizer: &R,
    page_count: usize,
    worker_count: usize,
    cancel: &CancelToken,
    mut consume: impl FnMut(PageRecord),
) -> PoolReport
where
    R: PageRecognizer + ?Sized,
{
    let worker_count = worker_count.max(1);
    let mut report = PoolReport {
        delivered: 0,
        failed: 0,
        cancelled: false,
    };

    thread::scope(|scope| {
        let (job_tx, job_rx) = bounded::<usize>(worker_count);
        let (result_tx, result_rx) = bounded::<PageRecord>(worker_count * 2);

        scope.spawn(move || {
            for index in 0..page_count {
                if cancel.is_cancelled() || job_tx.send(index).is_err() {
                    break;
                }
            }
        });

        for worker_id in 0..worker_count {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for index in job_rx.iter() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let record = recognize_one(recognizer, index, cancel);
                    debug!(worker = worker_id, page = index, "page recognized");
                    if result_tx.send(record).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        let mut buffer = ReorderBuffer::new();
        for record in result_rx.iter() {
            let index = record.index;
            match buffer.push(index, record) {
                Ok(ready) => {
                    for record in ready {
                        deliver(record, &mut report, &mut consume);
                    }
                }
                Err(_) => warn!(page = index, "duplicate OCR result dropped"),
            }
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
            return;
        }

        if buffer.next_index() < page_count {
            warn!(
                delivered = buffer.next_index(),
                pending = buffer.pending_len(),
                total = page_count,
                "OCR workers stopped early; filling remaining pages as failed"
            );
        }
        for record in buffer.drain_with_gaps(page_count, |index| {
            PageRecord::failed(index, "no OCR result delivered")
        }) {
            deliver(record, &mut report, &mut consume);
        }
    });

    report
}

fn recognize_one<R>(recognizer: &R, index: usize, cancel: &CancelToken) -> PageRecord
where
    R: PageRecognizer + ?Sized,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| recognizer.recognize(index, cancel)));
    match outcome {
        Ok(Ok(recognition)) => PageRecord::new(index, recognition.text, recognition.confidence),
        Ok(Err(error)) => {
            warn!(page = index, error = %format!("{error:#}"), "OCR failed for page");
            PageRecord::failed(index, format!("{error:#}"))
        }
        Err(_) => {
            warn!(page = index, "OCR recognizer panicked");
            PageRecord::failed(index, "OCR recognizer panicked")
        }
    }
}

fn deliver(record: PageRecord, report: &mut PoolReport, consume: &mut impl FnMut(PageRecord)) {
    report.delivered += 1;
    if record.is_failed() {
        report.failed += 1;
    }
    consume(record);
}
