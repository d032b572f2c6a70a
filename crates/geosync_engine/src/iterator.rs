//! Lazily filled feature iteration.
//!
//! An iterator serves rows from the local cache first and only talks
//! to the remote once the cached portion runs out. Rows it fetches are
//! written through to the cache before they are handed out, so the
//! next scan over the same range is local.
//!
//! Remote failure never surfaces mid-iteration: the iterator just
//! ends, and [`LazyFeatureIterator::take_error`] reports what stopped
//! it. Rows served before the failure remain valid, as does everything
//! already written to the cache.

use std::collections::VecDeque;
use std::sync::Arc;

use geosync_model::{DatasetId, FeatureId, FeatureRow};
use geosync_remote::RemoteVectorClient;

use crate::error::{EngineError, Result};
use crate::registry::DatasetSlot;

/// What a scan should return.
///
/// The default scans the whole dataset. Restricting to explicit ids
/// turns the scan into lookups: rows come back for ids that exist,
/// missing ids are silently skipped, and the scan ends once every
/// requested id has been resolved.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    ids: Option<Vec<FeatureId>>,
    limit: Option<usize>,
}

impl ScanFilter {
    /// Scan every row of the dataset.
    pub fn all() -> Self {
        Self::default()
    }

    /// Scan only the given ids. Cached rows come back in request
    /// order; rows that had to be fetched follow afterwards, in
    /// whatever order the remote returned them.
    pub fn ids(ids: impl IntoIterator<Item = FeatureId>) -> Self {
        ScanFilter {
            ids: Some(ids.into_iter().collect()),
            limit: None,
        }
    }

    /// Caps the number of rows the scan returns. Remote fills shrink
    /// their page size to never fetch past the cap.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug)]
enum Source {
    Sequential {
        /// Highest id pulled from the cache scan so far.
        scan_cursor: Option<FeatureId>,
        /// Highest id seen from any source; remote fills resume here.
        max_seen: Option<FeatureId>,
    },
    Targeted {
        /// Requested ids not yet looked up in the cache.
        queue: VecDeque<FeatureId>,
        /// Cache misses awaiting the single remote lookup.
        misses: Vec<FeatureId>,
    },
}

/// Iterator over a dataset's rows, filling from the remote on demand.
///
/// Holds the dataset slot only for the moments it reads or writes the
/// cache; remote round trips happen unlocked, so concurrent readers of
/// already-cached rows are never blocked by a fill.
pub struct LazyFeatureIterator<R> {
    slot: Arc<DatasetSlot>,
    remote: Arc<R>,
    page_size: usize,
    limit: Option<usize>,
    requested: Option<Vec<FeatureId>>,
    source: Source,
    cache_batch: VecDeque<FeatureRow>,
    pending: VecDeque<FeatureRow>,
    served: usize,
    remote_exhausted: bool,
    finished: bool,
    error: Option<EngineError>,
}

impl<R: RemoteVectorClient> LazyFeatureIterator<R> {
    pub(crate) fn new(
        slot: Arc<DatasetSlot>,
        remote: Arc<R>,
        page_size: usize,
        filter: ScanFilter,
    ) -> Self {
        let ScanFilter { ids, limit } = filter;
        let source = Self::source_for(&ids);
        LazyFeatureIterator {
            slot,
            remote,
            page_size: page_size.max(1),
            limit,
            requested: ids,
            source,
            cache_batch: VecDeque::new(),
            pending: VecDeque::new(),
            served: 0,
            remote_exhausted: false,
            finished: false,
            error: None,
        }
    }

    fn source_for(ids: &Option<Vec<FeatureId>>) -> Source {
        match ids {
            Some(ids) => Source::Targeted {
                queue: ids.iter().copied().collect(),
                misses: Vec::new(),
            },
            None => Source::Sequential {
                scan_cursor: None,
                max_seen: None,
            },
        }
    }

    /// The dataset this iterator reads.
    pub fn dataset_id(&self) -> DatasetId {
        self.slot.id()
    }

    /// Rows served so far.
    pub fn served(&self) -> usize {
        self.served
    }

    /// Takes the error that ended the iteration early, if any.
    ///
    /// `None` after a clean end of scan.
    pub fn take_error(&mut self) -> Option<EngineError> {
        self.error.take()
    }

    /// Restarts the scan from the beginning with the original filter.
    ///
    /// Rows fetched by the previous pass are in the cache now, so a
    /// rewound pass serves them locally.
    pub fn rewind(&mut self) {
        self.cache_batch.clear();
        self.pending.clear();
        self.served = 0;
        self.remote_exhausted = false;
        self.finished = false;
        self.error = None;
        self.source = Self::source_for(&self.requested);
    }

    fn serve(&mut self, row: FeatureRow) -> Option<FeatureRow> {
        self.served += 1;
        Some(row)
    }

    fn fail(&mut self, error: EngineError) -> Option<FeatureRow> {
        self.error = Some(error);
        self.finished = true;
        None
    }

    /// Page size for the next remote fill, shrunk to the remaining
    /// caller limit.
    fn fetch_budget(&self) -> usize {
        match self.limit {
            Some(limit) => self.page_size.min(limit - self.served),
            None => self.page_size,
        }
    }

    fn read_cache_page(&self, after: Option<FeatureId>) -> Result<Vec<FeatureRow>> {
        let mut inner = self.slot.lock();
        match inner.cache.as_mut() {
            Some(cache) => Ok(cache.page_after(after, self.page_size)?),
            None => Err(EngineError::DatasetNotOpen {
                dataset: self.slot.id(),
            }),
        }
    }

    fn read_cache_row(&self, id: FeatureId) -> Result<Option<FeatureRow>> {
        let mut inner = self.slot.lock();
        match inner.cache.as_mut() {
            Some(cache) => Ok(cache.get(id)?),
            None => Err(EngineError::DatasetNotOpen {
                dataset: self.slot.id(),
            }),
        }
    }

    fn write_through(&self, rows: &[FeatureRow]) -> Result<()> {
        let mut inner = self.slot.lock();
        match inner.cache.as_mut() {
            Some(cache) => Ok(cache.upsert_many(rows)?),
            None => Err(EngineError::DatasetNotOpen {
                dataset: self.slot.id(),
            }),
        }
    }

    fn step_sequential(&mut self) -> Step {
        let (scan_cursor, max_seen) = match &self.source {
            Source::Sequential {
                scan_cursor,
                max_seen,
            } => (*scan_cursor, *max_seen),
            Source::Targeted { .. } => return Step::Yield(None),
        };

        let page = match self.read_cache_page(scan_cursor) {
            Ok(page) => page,
            Err(e) => return Step::Yield(self.fail(e)),
        };
        if !page.is_empty() {
            let last = page.last().map(|row| row.id);
            self.source = Source::Sequential {
                scan_cursor: last,
                max_seen: max_feature(max_seen, last),
            };
            self.cache_batch.extend(page);
            return Step::Again;
        }

        if self.remote_exhausted {
            self.finished = true;
            return Step::Yield(None);
        }

        let budget = self.fetch_budget();
        let rows = match self.remote.list_features(self.slot.id(), max_seen, budget) {
            Ok(rows) => rows,
            Err(e) => return Step::Yield(self.fail(e.into())),
        };
        if rows.is_empty() {
            self.remote_exhausted = true;
            return Step::Again;
        }
        if let Err(e) = self.write_through(&rows) {
            return Step::Yield(self.fail(e));
        }
        let last = rows.last().map(|row| row.id);
        self.source = Source::Sequential {
            // Jump the cache scan past what we just fetched, or those
            // rows would be served a second time from disk.
            scan_cursor: max_feature(scan_cursor, last),
            max_seen: max_feature(max_seen, last),
        };
        self.pending.extend(rows);
        Step::Again
    }

    fn step_targeted(&mut self) -> Step {
        let next_id = match &mut self.source {
            Source::Targeted { queue, .. } => queue.pop_front(),
            Source::Sequential { .. } => return Step::Yield(None),
        };

        if let Some(id) = next_id {
            return match self.read_cache_row(id) {
                Ok(Some(row)) => Step::Yield(self.serve(row)),
                Ok(None) => {
                    if let Source::Targeted { misses, .. } = &mut self.source {
                        misses.push(id);
                    }
                    Step::Again
                }
                Err(e) => Step::Yield(self.fail(e)),
            };
        }

        let want = match &mut self.source {
            Source::Targeted { misses, .. } => std::mem::take(misses),
            Source::Sequential { .. } => Vec::new(),
        };
        if want.is_empty() || self.remote_exhausted {
            self.finished = true;
            return Step::Yield(None);
        }

        let rows = match self.remote.get_features(self.slot.id(), &want) {
            Ok(rows) => rows,
            Err(e) => return Step::Yield(self.fail(e.into())),
        };
        // One lookup resolves the whole outstanding set; ids the
        // remote no longer has are simply not in the answer.
        self.remote_exhausted = true;
        if let Err(e) = self.write_through(&rows) {
            return Step::Yield(self.fail(e));
        }
        self.pending.extend(rows);
        Step::Again
    }
}

/// Outcome of one fill step.
enum Step {
    /// Hand this to the caller.
    Yield(Option<FeatureRow>),
    /// Buffers changed; take another pass.
    Again,
}

impl<R: RemoteVectorClient> Iterator for LazyFeatureIterator<R> {
    type Item = FeatureRow;

    fn next(&mut self) -> Option<FeatureRow> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(limit) = self.limit {
                if self.served >= limit {
                    self.finished = true;
                    return None;
                }
            }
            if let Some(row) = self.pending.pop_front() {
                return self.serve(row);
            }
            if let Some(row) = self.cache_batch.pop_front() {
                return self.serve(row);
            }
            let step = match self.source {
                Source::Sequential { .. } => self.step_sequential(),
                Source::Targeted { .. } => self.step_targeted(),
            };
            match step {
                Step::Yield(result) => return result,
                Step::Again => {}
            }
        }
    }
}

fn max_feature(a: Option<FeatureId>, b: Option<FeatureId>) -> Option<FeatureId> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}
