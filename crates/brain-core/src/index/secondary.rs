//! In-memory secondary index over the sequence table.

use super::build::BuildTask;
use super::query::{filter_and_sort, IndexQuery};
use super::row::IndexRow;
use crate::brain::{Brain, Sequence};
use crate::store::{FileFingerprint, KeyValueStore, SqliteStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lifecycle of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Idle,
    Building,
    Ready,
}

/// Status block returned with every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub state: IndexState,
    /// Table rows read by the current or last build.
    pub scanned: usize,
    /// Table size when the build started; the row count once it finished.
    pub total: usize,
    pub built_at: Option<DateTime<Utc>>,
    /// The backing file changed after the last build started.
    pub stale: bool,
    pub build_id: u64,
    /// Why the last build stopped early, if it did.
    pub error: Option<String>,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPage {
    /// Matching rows before paging.
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub items: Vec<IndexRow>,
    pub index: IndexStatus,
}

/// Cloneable handle to a secondary index.
///
/// Every clone sees the same rows and status. Builds run as a tokio task when
/// a runtime is available and inline otherwise.
#[derive(Clone)]
pub struct SequenceIndex {
    shared: Arc<IndexShared>,
}

struct IndexShared {
    store: SqliteStore<String, Sequence>,
    chunk_size: usize,
    inner: Mutex<IndexInner>,
    /// Id of the most recent build that finished or failed.
    completed: watch::Sender<u64>,
}

struct IndexInner {
    state: IndexState,
    segments: Vec<Arc<[IndexRow]>>,
    scanned: usize,
    total: usize,
    built_at: Option<DateTime<Utc>>,
    stale: bool,
    build_id: u64,
    error: Option<String>,
    baseline: Option<FileFingerprint>,
    cache: Option<(String, Arc<[IndexRow]>)>,
}

impl IndexInner {
    fn status(&self) -> IndexStatus {
        IndexStatus {
            state: self.state,
            scanned: self.scanned,
            total: self.total,
            built_at: self.built_at,
            stale: self.stale,
            build_id: self.build_id,
            error: self.error.clone(),
        }
    }

    fn is_cacheable(&self) -> bool {
        self.state == IndexState::Ready && !self.stale
    }

    /// Mark the index stale once the backing file differs from the baseline.
    fn check_stale(&mut self, current: &FileFingerprint) {
        let Some(baseline) = &self.baseline else {
            return;
        };
        if !self.stale && baseline != current {
            debug!("Backing file changed since index build {}", self.build_id);
            self.stale = true;
            self.cache = None;
        }
    }
}

impl SequenceIndex {
    pub fn new(store: SqliteStore<String, Sequence>, chunk_size: usize) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            shared: Arc::new(IndexShared {
                store,
                chunk_size: chunk_size.max(1),
                inner: Mutex::new(IndexInner {
                    state: IndexState::Idle,
                    segments: Vec::new(),
                    scanned: 0,
                    total: 0,
                    built_at: None,
                    stale: false,
                    build_id: 0,
                    error: None,
                    baseline: None,
                    cache: None,
                }),
                completed,
            }),
        }
    }

    /// Index over a brain's sequence table, chunked per its config.
    pub fn for_brain(brain: &Brain) -> Self {
        Self::new(brain.sequences().clone(), brain.config().index_chunk_size)
    }

    pub(crate) fn store(&self) -> &SqliteStore<String, Sequence> {
        &self.shared.store
    }

    fn lock_inner(&self) -> MutexGuard<'_, IndexInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn current_build_id(&self) -> u64 {
        self.lock_inner().build_id
    }

    /// Start a build unless one is already running. Returns the id of the
    /// build now in progress (or just finished, when run inline).
    pub fn start_build(&self) -> u64 {
        self.begin(false)
    }

    /// Start a fresh build, superseding any build in flight.
    pub fn refresh(&self) -> u64 {
        self.begin(true)
    }

    fn begin(&self, supersede: bool) -> u64 {
        if !supersede {
            let inner = self.lock_inner();
            if inner.state == IndexState::Building {
                return inner.build_id;
            }
        }

        // Counted outside the index lock; status and query must not wait on it.
        let total = self.store().size().unwrap_or_else(|e| {
            warn!("Could not size sequence table before build: {}", e);
            0
        });
        let baseline = self.store().database().fingerprint();

        let task = {
            let mut inner = self.lock_inner();
            if inner.state == IndexState::Building && !supersede {
                return inner.build_id;
            }

            inner.build_id += 1;
            inner.state = IndexState::Building;
            inner.segments.clear();
            inner.scanned = 0;
            inner.total = total;
            inner.stale = false;
            inner.error = None;
            inner.cache = None;
            inner.baseline = Some(baseline);

            info!(
                "Starting index build {} over {} sequences",
                inner.build_id, total
            );
            BuildTask::new(self.clone(), inner.build_id, self.shared.chunk_size)
        };

        let build_id = task.build_id();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task.run());
            }
            Err(_) => task.run_blocking(),
        }
        build_id
    }

    /// Append a converted chunk. Returns `false` if `build_id` is no longer
    /// the build in progress.
    pub(crate) fn publish_chunk(
        &self,
        build_id: u64,
        rows: Vec<IndexRow>,
        fetched: usize,
        done: bool,
    ) -> bool {
        let mut inner = self.lock_inner();
        if inner.build_id != build_id || inner.state != IndexState::Building {
            return false;
        }

        inner.scanned += fetched;
        if !rows.is_empty() {
            inner.segments.push(Arc::from(rows));
        }

        if done {
            inner.state = IndexState::Ready;
            inner.built_at = Some(Utc::now());
            inner.stale = false;
            inner.total = inner.scanned;
            info!(
                "Index build {} ready with {} rows",
                build_id, inner.scanned
            );
            drop(inner);
            self.shared.completed.send_replace(build_id);
        }
        true
    }

    /// Stop a build after an error. Rows read so far stay queryable.
    pub(crate) fn record_failure(&self, build_id: u64, message: String) {
        let mut inner = self.lock_inner();
        if inner.build_id != build_id {
            return;
        }
        inner.state = IndexState::Idle;
        inner.error = Some(message);
        drop(inner);
        self.shared.completed.send_replace(build_id);
    }

    pub fn status(&self) -> IndexStatus {
        self.lock_inner().status()
    }

    /// Wait until the build in progress (if any) finishes or fails.
    pub async fn wait_for_build(&self) -> IndexStatus {
        let target = {
            let inner = self.lock_inner();
            if inner.state != IndexState::Building {
                return inner.status();
            }
            inner.build_id
        };

        let mut completed = self.shared.completed.subscribe();
        if completed.wait_for(|done| *done >= target).await.is_err() {
            warn!("Index build signal closed while waiting");
        }
        self.status()
    }

    /// Filter, sort and page the indexed rows.
    ///
    /// An idle index starts building first; results then reflect whatever
    /// rows the build has published so far. A failed build is not restarted
    /// here, only by [`SequenceIndex::refresh`].
    pub fn query(&self, query: &IndexQuery) -> IndexPage {
        let needs_build = {
            let inner = self.lock_inner();
            inner.state == IndexState::Idle && inner.error.is_none()
        };
        if needs_build {
            self.start_build();
        }

        let current = self.store().database().fingerprint();
        let key = query.cache_key();

        let (segments, cached, build_id, cacheable) = {
            let mut inner = self.lock_inner();
            inner.check_stale(&current);
            let cacheable = inner.is_cacheable();
            let cached = inner
                .cache
                .as_ref()
                .filter(|(cached_key, _)| cacheable && *cached_key == key)
                .map(|(_, view)| Arc::clone(view));
            let segments = match cached {
                Some(_) => Vec::new(),
                None => inner.segments.clone(),
            };
            (segments, cached, inner.build_id, cacheable)
        };

        let view = match cached {
            Some(view) => view,
            None => {
                let view: Arc<[IndexRow]> = filter_and_sort(&segments, query).into();
                if cacheable {
                    let mut inner = self.lock_inner();
                    if inner.build_id == build_id && inner.is_cacheable() {
                        inner.cache = Some((key, Arc::clone(&view)));
                    }
                }
                view
            }
        };

        let limit = query.clamped_limit();
        let start = query.offset.min(view.len());
        let end = start.saturating_add(limit).min(view.len());

        IndexPage {
            total: view.len(),
            offset: query.offset,
            limit,
            items: view[start..end].to_vec(),
            index: self.status(),
        }
    }

    #[cfg(test)]
    fn cached_key(&self) -> Option<String> {
        self.lock_inner().cache.as_ref().map(|(key, _)| key.clone())
    }

    #[cfg(test)]
    fn segment_count(&self) -> usize {
        self.lock_inner().segments.len()
    }
}
