//! Resumable, chunked index build.

use super::row::IndexRow;
use super::secondary::SequenceIndex;
use crate::error::{BrainError, Result};
use tracing::{debug, error};

/// Outcome of one build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// More rows remain.
    Continue,
    /// The table was exhausted and the index is ready.
    Finished,
    /// A newer build started; this one stopped without publishing anything.
    Superseded,
}

/// One build generation, advanced a chunk at a time.
///
/// Carries the build id it was started with. Each step checks it against the
/// index before publishing rows, so a superseded build never writes into a
/// newer build's state.
pub struct BuildTask {
    index: SequenceIndex,
    build_id: u64,
    after_id: i64,
    chunk_size: usize,
}

impl BuildTask {
    pub(crate) fn new(index: SequenceIndex, build_id: u64, chunk_size: usize) -> Self {
        Self {
            index,
            build_id,
            after_id: 0,
            chunk_size,
        }
    }

    pub fn build_id(&self) -> u64 {
        self.build_id
    }

    /// Convert the next chunk of the sequence table.
    pub fn step(&mut self) -> Result<BuildStep> {
        if self.index.current_build_id() != self.build_id {
            return Ok(BuildStep::Superseded);
        }

        let page = self
            .index
            .store()
            .scan_page(self.after_id, self.chunk_size)?;
        if let Some(last_id) = page.last_id {
            self.after_id = last_id;
        }

        let rows: Vec<IndexRow> = page
            .rows
            .into_iter()
            .map(|row| IndexRow::from_sequence(row.key, &row.value))
            .collect();
        let done = page.fetched < self.chunk_size;

        if !self
            .index
            .publish_chunk(self.build_id, rows, page.fetched, done)
        {
            return Ok(BuildStep::Superseded);
        }
        Ok(if done {
            BuildStep::Finished
        } else {
            BuildStep::Continue
        })
    }

    /// Drive the build to the end, yielding to the scheduler between chunks.
    pub async fn run(mut self) {
        loop {
            match self.step() {
                Ok(BuildStep::Continue) => tokio::task::yield_now().await,
                Ok(step) => {
                    self.log_end(step);
                    break;
                }
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }
        }
    }

    /// Drive the build to the end on the calling thread.
    pub fn run_blocking(mut self) {
        loop {
            match self.step() {
                Ok(BuildStep::Continue) => continue,
                Ok(step) => {
                    self.log_end(step);
                    break;
                }
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }
        }
    }

    fn log_end(&self, step: BuildStep) {
        match step {
            BuildStep::Superseded => debug!("Index build {} superseded", self.build_id),
            _ => debug!("Index build {} finished", self.build_id),
        }
    }

    fn fail(&self, err: BrainError) {
        error!("Index build {} failed: {}", self.build_id, err);
        self.index.record_failure(self.build_id, err.to_string());
    }
}
