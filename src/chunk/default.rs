//! Default chunking strategy

use super::size::fixed_size_spans;
use super::{ChunkSpan, Chunker, IncompleteChunk, DEFAULT_MINIMUM_CHUNK_SIZE};
use crate::error::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Number of chunks the default chunker aims for
pub const DEFAULT_CHUNK_COUNT: usize = 10;

/// Size-based chunking targeting ten chunks
///
/// The chunk size is `n_rows / 10` with the remainder appended to the last
/// chunk. When that size is below the minimum chunk size, the size is raised
/// to the minimum and fewer chunks are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultChunker {
    chunk_count: usize,
    minimum_chunk_size: usize,
}

impl DefaultChunker {
    pub fn new() -> Self {
        Self {
            chunk_count: DEFAULT_CHUNK_COUNT,
            minimum_chunk_size: DEFAULT_MINIMUM_CHUNK_SIZE,
        }
    }

    /// Set the minimum chunk size
    pub fn with_minimum_chunk_size(mut self, minimum_chunk_size: usize) -> Self {
        self.minimum_chunk_size = minimum_chunk_size.max(1);
        self
    }

    /// Chunk size the chunker will use for `n_rows` rows
    pub fn chunk_size_for(&self, n_rows: usize) -> usize {
        let target = n_rows / self.chunk_count;
        if target < self.minimum_chunk_size {
            let raised = self.minimum_chunk_size.min(n_rows).max(1);
            warn!(
                rows = n_rows,
                target_size = target,
                minimum = self.minimum_chunk_size,
                chunk_size = raised,
                "default chunk size is below the minimum chunk size, using larger chunks"
            );
            raised
        } else {
            target
        }
    }
}

impl Default for DefaultChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for DefaultChunker {
    fn spans(&self, n_rows: usize, _timestamps: Option<&[Option<NaiveDateTime>]>) -> Result<Vec<ChunkSpan>> {
        let size = self.chunk_size_for(n_rows);
        Ok(fixed_size_spans(n_rows, size, IncompleteChunk::Append))
    }
}

impl fmt::Display for DefaultChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DefaultChunker(chunk_count={}, minimum_chunk_size={})",
            self.chunk_count, self.minimum_chunk_size
        )
    }
}
