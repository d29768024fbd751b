//! Fixed-size chunking

use super::{ChunkSpan, Chunker, IncompleteChunk};
use crate::error::{DriftGuardError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Splits data into chunks of `chunk_size` rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeBasedChunker {
    chunk_size: usize,
    incomplete: IncompleteChunk,
}

impl SizeBasedChunker {
    /// Create a chunker, `chunk_size` must be positive
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DriftGuardError::invalid("chunk_size must be greater than 0"));
        }
        Ok(Self {
            chunk_size,
            incomplete: IncompleteChunk::Keep,
        })
    }

    /// Set the policy for a short trailing chunk
    pub fn with_incomplete(mut self, incomplete: IncompleteChunk) -> Self {
        self.incomplete = incomplete;
        self
    }

    /// Rows per chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Consecutive spans of `size` rows with the trailing remainder handled per `incomplete`
pub(crate) fn fixed_size_spans(n_rows: usize, size: usize, incomplete: IncompleteChunk) -> Vec<ChunkSpan> {
    let mut spans: Vec<ChunkSpan> = (0..n_rows)
        .step_by(size)
        .map(|start| ChunkSpan::rows(start, (start + size).min(n_rows)))
        .collect();

    let trailing_short = spans.last().map_or(false, |s| s.len() < size);
    if trailing_short {
        match incomplete {
            IncompleteChunk::Keep => {}
            IncompleteChunk::Drop => {
                spans.pop();
            }
            IncompleteChunk::Append => {
                if spans.len() > 1 {
                    if let Some(last) = spans.pop() {
                        if let Some(prev) = spans.last_mut() {
                            prev.end = last.end;
                        }
                    }
                }
            }
        }
    }
    spans
}

impl Chunker for SizeBasedChunker {
    fn spans(&self, n_rows: usize, _timestamps: Option<&[Option<NaiveDateTime>]>) -> Result<Vec<ChunkSpan>> {
        Ok(fixed_size_spans(n_rows, self.chunk_size, self.incomplete))
    }
}

impl fmt::Display for SizeBasedChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SizeBasedChunker(chunk_size={}, incomplete={})",
            self.chunk_size, self.incomplete
        )
    }
}
