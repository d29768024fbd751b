//! Fixed-count chunking

use super::{ChunkSpan, Chunker};
use crate::error::{DriftGuardError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Splits data into `chunk_number` chunks of near-equal size
///
/// The first `n_rows % chunk_number` chunks carry one extra row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountBasedChunker {
    chunk_number: usize,
}

impl CountBasedChunker {
    /// Create a chunker, `chunk_number` must be positive
    pub fn new(chunk_number: usize) -> Result<Self> {
        if chunk_number == 0 {
            return Err(DriftGuardError::invalid("chunk_number must be greater than 0"));
        }
        Ok(Self { chunk_number })
    }

    /// Number of chunks produced
    pub fn chunk_number(&self) -> usize {
        self.chunk_number
    }
}

impl Chunker for CountBasedChunker {
    fn spans(&self, n_rows: usize, _timestamps: Option<&[Option<NaiveDateTime>]>) -> Result<Vec<ChunkSpan>> {
        if self.chunk_number > n_rows {
            return Err(DriftGuardError::Chunking(format!(
                "cannot split {} rows into {} chunks",
                n_rows, self.chunk_number
            )));
        }

        let base = n_rows / self.chunk_number;
        let remainder = n_rows % self.chunk_number;
        let mut start = 0;
        let spans = (0..self.chunk_number)
            .map(|i| {
                let len = base + usize::from(i < remainder);
                let span = ChunkSpan::rows(start, start + len);
                start += len;
                span
            })
            .collect();
        Ok(spans)
    }
}

impl fmt::Display for CountBasedChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CountBasedChunker(chunk_number={})", self.chunk_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_division() {
        let spans = CountBasedChunker::new(3).unwrap().spans(10, None).unwrap();
        let lens: Vec<usize> = spans.iter().map(ChunkSpan::len).collect();
        assert_eq!(lens, vec![4, 3, 3]);
        assert_eq!(spans.last().unwrap().end, 10);
    }

    #[test]
    fn test_more_chunks_than_rows_fails() {
        let err = CountBasedChunker::new(5).unwrap().spans(3, None).unwrap_err();
        assert!(matches!(err, DriftGuardError::Chunking(_)));
    }
}
