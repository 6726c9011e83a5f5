//! Lookup batching
//!
//! Splits the id sequence into request-sized batches in input order.
//! Repeat views stay in the sequence; each one is looked up and counted.

use crate::error::{CalcError, CalcResult};
use crate::models::VideoId;

/// One lookup request's worth of ids, `1..=batch_size` long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position in the batch sequence
    pub index: usize,
    pub video_ids: Vec<VideoId>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.video_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.video_ids.is_empty()
    }
}

/// Partition `ids` into batches of at most `batch_size`
pub fn make_batches(ids: &[VideoId], batch_size: usize) -> CalcResult<Vec<Batch>> {
    if batch_size == 0 {
        return Err(CalcError::Config("batch size must be at least 1".to_string()));
    }

    Ok(ids
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            video_ids: chunk.to_vec(),
        })
        .collect())
}
