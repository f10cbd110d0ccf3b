//! In-memory record source.

use crate::error::EngineResult;
use crate::record::{Header, Record, RecordSource};
use std::collections::VecDeque;

/// Record source backed by a vector, used for materialized records.
pub struct MemorySource {
    header: Header,
    records: VecDeque<Record>,
}

impl MemorySource {
    pub fn new(header: Header, records: Vec<Record>) -> Self {
        Self {
            header,
            records: records.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for MemorySource {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_record(&mut self) -> EngineResult<Option<Record>> {
        Ok(self.records.pop_front())
    }
}
