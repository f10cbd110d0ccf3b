//! Counts of annotation sub-field values over the records passing through.
//!
//! Wraps another record source and counts, for every sub-field of the
//! annotation field, how often each non-empty value occurs. Sub-fields with
//! many distinct values are summarized by their number of distinct values.

use crate::annotation::AnnotationKeySet;
use crate::error::EngineResult;
use crate::record::{Header, Record, RecordSource};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// Sub-fields with more distinct values than this are only counted.
const MAX_LISTED_VALUES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldStatistics {
    /// Occurrences per value
    Counts(BTreeMap<String, usize>),
    /// `#N` for N distinct values
    Distinct(String),
}

pub struct StatisticsCollector<S> {
    source: S,
    annotation_key: String,
    keys: Vec<String>,
    counts: BTreeMap<String, BTreeMap<String, usize>>,
}

impl<S: RecordSource> StatisticsCollector<S> {
    pub fn new(source: S, annotation_key: &str) -> Self {
        let keys = AnnotationKeySet::from_header(source.header(), annotation_key)
            .names()
            .to_vec();
        Self {
            source,
            annotation_key: annotation_key.to_string(),
            keys,
            counts: BTreeMap::new(),
        }
    }

    fn count(&mut self, record: &Record) {
        for entry in record.annotations(&self.annotation_key).unwrap_or_default() {
            for (key, raw) in self.keys.iter().zip(entry.split('|')) {
                let value = raw.trim();
                if value.is_empty() {
                    continue;
                }
                *self
                    .counts
                    .entry(key.clone())
                    .or_default()
                    .entry(value.to_string())
                    .or_default() += 1;
            }
        }
    }

    pub fn summary(&self) -> BTreeMap<String, FieldStatistics> {
        self.counts
            .iter()
            .map(|(key, values)| {
                let statistics = if values.len() > MAX_LISTED_VALUES {
                    FieldStatistics::Distinct(format!("#{}", values.len()))
                } else {
                    FieldStatistics::Counts(values.clone())
                };
                (key.clone(), statistics)
            })
            .collect()
    }

    pub fn write_yaml<W: Write>(&self, writer: W) -> EngineResult<()> {
        serde_yaml::to_writer(writer, &self.summary())?;
        Ok(())
    }
}

impl<S: RecordSource> RecordSource for StatisticsCollector<S> {
    fn header(&self) -> &Header {
        self.source.header()
    }

    fn next_record(&mut self) -> EngineResult<Option<Record>> {
        let record = self.source.next_record()?;
        if let Some(record) = &record {
            self.count(record);
        }
        Ok(record)
    }
}
