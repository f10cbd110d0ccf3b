//! Filter driver.
//!
//! Yields the records for which the expression is true. Annotation-scoped
//! expressions are evaluated once per annotation entry: failing entries are
//! removed from the record, and a record without any passing entry is
//! dropped.
//!
//! Breakend (BND) records are grouped into events by `INFO['EVENT']`, or by
//! their mate pair (`ID` and `INFO['MATEID']`). An event passes when any of
//! its records passes, and then all of its records are written. By default
//! passing events are written as soon as that is known, which can reorder
//! breakends relative to other records; with `preserve_order` the input is
//! buffered and read twice so the output keeps the input order.

use super::{annotation_entries, Engine};
use crate::environment::RecordEnvironment;
use crate::error::{EngineError, EngineResult, RecordRef};
use crate::expression::CompiledExpression;
use crate::record::{Header, Record, RecordSource};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Breakend records sharing an event or mate pair.
struct BreakendEvent {
    /// Index of the first record, for flushing in input order
    order: usize,
    records: Vec<Record>,
    /// Sticky: once any record passes, the whole event does
    keep: bool,
    mate_pair: bool,
}

impl BreakendEvent {
    fn add(&mut self, record: Record, keep: bool) {
        self.records.push(record);
        self.keep |= keep;
    }
}

/// Event name of a mate pair, independent of which mate comes first.
fn mate_key(mates: [Option<&str>; 2]) -> String {
    let mut mates: Vec<&str> = mates.into_iter().flatten().collect();
    mates.sort_unstable();
    format!("__MATES: {}", mates.join(","))
}

pub struct FilterDriver<S> {
    source: S,
    header: Arc<Header>,
    expression: CompiledExpression,
    env: RecordEnvironment,
    /// Keep every annotation entry of a record if any of them passes
    keep_unmatched: bool,
    preserve_order: bool,
    has_mate_ids: bool,
    has_events: bool,
    index: usize,
    passed: usize,
    pending: VecDeque<Record>,
    events: HashMap<String, BreakendEvent>,
    /// Input records of the order-preserving mode, once read
    buffered: Option<VecDeque<(usize, Record)>>,
    passing_events: HashSet<String>,
    exhausted: bool,
}

impl<S: RecordSource> FilterDriver<S> {
    pub fn new(source: S, engine: &Engine, expression: CompiledExpression) -> Self {
        let header = Arc::new(source.header().clone());
        let env = engine.environment(header.clone());
        Self {
            source,
            has_mate_ids: header.info("MATEID").is_some(),
            has_events: header.info("EVENT").is_some(),
            header,
            expression,
            env,
            keep_unmatched: false,
            preserve_order: false,
            index: 0,
            passed: 0,
            pending: VecDeque::new(),
            events: HashMap::new(),
            buffered: None,
            passing_events: HashSet::new(),
            exhausted: false,
        }
    }

    pub fn keep_unmatched(mut self, keep_unmatched: bool) -> Self {
        self.keep_unmatched = keep_unmatched;
        self
    }

    /// Keep breakends in input order at the cost of buffering the input.
    pub fn preserve_order(mut self, preserve_order: bool) -> Self {
        self.preserve_order = preserve_order;
        self
    }

    /// Evaluate the expression on `record`, dropping failing annotation
    /// entries unless `keep_unmatched` is set. Returns the possibly updated
    /// record and whether it passes.
    fn test(&mut self, index: usize, record: Record) -> EngineResult<(Record, bool)> {
        self.env.load_record(index, record);

        if !self.expression.is_annotation_scoped() {
            let keep = self.expression.is_true(&mut self.env)?;
            return Ok((self.env.take_record(), keep));
        }

        let entries = annotation_entries(&self.env);
        if entries.is_empty() {
            self.env.load_empty_annotation();
            let keep = self.expression.is_true(&mut self.env)?;
            return Ok((self.env.take_record(), keep));
        }

        let mut passing = Vec::new();
        for entry in &entries {
            self.env.load_annotation(entry);
            if self.expression.is_true(&mut self.env)? {
                passing.push(entry.clone());
            }
        }

        if !self.keep_unmatched && passing.len() < entries.len() {
            let key = self.env.annotation_key().to_string();
            self.env.record_mut().set_annotations(&key, &passing);
        }
        Ok((self.env.take_record(), !passing.is_empty()))
    }

    /// `INFO['EVENT']` and the mate-pair name of a breakend record.
    fn event_names(
        &self,
        index: usize,
        record: &Record,
    ) -> EngineResult<(Option<String>, Option<String>)> {
        let mate_ids: Vec<&str> = match record.info_raw("MATEID").flatten() {
            Some(raw) if self.has_mate_ids => raw.split(',').filter(|id| *id != ".").collect(),
            _ => Vec::new(),
        };
        let event = match record.info_raw("EVENT").flatten() {
            Some(event) if self.has_events && event != "." && !event.is_empty() => {
                Some(event.to_string())
            }
            _ => None,
        };

        if mate_ids.len() > 1 && event.is_none() {
            return Err(EngineError::MultipleMates {
                record: RecordRef::new(index, record.to_string()),
            });
        }
        let mate = match mate_ids.as_slice() {
            [mate] => Some(*mate),
            _ => None,
        };
        let mate_pair =
            (!mate_ids.is_empty()).then(|| mate_key([record.id.as_deref(), mate]));
        Ok((event, mate_pair))
    }

    /// Event name used by the order-preserving mode; every breakend gets one.
    fn fallback_name(&self, index: usize, record: &Record) -> EngineResult<String> {
        let (event, mate_pair) = self.event_names(index, record)?;
        Ok(event
            .or(mate_pair)
            .or_else(|| record.id.clone())
            .unwrap_or_else(|| format!("DUMMY: {}", index)))
    }

    fn next_index(&mut self) -> usize {
        self.index += 1;
        self.index - 1
    }

    /// Pull one input record and queue whatever it releases.
    fn advance_streaming(&mut self) -> EngineResult<()> {
        let Some(record) = self.source.next_record()? else {
            self.flush_events();
            self.exhausted = true;
            return Ok(());
        };
        let index = self.next_index();
        let (record, keep) = self.test(index, record)?;

        if !record.is_breakend() {
            if keep {
                self.pending.push_back(record);
            }
            return Ok(());
        }

        let (event, mate_pair) = self.event_names(index, &record)?;
        let Some(name) = event.or_else(|| mate_pair.clone()) else {
            log::warn!(
                "Breakend record {} has neither MATEID nor EVENT, treating it as a regular record",
                index
            );
            if keep {
                self.pending.push_back(record);
            }
            return Ok(());
        };

        if let Some(event) = self.events.get_mut(&name) {
            event.add(record, keep);
            if event.keep {
                self.pending.extend(event.records.drain(..));
                // Both mates have been seen
                if event.mate_pair && mate_pair.is_some() {
                    self.events.remove(&name);
                }
            }
            return Ok(());
        }

        let mut event = BreakendEvent {
            order: index,
            records: Vec::new(),
            keep: false,
            mate_pair: mate_pair.as_deref() == Some(name.as_str()),
        };
        event.add(record, keep);
        self.events.insert(name, event);
        Ok(())
    }

    /// Queue the records of passing events whose mates never showed up.
    fn flush_events(&mut self) {
        let mut remaining: Vec<BreakendEvent> = self
            .events
            .drain()
            .map(|(_, event)| event)
            .filter(|event| event.keep)
            .collect();
        remaining.sort_by_key(|event| event.order);
        for event in remaining {
            self.pending.extend(event.records);
        }
    }

    /// First pass of the order-preserving mode: buffer the input and note
    /// which breakend events pass.
    fn buffer_input(&mut self) -> EngineResult<VecDeque<(usize, Record)>> {
        let mut records = VecDeque::new();
        while let Some(record) = self.source.next_record()? {
            let index = self.next_index();
            if record.is_breakend() {
                let (tested, keep) = self.test(index, record.clone())?;
                if keep {
                    let name = self.fallback_name(index, &tested)?;
                    self.passing_events.insert(name);
                }
            }
            records.push_back((index, record));
        }
        log::debug!(
            "Buffered {} records, {} breakend event(s) pass",
            records.len(),
            self.passing_events.len()
        );
        Ok(records)
    }

    fn advance_in_order(&mut self) -> EngineResult<()> {
        if self.buffered.is_none() {
            self.buffered = Some(self.buffer_input()?);
        }
        let Some((index, record)) = self.buffered.as_mut().and_then(VecDeque::pop_front) else {
            self.exhausted = true;
            return Ok(());
        };

        if record.is_breakend() {
            if self.passing_events.contains(&self.fallback_name(index, &record)?) {
                self.pending.push_back(record);
            }
        } else {
            let (record, keep) = self.test(index, record)?;
            if keep {
                self.pending.push_back(record);
            }
        }
        Ok(())
    }
}

impl<S: RecordSource> RecordSource for FilterDriver<S> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_record(&mut self) -> EngineResult<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                self.passed += 1;
                return Ok(Some(record));
            }
            if self.exhausted {
                log::debug!("Filter kept {} of {} records", self.passed, self.index);
                return Ok(None);
            }
            if self.preserve_order {
                self.advance_in_order()?;
            } else {
                self.advance_streaming()?;
            }
        }
    }
}
