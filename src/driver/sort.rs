//! Sort driver.
//!
//! Materializes every record of its input in memory, keyed by the values of
//! the sort expression, and yields them in key order. Top-level items wrapped
//! in `desc(...)` sort descending; missing values sort last either way.
//!
//! For annotation-scoped keys each annotation entry gets its own key: the
//! entries are reordered by it (unless asked to preserve their order) and the
//! record sorts by its smallest entry key.

use super::{annotation_entries, Engine};
use crate::environment::RecordEnvironment;
use crate::error::EngineResult;
use crate::expression::CompiledExpression;
use crate::record::{Header, Record, RecordSource};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct SortDriver<S> {
    source: S,
    header: Arc<Header>,
    expression: CompiledExpression,
    directions: Vec<bool>,
    env: RecordEnvironment,
    preserve_annotation_order: bool,
    /// Sorted records, filled on the first call to `next_record`
    sorted: Option<VecDeque<Record>>,
}

impl<S: RecordSource> SortDriver<S> {
    pub fn new(source: S, engine: &Engine, expression: CompiledExpression) -> Self {
        let header = Arc::new(source.header().clone());
        let env = engine.environment(header.clone());
        let directions = expression.sort_directions();
        Self {
            source,
            header,
            expression,
            directions,
            env,
            preserve_annotation_order: false,
            sorted: None,
        }
    }

    pub fn preserve_annotation_order(mut self, preserve: bool) -> Self {
        self.preserve_annotation_order = preserve;
        self
    }

    fn record_key(&mut self) -> EngineResult<Vec<Value>> {
        if !self.expression.is_annotation_scoped() {
            return self.expression.evaluate_items(&mut self.env);
        }

        let entries = annotation_entries(&self.env);
        if entries.is_empty() {
            self.env.load_empty_annotation();
            return self.expression.evaluate_items(&mut self.env);
        }

        let mut keyed = Vec::with_capacity(entries.len());
        for entry in entries {
            self.env.load_annotation(&entry);
            keyed.push((self.expression.evaluate_items(&mut self.env)?, entry));
        }

        let directions = &self.directions;
        if !self.preserve_annotation_order {
            keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, directions));
            let ordered: Vec<String> = keyed.iter().map(|(_, entry)| entry.clone()).collect();
            let key = self.env.annotation_key().to_string();
            self.env.record_mut().set_annotations(&key, &ordered);
        }

        Ok(keyed
            .into_iter()
            .map(|(key, _)| key)
            .min_by(|a, b| compare_keys(a, b, directions))
            .unwrap_or_default())
    }

    fn materialize(&mut self) -> EngineResult<VecDeque<Record>> {
        let mut keyed = Vec::new();
        while let Some(record) = self.source.next_record()? {
            self.env.load_record(keyed.len(), record);
            let key = self.record_key()?;
            keyed.push((key, self.env.take_record()));
        }

        let directions = &self.directions;
        keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, directions));
        log::debug!("Sorted {} records", keyed.len());

        Ok(keyed.into_iter().map(|(_, record)| record).collect())
    }
}

/// Lexicographic comparison of sort keys, item by item.
fn compare_keys(a: &[Value], b: &[Value], descending: &[bool]) -> Ordering {
    a.iter()
        .zip(b)
        .enumerate()
        .map(|(i, (x, y))| x.sort_cmp(y, descending.get(i).copied().unwrap_or(false)))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

impl<S: RecordSource> RecordSource for SortDriver<S> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_record(&mut self) -> EngineResult<Option<Record>> {
        if self.sorted.is_none() {
            self.sorted = Some(self.materialize()?);
        }
        Ok(self.sorted.as_mut().and_then(VecDeque::pop_front))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::Number;
    use crate::record::{FieldInfo, FieldType, HeaderLine, MemorySource};

    fn source() -> MemorySource {
        let header = Header::new(
            vec![
                HeaderLine::Info(FieldInfo::new("DP", Number::Fixed(1), FieldType::Integer, "")),
                HeaderLine::Info(FieldInfo::new(
                    "ANN",
                    Number::Unbounded,
                    FieldType::String,
                    "Functional annotations: 'Allele | Annotation_Impact | Gene_Name'",
                )),
            ],
            vec![],
        );
        MemorySource::new(
            header,
            vec![
                Record::new("chr1", 300, "A")
                    .with_alt("G")
                    .with_info("DP", Some("5"))
                    .with_info("ANN", Some("G|LOW|ZNF1,G|HIGH|BRCA1")),
                Record::new("chr1", 100, "C").with_alt("T"),
                Record::new("chr2", 200, "G")
                    .with_alt("A")
                    .with_info("DP", Some("9"))
                    .with_info("ANN", Some("A|LOW|KRAS")),
            ],
        )
    }

    fn sorted(mut driver: SortDriver<MemorySource>) -> Vec<Record> {
        let mut records = Vec::new();
        while let Some(record) = driver.next_record().unwrap() {
            records.push(record);
        }
        records
    }

    fn positions(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r.pos).collect()
    }

    #[test]
    fn test_sort_ascending_and_descending() {
        let engine = Engine::new("ANN");
        let ascending = sorted(SortDriver::new(source(), &engine, engine.compile("POS").unwrap()));
        assert_eq!(positions(&ascending), vec![100, 200, 300]);

        let descending = sorted(SortDriver::new(
            source(),
            &engine,
            engine.compile("desc(POS)").unwrap(),
        ));
        assert_eq!(positions(&descending), vec![300, 200, 100]);
    }

    #[test]
    fn test_missing_keys_sort_last() {
        let engine = Engine::new("ANN");
        for expression in ["INFO['DP']", "desc(INFO['DP'])"] {
            let records = sorted(SortDriver::new(source(), &engine, engine.compile(expression).unwrap()));
            assert_eq!(records.last().unwrap().pos, 100, "{}", expression);
        }
    }

    #[test]
    fn test_multiple_keys() {
        let engine = Engine::new("ANN");
        let records = sorted(SortDriver::new(
            source(),
            &engine,
            engine.compile("desc(CHROM), POS").unwrap(),
        ));
        assert_eq!(positions(&records), vec![200, 100, 300]);
    }

    #[test]
    fn test_annotation_keys_reorder_entries() {
        let engine = Engine::new("ANN");
        let expression = engine.compile("ANN['Gene_Name']").unwrap();

        let records = sorted(SortDriver::new(source(), &engine, expression.clone()));
        assert_eq!(positions(&records), vec![300, 200, 100]);
        assert_eq!(
            records[0].annotations("ANN").unwrap(),
            vec!["G|HIGH|BRCA1".to_string(), "G|LOW|ZNF1".to_string()]
        );

        let preserved = sorted(
            SortDriver::new(source(), &engine, expression).preserve_annotation_order(true),
        );
        assert_eq!(positions(&preserved), vec![300, 200, 100]);
        assert_eq!(
            preserved[0].annotations("ANN").unwrap(),
            vec!["G|LOW|ZNF1".to_string(), "G|HIGH|BRCA1".to_string()]
        );
    }
}
