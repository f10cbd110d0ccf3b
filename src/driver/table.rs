//! Table driver: one row of expression values per record or per annotation.

use super::{annotation_entries, Engine};
use crate::environment::RecordEnvironment;
use crate::error::{EngineError, EngineResult};
use crate::expression::CompiledExpression;
use crate::record::{Header, RecordSource};
use crate::value::Value;
use std::collections::VecDeque;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

/// Column names of the output table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TableHeader {
    /// The source text of each top-level expression item
    #[default]
    Auto,
    None,
    Custom(Vec<String>),
}

impl FromStr for TableHeader {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "auto" => TableHeader::Auto,
            "none" => TableHeader::None,
            custom => TableHeader::Custom(custom.split(',').map(|n| n.trim().to_string()).collect()),
        })
    }
}

impl TableHeader {
    /// Resolve the column names for `expression`.
    pub fn names(&self, expression: &CompiledExpression) -> EngineResult<Option<Vec<String>>> {
        match self {
            TableHeader::Auto => Ok(Some(expression.item_sources().to_vec())),
            TableHeader::None => Ok(None),
            TableHeader::Custom(names) => {
                let columns = expression.item_sources().len();
                if names.len() != columns {
                    return Err(EngineError::TableHeaderMismatch {
                        names: names.len(),
                        columns,
                    });
                }
                Ok(Some(names.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableFormat {
    /// Delimiter-separated text
    Separated(String),
    /// One JSON value per line: an object when column names are known,
    /// otherwise an array
    JsonLines,
}

impl Default for TableFormat {
    fn default() -> Self {
        TableFormat::Separated("\t".to_string())
    }
}

/// Writes table rows in the configured format.
pub struct TableWriter<W: Write> {
    writer: W,
    format: TableFormat,
    names: Option<Vec<String>>,
}

impl<W: Write> TableWriter<W> {
    pub fn new(writer: W, format: TableFormat, names: Option<Vec<String>>) -> Self {
        Self {
            writer,
            format,
            names,
        }
    }

    /// Separated output starts with a header row when names are known.
    pub fn write_header(&mut self) -> EngineResult<()> {
        if let (TableFormat::Separated(separator), Some(names)) = (&self.format, &self.names) {
            writeln!(self.writer, "{}", names.join(separator))?;
        }
        Ok(())
    }

    pub fn write_row(&mut self, row: &[Value]) -> EngineResult<()> {
        match &self.format {
            TableFormat::Separated(separator) => {
                let cells: Vec<String> = row.iter().map(Value::to_string).collect();
                writeln!(self.writer, "{}", cells.join(separator))?;
            }
            TableFormat::JsonLines => {
                let line = match &self.names {
                    Some(names) => {
                        let object: serde_json::Map<String, serde_json::Value> = names
                            .iter()
                            .cloned()
                            .zip(row.iter().map(serde_json::to_value))
                            .map(|(name, value)| value.map(|value| (name, value)))
                            .collect::<Result<_, _>>()?;
                        serde_json::to_string(&object)?
                    }
                    None => serde_json::to_string(row)?,
                };
                writeln!(self.writer, "{}", line)?;
            }
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn same_row(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.identical(y))
}

/// Produces table rows from a record source.
///
/// Annotation-scoped expressions yield one row per annotation entry (a
/// record without entries yields one row against the empty placeholder).
/// Consecutive duplicate rows are suppressed unless `all_rows` is set.
pub struct TableDriver<S> {
    source: S,
    expression: CompiledExpression,
    env: RecordEnvironment,
    all_rows: bool,
    pending: VecDeque<Vec<Value>>,
    previous: Option<Vec<Value>>,
    index: usize,
}

impl<S: RecordSource> TableDriver<S> {
    pub fn new(source: S, engine: &Engine, expression: CompiledExpression) -> Self {
        let header: Arc<Header> = Arc::new(source.header().clone());
        let env = engine.environment(header);
        Self {
            source,
            expression,
            env,
            all_rows: false,
            pending: VecDeque::new(),
            previous: None,
            index: 0,
        }
    }

    pub fn all_rows(mut self, all_rows: bool) -> Self {
        self.all_rows = all_rows;
        self
    }

    fn fill(&mut self) -> EngineResult<bool> {
        let Some(record) = self.source.next_record()? else {
            return Ok(false);
        };
        self.env.load_record(self.index, record);
        self.index += 1;

        if !self.expression.is_annotation_scoped() {
            let row = self.expression.evaluate_items(&mut self.env)?;
            self.pending.push_back(row);
            return Ok(true);
        }

        let entries = annotation_entries(&self.env);
        if entries.is_empty() {
            self.env.load_empty_annotation();
            let row = self.expression.evaluate_items(&mut self.env)?;
            self.pending.push_back(row);
        }
        for entry in &entries {
            self.env.load_annotation(entry);
            let row = self.expression.evaluate_items(&mut self.env)?;
            self.pending.push_back(row);
        }
        Ok(true)
    }

    pub fn next_row(&mut self) -> EngineResult<Option<Vec<Value>>> {
        loop {
            while self.pending.is_empty() {
                if !self.fill()? {
                    return Ok(None);
                }
            }
            let Some(row) = self.pending.pop_front() else {
                continue;
            };
            if !self.all_rows && self.previous.as_deref().is_some_and(|p| same_row(p, &row)) {
                continue;
            }
            if !self.all_rows {
                self.previous = Some(row.clone());
            }
            return Ok(Some(row));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::Number;
    use crate::record::{FieldInfo, FieldType, HeaderLine, MemorySource, Record};

    fn source() -> MemorySource {
        let header = Header::new(
            vec![HeaderLine::Info(FieldInfo::new(
                "ANN",
                Number::Unbounded,
                FieldType::String,
                "Functional annotations: 'Allele | Annotation_Impact | Gene_Name'",
            ))],
            vec![],
        );
        MemorySource::new(
            header,
            vec![
                Record::new("chr1", 100, "A")
                    .with_alt("G")
                    .with_info("ANN", Some("G|HIGH|BRCA1,G|HIGH|BRCA1,G|LOW|TP53")),
                Record::new("chr2", 5, "C").with_alt("T"),
            ],
        )
    }

    fn rows(mut driver: TableDriver<MemorySource>) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        while let Some(row) = driver.next_row().unwrap() {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn test_rows_per_record() {
        let engine = Engine::new("ANN");
        let expression = engine.compile("CHROM, POS").unwrap();
        assert_eq!(
            rows(TableDriver::new(source(), &engine, expression)),
            vec![
                vec![Value::str("chr1"), Value::Int(100)],
                vec![Value::str("chr2"), Value::Int(5)],
            ]
        );
    }

    #[test]
    fn test_rows_per_annotation() {
        let engine = Engine::new("ANN");
        let expression = engine.compile("POS, ANN['Gene_Name']").unwrap();

        let deduplicated = rows(TableDriver::new(source(), &engine, expression.clone()));
        assert_eq!(
            deduplicated,
            vec![
                vec![Value::Int(100), Value::str("BRCA1")],
                vec![Value::Int(100), Value::str("TP53")],
                vec![Value::Int(5), Value::Na],
            ]
        );

        let all = rows(TableDriver::new(source(), &engine, expression).all_rows(true));
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_header_names() {
        let engine = Engine::new("ANN");
        let expression = engine.compile("CHROM, POS * 2").unwrap();
        assert_eq!(
            TableHeader::Auto.names(&expression).unwrap(),
            Some(vec!["CHROM".to_string(), "POS * 2".to_string()])
        );
        assert_eq!(TableHeader::None.names(&expression).unwrap(), None);
        assert_eq!(
            "chrom, pos".parse::<TableHeader>().unwrap().names(&expression).unwrap(),
            Some(vec!["chrom".to_string(), "pos".to_string()])
        );
        assert!(matches!(
            "a".parse::<TableHeader>().unwrap().names(&expression),
            Err(EngineError::TableHeaderMismatch { names: 1, columns: 2 })
        ));
    }

    #[test]
    fn test_writers() {
        let row = [Value::str("chr1"), Value::Na, Value::Bool(true)];
        let names = Some(vec!["c".to_string(), "n".to_string(), "b".to_string()]);

        let mut tsv = TableWriter::new(Vec::new(), TableFormat::default(), names.clone());
        tsv.write_header().unwrap();
        tsv.write_row(&row).unwrap();
        assert_eq!(
            String::from_utf8(tsv.into_inner()).unwrap(),
            "c\tn\tb\nchr1\t\tTrue\n"
        );

        let mut jsonl = TableWriter::new(Vec::new(), TableFormat::JsonLines, names);
        jsonl.write_header().unwrap();
        jsonl.write_row(&row).unwrap();
        let line = String::from_utf8(jsonl.into_inner()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["c"], "chr1");
        assert!(parsed["n"].is_null());
        assert_eq!(parsed["b"], true);
    }
}
