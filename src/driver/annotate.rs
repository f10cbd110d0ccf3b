//! Annotate driver: adds INFO fields computed from an interval table.
//!
//! The table is a delimited text file with a header row, naming at least a
//! chromosome, a start and a stop column. Rows whose half-open, 0-based
//! interval `[start, stop)` contains a record's position are exposed to the
//! configured expressions as `DATA`, a dict from column name to the list of
//! that column's values in the matching rows. Each expression's result is
//! stored in a new INFO field. Records without matching rows pass unchanged.

use super::Engine;
use crate::cardinality::Number;
use crate::environment::RecordEnvironment;
use crate::error::{EngineError, EngineResult};
use crate::expression::CompiledExpression;
use crate::record::{FieldInfo, FieldType, Header, HeaderLine, Record, RecordSource};
use crate::value::Value;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name under which the matching rows are visible to expressions.
pub const DATA: &str = "DATA";

const CHROM_PREFIXES: [&str; 4] = ["", "chr", "Chr", "CHR"];

fn default_delimiter() -> String {
    "\t".to_string()
}

/// `number` may be written as a YAML integer or as a string such as `"."`.
fn deserialize_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Number, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Count(usize),
        Symbol(String),
    }

    let text = match Raw::deserialize(deserializer)? {
        Raw::Count(count) => count.to_string(),
        Raw::Symbol(symbol) => symbol,
    };
    text.parse::<Number>().map_err(serde::de::Error::custom)
}

fn deserialize_field_type<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<FieldType, D::Error> {
    let name = String::deserialize(deserializer)?;
    match name.as_str() {
        "Integer" | "Float" | "Flag" | "Character" | "String" => Ok(FieldType::from_name(&name)),
        other => Err(serde::de::Error::custom(format!(
            "unknown type '{}', expected Integer, Float, Flag, Character or String",
            other
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotateConfig {
    pub annotation: AnnotationSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationSource {
    pub file: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    pub columns: IntervalColumns,
    pub values: Vec<ValueEntry>,
}

/// Table columns holding the interval of each row.
#[derive(Debug, Clone, Deserialize)]
pub struct IntervalColumns {
    pub chrom: String,
    pub start: String,
    pub stop: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueEntry {
    pub value: AnnotationValue,
}

/// One INFO field to add and the expression computing it.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationValue {
    pub vcf_name: String,
    #[serde(deserialize_with = "deserialize_number")]
    pub number: Number,
    #[serde(rename = "type", deserialize_with = "deserialize_field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
    pub expression: String,
}

impl AnnotateConfig {
    pub fn from_yaml_str(yaml: &str) -> EngineResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn values(&self) -> impl Iterator<Item = &AnnotationValue> {
        self.annotation.values.iter().map(|entry| &entry.value)
    }

    /// Read the interval table named by the configuration.
    pub fn load_table(&self) -> EngineResult<IntervalTable> {
        let source = &self.annotation;
        IntervalTable::load(&source.file, &source.delimiter, &source.columns)
    }
}

#[derive(Debug, Clone)]
struct Interval {
    start: i64,
    stop: i64,
    row: Vec<Value>,
}

/// Rows of the annotation data, grouped by chromosome and sorted by start.
#[derive(Debug, Clone, Default)]
pub struct IntervalTable {
    columns: Vec<String>,
    chroms: HashMap<String, Vec<Interval>>,
}

/// Typed cell: integer, float, or text; empty cells are NA.
fn parse_cell(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        Value::Na
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(v) = raw.parse::<f64>() {
        Value::Float(v)
    } else {
        Value::str(raw)
    }
}

impl IntervalTable {
    pub fn load(path: &Path, delimiter: &str, columns: &IntervalColumns) -> EngineResult<Self> {
        let file = File::open(path)?;
        let table = Self::read(BufReader::new(file), delimiter, columns)
            .map_err(|error| match error {
                EngineError::UnknownColumn { column, .. } => EngineError::UnknownColumn {
                    column,
                    path: path.display().to_string(),
                },
                other => other,
            })?;
        log::debug!(
            "Loaded {} annotation intervals on {} chromosome(s) from {}",
            table.len(),
            table.chroms.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn read<R: BufRead>(
        reader: R,
        delimiter: &str,
        columns: &IntervalColumns,
    ) -> EngineResult<Self> {
        let mut lines = reader.lines();
        let names: Vec<String> = match lines.next() {
            Some(line) => line?
                .split(delimiter)
                .map(|name| name.trim().to_string())
                .collect(),
            None => Vec::new(),
        };
        let position = |column: &str| {
            names
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| EngineError::UnknownColumn {
                    column: column.to_string(),
                    path: String::new(),
                })
        };
        let chrom_column = position(&columns.chrom)?;
        let start_column = position(&columns.start)?;
        let stop_column = position(&columns.stop)?;

        let mut chroms: HashMap<String, Vec<Interval>> = HashMap::new();
        for (offset, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let number = offset + 2;
            let cells: Vec<&str> = line.split(delimiter).collect();
            if cells.len() != names.len() {
                return Err(EngineError::MalformedInput {
                    line: number,
                    message: format!("expected {} columns, found {}", names.len(), cells.len()),
                });
            }

            let bound = |column: usize| {
                cells[column]
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| EngineError::MalformedInput {
                        line: number,
                        message: format!(
                            "'{}' in column '{}' is not an integer",
                            cells[column], names[column]
                        ),
                    })
            };
            let interval = Interval {
                start: bound(start_column)?,
                stop: bound(stop_column)?,
                row: cells.iter().map(|cell| parse_cell(cell)).collect(),
            };
            chroms
                .entry(cells[chrom_column].trim().to_string())
                .or_default()
                .push(interval);
        }

        for intervals in chroms.values_mut() {
            intervals.sort_by_key(|interval| interval.start);
        }
        Ok(Self {
            columns: names,
            chroms,
        })
    }

    pub fn len(&self) -> usize {
        self.chroms.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The table's name for `chrom`, ignoring a `chr` prefix on either side.
    fn resolve_chrom(&self, chrom: &str) -> Option<&str> {
        let bare = match chrom.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("chr") => &chrom[3..],
            _ => chrom,
        };
        CHROM_PREFIXES.iter().find_map(|prefix| {
            self.chroms
                .get_key_value(&format!("{}{}", prefix, bare))
                .map(|(name, _)| name.as_str())
        })
    }

    /// `DATA` for a 0-based `position`: column name to the values of every
    /// row containing it. `None` when no row does.
    pub fn overlapping(&self, chrom: &str, position: i64) -> Option<Value> {
        let intervals = self.chroms.get(self.resolve_chrom(chrom)?)?;
        let candidates = intervals.partition_point(|interval| interval.start <= position);
        let rows: Vec<&Interval> = intervals[..candidates]
            .iter()
            .filter(|interval| position < interval.stop)
            .collect();
        if rows.is_empty() {
            return None;
        }

        let data: BTreeMap<String, Value> = self
            .columns
            .iter()
            .enumerate()
            .map(|(column, name)| {
                let values = rows.iter().map(|row| row.row[column].clone()).collect();
                (name.clone(), Value::List(values))
            })
            .collect();
        Some(Value::Map(data))
    }
}

/// How an evaluated value lands in the record's INFO column.
#[derive(Debug, Clone, PartialEq)]
enum InfoUpdate {
    Set(String),
    Flag(bool),
}

fn encode_scalar(field_type: FieldType, value: &Value) -> Result<String, String> {
    if value.is_na() {
        return Ok(".".to_string());
    }
    match field_type {
        FieldType::Integer => match value {
            Value::Float(v) if v.is_finite() => Ok((v.trunc() as i64).to_string()),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| i.to_string())
                .map_err(|_| format!("'{}' is not an integer", s)),
            other => other
                .as_i64()
                .map(|i| i.to_string())
                .ok_or_else(|| format!("cannot convert '{}' to Integer", other.type_name())),
        },
        FieldType::Float => match value {
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(|v| Value::Float(v).to_string())
                .map_err(|_| format!("'{}' is not a float", s)),
            other => other
                .as_f64()
                .map(|v| Value::Float(v).to_string())
                .ok_or_else(|| format!("cannot convert '{}' to Float", other.type_name())),
        },
        FieldType::Character => Ok(value
            .to_string()
            .chars()
            .next()
            .map_or_else(|| ".".to_string(), String::from)),
        FieldType::String | FieldType::Flag => Ok(value.to_string()),
    }
}

fn encode(field: &AnnotationValue, value: &Value) -> Result<InfoUpdate, String> {
    if field.field_type == FieldType::Flag || field.number.is_flag() {
        return Ok(InfoUpdate::Flag(value.is_truthy()));
    }

    let single = |value: &Value| encode_scalar(field.field_type, value);
    let list = |value: &Value| -> Result<Vec<String>, String> {
        match value {
            Value::Str(_) => Err("expected a list of values, got 'str'".to_string()),
            other => other
                .iter_values()
                .ok_or_else(|| format!("expected a list of values, got '{}'", other.type_name()))?
                .iter()
                .map(single)
                .collect(),
        }
    };

    match field.number {
        Number::Fixed(1) => match value {
            Value::List(_) => Err("expected a single value, got a list".to_string()),
            other => single(other).map(InfoUpdate::Set),
        },
        Number::Fixed(count) => {
            let values = list(value)?;
            if values.len() != count {
                return Err(format!("expected {} values, got {}", count, values.len()));
            }
            Ok(InfoUpdate::Set(values.join(",")))
        }
        _ => Ok(InfoUpdate::Set(list(value)?.join(","))),
    }
}

pub struct AnnotateDriver<S> {
    source: S,
    header: Arc<Header>,
    table: IntervalTable,
    fields: Vec<(AnnotationValue, CompiledExpression)>,
    env: RecordEnvironment,
    index: usize,
    annotated: usize,
}

impl<S: RecordSource> AnnotateDriver<S> {
    /// Compile every configured expression and declare its INFO field.
    pub fn new(
        source: S,
        engine: &Engine,
        config: &AnnotateConfig,
        table: IntervalTable,
    ) -> EngineResult<Self> {
        let engine = engine.clone().with_variable(DATA);
        let mut header = source.header().clone();
        let mut fields = Vec::new();
        for value in config.values() {
            let expression = engine.compile(&value.expression)?;
            header.add_line(HeaderLine::Info(FieldInfo::new(
                value.vcf_name.as_str(),
                value.number,
                value.field_type,
                value.description.as_str(),
            )));
            fields.push((value.clone(), expression));
        }

        let header = Arc::new(header);
        let env = engine.environment(header.clone());
        Ok(Self {
            source,
            header,
            table,
            fields,
            env,
            index: 0,
            annotated: 0,
        })
    }

    fn annotate(&mut self, data: Value, record: Record) -> EngineResult<Record> {
        self.env.set_variable(DATA, data);
        self.env.load_record(self.index, record);

        let mut updates = Vec::with_capacity(self.fields.len());
        for (field, expression) in &self.fields {
            let value = expression.evaluate(&mut self.env)?;
            let update = encode(field, &value).map_err(|reason| EngineError::AnnotationValue {
                field: field.vcf_name.clone(),
                value: value.to_string(),
                reason,
                record: self.env.record_ref(),
            })?;
            updates.push((field.vcf_name.as_str(), update));
        }

        let record = self.env.record_mut();
        for (name, update) in updates {
            match update {
                InfoUpdate::Set(raw) => record.set_info(name, Some(raw)),
                InfoUpdate::Flag(true) => record.set_info(name, None),
                InfoUpdate::Flag(false) => record.remove_info(name),
            }
        }
        self.annotated += 1;
        Ok(self.env.take_record())
    }
}

impl<S: RecordSource> RecordSource for AnnotateDriver<S> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_record(&mut self) -> EngineResult<Option<Record>> {
        let Some(record) = self.source.next_record()? else {
            log::debug!("Annotated {} of {} records", self.annotated, self.index);
            return Ok(None);
        };
        let record = match self.table.overlapping(&record.chrom, record.pos - 1) {
            Some(data) => self.annotate(data, record)?,
            None => record,
        };
        self.index += 1;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemorySource;

    const CONFIG: &str = r#"
annotation:
  file: regions.tsv
  columns:
    chrom: chrom
    start: chromStart
    stop: chromEnd
  values:
    - value:
        vcf_name: region_score
        number: 1
        type: Float
        description: Highest score of the overlapping regions
        expression: max(DATA['score'])
    - value:
        vcf_name: region_names
        number: "."
        type: String
        description: Names of the overlapping regions
        expression: DATA['name']
    - value:
        vcf_name: in_region
        number: 0
        type: Flag
        expression: len(DATA['name']) > 0
"#;

    const TABLE: &str = "chrom\tchromStart\tchromEnd\tname\tscore\n\
                         chr1\t100\t200\tfirst\t0.5\n\
                         chr1\t150\t300\tsecond\t2\n\
                         2\t0\t10\tother\t\n";

    fn columns() -> IntervalColumns {
        IntervalColumns {
            chrom: "chrom".to_string(),
            start: "chromStart".to_string(),
            stop: "chromEnd".to_string(),
        }
    }

    fn table() -> IntervalTable {
        IntervalTable::read(TABLE.as_bytes(), "\t", &columns()).unwrap()
    }

    #[test]
    fn test_config() {
        let config = AnnotateConfig::from_yaml_str(CONFIG).unwrap();
        assert_eq!(config.annotation.delimiter, "\t");
        let values: Vec<&AnnotationValue> = config.values().collect();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].number, Number::Fixed(1));
        assert_eq!(values[0].field_type, FieldType::Float);
        assert_eq!(values[1].number, Number::Unbounded);
        assert!(values[2].number.is_flag());
        assert_eq!(values[2].description, "");

        let invalid = CONFIG.replace("type: Float", "type: Decimal");
        assert!(matches!(
            AnnotateConfig::from_yaml_str(&invalid),
            Err(EngineError::Yaml(_))
        ));
    }

    #[test]
    fn test_interval_lookup() {
        let table = table();
        assert_eq!(table.len(), 3);

        let Some(Value::Map(data)) = table.overlapping("chr1", 160) else {
            panic!("expected matching rows");
        };
        assert_eq!(
            data["name"],
            Value::List(vec![Value::str("first"), Value::str("second")])
        );
        assert_eq!(
            data["score"],
            Value::List(vec![Value::Float(0.5), Value::Int(2)])
        );

        // Half-open intervals
        assert!(table.overlapping("chr1", 99).is_none());
        assert!(table.overlapping("chr1", 100).is_some());
        assert!(table.overlapping("chr1", 300).is_none());
        assert!(table.overlapping("chrX", 150).is_none());
    }

    #[test]
    fn test_chromosome_prefixes() {
        let table = table();
        assert!(table.overlapping("1", 150).is_some());
        assert!(table.overlapping("Chr1", 150).is_some());
        let Some(Value::Map(data)) = table.overlapping("chr2", 5) else {
            panic!("expected matching rows");
        };
        assert_eq!(data["score"], Value::List(vec![Value::Na]));
    }

    #[test]
    fn test_malformed_table() {
        let missing = IntervalColumns {
            stop: "end".to_string(),
            ..columns()
        };
        assert!(matches!(
            IntervalTable::read(TABLE.as_bytes(), "\t", &missing),
            Err(EngineError::UnknownColumn { column, .. }) if column == "end"
        ));
        assert!(matches!(
            IntervalTable::read("chrom\tchromStart\tchromEnd\nchr1\tx\t5\n".as_bytes(), "\t", &columns()),
            Err(EngineError::MalformedInput { line: 2, .. })
        ));
        assert!(matches!(
            IntervalTable::read("chrom\tchromStart\tchromEnd\nchr1\t5\n".as_bytes(), "\t", &columns()),
            Err(EngineError::MalformedInput { line: 2, .. })
        ));
    }

    #[test]
    fn test_encode() {
        let field = |number: Number, field_type: FieldType| AnnotationValue {
            vcf_name: "X".to_string(),
            number,
            field_type,
            description: String::new(),
            expression: String::new(),
        };
        let ints = Value::List(vec![Value::Int(1), Value::Na]);

        assert_eq!(
            encode(&field(Number::Fixed(1), FieldType::Integer), &Value::Float(2.9)),
            Ok(InfoUpdate::Set("2".to_string()))
        );
        assert_eq!(
            encode(&field(Number::Unbounded, FieldType::Integer), &ints),
            Ok(InfoUpdate::Set("1,.".to_string()))
        );
        assert_eq!(
            encode(&field(Number::Fixed(2), FieldType::Float), &ints),
            Ok(InfoUpdate::Set("1.0,.".to_string()))
        );
        assert_eq!(
            encode(&field(Number::Fixed(1), FieldType::Character), &Value::str("xyz")),
            Ok(InfoUpdate::Set("x".to_string()))
        );
        assert_eq!(
            encode(&field(Number::Fixed(0), FieldType::Flag), &Value::Bool(false)),
            Ok(InfoUpdate::Flag(false))
        );
        assert!(encode(&field(Number::Fixed(3), FieldType::Integer), &ints).is_err());
        assert!(encode(&field(Number::Fixed(1), FieldType::Integer), &ints).is_err());
        assert!(encode(&field(Number::Unbounded, FieldType::String), &Value::str("a")).is_err());
        assert!(encode(&field(Number::Fixed(1), FieldType::Integer), &Value::str("x")).is_err());
    }

    #[test]
    fn test_annotate_records() {
        let config = AnnotateConfig::from_yaml_str(CONFIG).unwrap();
        let source = MemorySource::new(
            Header::default(),
            vec![
                Record::new("chr1", 151, "A").with_alt("G"),
                Record::new("chr1", 1000, "A").with_alt("G"),
                Record::new("chr1", 101, "A").with_alt("G"),
            ],
        );
        let mut driver = AnnotateDriver::new(source, &Engine::new("ANN"), &config, table()).unwrap();
        assert!(driver.header().info("region_score").is_some());
        assert_eq!(
            driver.header().info("region_names").map(|info| info.number),
            Some(Number::Unbounded)
        );

        let both = driver.next_record().unwrap().unwrap();
        assert_eq!(both.info_raw("region_score"), Some(Some("2.0")));
        assert_eq!(both.info_raw("region_names"), Some(Some("first,second")));
        assert_eq!(both.info_raw("in_region"), Some(None));

        let outside = driver.next_record().unwrap().unwrap();
        assert!(outside.info.is_empty());

        let first = driver.next_record().unwrap().unwrap();
        assert_eq!(first.info_raw("region_score"), Some(Some("0.5")));
        assert_eq!(first.info_raw("region_names"), Some(Some("first")));
        assert!(driver.next_record().unwrap().is_none());
    }

    #[test]
    fn test_data_is_only_known_to_annotate() {
        let engine = Engine::new("ANN");
        assert!(engine.compile("DATA['score']").is_err());
        assert!(engine.with_variable(DATA).compile("DATA['score']").is_ok());
    }
}
