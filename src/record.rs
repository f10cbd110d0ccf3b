//! Record and header model consumed by the engine.
//!
//! Records keep their INFO and FORMAT payloads as raw text and type them on
//! demand against the header, so that writing a record back out is lossless.

use crate::cardinality::Number;
use crate::error::{EngineError, EngineResult};
use crate::value::Value;
use std::fmt;

pub mod memory;
pub mod vcf;

pub use memory::MemorySource;
pub use vcf::{VcfReader, VcfWriter};

/// Volcano-style producer of records.
pub trait RecordSource {
    /// The header describing every record this source produces.
    fn header(&self) -> &Header;

    /// Get the next record. Returns None when the source is exhausted.
    fn next_record(&mut self) -> EngineResult<Option<Record>>;
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn header(&self) -> &Header {
        (**self).header()
    }

    fn next_record(&mut self) -> EngineResult<Option<Record>> {
        (**self).next_record()
    }
}

/// Consumer of records, e.g. a VCF writer.
pub trait RecordSink {
    fn write_header(&mut self, header: &Header) -> EngineResult<()>;
    fn write_record(&mut self, record: &Record) -> EngineResult<()>;
}

/// Typed view of one INFO value or one sample's FORMAT value.
#[derive(Debug, Clone, PartialEq)]
pub enum RawField {
    Flag,
    Values(Vec<Value>),
}

/// Declared `Type=` of an INFO or FORMAT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

impl FieldType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Integer" => FieldType::Integer,
            "Float" => FieldType::Float,
            "Flag" => FieldType::Flag,
            "Character" => FieldType::Character,
            _ => FieldType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "Integer",
            FieldType::Float => "Float",
            FieldType::Flag => "Flag",
            FieldType::Character => "Character",
            FieldType::String => "String",
        }
    }

    /// Parse a single (comma-free) value. `.` is NA.
    pub fn parse_value(&self, raw: &str) -> Result<Value, String> {
        if raw == "." {
            return Ok(Value::Na);
        }
        match self {
            FieldType::Integer => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{}' is not an integer", raw)),
            FieldType::Float => raw
                .parse::<f32>()
                .map(Value::from_f32)
                .map_err(|_| format!("'{}' is not a float", raw)),
            FieldType::Flag => Ok(Value::Bool(true)),
            FieldType::Character | FieldType::String => Ok(Value::Str(raw.to_string())),
        }
    }

    fn parse_values(&self, raw: &str) -> Result<RawField, String> {
        if *self == FieldType::Flag {
            return Ok(RawField::Flag);
        }
        raw.split(',')
            .map(|part| self.parse_value(part))
            .collect::<Result<Vec<_>, _>>()
            .map(RawField::Values)
    }
}

/// Metadata of an INFO or FORMAT field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub id: String,
    pub number: Number,
    pub field_type: FieldType,
    pub description: String,
}

impl FieldInfo {
    pub fn new(
        id: impl Into<String>,
        number: Number,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            number,
            field_type,
            description: description.into(),
        }
    }
}

/// One `##` line of a VCF header.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderLine {
    Info(FieldInfo),
    Format(FieldInfo),
    Filter { id: String, description: String },
    Meta { key: String, value: String },
}

fn escape(description: &str) -> String {
    description.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Display for HeaderLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderLine::Info(info) | HeaderLine::Format(info) => {
                let key = if matches!(self, HeaderLine::Info(_)) {
                    "INFO"
                } else {
                    "FORMAT"
                };
                write!(
                    f,
                    "##{}=<ID={},Number={},Type={},Description=\"{}\">",
                    key,
                    info.id,
                    info.number,
                    info.field_type.as_str(),
                    escape(&info.description)
                )
            }
            HeaderLine::Filter { id, description } => {
                write!(
                    f,
                    "##FILTER=<ID={},Description=\"{}\">",
                    id,
                    escape(description)
                )
            }
            HeaderLine::Meta { key, value } => write!(f, "##{}={}", key, value),
        }
    }
}

/// VCF header: metadata lines plus the ordered sample names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    lines: Vec<HeaderLine>,
    samples: Vec<String>,
}

impl Header {
    pub fn new(lines: Vec<HeaderLine>, samples: Vec<String>) -> Self {
        Self { lines, samples }
    }

    pub fn lines(&self) -> &[HeaderLine] {
        &self.lines
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn sample_index(&self, name: &str) -> Option<usize> {
        self.samples.iter().position(|s| s == name)
    }

    pub fn info(&self, id: &str) -> Option<&FieldInfo> {
        self.lines.iter().find_map(|line| match line {
            HeaderLine::Info(info) if info.id == id => Some(info),
            _ => None,
        })
    }

    pub fn format(&self, id: &str) -> Option<&FieldInfo> {
        self.lines.iter().find_map(|line| match line {
            HeaderLine::Format(info) if info.id == id => Some(info),
            _ => None,
        })
    }

    pub fn has_filter(&self, id: &str) -> bool {
        self.lines
            .iter()
            .any(|line| matches!(line, HeaderLine::Filter { id: existing, .. } if existing == id))
    }

    /// Value of the first generic `##key=value` line with this key.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            HeaderLine::Meta { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn add_line(&mut self, line: HeaderLine) {
        self.lines.push(line);
    }

    pub fn add_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.lines.push(HeaderLine::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Register a new FILTER tag. Tags must be unique.
    pub fn add_filter(&mut self, id: &str, description: &str) -> EngineResult<()> {
        if self.has_filter(id) {
            return Err(EngineError::FilterAlreadyDefined(id.to_string()));
        }
        self.lines.push(HeaderLine::Filter {
            id: id.to_string(),
            description: description.to_string(),
        });
        Ok(())
    }

    pub fn set_info_number(&mut self, id: &str, number: Number) -> EngineResult<()> {
        self.set_number(id, number, true)
    }

    pub fn set_format_number(&mut self, id: &str, number: Number) -> EngineResult<()> {
        self.set_number(id, number, false)
    }

    fn set_number(&mut self, id: &str, number: Number, info: bool) -> EngineResult<()> {
        let section = if info { "INFO" } else { "FORMAT" };
        if info && number == Number::PerGenotype {
            return Err(EngineError::InvalidNumber {
                value: number.to_string(),
                reason: "G is only valid for FORMAT fields".to_string(),
            });
        }
        let field = self.lines.iter_mut().find_map(|line| match line {
            HeaderLine::Info(field) if info && field.id == id => Some(field),
            HeaderLine::Format(field) if !info && field.id == id => Some(field),
            _ => None,
        });
        match field {
            Some(field) => {
                if field.number != number {
                    log::warn!(
                        "Overwriting number of {} field '{}': {} -> {}",
                        section,
                        id,
                        field.number,
                        number
                    );
                }
                field.number = number;
                Ok(())
            }
            None => Err(EngineError::UnknownOverrideField {
                section,
                field: id.to_string(),
            }),
        }
    }
}

/// One variant line.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub chrom: String,
    pub pos: i64,
    pub id: Option<String>,
    pub reference: String,
    pub alt: Vec<String>,
    pub qual: Option<f32>,
    pub filter: Vec<String>,
    /// INFO entries in file order; `None` marks a flag.
    pub info: Vec<(String, Option<String>)>,
    pub format: Vec<String>,
    /// Raw FORMAT values per sample, aligned with `format`.
    pub samples: Vec<Vec<String>>,
}

impl Record {
    pub fn new(chrom: impl Into<String>, pos: i64, reference: impl Into<String>) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            id: None,
            reference: reference.into(),
            alt: Vec::new(),
            qual: None,
            filter: Vec::new(),
            info: Vec::new(),
            format: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn with_alt(mut self, alt: &str) -> Self {
        self.alt.push(alt.to_string());
        self
    }

    pub fn with_qual(mut self, qual: f32) -> Self {
        self.qual = Some(qual);
        self
    }

    pub fn with_info(mut self, key: &str, value: Option<&str>) -> Self {
        self.set_info(key, value.map(str::to_string));
        self
    }

    pub fn with_samples(mut self, format: &[&str], samples: &[Vec<&str>]) -> Self {
        self.format = format.iter().map(|s| s.to_string()).collect();
        self.samples = samples
            .iter()
            .map(|values| values.iter().map(|s| s.to_string()).collect())
            .collect();
        self
    }

    /// Raw INFO value: `Some(None)` for a present flag.
    pub fn info_raw(&self, key: &str) -> Option<Option<&str>> {
        self.info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_deref())
    }

    pub fn set_info(&mut self, key: &str, value: Option<String>) {
        match self.info.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.info.push((key.to_string(), value)),
        }
    }

    pub fn remove_info(&mut self, key: &str) {
        self.info.retain(|(k, _)| k != key);
    }

    /// Type an INFO value against its header declaration.
    pub fn info_field(&self, field: &FieldInfo) -> Result<Option<RawField>, String> {
        match self.info_raw(&field.id) {
            None => Ok(None),
            Some(None) => Ok(Some(RawField::Flag)),
            Some(Some(raw)) => field.field_type.parse_values(raw).map(Some),
        }
    }

    /// The comma-separated entries of an annotation INFO field.
    pub fn annotations(&self, key: &str) -> Option<Vec<String>> {
        match self.info_raw(key)? {
            Some(raw) => Some(raw.split(',').map(str::to_string).collect()),
            None => Some(Vec::new()),
        }
    }

    pub fn set_annotations(&mut self, key: &str, entries: &[String]) {
        if entries.is_empty() {
            self.remove_info(key);
        } else {
            self.set_info(key, Some(entries.join(",")));
        }
    }

    pub fn format_index(&self, key: &str) -> Option<usize> {
        self.format.iter().position(|k| k == key)
    }

    /// Type one sample's FORMAT value. `GT` becomes a list of allele indices.
    pub fn sample_field(
        &self,
        sample: usize,
        key: &str,
        field_type: FieldType,
    ) -> Result<Option<RawField>, String> {
        let raw = self
            .format_index(key)
            .and_then(|i| self.samples.get(sample)?.get(i));
        match raw {
            None => Ok(None),
            Some(raw) if key == "GT" => parse_genotype(raw).map(|gt| Some(RawField::Values(gt))),
            Some(raw) => field_type.parse_values(raw).map(Some),
        }
    }

    /// The END coordinate: INFO `END` when present, otherwise derived from REF.
    pub fn stop(&self) -> i64 {
        self.info_raw("END")
            .flatten()
            .and_then(|end| end.parse::<i64>().ok())
            .unwrap_or(self.pos + self.reference.len() as i64 - 1)
    }

    /// Breakend records: `SVTYPE=BND` or a bracketed ALT such as `G]17:198982]`.
    pub fn is_breakend(&self) -> bool {
        self.info_raw("SVTYPE").flatten() == Some("BND")
            || self.alt.iter().any(|alt| alt.contains(['[', ']']))
    }

    /// Add a FILTER tag, dropping PASS.
    pub fn add_filter(&mut self, tag: &str) {
        self.filter.retain(|f| f != "PASS");
        if !self.filter.iter().any(|f| f == tag) {
            self.filter.push(tag.to_string());
        }
    }
}

/// Parse a genotype like `0/1` or `1|.` into allele indices, NA for `.`.
pub fn parse_genotype(raw: &str) -> Result<Vec<Value>, String> {
    raw.split(['/', '|'])
        .map(|allele| match allele {
            "." => Ok(Value::Na),
            allele => allele
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{}' is not a valid genotype", raw)),
        })
        .collect()
}

fn join_or_missing(values: &[String], separator: &str) -> String {
    if values.is_empty() {
        ".".to_string()
    } else {
        values.join(separator)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info: Vec<String> = self
            .info
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{}={}", key, value),
                None => key.clone(),
            })
            .collect();
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.pos,
            self.id.as_deref().unwrap_or("."),
            self.reference,
            join_or_missing(&self.alt, ","),
            self.qual
                .map(|q| q.to_string())
                .unwrap_or_else(|| ".".to_string()),
            join_or_missing(&self.filter, ";"),
            join_or_missing(&info, ";"),
        )?;
        if !self.format.is_empty() {
            write!(f, "\t{}", self.format.join(":"))?;
            for sample in &self.samples {
                write!(f, "\t{}", join_or_missing(sample, ":"))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_header() -> Header {
        Header::new(
            vec![
                HeaderLine::Meta {
                    key: "fileformat".to_string(),
                    value: "VCFv4.2".to_string(),
                },
                HeaderLine::Info(FieldInfo::new(
                    "DP",
                    Number::Fixed(1),
                    FieldType::Integer,
                    "Depth",
                )),
                HeaderLine::Format(FieldInfo::new(
                    "GT",
                    Number::Fixed(1),
                    FieldType::String,
                    "Genotype",
                )),
                HeaderLine::Filter {
                    id: "PASS".to_string(),
                    description: "All filters passed".to_string(),
                },
            ],
            vec!["s1".to_string(), "s2".to_string()],
        )
    }

    #[test]
    fn test_header_lookup() {
        let header = test_header();
        assert_eq!(header.info("DP").map(|f| f.number), Some(Number::Fixed(1)));
        assert!(header.info("AF").is_none());
        assert!(header.format("GT").is_some());
        assert!(header.has_filter("PASS"));
        assert_eq!(header.meta("fileformat"), Some("VCFv4.2"));
        assert_eq!(header.sample_index("s2"), Some(1));
    }

    #[test]
    fn test_add_filter_rejects_duplicates() {
        let mut header = test_header();
        header.add_filter("LowQual", "QUAL < 20").unwrap();
        assert!(matches!(
            header.add_filter("LowQual", "again"),
            Err(EngineError::FilterAlreadyDefined(tag)) if tag == "LowQual"
        ));
    }

    #[test]
    fn test_number_overrides() {
        let mut header = test_header();
        header.set_info_number("DP", Number::Unbounded).unwrap();
        assert_eq!(header.info("DP").unwrap().number, Number::Unbounded);

        assert!(matches!(
            header.set_info_number("DP", Number::PerGenotype),
            Err(EngineError::InvalidNumber { .. })
        ));
        assert!(matches!(
            header.set_format_number("AD", Number::PerAllele),
            Err(EngineError::UnknownOverrideField { section: "FORMAT", .. })
        ));
    }

    #[test]
    fn test_header_line_display() {
        let line = HeaderLine::Info(FieldInfo::new(
            "AF",
            Number::PerAlt,
            FieldType::Float,
            "Allele \"frequency\"",
        ));
        assert_eq!(
            line.to_string(),
            "##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele \\\"frequency\\\"\">"
        );
    }

    #[test]
    fn test_record_info_access() {
        let header = test_header();
        let record = Record::new("chr1", 100, "A")
            .with_alt("G")
            .with_info("DP", Some("12"))
            .with_info("DB", None);

        let dp = record.info_field(header.info("DP").unwrap()).unwrap();
        assert_eq!(dp, Some(RawField::Values(vec![Value::Int(12)])));
        assert_eq!(record.info_raw("DB"), Some(None));
        assert_eq!(record.info_raw("XX"), None);
    }

    #[test]
    fn test_record_stop() {
        let record = Record::new("chr1", 100, "ACG");
        assert_eq!(record.stop(), 102);
        let record = record.with_info("END", Some("150"));
        assert_eq!(record.stop(), 150);
    }

    #[test]
    fn test_breakend_detection() {
        assert!(Record::new("2", 321681, "G").with_alt("G]17:198982]").is_breakend());
        assert!(Record::new("2", 321681, "G")
            .with_alt("<BND>")
            .with_info("SVTYPE", Some("BND"))
            .is_breakend());
        assert!(!Record::new("2", 321681, "G")
            .with_alt("<DEL>")
            .with_info("SVTYPE", Some("DEL"))
            .is_breakend());
        assert!(!Record::new("2", 321681, "G").with_alt("A").is_breakend());
    }

    #[test]
    fn test_genotype_parsing() {
        assert_eq!(
            parse_genotype("0/1").unwrap(),
            vec![Value::Int(0), Value::Int(1)]
        );
        let missing = parse_genotype("./.").unwrap();
        assert!(missing.iter().all(Value::is_na));
        assert!(parse_genotype("a/b").is_err());
    }

    #[test]
    fn test_annotations_round_trip_through_info() {
        let mut record = Record::new("chr1", 1, "A").with_info("ANN", Some("a|b,c|d"));
        assert_eq!(
            record.annotations("ANN"),
            Some(vec!["a|b".to_string(), "c|d".to_string()])
        );
        record.set_annotations("ANN", &["c|d".to_string()]);
        assert_eq!(record.info_raw("ANN"), Some(Some("c|d")));
        record.set_annotations("ANN", &[]);
        assert_eq!(record.annotations("ANN"), None);
    }

    #[test]
    fn test_record_display() {
        let mut record = Record::new("chr1", 100, "A")
            .with_alt("G")
            .with_qual(40.0)
            .with_info("DP", Some("12"))
            .with_samples(&["GT", "DP"], &[vec!["0/1", "5"]]);
        record.add_filter("PASS");
        record.add_filter("LowDP");
        assert_eq!(
            record.to_string(),
            "chr1\t100\t.\tA\tG\t40\tLowDP\tDP=12\tGT:DP\t0/1:5"
        );
    }
}
