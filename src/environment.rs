//! Per-record evaluation environment.
//!
//! The environment owns the active record and, for annotation-scoped
//! expressions, the active annotation entry. Special identifiers are resolved
//! on first access and cached until the next record is loaded; annotation
//! sub-fields are cached until the next annotation entry is loaded.

use crate::annotation::{AnnotationDecoder, AnnotationKeySet};
use crate::auxiliary::Auxiliary;
use crate::cardinality::{type_field, Number};
use crate::error::{EngineError, EngineResult, RecordRef};
use crate::expression::builtins::Builtins;
use crate::expression::EvalError;
use crate::ontology::Ontology;
use crate::record::{FieldType, Header, Record};
use crate::value::Value;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Identifiers bound to the active record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Chrom,
    Pos,
    End,
    Id,
    Ref,
    Alt,
    Qual,
    Filter,
    Info,
    Format,
    Samples,
    Index,
    Aux,
    So,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::Chrom,
        Field::Pos,
        Field::End,
        Field::Id,
        Field::Ref,
        Field::Alt,
        Field::Qual,
        Field::Filter,
        Field::Info,
        Field::Format,
        Field::Samples,
        Field::Index,
        Field::Aux,
        Field::So,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Chrom => "CHROM",
            Field::Pos => "POS",
            Field::End => "END",
            Field::Id => "ID",
            Field::Ref => "REF",
            Field::Alt => "ALT",
            Field::Qual => "QUAL",
            Field::Filter => "FILTER",
            Field::Info => "INFO",
            Field::Format => "FORMAT",
            Field::Samples => "SAMPLES",
            Field::Index => "INDEX",
            Field::Aux => "AUX",
            Field::So => "SO",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|field| field.name() == name)
    }
}

/// What an identifier (or a subscript of one) resolves to.
///
/// Only `Value` is a first-class value; the other variants are lookup
/// handles that support subscripting and membership tests.
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    Info,
    Format,
    /// `FORMAT['field']`, indexed by sample name.
    FormatField(String),
    Annotation,
    Aux,
    /// `AUX['name']`
    AuxTable(String),
    Ontology,
}

impl Binding {
    pub fn describe(&self) -> String {
        match self {
            Binding::Value(value) => value.type_name().to_string(),
            Binding::Info => "INFO".to_string(),
            Binding::Format => "FORMAT".to_string(),
            Binding::FormatField(field) => format!("FORMAT['{}']", field),
            Binding::Annotation => "annotation".to_string(),
            Binding::Aux => "AUX".to_string(),
            Binding::AuxTable(name) => format!("AUX['{}']", name),
            Binding::Ontology => "SO".to_string(),
        }
    }
}

pub struct RecordEnvironment {
    header: Arc<Header>,
    annotation_key: String,
    builtins: Arc<Builtins>,
    ontology: Option<Arc<Ontology>>,
    auxiliary: Arc<Auxiliary>,
    decoder: AnnotationDecoder,
    index: usize,
    record: Record,
    fields: HashMap<Field, Value>,
    info_cache: HashMap<String, Value>,
    format_cache: HashMap<(String, usize), Value>,
    regex_cache: HashMap<String, Regex>,
    /// Driver-provided names such as `DATA`
    variables: HashMap<String, Value>,
}

impl RecordEnvironment {
    pub fn new(header: Arc<Header>, annotation_key: &str, builtins: Arc<Builtins>) -> Self {
        let keys = AnnotationKeySet::from_header(&header, annotation_key);
        log::debug!(
            "Annotation field '{}' ({}) declares {} sub-fields",
            annotation_key,
            keys.producer().name(),
            keys.len()
        );

        let mut decoder = AnnotationDecoder::new(keys);
        decoder.load_placeholder();

        Self {
            header,
            annotation_key: annotation_key.to_string(),
            builtins,
            ontology: None,
            auxiliary: Arc::new(Auxiliary::new()),
            decoder,
            index: 0,
            record: Record::new("", 0, ""),
            fields: HashMap::new(),
            info_cache: HashMap::new(),
            format_cache: HashMap::new(),
            regex_cache: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    pub fn with_ontology(mut self, ontology: Arc<Ontology>) -> Self {
        self.ontology = Some(ontology);
        self
    }

    pub fn with_auxiliary(mut self, auxiliary: Arc<Auxiliary>) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn annotation_key(&self) -> &str {
        &self.annotation_key
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn annotation_keys(&self) -> &AnnotationKeySet {
        self.decoder.keys()
    }

    /// Make `record` the active record and drop every cached value.
    pub fn load_record(&mut self, index: usize, record: Record) {
        self.index = index;
        self.record = record;
        self.fields.clear();
        self.info_cache.clear();
        self.format_cache.clear();
        self.decoder.load_placeholder();
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    /// Hand the active record back, leaving an empty one in its place.
    pub fn take_record(&mut self) -> Record {
        self.fields.clear();
        self.info_cache.clear();
        self.format_cache.clear();
        std::mem::replace(&mut self.record, Record::new("", 0, ""))
    }

    /// Bind `name` to `value` until it is set again; survives record loads.
    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Make `raw` the active annotation entry.
    pub fn load_annotation(&mut self, raw: &str) {
        self.decoder.load(raw);
    }

    /// Activate the all-empty entry used for records without annotations.
    pub fn load_empty_annotation(&mut self) {
        self.decoder.load_placeholder();
    }

    pub fn record_ref(&self) -> RecordRef {
        RecordRef::new(self.index, self.record.to_string())
    }

    pub fn evaluation_error(&self, error: EvalError) -> EngineError {
        EngineError::Evaluation {
            source: error,
            record: self.record_ref(),
        }
    }

    /// Whether `name` is bound by the environment itself.
    pub fn is_bound(&self, name: &str) -> bool {
        name == self.annotation_key
            || self.variables.contains_key(name)
            || Field::from_name(name).is_some()
    }

    pub fn resolve(&mut self, name: &str) -> EngineResult<Binding> {
        if let Some(value) = self.variables.get(name) {
            return Ok(Binding::Value(value.clone()));
        }
        if name == self.annotation_key {
            return Ok(Binding::Annotation);
        }
        let field = Field::from_name(name).ok_or_else(|| {
            self.evaluation_error(EvalError::UnknownName {
                name: name.to_string(),
            })
        })?;

        match field {
            Field::Info => Ok(Binding::Info),
            Field::Format => Ok(Binding::Format),
            Field::Aux => Ok(Binding::Aux),
            Field::So => self.ontology().map(|_| Binding::Ontology),
            field => {
                if let Some(value) = self.fields.get(&field) {
                    return Ok(Binding::Value(value.clone()));
                }
                let value = self.field_value(field)?;
                self.fields.insert(field, value.clone());
                Ok(Binding::Value(value))
            }
        }
    }

    fn field_value(&self, field: Field) -> EngineResult<Value> {
        let record = &self.record;
        Ok(match field {
            Field::Chrom => Value::str(record.chrom.as_str()),
            Field::Pos => Value::Int(record.pos),
            Field::End => Value::Int(record.stop()),
            Field::Id => record.id.clone().map(Value::Str).unwrap_or(Value::Na),
            Field::Ref => Value::str(record.reference.as_str()),
            Field::Alt => match record.alt.as_slice() {
                [] => Value::Na,
                [alt] => Value::str(alt.as_str()),
                alts => {
                    return Err(EngineError::MoreThanOneAltAllele {
                        count: alts.len(),
                        record: self.record_ref(),
                    })
                }
            },
            Field::Qual => record.qual.map(Value::from_f32).unwrap_or(Value::Na),
            Field::Filter => Value::List(record.filter.iter().cloned().map(Value::Str).collect()),
            Field::Samples => Value::List(
                self.header
                    .samples()
                    .iter()
                    .cloned()
                    .map(Value::Str)
                    .collect(),
            ),
            Field::Index => Value::Int(self.index as i64),
            Field::Info | Field::Format | Field::Aux | Field::So => Value::Na,
        })
    }

    /// `INFO[field]`
    pub fn info_value(&mut self, field: &str) -> EngineResult<Value> {
        if let Some(value) = self.info_cache.get(field) {
            return Ok(value.clone());
        }

        let info = match self.header.info(field) {
            Some(info) if field != self.annotation_key => info,
            _ => {
                return Err(EngineError::UnknownInfoField {
                    field: field.to_string(),
                    record: self.record_ref(),
                })
            }
        };

        let raw = self
            .record
            .info_field(info)
            .map_err(|message| EngineError::InvalidFieldValue {
                field: field.to_string(),
                message,
                record: self.record_ref(),
            })?;
        let value = type_field(raw.as_ref(), info.number)
            .map_err(|violation| violation.into_error(field, self.record_ref()))?;

        self.info_cache.insert(field.to_string(), value.clone());
        Ok(value)
    }

    /// `field in INFO`: declared, present and not NA.
    pub fn info_contains(&mut self, field: &str) -> EngineResult<bool> {
        if field == self.annotation_key
            || self.header.info(field).is_none()
            || self.record.info_raw(field).is_none()
        {
            return Ok(false);
        }
        Ok(!self.info_value(field)?.is_na())
    }

    /// `FORMAT[field]` must name a field of the record's FORMAT column.
    pub fn check_format_field(&self, field: &str) -> EngineResult<()> {
        match self.record.format_index(field) {
            Some(_) => Ok(()),
            None => Err(EngineError::UnknownFormatField {
                field: field.to_string(),
                record: self.record_ref(),
            }),
        }
    }

    pub fn format_contains(&self, field: &str) -> bool {
        self.record.format_index(field).is_some()
    }

    /// `FORMAT[field][sample]`
    pub fn format_value(&mut self, field: &str, sample: &str) -> EngineResult<Value> {
        self.check_format_field(field)?;
        let sample_index =
            self.header
                .sample_index(sample)
                .ok_or_else(|| EngineError::UnknownSample {
                    sample: sample.to_string(),
                    record: self.record_ref(),
                })?;

        let key = (field.to_string(), sample_index);
        if let Some(value) = self.format_cache.get(&key) {
            return Ok(value.clone());
        }

        let (number, field_type) = match self.header.format(field) {
            _ if field == "GT" => (Number::Unbounded, FieldType::String),
            Some(info) => (info.number, info.field_type),
            None => (Number::Unbounded, FieldType::String),
        };
        let raw = self
            .record
            .sample_field(sample_index, field, field_type)
            .map_err(|message| EngineError::InvalidFieldValue {
                field: field.to_string(),
                message,
                record: self.record_ref(),
            })?;
        let value = type_field(raw.as_ref(), number)
            .map_err(|violation| violation.into_error(field, self.record_ref()))?;

        self.format_cache.insert(key, value.clone());
        Ok(value)
    }

    /// `sample in FORMAT[field]`: a known sample with a non-NA value.
    pub fn format_sample_contains(&mut self, field: &str, sample: &str) -> EngineResult<bool> {
        if self.header.sample_index(sample).is_none() {
            return Ok(false);
        }
        Ok(!self.format_value(field, sample)?.is_na())
    }

    /// `ANN[field]` for the active annotation entry.
    pub fn annotation_value(&mut self, field: &str) -> EngineResult<Value> {
        self.decoder
            .get(field)
            .map_err(|error| error.into_error(field, self.record_ref()))
    }

    pub fn annotation_contains(&mut self, field: &str) -> bool {
        self.decoder.contains(field)
    }

    pub fn aux_exists(&self, name: &str) -> bool {
        self.auxiliary.contains(name)
    }

    pub fn check_aux(&self, name: &str) -> EngineResult<()> {
        self.auxiliary.get(name).map(|_| ())
    }

    pub fn aux_contains(&self, name: &str, entry: &str) -> EngineResult<bool> {
        Ok(self.auxiliary.get(name)?.contains(entry))
    }

    /// The entries of an auxiliary table as a sorted list.
    pub fn aux_values(&self, name: &str) -> EngineResult<Value> {
        let mut entries: Vec<&String> = self.auxiliary.get(name)?.iter().collect();
        entries.sort();
        Ok(Value::List(
            entries.into_iter().cloned().map(Value::Str).collect(),
        ))
    }

    pub fn ontology(&self) -> EngineResult<&Ontology> {
        self.ontology
            .as_deref()
            .ok_or(EngineError::OntologyUnavailable)
    }

    /// Compile `pattern` once per environment.
    pub fn regex(&mut self, pattern: &str) -> EngineResult<&Regex> {
        if !self.regex_cache.contains_key(pattern) {
            let regex = Regex::new(pattern).map_err(|error| {
                self.evaluation_error(EvalError::InvalidRegex {
                    pattern: pattern.to_string(),
                    message: error.to_string(),
                })
            })?;
            self.regex_cache.insert(pattern.to_string(), regex);
        }
        Ok(&self.regex_cache[pattern])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldInfo, HeaderLine};

    fn header() -> Header {
        Header::new(
            vec![
                HeaderLine::Info(FieldInfo::new("DP", Number::Fixed(1), FieldType::Integer, "")),
                HeaderLine::Info(FieldInfo::new("AF", Number::PerAlt, FieldType::Float, "")),
                HeaderLine::Info(FieldInfo::new("DB", Number::Fixed(0), FieldType::Flag, "")),
                HeaderLine::Info(FieldInfo::new(
                    "ANN",
                    Number::Unbounded,
                    FieldType::String,
                    "Functional annotations: 'Allele | Annotation_Impact | Gene_Name'",
                )),
                HeaderLine::Format(FieldInfo::new("GT", Number::Fixed(1), FieldType::String, "")),
                HeaderLine::Format(FieldInfo::new("DP", Number::Fixed(1), FieldType::Integer, "")),
            ],
            vec!["S1".to_string(), "S2".to_string()],
        )
    }

    fn environment() -> RecordEnvironment {
        RecordEnvironment::new(Arc::new(header()), "ANN", Arc::new(Builtins::new()))
    }

    fn value(binding: Binding) -> Value {
        match binding {
            Binding::Value(value) => value,
            other => panic!("expected a value, got {}", other.describe()),
        }
    }

    fn record() -> Record {
        Record::new("chr1", 100, "A")
            .with_alt("G")
            .with_qual(40.0)
            .with_info("DP", Some("12"))
            .with_info("AF", Some("0.6"))
            .with_info("ANN", Some("G|HIGH|BRCA1"))
            .with_samples(&["GT", "DP"], &[vec!["0/1", "7"], vec!["./.", "."]])
    }

    #[test]
    fn test_resolve_fields() {
        let mut env = environment();
        env.load_record(3, record());

        assert_eq!(value(env.resolve("CHROM").unwrap()), Value::str("chr1"));
        assert_eq!(value(env.resolve("POS").unwrap()), Value::Int(100));
        assert_eq!(value(env.resolve("END").unwrap()), Value::Int(100));
        assert_eq!(value(env.resolve("ALT").unwrap()), Value::str("G"));
        assert_eq!(value(env.resolve("QUAL").unwrap()), Value::Float(40.0));
        assert_eq!(value(env.resolve("INDEX").unwrap()), Value::Int(3));
        assert!(value(env.resolve("ID").unwrap()).is_na());
        assert_eq!(
            value(env.resolve("SAMPLES").unwrap()),
            Value::List(vec![Value::str("S1"), Value::str("S2")])
        );
        assert!(matches!(env.resolve("ANN").unwrap(), Binding::Annotation));
        assert!(matches!(env.resolve("INFO").unwrap(), Binding::Info));
        assert!(env.resolve("open").is_err());
    }

    #[test]
    fn test_alt_with_two_alleles() {
        let mut env = environment();
        env.load_record(0, record().with_alt("T"));
        assert!(matches!(
            env.resolve("ALT"),
            Err(EngineError::MoreThanOneAltAllele { count: 2, .. })
        ));
        assert_eq!(value(env.resolve("REF").unwrap()), Value::str("A"));
    }

    #[test]
    fn test_info_access() {
        let mut env = environment();
        env.load_record(0, record());

        assert_eq!(env.info_value("DP").unwrap(), Value::Int(12));
        assert_eq!(env.info_value("AF").unwrap(), Value::Float(0.6f32 as f64));
        assert_eq!(env.info_value("DB").unwrap(), Value::Bool(false));
        assert!(matches!(
            env.info_value("XX"),
            Err(EngineError::UnknownInfoField { .. })
        ));
        assert!(matches!(
            env.info_value("ANN"),
            Err(EngineError::UnknownInfoField { .. })
        ));

        assert!(env.info_contains("DP").unwrap());
        assert!(!env.info_contains("DB").unwrap());
        assert!(!env.info_contains("XX").unwrap());
    }

    #[test]
    fn test_format_access() {
        let mut env = environment();
        env.load_record(0, record());

        assert_eq!(
            env.format_value("GT", "S1").unwrap(),
            Value::List(vec![Value::Int(0), Value::Int(1)])
        );
        assert_eq!(env.format_value("DP", "S1").unwrap(), Value::Int(7));
        assert!(env.format_value("DP", "S2").unwrap().is_na());
        assert!(matches!(
            env.format_value("AD", "S1"),
            Err(EngineError::UnknownFormatField { .. })
        ));
        assert!(matches!(
            env.format_value("DP", "S3"),
            Err(EngineError::UnknownSample { .. })
        ));
        assert!(env.format_sample_contains("DP", "S1").unwrap());
        assert!(!env.format_sample_contains("DP", "S2").unwrap());
    }

    #[test]
    fn test_annotation_access() {
        let mut env = environment();
        env.load_record(0, record());
        env.load_annotation("G|HIGH|BRCA1");
        assert_eq!(env.annotation_value("Gene_Name").unwrap(), Value::str("BRCA1"));
        assert!(matches!(
            env.annotation_value("SYMBOL"),
            Err(EngineError::UnknownAnnotationField { .. })
        ));

        env.load_empty_annotation();
        assert!(env.annotation_value("Gene_Name").unwrap().is_na());
    }

    #[test]
    fn test_caches_reset_per_record() {
        let mut env = environment();
        env.load_record(0, record());
        assert_eq!(env.info_value("DP").unwrap(), Value::Int(12));
        env.load_record(1, record().with_info("DP", Some("30")));
        assert_eq!(env.info_value("DP").unwrap(), Value::Int(30));
        assert_eq!(env.take_record().pos, 100);
    }

    #[test]
    fn test_ontology_unavailable() {
        let mut env = environment();
        assert!(matches!(
            env.resolve("SO"),
            Err(EngineError::OntologyUnavailable)
        ));
    }
}
