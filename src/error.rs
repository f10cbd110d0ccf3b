//! Engine error taxonomy.
//!
//! Every error that can surface while compiling or evaluating an expression
//! is a distinct variant, so drivers and tests can match on the exact failure.

use crate::expression::EvalError;
use std::fmt;
use thiserror::Error;

/// Identifies the record an error occurred in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub index: usize,
    pub text: String,
}

impl RecordRef {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.index)
        } else {
            write!(f, "{}:\n{}", self.index, self.text)
        }
    }
}

/// Errors raised by the expression engine and its collaborators.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No INFO field '{field}' in record {record}")]
    UnknownInfoField { field: String, record: RecordRef },

    #[error("No FORMAT field '{field}' in record {record}")]
    UnknownFormatField { field: String, record: RecordRef },

    #[error("No sample with name '{sample}' in record {record}")]
    UnknownSample { sample: String, record: RecordRef },

    #[error("No annotation entry for '{field}' in record {record}")]
    UnknownAnnotationField { field: String, record: RecordRef },

    #[error(
        "Annotation field '{field}' is expected at position {position}, \
         but the annotation has only {available} parts, in record {record}"
    )]
    MalformedAnnotation {
        field: String,
        position: usize,
        available: usize,
        record: RecordRef,
    },

    #[error(
        "Only records with one alternative allele are supported, found {count} in record {record}\n\
         Please split multi-allelic records first, for example with `bcftools norm -m-any`"
    )]
    MoreThanOneAltAllele { count: usize, record: RecordRef },

    #[error("Expected exactly one value for field '{field}', found {count} in record {record}")]
    NotExactlyOneValue {
        field: String,
        count: usize,
        record: RecordRef,
    },

    #[error("The provided expression '{expression}' is invalid. Reason: {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error(
        "The expression evaluated to '{value}' of type {type_name}, expected a boolean, in record {record}"
    )]
    NonBoolTypeError {
        value: String,
        type_name: &'static str,
        record: RecordRef,
    },

    #[error("Cannot convert '{raw}' of annotation field '{field}': {reason}, in record {record}")]
    AnnotationConversion {
        field: String,
        raw: String,
        reason: String,
        record: RecordRef,
    },

    #[error("Invalid value for field '{field}': {message}, in record {record}")]
    InvalidFieldValue {
        field: String,
        message: String,
        record: RecordRef,
    },

    #[error("{source} in record {record}")]
    Evaluation { source: EvalError, record: RecordRef },

    #[error("Term '{0}' not found in the ontology")]
    UnknownTerm(String),

    #[error("The expression queries the ontology, but no ontology was loaded")]
    OntologyUnavailable,

    #[error("No auxiliary table named '{0}'")]
    UnknownAuxiliary(String),

    #[error("Cannot overwrite the number of unknown {section} field '{field}'")]
    UnknownOverrideField { section: &'static str, field: String },

    #[error("Invalid number specification '{value}': {reason}")]
    InvalidNumber { value: String, reason: String },

    #[error("Filter '{0}' is already defined in the header")]
    FilterAlreadyDefined(String),

    #[error("The table header names {names} columns, but the expression yields {columns}")]
    TableHeaderMismatch { names: usize, columns: usize },

    #[error(
        "Filtering of BND records with multiple mates is unsupported \
         (see VCF 4.3, section 5.4.3 'Multiple mates'), in record {record}"
    )]
    MultipleMates { record: RecordRef },

    #[error("Column '{column}' not found in annotation data {path}")]
    UnknownColumn { column: String, path: String },

    #[error("Cannot store '{value}' in INFO field '{field}': {reason}, in record {record}")]
    AnnotationValue {
        field: String,
        value: String,
        reason: String,
        record: RecordRef,
    },

    #[error("Malformed input at line {line}: {message}")]
    MalformedInput { line: usize, message: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
