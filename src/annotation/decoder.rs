use crate::annotation::keys::AnnotationKeySet;
use crate::annotation::types::{lookup, AnnotationFieldSpec};
use crate::error::{EngineError, RecordRef};
use crate::value::Value;
use std::collections::HashMap;

/// Why a sub-field of the loaded annotation could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The name is not part of the header's key set.
    UnknownField,
    /// The entry has fewer parts than the header declares.
    Malformed { position: usize, available: usize },
    Conversion { raw: String, reason: String },
}

impl DecodeError {
    pub fn into_error(self, field: &str, record: RecordRef) -> EngineError {
        let field = field.to_string();
        match self {
            DecodeError::UnknownField => EngineError::UnknownAnnotationField { field, record },
            DecodeError::Malformed {
                position,
                available,
            } => EngineError::MalformedAnnotation {
                field,
                position,
                available,
                record,
            },
            DecodeError::Conversion { raw, reason } => EngineError::AnnotationConversion {
                field,
                raw,
                reason,
                record,
            },
        }
    }
}

/// Decodes the sub-fields of one annotation entry at a time.
///
/// Decoded values are cached until the next entry is loaded.
pub struct AnnotationDecoder {
    keys: AnnotationKeySet,
    specs: HashMap<String, (usize, AnnotationFieldSpec)>,
    parts: Vec<String>,
    cache: HashMap<String, Value>,
}

impl AnnotationDecoder {
    pub fn new(keys: AnnotationKeySet) -> Self {
        let mut specs = HashMap::new();
        for (position, name) in keys.names().iter().enumerate() {
            let spec = lookup(keys.producer(), name);
            if !spec.is_known() {
                log::warn!(
                    "No type information available for annotation field '{}', defaulting to text",
                    name
                );
            }
            specs.entry(name.clone()).or_insert((position, spec));
        }

        Self {
            keys,
            specs,
            parts: Vec::new(),
            cache: HashMap::new(),
        }
    }

    pub fn keys(&self) -> &AnnotationKeySet {
        &self.keys
    }

    /// Load a raw `|`-separated annotation entry.
    pub fn load(&mut self, raw: &str) {
        self.parts = raw.split('|').map(str::to_string).collect();
        self.cache.clear();
    }

    /// Load an entry with every sub-field empty, for records without annotations.
    pub fn load_placeholder(&mut self) {
        self.parts = vec![String::new(); self.keys.len()];
        self.cache.clear();
    }

    pub fn get(&mut self, field: &str) -> Result<Value, DecodeError> {
        if let Some(value) = self.cache.get(field) {
            return Ok(value.clone());
        }

        let (position, spec) = self.specs.get(field).ok_or(DecodeError::UnknownField)?;
        let raw = self.parts.get(*position).ok_or(DecodeError::Malformed {
            position: *position,
            available: self.parts.len(),
        })?;
        let value = spec
            .convert(raw.trim())
            .map_err(|reason| DecodeError::Conversion {
                raw: raw.clone(),
                reason,
            })?;

        self.cache.insert(field.to_string(), value.clone());
        Ok(value)
    }

    /// Whether the field is known and holds a non-NA value.
    pub fn contains(&mut self, field: &str) -> bool {
        matches!(self.get(field), Ok(value) if !value.is_na())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::types::Producer;

    fn snpeff_decoder() -> AnnotationDecoder {
        let names = [
            "Allele",
            "Annotation",
            "Annotation_Impact",
            "Gene_Name",
            "cDNA.pos / cDNA.length",
            "ERRORS / WARNINGS / INFO",
        ];
        AnnotationDecoder::new(AnnotationKeySet::new(
            Producer::SnpEff,
            names.iter().map(|n| n.to_string()).collect(),
        ))
    }

    #[test]
    fn test_decode_fields() {
        let mut decoder = snpeff_decoder();
        decoder.load("G|missense_variant&splice_region_variant|HIGH| BRCA1 |10/200|");

        assert_eq!(decoder.get("Gene_Name").unwrap(), Value::str("BRCA1"));
        assert_eq!(
            decoder.get("Annotation").unwrap(),
            Value::Terms(vec![
                "missense_variant".to_string(),
                "splice_region_variant".to_string()
            ])
        );
        assert_eq!(
            decoder.get("cDNA.pos / cDNA.length").unwrap(),
            Value::PosRange {
                start: Some(10),
                end: Some(210)
            }
        );
        assert_eq!(
            decoder.get("ERRORS / WARNINGS / INFO").unwrap(),
            Value::List(vec![])
        );
        assert!(decoder.contains("Allele"));
    }

    #[test]
    fn test_unknown_field() {
        let mut decoder = snpeff_decoder();
        decoder.load("G|missense_variant|HIGH|BRCA1||");
        assert_eq!(decoder.get("Feature_ID"), Err(DecodeError::UnknownField));
        assert!(!decoder.contains("Feature_ID"));
    }

    #[test]
    fn test_short_annotation_is_malformed() {
        let mut decoder = snpeff_decoder();
        decoder.load("G|missense_variant");
        assert_eq!(decoder.get("Allele").unwrap(), Value::str("G"));
        assert_eq!(
            decoder.get("Gene_Name"),
            Err(DecodeError::Malformed {
                position: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_placeholder_yields_fallbacks() {
        let mut decoder = snpeff_decoder();
        decoder.load_placeholder();
        assert!(decoder.get("Annotation_Impact").unwrap().is_na());
        assert_eq!(decoder.get("Annotation").unwrap(), Value::Terms(vec![]));
        assert!(!decoder.contains("Gene_Name"));
    }

    #[test]
    fn test_cache_is_reset_on_load() {
        let mut decoder = snpeff_decoder();
        decoder.load("G|x|HIGH|BRCA1||");
        assert_eq!(decoder.get("Gene_Name").unwrap(), Value::str("BRCA1"));
        decoder.load("G|x|LOW|TP53||");
        assert_eq!(decoder.get("Gene_Name").unwrap(), Value::str("TP53"));
    }

    #[test]
    fn test_conversion_error() {
        let mut decoder = snpeff_decoder();
        decoder.load("G|x|HIGH|BRCA1|abc|");
        assert!(matches!(
            decoder.get("cDNA.pos / cDNA.length"),
            Err(DecodeError::Conversion { .. })
        ));
    }
}
