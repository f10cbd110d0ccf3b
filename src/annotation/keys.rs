use crate::annotation::types::Producer;
use crate::record::Header;

/// Ordered sub-field names of the annotation field, derived from its header
/// description.
///
/// The position of a name in this list is the position of the corresponding
/// `|`-separated part in every annotation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationKeySet {
    producer: Producer,
    names: Vec<String>,
}

impl AnnotationKeySet {
    pub fn new(producer: Producer, names: Vec<String>) -> Self {
        Self { producer, names }
    }

    /// Detect the producer and extract the sub-field names.
    ///
    /// A generic `##VEP=` header line marks VEP output; anything else is read
    /// as SnpEff. A missing annotation field yields an empty key set.
    pub fn from_header(header: &Header, annotation_key: &str) -> Self {
        let producer = if header.meta("VEP").is_some() {
            Producer::Vep
        } else {
            Producer::SnpEff
        };

        let names = header
            .info(annotation_key)
            .and_then(|info| {
                info.description
                    .split(producer.description_separator())
                    .nth(1)
                    .map(|fields| {
                        fields
                            .split('|')
                            .map(|name| name.trim().to_string())
                            .collect()
                    })
            })
            .unwrap_or_default();

        Self { producer, names }
    }

    pub fn producer(&self) -> Producer {
        self.producer
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
