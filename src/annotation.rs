//! Variant effect annotations (SnpEff `ANN`, VEP `CSQ`).
//!
//! This module provides:
//! - Static per-producer tables typing each known sub-field
//! - Sub-field name extraction from the header description
//! - A positional decoder for single annotation entries

pub mod decoder;
pub mod keys;
pub mod types;

pub use decoder::{AnnotationDecoder, DecodeError};
pub use keys::AnnotationKeySet;
pub use types::{lookup, AnnotationFieldSpec, FieldKind, Producer};
