pub mod annotation;
pub mod auxiliary;
pub mod cardinality;
pub mod config;
pub mod driver;
pub mod environment;
pub mod error;
pub mod expression;
pub mod ontology;
pub mod record;
pub mod value;
