//! Drivers that stream records through compiled expressions.
//!
//! Every driver follows the Volcano iterator model: it pulls records from a
//! child [`RecordSource`] one at a time and produces records (or table rows)
//! on demand. The sort driver is the exception, it materializes its input
//! before yielding the first record.
//!
//! [`RecordSource`]: crate::record::RecordSource

use crate::auxiliary::Auxiliary;
use crate::config::EngineConfig;
use crate::environment::RecordEnvironment;
use crate::error::EngineResult;
use crate::expression::{compile_with_variables, Builtins, CompiledExpression};
use crate::ontology::Ontology;
use crate::record::Header;
use std::sync::Arc;

pub mod annotate;
pub mod filter;
pub mod sort;
pub mod statistics;
pub mod table;
pub mod tag;

pub use annotate::{AnnotateConfig, AnnotateDriver, IntervalTable};
pub use filter::FilterDriver;
pub use sort::SortDriver;
pub use statistics::{FieldStatistics, StatisticsCollector};
pub use table::{TableDriver, TableFormat, TableHeader, TableWriter};
pub use tag::{Tag, TagDriver, TagMode};

/// Shared, immutable state every driver needs: the builtin registry, the
/// annotation key and the optional side tables.
#[derive(Clone)]
pub struct Engine {
    annotation_key: String,
    builtins: Arc<Builtins>,
    ontology: Option<Arc<Ontology>>,
    auxiliary: Arc<Auxiliary>,
    /// Names bound by a driver rather than by the record
    variables: Vec<String>,
}

impl Engine {
    pub fn new(annotation_key: &str) -> Self {
        Self {
            annotation_key: annotation_key.to_string(),
            builtins: Arc::new(Builtins::new()),
            ontology: None,
            auxiliary: Arc::new(Auxiliary::new()),
            variables: Vec::new(),
        }
    }

    /// Load the ontology and auxiliary tables named by `config`.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let mut engine = Self::new(&config.annotation_key).with_auxiliary(config.load_auxiliary()?);
        if let Some(ontology) = config.load_ontology()? {
            log::debug!("Loaded ontology with {} terms", ontology.len());
            engine = engine.with_ontology(ontology);
        }
        Ok(engine)
    }

    pub fn with_ontology(mut self, ontology: Ontology) -> Self {
        self.ontology = Some(Arc::new(ontology));
        self
    }

    pub fn with_auxiliary(mut self, auxiliary: Auxiliary) -> Self {
        self.auxiliary = Arc::new(auxiliary);
        self
    }

    /// Allow expressions to reference `name`; the driver binds its value.
    pub fn with_variable(mut self, name: &str) -> Self {
        self.variables.push(name.to_string());
        self
    }

    pub fn annotation_key(&self) -> &str {
        &self.annotation_key
    }

    pub fn compile(&self, source: &str) -> EngineResult<CompiledExpression> {
        compile_with_variables(source, &self.annotation_key, &self.builtins, &self.variables)
    }

    /// A fresh environment for records described by `header`.
    pub fn environment(&self, header: Arc<Header>) -> RecordEnvironment {
        let env = RecordEnvironment::new(header, &self.annotation_key, self.builtins.clone())
            .with_auxiliary(self.auxiliary.clone());
        match &self.ontology {
            Some(ontology) => env.with_ontology(ontology.clone()),
            None => env,
        }
    }
}

/// Record the program version and invocation in `header`.
pub fn add_provenance(header: &mut Header, command: &str) {
    header.add_meta("vcfsieveVersion", env!("CARGO_PKG_VERSION"));
    header.add_meta("vcfsieveCmd", command);
}

/// Annotation entries of the active record; empty when it has none.
fn annotation_entries(env: &RecordEnvironment) -> Vec<String> {
    env.record()
        .annotations(env.annotation_key())
        .unwrap_or_default()
}
