//! Tag driver: adds FILTER tags instead of dropping records.

use super::{annotation_entries, Engine};
use crate::environment::RecordEnvironment;
use crate::error::EngineResult;
use crate::expression::CompiledExpression;
use crate::record::{Header, Record, RecordSource};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which expression outcome earns a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMode {
    /// Tag records for which the expression is true
    #[default]
    Pass,
    /// Tag records for which the expression is false
    Fail,
}

impl FromStr for TagMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" | "p" => Ok(TagMode::Pass),
            "fail" | "f" => Ok(TagMode::Fail),
            other => Err(format!("unknown tag mode '{}', expected pass or fail", other)),
        }
    }
}

impl fmt::Display for TagMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagMode::Pass => write!(f, "pass"),
            TagMode::Fail => write!(f, "fail"),
        }
    }
}

/// A FILTER tag and the expression deciding it.
#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    pub expression: CompiledExpression,
}

impl Tag {
    pub fn new(name: impl Into<String>, expression: CompiledExpression) -> Self {
        Self {
            name: name.into(),
            expression,
        }
    }
}

pub struct TagDriver<S> {
    source: S,
    header: Arc<Header>,
    tags: Vec<Tag>,
    mode: TagMode,
    env: RecordEnvironment,
    index: usize,
}

impl<S: RecordSource> TagDriver<S> {
    /// Register every tag as a FILTER header line. Tag names already
    /// defined by the input are rejected.
    pub fn new(source: S, engine: &Engine, tags: Vec<Tag>, mode: TagMode) -> EngineResult<Self> {
        let mut header = source.header().clone();
        for tag in &tags {
            header.add_filter(&tag.name, tag.expression.source())?;
        }
        let header = Arc::new(header);
        let env = engine.environment(header.clone());

        Ok(Self {
            source,
            header,
            tags,
            mode,
            env,
            index: 0,
        })
    }

    /// Annotation-scoped tags hold if any annotation entry satisfies them.
    fn holds(env: &mut RecordEnvironment, expression: &CompiledExpression) -> EngineResult<bool> {
        if !expression.is_annotation_scoped() {
            return expression.is_true(env);
        }

        let entries = annotation_entries(env);
        if entries.is_empty() {
            env.load_empty_annotation();
            return expression.is_true(env);
        }
        for entry in &entries {
            env.load_annotation(entry);
            if expression.is_true(env)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn evaluate(&mut self, record: Record) -> EngineResult<Record> {
        self.env.load_record(self.index, record);
        self.index += 1;

        let mut earned = Vec::new();
        for tag in &self.tags {
            let holds = Self::holds(&mut self.env, &tag.expression)?;
            if holds == (self.mode == TagMode::Pass) {
                earned.push(tag.name.as_str());
            }
        }

        let mut record = self.env.take_record();
        for name in earned {
            record.add_filter(name);
        }
        Ok(record)
    }
}

impl<S: RecordSource> RecordSource for TagDriver<S> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_record(&mut self) -> EngineResult<Option<Record>> {
        match self.source.next_record()? {
            Some(record) => self.evaluate(record).map(Some),
            None => Ok(None),
        }
    }
}
