//! Genotype classification helpers.
//!
//! A genotype is the list of allele indices of a sample's `GT` value, NA for
//! a missing allele. Missing alleles take part in the distinct-allele count,
//! so `./.` is homozygous (but neither homozygous reference nor alternate).

use crate::environment::RecordEnvironment;
use crate::error::EngineResult;
use crate::expression::error::EvalError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Genotype {
    alleles: Vec<Value>,
}

impl Genotype {
    pub fn new(alleles: Vec<Value>) -> Self {
        Self { alleles }
    }

    /// The genotype of `sample` in the active record; NA counts as no alleles.
    pub fn of_sample(env: &mut RecordEnvironment, sample: &str) -> EngineResult<Self> {
        let alleles = match env.format_value("GT", sample)? {
            Value::List(alleles) => alleles,
            Value::Na => Vec::new(),
            other => vec![other],
        };
        Ok(Self::new(alleles))
    }

    fn distinct(&self) -> Vec<&Value> {
        let mut distinct: Vec<&Value> = Vec::new();
        for allele in &self.alleles {
            if !distinct.iter().any(|seen| seen.identical(allele)) {
                distinct.push(allele);
            }
        }
        distinct
    }

    pub fn is_hom(&self) -> bool {
        self.distinct().len() == 1
    }

    pub fn is_het(&self) -> bool {
        self.distinct().len() > 1
    }

    pub fn is_hom_ref(&self) -> bool {
        self.is_hom() && self.has_ref()
    }

    pub fn is_hom_alt(&self) -> bool {
        match self.distinct().as_slice() {
            [allele] => is_alt(allele),
            _ => false,
        }
    }

    pub fn has_ref(&self) -> bool {
        self.alleles.iter().any(|allele| allele.as_i64() == Some(0))
    }

    pub fn has_alt(&self) -> bool {
        self.alleles.iter().any(is_alt)
    }
}

fn is_alt(allele: &Value) -> bool {
    matches!(allele, Value::Int(index) if *index > 0)
}

fn sample_argument(
    env: &RecordEnvironment,
    function: &str,
    args: &[Value],
) -> EngineResult<String> {
    match args {
        [Value::Str(sample)] => Ok(sample.clone()),
        [other] => Err(env.evaluation_error(EvalError::InvalidArgument {
            function: function.to_string(),
            message: format!("expected a sample name, got '{}'", other.type_name()),
        })),
        _ => Err(env.evaluation_error(EvalError::ArgumentCount {
            function: function.to_string(),
            expected: "1".to_string(),
            actual: args.len(),
        })),
    }
}

fn classify(
    env: &mut RecordEnvironment,
    function: &str,
    args: &[Value],
    predicate: fn(&Genotype) -> bool,
) -> EngineResult<Value> {
    let sample = sample_argument(env, function, args)?;
    let genotype = Genotype::of_sample(env, &sample)?;
    Ok(Value::Bool(predicate(&genotype)))
}

fn count(
    env: &mut RecordEnvironment,
    function: &str,
    args: &[Value],
    predicate: fn(&Genotype) -> bool,
) -> EngineResult<Value> {
    if !args.is_empty() {
        return Err(env.evaluation_error(EvalError::ArgumentCount {
            function: function.to_string(),
            expected: "0".to_string(),
            actual: args.len(),
        }));
    }
    let samples = env.header().samples().to_vec();
    let mut total = 0;
    for sample in &samples {
        if predicate(&Genotype::of_sample(env, sample)?) {
            total += 1;
        }
    }
    log::trace!(
        "{}() matched {} of {} samples",
        function,
        total,
        samples.len()
    );
    Ok(Value::Int(total))
}

pub fn is_hom(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    classify(env, "is_hom", args, Genotype::is_hom)
}

pub fn is_het(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    classify(env, "is_het", args, Genotype::is_het)
}

pub fn is_hom_ref(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    classify(env, "is_hom_ref", args, Genotype::is_hom_ref)
}

pub fn is_hom_alt(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    classify(env, "is_hom_alt", args, Genotype::is_hom_alt)
}

pub fn has_ref(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    classify(env, "has_ref", args, Genotype::has_ref)
}

pub fn has_alt(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    classify(env, "has_alt", args, Genotype::has_alt)
}

pub fn count_hom(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    count(env, "count_hom", args, Genotype::is_hom)
}

pub fn count_het(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    count(env, "count_het", args, Genotype::is_het)
}

pub fn count_hom_ref(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    count(env, "count_hom_ref", args, Genotype::is_hom_ref)
}

pub fn count_hom_alt(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    count(env, "count_hom_alt", args, Genotype::is_hom_alt)
}

pub fn count_any_ref(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    count(env, "count_any_ref", args, Genotype::has_ref)
}

pub fn count_any_var(env: &mut RecordEnvironment, args: &[Value]) -> EngineResult<Value> {
    count(env, "count_any_var", args, Genotype::has_alt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::Number;
    use crate::error::EngineError;
    use crate::expression::builtins::Builtins;
    use crate::record::{parse_genotype, FieldInfo, FieldType, Header, HeaderLine, Record};
    use std::sync::Arc;

    fn genotype(raw: &str) -> Genotype {
        Genotype::new(parse_genotype(raw).unwrap())
    }

    #[test]
    fn test_classification() {
        let hom_ref = genotype("0/0");
        assert!(hom_ref.is_hom() && hom_ref.is_hom_ref() && !hom_ref.is_hom_alt());
        assert!(hom_ref.has_ref() && !hom_ref.has_alt());

        let het = genotype("0|1");
        assert!(het.is_het() && !het.is_hom());
        assert!(het.has_ref() && het.has_alt());

        let hom_alt = genotype("2/2");
        assert!(hom_alt.is_hom() && hom_alt.is_hom_alt() && !hom_alt.is_hom_ref());

        let half_missing = genotype("./1");
        assert!(half_missing.is_het());
        assert!(half_missing.has_alt() && !half_missing.has_ref());
    }

    #[test]
    fn test_all_missing_genotype() {
        let missing = genotype("./.");
        assert!(missing.is_hom());
        assert!(!missing.is_het());
        assert!(!missing.is_hom_ref());
        assert!(!missing.is_hom_alt());
        assert!(!missing.has_ref());
        assert!(!missing.has_alt());

        let empty = Genotype::new(Vec::new());
        assert!(!empty.is_hom() && !empty.is_het());
    }

    fn environment() -> RecordEnvironment {
        let header = Header::new(
            vec![HeaderLine::Format(FieldInfo::new(
                "GT",
                Number::Fixed(1),
                FieldType::String,
                "",
            ))],
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        );
        let mut env = RecordEnvironment::new(Arc::new(header), "ANN", Arc::new(Builtins::new()));
        env.load_record(
            0,
            Record::new("chr1", 1, "A")
                .with_alt("T")
                .with_samples(&["GT"], &[vec!["0/1"], vec!["1/1"], vec!["./."]]),
        );
        env
    }

    #[test]
    fn test_sample_helpers() {
        let mut env = environment();
        assert_eq!(
            is_het(&mut env, &[Value::str("a")]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            is_hom_alt(&mut env, &[Value::str("b")]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            is_hom(&mut env, &[Value::str("c")]).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            is_het(&mut env, &[Value::str("nobody")]),
            Err(EngineError::UnknownSample { .. })
        ));
        assert!(matches!(
            is_het(&mut env, &[Value::Int(1)]),
            Err(EngineError::Evaluation { .. })
        ));
    }

    #[test]
    fn test_counters() {
        let mut env = environment();
        assert_eq!(count_het(&mut env, &[]).unwrap(), Value::Int(1));
        assert_eq!(count_hom(&mut env, &[]).unwrap(), Value::Int(2));
        assert_eq!(count_hom_alt(&mut env, &[]).unwrap(), Value::Int(1));
        assert_eq!(count_hom_ref(&mut env, &[]).unwrap(), Value::Int(0));
        assert_eq!(count_any_ref(&mut env, &[]).unwrap(), Value::Int(1));
        assert_eq!(count_any_var(&mut env, &[]).unwrap(), Value::Int(2));
    }
}
