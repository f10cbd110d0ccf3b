//! Static annotation field tables for the SnpEff and VEP producers.

use crate::value::{coerce_f32, Value};
use std::collections::BTreeMap;

/// Tool that wrote the annotation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Producer {
    SnpEff,
    Vep,
}

impl Producer {
    /// Separator between the prose and the field list in the header description.
    pub fn description_separator(&self) -> char {
        match self {
            Producer::SnpEff => '\'',
            Producer::Vep => ':',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Producer::SnpEff => "SnpEff",
            Producer::Vep => "VEP",
        }
    }

    fn table(&self) -> &'static [(&'static str, FieldKind)] {
        match self {
            Producer::SnpEff => SNPEFF_FIELDS,
            Producer::Vep => VEP_FIELDS,
        }
    }

    fn other(&self) -> Producer {
        match self {
            Producer::SnpEff => Producer::Vep,
            Producer::Vep => Producer::SnpEff,
        }
    }
}

/// How the raw text of an annotation sub-field is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float32,
    /// True iff the raw text equals the marker.
    Flag(&'static str),
    List(&'static str),
    Consequences,
    /// SnpEff `pos/length`.
    PosRangeSnpEff,
    /// VEP `start-end`, where either side may be `?`, or a single position.
    PosRangeVep,
    /// VEP `n/total` or `start-end/total`.
    RangeTotal,
    /// VEP `prediction(score)`.
    PredictionScore,
    /// VEP `key:value&key:value`, values grouped per key.
    ListDict,
}

fn parse_int(raw: &str) -> Result<i64, String> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| format!("'{}' is not an integer", raw))
}

fn parse_float32(raw: &str) -> Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .map(coerce_f32)
        .map_err(|_| format!("'{}' is not a float", raw))
}

impl FieldKind {
    /// Type non-empty raw text.
    pub fn parse(&self, raw: &str) -> Result<Value, String> {
        match self {
            FieldKind::Text => Ok(Value::Str(raw.to_string())),
            FieldKind::Integer => parse_int(raw).map(Value::Int),
            FieldKind::Float32 => parse_float32(raw).map(Value::Float),
            FieldKind::Flag(marker) => Ok(Value::Bool(raw == *marker)),
            FieldKind::List(separator) => Ok(Value::List(
                raw.split(separator)
                    .map(|item| Value::Str(item.trim().to_string()))
                    .collect(),
            )),
            FieldKind::Consequences => Ok(Value::Terms(
                raw.split('&').map(|term| term.trim().to_string()).collect(),
            )),
            FieldKind::PosRangeSnpEff => {
                let (pos, length) = raw
                    .split_once('/')
                    .ok_or_else(|| format!("'{}' is not of the form pos/length", raw))?;
                let pos = parse_int(pos)?;
                Ok(Value::PosRange {
                    start: Some(pos),
                    end: Some(pos + parse_int(length)?),
                })
            }
            FieldKind::PosRangeVep => {
                let bound = |s: &str| match s.trim() {
                    "?" => Ok(None),
                    s => parse_int(s).map(Some),
                };
                match raw.split_once('-') {
                    Some((start, end)) => Ok(Value::PosRange {
                        start: bound(start)?,
                        end: bound(end)?,
                    }),
                    None => {
                        let start = parse_int(raw)?;
                        Ok(Value::PosRange {
                            start: Some(start),
                            end: Some(start + 1),
                        })
                    }
                }
            }
            FieldKind::RangeTotal => {
                let (range, total) = raw
                    .split_once('/')
                    .ok_or_else(|| format!("'{}' is not of the form range/total", raw))?;
                let bounds = range
                    .split('-')
                    .map(parse_int)
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, end) = match bounds[..] {
                    [n] => (n, n),
                    [start, end] => (start, end),
                    _ => {
                        return Err(format!(
                            "'{}' has more than two values separated by '-'",
                            raw
                        ))
                    }
                };
                Ok(Value::RangeTotal {
                    start,
                    end,
                    total: parse_int(total)?,
                })
            }
            FieldKind::PredictionScore => {
                let (prediction, score) = raw
                    .strip_suffix(')')
                    .and_then(|r| r.rsplit_once('('))
                    .ok_or_else(|| format!("'{}' is not of the form prediction(score)", raw))?;
                let mut map = BTreeMap::new();
                map.insert(
                    prediction.to_string(),
                    Value::Float(parse_float32(score)?),
                );
                Ok(Value::Map(map))
            }
            FieldKind::ListDict => {
                let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
                for entry in raw.split('&') {
                    let (key, value) = entry
                        .split_once(':')
                        .ok_or_else(|| format!("'{}' is not of the form key:value", entry))?;
                    grouped
                        .entry(key.to_string())
                        .or_default()
                        .push(Value::Str(value.to_string()));
                }
                Ok(Value::Map(
                    grouped
                        .into_iter()
                        .map(|(key, values)| (key, Value::List(values)))
                        .collect(),
                ))
            }
        }
    }

    /// The value of an empty sub-field.
    pub fn na_value(&self) -> Value {
        match self {
            FieldKind::List(_) => Value::List(Vec::new()),
            FieldKind::Consequences => Value::Terms(Vec::new()),
            FieldKind::PredictionScore => Value::Map(BTreeMap::new()),
            _ => Value::Na,
        }
    }
}

/// Typing rule for one named annotation sub-field.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationFieldSpec {
    pub name: String,
    /// The producer whose table defines the field; `None` for the default spec.
    pub producer: Option<Producer>,
    pub kind: FieldKind,
}

impl AnnotationFieldSpec {
    pub fn is_known(&self) -> bool {
        self.producer.is_some()
    }

    /// Convert trimmed raw text: empty text yields the NA fallback.
    pub fn convert(&self, raw: &str) -> Result<Value, String> {
        if raw.is_empty() {
            Ok(self.kind.na_value())
        } else {
            self.kind.parse(raw)
        }
    }
}

fn find(table: &[(&'static str, FieldKind)], name: &str) -> Option<FieldKind> {
    table.iter().find(|(n, _)| *n == name).map(|(_, kind)| *kind)
}

/// Look up the spec of a sub-field, preferring the detected producer's table.
///
/// VEP's `gnomADe_*`/`gnomADg_*` fields share the spec of the matching
/// `gnomAD_*` field. Unknown names get the default text spec.
pub fn lookup(producer: Producer, name: &str) -> AnnotationFieldSpec {
    let gnomad = name
        .strip_prefix("gnomADe_")
        .or_else(|| name.strip_prefix("gnomADg_"))
        .map(|rest| format!("gnomAD_{}", rest));

    let found = find(producer.table(), name)
        .map(|kind| (kind, producer))
        .or_else(|| {
            let base = gnomad.as_deref()?;
            find(VEP_FIELDS, base).map(|kind| (kind, Producer::Vep))
        })
        .or_else(|| {
            let other = producer.other();
            find(other.table(), name).map(|kind| (kind, other))
        });

    match found {
        Some((kind, producer)) => AnnotationFieldSpec {
            name: name.to_string(),
            producer: Some(producer),
            kind,
        },
        None => AnnotationFieldSpec {
            name: name.to_string(),
            producer: None,
            kind: FieldKind::Text,
        },
    }
}

use FieldKind::*;

const SNPEFF_FIELDS: &[(&str, FieldKind)] = &[
    ("Allele", Text),
    ("Annotation", Consequences),
    ("Annotation_Impact", Text),
    ("Gene_Name", Text),
    ("Gene_ID", Text),
    ("Feature_Type", Text),
    ("Feature_ID", Text),
    ("Transcript_BioType", Text),
    ("Rank", Text),
    ("HGVS.c", Text),
    ("HGVS.p", Text),
    ("cDNA.pos / cDNA.length", PosRangeSnpEff),
    ("CDS.pos / CDS.length", PosRangeSnpEff),
    ("AA.pos / AA.length", PosRangeSnpEff),
    ("Distance", Text),
    ("ERRORS / WARNINGS / INFO", List("/")),
];

// https://www.ensembl.org/info/docs/tools/vep/vep_formats.html#other_fields
const VEP_FIELDS: &[(&str, FieldKind)] = &[
    ("Location", Text),
    ("Allele", Text),
    ("Gene", Text),
    ("Feature", Text),
    ("Feature_type", Text),
    ("Consequence", Consequences),
    ("cDNA_position", PosRangeVep),
    ("CDS_position", PosRangeVep),
    ("Protein_position", PosRangeVep),
    ("HGSVc", Text),
    ("HGSVp", Text),
    ("REF_ALLELE", Text),
    ("IMPACT", Text),
    ("SYMBOL", Text),
    ("VARIANT_CLASS", Text),
    ("SYMBOL_SOURCE", Text),
    ("STRAND", Integer),
    ("ENSP", Text),
    ("FLAGS", List("&")),
    ("SWISSPROT", Text),
    ("TREMBL", Text),
    ("UNIPARC", Text),
    ("HGVSc", Text),
    ("HGVSp", Text),
    ("HGVSg", Text),
    ("HGVS_OFFSET", Integer),
    ("SIFT", PredictionScore),
    ("PolyPhen", PredictionScore),
    ("MOTIF_NAME", Text),
    ("MOTIF_POS", Integer),
    ("HIGH_INF_POS", Flag("Y")),
    ("MOTIF_SCORE_CHANGE", Float32),
    ("CELL_TYPE", List(",")),
    ("CANONICAL", Flag("YES")),
    ("CCDS", Text),
    ("INTRON", RangeTotal),
    ("EXON", RangeTotal),
    ("DOMAINS", ListDict),
    ("DISTANCE", Integer),
    ("IND", Text),
    ("AF", Float32),
    ("AFR_AF", Float32),
    ("AMR_AF", Float32),
    ("ASN_AF", Float32),
    ("EUR_AF", Float32),
    ("EAS_AF", Float32),
    ("SAS_AF", Float32),
    ("AA_AF", Float32),
    ("EA_AF", Float32),
    ("gnomAD_AF", Float32),
    ("gnomAD_AFR_AF", Float32),
    ("gnomAD_AMR_AF", Float32),
    ("gnomAD_ASJ_AF", Float32),
    ("gnomAD_EAS_AF", Float32),
    ("gnomAD_FIN_AF", Float32),
    ("gnomAD_NFE_AF", Float32),
    ("gnomAD_OTH_AF", Float32),
    ("gnomAD_SAS_AF", Float32),
    ("MAX_AF", Float32),
    ("MAX_AF_POPS", List("&")),
    ("CLIN_SIG", List("&")),
    ("BIOTYPE", Text),
    ("APPRIS", Text),
    ("TSL", Text),
    ("PUBMED", List("&")),
    ("SOMATIC", List("&")),
    ("PHENO", List("&")),
    ("GENE_PHENO", List("&")),
    ("ALLELE_NUM", Integer),
    ("GIVEN_REF", Text),
    ("USED_REF", Text),
    ("OverlapBP", Integer),
    ("OverlapPC", Float32),
    ("AMBIGUITY", Text),
    ("Amino_acids", List("/")),
    ("Codons", List("/")),
    ("HGNC_ID", Text),
    ("MANE", Text),
    ("MANE_SELECT", Text),
    ("MANE_PLUS_CLINICAL", Text),
    ("GO", Text),
    ("miRNA", Text),
    ("Existing_variation", List("&")),
    ("LoFtool", Float32),
    ("REVEL", Float32),
    ("ExACpLI", Float32),
    ("am_class", Text),
    ("am_pathogenicity", Float32),
    ("SpliceAI_pred_DS_AG", Float32),
    ("SpliceAI_pred_DS_AL", Float32),
    ("SpliceAI_pred_DS_DG", Float32),
    ("SpliceAI_pred_DS_DL", Float32),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_default() {
        let spec = lookup(Producer::SnpEff, "Annotation");
        assert_eq!(spec.kind, FieldKind::Consequences);
        assert_eq!(spec.producer, Some(Producer::SnpEff));

        let spec = lookup(Producer::SnpEff, "My_Custom_Field");
        assert!(!spec.is_known());
        assert_eq!(spec.kind, FieldKind::Text);
    }

    #[test]
    fn test_lookup_derived_gnomad_fields() {
        for name in ["gnomADe_AF", "gnomADg_NFE_AF"] {
            let spec = lookup(Producer::Vep, name);
            assert_eq!(spec.kind, FieldKind::Float32);
            assert!(spec.is_known());
        }
    }

    #[test]
    fn test_empty_text_yields_fallback() {
        for producer in [Producer::SnpEff, Producer::Vep] {
            for (name, kind) in producer.table() {
                let value = lookup(producer, name).convert("").unwrap();
                match kind {
                    FieldKind::List(_) => assert_eq!(value, Value::List(vec![])),
                    FieldKind::Consequences => assert_eq!(value, Value::Terms(vec![])),
                    FieldKind::PredictionScore => {
                        assert_eq!(value, Value::Map(BTreeMap::new()))
                    }
                    _ => assert!(value.is_na(), "{} should be NA", name),
                }
            }
        }
    }

    #[test]
    fn test_pos_ranges() {
        assert_eq!(
            FieldKind::PosRangeSnpEff.parse("12/300").unwrap(),
            Value::PosRange {
                start: Some(12),
                end: Some(312)
            }
        );
        assert_eq!(
            FieldKind::PosRangeVep.parse("?-45").unwrap(),
            Value::PosRange {
                start: None,
                end: Some(45)
            }
        );
        assert_eq!(
            FieldKind::PosRangeVep.parse("45").unwrap(),
            Value::PosRange {
                start: Some(45),
                end: Some(46)
            }
        );
        assert!(FieldKind::PosRangeSnpEff.parse("12").is_err());
    }

    #[test]
    fn test_range_total() {
        assert_eq!(
            FieldKind::RangeTotal.parse("2-4/10").unwrap(),
            Value::RangeTotal {
                start: 2,
                end: 4,
                total: 10
            }
        );
        assert_eq!(
            FieldKind::RangeTotal.parse("3/10").unwrap(),
            Value::RangeTotal {
                start: 3,
                end: 3,
                total: 10
            }
        );
        assert!(FieldKind::RangeTotal.parse("1-2-3/10").is_err());
    }

    #[test]
    fn test_prediction_score_and_list_dict() {
        let value = FieldKind::PredictionScore.parse("deleterious(0.01)").unwrap();
        let Value::Map(map) = value else {
            panic!("expected a map");
        };
        assert_eq!(map.get("deleterious"), Some(&Value::Float(coerce_f32(0.01))));

        let value = FieldKind::ListDict
            .parse("Pfam:PF00001&PROSITE:PS1&Pfam:PF00002")
            .unwrap();
        let Value::Map(map) = value else {
            panic!("expected a map");
        };
        assert_eq!(
            map.get("Pfam"),
            Some(&Value::List(vec![Value::str("PF00001"), Value::str("PF00002")]))
        );
    }

    #[test]
    fn test_flags_and_lists() {
        assert_eq!(FieldKind::Flag("YES").parse("YES").unwrap(), Value::Bool(true));
        assert_eq!(FieldKind::Flag("YES").parse("NO").unwrap(), Value::Bool(false));
        assert_eq!(
            FieldKind::List("&").parse("a & b").unwrap(),
            Value::List(vec![Value::str("a"), Value::str("b")])
        );
        assert_eq!(
            FieldKind::Consequences.parse("missense_variant&splice_region_variant").unwrap(),
            Value::Terms(vec![
                "missense_variant".to_string(),
                "splice_region_variant".to_string()
            ])
        );
    }
}
