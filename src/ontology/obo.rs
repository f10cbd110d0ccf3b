//! Minimal OBO reader: `[Term]` stanzas with `id`, `name` and `is_a` tags.

use crate::error::EngineResult;
use std::io::BufRead;

/// A term as read from the file, with its direct `is_a` parent ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub id: String,
    pub name: String,
    pub parents: Vec<String>,
}

#[derive(Default)]
struct Stanza {
    id: Option<String>,
    name: Option<String>,
    parents: Vec<String>,
    obsolete: bool,
}

impl Stanza {
    fn finish(self, terms: &mut Vec<Term>) {
        if self.obsolete {
            return;
        }
        let Some(id) = self.id else {
            log::warn!("Skipping [Term] stanza without an id");
            return;
        };
        let name = self.name.unwrap_or_else(|| id.clone());
        terms.push(Term {
            id,
            name,
            parents: self.parents,
        });
    }
}

/// Strip trailing `! comment` and `{qualifier}` parts from a tag value.
fn clean_value(value: &str) -> &str {
    let value = value.split_once(" !").map_or(value, |(v, _)| v);
    let value = value.split_once(" {").map_or(value, |(v, _)| v);
    value.trim()
}

/// Read every non-obsolete `[Term]` stanza.
pub fn parse<R: BufRead>(reader: R) -> EngineResult<Vec<Term>> {
    let mut terms = Vec::new();
    let mut current: Option<Stanza> = None;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') {
            continue;
        }

        if line.starts_with('[') {
            if let Some(stanza) = current.take() {
                stanza.finish(&mut terms);
            }
            if line == "[Term]" {
                current = Some(Stanza::default());
            }
            continue;
        }

        let Some(stanza) = current.as_mut() else {
            continue;
        };
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };
        match tag.trim() {
            "id" => stanza.id = Some(clean_value(value).to_string()),
            "name" => stanza.name = Some(value.trim().to_string()),
            "is_a" => stanza.parents.push(clean_value(value).to_string()),
            "is_obsolete" => stanza.obsolete = clean_value(value) == "true",
            _ => {}
        }
    }

    if let Some(stanza) = current.take() {
        stanza.finish(&mut terms);
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBO: &str = "format-version: 1.2
ontology: so

[Term]
id: SO:0000001
name: region

[Term]
id: SO:0000002
name: feature ! not really
is_a: SO:0000001 ! region

[Term]
id: SO:0000003
name: retired
is_obsolete: true

[Typedef]
id: part_of
name: part_of

[Term]
id: SO:0000004
name: variant
is_a: SO:0000002 {source=\"x\"} ! feature
is_a: SO:0000001
";

    #[test]
    fn test_parse_terms() {
        let terms = parse(OBO.as_bytes()).unwrap();
        assert_eq!(terms.len(), 3);

        assert_eq!(terms[0].id, "SO:0000001");
        assert_eq!(terms[0].name, "region");
        assert!(terms[0].parents.is_empty());

        assert_eq!(terms[1].parents, vec!["SO:0000001"]);
        assert_eq!(terms[2].name, "variant");
        assert_eq!(terms[2].parents, vec!["SO:0000002", "SO:0000001"]);
    }

    #[test]
    fn test_obsolete_and_typedef_skipped() {
        let terms = parse(OBO.as_bytes()).unwrap();
        assert!(terms.iter().all(|t| t.name != "retired"));
        assert!(terms.iter().all(|t| t.id != "part_of"));
    }
}
