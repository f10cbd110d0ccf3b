//! Consequence term ontology.
//!
//! Terms are connected by `is_a` edges pointing from a term to its direct
//! parents. Shortest path lengths in the ancestor direction are computed once
//! at construction with one breadth-first search per term, so every query is
//! a table lookup.

pub mod obo;

use crate::error::{EngineError, EngineResult};
pub use obo::Term;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Ontology {
    ids: Vec<String>,
    names: Vec<String>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    /// `distances[t][a]` is the length of the shortest path from `t` up to
    /// its ancestor `a`; every term reaches itself with length 0.
    distances: Vec<HashMap<usize, u32>>,
}

impl Ontology {
    pub fn from_terms(terms: Vec<Term>) -> Self {
        let mut ids = Vec::with_capacity(terms.len());
        let mut names = Vec::with_capacity(terms.len());
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();

        for term in &terms {
            let index = ids.len();
            ids.push(term.id.clone());
            names.push(term.name.clone());
            by_id.insert(term.id.clone(), index);
            by_name.entry(term.name.clone()).or_insert(index);
        }

        let mut parents = vec![Vec::new(); terms.len()];
        let mut children = vec![Vec::new(); terms.len()];
        for (child, term) in terms.iter().enumerate() {
            for parent_id in &term.parents {
                match by_id.get(parent_id) {
                    Some(&parent) => {
                        parents[child].push(parent);
                        children[parent].push(child);
                    }
                    None => log::warn!(
                        "Term '{}' refers to unknown parent '{}'",
                        term.id,
                        parent_id
                    ),
                }
            }
        }

        let distances = (0..terms.len())
            .map(|source| shortest_paths(&parents, source))
            .collect();

        Self {
            ids,
            names,
            by_name,
            by_id,
            parents,
            children,
            distances,
        }
    }

    pub fn from_obo<R: BufRead>(reader: R) -> EngineResult<Self> {
        let ontology = Self::from_terms(obo::parse(reader)?);
        log::debug!("Loaded ontology with {} terms", ontology.len());
        Ok(ontology)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::from_obo(BufReader::new(File::open(path)?))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Resolve a term by name, falling back to its id.
    fn index(&self, term: &str) -> EngineResult<usize> {
        self.by_name
            .get(term)
            .or_else(|| self.by_id.get(term))
            .copied()
            .ok_or_else(|| EngineError::UnknownTerm(term.to_string()))
    }

    fn names_of(&self, indices: impl IntoIterator<Item = usize>) -> Vec<String> {
        indices
            .into_iter()
            .map(|i| self.names[i].clone())
            .collect()
    }

    pub fn id(&self, term: &str) -> EngineResult<&str> {
        Ok(&self.ids[self.index(term)?])
    }

    pub fn name(&self, term: &str) -> EngineResult<&str> {
        Ok(&self.names[self.index(term)?])
    }

    /// Whether `term` is `ancestor` or one of its descendants.
    pub fn is_a(&self, term: &str, ancestor: &str) -> EngineResult<bool> {
        let term = self.index(term)?;
        let ancestor = self.index(ancestor)?;
        Ok(self.distances[term].contains_key(&ancestor))
    }

    pub fn is_ancestor(&self, term: &str, descendant: &str) -> EngineResult<bool> {
        self.is_a(descendant, term)
    }

    /// Path length between two terms in whichever direction connects them.
    pub fn path_length(&self, a: &str, b: &str) -> EngineResult<Option<u32>> {
        let a = self.index(a)?;
        let b = self.index(b)?;
        Ok(self.distances[a]
            .get(&b)
            .or_else(|| self.distances[b].get(&a))
            .copied())
    }

    /// Minimum path length from any of `terms` to `target`; unreachable
    /// terms are ignored.
    pub fn shortest_path_length<S: AsRef<str>>(
        &self,
        terms: &[S],
        target: &str,
    ) -> EngineResult<Option<u32>> {
        let mut shortest = None;
        for term in terms {
            if let Some(length) = self.path_length(term.as_ref(), target)? {
                shortest = Some(shortest.map_or(length, |s: u32| s.min(length)));
            }
        }
        Ok(shortest)
    }

    /// Direct parents.
    pub fn parents(&self, term: &str) -> EngineResult<Vec<String>> {
        let index = self.index(term)?;
        Ok(self.names_of(self.parents[index].iter().copied()))
    }

    /// Direct children.
    pub fn children(&self, term: &str) -> EngineResult<Vec<String>> {
        let index = self.index(term)?;
        Ok(self.names_of(self.children[index].iter().copied()))
    }

    /// All ancestors, nearest first.
    pub fn get_parents(&self, term: &str) -> EngineResult<Vec<String>> {
        let index = self.index(term)?;
        let mut ancestors: Vec<(u32, usize)> = self.distances[index]
            .iter()
            .filter(|(&a, _)| a != index)
            .map(|(&a, &d)| (d, a))
            .collect();
        ancestors.sort_by(|x, y| x.0.cmp(&y.0).then_with(|| self.names[x.1].cmp(&self.names[y.1])));
        Ok(self.names_of(ancestors.into_iter().map(|(_, a)| a)))
    }

    /// All descendants, nearest first.
    pub fn get_children(&self, term: &str) -> EngineResult<Vec<String>> {
        let index = self.index(term)?;
        let mut descendants: Vec<(u32, usize)> = self
            .distances
            .iter()
            .enumerate()
            .filter(|(d, _)| *d != index)
            .filter_map(|(d, reach)| reach.get(&index).map(|&length| (length, d)))
            .collect();
        descendants
            .sort_by(|x, y| x.0.cmp(&y.0).then_with(|| self.names[x.1].cmp(&self.names[y.1])));
        Ok(self.names_of(descendants.into_iter().map(|(_, d)| d)))
    }

    /// Terms of the set that have no descendant within the set.
    pub fn most_specific_terms<S: AsRef<str>>(&self, terms: &[S]) -> EngineResult<Vec<String>> {
        let indices = terms
            .iter()
            .map(|t| self.index(t.as_ref()))
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(terms
            .iter()
            .zip(&indices)
            .filter(|(_, &term)| {
                !indices
                    .iter()
                    .any(|&other| other != term && self.distances[other].contains_key(&term))
            })
            .map(|(name, _)| name.as_ref().to_string())
            .collect())
    }
}

fn shortest_paths(parents: &[Vec<usize>], source: usize) -> HashMap<usize, u32> {
    let mut distances = HashMap::new();
    distances.insert(source, 0);
    let mut queue = VecDeque::from([source]);

    while let Some(node) = queue.pop_front() {
        let distance = distances[&node];
        for &parent in &parents[node] {
            if !distances.contains_key(&parent) {
                distances.insert(parent, distance + 1);
                queue.push_back(parent);
            }
        }
    }
    distances
}
