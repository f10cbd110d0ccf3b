//! Named side tables of strings, exposed to expressions as `AUX['name']`.

use crate::error::{EngineError, EngineResult};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Auxiliary {
    tables: HashMap<String, HashSet<String>>,
}

impl Auxiliary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a file with one entry per line.
    pub fn load(&mut self, name: &str, path: impl AsRef<Path>) -> EngineResult<()> {
        let file = File::open(path.as_ref())?;
        self.read_table(name, BufReader::new(file))?;
        log::debug!(
            "Loaded auxiliary table '{}' from {}",
            name,
            path.as_ref().display()
        );
        Ok(())
    }

    /// Read a table; entries are trimmed and empty lines skipped.
    pub fn read_table<R: BufRead>(&mut self, name: &str, reader: R) -> EngineResult<()> {
        let mut entries = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let entry = line.trim();
            if !entry.is_empty() {
                entries.insert(entry.to_string());
            }
        }
        self.insert(name, entries);
        Ok(())
    }

    pub fn insert(&mut self, name: &str, entries: HashSet<String>) {
        self.tables.insert(name.to_string(), entries);
    }

    pub fn get(&self, name: &str) -> EngineResult<&HashSet<String>> {
        self.tables
            .get(name)
            .ok_or_else(|| EngineError::UnknownAuxiliary(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_table() {
        let mut aux = Auxiliary::new();
        aux.read_table("genes", "BRCA1\n  TP53 \n\nBRCA1\n".as_bytes())
            .unwrap();
        let genes = aux.get("genes").unwrap();
        assert_eq!(genes.len(), 2);
        assert!(genes.contains("TP53"));
        assert!(aux.contains("genes"));
    }

    #[test]
    fn test_unknown_table() {
        let aux = Auxiliary::new();
        assert!(matches!(
            aux.get("genes"),
            Err(EngineError::UnknownAuxiliary(name)) if name == "genes"
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "BRCA2").unwrap();
        let mut aux = Auxiliary::new();
        aux.load("genes", file.path()).unwrap();
        assert!(aux.get("genes").unwrap().contains("BRCA2"));
        assert_eq!(aux.names().collect::<Vec<_>>(), vec!["genes"]);
    }
}
