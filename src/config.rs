//! Engine configuration.
//!
//! Settings can be read from a JSON file and are then overridden by command
//! line flags. Everything here is validated before the first record is read.

use crate::auxiliary::Auxiliary;
use crate::cardinality::Number;
use crate::error::EngineResult;
use crate::ontology::Ontology;
use crate::record::Header;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

fn default_annotation_key() -> String {
    "ANN".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// INFO field holding the annotation entries.
    #[serde(default = "default_annotation_key")]
    pub annotation_key: String,
    /// INFO field -> number (`1`, `A`, `R`, `.` or an integer).
    pub overwrite_number_info: BTreeMap<String, String>,
    /// FORMAT field -> number (additionally `G`).
    pub overwrite_number_format: BTreeMap<String, String>,
    /// Auxiliary table name -> file with one entry per line.
    pub aux: BTreeMap<String, PathBuf>,
    /// OBO file for `SO` and the term methods.
    pub ontology: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            annotation_key: default_annotation_key(),
            overwrite_number_info: BTreeMap::new(),
            overwrite_number_format: BTreeMap::new(),
            aux: BTreeMap::new(),
            ontology: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Rewrite the declared numbers of the overridden header fields.
    pub fn apply_number_overrides(&self, header: &mut Header) -> EngineResult<()> {
        for (field, number) in &self.overwrite_number_info {
            header.set_info_number(field, number.parse::<Number>()?)?;
        }
        for (field, number) in &self.overwrite_number_format {
            header.set_format_number(field, number.parse::<Number>()?)?;
        }
        Ok(())
    }

    pub fn load_auxiliary(&self) -> EngineResult<Auxiliary> {
        let mut auxiliary = Auxiliary::new();
        for (name, path) in &self.aux {
            auxiliary.load(name, path)?;
        }
        Ok(auxiliary)
    }

    pub fn load_ontology(&self) -> EngineResult<Option<Ontology>> {
        self.ontology.as_ref().map(Ontology::load).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::record::{FieldInfo, FieldType, HeaderLine};

    fn header() -> Header {
        Header::new(
            vec![
                HeaderLine::Info(FieldInfo::new("AF", Number::PerAlt, FieldType::Float, "")),
                HeaderLine::Format(FieldInfo::new("AD", Number::PerAllele, FieldType::Integer, "")),
            ],
            vec![],
        )
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.annotation_key, "ANN");
    }

    #[test]
    fn test_from_json() {
        let config = EngineConfig::from_json_str(
            r#"{"annotation_key": "CSQ", "overwrite_number_info": {"AF": "1"}, "aux": {"genes": "genes.txt"}}"#,
        )
        .unwrap();
        assert_eq!(config.annotation_key, "CSQ");
        assert_eq!(config.overwrite_number_info["AF"], "1");
        assert_eq!(config.aux["genes"], PathBuf::from("genes.txt"));
        assert!(config.ontology.is_none());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            EngineConfig::from_json_str("{\"aux\": 3}"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_apply_number_overrides() {
        let mut header = header();
        let mut config = EngineConfig::default();
        config.overwrite_number_info.insert("AF".to_string(), "1".to_string());
        config.overwrite_number_format.insert("AD".to_string(), ".".to_string());
        config.apply_number_overrides(&mut header).unwrap();
        assert_eq!(header.info("AF").unwrap().number, Number::Fixed(1));
        assert_eq!(header.format("AD").unwrap().number, Number::Unbounded);
    }

    #[test]
    fn test_override_validation() {
        let mut config = EngineConfig::default();
        config.overwrite_number_info.insert("DP".to_string(), "1".to_string());
        assert!(matches!(
            config.apply_number_overrides(&mut header()),
            Err(EngineError::UnknownOverrideField { section: "INFO", .. })
        ));

        let mut config = EngineConfig::default();
        config.overwrite_number_info.insert("AF".to_string(), "G".to_string());
        assert!(matches!(
            config.apply_number_overrides(&mut header()),
            Err(EngineError::InvalidNumber { .. })
        ));

        let mut config = EngineConfig::default();
        config.overwrite_number_format.insert("AD".to_string(), "x".to_string());
        assert!(matches!(
            config.apply_number_overrides(&mut header()),
            Err(EngineError::InvalidNumber { .. })
        ));
    }
}
