//! `storagegraph.toml` configuration.
//!
//! ```toml
//! [run]
//! platform = "Linux"
//! machine_id = "2a9c4f0e-5b1d-4d8e-9f3a-7c6b5e4d3c2b"
//! storage = "/dev/nvme0n1p2"
//!
//! [provenance]
//! ingester = "0b8f3c52-61a4-4d0e-9a7b-3f2e1d0c9b01"
//! version = "1.4.0"
//!
//! [output]
//! dir = "out"
//! prefix = "storagegraph"
//!
//! [relationships]
//! contains = "9c1e4f2a-7b3d-4e8a-a1c6-52d8f0b3e701"
//! contained_by = "4e7a0d1b-2c9f-4b63-8d15-e6a3b7c9f402"
//! ```
//!
//! Every key is optional. Command-line flags override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storagegraph_model::RelationshipVocabulary;
use uuid::Uuid;

pub const DEFAULT_CONFIG_FILE: &str = "storagegraph.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub run: RunSection,
    pub provenance: ProvenanceSection,
    pub output: OutputSection,
    pub relationships: RelationshipsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub platform: Option<String>,
    pub machine_id: Option<String>,
    pub storage: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvenanceSection {
    /// Overrides the provider profile's service id.
    pub ingester: Option<Uuid>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub dir: Option<PathBuf>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationshipsSection {
    pub contains: Option<Uuid>,
    pub contained_by: Option<Uuid>,
}

impl Config {
    /// Load `path`, or `./storagegraph.toml` if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn vocabulary(&self) -> RelationshipVocabulary {
        let defaults = RelationshipVocabulary::default();
        RelationshipVocabulary {
            contains: self.relationships.contains.unwrap_or(defaults.contains),
            contained_by: self
                .relationships
                .contained_by
                .unwrap_or(defaults.contained_by),
        }
    }
}

/// Best-effort machine identifier when none is configured.
pub fn default_machine_id() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown-machine".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = Config::parse(
            r#"
            [run]
            platform = "Windows"
            machine_id = "ws-17"

            [provenance]
            ingester = "6b29fc40-ca47-1067-b31d-00dd010662da"
            version = "2.0"

            [output]
            dir = "/var/lib/storagegraph"

            [relationships]
            contains = "00000000-0000-0000-0000-0000000000c0"
            "#,
        )
        .unwrap();

        assert_eq!(config.run.platform.as_deref(), Some("Windows"));
        assert_eq!(config.run.storage, None);
        assert_eq!(config.provenance.version.as_deref(), Some("2.0"));
        assert_eq!(
            config.output.dir.as_deref(),
            Some(Path::new("/var/lib/storagegraph"))
        );

        let vocabulary = config.vocabulary();
        assert_eq!(vocabulary.contains, Uuid::from_u128(0xC0));
        assert_eq!(
            vocabulary.contained_by,
            RelationshipVocabulary::default().contained_by
        );
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_uuids() {
        assert!(Config::parse("[run]\nplatfrom = \"x\"\n").is_err());
        assert!(Config::parse("[provenance]\ningester = \"nope\"\n").is_err());
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[output]\nprefix = \"nightly\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.output.prefix.as_deref(), Some("nightly"));

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
