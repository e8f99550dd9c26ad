//! Seed identities for the virtual user pool

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use loadcheck_core::Credentials;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// Where the seed users come from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    /// Inline credentials
    #[serde(default)]
    pub seeds: Vec<Credentials>,

    /// YAML file holding a list of `{name, secret}` entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl UsersConfig {
    /// Inline seeds followed by the entries of `file`, if any
    pub fn load_seeds(&self) -> ConfigResult<Vec<Credentials>> {
        let mut seeds = self.seeds.clone();
        if let Some(path) = &self.file {
            let content = std::fs::read_to_string(path)?;
            let from_file: Vec<Credentials> = serde_yaml::from_str(&content)?;
            debug!("Loaded {} users from {}", from_file.len(), path.display());
            seeds.extend(from_file);
        }
        self.check_seeds(&seeds)?;
        Ok(seeds)
    }

    fn check_seeds(&self, seeds: &[Credentials]) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for seed in seeds {
            validate_required_string(&seed.name, "name", self.domain_name())?;
            if !names.insert(seed.name.as_str()) {
                return Err(self.validation_error(format!("duplicate user '{}'", seed.name)));
            }
        }
        Ok(())
    }
}

impl Validatable for UsersConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.check_seeds(&self.seeds)
    }

    fn domain_name(&self) -> &'static str {
        "users"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_duplicate_seeds_rejected() {
        let config = UsersConfig {
            seeds: vec![Credentials::new("alice", "a"), Credentials::new("alice", "b")],
            file: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_seeds_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "- name: bob\n  secret: hunter2\n- name: carol\n  secret: pw").unwrap();

        let config = UsersConfig {
            seeds: vec![Credentials::new("alice", "s3cr3t-pw")],
            file: Some(file.path().to_path_buf()),
        };
        let seeds = config.load_seeds().unwrap();
        let names: Vec<&str> = seeds.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(seeds[1].secret, "hunter2");
    }
}
