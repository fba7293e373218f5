//! Protocol configuration shared by the parties of a session.

use crate::error::{Error, Result};
use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_FRACTION_BITS: u32 = 18;
pub const DEFAULT_DIVISION_BIAS_BITS: u32 = 10;

/// Parameters of the two-party additive secure backend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Roles of the two parties; index 0 holds the public share of promoted
    /// plaintext values.
    pub parties: Vec<Role>,
    /// Fractional bits of fixed-point encoded secret values.
    pub fraction_bits: u32,
    /// A secret integer quotient is biased by 2^-division_bias_bits before
    /// being truncated.
    pub division_bias_bits: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            parties: vec![Role::from("alice"), Role::from("bob")],
            fraction_bits: DEFAULT_FRACTION_BITS,
            division_bias_bits: DEFAULT_DIVISION_BIAS_BITS,
        }
    }
}

impl ProtocolConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: ProtocolConfig =
            toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: ProtocolConfig =
            serde_json::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_toml_str(&source),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.parties.len() != 2 {
            return Err(Error::Config(format!(
                "Expected exactly two parties, found {}",
                self.parties.len()
            )));
        }
        if self.parties[0] == self.parties[1] {
            return Err(Error::Config(format!(
                "Party roles must be distinct, both are '{}'",
                self.parties[0]
            )));
        }
        if !(8..=24).contains(&self.fraction_bits) {
            return Err(Error::Config(format!(
                "fraction_bits must be in 8..=24, found {}",
                self.fraction_bits
            )));
        }
        if self.division_bias_bits == 0 || self.division_bias_bits >= self.fraction_bits {
            return Err(Error::Config(format!(
                "division_bias_bits must be in 1..{}, found {}",
                self.fraction_bits, self.division_bias_bits
            )));
        }
        Ok(())
    }

    /// Index of `role` among the parties.
    pub fn party_index(&self, role: &Role) -> Result<usize> {
        self.parties
            .iter()
            .position(|party| party == role)
            .ok_or_else(|| Error::Config(format!("Role '{}' is not a party of the session", role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ProtocolConfig::default();
        config.validate().unwrap();
        assert_eq!(config.party_index(&Role::from("bob")).unwrap(), 1);
        assert!(config.party_index(&Role::from("carole")).is_err());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = ProtocolConfig::from_toml_str(
            r#"
            parties = ["alice", "carole"]
            fraction_bits = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.parties[1], Role::from("carole"));
        assert_eq!(config.fraction_bits, 20);
        assert_eq!(config.division_bias_bits, DEFAULT_DIVISION_BIAS_BITS);
    }

    #[test]
    fn json_config() {
        let config = ProtocolConfig::from_json_str(r#"{"division_bias_bits": 6}"#).unwrap();
        assert_eq!(config.division_bias_bits, 6);
    }

    #[test]
    fn invalid_configs_rejected() {
        assert!(ProtocolConfig::from_toml_str(r#"parties = ["alice"]"#).is_err());
        assert!(ProtocolConfig::from_toml_str(r#"parties = ["bob", "bob"]"#).is_err());
        assert!(ProtocolConfig::from_toml_str("fraction_bits = 40").is_err());
        assert!(ProtocolConfig::from_toml_str("division_bias_bits = 18").is_err());
        let err = ProtocolConfig::from_toml_str("unknown = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn from_path_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"fraction_bits": 16}}"#).unwrap();
        let config = ProtocolConfig::from_path(file.path()).unwrap();
        assert_eq!(config.fraction_bits, 16);

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "fraction_bits = 12").unwrap();
        let config = ProtocolConfig::from_path(file.path()).unwrap();
        assert_eq!(config.fraction_bits, 12);
    }
}
