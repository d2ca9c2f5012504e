//! Voting configuration.
//!
//! Loaded from TOML files or built in code, validated before use, and
//! replaceable by the owner at any time.

use std::path::Path;
use agora_types::Amount;
use serde::{Deserialize, Serialize};
use crate::error::GovernanceError;

/// How proposals pick up quorum and per-wallet cap changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigBinding {
    /// Quorum and cap come from the current configuration at evaluation time
    #[default]
    Live,
    /// Quorum and cap are captured when the proposal is created
    FrozenAtCreation,
}

/// Process-wide voting parameters.
///
/// Start and end times are always computed once, at creation. Only quorum
/// and the per-wallet cap are affected by [`ConfigBinding`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Minimum effective power needed to propose
    pub proposal_threshold: u64,
    /// Delay between creation and the start of voting
    pub voting_delay: u64,
    /// Length of the voting window
    pub voting_period: u64,
    /// Minimum total votes for a proposal to be accepted
    pub quorum_threshold: u64,
    /// Maximum votes a single account may cast on one proposal
    pub max_votes_per_wallet: u64,
    /// Minimum time between two proposals from the same proposer
    pub proposal_cooldown: u64,
    pub binding: ConfigBinding,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            proposal_threshold: 10_000,
            voting_delay: 86_400,     // 1 day
            voting_period: 604_800,   // 7 days
            quorum_threshold: 100_000,
            max_votes_per_wallet: 1_000,
            proposal_cooldown: 86_400,
            binding: ConfigBinding::Live,
        }
    }
}

impl VotingConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), GovernanceError> {
        if self.voting_period == 0 {
            return Err(GovernanceError::Config("voting_period cannot be 0".to_string()));
        }
        if self.max_votes_per_wallet == 0 {
            return Err(GovernanceError::Config("max_votes_per_wallet cannot be 0".to_string()));
        }
        Ok(())
    }

    pub fn proposal_threshold(&self) -> Amount {
        Amount::from(self.proposal_threshold)
    }

    pub fn quorum(&self) -> Amount {
        Amount::from(self.quorum_threshold)
    }

    pub fn max_votes(&self) -> Amount {
        Amount::from(self.max_votes_per_wallet)
    }

    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, GovernanceError> {
        let config: VotingConfig = toml::from_str(contents)
            .map_err(|e| GovernanceError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file.
    /// Paths containing `..` are rejected.
    pub fn from_file(path: &Path) -> Result<Self, GovernanceError> {
        if path.to_string_lossy().contains("..") {
            return Err(GovernanceError::Config(
                "Invalid path: directory traversal detected".to_string(),
            ));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            GovernanceError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, GovernanceError> {
        toml::to_string_pretty(self).map_err(|e| GovernanceError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = VotingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.binding, ConfigBinding::Live);
        assert_eq!(config.quorum(), 100_000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = VotingConfig::default();
        config.voting_period = 0;
        assert!(matches!(config.validate(), Err(GovernanceError::Config(_))));

        let mut config = VotingConfig::default();
        config.max_votes_per_wallet = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = VotingConfig::from_toml_str(
            "quorum_threshold = 500\nbinding = \"frozen_at_creation\"\n",
        )
        .unwrap();
        assert_eq!(config.quorum_threshold, 500);
        assert_eq!(config.binding, ConfigBinding::FrozenAtCreation);
        assert_eq!(config.voting_period, VotingConfig::default().voting_period);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(VotingConfig::from_toml_str("voting_period = 0").is_err());
        assert!(VotingConfig::from_toml_str("voting_period = \"soon\"").is_err());
    }

    #[test]
    fn test_config_file_roundtrip() {
        let config = VotingConfig {
            voting_delay: 10,
            voting_period: 100,
            ..Default::default()
        };

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", config.to_toml_string().unwrap()).unwrap();

        let loaded = VotingConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_file_rejects_traversal() {
        let result = VotingConfig::from_file(Path::new("../etc/agora.toml"));
        assert!(matches!(result, Err(GovernanceError::Config(_))));
    }
}
