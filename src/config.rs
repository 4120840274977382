//! Configuration management for emberchain

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub consensus: ConsensusParams,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_p2p_port")]
    pub p2p_port: u16,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// WebSocket URLs dialed at startup, e.g. `ws://10.0.0.2:6001`.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Seconds between `QueryLatest` broadcasts; 0 disables.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            p2p_port: default_p2p_port(),
            api_port: default_api_port(),
            bootstrap_peers: Vec::new(),
            resync_interval_secs: default_resync_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            key_path: default_key_path(),
        }
    }
}

/// Consensus constants. Every node on a network must agree on these.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsensusParams {
    /// Target seconds between blocks.
    #[serde(default = "default_block_interval")]
    pub block_generation_interval_secs: u64,
    /// Blocks between difficulty adjustments.
    #[serde(default = "default_adjustment_interval")]
    pub difficulty_adjustment_interval: u64,
    /// Allowed skew of a block timestamp against its parent and the local clock.
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance_secs: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            block_generation_interval_secs: default_block_interval(),
            difficulty_adjustment_interval: default_adjustment_interval(),
            timestamp_tolerance_secs: default_timestamp_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Nonces tried before the candidate timestamp is refreshed.
    #[serde(default = "default_nonce_batch")]
    pub nonce_batch: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            nonce_batch: default_nonce_batch(),
        }
    }
}

/// Loads `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    let config: Config = match fs::read_to_string(path) {
        Ok(config_str) => toml::from_str(&config_str)
            .map_err(|e| ChainError::ConfigError(format!("{}: {}", path.display(), e)))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };

    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.consensus.difficulty_adjustment_interval == 0 {
            return Err(ChainError::ConfigError(
                "consensus.difficulty_adjustment_interval must be greater than zero".into(),
            ));
        }
        if self.consensus.block_generation_interval_secs == 0 {
            return Err(ChainError::ConfigError(
                "consensus.block_generation_interval_secs must be greater than zero".into(),
            ));
        }
        if self.wallet.key_path.is_empty() {
            return Err(ChainError::ConfigError("wallet.key_path must be set".into()));
        }
        if self.miner.nonce_batch == 0 {
            return Err(ChainError::ConfigError(
                "miner.nonce_batch must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_p2p_port() -> u16 {
    6001
}

fn default_api_port() -> u16 {
    3001
}

fn default_resync_interval() -> u64 {
    30
}

fn default_key_path() -> String {
    "node/wallet/private_key".to_string()
}

fn default_block_interval() -> u64 {
    10
}

fn default_adjustment_interval() -> u64 {
    10
}

fn default_timestamp_tolerance() -> u64 {
    60
}

fn default_nonce_batch() -> u64 {
    100_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.network.p2p_port, 6001);
        assert_eq!(config.consensus, ConsensusParams::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[network]\np2p_port = 7001\nbootstrap_peers = [\"ws://127.0.0.1:6001\"]\n\n[consensus]\ntimestamp_tolerance_secs = 120\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.network.p2p_port, 7001);
        assert_eq!(config.network.api_port, 3001);
        assert_eq!(config.network.bootstrap_peers.len(), 1);
        assert_eq!(config.consensus.timestamp_tolerance_secs, 120);
        assert_eq!(config.consensus.difficulty_adjustment_interval, 10);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[consensus]\ndifficulty_adjustment_interval = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ChainError::ConfigError(_))));
    }
}
