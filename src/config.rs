// Node configuration

use crate::consensus::{DEFAULT_DIFFICULTY, ProofOfWork, Target};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the optional config file inside the data directory
pub const CONFIG_FILE: &str = "config.json";

const BLOCKS_DIR: &str = "blocks";
const WALLETS_FILE: &str = "wallets.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the store, wallets and this file
    pub data_dir: PathBuf,
    /// Leading zero bits required of a block hash
    pub difficulty: u32,
    /// Value issued by each coinbase transaction
    pub coinbase_reward: u64,
    /// Highest nonce tried before sealing gives up
    pub max_nonce: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            difficulty: DEFAULT_DIFFICULTY,
            coinbase_reward: 100,
            max_nonce: 1 << 40,
        }
    }
}

impl Config {
    /// Read `<data_dir>/config.json` when present, defaults otherwise.
    /// `data_dir` always wins over the directory recorded in the file.
    pub fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let path = data_dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            log::debug!("Loading config from {}", path.display());
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Self::default()
        };
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::write(
            self.data_dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(self)?,
        )?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        Target::from_difficulty(self.difficulty)?;
        Ok(())
    }

    pub fn proof_of_work(&self) -> Result<ProofOfWork> {
        ProofOfWork::new(self.difficulty, self.max_nonce)
    }

    pub fn blocks_path(&self) -> PathBuf {
        self.data_dir.join(BLOCKS_DIR)
    }

    pub fn wallets_path(&self) -> PathBuf {
        self.data_dir.join(WALLETS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.difficulty, 12);
        assert_eq!(config.coinbase_reward, 100);
        assert_eq!(config.blocks_path(), dir.path().join("blocks"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            difficulty: 16,
            coinbase_reward: 50,
            max_nonce: 1_000,
        };
        config.save().unwrap();

        assert_eq!(Config::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{ "difficulty": 10 }"#).unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.difficulty, 10);
        assert_eq!(config.coinbase_reward, 100);
    }

    #[test]
    fn test_invalid_difficulty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{ "difficulty": 300 }"#).unwrap();

        assert!(matches!(Config::load(dir.path()), Err(LedgerError::InvalidDifficulty(300))));
    }
}
