use crate::constants::{DEFAULT_DATA_DIR, DEFAULT_LISTEN, DEFAULT_LOG_DIR};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use ledger_core::{ChainConfig, RecoveryMode};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Delimited append-only text file per identity
    #[default]
    File,
    /// Embedded sled database per identity
    Sled,
    /// Nothing persisted
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub identity: String,
    pub listen: String,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub backend: Backend,
    pub mine_on_start: bool,
    pub issue_asset: Option<String>,
    pub chain: ChainConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            listen: DEFAULT_LISTEN.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            backend: Backend::File,
            mine_on_start: true,
            issue_asset: None,
            chain: ChainConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity.is_empty() {
            bail!("a node identity is required (--identity or `identity` in the config file)");
        }
        if !self
            .identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!(
                "identity {:?} may only contain ASCII letters, digits, '-' and '_'",
                self.identity
            );
        }
        self.chain.validate()?;
        Ok(())
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "ledger-node")]
#[command(about = "Single-node proof-of-work ledger")]
pub struct Args {
    /// TOML config file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Node identity; names the ledger file and the activity log
    #[arg(long)]
    pub identity: Option<String>,

    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long)]
    pub listen: Option<String>,

    /// Directory holding the ledger
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for the human-readable activity log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Required number of leading zero hex characters
    #[arg(long)]
    pub difficulty: Option<usize>,

    /// Milliseconds between search steps (0 = yield only)
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Nonces tried per search step
    #[arg(long)]
    pub attempts_per_tick: Option<u64>,

    /// Re-verify the whole chain on startup instead of only the last block
    #[arg(long)]
    pub full_recovery: bool,

    /// Do not start mining on boot
    #[arg(long)]
    pub no_mine: bool,

    /// Issue an asset with this code through the issuance collaborator
    #[arg(long)]
    pub issue_asset: Option<String>,
}

impl Args {
    /// Merge the optional config file with the flags and validate the result.
    pub fn resolve(self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };
        if let Some(identity) = self.identity {
            config.identity = identity;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(dir) = self.log_dir {
            config.log_dir = dir;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(difficulty) = self.difficulty {
            config.chain.difficulty = difficulty;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.chain.tick_ms = tick_ms;
        }
        if let Some(attempts) = self.attempts_per_tick {
            config.chain.attempts_per_tick = attempts;
        }
        if self.full_recovery {
            config.chain.recovery = RecoveryMode::Full;
        }
        if self.no_mine {
            config.mine_on_start = false;
        }
        if self.issue_asset.is_some() {
            config.issue_asset = self.issue_asset;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults() {
        let config = NodeConfig::from_toml_str(
            r#"
            identity = "node-1"
            backend = "sled"

            [chain]
            difficulty = 3
            recovery = "full"
            "#,
        )
        .unwrap();
        assert_eq!(config.identity, "node-1");
        assert_eq!(config.backend, Backend::Sled);
        assert_eq!(config.chain.difficulty, 3);
        assert_eq!(config.chain.batch_size, 5);
        assert_eq!(config.chain.recovery, RecoveryMode::Full);
        assert_eq!(config.listen, DEFAULT_LISTEN);
        assert!(config.mine_on_start);
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "identity = \"from-file\"\n[chain]\ndifficulty = 4\n").unwrap();

        let args = Args {
            config: Some(path),
            identity: Some("from-flag".into()),
            difficulty: Some(1),
            no_mine: true,
            ..Args::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.identity, "from-flag");
        assert_eq!(config.chain.difficulty, 1);
        assert!(!config.mine_on_start);
    }

    #[test]
    fn identity_is_required_and_sanitized() {
        assert!(Args::default().resolve().is_err());
        let args = Args {
            identity: Some("../etc".into()),
            ..Args::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn cli_parses() {
        let args = Args::try_parse_from([
            "ledger-node",
            "--identity",
            "7",
            "--backend",
            "memory",
            "--difficulty",
            "2",
            "--full-recovery",
        ])
        .unwrap();
        let config = args.resolve().unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.chain.recovery, RecoveryMode::Full);
    }
}
