use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::delegate::{CommandLine, DelegationError, DEFAULT_DELEGATE_TIMEOUT};
use crate::stages::StageKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hop {
    ChiaKeysExecutor,
    MnemonicExecutor,
    GenerateKeyExecutor,
    Signer,
    SignerBackend,
    CoinSelector,
    BundleSigner,
    SdkSubmit,
    SignSubmit,
}

impl Hop {
    pub const ALL: [Hop; 9] = [
        Hop::ChiaKeysExecutor,
        Hop::MnemonicExecutor,
        Hop::GenerateKeyExecutor,
        Hop::Signer,
        Hop::SignerBackend,
        Hop::CoinSelector,
        Hop::BundleSigner,
        Hop::SdkSubmit,
        Hop::SignSubmit,
    ];

    pub fn env_var(&self) -> &'static str {
        match self {
            Hop::ChiaKeysExecutor => "COIN_OPS_CHIA_KEYS_EXECUTOR_CMD",
            Hop::MnemonicExecutor => "COIN_OPS_MNEMONIC_EXECUTOR_CMD",
            Hop::GenerateKeyExecutor => "COIN_OPS_GENERATE_KEY_EXECUTOR_CMD",
            Hop::Signer => "COIN_OPS_SIGNER_CMD",
            Hop::SignerBackend => "COIN_OPS_SIGNER_BACKEND_CMD",
            Hop::CoinSelector => "COIN_OPS_COIN_SELECTOR_CMD",
            Hop::BundleSigner => "COIN_OPS_BUNDLE_SIGNER_CMD",
            Hop::SdkSubmit => "COIN_OPS_SDK_SUBMIT_CMD",
            Hop::SignSubmit => "COIN_OPS_SIGN_SUBMIT_CMD",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Hop::ChiaKeysExecutor | Hop::MnemonicExecutor | Hop::GenerateKeyExecutor => "worker",
            Hop::Signer => "signer",
            Hop::SignerBackend => "signer_backend",
            Hop::CoinSelector => "coin_selection",
            Hop::BundleSigner => "bundle_signer",
            Hop::SdkSubmit => "sdk_submit",
            Hop::SignSubmit => "sign_submit",
        }
    }

    pub fn default_stage(&self) -> Option<StageKind> {
        match self {
            Hop::ChiaKeysExecutor => Some(StageKind::Worker),
            Hop::Signer => Some(StageKind::Signer),
            Hop::SignerBackend => Some(StageKind::Builder),
            Hop::BundleSigner => Some(StageKind::RawEngine),
            Hop::SdkSubmit => Some(StageKind::Submit),
            Hop::MnemonicExecutor
            | Hop::GenerateKeyExecutor
            | Hop::CoinSelector
            | Hop::SignSubmit => None,
        }
    }

    pub fn not_configured_reason(&self) -> String {
        match self {
            Hop::ChiaKeysExecutor => "chia_keys_executor_not_configured".to_string(),
            Hop::MnemonicExecutor => "mnemonic_import_executor_not_configured".to_string(),
            Hop::GenerateKeyExecutor => "generate_new_key_executor_not_configured".to_string(),
            Hop::CoinSelector => "coin_selector_not_configured".to_string(),
            other => format!("{}_not_configured", other.tag()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub commands: HashMap<Hop, String>,
}

impl FileConfig {
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let file = File::open(config_path).with_context(|| {
            format!(
                "Cannot read config file {path}",
                path = config_path.display()
            )
        })?;
        let config: FileConfig = serde_yaml::from_reader(file).with_context(|| {
            format!(
                "Cannot parse config file {path}",
                path = config_path.display()
            )
        })?;
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    commands: HashMap<Hop, String>,
    timeout: Duration,
    entry_point: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commands: HashMap::new(),
            timeout: DEFAULT_DELEGATE_TIMEOUT,
            entry_point: None,
            config_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_entry_point(mut self, entry_point: impl Into<PathBuf>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn with_command(mut self, hop: Hop, command: impl Into<String>) -> Self {
        self.commands.insert(hop, command.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_config_file(mut self, config_path: &Path) -> anyhow::Result<Self> {
        let file = FileConfig::load(config_path)?;
        if let Some(timeout_secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(timeout_secs);
        }
        for (hop, command) in file.commands {
            if !command.trim().is_empty() {
                self.commands.insert(hop, command);
            }
        }
        self.config_path = Some(config_path.to_path_buf());
        Ok(self)
    }

    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for hop in Hop::ALL {
            if let Some(command) = lookup(hop.env_var()).filter(|cmd| !cmd.trim().is_empty()) {
                tracing::debug!("{} overridden by {}", hop.tag(), hop.env_var());
                self.commands.insert(hop, command);
            }
        }
        self
    }

    pub fn from_process_env(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        match std::env::current_exe() {
            Ok(entry_point) => config = config.with_entry_point(entry_point),
            Err(err) => tracing::warn!("built-in stages unavailable: {}", err),
        }
        if let Some(config_path) = config_path {
            tracing::info!("Config file {:?}", config_path);
            config = config.with_config_file(config_path)?;
        }
        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // configured command first, then the built-in stage
    pub fn resolve(&self, hop: Hop) -> Result<Option<CommandLine>, DelegationError> {
        if let Some(command) = self.commands.get(&hop) {
            return CommandLine::parse(command).map(Some);
        }
        let (Some(stage), Some(entry_point)) = (hop.default_stage(), &self.entry_point) else {
            return Ok(None);
        };
        let mut args = vec![];
        if let Some(config_path) = &self.config_path {
            args.push("--config-path".to_string());
            args.push(config_path.display().to_string());
        }
        args.push(stage.subcommand().to_string());
        Ok(Some(CommandLine::new(
            entry_point.display().to_string(),
            args,
        )))
    }
}
