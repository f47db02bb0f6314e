use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duration::deserialize_duration;
use crate::market_data::{DataDomain, ExternalDataSourceConfig, Watchlist, FRESHNESS_WINDOW};

pub const CONFIG_FILE_NAME: &str = "bookfeed.toml";

fn default_currency() -> String {
    "USD".to_string()
}

fn default_freshness_window() -> Duration {
    FRESHNESS_WINDOW
}

/// A data source row as written in the config file; the table name gives the domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSeed {
    pub provider: String,
    pub base_currency: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub proxy: Option<String>,
    pub update_frequency: Option<String>,
    pub skip_tls_verify: bool,
}

impl SourceSeed {
    pub fn into_config(self, domain: DataDomain) -> ExternalDataSourceConfig {
        let mut config = ExternalDataSourceConfig::new(domain, self.provider);
        config.base_currency = self.base_currency;
        config.api_key = self.api_key;
        config.request_timeout_ms = self.request_timeout_ms;
        config.proxy = self.proxy;
        config.update_frequency = self.update_frequency;
        config.skip_tls_verify = self.skip_tls_verify;
        config
    }
}

/// `[sources.<domain>]` tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSeeds {
    pub crypto: Option<SourceSeed>,
    pub stock: Option<SourceSeed>,
    pub exchange_rate: Option<SourceSeed>,
}

impl SourceSeeds {
    /// Rows for every table that names a provider.
    pub fn to_configs(&self) -> Vec<ExternalDataSourceConfig> {
        [
            (DataDomain::Crypto, &self.crypto),
            (DataDomain::Stock, &self.stock),
            (DataDomain::ExchangeRate, &self.exchange_rate),
        ]
        .into_iter()
        .filter_map(|(domain, seed)| {
            seed.as_ref()
                .filter(|s| !s.provider.trim().is_empty())
                .map(|s| s.clone().into_config(domain))
        })
        .collect()
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// Currency all valuations are expressed in.
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// How long a fetched snapshot is served before the provider is asked again.
    #[serde(
        default = "default_freshness_window",
        deserialize_with = "deserialize_duration"
    )]
    pub freshness_window: Duration,

    /// Replaces the default identification header on outbound requests.
    pub user_agent: Option<String>,

    pub watchlist: Watchlist,

    /// Rows written to the data source store for domains that have none yet.
    pub sources: SourceSeeds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_currency: default_currency(),
            freshness_window: default_freshness_window(),
            user_agent: None,
            watchlist: Watchlist::default(),
            sources: SourceSeeds::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// `data_dir` resolved against `config_dir` when relative; `config_dir` when unset.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub default_currency: String,
    pub freshness_window: Duration,
    pub user_agent: Option<String>,
    pub watchlist: Watchlist,
    pub sources: SourceSeeds,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./bookfeed.toml` if it exists in current directory
/// 2. `bookfeed/bookfeed.toml` under the XDG data directory
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    match dirs::data_dir() {
        Some(data_dir) => data_dir.join("bookfeed").join(CONFIG_FILE_NAME),
        None => local_config,
    }
}

impl ResolvedConfig {
    fn from_config(config: Config, config_dir: &Path) -> Self {
        Self {
            data_dir: config.resolve_data_dir(config_dir),
            default_currency: config.default_currency.trim().to_uppercase(),
            freshness_window: config.freshness_window,
            user_agent: config.user_agent.filter(|ua| !ua.trim().is_empty()),
            watchlist: config.watchlist,
            sources: config.sources,
        }
    }

    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_dir))
    }

    /// Like [`ResolvedConfig::load`], but a missing file yields defaults with the
    /// intended config directory as the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(Config::default(), config_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_data_dir_is_config_dir() {
        let config = Config::default();
        let config_dir = Path::new("/home/user/books");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/home/user/books")
        );
    }

    #[test]
    fn test_relative_and_absolute_data_dir() {
        let config_dir = Path::new("/home/user/books");
        let relative = Config {
            data_dir: Some(PathBuf::from("data")),
            ..Default::default()
        };
        assert_eq!(
            relative.resolve_data_dir(config_dir),
            PathBuf::from("/home/user/books/data")
        );

        let absolute = Config {
            data_dir: Some(PathBuf::from("/var/bookfeed")),
            ..Default::default()
        };
        assert_eq!(
            absolute.resolve_data_dir(config_dir),
            PathBuf::from("/var/bookfeed")
        );
    }

    #[test]
    fn test_load_empty_config_uses_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.data_dir, None);
        assert_eq!(config.default_currency, "USD");
        assert_eq!(config.freshness_window, FRESHNESS_WINDOW);
        assert!(config.watchlist.crypto.is_empty());
        assert!(config.sources.to_configs().is_empty());

        Ok(())
    }

    #[test]
    fn test_load_full_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "default_currency = \"eur\"")?;
        writeln!(file, "freshness_window = \"90s\"")?;
        writeln!(file, "user_agent = \"ledger-bot/2\"")?;
        writeln!(file, "[watchlist]")?;
        writeln!(file, "crypto = [\"BTC\", \"ETH\"]")?;
        writeln!(file, "stock = [\"AAPL\"]")?;
        writeln!(file, "[sources.exchange_rate]")?;
        writeln!(file, "provider = \"frankfurter\"")?;
        writeln!(file, "base_currency = \"EUR\"")?;
        writeln!(file, "update_frequency = \"1h\"")?;
        writeln!(file, "[sources.stock]")?;
        writeln!(file, "provider = \"yahoo_finance\"")?;
        writeln!(file, "proxy = \"none\"")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(resolved.default_currency, "EUR");
        assert_eq!(resolved.freshness_window, Duration::from_secs(90));
        assert_eq!(resolved.user_agent.as_deref(), Some("ledger-bot/2"));
        assert_eq!(resolved.watchlist.crypto, vec!["BTC", "ETH"]);

        let rows = resolved.sources.to_configs();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].domain, DataDomain::Stock);
        assert_eq!(rows[0].proxy.as_deref(), Some("none"));
        assert_eq!(rows[1].domain, DataDomain::ExchangeRate);
        assert_eq!(rows[1].update_frequency.as_deref(), Some("1h"));

        Ok(())
    }

    #[test]
    fn test_bad_freshness_window_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "freshness_window = \"soon\"\n")?;

        assert!(Config::load(&config_path).is_err());
        Ok(())
    }

    #[test]
    fn test_resolved_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path());
        assert_eq!(resolved.default_currency, "USD");
        assert_eq!(resolved.user_agent, None);

        Ok(())
    }

    #[test]
    fn test_resolved_config_resolves_relative_data_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "data_dir = \"./data\"\n")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path().canonicalize()?.join("data"));

        Ok(())
    }
}
