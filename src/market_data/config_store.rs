//! Persistence of the per-domain data source rows.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::sync::Mutex;

use super::{DataDomain, ExternalDataSourceConfig, DEFAULT_REQUEST_TIMEOUT_MS};

/// Storage for [`ExternalDataSourceConfig`] rows, at most one per domain.
#[async_trait::async_trait]
pub trait DataSourceConfigStore: Send + Sync {
    async fn get(&self, domain: DataDomain) -> Result<Option<ExternalDataSourceConfig>>;

    /// Inserts or replaces the row for `config.domain`.
    async fn save(&self, config: ExternalDataSourceConfig) -> Result<()>;

    async fn list(&self) -> Result<Vec<ExternalDataSourceConfig>>;
}

/// Rows written when a store has nothing for crypto or stock.
pub fn default_configs() -> Vec<ExternalDataSourceConfig> {
    vec![
        ExternalDataSourceConfig::new(DataDomain::Crypto, "coingecko")
            .with_base_currency("USD")
            .with_timeout_ms(DEFAULT_REQUEST_TIMEOUT_MS),
        ExternalDataSourceConfig::new(DataDomain::Stock, "financial_modeling_prep")
            .with_timeout_ms(DEFAULT_REQUEST_TIMEOUT_MS),
    ]
}

/// Saves each of `rows` whose domain has no row yet. Returns the domains written.
pub async fn seed_missing(
    store: &dyn DataSourceConfigStore,
    rows: impl IntoIterator<Item = ExternalDataSourceConfig>,
) -> Result<Vec<DataDomain>> {
    let mut seeded = Vec::new();
    for row in rows {
        if seeded.contains(&row.domain) || store.get(row.domain).await?.is_some() {
            continue;
        }
        seeded.push(row.domain);
        store.save(row).await?;
    }
    Ok(seeded)
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryConfigStore {
    rows: Mutex<HashMap<DataDomain, ExternalDataSourceConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = ExternalDataSourceConfig>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().map(|r| (r.domain, r)).collect()),
        }
    }
}

#[async_trait::async_trait]
impl DataSourceConfigStore for MemoryConfigStore {
    async fn get(&self, domain: DataDomain) -> Result<Option<ExternalDataSourceConfig>> {
        Ok(self.rows.lock().await.get(&domain).cloned())
    }

    async fn save(&self, config: ExternalDataSourceConfig) -> Result<()> {
        self.rows.lock().await.insert(config.domain, config);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ExternalDataSourceConfig>> {
        let rows = self.rows.lock().await;
        Ok(DataDomain::ALL
            .iter()
            .filter_map(|d| rows.get(d).cloned())
            .collect())
    }
}

/// JSON file store.
///
/// ```text
/// data/
///   data_sources.json   # array of rows
/// ```
pub struct JsonFileConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileConfigStore {
    pub const FILE_NAME: &'static str = "data_sources.json";

    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(Self::FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_rows(&self) -> Result<Vec<ExternalDataSourceConfig>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON from {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn write_rows(&self, rows: &[ExternalDataSourceConfig]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create directory")?;
        }
        let content = serde_json::to_string_pretty(rows).context("Failed to serialize JSON")?;

        // Readers must never observe a partially written file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .context("Failed to write file")?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataSourceConfigStore for JsonFileConfigStore {
    async fn get(&self, domain: DataDomain) -> Result<Option<ExternalDataSourceConfig>> {
        Ok(self
            .read_rows()
            .await?
            .into_iter()
            .find(|row| row.domain == domain))
    }

    async fn save(&self, config: ExternalDataSourceConfig) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.read_rows().await?;
        rows.retain(|row| row.domain != config.domain);
        rows.push(config);
        rows.sort_by_key(|row| DataDomain::ALL.iter().position(|d| *d == row.domain));
        self.write_rows(&rows).await
    }

    async fn list(&self) -> Result<Vec<ExternalDataSourceConfig>> {
        self.read_rows().await
    }
}
