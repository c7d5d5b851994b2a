//! Application configuration and wiring
//!
//! [`AppConfig`] carries where things live (database, detector endpoint) and
//! how to reach them. [`App::open`] builds the store, history, settings and
//! session from it, passing the store explicitly to each component.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::remote::DEFAULT_ENDPOINT;
use crate::analysis::{AnalysisGateway, CrackAnalyzer, OfflineAnalyzer, RemoteAnalyzer};
use crate::error::Result;
use crate::state::history::History;
use crate::state::library::{KvStore, SqliteStore};
use crate::state::memory::MemoryStore;
use crate::state::records::{RecordStore, DEFAULT_PREFIX};
use crate::state::session::Session;
use crate::state::settings::Settings;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Base URL of the crack detector
    pub endpoint: String,
    pub db_path: PathBuf,
    pub request_timeout: Duration,
    /// Key prefix for analysis records
    pub prefix: String,
    /// Use the built-in offline analyzer instead of the endpoint
    pub offline: bool,
    /// Seed for the offline analyzer; random when unset
    pub seed: Option<u64>,
    /// Keep history in memory only
    pub ephemeral: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            db_path: SqliteStore::default_path(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            prefix: DEFAULT_PREFIX.to_string(),
            offline: false,
            seed: None,
            ephemeral: false,
        }
    }
}

impl AppConfig {
    fn analyzer(&self) -> Result<Arc<dyn CrackAnalyzer>> {
        if self.offline {
            let analyzer = match self.seed {
                Some(seed) => OfflineAnalyzer::with_seed(seed),
                None => OfflineAnalyzer::new(),
            };
            return Ok(Arc::new(analyzer));
        }

        Ok(Arc::new(RemoteAnalyzer::new(
            self.endpoint.clone(),
            self.request_timeout,
        )?))
    }

    fn store(&self) -> Result<Arc<dyn KvStore>> {
        if self.ephemeral {
            Ok(Arc::new(MemoryStore::new()))
        } else {
            Ok(Arc::new(SqliteStore::open(&self.db_path)?))
        }
    }
}

/// Everything a front end needs, wired together
pub struct App {
    pub store: Arc<dyn KvStore>,
    pub history: Arc<History>,
    pub settings: Arc<Settings>,
    pub session: Session,
}

impl App {
    /// Open the store, load saved settings and the current history
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let store = config.store()?;
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: &AppConfig, store: Arc<dyn KvStore>) -> Result<Self> {
        let records = RecordStore::with_prefix(Arc::clone(&store), config.prefix.clone());
        let history = Arc::new(History::new(records.clone()));
        let settings = Arc::new(Settings::load(store.as_ref()).await);
        let gateway = AnalysisGateway::new(config.analyzer()?);

        let entries = history.refresh().await?;
        tracing::info!(
            "🎨 Crack inspector initialized with {} records ({} analyzer)",
            entries,
            gateway.analyzer_name()
        );

        let session = Session::new(gateway, records, Arc::clone(&history), Arc::clone(&settings));

        Ok(Self {
            store,
            history,
            settings,
            session,
        })
    }

    /// Persist the current settings
    pub async fn save_settings(&self) -> Result<()> {
        self.settings.save(self.store.as_ref()).await
    }
}
