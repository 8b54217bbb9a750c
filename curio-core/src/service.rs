//! Request/response operations
//!
//! [`CurioService`] is the single entry point for the UI collaborator. It
//! owns the live database handle (swappable by storage relocation), the
//! mixing engine with its serve ledger, and the search provider.

use crate::db::corpus::{self, CorpusStats, RecordedInteraction, TrainingExport};
use crate::db::products::{self, NewProduct, ProductPatch};
use crate::db::sessions::{self, AppendLocks, AppendOutcome, NewMessage};
use crate::db::settings::{self, UserSettings};
use crate::db::{self as stores, ResetSummary};
use crate::mixing::{
    strategy_for, DiscoveryPercentage, Label, LabeledCandidate, MixingConfig, MixingEngine,
    ServeLedger,
};
use crate::provider::SearchProvider;
use curio_common::config::{database_path_for, TomlConfig};
use curio_common::db::{
    init_database, remove_database_files, ChatMessage, ChatSession, OutlierInteraction,
    SavedProduct,
};
use curio_common::{Database, Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// One labeled search result with the id to report interactions against
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedItem {
    pub candidate_id: Uuid,
    #[serde(flatten)]
    pub item: LabeledCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub discovery_percentage: DiscoveryPercentage,
    pub outlier_count: usize,
    pub items: Vec<ServedItem>,
    /// Set when mixing fell back to 0% because settings were unreadable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct CurioService {
    db: RwLock<Database>,
    locks: AppendLocks,
    engine: MixingEngine,
    ledger: ServeLedger,
    provider: Arc<dyn SearchProvider>,
    /// TOML file that receives `storage_path` on relocation
    config_path: Option<PathBuf>,
}

impl CurioService {
    pub fn new(
        db: Database,
        provider: Arc<dyn SearchProvider>,
        config: &TomlConfig,
        config_path: Option<PathBuf>,
    ) -> Self {
        let engine = MixingEngine::new(strategy_for(config.mixing.strategy));
        info!(
            strategy = engine.strategy_name(),
            provider = provider.name(),
            ledger_capacity = config.mixing.ledger_capacity,
            "Curio service ready"
        );

        Self {
            db: RwLock::new(db),
            locks: AppendLocks::new(),
            engine,
            ledger: ServeLedger::new(config.mixing.ledger_capacity),
            provider,
            config_path,
        }
    }

    /// Current database handle
    ///
    /// Prefer holding the read guard across an operation; a clone taken here
    /// may outlive a storage relocation.
    pub async fn database(&self) -> Database {
        self.db.read().await.clone()
    }

    // ------------------------------------------------------------------
    // Search & interactions
    // ------------------------------------------------------------------

    /// Discovery percentage for this call, falling back to 0% on failure
    async fn mixing_config(&self, db: &Database) -> (MixingConfig, Option<String>) {
        match settings::get_discovery_percentage(db).await {
            Ok(pct) => (MixingConfig::new(pct), None),
            Err(e) => {
                warn!("Discovery setting unreadable, mixing disabled for this search: {}", e);
                (
                    MixingConfig::default(),
                    Some(format!("Discovery setting unavailable; showing 0% discovery: {}", e)),
                )
            }
        }
    }

    pub async fn search_products(
        &self,
        query: &str,
        image_features: Option<&[f32]>,
    ) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() && image_features.is_none() {
            return Err(Error::InvalidInput(
                "search needs a query or image features".to_string(),
            ));
        }

        let (config, warning) = {
            let db = self.db.read().await;
            self.mixing_config(&db).await
        };

        let candidates = self.provider.search(query, image_features).await?;
        let labeled = self.engine.mix(candidates, &config);
        let ids = self.ledger.record(query, &labeled);

        let outlier_count = labeled.iter().filter(|c| c.label == Label::Outlier).count();
        let items = ids
            .into_iter()
            .zip(labeled)
            .map(|(candidate_id, item)| ServedItem { candidate_id, item })
            .collect();

        Ok(SearchResults {
            query: query.to_string(),
            discovery_percentage: config.discovery,
            outlier_count,
            items,
            warning,
        })
    }

    /// Route a click/save on a served item to the corpus or the outlier log
    pub async fn record_interaction(
        &self,
        candidate_id: &Uuid,
        label: Label,
    ) -> Result<RecordedInteraction> {
        let routed = self.ledger.route(candidate_id, label)?;
        let db = self.db.read().await;
        corpus::record(&db, &routed).await
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    pub async fn save_product(&self, product: &NewProduct) -> Result<String> {
        products::save(&*self.db.read().await, product).await
    }

    pub async fn list_products(&self) -> Result<Vec<SavedProduct>> {
        products::list(&*self.db.read().await).await
    }

    pub async fn get_product(&self, id: &str) -> Result<SavedProduct> {
        products::get(&*self.db.read().await, id).await
    }

    pub async fn remove_product(&self, id: &str) -> Result<()> {
        products::remove(&*self.db.read().await, id).await
    }

    pub async fn update_product(&self, id: &str, patch: &ProductPatch) -> Result<SavedProduct> {
        products::update(&*self.db.read().await, id, patch).await
    }

    // ------------------------------------------------------------------
    // Chat sessions
    // ------------------------------------------------------------------

    pub async fn list_chat_sessions(&self) -> Result<Vec<ChatSession>> {
        sessions::list_sessions(&*self.db.read().await).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<ChatSession> {
        sessions::get_session(&*self.db.read().await, session_id).await
    }

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        sessions::list_messages(&*self.db.read().await, session_id).await
    }

    pub async fn append_message(
        &self,
        session_id: Option<&str>,
        message: &NewMessage,
    ) -> Result<AppendOutcome> {
        let db = self.db.read().await;
        sessions::create_or_append(&db, &self.locks, session_id, message).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        sessions::delete_session(&*self.db.read().await, session_id).await
    }

    pub async fn rename_session(
        &self,
        session_id: &str,
        name: Option<&str>,
        category: Option<&str>,
    ) -> Result<ChatSession> {
        sessions::rename_session(&*self.db.read().await, session_id, name, category).await
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub async fn get_discovery_setting(&self) -> Result<DiscoveryPercentage> {
        settings::get_discovery_percentage(&*self.db.read().await).await
    }

    /// Accepts 0, 5 or 10; anything else is `InvalidSetting` and nothing is written
    pub async fn set_discovery_setting(&self, percent: u8) -> Result<DiscoveryPercentage> {
        let pct = DiscoveryPercentage::try_from(percent)?;
        settings::set_discovery_percentage(&*self.db.read().await, pct).await?;
        info!(percent, "Discovery percentage changed");
        Ok(pct)
    }

    pub async fn get_settings(&self) -> Result<UserSettings> {
        settings::load_user_settings(&*self.db.read().await).await
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        settings::get(&*self.db.read().await, key).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        settings::set(&*self.db.read().await, key, value).await
    }

    // ------------------------------------------------------------------
    // Resets & corpus
    // ------------------------------------------------------------------

    /// Clear sessions, messages, products, both interaction logs and the
    /// serve ledger. Settings survive.
    pub async fn reset_database(&self) -> Result<ResetSummary> {
        let summary = stores::reset_all(&*self.db.read().await).await?;
        self.ledger.clear();
        Ok(summary)
    }

    pub async fn reset_training_data(&self) -> Result<u64> {
        corpus::reset_training_data(&*self.db.read().await).await
    }

    pub async fn export_training_data(&self, after_id: Option<i64>) -> Result<TrainingExport> {
        let db = self.db.read().await;
        corpus::export_from(&db, after_id.unwrap_or(0)).await
    }

    pub async fn corpus_stats(&self) -> Result<CorpusStats> {
        corpus::stats(&*self.db.read().await).await
    }

    pub async fn list_outliers(&self) -> Result<Vec<OutlierInteraction>> {
        corpus::list_outliers(&*self.db.read().await).await
    }

    // ------------------------------------------------------------------
    // Storage location
    // ------------------------------------------------------------------

    pub async fn get_storage_path(&self) -> PathBuf {
        self.db.read().await.path().to_path_buf()
    }

    /// Move the database to `new_location` (a folder or a `.db` file path)
    ///
    /// Copies the live data, opens and migrates the copy, records the new
    /// location in the config file, then switches over. The old file stays
    /// where it was.
    pub async fn change_storage_path(&self, new_location: &Path) -> Result<PathBuf> {
        if new_location.as_os_str().is_empty() {
            return Err(Error::InvalidInput("storage path cannot be empty".to_string()));
        }
        let target = database_path_for(new_location);

        // Exclusive: no operation runs against either file during the move
        let mut current = self.db.write().await;
        if current.path() == target {
            return Ok(target);
        }

        current.snapshot_to(&target).await?;

        // Past this point the copy is ours; a failure removes it so the
        // same target can be retried.
        let relocated = match self.adopt_snapshot(&target).await {
            Ok(db) => db,
            Err(e) => {
                warn!(target = %target.display(), "Storage relocation failed: {}", e);
                if let Err(cleanup) = remove_database_files(&target) {
                    warn!("Could not remove partial copy {}: {}", target.display(), cleanup);
                }
                return Err(e);
            }
        };

        let previous = std::mem::replace(&mut *current, relocated);
        previous.close().await;

        info!(
            from = %previous.path().display(),
            to = %target.display(),
            "Storage relocated"
        );
        Ok(target)
    }

    /// Open and migrate a fresh snapshot, then record it in the config file
    async fn adopt_snapshot(&self, target: &Path) -> Result<Database> {
        let relocated = init_database(target).await?;

        let Some(config_path) = &self.config_path else {
            warn!("No config file in use; new storage path lasts until restart");
            return Ok(relocated);
        };

        let persisted = TomlConfig::load(config_path).and_then(|mut config| {
            config.storage_path = Some(target.to_path_buf());
            config.save(config_path)
        });
        if let Err(e) = persisted {
            relocated.close().await;
            return Err(e);
        }

        Ok(relocated)
    }
}
