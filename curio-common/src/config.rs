//! Configuration loading and storage location resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Database file name used when the storage location names a folder
pub const DATABASE_FILE_NAME: &str = "curio.db";

/// Environment variable overriding the storage location
pub const ROOT_ENV_VAR: &str = "CURIO_ROOT";

/// Contents of `config.toml`
///
/// Every section is optional; a missing file is equivalent to an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Database folder or file. Rewritten by storage relocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub mixing: MixingConfigSection,
}

/// `[search]` section: search-provider endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of an Algolia-compatible query API. None disables search.
    pub endpoint: Option<String>,
    pub index: String,
    pub app_id: Option<String>,
    pub api_key: Option<String>,
    pub hits_per_page: u32,
    /// Top-level hit fields folded into a candidate's attribute signature
    pub attribute_keys: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            index: "products".to_string(),
            app_id: None,
            api_key: None,
            hits_per_page: 20,
            attribute_keys: vec![
                "brand".to_string(),
                "color".to_string(),
                "material".to_string(),
                "style".to_string(),
            ],
            timeout_ms: 5000,
        }
    }
}

/// Which diversity metric the mixing engine uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Category,
    FeatureVector,
}

/// `[mixing]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixingConfigSection {
    /// Served candidates remembered for interaction routing
    pub ledger_capacity: usize,
    pub strategy: StrategyKind,
}

impl Default for MixingConfigSection {
    fn default() -> Self {
        Self {
            ledger_capacity: 4096,
            strategy: StrategyKind::Category,
        }
    }
}

impl TomlConfig {
    /// Default config file location for the platform
    ///
    /// `~/.config/curio/config.toml` on Linux, the platform config dir elsewhere.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("curio").join("config.toml"))
    }

    /// Load configuration from `path`
    ///
    /// A missing file yields defaults with a warning; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        info!("Loaded config file: {}", path.display());
        Ok(config)
    }

    /// Write configuration to `path`, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;

        Ok(())
    }
}

/// Storage location resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `CURIO_ROOT`
/// 3. TOML `storage_path`
/// 4. OS-dependent compiled default (fallback)
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_config(mut self, config: &TomlConfig) -> Self {
        self.toml_path = config.storage_path.clone();
        self
    }

    /// Resolve the database file path
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = self.override_root() {
            let resolved = database_path_for(&path);
            if let Some(shadowed) = self.shadowed_storage_path() {
                warn!(
                    "Config storage_path {} ignored; using {} from --root-folder/{}",
                    shadowed.display(),
                    resolved.display(),
                    ROOT_ENV_VAR
                );
            }
            return resolved;
        }

        if let Some(path) = &self.toml_path {
            return database_path_for(path);
        }

        database_path_for(&default_root_folder())
    }

    /// TOML `storage_path` hidden by a CLI or env root naming another file
    pub fn shadowed_storage_path(&self) -> Option<PathBuf> {
        let toml_db = database_path_for(self.toml_path.as_ref()?);
        let override_db = database_path_for(&self.override_root()?);
        (toml_db != override_db).then_some(toml_db)
    }

    fn override_root(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_arg {
            return Some(path.clone());
        }

        std::env::var(ROOT_ENV_VAR)
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
    }
}

/// Map a storage location to a database file
///
/// Paths with a `.db`/`.sqlite`/`.sqlite3` extension name the file itself;
/// anything else is treated as a folder holding `curio.db`.
pub fn database_path_for(location: &Path) -> PathBuf {
    let is_file = location
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "db" | "sqlite" | "sqlite3"))
        .unwrap_or(false);

    if is_file {
        location.to_path_buf()
    } else {
        location.join(DATABASE_FILE_NAME)
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/curio
        dirs::data_local_dir()
            .map(|d| d.join("curio"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/curio"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/curio
        dirs::data_dir()
            .map(|d| d.join("curio"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/curio"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\curio
        dirs::data_local_dir()
            .map(|d| d.join("curio"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\curio"))
    } else {
        PathBuf::from("./curio_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_database_path_for_folder() {
        let path = database_path_for(Path::new("/tmp/curio-data"));
        assert_eq!(path, PathBuf::from("/tmp/curio-data/curio.db"));
    }

    #[test]
    fn test_database_path_for_file() {
        let path = database_path_for(Path::new("/tmp/elsewhere/store.sqlite"));
        assert_eq!(path, PathBuf::from("/tmp/elsewhere/store.sqlite"));

        let path = database_path_for(Path::new("/tmp/elsewhere/STORE.DB"));
        assert_eq!(path, PathBuf::from("/tmp/elsewhere/STORE.DB"));
    }

    #[test]
    fn test_toml_defaults_from_empty_document() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.search.hits_per_page, 20);
        assert_eq!(config.mixing.ledger_capacity, 4096);
        assert_eq!(config.mixing.strategy, StrategyKind::Category);
    }

    #[test]
    fn test_toml_partial_sections() {
        let config: TomlConfig = toml::from_str(
            r#"
            storage_path = "/data/curio"

            [search]
            endpoint = "https://search.example.test"
            index = "catalog"

            [mixing]
            strategy = "feature_vector"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_path, Some(PathBuf::from("/data/curio")));
        assert_eq!(config.search.endpoint.as_deref(), Some("https://search.example.test"));
        assert_eq!(config.search.index, "catalog");
        assert_eq!(config.search.timeout_ms, 5000);
        assert_eq!(config.mixing.strategy, StrategyKind::FeatureVector);
        assert_eq!(config.mixing.ledger_capacity, 4096);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TomlConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_load_malformed_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "storage_path = [").unwrap();

        let err = TomlConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = TomlConfig {
            storage_path: Some(PathBuf::from("/srv/curio/curio.db")),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = TomlConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    #[serial]
    fn test_resolver_priority() {
        std::env::remove_var(ROOT_ENV_VAR);
        let config = TomlConfig {
            storage_path: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };

        let resolved = RootFolderResolver::new()
            .with_cli_arg(Some(PathBuf::from("/from/cli")))
            .with_config(&config)
            .resolve();
        assert_eq!(resolved, PathBuf::from("/from/cli/curio.db"));

        std::env::set_var(ROOT_ENV_VAR, "/from/env");
        let resolved = RootFolderResolver::new().with_config(&config).resolve();
        assert_eq!(resolved, PathBuf::from("/from/env/curio.db"));

        std::env::remove_var(ROOT_ENV_VAR);
        let resolved = RootFolderResolver::new().with_config(&config).resolve();
        assert_eq!(resolved, PathBuf::from("/from/toml/curio.db"));
    }

    #[test]
    #[serial]
    fn test_resolver_falls_back_to_default_root() {
        std::env::remove_var(ROOT_ENV_VAR);
        let resolved = RootFolderResolver::new().resolve();
        assert_eq!(resolved, database_path_for(&default_root_folder()));
    }

    #[test]
    #[serial]
    fn test_shadowed_storage_path() {
        std::env::remove_var(ROOT_ENV_VAR);
        let config = TomlConfig {
            storage_path: Some(PathBuf::from("/moved/curio.db")),
            ..Default::default()
        };

        let resolver = RootFolderResolver::new()
            .with_cli_arg(Some(PathBuf::from("/original")))
            .with_config(&config);
        assert_eq!(resolver.shadowed_storage_path(), Some(PathBuf::from("/moved/curio.db")));
        assert_eq!(resolver.resolve(), PathBuf::from("/original/curio.db"));

        // Same file named two ways is not shadowed
        let resolver = RootFolderResolver::new()
            .with_cli_arg(Some(PathBuf::from("/moved")))
            .with_config(&config);
        assert_eq!(resolver.shadowed_storage_path(), None);

        std::env::set_var(ROOT_ENV_VAR, "/from/env");
        let resolver = RootFolderResolver::new().with_config(&config);
        assert_eq!(resolver.shadowed_storage_path(), Some(PathBuf::from("/moved/curio.db")));

        std::env::remove_var(ROOT_ENV_VAR);
        let resolver = RootFolderResolver::new().with_config(&config);
        assert_eq!(resolver.shadowed_storage_path(), None);
        assert_eq!(resolver.resolve(), PathBuf::from("/moved/curio.db"));
    }
}
