//! Settings database access
//!
//! Read/write the `settings` key/value table. Known keys are validated before
//! anything is written; unknown keys are stored as given.

use crate::mixing::DiscoveryPercentage;
use curio_common::db::{default_setting, keys, Setting};
use curio_common::{Database, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

pub const THEMES: &[&str] = &["light", "dark", "system"];
pub const FONT_SIZES: &[&str] = &["small", "medium", "large"];

/// Every setting, known keys typed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub discovery_percentage: DiscoveryPercentage,
    pub theme: String,
    pub font_size: String,
    pub send_on_enter: bool,
    pub show_timestamps: bool,
    pub auto_save: bool,
    /// Keys this build does not interpret
    #[serde(flatten)]
    pub other: BTreeMap<String, String>,
}

/// Reject a value that is out of range for a known key
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::InvalidSetting("setting key cannot be empty".to_string()));
    }

    let one_of = |allowed: &[&str]| {
        if allowed.contains(&value) {
            Ok(())
        } else {
            Err(Error::InvalidSetting(format!(
                "{} must be one of {} (got '{}')",
                key,
                allowed.join(", "),
                value
            )))
        }
    };

    match key {
        keys::DISCOVERY_PERCENTAGE => DiscoveryPercentage::from_str(value).map(|_| ()),
        keys::THEME => one_of(THEMES),
        keys::FONT_SIZE => one_of(FONT_SIZES),
        keys::SEND_ON_ENTER | keys::SHOW_TIMESTAMPS | keys::AUTO_SAVE => one_of(&["true", "false"]),
        _ => Ok(()),
    }
}

/// Generic setting getter
///
/// Returns None if the key has no row. Parses the stored string with `FromStr`.
pub async fn get_setting<T: FromStr>(db: &Database, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db.pool())
            .await?;

    match value.flatten() {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::InvalidSetting(format!(
                "Stored value for '{}' is unreadable: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or overwrites. Callers validate first.
pub async fn set_setting<T: ToString>(db: &Database, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(&value_str)
    .bind(curio_common::time::now_millis())
    .execute(db.pool())
    .await?;

    debug!(key, value = %value_str, "Setting updated");
    Ok(())
}

/// Stored value, or the built-in default for a known key
pub async fn get(db: &Database, key: &str) -> Result<Option<String>> {
    let stored = get_setting::<String>(db, key).await?;
    Ok(stored.or_else(|| default_setting(key).map(str::to_string)))
}

/// Validate then persist
pub async fn set(db: &Database, key: &str, value: &str) -> Result<()> {
    let value = value.trim();
    validate_setting(key, value)?;
    set_setting(db, key, value).await
}

pub async fn get_discovery_percentage(db: &Database) -> Result<DiscoveryPercentage> {
    Ok(get_setting::<DiscoveryPercentage>(db, keys::DISCOVERY_PERCENTAGE)
        .await?
        .unwrap_or_default())
}

pub async fn set_discovery_percentage(db: &Database, pct: DiscoveryPercentage) -> Result<()> {
    set_setting(db, keys::DISCOVERY_PERCENTAGE, pct).await
}

/// Every setting with defaults filled in
///
/// A stored value that fails validation is reported with a warning and
/// replaced by its default.
pub async fn load_user_settings(db: &Database) -> Result<UserSettings> {
    let rows = sqlx::query_as::<_, Setting>(
        "SELECT key, value FROM settings WHERE value IS NOT NULL ORDER BY key",
    )
    .fetch_all(db.pool())
    .await?;

    let mut stored: BTreeMap<String, String> =
        rows.into_iter().map(|s| (s.key, s.value)).collect();

    let mut take = |key: &str| -> String {
        let fallback = default_setting(key).unwrap_or_default().to_string();
        match stored.remove(key) {
            Some(value) if validate_setting(key, &value).is_ok() => value,
            Some(value) => {
                warn!("Setting '{}' has invalid value '{}', using default '{}'", key, value, fallback);
                fallback
            }
            None => fallback,
        }
    };

    let discovery_percentage = take(keys::DISCOVERY_PERCENTAGE).parse().unwrap_or_default();
    let theme = take(keys::THEME);
    let font_size = take(keys::FONT_SIZE);
    let send_on_enter = take(keys::SEND_ON_ENTER) == "true";
    let show_timestamps = take(keys::SHOW_TIMESTAMPS) == "true";
    let auto_save = take(keys::AUTO_SAVE) == "true";

    Ok(UserSettings {
        discovery_percentage,
        theme,
        font_size,
        send_on_enter,
        show_timestamps,
        auto_save,
        other: stored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_common::db::init_database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = init_database(&dir.path().join("curio.db")).await.unwrap();
        (dir, db)
    }

    #[test]
    fn test_validate_known_keys() {
        assert!(validate_setting("discovery_percentage", "10").is_ok());
        assert!(validate_setting("discovery_percentage", "7").is_err());
        assert!(validate_setting("theme", "dark").is_ok());
        assert!(validate_setting("theme", "neon").is_err());
        assert!(validate_setting("font_size", "large").is_ok());
        assert!(validate_setting("font_size", "huge").is_err());
        assert!(validate_setting("auto_save", "false").is_ok());
        assert!(validate_setting("auto_save", "yes").is_err());
        assert!(validate_setting("anything_else", "free form").is_ok());
        assert!(validate_setting(" ", "x").is_err());
    }

    #[tokio::test]
    async fn test_get_falls_back_to_default() {
        let (_dir, db) = setup().await;
        sqlx::query("DELETE FROM settings WHERE key = 'theme'")
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(get(&db, "theme").await.unwrap().as_deref(), Some("system"));
        assert_eq!(get(&db, "unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_before_writing() {
        let (_dir, db) = setup().await;

        let err = set(&db, "discovery_percentage", "50").await.unwrap_err();
        assert!(matches!(err, Error::InvalidSetting(_)));
        assert_eq!(
            get_discovery_percentage(&db).await.unwrap(),
            DiscoveryPercentage::Off
        );
    }

    #[tokio::test]
    async fn test_discovery_round_trip() {
        let (_dir, db) = setup().await;

        set_discovery_percentage(&db, DiscoveryPercentage::Ten).await.unwrap();
        assert_eq!(
            get_discovery_percentage(&db).await.unwrap(),
            DiscoveryPercentage::Ten
        );
        assert_eq!(get(&db, "discovery_percentage").await.unwrap().as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_unreadable_discovery_value_is_error() {
        let (_dir, db) = setup().await;
        sqlx::query("UPDATE settings SET value = 'lots' WHERE key = 'discovery_percentage'")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(matches!(
            get_discovery_percentage(&db).await,
            Err(Error::InvalidSetting(_))
        ));
    }

    #[tokio::test]
    async fn test_load_user_settings() {
        let (_dir, db) = setup().await;
        set(&db, "theme", "dark").await.unwrap();
        set(&db, "show_timestamps", "true").await.unwrap();
        set(&db, "language", "fr").await.unwrap();
        sqlx::query("UPDATE settings SET value = 'gigantic' WHERE key = 'font_size'")
            .execute(db.pool())
            .await
            .unwrap();

        let settings = load_user_settings(&db).await.unwrap();

        assert_eq!(settings.discovery_percentage, DiscoveryPercentage::Off);
        assert_eq!(settings.theme, "dark");
        assert_eq!(settings.font_size, "medium");
        assert!(settings.send_on_enter);
        assert!(settings.show_timestamps);
        assert!(settings.auto_save);
        assert_eq!(settings.other.get("language").map(String::as_str), Some("fr"));
        assert!(!settings.other.contains_key("theme"));
    }
}
