//! Database models
//!
//! Timestamps are unix epoch milliseconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings table keys
pub mod keys {
    pub const DISCOVERY_PERCENTAGE: &str = "discovery_percentage";
    pub const THEME: &str = "theme";
    pub const FONT_SIZE: &str = "font_size";
    pub const SEND_ON_ENTER: &str = "send_on_enter";
    pub const SHOW_TIMESTAMPS: &str = "show_timestamps";
    pub const AUTO_SAVE: &str = "auto_save";
}

/// Defaults seeded into the settings table on every migrate
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    (keys::DISCOVERY_PERCENTAGE, "0"),
    (keys::THEME, "system"),
    (keys::FONT_SIZE, "medium"),
    (keys::SEND_ON_ENTER, "true"),
    (keys::SHOW_TIMESTAMPS, "false"),
    (keys::AUTO_SAVE, "true"),
];

/// Default value for a known settings key
pub fn default_setting(key: &str) -> Option<&'static str> {
    DEFAULT_SETTINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatSession {
    pub id: String,
    pub name: String,
    pub category: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub image_ref: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SavedProduct {
    pub id: String,
    /// Identifier assigned by the search provider
    pub object_id: String,
    pub custom_name: Option<String>,
    #[sqlx(json)]
    pub tags: Vec<String>,
    /// Raw provider hit as returned at save time
    #[sqlx(json)]
    pub payload: serde_json::Value,
    pub saved_at: i64,
}

/// Row of the ML training corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrainingInteraction {
    pub id: i64,
    pub query: String,
    pub chosen_object_id: String,
    #[sqlx(json)]
    pub features: serde_json::Value,
    pub timestamp: i64,
}

/// Row of the discovery exposure log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutlierInteraction {
    pub id: i64,
    pub query: String,
    pub shown_object_id: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_has_a_default() {
        for key in [
            keys::DISCOVERY_PERCENTAGE,
            keys::THEME,
            keys::FONT_SIZE,
            keys::SEND_ON_ENTER,
            keys::SHOW_TIMESTAMPS,
            keys::AUTO_SAVE,
        ] {
            assert!(default_setting(key).is_some(), "missing default for {}", key);
        }
        assert_eq!(default_setting("unknown"), None);
    }

    #[test]
    fn test_discovery_defaults_to_off() {
        assert_eq!(default_setting(keys::DISCOVERY_PERCENTAGE), Some("0"));
    }

    #[test]
    fn test_role_text_form() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
