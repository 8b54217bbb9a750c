//! Discovery mixing engine
//!
//! Labels every served candidate `personalized` or `outlier` and routes the
//! interactions reported back on them. Interactions on outlier items never
//! reach the training corpus: the corpus writers only accept a
//! [`RoutedInteraction`], and only the serve ledger can produce one.

pub mod diversity;
pub mod engine;
pub mod ledger;

pub use diversity::{strategy_for, CategorySignature, DiversityStrategy, FeatureVector};
pub use engine::{outlier_count, LabeledCandidate, MixingEngine};
pub use ledger::{RoutedInteraction, ServeLedger, ServedCandidate};

use curio_common::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label attached to a candidate at serve time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Personalized,
    Outlier,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Personalized => write!(f, "personalized"),
            Label::Outlier => write!(f, "outlier"),
        }
    }
}

/// Share of results turned into discovery items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiscoveryPercentage {
    #[default]
    Off,
    Five,
    Ten,
}

impl DiscoveryPercentage {
    pub const ALL: [DiscoveryPercentage; 3] = [
        DiscoveryPercentage::Off,
        DiscoveryPercentage::Five,
        DiscoveryPercentage::Ten,
    ];

    pub fn as_percent(self) -> u8 {
        match self {
            DiscoveryPercentage::Off => 0,
            DiscoveryPercentage::Five => 5,
            DiscoveryPercentage::Ten => 10,
        }
    }
}

impl TryFrom<u8> for DiscoveryPercentage {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DiscoveryPercentage::Off),
            5 => Ok(DiscoveryPercentage::Five),
            10 => Ok(DiscoveryPercentage::Ten),
            other => Err(Error::InvalidSetting(format!(
                "discovery_percentage must be 0, 5 or 10 (got {})",
                other
            ))),
        }
    }
}

impl From<DiscoveryPercentage> for u8 {
    fn from(value: DiscoveryPercentage) -> Self {
        value.as_percent()
    }
}

impl FromStr for DiscoveryPercentage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u8 = s.trim().parse().map_err(|_| {
            Error::InvalidSetting(format!(
                "discovery_percentage must be 0, 5 or 10 (got '{}')",
                s
            ))
        })?;
        DiscoveryPercentage::try_from(value)
    }
}

impl fmt::Display for DiscoveryPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_percent())
    }
}

/// Per-call mixing configuration, read from the settings store by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixingConfig {
    pub discovery: DiscoveryPercentage,
}

impl MixingConfig {
    pub fn new(discovery: DiscoveryPercentage) -> Self {
        Self { discovery }
    }
}
