//! Named quotas for the operation categories the client rate limits.
//!
//! The limiter itself knows nothing about categories. Call sites pick a
//! category, build a [`BucketKey`] for the acting identity and pass the
//! category's [`RateLimitConfig`] along with it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::window::{RateLimitConfig, TimeWindow};
use crate::error::{KoboError, Result};

/// Logical operation categories with their own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    AiGeneration,
    ImageUpload,
    NftMinting,
    IpfsUpload,
    CopyrightCheck,
    SocialAction,
    Search,
}

impl OperationCategory {
    /// Every category, in display order.
    pub const ALL: [OperationCategory; 7] = [
        OperationCategory::AiGeneration,
        OperationCategory::ImageUpload,
        OperationCategory::NftMinting,
        OperationCategory::IpfsUpload,
        OperationCategory::CopyrightCheck,
        OperationCategory::SocialAction,
        OperationCategory::Search,
    ];

    /// Prefix used when composing bucket keys.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            OperationCategory::AiGeneration => "AI_GENERATION",
            OperationCategory::ImageUpload => "IMAGE_UPLOAD",
            OperationCategory::NftMinting => "NFT_MINTING",
            OperationCategory::IpfsUpload => "IPFS_UPLOAD",
            OperationCategory::CopyrightCheck => "COPYRIGHT_CHECK",
            OperationCategory::SocialAction => "SOCIAL_ACTION",
            OperationCategory::Search => "SEARCH",
        }
    }

    /// Shipped quota for this category.
    pub fn default_config(&self) -> RateLimitConfig {
        match self {
            OperationCategory::AiGeneration => RateLimitConfig::per(10, TimeWindow::Minute),
            OperationCategory::ImageUpload => RateLimitConfig::per(5, TimeWindow::Minute),
            OperationCategory::NftMinting => RateLimitConfig::new(3, 5 * TimeWindow::Minute.as_millis()),
            OperationCategory::IpfsUpload => RateLimitConfig::per(10, TimeWindow::Minute),
            OperationCategory::CopyrightCheck => RateLimitConfig::per(20, TimeWindow::Minute),
            OperationCategory::SocialAction => RateLimitConfig::per(30, TimeWindow::Minute),
            OperationCategory::Search => RateLimitConfig::per(60, TimeWindow::Minute),
        }
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_prefix())
    }
}

impl FromStr for OperationCategory {
    type Err = KoboError;

    /// Accepts `ai_generation`, `ai-generation` and `AI_GENERATION` alike.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        OperationCategory::ALL
            .into_iter()
            .find(|category| category.key_prefix() == normalized)
            .ok_or_else(|| KoboError::Config(format!("Unknown operation category: {}", s)))
    }
}

/// A key identifying one quota bucket: a category plus the acting identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// The category this bucket belongs to
    pub category: OperationCategory,
    /// User, wallet or session the quota applies to
    pub identity: String,
}

impl BucketKey {
    pub fn new(category: OperationCategory, identity: impl Into<String>) -> Self {
        Self {
            category,
            identity: identity.into(),
        }
    }

    /// Convert the bucket key to the string the limiter tracks.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.category.key_prefix(), self.identity)
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

/// Effective quota per category: the shipped defaults plus any overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetTable {
    presets: HashMap<OperationCategory, RateLimitConfig>,
}

impl Default for PresetTable {
    fn default() -> Self {
        Self {
            presets: OperationCategory::ALL
                .into_iter()
                .map(|category| (category, category.default_config()))
                .collect(),
        }
    }
}

impl PresetTable {
    /// Create a table holding the shipped defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply overrides keyed by category name.
    ///
    /// Unknown category names and zero-length windows are configuration
    /// errors.
    pub fn with_overrides(mut self, overrides: &HashMap<String, RateLimitConfig>) -> Result<Self> {
        for (name, config) in overrides {
            let category: OperationCategory = name.parse()?;
            if config.window_ms == 0 {
                return Err(KoboError::Config(format!(
                    "Preset {} must have a non-zero window_ms",
                    name
                )));
            }
            info!(
                category = %category,
                max_requests = config.max_requests,
                window_ms = config.window_ms,
                "Overriding rate limit preset"
            );
            self.presets.insert(category, *config);
        }
        Ok(self)
    }

    /// Quota for `category`.
    pub fn get(&self, category: OperationCategory) -> &RateLimitConfig {
        // Every category is populated by Default and overrides only replace.
        &self.presets[&category]
    }

    /// Categories and their quotas, in display order.
    pub fn iter(&self) -> impl Iterator<Item = (OperationCategory, &RateLimitConfig)> + '_ {
        OperationCategory::ALL
            .into_iter()
            .map(move |category| (category, self.get(category)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_to_string() {
        let key = BucketKey::new(OperationCategory::AiGeneration, "user123");
        assert_eq!(key.to_string_key(), "AI_GENERATION:user123");
        assert_eq!(key.to_string(), "AI_GENERATION:user123");
    }

    #[test]
    fn test_bucket_key_equality() {
        let key1 = BucketKey::new(OperationCategory::Search, "alice");
        let key2 = BucketKey::new(OperationCategory::Search, "alice");
        let key3 = BucketKey::new(OperationCategory::SocialAction, "alice");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(
            "ai_generation".parse::<OperationCategory>().unwrap(),
            OperationCategory::AiGeneration
        );
        assert_eq!(
            "nft-minting".parse::<OperationCategory>().unwrap(),
            OperationCategory::NftMinting
        );
        assert_eq!(
            "IPFS_UPLOAD".parse::<OperationCategory>().unwrap(),
            OperationCategory::IpfsUpload
        );
        assert!("teleport".parse::<OperationCategory>().is_err());
    }

    #[test]
    fn test_default_presets_cover_all_categories() {
        let table = PresetTable::new();
        assert_eq!(table.iter().count(), OperationCategory::ALL.len());

        for (_, config) in table.iter() {
            assert!(config.max_requests > 0);
            assert!(config.window_ms > 0);
        }
    }

    #[test]
    fn test_default_values() {
        let table = PresetTable::new();
        assert_eq!(
            *table.get(OperationCategory::AiGeneration),
            RateLimitConfig::new(10, 60_000)
        );
        assert_eq!(
            *table.get(OperationCategory::ImageUpload),
            RateLimitConfig::new(5, 60_000)
        );
        assert_eq!(
            *table.get(OperationCategory::NftMinting),
            RateLimitConfig::new(3, 300_000)
        );
    }

    #[test]
    fn test_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("search".to_string(), RateLimitConfig::new(5, 1_000));

        let table = PresetTable::new().with_overrides(&overrides).unwrap();

        assert_eq!(
            *table.get(OperationCategory::Search),
            RateLimitConfig::new(5, 1_000)
        );
        assert_eq!(
            *table.get(OperationCategory::AiGeneration),
            OperationCategory::AiGeneration.default_config()
        );
    }

    #[test]
    fn test_override_unknown_category() {
        let mut overrides = HashMap::new();
        overrides.insert("bogus".to_string(), RateLimitConfig::new(5, 1_000));

        let err = PresetTable::new().with_overrides(&overrides).unwrap_err();
        assert!(matches!(err, KoboError::Config(_)));
    }

    #[test]
    fn test_override_zero_window() {
        let mut overrides = HashMap::new();
        overrides.insert("search".to_string(), RateLimitConfig::new(5, 0));

        assert!(PresetTable::new().with_overrides(&overrides).is_err());
    }
}
