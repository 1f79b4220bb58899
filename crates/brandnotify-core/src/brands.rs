use std::collections::BTreeMap;
use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::matcher::{normalize, BrandKey};
use crate::ConfigError;

/// One entry of `config/brands.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Overrides the uniform notification cooldown for this brand.
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    /// Addresses notified in addition to those inferred from reports.
    #[serde(default)]
    pub contact_emails: Vec<String>,
}

impl BrandConfig {
    #[must_use]
    pub fn key(&self) -> BrandKey {
        normalize(&self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct BrandsFile {
    pub brands: Vec<BrandConfig>,
}

/// Load and validate the brands configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_brands(path: &Path) -> Result<BrandsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::BrandsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let brands_file: BrandsFile =
        serde_yaml::from_str(&content).map_err(ConfigError::BrandsFileParse)?;

    validate_brands(&brands_file)?;

    Ok(brands_file)
}

fn validate_brands(brands_file: &BrandsFile) -> Result<(), ConfigError> {
    let mut seen_keys: BTreeMap<BrandKey, &str> = BTreeMap::new();

    for brand in &brands_file.brands {
        if brand.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "brand name must be non-empty".to_string(),
            ));
        }

        let key = brand.key();
        if key.is_empty() {
            return Err(ConfigError::Validation(format!(
                "brand '{}' normalizes to an empty key",
                brand.name
            )));
        }

        if brand.cooldown_secs == Some(0) {
            return Err(ConfigError::Validation(format!(
                "brand '{}' has a zero cooldown_secs",
                brand.name
            )));
        }

        if let Some(first) = seen_keys.get(&key) {
            return Err(ConfigError::DuplicateBrandKey {
                key: key.to_string(),
                first: (*first).to_string(),
                second: brand.name.clone(),
            });
        }
        seen_keys.insert(key, &brand.name);
    }

    Ok(())
}

/// A brand as the pipeline sees it: canonical key plus presentation and policy.
#[derive(Debug, Clone)]
pub struct ConfiguredBrand {
    pub key: BrandKey,
    pub name: String,
    pub display_name: String,
    pub cooldown: Option<Duration>,
    pub contact_emails: Vec<String>,
}

/// Key-indexed view of the configured brands used for matching.
#[derive(Debug, Clone, Default)]
pub struct BrandCatalog {
    by_key: BTreeMap<BrandKey, ConfiguredBrand>,
}

impl BrandCatalog {
    /// Build a catalog from brand configs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateBrandKey`] if two names normalize to the
    /// same key, or [`ConfigError::Validation`] for blank names.
    pub fn from_configs(configs: &[BrandConfig]) -> Result<Self, ConfigError> {
        let mut by_key: BTreeMap<BrandKey, ConfiguredBrand> = BTreeMap::new();

        for config in configs {
            let key = config.key();
            if key.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "brand '{}' normalizes to an empty key",
                    config.name
                )));
            }
            if let Some(existing) = by_key.get(&key) {
                return Err(ConfigError::DuplicateBrandKey {
                    key: key.to_string(),
                    first: existing.name.clone(),
                    second: config.name.clone(),
                });
            }

            let display_name = config
                .display_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(config.name.trim())
                .to_string();

            let cooldown = config
                .cooldown_secs
                .and_then(|secs| i64::try_from(secs).ok())
                .map(Duration::seconds);

            by_key.insert(
                key.clone(),
                ConfiguredBrand {
                    key,
                    name: config.name.clone(),
                    display_name,
                    cooldown,
                    contact_emails: config.contact_emails.clone(),
                },
            );
        }

        Ok(Self { by_key })
    }

    /// Build a catalog from bare brand names with no overrides.
    ///
    /// # Errors
    ///
    /// Same as [`BrandCatalog::from_configs`].
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let configs: Vec<BrandConfig> = names
            .iter()
            .map(|n| BrandConfig {
                name: n.as_ref().to_string(),
                display_name: None,
                cooldown_secs: None,
                contact_emails: vec![],
            })
            .collect();
        Self::from_configs(&configs)
    }

    /// Resolve a free-text analysis brand name to a configured brand.
    #[must_use]
    pub fn match_analysis(&self, analysis_brand_name: &str) -> Option<&ConfiguredBrand> {
        crate::matcher::match_brand(analysis_brand_name, self.by_key.keys())
            .and_then(|key| self.by_key.get(&key))
    }

    #[must_use]
    pub fn get(&self, key: &BrandKey) -> Option<&ConfiguredBrand> {
        self.by_key.get(key)
    }

    /// Cooldown for `key`, falling back to `default` when the brand has no override.
    #[must_use]
    pub fn cooldown_for(&self, key: &BrandKey, default: Duration) -> Duration {
        self.by_key
            .get(key)
            .and_then(|b| b.cooldown)
            .unwrap_or(default)
    }

    pub fn brands(&self) -> impl Iterator<Item = &ConfiguredBrand> {
        self.by_key.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
#[path = "brands_test.rs"]
mod tests;
