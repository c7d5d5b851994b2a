//! Analysis parameters
//!
//! [`AnalysisConfiguration`] is the value copied into every analysis request.
//! [`Settings`] holds the current one; edits only affect the next request,
//! since each request captures its configuration by value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;

use super::library::KvStore;
use crate::error::{Error, Result};

/// Key the configuration is saved under in the key-value store
pub const SETTINGS_KEY: &str = "crack-settings";

/// How eagerly the detector reports a crack
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

/// All parameters for one analysis request
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfiguration {
    pub sensitivity: Sensitivity,
    /// Unit system for physical crack measurements
    pub unit: UnitSystem,
    /// Whether results should carry an engineering recommendation
    pub include_recommendations: bool,
}

impl Default for AnalysisConfiguration {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::Medium,
            unit: UnitSystem::Metric,
            include_recommendations: true,
        }
    }
}

impl AnalysisConfiguration {
    /// Convert to JSON string for storage
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string (from storage)
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Return a copy with the supplied fields replaced
    pub fn apply(mut self, update: &ConfigurationUpdate) -> Self {
        if let Some(sensitivity) = update.sensitivity {
            self.sensitivity = sensitivity;
        }
        if let Some(unit) = update.unit {
            self.unit = unit;
        }
        if let Some(include) = update.include_recommendations {
            self.include_recommendations = include;
        }
        self
    }
}

/// A partial configuration edit; `None` fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigurationUpdate {
    pub sensitivity: Option<Sensitivity>,
    pub unit: Option<UnitSystem>,
    pub include_recommendations: Option<bool>,
}

impl ConfigurationUpdate {
    pub fn is_empty(&self) -> bool {
        self.sensitivity.is_none() && self.unit.is_none() && self.include_recommendations.is_none()
    }
}

/// Holds the current configuration
#[derive(Debug, Default)]
pub struct Settings {
    current: RwLock<AnalysisConfiguration>,
}

impl Settings {
    pub fn new(config: AnalysisConfiguration) -> Self {
        Self {
            current: RwLock::new(config),
        }
    }

    /// Snapshot of the current configuration
    pub async fn current(&self) -> AnalysisConfiguration {
        *self.current.read().await
    }

    /// Replace only the supplied fields, returning the new configuration
    pub async fn update(&self, update: ConfigurationUpdate) -> AnalysisConfiguration {
        let mut current = self.current.write().await;
        *current = current.apply(&update);
        tracing::info!(
            sensitivity = %current.sensitivity,
            unit = %current.unit,
            include_recommendations = current.include_recommendations,
            "analysis settings updated"
        );
        *current
    }

    /// Back to defaults
    pub async fn reset(&self) {
        *self.current.write().await = AnalysisConfiguration::default();
    }

    /// Load the saved configuration. Missing or unreadable values give defaults.
    pub async fn load(store: &dyn KvStore) -> Self {
        let config = match store.get(SETTINGS_KEY).await {
            Ok(Some(json)) => AnalysisConfiguration::from_json(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️  Ignoring corrupt saved settings: {}", e);
                AnalysisConfiguration::default()
            }),
            Ok(None) => AnalysisConfiguration::default(),
            Err(e) => {
                tracing::warn!("⚠️  Could not read saved settings: {}", e);
                AnalysisConfiguration::default()
            }
        };
        Self::new(config)
    }

    pub async fn save(&self, store: &dyn KvStore) -> Result<()> {
        let json = self
            .current()
            .await
            .to_json()
            .map_err(|e| Error::StoreWrite(e.to_string()))?;
        store.set(SETTINGS_KEY, &json).await
    }
}

impl FromStr for Sensitivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Sensitivity::Low),
            "medium" => Ok(Sensitivity::Medium),
            "high" => Ok(Sensitivity::High),
            other => Err(Error::invalid(format!(
                "unknown sensitivity '{}', expected low, medium or high",
                other
            ))),
        }
    }
}

impl FromStr for UnitSystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            other => Err(Error::invalid(format!(
                "unknown unit system '{}', expected metric or imperial",
                other
            ))),
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
        })
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::memory::MemoryStore;

    #[test]
    fn test_default_configuration() {
        let config = AnalysisConfiguration::default();
        assert!(config.is_default());
        assert_eq!(config.sensitivity, Sensitivity::Medium);
        assert_eq!(config.unit, UnitSystem::Metric);
        assert!(config.include_recommendations);
    }

    #[tokio::test]
    async fn test_update_replaces_only_supplied_fields() {
        let settings = Settings::default();
        let updated = settings
            .update(ConfigurationUpdate {
                unit: Some(UnitSystem::Imperial),
                ..Default::default()
            })
            .await;

        assert_eq!(updated.unit, UnitSystem::Imperial);
        assert_eq!(updated.sensitivity, Sensitivity::Medium);
        assert!(updated.include_recommendations);

        settings.reset().await;
        assert!(settings.current().await.is_default());
    }

    #[tokio::test]
    async fn test_snapshot_is_unaffected_by_later_edits() {
        let settings = Settings::default();
        let captured = settings.current().await;

        settings
            .update(ConfigurationUpdate {
                sensitivity: Some(Sensitivity::High),
                ..Default::default()
            })
            .await;

        assert_eq!(captured.sensitivity, Sensitivity::Medium);
        assert_eq!(settings.current().await.sensitivity, Sensitivity::High);
    }

    #[test]
    fn test_parse_at_boundary() {
        assert_eq!("HIGH".parse::<Sensitivity>().unwrap(), Sensitivity::High);
        assert_eq!(" imperial".parse::<UnitSystem>().unwrap(), UnitSystem::Imperial);
        assert!(matches!(
            "extreme".parse::<Sensitivity>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStore::new();
        let settings = Settings::default();
        settings
            .update(ConfigurationUpdate {
                sensitivity: Some(Sensitivity::Low),
                include_recommendations: Some(false),
                ..Default::default()
            })
            .await;
        settings.save(&store).await.unwrap();

        let loaded = Settings::load(&store).await.current().await;
        assert_eq!(loaded.sensitivity, Sensitivity::Low);
        assert!(!loaded.include_recommendations);
    }

    #[tokio::test]
    async fn test_corrupt_saved_settings_fall_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(SETTINGS_KEY, "{not json").await.unwrap();

        let loaded = Settings::load(&store).await.current().await;
        assert!(loaded.is_default());
    }
}
