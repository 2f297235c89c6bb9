use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MetricsError, MetricsResult};

pub const ENV_DATA_DIR: &str = "GOLDENBERRY_DATA_DIR";
pub const ENV_DATABASE: &str = "GOLDENBERRY_DATABASE";

/// Share of total cost below which a category is folded into "Other Costs".
pub const DEFAULT_OTHER_SHARE_THRESHOLD_PCT: f64 = 3.0;
pub const DEFAULT_PROCUREMENT_CATEGORY: &str = "Fruit Procurement";

/// Settings for opening the metrics graph and shaping derived metrics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Directory holding the entity CSV files.
    pub data_dir: PathBuf,
    /// Label reported in connection status.
    pub database: String,
    pub other_share_threshold_pct: f64,
    /// Cost category split out of variable cost in product cost summaries.
    pub procurement_category: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: "goldenberry".to_string(),
            other_share_threshold_pct: DEFAULT_OTHER_SHARE_THRESHOLD_PCT,
            procurement_category: DEFAULT_PROCUREMENT_CATEGORY.to_string(),
        }
    }
}

impl MetricsConfig {
    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> MetricsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        config.with_env_overrides().validated()
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> MetricsResult<Self> {
        Self::default().with_env_overrides().validated()
    }

    pub fn from_toml_str(text: &str) -> MetricsResult<Self> {
        toml::from_str(text).map_err(|e| MetricsError::Config(e.to_string()))
    }

    fn with_env_overrides(self) -> Self {
        self.apply_overrides(
            std::env::var(ENV_DATA_DIR).ok(),
            std::env::var(ENV_DATABASE).ok(),
        )
    }

    fn apply_overrides(mut self, data_dir: Option<String>, database: Option<String>) -> Self {
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(name) = database.filter(|d| !d.trim().is_empty()) {
            self.database = name;
        }
        self
    }

    pub fn validate(&self) -> MetricsResult<()> {
        if !(0.0..=100.0).contains(&self.other_share_threshold_pct) {
            return Err(MetricsError::Config(format!(
                "other_share_threshold_pct must be within 0..=100, got {}",
                self.other_share_threshold_pct
            )));
        }
        if self.procurement_category.trim().is_empty() {
            return Err(MetricsError::Config(
                "procurement_category must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    fn validated(self) -> MetricsResult<Self> {
        self.validate()?;
        Ok(self)
    }
}
