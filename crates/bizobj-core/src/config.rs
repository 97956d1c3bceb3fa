//! Portal configuration
//!
//! Built once at startup and handed to the data portal; never mutated after.

use serde::{Deserialize, Serialize};

use crate::errors::{BoError, Result};
use crate::rules::NoAccessBehavior;

pub const DEFAULT_DATA_SOURCE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PortalConfig {
    /// Denial behavior for authorization rules without their own
    pub no_access_behavior: NoAccessBehavior,
    /// Data source for models that do not name one
    pub default_data_source: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            no_access_behavior: NoAccessBehavior::Throw,
            default_data_source: DEFAULT_DATA_SOURCE.to_string(),
        }
    }
}

impl PortalConfig {
    /// Parse a TOML document; missing keys take their defaults
    ///
    /// ```
    /// use bizobj_core::config::PortalConfig;
    /// use bizobj_core::rules::NoAccessBehavior;
    ///
    /// let config = PortalConfig::from_toml_str("no_access_behavior = \"record\"").unwrap();
    /// assert_eq!(config.no_access_behavior, NoAccessBehavior::Record);
    /// assert_eq!(config.default_data_source, "default");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the document is not valid TOML or holds a
    /// value of the wrong shape.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BoError::Configuration {
            message: e.to_string(),
        })
    }

    pub fn with_no_access_behavior(mut self, behavior: NoAccessBehavior) -> Self {
        self.no_access_behavior = behavior;
        self
    }

    pub fn with_default_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.default_data_source = data_source.into();
        self
    }
}
