//! Host configuration, read from a JSON file.
//!
//! ```json
//! {
//!   "backend": "auto",
//!   "preferred_gpu": "high performance",
//!   "filters": [ { "type": "Ink", "ink": 200 } ]
//! }
//! ```
//!
//! Every key is optional.  CLI flags override whatever the file sets.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::filters::{self, Filter, FilterError};

/// Which filter backend the host should try to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// GPU when an adapter exists, Canvas2d otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub backend: BackendPreference,
    /// "high performance" / "discrete" or "low power" / "integrated".
    pub preferred_gpu: String,
    /// Filter objects in `to_object` form, applied in order.
    pub filters: Vec<serde_json::Value>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            preferred_gpu: "high performance".to_string(),
            filters: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Instantiate every configured filter.
    pub fn build_filters(&self) -> Result<Vec<Box<dyn Filter>>, FilterError> {
        self.filters.iter().map(filters::from_object).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_object_uses_defaults() {
        assert_eq!(HostConfig::from_json("{}").unwrap(), HostConfig::default());
        assert_eq!(HostConfig::default().backend, BackendPreference::Auto);
    }

    #[test]
    fn parses_full_config() {
        let config = HostConfig::from_json(
            r#"{"backend": "cpu", "preferred_gpu": "integrated",
                "filters": [{"type": "Ink", "ink": 200}, {"type": "Ink"}]}"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendPreference::Cpu);
        assert_eq!(config.preferred_gpu, "integrated");

        let filters = config.build_filters().unwrap();
        let values: Vec<Option<f64>> = filters.iter().map(|f| f.main_parameter_value()).collect();
        assert_eq!(values, vec![Some(200.0), None]);
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(matches!(
            HostConfig::from_json(r#"{"backend": "opengl"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn unknown_filter_type_fails_to_build() {
        let config = HostConfig::from_json(r#"{"filters": [{"type": "Blur"}]}"#).unwrap();
        assert!(config.build_filters().is_err());
    }
}
