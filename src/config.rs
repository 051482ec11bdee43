//! Application configuration.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration:
//!
//! ```toml
//! [request]
//! strip_trailing_slash = true
//! keep_blank_values = false
//! parse_csv = false
//! auto_options = true
//!
//! [errors]
//! expose_internal = false
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub request: RequestOptions,
    pub errors: ErrorOptions,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

/// How inbound requests are normalised before routing.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptions {
    /// Route `/things/` as `/things`.
    pub strip_trailing_slash: bool,
    /// Keep `?a=` as an empty value instead of dropping it.
    pub keep_blank_values: bool,
    /// Split comma-separated query values into separate values.
    pub parse_csv: bool,
    /// Answer `OPTIONS` on any matched route that has no `OPTIONS` responder.
    pub auto_options: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            strip_trailing_slash: false,
            keep_blank_values: false,
            parse_csv: false,
            auto_options: true,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorOptions {
    /// Include the cause's message in `500` bodies. Off in production.
    pub expose_internal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.request.auto_options);
        assert!(!config.errors.expose_internal);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [request]
            strip_trailing_slash = true

            [errors]
            expose_internal = true
            "#,
        )
        .unwrap();
        assert!(config.request.strip_trailing_slash);
        assert!(config.request.auto_options);
        assert!(config.errors.expose_internal);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = Config::from_toml_str("[request]\nstrip_slashes = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/roost.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
