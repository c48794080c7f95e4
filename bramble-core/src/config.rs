//! Runtime configuration.

use serde::Deserialize;

use crate::error::Result;

/// Settings for a [`Directives`](crate::directive::Directives) runtime.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use bramble_core::config::Config;
///
/// let config = Config::from_json(r#"{ "prefix": "x-" }"#).unwrap();
/// assert_eq!(config.prefix, "x-");
/// assert!(config.report_errors);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Attribute prefix that marks a directive.
    pub prefix: String,

    /// Log binding errors at warn level. When off they are logged at debug
    /// level; they are still recorded and re-delivered either way.
    pub report_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: ":".to_string(),
            report_errors: true,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.prefix, ":");
        assert!(config.report_errors);
        assert_eq!(Config::from_json("{}").unwrap(), config);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Config::from_json(r#"{ "prefx": "x" }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
