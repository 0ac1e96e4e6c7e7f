use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::Path,
};

use crate::{error::ResolverError, resolver::DEFAULT_MAX_URI_DEPTH};

/// Resolver settings as stored in a TOML file. Every field is optional in the file.
///
/// ```toml
/// dereference_inline = true
/// dereference_remote = false
/// max_uri_depth = 20
/// cache_ttl_ms = 60000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub dereference_inline: bool,
    pub dereference_remote: bool,
    pub max_uri_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_ms: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            dereference_inline: true,
            dereference_remote: true,
            max_uri_depth: DEFAULT_MAX_URI_DEPTH,
            cache_ttl_ms: None,
        }
    }
}

impl ResolverConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ResolverError> {
        let config = toml::from_str(content)?;
        Ok(config)
    }

    /// Read `path`. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ResolverError> {
        let path = path.as_ref();
        tracing::debug!("Attempting to read resolver config from: {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(ResolverConfig::default());
        }
        let content = read_to_string(path)?;
        ResolverConfig::from_toml_str(&content)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), ResolverError> {
        tracing::debug!("Attempting to write resolver config to: {:?}", path.as_ref());
        let toml_string = toml::to_string(self)?;
        write(path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverOptions;
    use std::time::Duration;

    #[test_log::test]
    fn test_partial_config_uses_defaults() {
        let config = ResolverConfig::from_toml_str("dereference_remote = false\n").unwrap();
        assert_eq!(
            config,
            ResolverConfig {
                dereference_remote: false,
                ..Default::default()
            }
        );
        assert!(matches!(
            ResolverConfig::from_toml_str("max_uri_depth = \"deep\""),
            Err(ResolverError::Config(_))
        ));
    }

    #[test_log::test]
    fn test_load_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolver.toml");
        assert_eq!(ResolverConfig::load(&path).unwrap(), ResolverConfig::default());

        let config = ResolverConfig {
            max_uri_depth: 7,
            cache_ttl_ms: Some(1500),
            ..Default::default()
        };
        config.write(&path).unwrap();
        assert_eq!(ResolverConfig::load(&path).unwrap(), config);

        let options = ResolverOptions::from(&config);
        assert_eq!(options.max_uri_depth, 7);
        assert_eq!(options.cache.ttl(), Some(Duration::from_millis(1500)));
        assert!(options.dereference_inline);
    }
}
