use std::{fmt, io};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// Hard failures raised at the crate's boundaries.
///
/// Resolution itself never returns these to the caller. Whenever a collaborator (fetcher, hook,
/// pointer parser) fails, the `ResolverError` is converted into a
/// [`ResolveError`](crate::resolver::ResolveError) entry of the matching kind and resolution
/// carries on with the rest of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ResolverError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Fetch failed for '{uri}': {message}")]
    Fetch { uri: String, message: String },
    #[error("Invalid JSON pointer: {0}")]
    InvalidPointer(String),
    #[error("Invalid URI: {0}")]
    InvalidUri(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("No resolver defined for scheme '{scheme}' in ref {uri}")]
    NoResolver { scheme: String, uri: String },
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl ResolverError {
    pub fn fetch<U: fmt::Display, M: fmt::Display>(uri: U, message: M) -> Self {
        ResolverError::Fetch {
            uri: uri.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<toml::de::Error> for ResolverError {
    fn from(src: toml::de::Error) -> ResolverError {
        ResolverError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for ResolverError {
    fn from(src: toml::ser::Error) -> ResolverError {
        ResolverError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for ResolverError {
    fn from(src: JsonError) -> ResolverError {
        ResolverError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for ResolverError {
    fn from(src: YamlError) -> ResolverError {
        ResolverError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for ResolverError {
    fn from(src: UrlParseError) -> ResolverError {
        ResolverError::InvalidUri(format!("{src}"))
    }
}

impl From<io::Error> for ResolverError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ResolverError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => ResolverError::PermissionDenied,
            _ => ResolverError::Io(format!("IOError: {}", x.kind())),
        }
    }
}
