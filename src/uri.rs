//! Reference URIs: splitting a `$ref` target into authority and fragment, and joining relative
//! references against the authority of the document they were found in.
//!
//! Two families are understood. Filesystem-like references (no scheme, a single-letter drive
//! scheme, or `file:`) are joined with plain path arithmetic. HTTP-like references are joined with
//! [`url::Url::join`]. Anything else is passed through untouched and left for the fetcher
//! registered for its scheme.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use url::Url;

use crate::error::ResolverError;

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").expect("scheme pattern is valid"));

/// A `$ref` target split at its first `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RefUri {
    authority: String,
    fragment: Option<String>,
}

impl RefUri {
    pub fn parse(raw: &str) -> RefUri {
        let raw = raw.trim();
        match raw.split_once('#') {
            Some((authority, fragment)) => RefUri {
                authority: authority.to_string(),
                fragment: Some(fragment.to_string()),
            },
            None => RefUri {
                authority: raw.to_string(),
                fragment: None,
            },
        }
    }

    /// Scheme, host and path: the part identifying a distinct document.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The fragment without its leading `#`.
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// The fragment as a JSON pointer; `#` when there is none.
    pub fn pointer(&self) -> String {
        format!("#{}", self.fragment.as_deref().unwrap_or(""))
    }

    /// A reference into the current document.
    pub fn is_pointer(&self) -> bool {
        self.authority.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.authority.is_empty() && self.fragment.is_none()
    }

    pub fn with_fragment(&self, fragment: Option<&str>) -> RefUri {
        RefUri {
            authority: self.authority.clone(),
            fragment: fragment.map(str::to_string),
        }
    }

    pub fn without_fragment(&self) -> RefUri {
        self.with_fragment(None)
    }

    /// Lowercased scheme. Single-letter schemes are windows drive letters and do not count.
    pub fn scheme(&self) -> Option<String> {
        SCHEME_RE
            .captures(&self.authority)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
            .filter(|scheme| scheme.len() > 1)
    }

    fn is_drive_path(&self) -> bool {
        let bytes = self.authority.as_bytes();
        bytes.len() >= 2
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && self.scheme().is_none()
    }

    /// Carries a `//host` component of its own.
    pub fn has_host(&self) -> bool {
        if self.authority.starts_with("//") {
            return true;
        }
        match self.scheme() {
            Some(scheme) => self.authority[scheme.len() + 1..].starts_with("//"),
            None => false,
        }
    }

    pub fn is_http(&self) -> bool {
        self.scheme().is_some_and(|scheme| scheme.contains("http"))
    }

    /// Filesystem-like on its own terms: a `file:` URI or a bare path.
    pub fn is_file(&self) -> bool {
        match self.scheme() {
            Some(scheme) => scheme == "file",
            None => !self.authority.starts_with("//"),
        }
    }

    /// The filesystem path named by a file-like reference, with `/` separators.
    pub fn file_path(&self) -> String {
        let path = self
            .authority
            .strip_prefix("file://")
            .or_else(|| self.authority.strip_prefix("file:"))
            .unwrap_or(&self.authority);
        path.replace('\\', "/")
    }

    fn is_absolute_path(&self) -> bool {
        let path = self.file_path();
        path.starts_with('/') || self.is_drive_path()
    }

    /// Resolve this reference against the authority of the document it was found in.
    ///
    /// Bare fragments are returned unchanged. References that already carry a host, or whose base
    /// offers nothing to join against, are returned unchanged as well.
    pub fn absolute_to(&self, base: &RefUri) -> Result<RefUri, ResolverError> {
        if self.is_pointer() {
            return Ok(self.clone());
        }
        let base_is_file = base.is_empty() || base.is_file();
        let resolved = if self.is_file() && (self.scheme().is_some() || base_is_file) {
            if self.is_absolute_path() {
                RefUri {
                    authority: normalize_path(&self.file_path()),
                    fragment: self.fragment.clone(),
                }
            } else if base.authority.is_empty() {
                self.clone()
            } else {
                RefUri {
                    authority: join_paths(dirname(&base.file_path()), &self.file_path()),
                    fragment: self.fragment.clone(),
                }
            }
        } else if self.is_http() || (self.scheme().is_none() && base.is_http()) {
            if base.has_host() && !self.has_host() {
                let joined = Url::parse(base.authority())?.join(&self.to_string())?;
                RefUri::parse(joined.as_str())
            } else {
                self.clone()
            }
        } else {
            self.clone()
        };
        tracing::trace!("absolute_to: '{}' against '{}' -> '{}'", self, base, resolved);
        Ok(resolved)
    }
}

impl Display for RefUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{}#{}", self.authority, fragment),
            None => write!(f, "{}", self.authority),
        }
    }
}

impl From<&str> for RefUri {
    fn from(raw: &str) -> RefUri {
        RefUri::parse(raw)
    }
}

/// Everything up to (not including) the last `/`.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Join a relative path onto a directory and normalize the result.
pub fn join_paths(dir: &str, relative: &str) -> String {
    if dir.is_empty() {
        return normalize_path(relative);
    }
    normalize_path(&format!("{}/{}", dir.trim_end_matches('/'), relative))
}

/// Resolve `.` and `..` segments and collapse repeated separators.
///
/// Leading `..` segments of a relative path are preserved; `..` never climbs above `/`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}
