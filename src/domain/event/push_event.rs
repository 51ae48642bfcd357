use std::fmt;

use serde::Serialize;
use serde_with::skip_serializing_none;

/// An image written to a repository, as reported by the registry.
///
/// At least one of `tag` / `digest` is set.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushEvent {
    /// Registry host the push went to, e.g. `registry.local:5000`
    pub registry_origin: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl PushEvent {
    pub fn tagged(registry: Option<&str>, repository: &str, tag: &str) -> Self {
        Self {
            registry_origin: registry.map(str::to_string),
            repository: repository.to_string(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    pub fn with_digest(mut self, digest: &str) -> Self {
        self.digest = Some(digest.to_string());
        self
    }
}

impl fmt::Display for PushEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry_origin {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
