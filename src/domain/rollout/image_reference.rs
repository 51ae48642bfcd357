/// Parsed container image reference: `[registry/]repository[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

pub const DEFAULT_TAG: &str = "latest";

impl ImageReference {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let (name, digest) = match raw.split_once('@') {
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (raw, None),
        };

        // the first component is a registry only if it looks like a host
        let (registry, remainder) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (Some(first.to_string()), rest),
            _ => (None, name),
        };

        let last_slash = remainder.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match remainder[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&remainder[..split], Some(remainder[split + 1..].to_string()))
            }
            None => (remainder, None),
        };

        if repository.is_empty() {
            return None;
        }

        Some(Self {
            registry,
            repository: repository.to_string(),
            tag: tag.filter(|t| !t.is_empty()),
            digest: digest.filter(|d| !d.is_empty()),
        })
    }

    /// Tag the runtime would pull: explicit tag, else `latest` unless pinned by digest.
    pub fn effective_tag(&self) -> Option<&str> {
        match (&self.tag, &self.digest) {
            (Some(tag), _) => Some(tag),
            (None, None) => Some(DEFAULT_TAG),
            (None, Some(_)) => None,
        }
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ImageReference {
        ImageReference::parse(raw).unwrap()
    }

    #[test]
    fn plain_repository_defaults_to_latest() {
        let r = parse("nginx");
        assert_eq!(r.registry, None);
        assert_eq!(r.repository, "nginx");
        assert_eq!(r.tag, None);
        assert_eq!(r.effective_tag(), Some("latest"));
    }

    #[test]
    fn registry_with_port_and_nested_repository() {
        let r = parse("registry.local:5000/team/app:v2");
        assert_eq!(r.registry.as_deref(), Some("registry.local:5000"));
        assert_eq!(r.repository, "team/app");
        assert_eq!(r.tag.as_deref(), Some("v2"));
    }

    #[test]
    fn namespace_without_host_is_part_of_the_repository() {
        let r = parse("team/app:v2");
        assert_eq!(r.registry, None);
        assert_eq!(r.repository, "team/app");
    }

    #[test]
    fn localhost_is_a_registry() {
        let r = parse("localhost/app");
        assert_eq!(r.registry.as_deref(), Some("localhost"));
        assert_eq!(r.repository, "app");
    }

    #[test]
    fn port_is_not_mistaken_for_a_tag() {
        let r = parse("registry:5000/app");
        assert_eq!(r.registry.as_deref(), Some("registry:5000"));
        assert_eq!(r.repository, "app");
        assert_eq!(r.effective_tag(), Some("latest"));
    }

    #[test]
    fn digest_pinned_references() {
        let r = parse("registry:5000/app@sha256:abc");
        assert_eq!(r.digest.as_deref(), Some("sha256:abc"));
        assert_eq!(r.effective_tag(), None);

        let r = parse("app:v2@sha256:abc");
        assert_eq!(r.tag.as_deref(), Some("v2"));
        assert_eq!(r.digest.as_deref(), Some("sha256:abc"));
    }

    #[test]
    fn rejects_empty_references() {
        assert!(ImageReference::parse("").is_none());
        assert!(ImageReference::parse("   ").is_none());
        assert!(ImageReference::parse(":v2").is_none());
    }
}
