use semver::Version;

/// Where an SDK version routes discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionGate {
    /// At or above the minimum; the manifest protocol is available
    Supported(Version),
    /// Parsed, but older than the minimum
    Outdated { found: Version, minimum: Version },
    /// Present but not a semantic version (pre-release tags, vendored paths, git refs)
    Unparseable(String),
    /// The SDK is not declared at all
    Missing,
}

impl VersionGate {
    pub fn evaluate(raw: Option<&str>, minimum: &Version) -> Self {
        let Some(raw) = raw else {
            return VersionGate::Missing;
        };
        match Version::parse(raw.trim()) {
            Ok(found) if found < *minimum => VersionGate::Outdated {
                found,
                minimum: minimum.clone(),
            },
            Ok(found) => VersionGate::Supported(found),
            Err(_) => VersionGate::Unparseable(raw.to_string()),
        }
    }
}

/// Strips a leading range operator from a declared dependency, so
/// `^3.25.0` reads as `3.25.0`. Anything else is returned untouched.
pub fn strip_range_operator(declared: &str) -> &str {
    let trimmed = declared.trim();
    for prefix in [">=", "==", "~=", "^", "~", "=", "v"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.trim_start();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn minimum() -> Version {
        Version::new(3, 20, 0)
    }

    #[test]
    fn test_below_minimum_is_outdated() {
        let gate = VersionGate::evaluate(Some("3.10.0"), &minimum());
        assert_eq!(
            gate,
            VersionGate::Outdated {
                found: Version::new(3, 10, 0),
                minimum: minimum()
            }
        );
    }

    #[test]
    fn test_at_minimum_is_supported() {
        let gate = VersionGate::evaluate(Some("3.20.0"), &minimum());
        assert_eq!(gate, VersionGate::Supported(minimum()));
    }

    #[test]
    fn test_unparseable_is_not_outdated() {
        let gate = VersionGate::evaluate(Some("github:firebase/firebase-functions"), &minimum());
        assert!(matches!(gate, VersionGate::Unparseable(_)));
    }

    #[test]
    fn test_missing() {
        assert_eq!(VersionGate::evaluate(None, &minimum()), VersionGate::Missing);
    }

    #[parameterized(
        caret = { "^3.25.0", "3.25.0" },
        tilde = { "~4.1.0", "4.1.0" },
        gte = { ">= 0.1.0", "0.1.0" },
        pinned = { "==0.4.1", "0.4.1" },
        compatible = { "~=0.2.0", "0.2.0" },
        v_prefix = { "v3.0.0", "3.0.0" },
        bare = { "5.0.0", "5.0.0" },
        tag = { "latest", "latest" },
    )]
    fn test_strip_range_operator(declared: &str, expected: &str) {
        assert_eq!(strip_range_operator(declared), expected);
    }
}
