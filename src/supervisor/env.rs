//! Explicit environment for supervised processes
//!
//! Children never inherit the host environment wholesale. They get the
//! variables on [`INHERITED_VARS`] plus whatever the caller sets.

use std::collections::BTreeMap;

/// Host variables passed through to every child
pub const INHERITED_VARS: &[&str] = &["HOME", "PATH", "NODE_ENV"];

/// Serialized runtime configuration blob
pub const RUNTIME_CONFIG_VAR: &str = "CLOUD_RUNTIME_CONFIG";

/// Enables the introspection control surface in the functions SDK
pub const CONTROL_API_VAR: &str = "FUNCTIONS_CONTROL_API";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    vars: BTreeMap<String, String>,
}

impl ProcessEnv {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Allow-listed variables from the current process environment.
    pub fn inherited() -> Self {
        Self::inherited_from(|key| std::env::var(key).ok())
    }

    pub fn inherited_from(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let vars = INHERITED_VARS
            .iter()
            .filter_map(|key| lookup(key).map(|value| (key.to_string(), value)))
            .collect();
        Self { vars }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn extend<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Adds the serialized config blob, only when there is something in it.
    pub fn with_runtime_config(self, config: &serde_json::Map<String, serde_json::Value>) -> Self {
        if config.is_empty() {
            return self;
        }
        let blob = serde_json::Value::Object(config.clone()).to_string();
        self.set(RUNTIME_CONFIG_VAR, blob)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host(key: &str) -> Option<String> {
        match key {
            "HOME" => Some("/home/dev".to_string()),
            "PATH" => Some("/usr/bin".to_string()),
            "AWS_SECRET_ACCESS_KEY" => Some("nope".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_only_allow_listed_variables_inherited() {
        let env = ProcessEnv::inherited_from(host);
        assert_eq!(env.get("HOME"), Some("/home/dev"));
        assert_eq!(env.get("PATH"), Some("/usr/bin"));
        assert!(!env.contains("NODE_ENV"));
        assert!(!env.contains("AWS_SECRET_ACCESS_KEY"));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_caller_overrides_win() {
        let env = ProcessEnv::inherited_from(host).set("PATH", "/opt/node/bin");
        assert_eq!(env.get("PATH"), Some("/opt/node/bin"));
    }

    #[test]
    fn test_empty_runtime_config_not_injected() {
        let env = ProcessEnv::empty().with_runtime_config(&serde_json::Map::new());
        assert!(!env.contains(RUNTIME_CONFIG_VAR));
    }

    #[test]
    fn test_runtime_config_serialized() {
        let config = json!({"service": {"key": "abc"}});
        let env = ProcessEnv::empty().with_runtime_config(config.as_object().unwrap());
        let blob: serde_json::Value =
            serde_json::from_str(env.get(RUNTIME_CONFIG_VAR).unwrap()).unwrap();
        assert_eq!(blob, config);
    }
}
