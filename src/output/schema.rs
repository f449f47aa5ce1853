//! BuildDescription schema data structures
//!
//! A [`BuildDescription`] is the normalized, language-agnostic view of the
//! functions a source directory defines. Every discovery strategy ends in
//! one of these, and it is the only thing handed back to the deployment
//! pipeline.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

pub const DEFAULT_REGION: &str = "us-central1";

/// Normalized description of the triggers discovered in a source directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BuildDescription {
    /// Manifest spec version the description was read from
    pub spec_version: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub required_apis: Vec<RequiredApi>,
    /// Deploy-time parameters, preserved opaquely
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub params: Vec<serde_json::Value>,
    /// Endpoints keyed by function id
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub endpoints: BTreeMap<String, Endpoint>,
}

impl BuildDescription {
    pub fn new(spec_version: impl Into<String>) -> Self {
        Self {
            spec_version: spec_version.into(),
            ..Default::default()
        }
    }

    pub fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoints.insert(endpoint.id.clone(), endpoint);
    }

    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Every secret name referenced by any endpoint, deduplicated
    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .endpoints
            .values()
            .flat_map(|e| e.secrets.iter().map(|s| s.secret.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredApi {
    pub api: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Gcfv1,
    #[default]
    Gcfv2,
}

/// A single deployable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub entry_point: String,
    #[serde(default)]
    pub platform: Platform,
    pub regions: Vec<String>,
    pub trigger: Trigger,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub resources: ResourceBindings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub secrets: Vec<SecretBinding>,
}

impl Endpoint {
    /// Endpoint with default platform and region
    pub fn new(id: impl Into<String>, trigger: Trigger) -> Self {
        let id = id.into();
        Self {
            entry_point: id.clone(),
            id,
            platform: Platform::default(),
            regions: vec![DEFAULT_REGION.to_string()],
            trigger,
            resources: ResourceBindings::default(),
            service_account: None,
            labels: BTreeMap::new(),
            environment: BTreeMap::new(),
            secrets: Vec::new(),
        }
    }
}

/// What invokes an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Https {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        invoker: Vec<String>,
    },
    Callable,
    Event {
        event_type: String,
        #[serde(default)]
        filters: BTreeMap<String, String>,
        #[serde(default)]
        retry: bool,
    },
    Schedule {
        schedule: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_zone: Option<String>,
    },
    TaskQueue,
    Blocking {
        event_type: String,
    },
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Https { .. } => "https",
            Trigger::Callable => "callable",
            Trigger::Event { .. } => "event",
            Trigger::Schedule { .. } => "schedule",
            Trigger::TaskQueue => "taskQueue",
            Trigger::Blocking { .. } => "blocking",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Event { event_type, .. } | Trigger::Blocking { event_type } => {
                write!(f, "{} ({})", self.kind(), event_type)
            }
            Trigger::Schedule { schedule, .. } => write!(f, "schedule ({})", schedule),
            _ => f.write_str(self.kind()),
        }
    }
}

/// Compute resources requested by an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceBindings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f32>,
}

/// Environment variable bound to a secret manager secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBinding {
    pub key: String,
    pub secret: String,
}
