//! Trigger manifest wire format
//!
//! The manifest is what user code emits, either as a generated
//! `functions.yaml` on disk or as the body of the introspection endpoint.
//! JSON bodies parse too, since JSON is valid YAML.

use super::schema::{
    BuildDescription, Endpoint, Platform, RequiredApi, ResourceBindings, SecretBinding, Trigger,
    DEFAULT_REGION,
};
use crate::error::{DelegateError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const SUPPORTED_SPEC_VERSIONS: &[&str] = &["v1alpha1"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireManifest {
    spec_version: String,
    #[serde(default, rename = "requiredAPIs")]
    required_apis: Vec<RequiredApi>,
    #[serde(default)]
    params: Vec<serde_json::Value>,
    #[serde(default)]
    endpoints: BTreeMap<String, WireEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEndpoint {
    entry_point: Option<String>,
    platform: Option<Platform>,
    #[serde(default)]
    region: Vec<String>,
    available_memory_mb: Option<u32>,
    timeout_seconds: Option<u32>,
    min_instances: Option<u32>,
    max_instances: Option<u32>,
    concurrency: Option<u32>,
    cpu: Option<f32>,
    service_account_email: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    environment_variables: BTreeMap<String, String>,
    #[serde(default)]
    secret_environment_variables: Vec<WireSecret>,

    https_trigger: Option<WireHttpsTrigger>,
    callable_trigger: Option<serde_yaml::Value>,
    event_trigger: Option<WireEventTrigger>,
    schedule_trigger: Option<WireScheduleTrigger>,
    task_queue_trigger: Option<serde_yaml::Value>,
    blocking_trigger: Option<WireBlockingTrigger>,
}

#[derive(Debug, Deserialize)]
struct WireSecret {
    key: String,
    secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireHttpsTrigger {
    #[serde(default)]
    invoker: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEventTrigger {
    event_type: String,
    #[serde(default)]
    event_filters: BTreeMap<String, String>,
    #[serde(default)]
    retry: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireScheduleTrigger {
    schedule: String,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlockingTrigger {
    event_type: String,
}

/// Parses manifest text into a [`BuildDescription`].
///
/// `source` names where the text came from (a path or URL) and is carried
/// into any error.
pub fn parse_manifest(text: &str, source: &str) -> Result<BuildDescription> {
    let wire: WireManifest = serde_yaml::from_str(text).map_err(|e| {
        DelegateError::discovery(
            format!("could not parse trigger manifest: {}", e),
            source,
            "The manifest must be the YAML produced by the functions SDK. Delete it and let it be regenerated.",
        )
    })?;

    if !SUPPORTED_SPEC_VERSIONS.contains(&wire.spec_version.as_str()) {
        return Err(DelegateError::discovery(
            format!("unsupported manifest specVersion '{}'", wire.spec_version),
            source,
            "Upgrade rtdelegate, or pin the functions SDK to a version that emits v1alpha1 manifests.",
        ));
    }

    let mut build = BuildDescription::new(wire.spec_version);
    build.required_apis = wire.required_apis;
    build.params = wire.params;

    for (id, endpoint) in wire.endpoints {
        build.add_endpoint(convert_endpoint(id, endpoint, source)?);
    }

    Ok(build)
}

fn convert_endpoint(id: String, wire: WireEndpoint, source: &str) -> Result<Endpoint> {
    let mut triggers = Vec::new();
    if let Some(https) = wire.https_trigger {
        triggers.push(Trigger::Https {
            invoker: https.invoker,
        });
    }
    if wire.callable_trigger.is_some() {
        triggers.push(Trigger::Callable);
    }
    if let Some(event) = wire.event_trigger {
        triggers.push(Trigger::Event {
            event_type: event.event_type,
            filters: event.event_filters,
            retry: event.retry,
        });
    }
    if let Some(schedule) = wire.schedule_trigger {
        triggers.push(Trigger::Schedule {
            schedule: schedule.schedule,
            time_zone: schedule.time_zone,
        });
    }
    if wire.task_queue_trigger.is_some() {
        triggers.push(Trigger::TaskQueue);
    }
    if let Some(blocking) = wire.blocking_trigger {
        triggers.push(Trigger::Blocking {
            event_type: blocking.event_type,
        });
    }

    if triggers.len() != 1 {
        return Err(DelegateError::discovery(
            format!(
                "endpoint '{}' declares {} triggers, expected exactly one",
                id,
                triggers.len()
            ),
            source,
            "Each exported function must have exactly one trigger.",
        ));
    }
    let trigger = triggers.remove(0);

    let regions = if wire.region.is_empty() {
        vec![DEFAULT_REGION.to_string()]
    } else {
        wire.region
    };

    let secrets = wire
        .secret_environment_variables
        .into_iter()
        .map(|s| SecretBinding {
            secret: s.secret.unwrap_or_else(|| s.key.clone()),
            key: s.key,
        })
        .collect();

    Ok(Endpoint {
        entry_point: wire.entry_point.unwrap_or_else(|| id.clone()),
        id,
        platform: wire.platform.unwrap_or_default(),
        regions,
        trigger,
        resources: ResourceBindings {
            memory_mb: wire.available_memory_mb,
            timeout_seconds: wire.timeout_seconds,
            min_instances: wire.min_instances,
            max_instances: wire.max_instances,
            concurrency: wire.concurrency,
            cpu: wire.cpu,
        },
        service_account: wire.service_account_email,
        labels: wire.labels,
        environment: wire.environment_variables,
        secrets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
specVersion: v1alpha1
requiredAPIs:
  - api: cloudscheduler.googleapis.com
    reason: Needed for scheduled functions.
endpoints:
  hello:
    entryPoint: hello
    platform: gcfv2
    region: [europe-west1]
    availableMemoryMb: 256
    httpsTrigger: {}
    secretEnvironmentVariables:
      - key: API_KEY
  nightly:
    scheduleTrigger:
      schedule: every day 00:00
      timeZone: Europe/Paris
    environmentVariables:
      MODE: batch
  onPublish:
    platform: gcfv1
    eventTrigger:
      eventType: google.pubsub.topic.publish
      eventFilters:
        resource: projects/demo/topics/jobs
      retry: true
"#;

    #[test]
    fn test_parse_full_manifest() {
        let build = parse_manifest(MANIFEST, "functions.yaml").unwrap();
        assert_eq!(build.spec_version, "v1alpha1");
        assert_eq!(build.required_apis.len(), 1);
        assert_eq!(build.endpoints.len(), 3);

        let hello = build.endpoint("hello").unwrap();
        assert_eq!(hello.regions, vec!["europe-west1".to_string()]);
        assert_eq!(hello.resources.memory_mb, Some(256));
        assert_eq!(hello.trigger, Trigger::Https { invoker: vec![] });
        assert_eq!(
            hello.secrets,
            vec![SecretBinding {
                key: "API_KEY".to_string(),
                secret: "API_KEY".to_string()
            }]
        );

        let nightly = build.endpoint("nightly").unwrap();
        assert_eq!(nightly.entry_point, "nightly");
        assert_eq!(nightly.regions, vec![DEFAULT_REGION.to_string()]);
        assert_eq!(nightly.environment.get("MODE"), Some(&"batch".to_string()));

        let on_publish = build.endpoint("onPublish").unwrap();
        assert_eq!(on_publish.platform, Platform::Gcfv1);
        match &on_publish.trigger {
            Trigger::Event { filters, retry, .. } => {
                assert!(retry);
                assert_eq!(filters["resource"], "projects/demo/topics/jobs");
            }
            other => panic!("expected event trigger, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_json_body() {
        let body = r#"{"specVersion":"v1alpha1","endpoints":{"api":{"callableTrigger":{}}}}"#;
        let build = parse_manifest(body, "http://localhost:8081/__/functions.yaml").unwrap();
        assert_eq!(build.endpoint("api").unwrap().trigger, Trigger::Callable);
    }

    #[test]
    fn test_rejects_unknown_spec_version() {
        let err = parse_manifest("specVersion: v2\n", "functions.yaml").unwrap_err();
        assert!(err.to_string().contains("unsupported manifest specVersion"));
    }

    #[test]
    fn test_rejects_endpoint_without_trigger() {
        let text = "specVersion: v1alpha1\nendpoints:\n  broken:\n    entryPoint: broken\n";
        let err = parse_manifest(text, "functions.yaml").unwrap_err();
        assert!(err.to_string().contains("declares 0 triggers"));
    }

    #[test]
    fn test_rejects_endpoint_with_two_triggers() {
        let text = "specVersion: v1alpha1\nendpoints:\n  both:\n    httpsTrigger: {}\n    callableTrigger: {}\n";
        let err = parse_manifest(text, "functions.yaml").unwrap_err();
        assert!(err.to_string().contains("declares 2 triggers"));
    }

    #[test]
    fn test_malformed_yaml_names_source() {
        let err = parse_manifest("endpoints: [", "/src/functions.yaml").unwrap_err();
        match err {
            DelegateError::Discovery { attempted, .. } => {
                assert_eq!(attempted, "/src/functions.yaml")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
