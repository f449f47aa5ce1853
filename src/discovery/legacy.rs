//! Source scanning for SDKs too old (or too unusual) for the manifest protocol
//!
//! This is static analysis only: entry files are read as text and matched
//! against the trigger declaration shapes each SDK uses. Nothing is run.

use crate::error::{DelegateError, Result};
use crate::output::{BuildDescription, Endpoint, Trigger};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const LEGACY_SPEC_VERSION: &str = "v1alpha1";

async fn read_entry_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DelegateError::io(path, e))
}

/// Compiles `pattern` into `cell` on first use. A pattern that fails to
/// compile is logged once and then matches nothing.
fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "scan pattern does not compile");
            None
        }
    })
    .as_ref()
}

fn node_exports() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(
        &RE,
        r#"exports\.([A-Za-z_$][\w$]*)\s*=\s*functions(?:\.[\w$]+\([^)]*\))*\.(https\.onRequest|https\.onCall|pubsub\.topic\(\s*['"]([^'"]+)['"]\s*\)|pubsub\.schedule\(\s*['"]([^'"]+)['"]\s*\))"#,
    )
}

fn node_v2_exports() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(
        &RE,
        r#"export\s+const\s+([A-Za-z_$][\w$]*)\s*=\s*(?:[\w$]+\.)?(onRequest|onCall|onSchedule|onMessagePublished)\(\s*(?:['"]([^'"]+)['"])?"#,
    )
}

/// Scans a Node.js entry file for `exports.x = functions...` and
/// `export const x = onRequest(...)` declarations.
pub async fn scan_node(entry: &Path) -> Result<BuildDescription> {
    let source = read_entry_file(entry).await?;
    let mut build = BuildDescription::new(LEGACY_SPEC_VERSION);

    for caps in node_exports()
        .into_iter()
        .flat_map(|re| re.captures_iter(&source))
    {
        let name = &caps[1];
        let kind = &caps[2];
        let trigger = if kind == "https.onRequest" {
            Trigger::Https { invoker: vec![] }
        } else if kind == "https.onCall" {
            Trigger::Callable
        } else if let Some(topic) = caps.get(3) {
            pubsub_trigger(topic.as_str())
        } else if let Some(schedule) = caps.get(4) {
            Trigger::Schedule {
                schedule: schedule.as_str().to_string(),
                time_zone: None,
            }
        } else {
            continue;
        };
        let mut endpoint = Endpoint::new(name, trigger);
        endpoint.platform = crate::output::Platform::Gcfv1;
        build.add_endpoint(endpoint);
    }

    for caps in node_v2_exports()
        .into_iter()
        .flat_map(|re| re.captures_iter(&source))
    {
        let name = &caps[1];
        let argument = caps.get(3).map(|m| m.as_str().to_string());
        let trigger = match (&caps[2], argument) {
            ("onRequest", _) => Trigger::Https { invoker: vec![] },
            ("onCall", _) => Trigger::Callable,
            ("onSchedule", Some(schedule)) => Trigger::Schedule {
                schedule,
                time_zone: None,
            },
            ("onMessagePublished", Some(topic)) => pubsub_trigger(&topic),
            _ => continue,
        };
        build.add_endpoint(Endpoint::new(name, trigger));
    }

    debug!(entry = %entry.display(), count = build.endpoints.len(), "legacy scan finished");
    Ok(build)
}

fn python_decorators() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(
        &RE,
        r#"@\w+\.(on_request|on_call|on_schedule|on_message_published)\(([^)]*)\)\s*\n\s*def\s+([A-Za-z_]\w*)"#,
    )
}

/// Keyword arguments read from Python decorator calls
#[derive(Debug, Clone, Copy)]
enum Keyword {
    Schedule,
    Timezone,
    Topic,
}

impl Keyword {
    fn pattern(self) -> Option<&'static Regex> {
        static SCHEDULE: OnceLock<Option<Regex>> = OnceLock::new();
        static TIMEZONE: OnceLock<Option<Regex>> = OnceLock::new();
        static TOPIC: OnceLock<Option<Regex>> = OnceLock::new();
        match self {
            Keyword::Schedule => compiled(&SCHEDULE, r#"\bschedule\s*=\s*['"]([^'"]+)['"]"#),
            Keyword::Timezone => compiled(&TIMEZONE, r#"\btimezone\s*=\s*['"]([^'"]+)['"]"#),
            Keyword::Topic => compiled(&TOPIC, r#"\btopic\s*=\s*['"]([^'"]+)['"]"#),
        }
    }

    fn find(self, arguments: &str) -> Option<String> {
        self.pattern()?
            .captures(arguments)
            .map(|caps| caps[1].to_string())
    }
}

/// Scans `main.py` for SDK decorators followed by a `def`.
pub async fn scan_python(entry: &Path) -> Result<BuildDescription> {
    let source = read_entry_file(entry).await?;
    let mut build = BuildDescription::new(LEGACY_SPEC_VERSION);

    for caps in python_decorators()
        .into_iter()
        .flat_map(|re| re.captures_iter(&source))
    {
        let arguments = &caps[2];
        let trigger = match &caps[1] {
            "on_request" => Trigger::Https { invoker: vec![] },
            "on_call" => Trigger::Callable,
            "on_schedule" => match Keyword::Schedule.find(arguments) {
                Some(schedule) => Trigger::Schedule {
                    schedule,
                    time_zone: Keyword::Timezone.find(arguments),
                },
                None => continue,
            },
            "on_message_published" => match Keyword::Topic.find(arguments) {
                Some(topic) => pubsub_trigger(&topic),
                None => continue,
            },
            _ => continue,
        };
        build.add_endpoint(Endpoint::new(&caps[3], trigger));
    }

    debug!(entry = %entry.display(), count = build.endpoints.len(), "legacy scan finished");
    Ok(build)
}

fn dart_registrations() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    compiled(
        &RE,
        r#"\.https\.(onRequest|onCall)\(\s*name:\s*['"]([^'"]+)['"]"#,
    )
}

/// Scans a Dart server entry for `firebase.https.onRequest(name: ...)`.
pub async fn scan_dart(entry: &Path) -> Result<BuildDescription> {
    let source = read_entry_file(entry).await?;
    let mut build = BuildDescription::new(LEGACY_SPEC_VERSION);

    for caps in dart_registrations()
        .into_iter()
        .flat_map(|re| re.captures_iter(&source))
    {
        let trigger = match &caps[1] {
            "onRequest" => Trigger::Https { invoker: vec![] },
            _ => Trigger::Callable,
        };
        build.add_endpoint(Endpoint::new(&caps[2], trigger));
    }

    debug!(entry = %entry.display(), count = build.endpoints.len(), "legacy scan finished");
    Ok(build)
}

fn pubsub_trigger(topic: &str) -> Trigger {
    let mut filters = std::collections::BTreeMap::new();
    filters.insert("topic".to_string(), topic.to_string());
    Trigger::Event {
        event_type: "google.cloud.pubsub.topic.v1.messagePublished".to_string(),
        filters,
        retry: false,
    }
}
