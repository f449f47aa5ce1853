//! Output formatting for detection reports and build descriptions
//!
//! JSON and YAML are the machine-readable forms of the same serde types;
//! the human form is a compact summary.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::output::BuildDescription;
use crate::runtime::{LanguageId, RuntimeId};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
}

/// Result of `rtdelegate detect`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub source_dir: PathBuf,
    /// `None` when no ecosystem claimed the directory
    pub language: Option<LanguageId>,
    pub runtime: Option<RuntimeId>,
    pub deprecated: bool,
}

impl DetectionReport {
    pub fn none(source_dir: PathBuf) -> Self {
        Self {
            source_dir,
            language: None,
            runtime: None,
            deprecated: false,
        }
    }

    pub fn detected(source_dir: PathBuf, language: LanguageId, runtime: RuntimeId) -> Self {
        Self {
            source_dir,
            language: Some(language),
            runtime: Some(runtime),
            deprecated: runtime.is_deprecated(),
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_detection(&self, report: &DetectionReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize detection report to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize detection report to YAML")
            }
            OutputFormat::Human => Ok(self.format_detection_human(report)),
        }
    }

    pub fn format_build(&self, build: &BuildDescription) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(build)
                .context("Failed to serialize build description to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(build).context("Failed to serialize build description to YAML")
            }
            OutputFormat::Human => Ok(self.format_build_human(build)),
        }
    }

    fn format_detection_human(&self, report: &DetectionReport) -> String {
        match (report.language, report.runtime) {
            (Some(language), Some(runtime)) => {
                let mut output = format!(
                    "\u{2713} {} detected in {}\n",
                    language.name(),
                    report.source_dir.display()
                );
                output.push_str(&format!("  Runtime: {} ({})\n", runtime, runtime.name()));
                if report.deprecated {
                    output.push_str(&format!(
                        "  \u{26A0} {} is deprecated; consider {}\n",
                        runtime,
                        RuntimeId::latest(language)
                    ));
                }
                output
            }
            _ => format!(
                "\u{2717} No supported language detected in {}\n",
                report.source_dir.display()
            ),
        }
    }

    fn format_build_human(&self, build: &BuildDescription) -> String {
        let mut output = format!(
            "\u{2713} Discovered {} endpoint(s) (spec {})\n{}\n\n",
            build.endpoints.len(),
            build.spec_version,
            RULE
        );

        let width = build
            .endpoints
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(8);

        for endpoint in build.endpoints.values() {
            output.push_str(&format!(
                "{:<width$}  {:<24}  {:<6}  {}\n",
                endpoint.id,
                endpoint.trigger.to_string(),
                format!("{:?}", endpoint.platform).to_lowercase(),
                endpoint.regions.join(","),
                width = width
            ));
            if endpoint.entry_point != endpoint.id {
                output.push_str(&format!("  \u{2514}\u{2500} entry point: {}\n", endpoint.entry_point));
            }
        }

        if !build.required_apis.is_empty() {
            output.push_str("\nRequired APIs:\n");
            for api in &build.required_apis {
                output.push_str(&format!("  - {} ({})\n", api.api, api.reason));
            }
        }

        let secrets = build.secret_names();
        if !secrets.is_empty() {
            output.push_str(&format!("\nSecrets: {}\n", secrets.join(", ")));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Endpoint, Trigger};

    fn sample_build() -> BuildDescription {
        let mut build = BuildDescription::new("v1alpha1");
        build.add_endpoint(Endpoint::new("hello", Trigger::Https { invoker: vec![] }));
        build.add_endpoint(Endpoint::new(
            "nightly",
            Trigger::Schedule {
                schedule: "every 24 hours".to_string(),
                time_zone: None,
            },
        ));
        build
    }

    #[test]
    fn test_build_json_round_trips() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json = formatter.format_build(&sample_build()).unwrap();
        let parsed: BuildDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample_build());
    }

    #[test]
    fn test_build_yaml_contains_endpoints() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let yaml = formatter.format_build(&sample_build()).unwrap();
        assert!(yaml.contains("hello"));
        assert!(yaml.contains("every 24 hours"));
    }

    #[test]
    fn test_build_human_lists_each_endpoint() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let text = formatter.format_build(&sample_build()).unwrap();
        assert!(text.contains("Discovered 2 endpoint(s)"));
        assert!(text.lines().any(|l| l.starts_with("hello") && l.contains("https")));
        assert!(text.lines().any(|l| l.starts_with("nightly") && l.contains("schedule")));
    }

    #[test]
    fn test_detection_human_flags_deprecated_runtime() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let report = DetectionReport::detected(
            PathBuf::from("functions"),
            LanguageId::Node,
            RuntimeId::Nodejs18,
        );
        let text = formatter.format_detection(&report).unwrap();
        assert!(text.contains("deprecated"));
        assert!(text.contains("nodejs22"));
    }

    #[test]
    fn test_detection_json_for_no_match() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json = formatter
            .format_detection(&DetectionReport::none(PathBuf::from("empty")))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["language"].is_null());
    }
}
