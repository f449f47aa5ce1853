//! Subcommand handlers. Each returns the process exit code.

use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::commands::{DetectArgs, DiscoverArgs, SourceArgs};
use super::output::{DetectionReport, OutputFormatter};
use crate::config::DelegateConfig;
use crate::delegate::{get_runtime_delegate, try_create_delegate, SourceDescriptor};
use crate::discovery::{EnvBindings, RuntimeConfigValues};
use crate::error::DelegateError;

pub fn source_descriptor(args: &SourceArgs) -> SourceDescriptor {
    let source_dir = args
        .source_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let project_dir = args
        .project_dir
        .clone()
        .unwrap_or_else(|| source_dir.clone());

    SourceDescriptor {
        project_id: args.project_id.clone(),
        project_dir,
        source_dir,
        declared_runtime: args.runtime.clone(),
    }
}

fn report_error(err: &DelegateError) -> i32 {
    error!("{}", err);
    eprintln!("\n{}", err.help_message());
    err.exit_code()
}

fn emit(output: &str, destination: Option<&Path>) -> anyhow::Result<()> {
    match destination {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!("Output written to {}", path.display());
        }
        None => print!("{}", output),
    }
    Ok(())
}

pub async fn handle_detect(args: &DetectArgs, config: &DelegateConfig) -> i32 {
    let source = source_descriptor(&args.source);
    let report = match try_create_delegate(&source, config) {
        Ok(Some(delegate)) => DetectionReport::detected(
            source.source_dir.clone(),
            delegate.language(),
            delegate.runtime(),
        ),
        Ok(None) => DetectionReport::none(source.source_dir.clone()),
        Err(e) => return report_error(&e),
    };

    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format_detection(&report) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    }

    if report.language.is_some() {
        0
    } else {
        1
    }
}

pub async fn handle_validate(args: &SourceArgs, config: &DelegateConfig) -> i32 {
    let source = source_descriptor(args);
    let result = async {
        let delegate = get_runtime_delegate(&source, config)?;
        delegate.validate().await?;
        Ok::<_, DelegateError>(delegate.runtime())
    }
    .await;

    match result {
        Ok(runtime) => {
            println!(
                "\u{2713} {} is a valid {} source",
                source.source_dir.display(),
                runtime
            );
            0
        }
        Err(e) => report_error(&e),
    }
}

pub async fn handle_build(args: &SourceArgs, config: &DelegateConfig) -> i32 {
    let source = source_descriptor(args);
    let result = async {
        let delegate = get_runtime_delegate(&source, config)?;
        delegate.validate().await?;
        delegate.build().await
    }
    .await;

    match result {
        Ok(()) => {
            info!(source = %source.source_dir.display(), "build finished");
            0
        }
        Err(e) => report_error(&e),
    }
}

pub async fn handle_discover(args: &DiscoverArgs, config: &DelegateConfig) -> i32 {
    let runtime_config = match args.runtime_config.as_deref() {
        Some(path) => match load_runtime_config(path) {
            Ok(values) => values,
            Err(e) => {
                error!("{:#}", e);
                return 1;
            }
        },
        None => RuntimeConfigValues::new(),
    };
    let env: EnvBindings = args.env.iter().cloned().collect();

    let source = source_descriptor(&args.source);
    let result = async {
        let delegate = get_runtime_delegate(&source, config)?;
        delegate.validate().await?;
        debug!(runtime = %delegate.runtime(), "discovering triggers");
        delegate.discover_build(&runtime_config, &env).await
    }
    .await;

    let build = match result {
        Ok(build) => build,
        Err(e) => return report_error(&e),
    };

    let formatter = OutputFormatter::new(args.format.into());
    let emitted = formatter
        .format_build(&build)
        .and_then(|output| emit(&output, args.output.as_deref()));
    match emitted {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

pub fn handle_config(config: &DelegateConfig) -> i32 {
    print!("{}", config);
    0
}

/// Reads the runtime config blob: a JSON object, nothing else.
pub fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfigValues> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read runtime config {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Runtime config {} is not valid JSON", path.display()))?;
    match value {
        serde_json::Value::Object(values) => Ok(values),
        other => bail!(
            "Runtime config {} must be a JSON object, found {}",
            path.display(),
            json_kind(&other)
        ),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
