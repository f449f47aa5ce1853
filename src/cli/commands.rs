use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Language delegates and trigger discovery for functions codebases
#[derive(Parser, Debug)]
#[command(
    name = "rtdelegate",
    about = "Language delegates and trigger discovery for functions codebases",
    version,
    long_about = "rtdelegate detects which language ecosystem owns a functions source \
                  directory (Node.js, Python or Dart), validates it, and discovers the \
                  triggers it declares without loading user code into this process."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Detect the language ecosystem of a functions directory",
        long_about = "Checks for package.json, requirements.txt and pubspec.yaml, in that \
                      order, and reports the delegate and runtime that would be used.\n\n\
                      Examples:\n  \
                      rtdelegate detect functions/\n  \
                      rtdelegate detect functions/ --runtime nodejs20 --format json"
    )]
    Detect(DetectArgs),

    #[command(
        about = "Validate a functions directory",
        long_about = "Runs the delegate's structural checks: manifest readability, SDK \
                      dependency, entry file and minimum SDK version.\n\n\
                      Examples:\n  \
                      rtdelegate validate functions/"
    )]
    Validate(SourceArgs),

    #[command(about = "Run the delegate's build step (codegen for Dart, no-op elsewhere)")]
    Build(SourceArgs),

    #[command(
        about = "Discover the triggers a functions directory declares",
        long_about = "Uses a static trigger manifest when one exists, otherwise runs the \
                      code in a subprocess and asks it. Old SDKs fall back to source \
                      scanning.\n\n\
                      Examples:\n  \
                      rtdelegate discover functions/ --project-id my-project\n  \
                      rtdelegate discover functions/ --env API_URL=https://example.com --format yaml"
    )]
    Discover(DiscoverArgs),

    #[command(about = "Show the effective configuration")]
    Config,
}

#[derive(Parser, Debug, Clone)]
pub struct SourceArgs {
    #[arg(
        value_name = "PATH",
        help = "Functions source directory (defaults to current directory)"
    )]
    pub source_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Project root (defaults to the source directory)"
    )]
    pub project_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "ID",
        default_value = "demo-project",
        help = "Project ID passed to user code as GCLOUD_PROJECT"
    )]
    pub project_id: String,

    #[arg(
        long,
        value_name = "RUNTIME",
        help = "Runtime to target, e.g. nodejs20 or python312 (defaults to the latest)"
    )]
    pub runtime: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct DetectArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'e',
        long = "env",
        value_name = "KEY=VALUE",
        value_parser = parse_key_val,
        help = "Environment binding exposed to user code (repeatable)"
    )]
    pub env: Vec<(String, String)>,

    #[arg(
        long,
        value_name = "FILE",
        help = "JSON object passed to user code as the runtime config blob"
    )]
    pub runtime_config: Option<PathBuf>,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid binding '{}': expected KEY=VALUE", s))?;
    if key.is_empty() {
        return Err(format!("Invalid binding '{}': key is empty", s));
    }
    Ok((key.to_string(), value.to_string()))
}
