use runtime_delegates::cli::commands::{CliArgs, Commands};
use runtime_delegates::cli::handlers::{
    handle_build, handle_config, handle_detect, handle_discover, handle_validate,
};
use runtime_delegates::util::logging::{config_from_env, init_logging};
use runtime_delegates::{DelegateConfig, VERSION};

use clap::Parser;
use std::env;
use tracing::{debug, error};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("rtdelegate v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let config = DelegateConfig::default();
    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    let exit_code = match &args.command {
        Commands::Detect(detect_args) => handle_detect(detect_args, &config).await,
        Commands::Validate(source_args) => handle_validate(source_args, &config).await,
        Commands::Build(source_args) => handle_build(source_args, &config).await,
        Commands::Discover(discover_args) => handle_discover(discover_args, &config).await,
        Commands::Config => handle_config(&config),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level) = &args.log_level {
        level.clone()
    } else if args.verbose {
        "debug".to_string()
    } else if args.quiet {
        "error".to_string()
    } else {
        env::var("RTDELEGATE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };

    init_logging(config_from_env(&level));
}
