use editable_redirect::cli::commands::{CliArgs, Commands};
use editable_redirect::cli::handlers::{handle_rebuild, handle_resolve, handle_status};
use editable_redirect::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("edredirect v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let layout = args.layout.as_path();
    let project_root = args.project_root.as_deref();

    let exit_code = match &args.command {
        Commands::Resolve(resolve_args) => handle_resolve(resolve_args, layout, project_root),
        Commands::Rebuild(rebuild_args) => handle_rebuild(rebuild_args, layout, project_root),
        Commands::Status(status_args) => handle_status(status_args, layout, project_root),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &args.log_level {
            parse_level(level_str)
        } else if args.verbose {
            Level::DEBUG
        } else if args.quiet {
            Level::ERROR
        } else {
            let level_str =
                env::var("EDREDIRECT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            parse_level(&level_str)
        };

        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            if let Ok(directive) = format!("editable_redirect={}", level).parse() {
                filter = filter.add_directive(directive);
            }
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
