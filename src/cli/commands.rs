use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Editable-install import redirection for a native-extension build backend
#[derive(Parser, Debug)]
#[command(
    name = "edredirect",
    about = "Editable-install import redirection for a native-extension build backend",
    version,
    long_about = "edredirect resolves dotted module names against a declared editable \
                  layout, rebuilding stale native modules through the configured \
                  compiler driver and reporting the authoritative loadable path."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        value_name = "FILE",
        default_value = "editable.toml",
        help = "Path to the layout document"
    )]
    pub layout: PathBuf,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Project root (defaults to the layout file's directory)"
    )]
    pub project_root: Option<PathBuf>,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Verbose output")]
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
        about = "Resolve a dotted module name",
        long_about = "Resolves a dotted module name the way the import hook would: \
                      declared native modules are rebuilt if stale, pure modules and \
                      packages come straight from the source tree, anything else \
                      declines.\n\n\
                      Examples:\n  \
                      edredirect resolve pkg.native\n  \
                      edredirect --layout demo/editable.toml resolve pkg.sub.helper"
    )]
    Resolve(ResolveArgs),

    #[command(
        about = "Force-rebuild a native module",
        long_about = "Rebuilds a declared native module regardless of staleness.\n\n\
                      Examples:\n  \
                      edredirect rebuild pkg.native"
    )]
    Rebuild(RebuildArgs),

    #[command(
        about = "Show the module tree and per-node build state",
        long_about = "Dumps every declared module with its kind, build lifecycle \
                      state, current fingerprint, and bound artifact.\n\n\
                      Examples:\n  \
                      edredirect status\n  \
                      edredirect status --format json"
    )]
    Status(StatusArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ResolveArgs {
    #[arg(value_name = "MODULE", help = "Dotted module name, e.g. pkg.sub.native")]
    pub module: String,

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
pub struct RebuildArgs {
    #[arg(value_name = "MODULE", help = "Dotted native-module name")]
    pub module: String,

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
pub struct StatusArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    /// Human-readable formatted text
    Human,
    /// JSON format (machine-readable)
    Json,
}
