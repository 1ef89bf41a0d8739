pub mod commands;
pub mod handlers;

pub use commands::{CliArgs, Commands, OutputFormatArg, RebuildArgs, ResolveArgs, StatusArgs};
pub use handlers::{handle_rebuild, handle_resolve, handle_status};
