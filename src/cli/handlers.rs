//! Command handlers for the administrative binary

use super::commands::{OutputFormatArg, RebuildArgs, ResolveArgs, StatusArgs};
use crate::build::ProcessDriver;
use crate::config::RedirectConfig;
use crate::hook::Redirector;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;

/// Loads the layout and wires a redirector backed by the configured
/// external command.
fn build_redirector(layout: &Path, project_root: Option<&Path>) -> Result<Redirector> {
    let config = RedirectConfig::from_path(layout)
        .with_context(|| format!("failed to load layout {}", layout.display()))?;

    let root: PathBuf = match project_root {
        Some(root) => root.to_path_buf(),
        None => layout
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let driver = Arc::new(ProcessDriver::new(config.build.command.clone()));
    Redirector::from_config(&config, &root, driver).context("failed to construct redirector")
}

pub fn handle_resolve(args: &ResolveArgs, layout: &Path, project_root: Option<&Path>) -> i32 {
    let redirector = match build_redirector(layout, project_root) {
        Ok(redirector) => redirector,
        Err(err) => {
            error!(error = %format!("{err:#}"), "setup failed");
            eprintln!("Error: {err:#}");
            return 1;
        }
    };

    match redirector.resolve(&args.module) {
        Ok(Some(located)) => {
            match args.format {
                OutputFormatArg::Json => match serde_json::to_string_pretty(&located) {
                    Ok(json) => println!("{json}"),
                    Err(err) => {
                        eprintln!("Error: failed to serialize result: {err}");
                        return 1;
                    }
                },
                OutputFormatArg::Human => {
                    println!("{} ({})", located.path.display(), located.kind);
                    if !located.children.is_empty() {
                        println!("children: {}", located.children.join(", "));
                    }
                    for location in &located.search_locations {
                        println!("search: {}", location.display());
                    }
                }
            }
            0
        }
        Ok(None) => {
            eprintln!("declined: '{}' is not part of the declared layout", args.module);
            2
        }
        Err(err) => {
            eprintln!("Error: {err}");
            1
        }
    }
}

pub fn handle_rebuild(args: &RebuildArgs, layout: &Path, project_root: Option<&Path>) -> i32 {
    let redirector = match build_redirector(layout, project_root) {
        Ok(redirector) => redirector,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return 1;
        }
    };

    match redirector.force_rebuild(&args.module) {
        Ok(Some(artifact)) => {
            match args.format {
                OutputFormatArg::Json => match serde_json::to_string_pretty(&artifact) {
                    Ok(json) => println!("{json}"),
                    Err(err) => {
                        eprintln!("Error: failed to serialize result: {err}");
                        return 1;
                    }
                },
                OutputFormatArg::Human => {
                    println!("{} [{}]", artifact.path.display(), artifact.tag);
                }
            }
            0
        }
        Ok(None) => {
            eprintln!("'{}' is not a declared native module", args.module);
            2
        }
        Err(err) => {
            eprintln!("Error: {err}");
            1
        }
    }
}

pub fn handle_status(args: &StatusArgs, layout: &Path, project_root: Option<&Path>) -> i32 {
    let redirector = match build_redirector(layout, project_root) {
        Ok(redirector) => redirector,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return 1;
        }
    };

    let reports = match redirector.status() {
        Ok(reports) => reports,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };

    match args.format {
        OutputFormatArg::Json => match serde_json::to_string_pretty(&reports) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(err) => {
                eprintln!("Error: failed to serialize report: {err}");
                1
            }
        },
        OutputFormatArg::Human => {
            for report in &reports {
                let state = report
                    .state
                    .map(|s| format!("{s:?}").to_lowercase())
                    .unwrap_or_else(|| "-".to_string());
                let artifact = report
                    .artifact
                    .as_ref()
                    .map(|a| a.path.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                let kind = report.kind.to_string();
                println!("{:<40} {:<14} {:<8} {}", report.module, kind, state, artifact);
            }
            0
        }
    }
}
