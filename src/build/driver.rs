//! Compiler driver seam
//!
//! The redirection layer never compiles anything itself. It hands a
//! [`BuildRequest`] to whatever driver the backend configured and judges
//! the outcome by the captured diagnostics; locating the produced artifact
//! is the locator's job.

use crate::config::SKIP_ENV;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Everything a driver needs for one module build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub module: String,
    /// Working directory for the driver, the out-of-tree build dir.
    pub build_dir: PathBuf,
    /// Where the artifact is expected to land.
    pub output_dir: PathBuf,
    pub sources: Vec<PathBuf>,
    /// Global options followed by per-module ones.
    pub options: Vec<String>,
    pub verbose: bool,
}

/// Captured driver output, kept verbatim for error reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildDiagnostics {
    /// Exit status code; `None` if the driver was killed by a signal or
    /// never spawned.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl BuildDiagnostics {
    /// One-line digest for error messages: status plus the tail of the
    /// most relevant stream.
    pub fn summary(&self) -> String {
        let status = match self.status {
            Some(code) => format!("exit status {code}"),
            None => "no exit status".to_string(),
        };
        let detail = if !self.stderr.trim().is_empty() {
            self.stderr.trim()
        } else {
            self.stdout.trim()
        };
        match detail.lines().last() {
            Some(line) if !line.is_empty() => format!("{status}; {line}"),
            _ => status,
        }
    }
}

/// A failed driver invocation.
#[derive(Debug, Clone)]
pub struct DriverFailure {
    pub diagnostics: BuildDiagnostics,
}

/// The external-compiler interface consumed by the rebuild trigger.
///
/// Implementations run synchronously to completion or failure; there is no
/// cancellation, and timeouts are the driver's own concern.
pub trait CompilerDriver: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, request: &BuildRequest) -> Result<BuildDiagnostics, DriverFailure>;
}

/// Drives the configured external command, e.g. `cmake --build .`.
pub struct ProcessDriver {
    command: Vec<String>,
}

impl ProcessDriver {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// The child environment carries the recursion marker extended with
    /// this build directory, so an import performed by the driver itself
    /// skips rebuilding.
    fn marker_value(&self, request: &BuildRequest) -> std::ffi::OsString {
        let existing = env::var_os(SKIP_ENV).unwrap_or_default();
        let mut paths: Vec<PathBuf> = env::split_paths(&existing).collect();
        paths.push(request.build_dir.clone());
        match env::join_paths(&paths) {
            Ok(joined) => joined,
            Err(err) => {
                warn!(error = %err, "could not extend rebuild marker; keeping existing value");
                existing
            }
        }
    }
}

impl CompilerDriver for ProcessDriver {
    fn name(&self) -> &str {
        "process"
    }

    fn build(&self, request: &BuildRequest) -> Result<BuildDiagnostics, DriverFailure> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(DriverFailure {
                diagnostics: BuildDiagnostics {
                    status: None,
                    stdout: String::new(),
                    stderr: "driver command is empty".to_string(),
                },
            });
        };

        if request.verbose {
            eprintln!(
                "Running {} {} in {}",
                program,
                args.iter()
                    .chain(request.options.iter())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" "),
                request.build_dir.display()
            );
        }
        debug!(
            module = %request.module,
            program,
            build_dir = %request.build_dir.display(),
            "invoking compiler driver"
        );

        let output = Command::new(program)
            .args(args)
            .args(&request.options)
            .current_dir(&request.build_dir)
            .env(SKIP_ENV, self.marker_value(request))
            .output();

        match output {
            Err(err) => Err(DriverFailure {
                diagnostics: BuildDiagnostics {
                    status: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn '{program}': {err}"),
                },
            }),
            Ok(out) => {
                let diagnostics = BuildDiagnostics {
                    status: out.status.code(),
                    stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                };
                if out.status.success() {
                    Ok(diagnostics)
                } else {
                    if request.verbose {
                        eprintln!("ERROR: {}", diagnostics.summary());
                    }
                    Err(DriverFailure { diagnostics })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(dir: &TempDir) -> BuildRequest {
        BuildRequest {
            module: "pkg.native".to_string(),
            build_dir: dir.path().to_path_buf(),
            output_dir: dir.path().to_path_buf(),
            sources: Vec::new(),
            options: Vec::new(),
            verbose: false,
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_successful_command() {
        let dir = TempDir::new().unwrap();
        let driver = ProcessDriver::new(vec!["true".to_string()]);
        let diagnostics = driver.build(&request(&dir)).unwrap();
        assert_eq!(diagnostics.status, Some(0));
    }

    #[test]
    #[cfg(unix)]
    fn test_failed_command_captures_diagnostics() {
        let dir = TempDir::new().unwrap();
        let driver = ProcessDriver::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo boom >&2; exit 3".to_string(),
        ]);
        let failure = driver.build(&request(&dir)).unwrap_err();
        assert_eq!(failure.diagnostics.status, Some(3));
        assert!(failure.diagnostics.stderr.contains("boom"));
        assert!(failure.diagnostics.summary().contains("exit status 3"));
    }

    #[test]
    #[cfg(unix)]
    fn test_marker_propagated_to_child() {
        let dir = TempDir::new().unwrap();
        let marker_file = dir.path().join("marker.txt");
        let driver = ProcessDriver::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("printf '%s' \"$EDREDIRECT_SKIP\" > {}", marker_file.display()),
        ]);
        driver.build(&request(&dir)).unwrap();
        let recorded = std::fs::read_to_string(&marker_file).unwrap();
        assert!(recorded.contains(&dir.path().display().to_string()));
    }

    #[test]
    fn test_missing_program_is_failure() {
        let dir = TempDir::new().unwrap();
        let driver = ProcessDriver::new(vec!["definitely-not-a-real-program-xyz".to_string()]);
        let failure = driver.build(&request(&dir)).unwrap_err();
        assert!(failure.diagnostics.stderr.contains("failed to spawn"));
    }

    #[test]
    fn test_summary_prefers_stderr() {
        let diagnostics = BuildDiagnostics {
            status: Some(1),
            stdout: "progress".to_string(),
            stderr: "first\nfatal error".to_string(),
        };
        assert_eq!(diagnostics.summary(), "exit status 1; fatal error");
    }
}
