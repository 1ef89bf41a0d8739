//! Failure kinds surfaced to the importer
//!
//! A name outside the declared layout is not an error: resolution declines
//! with `Ok(None)` so ordinary host resolution keeps working. Everything
//! else propagates; nothing is swallowed.

use crate::build::driver::BuildDiagnostics;
use crate::config::ConfigError;
use crate::module_map::LayoutError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedirectError {
    /// Nonzero driver result, carrying the captured diagnostics. Also used
    /// when the source fingerprint changed during the build twice in a row.
    #[error("build failed for '{module}': {}", .diagnostics.summary())]
    BuildFailure {
        module: String,
        diagnostics: BuildDiagnostics,
    },

    /// A triggered build left no loadable candidate in the output
    /// directory. Fatal, never silently resolved.
    #[error("no loadable artifact for '{module}' in {}", .search_dir.display())]
    MissingArtifact { module: String, search_dir: PathBuf },

    /// More than one candidate at the winning ABI priority. Fatal, never
    /// silently resolved.
    #[error("ambiguous artifacts for '{module}': {}", format_candidates(.candidates))]
    AmbiguousArtifact {
        module: String,
        candidates: Vec<PathBuf>,
    },

    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
