//! Layout document and runtime settings
//!
//! The declared layout is a TOML document supplied by the build backend's
//! config loader. It names the package, the source and build roots, the
//! compiler-driver command, and a flat list of `[[module]]` entries that the
//! [`crate::module_map::ModuleMap`] is built from.
//!
//! # Environment Variables
//!
//! - `EDREDIRECT_VERBOSE`: echo driver commands to stderr; the literal `"0"`
//!   disables echoing even if the layout enables it
//! - `EDREDIRECT_SKIP`: path-separated list of build directories for which
//!   rebuilds must be skipped; the process driver appends its own build
//!   directory so a driver that re-imports the package cannot recurse
//!
//! # Example
//!
//! ```no_run
//! use editable_redirect::RedirectConfig;
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedirectConfig::from_path(Path::new("editable.toml"))?;
//! let settings = config.settings(Path::new("/work/project"));
//! println!("build dir: {}", settings.build_dir.display());
//! # Ok(())
//! # }
//! ```

use crate::module_map::ModuleDecl;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Verbose-echo override, mirroring the host backend's editable verbose flag.
pub const VERBOSE_ENV: &str = "EDREDIRECT_VERBOSE";

/// Rebuild-recursion marker: a path-separated list of build directories.
pub const SKIP_ENV: &str = "EDREDIRECT_SKIP";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read layout file {}: {error}", .path.display())]
    ReadFailed { path: PathBuf, error: String },

    #[error("failed to parse layout: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("driver command must not be empty")]
    EmptyCommand,

    #[error("no modules declared in layout")]
    NoModules,

    #[error("invalid ABI tag '{0}'")]
    InvalidAbiTag(String),

    #[error("artifact suffix '{0}' must start with '.'")]
    InvalidSuffix(String),
}

/// Parsed layout document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RedirectConfig {
    pub package: PackageSection,
    pub build: BuildSection,
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PackageSection {
    /// Distribution name, used for log context only.
    pub name: String,

    /// Directory holding the editable source tree, relative to the project
    /// root unless absolute.
    pub source_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildSection {
    /// Out-of-tree build directory, relative to the project root unless
    /// absolute.
    pub build_dir: PathBuf,

    /// Compiler-driver command line, e.g. `["cmake", "--build", "."]`.
    pub command: Vec<String>,

    /// Global driver options, appended to every invocation.
    #[serde(default)]
    pub options: Vec<String>,

    /// The host's exact ABI tag, e.g. `cpython-312-x86_64-linux-gnu`.
    pub host_tag: String,

    /// Forward-compatible stable ABI tag.
    #[serde(default = "default_stable_tag")]
    pub stable_tag: String,

    /// Accepted artifact filename suffixes; most platforms have one.
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,

    /// Rebuild stale modules on import. When false the layer only locates
    /// previously built artifacts.
    #[serde(default = "default_true")]
    pub rebuild: bool,

    /// Echo driver commands to stderr.
    #[serde(default)]
    pub verbose: bool,
}

fn default_stable_tag() -> String {
    "abi3".to_string()
}

fn default_suffixes() -> Vec<String> {
    vec![".so".to_string()]
}

fn default_true() -> bool {
    true
}

impl RedirectConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            error: err.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.command.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        if self.modules.is_empty() {
            return Err(ConfigError::NoModules);
        }
        for suffix in &self.build.suffixes {
            if !suffix.starts_with('.') {
                return Err(ConfigError::InvalidSuffix(suffix.clone()));
            }
        }
        Ok(())
    }

    /// Resolves the document into runtime settings anchored at the project
    /// root.
    pub fn settings(&self, project_root: &Path) -> RedirectSettings {
        RedirectSettings {
            package: self.package.name.clone(),
            project_root: project_root.to_path_buf(),
            source_root: absolutize(project_root, &self.package.source_root),
            build_dir: absolutize(project_root, &self.build.build_dir),
            command: self.build.command.clone(),
            options: self.build.options.clone(),
            host_tag: self.build.host_tag.clone(),
            stable_tag: self.build.stable_tag.clone(),
            suffixes: self.build.suffixes.clone(),
            rebuild: self.build.rebuild,
            verbose: self.build.verbose,
        }
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Runtime settings shared by the rebuild coordinator and the locator.
#[derive(Debug, Clone)]
pub struct RedirectSettings {
    pub package: String,
    pub project_root: PathBuf,
    pub source_root: PathBuf,
    pub build_dir: PathBuf,
    pub command: Vec<String>,
    pub options: Vec<String>,
    pub host_tag: String,
    pub stable_tag: String,
    pub suffixes: Vec<String>,
    pub rebuild: bool,
    pub verbose: bool,
}

impl RedirectSettings {
    /// The configured verbose flag, overridden by `EDREDIRECT_VERBOSE`.
    /// A literal `"0"` always disables.
    pub fn effective_verbose(&self) -> bool {
        match env::var(VERBOSE_ENV) {
            Ok(value) if value == "0" => false,
            Ok(value) if !value.is_empty() => true,
            _ => self.verbose,
        }
    }

    /// True when this build directory is listed in the recursion marker,
    /// meaning a driver launched by us is importing the package it builds.
    pub fn skip_marker_contains_build_dir(&self) -> bool {
        match env::var_os(SKIP_ENV) {
            Some(raw) => env::split_paths(&raw).any(|p| p == self.build_dir),
            None => false,
        }
    }
}
