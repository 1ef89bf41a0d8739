//! editable-redirect - editable-install import redirection for a
//! native-extension build backend
//!
//! This library lets a package under active development be imported
//! directly from its source tree while compiled submodules are rebuilt
//! out-of-tree and substituted at import time, across arbitrarily deep
//! nested sub-packages mixing pure and compiled modules.
//!
//! # Core Concepts
//!
//! - **Module map**: a read-mostly tree of declared dotted names built once
//!   at install time, distinguishing packages, pure modules, and native
//!   modules
//! - **Rebuild trigger**: fingerprints a node's sources and build options,
//!   invokes the configured compiler driver when they change, and
//!   guarantees at most one concurrent build per node
//! - **Import hook**: a finder registered ahead of standard resolution that
//!   redirects declared names and declines everything else
//! - **Artifact locator**: picks the authoritative binary among ABI-tagged
//!   candidates by deterministic priority
//!
//! # Example Usage
//!
//! ```no_run
//! use editable_redirect::{ImportMachinery, ProcessDriver, RedirectConfig, Redirector};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedirectConfig::from_path(Path::new("editable.toml"))?;
//!     let driver = Arc::new(ProcessDriver::new(config.build.command.clone()));
//!     let redirector = Redirector::from_config(&config, Path::new("."), driver)?;
//!
//!     let machinery = ImportMachinery::new();
//!     redirector.install(&machinery);
//!
//!     if let Some(located) = machinery.resolve("pkg.native")? {
//!         println!("load {} from {}", located.module, located.path.display());
//!     }
//!
//!     redirector.uninstall(&machinery);
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`module_map`]: declared-layout tree and dotted-name resolution
//! - [`build`]: fingerprints, the compiler-driver seam, and rebuild
//!   synchronization
//! - [`hook`]: the finder protocol, import machinery, and redirector
//!   lifecycle
//! - [`artifact`]: ABI-tagged artifact location

// Public modules
pub mod artifact;
pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod hook;
pub mod module_map;
pub mod util;

// Re-export key types for convenient access
pub use artifact::{AbiTag, ArtifactLocator, BuildArtifact};
pub use build::{
    BuildDiagnostics, BuildRequest, BuildStatus, CompilerDriver, DriverFailure, Fingerprint,
    ProcessDriver, RebuildCoordinator, RedirectionTable,
};
pub use config::{ConfigError, RedirectConfig, RedirectSettings};
pub use error::RedirectError;
pub use hook::{FindResult, Finder, ImportMachinery, Located, NodeReport, Redirector};
pub use module_map::{LayoutError, ModuleDecl, ModuleKind, ModuleMap, ModuleNode};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
