//! Rebuild synchronization
//!
//! One coordinator per redirector instance. Each native node carries its
//! own lock and condition variable: concurrent resolvers for the same stale
//! node block on the in-flight build and share its result, while unrelated
//! nodes build independently. A started build always runs to completion or
//! failure.

use crate::artifact::{ArtifactLocator, BuildArtifact};
use crate::build::driver::{BuildDiagnostics, BuildRequest, CompilerDriver};
use crate::build::fingerprint::{self, Fingerprint};
use crate::config::{ConfigError, RedirectSettings};
use crate::error::RedirectError;
use crate::module_map::{ModuleMap, ModuleNode};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Per-node lifecycle: `Unbuilt → Fresh → Stale → Fresh`, with `Broken`
/// reachable from any failed build and terminal until a source change or a
/// forced rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Unbuilt,
    Fresh,
    Stale,
    Broken,
}

/// Failure kept for a Broken node so repeated resolutions report the same
/// error without re-running the driver.
#[derive(Debug, Clone)]
enum StoredFailure {
    Driver(BuildDiagnostics),
    Missing { search_dir: PathBuf },
    Ambiguous { candidates: Vec<PathBuf> },
}

impl StoredFailure {
    fn to_error(&self, module: &str) -> RedirectError {
        match self {
            StoredFailure::Driver(diagnostics) => RedirectError::BuildFailure {
                module: module.to_string(),
                diagnostics: diagnostics.clone(),
            },
            StoredFailure::Missing { search_dir } => RedirectError::MissingArtifact {
                module: module.to_string(),
                search_dir: search_dir.clone(),
            },
            StoredFailure::Ambiguous { candidates } => RedirectError::AmbiguousArtifact {
                module: module.to_string(),
                candidates: candidates.clone(),
            },
        }
    }
}

#[derive(Default)]
struct NodeState {
    building: bool,
    fingerprint: Option<Fingerprint>,
    artifact: Option<BuildArtifact>,
    failure: Option<StoredFailure>,
}

struct NodeEntry {
    state: Mutex<NodeState>,
    ready: Condvar,
}

impl NodeEntry {
    fn new() -> Self {
        Self {
            state: Mutex::new(NodeState::default()),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Dotted name → build artifact, one guarded entry per native leaf. The
/// key set is fixed when the module map is built, so entries lock
/// independently.
pub struct RedirectionTable {
    entries: HashMap<String, NodeEntry>,
}

impl RedirectionTable {
    fn new(map: &ModuleMap) -> Self {
        let entries = map
            .native_modules()
            .map(|node| (node.name().to_string(), NodeEntry::new()))
            .collect();
        Self { entries }
    }

    fn entry(&self, name: &str) -> Option<&NodeEntry> {
        self.entries.get(name)
    }

    /// Snapshot of the current artifact binding, if any.
    pub fn artifact(&self, name: &str) -> Option<BuildArtifact> {
        self.entries.get(name).and_then(|e| e.lock().artifact.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Staleness detection plus synchronized driver invocation.
pub struct RebuildCoordinator {
    driver: Arc<dyn CompilerDriver>,
    locator: ArtifactLocator,
    settings: RedirectSettings,
    table: RedirectionTable,
}

impl RebuildCoordinator {
    pub fn new(
        map: &ModuleMap,
        settings: RedirectSettings,
        driver: Arc<dyn CompilerDriver>,
    ) -> Result<Self, ConfigError> {
        let locator = ArtifactLocator::new(
            settings.host_tag.clone(),
            settings.stable_tag.clone(),
            settings.suffixes.clone(),
        )?;
        Ok(Self {
            driver,
            locator,
            settings,
            table: RedirectionTable::new(map),
        })
    }

    pub fn table(&self) -> &RedirectionTable {
        &self.table
    }

    /// Current fingerprint of the node's declared inputs.
    pub fn fingerprint(&self, node: &ModuleNode) -> Result<Fingerprint, RedirectError> {
        Ok(fingerprint::compute(node.sources(), &self.options_for(node))?)
    }

    /// True iff the node has never built successfully or its inputs
    /// changed since the last build.
    pub fn needs_rebuild(&self, node: &ModuleNode) -> Result<bool, RedirectError> {
        let current = self.fingerprint(node)?;
        let Some(entry) = self.table.entry(node.name()) else {
            return Ok(true);
        };
        let state = entry.lock();
        Ok(state.fingerprint.as_ref() != Some(&current))
    }

    /// Builds the node if stale, returning the cached artifact otherwise.
    pub fn trigger(&self, node: &ModuleNode) -> Result<BuildArtifact, RedirectError> {
        self.ensure_built(node, false)
    }

    /// Rebuilds regardless of the stored fingerprint.
    pub fn force_rebuild(&self, node: &ModuleNode) -> Result<BuildArtifact, RedirectError> {
        self.ensure_built(node, true)
    }

    /// Where the node currently sits in the build lifecycle.
    pub fn status(&self, node: &ModuleNode) -> Result<BuildStatus, RedirectError> {
        let Some(entry) = self.table.entry(node.name()) else {
            return Ok(BuildStatus::Unbuilt);
        };
        let stored = {
            let state = entry.lock();
            (
                state.fingerprint.clone(),
                state.artifact.is_some(),
                state.failure.is_some(),
            )
        };
        match stored {
            (None, _, _) => Ok(BuildStatus::Unbuilt),
            (Some(fp), has_artifact, has_failure) => {
                let current = self.fingerprint(node)?;
                if fp != current {
                    Ok(BuildStatus::Stale)
                } else if has_failure {
                    Ok(BuildStatus::Broken)
                } else if has_artifact {
                    Ok(BuildStatus::Fresh)
                } else {
                    Ok(BuildStatus::Unbuilt)
                }
            }
        }
    }

    fn options_for(&self, node: &ModuleNode) -> Vec<String> {
        self.settings
            .options
            .iter()
            .chain(node.options().iter())
            .cloned()
            .collect()
    }

    fn request_for(&self, node: &ModuleNode) -> BuildRequest {
        BuildRequest {
            module: node.name().to_string(),
            build_dir: self.settings.build_dir.clone(),
            output_dir: self.output_dir_for(node),
            sources: node.sources().to_vec(),
            options: self.options_for(node),
            verbose: self.settings.effective_verbose(),
        }
    }

    fn output_dir_for(&self, node: &ModuleNode) -> PathBuf {
        node.output_dir()
            .map(|d| d.to_path_buf())
            .unwrap_or_else(|| self.settings.build_dir.clone())
    }

    fn locate(&self, node: &ModuleNode) -> Result<BuildArtifact, RedirectError> {
        self.locator
            .locate(node.name(), node.artifact_stem(), &self.output_dir_for(node))
    }

    fn ensure_built(&self, node: &ModuleNode, force: bool) -> Result<BuildArtifact, RedirectError> {
        // A driver spawned by us may import the package it is building;
        // the marker breaks the recursion by falling back to whatever
        // artifact already exists.
        if self.settings.skip_marker_contains_build_dir() {
            debug!(module = node.name(), "rebuild marker present; locating without building");
            return self.locate(node);
        }
        if !force && !self.settings.rebuild {
            return self.locate(node);
        }

        let Some(entry) = self.table.entry(node.name()) else {
            warn!(module = node.name(), "node missing from redirection table");
            return Err(RedirectError::MissingArtifact {
                module: node.name().to_string(),
                search_dir: self.output_dir_for(node),
            });
        };

        let options = self.options_for(node);
        let mut raced_once = false;

        loop {
            let mut state = entry.lock();
            while state.building {
                state = entry
                    .ready
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }

            let current = fingerprint::compute(node.sources(), &options)?;

            if !force && state.fingerprint.as_ref() == Some(&current) {
                if let Some(artifact) = &state.artifact {
                    debug!(module = node.name(), "fingerprint unchanged; reusing artifact");
                    return Ok(artifact.clone());
                }
                if let Some(failure) = &state.failure {
                    return Err(failure.to_error(node.name()));
                }
            }

            state.building = true;
            drop(state);

            info!(
                module = node.name(),
                driver = self.driver.name(),
                forced = force,
                "building native module"
            );
            let request = self.request_for(node);
            let build_result = self.driver.build(&request);
            let post = fingerprint::compute(node.sources(), &options);

            let mut state = entry.lock();
            state.building = false;

            let outcome = match build_result {
                Err(failure) => {
                    warn!(
                        module = node.name(),
                        summary = %failure.diagnostics.summary(),
                        "driver reported build failure"
                    );
                    state.fingerprint = Some(current);
                    state.artifact = None;
                    state.failure = Some(StoredFailure::Driver(failure.diagnostics.clone()));
                    Err(RedirectError::BuildFailure {
                        module: node.name().to_string(),
                        diagnostics: failure.diagnostics,
                    })
                }
                Ok(diagnostics) => match post {
                    Err(err) => {
                        state.fingerprint = None;
                        state.artifact = None;
                        state.failure = None;
                        Err(RedirectError::Io(err))
                    }
                    Ok(post_fp) if post_fp != current => {
                        if !raced_once {
                            raced_once = true;
                            debug!(
                                module = node.name(),
                                "sources changed during build; retrying once"
                            );
                            entry.ready.notify_all();
                            drop(state);
                            continue;
                        }
                        state.fingerprint = None;
                        state.artifact = None;
                        state.failure = None;
                        Err(RedirectError::BuildFailure {
                            module: node.name().to_string(),
                            diagnostics: BuildDiagnostics {
                                status: diagnostics.status,
                                stdout: diagnostics.stdout,
                                stderr: "source fingerprint changed while the build was running, twice in a row"
                                    .to_string(),
                            },
                        })
                    }
                    Ok(post_fp) => match self.locate(node) {
                        Ok(artifact) => {
                            info!(
                                module = node.name(),
                                path = %artifact.path.display(),
                                tag = %artifact.tag,
                                "native module built"
                            );
                            state.fingerprint = Some(post_fp);
                            state.artifact = Some(artifact.clone());
                            state.failure = None;
                            Ok(artifact)
                        }
                        Err(err) => {
                            let stored = match &err {
                                RedirectError::MissingArtifact { search_dir, .. } => {
                                    Some(StoredFailure::Missing {
                                        search_dir: search_dir.clone(),
                                    })
                                }
                                RedirectError::AmbiguousArtifact { candidates, .. } => {
                                    Some(StoredFailure::Ambiguous {
                                        candidates: candidates.clone(),
                                    })
                                }
                                _ => None,
                            };
                            // I/O errors are transient; don't pin them to
                            // the fingerprint.
                            state.fingerprint = stored.as_ref().map(|_| post_fp);
                            state.artifact = None;
                            state.failure = stored;
                            Err(err)
                        }
                    },
                },
            };

            entry.ready.notify_all();
            drop(state);
            return outcome;
        }
    }
}
