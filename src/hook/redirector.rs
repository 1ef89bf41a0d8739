//! The redirector context: module map, redirection table, lifecycle
//!
//! One `Redirector` owns the module map and the rebuild coordinator for a
//! single editable install. `install`/`uninstall` put its finder ahead of
//! standard resolution in an [`ImportMachinery`]; `resolve` serves a single
//! import; `force_rebuild` backs administrative tooling.

use super::{FindResult, Finder, ImportMachinery, Located};
use crate::artifact::BuildArtifact;
use crate::build::{BuildStatus, CompilerDriver, Fingerprint, RebuildCoordinator};
use crate::config::{RedirectConfig, RedirectSettings};
use crate::error::RedirectError;
use crate::module_map::{ModuleKind, ModuleMap, ModuleNode};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

struct RedirectorInner {
    package: String,
    map: ModuleMap,
    coordinator: RebuildCoordinator,
}

impl RedirectorInner {
    fn resolve(&self, module: &str) -> Result<Option<Located>, RedirectError> {
        let Some(node) = self.map.resolve(module) else {
            debug!(module, package = %self.package, "declining undeclared module");
            return Ok(None);
        };

        let located = match node.kind() {
            ModuleKind::Package => Located {
                module: node.name().to_string(),
                kind: node.kind(),
                path: node.source_path().to_path_buf(),
                children: node.children().to_vec(),
                search_locations: node.search_locations().to_vec(),
            },
            // Pure modules come straight from the source tree; no rebuild.
            ModuleKind::PureModule => Located {
                module: node.name().to_string(),
                kind: node.kind(),
                path: node.source_path().to_path_buf(),
                children: Vec::new(),
                search_locations: Vec::new(),
            },
            ModuleKind::NativeModule => {
                let artifact = self.coordinator.trigger(node)?;
                Located {
                    module: node.name().to_string(),
                    kind: node.kind(),
                    path: artifact.path,
                    children: Vec::new(),
                    search_locations: Vec::new(),
                }
            }
        };
        Ok(Some(located))
    }
}

/// The finder registered by [`Redirector::install`].
pub struct RedirectingFinder {
    inner: Arc<RedirectorInner>,
}

impl Finder for RedirectingFinder {
    fn name(&self) -> &str {
        "editable-redirect"
    }

    fn find(&self, module: &str) -> Result<FindResult, RedirectError> {
        Ok(match self.inner.resolve(module)? {
            Some(located) => FindResult::Located(located),
            None => FindResult::Decline,
        })
    }
}

/// Per-node line of the status report.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub module: String,
    pub kind: ModuleKind,
    /// Build lifecycle state; `None` for packages and pure modules.
    pub state: Option<BuildStatus>,
    pub artifact: Option<BuildArtifact>,
    pub fingerprint: Option<String>,
}

/// Editable-install redirection context for one package.
pub struct Redirector {
    inner: Arc<RedirectorInner>,
    finder: Arc<RedirectingFinder>,
}

impl Redirector {
    pub fn new(
        map: ModuleMap,
        settings: RedirectSettings,
        driver: Arc<dyn CompilerDriver>,
    ) -> Result<Self, RedirectError> {
        let package = settings.package.clone();
        let coordinator = RebuildCoordinator::new(&map, settings, driver)?;
        let inner = Arc::new(RedirectorInner {
            package,
            map,
            coordinator,
        });
        let finder = Arc::new(RedirectingFinder {
            inner: inner.clone(),
        });
        Ok(Self { inner, finder })
    }

    /// Builds the module map from a parsed layout document and wires it to
    /// the given driver.
    pub fn from_config(
        config: &RedirectConfig,
        project_root: &Path,
        driver: Arc<dyn CompilerDriver>,
    ) -> Result<Self, RedirectError> {
        let settings = config.settings(project_root);
        let map = ModuleMap::from_declarations(
            &config.modules,
            &settings.project_root,
            &settings.source_root,
            &settings.build_dir,
        )?;
        Self::new(map, settings, driver)
    }

    /// Registers this redirector's finder ahead of standard resolution.
    pub fn install(&self, machinery: &ImportMachinery) {
        machinery.register_front(self.finder.clone());
        info!(
            package = %self.inner.package,
            modules = self.inner.map.len(),
            "editable redirect installed"
        );
    }

    /// Removes this redirector's finder. Returns false if it was not
    /// installed in the given machinery.
    pub fn uninstall(&self, machinery: &ImportMachinery) -> bool {
        let finder: Arc<dyn Finder> = self.finder.clone();
        let removed = machinery.unregister(&finder);
        if removed {
            info!(package = %self.inner.package, "editable redirect uninstalled");
        }
        removed
    }

    /// Serves one import: `Ok(None)` declines names outside the declared
    /// layout, native modules are rebuilt as needed.
    pub fn resolve(&self, module: &str) -> Result<Option<Located>, RedirectError> {
        self.inner.resolve(module)
    }

    /// Rebuilds a native module regardless of staleness. `Ok(None)` means
    /// the name is not a declared native module.
    pub fn force_rebuild(&self, module: &str) -> Result<Option<BuildArtifact>, RedirectError> {
        let Some(node) = self.native_node(module) else {
            return Ok(None);
        };
        self.inner.coordinator.force_rebuild(node).map(Some)
    }

    /// Whether a native module's inputs changed since its last build.
    /// `Ok(None)` for names that are not declared native modules.
    pub fn needs_rebuild(&self, module: &str) -> Result<Option<bool>, RedirectError> {
        let Some(node) = self.native_node(module) else {
            return Ok(None);
        };
        self.inner.coordinator.needs_rebuild(node).map(Some)
    }

    /// Current fingerprint of a declared native module's inputs.
    pub fn fingerprint(&self, module: &str) -> Result<Option<Fingerprint>, RedirectError> {
        let Some(node) = self.native_node(module) else {
            return Ok(None);
        };
        self.inner.coordinator.fingerprint(node).map(Some)
    }

    /// Snapshot of the artifact currently bound to a native module.
    pub fn artifact(&self, module: &str) -> Option<BuildArtifact> {
        self.inner.coordinator.table().artifact(module)
    }

    /// Per-node report over the whole declared layout, in declaration
    /// order.
    pub fn status(&self) -> Result<Vec<NodeReport>, RedirectError> {
        let mut reports = Vec::with_capacity(self.inner.map.len());
        for node in self.inner.map.nodes() {
            let (state, artifact, fingerprint) = if node.is_native() {
                let state = self.inner.coordinator.status(node)?;
                let artifact = self.inner.coordinator.table().artifact(node.name());
                let fingerprint = self
                    .inner
                    .coordinator
                    .fingerprint(node)
                    .map(|fp| fp.hex().to_string())
                    .ok();
                (Some(state), artifact, fingerprint)
            } else {
                (None, None, None)
            };
            reports.push(NodeReport {
                module: node.name().to_string(),
                kind: node.kind(),
                state,
                artifact,
                fingerprint,
            });
        }
        Ok(reports)
    }

    pub fn module_map(&self) -> &ModuleMap {
        &self.inner.map
    }

    fn native_node(&self, module: &str) -> Option<&ModuleNode> {
        self.inner.map.resolve(module).filter(|n| n.is_native())
    }
}

impl Clone for Redirector {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            finder: self.finder.clone(),
        }
    }
}
