//! Import hook: the finder protocol and the host machinery stand-in
//!
//! The host's import machinery is modeled as an explicit [`ImportMachinery`]
//! object holding an ordered finder stack, so several redirector instances
//! can coexist (and be tested) without ambient process state. A finder
//! either locates a module or declines; declining is how a finder says
//! "not mine" without masking ordinary resolution.

mod redirector;

pub use redirector::{NodeReport, Redirector, RedirectingFinder};

use crate::error::RedirectError;
use crate::module_map::ModuleKind;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A successfully located module.
#[derive(Debug, Clone, Serialize)]
pub struct Located {
    pub module: String,
    pub kind: ModuleKind,
    /// Authoritative loadable path: source file for pure modules, built
    /// binary for native ones, source directory for packages.
    pub path: PathBuf,
    /// Leaf names of direct children, in declaration order. Empty for
    /// leaves.
    pub children: Vec<String>,
    /// Directories contributing to a package (source tree, then build
    /// tree), so nested imports keep working.
    pub search_locations: Vec<PathBuf>,
}

/// Outcome of a finder consultation.
#[derive(Debug, Clone)]
pub enum FindResult {
    Located(Located),
    Decline,
}

/// The capability interface the import machinery calls on each registered
/// finder, ahead of standard resolution.
pub trait Finder: Send + Sync {
    fn name(&self) -> &str;

    fn find(&self, module: &str) -> Result<FindResult, RedirectError>;
}

/// Ordered finder stack standing in for the host's import machinery.
pub struct ImportMachinery {
    finders: RwLock<Vec<Arc<dyn Finder>>>,
}

impl ImportMachinery {
    pub fn new() -> Self {
        Self {
            finders: RwLock::new(Vec::new()),
        }
    }

    /// Registers a finder ahead of everything already present.
    pub fn register_front(&self, finder: Arc<dyn Finder>) {
        debug!(finder = finder.name(), "registering finder at front");
        self.write().insert(0, finder);
    }

    /// Registers a finder behind everything already present.
    pub fn register(&self, finder: Arc<dyn Finder>) {
        debug!(finder = finder.name(), "registering finder");
        self.write().push(finder);
    }

    /// Removes the given finder instance. Returns false if it was not
    /// registered.
    pub fn unregister(&self, finder: &Arc<dyn Finder>) -> bool {
        let mut finders = self.write();
        let before = finders.len();
        finders.retain(|f| !Arc::ptr_eq(f, finder));
        before != finders.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Consults finders in order. The first `Located` wins; a finder error
    /// propagates immediately; if everyone declines the name is simply not
    /// ours (`Ok(None)`).
    pub fn resolve(&self, module: &str) -> Result<Option<Located>, RedirectError> {
        // Snapshot so a slow find (a build) doesn't hold the stack lock.
        let snapshot: Vec<Arc<dyn Finder>> = self.read().clone();
        for finder in snapshot {
            match finder.find(module)? {
                FindResult::Located(located) => return Ok(Some(located)),
                FindResult::Decline => continue,
            }
        }
        Ok(None)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Finder>>> {
        self.finders
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn Finder>>> {
        self.finders
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ImportMachinery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFinder {
        name: &'static str,
        answers: Vec<&'static str>,
    }

    impl Finder for FixedFinder {
        fn name(&self) -> &str {
            self.name
        }

        fn find(&self, module: &str) -> Result<FindResult, RedirectError> {
            if self.answers.contains(&module) {
                Ok(FindResult::Located(Located {
                    module: module.to_string(),
                    kind: ModuleKind::PureModule,
                    path: PathBuf::from(format!("/{}/{}.py", self.name, module)),
                    children: Vec::new(),
                    search_locations: Vec::new(),
                }))
            } else {
                Ok(FindResult::Decline)
            }
        }
    }

    #[test]
    fn test_first_located_wins() {
        let machinery = ImportMachinery::new();
        machinery.register(Arc::new(FixedFinder {
            name: "fallback",
            answers: vec!["a", "b"],
        }));
        machinery.register_front(Arc::new(FixedFinder {
            name: "front",
            answers: vec!["a"],
        }));

        let located = machinery.resolve("a").unwrap().unwrap();
        assert_eq!(located.path, PathBuf::from("/front/a.py"));

        let located = machinery.resolve("b").unwrap().unwrap();
        assert_eq!(located.path, PathBuf::from("/fallback/b.py"));
    }

    #[test]
    fn test_all_decline_is_none() {
        let machinery = ImportMachinery::new();
        machinery.register(Arc::new(FixedFinder {
            name: "only",
            answers: vec!["a"],
        }));
        assert!(machinery.resolve("zzz").unwrap().is_none());
    }

    #[test]
    fn test_unregister_removes_instance() {
        let machinery = ImportMachinery::new();
        let finder: Arc<dyn Finder> = Arc::new(FixedFinder {
            name: "only",
            answers: vec!["a"],
        });
        machinery.register(finder.clone());
        assert_eq!(machinery.len(), 1);

        assert!(machinery.unregister(&finder));
        assert!(machinery.is_empty());
        assert!(!machinery.unregister(&finder));
    }
}
