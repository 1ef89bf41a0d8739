//! Logical module tree built from the declared project layout
//!
//! The map is constructed once, at hook-install time, from a flat list of
//! declared modules (dotted name + kind + paths). Construction validates the
//! tree shape: every non-root name must have a declared parent package.
//! After that the map is read-only; resolution walks the tree segment by
//! segment to unbounded depth.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// What a declared dotted name stands for.
///
/// Sub-packages are `Package` nodes at depth > 0; there is no separate kind
/// for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Package,
    #[serde(rename = "pure")]
    PureModule,
    #[serde(rename = "native")]
    NativeModule,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Package => write!(f, "package"),
            ModuleKind::PureModule => write!(f, "pure module"),
            ModuleKind::NativeModule => write!(f, "native module"),
        }
    }
}

/// One `[[module]]` entry of the layout document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ModuleDecl {
    /// Full dotted name, e.g. `pkg.sub.native`.
    pub name: String,

    pub kind: ModuleKind,

    /// Source location relative to the source root: a directory for
    /// packages, a file for pure modules. Unused for native modules.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Build inputs for a native module, relative to the project root.
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Where the compiled artifact lands, relative to the build directory.
    /// Defaults to the parent package's path.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Artifact filename stem. Defaults to the last name segment.
    #[serde(default)]
    pub stem: Option<String>,

    /// Extra driver options for this module, appended to the global ones.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("module name '{0}' is not a valid dotted identifier")]
    InvalidName(String),

    #[error("module '{0}' is declared more than once")]
    DuplicateModule(String),

    #[error("module '{module}' has no declared parent package '{parent}'")]
    MissingParent { module: String, parent: String },

    #[error("parent '{parent}' of module '{module}' is not a package")]
    ParentNotPackage { module: String, parent: String },

    #[error("{kind} '{module}' must declare a source path")]
    MissingPath { module: String, kind: ModuleKind },

    #[error("native module '{0}' must declare at least one source file")]
    MissingSources(String),
}

/// A node of the module tree. Paths are absolute after construction.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    name: String,
    kind: ModuleKind,
    /// Leaf names of direct children, in declaration order.
    children: Vec<String>,
    /// Directory for packages, file for pure modules. Empty for natives,
    /// whose authoritative path comes from the artifact locator.
    source_path: PathBuf,
    /// Declared build inputs (native only).
    sources: Vec<PathBuf>,
    /// Where the built artifact lands (native only).
    output_dir: Option<PathBuf>,
    stem: Option<String>,
    options: Vec<String>,
    /// Directories contributing to a package: source tree first, build
    /// tree second.
    search_locations: Vec<PathBuf>,
    /// Source location relative to the source root, kept for child
    /// output-dir defaults.
    rel_path: Option<PathBuf>,
}

impl ModuleNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Last segment of the dotted name.
    pub fn leaf(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Leaf names of direct children, in declaration order.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn artifact_stem(&self) -> &str {
        self.stem.as_deref().unwrap_or_else(|| self.leaf())
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn search_locations(&self) -> &[PathBuf] {
        &self.search_locations
    }

    pub fn is_native(&self) -> bool {
        self.kind == ModuleKind::NativeModule
    }
}

/// Read-mostly tree of declared modules.
#[derive(Debug)]
pub struct ModuleMap {
    nodes: HashMap<String, ModuleNode>,
    /// Dotted names in declaration order.
    order: Vec<String>,
    /// Names without a dot, i.e. importable entry points.
    roots: Vec<String>,
}

impl ModuleMap {
    /// Builds the tree from declared entries, resolving paths against the
    /// given roots. Fails if the declarations do not form a tree.
    pub fn from_declarations(
        decls: &[ModuleDecl],
        project_root: &Path,
        source_root: &Path,
        build_dir: &Path,
    ) -> Result<Self, LayoutError> {
        let mut nodes: HashMap<String, ModuleNode> = HashMap::new();
        let mut order = Vec::with_capacity(decls.len());

        for decl in decls {
            validate_name(&decl.name)?;
            if nodes.contains_key(&decl.name) {
                return Err(LayoutError::DuplicateModule(decl.name.clone()));
            }

            let node = match decl.kind {
                ModuleKind::Package => {
                    let rel = decl.path.clone().ok_or(LayoutError::MissingPath {
                        module: decl.name.clone(),
                        kind: decl.kind,
                    })?;
                    let source_path = source_root.join(&rel);
                    ModuleNode {
                        name: decl.name.clone(),
                        kind: decl.kind,
                        children: Vec::new(),
                        search_locations: vec![source_path.clone(), build_dir.join(&rel)],
                        source_path,
                        sources: Vec::new(),
                        output_dir: None,
                        stem: None,
                        options: Vec::new(),
                        rel_path: Some(rel),
                    }
                }
                ModuleKind::PureModule => {
                    let rel = decl.path.clone().ok_or(LayoutError::MissingPath {
                        module: decl.name.clone(),
                        kind: decl.kind,
                    })?;
                    ModuleNode {
                        name: decl.name.clone(),
                        kind: decl.kind,
                        children: Vec::new(),
                        source_path: source_root.join(&rel),
                        sources: Vec::new(),
                        output_dir: None,
                        stem: None,
                        options: Vec::new(),
                        search_locations: Vec::new(),
                        rel_path: Some(rel),
                    }
                }
                ModuleKind::NativeModule => {
                    if decl.sources.is_empty() {
                        return Err(LayoutError::MissingSources(decl.name.clone()));
                    }
                    let sources = decl
                        .sources
                        .iter()
                        .map(|s| {
                            if s.is_absolute() {
                                s.clone()
                            } else {
                                project_root.join(s)
                            }
                        })
                        .collect();
                    ModuleNode {
                        name: decl.name.clone(),
                        kind: decl.kind,
                        children: Vec::new(),
                        source_path: PathBuf::new(),
                        sources,
                        // Filled in below once the parent is linked.
                        output_dir: decl.output_dir.as_ref().map(|d| build_dir.join(d)),
                        stem: decl.stem.clone(),
                        options: decl.options.clone(),
                        search_locations: Vec::new(),
                        rel_path: None,
                    }
                }
            };

            order.push(decl.name.clone());
            nodes.insert(decl.name.clone(), node);
        }

        // Link children and validate parentage.
        let mut roots = Vec::new();
        for name in &order {
            match name.rsplit_once('.') {
                None => roots.push(name.clone()),
                Some((parent, leaf)) => {
                    let parent_node =
                        nodes.get(parent).ok_or_else(|| LayoutError::MissingParent {
                            module: name.clone(),
                            parent: parent.to_string(),
                        })?;
                    if parent_node.kind != ModuleKind::Package {
                        return Err(LayoutError::ParentNotPackage {
                            module: name.clone(),
                            parent: parent.to_string(),
                        });
                    }
                    let parent_rel = parent_node.rel_path.clone();
                    if let Some(parent_node) = nodes.get_mut(parent) {
                        parent_node.children.push(leaf.to_string());
                    }
                    // Native artifacts default to the parent package's
                    // directory under the build tree.
                    if let Some(node) = nodes.get_mut(name) {
                        if node.kind == ModuleKind::NativeModule && node.output_dir.is_none() {
                            node.output_dir = Some(match parent_rel {
                                Some(rel) => build_dir.join(rel),
                                None => build_dir.to_path_buf(),
                            });
                        }
                    }
                }
            }
        }

        // Root-level native modules land directly in the build directory.
        for name in &roots {
            if let Some(node) = nodes.get_mut(name) {
                if node.kind == ModuleKind::NativeModule && node.output_dir.is_none() {
                    node.output_dir = Some(build_dir.to_path_buf());
                }
            }
        }

        debug!(
            modules = order.len(),
            roots = roots.len(),
            "module map constructed"
        );

        Ok(Self {
            nodes,
            order,
            roots,
        })
    }

    /// Exact-match resolution of a dotted name, walking the tree segment by
    /// segment. Returns `None` for anything outside the declared layout.
    pub fn resolve(&self, name: &str) -> Option<&ModuleNode> {
        let mut segments = name.split('.');
        let root = segments.next()?;
        if !self.roots.iter().any(|r| r == root) {
            return None;
        }

        let mut current = self.nodes.get(root)?;
        let mut full = root.to_string();
        for segment in segments {
            if current.kind != ModuleKind::Package {
                return None;
            }
            if !current.children.iter().any(|c| c == segment) {
                return None;
            }
            full.push('.');
            full.push_str(segment);
            current = self.nodes.get(&full)?;
        }
        Some(current)
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &ModuleNode> {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }

    /// Native-module nodes in declaration order.
    pub fn native_modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes().filter(|n| n.is_native())
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn validate_name(name: &str) -> Result<(), LayoutError> {
    if name.is_empty() {
        return Err(LayoutError::InvalidName(name.to_string()));
    }
    for segment in name.split('.') {
        let mut chars = segment.chars();
        let valid_first = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !valid_first || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(LayoutError::InvalidName(name.to_string()));
        }
    }
    Ok(())
}
