//! Shared fixtures for the redirect integration tests
#![allow(dead_code)]

use editable_redirect::build::{BuildDiagnostics, BuildRequest, CompilerDriver, DriverFailure};
use editable_redirect::{RedirectConfig, Redirector};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const HOST_TAG: &str = "cpython-312-x86_64-linux-gnu";

/// Stand-in compiler driver: counts invocations and writes whatever
/// artifact files the test scripted for the requested module.
pub struct ScriptedDriver {
    invocations: AtomicUsize,
    per_module: Mutex<HashMap<String, usize>>,
    artifacts: Mutex<HashMap<String, Vec<PathBuf>>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            per_module: Mutex::new(HashMap::new()),
            artifacts: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
        }
    }

    /// Scripts an artifact file (relative to the build dir) produced by
    /// every successful build of `module`.
    pub fn add_artifact(&self, module: &str, rel: &str) {
        self.artifacts
            .lock()
            .unwrap()
            .entry(module.to_string())
            .or_default()
            .push(PathBuf::from(rel));
    }

    pub fn clear_artifacts(&self, module: &str) {
        self.artifacts.lock().unwrap().remove(module);
    }

    pub fn set_failing(&self, module: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(module.to_string());
        } else {
            set.remove(module);
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn invocations_for(&self, module: &str) -> usize {
        self.per_module
            .lock()
            .unwrap()
            .get(module)
            .copied()
            .unwrap_or(0)
    }
}

impl CompilerDriver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn build(&self, request: &BuildRequest) -> Result<BuildDiagnostics, DriverFailure> {
        if let Some(delay) = *self.delay.lock().unwrap() {
            std::thread::sleep(delay);
        }

        let count = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .per_module
            .lock()
            .unwrap()
            .entry(request.module.clone())
            .or_insert(0) += 1;

        if self.failing.lock().unwrap().contains(&request.module) {
            return Err(DriverFailure {
                diagnostics: BuildDiagnostics {
                    status: Some(1),
                    stdout: String::new(),
                    stderr: format!("scripted failure for {}", request.module),
                },
            });
        }

        let scripted = self
            .artifacts
            .lock()
            .unwrap()
            .get(&request.module)
            .cloned()
            .unwrap_or_default();
        for rel in scripted {
            let path = request.build_dir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, format!("{} build {}", request.module, count)).unwrap();
        }

        Ok(BuildDiagnostics {
            status: Some(0),
            stdout: format!("built {}", request.module),
            stderr: String::new(),
        })
    }
}

/// A temp project with a nested mixed pure/native layout:
///
/// ```text
/// python/pkg/            package
/// python/pkg/helper.py   pure module
/// src/native.c           -> pkg.native
/// python/pkg/sub/        sub-package
/// python/pkg/sub/subsub/ sub-sub-package
/// src/native2.c          -> pkg.sub.subsub.native2
/// build/                 out-of-tree build dir
/// ```
pub struct Fixture {
    pub dir: TempDir,
    pub driver: Arc<ScriptedDriver>,
    pub redirector: Redirector,
    pub project_root: PathBuf,
    pub source_root: PathBuf,
    pub build_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_build_section("")
    }

    /// `extra` is spliced into the `[build]` section of the layout.
    pub fn with_build_section(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let project_root = dir.path().to_path_buf();
        let source_root = project_root.join("python");
        let build_dir = project_root.join("build");

        fs::create_dir_all(source_root.join("pkg/sub/subsub")).unwrap();
        fs::create_dir_all(project_root.join("src")).unwrap();
        fs::create_dir_all(&build_dir).unwrap();
        fs::write(source_root.join("pkg/helper.py"), "VALUE = 1\n").unwrap();
        fs::write(
            project_root.join("src/native.c"),
            "int native(void) { return 1; }\n",
        )
        .unwrap();
        fs::write(
            project_root.join("src/native2.c"),
            "int native2(void) { return 2; }\n",
        )
        .unwrap();

        let layout = format!(
            r#"
[package]
name = "pkg"
source-root = "python"

[build]
build-dir = "build"
command = ["true"]
host-tag = "{HOST_TAG}"
{extra}

[[module]]
name = "pkg"
kind = "package"
path = "pkg"

[[module]]
name = "pkg.helper"
kind = "pure"
path = "pkg/helper.py"

[[module]]
name = "pkg.native"
kind = "native"
sources = ["src/native.c"]

[[module]]
name = "pkg.sub"
kind = "package"
path = "pkg/sub"

[[module]]
name = "pkg.sub.subsub"
kind = "package"
path = "pkg/sub/subsub"

[[module]]
name = "pkg.sub.subsub.native2"
kind = "native"
sources = ["src/native2.c"]
"#
        );

        let config = RedirectConfig::from_toml_str(&layout).unwrap();

        let driver = Arc::new(ScriptedDriver::new());
        driver.add_artifact("pkg.native", &format!("pkg/native.{HOST_TAG}.so"));
        driver.add_artifact(
            "pkg.sub.subsub.native2",
            &format!("pkg/sub/subsub/native2.{HOST_TAG}.so"),
        );

        let dyn_driver: Arc<dyn CompilerDriver> = driver.clone();
        let redirector = Redirector::from_config(&config, &project_root, dyn_driver).unwrap();

        Self {
            dir,
            driver,
            redirector,
            project_root,
            source_root,
            build_dir,
        }
    }

    pub fn edit_source(&self, rel: &str, content: &str) {
        fs::write(self.project_root.join(rel), content).unwrap();
    }
}
