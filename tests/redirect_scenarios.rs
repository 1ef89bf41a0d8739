//! End-to-end redirect scenarios over a nested mixed pure/native layout
//!
//! Covers the import-hook contract: pure modules resolve without building,
//! native modules build once and cache, undeclared names decline without
//! side effects, and locator/build failures surface instead of being
//! papered over.

mod support;

use editable_redirect::hook::{FindResult, Finder, ImportMachinery, Located};
use editable_redirect::{BuildStatus, ModuleKind, RedirectError};
use serial_test::serial;
use std::path::PathBuf;
use std::sync::Arc;
use support::{Fixture, HOST_TAG};

#[test]
fn test_pure_module_resolves_without_building() {
    let fixture = Fixture::new();

    let located = fixture.redirector.resolve("pkg.helper").unwrap().unwrap();
    assert_eq!(located.kind, ModuleKind::PureModule);
    assert_eq!(located.path, fixture.source_root.join("pkg/helper.py"));
    assert_eq!(fixture.driver.invocations(), 0);
}

#[test]
fn test_native_module_builds_once_then_caches() {
    let fixture = Fixture::new();

    let first = fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert_eq!(first.kind, ModuleKind::NativeModule);
    assert_eq!(
        first.path,
        fixture.build_dir.join(format!("pkg/native.{HOST_TAG}.so"))
    );
    assert_eq!(fixture.driver.invocations(), 1);

    let second = fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert_eq!(second.path, first.path);
    assert_eq!(fixture.driver.invocations(), 1, "unchanged sources must not rebuild");
}

#[test]
fn test_undeclared_name_declines_without_building() {
    let fixture = Fixture::new();

    assert!(fixture.redirector.resolve("pkg.missing").unwrap().is_none());
    assert!(fixture.redirector.resolve("other_pkg").unwrap().is_none());
    assert!(fixture
        .redirector
        .resolve("pkg.helper.nested")
        .unwrap()
        .is_none());
    assert_eq!(fixture.driver.invocations(), 0);
}

#[test]
fn test_depth_three_native_resolves() {
    let fixture = Fixture::new();

    let located = fixture
        .redirector
        .resolve("pkg.sub.subsub.native2")
        .unwrap()
        .unwrap();
    assert_eq!(
        located.path,
        fixture
            .build_dir
            .join(format!("pkg/sub/subsub/native2.{HOST_TAG}.so"))
    );
    assert_eq!(fixture.driver.invocations_for("pkg.sub.subsub.native2"), 1);
}

#[test]
fn test_package_exposes_children_and_search_locations() {
    let fixture = Fixture::new();

    let pkg = fixture.redirector.resolve("pkg").unwrap().unwrap();
    assert_eq!(pkg.kind, ModuleKind::Package);
    assert_eq!(pkg.children, vec!["helper", "native", "sub"]);
    assert_eq!(
        pkg.search_locations,
        vec![
            fixture.source_root.join("pkg"),
            fixture.build_dir.join("pkg"),
        ]
    );

    // Nested packages expose their own children, so deeper imports keep
    // working.
    let subsub = fixture.redirector.resolve("pkg.sub.subsub").unwrap().unwrap();
    assert_eq!(subsub.children, vec!["native2"]);
    assert_eq!(fixture.driver.invocations(), 0);
}

#[test]
fn test_source_change_triggers_exactly_one_rebuild() {
    let fixture = Fixture::new();

    fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert_eq!(fixture.driver.invocations(), 1);

    fixture.edit_source("src/native.c", "int native(void) { return 42; }\n");
    assert_eq!(
        fixture.redirector.needs_rebuild("pkg.native").unwrap(),
        Some(true)
    );

    fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert_eq!(fixture.driver.invocations(), 2);

    fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert_eq!(fixture.driver.invocations(), 2);
}

#[test]
fn test_fingerprint_change_is_isolated_to_edited_node() {
    let fixture = Fixture::new();

    let native_before = fixture.redirector.fingerprint("pkg.native").unwrap().unwrap();
    let native2_before = fixture
        .redirector
        .fingerprint("pkg.sub.subsub.native2")
        .unwrap()
        .unwrap();

    fixture.edit_source("src/native.c", "int native(void) { return 3; }\n");

    let native_after = fixture.redirector.fingerprint("pkg.native").unwrap().unwrap();
    let native2_after = fixture
        .redirector
        .fingerprint("pkg.sub.subsub.native2")
        .unwrap()
        .unwrap();

    assert_ne!(native_before, native_after);
    assert_eq!(native2_before, native2_after);
}

#[test]
fn test_build_failure_propagates_with_diagnostics() {
    let fixture = Fixture::new();
    fixture.driver.set_failing("pkg.native", true);

    let err = fixture.redirector.resolve("pkg.native").unwrap_err();
    match &err {
        RedirectError::BuildFailure { module, diagnostics } => {
            assert_eq!(module, "pkg.native");
            assert!(diagnostics.stderr.contains("scripted failure"));
        }
        other => panic!("expected BuildFailure, got {other:?}"),
    }
}

#[test]
fn test_broken_node_does_not_poison_siblings() {
    let fixture = Fixture::new();
    fixture.driver.set_failing("pkg.native", true);

    assert!(fixture.redirector.resolve("pkg.native").is_err());

    // Sibling sub-packages sharing the build directory stay resolvable.
    let located = fixture
        .redirector
        .resolve("pkg.sub.subsub.native2")
        .unwrap()
        .unwrap();
    assert!(located.path.ends_with(format!("native2.{HOST_TAG}.so")));
    assert!(fixture.redirector.resolve("pkg.helper").unwrap().is_some());
}

#[test]
fn test_broken_is_terminal_until_source_change() {
    let fixture = Fixture::new();
    fixture.driver.set_failing("pkg.native", true);

    assert!(fixture.redirector.resolve("pkg.native").is_err());
    assert_eq!(fixture.driver.invocations_for("pkg.native"), 1);

    // Same fingerprint: the stored failure is reported, no new build.
    assert!(fixture.redirector.resolve("pkg.native").is_err());
    assert_eq!(fixture.driver.invocations_for("pkg.native"), 1);

    // A source change clears the way for a rebuild.
    fixture.driver.set_failing("pkg.native", false);
    fixture.edit_source("src/native.c", "int native(void) { return 7; }\n");
    let located = fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert!(located.path.ends_with(format!("native.{HOST_TAG}.so")));
    assert_eq!(fixture.driver.invocations_for("pkg.native"), 2);
}

#[test]
fn test_force_rebuild_bypasses_fingerprint() {
    let fixture = Fixture::new();

    fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert_eq!(fixture.driver.invocations_for("pkg.native"), 1);

    let artifact = fixture
        .redirector
        .force_rebuild("pkg.native")
        .unwrap()
        .unwrap();
    assert_eq!(fixture.driver.invocations_for("pkg.native"), 2);
    assert!(artifact.path.ends_with(format!("native.{HOST_TAG}.so")));

    // Forcing a non-native name is a no-op answer, not an error.
    assert!(fixture.redirector.force_rebuild("pkg.helper").unwrap().is_none());
    assert!(fixture.redirector.force_rebuild("pkg.missing").unwrap().is_none());
}

#[test]
fn test_force_rebuild_recovers_broken_node() {
    let fixture = Fixture::new();
    fixture.driver.set_failing("pkg.native", true);

    assert!(fixture.redirector.resolve("pkg.native").is_err());

    fixture.driver.set_failing("pkg.native", false);
    // No source change: only a forced rebuild may leave Broken.
    assert!(fixture.redirector.resolve("pkg.native").is_err());
    let artifact = fixture.redirector.force_rebuild("pkg.native").unwrap();
    assert!(artifact.is_some());
    assert!(fixture.redirector.resolve("pkg.native").is_ok());
}

#[test]
fn test_locator_prefers_specific_tag_over_generic() {
    let fixture = Fixture::new();
    fixture.driver.add_artifact("pkg.native", "pkg/native.so");

    let located = fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert!(
        located.path.ends_with(format!("native.{HOST_TAG}.so")),
        "expected the host-tagged candidate, got {}",
        located.path.display()
    );
}

#[test]
fn test_missing_artifact_after_build_is_fatal() {
    let fixture = Fixture::new();
    fixture.driver.clear_artifacts("pkg.native");

    let err = fixture.redirector.resolve("pkg.native").unwrap_err();
    assert!(matches!(err, RedirectError::MissingArtifact { .. }));
}

#[test]
fn test_ambiguous_artifact_is_fatal() {
    let fixture = Fixture::with_build_section("suffixes = [\".so\", \".dylib\"]");
    fixture.driver.clear_artifacts("pkg.native");
    fixture.driver.add_artifact("pkg.native", "pkg/native.so");
    fixture.driver.add_artifact("pkg.native", "pkg/native.dylib");

    let err = fixture.redirector.resolve("pkg.native").unwrap_err();
    match err {
        RedirectError::AmbiguousArtifact { candidates, .. } => assert_eq!(candidates.len(), 2),
        other => panic!("expected AmbiguousArtifact, got {other:?}"),
    }
}

#[test]
fn test_status_tracks_lifecycle() {
    let fixture = Fixture::new();

    let state_of = |reports: &[editable_redirect::NodeReport], module: &str| {
        reports
            .iter()
            .find(|r| r.module == module)
            .and_then(|r| r.state)
    };

    let reports = fixture.redirector.status().unwrap();
    assert_eq!(state_of(&reports, "pkg.native"), Some(BuildStatus::Unbuilt));
    assert_eq!(state_of(&reports, "pkg"), None);

    fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    let reports = fixture.redirector.status().unwrap();
    assert_eq!(state_of(&reports, "pkg.native"), Some(BuildStatus::Fresh));
    assert_eq!(
        state_of(&reports, "pkg.sub.subsub.native2"),
        Some(BuildStatus::Unbuilt)
    );

    fixture.edit_source("src/native.c", "int native(void) { return 9; }\n");
    let reports = fixture.redirector.status().unwrap();
    assert_eq!(state_of(&reports, "pkg.native"), Some(BuildStatus::Stale));

    fixture.driver.set_failing("pkg.native", true);
    assert!(fixture.redirector.resolve("pkg.native").is_err());
    let reports = fixture.redirector.status().unwrap();
    assert_eq!(state_of(&reports, "pkg.native"), Some(BuildStatus::Broken));
}

struct StubFinder {
    known: &'static str,
}

impl Finder for StubFinder {
    fn name(&self) -> &str {
        "stub"
    }

    fn find(&self, module: &str) -> Result<FindResult, RedirectError> {
        if module == self.known {
            Ok(FindResult::Located(Located {
                module: module.to_string(),
                kind: ModuleKind::PureModule,
                path: PathBuf::from("/site-packages/numpy/__init__.py"),
                children: Vec::new(),
                search_locations: Vec::new(),
            }))
        } else {
            Ok(FindResult::Decline)
        }
    }
}

#[test]
fn test_hook_never_masks_standard_resolution() {
    let fixture = Fixture::new();
    let machinery = ImportMachinery::new();
    machinery.register(Arc::new(StubFinder { known: "numpy" }));
    fixture.redirector.install(&machinery);

    // Declared names are served by the redirecting finder, which sits in
    // front.
    let helper = machinery.resolve("pkg.helper").unwrap().unwrap();
    assert_eq!(helper.path, fixture.source_root.join("pkg/helper.py"));

    // Undeclared names fall through to the rest of the stack.
    let numpy = machinery.resolve("numpy").unwrap().unwrap();
    assert_eq!(numpy.path, PathBuf::from("/site-packages/numpy/__init__.py"));

    // Entirely unknown names are nobody's.
    assert!(machinery.resolve("nonexistent").unwrap().is_none());
}

#[test]
fn test_uninstall_stops_redirection() {
    let fixture = Fixture::new();
    let machinery = ImportMachinery::new();
    fixture.redirector.install(&machinery);
    assert!(machinery.resolve("pkg.helper").unwrap().is_some());

    assert!(fixture.redirector.uninstall(&machinery));
    assert!(machinery.resolve("pkg.helper").unwrap().is_none());
    assert!(!fixture.redirector.uninstall(&machinery));
}

#[test]
fn test_two_redirectors_coexist() {
    let fixture_a = Fixture::new();
    let fixture_b = Fixture::new();
    let machinery = ImportMachinery::new();
    fixture_a.redirector.install(&machinery);
    fixture_b.redirector.install(&machinery);

    // The front instance wins for shared names; removing it reveals the
    // other.
    let located = machinery.resolve("pkg.helper").unwrap().unwrap();
    assert_eq!(located.path, fixture_b.source_root.join("pkg/helper.py"));

    fixture_b.redirector.uninstall(&machinery);
    let located = machinery.resolve("pkg.helper").unwrap().unwrap();
    assert_eq!(located.path, fixture_a.source_root.join("pkg/helper.py"));
}

#[test]
fn test_rebuild_disabled_locates_existing_artifact() {
    let fixture = Fixture::with_build_section("rebuild = false");

    // Nothing built yet: zero candidates is fatal, not silently resolved.
    assert!(matches!(
        fixture.redirector.resolve("pkg.native").unwrap_err(),
        RedirectError::MissingArtifact { .. }
    ));

    let rel = format!("pkg/native.{HOST_TAG}.so");
    std::fs::create_dir_all(fixture.build_dir.join("pkg")).unwrap();
    std::fs::write(fixture.build_dir.join(&rel), "prebuilt").unwrap();

    let located = fixture.redirector.resolve("pkg.native").unwrap().unwrap();
    assert_eq!(located.path, fixture.build_dir.join(&rel));
    assert_eq!(fixture.driver.invocations(), 0);
}

#[test]
#[serial]
fn test_skip_marker_prevents_recursive_rebuild() {
    let fixture = Fixture::new();

    let rel = format!("pkg/native.{HOST_TAG}.so");
    std::fs::create_dir_all(fixture.build_dir.join("pkg")).unwrap();
    std::fs::write(fixture.build_dir.join(&rel), "prebuilt").unwrap();

    std::env::set_var(editable_redirect::config::SKIP_ENV, &fixture.build_dir);
    let result = fixture.redirector.resolve("pkg.native");
    std::env::remove_var(editable_redirect::config::SKIP_ENV);

    let located = result.unwrap().unwrap();
    assert_eq!(located.path, fixture.build_dir.join(&rel));
    assert_eq!(fixture.driver.invocations(), 0);
}
