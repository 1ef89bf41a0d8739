//! Rebuild trigger: staleness detection and synchronized build invocation
//!
//! `fingerprint` and `needs_rebuild` decide whether a node is stale;
//! `trigger` hands the node to the external compiler driver and caches the
//! located artifact. Re-triggering with an unchanged fingerprint is a
//! no-op.

pub mod coordinator;
pub mod driver;
pub mod fingerprint;

pub use coordinator::{BuildStatus, RebuildCoordinator, RedirectionTable};
pub use driver::{BuildDiagnostics, BuildRequest, CompilerDriver, DriverFailure, ProcessDriver};
pub use fingerprint::Fingerprint;
