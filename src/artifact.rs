//! ABI-tagged artifact location
//!
//! After a build, a native module may have several plausible binaries in
//! its output directory: one tagged with the host's exact ABI, one with the
//! stable forward-compatible tag, one untagged. The locator picks among
//! them by fixed priority and refuses to guess when the outcome is not
//! unique.

use crate::config::ConfigError;
use crate::error::RedirectError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Shape of a plausible ABI tag segment, e.g. `cpython-312-x86_64-linux-gnu`.
const TAG_PATTERN: &str = r"^[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)*$";

/// Compatibility scope of a located binary, ordered most specific first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiTag {
    /// Exact host tag.
    Specific(String),
    /// Stable forward-compatible tag.
    Stable(String),
    /// Bare `stem.suffix` filename.
    Untagged,
}

impl AbiTag {
    /// Candidate rank; lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            AbiTag::Specific(_) => 0,
            AbiTag::Stable(_) => 1,
            AbiTag::Untagged => 2,
        }
    }
}

impl fmt::Display for AbiTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiTag::Specific(tag) | AbiTag::Stable(tag) => f.write_str(tag),
            AbiTag::Untagged => f.write_str("untagged"),
        }
    }
}

/// A concrete loadable binary, bound to exactly one module node.
#[derive(Debug, Clone, Serialize)]
pub struct BuildArtifact {
    pub module: String,
    pub path: PathBuf,
    pub tag: AbiTag,
    /// SHA-256 of the file contents at location time.
    pub digest: String,
    pub built_at: DateTime<Utc>,
}

/// Resolves a built node to its authoritative loadable path.
#[derive(Debug)]
pub struct ArtifactLocator {
    host_tag: String,
    stable_tag: String,
    suffixes: Vec<String>,
    tag_re: Regex,
}

impl ArtifactLocator {
    pub fn new(
        host_tag: impl Into<String>,
        stable_tag: impl Into<String>,
        suffixes: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let host_tag = host_tag.into();
        let stable_tag = stable_tag.into();
        let tag_re = Regex::new(TAG_PATTERN)
            .map_err(|err| ConfigError::InvalidAbiTag(err.to_string()))?;
        if !tag_re.is_match(&host_tag) {
            return Err(ConfigError::InvalidAbiTag(host_tag));
        }
        if !tag_re.is_match(&stable_tag) {
            return Err(ConfigError::InvalidAbiTag(stable_tag));
        }
        for suffix in &suffixes {
            if !suffix.starts_with('.') {
                return Err(ConfigError::InvalidSuffix(suffix.clone()));
            }
        }
        Ok(Self {
            host_tag,
            stable_tag,
            suffixes,
            tag_re,
        })
    }

    /// Scans `output_dir` for binaries named after `stem` and returns the
    /// single best candidate. Zero candidates or an equal-priority tie is
    /// fatal.
    pub fn locate(
        &self,
        module: &str,
        stem: &str,
        output_dir: &Path,
    ) -> Result<BuildArtifact, RedirectError> {
        let entries = match fs::read_dir(output_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RedirectError::MissingArtifact {
                    module: module.to_string(),
                    search_dir: output_dir.to_path_buf(),
                });
            }
            Err(err) => return Err(RedirectError::Io(err)),
        };

        let mut candidates: Vec<(AbiTag, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some(tag) = self.classify(stem, &name) {
                candidates.push((tag, entry.path()));
            }
        }

        let Some(best) = candidates.iter().map(|(tag, _)| tag.priority()).min() else {
            return Err(RedirectError::MissingArtifact {
                module: module.to_string(),
                search_dir: output_dir.to_path_buf(),
            });
        };

        let mut winners: Vec<(AbiTag, PathBuf)> = candidates
            .into_iter()
            .filter(|(tag, _)| tag.priority() == best)
            .collect();
        winners.sort_by(|a, b| a.1.cmp(&b.1));

        if winners.len() > 1 {
            return Err(RedirectError::AmbiguousArtifact {
                module: module.to_string(),
                candidates: winners.into_iter().map(|(_, path)| path).collect(),
            });
        }

        let Some((tag, path)) = winners.pop() else {
            return Err(RedirectError::MissingArtifact {
                module: module.to_string(),
                search_dir: output_dir.to_path_buf(),
            });
        };

        let contents = fs::read(&path)?;
        let digest = hex::encode(Sha256::digest(&contents));
        debug!(module, path = %path.display(), tag = %tag, "artifact located");

        Ok(BuildArtifact {
            module: module.to_string(),
            path,
            tag,
            digest,
            built_at: Utc::now(),
        })
    }

    /// Classifies a directory entry against the module stem. Returns `None`
    /// for unrelated files and for binaries carrying a foreign specific tag.
    fn classify(&self, stem: &str, name: &str) -> Option<AbiTag> {
        for suffix in &self.suffixes {
            let Some(rest) = name.strip_suffix(suffix.as_str()) else {
                continue;
            };
            if rest == stem {
                return Some(AbiTag::Untagged);
            }
            let Some(tag) = rest.strip_prefix(stem).and_then(|r| r.strip_prefix('.')) else {
                continue;
            };
            if tag == self.host_tag {
                return Some(AbiTag::Specific(tag.to_string()));
            }
            if tag == self.stable_tag {
                return Some(AbiTag::Stable(tag.to_string()));
            }
            if self.tag_re.is_match(tag) {
                debug!(file = name, tag, "skipping foreign ABI tag");
            }
            return None;
        }
        None
    }
}
