//! Source fingerprints for staleness detection

use ignore::WalkBuilder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::warn;

/// Digest over a node's build inputs and options. Two equal fingerprints
/// mean a rebuild would be a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes the declared sources (content, not mtime) plus the build options.
/// Directory sources are expanded recursively; a missing file propagates as
/// an I/O error rather than silently weakening the fingerprint.
pub fn compute(sources: &[PathBuf], options: &[String]) -> io::Result<Fingerprint> {
    let mut hasher = Sha256::new();

    for option in options {
        hasher.update(option.as_bytes());
        hasher.update([0u8]);
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for source in sources {
        if source.is_dir() {
            for entry in WalkBuilder::new(source).build() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(error = %err, "failed to read directory entry while fingerprinting");
                        continue;
                    }
                };
                if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(source.clone());
        }
    }
    files.sort();
    files.dedup();

    for file in &files {
        let contents = fs::read(file)?;
        hasher.update(file.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }

    Ok(Fingerprint(hex::encode(hasher.finalize())))
}
