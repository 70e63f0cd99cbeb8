//! Content fingerprinting for files and file sets
//!
//! Uses streaming SHA-256 so large files never have to be held in memory.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size for streaming hashes
const CHUNK_SIZE: usize = 8192;

/// A content digest, stored as lowercase hex.
///
/// File and directory fingerprints are SHA-256. Hub targets carry the hub's own
/// revision id in the same type, so no length is enforced here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(hex: impl Into<String>) -> Self {
        Fingerprint(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display
    pub fn short(&self) -> &str {
        let end = self.0.len().min(16);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Fingerprint(value)
    }
}

fn finish(hasher: Sha256) -> Fingerprint {
    Fingerprint(hex::encode(hasher.finalize()))
}

fn stream_into(hasher: &mut Sha256, reader: &mut impl Read) -> io::Result<u64> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok(total)
}

/// Hash a byte stream using SHA-256
pub fn fingerprint_file(mut reader: impl Read) -> io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    stream_into(&mut hasher, &mut reader)?;
    Ok(finish(hasher))
}

/// Hash a file on disk
pub fn fingerprint_path(path: &Path) -> io::Result<Fingerprint> {
    let file = std::fs::File::open(path)?;
    fingerprint_file(file)
}

/// Hash an in-memory buffer
pub fn fingerprint_bytes(content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content);
    finish(hasher)
}

/// Hash a set of files.
///
/// Entries are sorted by path (UTF-8 byte order) before hashing, then each path's
/// bytes are followed by its content. The result does not depend on the order the
/// caller enumerated the files in.
pub fn fingerprint_set<P, R, I>(entries: I) -> io::Result<Fingerprint>
where
    P: AsRef<str>,
    R: Read,
    I: IntoIterator<Item = (P, R)>,
{
    let mut entries: Vec<(P, R)> = entries.into_iter().collect();
    entries.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

    let mut hasher = Sha256::new();
    for (path, mut reader) in entries {
        hasher.update(path.as_ref().as_bytes());
        stream_into(&mut hasher, &mut reader)?;
    }

    Ok(finish(hasher))
}
