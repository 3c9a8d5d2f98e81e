//! core::hash
//!
//! Content hashing for identity and integrity checks.
//!
//! Files are hashed with SHA-256 in fixed-size chunks so large archives
//! never have to fit in memory. The hash is the only notion of file
//! identity the engine uses: there is no diffing of contents.
//!
//! Looking up a file that does not exist is an expected outcome (it means
//! "no conflict at this path"), so [`probe`] reports it as
//! [`Probe::Absent`] rather than as an error.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::types::ContentHash;

const CHUNK_SIZE: usize = 64 * 1024;

/// Hash and size of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub hash: ContentHash,
    pub size: u64,
}

/// Outcome of looking at a path that may or may not hold a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// A regular file exists at the path.
    Present(FileDigest),
    /// Nothing exists at the path.
    Absent,
}

impl Probe {
    /// The digest, if a file was present.
    pub fn digest(&self) -> Option<&FileDigest> {
        match self {
            Probe::Present(digest) => Some(digest),
            Probe::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Probe::Present(_))
    }
}

/// Hash a file's full contents and count its bytes.
///
/// # Errors
///
/// Any I/O error, including `NotFound`. Use [`probe`] when absence is expected.
pub fn hash_file(path: &Path) -> io::Result<FileDigest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(FileDigest {
        hash: ContentHash::from_digest(&hasher.finalize()),
        size,
    })
}

/// Hash a file if it exists.
///
/// A missing file yields `Ok(Probe::Absent)`. A directory at the path is an
/// error, since a managed path must name a file.
pub fn probe(path: &Path) -> io::Result<Probe> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(io::Error::new(
            io::ErrorKind::Other,
            format!("expected a file but found a directory: {}", path.display()),
        )),
        Ok(_) => hash_file(path).map(Probe::Present),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Probe::Absent),
        Err(e) => Err(e),
    }
}

/// Hash an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::from_digest(&Sha256::digest(bytes))
}
