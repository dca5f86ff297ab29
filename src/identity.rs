//! Deciding whether a local artifact already matches a remote asset
//!
//! A recognized digest is authoritative: the local artifact is hashed and compared, and
//! its size is not consulted. Without a usable digest the byte size is the only signal,
//! which can say "different" but never prove "equal".
//!
//! Directory artifacts are hashed recursively: every visible child (names not starting
//! with `.`) is hashed, the lowercase hex digests are concatenated in byte order of the
//! child names, and the concatenation is hashed again.

use crate::config::UnsupportedDigestPolicy;
use crate::types::{Asset, DigestAlgorithm};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, error, warn};

const READ_CHUNK: usize = 64 * 1024;

/// Result of comparing a local artifact with its remote description
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Identity {
    /// Nothing on disk yet
    Absent,
    /// Digests agree
    Match,
    /// Digest or size disagrees
    Mismatch,
    /// Present with the expected size, but there is no digest to prove it
    UnverifiablePresent,
}

impl Identity {
    /// Whether the asset has to be downloaded
    pub fn needs_fetch(self) -> bool {
        matches!(self, Identity::Absent | Identity::Mismatch)
    }
}

/// Compare the artifact at `path` with `asset`
///
/// # Errors
/// Returns any I/O error other than the artifact not existing.
pub fn compare(asset: &Asset, path: &Path, policy: UnsupportedDigestPolicy) -> io::Result<Identity> {
    // reported for every asset, including ones about to be downloaded for the first time
    let digest = asset.parsed_digest();
    if let Some(DigestAlgorithm::Unsupported(algorithm)) = digest.as_ref().map(|d| &d.algorithm) {
        error!(asset = %asset.name, algorithm = %algorithm, "Unsupported digest kind");
    }

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Identity::Absent),
        Err(e) => return Err(e),
    };

    if let Some(digest) = digest {
        match digest.algorithm {
            DigestAlgorithm::Sha256 => {
                let local = sha256_path(path)?;
                return Ok(if local == digest.value {
                    debug!(asset = %asset.name, "Digests match");
                    Identity::Match
                } else {
                    warn!(asset = %asset.name, "Digests differ");
                    Identity::Mismatch
                });
            }
            DigestAlgorithm::Unsupported(_) => {
                if policy == UnsupportedDigestPolicy::Refetch {
                    return Ok(Identity::Mismatch);
                }
            }
        }
    } else {
        warn!(asset = %asset.name, "Asset is missing a digest, relying on file size");
    }

    Ok(if metadata.len() == asset.size {
        debug!(asset = %asset.name, "Sizes match");
        Identity::UnverifiablePresent
    } else {
        warn!(
            asset = %asset.name,
            local = metadata.len(),
            remote = asset.size,
            "Sizes differ"
        );
        Identity::Mismatch
    })
}

/// Lowercase hex SHA-256 of a file, or the recursive digest of a directory
pub fn sha256_path(path: &Path) -> io::Result<String> {
    if fs::metadata(path)?.is_dir() {
        let mut names: Vec<_> = fs::read_dir(path)?
            .map(|entry| entry.map(|entry| entry.file_name()))
            .collect::<io::Result<_>>()?;
        names.retain(|name| !name.as_encoded_bytes().starts_with(b"."));
        names.sort_by(|a, b| a.as_encoded_bytes().cmp(b.as_encoded_bytes()));

        let mut hasher = Sha256::new();
        for name in names {
            hasher.update(sha256_path(&path.join(name))?.as_bytes());
        }
        return Ok(format!("{:x}", hasher.finalize()));
    }

    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
