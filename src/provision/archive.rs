//! Plaintext verification and extraction

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

const HASH_CHUNK: usize = 8192;

/// Hex SHA-256 of a file, streamed in fixed-size chunks
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Fail with [`Error::ChecksumMismatch`] unless `path` hashes to `expected`
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Unpack a gzip-compressed tar archive into `dest`, keeping relative paths.
/// Entries that would escape `dest` are skipped by the tar reader.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(false);
    tar.unpack(dest)
        .map_err(|e| Error::Extract(format!("{}: {}", archive.display(), e)))?;

    debug!("Extracted {:?} into {:?}", archive, dest);
    Ok(())
}
