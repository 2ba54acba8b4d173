//! Streamed file digests for source verification

use md5::Md5;
use picopkg_errors::Error;
use picopkg_types::ChecksumKind;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of chunks for streaming digest computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// Compute the hex digest of a file with the given algorithm
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub async fn digest_file(path: &Path, kind: ChecksumKind) -> Result<String, Error> {
    match kind {
        ChecksumKind::Md5 => digest_with::<Md5>(path).await,
        ChecksumKind::Sha1 => digest_with::<Sha1>(path).await,
        ChecksumKind::Sha256 => digest_with::<Sha256>(path).await,
        ChecksumKind::Sha512 => digest_with::<Sha512>(path).await,
    }
}

async fn digest_with<D: Digest>(path: &Path) -> Result<String, Error> {
    let mut file = File::open(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;

    let mut hasher = D::new();
    let mut buffer = vec![0; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Check a file against an expected hex digest (case-insensitive)
///
/// # Errors
/// Returns an error if the file cannot be read or hashed.
pub async fn verify_file(path: &Path, kind: ChecksumKind, expected: &str) -> Result<bool, Error> {
    let actual = digest_file(path, kind).await?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn known_digests() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"hello world").unwrap();

        let md5 = digest_file(temp.path(), ChecksumKind::Md5).await.unwrap();
        assert_eq!(md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");

        let sha1 = digest_file(temp.path(), ChecksumKind::Sha1).await.unwrap();
        assert_eq!(sha1, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");

        let sha256 = digest_file(temp.path(), ChecksumKind::Sha256)
            .await
            .unwrap();
        assert_eq!(
            sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn verify_is_case_insensitive() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"hello world").unwrap();

        assert!(verify_file(
            temp.path(),
            ChecksumKind::Md5,
            "5EB63BBBE01EEED093CB22BB8F5ACDC3"
        )
        .await
        .unwrap());

        assert!(!verify_file(temp.path(), ChecksumKind::Md5, "deadbeef")
            .await
            .unwrap());
    }
}
