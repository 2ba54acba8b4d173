//! Source acquisition and verification
//!
//! Options are tried in declared order. Each candidate is a local archive
//! (used as-is when present) or a URL (downloaded). Every checksum the
//! option declares must match; a download failure or any mismatch rejects
//! the option and acquisition moves on. Only when all options are
//! exhausted does the package fail.

use picopkg_errors::{Error, SourceError};
use picopkg_events::{AppEvent, BuildEvent, EventEmitter, EventSender};
use picopkg_hash::checksums;
use picopkg_net::{fetch_to_path, NetClient};
use picopkg_types::SourceOption;
use std::path::{Path, PathBuf};
use url::Url;

/// A verified source archive and the option that produced it
#[derive(Debug, Clone)]
pub struct AcquiredSource {
    pub path: PathBuf,
    /// The (resolved) option the archive satisfied, kept for later recheck
    pub option: SourceOption,
    pub index: usize,
}

/// Acquire and verify a source archive for a package
///
/// # Errors
///
/// `SourceError::NoSourceOptions` when the list is empty, or
/// `SourceError::VerificationFailed` once every option has been rejected.
pub async fn acquire(
    package: &str,
    options: &[SourceOption],
    download_dir: &Path,
    client: &NetClient,
    tx: &EventSender,
) -> Result<AcquiredSource, Error> {
    if options.is_empty() {
        return Err(SourceError::NoSourceOptions {
            package: package.to_string(),
        }
        .into());
    }

    for (index, option) in options.iter().enumerate() {
        match try_option(option, index, download_dir, client, tx).await {
            Ok(path) => {
                return Ok(AcquiredSource {
                    path,
                    option: option.clone(),
                    index,
                })
            }
            Err(reason) => {
                tx.emit(AppEvent::Build(BuildEvent::SourceOptionRejected {
                    package: package.to_string(),
                    option: index,
                    reason: reason.to_string(),
                }));
            }
        }
    }

    Err(SourceError::VerificationFailed {
        package: package.to_string(),
        attempts: options.len(),
    }
    .into())
}

async fn try_option(
    option: &SourceOption,
    index: usize,
    download_dir: &Path,
    client: &NetClient,
    tx: &EventSender,
) -> Result<PathBuf, Error> {
    let candidate = locate(option, index, download_dir, client, tx).await?;
    verify(&candidate, option).await?;
    Ok(candidate)
}

/// Find the archive for one option: local file if it exists, otherwise a
/// fresh download
async fn locate(
    option: &SourceOption,
    index: usize,
    download_dir: &Path,
    client: &NetClient,
    tx: &EventSender,
) -> Result<PathBuf, Error> {
    if let Some(archive) = &option.archive {
        if tokio::fs::try_exists(archive)
            .await
            .map_err(|e| Error::io_with_path(&e, archive))?
        {
            return Ok(archive.clone());
        }
        if option.url.is_none() {
            return Err(SourceError::MissingArchive {
                path: archive.display().to_string(),
            }
            .into());
        }
    }

    let Some(url) = &option.url else {
        return Err(SourceError::MissingArchive {
            path: String::new(),
        }
        .into());
    };

    tokio::fs::create_dir_all(download_dir)
        .await
        .map_err(|e| Error::io_with_path(&e, download_dir))?;
    let dest = download_dir.join(archive_filename(url, index));
    fetch_to_path(client, url, &dest, tx).await?;
    Ok(dest)
}

/// Check an archive against every checksum an option declares
///
/// # Errors
///
/// `SourceError::ChecksumMismatch` naming the first failing algorithm.
pub async fn verify(path: &Path, option: &SourceOption) -> Result<(), Error> {
    for (kind, expected) in option.declared_checksums() {
        let actual = checksums::digest_file(path, kind).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(SourceError::ChecksumMismatch {
                file: path.display().to_string(),
                algorithm: kind.to_string(),
                expected: expected.to_string(),
                actual,
            }
            .into());
        }
    }
    Ok(())
}

/// Filename to store a download under, from the last URL path segment
fn archive_filename(url: &str, index: usize) -> String {
    let from_url = Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segments| segments.next_back().map(ToString::to_string))
            .filter(|name| !name.is_empty())
    });
    from_url.unwrap_or_else(|| format!("source-{index}.archive"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn local_option(path: &Path, sha256: Option<&str>) -> SourceOption {
        SourceOption {
            archive: Some(path.to_path_buf()),
            sha256: sha256.map(ToString::to_string),
            ..SourceOption::default()
        }
    }

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    #[tokio::test]
    async fn local_archive_with_matching_checksum() {
        let dir = TempDir::new().unwrap();
        let archive = write_file(&dir, "a.tar", b"hello world");
        let (tx, _rx) = picopkg_events::channel();
        let client = NetClient::with_defaults().unwrap();

        let acquired = acquire(
            "pkg",
            &[local_option(&archive, Some(HELLO_SHA256))],
            dir.path(),
            &client,
            &tx,
        )
        .await
        .unwrap();
        assert_eq!(acquired.path, archive);
        assert_eq!(acquired.index, 0);
    }

    #[tokio::test]
    async fn mismatch_falls_back_to_next_option() {
        let dir = TempDir::new().unwrap();
        let bad = write_file(&dir, "bad.tar", b"tampered");
        let good = write_file(&dir, "good.tar", b"hello world");
        let (tx, mut rx) = picopkg_events::channel();
        let client = NetClient::with_defaults().unwrap();

        let options = [
            local_option(&bad, Some(HELLO_SHA256)),
            local_option(&good, Some(HELLO_SHA256)),
        ];
        let acquired = acquire("pkg", &options, dir.path(), &client, &tx)
            .await
            .unwrap();
        assert_eq!(acquired.index, 1);

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            AppEvent::Build(BuildEvent::SourceOptionRejected { option: 0, .. })
        ));
    }

    #[tokio::test]
    async fn all_options_exhausted_fails_verification() {
        let dir = TempDir::new().unwrap();
        let bad = write_file(&dir, "bad.tar", b"tampered");
        let (tx, _rx) = picopkg_events::channel();
        let client = NetClient::with_defaults().unwrap();

        let err = acquire(
            "pkg",
            &[local_option(&bad, Some(HELLO_SHA256))],
            dir.path(),
            &client,
            &tx,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Source(SourceError::VerificationFailed { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn no_declared_checksums_accepts_any_content() {
        let dir = TempDir::new().unwrap();
        let archive = write_file(&dir, "a.tar", b"anything");
        let (tx, _rx) = picopkg_events::channel();
        let client = NetClient::with_defaults().unwrap();

        acquire(
            "pkg",
            &[local_option(&archive, None)],
            dir.path(),
            &client,
            &tx,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn empty_option_list_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = picopkg_events::channel();
        let client = NetClient::with_defaults().unwrap();

        let err = acquire("pkg", &[], dir.path(), &client, &tx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Source(SourceError::NoSourceOptions { .. })
        ));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            archive_filename("https://example.com/pub/zlib-1.3.1.tar.gz", 0),
            "zlib-1.3.1.tar.gz"
        );
        assert_eq!(archive_filename("https://example.com/", 2), "source-2.archive");
    }
}
