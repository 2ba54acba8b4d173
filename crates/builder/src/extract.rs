//! Archive extraction
//!
//! Compression is detected from the file name. Decompression streams
//! through the tokio codecs; the tar unpack itself is blocking and runs on
//! the blocking pool.

use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder, ZstdDecoder};
use picopkg_errors::{BuildError, Error};
use std::io::Cursor;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// Unpack a (possibly compressed) tar archive into `dest`
///
/// # Errors
///
/// `BuildError::UnsupportedArchiveFormat` for an unrecognized extension,
/// `BuildError::ExtractionFailed` for a corrupt archive, or an I/O error.
pub async fn extract_archive(archive: &Path, dest: &Path) -> Result<(), Error> {
    tokio::fs::create_dir_all(dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;

    let data = decompress(archive).await?;
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        tar::Archive::new(Cursor::new(data))
            .unpack(&dest)
            .map_err(|e| BuildError::ExtractionFailed {
                message: e.to_string(),
            })
    })
    .await
    .map_err(|e| Error::internal(format!("extraction task failed: {e}")))??;

    Ok(())
}

async fn decompress(archive: &Path) -> Result<Vec<u8>, Error> {
    let file = tokio::fs::File::open(archive)
        .await
        .map_err(|e| Error::io_with_path(&e, archive))?;
    let reader = BufReader::new(file);
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let mut decoder: Box<dyn AsyncRead + Unpin + Send> = if name.ends_with(".tar") {
        Box::new(reader)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Box::new(GzipDecoder::new(reader))
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Box::new(XzDecoder::new(reader))
    } else if name.ends_with(".tar.zst") {
        Box::new(ZstdDecoder::new(reader))
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        Box::new(BzDecoder::new(reader))
    } else {
        return Err(BuildError::UnsupportedArchiveFormat {
            path: archive.display().to_string(),
        }
        .into());
    };

    let mut data = Vec::new();
    decoder
        .read_to_end(&mut data)
        .await
        .map_err(|e| Error::io_with_path(&e, archive))?;
    Ok(data)
}
