//! Streaming download with retry and backoff

use crate::client::NetClient;
use futures::StreamExt;
use picopkg_errors::{Error, NetworkError, UserFacingError};
use picopkg_events::{AppEvent, DownloadEvent, EventEmitter, EventSender};
use rand::Rng;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Fetch a URL to a local path, streaming to disk
///
/// Retries transient failures with exponential backoff and jitter. Returns
/// the number of bytes written.
///
/// # Errors
///
/// Returns an error if the URL is invalid, or if the download still fails
/// after all retry attempts.
pub async fn fetch_to_path(
    client: &NetClient,
    url: &str,
    dest: &Path,
    tx: &EventSender,
) -> Result<u64, Error> {
    let parsed = Url::parse(url).map_err(|_| NetworkError::InvalidUrl {
        url: url.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(NetworkError::InvalidUrl {
            url: url.to_string(),
        }
        .into());
    }

    let max_attempts = client.retry_count().max(1);
    let mut last_error: Option<Error> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            tx.emit(AppEvent::Download(DownloadEvent::Retrying {
                url: url.to_string(),
                attempt,
                max_attempts,
            }));
            tokio::time::sleep(backoff_delay(client.retry_delay(), attempt)).await;
        }

        match try_fetch(client, url, dest, tx).await {
            Ok(size) => return Ok(size),
            Err(e) => {
                let retryable = e.is_retryable();
                last_error = Some(e);
                if !retryable {
                    break;
                }
            }
        }
    }

    let error = last_error.unwrap_or_else(|| {
        NetworkError::DownloadFailed {
            url: url.to_string(),
            message: "maximum retries exceeded".to_string(),
        }
        .into()
    });
    tx.emit(AppEvent::Download(DownloadEvent::Failed {
        url: url.to_string(),
        error: error.to_string(),
    }));
    Err(error)
}

async fn try_fetch(
    client: &NetClient,
    url: &str,
    dest: &Path,
    tx: &EventSender,
) -> Result<u64, Error> {
    let response = client.get(url).await?;
    let total_size = response.content_length();

    tx.emit_download_started(url, total_size);

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;
    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| NetworkError::DownloadFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
        downloaded += chunk.len() as u64;
    }

    tokio::io::AsyncWriteExt::flush(&mut file).await?;
    tx.emit_download_completed(url, downloaded);

    Ok(downloaded)
}

/// Exponential backoff with jitter, capped at 30 seconds
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(2)));
    let capped = exp.min(Duration::from_secs(30));
    let jitter = rand::rng().random_range(0.8..1.2);
    capped.mul_f64(jitter)
}
