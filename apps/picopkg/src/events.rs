//! Event rendering for the terminal

use picopkg_events::{AppEvent, BuildEvent, DownloadEvent, GeneralEvent, ResolverEvent};
use std::time::Duration;
use tracing::debug;

/// Turns the event stream into terminal output
pub struct EventHandler;

impl EventHandler {
    pub fn handle(&mut self, event: &AppEvent) {
        match event {
            AppEvent::General(general) => Self::handle_general(general),
            AppEvent::Resolver(resolver) => Self::handle_resolver(resolver),
            AppEvent::Download(download) => Self::handle_download(download),
            AppEvent::Build(build) => Self::handle_build(build),
        }
    }

    fn handle_general(event: &GeneralEvent) {
        match event {
            GeneralEvent::DebugLog { message } => debug!("{message}"),
            GeneralEvent::Warning { message } => println!("warning: {message}"),
            GeneralEvent::Error { message } => eprintln!("error: {message}"),
            GeneralEvent::OperationStarted { operation } => debug!("{operation} started"),
            GeneralEvent::OperationCompleted { operation, success } => {
                debug!("{operation} completed (success: {success})");
            }
        }
    }

    fn handle_resolver(event: &ResolverEvent) {
        match event {
            ResolverEvent::GraphValidated { packages, waves } => {
                println!("resolved {packages} package(s) into {waves} wave(s)");
            }
            ResolverEvent::WaveStarted { index, packages } => {
                println!("wave {index}: {}", packages.join(", "));
            }
        }
    }

    fn handle_download(event: &DownloadEvent) {
        match event {
            DownloadEvent::Started { url, total_size } => match total_size {
                Some(size) => println!("downloading {url} ({size} bytes)"),
                None => println!("downloading {url}"),
            },
            DownloadEvent::Completed { url, size } => {
                debug!("downloaded {url} ({size} bytes)");
            }
            DownloadEvent::Failed { url, error } => {
                eprintln!("download failed: {url}: {error}");
            }
            DownloadEvent::Retrying {
                url,
                attempt,
                max_attempts,
            } => {
                println!("retrying {url} (attempt {attempt}/{max_attempts})");
            }
        }
    }

    fn handle_build(event: &BuildEvent) {
        match event {
            BuildEvent::PackageStarted { package } => println!("[{package}] building"),
            BuildEvent::StageStarted { package, stage } => debug!("[{package}] stage {stage}"),
            BuildEvent::StageCompleted { .. } => {}
            BuildEvent::CommandStarted { package, command } => {
                debug!("[{package}] $ {command}");
            }
            BuildEvent::CommandCompleted { .. } => {}
            BuildEvent::SourceOptionRejected {
                package,
                option,
                reason,
            } => {
                println!("[{package}] source option {option} rejected: {reason}");
            }
            BuildEvent::CacheHit {
                package,
                fingerprint,
            } => {
                println!("[{package}] cache hit ({})", &fingerprint[..12.min(fingerprint.len())]);
            }
            BuildEvent::PackageCompleted { package, duration } => {
                println!("[{package}] done in {}", format_duration(*duration));
            }
            BuildEvent::PackageFailed {
                package,
                stage,
                error,
            } => {
                eprintln!("[{package}] failed at {stage}: {error}");
            }
            BuildEvent::PackageBlocked {
                package,
                dependency,
            } => {
                println!("[{package}] blocked: {dependency} did not complete");
            }
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formats() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
