use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::interval;
use tracing::{debug, info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Periodically removes downloaded audio files older than `max_age`.
pub async fn start_cleanup_task(download_dir: PathBuf, max_age: Duration) {
    info!(
        "Starting audio download cleanup for {:?} (max age {})",
        download_dir,
        humantime::format_duration(max_age)
    );
    let mut ticker = interval(SWEEP_INTERVAL);

    loop {
        ticker.tick().await;
        match remove_older_than(&download_dir, max_age, SystemTime::now()) {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} expired audio downloads", removed),
            Err(e) => warn!("Audio download cleanup error: {}", e),
        }
    }
}

/// Deletes regular files last modified before `now - max_age`. Returns how many were removed.
pub fn remove_older_than(dir: &Path, max_age: Duration, now: SystemTime) -> anyhow::Result<usize> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(0);
    }

    let threshold = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified >= threshold {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!("Removed expired download {:?}", entry.path());
                removed += 1;
            }
            Err(e) => warn!("Failed to delete old file {:?}: {}", entry.path(), e),
        }
    }
    Ok(removed)
}
