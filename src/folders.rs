//! Timed-folder lifecycle: current folders, the archive, and pruning.
use chrono::{DateTime, Utc};
use slog::Logger;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

use crate::stamp;

/// Name of the special subdirectory receiving rolled-out timed folders.
pub const ARCHIVE_FOLDER_NAME: &str = "Archive";

const MAX_ATTEMPTS: u32 = 5;

/// Caps applied by [`run_timed_folder_cleanup`].
#[derive(Debug, Clone, Copy)]
pub struct TimedFolderConfig {
    /// Maximum number of timed folders kept directly under the root. One
    /// slot is reserved for the folder of the current activation.
    pub max_current_log_folder_count: u32,

    /// Maximum number of folders kept inside `Archive/`; `0` keeps all.
    pub max_archived_log_folder_count: u32,
}

/// Recognizes a stamp-named folder.
///
/// At the root the name must be the bare stamp token; inside the archive a
/// `-{uuid}` suffix from a collision-resolved move is also accepted.
pub fn is_timed_folder_name(name: &str, allow_move_suffix: bool) -> Option<DateTime<Utc>> {
    let (date, rest) = stamp::try_match(name)?;
    if rest.is_empty() || (allow_move_suffix && rest.starts_with('-')) {
        Some(date)
    } else {
        None
    }
}

/// Enforces the current and archive caps under `root`.
///
/// The whole operation is retried up to five times with a linear backoff on
/// any I/O failure; exhaustion is logged and reported as `false`.
pub fn run_timed_folder_cleanup(
    logger: &Logger,
    root: &Path,
    current_base: Option<&Path>,
    config: &TimedFolderConfig,
) -> bool {
    if config.max_current_log_folder_count == 0 {
        return true;
    }
    for attempt in 1..=MAX_ATTEMPTS {
        match cleanup_once(root, current_base, config) {
            Ok(()) => return true,
            Err(e) => {
                warn!(logger, "timed-folder cleanup failed";
                      "attempt" => attempt, "root" => %root.display(), "error" => %e);
                if attempt < MAX_ATTEMPTS {
                    thread::sleep(Duration::from_millis(u64::from(attempt) * 100));
                }
            }
        }
    }
    error!(logger, "giving up on timed-folder cleanup"; "root" => %root.display());
    false
}

fn cleanup_once(
    root: &Path,
    current_base: Option<&Path>,
    config: &TimedFolderConfig,
) -> io::Result<()> {
    let mut timed = Vec::new();
    let mut archive_path = None;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_owned(),
            None => continue,
        };
        if name.eq_ignore_ascii_case(ARCHIVE_FOLDER_NAME) {
            archive_path = Some(path);
            continue;
        }
        if Some(path.as_path()) == current_base {
            continue;
        }
        if let Some(date) = is_timed_folder_name(&name, false) {
            timed.push((date, path));
        }
    }
    // Most recent first; entry order breaks date ties.
    timed.sort_by(|a, b| b.0.cmp(&a.0));

    let max_current = config.max_current_log_folder_count as usize;
    if timed.len() >= max_current {
        let archive = match &archive_path {
            Some(path) => path.clone(),
            None => {
                let path = root.join(ARCHIVE_FOLDER_NAME);
                fs::create_dir_all(&path)?;
                archive_path = Some(path.clone());
                path
            }
        };
        let excess = timed.len() - (max_current - 1);
        for (_, path) in timed.iter().rev().take(excess) {
            move_into_archive(path, &archive)?;
        }
    }
    if config.max_archived_log_folder_count > 0 {
        if let Some(archive) = &archive_path {
            prune_archive(archive, config.max_archived_log_folder_count as usize)?;
        }
    }
    Ok(())
}

fn move_into_archive(folder: &Path, archive: &Path) -> io::Result<PathBuf> {
    let name = folder
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "non UTF-8 folder name"))?;
    let mut target = archive.join(name);
    if target.exists() {
        target = archive.join(format!("{}-{}", name, Uuid::new_v4()));
    }
    fs::rename(folder, &target)?;
    Ok(target)
}

fn prune_archive(archive: &Path, max_archived: usize) -> io::Result<()> {
    let mut archived = Vec::new();
    for entry in fs::read_dir(archive)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_owned(),
            None => continue,
        };
        if let Some(date) = is_timed_folder_name(&name, true) {
            archived.push((date, path));
        }
    }
    archived.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in archived.iter().skip(max_archived) {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}
