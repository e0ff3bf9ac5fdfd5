//! Age- and size-based pruning of produced log files.
use chrono::{DateTime, Duration, Utc};
use slog::Logger;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::folders::{is_timed_folder_name, ARCHIVE_FOLDER_NAME};
use crate::output::{TEMP_EXTENSION, TEMP_PREFIX};
use crate::stamp;
use crate::{ErrorKind, Result};

#[derive(Debug)]
struct Candidate {
    date: DateTime<Utc>,
    size: u64,
    path: PathBuf,
}

/// Deletes old log files until the age/size policy is satisfied.
///
/// Files younger than `min_time_to_keep` are never deleted; the remaining
/// candidates are removed oldest-first until the preserved and retained
/// bytes fit in `max_total_bytes_to_keep`. At least one of the two limits
/// must be positive. Timed folders left empty by the pruning are removed.
pub fn run_file_housekeeping(
    logger: &Logger,
    root: &Path,
    current_base: Option<&Path>,
    open_temp_file: Option<&Path>,
    file_name_suffix: &str,
    min_time_to_keep: Duration,
    max_total_bytes_to_keep: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    track_assert!(
        min_time_to_keep > Duration::zero() || max_total_bytes_to_keep > 0,
        ErrorKind::Invalid
    );
    let mut candidates = Vec::new();
    let mut visited_timed = Vec::new();
    track!(collect(
        root,
        false,
        file_name_suffix,
        open_temp_file,
        &mut candidates,
        &mut visited_timed,
    )
    .map_err(crate::Error::from))?;

    let threshold = now - min_time_to_keep;
    let mut preserved_bytes = 0u64;
    let mut deletable = Vec::new();
    for candidate in candidates {
        if candidate.date >= threshold {
            preserved_bytes += candidate.size;
        } else {
            deletable.push(candidate);
        }
    }
    let mut retained_bytes: u64 = deletable.iter().map(|c| c.size).sum();
    if preserved_bytes + retained_bytes > max_total_bytes_to_keep && !deletable.is_empty() {
        deletable.sort_by(|a, b| b.date.cmp(&a.date));
        for candidate in deletable.iter().rev() {
            if preserved_bytes + retained_bytes <= max_total_bytes_to_keep {
                break;
            }
            match fs::remove_file(&candidate.path) {
                Ok(()) => retained_bytes -= candidate.size,
                Err(e) => warn!(logger, "cannot delete an old log file";
                                "path" => %candidate.path.display(), "error" => %e),
            }
        }
    }

    // Deepest first, so folders nested under the archive empty out before
    // their parents are considered.
    visited_timed.sort_by_key(|path| std::cmp::Reverse(path.components().count()));
    for folder in visited_timed {
        if Some(folder.as_path()) == current_base {
            continue;
        }
        match fs::read_dir(&folder) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    if let Err(e) = fs::remove_dir(&folder) {
                        warn!(logger, "cannot delete an empty timed folder";
                              "path" => %folder.display(), "error" => %e);
                    }
                }
            }
            Err(e) => warn!(logger, "cannot enumerate a timed folder";
                            "path" => %folder.display(), "error" => %e),
        }
    }
    Ok(())
}

fn collect(
    dir: &Path,
    allow_move_suffix: bool,
    suffix: &str,
    open_temp_file: Option<&Path>,
    out: &mut Vec<Candidate>,
    visited_timed: &mut Vec<PathBuf>,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_owned(),
            None => continue,
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if name.eq_ignore_ascii_case(ARCHIVE_FOLDER_NAME) {
                collect(&path, true, suffix, open_temp_file, out, visited_timed)?;
            } else if is_timed_folder_name(&name, allow_move_suffix).is_some() {
                visited_timed.push(path.clone());
                collect(&path, allow_move_suffix, suffix, open_temp_file, out, visited_timed)?;
            }
        } else if file_type.is_file() {
            if Some(path.as_path()) == open_temp_file {
                continue;
            }
            if let Some(date) = candidate_date(&name, suffix) {
                let size = entry.metadata()?.len();
                out.push(Candidate { date, size, path });
            }
        }
    }
    Ok(())
}

// A candidate is either a finalized file `{stamp}{suffix}` or a leftover
// temporary `T-{stamp}{suffix}.tmp`, both with an optional `-{n}` uniqueness
// token before the suffix.
fn candidate_date(name: &str, suffix: &str) -> Option<DateTime<Utc>> {
    if let Some(stripped) = name.strip_prefix(TEMP_PREFIX) {
        let (date, rest) = stamp::try_match(stripped)?;
        let rest = rest.strip_suffix(TEMP_EXTENSION)?;
        if matches_suffix(rest, suffix) {
            return Some(date);
        }
        return None;
    }
    let (date, rest) = stamp::try_match(name)?;
    if matches_suffix(rest, suffix) {
        Some(date)
    } else {
        None
    }
}

fn matches_suffix(rest: &str, suffix: &str) -> bool {
    rest == suffix || (rest.starts_with('-') && rest.len() > suffix.len() && rest.ends_with(suffix))
}
