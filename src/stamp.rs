//! Unique timestamped names for log files and timed folders.
//!
//! Names start with a fixed-width UTC token, `YYYYMMDDThhmmssmmm`
//! (e.g. `20240131T153059123`), which sorts lexicographically in
//! chronological order. [`next_stamp`] is strictly increasing across calls
//! within the process, so generated names never rely on wall-clock
//! monotonicity; collisions on disk are resolved by
//! [`create_unique_file`]'s fail-if-exists probing.
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Length of the timestamp token in characters.
pub const STAMP_LEN: usize = 18;

static STAMP_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}T\d{9}$").expect("valid"));

static LAST_STAMP: Lazy<Mutex<DateTime<Utc>>> = Lazy::new(|| Mutex::new(truncate_to_millis(Utc::now())));

/// Formats `t` as the fixed-width stamp token.
pub fn format_stamp(t: DateTime<Utc>) -> String {
    format!(
        "{}{:03}",
        t.format("%Y%m%dT%H%M%S"),
        t.timestamp_subsec_millis()
    )
}

/// Returns a strictly increasing millisecond-truncated UTC time.
///
/// Successive calls always yield strictly greater stamps even if the wall
/// clock stalls or steps backwards.
pub fn next_stamp(now: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = truncate_to_millis(now);
    match LAST_STAMP.lock() {
        Ok(mut last) => {
            let next = if candidate > *last {
                candidate
            } else {
                *last + Duration::milliseconds(1)
            };
            *last = next;
            next
        }
        Err(_) => candidate,
    }
}

/// Recognizes a name starting with the stamp token.
///
/// On success, returns the parsed UTC time and the remainder of the name
/// after the token.
pub fn try_match(name: &str) -> Option<(DateTime<Utc>, &str)> {
    let head = name.get(..STAMP_LEN)?;
    if !STAMP_PATTERN.is_match(head) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(&head[..15], "%Y%m%dT%H%M%S").ok()?;
    let millis: i64 = head[15..18].parse().ok()?;
    let parsed = Utc.from_utc_datetime(&naive) + Duration::milliseconds(millis);
    Some((parsed, &name[STAMP_LEN..]))
}

/// Creates `{dir}/{prefix}{stamp}{suffix}` exclusively.
///
/// Creation is atomic (fail-if-exists); when the name is taken, a `-{n}`
/// token is inserted before the suffix and the probe repeats until a free
/// name is found.
pub fn create_unique_file(
    dir: &Path,
    prefix: &str,
    stamp: DateTime<Utc>,
    suffix: &str,
) -> io::Result<(PathBuf, File)> {
    let token = format_stamp(stamp);
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}{}{}", prefix, token, suffix)
        } else {
            format!("{}{}-{}{}", prefix, token, attempt, suffix)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(t.timestamp_millis()) {
        chrono::LocalResult::Single(v) => v,
        _ => t,
    }
}
