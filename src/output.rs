//! Rotating file output.
//!
//! A [`RotatingFileOutput`] writes opaque records into a temporary file named
//! `T-{stamp}{suffix}.tmp` and finalizes it to `{stamp}{suffix}` after
//! `max_count_per_file` entries, either by an atomic rename or by streaming
//! the bytes through a gzip encoder. In timed-folder mode the files live in a
//! stamp-named subfolder of the root, one per activation.
use chrono::{DateTime, Utc};
#[cfg(feature = "libflate")]
use libflate::gzip::Encoder as GzipEncoder;
use slog::Logger;
use std::fs::{self, File};
#[cfg(feature = "libflate")]
use std::io::BufReader;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::folders::TimedFolderConfig;
use crate::housekeeping;
use crate::stamp;
use crate::{folders, Error, ErrorKind, Result};

pub(crate) const TEMP_PREFIX: &str = "T-";
pub(crate) const TEMP_EXTENSION: &str = ".tmp";

#[cfg(feature = "libflate")]
const COPY_BUFFER_SIZE: usize = 64 * 1024;

// Once symlink creation fails with a privilege error, it is disabled for the
// rest of the process.
static SYMLINK_DISABLED: AtomicBool = AtomicBool::new(false);

/// Initial settings of a [`RotatingFileOutput`].
#[derive(Debug, Clone)]
pub struct FileOutputOptions {
    /// Suffix of every produced file, including the format marker
    /// (e.g. `".ckmon"`). Must not be empty.
    pub file_name_suffix: String,

    /// Number of entries written to a file before it is rotated. Must be
    /// positive.
    pub max_count_per_file: u32,

    /// Whether finalization compresses the file.
    pub use_gzip: bool,

    /// Whether files are grouped into stamp-named subfolders.
    pub timed_folders: bool,

    /// Name of the symbolic link pointing at the most recent finalized file,
    /// or `None` to disable the link.
    pub last_run_file_name: Option<String>,
}

/// Optional new values applied by [`RotatingFileOutput::reconfigure`].
#[derive(Debug, Clone, Default)]
pub struct Reconfigure {
    pub file_name_suffix: Option<String>,
    pub max_count_per_file: Option<u32>,
    pub use_gzip: Option<bool>,
    pub timed_folders: Option<bool>,
    /// `Some(None)` disables the link and deletes the existing one.
    pub last_run_file_name: Option<Option<String>>,
}

/// The rotation, finalization and archival engine for on-disk log files.
pub struct RotatingFileOutput {
    logger: Logger,
    configured_root: PathBuf,
    root_path: Option<PathBuf>,
    base_path: Option<PathBuf>,
    output: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    opened_time: Option<DateTime<Utc>>,
    count_remainder: u32,
    file_name_suffix: String,
    max_count_per_file: u32,
    use_gzip: bool,
    timed_folders: bool,
    last_run_file_name: Option<String>,
}

impl RotatingFileOutput {
    /// Makes a new output rooted at `root`.
    ///
    /// Fails if `max_count_per_file` is zero or the suffix is empty.
    pub fn new<P: AsRef<Path>>(logger: Logger, root: P, options: FileOutputOptions) -> Result<Self> {
        track_assert!(options.max_count_per_file > 0, ErrorKind::Invalid);
        track_assert!(!options.file_name_suffix.is_empty(), ErrorKind::Invalid);
        if options.last_run_file_name.as_ref().map_or(false, |n| n.is_empty()) {
            track_panic!(ErrorKind::Invalid, "Empty last-run file name");
        }
        Ok(RotatingFileOutput {
            logger,
            configured_root: root.as_ref().to_path_buf(),
            root_path: None,
            base_path: None,
            output: None,
            current_path: None,
            opened_time: None,
            count_remainder: options.max_count_per_file,
            file_name_suffix: options.file_name_suffix,
            max_count_per_file: options.max_count_per_file,
            use_gzip: options.use_gzip,
            timed_folders: options.timed_folders,
            last_run_file_name: options.last_run_file_name,
        })
    }

    /// Resolves the root path and chooses the base path.
    ///
    /// Returns `false` (after logging) when the root cannot be created. The
    /// root is computed once; later calls reuse it. In timed-folder mode a
    /// previously chosen, still existing timed folder is kept; otherwise a
    /// new stamp-named folder is chosen (and created lazily on first write).
    pub fn initialize(&mut self) -> bool {
        if self.root_path.is_none() {
            if let Err(e) = fs::create_dir_all(&self.configured_root) {
                error!(self.logger, "cannot create log root directory";
                       "path" => %self.configured_root.display(), "error" => %e);
                return false;
            }
            self.root_path = Some(self.configured_root.clone());
        }
        let root = match &self.root_path {
            Some(root) => root.clone(),
            None => return false,
        };
        if !self.timed_folders {
            self.base_path = Some(root);
        } else {
            let keep = self
                .base_path
                .as_ref()
                .map_or(false, |base| base.starts_with(&root) && base.exists());
            if !keep {
                let stamp = stamp::next_stamp(Utc::now());
                self.base_path = Some(root.join(stamp::format_stamp(stamp)));
            }
        }
        true
    }

    /// Returns `true` after a successful [`initialize`](Self::initialize).
    pub fn is_initialized(&self) -> bool {
        self.base_path.is_some()
    }

    /// The resolved root, if initialization has succeeded at least once.
    pub fn root_path(&self) -> Option<&Path> {
        self.root_path.as_deref()
    }

    /// The directory currently receiving files.
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// The number of entries written into the currently open file.
    pub fn entries_in_current_file(&self) -> u32 {
        if self.output.is_some() {
            self.max_count_per_file - self.count_remainder
        } else {
            0
        }
    }

    /// Writes one already-encoded record.
    ///
    /// Opens a new temporary file when none is open, and rotates (closes and
    /// finalizes) once `max_count_per_file` entries have been written.
    pub fn write_entry(&mut self, bytes: &[u8]) -> Result<()> {
        track_assert!(self.base_path.is_some(), ErrorKind::Invalid);
        if self.output.is_none() {
            track!(self.open_new_file())?;
        }
        if let Some(output) = self.output.as_mut() {
            track!(output.write_all(bytes).map_err(Error::from))?;
        }
        self.count_remainder = self.count_remainder.saturating_sub(1);
        if self.count_remainder == 0 {
            track!(self.close(false))?;
        }
        Ok(())
    }

    fn open_new_file(&mut self) -> Result<()> {
        let base = match &self.base_path {
            Some(base) => base.clone(),
            None => track_panic!(ErrorKind::Invalid, "Output is not initialized"),
        };
        // Timed folders come into being on the first write attempt.
        track!(fs::create_dir_all(&base).map_err(Error::from))?;
        let stamp = stamp::next_stamp(Utc::now());
        let temp_suffix = format!("{}{}", self.file_name_suffix, TEMP_EXTENSION);
        let (path, file) =
            track!(stamp::create_unique_file(&base, TEMP_PREFIX, stamp, &temp_suffix)
                .map_err(Error::from))?;
        self.opened_time = Some(stamp);
        self.current_path = Some(path);
        self.output = Some(BufWriter::new(file));
        self.count_remainder = self.max_count_per_file;
        Ok(())
    }

    /// Closes the open file, if any, and finalizes it.
    ///
    /// When `forget` is `true`, or when no entry was written, the temporary
    /// file is deleted and no file is produced. Otherwise returns the path of
    /// the finalized file.
    pub fn close(&mut self, forget: bool) -> Result<Option<PathBuf>> {
        let output = match self.output.take() {
            Some(output) => output,
            None => return Ok(None),
        };
        let temp_path = match self.current_path.take() {
            Some(path) => path,
            None => return Ok(None),
        };
        let opened_time = self.opened_time.take();
        let empty = self.count_remainder == self.max_count_per_file;
        self.count_remainder = self.max_count_per_file;

        let mut output = output;
        if let Err(e) = output.flush() {
            warn!(self.logger, "flush of the log file failed";
                  "path" => %temp_path.display(), "error" => %e);
        }
        drop(output);

        if forget || empty {
            let _ = fs::remove_file(&temp_path);
            return Ok(None);
        }
        let opened_time = match opened_time {
            Some(t) => t,
            None => track_panic!(ErrorKind::Other, "Open file without an opened time"),
        };
        let final_path = if self.use_gzip {
            track!(self.finalize_gzip(&temp_path, opened_time))?
        } else {
            track!(self.finalize_rename(&temp_path, opened_time))?
        };
        self.update_last_run(&final_path);
        Ok(Some(final_path))
    }

    // Atomically renames the temp file to `{stamp}{suffix}`, probing with a
    // uniqueness token on collision.
    fn finalize_rename(&self, temp_path: &Path, opened_time: DateTime<Utc>) -> Result<PathBuf> {
        let dir = match temp_path.parent() {
            Some(dir) => dir,
            None => track_panic!(ErrorKind::Other, "Temp file without a parent directory"),
        };
        let token = stamp::format_stamp(opened_time);
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}{}", token, self.file_name_suffix)
            } else {
                format!("{}-{}{}", token, attempt, self.file_name_suffix)
            };
            let target = dir.join(name);
            if target.exists() {
                attempt += 1;
                continue;
            }
            match fs::rename(temp_path, &target) {
                Ok(()) => return Ok(target),
                Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(track!(Error::from(e))),
            }
        }
    }

    // Streams the temp file through gzip into a freshly created unique final
    // file. The temp file is deleted only on success so data is never lost.
    #[cfg(feature = "libflate")]
    fn finalize_gzip(&self, temp_path: &Path, opened_time: DateTime<Utc>) -> Result<PathBuf> {
        let dir = match temp_path.parent() {
            Some(dir) => dir,
            None => track_panic!(ErrorKind::Other, "Temp file without a parent directory"),
        };
        let (target, file) =
            track!(stamp::create_unique_file(dir, "", opened_time, &self.file_name_suffix)
                .map_err(Error::from))?;
        let result = Self::compress(temp_path, file);
        match result {
            Ok(()) => {
                if let Err(e) = fs::remove_file(temp_path) {
                    warn!(self.logger, "cannot delete the compressed temp file";
                          "path" => %temp_path.display(), "error" => %e);
                }
                Ok(target)
            }
            Err(e) => {
                let _ = fs::remove_file(&target);
                error!(self.logger, "gzip finalization failed, keeping the temp file";
                       "path" => %temp_path.display(), "error" => %e);
                Err(track!(Error::from(e)))
            }
        }
    }

    #[cfg(not(feature = "libflate"))]
    fn finalize_gzip(&self, temp_path: &Path, opened_time: DateTime<Utc>) -> Result<PathBuf> {
        track!(self.finalize_rename(temp_path, opened_time))
    }

    #[cfg(feature = "libflate")]
    fn compress(input_path: &Path, output: File) -> io::Result<()> {
        let input = File::open(input_path)?;
        let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, input);
        let mut encoder = GzipEncoder::new(output)?;
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish().into_result()?;
        Ok(())
    }

    fn update_last_run(&self, target: &Path) {
        let name = match &self.last_run_file_name {
            Some(name) => name,
            None => return,
        };
        if SYMLINK_DISABLED.load(Ordering::SeqCst) {
            return;
        }
        let link = match &self.root_path {
            Some(root) => root.join(name),
            None => return,
        };
        let _ = fs::remove_file(&link);
        match symlink_file(target, &link) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => {
                if !SYMLINK_DISABLED.swap(true, Ordering::SeqCst) {
                    warn!(self.logger,
                          "symbolic links are not permitted, disabling the last-run link for this process";
                          "error" => %e);
                }
            }
            Err(e) => {
                warn!(self.logger, "cannot update the last-run link";
                      "link" => %link.display(), "error" => %e);
            }
        }
    }

    /// Applies optional new settings.
    ///
    /// Changing the suffix, compression or folder mode closes the current
    /// file first, as does shrinking `max_count_per_file` below the number of
    /// entries already written. A folder-mode change re-runs
    /// [`initialize`](Self::initialize) to recompute the base path.
    pub fn reconfigure(&mut self, r: Reconfigure) -> Result<()> {
        if let Some(suffix) = &r.file_name_suffix {
            track_assert!(!suffix.is_empty(), ErrorKind::Invalid);
        }
        if let Some(max) = r.max_count_per_file {
            track_assert!(max > 0, ErrorKind::Invalid);
        }
        let suffix_changes = r
            .file_name_suffix
            .as_ref()
            .map_or(false, |s| *s != self.file_name_suffix);
        let gzip_changes = r.use_gzip.map_or(false, |g| g != self.use_gzip);
        let mode_changes = r.timed_folders.map_or(false, |t| t != self.timed_folders);
        let written = self.entries_in_current_file();
        let shrinks = r
            .max_count_per_file
            .map_or(false, |max| self.output.is_some() && max < written);
        if suffix_changes || gzip_changes || mode_changes || shrinks {
            track!(self.close(false))?;
        }

        if let Some(suffix) = r.file_name_suffix {
            self.file_name_suffix = suffix;
        }
        if let Some(max) = r.max_count_per_file {
            self.max_count_per_file = max;
            if self.output.is_none() {
                self.count_remainder = max;
            }
        }
        if let Some(gzip) = r.use_gzip {
            self.use_gzip = gzip;
        }
        if let Some(last_run) = r.last_run_file_name {
            if last_run.is_none() {
                if let (Some(root), Some(name)) = (&self.root_path, &self.last_run_file_name) {
                    let _ = fs::remove_file(root.join(name));
                }
            }
            self.last_run_file_name = last_run;
        }
        if let Some(timed) = r.timed_folders {
            self.timed_folders = timed;
            if mode_changes {
                self.base_path = None;
                if !self.initialize() {
                    track_panic!(ErrorKind::Io, "Re-initialization after a folder mode change failed");
                }
            }
        }
        Ok(())
    }

    /// Closes the current file and forgets the chosen base path.
    ///
    /// The resolved root is kept, so a later [`initialize`](Self::initialize)
    /// reuses it.
    pub fn deactivate(&mut self) {
        if let Err(e) = self.close(false) {
            warn!(self.logger, "closing the log file during deactivation failed"; "error" => %e);
        }
        self.base_path = None;
    }

    /// Enforces the current/archive timed-folder caps under the root.
    ///
    /// Returns `false` after logging when the operation keeps failing.
    pub fn run_timed_folder_cleanup(&self, config: &TimedFolderConfig) -> bool {
        let root = match &self.root_path {
            Some(root) => root.clone(),
            None => return false,
        };
        folders::run_timed_folder_cleanup(&self.logger, &root, self.base_path.as_deref(), config)
    }

    /// Deletes old files until the age/size policy is satisfied.
    pub fn run_file_housekeeping(
        &self,
        min_time_to_keep: chrono::Duration,
        max_total_bytes_to_keep: u64,
    ) -> Result<()> {
        let root = match &self.root_path {
            Some(root) => root.clone(),
            None => track_panic!(ErrorKind::Invalid, "Output is not initialized"),
        };
        housekeeping::run_file_housekeeping(
            &self.logger,
            &root,
            self.base_path.as_deref(),
            self.current_path.as_deref(),
            &self.file_name_suffix,
            min_time_to_keep,
            max_total_bytes_to_keep,
            Utc::now(),
        )
    }
}

impl Drop for RotatingFileOutput {
    fn drop(&mut self) {
        if self.output.is_some() {
            if let Err(e) = self.close(false) {
                warn!(self.logger, "closing the log file on drop failed"; "error" => %e);
            }
        }
    }
}

#[cfg(unix)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink_file(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::PermissionDenied,
        "symbolic links are not supported on this platform",
    ))
}

#[cfg(test)]
pub(crate) fn symlink_latch() -> &'static AtomicBool {
    &SYMLINK_DISABLED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::try_match;
    use std::io::Read;
    use tempfile::{Builder as TempDirBuilder, TempDir};

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn options() -> FileOutputOptions {
        FileOutputOptions {
            file_name_suffix: ".ckmon".to_owned(),
            max_count_per_file: 2,
            use_gzip: false,
            timed_folders: false,
            last_run_file_name: None,
        }
    }

    fn final_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.is_file()
                    && try_match(p.file_name().unwrap().to_str().unwrap()).is_some()
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn rejects_invalid_options() {
        let mut bad = options();
        bad.max_count_per_file = 0;
        assert!(RotatingFileOutput::new(test_logger(), "/tmp/x", bad).is_err());
        let mut bad = options();
        bad.file_name_suffix = String::new();
        assert!(RotatingFileOutput::new(test_logger(), "/tmp/x", bad).is_err());
    }

    #[test]
    fn rotation_finalizes_every_full_file() {
        let dir = tempdir();
        let mut output = RotatingFileOutput::new(test_logger(), dir.path(), options()).unwrap();
        assert!(output.initialize());
        for i in 0..5 {
            output.write_entry(format!("entry {}\n", i).as_bytes()).unwrap();
        }
        // 5 entries at 2 per file: two finalized files plus one open temp.
        assert_eq!(final_files(dir.path()).len(), 2);
        assert_eq!(output.entries_in_current_file(), 1);
        let last = output.close(false).unwrap().unwrap();
        assert_eq!(final_files(dir.path()).len(), 3);
        assert_eq!(fs::read_to_string(last).unwrap(), "entry 4\n");
    }

    #[test]
    fn temp_and_final_names_share_the_opened_time() {
        let dir = tempdir();
        let mut output = RotatingFileOutput::new(test_logger(), dir.path(), options()).unwrap();
        assert!(output.initialize());
        output.write_entry(b"x\n").unwrap();
        let temp = output.current_path.clone().unwrap();
        let temp_name = temp.file_name().unwrap().to_str().unwrap().to_owned();
        let (temp_time, _) = try_match(&temp_name[TEMP_PREFIX.len()..]).unwrap();
        let finalized = output.close(false).unwrap().unwrap();
        let (final_time, rest) =
            try_match(finalized.file_name().unwrap().to_str().unwrap()).unwrap();
        assert_eq!(temp_time, final_time);
        assert_eq!(rest, ".ckmon");
        assert!(!temp.exists());
    }

    #[test]
    fn empty_and_forgotten_files_produce_nothing() {
        let dir = tempdir();
        let mut output = RotatingFileOutput::new(test_logger(), dir.path(), options()).unwrap();
        assert!(output.initialize());
        assert!(output.close(false).unwrap().is_none());

        output.write_entry(b"discard me\n").unwrap();
        assert!(output.close(true).unwrap().is_none());
        assert!(final_files(dir.path()).is_empty());
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn at_most_one_temp_file_exists() {
        let dir = tempdir();
        let mut output = RotatingFileOutput::new(test_logger(), dir.path(), options()).unwrap();
        assert!(output.initialize());
        for i in 0..7 {
            output.write_entry(format!("{}\n", i).as_bytes()).unwrap();
            let temps = fs::read_dir(dir.path())
                .unwrap()
                .filter(|e| {
                    e.as_ref()
                        .unwrap()
                        .file_name()
                        .to_str()
                        .unwrap()
                        .starts_with(TEMP_PREFIX)
                })
                .count();
            assert!(temps <= 1);
        }
    }

    #[cfg(feature = "libflate")]
    #[test]
    fn gzip_finalization_roundtrips() {
        let dir = tempdir();
        let mut opts = options();
        opts.use_gzip = true;
        let mut output = RotatingFileOutput::new(test_logger(), dir.path(), opts).unwrap();
        assert!(output.initialize());
        output.write_entry(b"alpha\n").unwrap();
        output.write_entry(b"beta\n").unwrap();
        let path = final_files(dir.path()).pop().unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with(".ckmon"));

        let mut decoder = libflate::gzip::Decoder::new(File::open(path).unwrap()).unwrap();
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, "alpha\nbeta\n");
    }

    #[test]
    fn timed_mode_uses_one_folder_per_activation() {
        let dir = tempdir();
        let mut opts = options();
        opts.timed_folders = true;
        let mut output = RotatingFileOutput::new(test_logger(), dir.path(), opts).unwrap();
        assert!(output.initialize());
        let base1 = output.base_path().unwrap().to_path_buf();
        assert!(!base1.exists());
        output.write_entry(b"1\n").unwrap();
        assert!(base1.exists());
        // Re-initialization without deactivation keeps the folder.
        assert!(output.initialize());
        assert_eq!(output.base_path().unwrap(), base1.as_path());

        output.deactivate();
        assert!(output.base_path().is_none());
        assert!(output.initialize());
        let base2 = output.base_path().unwrap().to_path_buf();
        assert_ne!(base1, base2);
        assert_eq!(output.root_path().unwrap(), dir.path());
    }

    #[test]
    fn reconfigure_closes_on_suffix_change_and_shrink() {
        let dir = tempdir();
        let mut opts = options();
        opts.max_count_per_file = 10;
        let mut output = RotatingFileOutput::new(test_logger(), dir.path(), opts).unwrap();
        assert!(output.initialize());
        output.write_entry(b"a\n").unwrap();
        output.write_entry(b"b\n").unwrap();

        let mut r = Reconfigure::default();
        r.max_count_per_file = Some(5);
        output.reconfigure(r).unwrap();
        // 2 written, new cap 5: no close.
        assert_eq!(final_files(dir.path()).len(), 0);
        assert_eq!(output.entries_in_current_file(), 2);

        let mut r = Reconfigure::default();
        r.max_count_per_file = Some(1);
        output.reconfigure(r).unwrap();
        assert_eq!(final_files(dir.path()).len(), 1);

        output.write_entry(b"c\n").unwrap();
        assert_eq!(final_files(dir.path()).len(), 2);

        let mut r = Reconfigure::default();
        r.max_count_per_file = Some(5);
        output.reconfigure(r).unwrap();
        output.write_entry(b"d\n").unwrap();
        assert_eq!(output.entries_in_current_file(), 1);
        let mut r = Reconfigure::default();
        r.file_name_suffix = Some(".txt".to_owned());
        output.reconfigure(r).unwrap();
        // The suffix change closed and finalized the open file.
        assert_eq!(output.entries_in_current_file(), 0);
        assert_eq!(final_files(dir.path()).len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn last_run_symlink_tracks_the_newest_file_and_latches_off() {
        let dir = tempdir();
        let mut opts = options();
        opts.max_count_per_file = 1;
        opts.last_run_file_name = Some("LastRun.log".to_owned());
        let mut output = RotatingFileOutput::new(test_logger(), dir.path(), opts).unwrap();
        assert!(output.initialize());

        output.write_entry(b"first\n").unwrap();
        let link = dir.path().join("LastRun.log");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&link).unwrap(), "first\n");

        output.write_entry(b"second\n").unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "second\n");

        // Once the privilege latch is set, no further link is attempted.
        symlink_latch().store(true, Ordering::SeqCst);
        output.write_entry(b"third\n").unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "second\n");
        symlink_latch().store(false, Ordering::SeqCst);
    }

    fn tempdir() -> TempDir {
        TempDirBuilder::new()
            .prefix("logmux_test")
            .tempdir()
            .expect("Cannot create a temporary directory")
    }
}
