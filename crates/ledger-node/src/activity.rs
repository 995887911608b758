use ledger_core::ActivityLog;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Human-readable activity log, one file per node identity.
///
/// Each entry is written as `As at <RFC 2822 time>` followed by the line itself.
/// The file is opened lazily on the first entry; write failures are reported
/// through tracing and never reach the caller.
pub struct FileActivityLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileActivityLog {
    pub fn new(log_dir: &Path, identity: &str) -> Self {
        Self {
            path: log_dir.join(format!("{identity}_client.log")),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    fn write_entry(&self, line: &str) -> io::Result<()> {
        let mut guard = self.file.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        if let Some(file) = guard.as_mut() {
            let stamp = chrono::Local::now().to_rfc2822();
            write!(file, "As at {stamp}\n{line}\n")?;
            file.flush()?;
        }
        Ok(())
    }
}

impl ActivityLog for FileActivityLog {
    fn record(&self, line: &str) {
        info!(target: "activity", "{line}");
        if let Err(err) = self.write_entry(line) {
            warn!(path = %self.path.display(), %err, "activity log write failed");
        }
    }
}
