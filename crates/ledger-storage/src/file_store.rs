use anyhow::{anyhow, bail, Context, Result};
use ledger_core::{Block, ChainStore};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Marks the start of every record in the ledger file.
pub const RECORD_DELIMITER: &str = "@_(**973)_(*~``@#'&^%$!#@|>?<";

/// Append-only text file: `<delimiter><block json>\n` per block.
///
/// `@` inside the JSON is always written as the escape `\u0040`, so no payload can
/// contain the delimiter.
pub struct FileStore {
    path: PathBuf,
    writer: Mutex<Writer>,
}

struct Writer {
    file: File,
    /// Set when a failed append could not be cut back off the file.
    poisoned: bool,
}

impl FileStore {
    /// Open (creating if needed) `<dir>/<identity>.bin`.
    pub fn open<P: AsRef<Path>>(dir: P, identity: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("{identity}.bin"));
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        info!(path = %path.display(), "file store opened");
        Ok(Self {
            path,
            writer: Mutex::new(Writer {
                file: writer,
                poisoned: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_text(&self) -> Result<String> {
        fs::read_to_string(&self.path).with_context(|| format!("reading {}", self.path.display()))
    }

    /// Append `record` through `write`. If `write` fails the file is cut back to its
    /// previous length, so no torn or uncounted record survives; if that cut fails
    /// too, every later append is refused.
    fn append_with<F>(&self, record: &[u8], write: F) -> Result<()>
    where
        F: FnOnce(&mut File, &[u8]) -> Result<()>,
    {
        let mut writer = self.writer.lock();
        if writer.poisoned {
            bail!(
                "{} has an unrecoverable partial record; refusing to append",
                self.path.display()
            );
        }
        let len = writer
            .file
            .metadata()
            .with_context(|| format!("inspecting {}", self.path.display()))?
            .len();
        if let Err(err) = write(&mut writer.file, record) {
            let cut = writer.file.set_len(len).and_then(|()| writer.file.sync_data());
            match cut {
                Ok(()) => warn!(path = %self.path.display(), len, "partial record rolled back"),
                Err(cut) => {
                    writer.poisoned = true;
                    error!(path = %self.path.display(), %cut, "could not roll back partial record");
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

fn write_record(file: &mut File, path: &Path, record: &[u8]) -> Result<()> {
    file.write_all(record)
        .with_context(|| format!("writing {}", path.display()))?;
    file.sync_data()
        .with_context(|| format!("syncing {}", path.display()))
}

pub fn encode_record(block: &Block) -> Result<String> {
    let json = serde_json::to_string(block)?;
    Ok(format!("{RECORD_DELIMITER}{}\n", json.replace('@', "\\u0040")))
}

fn decode_record(record: &str) -> Result<Block> {
    Ok(serde_json::from_str(record.trim_end())?)
}

/// Split a whole ledger file into blocks.
pub fn decode_records(text: &str) -> Result<Vec<Block>> {
    let mut parts = text.split(RECORD_DELIMITER);
    let head = parts.next().unwrap_or_default();
    if !head.trim().is_empty() {
        bail!("unexpected data before the first record");
    }
    parts
        .enumerate()
        .map(|(i, record)| decode_record(record).with_context(|| format!("malformed record #{}", i + 1)))
        .collect()
}

impl ChainStore for FileStore {
    fn append(&self, block: &Block) -> Result<()> {
        let record = encode_record(block)?;
        self.append_with(record.as_bytes(), |file, bytes| write_record(file, &self.path, bytes))?;
        debug!(number = block.number, bytes = record.len(), "record appended");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Block>> {
        decode_records(&self.read_text()?)
    }

    /// Parses only the trailing record.
    fn read_last(&self) -> Result<Option<Block>> {
        let text = self.read_text()?;
        match text.rfind(RECORD_DELIMITER) {
            Some(at) => decode_record(&text[at + RECORD_DELIMITER.len()..])
                .map(Some)
                .context("malformed trailing record"),
            None if text.trim().is_empty() => Ok(None),
            None => Err(anyhow!("ledger file has data but no record delimiter")),
        }
    }

    fn read_at(&self, number: u64) -> Result<Option<Block>> {
        if number == 0 {
            return Ok(None);
        }
        let text = self.read_text()?;
        text.split(RECORD_DELIMITER)
            .nth(number as usize)
            .map(|record| decode_record(record).with_context(|| format!("malformed record #{number}")))
            .transpose()
    }

    fn close(&self) -> Result<()> {
        self.writer
            .lock()
            .file
            .sync_all()
            .with_context(|| format!("syncing {}", self.path.display()))?;
        Ok(())
    }
}
