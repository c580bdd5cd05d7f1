//! CSV-backed mailbox persistence
//!
//! The file is the source of truth. One pipe-delimited row per
//! (owner, record) pair:
//!
//! ```text
//! owner|id|sender|recipients|subject|body|timestamp
//! b@mail.com|4f1c...|a@mail.com|b@mail.com#c@mail.com|Hi|Line one\nLine two|2024-05-01T10:30
//! c@mail.com| | | | | |
//! ```
//!
//! A row whose id column is a single space is a sentinel: it keeps a user
//! with an empty mailbox alive across reloads.
//!
//! Every file access holds an exclusive advisory lock on `<path>.lock`, so
//! the server and the `exchange-user` tool never interleave writes, and the
//! file is never read while it is being rewritten.

use crate::codec::escape::split_unescaped;
use crate::codec::record::{encode_record, record_from_fields};
use crate::codec::FIELD_DELIMITER;
use crate::error::{ExchangeError, Result};
use crate::store::{normalize_address, MailRecord, Mailboxes};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const HEADER: &str = "owner|id|sender|recipients|subject|body|timestamp";

/// Columns per row: owner plus the six record fields
pub const ROW_FIELDS: usize = 7;

/// Id column value marking an empty-mailbox row
pub const SENTINEL_ID: &str = " ";

pub fn encode_row(owner: &str, record: &MailRecord) -> String {
    format!(
        "{}{}{}",
        normalize_address(owner),
        FIELD_DELIMITER,
        encode_record(record)
    )
}

pub fn sentinel_row(owner: &str) -> String {
    let mut row = normalize_address(owner);
    for _ in 1..ROW_FIELDS {
        row.push(FIELD_DELIMITER);
        row.push_str(SENTINEL_ID);
    }
    row
}

/// Owner and id columns of a row, if it has at least two columns
fn row_key(line: &str) -> Option<(String, &str)> {
    let fields = split_unescaped(line, FIELD_DELIMITER);
    if fields.len() < 2 {
        return None;
    }
    Some((normalize_address(fields[0]), fields[1]))
}

/// Exclusive lock on the sidecar lock file, released when dropped
struct FileLock {
    _file: std::fs::File,
}

impl FileLock {
    async fn acquire(path: PathBuf) -> Result<Self> {
        tokio::task::spawn_blocking(move || -> Result<Self> {
            let lock_error = |e: std::io::Error| {
                ExchangeError::Storage(format!("Error locking {}: {}", path.display(), e))
            };

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(lock_error)?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(lock_error)?;
            FileExt::lock_exclusive(&file).map_err(lock_error)?;
            Ok(Self { _file: file })
        })
        .await
        .map_err(|e| ExchangeError::Storage(format!("Lock task failed: {}", e)))?
    }
}

pub struct CsvStorage {
    path: PathBuf,
    /// Serializes callers in this process before they queue on the file lock
    lock: Mutex<()>,
}

impl CsvStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    /// Sidecar file every process locks before touching the storage file
    pub fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    async fn lock_file(&self) -> Result<FileLock> {
        FileLock::acquire(self.lock_path()).await
    }

    /// Parse the whole file into mailboxes
    ///
    /// A missing file or any malformed row fails the whole load.
    pub async fn load(&self) -> Result<Mailboxes> {
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_file().await?;

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            ExchangeError::Storage(format!(
                "Error reading storage file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let mailboxes = parse_rows(&content)?;
        info!(
            "Loaded {} users from {}",
            mailboxes.len(),
            self.path.display()
        );
        Ok(mailboxes)
    }

    /// Create the file with its header row; false if it already exists
    pub async fn init(&self) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_file().await?;
        self.ensure_file().await
    }

    async fn ensure_file(&self) -> Result<bool> {
        if fs::try_exists(&self.path).await? {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    ExchangeError::Storage(format!(
                        "Failed to create directory {:?}: {}",
                        parent, e
                    ))
                })?;
            }
        }
        fs::write(&self.path, format!("{}\n", HEADER)).await?;
        info!("Created storage file {}", self.path.display());
        Ok(true)
    }

    pub async fn append(&self, owner: &str, record: &MailRecord) -> Result<()> {
        self.append_all(&[(owner.to_string(), record.clone())]).await
    }

    /// Append rows in one write, without rewriting the file
    pub async fn append_all(&self, rows: &[(String, MailRecord)]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for (owner, record) in rows {
            buf.push_str(&encode_row(owner, record));
            buf.push('\n');
        }

        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_file().await?;
        self.ensure_file().await?;
        self.append_raw(&buf).await?;
        debug!("Appended {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }

    async fn append_raw(&self, buf: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Add a sentinel row for a new user; false if the user already has rows
    pub async fn register_user(&self, address: &str) -> Result<bool> {
        let address = normalize_address(address);
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_file().await?;
        self.ensure_file().await?;

        let content = fs::read_to_string(&self.path).await?;
        let known = content
            .lines()
            .filter_map(row_key)
            .any(|(owner, _)| owner == address);
        if known {
            return Ok(false);
        }

        self.append_raw(&format!("{}\n", sentinel_row(&address)))
            .await?;
        info!("Registered {} in {}", address, self.path.display());
        Ok(true)
    }

    /// Rewrite the file without the (owner, id) row
    ///
    /// Lines are streamed into `<path>.tmp`, which is synced and renamed
    /// over the storage file. Every row with that owner and id goes, so a
    /// duplicated row cannot come back on the next load. When the removed
    /// rows were the owner's last ones a sentinel row takes their place.
    /// Returns false, leaving the file untouched, if no row matched.
    pub async fn delete_row(&self, owner: &str, id: &str) -> Result<bool> {
        let owner = normalize_address(owner);
        let _guard = self.lock.lock().await;
        let _file_lock = self.lock_file().await?;

        let temp_path = self.temp_path();
        let input = File::open(&self.path).await.map_err(|e| {
            ExchangeError::Storage(format!(
                "Error opening storage file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let mut lines = BufReader::new(input).lines();
        let mut output = BufWriter::new(File::create(&temp_path).await?);

        let mut removed = false;
        let mut owner_rows = 0usize;

        while let Some(line) = lines.next_line().await? {
            if let Some((row_owner, row_id)) = row_key(&line) {
                if row_owner == owner {
                    if row_id == id {
                        removed = true;
                        continue;
                    }
                    owner_rows += 1;
                }
            }
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
        }

        if !removed {
            drop(output);
            if let Err(e) = fs::remove_file(&temp_path).await {
                warn!("Failed to remove {}: {}", temp_path.display(), e);
            }
            return Ok(false);
        }

        if owner_rows == 0 {
            output.write_all(sentinel_row(&owner).as_bytes()).await?;
            output.write_all(b"\n").await?;
        }

        output.flush().await?;
        output.get_ref().sync_all().await?;
        drop(output);

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            ExchangeError::Storage(format!(
                "Error replacing {} with {}: {}",
                self.path.display(),
                temp_path.display(),
                e
            ))
        })?;

        debug!("Removed row {} of {} from {}", id, owner, self.path.display());
        Ok(true)
    }
}

/// Parse file content into mailboxes
///
/// The first line is skipped when it is the header. Blank lines are ignored;
/// any other row with the wrong column count or an unparsable record aborts.
pub fn parse_rows(content: &str) -> Result<Mailboxes> {
    let mut mailboxes = Mailboxes::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        if index == 0 && line.trim() == HEADER {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_unescaped(line, FIELD_DELIMITER);
        if fields.len() != ROW_FIELDS {
            return Err(ExchangeError::Format {
                line: line_no,
                reason: format!("expected {} columns, found {}", ROW_FIELDS, fields.len()),
            });
        }

        let owner = normalize_address(fields[0]);
        if owner.is_empty() {
            return Err(ExchangeError::Format {
                line: line_no,
                reason: "empty owner column".to_string(),
            });
        }

        let mailbox = mailboxes.entry(owner).or_default();
        if fields[1] == SENTINEL_ID {
            continue;
        }

        let record = record_from_fields(&fields[1..]).map_err(|e| ExchangeError::Format {
            line: line_no,
            reason: e.to_string(),
        })?;
        mailbox.add(record);
    }

    Ok(mailboxes)
}
