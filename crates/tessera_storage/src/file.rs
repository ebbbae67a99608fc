//! File backend for persistent journals.

use crate::backend::StorageBackend;
use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A backend over one journal file.
///
/// The file is locked exclusively for as long as the backend lives, so two
/// engines can never append to the same journal.
///
/// # Durability
///
/// - `flush()` hands buffered data to the OS
/// - `sync()` calls `File::sync_all()`
///
/// ```no_run
/// use tessera_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("contacts.tjournal")).unwrap();
/// backend.append(b"frame").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path` and locks it.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another backend holds the file, or an I/O error.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked);
        }

        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(EngineError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> EngineResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> EngineResult<()> {
        self.file.lock().flush()?;
        Ok(())
    }

    fn size(&self) -> EngineResult<u64> {
        Ok(self.size)
    }

    fn sync(&mut self) -> EngineResult<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> EngineResult<()> {
        if new_size > self.size {
            return Err(EngineError::invalid_state(format!(
                "cannot truncate {} bytes up to {new_size}",
                self.size
            )));
        }
        let file = self.file.lock();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&*self.file.lock());
    }
}
