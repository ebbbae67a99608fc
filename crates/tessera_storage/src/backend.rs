//! Byte store trait underneath the journal.

use crate::error::EngineResult;

/// An append-only byte store holding one database journal.
///
/// Backends do not interpret what they store; framing, checksums and
/// replay belong to the journal.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, appended bytes survive process termination
/// - `truncate` never grows the store
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `ReadPastEnd` if the range extends past the current size,
    /// or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>>;

    /// Appends data and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> EngineResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> EngineResult<()>;

    /// Returns the current size in bytes, which is where the next append lands.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> EngineResult<u64>;

    /// Flushes and makes data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> EngineResult<()>;

    /// Drops everything after `new_size`. Used to cut a torn journal tail.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if `new_size` is beyond the current size, or
    /// an I/O error.
    fn truncate(&mut self, new_size: u64) -> EngineResult<()>;
}
