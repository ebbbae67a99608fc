//! In-memory backend.

use crate::backend::StorageBackend;
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;

/// A backend that keeps the journal in a growable buffer.
///
/// Used by [`Engine::in_memory`](crate::Engine::in_memory): databases live
/// as long as the engine does.
///
/// ```rust
/// use tessera_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// assert_eq!(backend.append(b"frame").unwrap(), 0);
/// assert_eq!(backend.size().unwrap(), 5);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `bytes`, for replay tests.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    #[allow(clippy::cast_possible_truncation)]
    fn read_at(&self, offset: u64, len: usize) -> EngineResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(EngineError::ReadPastEnd { offset, len, size });
        }
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> EngineResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn size(&self) -> EngineResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> EngineResult<()> {
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn truncate(&mut self, new_size: u64) -> EngineResult<()> {
        let mut bytes = self.bytes.write();
        if new_size > bytes.len() as u64 {
            return Err(EngineError::invalid_state(format!(
                "cannot truncate {} bytes up to {new_size}",
                bytes.len()
            )));
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_running_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"abc").unwrap(), 0);
        assert_eq!(backend.append(b"de").unwrap(), 3);
        assert_eq!(backend.read_at(1, 3).unwrap(), b"bcd");
    }

    #[test]
    fn read_past_end_is_an_error() {
        let backend = InMemoryBackend::with_data(vec![1, 2, 3]);
        assert!(matches!(
            backend.read_at(2, 5),
            Err(EngineError::ReadPastEnd { size: 3, .. })
        ));
        assert!(backend.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn truncate_only_shrinks() {
        let mut backend = InMemoryBackend::with_data(b"hello".to_vec());
        backend.truncate(2).unwrap();
        assert_eq!(backend.data(), b"he");
        assert!(backend.truncate(10).is_err());
    }
}
