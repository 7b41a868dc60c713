//! # Snapshot Format
//!
//! Binary serialization for an in-memory stage store.
//!
//! Format: Header (5 bytes) + postcard-serialized tables.
//! - 4 bytes: Magic ("OLYM")
//! - 1 byte: Version
//!
//! Size and header are checked before the payload is decoded.

use crate::primitives;
use crate::storage::{MemoryStore, StageTables};
use crate::StageError;

/// Largest snapshot accepted by [`store_from_bytes`].
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 64 * 1024 * 1024; // 64 MB

const HEADER_LEN: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header that precedes every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), StageError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(StageError::Serialization(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(StageError::Serialization(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StageError> {
        if bytes.len() < HEADER_LEN {
            return Err(StageError::Serialization("Header too short".to_string()));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a store (header + payload). No file I/O.
pub fn store_to_bytes(store: &MemoryStore) -> Result<Vec<u8>, StageError> {
    let payload = postcard::to_stdvec(store.tables())
        .map_err(|e| StageError::Serialization(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&PersistenceHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Deserialize a store. No file I/O.
pub fn store_from_bytes(bytes: &[u8]) -> Result<MemoryStore, StageError> {
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(StageError::Serialization(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    let tables: StageTables = postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        StageError::Serialization(format!("Failed to deserialize stage tables: {}", e))
    })?;
    Ok(MemoryStore::from_tables(tables))
}

// =============================================================================
// TESTS
// =============================================================================
