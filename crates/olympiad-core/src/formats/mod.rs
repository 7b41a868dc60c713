//! # Formats
//!
//! Byte-level encodings owned by the engine. File I/O lives in the app.

pub mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, store_from_bytes, store_to_bytes,
};
