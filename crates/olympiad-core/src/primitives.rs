//! # Engine Primitives
//!
//! Hardcoded runtime constants for the stage engine.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Fewest participants for which a generator builds anything.
///
/// Below this, regeneration only tears down and leaves the stage empty.
pub const MIN_PARTICIPANTS: usize = 2;

/// A match holds at most this many participants.
pub const MAX_MATCH_PARTICIPANTS: usize = 2;

/// A bracket match is fed by at most this many earlier matches.
pub const MAX_FEEDERS: usize = 2;

/// Largest roster accepted by a single generation run.
///
/// A round-robin group of this size already produces ~2M matches; anything
/// beyond is rejected before the transaction opens.
pub const MAX_PARTICIPANTS: usize = 2048;

/// Rendered in place of a participant name for an empty bracket slot.
pub const UNFILLED_SLOT: &str = "?";

/// Rendered in place of a score line for a bracket match without a result.
pub const UNPLAYED_SCORE: &str = "- vs -";

/// Magic bytes for the Olympiad snapshot file header.
pub const MAGIC_BYTES: &[u8; 4] = b"OLYM";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;
