//! # Formats
//!
//! The persisted snapshot schema and its two text encodings.
//! Storage and I/O live in [`crate::storage`] and [`crate::persistence`].

mod codec;
mod snapshot;

pub use codec::{
    MAX_SNAPSHOT_SIZE, decode_durable, decode_shareable, encode_durable, encode_shareable,
    share_param_from, share_query,
};
pub use snapshot::{ContentRecord, NextIds, PaletteRecord, PersistedState};
