//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the flexgraph core:
//! - The three coupled identifier spaces (`NodeId`, `ContentId`, `EngineImageId`)
//!   plus `PaletteId` and `PortId`
//! - Geometry helpers (`Point`)
//! - Error types (`FlexError`)
//!
//! ## Identifier Spaces
//!
//! - UI node ids and content ids are strings (`image-node-3`, `img-7`, `out-1`).
//! - The external engine only understands dense integers (`EngineImageId`).
//! - All three are minted by the `IdAllocator` and never reused.

use crate::node::PixelFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// STRING IDENTIFIERS
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value.
            #[must_use]
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Numeric suffix after the last `-`, if any (`img-12` -> 12).
            #[must_use]
            pub fn numeric_suffix(&self) -> Option<u64> {
                trailing_number(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a node in the graph store (`renderer`, `composite-2`, ...).
    NodeId
);

string_id!(
    /// Identifier of a content library entry (`img-N` for images, `out-N` for outputs).
    ContentId
);

string_id!(
    /// Identifier of a palette library entry (`pal-N`).
    PaletteId
);

string_id!(
    /// Identifier of a port on a node (`in`, `out`, `in3`, `out2`).
    PortId
);

/// Parse the digits after the last `-` of an identifier.
fn trailing_number(s: &str) -> Option<u64> {
    let (_, digits) = s.rsplit_once('-')?;
    digits.parse().ok()
}

/// Dense numeric identifier the external engine uses for image buffers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct EngineImageId(pub u32);

impl EngineImageId {
    /// Get the raw numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Narrow an allocator counter to the engine's 32-bit id space.
    pub fn from_counter(counter: u64) -> Result<Self, FlexError> {
        u32::try_from(counter)
            .map(Self)
            .map_err(|_| FlexError::EngineIdExhausted(counter))
    }
}

impl fmt::Display for EngineImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// GEOMETRY
// =============================================================================

/// A 2D point in pixel or canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Centre of a `width` x `height` rectangle anchored at the origin.
    #[must_use]
    pub fn center_of(width: u32, height: u32) -> Self {
        Self::new(f64::from(width) / 2.0, f64::from(height) / 2.0)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the flexgraph core.
///
/// Validation variants are returned before any state is touched.
/// Engine and storage failures never escape the bridge or the persistence
/// manager; they are converted into reports there.
#[derive(Debug, Error)]
pub enum FlexError {
    /// A width/height pair was not a pair of positive integers in range.
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// A pixel buffer does not match the declared dimensions.
    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// The requested node was not found in the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The node exists but has no such port on the requested side.
    #[error("Port not found: {node}.{port}")]
    PortNotFound { node: NodeId, port: PortId },

    /// Endpoint text was not of the form `node.port`.
    #[error("Invalid endpoint '{0}', expected node.port")]
    InvalidEndpoint(String),

    /// The node cannot be removed (the Renderer).
    #[error("Node {0} cannot be removed")]
    ProtectedNode(NodeId),

    /// A second Renderer was requested.
    #[error("A renderer node already exists: {0}")]
    RendererExists(NodeId),

    /// The operation does not apply to this kind of node.
    #[error("Node {node} is not a {expected} node")]
    WrongNodeKind { node: NodeId, expected: &'static str },

    /// The requested content item was not found in the library.
    #[error("Content not found: {0}")]
    ContentNotFound(ContentId),

    /// The content item exists but is of the wrong kind.
    #[error("Content {id} is not an {expected} item")]
    WrongContentKind { id: ContentId, expected: &'static str },

    /// The engine holds no buffer under this id.
    #[error("Engine image not found: {0}")]
    EngineImageNotFound(EngineImageId),

    #[error("Engine image id {0} does not fit in 32 bits")]
    EngineIdExhausted(u64),

    /// No nine-patch image is available in the library.
    #[error("No nine-patch image in the content library")]
    NoNinePatchContent,

    /// A node kind that shows content was requested without naming it.
    #[error("A {0} node needs a content item")]
    MissingContent(String),

    /// The requested palette was not found.
    #[error("Palette not found: {0}")]
    PaletteNotFound(PaletteId),

    /// The filter type name is not known.
    #[error("Unknown filter type: {0}")]
    UnknownFilter(String),

    /// The filter has no parameter with this name.
    #[error("Filter {filter} has no parameter '{name}'")]
    UnknownParameter { filter: String, name: String },

    /// The node kind name is not known.
    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    /// The pixel format name is not known.
    #[error("Unknown pixel format: {0}")]
    UnknownPixelFormat(String),

    /// A Sink cannot write this pixel format.
    #[error("Pixel format {0} cannot be used as a sink output")]
    UnsupportedSinkFormat(PixelFormat),

    /// A snapshot carries a different schema version.
    #[error("Unsupported state version: {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An image file could not be decoded.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_suffix_parses_trailing_counter() {
        assert_eq!(ContentId::new("img-12").numeric_suffix(), Some(12));
        assert_eq!(NodeId::new("image-node-3").numeric_suffix(), Some(3));
        assert_eq!(NodeId::new("renderer").numeric_suffix(), None);
        assert_eq!(PaletteId::new("pal-x").numeric_suffix(), None);
    }

    #[test]
    fn engine_id_from_counter_rejects_overflow() {
        assert_eq!(EngineImageId::from_counter(7).expect("fits"), EngineImageId(7));
        assert_eq!(
            EngineImageId::from_counter(u64::from(u32::MAX)).expect("fits"),
            EngineImageId(u32::MAX)
        );
        let past = u64::from(u32::MAX) + 1;
        assert!(matches!(
            EngineImageId::from_counter(past),
            Err(FlexError::EngineIdExhausted(n)) if n == past
        ));
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&ContentId::new("out-1")).expect("serialize");
        assert_eq!(json, "\"out-1\"");
        let json = serde_json::to_string(&EngineImageId(7)).expect("serialize");
        assert_eq!(json, "7");
    }

    #[test]
    fn center_of_halves_dimensions() {
        assert_eq!(Point::center_of(320, 240), Point::new(160.0, 120.0));
    }
}
