//! # Primitives
//!
//! Hardcoded constants for the flexgraph core.
//!
//! These values are part of the persisted contract: changing the schema
//! version or the storage key orphans every saved state.

use std::time::Duration;

/// Schema version carried by every snapshot.
///
/// A snapshot with any other version is discarded whole; there is no
/// partial migration.
pub const STATE_VERSION: u32 = 4;

/// The single key the durable tier stores its snapshot under.
pub const STATE_STORAGE_KEY: &str = "imageTransformPreviewState";

/// Name of the page-address parameter carrying the shareable snapshot.
pub const SHARE_PARAM: &str = "state";

/// Quiescence window before a requested save is written.
pub const AUTO_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// One display frame for the evaluation throttle.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Id of the single Renderer node.
pub const RENDERER_NODE_ID: &str = "renderer";

// =============================================================================
// DEFAULT STATE
// =============================================================================

/// Default virtual screen width of the Renderer.
pub const DEFAULT_VIRTUAL_WIDTH: u32 = 1920;

/// Default virtual screen height of the Renderer.
pub const DEFAULT_VIRTUAL_HEIGHT: u32 = 1080;

/// Output buffers present in a fresh session: (name, width, height).
///
/// They take engine image ids 1 and 2; imported images start at 3.
pub const DEFAULT_OUTPUTS: [(&str, u32, u32); 2] =
    [("LCD 320x240", 320, 240), ("LCD 960x540", 960, 540)];

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Largest accepted width or height for content items.
pub const MAX_DIMENSION: u32 = 16384;

/// Largest accepted Renderer virtual screen side.
pub const MAX_VIRTUAL_DIMENSION: u32 = 4096;

/// Number of entries a palette table can hold.
pub const PALETTE_CAPACITY: usize = 256;

/// Bytes per RGBA8 pixel.
pub const RGBA_BYTES: usize = 4;
