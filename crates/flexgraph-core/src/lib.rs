//! # flexgraph-core
//!
//! State and persistence core of the flexgraph node-based image
//! compositor - THE LOGIC.
//!
//! Users assemble a directed graph of processing nodes (sources, filters,
//! compositors, distributors, transforms, a renderer, output sinks). Pixel
//! work belongs to an external engine behind [`engine::Engine`]; this crate
//! owns everything around it:
//!
//! - the content library and graph store, with their invariants
//! - identifier bridging between node ids, content ids and engine ids
//! - the evaluation bridge that submits the graph and writes results back
//! - two-tier persistence (durable store and shareable parameter)
//!
//! ## Architectural Constraints
//!
//! - One [`Session`] per editor lifetime, constructed explicitly
//! - Single logical thread: mutations record requests, the driver schedules
//! - No async, no network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod bridge;
pub mod engine;
pub mod formats;
pub mod graph;
pub mod ids;
pub mod import;
pub mod library;
pub mod mutation;
pub mod node;
pub mod persistence;
pub mod primitives;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ContentId, EngineImageId, FlexError, NodeId, PaletteId, Point, PortId};

// =============================================================================
// RE-EXPORTS: Graph and Content
// =============================================================================

pub use graph::{Connection, Endpoint, Graph};
pub use ids::{IdAllocator, Namespace};
pub use library::{ContentItem, ContentKind, ContentLibrary, Palette, PalettePreset};
pub use mutation::Topology;
pub use node::{AffineMatrix, AffineTransform, FilterKind, GraphNode, NodeKind, PixelFormat};
pub use session::{CanvasSettings, Removal, Requests, Session, TileSettings};

// =============================================================================
// RE-EXPORTS: Evaluation
// =============================================================================

pub use bridge::{EvalOutcome, SinkTarget};
pub use engine::{Engine, EvalStatus, HeadlessEngine, PerfMetrics};
pub use scheduler::{Debouncer, FrameThrottle};

// =============================================================================
// RE-EXPORTS: Persistence (from formats, storage and persistence modules)
// =============================================================================

pub use formats::{PersistedState, decode_durable, decode_shareable, encode_durable, encode_shareable};
pub use import::{DecodedImage, ImportBatch, ImportReport};
pub use persistence::{PersistenceManager, RestoreReport, RestoreSource};
pub use storage::{DurableStore, MemoryStore, RedbStore};
