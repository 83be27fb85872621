//! # Engine Contract
//!
//! The boundary to the external evaluation engine that performs all pixel
//! computation. The core never touches pixels itself; it registers buffers,
//! submits a translated graph and reads results back through [`Engine`].
//!
//! [`HeadlessEngine`] implements the contract without pixel algorithms. The
//! binary and the test suites run against it.

mod headless;

pub use headless::{CanvasConfig, HeadlessEngine};

use crate::graph::Connection;
use crate::node::{AffineMatrix, FilterKind, PixelFormat};
use crate::{EngineImageId, FlexError, NodeId, Point, PortId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// SUBMISSION
// =============================================================================

/// One node as the engine sees it: ids resolved, parameters flattened,
/// transforms reduced to matrices.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineOp {
    Source {
        image: EngineImageId,
        pivot: Point,
        matrix: AffineMatrix,
        bilinear: bool,
    },
    NinePatch {
        image: EngineImageId,
        output_width: u32,
        output_height: u32,
        pivot: Point,
        matrix: AffineMatrix,
        bilinear: bool,
    },
    Filter {
        filter: FilterKind,
        params: Vec<f64>,
    },
    Affine {
        matrix: AffineMatrix,
    },
    Composite {
        inputs: Vec<PortId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        matrix: Option<AffineMatrix>,
    },
    Matte,
    Distributor {
        outputs: Vec<PortId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        matrix: Option<AffineMatrix>,
    },
    Renderer {
        virtual_width: u32,
        virtual_height: u32,
        pivot: Point,
        tile_width: u32,
        tile_height: u32,
    },
    Sink {
        image: EngineImageId,
        width: u32,
        height: u32,
        pivot: Point,
        format: PixelFormat,
        matrix: AffineMatrix,
    },
}

impl EngineOp {
    /// Metrics bucket for this op.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::NinePatch { .. } => "ninePatch",
            Self::Filter { .. } => "filter",
            Self::Affine { .. } => "affine",
            Self::Composite { .. } => "composite",
            Self::Matte => "matte",
            Self::Distributor { .. } => "distributor",
            Self::Renderer { .. } => "renderer",
            Self::Sink { .. } => "sink",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub op: EngineOp,
}

/// The combined node + connection submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Submission {
    pub nodes: Vec<EngineNode>,
    pub connections: Vec<Connection>,
}

impl Submission {
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&EngineNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}

/// Result of an evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStatus {
    Success,
    CycleDetected,
}

// =============================================================================
// METRICS
// =============================================================================

/// Timing and allocation counters for one op kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindMetrics {
    pub count: u32,
    pub time_us: u64,
    pub requested_pixels: u64,
    pub used_pixels: u64,
    pub alloc_bytes: u64,
}

impl KindMetrics {
    /// Used / requested pixels, or 1.0 when nothing was requested.
    #[must_use]
    pub fn efficiency(&self) -> f64 {
        if self.requested_pixels == 0 {
            1.0
        } else {
            self.used_pixels as f64 / self.requested_pixels as f64
        }
    }
}

/// Performance snapshot of the last evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfMetrics {
    pub per_kind: BTreeMap<String, KindMetrics>,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub peak_pool_bytes: u64,
    pub conversions_to_rgba8: u64,
    pub conversions_from_rgba8: u64,
}

/// Lightweight preview of what a Sink wrote, in its output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkPreview {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

// =============================================================================
// ENGINE TRAIT
// =============================================================================

/// Operations the external engine exposes.
///
/// Fallible calls report `FlexError`; the bridge and the persistence
/// manager convert those into reports instead of propagating them.
pub trait Engine: fmt::Debug + Send {
    fn set_canvas_size(&mut self, width: u32, height: u32);
    fn set_dst_origin(&mut self, origin: Point);
    fn set_tile_size(&mut self, width: u32, height: u32);
    fn set_debug_checkerboard(&mut self, enabled: bool);

    /// Register an RGBA8 buffer under `id`, replacing any previous buffer.
    fn store_image(
        &mut self,
        id: EngineImageId,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), FlexError>;

    /// Register an RGBA8 buffer re-encoded into `format`.
    fn store_image_with_format(
        &mut self,
        id: EngineImageId,
        rgba: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), FlexError>;

    /// Register bytes already encoded in `format`.
    fn store_native_image(
        &mut self,
        id: EngineImageId,
        data: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), FlexError>;

    fn release_image(&mut self, id: EngineImageId);

    fn set_image_palette(
        &mut self,
        image: EngineImageId,
        palette: EngineImageId,
    ) -> Result<(), FlexError>;

    fn clear_image_palette(&mut self, image: EngineImageId);

    /// Decode a stored buffer to RGBA8 for preview.
    fn image_as_rgba8(&self, id: EngineImageId) -> Option<Vec<u8>>;

    fn submit(&mut self, submission: &Submission);

    /// Pre-allocate a destination buffer for a Sink.
    fn allocate_image(&mut self, id: EngineImageId, width: u32, height: u32);

    fn evaluate(&mut self) -> Result<EvalStatus, FlexError>;

    /// RGBA8 contents of a buffer after evaluation.
    fn image(&self, id: EngineImageId) -> Option<Vec<u8>>;

    fn set_sink_format(&mut self, sink: &NodeId, format: PixelFormat);

    fn sink_preview(&self, sink: &NodeId) -> Option<SinkPreview>;

    fn perf_metrics(&self) -> PerfMetrics;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficiency_defaults_to_one() {
        assert!((KindMetrics::default().efficiency() - 1.0).abs() < f64::EPSILON);
        let m = KindMetrics {
            requested_pixels: 200,
            used_pixels: 50,
            ..KindMetrics::default()
        };
        assert!((m.efficiency() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn engine_node_serializes_flat() {
        let node = EngineNode {
            id: NodeId::new("affine-1"),
            op: EngineOp::Affine {
                matrix: AffineMatrix::IDENTITY,
            },
        };
        let json = serde_json::to_value(&node).expect("serialize");
        assert_eq!(json["id"], "affine-1");
        assert_eq!(json["type"], "affine");
        assert_eq!(json["matrix"]["a"], 1.0);
    }
}
