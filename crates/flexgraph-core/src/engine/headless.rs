//! # Headless Engine
//!
//! An [`Engine`] that honours the full contract except pixel arithmetic.
//!
//! - Buffers are kept exactly as registered, tagged with their format.
//! - Evaluation detects cycles upstream of every Sink and fills each
//!   allocated destination with transparent pixels.
//! - Metrics count visited ops per kind and time each pass.

use super::{Engine, EngineOp, EvalStatus, KindMetrics, PerfMetrics, SinkPreview, Submission};
use crate::library::rgba_len;
use crate::node::PixelFormat;
use crate::{EngineImageId, FlexError, NodeId, Point};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

#[derive(Debug, Clone)]
struct StoredImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

/// Canvas configuration last pushed by the core.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub origin: Point,
    pub tile_width: u32,
    pub tile_height: u32,
    pub debug_checkerboard: bool,
}

/// In-process engine without pixel algorithms.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    images: BTreeMap<EngineImageId, StoredImage>,
    palettes: BTreeMap<EngineImageId, EngineImageId>,
    canvas: CanvasConfig,
    submission: Submission,
    sink_formats: BTreeMap<NodeId, PixelFormat>,
    metrics: PerfMetrics,
    evaluations: u64,
}

impl HeadlessEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn canvas(&self) -> CanvasConfig {
        self.canvas
    }

    /// Number of buffers currently registered.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn image_format(&self, id: EngineImageId) -> Option<PixelFormat> {
        self.images.get(&id).map(|img| img.format)
    }

    #[must_use]
    pub fn palette_of(&self, image: EngineImageId) -> Option<EngineImageId> {
        self.palettes.get(&image).copied()
    }

    #[must_use]
    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    /// Completed `evaluate` calls, successful or not.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    fn insert(&mut self, id: EngineImageId, image: StoredImage) {
        let bytes = image.data.len() as u64;
        if self.images.insert(id, image).is_some() {
            self.metrics.pool_hits += 1;
        } else {
            self.metrics.pool_misses += 1;
        }
        let total: u64 = self.images.values().map(|i| i.data.len() as u64).sum();
        self.metrics.peak_pool_bytes = self.metrics.peak_pool_bytes.max(total.max(bytes));
    }

    /// Nodes upstream of the Sinks, or `None` if a cycle is reachable.
    fn upstream_of_sinks(&self) -> Option<Vec<NodeId>> {
        let mut inbound: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
        for conn in &self.submission.connections {
            inbound.entry(&conn.to_node).or_default().push(&conn.from_node);
        }

        // 0 = unvisited, 1 = on stack, 2 = done
        let mut state: BTreeMap<&NodeId, u8> = BTreeMap::new();
        let mut order = Vec::new();
        let sinks = self
            .submission
            .nodes
            .iter()
            .filter(|n| matches!(n.op, EngineOp::Sink { .. }));

        for sink in sinks {
            let mut stack: Vec<(&NodeId, usize)> = vec![(&sink.id, 0)];
            if state.get(&sink.id).copied().unwrap_or(0) == 2 {
                continue;
            }
            state.insert(&sink.id, 1);
            while let Some((node, child)) = stack.pop() {
                let parents = inbound.get(node).map(Vec::as_slice).unwrap_or(&[]);
                if let Some(&next) = parents.get(child) {
                    stack.push((node, child + 1));
                    match state.get(next).copied().unwrap_or(0) {
                        0 => {
                            state.insert(next, 1);
                            stack.push((next, 0));
                        }
                        1 => return None,
                        _ => {}
                    }
                } else {
                    state.insert(node, 2);
                    order.push(node.clone());
                }
            }
        }
        Some(order)
    }
}

impl Engine for HeadlessEngine {
    fn set_canvas_size(&mut self, width: u32, height: u32) {
        self.canvas.width = width;
        self.canvas.height = height;
    }

    fn set_dst_origin(&mut self, origin: Point) {
        self.canvas.origin = origin;
    }

    fn set_tile_size(&mut self, width: u32, height: u32) {
        self.canvas.tile_width = width;
        self.canvas.tile_height = height;
    }

    fn set_debug_checkerboard(&mut self, enabled: bool) {
        self.canvas.debug_checkerboard = enabled;
    }

    fn store_image(
        &mut self,
        id: EngineImageId,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), FlexError> {
        let expected = rgba_len(width, height);
        if rgba.len() != expected {
            return Err(FlexError::InvalidPixelData {
                expected,
                actual: rgba.len(),
            });
        }
        self.insert(
            id,
            StoredImage {
                width,
                height,
                format: PixelFormat::Rgba8Straight,
                data: rgba.to_vec(),
            },
        );
        Ok(())
    }

    fn store_image_with_format(
        &mut self,
        id: EngineImageId,
        rgba: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), FlexError> {
        self.store_image(id, rgba, width, height)?;
        if format != PixelFormat::Rgba8Straight {
            self.metrics.conversions_from_rgba8 += 1;
            if let Some(img) = self.images.get_mut(&id) {
                img.format = format;
                img.data = vec![0; format.buffer_len(width, height)];
            }
        }
        Ok(())
    }

    fn store_native_image(
        &mut self,
        id: EngineImageId,
        data: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), FlexError> {
        let expected = format.buffer_len(width, height);
        if data.len() < expected {
            return Err(FlexError::InvalidPixelData {
                expected,
                actual: data.len(),
            });
        }
        self.insert(
            id,
            StoredImage {
                width,
                height,
                format,
                data: data[..expected].to_vec(),
            },
        );
        Ok(())
    }

    fn release_image(&mut self, id: EngineImageId) {
        self.images.remove(&id);
        self.palettes.remove(&id);
    }

    fn set_image_palette(
        &mut self,
        image: EngineImageId,
        palette: EngineImageId,
    ) -> Result<(), FlexError> {
        if !self.images.contains_key(&palette) {
            return Err(FlexError::EngineImageNotFound(palette));
        }
        self.palettes.insert(image, palette);
        Ok(())
    }

    fn clear_image_palette(&mut self, image: EngineImageId) {
        self.palettes.remove(&image);
    }

    fn image_as_rgba8(&self, id: EngineImageId) -> Option<Vec<u8>> {
        let img = self.images.get(&id)?;
        if img.format == PixelFormat::Rgba8Straight {
            Some(img.data.clone())
        } else {
            // No decoder here: the preview is transparent at the right size.
            Some(vec![0; rgba_len(img.width, img.height)])
        }
    }

    fn submit(&mut self, submission: &Submission) {
        self.submission = submission.clone();
    }

    fn allocate_image(&mut self, id: EngineImageId, width: u32, height: u32) {
        self.insert(
            id,
            StoredImage {
                width,
                height,
                format: PixelFormat::Rgba8Straight,
                data: vec![0; rgba_len(width, height)],
            },
        );
    }

    fn evaluate(&mut self) -> Result<EvalStatus, FlexError> {
        let started = Instant::now();
        self.evaluations += 1;
        let Some(order) = self.upstream_of_sinks() else {
            return Ok(EvalStatus::CycleDetected);
        };

        let mut per_kind: BTreeMap<String, KindMetrics> = BTreeMap::new();
        let visited: BTreeSet<&NodeId> = order.iter().collect();
        for node in self.submission.nodes.iter().filter(|n| visited.contains(&n.id)) {
            let entry = per_kind.entry(node.op.kind_name().to_string()).or_default();
            entry.count += 1;
            if let EngineOp::Sink {
                image,
                width,
                height,
                ..
            } = node.op
            {
                let pixels = u64::from(width) * u64::from(height);
                entry.requested_pixels += pixels;
                entry.used_pixels += pixels;
                entry.alloc_bytes += rgba_len(width, height) as u64;
                if let Some(buf) = self.images.get_mut(&image) {
                    buf.data.fill(0);
                }
            }
        }

        let elapsed = started.elapsed().as_micros() as u64;
        if let Some(sinks) = per_kind.get_mut("sink") {
            sinks.time_us = elapsed;
        }
        self.metrics.per_kind = per_kind;
        Ok(EvalStatus::Success)
    }

    fn image(&self, id: EngineImageId) -> Option<Vec<u8>> {
        self.images.get(&id).map(|img| img.data.clone())
    }

    fn set_sink_format(&mut self, sink: &NodeId, format: PixelFormat) {
        self.sink_formats.insert(sink.clone(), format);
    }

    fn sink_preview(&self, sink: &NodeId) -> Option<SinkPreview> {
        let node = self.submission.node(sink)?;
        let EngineOp::Sink {
            image,
            width,
            height,
            ..
        } = node.op
        else {
            return None;
        };
        self.images.get(&image)?;
        let format = self.sink_formats.get(sink).copied().unwrap_or_default();
        Some(SinkPreview {
            width,
            height,
            format,
            data: vec![0; format.buffer_len(width, height)],
        })
    }

    fn perf_metrics(&self) -> PerfMetrics {
        self.metrics.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================
