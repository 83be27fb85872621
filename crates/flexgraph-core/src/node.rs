//! # Node Model
//!
//! The tagged union of graph node kinds, plus everything derived from a
//! kind: ports, default titles, id prefixes and the canonical affine matrix.
//!
//! Ports are never stored. `NodeKind::ports` is a pure function of the
//! variant, so a Composite's or Distributor's port-descriptor list is the
//! only port state that exists.

use crate::ids::Namespace;
use crate::primitives::{DEFAULT_VIRTUAL_HEIGHT, DEFAULT_VIRTUAL_WIDTH};
use crate::{ContentId, FlexError, NodeId, PaletteId, Point, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// PIXEL FORMATS
// =============================================================================

/// Pixel encodings understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum PixelFormat {
    #[default]
    #[serde(rename = "RGBA8_Straight")]
    Rgba8Straight,
    #[serde(rename = "RGB888")]
    Rgb888,
    #[serde(rename = "BGR888")]
    Bgr888,
    #[serde(rename = "RGB565_LE")]
    Rgb565Le,
    #[serde(rename = "RGB565_BE")]
    Rgb565Be,
    #[serde(rename = "RGB332")]
    Rgb332,
    #[serde(rename = "Grayscale8")]
    Grayscale8,
    #[serde(rename = "Grayscale4_MSB")]
    Grayscale4Msb,
    #[serde(rename = "Grayscale4_LSB")]
    Grayscale4Lsb,
    #[serde(rename = "Grayscale2_MSB")]
    Grayscale2Msb,
    #[serde(rename = "Grayscale2_LSB")]
    Grayscale2Lsb,
    #[serde(rename = "Grayscale1_MSB")]
    Grayscale1Msb,
    #[serde(rename = "Grayscale1_LSB")]
    Grayscale1Lsb,
    #[serde(rename = "Alpha8")]
    Alpha8,
    #[serde(rename = "Index8")]
    Index8,
    #[serde(rename = "Index4_MSB")]
    Index4Msb,
    #[serde(rename = "Index4_LSB")]
    Index4Lsb,
    #[serde(rename = "Index2_MSB")]
    Index2Msb,
    #[serde(rename = "Index2_LSB")]
    Index2Lsb,
    #[serde(rename = "Index1_MSB")]
    Index1Msb,
    #[serde(rename = "Index1_LSB")]
    Index1Lsb,
}

impl PixelFormat {
    /// Every format, in menu order.
    pub const ALL: [PixelFormat; 21] = [
        PixelFormat::Rgba8Straight,
        PixelFormat::Rgb888,
        PixelFormat::Bgr888,
        PixelFormat::Rgb565Le,
        PixelFormat::Rgb565Be,
        PixelFormat::Rgb332,
        PixelFormat::Grayscale8,
        PixelFormat::Grayscale4Msb,
        PixelFormat::Grayscale4Lsb,
        PixelFormat::Grayscale2Msb,
        PixelFormat::Grayscale2Lsb,
        PixelFormat::Grayscale1Msb,
        PixelFormat::Grayscale1Lsb,
        PixelFormat::Alpha8,
        PixelFormat::Index8,
        PixelFormat::Index4Msb,
        PixelFormat::Index4Lsb,
        PixelFormat::Index2Msb,
        PixelFormat::Index2Lsb,
        PixelFormat::Index1Msb,
        PixelFormat::Index1Lsb,
    ];

    /// Engine-facing name (`RGBA8_Straight`, `Index4_MSB`, ...).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgba8Straight => "RGBA8_Straight",
            Self::Rgb888 => "RGB888",
            Self::Bgr888 => "BGR888",
            Self::Rgb565Le => "RGB565_LE",
            Self::Rgb565Be => "RGB565_BE",
            Self::Rgb332 => "RGB332",
            Self::Grayscale8 => "Grayscale8",
            Self::Grayscale4Msb => "Grayscale4_MSB",
            Self::Grayscale4Lsb => "Grayscale4_LSB",
            Self::Grayscale2Msb => "Grayscale2_MSB",
            Self::Grayscale2Lsb => "Grayscale2_LSB",
            Self::Grayscale1Msb => "Grayscale1_MSB",
            Self::Grayscale1Lsb => "Grayscale1_LSB",
            Self::Alpha8 => "Alpha8",
            Self::Index8 => "Index8",
            Self::Index4Msb => "Index4_MSB",
            Self::Index4Lsb => "Index4_LSB",
            Self::Index2Msb => "Index2_MSB",
            Self::Index2Lsb => "Index2_LSB",
            Self::Index1Msb => "Index1_MSB",
            Self::Index1Lsb => "Index1_LSB",
        }
    }

    #[must_use]
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8Straight => 32,
            Self::Rgb888 | Self::Bgr888 => 24,
            Self::Rgb565Le | Self::Rgb565Be => 16,
            Self::Rgb332 | Self::Grayscale8 | Self::Alpha8 | Self::Index8 => 8,
            Self::Grayscale4Msb | Self::Grayscale4Lsb | Self::Index4Msb | Self::Index4Lsb => 4,
            Self::Grayscale2Msb | Self::Grayscale2Lsb | Self::Index2Msb | Self::Index2Lsb => 2,
            Self::Grayscale1Msb | Self::Grayscale1Lsb | Self::Index1Msb | Self::Index1Lsb => 1,
        }
    }

    /// Palette-indexed formats.
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        matches!(
            self,
            Self::Index8
                | Self::Index4Msb
                | Self::Index4Lsb
                | Self::Index2Msb
                | Self::Index2Lsb
                | Self::Index1Msb
                | Self::Index1Lsb
        )
    }

    /// Formats whose native bytes can be re-stored one byte per pixel.
    #[must_use]
    pub const fn is_byte_per_pixel(self) -> bool {
        matches!(
            self,
            Self::Index8 | Self::Alpha8 | Self::Grayscale8 | Self::Rgb332
        )
    }

    /// Formats a Sink may not write.
    #[must_use]
    pub const fn sink_disabled(self) -> bool {
        self.is_indexed()
    }

    #[must_use]
    pub fn is_default(self) -> bool {
        self == Self::default()
    }

    /// Byte length of a tightly packed `width` x `height` buffer in this format.
    #[must_use]
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        let row_bits = u64::from(width) * u64::from(self.bits_per_pixel());
        let row_bytes = row_bits.div_ceil(8);
        (row_bytes * u64::from(height)) as usize
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = FlexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FlexError::UnknownPixelFormat(s.to_string()))
    }
}

// =============================================================================
// FILTERS
// =============================================================================

/// Single-input filters the engine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Grayscale,
    Brightness,
    Alpha,
    HorizontalBlur,
    VerticalBlur,
}

impl FilterKind {
    pub const ALL: [FilterKind; 5] = [
        FilterKind::Grayscale,
        FilterKind::Brightness,
        FilterKind::Alpha,
        FilterKind::HorizontalBlur,
        FilterKind::VerticalBlur,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Brightness => "brightness",
            Self::Alpha => "alpha",
            Self::HorizontalBlur => "horizontalBlur",
            Self::VerticalBlur => "verticalBlur",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Grayscale => "Grayscale",
            Self::Brightness => "Brightness",
            Self::Alpha => "Alpha",
            Self::HorizontalBlur => "Horizontal Blur",
            Self::VerticalBlur => "Vertical Blur",
        }
    }

    /// Declared parameters in engine (positional) order, with defaults.
    #[must_use]
    pub const fn params(self) -> &'static [(&'static str, f64)] {
        match self {
            Self::Grayscale => &[],
            Self::Brightness => &[("brightness", 0.0)],
            Self::Alpha => &[("alpha", 1.0)],
            Self::HorizontalBlur | Self::VerticalBlur => &[("radius", 5.0), ("passes", 1.0)],
        }
    }

    /// Parameter map holding every declared default.
    #[must_use]
    pub fn default_params(self) -> BTreeMap<String, f64> {
        self.params()
            .iter()
            .map(|&(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Flatten a named map into declared order. Missing names take their
    /// default; undeclared names are ignored.
    #[must_use]
    pub fn flatten(self, values: &BTreeMap<String, f64>) -> Vec<f64> {
        self.params()
            .iter()
            .map(|&(name, default)| values.get(name).copied().unwrap_or(default))
            .collect()
    }
}

impl FromStr for FilterKind {
    type Err = FlexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FlexError::UnknownFilter(s.to_string()))
    }
}

// =============================================================================
// AFFINE TRANSFORMS
// =============================================================================

/// A 2x3 affine matrix in engine layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineMatrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineMatrix {
    pub const IDENTITY: AffineMatrix = AffineMatrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Component-wise comparison within `eps`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        (self.a - other.a).abs() <= eps
            && (self.b - other.b).abs() <= eps
            && (self.c - other.c).abs() <= eps
            && (self.d - other.d).abs() <= eps
            && (self.tx - other.tx).abs() <= eps
            && (self.ty - other.ty).abs() <= eps
    }
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// How a transform was authored. Both modes reduce to one matrix through
/// [`AffineTransform::to_matrix`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AffineTransform {
    Parametric {
        tx: f64,
        ty: f64,
        rotation_deg: f64,
        sx: f64,
        sy: f64,
    },
    Matrix {
        a: f64,
        b: f64,
        c: f64,
        d: f64,
        tx: f64,
        ty: f64,
    },
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform::Parametric {
        tx: 0.0,
        ty: 0.0,
        rotation_deg: 0.0,
        sx: 1.0,
        sy: 1.0,
    };

    /// The canonical matrix for this transform.
    #[must_use]
    pub fn to_matrix(&self) -> AffineMatrix {
        match *self {
            Self::Parametric {
                tx,
                ty,
                rotation_deg,
                sx,
                sy,
            } => {
                let (sin, cos) = rotation_deg.to_radians().sin_cos();
                AffineMatrix {
                    a: cos * sx,
                    b: -sin * sy,
                    c: sin * sx,
                    d: cos * sy,
                    tx,
                    ty,
                }
            }
            Self::Matrix { a, b, c, d, tx, ty } => AffineMatrix { a, b, c, d, tx, ty },
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.to_matrix().is_identity()
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// =============================================================================
// PORTS
// =============================================================================

/// A derived connection point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub id: PortId,
    pub label: String,
}

impl Port {
    fn new(id: &str, label: &str) -> Self {
        Self {
            id: PortId::new(id),
            label: label.to_string(),
        }
    }
}

/// Input and output ports of one node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ports {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Ports {
    #[must_use]
    pub fn has_input(&self, port: &PortId) -> bool {
        self.inputs.iter().any(|p| &p.id == port)
    }

    #[must_use]
    pub fn has_output(&self, port: &PortId) -> bool {
        self.outputs.iter().any(|p| &p.id == port)
    }
}

fn single_in() -> Vec<Port> {
    vec![Port::new("in", "In")]
}

fn single_out() -> Vec<Port> {
    vec![Port::new("out", "Out")]
}

/// Next id in a growable port list (`in3` after two inputs).
fn next_port_id(prefix: &str, existing: &[PortId]) -> PortId {
    let mut n = existing.len() + 1;
    loop {
        let candidate = PortId::new(format!("{prefix}{n}"));
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

// =============================================================================
// NODE KINDS
// =============================================================================

/// Kind-specific node data. Each variant carries exactly its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodeKind {
    Source {
        content: ContentId,
        pivot: Point,
        #[serde(default)]
        format: PixelFormat,
        #[serde(default)]
        palette: Option<PaletteId>,
        #[serde(default)]
        bilinear: bool,
        #[serde(default)]
        placement: AffineTransform,
    },
    Filter {
        filter: FilterKind,
        #[serde(default)]
        params: BTreeMap<String, f64>,
    },
    Composite {
        inputs: Vec<PortId>,
        #[serde(default)]
        placement: AffineTransform,
    },
    Matte,
    Distributor {
        outputs: Vec<PortId>,
        #[serde(default)]
        placement: AffineTransform,
    },
    Affine {
        #[serde(default)]
        transform: AffineTransform,
    },
    NinePatch {
        content: ContentId,
        output_width: u32,
        output_height: u32,
        pivot: Point,
        #[serde(default)]
        bilinear: bool,
        #[serde(default)]
        placement: AffineTransform,
    },
    Renderer {
        virtual_width: u32,
        virtual_height: u32,
        pivot: Point,
        #[serde(default)]
        tile_width: u32,
        #[serde(default)]
        tile_height: u32,
        #[serde(default)]
        debug_checkerboard: bool,
    },
    Sink {
        content: ContentId,
        pivot: Point,
        #[serde(default)]
        format: PixelFormat,
        #[serde(default)]
        placement: AffineTransform,
    },
}

impl NodeKind {
    /// A Source showing a `width` x `height` image, pivoted at its centre.
    #[must_use]
    pub fn source(content: ContentId, width: u32, height: u32) -> Self {
        Self::Source {
            content,
            pivot: Point::center_of(width, height),
            format: PixelFormat::default(),
            palette: None,
            bilinear: false,
            placement: AffineTransform::IDENTITY,
        }
    }

    #[must_use]
    pub fn filter(filter: FilterKind) -> Self {
        Self::Filter {
            filter,
            params: filter.default_params(),
        }
    }

    #[must_use]
    pub fn composite() -> Self {
        Self::Composite {
            inputs: vec![PortId::new("in1"), PortId::new("in2")],
            placement: AffineTransform::IDENTITY,
        }
    }

    #[must_use]
    pub fn distributor() -> Self {
        Self::Distributor {
            outputs: vec![PortId::new("out1"), PortId::new("out2")],
            placement: AffineTransform::IDENTITY,
        }
    }

    #[must_use]
    pub fn affine() -> Self {
        Self::Affine {
            transform: AffineTransform::IDENTITY,
        }
    }

    /// A NinePatch over a `width` x `height` image. The outer one-pixel
    /// border holds the stretch markers, so the default output is 2 smaller.
    #[must_use]
    pub fn nine_patch(content: ContentId, width: u32, height: u32) -> Self {
        let output_width = width.saturating_sub(2).max(1);
        let output_height = height.saturating_sub(2).max(1);
        Self::NinePatch {
            content,
            output_width,
            output_height,
            pivot: Point::center_of(output_width, output_height),
            bilinear: false,
            placement: AffineTransform::IDENTITY,
        }
    }

    #[must_use]
    pub fn renderer() -> Self {
        Self::renderer_sized(DEFAULT_VIRTUAL_WIDTH, DEFAULT_VIRTUAL_HEIGHT)
    }

    #[must_use]
    pub fn renderer_sized(virtual_width: u32, virtual_height: u32) -> Self {
        Self::Renderer {
            virtual_width,
            virtual_height,
            pivot: Point::center_of(virtual_width, virtual_height),
            tile_width: 0,
            tile_height: 0,
            debug_checkerboard: false,
        }
    }

    /// A Sink writing a `width` x `height` Output, pivoted at its centre.
    #[must_use]
    pub fn sink(content: ContentId, width: u32, height: u32) -> Self {
        Self::Sink {
            content,
            pivot: Point::center_of(width, height),
            format: PixelFormat::default(),
            placement: AffineTransform::IDENTITY,
        }
    }

    /// Parse a kind name into a content-free node kind.
    ///
    /// Kinds that reference content (source, ninepatch, sink) and the
    /// renderer are created through the session instead.
    pub fn parse_standalone(name: &str) -> Result<Self, FlexError> {
        match name {
            "composite" => Ok(Self::composite()),
            "matte" => Ok(Self::Matte),
            "distributor" => Ok(Self::distributor()),
            "affine" => Ok(Self::affine()),
            other => FilterKind::from_str(other)
                .map(Self::filter)
                .map_err(|_| FlexError::UnknownNodeKind(other.to_string())),
        }
    }

    /// Serialized tag of the variant.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Filter { .. } => "filter",
            Self::Composite { .. } => "composite",
            Self::Matte => "matte",
            Self::Distributor { .. } => "distributor",
            Self::Affine { .. } => "affine",
            Self::NinePatch { .. } => "ninePatch",
            Self::Renderer { .. } => "renderer",
            Self::Sink { .. } => "sink",
        }
    }

    /// Allocator namespace and id prefix, or `None` for the Renderer.
    #[must_use]
    pub const fn id_scheme(&self) -> Option<(Namespace, &'static str)> {
        match self {
            Self::Source { .. } => Some((Namespace::SourceNode, "image-node")),
            Self::Filter { .. } => Some((Namespace::FilterNode, "independent-filter")),
            Self::Composite { .. } => Some((Namespace::CompositeNode, "composite")),
            Self::Matte => Some((Namespace::MatteNode, "matte")),
            Self::Distributor { .. } => Some((Namespace::DistributorNode, "distributor")),
            Self::Affine { .. } => Some((Namespace::AffineNode, "affine")),
            Self::NinePatch { .. } => Some((Namespace::NinePatchNode, "ninepatch")),
            Self::Sink { .. } => Some((Namespace::SinkNode, "sink")),
            Self::Renderer { .. } => None,
        }
    }

    /// Title shown for a fresh node of this kind.
    #[must_use]
    pub fn default_title(&self) -> String {
        match self {
            Self::Filter { filter, .. } => filter.display_name().to_string(),
            Self::Source { .. } => "Image".to_string(),
            Self::Composite { .. } => "Composite".to_string(),
            Self::Matte => "Matte".to_string(),
            Self::Distributor { .. } => "Distributor".to_string(),
            Self::Affine { .. } => "Affine Transform".to_string(),
            Self::NinePatch { .. } => "9-Patch".to_string(),
            Self::Renderer { .. } => "Renderer".to_string(),
            Self::Sink { .. } => "Sink".to_string(),
        }
    }

    /// Content library entry this node reads or writes.
    #[must_use]
    pub fn content_ref(&self) -> Option<&ContentId> {
        match self {
            Self::Source { content, .. }
            | Self::NinePatch { content, .. }
            | Self::Sink { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Nodes that auto-wire into the Renderer input when added.
    #[must_use]
    pub const fn is_source_capable(&self) -> bool {
        matches!(self, Self::Source { .. } | Self::NinePatch { .. })
    }

    #[must_use]
    pub const fn is_renderer(&self) -> bool {
        matches!(self, Self::Renderer { .. })
    }

    #[must_use]
    pub const fn is_sink(&self) -> bool {
        matches!(self, Self::Sink { .. })
    }

    /// Derive the ports of this node.
    #[must_use]
    pub fn ports(&self) -> Ports {
        match self {
            Self::Source { .. } | Self::NinePatch { .. } => Ports {
                inputs: Vec::new(),
                outputs: single_out(),
            },
            Self::Filter { .. } | Self::Affine { .. } | Self::Renderer { .. } => Ports {
                inputs: single_in(),
                outputs: single_out(),
            },
            Self::Composite { inputs, .. } => Ports {
                inputs: inputs
                    .iter()
                    .map(|id| Port {
                        id: id.clone(),
                        label: id.as_str().to_string(),
                    })
                    .collect(),
                outputs: single_out(),
            },
            Self::Matte => Ports {
                inputs: vec![
                    Port::new("in1", "Foreground"),
                    Port::new("in2", "Background"),
                    Port::new("in3", "Mask"),
                ],
                outputs: single_out(),
            },
            Self::Distributor { outputs, .. } => Ports {
                inputs: single_in(),
                outputs: outputs
                    .iter()
                    .map(|id| Port {
                        id: id.clone(),
                        label: id.as_str().to_string(),
                    })
                    .collect(),
            },
            Self::Sink { .. } => Ports {
                inputs: single_in(),
                outputs: Vec::new(),
            },
        }
    }

    /// Append a port to a growable list. Existing ports keep their ids.
    pub(crate) fn grow_port(&mut self) -> Option<PortId> {
        match self {
            Self::Composite { inputs, .. } => {
                let id = next_port_id("in", inputs);
                inputs.push(id.clone());
                Some(id)
            }
            Self::Distributor { outputs, .. } => {
                let id = next_port_id("out", outputs);
                outputs.push(id.clone());
                Some(id)
            }
            _ => None,
        }
    }
}

// =============================================================================
// GRAPH NODE
// =============================================================================

/// A node in the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub title: String,
    pub position: Point,
    pub kind: NodeKind,
}

impl GraphNode {
    #[must_use]
    pub fn new(id: NodeId, title: impl Into<String>, position: Point, kind: NodeKind) -> Self {
        Self {
            id,
            title: title.into(),
            position,
            kind,
        }
    }

    #[must_use]
    pub fn ports(&self) -> Ports {
        self.kind.ports()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parametric_and_matrix_agree() {
        let parametric = AffineTransform::Parametric {
            tx: 10.0,
            ty: -4.0,
            rotation_deg: 90.0,
            sx: 2.0,
            sy: 3.0,
        };
        let matrix = AffineTransform::Matrix {
            a: 0.0,
            b: -3.0,
            c: 2.0,
            d: 0.0,
            tx: 10.0,
            ty: -4.0,
        };
        assert!(parametric.to_matrix().approx_eq(&matrix.to_matrix(), 1e-9));
    }

    #[test]
    fn identity_transform_is_identity_matrix() {
        assert!(AffineTransform::IDENTITY.is_identity());
        assert!(AffineTransform::default().to_matrix().is_identity());
    }

    #[test]
    fn filter_flatten_uses_declared_order_and_defaults() {
        let mut params = BTreeMap::new();
        params.insert("passes".to_string(), 3.0);
        params.insert("unrelated".to_string(), 9.0);
        assert_eq!(FilterKind::HorizontalBlur.flatten(&params), vec![5.0, 3.0]);
        assert!(FilterKind::Grayscale.flatten(&params).is_empty());
        assert_eq!(FilterKind::Alpha.flatten(&BTreeMap::new()), vec![1.0]);
    }

    #[test]
    fn pixel_format_names_round_trip() {
        for format in PixelFormat::ALL {
            assert_eq!(format.name().parse::<PixelFormat>().expect("parse"), format);
            let json = serde_json::to_string(&format).expect("serialize");
            assert_eq!(json, format!("\"{}\"", format.name()));
        }
        assert!("RGBA9".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn pixel_format_traits() {
        assert!(PixelFormat::Index4Msb.is_indexed());
        assert!(PixelFormat::Index4Msb.sink_disabled());
        assert!(!PixelFormat::Grayscale8.sink_disabled());
        assert!(PixelFormat::Rgb332.is_byte_per_pixel());
        assert!(!PixelFormat::Rgb565Le.is_byte_per_pixel());
        assert_eq!(PixelFormat::Index1Lsb.buffer_len(9, 2), 4);
        assert_eq!(PixelFormat::Rgba8Straight.buffer_len(3, 2), 24);
    }

    #[test]
    fn matte_ports_are_labelled() {
        let ports = NodeKind::Matte.ports();
        let labels: Vec<_> = ports.inputs.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["Foreground", "Background", "Mask"]);
    }

    #[test]
    fn growing_never_renumbers() {
        let mut kind = NodeKind::composite();
        assert_eq!(kind.grow_port(), Some(PortId::new("in3")));
        let ids: Vec<_> = kind.ports().inputs.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, [PortId::new("in1"), PortId::new("in2"), PortId::new("in3")]);

        let mut dist = NodeKind::distributor();
        assert_eq!(dist.grow_port(), Some(PortId::new("out3")));
        let mut matte = NodeKind::Matte;
        assert_eq!(matte.grow_port(), None);
    }

    #[test]
    fn nine_patch_output_excludes_marker_border() {
        let NodeKind::NinePatch {
            output_width,
            output_height,
            ..
        } = NodeKind::nine_patch(ContentId::new("img-1"), 34, 18)
        else {
            unreachable!("constructor returns a nine-patch");
        };
        assert_eq!((output_width, output_height), (32, 16));
    }

    #[test]
    fn node_kind_serializes_with_type_tag() {
        let node = GraphNode::new(
            NodeId::new("sink-1"),
            "LCD",
            Point::new(1.0, 2.0),
            NodeKind::sink(ContentId::new("out-1"), 320, 240),
        );
        let json = serde_json::to_value(&node).expect("serialize");
        assert_eq!(json["kind"]["type"], "sink");
        assert_eq!(json["kind"]["content"], "out-1");
        let back: GraphNode = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, node);
    }

    #[test]
    fn parse_standalone_kinds() {
        assert!(matches!(
            NodeKind::parse_standalone("brightness"),
            Ok(NodeKind::Filter {
                filter: FilterKind::Brightness,
                ..
            })
        ));
        assert!(matches!(
            NodeKind::parse_standalone("bogus"),
            Err(FlexError::UnknownNodeKind(_))
        ));
    }
}
