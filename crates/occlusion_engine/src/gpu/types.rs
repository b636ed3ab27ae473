//! Backend-neutral GPU handle and descriptor types

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use serde::{Serialize, Deserialize};

slotmap::new_key_type! {
    /// GPU buffer handle
    pub struct BufferHandle;
    /// GPU texture handle (render targets, depth targets, swap-chain images, sampled textures)
    pub struct TextureHandle;
    /// Query heap handle
    pub struct QueryHeapHandle;
    /// Pipeline state handle
    pub struct PipelineHandle;
    /// Fence handle
    pub struct FenceHandle;
}

/// Size in bytes of one resolved binary occlusion result
pub const OCCLUSION_RESULT_SIZE: u64 = 8;

/// Any resource that can be transitioned or named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// A buffer
    Buffer(BufferHandle),
    /// A texture
    Texture(TextureHandle),
}

impl From<BufferHandle> for ResourceId {
    fn from(handle: BufferHandle) -> Self {
        Self::Buffer(handle)
    }
}

impl From<TextureHandle> for ResourceId {
    fn from(handle: TextureHandle) -> Self {
        Self::Texture(handle)
    }
}

/// Hardware queue families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    /// Graphics, compute and copy work
    Direct,
    /// Compute and copy work
    Compute,
    /// Copy work only
    Copy,
}

impl QueueType {
    /// Every queue type, in index order
    pub const ALL: [Self; 3] = [Self::Direct, Self::Compute, Self::Copy];

    /// Dense index for per-queue tables
    pub const fn index(self) -> usize {
        match self {
            Self::Direct => 0,
            Self::Compute => 1,
            Self::Copy => 2,
        }
    }
}

/// Resource usage state tracked by barriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Initial state for most resources
    Common,
    /// CPU-writable upload memory
    GenericRead,
    /// Bound as vertex or constant buffer
    VertexAndConstantBuffer,
    /// Bound as index buffer
    IndexBuffer,
    /// Bound as color attachment
    RenderTarget,
    /// Bound as depth attachment
    DepthWrite,
    /// Read by shaders
    ShaderResource,
    /// Destination of a copy or query resolve
    CopyDest,
    /// Source of a copy
    CopySource,
    /// Read by the predication unit
    Predication,
    /// Ready to present
    Present,
}

/// Primitive topology for draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    /// One primitive per vertex
    PointList,
    /// Three vertices per primitive
    TriangleList,
}

impl PrimitiveTopology {
    /// Primitives produced by a vertex count
    pub const fn primitive_count(self, vertices: u32) -> u64 {
        match self {
            Self::PointList => vertices as u64,
            Self::TriangleList => (vertices / 3) as u64,
        }
    }
}

/// Query kinds supported by query heaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// 1 if any sample passed, 0 otherwise
    BinaryOcclusion,
    /// Pipeline invocation counters
    PipelineStatistics,
}

impl QueryType {
    /// Size in bytes of one resolved result
    pub const fn result_size(self) -> u64 {
        match self {
            Self::BinaryOcclusion => OCCLUSION_RESULT_SIZE,
            Self::PipelineStatistics => std::mem::size_of::<PipelineStatistics>() as u64,
        }
    }
}

/// Condition under which predicated work is skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicationOp {
    /// Skip when the predicate value is zero
    EqualZero,
    /// Skip when the predicate value is non-zero
    NotEqualZero,
}

impl PredicationOp {
    /// Whether work must be skipped for the given predicate value
    pub const fn suppresses(self, value: u64) -> bool {
        match self {
            Self::EqualZero => value == 0,
            Self::NotEqualZero => value != 0,
        }
    }
}

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex data
        const VERTEX = 1 << 0;
        /// Index data
        const INDEX = 1 << 1;
        /// Constant data
        const CONSTANT = 1 << 2;
        /// Structured shader data
        const SHADER_RESOURCE = 1 << 3;
        /// Predicate values
        const PREDICATION = 1 << 4;
        /// CPU-writable staging memory
        const UPLOAD = 1 << 5;
        /// CPU-readable destination memory
        const READBACK = 1 << 6;
    }
}

/// Buffer creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Intended usage
    pub usage: BufferUsage,
    /// State the buffer starts in
    pub initial_state: ResourceState,
}

impl BufferDesc {
    /// Describe a buffer
    pub fn new(name: impl Into<String>, size: u64, usage: BufferUsage, initial_state: ResourceState) -> Self {
        Self { name: name.into(), size, usage, initial_state }
    }

    /// CPU-writable staging buffer
    pub fn upload(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, size, BufferUsage::UPLOAD, ResourceState::GenericRead)
    }

    /// CPU-readable resolve destination
    pub fn readback(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, size, BufferUsage::READBACK, ResourceState::CopyDest)
    }
}

/// Texture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA
    Rgba8Unorm,
    /// 8-bit BGRA, the usual swap-chain format
    Bgra8Unorm,
    /// 32-bit float depth
    Depth32Float,
}

impl TextureFormat {
    /// Bytes per texel
    pub const fn bytes_per_texel(self) -> u64 {
        match self {
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Depth32Float => 4,
        }
    }
}

/// Texture creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    /// Debug name
    pub name: String,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
    /// State the texture starts in
    pub initial_state: ResourceState,
}

impl TextureDesc {
    /// Color render target
    pub fn render_target(name: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self { name: name.into(), width, height, format, initial_state: ResourceState::RenderTarget }
    }

    /// Depth target
    pub fn depth(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format: TextureFormat::Depth32Float,
            initial_state: ResourceState::DepthWrite,
        }
    }

    /// Sampled texture
    pub fn sampled(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            initial_state: ResourceState::ShaderResource,
        }
    }

    /// Size in bytes of the texel storage
    pub fn byte_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * self.format.bytes_per_texel()
    }
}

/// Pipeline state creation parameters
///
/// Shader code is owned by the backend; the description only names the
/// pipeline and records the fixed-function state the frame logic relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDesc {
    /// Debug name
    pub name: String,
    /// Topology the pipeline is built for
    pub topology: PrimitiveTopology,
    /// Whether depth is written
    pub depth_write: bool,
    /// Whether color is written
    pub color_write: bool,
}

impl PipelineDesc {
    /// Describe a pipeline
    pub fn new(name: impl Into<String>, topology: PrimitiveTopology, depth_write: bool, color_write: bool) -> Self {
        Self { name: name.into(), topology, depth_write, color_write }
    }
}

/// Rasterizer viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
    /// Minimum depth
    pub min_depth: f32,
    /// Maximum depth
    pub max_depth: f32,
}

impl Viewport {
    /// Full-depth viewport anchored at the origin
    pub fn new(width: f32, height: f32) -> Self {
        Self { x: 0.0, y: 0.0, width, height, min_depth: 0.0, max_depth: 1.0 }
    }

    /// Width over height
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// Vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferView {
    /// Source buffer
    pub buffer: BufferHandle,
    /// Bound size in bytes
    pub size_in_bytes: u32,
    /// Bytes between consecutive vertices
    pub stride_in_bytes: u32,
}

/// Index element format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

/// Index buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferView {
    /// Source buffer
    pub buffer: BufferHandle,
    /// Bound size in bytes
    pub size_in_bytes: u32,
    /// Element format
    pub format: IndexFormat,
}

/// Resolved pipeline statistics counters
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PipelineStatistics {
    /// Vertices read by the input assembler
    pub ia_vertices: u64,
    /// Primitives read by the input assembler
    pub ia_primitives: u64,
    /// Vertex shader invocations
    pub vs_invocations: u64,
    /// Pixel shader invocations
    pub ps_invocations: u64,
    /// Primitives sent to the clipper
    pub c_invocations: u64,
    /// Primitives output by the clipper
    pub c_primitives: u64,
}
