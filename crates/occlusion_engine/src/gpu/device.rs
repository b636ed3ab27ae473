//! GPU capability traits
//!
//! The renderer talks to the GPU exclusively through these traits: resource
//! creation and CPU access ([`GpuResources`]), queues and fences
//! ([`GpuDevice`]) and command recording ([`CommandList`]). A backend
//! implements all three; [`crate::gpu::recording`] is the software backend.

use super::error::GpuResult;
use super::types::{
    BufferDesc, BufferHandle, FenceHandle, IndexBufferView, PipelineDesc, PipelineHandle,
    PredicationOp, PrimitiveTopology, QueryHeapHandle, QueryType, QueueType, ResourceId,
    ResourceState, TextureDesc, TextureHandle, VertexBufferView, Viewport,
};

/// Resource creation and CPU access
///
/// Object safe so that scene and query code can take `&dyn GpuResources`.
pub trait GpuResources: Send + Sync {
    /// Create a committed buffer
    fn create_buffer(&self, desc: &BufferDesc) -> GpuResult<BufferHandle>;

    /// Create a texture
    fn create_texture(&self, desc: &TextureDesc) -> GpuResult<TextureHandle>;

    /// Create a query heap of `count` queries
    fn create_query_heap(&self, query_type: QueryType, count: u32) -> GpuResult<QueryHeapHandle>;

    /// Release a buffer; the handle becomes invalid
    fn destroy_buffer(&self, buffer: BufferHandle) -> GpuResult<()>;

    /// Create a pipeline state object
    fn create_pipeline(&self, desc: &PipelineDesc) -> GpuResult<PipelineHandle>;

    /// Write CPU data into a buffer (upload or readback memory only)
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> GpuResult<()>;

    /// Read buffer contents back to the CPU
    fn read_buffer(&self, buffer: BufferHandle, offset: u64, len: u64) -> GpuResult<Vec<u8>>;

    /// Attach a debug name to a resource
    fn set_name(&self, resource: ResourceId, name: &str) -> GpuResult<()>;
}

/// Queues, fences and command list allocation
pub trait GpuDevice: GpuResources {
    /// Command list type recorded for this device
    type CommandList: CommandList + Send + 'static;

    /// Allocate an open command list for a queue, optionally bound to a pipeline
    fn create_command_list(
        &self,
        queue: QueueType,
        pipeline: Option<PipelineHandle>,
    ) -> GpuResult<Self::CommandList>;

    /// Create a fence with an initial value
    fn create_fence(&self, initial_value: u64) -> GpuResult<FenceHandle>;

    /// Submit closed command lists to a queue; they execute in slice order
    fn execute_command_lists(&self, queue: QueueType, lists: &[&Self::CommandList]) -> GpuResult<()>;

    /// Queue a fence signal after all previously submitted work on `queue`
    fn signal(&self, queue: QueueType, fence: FenceHandle, value: u64) -> GpuResult<()>;

    /// Make `queue` wait on the GPU until `fence` reaches `value`
    fn wait(&self, queue: QueueType, fence: FenceHandle, value: u64) -> GpuResult<()>;

    /// Last value the fence reached
    fn completed_value(&self, fence: FenceHandle) -> GpuResult<u64>;

    /// Block the calling thread until `fence` reaches `value`
    fn wait_for_value(&self, fence: FenceHandle, value: u64) -> GpuResult<()>;
}

/// Command recording interface
///
/// Every recording method fails with
/// [`GpuError::CommandListClosed`](super::GpuError::CommandListClosed) once
/// the list has been closed.
pub trait CommandList {
    /// Debug name
    fn name(&self) -> &str;

    /// Rename the list; the name shows up in execution logs
    fn set_name(&mut self, name: &str);

    /// Queue family the list records for
    fn queue_type(&self) -> QueueType;

    /// Whether [`CommandList::close`] has been called since the last reset
    fn is_closed(&self) -> bool;

    /// Finish recording
    fn close(&mut self) -> GpuResult<()>;

    /// Discard recorded commands and reopen, optionally bound to a pipeline
    fn reset(&mut self, pipeline: Option<PipelineHandle>) -> GpuResult<()>;

    /// Bind a pipeline state
    fn set_pipeline(&mut self, pipeline: PipelineHandle) -> GpuResult<()>;

    /// Set the rasterizer viewport and matching scissor
    fn set_viewport(&mut self, viewport: Viewport) -> GpuResult<()>;

    /// Bind color and depth attachments
    fn set_render_targets(&mut self, color: Option<TextureHandle>, depth: Option<TextureHandle>) -> GpuResult<()>;

    /// Clear a color target
    fn clear_render_target(&mut self, target: TextureHandle, color: [f32; 4]) -> GpuResult<()>;

    /// Clear a depth target
    fn clear_depth(&mut self, target: TextureHandle, depth: f32) -> GpuResult<()>;

    /// Transition a resource to a new state
    fn transition_barrier(&mut self, resource: ResourceId, after: ResourceState) -> GpuResult<()>;

    /// Copy a whole resource
    fn copy_resource(&mut self, source: ResourceId, destination: ResourceId) -> GpuResult<()>;

    /// Set the input assembler topology
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> GpuResult<()>;

    /// Write 32-bit root constants at `offset` within root parameter `root_index`
    fn set_constants(&mut self, root_index: u32, values: &[u32], offset: u32) -> GpuResult<()>;

    /// Write float root constants
    fn set_constants_f32(&mut self, root_index: u32, values: &[f32], offset: u32) -> GpuResult<()> {
        self.set_constants(root_index, bytemuck::cast_slice(values), offset)
    }

    /// Bind a buffer as a root shader resource view
    fn set_shader_resource(&mut self, root_index: u32, buffer: BufferHandle) -> GpuResult<()>;

    /// Bind a buffer as a root constant buffer view
    fn set_constant_buffer(&mut self, root_index: u32, buffer: BufferHandle) -> GpuResult<()>;

    /// Bind a texture through a descriptor table
    fn set_descriptor_table(&mut self, root_index: u32, texture: TextureHandle) -> GpuResult<()>;

    /// Bind a vertex buffer
    fn set_vertex_buffer(&mut self, slot: u32, view: VertexBufferView) -> GpuResult<()>;

    /// Bind an index buffer
    fn set_index_buffer(&mut self, view: IndexBufferView) -> GpuResult<()>;

    /// Non-indexed draw
    fn draw(&mut self, vertex_count: u32) -> GpuResult<()>;

    /// Indexed draw
    fn draw_indexed(&mut self, index_count: u32) -> GpuResult<()>;

    /// Start a query
    fn begin_query(&mut self, heap: QueryHeapHandle, query_type: QueryType, index: u32) -> GpuResult<()>;

    /// End a query
    fn end_query(&mut self, heap: QueryHeapHandle, query_type: QueryType, index: u32) -> GpuResult<()>;

    /// Resolve one query result into `destination` at `offset`
    fn resolve_query_data(
        &mut self,
        heap: QueryHeapHandle,
        query_type: QueryType,
        index: u32,
        destination: BufferHandle,
        offset: u64,
    ) -> GpuResult<()>;

    /// Set or clear (`None`) the predicate for subsequent draws
    fn set_predication(&mut self, buffer: Option<BufferHandle>, offset: u64, op: PredicationOp) -> GpuResult<()>;

    /// Open a debug marker region
    fn begin_event(&mut self, label: &str) -> GpuResult<()>;

    /// Close the innermost debug marker region
    fn end_event(&mut self) -> GpuResult<()>;
}
