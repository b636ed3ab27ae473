//! Recorded command lists

use crate::gpu::device::CommandList;
use crate::gpu::error::{GpuError, GpuResult};
use crate::gpu::types::{
    BufferHandle, IndexBufferView, PipelineHandle, PredicationOp, PrimitiveTopology,
    QueryHeapHandle, QueryType, QueueType, ResourceId, ResourceState, TextureHandle,
    VertexBufferView, Viewport,
};

/// One recorded GPU command
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Command {
    SetPipeline(PipelineHandle),
    SetViewport(Viewport),
    SetRenderTargets { color: Option<TextureHandle>, depth: Option<TextureHandle> },
    ClearRenderTarget { target: TextureHandle, color: [f32; 4] },
    ClearDepth { target: TextureHandle, depth: f32 },
    TransitionBarrier { resource: ResourceId, after: ResourceState },
    CopyResource { source: ResourceId, destination: ResourceId },
    SetPrimitiveTopology(PrimitiveTopology),
    SetConstants { root_index: u32, offset: u32, values: Vec<u32> },
    SetShaderResource { root_index: u32, buffer: BufferHandle },
    SetConstantBuffer { root_index: u32, buffer: BufferHandle },
    SetDescriptorTable { root_index: u32, texture: TextureHandle },
    SetVertexBuffer { slot: u32, view: VertexBufferView },
    SetIndexBuffer(IndexBufferView),
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32 },
    BeginQuery { heap: QueryHeapHandle, query_type: QueryType, index: u32 },
    EndQuery { heap: QueryHeapHandle, query_type: QueryType, index: u32 },
    ResolveQueryData { heap: QueryHeapHandle, query_type: QueryType, index: u32, destination: BufferHandle, offset: u64 },
    SetPredication { buffer: Option<BufferHandle>, offset: u64, op: PredicationOp },
    BeginEvent(String),
    EndEvent,
}

impl Command {
    /// Whether the command produces primitives
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw { .. } | Self::DrawIndexed { .. })
    }
}

/// Command list that stores commands for later execution by
/// [`RecordingDevice`](super::RecordingDevice)
#[derive(Debug, Clone)]
pub struct RecordingCommandList {
    name: String,
    queue: QueueType,
    commands: Vec<Command>,
    closed: bool,
}

impl RecordingCommandList {
    pub(super) fn new(queue: QueueType, pipeline: Option<PipelineHandle>) -> Self {
        let mut list = Self {
            name: format!("{queue:?} command list"),
            queue,
            commands: Vec::new(),
            closed: false,
        };
        list.commands.extend(pipeline.map(Command::SetPipeline));
        list
    }

    /// Commands recorded since the last reset
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn record(&mut self, command: Command) -> GpuResult<()> {
        if self.closed {
            return Err(GpuError::CommandListClosed(self.name.clone()));
        }
        self.commands.push(command);
        Ok(())
    }
}

impl CommandList for RecordingCommandList {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) -> GpuResult<()> {
        if self.closed {
            return Err(GpuError::CommandListClosed(self.name.clone()));
        }
        self.closed = true;
        Ok(())
    }

    fn reset(&mut self, pipeline: Option<PipelineHandle>) -> GpuResult<()> {
        self.commands.clear();
        self.commands.extend(pipeline.map(Command::SetPipeline));
        self.closed = false;
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: PipelineHandle) -> GpuResult<()> {
        self.record(Command::SetPipeline(pipeline))
    }

    fn set_viewport(&mut self, viewport: Viewport) -> GpuResult<()> {
        self.record(Command::SetViewport(viewport))
    }

    fn set_render_targets(&mut self, color: Option<TextureHandle>, depth: Option<TextureHandle>) -> GpuResult<()> {
        self.record(Command::SetRenderTargets { color, depth })
    }

    fn clear_render_target(&mut self, target: TextureHandle, color: [f32; 4]) -> GpuResult<()> {
        self.record(Command::ClearRenderTarget { target, color })
    }

    fn clear_depth(&mut self, target: TextureHandle, depth: f32) -> GpuResult<()> {
        self.record(Command::ClearDepth { target, depth })
    }

    fn transition_barrier(&mut self, resource: ResourceId, after: ResourceState) -> GpuResult<()> {
        self.record(Command::TransitionBarrier { resource, after })
    }

    fn copy_resource(&mut self, source: ResourceId, destination: ResourceId) -> GpuResult<()> {
        self.record(Command::CopyResource { source, destination })
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> GpuResult<()> {
        self.record(Command::SetPrimitiveTopology(topology))
    }

    fn set_constants(&mut self, root_index: u32, values: &[u32], offset: u32) -> GpuResult<()> {
        self.record(Command::SetConstants { root_index, offset, values: values.to_vec() })
    }

    fn set_shader_resource(&mut self, root_index: u32, buffer: BufferHandle) -> GpuResult<()> {
        self.record(Command::SetShaderResource { root_index, buffer })
    }

    fn set_constant_buffer(&mut self, root_index: u32, buffer: BufferHandle) -> GpuResult<()> {
        self.record(Command::SetConstantBuffer { root_index, buffer })
    }

    fn set_descriptor_table(&mut self, root_index: u32, texture: TextureHandle) -> GpuResult<()> {
        self.record(Command::SetDescriptorTable { root_index, texture })
    }

    fn set_vertex_buffer(&mut self, slot: u32, view: VertexBufferView) -> GpuResult<()> {
        self.record(Command::SetVertexBuffer { slot, view })
    }

    fn set_index_buffer(&mut self, view: IndexBufferView) -> GpuResult<()> {
        self.record(Command::SetIndexBuffer(view))
    }

    fn draw(&mut self, vertex_count: u32) -> GpuResult<()> {
        self.record(Command::Draw { vertex_count })
    }

    fn draw_indexed(&mut self, index_count: u32) -> GpuResult<()> {
        self.record(Command::DrawIndexed { index_count })
    }

    fn begin_query(&mut self, heap: QueryHeapHandle, query_type: QueryType, index: u32) -> GpuResult<()> {
        self.record(Command::BeginQuery { heap, query_type, index })
    }

    fn end_query(&mut self, heap: QueryHeapHandle, query_type: QueryType, index: u32) -> GpuResult<()> {
        self.record(Command::EndQuery { heap, query_type, index })
    }

    fn resolve_query_data(
        &mut self,
        heap: QueryHeapHandle,
        query_type: QueryType,
        index: u32,
        destination: BufferHandle,
        offset: u64,
    ) -> GpuResult<()> {
        self.record(Command::ResolveQueryData { heap, query_type, index, destination, offset })
    }

    fn set_predication(&mut self, buffer: Option<BufferHandle>, offset: u64, op: PredicationOp) -> GpuResult<()> {
        self.record(Command::SetPredication { buffer, offset, op })
    }

    fn begin_event(&mut self, label: &str) -> GpuResult<()> {
        self.record(Command::BeginEvent(label.to_string()))
    }

    fn end_event(&mut self) -> GpuResult<()> {
        self.record(Command::EndEvent)
    }
}
