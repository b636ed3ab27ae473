//! Software device with simulated queues and fences

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use slotmap::SlotMap;

use super::command_list::{Command, RecordingCommandList};
use crate::foundation::math::Vec3;
use crate::gpu::device::{CommandList, GpuDevice, GpuResources};
use crate::gpu::error::{GpuError, GpuResult};
use crate::gpu::types::{
    BufferDesc, BufferHandle, BufferUsage, FenceHandle, PipelineDesc, PipelineHandle,
    PipelineStatistics, QueryHeapHandle, QueryType, QueueType, ResourceId, ResourceState,
    TextureDesc, TextureHandle,
};

/// Decides whether a bounding box would pass the depth test
pub type VisibilityFn = Box<dyn Fn(&Vec3, &Vec3) -> bool + Send + Sync>;

pub(super) struct VisibilityTest {
    /// Root parameter holding `min.xyz` at offsets 0..3 and `max.xyz` at 4..7
    pub bounds_root: u32,
    pub test: VisibilityFn,
}

pub(super) struct BufferState {
    pub name: String,
    pub usage: BufferUsage,
    pub state: ResourceState,
    pub data: Vec<u8>,
}

pub(super) struct TextureState {
    pub name: String,
    pub state: ResourceState,
}

pub(super) enum QueryResults {
    Occlusion(Vec<u64>),
    Statistics(Vec<PipelineStatistics>),
}

impl QueryResults {
    pub fn query_type(&self) -> QueryType {
        match self {
            Self::Occlusion(_) => QueryType::BinaryOcclusion,
            Self::Statistics(_) => QueryType::PipelineStatistics,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Occlusion(results) => results.len(),
            Self::Statistics(results) => results.len(),
        }
    }
}

pub(super) enum QueueOp {
    Execute { name: String, commands: Vec<Command> },
    Signal { fence: FenceHandle, value: u64 },
    Wait { fence: FenceHandle, value: u64 },
}

/// Entry in the device execution log
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// A command list started executing
    CommandListBegin {
        /// Queue it ran on
        queue: QueueType,
        /// Command list name
        name: String,
    },
    /// A command executed
    Command {
        /// Queue it ran on
        queue: QueueType,
        /// Owning command list name
        command_list: String,
        /// The command
        command: Command,
        /// Draw skipped by predication
        suppressed: bool,
    },
    /// A queue waited on a fence and the wait was satisfied
    Wait {
        /// Waiting queue
        queue: QueueType,
        /// Fence
        fence: FenceHandle,
        /// Awaited value
        value: u64,
    },
    /// A queue signaled a fence
    Signal {
        /// Signaling queue
        queue: QueueType,
        /// Fence
        fence: FenceHandle,
        /// New value
        value: u64,
    },
}

/// Aggregate counters for executed work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Command lists executed
    pub command_lists_executed: u64,
    /// Draws that reached the rasterizer
    pub draws_executed: u64,
    /// Draws skipped by predication
    pub draws_suppressed: u64,
    /// Query results resolved into buffers
    pub queries_resolved: u64,
}

pub(super) struct DeviceState {
    pub buffers: SlotMap<BufferHandle, BufferState>,
    pub textures: SlotMap<TextureHandle, TextureState>,
    pub query_heaps: SlotMap<QueryHeapHandle, QueryResults>,
    pub pipelines: SlotMap<PipelineHandle, PipelineDesc>,
    pub fences: SlotMap<FenceHandle, u64>,
    pub queues: [VecDeque<QueueOp>; 3],
    pub visibility: Option<VisibilityTest>,
    pub log: Vec<ExecutionEvent>,
    pub log_enabled: bool,
    pub stats: DeviceStats,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            query_heaps: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            queues: Default::default(),
            visibility: None,
            log: Vec::new(),
            log_enabled: true,
            stats: DeviceStats::default(),
        }
    }

    pub fn buffer(&self, handle: BufferHandle) -> GpuResult<&BufferState> {
        self.buffers.get(handle).ok_or(GpuError::InvalidHandle("buffer"))
    }

    pub fn buffer_mut(&mut self, handle: BufferHandle) -> GpuResult<&mut BufferState> {
        self.buffers.get_mut(handle).ok_or(GpuError::InvalidHandle("buffer"))
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> GpuResult<&mut TextureState> {
        self.textures.get_mut(handle).ok_or(GpuError::InvalidHandle("texture"))
    }

    fn fence(&self, handle: FenceHandle) -> GpuResult<u64> {
        self.fences.get(handle).copied().ok_or(GpuError::InvalidHandle("fence"))
    }

    pub fn record(&mut self, event: ExecutionEvent) {
        if self.log_enabled {
            self.log.push(event);
        }
    }

    /// Run queued work until every queue is empty or blocked on a fence
    fn pump(&mut self) -> GpuResult<()> {
        loop {
            let mut progressed = false;
            for queue in QueueType::ALL {
                while let Some(op) = self.queues[queue.index()].front() {
                    if let QueueOp::Wait { fence, value } = *op {
                        if self.fence(fence)? < value {
                            break;
                        }
                    }
                    let Some(op) = self.queues[queue.index()].pop_front() else {
                        break;
                    };
                    self.run_op(queue, op)?;
                    progressed = true;
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    fn run_op(&mut self, queue: QueueType, op: QueueOp) -> GpuResult<()> {
        match op {
            QueueOp::Execute { name, commands } => self.execute(queue, &name, &commands),
            QueueOp::Signal { fence, value } => {
                let current = self.fences.get_mut(fence).ok_or(GpuError::InvalidHandle("fence"))?;
                *current = value;
                self.record(ExecutionEvent::Signal { queue, fence, value });
                Ok(())
            }
            QueueOp::Wait { fence, value } => {
                self.record(ExecutionEvent::Wait { queue, fence, value });
                Ok(())
            }
        }
    }
}

/// Deterministic software GPU
///
/// Submitted work executes as soon as it is not blocked by a GPU-side fence
/// wait, so fence values can be observed right after submission. Binary
/// occlusion queries report "visible" unless a visibility test is installed
/// with [`RecordingDevice::set_visibility_test`].
pub struct RecordingDevice {
    state: Mutex<DeviceState>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    /// Create an empty device
    pub fn new() -> Self {
        Self { state: Mutex::new(DeviceState::new()) }
    }

    fn lock(&self) -> GpuResult<MutexGuard<'_, DeviceState>> {
        self.state.lock().map_err(|_| GpuError::Device("device state lock poisoned".to_string()))
    }

    /// Install the occlusion visibility test
    ///
    /// Point draws inside an active occlusion query read the box corners from
    /// root parameter `bounds_root` and pass the query only when `test`
    /// returns true.
    pub fn set_visibility_test(
        &self,
        bounds_root: u32,
        test: impl Fn(&Vec3, &Vec3) -> bool + Send + Sync + 'static,
    ) -> GpuResult<()> {
        self.lock()?.visibility = Some(VisibilityTest { bounds_root, test: Box::new(test) });
        Ok(())
    }

    /// Remove the visibility test; every query passes again
    pub fn clear_visibility_test(&self) -> GpuResult<()> {
        self.lock()?.visibility = None;
        Ok(())
    }

    /// Enable or disable the execution log
    pub fn set_execution_log_enabled(&self, enabled: bool) -> GpuResult<()> {
        self.lock()?.log_enabled = enabled;
        Ok(())
    }

    /// Copy of the execution log
    pub fn execution_log(&self) -> GpuResult<Vec<ExecutionEvent>> {
        Ok(self.lock()?.log.clone())
    }

    /// Drain the execution log
    pub fn take_execution_log(&self) -> GpuResult<Vec<ExecutionEvent>> {
        Ok(std::mem::take(&mut self.lock()?.log))
    }

    /// Names of executed command lists in execution order
    pub fn executed_command_lists(&self) -> GpuResult<Vec<String>> {
        Ok(self
            .lock()?
            .log
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::CommandListBegin { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect())
    }

    /// Aggregate execution counters
    pub fn stats(&self) -> GpuResult<DeviceStats> {
        Ok(self.lock()?.stats)
    }

    /// Current state of a buffer
    pub fn buffer_state(&self, buffer: BufferHandle) -> GpuResult<ResourceState> {
        Ok(self.lock()?.buffer(buffer)?.state)
    }

    /// Current state of a texture
    pub fn texture_state(&self, texture: TextureHandle) -> GpuResult<ResourceState> {
        let state = self.lock()?;
        state.textures.get(texture).map(|t| t.state).ok_or(GpuError::InvalidHandle("texture"))
    }

    /// Debug name of a buffer
    pub fn buffer_name(&self, buffer: BufferHandle) -> GpuResult<String> {
        Ok(self.lock()?.buffer(buffer)?.name.clone())
    }

    /// Raw buffer contents regardless of memory type
    pub fn buffer_contents(&self, buffer: BufferHandle) -> GpuResult<Vec<u8>> {
        Ok(self.lock()?.buffer(buffer)?.data.clone())
    }

    /// Operations still queued, typically behind an unsatisfied fence wait
    pub fn pending_operations(&self) -> GpuResult<usize> {
        Ok(self.lock()?.queues.iter().map(VecDeque::len).sum())
    }
}

impl GpuResources for RecordingDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> GpuResult<BufferHandle> {
        let size = usize::try_from(desc.size)
            .map_err(|_| GpuError::ResourceCreationFailed(format!("buffer '{}' is too large", desc.name)))?;
        if size == 0 {
            return Err(GpuError::ResourceCreationFailed(format!("buffer '{}' has zero size", desc.name)));
        }
        let handle = self.lock()?.buffers.insert(BufferState {
            name: desc.name.clone(),
            usage: desc.usage,
            state: desc.initial_state,
            data: vec![0; size],
        });
        log::trace!("Created buffer '{}' ({} bytes)", desc.name, desc.size);
        Ok(handle)
    }

    fn create_texture(&self, desc: &TextureDesc) -> GpuResult<TextureHandle> {
        if desc.byte_size() == 0 {
            return Err(GpuError::ResourceCreationFailed(format!("texture '{}' has zero size", desc.name)));
        }
        let handle = self.lock()?.textures.insert(TextureState {
            name: desc.name.clone(),
            state: desc.initial_state,
        });
        log::trace!("Created texture '{}' ({}x{})", desc.name, desc.width, desc.height);
        Ok(handle)
    }

    fn create_query_heap(&self, query_type: QueryType, count: u32) -> GpuResult<QueryHeapHandle> {
        if count == 0 {
            return Err(GpuError::ResourceCreationFailed("query heap must hold at least one query".to_string()));
        }
        let count = count as usize;
        let results = match query_type {
            QueryType::BinaryOcclusion => QueryResults::Occlusion(vec![0; count]),
            QueryType::PipelineStatistics => QueryResults::Statistics(vec![PipelineStatistics::default(); count]),
        };
        Ok(self.lock()?.query_heaps.insert(results))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) -> GpuResult<()> {
        self.lock()?.buffers.remove(buffer).map(|_| ()).ok_or(GpuError::InvalidHandle("buffer"))
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> GpuResult<PipelineHandle> {
        Ok(self.lock()?.pipelines.insert(desc.clone()))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> GpuResult<()> {
        let mut state = self.lock()?;
        let target = state.buffer_mut(buffer)?;
        if !target.usage.contains(BufferUsage::UPLOAD) {
            return Err(GpuError::Device(format!("buffer '{}' is not CPU-writable", target.name)));
        }
        let start = offset as usize;
        let end = start + data.len();
        let Some(bytes) = target.data.get_mut(start..end) else {
            return Err(GpuError::Device(format!("write past the end of buffer '{}'", target.name)));
        };
        bytes.copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, len: u64) -> GpuResult<Vec<u8>> {
        let state = self.lock()?;
        let source = state.buffer(buffer)?;
        if !source.usage.intersects(BufferUsage::UPLOAD | BufferUsage::READBACK) {
            return Err(GpuError::Device(format!("buffer '{}' is not CPU-readable", source.name)));
        }
        let start = offset as usize;
        let end = start + len as usize;
        source
            .data
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| GpuError::Device(format!("read past the end of buffer '{}'", source.name)))
    }

    fn set_name(&self, resource: ResourceId, name: &str) -> GpuResult<()> {
        let mut state = self.lock()?;
        match resource {
            ResourceId::Buffer(handle) => state.buffer_mut(handle)?.name = name.to_string(),
            ResourceId::Texture(handle) => state.texture_mut(handle)?.name = name.to_string(),
        }
        Ok(())
    }
}

impl GpuDevice for RecordingDevice {
    type CommandList = RecordingCommandList;

    fn create_command_list(
        &self,
        queue: QueueType,
        pipeline: Option<PipelineHandle>,
    ) -> GpuResult<RecordingCommandList> {
        if let Some(pipeline) = pipeline {
            if !self.lock()?.pipelines.contains_key(pipeline) {
                return Err(GpuError::InvalidHandle("pipeline"));
            }
        }
        Ok(RecordingCommandList::new(queue, pipeline))
    }

    fn create_fence(&self, initial_value: u64) -> GpuResult<FenceHandle> {
        Ok(self.lock()?.fences.insert(initial_value))
    }

    fn execute_command_lists(&self, queue: QueueType, lists: &[&RecordingCommandList]) -> GpuResult<()> {
        for list in lists {
            if !list.is_closed() {
                return Err(GpuError::CommandListNotClosed(list.name().to_string()));
            }
            if list.queue_type() != queue {
                return Err(GpuError::QueueMismatch { list: list.queue_type(), queue });
            }
        }

        let mut state = self.lock()?;
        for list in lists {
            state.queues[queue.index()].push_back(QueueOp::Execute {
                name: list.name().to_string(),
                commands: list.commands().to_vec(),
            });
        }
        state.pump()
    }

    fn signal(&self, queue: QueueType, fence: FenceHandle, value: u64) -> GpuResult<()> {
        let mut state = self.lock()?;
        state.fence(fence)?;
        state.queues[queue.index()].push_back(QueueOp::Signal { fence, value });
        state.pump()
    }

    fn wait(&self, queue: QueueType, fence: FenceHandle, value: u64) -> GpuResult<()> {
        let mut state = self.lock()?;
        state.fence(fence)?;
        state.queues[queue.index()].push_back(QueueOp::Wait { fence, value });
        state.pump()
    }

    fn completed_value(&self, fence: FenceHandle) -> GpuResult<u64> {
        self.lock()?.fence(fence)
    }

    fn wait_for_value(&self, fence: FenceHandle, value: u64) -> GpuResult<()> {
        let mut state = self.lock()?;
        state.pump()?;
        let completed = state.fence(fence)?;
        if completed < value {
            return Err(GpuError::Deadlock { value, completed });
        }
        Ok(())
    }
}
