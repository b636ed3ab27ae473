//! Named units of GPU work inside a frame

use crate::gpu::{CommandList, PipelineHandle, QueueType};

/// Handle of a task within its frame
///
/// Valid until the frame is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Declaration index within the frame
    pub fn index(self) -> usize {
        self.0
    }
}

/// Named unit of GPU work bound to a queue
///
/// Holds at least one command list. Predecessors are referenced by name and
/// validated when added; the task signals its queue's fence once its lists
/// have executed.
pub struct Task<L> {
    pub(crate) name: String,
    pub(crate) queue: QueueType,
    pub(crate) pipeline: Option<PipelineHandle>,
    pub(crate) command_lists: Vec<L>,
    pub(crate) dependencies: Vec<TaskId>,
    pub(crate) fence_value: Option<u64>,
}

impl<L: CommandList> Task<L> {
    pub(crate) fn new(name: String, queue: QueueType, pipeline: Option<PipelineHandle>, mut list: L) -> Self {
        list.set_name(&name);
        Self {
            name,
            queue,
            pipeline,
            command_lists: vec![list],
            dependencies: Vec::new(),
            fence_value: None,
        }
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue the task executes on
    pub fn queue_type(&self) -> QueueType {
        self.queue
    }

    /// Pipeline the command lists were opened with
    pub fn pipeline(&self) -> Option<PipelineHandle> {
        self.pipeline
    }

    /// Predecessors in the order they were added
    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    /// Fence value signaled on completion, once submitted
    pub fn fence_value(&self) -> Option<u64> {
        self.fence_value
    }

    /// Command lists in execution order
    pub fn command_lists(&self) -> &[L] {
        &self.command_lists
    }

    /// First command list
    pub fn command_list(&mut self) -> &mut L {
        // Constructed with one list and lists are never removed
        &mut self.command_lists[0]
    }

    /// Command list by position
    pub fn command_list_at(&mut self, index: usize) -> Option<&mut L> {
        self.command_lists.get_mut(index)
    }

    pub(crate) fn push_command_list(&mut self, mut list: L) -> usize {
        let index = self.command_lists.len();
        list.set_name(&format!("{} #{index}", self.name));
        self.command_lists.push(list);
        index
    }

    /// Close every list still open
    pub(crate) fn close(&mut self) -> crate::gpu::GpuResult<()> {
        for list in &mut self.command_lists {
            if !list.is_closed() {
                list.close()?;
            }
        }
        Ok(())
    }
}
