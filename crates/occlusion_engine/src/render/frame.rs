//! Per-frame task graph
//!
//! A [`Frame`] owns the targets of one buffered frame slot and the tasks
//! recorded into it. Tasks are declared in order, each optionally depending
//! on earlier or later tasks by name; [`Frame::submit`] closes every command
//! list in declaration order, executes the tasks in a dependency-respecting
//! order that is otherwise stable with respect to declaration, and makes each
//! task wait on the GPU for the fences of all of its predecessors.
//!
//! ```text
//! Idle --create_task--> Recording --submit--> Submitted --wait_cpu--> Complete
//!   ^                                                                    |
//!   +------------------------------ reset_gpu ---------------------------+
//! ```
//!
//! A frame abandoned while `Recording` (its recording failed) has nothing in
//! flight; `wait_cpu` returns immediately and `reset_gpu` discards its tasks.

use super::error::{TaskGraphError, TaskGraphResult};
use super::queues::CommandQueues;
use super::task::{Task, TaskId};
use crate::gpu::{CommandList, GpuDevice, PipelineHandle, QueueType, TextureHandle};

/// Lifecycle of a frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No tasks recorded
    Idle,
    /// Tasks are being recorded
    Recording,
    /// Submitted, GPU work possibly in flight
    Submitted,
    /// GPU work finished, resources reusable after `reset_gpu`
    Complete,
}

/// Render targets owned by a frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTargets {
    /// Color target the scene renders into
    pub render_target: TextureHandle,
    /// Depth target
    pub depth: TextureHandle,
    /// Presentable image the color target is copied into
    pub swap_chain: TextureHandle,
}

/// One buffered frame: targets, tasks and the fence values of its last submission
pub struct Frame<D: GpuDevice> {
    slot: usize,
    state: FrameState,
    targets: FrameTargets,
    tasks: Vec<Task<D::CommandList>>,
    spare_lists: Vec<D::CommandList>,
    submission_order: Vec<TaskId>,
    fence_values: [u64; 3],
}

impl<D: GpuDevice> Frame<D> {
    /// Create an idle frame for a slot
    pub fn new(slot: usize, targets: FrameTargets) -> Self {
        Self {
            slot,
            state: FrameState::Idle,
            targets,
            tasks: Vec::new(),
            spare_lists: Vec::new(),
            submission_order: Vec::new(),
            fence_values: [0; 3],
        }
    }

    /// Slot index in the frame pool
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Current lifecycle state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Render targets of this slot
    pub fn targets(&self) -> FrameTargets {
        self.targets
    }

    /// Tasks in declaration order
    pub fn tasks(&self) -> &[Task<D::CommandList>] {
        &self.tasks
    }

    /// Order in which the last submission executed the tasks
    pub fn submission_order(&self) -> &[TaskId] {
        &self.submission_order
    }

    /// Names of the submitted tasks in execution order
    pub fn submission_names(&self) -> Vec<&str> {
        self.submission_order.iter().filter_map(|id| self.tasks.get(id.0)).map(Task::name).collect()
    }

    /// Fence value the last submission signaled on a queue (0 if none)
    pub fn fence_value(&self, queue: QueueType) -> u64 {
        self.fence_values[queue.index()]
    }

    fn invalid_state(&self, operation: &'static str, expected: &'static str) -> TaskGraphError {
        TaskGraphError::InvalidFrameState { slot: self.slot, operation, expected, actual: self.state }
    }

    fn take_list(&mut self, device: &D, queue: QueueType, pipeline: Option<PipelineHandle>) -> TaskGraphResult<D::CommandList> {
        if let Some(position) = self.spare_lists.iter().position(|list| list.queue_type() == queue) {
            let mut list = self.spare_lists.swap_remove(position);
            list.reset(pipeline)?;
            return Ok(list);
        }
        Ok(device.create_command_list(queue, pipeline)?)
    }

    /// Create a named task with one open command list, bound to `pipeline` if given
    pub fn create_task(
        &mut self,
        device: &D,
        queue: QueueType,
        pipeline: Option<PipelineHandle>,
        name: impl Into<String>,
    ) -> TaskGraphResult<TaskId> {
        if !matches!(self.state, FrameState::Idle | FrameState::Recording) {
            return Err(self.invalid_state("create_task", "Idle or Recording"));
        }
        let name = name.into();
        if self.find_task(&name).is_some() {
            return Err(TaskGraphError::DuplicateTask(name));
        }
        let list = self.take_list(device, queue, pipeline)?;
        let id = TaskId(self.tasks.len());
        log::trace!("Frame {}: task '{name}' on {queue:?} queue", self.slot);
        self.tasks.push(Task::new(name, queue, pipeline, list));
        self.state = FrameState::Recording;
        Ok(id)
    }

    /// Add another command list to a task; returns its position
    pub fn add_command_list(&mut self, device: &D, task: TaskId) -> TaskGraphResult<usize> {
        let (queue, pipeline) = {
            let task = self.task(task)?;
            (task.queue, task.pipeline)
        };
        let list = self.take_list(device, queue, pipeline)?;
        Ok(self.task_mut(task)?.push_command_list(list))
    }

    /// Make `task` wait for the task named `dependency`
    pub fn add_dependency(&mut self, task: TaskId, dependency: &str) -> TaskGraphResult<()> {
        let name = self.task(task)?.name.clone();
        let predecessor = self.find_task(dependency).ok_or_else(|| TaskGraphError::UnknownDependency {
            task: name.clone(),
            dependency: dependency.to_string(),
        })?;
        if predecessor == task {
            return Err(TaskGraphError::DependencyCycle(name));
        }
        let task = self.task_mut(task)?;
        if !task.dependencies.contains(&predecessor) {
            task.dependencies.push(predecessor);
        }
        Ok(())
    }

    /// Find a task by name
    pub fn find_task(&self, name: &str) -> Option<TaskId> {
        self.tasks.iter().position(|task| task.name == name).map(TaskId)
    }

    /// Look up a task
    pub fn task(&self, id: TaskId) -> TaskGraphResult<&Task<D::CommandList>> {
        self.tasks.get(id.0).ok_or(TaskGraphError::UnknownTask(id.0))
    }

    /// Look up a task for recording
    pub fn task_mut(&mut self, id: TaskId) -> TaskGraphResult<&mut Task<D::CommandList>> {
        self.tasks.get_mut(id.0).ok_or(TaskGraphError::UnknownTask(id.0))
    }

    /// First command list of a task
    pub fn command_list(&mut self, id: TaskId) -> TaskGraphResult<&mut D::CommandList> {
        Ok(self.task_mut(id)?.command_list())
    }

    /// Execution order: Kahn's algorithm, always taking the earliest declared ready task
    fn execution_order(&self) -> TaskGraphResult<Vec<TaskId>> {
        let mut emitted = vec![false; self.tasks.len()];
        let mut order = Vec::with_capacity(self.tasks.len());
        while order.len() < self.tasks.len() {
            let next = self
                .tasks
                .iter()
                .enumerate()
                .find(|(index, task)| !emitted[*index] && task.dependencies.iter().all(|dep| emitted[dep.0]));
            match next {
                Some((index, _)) => {
                    emitted[index] = true;
                    order.push(TaskId(index));
                }
                None => {
                    let stuck = self
                        .tasks
                        .iter()
                        .enumerate()
                        .find(|(index, _)| !emitted[*index])
                        .map_or_else(String::new, |(_, task)| task.name.clone());
                    return Err(TaskGraphError::DependencyCycle(stuck));
                }
            }
        }
        Ok(order)
    }

    /// Close, order and execute every task
    ///
    /// Each task first waits on the GPU for every predecessor's fence value,
    /// then executes its command lists and signals its queue's fence.
    pub fn submit(&mut self, device: &D, queues: &CommandQueues) -> TaskGraphResult<()> {
        if self.state != FrameState::Recording {
            return Err(self.invalid_state("submit", "Recording"));
        }
        for task in &mut self.tasks {
            task.close()?;
        }
        let order = self.execution_order()?;

        for &id in &order {
            let task = &self.tasks[id.0];
            for dependency in &task.dependencies {
                let predecessor = &self.tasks[dependency.0];
                let value = predecessor
                    .fence_value
                    .ok_or_else(|| TaskGraphError::DependencyCycle(predecessor.name.clone()))?;
                queues.wait_gpu(device, task.queue, predecessor.queue, value)?;
            }

            let lists: Vec<&D::CommandList> = task.command_lists.iter().collect();
            device.execute_command_lists(task.queue, &lists)?;
            let value = queues.signal(device, task.queue)?;
            log::trace!("Frame {}: task '{}' signals {:?} = {value}", self.slot, task.name, task.queue);

            self.fence_values[task.queue.index()] = value;
            self.tasks[id.0].fence_value = Some(value);
        }

        self.submission_order = order;
        self.state = FrameState::Submitted;
        Ok(())
    }

    /// Block until the GPU finished this frame's last submission
    ///
    /// Returns immediately when nothing was submitted.
    pub fn wait_cpu(&mut self, device: &D, queues: &CommandQueues) -> TaskGraphResult<()> {
        match self.state {
            FrameState::Submitted => {
                for queue in QueueType::ALL {
                    let value = self.fence_values[queue.index()];
                    if value > 0 {
                        queues.wait_cpu(device, queue, value)?;
                    }
                }
                self.state = FrameState::Complete;
                Ok(())
            }
            FrameState::Recording => {
                log::warn!("Frame {}: discarding {} unsubmitted tasks", self.slot, self.tasks.len());
                Ok(())
            }
            FrameState::Idle | FrameState::Complete => Ok(()),
        }
    }

    /// Whether the last submission finished, without blocking
    pub fn is_complete(&self, device: &D, queues: &CommandQueues) -> TaskGraphResult<bool> {
        for queue in QueueType::ALL {
            let value = self.fence_values[queue.index()];
            if value > 0 && !queues.is_complete(device, queue, value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drop the tasks and keep their command lists for reuse
    ///
    /// A submitted frame must be waited on first.
    pub fn reset_gpu(&mut self) -> TaskGraphResult<()> {
        if self.state == FrameState::Submitted {
            return Err(self.invalid_state("reset_gpu", "Idle, Recording or Complete"));
        }
        let recycled: usize = self.tasks.iter().map(|task| task.command_lists.len()).sum();
        for task in self.tasks.drain(..) {
            self.spare_lists.extend(task.command_lists);
        }
        self.submission_order.clear();
        self.state = FrameState::Idle;
        if recycled > 0 {
            log::trace!("Frame {}: recycled {recycled} command lists", self.slot);
        }
        Ok(())
    }
}
