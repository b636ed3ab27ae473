//! # Occlusion Query Engine
//!
//! Hardware occlusion culling for scene nodes. Each node that is tested gets
//! a slot in a binary-occlusion query heap and an 8-byte result buffer that
//! doubles as its draw predicate.
//!
//! ## Per-frame flow
//!
//! 1. [`OcclusionQuery::run`] draws the node's bounding box as a single point
//!    (expanded to the box by the occlusion pipeline) inside a query, then
//!    resolves the result into the slot's buffer.
//! 2. [`OcclusionQuery::set_predication`] binds that buffer as the predicate
//!    for the node's main-pass draw. A zero result means no sample passed,
//!    and the draw is skipped on the GPU.
//!
//! ## Slot assignment
//!
//! Slots are handed out lazily in first-use order and never released. The
//! capacity fixed at [`OcclusionQuery::create`] is a hard limit.

use std::collections::HashMap;

use crate::gpu::{
    BufferDesc, BufferHandle, BufferUsage, CommandList, GpuError, GpuResources, PredicationOp,
    PrimitiveTopology, QueryHeapHandle, QueryType, ResourceState, OCCLUSION_RESULT_SIZE,
};
use crate::render::root;
use crate::scene::node::NodeId;
use crate::scene::volumes::{AabbVolume, FrustumVolume};

/// Predicate polarity used for occludee draws
pub const OCCLUSION_PREDICATE_OP: PredicationOp = PredicationOp::EqualZero;

/// Occlusion engine errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OcclusionError {
    /// The query heap already exists
    #[error("Occlusion query heap already created with capacity {0}")]
    AlreadyCreated(usize),

    /// Run or predication requested before the heap exists
    #[error("Occlusion query heap has not been created")]
    NotCreated,

    /// More distinct nodes than slots
    #[error("Occlusion query capacity {capacity} exceeded")]
    CapacityExceeded {
        /// Heap capacity
        capacity: usize,
    },

    /// Underlying GPU failure
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Result alias for occlusion operations
pub type OcclusionResult<T> = Result<T, OcclusionError>;

/// What [`OcclusionQuery::run`] recorded for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Query recorded and resolved into the slot's buffer
    Issued {
        /// Assigned slot
        slot: u32,
    },
    /// Node is outside the frustum; the slot is reserved but no query was recorded
    Culled {
        /// Assigned slot
        slot: u32,
    },
}

impl QueryOutcome {
    /// Slot the node is bound to
    pub fn slot(self) -> u32 {
        match self {
            Self::Issued { slot } | Self::Culled { slot } => slot,
        }
    }
}

struct QueryHeap {
    heap: QueryHeapHandle,
    results: Vec<BufferHandle>,
}

/// Fixed-capacity binary occlusion query pool keyed by scene node
#[derive(Default)]
pub struct OcclusionQuery {
    heap: Option<QueryHeap>,
    slots: HashMap<NodeId, u32>,
}

impl OcclusionQuery {
    /// Create an engine with no GPU resources yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the query heap and `capacity` result buffers
    ///
    /// Result buffers start in the predication state and are named
    /// `Query Result {i}`. Calling this twice is an error.
    pub fn create(&mut self, resources: &dyn GpuResources, capacity: usize) -> OcclusionResult<()> {
        if let Some(existing) = &self.heap {
            return Err(OcclusionError::AlreadyCreated(existing.results.len()));
        }

        let count = u32::try_from(capacity).map_err(|_| OcclusionError::CapacityExceeded { capacity })?;
        let heap = resources.create_query_heap(QueryType::BinaryOcclusion, count)?;
        let results = (0..capacity)
            .map(|i| {
                resources.create_buffer(&BufferDesc::new(
                    format!("Query Result {i}"),
                    OCCLUSION_RESULT_SIZE,
                    BufferUsage::PREDICATION,
                    ResourceState::Predication,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("Created occlusion query heap with {capacity} slots");
        self.heap = Some(QueryHeap { heap, results });
        Ok(())
    }

    /// Whether [`OcclusionQuery::create`] has run
    pub fn is_created(&self) -> bool {
        self.heap.is_some()
    }

    /// Number of slots in the heap (0 before creation)
    pub fn capacity(&self) -> usize {
        self.heap.as_ref().map_or(0, |heap| heap.results.len())
    }

    /// Number of nodes that have been given a slot
    pub fn assigned_slots(&self) -> usize {
        self.slots.len()
    }

    /// Slot assigned to a node, if any
    pub fn slot(&self, node: NodeId) -> Option<u32> {
        self.slots.get(&node).copied()
    }

    /// Result buffer of a node's slot, if any
    pub fn result_buffer(&self, node: NodeId) -> Option<BufferHandle> {
        let heap = self.heap.as_ref()?;
        let slot = self.slot(node)?;
        heap.results.get(slot as usize).copied()
    }

    fn assign_slot(&mut self, node: NodeId) -> OcclusionResult<u32> {
        if let Some(slot) = self.slots.get(&node) {
            return Ok(*slot);
        }
        let capacity = self.capacity();
        if self.slots.len() >= capacity {
            return Err(OcclusionError::CapacityExceeded { capacity });
        }
        let slot = self.slots.len() as u32;
        self.slots.insert(node, slot);
        log::debug!("Assigned occlusion slot {slot} to node {node:?}");
        Ok(slot)
    }

    /// Record the occlusion test for a node
    ///
    /// Sets point topology, pushes the box corners at
    /// [`root::OCCLUSION_BOUNDS`], draws one point inside a binary occlusion
    /// query, then resolves the result into the slot's buffer (transitioned
    /// to copy-destination and back to predication around the resolve).
    ///
    /// Nodes outside `frustum` keep their slot but record nothing; their
    /// draws are frustum-culled before predication matters.
    pub fn run(
        &mut self,
        node: NodeId,
        bounds: &AabbVolume,
        command_list: &mut dyn CommandList,
        frustum: &FrustumVolume,
    ) -> OcclusionResult<QueryOutcome> {
        if self.heap.is_none() {
            return Err(OcclusionError::NotCreated);
        }
        let slot = self.assign_slot(node)?;
        if !frustum.intersects(bounds) {
            log::trace!("Node {node:?} outside frustum, occlusion query skipped");
            return Ok(QueryOutcome::Culled { slot });
        }
        let heap = self.heap.as_ref().ok_or(OcclusionError::NotCreated)?;
        let result = heap.results[slot as usize];

        command_list.set_primitive_topology(PrimitiveTopology::PointList)?;
        command_list.set_constants_f32(root::OCCLUSION_BOUNDS, bounds.min().as_slice(), 0)?;
        command_list.set_constants_f32(root::OCCLUSION_BOUNDS, bounds.max().as_slice(), root::BOUNDS_MAX_OFFSET)?;

        command_list.begin_query(heap.heap, QueryType::BinaryOcclusion, slot)?;
        command_list.draw(1)?;
        command_list.end_query(heap.heap, QueryType::BinaryOcclusion, slot)?;

        command_list.transition_barrier(result.into(), ResourceState::CopyDest)?;
        command_list.resolve_query_data(heap.heap, QueryType::BinaryOcclusion, slot, result, 0)?;
        command_list.transition_barrier(result.into(), ResourceState::Predication)?;

        Ok(QueryOutcome::Issued { slot })
    }

    /// Bind the node's result buffer as predicate, or clear the predicate
    /// when the node has no slot
    pub fn set_predication(&self, node: NodeId, command_list: &mut dyn CommandList) -> OcclusionResult<()> {
        if self.heap.is_none() {
            return Err(OcclusionError::NotCreated);
        }
        command_list.set_predication(self.result_buffer(node), 0, OCCLUSION_PREDICATE_OP)?;
        Ok(())
    }
}
