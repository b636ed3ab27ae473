//! Command execution for the software device

use std::collections::HashMap;

use super::command_list::Command;
use super::device::{DeviceState, ExecutionEvent, QueryResults};
use crate::foundation::math::Vec3;
use crate::gpu::error::{GpuError, GpuResult};
use crate::gpu::types::{
    BufferHandle, IndexBufferView, PipelineHandle, PipelineStatistics, PredicationOp,
    PrimitiveTopology, QueryHeapHandle, QueryType, QueueType, ResourceId, ResourceState,
    VertexBufferView,
};

struct ActiveQuery {
    heap: QueryHeapHandle,
    query_type: QueryType,
    index: u32,
    passed: bool,
    statistics: PipelineStatistics,
}

/// Per-command-list pipeline state; nothing carries over between lists
#[derive(Default)]
struct ExecutionContext {
    pipeline: Option<PipelineHandle>,
    topology: Option<PrimitiveTopology>,
    constants: HashMap<u32, Vec<u32>>,
    vertex_buffers: HashMap<u32, VertexBufferView>,
    index_buffer: Option<IndexBufferView>,
    predicate: Option<(BufferHandle, u64, PredicationOp)>,
    active_queries: Vec<ActiveQuery>,
}

fn expect_state(name: &str, actual: ResourceState, expected: &[ResourceState]) -> GpuResult<()> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(GpuError::InvalidResourceState {
            resource: name.to_string(),
            expected: expected[0],
            actual,
        })
    }
}

impl DeviceState {
    pub(super) fn execute(&mut self, queue: QueueType, name: &str, commands: &[Command]) -> GpuResult<()> {
        self.record(ExecutionEvent::CommandListBegin { queue, name: name.to_string() });
        self.stats.command_lists_executed += 1;

        let mut context = ExecutionContext::default();
        for command in commands {
            let suppressed = self.apply(&mut context, command)?;
            self.record(ExecutionEvent::Command {
                queue,
                command_list: name.to_string(),
                command: command.clone(),
                suppressed,
            });
        }

        if let Some(query) = context.active_queries.first() {
            return Err(GpuError::Device(format!(
                "command list '{name}' ended with query {} still active",
                query.index
            )));
        }
        Ok(())
    }

    /// Apply one command; returns true when a draw was predicated away
    fn apply(&mut self, context: &mut ExecutionContext, command: &Command) -> GpuResult<bool> {
        match command {
            Command::SetPipeline(pipeline) => {
                if !self.pipelines.contains_key(*pipeline) {
                    return Err(GpuError::InvalidHandle("pipeline"));
                }
                context.pipeline = Some(*pipeline);
            }
            Command::SetViewport(_) | Command::BeginEvent(_) | Command::EndEvent => {}
            Command::SetRenderTargets { color, depth } => {
                for texture in color.iter().chain(depth.iter()) {
                    self.texture_mut(*texture)?;
                }
            }
            Command::ClearRenderTarget { target, .. } => {
                let texture = self.texture_mut(*target)?;
                expect_state(&texture.name, texture.state, &[ResourceState::RenderTarget])?;
            }
            Command::ClearDepth { target, .. } => {
                let texture = self.texture_mut(*target)?;
                expect_state(&texture.name, texture.state, &[ResourceState::DepthWrite])?;
            }
            Command::TransitionBarrier { resource, after } => match resource {
                ResourceId::Buffer(buffer) => self.buffer_mut(*buffer)?.state = *after,
                ResourceId::Texture(texture) => self.texture_mut(*texture)?.state = *after,
            },
            Command::CopyResource { source, destination } => self.copy_resource(*source, *destination)?,
            Command::SetPrimitiveTopology(topology) => context.topology = Some(*topology),
            Command::SetConstants { root_index, offset, values } => {
                let slot = context.constants.entry(*root_index).or_default();
                let start = *offset as usize;
                if slot.len() < start + values.len() {
                    slot.resize(start + values.len(), 0);
                }
                slot[start..start + values.len()].copy_from_slice(values);
            }
            Command::SetShaderResource { buffer, .. } | Command::SetConstantBuffer { buffer, .. } => {
                self.buffer(*buffer)?;
            }
            Command::SetDescriptorTable { texture, .. } => {
                self.texture_mut(*texture)?;
            }
            Command::SetVertexBuffer { slot, view } => {
                self.buffer(view.buffer)?;
                context.vertex_buffers.insert(*slot, *view);
            }
            Command::SetIndexBuffer(view) => {
                self.buffer(view.buffer)?;
                context.index_buffer = Some(*view);
            }
            Command::Draw { vertex_count } => return self.draw(context, *vertex_count, false),
            Command::DrawIndexed { index_count } => return self.draw(context, *index_count, true),
            Command::BeginQuery { heap, query_type, index } => {
                self.check_query(*heap, *query_type, *index)?;
                if context.active_queries.iter().any(|q| q.heap == *heap && q.index == *index) {
                    return Err(GpuError::Device(format!("query {index} is already active")));
                }
                context.active_queries.push(ActiveQuery {
                    heap: *heap,
                    query_type: *query_type,
                    index: *index,
                    passed: false,
                    statistics: PipelineStatistics::default(),
                });
            }
            Command::EndQuery { heap, query_type, index } => {
                self.check_query(*heap, *query_type, *index)?;
                let position = context
                    .active_queries
                    .iter()
                    .position(|q| q.heap == *heap && q.index == *index)
                    .ok_or_else(|| GpuError::Device(format!("query {index} ended without being started")))?;
                let query = context.active_queries.remove(position);
                self.store_query(&query)?;
            }
            Command::ResolveQueryData { heap, query_type, index, destination, offset } => {
                self.resolve_query(*heap, *query_type, *index, *destination, *offset)?;
            }
            Command::SetPredication { buffer, offset, op } => {
                context.predicate = match buffer {
                    Some(handle) => {
                        let predicate = self.buffer(*handle)?;
                        expect_state(&predicate.name, predicate.state, &[ResourceState::Predication])?;
                        Some((*handle, *offset, *op))
                    }
                    None => None,
                };
            }
        }
        Ok(false)
    }

    fn draw(&mut self, context: &mut ExecutionContext, count: u32, indexed: bool) -> GpuResult<bool> {
        let pipeline = context
            .pipeline
            .ok_or_else(|| GpuError::Device("draw issued without a pipeline".to_string()))?;
        let topology = match context.topology {
            Some(topology) => topology,
            None => self.pipelines.get(pipeline).ok_or(GpuError::InvalidHandle("pipeline"))?.topology,
        };

        if indexed {
            let index_buffer = context
                .index_buffer
                .ok_or_else(|| GpuError::Device("indexed draw without an index buffer".to_string()))?;
            let buffer = self.buffer(index_buffer.buffer)?;
            expect_state(&buffer.name, buffer.state, &[ResourceState::IndexBuffer])?;
            for view in context.vertex_buffers.values() {
                let buffer = self.buffer(view.buffer)?;
                expect_state(&buffer.name, buffer.state, &[ResourceState::VertexAndConstantBuffer])?;
            }
        }

        if let Some((buffer, offset, op)) = context.predicate {
            if op.suppresses(self.read_u64(buffer, offset)?) {
                self.stats.draws_suppressed += 1;
                return Ok(true);
            }
        }
        self.stats.draws_executed += 1;

        let primitives = topology.primitive_count(count);
        let visible = primitives > 0 && self.sample_visibility(context, topology);
        for query in &mut context.active_queries {
            match query.query_type {
                QueryType::BinaryOcclusion => query.passed |= visible,
                QueryType::PipelineStatistics => {
                    let stats = &mut query.statistics;
                    stats.ia_vertices += u64::from(count);
                    stats.ia_primitives += primitives;
                    stats.vs_invocations += u64::from(count);
                    stats.c_invocations += primitives;
                    stats.c_primitives += primitives;
                    stats.ps_invocations += primitives;
                }
            }
        }
        Ok(false)
    }

    fn sample_visibility(&self, context: &ExecutionContext, topology: PrimitiveTopology) -> bool {
        let Some(visibility) = &self.visibility else {
            return true;
        };
        if topology != PrimitiveTopology::PointList {
            return true;
        }
        match context.constants.get(&visibility.bounds_root) {
            Some(values) if values.len() >= 7 => {
                let min = Vec3::new(f32::from_bits(values[0]), f32::from_bits(values[1]), f32::from_bits(values[2]));
                let max = Vec3::new(f32::from_bits(values[4]), f32::from_bits(values[5]), f32::from_bits(values[6]));
                (visibility.test)(&min, &max)
            }
            _ => true,
        }
    }

    fn check_query(&self, heap: QueryHeapHandle, query_type: QueryType, index: u32) -> GpuResult<()> {
        let results = self.query_heaps.get(heap).ok_or(GpuError::InvalidHandle("query heap"))?;
        if results.query_type() != query_type {
            return Err(GpuError::Device(format!("{query_type:?} query used on a {:?} heap", results.query_type())));
        }
        if index as usize >= results.len() {
            return Err(GpuError::QueryOutOfRange { index, count: results.len() as u32 });
        }
        Ok(())
    }

    fn store_query(&mut self, query: &ActiveQuery) -> GpuResult<()> {
        let results = self.query_heaps.get_mut(query.heap).ok_or(GpuError::InvalidHandle("query heap"))?;
        let index = query.index as usize;
        match results {
            QueryResults::Occlusion(values) => values[index] = u64::from(query.passed),
            QueryResults::Statistics(values) => values[index] = query.statistics,
        }
        Ok(())
    }

    fn resolve_query(
        &mut self,
        heap: QueryHeapHandle,
        query_type: QueryType,
        index: u32,
        destination: BufferHandle,
        offset: u64,
    ) -> GpuResult<()> {
        self.check_query(heap, query_type, index)?;
        let bytes = match self.query_heaps.get(heap).ok_or(GpuError::InvalidHandle("query heap"))? {
            QueryResults::Occlusion(values) => values[index as usize].to_le_bytes().to_vec(),
            QueryResults::Statistics(values) => bytemuck::bytes_of(&values[index as usize]).to_vec(),
        };

        let target = self.buffer_mut(destination)?;
        expect_state(&target.name, target.state, &[ResourceState::CopyDest])?;
        let start = offset as usize;
        let Some(slot) = target.data.get_mut(start..start + bytes.len()) else {
            return Err(GpuError::Device(format!("query resolve past the end of buffer '{}'", target.name)));
        };
        slot.copy_from_slice(&bytes);
        self.stats.queries_resolved += 1;
        Ok(())
    }

    fn copy_resource(&mut self, source: ResourceId, destination: ResourceId) -> GpuResult<()> {
        match (source, destination) {
            (ResourceId::Buffer(source), ResourceId::Buffer(destination)) => {
                let from = self.buffer(source)?;
                expect_state(&from.name, from.state, &[ResourceState::CopySource, ResourceState::GenericRead])?;
                let data = from.data.clone();

                let to = self.buffer_mut(destination)?;
                expect_state(&to.name, to.state, &[ResourceState::CopyDest])?;
                let len = data.len().min(to.data.len());
                to.data[..len].copy_from_slice(&data[..len]);
            }
            (ResourceId::Texture(source), ResourceId::Texture(destination)) => {
                let from = self.texture_mut(source)?;
                expect_state(&from.name, from.state, &[ResourceState::CopySource])?;
                let to = self.texture_mut(destination)?;
                expect_state(&to.name, to.state, &[ResourceState::CopyDest])?;
            }
            _ => return Err(GpuError::Device("copy between a buffer and a texture".to_string())),
        }
        Ok(())
    }

    fn read_u64(&self, buffer: BufferHandle, offset: u64) -> GpuResult<u64> {
        let source = self.buffer(buffer)?;
        let start = offset as usize;
        source
            .data
            .get(start..start + 8)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or_else(|| GpuError::Device(format!("predicate read past the end of buffer '{}'", source.name)))
    }
}

#[cfg(test)]
mod tests {
    use crate::gpu::recording::{RecordingCommandList, RecordingDevice};
    use crate::gpu::*;

    struct Fixture {
        device: RecordingDevice,
        heap: QueryHeapHandle,
        result: BufferHandle,
        points: PipelineHandle,
    }

    fn fixture() -> Fixture {
        let device = RecordingDevice::new();
        let heap = device.create_query_heap(QueryType::BinaryOcclusion, 2).unwrap();
        let result = device
            .create_buffer(&BufferDesc::new("result", 8, BufferUsage::PREDICATION, ResourceState::Predication))
            .unwrap();
        let points = device
            .create_pipeline(&PipelineDesc::new("points", PrimitiveTopology::PointList, false, false))
            .unwrap();
        device.set_visibility_test(1, |min, _max| min.x < 10.0).unwrap();
        Fixture { device, heap, result, points }
    }

    fn query_box(f: &Fixture, list: &mut RecordingCommandList, min_x: f32) {
        list.set_primitive_topology(PrimitiveTopology::PointList).unwrap();
        list.set_constants_f32(1, &[min_x, 0.0, 0.0], 0).unwrap();
        list.set_constants_f32(1, &[min_x + 1.0, 1.0, 1.0], 4).unwrap();
        list.begin_query(f.heap, QueryType::BinaryOcclusion, 0).unwrap();
        list.draw(1).unwrap();
        list.end_query(f.heap, QueryType::BinaryOcclusion, 0).unwrap();
        list.transition_barrier(f.result.into(), ResourceState::CopyDest).unwrap();
        list.resolve_query_data(f.heap, QueryType::BinaryOcclusion, 0, f.result, 0).unwrap();
        list.transition_barrier(f.result.into(), ResourceState::Predication).unwrap();
    }

    fn predicated_draw(f: &Fixture, list: &mut RecordingCommandList) {
        list.set_predication(Some(f.result), 0, PredicationOp::EqualZero).unwrap();
        list.draw(3).unwrap();
        list.set_predication(None, 0, PredicationOp::EqualZero).unwrap();
        list.draw(3).unwrap();
    }

    fn run(f: &Fixture, min_x: f32) -> Vec<u8> {
        let mut list = f.device.create_command_list(QueueType::Direct, Some(f.points)).unwrap();
        query_box(f, &mut list, min_x);
        predicated_draw(f, &mut list);
        list.close().unwrap();
        f.device.execute_command_lists(QueueType::Direct, &[&list]).unwrap();
        f.device.buffer_contents(f.result).unwrap()
    }

    #[test]
    fn test_visible_box_resolves_one_and_draws() {
        let f = fixture();

        assert_eq!(run(&f, 0.0), 1u64.to_le_bytes().to_vec());
        let stats = f.device.stats().unwrap();
        assert_eq!(stats.draws_executed, 3);
        assert_eq!(stats.draws_suppressed, 0);
        assert_eq!(stats.queries_resolved, 1);
    }

    #[test]
    fn test_hidden_box_suppresses_predicated_draw_only() {
        let f = fixture();

        assert_eq!(run(&f, 50.0), 0u64.to_le_bytes().to_vec());
        let stats = f.device.stats().unwrap();
        assert_eq!(stats.draws_suppressed, 1);
        assert_eq!(stats.draws_executed, 2);
    }

    #[test]
    fn test_resolve_requires_copy_dest() {
        let f = fixture();
        let mut list = f.device.create_command_list(QueueType::Direct, Some(f.points)).unwrap();
        list.begin_query(f.heap, QueryType::BinaryOcclusion, 1).unwrap();
        list.end_query(f.heap, QueryType::BinaryOcclusion, 1).unwrap();
        list.resolve_query_data(f.heap, QueryType::BinaryOcclusion, 1, f.result, 0).unwrap();
        list.close().unwrap();

        assert!(matches!(
            f.device.execute_command_lists(QueueType::Direct, &[&list]),
            Err(GpuError::InvalidResourceState { expected: ResourceState::CopyDest, actual: ResourceState::Predication, .. })
        ));
    }

    #[test]
    fn test_query_index_is_bounded() {
        let f = fixture();
        let mut list = f.device.create_command_list(QueueType::Direct, Some(f.points)).unwrap();
        list.begin_query(f.heap, QueryType::BinaryOcclusion, 2).unwrap();
        list.close().unwrap();

        assert_eq!(
            f.device.execute_command_lists(QueueType::Direct, &[&list]),
            Err(GpuError::QueryOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn test_predication_does_not_leak_across_lists() {
        let f = fixture();
        run(&f, 50.0);

        let mut list = f.device.create_command_list(QueueType::Direct, Some(f.points)).unwrap();
        list.draw(3).unwrap();
        list.close().unwrap();
        f.device.execute_command_lists(QueueType::Direct, &[&list]).unwrap();

        assert_eq!(f.device.stats().unwrap().draws_executed, 3);
    }

    #[test]
    fn test_statistics_count_executed_triangles() {
        let device = RecordingDevice::new();
        let heap = device.create_query_heap(QueryType::PipelineStatistics, 1).unwrap();
        let readback = device
            .create_buffer(&BufferDesc::readback("stats", QueryType::PipelineStatistics.result_size()))
            .unwrap();
        let triangles = device
            .create_pipeline(&PipelineDesc::new("triangles", PrimitiveTopology::TriangleList, true, true))
            .unwrap();

        let mut list = device.create_command_list(QueueType::Direct, Some(triangles)).unwrap();
        list.begin_query(heap, QueryType::PipelineStatistics, 0).unwrap();
        list.draw(6).unwrap();
        list.draw(3).unwrap();
        list.end_query(heap, QueryType::PipelineStatistics, 0).unwrap();
        list.resolve_query_data(heap, QueryType::PipelineStatistics, 0, readback, 0).unwrap();
        list.close().unwrap();
        device.execute_command_lists(QueueType::Direct, &[&list]).unwrap();

        let bytes = device.read_buffer(readback, 0, QueryType::PipelineStatistics.result_size()).unwrap();
        let stats: PipelineStatistics = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(stats.ia_vertices, 9);
        assert_eq!(stats.ia_primitives, 3);
        assert_eq!(stats.vs_invocations, 9);
    }
}
