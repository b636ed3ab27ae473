//! Pipeline statistics query wrapped around a render pass

use crate::gpu::{
    BufferDesc, BufferHandle, CommandList, GpuError, GpuResources, GpuResult, PipelineStatistics,
    QueryHeapHandle, QueryType,
};

/// Single pipeline statistics query resolved into a readback buffer
///
/// `begin` and `end` bracket the work to measure; `resolve` copies the
/// counters into CPU-readable memory. [`StatisticsQuery::statistics`] reads
/// whatever was resolved last, so callers read it once the frame that
/// resolved it has completed.
pub struct StatisticsQuery {
    heap: QueryHeapHandle,
    readback: BufferHandle,
    active: bool,
}

impl StatisticsQuery {
    /// Allocate the query heap and readback buffer
    pub fn new(resources: &dyn GpuResources) -> GpuResult<Self> {
        let heap = resources.create_query_heap(QueryType::PipelineStatistics, 1)?;
        let readback = resources.create_buffer(&BufferDesc::readback(
            "Pipeline Statistics",
            QueryType::PipelineStatistics.result_size(),
        ))?;
        Ok(Self { heap, readback, active: false })
    }

    /// Start counting
    pub fn begin(&mut self, command_list: &mut dyn CommandList) -> GpuResult<()> {
        if self.active {
            return Err(GpuError::Device("statistics query already active".to_string()));
        }
        command_list.begin_query(self.heap, QueryType::PipelineStatistics, 0)?;
        self.active = true;
        Ok(())
    }

    /// Stop counting
    pub fn end(&mut self, command_list: &mut dyn CommandList) -> GpuResult<()> {
        if !self.active {
            return Err(GpuError::Device("statistics query was not started".to_string()));
        }
        command_list.end_query(self.heap, QueryType::PipelineStatistics, 0)?;
        self.active = false;
        Ok(())
    }

    /// Forget a query left open by a command list that was never submitted
    pub fn reset(&mut self) {
        if self.active {
            log::debug!("Discarding open statistics query");
        }
        self.active = false;
    }

    /// Whether `begin` was recorded without a matching `end`
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Copy the counters into the readback buffer
    pub fn resolve(&self, command_list: &mut dyn CommandList) -> GpuResult<()> {
        command_list.resolve_query_data(self.heap, QueryType::PipelineStatistics, 0, self.readback, 0)
    }

    /// Last resolved counters
    pub fn statistics(&self, resources: &dyn GpuResources) -> GpuResult<PipelineStatistics> {
        let bytes = resources.read_buffer(self.readback, 0, QueryType::PipelineStatistics.result_size())?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;
    use crate::gpu::{GpuDevice, PipelineDesc, PrimitiveTopology, QueueType};

    #[test]
    fn test_counts_draws_between_begin_and_end() {
        let device = RecordingDevice::new();
        let pipeline = device
            .create_pipeline(&PipelineDesc::new("triangles", PrimitiveTopology::TriangleList, true, true))
            .unwrap();
        let mut query = StatisticsQuery::new(&device).unwrap();

        let mut list = device.create_command_list(QueueType::Direct, Some(pipeline)).unwrap();
        list.draw(30).unwrap();
        query.begin(&mut list).unwrap();
        list.draw(3).unwrap();
        list.draw(6).unwrap();
        query.end(&mut list).unwrap();
        query.resolve(&mut list).unwrap();
        list.close().unwrap();
        device.execute_command_lists(QueueType::Direct, &[&list]).unwrap();

        let stats = query.statistics(&device).unwrap();
        assert_eq!(stats.ia_primitives, 3);
        assert_eq!(stats.vs_invocations, 9);
        assert_eq!(stats.ps_invocations, 3);
    }

    #[test]
    fn test_unbalanced_end_is_rejected() {
        let device = RecordingDevice::new();
        let mut query = StatisticsQuery::new(&device).unwrap();
        let mut list = device.create_command_list(QueueType::Direct, None).unwrap();

        assert!(query.end(&mut list).is_err());
        query.begin(&mut list).unwrap();
        assert!(query.begin(&mut list).is_err());
    }

    #[test]
    fn test_reset_forgets_an_abandoned_begin() {
        let device = RecordingDevice::new();
        let mut query = StatisticsQuery::new(&device).unwrap();
        let mut abandoned = device.create_command_list(QueueType::Direct, None).unwrap();
        query.begin(&mut abandoned).unwrap();

        let mut list = device.create_command_list(QueueType::Direct, None).unwrap();
        assert!(query.begin(&mut list).is_err());
        query.reset();
        assert!(!query.is_active());
        query.begin(&mut list).unwrap();
        assert!(query.is_active());
    }
}
