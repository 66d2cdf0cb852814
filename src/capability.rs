//! Host-provided capability interfaces. The core consumes these narrow
//! traits and never reaches past them into a concrete GPU backend,
//! windowing system, or bindless allocator.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::handle::{PassHandle, ResourceHandle, ViewIndex};

/// A camera/perspective the frame is being rendered for.
#[derive(Clone, Debug)]
pub struct ViewInfo {
    pub view_name: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// The containing frame's view set, thread pool, and graphics capability.
/// Provided once per frame by the host; the core only ever borrows it.
pub trait FrameContext: Send + Sync {
    fn views(&self) -> &[ViewInfo];
    fn frame_index(&self) -> u64;
    fn thread_pool(&self) -> Option<&dyn ThreadPool>;
    fn acquire_graphics(&self) -> Option<&dyn GraphicsLayer>;
}

/// The opaque GPU backend: textures, command lists, fences. Never
/// implemented by the core; real implementations plug in.
pub trait GraphicsLayer: Send + Sync {
    fn allocate_descriptor(&self) -> u32;
    fn schedule_resource_reclaim(&self, resource: ResourceHandle, frame_index: u64, debug_name: &str);
    fn validate_integration_state(&self) -> bool;
    fn get_integration_stats(&self) -> IntegrationStats;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IntegrationStats {
    pub active_resources: u64,
    pub allocated_descriptors: u64,
    pub pending_reclaims: u64,
}

/// The host-supplied worker pool. `run` hands a unit of work to a worker
/// thread and returns once it completes (or is cancelled); the executor's
/// parallel-path batches await several of these concurrently.
#[async_trait]
pub trait ThreadPool: Send + Sync {
    async fn run(&self, work: Box<dyn FnOnce() + Send>, cancel: CancellationToken);

    /// Number of worker threads backing the pool. Used by the executor to
    /// decide whether a batch is worth parallelizing.
    fn worker_count(&self) -> usize;
}

/// Optional per-pass cost profiler. When present, the scheduler's
/// cost-aware refinement uses its *updated* costs instead of the synthetic
/// model.
pub trait PassCostProfiler: Send + Sync {
    fn begin_pass(&self, pass: PassHandle);
    fn end_pass(&self, pass: PassHandle);
    fn record_cpu_time(&self, pass: PassHandle, micros: u64);
    fn record_gpu_time(&self, pass: PassHandle, micros: u64);
    /// Returns (cpu_us, gpu_us, memory_bytes) if this pass has been
    /// profiled at least once.
    fn get_updated_cost(&self, pass: PassHandle) -> Option<(u64, u64, u64)>;
}

/// Per-invocation context handed to a pass executor. Each parallel
/// invocation constructs its own; it is never shared between concurrently
/// running invocations.
#[derive(Default)]
pub struct TaskExecutionContext {
    pub view_index: Option<ViewIndex>,
    pub parallel: bool,
    pub frame_index: u64,
}

impl TaskExecutionContext {
    pub fn with_view(mut self, view: ViewIndex) -> Self {
        self.view_index = Some(view);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_execution_context_defaults_to_no_view() {
        let ctx = TaskExecutionContext::default();
        assert!(ctx.view_index.is_none());
        assert!(!ctx.parallel);
    }
}
