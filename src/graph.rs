//! The compiled, executable graph returned by `Builder::build()`. Owns its
//! final passes and resources, the scheduling result, validation result,
//! and cache key, plus the mutable-at-execution-time tracker/profiler/stats.

use std::sync::{Arc, Mutex};

use fxhash::FxHashMap;

use crate::capability::{FrameContext, PassCostProfiler};
use crate::cache::CacheKey;
use crate::config::RenderGraphConfig;
use crate::descriptor::ResourceDescriptor;
use crate::diagnostics::ValidationResult;
use crate::executor::{self, ExecutionStats};
use crate::handle::{PassHandle, ResourceHandle};
use crate::pass::Pass;
use crate::scheduler::SchedulingResult;
use crate::tracker::ResourceStateTracker;

/// A validated, scheduled execution plan for one frame's worth of passes.
/// Shared across frames via `Arc` when served from the `Cache`, so its
/// execution-time state (tracker, profiler, stats) is interior-mutable.
pub struct Graph {
    resources: FxHashMap<ResourceHandle, ResourceDescriptor>,
    passes: Vec<Pass>,
    explicit_dependencies: FxHashMap<PassHandle, Vec<PassHandle>>,
    scheduling: SchedulingResult,
    validation: ValidationResult,
    cache_key: CacheKey,
    config: RenderGraphConfig,
    cost_profiler: Mutex<Option<Arc<dyn PassCostProfiler>>>,
    tracker: Mutex<ResourceStateTracker>,
    execution_stats: Mutex<ExecutionStats>,
}

impl Graph {
    pub(crate) fn new(
        resources: FxHashMap<ResourceHandle, ResourceDescriptor>,
        passes: Vec<Pass>,
        explicit_dependencies: FxHashMap<PassHandle, Vec<PassHandle>>,
        scheduling: SchedulingResult,
        validation: ValidationResult,
        cache_key: CacheKey,
        config: RenderGraphConfig,
    ) -> Self {
        Graph {
            resources,
            passes,
            explicit_dependencies,
            scheduling,
            validation,
            cache_key,
            config,
            cost_profiler: Mutex::new(None),
            tracker: Mutex::new(ResourceStateTracker::new()),
            execution_stats: Mutex::new(ExecutionStats::default()),
        }
    }

    /// An empty, valid graph — the "empty builder" boundary case, and the
    /// fixture a `Cache` test double needs without pulling in a `Builder`.
    #[cfg(test)]
    pub fn empty_for_test() -> Self {
        Graph::new(
            FxHashMap::default(),
            Vec::new(),
            FxHashMap::default(),
            SchedulingResult::default(),
            ValidationResult::new(),
            CacheKey { structure_hash: 0, resource_hash: 0, viewport_hash: 0, view_count: 0 },
            RenderGraphConfig::default(),
        )
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn resources(&self) -> &FxHashMap<ResourceHandle, ResourceDescriptor> {
        &self.resources
    }

    pub fn explicit_dependencies(&self) -> &FxHashMap<PassHandle, Vec<PassHandle>> {
        &self.explicit_dependencies
    }

    pub fn execution_order(&self) -> &[PassHandle] {
        &self.scheduling.execution_order
    }

    pub fn scheduling_result(&self) -> &SchedulingResult {
        &self.scheduling
    }

    pub fn get_validation_result(&self) -> &ValidationResult {
        &self.validation
    }

    pub fn cache_key(&self) -> CacheKey {
        self.cache_key
    }

    pub fn execution_stats(&self) -> ExecutionStats {
        self.execution_stats.lock().unwrap().clone()
    }

    pub fn set_pass_cost_profiler(&self, profiler: Arc<dyn PassCostProfiler>) {
        *self.cost_profiler.lock().unwrap() = Some(profiler);
    }

    /// Runs the graph for one frame: plan-transitions, execute-pass-batches,
    /// present-results. A no-op when there are no passes. `&self`
    /// rather than `&mut self` — a cached graph is shared across frames via
    /// `Arc<Graph>` and re-executed on each one.
    pub async fn execute(&self, frame_context: &dyn FrameContext) {
        if self.passes.is_empty() {
            return;
        }

        let profiler = self.cost_profiler.lock().unwrap().clone();
        let cancel = tokio_util::sync::CancellationToken::new();

        // Take the tracker out of the mutex for the duration of the await:
        // a std `MutexGuard` held across `.await` would make this future
        // non-`Send`, which would break callers that `tokio::spawn` it.
        let mut tracker = std::mem::take(&mut *self.tracker.lock().unwrap());

        let stats = executor::run(
            &self.passes,
            &self.resources,
            self.execution_order(),
            &self.explicit_dependencies,
            &self.config,
            &mut tracker,
            profiler,
            frame_context,
            cancel,
        )
        .await;

        *self.tracker.lock().unwrap() = tracker;
        *self.execution_stats.lock().unwrap() = stats;
    }
}
