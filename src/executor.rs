//! Coroutine-driven batch executor. Plans resource-state transitions,
//! builds level-set batches from the scheduler's execution order, and
//! dispatches each batch serially or across the host's worker pool,
//! honoring cancellation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use fxhash::FxHashMap;
use futures::future::join_all;
use log::{debug, error};
use tokio_util::sync::CancellationToken;

use crate::capability::{FrameContext, GraphicsLayer, PassCostProfiler, TaskExecutionContext, ThreadPool};
use crate::config::RenderGraphConfig;
use crate::descriptor::ResourceDescriptor;
use crate::handle::{PassHandle, ResourceHandle, ViewIndex};
use crate::pass::Pass;
use crate::state::{ResourceLifetime, ResourceState, Scope};
use crate::tracker::ResourceStateTracker;

/// Recorded once per `Graph::execute` call: per-batch width and (when the
/// batch ran in parallel) the measured speedup, plus total wall time.
#[derive(Clone, Debug, Default)]
pub struct ExecutionStats {
    pub batch_widths: Vec<usize>,
    pub batch_speedups: Vec<Option<f64>>,
    pub total_wall_us: u64,
    pub cancelled: bool,
}

/// Each final-graph pass invokes exactly once: per-view expansion already
/// materialized one concrete `Pass` per active view at build time,
/// so by execute time every pass's `view_index` is already fixed — there is
/// no further run-time fan-out by scope.
pub fn invocation_view(pass: &Pass) -> Option<ViewIndex> {
    match pass.scope {
        Scope::Viewless => None,
        Scope::Shared | Scope::PerView => Some(pass.view_index),
    }
}

/// Resets the tracker, seeds every resource to `Undefined`, then walks the
/// execution order requesting a transition per declared read/write.
pub fn plan_transitions(
    tracker: &mut ResourceStateTracker,
    resources: &FxHashMap<ResourceHandle, ResourceDescriptor>,
    passes_by_handle: &FxHashMap<PassHandle, &Pass>,
    execution_order: &[PassHandle],
) {
    tracker.reset();
    for &resource in resources.keys() {
        tracker.set_initial_state(resource, ResourceState::Undefined, ViewIndex(0));
    }

    for &handle in execution_order {
        let Some(&pass) = passes_by_handle.get(&handle) else { continue };
        let view = invocation_view(pass).unwrap_or(ViewIndex(0));
        for (i, &r) in pass.reads.iter().enumerate() {
            tracker.request_transition(r, pass.read_states[i], pass.handle, view);
        }
        for (i, &r) in pass.writes.iter().enumerate() {
            tracker.request_transition(r, pass.write_states[i], pass.handle, view);
        }
    }
}

/// Level-set batches from the execution order and its (possibly rewritten)
/// explicit-dependency map: a FIFO ready-queue drained one level at a time.
/// Returns `None` if fewer passes were scheduled than exist (a cycle).
pub fn build_batches(
    execution_order: &[PassHandle],
    deps: &FxHashMap<PassHandle, Vec<PassHandle>>,
) -> Option<Vec<Vec<PassHandle>>> {
    let mut remaining: FxHashMap<PassHandle, usize> = FxHashMap::default();
    let mut dependents: FxHashMap<PassHandle, Vec<PassHandle>> = FxHashMap::default();

    for &p in execution_order {
        let preds = deps.get(&p).cloned().unwrap_or_default();
        remaining.insert(p, preds.len());
        for pred in preds {
            dependents.entry(pred).or_default().push(p);
        }
    }

    let mut queue: VecDeque<PassHandle> = execution_order.iter().copied().filter(|p| remaining[p] == 0).collect();
    let mut batches = Vec::new();
    let mut scheduled = 0usize;

    while !queue.is_empty() {
        let level: Vec<PassHandle> = queue.drain(..).collect();
        scheduled += level.len();
        let mut next_ready = Vec::new();
        for &p in &level {
            if let Some(succs) = dependents.get(&p) {
                for &d in succs {
                    if let Some(r) = remaining.get_mut(&d) {
                        *r -= 1;
                        if *r == 0 {
                            next_ready.push(d);
                        }
                    }
                }
            }
        }
        batches.push(level);
        queue = next_ready.into();
    }

    if scheduled < execution_order.len() {
        let stuck: Vec<PassHandle> = execution_order.iter().filter(|p| remaining[p] > 0).copied().collect();
        error!("executor: circular dependency building batches, stuck passes: {:?}", stuck);
        return None;
    }

    Some(batches)
}

fn invoke_inline(pass: &Pass, frame_index: u64, parallel: bool, profiler: Option<&Arc<dyn PassCostProfiler>>) -> u64 {
    let mut ctx = TaskExecutionContext { view_index: invocation_view(pass), parallel, frame_index };
    if let Some(p) = profiler {
        p.begin_pass(pass.handle);
    }
    let start = Instant::now();
    pass.executor.invoke(&mut ctx);
    let elapsed_us = start.elapsed().as_micros() as u64;
    if let Some(p) = profiler {
        p.record_cpu_time(pass.handle, elapsed_us);
        p.end_pass(pass.handle);
    }
    elapsed_us
}

/// Runs one batch. `can_parallel` requires parallelism enabled, a batch
/// wide enough per `parallel_min_batch_width`, and a thread pool. Returns
/// (sum of per-pass wall time, speedup if the batch ran in parallel).
async fn run_batch(
    batch: &[PassHandle],
    passes_by_handle: &FxHashMap<PassHandle, &Pass>,
    config: &RenderGraphConfig,
    frame_index: u64,
    thread_pool: Option<&dyn ThreadPool>,
    profiler: Option<&Arc<dyn PassCostProfiler>>,
    cancel: &CancellationToken,
) -> (u64, Option<f64>) {
    let can_parallel = config.parallel_enabled && batch.len() >= config.parallel_min_batch_width && thread_pool.is_some();

    if !can_parallel {
        let mut sum_us = 0u64;
        for &handle in batch {
            if let Some(&pass) = passes_by_handle.get(&handle) {
                sum_us += invoke_inline(pass, frame_index, false, profiler);
            }
        }
        return (sum_us, None);
    }

    let pool = thread_pool.unwrap();
    let wall_start = Instant::now();
    let mut sum_cpu_us = 0u64;
    let mut futures = Vec::with_capacity(batch.len());

    for &handle in batch {
        let Some(&pass) = passes_by_handle.get(&handle) else { continue };
        if pass.requires_main_thread {
            sum_cpu_us += invoke_inline(pass, frame_index, false, profiler);
            continue;
        }

        let executor = pass.executor.clone();
        let view = invocation_view(pass);
        let handle_id = pass.handle;
        let profiler_owned = profiler.cloned();
        let cancel_child = cancel.clone();

        let work: Box<dyn FnOnce() + Send> = Box::new(move || {
            let mut ctx = TaskExecutionContext { view_index: view, parallel: true, frame_index };
            if let Some(p) = &profiler_owned {
                p.begin_pass(handle_id);
            }
            let start = Instant::now();
            executor.invoke(&mut ctx);
            let elapsed_us = start.elapsed().as_micros() as u64;
            if let Some(p) = &profiler_owned {
                p.record_cpu_time(handle_id, elapsed_us);
                p.end_pass(handle_id);
            }
        });
        futures.push(pool.run(work, cancel_child));
    }

    join_all(futures).await;
    let wall_us = wall_start.elapsed().as_micros() as u64;

    for &handle in batch {
        if let Some(&pass) = passes_by_handle.get(&handle) {
            if let Some(p) = profiler {
                if let Some((cpu_us, _, _)) = p.get_updated_cost(pass.handle) {
                    sum_cpu_us += cpu_us;
                }
            }
        }
    }

    let speedup = if wall_us > 0 && sum_cpu_us > 0 { Some(sum_cpu_us as f64 / wall_us as f64) } else { None };
    if let Some(s) = speedup {
        debug!("batch of {} passes: wall={}us speedup={:.2}x", batch.len(), wall_us, s);
    }
    (wall_us, speedup)
}

/// Top-level coroutine entry point: plan-transitions → execute-batches →
/// present-results. Returns execution statistics for the frame.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    passes: &[Pass],
    resources: &FxHashMap<ResourceHandle, ResourceDescriptor>,
    execution_order: &[PassHandle],
    explicit_dependencies: &FxHashMap<PassHandle, Vec<PassHandle>>,
    config: &RenderGraphConfig,
    tracker: &mut ResourceStateTracker,
    profiler: Option<Arc<dyn PassCostProfiler>>,
    frame_context: &dyn FrameContext,
    cancel: CancellationToken,
) -> ExecutionStats {
    let mut stats = ExecutionStats::default();
    let passes_by_handle: FxHashMap<PassHandle, &Pass> = passes.iter().map(|p| (p.handle, p)).collect();

    // Stage 1: plan-transitions.
    plan_transitions(tracker, resources, &passes_by_handle, execution_order);

    if cancel.is_cancelled() {
        stats.cancelled = true;
        return stats;
    }

    // Stage 2: execute-pass-batches.
    let batches = match build_batches(execution_order, explicit_dependencies) {
        Some(b) => b,
        None => {
            stats.cancelled = false;
            return stats;
        }
    };

    let thread_pool = frame_context.thread_pool();
    for batch in &batches {
        if cancel.is_cancelled() {
            stats.cancelled = true;
            break;
        }
        let (wall_us, speedup) = run_batch(batch, &passes_by_handle, config, frame_context.frame_index(), thread_pool, profiler.as_ref(), &cancel).await;
        stats.batch_widths.push(batch.len());
        stats.batch_speedups.push(speedup);
        stats.total_wall_us += wall_us;
    }

    // Stage 3: present-results — schedule reclaim of frame-local resources.
    if let Some(graphics) = frame_context.acquire_graphics() {
        for (handle, desc) in resources.iter() {
            if desc.lifetime == ResourceLifetime::FrameLocal {
                graphics.schedule_resource_reclaim(*handle, frame_context.frame_index(), &desc.debug_name);
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::PassHandle;

    #[test]
    fn independent_passes_form_a_single_batch() {
        let mut deps = FxHashMap::default();
        deps.insert(PassHandle(1), vec![]);
        deps.insert(PassHandle(2), vec![]);
        deps.insert(PassHandle(3), vec![]);
        let order = vec![PassHandle(1), PassHandle(2), PassHandle(3)];
        let batches = build_batches(&order, &deps).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn chain_produces_one_batch_per_level() {
        let mut deps = FxHashMap::default();
        deps.insert(PassHandle(1), vec![]);
        deps.insert(PassHandle(2), vec![PassHandle(1)]);
        deps.insert(PassHandle(3), vec![PassHandle(2)]);
        let order = vec![PassHandle(1), PassHandle(2), PassHandle(3)];
        let batches = build_batches(&order, &deps).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec![PassHandle(1)]);
    }

    #[test]
    fn cyclic_dependency_map_yields_none() {
        let mut deps = FxHashMap::default();
        deps.insert(PassHandle(1), vec![PassHandle(2)]);
        deps.insert(PassHandle(2), vec![PassHandle(1)]);
        let order = vec![PassHandle(1), PassHandle(2)];
        assert!(build_batches(&order, &deps).is_none());
    }
}
