//! Dependency-aware scheduler: explicit + resource-derived dependency
//! graph, topological sort, cost-aware level refinement, queue assignment,
//! and frame-time estimation.

use fxhash::FxHashMap;
use log::error;
use std::collections::VecDeque;

use crate::capability::PassCostProfiler;
use crate::config::SchedulerCostModel;
use crate::handle::PassHandle;
use crate::pass::Pass;
use crate::state::Queue;

#[derive(Clone, Debug, Default)]
pub struct SchedulingResult {
    pub execution_order: Vec<PassHandle>,
    pub queue_assignments: Vec<Queue>,
    pub estimated_frame_time_ms: f64,
}

const MIB: u64 = 1024 * 1024;

/// Builds the explicit-dependency map (pass -> predecessors) seeded from
/// every pass's own `dependencies` list, then layers on resource-derived
/// edges: write-before-read and write-before-write, added deterministically
/// by iterating passes sorted by handle id. A declared predecessor absent
/// from `passes` (e.g. a stale handle from before per-view expansion
/// dropped its template) is ignored rather than left dangling.
fn build_dependency_map(passes: &[&Pass]) -> FxHashMap<PassHandle, Vec<PassHandle>> {
    let present: std::collections::HashSet<PassHandle> = passes.iter().map(|p| p.handle).collect();
    let mut deps: FxHashMap<PassHandle, Vec<PassHandle>> = FxHashMap::default();
    for p in passes {
        deps.entry(p.handle).or_default().extend(p.dependencies.iter().copied().filter(|d| present.contains(d)));
    }
    for p in passes {
        deps.entry(p.handle).or_default();
    }

    let mut sorted: Vec<&&Pass> = passes.iter().collect();
    sorted.sort_by_key(|p| p.handle.0);

    let mut last_writer: FxHashMap<crate::handle::ResourceHandle, PassHandle> = FxHashMap::default();
    for p in sorted {
        for &r in &p.reads {
            if let Some(&w) = last_writer.get(&r) {
                if w != p.handle {
                    add_dep(&mut deps, p.handle, w);
                }
            }
        }
        for &r in &p.writes {
            if let Some(&w) = last_writer.get(&r) {
                if w != p.handle {
                    add_dep(&mut deps, p.handle, w);
                }
            }
            last_writer.insert(r, p.handle);
        }
    }

    deps
}

fn add_dep(deps: &mut FxHashMap<PassHandle, Vec<PassHandle>>, pass: PassHandle, dependency: PassHandle) {
    let list = deps.entry(pass).or_default();
    if !list.contains(&dependency) {
        list.push(dependency);
    }
}

/// Kahn's algorithm. Returns `None` on a cycle (emitted count < total),
/// logging the passes that never became ready.
fn kahn_toposort(deps: &FxHashMap<PassHandle, Vec<PassHandle>>) -> Option<Vec<PassHandle>> {
    let mut in_degree: FxHashMap<PassHandle, usize> = FxHashMap::default();
    let mut dependents: FxHashMap<PassHandle, Vec<PassHandle>> = FxHashMap::default();

    for (&pass, preds) in deps {
        in_degree.entry(pass).or_insert(0);
        *in_degree.entry(pass).or_insert(0) = preds.len();
        for &pred in preds {
            dependents.entry(pred).or_default().push(pass);
        }
    }

    let mut ready: Vec<PassHandle> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(&p, _)| p).collect();
    ready.sort_by_key(|p| p.0);
    let mut queue: VecDeque<PassHandle> = ready.into();

    let mut order = Vec::with_capacity(deps.len());
    while let Some(p) = queue.pop_front() {
        order.push(p);
        if let Some(dependents_of_p) = dependents.get(&p) {
            for &d in dependents_of_p {
                let entry = in_degree.get_mut(&d).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push_back(d);
                }
            }
        }
    }

    if order.len() < deps.len() {
        let stuck: Vec<PassHandle> = deps.keys().filter(|p| !order.contains(p)).copied().collect();
        error!("scheduler: circular dependency detected, stuck passes: {:?}", stuck);
        return None;
    }

    Some(order)
}

fn synthetic_cost(pass_id: u32, model: &SchedulerCostModel) -> (u64, u64, u64) {
    let cpu_us = model.base_cpu_us + (pass_id as u64 % 10) * model.cpu_jitter_us;
    let gpu_us = model.base_gpu_us + (pass_id as u64 % 8) * model.gpu_jitter_us;
    let memory_bytes = model.base_memory_bytes + (pass_id as u64 % 20) * model.memory_jitter_bytes;
    (cpu_us, gpu_us, memory_bytes)
}

fn cost_of(pass: PassHandle, model: &SchedulerCostModel, profiler: Option<&dyn PassCostProfiler>) -> (u64, u64, u64) {
    if let Some(p) = profiler {
        if let Some(cost) = p.get_updated_cost(pass) {
            return cost;
        }
    }
    synthetic_cost(pass.0, model)
}

/// Assigns a level to each pass (level = 1 + max(level of predecessors), 0
/// for roots) via a second Kahn pass, then stable-sorts each level by
/// descending cost (gpu primary, cpu secondary, handle id tie-break), and
/// concatenates levels in ascending order.
fn refine_by_cost(
    order: &[PassHandle],
    deps: &FxHashMap<PassHandle, Vec<PassHandle>>,
    model: &SchedulerCostModel,
    profiler: Option<&dyn PassCostProfiler>,
) -> Vec<PassHandle> {
    let mut level: FxHashMap<PassHandle, u32> = FxHashMap::default();
    for &p in order {
        let preds = deps.get(&p).cloned().unwrap_or_default();
        let lvl = if preds.is_empty() {
            0
        } else {
            1 + preds.iter().map(|d| *level.get(d).unwrap_or(&0)).max().unwrap_or(0)
        };
        level.insert(p, lvl);
    }

    let max_level = level.values().copied().max().unwrap_or(0);
    let mut refined = Vec::with_capacity(order.len());
    for lvl in 0..=max_level {
        let mut bucket: Vec<PassHandle> = order.iter().filter(|p| level[p] == lvl).copied().collect();
        bucket.sort_by(|&a, &b| {
            let (cpu_a, gpu_a, _) = cost_of(a, model, profiler);
            let (cpu_b, gpu_b, _) = cost_of(b, model, profiler);
            gpu_b.cmp(&gpu_a).then(cpu_b.cmp(&cpu_a)).then(a.0.cmp(&b.0))
        });
        refined.extend(bucket);
    }
    refined
}

fn classify(cpu_us: u64, gpu_us: u64, memory_bytes: u64) -> Queue {
    if memory_bytes > 8 * MIB && gpu_us < 2 * cpu_us {
        Queue::Copy
    } else if gpu_us > 2 * cpu_us {
        Queue::Compute
    } else {
        Queue::Graphics
    }
}

/// Walks the refined order maintaining cumulative per-queue load (ms),
/// applying the softening/overload/stays-on-graphics spill rules, and
/// returns (queue assignments, estimated frame time).
fn assign_queues(
    order: &[PassHandle],
    model: &SchedulerCostModel,
    profiler: Option<&dyn PassCostProfiler>,
) -> (Vec<Queue>, f64) {
    let mut load = [0f64; 3]; // Graphics, Compute, Copy
    let idx = |q: Queue| match q {
        Queue::Graphics => 0,
        Queue::Compute => 1,
        Queue::Copy => 2,
    };

    let mut assignments = Vec::with_capacity(order.len());
    let mut total_ms = 0f64;

    for &pass in order {
        let (cpu_us, gpu_us, memory_bytes) = cost_of(pass, model, profiler);
        let duration_ms = cpu_us.max(gpu_us) as f64 / 1000.0;

        let mut chosen = classify(cpu_us, gpu_us, memory_bytes);

        match chosen {
            Queue::Graphics => {
                // softened criteria: gpu cost not wildly dominant.
                if gpu_us <= 3 * cpu_us {
                    let least = [Queue::Graphics, Queue::Compute, Queue::Copy]
                        .into_iter()
                        .min_by(|&a, &b| load[idx(a)].partial_cmp(&load[idx(b)]).unwrap())
                        .unwrap();
                    if load[idx(least)] < load[idx(Queue::Graphics)] {
                        chosen = least;
                    }
                }
            }
            Queue::Compute => {
                let would_be = load[idx(Queue::Compute)] + duration_ms;
                if would_be > load[idx(Queue::Graphics)] * 1.2 && load[idx(Queue::Graphics)] > 0.0 {
                    chosen = Queue::Graphics;
                }
            }
            Queue::Copy => {
                if memory_bytes < 4 * MIB {
                    chosen = Queue::Graphics;
                }
            }
        }

        load[idx(chosen)] += duration_ms;
        total_ms += duration_ms;
        assignments.push(chosen);
    }

    (assignments, total_ms)
}

/// Runs the full scheduling pipeline: dependency graph construction,
/// topological sort, cost-aware refinement (when a profiler is present),
/// queue assignment, and frame-time estimation. Returns an empty order on
/// a cycle (the builder reports `CircularDependency` and moves on).
pub fn schedule(
    passes: &[&Pass],
    model: &SchedulerCostModel,
    profiler: Option<&dyn PassCostProfiler>,
) -> SchedulingResult {
    let deps = build_dependency_map(passes);
    let topo = match kahn_toposort(&deps) {
        Some(order) => order,
        None => {
            return SchedulingResult {
                execution_order: Vec::new(),
                queue_assignments: Vec::new(),
                estimated_frame_time_ms: 0.0,
            }
        }
    };

    let refined = refine_by_cost(&topo, &deps, model, profiler);
    let (assignments, total_ms) = assign_queues(&refined, model, profiler);

    SchedulingResult {
        execution_order: refined,
        queue_assignments: assignments,
        estimated_frame_time_ms: total_ms,
    }
}

pub fn dependency_map(passes: &[&Pass]) -> FxHashMap<PassHandle, Vec<PassHandle>> {
    build_dependency_map(passes)
}

/// Critical-path analysis (optional helper): `longest[p] = cost(p) +
/// max(longest[d] for d in deps(p))`. Returns the tail pass and the chain
/// leading to it, descending into the maximum-`longest` dependency at each
/// step.
pub fn critical_path(
    order: &[PassHandle],
    deps: &FxHashMap<PassHandle, Vec<PassHandle>>,
    model: &SchedulerCostModel,
    profiler: Option<&dyn PassCostProfiler>,
) -> Vec<PassHandle> {
    let mut longest: FxHashMap<PassHandle, f64> = FxHashMap::default();
    for &p in order {
        let (cpu_us, gpu_us, _) = cost_of(p, model, profiler);
        let own = cpu_us.max(gpu_us) as f64 / 1000.0;
        let preds = deps.get(&p).cloned().unwrap_or_default();
        let best_pred = preds.iter().map(|d| *longest.get(d).unwrap_or(&0.0)).fold(0.0, f64::max);
        longest.insert(p, own + best_pred);
    }

    let tail = match order.iter().max_by(|&&a, &&b| longest[&a].partial_cmp(&longest[&b]).unwrap()) {
        Some(&t) => t,
        None => return Vec::new(),
    };

    let mut chain = vec![tail];
    let mut current = tail;
    loop {
        let preds = deps.get(&current).cloned().unwrap_or_default();
        if preds.is_empty() {
            break;
        }
        let next = *preds.iter().max_by(|&&a, &&b| longest[&a].partial_cmp(&longest[&b]).unwrap()).unwrap();
        chain.push(next);
        current = next;
    }
    chain.reverse();
    chain
}
