//! Shared read-only promotion optimizer. Collapses N per-view clones of a
//! resource back down to a single `Shared` resource when doing so is
//! provably safe, trading per-view isolation for a smaller memory
//! footprint.

use fxhash::FxHashMap;
use log::debug;

use crate::descriptor::ResourceDescriptor;
use crate::diagnostics::DiagnosticsSink;
use crate::handle::{ResourceHandle, ViewIndex};
use crate::pass::Pass;
use crate::state::Scope;

/// A registrable build-pipeline optimization. The shared-promotion pass is
/// the default instance; callers may register
/// additional strategies, which run in registration order during the
/// shared-promotion build phase.
pub trait OptimizationStrategy: Send + Sync {
    fn apply(
        &self,
        resources: &mut FxHashMap<ResourceHandle, ResourceDescriptor>,
        passes: &mut Vec<Pass>,
        resource_mapping: &mut FxHashMap<(ResourceHandle, ViewIndex), ResourceHandle>,
        active_views: &[ViewIndex],
        sink: &mut dyn DiagnosticsSink,
    );
}

/// The default strategy, always registered first unless the builder is
/// explicitly constructed without it.
pub struct SharedPromotionStrategy;

impl OptimizationStrategy for SharedPromotionStrategy {
    fn apply(
        &self,
        resources: &mut FxHashMap<ResourceHandle, ResourceDescriptor>,
        passes: &mut Vec<Pass>,
        resource_mapping: &mut FxHashMap<(ResourceHandle, ViewIndex), ResourceHandle>,
        active_views: &[ViewIndex],
        _sink: &mut dyn DiagnosticsSink,
    ) {
        let result = promote_shared_resources(resources, passes, resource_mapping, active_views);
        if result.promoted_count > 0 {
            debug!("shared-promotion strategy collapsed {} resource group(s)", result.promoted_count);
        }
    }
}

#[derive(Debug, Default)]
pub struct PromotionResult {
    pub promoted_count: usize,
}

/// Runs only when at least two views are active — a single active view has
/// nothing to collapse. For each base resource whose per-view clones all
/// exist, are format-compatible with each other, and are never written by
/// any pass, picks the first (lowest view index) clone as the canonical
/// survivor, promotes its scope to `Shared`, rewrites every other clone's
/// reads/writes to point at the canonical handle, and drops the
/// now-redundant descriptors.
pub fn promote_shared_resources(
    resources: &mut FxHashMap<ResourceHandle, ResourceDescriptor>,
    passes: &mut [Pass],
    resource_mapping: &mut FxHashMap<(ResourceHandle, ViewIndex), ResourceHandle>,
    active_views: &[ViewIndex],
) -> PromotionResult {
    if active_views.len() < 2 {
        return PromotionResult::default();
    }

    let mut groups: FxHashMap<ResourceHandle, Vec<(ViewIndex, ResourceHandle)>> = FxHashMap::default();
    for (&(base, view), &clone) in resource_mapping.iter() {
        groups.entry(base).or_default().push((view, clone));
    }

    let mut promoted_count = 0;
    for (base, mut variants) in groups {
        variants.sort_by_key(|(v, _)| v.0);

        let base_is_per_view = match resources.get(&base) {
            Some(d) => d.scope == Scope::PerView,
            None => false,
        };
        if !base_is_per_view {
            continue;
        }
        if variants.len() != active_views.len() {
            continue;
        }
        if !active_views.iter().all(|v| variants.iter().any(|(vv, _)| vv == v)) {
            continue;
        }

        let prototype = match resources.get(&variants[0].1) {
            Some(d) => d.clone(),
            None => continue,
        };
        let all_compatible = variants
            .iter()
            .all(|(_, h)| resources.get(h).map_or(false, |d| d.format_compatible_with(&prototype)));
        if !all_compatible {
            continue;
        }

        let any_written = variants.iter().any(|(_, h)| passes.iter().any(|p| p.writes.contains(h)));
        if any_written {
            continue;
        }

        let canonical = variants[0].1;
        if let Some(desc) = resources.get_mut(&canonical) {
            desc.scope = Scope::Shared;
        }

        for &(view, variant) in &variants {
            if variant == canonical {
                continue;
            }
            for p in passes.iter_mut() {
                for r in p.reads.iter_mut() {
                    if *r == variant {
                        *r = canonical;
                    }
                }
                for r in p.writes.iter_mut() {
                    if *r == variant {
                        *r = canonical;
                    }
                }
            }
            resources.remove(&variant);
            resource_mapping.insert((base, view), canonical);
        }

        if canonical != base {
            resources.remove(&base);
        }

        debug!("promoted resource {:?} ({} per-view clones -> 1 shared {:?})", base, variants.len(), canonical);
        promoted_count += 1;
    }

    PromotionResult { promoted_count }
}
