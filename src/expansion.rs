//! Per-view expansion service. Turns a declarative "this resource / this
//! pass is per-view" into concrete, fully-remapped clones, one per active
//! view.

use fxhash::{FxHashMap, FxHashSet};
use log::debug;
use smallvec::SmallVec;

use crate::capability::ViewInfo;
use crate::descriptor::ResourceDescriptor;
use crate::handle::{HandleAllocator, PassHandle, ResourceHandle, ViewIndex};
use crate::pass::Pass;
use crate::state::Scope;

/// How the builder's view-scoping toggles select the active view set.
pub enum ViewSelection {
    IterateAll,
    RestrictToView(u32),
    Filter(Box<dyn Fn(&ViewInfo) -> bool + Send + Sync>),
    Default,
}

pub fn determine_active_views(selection: &ViewSelection, views: &[ViewInfo]) -> Vec<ViewIndex> {
    match selection {
        ViewSelection::IterateAll | ViewSelection::Default => (0..views.len() as u32).map(ViewIndex).collect(),
        ViewSelection::RestrictToView(i) => {
            if (*i as usize) < views.len() {
                vec![ViewIndex(*i)]
            } else {
                Vec::new()
            }
        }
        ViewSelection::Filter(pred) => views
            .iter()
            .enumerate()
            .filter(|(_, v)| pred(v))
            .map(|(i, _)| ViewIndex(i as u32))
            .collect(),
    }
}

fn view_suffix(view: ViewIndex, views: &[ViewInfo]) -> String {
    match views.get(view.index()) {
        Some(v) if !v.view_name.is_empty() => format!("_{}", v.view_name),
        _ => format!("_view{}", view.0),
    }
}

/// For each PerView-scope resource, for each active view, mints a new
/// handle, deep-copies the descriptor, suffixes the debug name, and
/// records the mapping.
pub fn clone_per_view_resources(
    resources: &mut FxHashMap<ResourceHandle, ResourceDescriptor>,
    handle_alloc: &mut HandleAllocator,
    active_views: &[ViewIndex],
    views: &[ViewInfo],
) -> FxHashMap<(ResourceHandle, ViewIndex), ResourceHandle> {
    let to_clone: Vec<(ResourceHandle, ResourceDescriptor)> = resources
        .iter()
        .filter(|(_, desc)| desc.scope == Scope::PerView)
        .map(|(&h, d)| (h, d.clone()))
        .collect();

    let mut mapping = FxHashMap::default();
    for (base, desc) in to_clone {
        for &view in active_views {
            let new_handle = ResourceHandle(handle_alloc.mint());
            let mut clone = desc.clone();
            clone.debug_name = format!("{}{}", desc.debug_name, view_suffix(view, views));
            resources.insert(new_handle, clone);
            mapping.insert((base, view), new_handle);
        }
    }
    mapping
}

pub struct ExpansionResult {
    pub passes: Vec<Pass>,
    pub active_views: Vec<ViewIndex>,
    pub resource_mapping: FxHashMap<(ResourceHandle, ViewIndex), ResourceHandle>,
    pub expanded_templates: FxHashSet<PassHandle>,
    pub pass_clone_mapping: FxHashMap<(PassHandle, ViewIndex), PassHandle>,
}

fn remap_resource_array(array: &mut SmallVec<[ResourceHandle; 8]>, view: ViewIndex, mapping: &FxHashMap<(ResourceHandle, ViewIndex), ResourceHandle>) {
    for r in array.iter_mut() {
        if let Some(&mapped) = mapping.get(&(*r, view)) {
            *r = mapped;
        }
    }
}

/// Expands per-view passes into one clone per active view, installing a
/// shared-executor wrapper so the base executor is moved exactly once and
/// every clone invokes the same underlying callable. The template pass is
/// never pushed into the final list and is never executed.
///
/// When only a single view is active, a PerView pass is remapped and
/// relabeled in place rather than cloned — there is exactly one variant to
/// produce, so duplicating the handle would only add noise.
pub fn expand_passes(
    passes: Vec<Pass>,
    resources: &mut FxHashMap<ResourceHandle, ResourceDescriptor>,
    views: &[ViewInfo],
    selection: &ViewSelection,
    handle_alloc: &mut HandleAllocator,
) -> ExpansionResult {
    let active_views = determine_active_views(selection, views);
    let resource_mapping = clone_per_view_resources(resources, handle_alloc, &active_views, views);

    let mut final_passes = Vec::with_capacity(passes.len());
    let mut expanded_templates = FxHashSet::default();
    let mut pass_clone_mapping = FxHashMap::default();

    for pass in passes {
        if pass.scope == Scope::PerView && active_views.is_empty() {
            // No view survived filtering: a PerView pass has nothing to run
            // against (its reads/writes still point at the un-cloned base
            // resource) and is dropped rather than executed once unscoped.
            expanded_templates.insert(pass.handle);
            debug!("dropping per-view pass {:?}: no active views", pass.handle);
        } else if pass.scope == Scope::PerView && active_views.len() > 1 {
            expanded_templates.insert(pass.handle);
            let shared_executor = pass.executor.clone();
            for &view in &active_views {
                let new_handle = PassHandle(handle_alloc.mint());
                let name = format!("{}{}", pass.debug_name, view_suffix(view, views));
                let mut clone = pass.clone_without_executor(new_handle, name);
                clone.view_index = view;
                clone.executor = shared_executor.clone();
                remap_resource_array(&mut clone.reads, view, &resource_mapping);
                remap_resource_array(&mut clone.writes, view, &resource_mapping);
                pass_clone_mapping.insert((pass.handle, view), new_handle);
                final_passes.push(clone);
            }
        } else if pass.scope == Scope::PerView && active_views.len() == 1 {
            let mut pass = pass;
            let view = active_views[0];
            pass.view_index = view;
            remap_resource_array(&mut pass.reads, view, &resource_mapping);
            remap_resource_array(&mut pass.writes, view, &resource_mapping);
            final_passes.push(pass);
        } else {
            final_passes.push(pass);
        }
    }

    if active_views.is_empty() {
        resources.retain(|_, desc| desc.scope != Scope::PerView);
    }

    ExpansionResult {
        passes: final_passes,
        active_views,
        resource_mapping,
        expanded_templates,
        pass_clone_mapping,
    }
}

/// Rebuilds the explicit dependency edges of every pass in the final
/// graph: a dependency on an expanded template handle resolves via
/// `(template, this_pass's_view) -> clone`, dropping the edge (with a
/// debug log) if no clone exists for that view; a dependency on a
/// non-expanded pass is kept only if that pass still exists in the final
/// graph. Deduplicates, preserving first-seen order.
pub fn rebuild_dependencies(
    passes: &mut [Pass],
    expanded_templates: &FxHashSet<PassHandle>,
    pass_clone_mapping: &FxHashMap<(PassHandle, ViewIndex), PassHandle>,
) {
    let final_handles: FxHashSet<PassHandle> = passes.iter().map(|p| p.handle).collect();

    for pass in passes.iter_mut() {
        let view = pass.view_index;
        let mut new_deps: SmallVec<[PassHandle; 4]> = SmallVec::new();
        for &dep in &pass.dependencies {
            if expanded_templates.contains(&dep) {
                match pass_clone_mapping.get(&(dep, view)) {
                    Some(&clone) => {
                        if !new_deps.contains(&clone) {
                            new_deps.push(clone);
                        }
                    }
                    None => {
                        debug!("dropping dependency on template {:?}: no clone for view {:?}", dep, view);
                    }
                }
            } else if final_handles.contains(&dep) {
                if !new_deps.contains(&dep) {
                    new_deps.push(dep);
                }
            } else {
                debug!("dropping dependency on pass {:?}: not present in final graph", dep);
            }
        }
        pass.dependencies = new_deps;
    }
}
