//! Builder and build pipeline. The single entry point for describing a
//! frame's rendering work; `build()` runs a fixed ten-phase pipeline and
//! returns a validated, scheduled `Graph`.

use std::sync::Arc;

use fxhash::FxHashMap;
use log::warn;

use crate::analyzer::AliasAnalyzer;
use crate::cache::CacheKey;
use crate::capability::{FrameContext, PassCostProfiler, ViewInfo};
use crate::config::RenderGraphConfig;
use crate::descriptor::ResourceDescriptor;
use crate::diagnostics::{DiagnosticsSink, ValidationError, ValidationErrorKind, ValidationResult};
use crate::error::BuildError;
use crate::expansion::{self, ViewSelection};
use crate::graph::Graph;
use crate::handle::{HandleAllocator, PassHandle, ResourceHandle};
use crate::pass::{Pass, PassConfigurator};
use crate::promotion::{OptimizationStrategy, SharedPromotionStrategy};
use crate::scheduler;
use crate::state::Scope;

/// Per-build state, alive between `begin_graph` and `build`. Dropped (along
/// with its borrow of the frame context) once `build()` returns.
struct ActiveGraph<'ctx> {
    frame_context: &'ctx dyn FrameContext,
    resources: FxHashMap<ResourceHandle, ResourceDescriptor>,
    passes: Vec<Pass>,
    iterate_all: bool,
    restrict_to_view: Option<u32>,
    view_filter: Option<Box<dyn Fn(&ViewInfo) -> bool + Send + Sync>>,
    strategies: Vec<Box<dyn OptimizationStrategy>>,
    cost_profiler: Option<Arc<dyn PassCostProfiler>>,
    config: RenderGraphConfig,
}

/// Lifetime-bound builder: ties its working state to the borrowed frame
/// context for exactly one build.
pub struct Builder<'ctx> {
    handle_alloc: HandleAllocator,
    active: Option<ActiveGraph<'ctx>>,
}

impl<'ctx> Default for Builder<'ctx> {
    fn default() -> Self {
        Builder::new()
    }
}

impl<'ctx> Builder<'ctx> {
    pub fn new() -> Self {
        Builder { handle_alloc: HandleAllocator::new(), active: None }
    }

    /// Resets per-build state and binds the frame context for the
    /// upcoming `build()`. Safe to call again before `build()` to discard
    /// an in-progress configuration.
    pub fn begin_graph(&mut self, frame_context: &'ctx dyn FrameContext) {
        self.active = Some(ActiveGraph {
            frame_context,
            resources: FxHashMap::default(),
            passes: Vec::new(),
            iterate_all: false,
            restrict_to_view: None,
            view_filter: None,
            strategies: vec![Box::new(SharedPromotionStrategy)],
            cost_profiler: None,
            config: RenderGraphConfig::default(),
        });
    }

    fn active_mut(&mut self) -> &mut ActiveGraph<'ctx> {
        self.active.as_mut().expect("begin_graph must be called before configuring the builder")
    }

    pub fn create_texture(
        &mut self,
        debug_name: impl Into<String>,
        lifetime: crate::state::ResourceLifetime,
        scope: Scope,
        desc: crate::descriptor::TextureDesc,
    ) -> ResourceHandle {
        let handle = ResourceHandle(self.handle_alloc.mint());
        let descriptor = ResourceDescriptor::new_texture(debug_name, lifetime, scope, desc);
        self.active_mut().resources.insert(handle, descriptor);
        handle
    }

    pub fn create_buffer(
        &mut self,
        debug_name: impl Into<String>,
        lifetime: crate::state::ResourceLifetime,
        scope: Scope,
        desc: crate::descriptor::BufferDesc,
    ) -> ResourceHandle {
        let handle = ResourceHandle(self.handle_alloc.mint());
        let descriptor = ResourceDescriptor::new_buffer(debug_name, lifetime, scope, desc);
        self.active_mut().resources.insert(handle, descriptor);
        handle
    }

    /// A Shared, External-lifetime resource standing in for a swapchain or
    /// present target. Never aliased, never reclaimed.
    pub fn create_surface_target(&mut self, debug_name: impl Into<String>, desc: crate::descriptor::TextureDesc) -> ResourceHandle {
        self.create_texture(debug_name, crate::state::ResourceLifetime::External, Scope::Shared, desc)
    }

    fn add_pass(&mut self, debug_name: impl Into<String>, scope: Scope) -> PassConfigurator<'_> {
        let handle = PassHandle(self.handle_alloc.mint());
        let active = self.active_mut();
        active.passes.push(Pass::new(handle, debug_name, scope));
        let pass = active.passes.last_mut().unwrap();
        PassConfigurator::new(pass)
    }

    pub fn add_raster_pass(&mut self, debug_name: impl Into<String>, scope: Scope) -> PassConfigurator<'_> {
        self.add_pass(debug_name, scope)
    }

    pub fn add_compute_pass(&mut self, debug_name: impl Into<String>, scope: Scope) -> PassConfigurator<'_> {
        self.add_pass(debug_name, scope)
    }

    pub fn add_copy_pass(&mut self, debug_name: impl Into<String>, scope: Scope) -> PassConfigurator<'_> {
        self.add_pass(debug_name, scope)
    }

    pub fn iterate_all_views(&mut self) -> &mut Self {
        self.active_mut().iterate_all = true;
        self
    }

    pub fn restrict_to_view(&mut self, view: u32) -> &mut Self {
        self.active_mut().restrict_to_view = Some(view);
        self
    }

    pub fn restrict_to_views_matching<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&ViewInfo) -> bool + Send + Sync + 'static,
    {
        self.active_mut().view_filter = Some(Box::new(predicate));
        self
    }

    pub fn register_strategy(&mut self, strategy: Box<dyn OptimizationStrategy>) -> &mut Self {
        self.active_mut().strategies.push(strategy);
        self
    }

    pub fn with_cost_profiler(&mut self, profiler: Arc<dyn PassCostProfiler>) -> &mut Self {
        self.active_mut().cost_profiler = Some(profiler);
        self
    }

    pub fn with_config(&mut self, config: RenderGraphConfig) -> &mut Self {
        self.active_mut().config = config;
        self
    }

    fn view_selection(active: &ActiveGraph<'ctx>) -> ViewSelection {
        if active.iterate_all {
            ViewSelection::IterateAll
        } else if let Some(i) = active.restrict_to_view {
            ViewSelection::RestrictToView(i)
        } else if let Some(f) = &active.view_filter {
            // Rebuilt per call since the stored closure can't be moved out
            // of a shared reference; cheap relative to the rest of build().
            let views = active.frame_context.views().to_vec();
            let matched: Vec<bool> = views.iter().map(|v| f(v)).collect();
            ViewSelection::Filter(Box::new(move |v: &ViewInfo| {
                views.iter().position(|x| x.view_name == v.view_name).map(|i| matched[i]).unwrap_or(false)
            }))
        } else {
            ViewSelection::Default
        }
    }

    /// Runs the ten-phase build pipeline and returns the compiled
    /// graph. The only hard failure is calling `build()` without a
    /// preceding `begin_graph()`; every other structural problem is
    /// downgraded to a `ValidationError` and the pipeline keeps running.
    pub fn build(mut self) -> Result<Graph, BuildError> {
        let mut active = self.active.take().ok_or(BuildError::NoActiveGraph)?;
        let mut validation = ValidationResult::new();

        if active.iterate_all && (active.restrict_to_view.is_some() || active.view_filter.is_some()) {
            validation.add_warning(ValidationError::new(
                ValidationErrorKind::InvalidConfiguration,
                "iterate-all-views combined with a view restriction; iterate-all takes precedence",
            ));
        }
        if active.restrict_to_view.is_some() && active.view_filter.is_some() {
            validation.add_warning(ValidationError::new(
                ValidationErrorKind::InvalidConfiguration,
                "both restrict-to-view and a custom view filter are set; restrict-to-view takes precedence",
            ));
        }

        let views = active.frame_context.views().to_vec();
        let selection = Self::view_selection(&active);

        // Phase 1-2: view configuration + pass transfer (with per-view expansion).
        let mut resources = std::mem::take(&mut active.resources);
        let expansion = expansion::expand_passes(std::mem::take(&mut active.passes), &mut resources, &views, &selection, &mut self.handle_alloc);
        let mut passes = expansion.passes;
        let mut resource_mapping = expansion.resource_mapping;
        let active_views = expansion.active_views;

        // Dependency rebuild must happen before scheduling: a pass's
        // `dependencies` still names template handles that expansion just
        // dropped, and scheduling's dependency map needs real, present
        // handles to topologically sort.
        expansion::rebuild_dependencies(&mut passes, &expansion.expanded_templates, &expansion.pass_clone_mapping);

        // Phase 3: shared-promotion (and any registered strategies, in order).
        for strategy in &active.strategies {
            strategy.apply(&mut resources, &mut passes, &mut resource_mapping, &active_views, &mut validation);
        }

        // Phase 4: validation.
        if passes.is_empty() {
            validation.add_warning(ValidationError::new(ValidationErrorKind::InvalidConfiguration, "graph has no passes"));
        }
        if resources.is_empty() {
            validation.add_warning(ValidationError::new(ValidationErrorKind::InvalidConfiguration, "graph has no resources"));
        }
        for p in &passes {
            if !p.arrays_are_well_formed() {
                validation.add_error(ValidationError::new(
                    ValidationErrorKind::InvalidResourceState,
                    format!("pass {:?} has mismatched read/write state array lengths", p.handle),
                ));
            }
        }

        // Phase 5: alias/lifetime collection.
        let mut analyzer = AliasAnalyzer::new();
        for (&handle, desc) in &resources {
            analyzer.register_resource(handle, desc);
        }

        // Phase 6: scheduling.
        let pass_refs: Vec<&Pass> = passes.iter().collect();
        let profiler_ref: Option<&dyn PassCostProfiler> = active.cost_profiler.as_deref();
        let scheduling = scheduler::schedule(&pass_refs, &active.config.cost_model, profiler_ref);
        if scheduling.execution_order.is_empty() && !passes.is_empty() {
            validation.add_error(ValidationError::new(ValidationErrorKind::CircularDependency, "circular dependency detected during scheduling"));
        }

        // Phase 7: lifetime finalization.
        analyzer.set_topological_order(&scheduling.execution_order);
        for p in &passes {
            for (i, &r) in p.reads.iter().enumerate() {
                analyzer.register_usage(r, p.read_states[i], false, p.handle, p.view_index, &mut validation);
            }
            for (i, &r) in p.writes.iter().enumerate() {
                analyzer.register_usage(r, p.write_states[i], true, p.handle, p.view_index, &mut validation);
            }
        }
        let (hazards, candidates) = analyzer.analyze(&resources);
        for h in &hazards {
            let err = ValidationError::new(ValidationErrorKind::ResourceAliasHazard, h.description.clone());
            match h.severity {
                crate::analyzer::HazardSeverity::Error => validation.add_error(err),
                crate::analyzer::HazardSeverity::Warning => validation.add_warning(err),
            }
        }
        for c in &candidates {
            log::info!("alias candidate: {}", c.description);
        }

        // Phase 8: descriptor allocation.
        if let Some(graphics) = active.frame_context.acquire_graphics() {
            for desc in resources.values_mut() {
                if !desc.has_descriptor() {
                    desc.bindless_index = graphics.allocate_descriptor();
                }
            }
        }

        // Phase 9: dependency map snapshot for the compiled graph.
        let explicit_dependencies = scheduler::dependency_map(&passes.iter().collect::<Vec<_>>());

        if active_views.is_empty() {
            warn!("no active views resolved for this build; only Shared/Viewless passes will run");
        }

        // Phase 10: finalize.
        let cache_key = CacheKey::compute(&passes, &resources, &views);
        let graph = Graph::new(resources, passes, explicit_dependencies, scheduling, validation, cache_key, active.config);

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{GraphicsLayer, ThreadPool};
    use crate::descriptor::{BufferDesc, UsageFlags};
    use crate::state::ResourceLifetime;

    struct NoGraphics;
    impl GraphicsLayer for NoGraphics {
        fn allocate_descriptor(&self) -> u32 {
            0
        }
        fn schedule_resource_reclaim(&self, _resource: ResourceHandle, _frame_index: u64, _debug_name: &str) {}
        fn validate_integration_state(&self) -> bool {
            true
        }
        fn get_integration_stats(&self) -> crate::capability::IntegrationStats {
            crate::capability::IntegrationStats::default()
        }
    }

    struct TestFrameContext {
        views: Vec<ViewInfo>,
    }
    impl FrameContext for TestFrameContext {
        fn views(&self) -> &[ViewInfo] {
            &self.views
        }
        fn frame_index(&self) -> u64 {
            0
        }
        fn thread_pool(&self) -> Option<&dyn ThreadPool> {
            None
        }
        fn acquire_graphics(&self) -> Option<&dyn GraphicsLayer> {
            None
        }
    }

    #[test]
    fn empty_builder_yields_warnings_and_zero_passes() {
        let ctx = TestFrameContext { views: vec![] };
        let mut builder = Builder::new();
        builder.begin_graph(&ctx);
        let graph = builder.build().unwrap();
        assert!(graph.passes().is_empty());
        assert!(graph.get_validation_result().is_valid());
        assert_eq!(graph.get_validation_result().warnings().len(), 2);
    }

    #[test]
    fn build_without_begin_graph_errors() {
        let builder = Builder::new();
        assert!(matches!(builder.build(), Err(BuildError::NoActiveGraph)));
    }

    #[test]
    fn single_pass_no_resources_builds_cleanly() {
        let ctx = TestFrameContext { views: vec![ViewInfo { view_name: "main".into(), viewport_width: 1920, viewport_height: 1080 }] };
        let mut builder = Builder::new();
        builder.begin_graph(&ctx);
        builder.add_raster_pass("solo", Scope::Shared).executor(|_ctx| {});
        let graph = builder.build().unwrap();
        assert_eq!(graph.passes().len(), 1);
        assert_eq!(graph.execution_order().len(), 1);
    }

    #[test]
    fn two_view_promotion_collapses_to_one_shared_resource() {
        let views = vec![
            ViewInfo { view_name: "main".into(), viewport_width: 1920, viewport_height: 1080 },
            ViewInfo { view_name: "shadow".into(), viewport_width: 2048, viewport_height: 2048 },
        ];
        let ctx = TestFrameContext { views };
        let mut builder = Builder::new();
        builder.begin_graph(&ctx);

        let depth = builder.create_texture(
            "depth",
            ResourceLifetime::Transient,
            Scope::PerView,
            crate::descriptor::TextureDesc {
                width: 1920,
                height: 1080,
                depth: 1,
                mip_levels: 1,
                array_layers: 1,
                sample_count: 1,
                sample_quality: 0,
                format: crate::descriptor::FormatTag { id: 1, bytes_per_texel: 4 },
                usage: UsageFlags::DEPTH_STENCIL,
            },
        );
        builder
            .add_raster_pass("clearDepth", Scope::PerView)
            .reads(depth, crate::state::ResourceState::DepthRead)
            .executor(|_ctx| {});
        builder.iterate_all_views();

        let graph = builder.build().unwrap();
        let depth_resources: Vec<_> = graph.resources().values().filter(|d| d.debug_name.starts_with("depth")).collect();
        assert_eq!(depth_resources.len(), 1);
        assert_eq!(depth_resources[0].scope, Scope::Shared);
        assert_eq!(graph.get_validation_result().errors().len(), 0);
        let _ = BufferDesc { size_bytes: 0, element_stride: 0, usage: UsageFlags::empty() };
    }
}
