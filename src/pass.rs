//! Pass model: identity, scope, dependencies, read/write resource arrays,
//! and the move-only executor callable.

use smallvec::SmallVec;
use std::sync::Arc;

use crate::capability::TaskExecutionContext;
use crate::handle::{PassHandle, ResourceHandle, ViewIndex};
use crate::state::{Queue, ResourceState, Scope};

/// The callable a pass executor runs. Boxed and `Send` so it can be
/// dispatched to a worker thread by the executor's parallel path.
pub type PassExecutorFn = dyn Fn(&mut TaskExecutionContext) + Send + Sync;

/// A pass's executor, wrapped so it can be shared across per-view clones:
/// the template pass's executor is moved into a reference-counted wrapper
/// once, and every view-clone invokes the same underlying callable.
/// Cloning an `Executor` is cheap — just an `Arc` bump.
#[derive(Clone)]
pub struct Executor(pub Arc<PassExecutorFn>);

impl Executor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut TaskExecutionContext) + Send + Sync + 'static,
    {
        Executor(Arc::new(f))
    }

    pub fn invoke(&self, ctx: &mut TaskExecutionContext) {
        (self.0)(ctx)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Executor::new(|_ctx| {})
    }
}

/// A single read or write access of a resource by a pass.
#[derive(Clone, Copy, Debug)]
pub struct ResourceAccess {
    pub resource: ResourceHandle,
    pub state: ResourceState,
}

/// A unit of GPU work: declared reads/writes, explicit dependencies on
/// other passes, and a callable executor. Passes do not implement `Clone`
/// via `derive` because the executor is intentionally *not* copied by
/// clone (see `clone_without_executor`) — per-view expansion installs a
/// shared-executor wrapper afterwards instead.
pub struct Pass {
    pub handle: PassHandle,
    pub debug_name: String,
    pub scope: Scope,
    pub view_index: ViewIndex,
    pub dependencies: SmallVec<[PassHandle; 4]>,
    pub reads: SmallVec<[ResourceHandle; 8]>,
    pub read_states: SmallVec<[ResourceState; 8]>,
    pub writes: SmallVec<[ResourceHandle; 8]>,
    pub write_states: SmallVec<[ResourceState; 8]>,
    pub executor: Executor,
    pub requires_main_thread: bool,
    /// Queue assignment, populated by the scheduler. `None` until
    /// scheduling has run.
    pub assigned_queue: Option<Queue>,
}

impl Pass {
    pub fn new(handle: PassHandle, debug_name: impl Into<String>, scope: Scope) -> Self {
        Pass {
            handle,
            debug_name: debug_name.into(),
            scope,
            view_index: ViewIndex(0),
            dependencies: SmallVec::new(),
            reads: SmallVec::new(),
            read_states: SmallVec::new(),
            writes: SmallVec::new(),
            write_states: SmallVec::new(),
            executor: Executor::default(),
            requires_main_thread: false,
            assigned_queue: None,
        }
    }

    /// `|reads| == |read_states|` and `|writes| == |write_states|`,
    /// enforced at build time.
    pub fn arrays_are_well_formed(&self) -> bool {
        self.reads.len() == self.read_states.len() && self.writes.len() == self.write_states.len()
    }

    pub fn mutable_reads(&mut self) -> &mut SmallVec<[ResourceHandle; 8]> {
        &mut self.reads
    }

    pub fn mutable_writes(&mut self) -> &mut SmallVec<[ResourceHandle; 8]> {
        &mut self.writes
    }

    /// Clone everything but the executor: dependencies, read/write arrays
    /// and states, debug name (caller appends the view suffix), scope.
    /// Used by per-view expansion — the executor is installed separately
    /// via the shared wrapper so the template's executor is moved exactly
    /// once.
    pub fn clone_without_executor(&self, new_handle: PassHandle, debug_name: impl Into<String>) -> Pass {
        Pass {
            handle: new_handle,
            debug_name: debug_name.into(),
            scope: self.scope,
            view_index: self.view_index,
            dependencies: self.dependencies.clone(),
            reads: self.reads.clone(),
            read_states: self.read_states.clone(),
            writes: self.writes.clone(),
            write_states: self.write_states.clone(),
            executor: Executor::default(),
            requires_main_thread: self.requires_main_thread,
            assigned_queue: None,
        }
    }
}

/// Sub-builder returned by `Builder::add_raster_pass` / `add_compute_pass`
/// / `add_copy_pass`, configuring reads/writes/dependencies/executor before
/// the pass is handed back to the graph under construction.
pub struct PassConfigurator<'a> {
    pass: &'a mut Pass,
}

impl<'a> PassConfigurator<'a> {
    pub fn new(pass: &'a mut Pass) -> Self {
        PassConfigurator { pass }
    }

    pub fn reads(self, resource: ResourceHandle, state: ResourceState) -> Self {
        self.pass.reads.push(resource);
        self.pass.read_states.push(state);
        self
    }

    pub fn writes(self, resource: ResourceHandle, state: ResourceState) -> Self {
        self.pass.writes.push(resource);
        self.pass.write_states.push(state);
        self
    }

    pub fn depends_on(self, pass: PassHandle) -> Self {
        self.pass.dependencies.push(pass);
        self
    }

    pub fn main_thread_only(self) -> Self {
        self.pass.requires_main_thread = true;
        self
    }

    pub fn executor<F>(self, f: F) -> Self
    where
        F: Fn(&mut TaskExecutionContext) + Send + Sync + 'static,
    {
        self.pass.executor = Executor::new(f);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_pass_passes_invariant() {
        let mut p = Pass::new(PassHandle(1), "test", Scope::Shared);
        {
            let cfg = PassConfigurator::new(&mut p);
            cfg.reads(ResourceHandle(1), ResourceState::PixelShaderResource)
                .writes(ResourceHandle(2), ResourceState::RenderTarget);
        }
        assert!(p.arrays_are_well_formed());
    }

    #[test]
    fn clone_without_executor_does_not_copy_callable() {
        let called = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let called2 = called.clone();
        let mut p = Pass::new(PassHandle(1), "base", Scope::PerView);
        p.executor = Executor::new(move |_| {
            called2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let clone = p.clone_without_executor(PassHandle(2), "base_viewA");
        // clone's executor is the default no-op, not the base's.
        let mut ctx = TaskExecutionContext::default();
        clone.executor.invoke(&mut ctx);
        assert_eq!(called.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
