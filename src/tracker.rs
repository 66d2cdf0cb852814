//! Per-(resource, view) resource state tracker. Computes the minimal set
//! of state transitions required to satisfy all pass accesses.

use fxhash::FxHashMap;

use crate::handle::{PassHandle, ResourceHandle, ResourceViewKey, ViewIndex};
use crate::state::ResourceState;

/// A single planned state transition.
#[derive(Clone, Debug)]
pub struct ResourceTransition {
    pub resource: ResourceHandle,
    pub from: ResourceState,
    pub to: ResourceState,
    pub pass: PassHandle,
    pub view: ViewIndex,
}

#[derive(Clone, Copy, Debug)]
struct TrackedState {
    state: ResourceState,
    last_used_pass: PassHandle,
}

/// Tracks current state per (resource, view) and appends a
/// `ResourceTransition` to an append-only log every time a pass requests a
/// different state than what is currently tracked.
///
/// Two `Read*` states are *not* implicitly unified: this is a deliberately
/// conservative choice — two consecutive reads in different read-states
/// still emit a transition.
#[derive(Default)]
pub struct ResourceStateTracker {
    current: FxHashMap<ResourceViewKey, TrackedState>,
    transitions: Vec<ResourceTransition>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        ResourceStateTracker::default()
    }

    pub fn set_initial_state(&mut self, resource: ResourceHandle, state: ResourceState, view: ViewIndex) {
        let key = ResourceViewKey::new(resource, view);
        self.current.insert(key, TrackedState { state, last_used_pass: PassHandle::INVALID });
    }

    /// Compares against the tracked current state; appends a transition
    /// and updates current state only if they differ. Seeds `Common` if
    /// this (resource, view) pair has never been seen.
    pub fn request_transition(
        &mut self,
        resource: ResourceHandle,
        new_state: ResourceState,
        pass: PassHandle,
        view: ViewIndex,
    ) {
        let key = ResourceViewKey::new(resource, view);
        let entry = self
            .current
            .entry(key)
            .or_insert(TrackedState { state: ResourceState::Common, last_used_pass: PassHandle::INVALID });

        if entry.state != new_state {
            self.transitions.push(ResourceTransition {
                resource,
                from: entry.state,
                to: new_state,
                pass,
                view,
            });
            entry.state = new_state;
        }
        entry.last_used_pass = pass;
    }

    pub fn current_state(&self, resource: ResourceHandle, view: ViewIndex) -> Option<ResourceState> {
        self.current.get(&ResourceViewKey::new(resource, view)).map(|t| t.state)
    }

    pub fn last_used_pass(&self, resource: ResourceHandle, view: ViewIndex) -> Option<PassHandle> {
        self.current.get(&ResourceViewKey::new(resource, view)).map(|t| t.last_used_pass)
    }

    pub fn planned_transitions(&self) -> &[ResourceTransition] {
        &self.transitions
    }

    pub fn reset(&mut self) {
        self.current.clear();
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_state_request_is_a_no_op() {
        let mut t = ResourceStateTracker::new();
        let r = ResourceHandle(1);
        let v = ViewIndex(0);
        t.request_transition(r, ResourceState::RenderTarget, PassHandle(1), v);
        t.request_transition(r, ResourceState::RenderTarget, PassHandle(2), v);
        assert_eq!(t.planned_transitions().len(), 1);
    }

    #[test]
    fn differing_reads_each_emit_a_transition() {
        let mut t = ResourceStateTracker::new();
        let r = ResourceHandle(1);
        let v = ViewIndex(0);
        t.request_transition(r, ResourceState::PixelShaderResource, PassHandle(1), v);
        t.request_transition(r, ResourceState::NonPixelShaderResource, PassHandle(2), v);
        assert_eq!(t.planned_transitions().len(), 2);
    }

    #[test]
    fn first_request_implicitly_seeds_common() {
        let mut t = ResourceStateTracker::new();
        let r = ResourceHandle(1);
        let v = ViewIndex(0);
        t.request_transition(r, ResourceState::RenderTarget, PassHandle(1), v);
        let tr = &t.planned_transitions()[0];
        assert_eq!(tr.from, ResourceState::Common);
    }

    #[test]
    fn reset_clears_state_and_is_idempotent_on_replay() {
        let mut t = ResourceStateTracker::new();
        let r = ResourceHandle(1);
        let v = ViewIndex(0);
        t.request_transition(r, ResourceState::RenderTarget, PassHandle(1), v);
        t.reset();
        t.request_transition(r, ResourceState::RenderTarget, PassHandle(1), v);
        assert_eq!(t.planned_transitions().len(), 1);
        assert_eq!(t.planned_transitions()[0].from, ResourceState::Common);
    }

    #[test]
    fn keys_are_per_resource_and_view() {
        let mut t = ResourceStateTracker::new();
        let r = ResourceHandle(1);
        t.request_transition(r, ResourceState::RenderTarget, PassHandle(1), ViewIndex(0));
        t.request_transition(r, ResourceState::DepthWrite, PassHandle(1), ViewIndex(1));
        assert_eq!(t.current_state(r, ViewIndex(0)), Some(ResourceState::RenderTarget));
        assert_eq!(t.current_state(r, ViewIndex(1)), Some(ResourceState::DepthWrite));
    }
}
