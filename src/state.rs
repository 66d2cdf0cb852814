//! Closed enumerations shared across the crate: resource state, lifetime,
//! scope, and queue kind. These are never encoded as free-form strings.

/// How a resource is being accessed by a pass at a given point in the
/// execution order.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum ResourceState {
    Undefined,
    Common,
    // --- read states ---
    VertexOrIndexBuffer,
    ConstantBuffer,
    PixelShaderResource,
    NonPixelShaderResource,
    AllShaderResource,
    CopySource,
    // --- write states ---
    RenderTarget,
    DepthWrite,
    DepthRead,
    UnorderedAccess,
    CopyDestination,
    Present,
}

impl ResourceState {
    /// `DepthRead` is grouped with the write states for mutual-exclusivity
    /// purposes even though it's a read access: a depth-test-only bind still
    /// locks the attachment against concurrent use. Not a naming accident.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::DepthRead
                | ResourceState::UnorderedAccess
                | ResourceState::CopyDestination
                | ResourceState::Present
        )
    }

    pub fn is_read(self) -> bool {
        matches!(
            self,
            ResourceState::VertexOrIndexBuffer
                | ResourceState::ConstantBuffer
                | ResourceState::PixelShaderResource
                | ResourceState::NonPixelShaderResource
                | ResourceState::AllShaderResource
                | ResourceState::CopySource
        )
    }
}

/// How long a resource persists.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum ResourceLifetime {
    /// Lives for the whole frame but is not aliasable.
    FrameLocal,
    /// Aliasable sub-frame resource; eligible for alias-candidate analysis.
    Transient,
    /// Externally managed (e.g. imported); never aliased, never reclaimed.
    External,
}

/// Whether a resource or pass exists once (Shared), once per view
/// (PerView), or — passes only — without any view association at all
/// (Viewless).
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Scope {
    Shared,
    PerView,
    Viewless,
}

/// The hardware queue a pass is assigned to by the scheduler.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Queue {
    Graphics,
    Compute,
    Copy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_states_are_disjoint() {
        for s in [
            ResourceState::Undefined,
            ResourceState::Common,
            ResourceState::VertexOrIndexBuffer,
            ResourceState::ConstantBuffer,
            ResourceState::PixelShaderResource,
            ResourceState::NonPixelShaderResource,
            ResourceState::AllShaderResource,
            ResourceState::CopySource,
            ResourceState::RenderTarget,
            ResourceState::DepthWrite,
            ResourceState::DepthRead,
            ResourceState::UnorderedAccess,
            ResourceState::CopyDestination,
            ResourceState::Present,
        ] {
            assert!(!(s.is_write() && s.is_read()), "{:?} is both", s);
        }
    }
}
