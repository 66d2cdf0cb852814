//! Resource descriptors: `Texture` and `Buffer` value types, with the
//! compatibility predicates the alias analyzer and the promotion optimizer
//! rely on.

use bitflags::bitflags;
use fxhash::FxHasher;
use std::hash::{Hash, Hasher};

use crate::handle::INVALID;
use crate::state::{ResourceLifetime, Scope};

bitflags! {
    /// Usage bitmask shared by textures and buffers. Individual bits are
    /// deliberately coarse (render target / SRV / UAV / copy endpoints) —
    /// this crate never talks to a concrete GPU API, it only needs enough
    /// information to drive compatibility and aliasing decisions.
    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default)]
    pub struct UsageFlags: u32 {
        const RENDER_TARGET     = 1 << 0;
        const DEPTH_STENCIL     = 1 << 1;
        const SHADER_RESOURCE   = 1 << 2;
        const UNORDERED_ACCESS  = 1 << 3;
        const COPY_SRC          = 1 << 4;
        const COPY_DST          = 1 << 5;
        const VERTEX_OR_INDEX   = 1 << 6;
        const CONSTANT          = 1 << 7;
    }
}

/// Opaque tag standing in for a concrete pixel format. The core never
/// interprets these beyond equality and the "same size class" predicate
/// used by `format_compatible_with`.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct FormatTag {
    pub id: u32,
    /// Bytes per texel for this format; used for the size-class predicate.
    pub bytes_per_texel: u32,
}

#[derive(Clone, Debug)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub format: FormatTag,
    pub usage: UsageFlags,
}

#[derive(Clone, Debug)]
pub struct BufferDesc {
    pub size_bytes: u64,
    pub element_stride: u32,
    pub usage: UsageFlags,
}

#[derive(Clone, Debug)]
pub enum ResourceKind {
    Texture(TextureDesc),
    Buffer(BufferDesc),
}

/// A resource descriptor: debug name, lifetime/scope, the shape-specific
/// payload, and a bindless descriptor index stamped in during the
/// descriptor-allocation build phase.
#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
    pub debug_name: String,
    pub lifetime: ResourceLifetime,
    pub scope: Scope,
    pub kind: ResourceKind,
    pub bindless_index: u32,
}

impl ResourceDescriptor {
    pub fn new_texture(debug_name: impl Into<String>, lifetime: ResourceLifetime, scope: Scope, tex: TextureDesc) -> Self {
        ResourceDescriptor {
            debug_name: debug_name.into(),
            lifetime,
            scope,
            kind: ResourceKind::Texture(tex),
            bindless_index: INVALID,
        }
    }

    pub fn new_buffer(debug_name: impl Into<String>, lifetime: ResourceLifetime, scope: Scope, buf: BufferDesc) -> Self {
        ResourceDescriptor {
            debug_name: debug_name.into(),
            lifetime,
            scope,
            kind: ResourceKind::Buffer(buf),
            bindless_index: INVALID,
        }
    }

    pub fn has_descriptor(&self) -> bool {
        self.bindless_index != INVALID
    }

    pub fn byte_estimate(&self) -> u64 {
        match &self.kind {
            ResourceKind::Texture(t) => {
                t.width as u64 * t.height as u64 * 4
            }
            ResourceKind::Buffer(b) => b.size_bytes,
        }
    }

    /// Order-independent combination of shape and usage, used to group
    /// candidate resources without caring which operand is `self`/`other`.
    pub fn compatibility_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        match &self.kind {
            ResourceKind::Texture(t) => {
                0u8.hash(&mut hasher);
                t.width.hash(&mut hasher);
                t.height.hash(&mut hasher);
                t.depth.hash(&mut hasher);
                t.format.id.hash(&mut hasher);
                t.usage.bits().hash(&mut hasher);
            }
            ResourceKind::Buffer(b) => {
                1u8.hash(&mut hasher);
                b.size_bytes.hash(&mut hasher);
                b.usage.bits().hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Stronger than `compatibility_hash`: for textures requires identical
    /// dimensions and either identical format or same size-class + identical
    /// usage; for buffers requires either identical size+usage, or a
    /// size-ratio <= 2x with one usage being a superset of the other.
    pub fn format_compatible_with(&self, other: &ResourceDescriptor) -> bool {
        match (&self.kind, &other.kind) {
            (ResourceKind::Texture(a), ResourceKind::Texture(b)) => {
                if a.width != b.width || a.height != b.height || a.depth != b.depth {
                    return false;
                }
                if a.format == b.format {
                    return true;
                }
                a.format.bytes_per_texel == b.format.bytes_per_texel && a.usage == b.usage
            }
            (ResourceKind::Buffer(a), ResourceKind::Buffer(b)) => {
                if a.size_bytes == b.size_bytes && a.usage == b.usage {
                    return true;
                }
                let (small, large) = if a.size_bytes <= b.size_bytes {
                    (a.size_bytes, b.size_bytes)
                } else {
                    (b.size_bytes, a.size_bytes)
                };
                if small == 0 {
                    return false;
                }
                let ratio_ok = large as f64 / small as f64 <= 2.0;
                let superset = a.usage.contains(b.usage) || b.usage.contains(a.usage);
                ratio_ok && superset
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tex(w: u32, h: u32, fmt: u32) -> TextureDesc {
        TextureDesc {
            width: w,
            height: h,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            sample_count: 1,
            sample_quality: 0,
            format: FormatTag { id: fmt, bytes_per_texel: 4 },
            usage: UsageFlags::RENDER_TARGET,
        }
    }

    #[test]
    fn identical_textures_are_format_compatible() {
        let a = ResourceDescriptor::new_texture("a", ResourceLifetime::Transient, Scope::Shared, tex(512, 512, 1));
        let b = ResourceDescriptor::new_texture("b", ResourceLifetime::Transient, Scope::Shared, tex(512, 512, 1));
        assert!(a.format_compatible_with(&b));
        assert!(b.format_compatible_with(&a));
    }

    #[test]
    fn mismatched_dimensions_are_incompatible() {
        let a = ResourceDescriptor::new_texture("a", ResourceLifetime::Transient, Scope::Shared, tex(512, 512, 1));
        let b = ResourceDescriptor::new_texture("b", ResourceLifetime::Transient, Scope::Shared, tex(256, 256, 1));
        assert!(!a.format_compatible_with(&b));
    }

    #[test]
    fn buffers_within_2x_and_superset_usage_are_compatible() {
        let a = ResourceDescriptor::new_buffer(
            "a",
            ResourceLifetime::Transient,
            Scope::Shared,
            BufferDesc { size_bytes: 1024, element_stride: 4, usage: UsageFlags::SHADER_RESOURCE },
        );
        let b = ResourceDescriptor::new_buffer(
            "b",
            ResourceLifetime::Transient,
            Scope::Shared,
            BufferDesc {
                size_bytes: 2000,
                element_stride: 4,
                usage: UsageFlags::SHADER_RESOURCE | UsageFlags::UNORDERED_ACCESS,
            },
        );
        assert!(a.format_compatible_with(&b));
    }

    #[test]
    fn buffers_beyond_2x_are_incompatible() {
        let a = ResourceDescriptor::new_buffer(
            "a",
            ResourceLifetime::Transient,
            Scope::Shared,
            BufferDesc { size_bytes: 1024, element_stride: 4, usage: UsageFlags::SHADER_RESOURCE },
        );
        let b = ResourceDescriptor::new_buffer(
            "b",
            ResourceLifetime::Transient,
            Scope::Shared,
            BufferDesc { size_bytes: 4096, element_stride: 4, usage: UsageFlags::SHADER_RESOURCE },
        );
        assert!(!a.format_compatible_with(&b));
    }

    #[test]
    fn compatibility_hash_is_shape_and_usage_derived() {
        let a = ResourceDescriptor::new_texture("a", ResourceLifetime::Transient, Scope::Shared, tex(512, 512, 1));
        let b = ResourceDescriptor::new_texture("b", ResourceLifetime::Transient, Scope::Shared, tex(512, 512, 1));
        assert_eq!(a.compatibility_hash(), b.compatibility_hash());
    }
}
