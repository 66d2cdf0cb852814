//! Alias and lifetime analyzer. From a set of resources, a set of usages,
//! and (optionally) a topological ordering, produces alias hazards and
//! safe alias candidates.

use fxhash::{FxHashMap, FxHashSet};
use log::{debug, warn};

use crate::descriptor::ResourceDescriptor;
use crate::diagnostics::{DiagnosticsSink, ValidationError, ValidationErrorKind};
use crate::handle::{PassHandle, ResourceHandle, ViewIndex, DEBUG_FILL_PATTERN};
use crate::state::{ResourceLifetime, Scope};

#[derive(Clone, Copy, Debug)]
pub struct ResourceUsage {
    pub pass: PassHandle,
    pub state: crate::state::ResourceState,
    pub is_write: bool,
    pub view: ViewIndex,
}

/// One per resource: touch points and derived interval.
#[derive(Clone, Debug)]
pub struct ResourceLifetimeInfo {
    pub resource: ResourceHandle,
    pub first_pass: PassHandle,
    pub last_pass: PassHandle,
    pub usages: Vec<ResourceUsage>,
    pub aliasable_with: FxHashSet<ResourceHandle>,
    pub byte_estimate: u64,
    pub has_write_conflicts: bool,
    pub first_index: Option<u32>,
    pub last_index: Option<u32>,
}

impl ResourceLifetimeInfo {
    fn new(resource: ResourceHandle, byte_estimate: u64) -> Self {
        ResourceLifetimeInfo {
            resource,
            first_pass: PassHandle::INVALID,
            last_pass: PassHandle::INVALID,
            usages: Vec::new(),
            aliasable_with: FxHashSet::default(),
            byte_estimate,
            has_write_conflicts: false,
            first_index: None,
            last_index: None,
        }
    }

    /// `[first_index, last_index]` when both indices are set (topological
    /// order was supplied), otherwise the fallback `[first_handle,
    /// last_handle]`.
    fn interval(&self) -> (u32, u32) {
        match (self.first_index, self.last_index) {
            (Some(a), Some(b)) => (a, b),
            _ => (self.first_pass.0, self.last_pass.0),
        }
    }

    fn overlaps(&self, other: &ResourceLifetimeInfo) -> bool {
        let (a0, a1) = self.interval();
        let (b0, b1) = other.interval();
        a0 <= b1 && b0 <= a1
    }

    fn has_writer(&self) -> bool {
        self.usages.iter().any(|u| u.is_write)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum HazardSeverity {
    Warning,
    Error,
}

#[derive(Clone, Debug)]
pub struct AliasHazard {
    pub resource_a: ResourceHandle,
    pub resource_b: ResourceHandle,
    pub conflicting_passes: Vec<PassHandle>,
    pub description: String,
    pub severity: HazardSeverity,
}

#[derive(Clone, Debug)]
pub struct AliasCandidate {
    pub resource_a: ResourceHandle,
    pub resource_b: ResourceHandle,
    pub combined_memory: u64,
    pub description: String,
}

#[derive(Default)]
pub struct AliasAnalyzer {
    lifetimes: FxHashMap<ResourceHandle, ResourceLifetimeInfo>,
    descriptors: FxHashMap<ResourceHandle, (ResourceLifetime, Scope)>,
    topo_index: FxHashMap<PassHandle, u32>,
    debug_fill_warned: bool,
}

impl AliasAnalyzer {
    pub fn new() -> Self {
        AliasAnalyzer::default()
    }

    pub fn register_resource(&mut self, handle: ResourceHandle, descriptor: &ResourceDescriptor) {
        self.lifetimes
            .entry(handle)
            .or_insert_with(|| ResourceLifetimeInfo::new(handle, descriptor.byte_estimate()));
        self.descriptors.insert(handle, (descriptor.lifetime, descriptor.scope));
    }

    pub fn set_topological_order(&mut self, order: &[PassHandle]) {
        self.topo_index.clear();
        for (i, p) in order.iter().enumerate() {
            self.topo_index.insert(*p, i as u32);
        }
        // Re-derive first/last indices for every already-registered resource.
        for info in self.lifetimes.values_mut() {
            if info.first_pass.is_valid() {
                info.first_index = self.topo_index.get(&info.first_pass).copied();
            }
            if info.last_pass.is_valid() {
                info.last_index = self.topo_index.get(&info.last_pass).copied();
            }
        }
    }

    /// Registers one pass access. Unregistered resources are reported
    /// through `sink`: the debug-fill pattern `0xBEBEBEBE` downgrades to a
    /// single warning across the whole build (subsequent occurrences are
    /// silently ignored); any other unknown handle is a warning every time.
    pub fn register_usage(
        &mut self,
        resource: ResourceHandle,
        state: crate::state::ResourceState,
        is_write: bool,
        pass: PassHandle,
        view: ViewIndex,
        sink: &mut dyn DiagnosticsSink,
    ) {
        if !self.lifetimes.contains_key(&resource) {
            if resource.0 == DEBUG_FILL_PATTERN {
                if !self.debug_fill_warned {
                    self.debug_fill_warned = true;
                    warn!("resource usage with debug-fill pattern 0x{:08X} in pass {:?}", DEBUG_FILL_PATTERN, pass);
                    sink.add_warning(ValidationError::new(
                        ValidationErrorKind::ResourceNotFound,
                        "debug-fill pattern used as a resource handle (downgraded, further occurrences suppressed)",
                    ));
                }
                return;
            }
            warn!("unknown resource handle {:?} used by pass {:?}", resource, pass);
            sink.add_warning(ValidationError::new(
                ValidationErrorKind::ResourceNotFound,
                format!("pass {:?} used unregistered resource {:?}", pass, resource),
            ));
            return;
        }

        let info = self.lifetimes.get_mut(&resource).unwrap();
        if !info.first_pass.is_valid() {
            info.first_pass = pass;
            info.first_index = self.topo_index.get(&pass).copied();
        }
        info.last_pass = pass;
        info.last_index = self.topo_index.get(&pass).copied();

        if is_write {
            let same_pass_write_conflict = info
                .usages
                .iter()
                .any(|u| u.is_write && u.pass == pass && u.view == view);
            if same_pass_write_conflict {
                info.has_write_conflicts = true;
            }
        }

        info.usages.push(ResourceUsage { pass, state, is_write, view });
    }

    pub fn lifetimes(&self) -> impl Iterator<Item = &ResourceLifetimeInfo> {
        self.lifetimes.values()
    }

    pub fn lifetime_of(&self, resource: ResourceHandle) -> Option<&ResourceLifetimeInfo> {
        self.lifetimes.get(&resource)
    }

    fn are_compatible(&self, a: ResourceHandle, b: ResourceHandle, descriptors: &FxHashMap<ResourceHandle, ResourceDescriptor>) -> bool {
        let (life_a, _) = match self.descriptors.get(&a) {
            Some(v) => v,
            None => return false,
        };
        let (life_b, _) = match self.descriptors.get(&b) {
            Some(v) => v,
            None => return false,
        };
        if std::mem::discriminant(life_a) != std::mem::discriminant(life_b) {
            return false;
        }
        match (descriptors.get(&a), descriptors.get(&b)) {
            (Some(da), Some(db)) => da.format_compatible_with(db) && db.format_compatible_with(da),
            _ => false,
        }
    }

    /// Enumerates hazards and safe candidates over every sorted pair of
    /// registered resources.
    pub fn analyze(&self, descriptors: &FxHashMap<ResourceHandle, ResourceDescriptor>) -> (Vec<AliasHazard>, Vec<AliasCandidate>) {
        let mut hazards = Vec::new();
        let mut candidates = Vec::new();

        let mut handles: Vec<ResourceHandle> = self.lifetimes.keys().copied().collect();
        handles.sort();

        for i in 0..handles.len() {
            for j in (i + 1)..handles.len() {
                let a = handles[i];
                let b = handles[j];
                let info_a = &self.lifetimes[&a];
                let info_b = &self.lifetimes[&b];
                let (life_a, scope_a) = self.descriptors[&a];
                let (life_b, scope_b) = self.descriptors[&b];

                let overlap = info_a.overlaps(info_b);
                let both_transient = life_a == ResourceLifetime::Transient && life_b == ResourceLifetime::Transient;
                let mut hazard_emitted_for_pair = false;

                if both_transient && overlap {
                    let window = intersection(info_a.interval(), info_b.interval());
                    let conflicting_passes = passes_active_in_window(info_a, window, &self.topo_index)
                        .into_iter()
                        .chain(passes_active_in_window(info_b, window, &self.topo_index))
                        .collect::<FxHashSet<_>>()
                        .into_iter()
                        .collect();
                    hazards.push(AliasHazard {
                        resource_a: a,
                        resource_b: b,
                        conflicting_passes,
                        description: format!("transient resources {:?} and {:?} overlap in lifetime", a, b),
                        severity: HazardSeverity::Error,
                    });
                    hazard_emitted_for_pair = true;
                }

                if overlap && scope_a != scope_b && is_shared_or_per_view(scope_a) && is_shared_or_per_view(scope_b) {
                    hazards.push(AliasHazard {
                        resource_a: a,
                        resource_b: b,
                        conflicting_passes: vec![],
                        description: format!("{:?} and {:?} overlap with differing scope", a, b),
                        severity: HazardSeverity::Warning,
                    });
                }

                if overlap && info_a.has_writer() && info_b.has_writer() {
                    if let Some(pass) = find_concurrent_write(info_a, info_b) {
                        hazards.push(AliasHazard {
                            resource_a: a,
                            resource_b: b,
                            conflicting_passes: vec![pass],
                            description: format!("write/write overlap between {:?} and {:?} at pass {:?}", a, b, pass),
                            severity: HazardSeverity::Error,
                        });
                        hazard_emitted_for_pair = true;
                    }
                }

                if both_transient && !overlap {
                    let compatible = self.are_compatible(a, b, descriptors);
                    if !compatible {
                        hazards.push(AliasHazard {
                            resource_a: a,
                            resource_b: b,
                            conflicting_passes: vec![],
                            description: format!("{:?} and {:?} do not overlap but are incompatible shapes", a, b),
                            severity: HazardSeverity::Warning,
                        });
                    } else if !hazard_emitted_for_pair {
                        candidates.push(AliasCandidate {
                            resource_a: a,
                            resource_b: b,
                            combined_memory: info_a.byte_estimate.max(info_b.byte_estimate),
                            description: format!("{:?} and {:?} can safely alias", a, b),
                        });
                    }
                }

                debug!("analyzed pair {:?}/{:?}: overlap={} both_transient={}", a, b, overlap, both_transient);
            }
        }

        (hazards, candidates)
    }
}

fn is_shared_or_per_view(scope: Scope) -> bool {
    matches!(scope, Scope::Shared | Scope::PerView)
}

fn intersection((a0, a1): (u32, u32), (b0, b1): (u32, u32)) -> (u32, u32) {
    (a0.max(b0), a1.min(b1))
}

/// `(lo, hi)` is in the same units as `ResourceLifetimeInfo::interval()`:
/// topological index when an order was supplied, raw handle id otherwise.
/// Each usage is keyed the same way before comparing against the window.
fn passes_active_in_window(info: &ResourceLifetimeInfo, (lo, hi): (u32, u32), topo_index: &FxHashMap<PassHandle, u32>) -> Vec<PassHandle> {
    info.usages
        .iter()
        .filter(|u| {
            let idx = topo_index.get(&u.pass).copied().unwrap_or(u.pass.0);
            idx >= lo && idx <= hi
        })
        .map(|u| u.pass)
        .collect()
}

/// Finds a pass (optionally a (view, pass) pair) where both resources are
/// written, confirming an actual write/write conflict rather than just
/// "both are written somewhere".
fn find_concurrent_write(a: &ResourceLifetimeInfo, b: &ResourceLifetimeInfo) -> Option<PassHandle> {
    for ua in a.usages.iter().filter(|u| u.is_write) {
        for ub in b.usages.iter().filter(|u| u.is_write) {
            if ua.pass == ub.pass {
                return Some(ua.pass);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FormatTag, ResourceKind, TextureDesc};
    use crate::diagnostics::ValidationResult;

    fn transient_tex(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new_texture(
            name,
            ResourceLifetime::Transient,
            Scope::Shared,
            TextureDesc {
                width: 512,
                height: 512,
                depth: 1,
                mip_levels: 1,
                array_layers: 1,
                sample_count: 1,
                sample_quality: 0,
                format: FormatTag { id: 1, bytes_per_texel: 4 },
                usage: crate::descriptor::UsageFlags::RENDER_TARGET,
            },
        )
    }

    #[test]
    fn non_overlapping_compatible_transients_yield_a_candidate() {
        let mut analyzer = AliasAnalyzer::new();
        let mut descriptors = FxHashMap::default();
        let a = ResourceHandle(1);
        let b = ResourceHandle(2);
        descriptors.insert(a, transient_tex("a"));
        descriptors.insert(b, transient_tex("b"));
        analyzer.register_resource(a, &descriptors[&a]);
        analyzer.register_resource(b, &descriptors[&b]);

        let order = vec![PassHandle(1), PassHandle(2)];
        analyzer.set_topological_order(&order);

        let mut sink = ValidationResult::new();
        analyzer.register_usage(a, crate::state::ResourceState::RenderTarget, true, PassHandle(1), ViewIndex(0), &mut sink);
        analyzer.register_usage(b, crate::state::ResourceState::RenderTarget, true, PassHandle(2), ViewIndex(0), &mut sink);

        let (hazards, candidates) = analyzer.analyze(&descriptors);
        assert_eq!(hazards.len(), 0);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].combined_memory, 512 * 512 * 4);
    }

    #[test]
    fn overlapping_transients_yield_error_hazard() {
        let mut analyzer = AliasAnalyzer::new();
        let mut descriptors = FxHashMap::default();
        let a = ResourceHandle(1);
        let b = ResourceHandle(2);
        descriptors.insert(a, transient_tex("a"));
        descriptors.insert(b, transient_tex("b"));
        analyzer.register_resource(a, &descriptors[&a]);
        analyzer.register_resource(b, &descriptors[&b]);

        let order = vec![PassHandle(1), PassHandle(2), PassHandle(3)];
        analyzer.set_topological_order(&order);

        let mut sink = ValidationResult::new();
        analyzer.register_usage(a, crate::state::ResourceState::RenderTarget, true, PassHandle(1), ViewIndex(0), &mut sink);
        analyzer.register_usage(a, crate::state::ResourceState::PixelShaderResource, false, PassHandle(3), ViewIndex(0), &mut sink);
        analyzer.register_usage(b, crate::state::ResourceState::RenderTarget, true, PassHandle(2), ViewIndex(0), &mut sink);

        let (hazards, _candidates) = analyzer.analyze(&descriptors);
        assert!(hazards.iter().any(|h| h.severity == HazardSeverity::Error));
    }

    #[test]
    fn debug_fill_pattern_warns_once() {
        let mut analyzer = AliasAnalyzer::new();
        let mut sink = ValidationResult::new();
        let fill = ResourceHandle(DEBUG_FILL_PATTERN);
        analyzer.register_usage(fill, crate::state::ResourceState::Common, false, PassHandle(1), ViewIndex(0), &mut sink);
        analyzer.register_usage(fill, crate::state::ResourceState::Common, false, PassHandle(2), ViewIndex(0), &mut sink);
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn incompatible_non_overlapping_transients_yield_warning() {
        let mut analyzer = AliasAnalyzer::new();
        let mut descriptors = FxHashMap::default();
        let a = ResourceHandle(1);
        let b = ResourceHandle(2);
        descriptors.insert(a, transient_tex("a"));
        let mut bd = transient_tex("b");
        if let ResourceKind::Texture(ref mut t) = bd.kind {
            t.width = 64;
            t.height = 64;
        }
        descriptors.insert(b, bd);
        analyzer.register_resource(a, &descriptors[&a]);
        analyzer.register_resource(b, &descriptors[&b]);

        let order = vec![PassHandle(1), PassHandle(2)];
        analyzer.set_topological_order(&order);
        let mut sink = ValidationResult::new();
        analyzer.register_usage(a, crate::state::ResourceState::RenderTarget, true, PassHandle(1), ViewIndex(0), &mut sink);
        analyzer.register_usage(b, crate::state::ResourceState::RenderTarget, true, PassHandle(2), ViewIndex(0), &mut sink);

        let (hazards, candidates) = analyzer.analyze(&descriptors);
        assert!(hazards.iter().any(|h| h.severity == HazardSeverity::Warning));
        assert_eq!(candidates.len(), 0);
    }
}
