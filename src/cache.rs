//! In-process LRU cache of compiled graphs, keyed by structural identity so
//! repeated builds of the same shape reuse one `Graph` instead of
//! recompiling every frame.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use fxhash::{FxHashMap, FxHasher};

use crate::capability::ViewInfo;
use crate::descriptor::ResourceDescriptor;
use crate::graph::Graph;
use crate::handle::{PassHandle, ResourceHandle};
use crate::pass::Pass;
use crate::scheduler::SchedulingResult;

const DEFAULT_MEMORY_ESTIMATE: u64 = 1024;

/// Four 64-bit fields combined into a single lookup hash by XOR with small
/// rotations: structure (pass handles), resources (resource handles),
/// viewport (view names), and view count.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct CacheKey {
    pub structure_hash: u64,
    pub resource_hash: u64,
    pub viewport_hash: u64,
    pub view_count: u64,
}

impl CacheKey {
    pub fn compute(passes: &[Pass], resources: &FxHashMap<ResourceHandle, ResourceDescriptor>, views: &[ViewInfo]) -> Self {
        let mut pass_handles: Vec<u32> = passes.iter().map(|p: &Pass| p.handle.0).collect();
        pass_handles.sort_unstable();
        let mut resource_handles: Vec<u32> = resources.keys().map(|h| h.0).collect();
        resource_handles.sort_unstable();

        CacheKey {
            structure_hash: hash_seq(&pass_handles),
            resource_hash: hash_seq(&resource_handles),
            viewport_hash: hash_view_names(views),
            view_count: views.len() as u64,
        }
    }

    /// Combined 64-bit lookup hash, used by the (structural-equality) map
    /// underneath but also exposed for callers that want a single number.
    pub fn lookup_hash(&self) -> u64 {
        self.structure_hash
            ^ self.resource_hash.rotate_left(13)
            ^ self.viewport_hash.rotate_left(29)
            ^ self.view_count.rotate_left(47)
    }
}

fn hash_seq(items: &[u32]) -> u64 {
    let mut hasher = FxHasher::default();
    items.hash(&mut hasher);
    hasher.finish()
}

fn hash_view_names(views: &[ViewInfo]) -> u64 {
    let mut hasher = FxHasher::default();
    for v in views {
        v.view_name.hash(&mut hasher);
    }
    hasher.finish()
}

struct CacheEntry {
    graph: Arc<Graph>,
    scheduling: SchedulingResult,
    memory_bytes: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: u64,
    pub memory_bytes: u64,
}

struct CacheInner {
    entries: FxHashMap<CacheKey, CacheEntry>,
    /// Front = least recently used, back = most recently used.
    recency: VecDeque<CacheKey>,
    max_entries: usize,
    max_bytes: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(*key);
    }

    fn total_memory(&self) -> u64 {
        self.entries.values().map(|e| e.memory_bytes).sum()
    }

    fn enforce_bounds(&mut self) {
        while self.entries.len() > self.max_entries || self.total_memory() > self.max_bytes {
            let Some(lru) = self.recency.pop_front() else { break };
            if self.entries.remove(&lru).is_some() {
                self.stats.evictions += 1;
            }
        }
        self.stats.entries = self.entries.len() as u64;
        self.stats.memory_bytes = self.total_memory();
    }
}

/// All operations are mutex-serialised: safe for concurrent lookups,
/// statistics maintained under the same lock and exposed as a snapshot.
pub struct Cache {
    inner: Mutex<CacheInner>,
}

impl Cache {
    pub fn new(max_entries: usize, max_bytes: u64) -> Self {
        Cache {
            inner: Mutex::new(CacheInner {
                entries: FxHashMap::default(),
                recency: VecDeque::new(),
                max_entries,
                max_bytes,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Graph>> {
        let mut inner = self.inner.lock().unwrap();
        inner.stats.total_requests += 1;
        if inner.entries.contains_key(key) {
            inner.touch(key);
            inner.stats.hits += 1;
            inner.entries.get(key).map(|e| e.graph.clone())
        } else {
            inner.stats.misses += 1;
            None
        }
    }

    pub fn set(&self, key: CacheKey, graph: Arc<Graph>, scheduling: SchedulingResult) {
        self.set_with_memory_estimate(key, graph, scheduling, DEFAULT_MEMORY_ESTIMATE);
    }

    pub fn set_with_memory_estimate(&self, key: CacheKey, graph: Arc<Graph>, scheduling: SchedulingResult, memory_bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(key, CacheEntry { graph, scheduling, memory_bytes });
        inner.touch(&key);
        inner.enforce_bounds();
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().unwrap().entries.contains_key(key)
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(key);
        if let Some(pos) = inner.recency.iter().position(|k| k == key) {
            inner.recency.remove(pos);
        }
        inner.stats.entries = inner.entries.len() as u64;
        inner.stats.memory_bytes = inner.total_memory();
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.recency.clear();
        inner.stats.entries = 0;
        inner.stats.memory_bytes = 0;
    }

    pub fn set_max_entries(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_entries = n;
        inner.enforce_bounds();
    }

    pub fn set_max_bytes(&self, b: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_bytes = b;
        inner.enforce_bounds();
    }

    pub fn get_stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }
}

/// A separate cache of intermediate scheduling results, written on every
/// build but never read back from. No read-side consumer is implemented
/// here; this struct exists so the write path has somewhere to put entries
/// rather than silently dropping the concept.
#[derive(Default)]
pub struct CompilationCache {
    entries: FxHashMap<CacheKey, Vec<PassHandle>>,
}

impl CompilationCache {
    pub fn new() -> Self {
        CompilationCache::default()
    }

    pub fn record(&mut self, key: CacheKey, execution_order: Vec<PassHandle>) {
        self.entries.insert(key, execution_order);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ValidationResult;

    fn dummy_graph() -> Arc<Graph> {
        Arc::new(Graph::empty_for_test())
    }

    fn key(n: u64) -> CacheKey {
        CacheKey { structure_hash: n, resource_hash: n, viewport_hash: n, view_count: 1 }
    }

    #[test]
    fn miss_then_hit_updates_stats() {
        let cache = Cache::new(8, 1_000_000);
        assert!(cache.get(&key(1)).is_none());
        cache.set(key(1), dummy_graph(), SchedulingResult::default());
        assert!(cache.get(&key(1)).is_some());
        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn eviction_respects_max_entries() {
        let cache = Cache::new(2, 1_000_000);
        cache.set(key(1), dummy_graph(), SchedulingResult::default());
        cache.set(key(2), dummy_graph(), SchedulingResult::default());
        cache.set(key(3), dummy_graph(), SchedulingResult::default());

        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
        assert_eq!(cache.get_stats().evictions, 1);
    }

    #[test]
    fn touching_an_entry_protects_it_from_eviction() {
        let cache = Cache::new(2, 1_000_000);
        cache.set(key(1), dummy_graph(), SchedulingResult::default());
        cache.set(key(2), dummy_graph(), SchedulingResult::default());
        cache.get(&key(1)); // key(1) now most-recently-used
        cache.set(key(3), dummy_graph(), SchedulingResult::default());

        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
    }

    #[test]
    fn invalidate_and_clear_remove_entries() {
        let cache = Cache::new(8, 1_000_000);
        cache.set(key(1), dummy_graph(), SchedulingResult::default());
        cache.invalidate(&key(1));
        assert!(!cache.contains(&key(1)));

        cache.set(key(2), dummy_graph(), SchedulingResult::default());
        cache.clear();
        assert!(!cache.contains(&key(2)));
        assert_eq!(cache.get_stats().entries, 0);
    }

    #[test]
    fn validation_sink_type_is_usable_as_trait_object() {
        // sanity: ValidationResult is reachable from this module's test scope.
        let _r = ValidationResult::new();
    }
}
