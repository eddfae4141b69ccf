use codescan_core::AstFile;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_CACHE_CAPACITY: usize = 500;

struct CacheEntry {
    content_hash: String,
    ast: Arc<AstFile>,
}

/// Parsed files keyed by path. An entry only hits when the stored content hash
/// matches the caller's; eviction is least-recently-used.
pub struct AstCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

impl AstCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, file_path: &str, content_hash: &str) -> Option<Arc<AstFile>> {
        let found = {
            let mut entries = self.entries.lock();
            entries
                .get(file_path)
                .filter(|entry| entry.content_hash == content_hash)
                .map(|entry| entry.ast.clone())
        };

        match found {
            Some(ast) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(file = %file_path, "AST cache hit");
                Some(ast)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a parse result. A concurrent store for the same key simply
    /// overwrites with an equivalent tree.
    pub fn put(&self, ast: Arc<AstFile>) {
        let entry = CacheEntry {
            content_hash: ast.content_hash.clone(),
            ast: ast.clone(),
        };
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(ast.file_path.clone(), entry) {
            if evicted != ast.file_path {
                debug!(file = %evicted, "AST cache evicted");
            }
        }
    }

    pub fn invalidate(&self, file_path: &str) {
        self.entries.lock().pop(file_path);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries: self.len(),
            capacity: self.capacity,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

impl Default for AstCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescan_core::Language;

    fn ast(path: &str, hash: &str) -> Arc<AstFile> {
        Arc::new(AstFile::failed(path, Language::TypeScript, hash, "n/a"))
    }

    #[test]
    fn hit_requires_matching_hash() {
        let cache = AstCache::new(4);
        cache.put(ast("a.ts", "h1"));
        assert!(cache.get("a.ts", "h1").is_some());
        assert!(cache.get("a.ts", "h2").is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = AstCache::new(2);
        cache.put(ast("a.ts", "a"));
        cache.put(ast("b.ts", "b"));
        // touch a so b becomes the eviction candidate
        assert!(cache.get("a.ts", "a").is_some());
        cache.put(ast("c.ts", "c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b.ts", "b").is_none());
        assert!(cache.get("a.ts", "a").is_some());
        assert!(cache.get("c.ts", "c").is_some());
    }

    #[test]
    fn overwrite_same_key_is_idempotent() {
        let cache = AstCache::new(2);
        cache.put(ast("a.ts", "a"));
        cache.put(ast("a.ts", "a"));
        assert_eq!(cache.len(), 1);
    }
}
