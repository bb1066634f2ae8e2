//! Schema cache keyed by template identity and default language.

use super::{SchemaTree, TemplateCompiler};
use crate::ConversionResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Statistics about cache usage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Number of trees currently cached.
    pub size: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type CacheKey = (String, String);

/// Compiled schema trees shared across conversion calls.
///
/// Lookups take a read lock only. A miss compiles outside any lock, so concurrent misses for
/// one key may compile redundantly; the first tree inserted wins and every caller receives it.
#[derive(Debug, Default)]
pub struct SchemaCache {
    trees: RwLock<HashMap<CacheKey, Arc<SchemaTree>>>,
    stats: RwLock<CacheStats>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(template_id: &str, default_language: &str) -> CacheKey {
        (template_id.to_string(), default_language.to_string())
    }

    /// Cached tree for the key, counting a hit or a miss.
    pub fn get(&self, template_id: &str, default_language: &str) -> Option<Arc<SchemaTree>> {
        let found = self
            .trees
            .read()
            .get(&Self::key(template_id, default_language))
            .cloned();
        let mut stats = self.stats.write();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Cached tree for the key, compiling and inserting it on a miss.
    ///
    /// # Errors
    ///
    /// Propagates the compiler's error; nothing is cached in that case.
    pub fn get_or_compile(
        &self,
        template_id: &str,
        default_language: &str,
        compiler: &dyn TemplateCompiler,
    ) -> ConversionResult<Arc<SchemaTree>> {
        if let Some(tree) = self.get(template_id, default_language) {
            return Ok(tree);
        }
        tracing::debug!(template_id, default_language, "compiling schema");
        let compiled = compiler.compile(template_id, default_language)?;
        Ok(self.insert_with_key(Self::key(template_id, default_language), compiled))
    }

    /// Inserts a tree under its own template id and default language, keeping an already
    /// cached tree for that key. Returns the cached tree.
    pub fn insert(&self, tree: SchemaTree) -> Arc<SchemaTree> {
        let key = Self::key(&tree.template_id, &tree.default_language);
        self.insert_with_key(key, tree)
    }

    fn insert_with_key(&self, key: CacheKey, tree: SchemaTree) -> Arc<SchemaTree> {
        let mut trees = self.trees.write();
        let cached = trees.entry(key).or_insert_with(|| Arc::new(tree)).clone();
        self.stats.write().size = trees.len() as u64;
        cached
    }

    /// Drops every language variant of a template. Returns the number of trees removed.
    pub fn invalidate(&self, template_id: &str) -> usize {
        let mut trees = self.trees.write();
        let before = trees.len();
        trees.retain(|(id, _), _| id != template_id);
        self.stats.write().size = trees.len() as u64;
        before - trees.len()
    }

    pub fn clear(&self) {
        self.trees.write().clear();
        self.stats.write().size = 0;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNode;
    use crate::ConversionError;
    use openehr::RmType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCompiler {
        calls: AtomicUsize,
    }

    impl TemplateCompiler for CountingCompiler {
        fn compile(
            &self,
            template_id: &str,
            default_language: &str,
        ) -> ConversionResult<SchemaTree> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if template_id == "broken" {
                return Err(ConversionError::Schema("cannot compile".into()));
            }
            Ok(SchemaTree {
                template_id: template_id.to_string(),
                default_language: default_language.to_string(),
                languages: vec![default_language.to_string()],
                root: SchemaNode::new("root", "Root", RmType::Composition),
            })
        }
    }

    #[test]
    fn compiles_once_per_key() {
        let cache = SchemaCache::new();
        let compiler = CountingCompiler {
            calls: AtomicUsize::new(0),
        };

        let first = cache.get_or_compile("t.v1", "en", &compiler).expect("compiled");
        let second = cache.get_or_compile("t.v1", "en", &compiler).expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);

        cache.get_or_compile("t.v1", "de", &compiler).expect("other language");
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.size, 2);
    }

    #[test]
    fn compiler_errors_are_not_cached() {
        let cache = SchemaCache::new();
        let compiler = CountingCompiler {
            calls: AtomicUsize::new(0),
        };
        assert!(cache.get_or_compile("broken", "en", &compiler).is_err());
        assert!(cache.get_or_compile("broken", "en", &compiler).is_err());
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn first_insert_wins() {
        let cache = SchemaCache::new();
        let compiler = CountingCompiler {
            calls: AtomicUsize::new(0),
        };
        let a = cache.insert(compiler.compile("t.v1", "en").expect("tree"));
        let b = cache.insert(compiler.compile("t.v1", "en").expect("tree"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = SchemaCache::new();
        let compiler = CountingCompiler {
            calls: AtomicUsize::new(0),
        };
        cache.get_or_compile("a", "en", &compiler).expect("a/en");
        cache.get_or_compile("a", "de", &compiler).expect("a/de");
        cache.get_or_compile("b", "en", &compiler).expect("b/en");

        assert_eq!(cache.invalidate("a"), 2);
        assert!(cache.get("a", "en").is_none());
        assert!(cache.get("b", "en").is_some());

        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn concurrent_misses_converge() {
        let cache = Arc::new(SchemaCache::new());
        let compiler = Arc::new(CountingCompiler {
            calls: AtomicUsize::new(0),
        });
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let compiler = Arc::clone(&compiler);
                std::thread::spawn(move || {
                    cache
                        .get_or_compile("shared", "en", compiler.as_ref())
                        .expect("compiled")
                })
            })
            .collect();
        let trees: Vec<Arc<SchemaTree>> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect();
        for tree in &trees[1..] {
            assert!(Arc::ptr_eq(&trees[0], tree));
        }
        assert_eq!(cache.stats().size, 1);
    }
}
