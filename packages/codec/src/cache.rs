//! Lazy, per-class compilation cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use crate::compiler::compile;
use crate::converters::CompiledConverterSet;
use crate::schema::PropertySchema;

/// One published schema version and, once compiled, its converters.
struct SchemaVersion {
    schema: Arc<PropertySchema>,
    compiled: OnceLock<Arc<CompiledConverterSet>>,
}

impl SchemaVersion {
    fn new(schema: Arc<PropertySchema>) -> Self {
        Self {
            schema,
            compiled: OnceLock::new(),
        }
    }
}

/// Holds a class's current schema and compiles converters for it on demand.
///
/// # Thread Safety
///
/// The current version is swapped atomically. Concurrent first callers for a
/// version block on a single compilation and all receive the same
/// `Arc<CompiledConverterSet>`. A conversion that already loaded a version
/// keeps using it even if a newer one is published meanwhile.
pub struct LazyCompilationCache {
    current: ArcSwap<SchemaVersion>,
    compiles: AtomicUsize,
}

impl LazyCompilationCache {
    pub fn new(schema: PropertySchema) -> Self {
        Self {
            current: ArcSwap::from_pointee(SchemaVersion::new(Arc::new(schema))),
            compiles: AtomicUsize::new(0),
        }
    }

    pub fn schema(&self) -> Arc<PropertySchema> {
        self.current.load().schema.clone()
    }

    /// Converters for the current schema, compiling them on first use.
    pub fn get_or_compile(&self, class_name: &str) -> Arc<CompiledConverterSet> {
        let current = self.current.load_full();
        current
            .compiled
            .get_or_init(|| {
                self.compiles.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    class = class_name,
                    version = current.schema.version(),
                    props = current.schema.len(),
                    "compiling prop converters"
                );
                Arc::new(compile(class_name, current.schema.clone()))
            })
            .clone()
    }

    /// Publish a new schema, dropping any converters compiled for the old one.
    pub fn publish(&self, schema: PropertySchema) {
        self.current
            .store(Arc::new(SchemaVersion::new(Arc::new(schema))));
    }

    /// Whether converters exist for the current schema.
    pub fn is_compiled(&self) -> bool {
        self.current.load().compiled.get().is_some()
    }

    /// How many times this cache has run the compiler.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropRule;

    fn schema_with(names: &[&str]) -> PropertySchema {
        names.iter().fold(PropertySchema::new(), |s, n| {
            s.with_rule("Widget", PropRule::new(*n)).unwrap()
        })
    }

    #[test]
    fn compiles_once_per_version() {
        let cache = LazyCompilationCache::new(schema_with(&["a"]));
        assert!(!cache.is_compiled());

        let first = cache.get_or_compile("Widget");
        let second = cache.get_or_compile("Widget");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.compile_count(), 1);
        assert!(cache.is_compiled());
    }

    #[test]
    fn publish_invalidates() {
        let cache = LazyCompilationCache::new(schema_with(&["a"]));
        let old = cache.get_or_compile("Widget");

        cache.publish(schema_with(&["a", "b"]));
        assert!(!cache.is_compiled());

        let new = cache.get_or_compile("Widget");
        assert_eq!(old.schema_version(), 1);
        assert_eq!(new.schema_version(), 2);
        assert_eq!(cache.compile_count(), 2);
    }

    #[test]
    fn concurrent_first_use_compiles_once() {
        let cache = LazyCompilationCache::new(schema_with(&["a", "b", "c"]));

        let sets: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| cache.get_or_compile("Widget")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(cache.compile_count(), 1);
        assert!(sets.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
