//! Persistent key-value state.

use crate::environment::Environment;
use crate::state::binding::Binding;
use crate::state::property::DynamicProperty;
use crate::state::publisher::Publisher;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Errors surfaced by storage providers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("storage serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Backend hook for persisting [`AppStorage`] values between runs.
///
/// Values cross this boundary as JSON so providers stay oblivious to the
/// concrete Rust types stored under each key.
pub trait StorageProvider: Send + Sync + 'static {
    /// Returns the stored value for `key`, or `None` if nothing is stored.
    fn retrieve(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Stores `value` under `key`.
    fn persist(&self, key: &str, value: &Value) -> Result<(), StorageError>;
}

struct StorageEntry {
    /// Type-erased in-memory copy; `None` until the key is first read or
    /// written.
    value: Option<Arc<dyn Any + Send + Sync>>,
    did_change: Publisher,
}

/// In-memory cache shared by every [`AppStorage`] referring to the same key.
///
/// The cache is the source of truth while the process runs; providers are
/// only consulted on the first read of a key and on writes. There is one
/// process-wide instance, but tests construct their own to stay isolated.
pub struct StorageCache {
    entries: Mutex<HashMap<String, StorageEntry>>,
}

impl StorageCache {
    pub fn new() -> StorageCache {
        StorageCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide cache.
    pub fn global() -> Arc<StorageCache> {
        static GLOBAL: OnceLock<Arc<StorageCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(StorageCache::new())))
    }

    /// The shared change publisher for `key`, created on first reference.
    ///
    /// Every storage handle for the same key in the same cache observes the
    /// same stream, so a write through one handle notifies them all.
    pub fn publisher(&self, key: &str) -> Publisher {
        let mut entries = self.entries.lock();
        entries
            .entry(key.to_string())
            .or_insert_with(|| StorageEntry {
                value: None,
                did_change: Publisher::new().tagged(format!("storage:{key}")),
            })
            .did_change
            .clone()
    }

    fn cached(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.entries.lock().get(key).and_then(|entry| entry.value.clone())
    }

    fn store(&self, key: &str, value: Arc<dyn Any + Send + Sync>) {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| StorageEntry {
                value: None,
                did_change: Publisher::new().tagged(format!("storage:{key}")),
            });
        entry.value = Some(value);
    }
}

impl Default for StorageCache {
    fn default() -> Self {
        StorageCache::new()
    }
}

struct StorageBox<V> {
    key: String,
    default: V,
    cache: Arc<StorageCache>,
    /// Shared per-key publisher, resolved from the cache once.
    did_change: Publisher,
    provider: Mutex<Option<Arc<dyn StorageProvider>>>,
}

/// A state cell persisted under a string key.
///
/// Reads hit the process-wide cache first; on a miss the attached provider
/// is consulted and the result (or the default) populates the cache. Writes
/// update the cache, publish on the key's shared stream, and persist
/// immediately. Persistence failures are logged and never surfaced to the
/// caller. Until a provider has been attached, reads return the default.
pub struct AppStorage<V> {
    storage: Arc<Mutex<Arc<StorageBox<V>>>>,
}

impl<V> AppStorage<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a handle backed by the process-wide cache.
    pub fn new(key: impl Into<String>, default: V) -> AppStorage<V> {
        AppStorage::with_cache(StorageCache::global(), key, default)
    }

    /// Creates a handle backed by an explicit cache.
    pub fn with_cache(
        cache: Arc<StorageCache>,
        key: impl Into<String>,
        default: V,
    ) -> AppStorage<V> {
        let key = key.into();
        let did_change = cache.publisher(&key);
        AppStorage {
            storage: Arc::new(Mutex::new(Arc::new(StorageBox {
                key,
                default,
                cache,
                did_change,
                provider: Mutex::new(None),
            }))),
        }
    }

    /// Returns the current value.
    pub fn get(&self) -> V {
        let bx = self.boxed();
        if let Some(cached) = bx.cache.cached(&bx.key) {
            return match cached.downcast::<V>() {
                Ok(value) => (*value).clone(),
                Err(_) => {
                    warn!(
                        key = %bx.key,
                        expected = std::any::type_name::<V>(),
                        "app storage key is cached with a different type, \
                         returning the default"
                    );
                    bx.default.clone()
                }
            };
        }

        let provider = bx.provider.lock().clone();
        let Some(provider) = provider else {
            return bx.default.clone();
        };
        let value = match provider.retrieve(&bx.key) {
            Ok(Some(json)) => match serde_json::from_value::<V>(json) {
                Ok(value) => value,
                Err(err) => {
                    warn!(key = %bx.key, error = %err, "stored app storage value does not decode, using the default");
                    bx.default.clone()
                }
            },
            Ok(None) => bx.default.clone(),
            Err(err) => {
                warn!(key = %bx.key, error = %err, "app storage retrieval failed, using the default");
                bx.default.clone()
            }
        };
        bx.cache.store(&bx.key, Arc::new(value.clone()));
        value
    }

    /// Stores a new value, notifies every handle for the key, and persists.
    pub fn set(&self, value: V) {
        let bx = self.boxed();
        bx.cache.store(&bx.key, Arc::new(value.clone()));
        bx.did_change.send();

        let provider = bx.provider.lock().clone();
        if let Some(provider) = provider {
            match serde_json::to_value(&value) {
                Ok(json) => {
                    if let Err(err) = provider.persist(&bx.key, &json) {
                        warn!(key = %bx.key, error = %err, "app storage persistence failed");
                    }
                }
                Err(err) => {
                    warn!(key = %bx.key, error = %err, "app storage value does not encode");
                }
            }
        }
    }

    /// The key's shared change publisher.
    pub fn did_change(&self) -> Publisher {
        self.boxed().did_change.clone()
    }

    /// Returns a binding to this key.
    pub fn binding(&self) -> Binding<V> {
        let read = AppStorage {
            storage: Arc::clone(&self.storage),
        };
        let write = AppStorage {
            storage: Arc::clone(&self.storage),
        };
        Binding::new(move || read.get(), move |value| write.set(value))
    }

    fn attach_provider(&self, provider: Option<Arc<dyn StorageProvider>>) {
        *self.boxed().provider.lock() = provider;
    }
}

impl<V> Clone for AppStorage<V> {
    fn clone(&self) -> Self {
        AppStorage {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<V> DynamicProperty for AppStorage<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Adopts the previous instance's storage, then picks up the provider
    /// currently offered by the environment.
    fn update(&self, previous: Option<&Self>, environment: &Environment) {
        if let Some(previous) = previous {
            let bx = previous.boxed();
            *self.storage.lock() = bx;
        }
        self.attach_provider(environment.storage_provider());
    }

    fn did_change(&self) -> Option<Publisher> {
        Some(self.boxed().did_change.clone())
    }
}

impl<V> AppStorage<V> {
    fn boxed(&self) -> Arc<StorageBox<V>> {
        self.storage.lock().clone()
    }
}

impl<V: fmt::Debug> fmt::Debug for AppStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bx = self.boxed();
        f.debug_struct("AppStorage").field("key", &bx.key).finish()
    }
}

/// A provider that keeps values in memory, for tests and previews.
#[derive(Default)]
pub struct MemoryProvider {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryProvider {
    pub fn new() -> MemoryProvider {
        MemoryProvider::default()
    }
}

impl StorageProvider for MemoryProvider {
    fn retrieve(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn persist(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value.clone());
        Ok(())
    }
}

impl fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("MemoryProvider")
    }
}

/// A provider that stores all keys as one JSON object in a file.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> FileProvider {
        FileProvider { path: path.into() }
    }

    fn load(&self) -> Result<serde_json::Map<String, Value>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let value: Value = serde_json::from_str(&contents)?;
                match value {
                    Value::Object(map) => Ok(map),
                    _ => Ok(serde_json::Map::new()),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(serde_json::Map::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl StorageProvider for FileProvider {
    fn retrieve(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.load()?.get(key).cloned())
    }

    fn persist(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut map = self.load()?;
        map.insert(key.to_string(), value.clone());
        let contents = serde_json::to_string_pretty(&Value::Object(map))?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn attached<V>(cache: &Arc<StorageCache>, key: &str, default: V, provider: &Arc<MemoryProvider>) -> AppStorage<V>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let storage = AppStorage::with_cache(Arc::clone(cache), key, default);
        storage.attach_provider(Some(Arc::clone(provider) as Arc<dyn StorageProvider>));
        storage
    }

    #[test]
    fn debug_output_names_the_key() {
        let cache = Arc::new(StorageCache::new());
        let storage = AppStorage::with_cache(cache, "volume", 80);
        assert_eq!(format!("{storage:?}"), "AppStorage { key: \"volume\" }");
    }

    #[test]
    fn defaults_before_a_provider_exists() {
        let cache = Arc::new(StorageCache::new());
        let storage: AppStorage<bool> = AppStorage::with_cache(cache, "flag", true);
        assert!(storage.get());
    }

    #[test]
    fn writes_are_visible_to_other_handles_for_the_key() {
        let cache = Arc::new(StorageCache::new());
        let provider = Arc::new(MemoryProvider::new());

        let first = attached(&cache, "flag", false, &provider);
        let second = attached(&cache, "flag", false, &provider);

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _obs = second.did_change().observe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        first.set(true);
        assert!(second.get(), "handles share the cache entry");
        scheduler::drain();
        assert_eq!(
            count.load(Ordering::SeqCst),
            1,
            "handles share the key's publisher"
        );
    }

    #[test]
    fn first_read_consults_the_provider_and_populates_the_cache() {
        let provider = Arc::new(MemoryProvider::new());
        provider
            .persist("volume", &serde_json::json!(80))
            .unwrap();

        let cache = Arc::new(StorageCache::new());
        let storage = attached(&cache, "volume", 10i64, &provider);
        assert_eq!(storage.get(), 80);

        // A second handle without a provider still sees the cached value.
        let detached: AppStorage<i64> = AppStorage::with_cache(cache, "volume", 10);
        assert_eq!(detached.get(), 80);
    }

    #[test]
    fn type_mismatch_under_a_key_yields_the_default() {
        let cache = Arc::new(StorageCache::new());
        let provider = Arc::new(MemoryProvider::new());
        let as_bool = attached(&cache, "k", false, &provider);
        as_bool.set(true);

        let as_int = attached(&cache, "k", 5i64, &provider);
        assert_eq!(as_int.get(), 5);
    }

    #[test]
    fn file_provider_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let provider = FileProvider::new(&path);
        provider
            .persist("name", &serde_json::json!("perch"))
            .unwrap();
        provider.persist("count", &serde_json::json!(3)).unwrap();

        let reopened = FileProvider::new(&path);
        assert_eq!(
            reopened.retrieve("name").unwrap(),
            Some(serde_json::json!("perch"))
        );
        assert_eq!(
            reopened.retrieve("count").unwrap(),
            Some(serde_json::json!(3))
        );
        assert_eq!(reopened.retrieve("missing").unwrap(), None);
    }

    #[test]
    fn persistence_failures_do_not_surface() {
        struct FailingProvider;
        impl StorageProvider for FailingProvider {
            fn retrieve(&self, _key: &str) -> Result<Option<Value>, StorageError> {
                Err(io::Error::new(io::ErrorKind::Other, "offline").into())
            }
            fn persist(&self, _key: &str, _value: &Value) -> Result<(), StorageError> {
                Err(io::Error::new(io::ErrorKind::Other, "offline").into())
            }
        }

        let cache = Arc::new(StorageCache::new());
        let storage = AppStorage::with_cache(Arc::clone(&cache), "flag", false);
        storage.attach_provider(Some(Arc::new(FailingProvider)));

        assert!(!storage.get(), "retrieval failure falls back to the default");
        storage.set(true);
        assert!(storage.get(), "the cache still holds the written value");
    }
}
