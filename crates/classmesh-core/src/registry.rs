//! Policy id → coordinator factory, loaded on demand and cached.

use std::sync::Arc;

use dashmap::DashMap;

use crate::coordinator::{CoordinatorFactory, PolicyResolver};
use crate::error::{MeshError, Result};
use crate::program::ProgramLoader;
use crate::runtime::CompiledPolicyRuntime;
use crate::validator::ValidatorConfig;

/// What persistence holds for one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRecord {
    pub compiled_bytecode: Vec<u8>,
    pub validator_config_json: Option<String>,
    pub plugin_id: String,
    pub plugin_version: String,
}

/// Persistence lookup. `Ok(None)` means the policy does not exist.
pub trait PolicyStore: Send + Sync {
    fn fetch_policy_record(&self, policy_id: &str) -> Result<Option<PolicyRecord>>;
}

/// In-memory store, used by the gateway (filled from config) and tests.
#[derive(Default)]
pub struct MemoryPolicyStore {
    records: DashMap<String, PolicyRecord>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, policy_id: &str, record: PolicyRecord) {
        self.records.insert(policy_id.to_string(), record);
    }

    pub fn remove(&self, policy_id: &str) -> Option<PolicyRecord> {
        self.records.remove(policy_id).map(|(_, r)| r)
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn fetch_policy_record(&self, policy_id: &str) -> Result<Option<PolicyRecord>> {
        Ok(self.records.get(policy_id).map(|r| r.value().clone()))
    }
}

/// `(plugin_id, plugin_version, policy_id)`
pub type CacheKey = (String, String, String);

/// Loaded factories. Owned by one registry.
#[derive(Default)]
pub struct PolicyCache {
    entries: DashMap<CacheKey, Arc<dyn CoordinatorFactory>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<Arc<dyn CoordinatorFactory>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn insert(&self, key: CacheKey, factory: Arc<dyn CoordinatorFactory>) {
        self.entries.insert(key, factory);
    }

    pub fn evict(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves policy ids through a store and a program loader.
pub struct PolicyRegistry {
    store: Arc<dyn PolicyStore>,
    loader: Arc<dyn ProgramLoader>,
    cache: PolicyCache,
}

impl PolicyRegistry {
    pub fn new(store: Arc<dyn PolicyStore>, loader: Arc<dyn ProgramLoader>) -> Self {
        Self { store, loader, cache: PolicyCache::new() }
    }

    pub fn cache(&self) -> &PolicyCache {
        &self.cache
    }

    /// Factory for `policy_id`, or `None` if the store has no such record.
    ///
    /// The record is fetched every call so a version bump picks up a fresh
    /// factory; loading only happens on a cache miss.
    pub fn get_policy(&self, policy_id: &str) -> Result<Option<Arc<dyn CoordinatorFactory>>> {
        let Some(record) = self.store.fetch_policy_record(policy_id)? else {
            return Ok(None);
        };
        let key = (record.plugin_id.clone(), record.plugin_version.clone(), policy_id.to_string());
        if let Some(hit) = self.cache.lookup(&key) {
            return Ok(Some(hit));
        }

        let program = self.loader.load(&record.compiled_bytecode)?;
        let validator = record
            .validator_config_json
            .as_deref()
            .map(ValidatorConfig::from_json)
            .transpose()
            .map_err(|e| match e {
                MeshError::Configuration(m) => MeshError::Configuration(format!("policy {policy_id:?}: {m}")),
                other => other,
            })?;
        let factory: Arc<dyn CoordinatorFactory> =
            Arc::new(CompiledPolicyRuntime::new(policy_id, program, validator));
        tracing::info!(
            policy = %policy_id, plugin = %record.plugin_id, version = %record.plugin_version,
            "policy loaded"
        );
        self.cache.insert(key, factory.clone());
        Ok(Some(factory))
    }
}

impl PolicyResolver for PolicyRegistry {
    fn resolve(&self, policy: &str) -> Result<Option<Arc<dyn CoordinatorFactory>>> {
        self.get_policy(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::native::{manifest, NativeLoader};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        inner: NativeLoader,
        loads: AtomicUsize,
    }

    impl ProgramLoader for CountingLoader {
        fn load(&self, bytecode: &[u8]) -> Result<Arc<dyn crate::program::CompiledProgram>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(bytecode)
        }
    }

    fn record(entry: &str, version: &str, validator: Option<&str>) -> PolicyRecord {
        PolicyRecord {
            compiled_bytecode: manifest(entry),
            validator_config_json: validator.map(str::to_string),
            plugin_id: "core".into(),
            plugin_version: version.into(),
        }
    }

    fn registry() -> (Arc<MemoryPolicyStore>, Arc<CountingLoader>, PolicyRegistry) {
        let store = Arc::new(MemoryPolicyStore::new());
        let loader = Arc::new(CountingLoader { inner: NativeLoader::builtin(), loads: AtomicUsize::new(0) });
        let reg = PolicyRegistry::new(store.clone(), loader.clone());
        (store, loader, reg)
    }

    #[test]
    fn unknown_policy_is_none() {
        let (_store, _loader, reg) = registry();
        assert!(reg.get_policy("nope").unwrap().is_none());
    }

    #[test]
    fn loads_once_per_version() {
        let (store, loader, reg) = registry();
        store.insert("ring", record("ring", "1.0.0", None));

        let a = reg.get_policy("ring").unwrap().unwrap();
        let b = reg.get_policy("ring").unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        store.insert("ring", record("ring", "1.1.0", None));
        let c = reg.get_policy("ring").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(reg.cache().len(), 2);
    }

    #[test]
    fn evicted_entries_reload() {
        let (store, loader, reg) = registry();
        store.insert("mesh", record("mesh", "1", None));
        reg.get_policy("mesh").unwrap();
        assert!(reg.cache().evict(&("core".into(), "1".into(), "mesh".into())));
        reg.get_policy("mesh").unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn validator_is_attached() {
        let (store, _loader, reg) = registry();
        let v = r#"[{"params": {"rooms": {"type": "int", "min": 1, "max": 8}}}]"#;
        store.insert("breakout", record("breakout", "1", Some(v)));
        let f = reg.get_policy("breakout").unwrap().unwrap();

        let mut ok = crate::value::Params::new();
        ok.insert("rooms".into(), crate::value::ParamValue::Int(3));
        assert!(f.validate(&ok));
        ok.insert("rooms".into(), crate::value::ParamValue::Int(30));
        assert!(!f.validate(&ok));
    }

    #[test]
    fn malformed_validator_is_configuration_error() {
        let (store, _loader, reg) = registry();
        store.insert("ring", record("ring", "1", Some("{not json")));
        assert!(reg.get_policy("ring").err().is_some_and(|e| e.is_configuration()));
        assert!(reg.cache().is_empty());
    }
}
