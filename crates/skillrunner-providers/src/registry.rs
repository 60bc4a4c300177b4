//! The Provider Registry: an ordered name→provider map.
//! Registration order is preserved separately from the lookup map so
//! routing can prefer "first registered that supports this model"
//! without depending on `HashMap` iteration order. Health probes run
//! concurrently, bounded by a semaphore, without holding any lock across
//! the network call — never hold the registry's `RwLock` across an await.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use skillrunner_common::EngineError;
use tokio::sync::Semaphore;

use crate::provider::{HealthStatus, Provider};

const DEFAULT_HEALTH_CONCURRENCY: usize = 4;

pub struct ProviderRegistry {
    order: RwLock<Vec<String>>,
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    health_concurrency: usize,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            order: RwLock::new(Vec::new()),
            providers: RwLock::new(HashMap::new()),
            health_concurrency: DEFAULT_HEALTH_CONCURRENCY,
        }
    }

    pub fn with_health_concurrency(mut self, concurrency: usize) -> Self {
        self.health_concurrency = concurrency.max(1);
        self
    }

    /// Register a provider under its own `info.name`. Re-registering an
    /// existing name replaces the provider but keeps its original slot in
    /// registration order. Rejects a nil/empty name.
    pub fn register(&self, provider: Arc<dyn Provider>) -> Result<(), EngineError> {
        let name = provider.info().name;
        if name.is_empty() {
            return Err(EngineError::validation("provider registration requires a non-empty name"));
        }
        let mut providers = self.providers.write().expect("registry providers poisoned");
        let is_new = !providers.contains_key(&name);
        providers.insert(name.clone(), provider);
        drop(providers);

        if is_new {
            let mut order = self.order.write().expect("registry order poisoned");
            order.push(name);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .read()
            .expect("registry providers poisoned")
            .get(name)
            .cloned()
    }

    pub fn names_in_registration_order(&self) -> Vec<String> {
        self.order.read().expect("registry order poisoned").clone()
    }

    /// The first registered provider (in registration order) claiming
    /// support for `model_id`. Used as the fallback when a routing
    /// profile names no specific provider.
    pub fn provider_for_model(&self, model_id: &str) -> Option<Arc<dyn Provider>> {
        let order = self.order.read().expect("registry order poisoned").clone();
        let providers = self.providers.read().expect("registry providers poisoned");
        order
            .iter()
            .filter_map(|name| providers.get(name))
            .find(|p| p.supports_model(model_id))
            .cloned()
    }

    /// Snapshot every registered provider, release the lock, then probe
    /// each concurrently (bounded by `health_concurrency`). The snapshot
    /// means a provider registered mid-sweep is simply absent from this
    /// sweep's results, never a torn read.
    pub async fn health_sweep(&self, model_id: &str) -> Vec<(String, HealthStatus)> {
        let snapshot: Vec<(String, Arc<dyn Provider>)> = {
            let order = self.order.read().expect("registry order poisoned");
            let providers = self.providers.read().expect("registry providers poisoned");
            order
                .iter()
                .filter_map(|name| providers.get(name).map(|p| (name.clone(), p.clone())))
                .collect()
        };

        let semaphore = Arc::new(Semaphore::new(self.health_concurrency));
        let futures = snapshot.into_iter().map(|(name, provider)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("health sweep semaphore closed");
                let status = provider.health_check(model_id).await;
                (name, status)
            }
        });

        futures_util::future::join_all(futures).await
    }

    /// `get_required`: like `get`, but a missing name is a
    /// `not-found` error rather than `None`.
    pub fn require(&self, name: &str) -> Result<Arc<dyn Provider>, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::not_found(format!("no provider registered under '{name}'")))
    }

    /// Remove a provider by name, dropping it from both the lookup map
    /// and the registration-order vector. Returns the removed provider,
    /// if any.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let removed = self.providers.write().expect("registry providers poisoned").remove(name);
        if removed.is_some() {
            let mut order = self.order.write().expect("registry order poisoned");
            order.retain(|n| n != name);
        }
        removed
    }

    /// Drop every registered provider.
    pub fn clear(&self) {
        self.providers.write().expect("registry providers poisoned").clear();
        self.order.write().expect("registry order poisoned").clear();
    }

    /// Number of registered providers.
    pub fn count(&self) -> usize {
        self.order.read().expect("registry order poisoned").len()
    }

    /// `list`: registered names, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.names_in_registration_order()
    }

    /// `list_providers`: the providers themselves, in
    /// registration order, so a caller can iterate without re-locking
    /// per name.
    pub fn list_providers(&self) -> Vec<Arc<dyn Provider>> {
        let order = self.order.read().expect("registry order poisoned").clone();
        let providers = self.providers.read().expect("registry providers poisoned");
        order.iter().filter_map(|name| providers.get(name).cloned()).collect()
    }

    /// `find_by_model`: alias for [`provider_for_model`],
    /// returning a `not-found` error instead of `None` when nothing
    /// whitelists `model_id`.
    pub fn find_by_model(&self, model_id: &str) -> Result<Arc<dyn Provider>, EngineError> {
        self.provider_for_model(model_id).ok_or_else(|| {
            EngineError::not_found(format!("no registered provider supports model '{model_id}'"))
        })
    }

    /// `find_available`: health-check every registered
    /// provider concurrently and return only the healthy ones, in
    /// registration order.
    pub async fn find_available(&self, model_id: &str) -> Vec<Arc<dyn Provider>> {
        let results = self.health_sweep(model_id).await;
        let healthy_names: std::collections::HashSet<String> =
            results.into_iter().filter(|(_, status)| status.healthy).map(|(name, _)| name).collect();
        self.list_providers()
            .into_iter()
            .filter(|p| healthy_names.contains(&p.info().name))
            .collect()
    }

    /// Partition registered providers by `ProviderInfo.is_local`.
    pub fn get_local_providers(&self) -> Vec<Arc<dyn Provider>> {
        self.list_providers().into_iter().filter(|p| p.info().is_local).collect()
    }

    pub fn get_cloud_providers(&self) -> Vec<Arc<dyn Provider>> {
        self.list_providers().into_iter().filter(|p| !p.info().is_local).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;

    #[test]
    fn registration_order_is_preserved_independent_of_hashmap() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("c"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("a"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("b"))).unwrap();
        assert_eq!(
            registry.names_in_registration_order(),
            vec!["c".to_string(), "a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn re_registering_keeps_original_slot() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("a"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("b"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("a"))).unwrap();
        assert_eq!(
            registry.names_in_registration_order(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn provider_for_model_returns_first_match_in_order() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("first").with_models(vec!["m1".into()]))).unwrap();
        registry.register(Arc::new(FakeProvider::new("second").with_models(vec!["m1".into()]))).unwrap();
        let found = registry.provider_for_model("m1").expect("should find a provider");
        assert_eq!(found.info().name, "first");
    }

    #[test]
    fn unknown_model_returns_none() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("a").with_models(vec!["m1".into()]))).unwrap();
        assert!(registry.provider_for_model("unknown").is_none());
    }

    #[tokio::test]
    async fn health_sweep_covers_every_registered_provider() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("a"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("b"))).unwrap();
        let results = registry.health_sweep("any-model").await;
        let names: Vec<_> = results.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn require_fails_for_unregistered_name() {
        let registry = ProviderRegistry::new();
        let err = registry.require("missing").unwrap_err();
        assert_eq!(err.kind, skillrunner_common::ErrorKind::NotFound);
    }

    #[test]
    fn remove_drops_from_both_lookup_and_order() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("a"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("b"))).unwrap();
        let removed = registry.remove("a");
        assert!(removed.is_some());
        assert!(registry.get("a").is_none());
        assert_eq!(registry.list(), vec!["b".to_string()]);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn clear_empties_the_registry() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("a"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("b"))).unwrap();
        registry.clear();
        assert_eq!(registry.count(), 0);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn find_by_model_is_not_found_rather_than_none() {
        let registry = ProviderRegistry::new();
        let err = registry.find_by_model("missing-model").unwrap_err();
        assert_eq!(err.kind, skillrunner_common::ErrorKind::NotFound);
    }

    #[test]
    fn local_and_cloud_providers_partition_by_is_local() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("cloud-a"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("local-a").local())).unwrap();
        assert_eq!(registry.get_cloud_providers().len(), 1);
        assert_eq!(registry.get_local_providers().len(), 1);
        assert_eq!(registry.get_local_providers()[0].info().name, "local-a");
    }

    #[tokio::test]
    async fn find_available_filters_out_unhealthy_providers() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider::new("healthy"))).unwrap();
        registry.register(Arc::new(FakeProvider::new("unhealthy").unhealthy())).unwrap();
        let available = registry.find_available("any-model").await;
        let names: Vec<_> = available.iter().map(|p| p.info().name.clone()).collect();
        assert_eq!(names, vec!["healthy".to_string()]);
    }

    #[test]
    fn register_rejects_empty_name() {
        let registry = ProviderRegistry::new();
        let err = registry.register(Arc::new(FakeProvider::new(""))).unwrap_err();
        assert_eq!(err.kind, skillrunner_common::ErrorKind::Validation);
        assert_eq!(registry.count(), 0);
    }
}
