use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use schoolerp_core::TenantId;

/// Tenant-isolated key/value store for disposable read models.
///
/// Every operation takes the tenant explicitly; one school can never see
/// another school's rows.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }
}

/// In-memory store: one map per tenant.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    tenants: RwLock<HashMap<TenantId, HashMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let tenants = self.tenants.read().ok()?;
        tenants.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut tenants) = self.tenants.write() {
            tenants.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        match self.tenants.read() {
            Ok(tenants) => tenants
                .get(&tenant_id)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default(),
            Err(_) => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_visible_only_to_their_tenant() {
        let store: InMemoryTenantStore<u32, &'static str> = InMemoryTenantStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());

        store.upsert(a, 1, "a-one");
        store.upsert(b, 1, "b-one");
        store.upsert(a, 1, "a-one-v2");

        assert_eq!(store.get(a, &1), Some("a-one-v2"));
        assert_eq!(store.get(b, &1), Some("b-one"));
        assert_eq!(store.list(a), vec!["a-one-v2"]);
        assert!(store.list(TenantId::new()).is_empty());
    }
}
