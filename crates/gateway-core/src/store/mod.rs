//! Read-only route/tenant store protocol.
//!
//! The core never writes to this store; administrative CRUD is an external
//! collaborator. What ships here is the trait and an in-memory reference
//! adapter suitable for tests and for running the gateway against a static
//! configuration snapshot. A database-backed adapter reading `DATABASE_URL`
//! is out of scope for this core.

use crate::models::{Route, Tenant};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

pub trait RouteTenantStore: Send + Sync {
    fn find_active_tenants(&self) -> BoxFuture<'_, Result<Vec<Tenant>, StoreError>>;

    fn find_active_routes_by_tenant_id(
        &self,
        tenant_id: &str,
    ) -> BoxFuture<'_, Result<Vec<Route>, StoreError>>;
}

/// `Vec`-backed reference store, seeded once at startup.
#[derive(Default)]
pub struct InMemoryStore {
    tenants: RwLock<Vec<Tenant>>,
    routes_by_tenant: RwLock<HashMap<String, Vec<Route>>>,
}

impl InMemoryStore {
    pub fn new(tenants: Vec<Tenant>, routes: Vec<Route>) -> Self {
        let mut routes_by_tenant: HashMap<String, Vec<Route>> = HashMap::new();
        for route in routes {
            routes_by_tenant
                .entry(route.tenant_id.clone())
                .or_default()
                .push(route);
        }
        Self {
            tenants: RwLock::new(tenants),
            routes_by_tenant: RwLock::new(routes_by_tenant),
        }
    }
}

impl RouteTenantStore for InMemoryStore {
    fn find_active_tenants(&self) -> BoxFuture<'_, Result<Vec<Tenant>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .tenants
                .read()
                .unwrap()
                .iter()
                .filter(|t| t.is_active)
                .cloned()
                .collect())
        })
    }

    fn find_active_routes_by_tenant_id(
        &self,
        tenant_id: &str,
    ) -> BoxFuture<'_, Result<Vec<Route>, StoreError>> {
        let tenant_id = tenant_id.to_string();
        Box::pin(async move {
            Ok(self
                .routes_by_tenant
                .read()
                .unwrap()
                .get(&tenant_id)
                .map(|routes| routes.iter().filter(|r| r.is_active).cloned().collect())
                .unwrap_or_default())
        })
    }
}
