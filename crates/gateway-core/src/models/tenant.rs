use serde::{Deserialize, Serialize};

/// A tenant record as read from the route/tenant store, `apiKeyHash` included.
///
/// This is the store's view; it is never serialized back to a client. The
/// cached view (see [`TenantView`]) strips the hash before it ever reaches
/// the shared cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub rate_limit: Option<TenantRateLimit>,
    pub api_key_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TenantRateLimit {
    pub requests_per_second: u32,
    pub burst_size: Option<u32>,
}

/// Tenant data safe to cache and to place in request extensions: no `apiKeyHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantView {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub rate_limit: Option<TenantRateLimit>,
}

impl From<&Tenant> for TenantView {
    fn from(t: &Tenant) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            is_active: t.is_active,
            rate_limit: t.rate_limit,
        }
    }
}
