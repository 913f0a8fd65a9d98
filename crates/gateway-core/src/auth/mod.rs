//! Tenant authentication: validates `X-API-Key` against the hashed tenant
//! store, with a 5-second cache in front of the store scan.

use crate::cache::CacheClient;
use crate::models::TenantView;
use crate::store::RouteTenantStore;
use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use log::{debug, warn};
use std::sync::Arc;

const TENANT_CACHE_TTL_SECS: u64 = 5;

fn tenant_cache_key(api_key: &str) -> String {
    format!("tenant:apikey:{api_key}")
}

/// Result of an api-key lookup, richer than the abstract `Tenant | null`
/// contract so the pipeline host can apply its documented exception: a
/// cached-but-inactive tenant maps to 403, everything else that isn't a
/// live active tenant maps to 401. The authenticator itself never reveals
/// which case produced a denial to anything outside this distinction.
pub enum AuthOutcome {
    Active(TenantView),
    CachedInactive,
    Denied,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

pub struct TenantAuthenticator {
    cache: Arc<dyn CacheClient>,
    store: Arc<dyn RouteTenantStore>,
    hasher: Argon2<'static>,
}

impl TenantAuthenticator {
    pub fn new(cache: Arc<dyn CacheClient>, store: Arc<dyn RouteTenantStore>) -> Self {
        Self {
            cache,
            store,
            hasher: Argon2::default(),
        }
    }

    pub async fn validate_api_key(&self, api_key: &str) -> Result<AuthOutcome, AuthError> {
        let cache_key = tenant_cache_key(api_key);

        match self.cache.get(&cache_key).await {
            Ok(Some(raw)) => {
                return Ok(match serde_json::from_str::<TenantView>(&raw) {
                    Ok(view) if view.is_active => {
                        debug!("tenant cache hit for key, active");
                        AuthOutcome::Active(view)
                    }
                    Ok(_) => {
                        debug!("tenant cache hit for key, inactive");
                        AuthOutcome::CachedInactive
                    }
                    Err(_) => AuthOutcome::Denied,
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!("tenant cache read failed, falling back to store: {e}");
            }
        }

        let tenants = self.store.find_active_tenants().await?;
        for tenant in tenants {
            let matches = PasswordHash::new(&tenant.api_key_hash)
                .ok()
                .map(|parsed| {
                    self.hasher
                        .verify_password(api_key.as_bytes(), &parsed)
                        .is_ok()
                })
                .unwrap_or(false);

            if matches {
                let view = TenantView::from(&tenant);
                if let Ok(serialized) = serde_json::to_string(&view) {
                    if let Err(e) = self
                        .cache
                        .setex(&cache_key, TENANT_CACHE_TTL_SECS, &serialized)
                        .await
                    {
                        warn!("failed to write tenant cache entry: {e}");
                    }
                }
                return Ok(AuthOutcome::Active(view));
            }
        }

        Ok(AuthOutcome::Denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_cache::InMemoryCache;
    use crate::models::Tenant;
    use crate::store::InMemoryStore;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn tenant(id: &str, active: bool, api_key: &str) -> Tenant {
        Tenant {
            id: id.into(),
            name: format!("tenant-{id}"),
            is_active: active,
            rate_limit: None,
            api_key_hash: hash(api_key),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn unknown_key_is_denied() {
        let cache = Arc::new(InMemoryCache::new());
        let store = Arc::new(InMemoryStore::new(vec![tenant("t1", true, "secret")], vec![]));
        let auth = TenantAuthenticator::new(cache, store);

        assert!(matches!(
            auth.validate_api_key("wrong").await.unwrap(),
            AuthOutcome::Denied
        ));
    }

    #[tokio::test]
    async fn valid_key_is_active_and_then_cached() {
        let cache = Arc::new(InMemoryCache::new());
        let store = Arc::new(InMemoryStore::new(vec![tenant("t1", true, "secret")], vec![]));
        let auth = TenantAuthenticator::new(cache.clone(), store);

        match auth.validate_api_key("secret").await.unwrap() {
            AuthOutcome::Active(view) => assert_eq!(view.id, "t1"),
            _ => panic!("expected active tenant"),
        }

        // Second lookup should be served from cache (no store needed at all).
        let cached = cache.get(&tenant_cache_key("secret")).await.unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn inactive_tenant_never_matches_store_scan() {
        let cache = Arc::new(InMemoryCache::new());
        let store = Arc::new(InMemoryStore::new(vec![tenant("t1", false, "secret")], vec![]));
        let auth = TenantAuthenticator::new(cache, store);

        assert!(matches!(
            auth.validate_api_key("secret").await.unwrap(),
            AuthOutcome::Denied
        ));
    }

    #[tokio::test]
    async fn cached_inactive_entry_is_distinguished() {
        let cache = Arc::new(InMemoryCache::new());
        let view = TenantView {
            id: "t1".into(),
            name: "tenant-t1".into(),
            is_active: false,
            rate_limit: None,
        };
        cache
            .setex(
                &tenant_cache_key("secret"),
                5,
                &serde_json::to_string(&view).unwrap(),
            )
            .await
            .unwrap();
        let store = Arc::new(InMemoryStore::new(vec![], vec![]));
        let auth = TenantAuthenticator::new(cache, store);

        assert!(matches!(
            auth.validate_api_key("secret").await.unwrap(),
            AuthOutcome::CachedInactive
        ));
    }
}
