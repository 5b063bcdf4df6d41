use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::records::{ConnectionRecord, ConnectionUpdate};
use switchboard_core::traits::{ConnectionStore, SecretVault, TokenRefresher};
use switchboard_core::types::{SecretRef, TokenGrant};

/// Vault backed by a map, with per-secret failure injection.
#[derive(Default)]
pub struct MemoryVault {
    secrets: Mutex<HashMap<String, (String, String)>>,
    failing_updates: Mutex<HashSet<String>>,
    failing_creates: Mutex<bool>,
    deleted: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret and return its id.
    pub fn insert(&self, name: &str, value: &str) -> String {
        let id = format!("secret-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.secrets
            .lock()
            .unwrap()
            .insert(id.clone(), (name.to_string(), value.to_string()));
        id
    }

    pub fn value(&self, secret_id: &str) -> Option<String> {
        self.secrets
            .lock()
            .unwrap()
            .get(secret_id)
            .map(|(_, v)| v.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.secrets
            .lock()
            .unwrap()
            .values()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.secrets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every update of `secret_id` fail.
    pub fn fail_updates_of(&self, secret_id: &str) {
        self.failing_updates
            .lock()
            .unwrap()
            .insert(secret_id.to_string());
    }

    pub fn fail_creates(&self) {
        *self.failing_creates.lock().unwrap() = true;
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl SecretVault for MemoryVault {
    fn create_secret(
        &self,
        name: &str,
        value: &str,
        _description: Option<&str>,
    ) -> BoxFuture<'_, Result<SecretRef>> {
        let name = name.to_string();
        let value = value.to_string();
        Box::pin(async move {
            if *self.failing_creates.lock().unwrap() {
                return Err(SwitchboardError::Vault("create rejected".into()));
            }
            let id = self.insert(&name, &value);
            Ok(SecretRef { id, at: Utc::now() })
        })
    }

    fn get_secret(&self, secret_id: &str) -> BoxFuture<'_, Result<String>> {
        let secret_id = secret_id.to_string();
        Box::pin(async move {
            self.value(&secret_id)
                .ok_or_else(|| SwitchboardError::Vault(format!("secret {} not found", secret_id)))
        })
    }

    fn update_secret(
        &self,
        secret_id: &str,
        value: &str,
        _description: Option<&str>,
    ) -> BoxFuture<'_, Result<SecretRef>> {
        let secret_id = secret_id.to_string();
        let value = value.to_string();
        Box::pin(async move {
            if self.failing_updates.lock().unwrap().contains(&secret_id) {
                return Err(SwitchboardError::Vault(format!("update of {} rejected", secret_id)));
            }
            let mut secrets = self.secrets.lock().unwrap();
            let entry = secrets
                .get_mut(&secret_id)
                .ok_or_else(|| SwitchboardError::Vault(format!("secret {} not found", secret_id)))?;
            entry.1 = value;
            Ok(SecretRef {
                id: secret_id.clone(),
                at: Utc::now(),
            })
        })
    }

    fn delete_secret(&self, secret_id: &str) -> BoxFuture<'_, Result<()>> {
        let secret_id = secret_id.to_string();
        Box::pin(async move {
            self.secrets.lock().unwrap().remove(&secret_id);
            self.deleted.lock().unwrap().push(secret_id);
            Ok(())
        })
    }
}

/// Connection records in a map keyed by `(organization, provider)`.
#[derive(Default)]
pub struct MemoryConnections {
    records: Mutex<HashMap<(String, String), ConnectionRecord>>,
    upserts: AtomicUsize,
}

impl MemoryConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ConnectionRecord) {
        self.records.lock().unwrap().insert(
            (record.organization_id.clone(), record.provider.clone()),
            record,
        );
    }

    pub fn record(&self, organization_id: &str, provider: &str) -> Option<ConnectionRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(organization_id.to_string(), provider.to_string()))
            .cloned()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

impl ConnectionStore for MemoryConnections {
    fn get_connection(
        &self,
        organization_id: &str,
        provider: &str,
    ) -> BoxFuture<'_, Result<Option<ConnectionRecord>>> {
        let record = self.record(organization_id, provider);
        Box::pin(async move { Ok(record) })
    }

    fn upsert_connection(
        &self,
        organization_id: &str,
        provider: &str,
        update: ConnectionUpdate,
    ) -> BoxFuture<'_, Result<ConnectionRecord>> {
        let key = (organization_id.to_string(), provider.to_string());
        Box::pin(async move {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            let record = records.entry(key.clone()).or_insert_with(|| ConnectionRecord {
                id: uuid::Uuid::new_v4().to_string(),
                organization_id: key.0.clone(),
                provider: key.1.clone(),
                ..Default::default()
            });
            update.apply_to(record);
            Ok(record.clone())
        })
    }
}

/// Token endpoint returning scripted grants.
pub struct StaticRefresher {
    provider: String,
    grants: Mutex<VecDeque<Result<TokenGrant>>>,
    fallback: TokenGrant,
    calls: AtomicUsize,
    seen_refresh_tokens: Mutex<Vec<String>>,
    delay: Duration,
}

impl StaticRefresher {
    /// Always answers with `access_token`, valid for one hour.
    pub fn new(provider: &str, access_token: &str) -> Self {
        Self {
            provider: provider.to_string(),
            grants: Mutex::new(VecDeque::new()),
            fallback: TokenGrant {
                access_token: access_token.to_string(),
                expires_in: Some(3600),
                scope: None,
                refresh_token: None,
            },
            calls: AtomicUsize::new(0),
            seen_refresh_tokens: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Queue a one-off response served before the fallback grant.
    pub fn push(&self, grant: Result<TokenGrant>) {
        self.grants.lock().unwrap().push_back(grant);
    }

    /// Simulate a slow token endpoint.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.seen_refresh_tokens.lock().unwrap().clone()
    }
}

impl TokenRefresher for StaticRefresher {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn refresh(&self, refresh_token: &str) -> BoxFuture<'_, Result<TokenGrant>> {
        let refresh_token = refresh_token.to_string();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_refresh_tokens.lock().unwrap().push(refresh_token);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let queued = self.grants.lock().unwrap().pop_front();
            match queued {
                Some(result) => result,
                None => Ok(self.fallback.clone()),
            }
        })
    }
}
