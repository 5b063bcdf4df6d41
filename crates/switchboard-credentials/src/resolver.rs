//! Access-token resolution with expiry-driven refresh.
//!
//! Every refresh for one `(organization, provider)` pair runs under a shared
//! async mutex, and the connection record is re-read once the lock is held, so
//! concurrent callers that all saw a stale token end up with a single call to
//! the provider's token endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::records::{ConnectionRecord, ConnectionUpdate, Patch};
use switchboard_core::traits::{ConnectionStore, SecretVault, TokenRefresher};

use crate::provider_label;
use crate::secrets::{persist_secret, SecretKind};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

pub struct CredentialResolver {
    vault: Arc<dyn SecretVault>,
    connections: Arc<dyn ConnectionStore>,
    refreshers: HashMap<String, Arc<dyn TokenRefresher>>,
    refresh_margin: TimeDelta,
    locks: Mutex<HashMap<(String, String), KeyLock>>,
}

impl CredentialResolver {
    pub fn new(
        vault: Arc<dyn SecretVault>,
        connections: Arc<dyn ConnectionStore>,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            vault,
            connections,
            refreshers: HashMap::new(),
            refresh_margin: TimeDelta::try_seconds(refresh_margin_secs.max(0)).unwrap_or(TimeDelta::MAX),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register the token endpoint for the refresher's provider.
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refreshers.insert(refresher.provider().to_string(), refresher);
        self
    }

    /// The stored connection, or a "not connected" error naming the provider.
    pub async fn connection(&self, organization_id: &str, provider: &str) -> Result<ConnectionRecord> {
        self.connections
            .get_connection(organization_id, provider)
            .await?
            .ok_or_else(|| SwitchboardError::NotConnected {
                provider: provider_label(provider),
            })
    }

    /// A currently valid access token, refreshing first when the stored one is
    /// missing or expires within the safety margin.
    pub async fn resolve_access_token(&self, organization_id: &str, provider: &str) -> Result<String> {
        let lock = self.key_lock(organization_id, provider);
        let _guard = lock.lock().await;

        let record = self.connection(organization_id, provider).await?;
        let access_token = self
            .load_secret(record.access_token_secret_id.as_deref(), provider)
            .await?;

        let expiring = record
            .expires_at
            .is_some_and(|at| {
                Utc::now()
                    .checked_add_signed(self.refresh_margin)
                    .map_or(true, |limit| at <= limit)
            });

        match access_token {
            Some(token) if !expiring => Ok(token),
            _ => {
                let refresh_token = self
                    .load_secret(record.refresh_token_secret_id.as_deref(), provider)
                    .await?
                    .ok_or_else(|| {
                        SwitchboardError::MissingCredential(format!(
                            "{} refresh token is missing; reconnect the integration.",
                            provider_label(provider)
                        ))
                    })?;
                debug!(provider, organization_id, "Access token missing or expiring");
                self.refresh_with(&record, &refresh_token).await
            }
        }
    }

    /// Refresh after the provider rejected `rejected_token`. If another caller
    /// already replaced that token, the replacement is returned instead.
    pub async fn force_refresh(
        &self,
        organization_id: &str,
        provider: &str,
        rejected_token: &str,
    ) -> Result<String> {
        let lock = self.key_lock(organization_id, provider);
        let _guard = lock.lock().await;

        let record = self.connection(organization_id, provider).await?;
        if let Some(current) = self
            .load_secret(record.access_token_secret_id.as_deref(), provider)
            .await?
        {
            if current != rejected_token {
                debug!(provider, organization_id, "Token already refreshed by another call");
                return Ok(current);
            }
        }

        let refresh_token = self
            .load_secret(record.refresh_token_secret_id.as_deref(), provider)
            .await?
            .ok_or_else(|| {
                SwitchboardError::MissingCredential(format!(
                    "{} credentials expired; reconnect the integration.",
                    provider_label(provider)
                ))
            })?;
        self.refresh_with(&record, &refresh_token).await
    }

    /// Best-effort write of the profile identifier onto the connection record.
    pub async fn remember_profile_email(&self, organization_id: &str, provider: &str, email: &str) {
        let update = ConnectionUpdate {
            profile_email: Patch::Set(email.to_string()),
            ..Default::default()
        };
        if let Err(e) = self
            .connections
            .upsert_connection(organization_id, provider, update)
            .await
        {
            warn!(provider, error = %e, "Failed to persist profile email");
        }
    }

    fn key_lock(&self, organization_id: &str, provider: &str) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry((organization_id.to_string(), provider.to_string()))
            .or_default()
            .clone()
    }

    async fn load_secret(&self, secret_id: Option<&str>, provider: &str) -> Result<Option<String>> {
        let Some(secret_id) = secret_id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        match self.vault.get_secret(secret_id).await {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e @ SwitchboardError::VaultAuth(_)) => Err(e),
            Err(e) => {
                warn!(provider, secret_id, error = %e, "Failed to read secret");
                Err(SwitchboardError::ToolFailed(format!(
                    "Unable to load {} credentials.",
                    provider_label(provider)
                )))
            }
        }
    }

    async fn refresh_with(&self, record: &ConnectionRecord, refresh_token: &str) -> Result<String> {
        let provider = record.provider.as_str();
        let org = record.organization_id.as_str();
        let label = provider_label(provider);

        let refresher = self.refreshers.get(provider).ok_or_else(|| {
            SwitchboardError::Config(format!("no token refresher registered for {}", provider))
        })?;

        let grant = refresher.refresh(refresh_token).await.map_err(|e| {
            warn!(provider, error = %e, "Token refresh failed");
            SwitchboardError::ToolFailed(format!("Failed to refresh {} access token.", label))
        })?;
        if grant.access_token.is_empty() {
            return Err(SwitchboardError::ToolFailed(format!(
                "{} did not return an access token.",
                label
            )));
        }

        let expires_at = grant.expires_in.and_then(|secs| {
            let at = expiry_after(secs);
            if at.is_none() {
                warn!(provider, expires_in = secs, "Token expiry out of range; storing none");
            }
            at
        });
        let access = persist_secret(
            self.vault.as_ref(),
            org,
            provider,
            SecretKind::Access,
            &grant.access_token,
            record.access_token_secret_id.as_deref(),
        )
        .await?;

        self.connections
            .upsert_connection(
                org,
                provider,
                ConnectionUpdate {
                    access_token_secret_id: Patch::Set(access.id),
                    access_token_secret_created_at: Patch::Set(access.at),
                    expires_at: match expires_at {
                        Some(at) => Patch::Set(at),
                        None => Patch::Clear,
                    },
                    scope: grant.scope.clone().into(),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(rotated) = grant.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            if rotated != refresh_token {
                self.store_rotated_refresh_token(record, rotated).await;
            }
        }

        info!(provider, organization_id = org, "Access token refreshed");
        Ok(grant.access_token)
    }

    /// The previous refresh token stays usable until revoked, so failures here
    /// are logged and swallowed.
    async fn store_rotated_refresh_token(&self, record: &ConnectionRecord, token: &str) {
        let provider = record.provider.as_str();
        let org = record.organization_id.as_str();
        let stored = match persist_secret(
            self.vault.as_ref(),
            org,
            provider,
            SecretKind::Refresh,
            token,
            record.refresh_token_secret_id.as_deref(),
        )
        .await
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!(provider, error = %e, "Failed to store rotated refresh token; keeping previous token");
                return;
            }
        };

        let update = ConnectionUpdate {
            refresh_token_secret_id: Patch::Set(stored.id),
            refresh_token_secret_created_at: Patch::Set(stored.at),
            ..Default::default()
        };
        if let Err(e) = self.connections.upsert_connection(org, provider, update).await {
            warn!(provider, error = %e, "Failed to record rotated refresh token");
        }
    }
}

/// `secs` from now, or `None` when that instant is not representable.
fn expiry_after(secs: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(secs).and_then(|delta| Utc::now().checked_add_signed(delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::types::TokenGrant;
    use switchboard_test_utils::{connection, MemoryConnections, MemoryVault, StaticRefresher, ORG_ID};

    struct Harness {
        vault: Arc<MemoryVault>,
        connections: Arc<MemoryConnections>,
        refresher: Arc<StaticRefresher>,
        resolver: Arc<CredentialResolver>,
    }

    fn harness(refresher: StaticRefresher) -> Harness {
        let vault = Arc::new(MemoryVault::new());
        let connections = Arc::new(MemoryConnections::new());
        let refresher = Arc::new(refresher);
        let resolver = Arc::new(
            CredentialResolver::new(vault.clone(), connections.clone(), 30)
                .with_refresher(refresher.clone()),
        );
        Harness {
            vault,
            connections,
            refresher,
            resolver,
        }
    }

    /// Stored connection with `access`/`refresh` secrets and the given expiry.
    fn seed(h: &Harness, expires_in_secs: i64) -> (String, String) {
        let access = h.vault.insert("access", "at-old");
        let refresh = h.vault.insert("refresh", "rt-old");
        h.connections
            .insert(connection("airtable", Some(&access), Some(&refresh), expires_in_secs));
        (access, refresh)
    }

    #[tokio::test]
    async fn test_refreshes_inside_safety_margin() {
        let h = harness(StaticRefresher::new("airtable", "at-new"));
        let (access, _) = seed(&h, 10);

        let token = h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap();
        assert_eq!(token, "at-new");
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.refresher.seen_refresh_tokens(), vec!["rt-old"]);
        assert_eq!(h.vault.value(&access).as_deref(), Some("at-new"));

        let record = h.connections.record(ORG_ID, "airtable").unwrap();
        assert!(record.expires_at.unwrap() > Utc::now() + TimeDelta::minutes(50));
    }

    #[tokio::test]
    async fn test_returns_cached_token_when_fresh() {
        let h = harness(StaticRefresher::new("airtable", "at-new"));
        seed(&h, 300);

        let token = h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap();
        assert_eq!(token, "at-old");
        assert_eq!(h.refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_connected() {
        let h = harness(StaticRefresher::new("airtable", "x"));
        let err = h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap_err();
        assert_eq!(err.to_string(), "Airtable is not connected for this organization.");
        assert!(err.is_tool_failure());
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let h = harness(StaticRefresher::new("gmail", "x"));
        h.connections.insert(connection("gmail", None, None, 3600));
        let err = h.resolver.resolve_access_token(ORG_ID, "gmail").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Gmail refresh token is missing; reconnect the integration."
        );
    }

    #[tokio::test]
    async fn test_creates_access_secret_when_absent() {
        let h = harness(StaticRefresher::new("airtable", "at-first"));
        let refresh = h.vault.insert("refresh", "rt");
        h.connections.insert(connection("airtable", None, Some(&refresh), 3600));

        let token = h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap();
        assert_eq!(token, "at-first");
        let record = h.connections.record(ORG_ID, "airtable").unwrap();
        let access_id = record.access_token_secret_id.unwrap();
        assert_eq!(h.vault.value(&access_id).as_deref(), Some("at-first"));
        assert!(record.access_token_secret_created_at.is_some());
        assert!(h
            .vault
            .names()
            .iter()
            .any(|n| n.starts_with(&format!("airtable-access-{}-", ORG_ID))));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_persisted() {
        let h = harness(StaticRefresher::new("airtable", "unused"));
        h.refresher.push(Ok(TokenGrant {
            access_token: "at-new".into(),
            expires_in: Some(3600),
            scope: Some("data.records:read".into()),
            refresh_token: Some("rt-rotated".into()),
        }));
        let (_, refresh) = seed(&h, 0);

        h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap();
        assert_eq!(h.vault.value(&refresh).as_deref(), Some("rt-rotated"));
        let record = h.connections.record(ORG_ID, "airtable").unwrap();
        assert_eq!(record.scope.as_deref(), Some("data.records:read"));
        assert!(record.refresh_token_secret_created_at.is_some());
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_failure_tolerated() {
        let h = harness(StaticRefresher::new("airtable", "unused"));
        h.refresher.push(Ok(TokenGrant {
            access_token: "at-new".into(),
            expires_in: Some(3600),
            scope: None,
            refresh_token: Some("rt-rotated".into()),
        }));
        let (_, refresh) = seed(&h, 0);
        h.vault.fail_updates_of(&refresh);

        let token = h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap();
        assert_eq!(token, "at-new");
        assert_eq!(h.vault.value(&refresh).as_deref(), Some("rt-old"));
    }

    #[tokio::test]
    async fn test_unrepresentable_expiry_is_cleared() {
        let h = harness(StaticRefresher::new("airtable", "unused"));
        h.refresher.push(Ok(TokenGrant {
            access_token: "at-new".into(),
            expires_in: Some(i64::MAX),
            scope: None,
            refresh_token: None,
        }));
        seed(&h, 0);

        let token = h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap();
        assert_eq!(token, "at-new");
        let record = h.connections.record(ORG_ID, "airtable").unwrap();
        assert!(record.expires_at.is_none());

        assert!(expiry_after(i64::MIN).is_none());
        assert!(expiry_after(60).is_some());
    }

    #[tokio::test]
    async fn test_oversized_margin_always_refreshes() {
        let vault = Arc::new(MemoryVault::new());
        let connections = Arc::new(MemoryConnections::new());
        let refresher = Arc::new(StaticRefresher::new("airtable", "at-new"));
        let resolver = CredentialResolver::new(vault.clone(), connections.clone(), i64::MAX)
            .with_refresher(refresher.clone());
        let access = vault.insert("access", "at-old");
        let refresh = vault.insert("refresh", "rt-old");
        connections.insert(connection("airtable", Some(&access), Some(&refresh), 3600));

        let token = resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap();
        assert_eq!(token, "at-new");
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_endpoint_failure() {
        let h = harness(StaticRefresher::new("airtable", "unused"));
        h.refresher.push(Err(SwitchboardError::Http("connection reset".into())));
        seed(&h, 0);

        let err = h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to refresh Airtable access token.");
    }

    #[tokio::test]
    async fn test_empty_access_token_in_grant() {
        let h = harness(StaticRefresher::new("airtable", "unused"));
        h.refresher.push(Ok(TokenGrant::default()));
        seed(&h, 0);

        let err = h.resolver.resolve_access_token(ORG_ID, "airtable").await.unwrap_err();
        assert_eq!(err.to_string(), "Airtable did not return an access token.");
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_refresh() {
        let h = harness(
            StaticRefresher::new("airtable", "at-new").with_delay(std::time::Duration::from_millis(50)),
        );
        seed(&h, 5);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let resolver = h.resolver.clone();
                tokio::spawn(async move { resolver.resolve_access_token(ORG_ID, "airtable").await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "at-new");
        }
        assert_eq!(h.refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_skips_when_already_replaced() {
        let h = harness(StaticRefresher::new("airtable", "at-new"));
        seed(&h, 3600);

        let first = h.resolver.force_refresh(ORG_ID, "airtable", "at-old").await.unwrap();
        assert_eq!(first, "at-new");
        let second = h.resolver.force_refresh(ORG_ID, "airtable", "at-old").await.unwrap();
        assert_eq!(second, "at-new");
        assert_eq!(h.refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_without_refresh_token() {
        let h = harness(StaticRefresher::new("gmail", "x"));
        let access = h.vault.insert("access", "at");
        h.connections.insert(connection("gmail", Some(&access), None, 3600));

        let err = h.resolver.force_refresh(ORG_ID, "gmail", "at").await.unwrap_err();
        assert_eq!(err.to_string(), "Gmail credentials expired; reconnect the integration.");
    }
}
