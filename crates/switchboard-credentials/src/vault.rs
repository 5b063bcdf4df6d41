use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, warn};

use switchboard_core::config::VaultConfig;
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::SecretVault;
use switchboard_core::types::SecretRef;

/// Secret vault reached through PostgREST-style RPC functions
/// (`vault_create_secret`, `vault_get_secret`, ...).
pub struct RpcVault {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RpcVault {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        if config.url.trim().is_empty() || config.api_key.trim().is_empty() {
            return Err(SwitchboardError::Config(
                "vault url and api_key must be configured".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Switchboard/0.3")
            .build()
            .map_err(|e| SwitchboardError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn rpc(&self, function: &str, params: Value) -> Result<Value> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        debug!(function, "Vault RPC");

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&params)
            .send()
            .await
            .map_err(|e| SwitchboardError::Vault(format!("Vault RPC {} failed: {}", function, e)))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SwitchboardError::VaultAuth(format!(
                "Vault RPC {} failed: HTTP {}",
                function,
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let message = rpc_error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
            let full = format!("Vault RPC {} failed: {}", function, message);
            return Err(if is_auth_flavoured(&full) {
                SwitchboardError::VaultAuth(full)
            } else {
                SwitchboardError::Vault(full)
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            SwitchboardError::Vault(format!("Vault RPC {} returned invalid JSON: {}", function, e))
        })
    }
}

/// `message; code=..; details; hint=..` from a PostgREST error body.
fn rpc_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    let mut parts = vec![payload
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("PostgREST error")
        .to_string()];
    if let Some(code) = payload.get("code").and_then(|v| v.as_str()) {
        parts.push(format!("code={}", code));
    }
    if let Some(details) = payload.get("details").and_then(|v| v.as_str()) {
        parts.push(details.to_string());
    }
    if let Some(hint) = payload.get("hint").and_then(|v| v.as_str()) {
        parts.push(format!("hint={}", hint));
    }
    Some(parts.join("; "))
}

fn is_auth_flavoured(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["permission", "auth", "unauthor", "apikey"]
        .iter()
        .any(|token| lower.contains(token))
}

/// Pull a string out of an RPC result: a bare string, the expected key of an
/// object, the only value of a single-key object, or the first match in a list.
pub(crate) fn extract_string(data: &Value, expected_key: &str) -> Option<String> {
    match data {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get(expected_key) {
                return Some(s.clone());
            }
            if map.len() == 1 {
                return map.values().next().and_then(|v| extract_string(v, expected_key));
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .filter_map(|item| extract_string(item, expected_key))
            .find(|s| !s.is_empty()),
        _ => None,
    }
}

impl SecretVault for RpcVault {
    fn create_secret(
        &self,
        name: &str,
        value: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<SecretRef>> {
        let mut params = json!({ "secret": value, "name": name });
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            params["description"] = json!(description);
        }
        Box::pin(async move {
            let data = self.rpc("vault_create_secret", params).await?;
            let id = extract_string(&data, "vault_create_secret")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| SwitchboardError::Vault("Vault did not return a secret id".into()))?;
            Ok(SecretRef { id, at: Utc::now() })
        })
    }

    fn get_secret(&self, secret_id: &str) -> BoxFuture<'_, Result<String>> {
        let params = json!({ "secret_id": secret_id });
        Box::pin(async move {
            let data = self.rpc("vault_get_secret", params).await?;
            extract_string(&data, "vault_get_secret")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    SwitchboardError::Vault("Vault did not return a valid secret value".into())
                })
        })
    }

    fn update_secret(
        &self,
        secret_id: &str,
        value: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<SecretRef>> {
        let id = secret_id.to_string();
        let mut params = json!({ "secret_id": secret_id, "secret": value });
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            params["description"] = json!(description);
        }
        Box::pin(async move {
            self.rpc("vault_update_secret", params).await?;
            Ok(SecretRef { id, at: Utc::now() })
        })
    }

    fn delete_secret(&self, secret_id: &str) -> BoxFuture<'_, Result<()>> {
        let params = json!({ "secret_id": secret_id });
        Box::pin(async move {
            match self.rpc("vault_delete_secret", params).await {
                Ok(_) => Ok(()),
                Err(e @ SwitchboardError::VaultAuth(_)) => Err(e),
                Err(e) => {
                    warn!(error = %e, "Vault delete failed");
                    Ok(())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vault_for(server: &MockServer) -> RpcVault {
        RpcVault::new(&VaultConfig {
            url: server.uri(),
            api_key: "service-key".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_extract_string_shapes() {
        assert_eq!(extract_string(&json!("abc"), "k").as_deref(), Some("abc"));
        assert_eq!(extract_string(&json!({"k": "v", "x": 1}), "k").as_deref(), Some("v"));
        assert_eq!(extract_string(&json!({"other": "v"}), "k").as_deref(), Some("v"));
        assert_eq!(extract_string(&json!([{"k": "first"}, {"k": "second"}]), "k").as_deref(), Some("first"));
        assert_eq!(extract_string(&json!({"a": "1", "b": "2"}), "k"), None);
        assert_eq!(extract_string(&json!(42), "k"), None);
    }

    #[test]
    fn test_requires_configuration() {
        let err = RpcVault::new(&VaultConfig::default()).err().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_create_and_get_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/vault_create_secret"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(body_partial_json(json!({"name": "gmail-access-org-1", "secret": "tok"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("secret-uuid")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/vault_get_secret"))
            .and(body_partial_json(json!({"secret_id": "secret-uuid"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"vault_get_secret": "tok"}])),
            )
            .mount(&server)
            .await;

        let vault = vault_for(&server);
        let created = vault
            .create_secret("gmail-access-org-1", "tok", Some("Gmail access token"))
            .await
            .unwrap();
        assert_eq!(created.id, "secret-uuid");
        assert_eq!(vault.get_secret("secret-uuid").await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_get_secret_rejects_empty_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/vault_get_secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
            .mount(&server)
            .await;

        let err = vault_for(&server).get_secret("missing").await.unwrap_err();
        assert!(matches!(err, SwitchboardError::Vault(_)));
    }

    #[tokio::test]
    async fn test_delete_swallows_non_auth_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/vault_delete_secret"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "secret not found"})),
            )
            .mount(&server)
            .await;

        vault_for(&server).delete_secret("gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_propagates_auth_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/vault_delete_secret"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = vault_for(&server).delete_secret("s").await.unwrap_err();
        assert!(matches!(err, SwitchboardError::VaultAuth(_)));
    }

    #[tokio::test]
    async fn test_permission_message_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/vault_delete_secret"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"message": "permission denied for function", "code": "42501"}),
            ))
            .mount(&server)
            .await;

        let err = vault_for(&server).delete_secret("s").await.unwrap_err();
        assert!(err.to_string().contains("code=42501"));
        assert!(err.is_fatal());
    }
}
