use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use switchboard_core::config::{AirtableConfig, GmailConfig};
use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::TokenRefresher;
use switchboard_core::types::TokenGrant;

use crate::provider_label;

/// How the OAuth client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// HTTP Basic with client id and secret; the client id is also sent in the body.
    Basic,
    /// Client id and secret sent as form fields.
    Body,
}

/// Refresh-token grant against a provider's OAuth token endpoint.
pub struct OAuthRefresher {
    provider: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    auth: ClientAuth,
    client: reqwest::Client,
}

impl OAuthRefresher {
    pub fn new(
        provider: &str,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        auth: ClientAuth,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SwitchboardError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            provider: provider.to_string(),
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth,
            client,
        })
    }

    pub fn airtable(config: &AirtableConfig, timeout_secs: u64) -> Result<Self> {
        Self::new(
            "airtable",
            &config.token_url,
            &config.client_id,
            &config.client_secret,
            ClientAuth::Basic,
            timeout_secs,
        )
    }

    pub fn gmail(config: &GmailConfig, timeout_secs: u64) -> Result<Self> {
        Self::new(
            "gmail",
            &config.token_url,
            &config.client_id,
            &config.client_secret,
            ClientAuth::Body,
            timeout_secs,
        )
    }
}

impl TokenRefresher for OAuthRefresher {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn refresh(&self, refresh_token: &str) -> BoxFuture<'_, Result<TokenGrant>> {
        let refresh_token = refresh_token.to_string();
        Box::pin(async move {
            let label = provider_label(&self.provider);
            if self.client_id.is_empty() || self.client_secret.is_empty() {
                return Err(SwitchboardError::Config(format!(
                    "{} OAuth client configuration is missing",
                    label
                )));
            }

            let mut form = vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ];
            let mut request = self.client.post(&self.token_url);
            match self.auth {
                ClientAuth::Basic => {
                    request = request.basic_auth(&self.client_id, Some(&self.client_secret));
                }
                ClientAuth::Body => form.push(("client_secret", self.client_secret.as_str())),
            }

            debug!(provider = %self.provider, "Refreshing access token");
            let resp = request
                .form(&form)
                .send()
                .await
                .map_err(|e| SwitchboardError::Http(format!("{} token refresh failed: {}", label, e)))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(SwitchboardError::Integration {
                    provider: label.clone(),
                    status: Some(status.as_u16()),
                    message: format!(
                        "Failed to refresh {} token (status {}): {}",
                        label,
                        status.as_u16(),
                        text
                    ),
                });
            }

            resp.json::<TokenGrant>().await.map_err(|e| SwitchboardError::Integration {
                provider: label.clone(),
                status: None,
                message: format!("Invalid token response: {}", e),
            })
        })
    }
}
