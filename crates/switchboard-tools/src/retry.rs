use futures::future::BoxFuture;
use tracing::warn;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_credentials::CredentialResolver;

/// Run `call` with a valid access token. When the provider answers with an
/// authorization failure, refresh once and retry; a second failure surfaces.
pub async fn with_auth_retry<'a, T, F>(
    credentials: &'a CredentialResolver,
    organization_id: &'a str,
    provider: &'a str,
    call: F,
) -> Result<T>
where
    F: Fn(String) -> BoxFuture<'a, Result<T>>,
{
    let token = credentials.resolve_access_token(organization_id, provider).await?;
    match call(token.clone()).await {
        Err(SwitchboardError::Unauthorized { status, .. }) => {
            warn!(provider, organization_id, status, "Access token rejected, refreshing");
            let refreshed = credentials
                .force_refresh(organization_id, provider, &token)
                .await?;
            call(refreshed).await
        }
        other => other,
    }
}
