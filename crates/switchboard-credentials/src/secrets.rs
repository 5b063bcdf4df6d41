use tracing::warn;
use uuid::Uuid;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::SecretVault;
use switchboard_core::types::SecretRef;

use crate::provider_label;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Access,
    Refresh,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Vault name for a new secret: `<provider-slug>-<kind>-<org>-<uuid>`.
pub fn secret_name(provider: &str, kind: SecretKind, organization_id: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        provider.replace('.', "-"),
        kind.as_str(),
        organization_id,
        Uuid::new_v4()
    )
}

/// Write a token to the vault, updating the existing secret when there is one.
///
/// Authorization failures propagate unchanged; other vault failures become a
/// tool failure naming the provider.
pub async fn persist_secret(
    vault: &dyn SecretVault,
    organization_id: &str,
    provider: &str,
    kind: SecretKind,
    value: &str,
    existing_secret_id: Option<&str>,
) -> Result<SecretRef> {
    let label = provider_label(provider);
    if value.is_empty() {
        return Err(SwitchboardError::ToolFailed(format!(
            "Missing {} {} value",
            label,
            kind.as_str()
        )));
    }
    let description = format!("{} {} token for org {}", label, kind.as_str(), organization_id);

    match existing_secret_id.filter(|id| !id.is_empty()) {
        Some(secret_id) => vault
            .update_secret(secret_id, value, Some(&description))
            .await
            .map_err(|e| vault_failure(e, &label, kind, "update")),
        None => {
            let name = secret_name(provider, kind, organization_id);
            vault
                .create_secret(&name, value, Some(&description))
                .await
                .map_err(|e| vault_failure(e, &label, kind, "persist"))
        }
    }
}

fn vault_failure(e: SwitchboardError, label: &str, kind: SecretKind, verb: &str) -> SwitchboardError {
    if matches!(e, SwitchboardError::VaultAuth(_)) {
        return e;
    }
    warn!(provider = %label, kind = kind.as_str(), error = %e, "Failed to {} token secret", verb);
    SwitchboardError::ToolFailed(format!("Unable to {} {} credentials.", verb, label))
}
