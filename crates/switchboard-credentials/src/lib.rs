pub mod oauth;
pub mod resolver;
pub mod secrets;
pub mod vault;

pub use oauth::{ClientAuth, OAuthRefresher};
pub use resolver::CredentialResolver;
pub use secrets::{persist_secret, SecretKind};
pub use vault::RpcVault;

/// Human-facing provider name used in error messages, e.g. `airtable` → `Airtable`.
pub fn provider_label(provider: &str) -> String {
    let mut chars = provider.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}
