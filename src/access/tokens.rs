use crate::config::TokenConfig;
use crate::error::{Result, VaultError};
use crate::storage::{load_setting, save_setting, SettingsStore};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

// ============================================================================
// Types
// ============================================================================

/// Settings key holding the active token set.
pub const TOKENS_SETTING: &str = "api-vault-tokens";

/// `expiresAt` value for tokens that never expire.
pub const NEVER_EXPIRES: i64 = i64::MAX;

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
}

/// A bearer credential granting read-only external access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    /// Expiry as milliseconds since the Unix epoch, [`NEVER_EXPIRES`] for none.
    pub expires_at: i64,
    pub permissions: BTreeSet<Permission>,
}

impl AccessToken {
    fn new(token: String, expires_at: i64) -> Self {
        Self {
            token,
            expires_at,
            permissions: BTreeSet::from([Permission::Read]),
        }
    }

    pub fn never_expires(&self) -> bool {
        self.expires_at == NEVER_EXPIRES
    }

    /// Whether the token is past its expiry at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        !self.never_expires() && now_ms > self.expires_at
    }

    /// Short, non-reversible identifier safe to print in logs.
    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.token)
    }
}

/// Issuance policy for new tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenPolicy {
    /// Lifetime of new tokens; `None` issues tokens that never expire.
    pub ttl: Option<chrono::Duration>,
    /// Drop every previously issued token when a new one is generated.
    pub revoke_on_generate: bool,
}

impl From<&TokenConfig> for TokenPolicy {
    fn from(config: &TokenConfig) -> Self {
        Self {
            ttl: config
                .ttl_secs
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(chrono::Duration::try_seconds),
            revoke_on_generate: config.revoke_on_generate,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Generates, persists and validates access tokens.
///
/// The active set lives in memory and is written through to the settings
/// store as a whole after every change.
pub struct TokenRegistry {
    settings: Arc<dyn SettingsStore>,
    policy: TokenPolicy,
    tokens: RwLock<BTreeMap<String, AccessToken>>,
}

impl TokenRegistry {
    /// Rebuild the registry from the persisted token set.
    pub async fn load(settings: Arc<dyn SettingsStore>, policy: TokenPolicy) -> Result<Self> {
        let tokens: BTreeMap<String, AccessToken> =
            load_setting(settings.as_ref(), TOKENS_SETTING, BTreeMap::new()).await?;
        debug!("Loaded {} access token(s)", tokens.len());

        Ok(Self {
            settings,
            policy,
            tokens: RwLock::new(tokens),
        })
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Issue a new read-only token according to the registry policy.
    pub async fn generate_token(&self) -> Result<AccessToken> {
        // A lifetime past chrono's range is treated as no expiry.
        let expires_at = self
            .policy
            .ttl
            .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
            .map_or(NEVER_EXPIRES, |t| t.timestamp_millis());
        self.generate_token_expiring_at(expires_at).await
    }

    /// Issue a new read-only token with an explicit expiry (epoch ms).
    pub async fn generate_token_expiring_at(&self, expires_at: i64) -> Result<AccessToken> {
        let token = AccessToken::new(random_token(), expires_at);

        let mut tokens = self.tokens.write().await;
        let mut next = if self.policy.revoke_on_generate {
            BTreeMap::new()
        } else {
            tokens.clone()
        };
        next.insert(token.token.clone(), token.clone());

        self.persist(&next).await?;
        let revoked = tokens.len() + 1 - next.len();
        *tokens = next;

        info!(
            "Generated access token {} ({} previous token(s) revoked)",
            token.fingerprint(),
            revoked
        );
        Ok(token)
    }

    /// Check a presented token against the active set.
    pub async fn validate_token(&self, candidate: &str) -> bool {
        self.validate_token_at(candidate, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// [`validate_token`](Self::validate_token) for `?` callers.
    pub async fn authorize(&self, candidate: &str) -> Result<()> {
        if self.validate_token(candidate).await {
            Ok(())
        } else {
            Err(VaultError::Auth(format!(
                "token {} is unknown or expired",
                token_fingerprint(candidate)
            )))
        }
    }

    /// Check a presented token as of `now_ms`. Expired tokens are purged.
    pub async fn validate_token_at(&self, candidate: &str, now_ms: i64) -> bool {
        if candidate.is_empty() {
            return false;
        }

        let expired = {
            let tokens = self.tokens.read().await;
            match find_token(&tokens, candidate) {
                None => return false,
                Some(token) if !token.is_expired_at(now_ms) => return true,
                Some(token) => token.token.clone(),
            }
        };

        self.purge(&expired).await;
        false
    }

    /// Remove one token. Returns whether it was active.
    pub async fn revoke_token(&self, candidate: &str) -> Result<bool> {
        let mut tokens = self.tokens.write().await;
        let Some(key) = find_token(&tokens, candidate).map(|t| t.token.clone()) else {
            return Ok(false);
        };

        let mut next = tokens.clone();
        next.remove(&key);
        self.persist(&next).await?;
        *tokens = next;

        info!("Revoked access token {}", token_fingerprint(&key));
        Ok(true)
    }

    /// Remove every token. Returns how many were active.
    pub async fn revoke_all(&self) -> Result<usize> {
        let mut tokens = self.tokens.write().await;
        let count = tokens.len();
        self.persist(&BTreeMap::new()).await?;
        tokens.clear();

        info!("Revoked {} access token(s)", count);
        Ok(count)
    }

    /// Snapshot of the active tokens.
    pub async fn list_tokens(&self) -> Vec<AccessToken> {
        self.tokens.read().await.values().cloned().collect()
    }

    async fn purge(&self, key: &str) {
        let mut tokens = self.tokens.write().await;
        if tokens.remove(key).is_none() {
            return;
        }
        info!("Purged expired access token {}", token_fingerprint(key));

        if let Err(e) = self.persist(&tokens).await {
            warn!("Failed to persist token set after purge: {}", e);
        }
    }

    async fn persist(&self, tokens: &BTreeMap<String, AccessToken>) -> Result<()> {
        save_setting(self.settings.as_ref(), TOKENS_SETTING, tokens).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn find_token<'a>(
    tokens: &'a BTreeMap<String, AccessToken>,
    candidate: &str,
) -> Option<&'a AccessToken> {
    tokens.values().find(|t| safe_equal(&t.token, candidate))
}

/// Timing-safe string comparison.
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// First 12 hex chars of the token's SHA-256.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySettingsStore;

    async fn registry(policy: TokenPolicy) -> (TokenRegistry, Arc<MemorySettingsStore>) {
        let settings = Arc::new(MemorySettingsStore::new());
        let registry = TokenRegistry::load(settings.clone(), policy).await.unwrap();
        (registry, settings)
    }

    #[tokio::test]
    async fn generated_token_is_256_bit_hex() {
        let (registry, _) = registry(TokenPolicy::default()).await;
        let token = registry.generate_token().await.unwrap();

        assert_eq!(token.token.len(), 64);
        assert!(token.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(token.never_expires());
        assert_eq!(token.permissions, BTreeSet::from([Permission::Read]));
    }

    #[tokio::test]
    async fn validate_accepts_known_and_rejects_garbage() {
        let (registry, _) = registry(TokenPolicy::default()).await;
        let token = registry.generate_token().await.unwrap();

        assert!(registry.validate_token(&token.token).await);
        assert!(!registry.validate_token("").await);
        assert!(!registry.validate_token("invalid-token").await);
        assert!(!registry.validate_token(&token.token[..63]).await);
    }

    #[tokio::test]
    async fn authorize_maps_rejection_to_auth_error() {
        let (registry, _) = registry(TokenPolicy::default()).await;
        let token = registry.generate_token().await.unwrap();

        assert!(registry.authorize(&token.token).await.is_ok());
        let err = registry.authorize("garbage").await.unwrap_err();
        assert!(matches!(err, VaultError::Auth(_)));
        assert!(!err.to_string().contains("garbage"));
    }

    #[tokio::test]
    async fn new_token_does_not_revoke_previous_by_default() {
        let (registry, _) = registry(TokenPolicy::default()).await;
        let first = registry.generate_token().await.unwrap();
        let second = registry.generate_token().await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(registry.validate_token(&first.token).await);
        assert!(registry.validate_token(&second.token).await);
        assert_eq!(registry.list_tokens().await.len(), 2);
    }

    #[tokio::test]
    async fn revoke_on_generate_policy_drops_previous() {
        let policy = TokenPolicy {
            ttl: None,
            revoke_on_generate: true,
        };
        let (registry, _) = registry(policy).await;
        let first = registry.generate_token().await.unwrap();
        let second = registry.generate_token().await.unwrap();

        assert!(!registry.validate_token(&first.token).await);
        assert!(registry.validate_token(&second.token).await);
    }

    #[tokio::test]
    async fn tokens_survive_reload() {
        let (registry, settings) = registry(TokenPolicy::default()).await;
        let token = registry.generate_token().await.unwrap();
        drop(registry);

        let reloaded = TokenRegistry::load(settings, TokenPolicy::default())
            .await
            .unwrap();
        assert!(reloaded.validate_token(&token.token).await);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_and_purged() {
        let (registry, settings) = registry(TokenPolicy::default()).await;
        let token = registry.generate_token_expiring_at(1_000).await.unwrap();

        assert!(registry.validate_token_at(&token.token, 1_000).await);
        assert!(!registry.validate_token_at(&token.token, 1_001).await);
        assert!(registry.list_tokens().await.is_empty());

        let persisted = settings.get(TOKENS_SETTING).await.unwrap().unwrap();
        assert_eq!(persisted, serde_json::json!({}));
    }

    #[tokio::test]
    async fn ttl_policy_sets_expiry() {
        let policy = TokenPolicy {
            ttl: Some(chrono::Duration::seconds(60)),
            revoke_on_generate: false,
        };
        let (registry, _) = registry(policy).await;
        let token = registry.generate_token().await.unwrap();

        assert!(!token.never_expires());
        let now = chrono::Utc::now().timestamp_millis();
        assert!(token.expires_at > now);
        assert!(registry.validate_token(&token.token).await);
        assert!(!registry.validate_token_at(&token.token, now + 61_000).await);
    }

    #[tokio::test]
    async fn oversized_ttl_issues_non_expiring_token() {
        let config = TokenConfig {
            ttl_secs: Some(10_000_000_000_000),
            ..TokenConfig::default()
        };
        let (from_config, _) = registry(TokenPolicy::from(&config)).await;
        let token = from_config.generate_token().await.unwrap();
        assert!(token.never_expires());

        let policy = TokenPolicy {
            ttl: chrono::Duration::try_seconds(i64::MAX / 1_000),
            revoke_on_generate: false,
        };
        let (widest, _) = registry(policy).await;
        let token = widest.generate_token().await.unwrap();
        assert!(token.never_expires());
        assert!(widest.validate_token(&token.token).await);
    }

    #[tokio::test]
    async fn revoke_single_and_all() {
        let (registry, _) = registry(TokenPolicy::default()).await;
        let a = registry.generate_token().await.unwrap();
        let b = registry.generate_token().await.unwrap();
        let c = registry.generate_token().await.unwrap();

        assert!(registry.revoke_token(&a.token).await.unwrap());
        assert!(!registry.revoke_token(&a.token).await.unwrap());
        assert!(!registry.validate_token(&a.token).await);
        assert!(registry.validate_token(&b.token).await);

        assert_eq!(registry.revoke_all().await.unwrap(), 2);
        assert!(!registry.validate_token(&c.token).await);
    }

    #[test]
    fn persisted_shape_is_camel_case() {
        let token = AccessToken::new("abc".into(), NEVER_EXPIRES);
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["expiresAt"], serde_json::json!(i64::MAX));
        assert_eq!(value["permissions"], serde_json::json!(["read"]));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        assert_eq!(token_fingerprint("abc"), token_fingerprint("abc"));
        assert_eq!(token_fingerprint("abc").len(), 12);
        assert_ne!(token_fingerprint("abc"), token_fingerprint("abd"));
    }

    #[test]
    fn safe_equal_basic() {
        assert!(safe_equal("same", "same"));
        assert!(!safe_equal("same", "diff"));
        assert!(!safe_equal("short", "longer"));
    }
}
