//! Authentication
//!
//! Bearer token verification and principal extraction.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::AuthError;

/// Secret used when none is configured. Never acceptable outside development.
pub const DEV_SECRET: &str = "ewh-platform-secret-change-in-production";

/// Platform-wide role carried in the `platformRole` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformRole {
    #[default]
    User,
    TenantAdmin,
    PlatformAdmin,
    Owner,
}

impl PlatformRole {
    /// Platform-tier roles may act across tenants
    pub fn is_platform_tier(&self) -> bool {
        matches!(self, PlatformRole::PlatformAdmin | PlatformRole::Owner)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformRole::User => "USER",
            PlatformRole::TenantAdmin => "TENANT_ADMIN",
            PlatformRole::PlatformAdmin => "PLATFORM_ADMIN",
            PlatformRole::Owner => "OWNER",
        }
    }
}

impl fmt::Display for PlatformRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(PlatformRole::User),
            "TENANT_ADMIN" => Ok(PlatformRole::TenantAdmin),
            "PLATFORM_ADMIN" => Ok(PlatformRole::PlatformAdmin),
            "OWNER" => Ok(PlatformRole::Owner),
            _ => Err(AuthError::TokenInvalid),
        }
    }
}

/// Authenticated identity, attached to a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub platform_role: PlatformRole,
    pub tenant_role: Option<String>,
    pub tenant_id: Option<String>,
}

/// `aud` is either a single audience or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for Audience {
    fn from(audience: &str) -> Self {
        Audience::One(audience.to_string())
    }
}

/// Identifier claims issued as either strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    }))
}

/// Token claims as they appear on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub sub: Option<String>,
    #[serde(
        rename = "userId",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "platformRole", default, skip_serializing_if = "Option::is_none")]
    pub platform_role: Option<String>,
    #[serde(rename = "tenantRole", default, skip_serializing_if = "Option::is_none")]
    pub tenant_role: Option<String>,
    #[serde(
        rename = "tenantId",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    /// Claims for `user_id`, issued now and expiring after `ttl_secs`
    pub fn for_user(user_id: &str, ttl_secs: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: Some(user_id.to_string()),
            iat: Some(now),
            exp: Some(now + ttl_secs),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_role(mut self, role: PlatformRole) -> Self {
        self.platform_role = Some(role.as_str().to_string());
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn with_tenant_role(mut self, tenant_role: &str) -> Self {
        self.tenant_role = Some(tenant_role.to_string());
        self
    }

    fn into_principal(self) -> Result<Principal, AuthError> {
        let user_id = self
            .user_id
            .or(self.sub)
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::TokenInvalid)?;

        let platform_role = match self.platform_role.as_deref() {
            Some(role) => role.parse()?,
            None => PlatformRole::User,
        };

        Ok(Principal {
            user_id,
            email: self.email.unwrap_or_default(),
            platform_role,
            tenant_role: self.tenant_role,
            tenant_id: self.tenant_id,
        })
    }
}

/// Token verification parameters
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC shared secret
    pub secret: String,
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `aud` claim
    pub audience: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: DEV_SECRET.to_string(),
            issuer: "http://svc-auth:4001".to_string(),
            audience: "ewh-saas".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_string();
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.audience = audience.to_string();
        self
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.secret == DEV_SECRET
    }
}

/// Verifies bearer tokens against a fixed key, issuer and audience
#[derive(Clone)]
pub struct TokenVerifier {
    config: AuthConfig,
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(config: AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.leeway = 0;
        // Tokens without `exp` never expire.
        validation.required_spec_claims = HashSet::new();

        Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Verify a raw token and build the principal from its claims
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "token verification failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            }
        })?;

        data.claims.into_principal()
    }

    /// Sign claims with this verifier's key, filling in issuer and audience
    pub fn sign(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        let mut claims = claims.clone();
        claims.iss.get_or_insert_with(|| self.config.issuer.clone());
        claims
            .aud
            .get_or_insert_with(|| Audience::from(self.config.audience.as_str()));
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }
}

impl Default for TokenVerifier {
    fn default() -> Self {
        Self::new(AuthConfig::default())
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(AuthConfig::default().with_secret("test-secret"))
    }

    #[test]
    fn test_verify_valid_token() {
        let verifier = verifier();
        let claims = Claims::for_user("user-1", 3600)
            .with_email("a@example.com")
            .with_role(PlatformRole::TenantAdmin)
            .with_tenant("tenant-a")
            .with_tenant_role("manager");
        let token = verifier.sign(&claims).unwrap();

        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal.user_id, "user-1");
        assert_eq!(principal.email, "a@example.com");
        assert_eq!(principal.platform_role, PlatformRole::TenantAdmin);
        assert_eq!(principal.tenant_role.as_deref(), Some("manager"));
        assert_eq!(principal.tenant_id.as_deref(), Some("tenant-a"));
    }

    #[test]
    fn test_role_defaults_to_user() {
        let verifier = verifier();
        let token = verifier.sign(&Claims::for_user("user-2", 60)).unwrap();

        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal.platform_role, PlatformRole::User);
        assert_eq!(principal.tenant_id, None);
    }

    #[test]
    fn test_user_id_claim_wins_over_sub() {
        let verifier = verifier();
        let mut claims = Claims::for_user("sub-id", 60);
        claims.user_id = Some("user-id".to_string());
        let token = verifier.sign(&claims).unwrap();

        assert_eq!(verifier.verify(&token).unwrap().user_id, "user-id");
    }

    #[test]
    fn test_expired_token() {
        let verifier = verifier();
        let token = verifier.sign(&Claims::for_user("user-1", -3600)).unwrap();

        assert_eq!(verifier.verify(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let other = TokenVerifier::new(AuthConfig::default().with_secret("other"));
        let token = other.sign(&Claims::for_user("user-1", 60)).unwrap();

        assert_eq!(verifier().verify(&token), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn test_wrong_issuer_and_audience_are_invalid() {
        let verifier = verifier();

        let mut claims = Claims::for_user("user-1", 60);
        claims.iss = Some("http://elsewhere".to_string());
        let token = verifier.sign(&claims).unwrap();
        assert_eq!(verifier.verify(&token), Err(AuthError::TokenInvalid));

        let mut claims = Claims::for_user("user-1", 60);
        claims.aud = Some(Audience::from("someone-else"));
        let token = verifier.sign(&claims).unwrap();
        assert_eq!(verifier.verify(&token), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn test_array_audience_accepted() {
        let verifier = verifier();

        let mut claims = Claims::for_user("user-1", 60);
        claims.aud = Some(Audience::Many(vec![
            "ewh-saas".to_string(),
            "other".to_string(),
        ]));
        let token = verifier.sign(&claims).unwrap();
        assert_eq!(verifier.verify(&token).unwrap().user_id, "user-1");

        let mut claims = Claims::for_user("user-1", 60);
        claims.aud = Some(Audience::Many(vec!["other".to_string()]));
        let token = verifier.sign(&claims).unwrap();
        assert_eq!(verifier.verify(&token), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn test_numeric_ids_accepted() {
        let verifier = verifier();
        let exp = chrono::Utc::now().timestamp() + 60;
        let raw = serde_json::json!({
            "userId": 7,
            "tenantId": 42,
            "iss": "http://svc-auth:4001",
            "aud": "ewh-saas",
            "exp": exp,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &raw,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal.user_id, "7");
        assert_eq!(principal.tenant_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_malformed_and_incomplete_tokens() {
        let verifier = verifier();
        assert_eq!(verifier.verify("not-a-jwt"), Err(AuthError::TokenInvalid));

        let mut claims = Claims::for_user("user-1", 60);
        claims.sub = None;
        let token = verifier.sign(&claims).unwrap();
        assert_eq!(verifier.verify(&token), Err(AuthError::TokenInvalid));

        let mut claims = Claims::for_user("user-1", 60);
        claims.platform_role = Some("SUPERUSER".to_string());
        let token = verifier.sign(&claims).unwrap();
        assert_eq!(verifier.verify(&token), Err(AuthError::TokenInvalid));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_platform_tier() {
        assert!(PlatformRole::Owner.is_platform_tier());
        assert!(PlatformRole::PlatformAdmin.is_platform_tier());
        assert!(!PlatformRole::TenantAdmin.is_platform_tier());
        assert!(!PlatformRole::User.is_platform_tier());
    }
}
