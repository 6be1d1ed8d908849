//! JWT bearer token issuing and validation
//!
//! Tokens follow the identity provider's HS256 layout: the principal id in
//! `sub`, an optional `email` claim and, when configured, an `aud` claim.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::auth::{TokenError, TokenPrincipal, TokenValidator};
use crate::domain::DomainError;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (principal ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issued at timestamp (Unix epoch)
    pub iat: i64,
    /// Expiration timestamp (Unix epoch)
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(sub: impl Into<String>, email: Option<String>, expiration_hours: u64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(expiration_hours as i64);

        Self {
            sub: sub.into(),
            email,
            aud: None,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }
}

/// Configuration for JWT service
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared HS256 secret
    pub secret: String,
    /// Expected `aud` claim; audience is not checked when unset
    pub audience: Option<String>,
    /// Lifetime of issued tokens
    pub expiration_hours: u64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>, expiration_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            audience: None,
            expiration_hours,
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

/// HS256 token service
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("audience", &self.config.audience)
            .field("expiration_hours", &self.config.expiration_hours)
            .field("secret", &"[hidden]")
            .finish()
    }
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Sign a token for a principal with the configured lifetime
    pub fn issue(&self, sub: &str, email: Option<String>) -> Result<String, DomainError> {
        self.issue_for(sub, email, self.config.expiration_hours)
    }

    /// Sign a token for a principal with an explicit lifetime
    pub fn issue_for(
        &self,
        sub: &str,
        email: Option<String>,
        expiration_hours: u64,
    ) -> Result<String, DomainError> {
        if sub.trim().is_empty() {
            return Err(DomainError::validation("Token subject cannot be empty"));
        }

        let mut claims = JwtClaims::new(sub, email, expiration_hours);
        claims.aud = self.config.audience.clone();

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| DomainError::internal(format!("Failed to generate JWT: {}", e)))
    }

    /// Decode and verify a token
    pub fn validate(&self, token: &str) -> Result<JwtClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        decode::<JwtClaims>(token, &self.decoding_key, &validation).map(|data| data.claims)
    }

    pub fn expiration_hours(&self) -> u64 {
        self.config.expiration_hours
    }
}

#[async_trait]
impl TokenValidator for JwtService {
    async fn validate_token(&self, token: &str) -> Result<TokenPrincipal, TokenError> {
        let claims = self
            .validate(token)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if claims.sub.trim().is_empty() {
            return Err(TokenError::Invalid("missing subject".to_string()));
        }

        Ok(TokenPrincipal {
            principal_id: claims.sub,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_service() -> JwtService {
        JwtService::new(JwtConfig::new("test-secret-key-12345", 24))
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let service = create_service();

        let token = service
            .issue("user-7", Some("sam@example.com".to_string()))
            .unwrap();
        let principal = service.validate_token(&token).await.unwrap();

        assert_eq!(principal.principal_id, "user-7");
        assert_eq!(principal.email.as_deref(), Some("sam@example.com"));
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let service = create_service();

        let result = service.validate_token("invalid-token").await;
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let service1 = JwtService::new(JwtConfig::new("secret-1", 24));
        let service2 = JwtService::new(JwtConfig::new("secret-2", 24));

        let token = service1.issue("user-7", None).unwrap();

        assert!(service2.validate_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token() {
        let service = JwtService::new(JwtConfig::new("test-secret", 24));

        let past_time = Utc::now() - Duration::hours(1);
        let claims = JwtClaims {
            sub: "user-7".to_string(),
            email: None,
            aud: None,
            iat: (past_time - Duration::hours(2)).timestamp(),
            exp: past_time.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(service.validate_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_audience_is_enforced() {
        let issuer = JwtService::new(JwtConfig::new("shared", 1).with_audience("other"));
        let service = JwtService::new(JwtConfig::new("shared", 1).with_audience("authenticated"));

        let foreign = issuer.issue("user-7", None).unwrap();
        assert!(service.validate_token(&foreign).await.is_err());

        let own = service.issue("user-7", None).unwrap();
        assert!(service.validate_token(&own).await.is_ok());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let service = create_service();
        assert!(service.issue("  ", None).is_err());
    }

    #[test]
    fn test_claims_expiration() {
        let claims = JwtClaims::new("user-7", None, 24);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", create_service());
        assert!(!debug.contains("test-secret-key-12345"));
    }
}
