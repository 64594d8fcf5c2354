/// Token issuance and verification
///
/// Access tokens and refresh tokens are both HS256 JWTs, signed with
/// separate secrets so one kind can never pass as the other. Refresh
/// tokens carry a random jti, which makes every issued value unique;
/// the service itself keeps no state. Whether a refresh token is still
/// live is decided by the account's stored token list, not here.
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by refresh tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Token service
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_secret: config.access_secret.clone(),
            refresh_secret: config.refresh_secret.clone(),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    /// Issue a short-lived signed access token for an account
    pub fn issue_access_token(&self, account_id: &str) -> AuthResult<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: account_id.to_string(),
            iat: now,
            exp: now + self.access_ttl_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("Failed to sign access token: {}", e)))
    }

    /// Issue a long-lived refresh token. The caller persists it into the
    /// account's refresh-token list; nothing is stored here.
    pub fn issue_refresh_token(&self, account_id: &str) -> AuthResult<String> {
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: account_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("Failed to sign refresh token: {}", e)))
    }

    /// Verify an access token and return the account id it names
    pub fn verify_access_token(&self, token: &str) -> AuthResult<String> {
        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            tracing::debug!("access token rejected: {}", e);
            AuthError::Unauthorized
        })?;

        Ok(data.claims.sub)
    }

    /// Verify a refresh token's signature and expiry and return the account
    /// id it names. Malformed, tampered, or expired tokens are all rejected
    /// the same way.
    pub fn verify_refresh_token(&self, token: &str) -> AuthResult<String> {
        let data = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            tracing::debug!("refresh token rejected: {}", e);
            AuthError::Unauthorized
        })?;

        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(refresh_ttl_secs: i64) -> AuthConfig {
        AuthConfig {
            access_secret: "access-secret-for-testing-0123456789abcdef".to_string(),
            refresh_secret: "refresh-secret-for-testing-0123456789abcdef".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs,
            reset_ttl_secs: 3600,
        }
    }

    #[test]
    fn test_refresh_round_trip() {
        let service = TokenService::new(&test_config(3600));
        let token = service.issue_refresh_token("account-1").unwrap();
        let sub = service.verify_refresh_token(&token).unwrap();
        assert_eq!(sub, "account-1");
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let service = TokenService::new(&test_config(3600));
        let a = service.issue_refresh_token("account-1").unwrap();
        let b = service.issue_refresh_token("account-1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expired_refresh_token_rejected() {
        // Past the default 60s validation leeway
        let service = TokenService::new(&test_config(-120));
        let token = service.issue_refresh_token("account-1").unwrap();
        assert!(matches!(
            service.verify_refresh_token(&token),
            Err(AuthError::Unauthorized)
        ));
    }

    #[test]
    fn test_tampered_refresh_token_rejected() {
        let service = TokenService::new(&test_config(3600));
        let token = service.issue_refresh_token("account-1").unwrap();
        let mut tampered = token.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(service.verify_refresh_token(&tampered).is_err());
    }

    #[test]
    fn test_access_token_is_not_a_refresh_token() {
        let service = TokenService::new(&test_config(3600));
        let access = service.issue_access_token("account-1").unwrap();
        assert!(service.verify_refresh_token(&access).is_err());

        let refresh = service.issue_refresh_token("account-1").unwrap();
        assert!(service.verify_access_token(&refresh).is_err());
    }

    #[test]
    fn test_access_round_trip() {
        let service = TokenService::new(&test_config(3600));
        let token = service.issue_access_token("account-7").unwrap();
        assert_eq!(service.verify_access_token(&token).unwrap(), "account-7");
    }
}
