/// Authentication extractors and utilities
use crate::{context::AppContext, db::models::Account, error::AuthError};
use axum::{async_trait, extract::FromRequestParts, http::header::HeaderMap, http::request::Parts};

/// Pull the token out of an `Authorization: Bearer ...` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Authenticated context. Extracting it verifies the access token and
/// loads the calling account; a token whose account has since been
/// deleted is treated as unauthorized.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or(AuthError::Unauthorized)?;

        let account_id = state.account_manager.tokens().verify_access_token(&token)?;

        let account = state
            .account_manager
            .get_account(&account_id)
            .await
            .map_err(|_| AuthError::Unauthorized)?;

        Ok(AuthContext { account })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123".to_string()));

        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
