/// Configuration management for Hearthgate
use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub email: Option<EmailConfig>,
    pub invites: InviteConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL of the web client, used in emailed links
    pub client_url: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub account_db: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret for signing access tokens
    pub access_secret: String,
    /// Separate secret for signing refresh tokens
    pub refresh_secret: String,
    /// Access token validity window in seconds
    pub access_ttl_secs: i64,
    /// Refresh token validity window in seconds
    pub refresh_ttl_secs: i64,
    /// Password reset token validity window in seconds
    pub reset_ttl_secs: i64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Invite system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteConfig {
    /// When true, registration requires a matching invite (except for the
    /// bootstrap account)
    pub required: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Parse a seconds value from an env var, defaulting when unset. A set but
/// malformed value is a configuration error, not a silent fallback.
fn parse_seconds(name: &str, raw: Option<String>, default: i64) -> AuthResult<i64> {
    match raw {
        Some(value) => value.parse().map_err(|_| {
            AuthError::Validation(format!("{} must be a whole number of seconds", name))
        }),
        None => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AuthResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("HG_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("HG_PORT")
            .unwrap_or_else(|_| "3080".to_string())
            .parse()
            .map_err(|_| AuthError::Validation("Invalid port number".to_string()))?;
        let client_url = env::var("HG_CLIENT_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));

        let data_directory: PathBuf = env::var("HG_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let account_db = env::var("HG_ACCOUNT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("accounts.sqlite"));

        let access_secret = env::var("HG_ACCESS_TOKEN_SECRET")
            .map_err(|_| AuthError::Validation("Access token secret required".to_string()))?;
        let refresh_secret = env::var("HG_REFRESH_TOKEN_SECRET")
            .map_err(|_| AuthError::Validation("Refresh token secret required".to_string()))?;
        let access_ttl_secs = parse_seconds(
            "HG_ACCESS_TOKEN_TTL_SECS",
            env::var("HG_ACCESS_TOKEN_TTL_SECS").ok(),
            900,
        )?;
        let refresh_ttl_secs = parse_seconds(
            "HG_REFRESH_TOKEN_TTL_SECS",
            env::var("HG_REFRESH_TOKEN_TTL_SECS").ok(),
            2_592_000,
        )?;
        let reset_ttl_secs = parse_seconds(
            "HG_RESET_TOKEN_TTL_SECS",
            env::var("HG_RESET_TOKEN_TTL_SECS").ok(),
            3600,
        )?;

        let email = if let Ok(smtp_url) = env::var("HG_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("HG_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        // Open signup means invites are not required
        let open_signup = env::var("HG_OPEN_SIGNUP")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                client_url,
            },
            storage: StorageConfig {
                data_directory,
                account_db,
            },
            authentication: AuthConfig {
                access_secret,
                refresh_secret,
                access_ttl_secs,
                refresh_ttl_secs,
                reset_ttl_secs,
            },
            email,
            invites: InviteConfig {
                required: !open_signup,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AuthResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AuthError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.access_secret.len() < 32 {
            return Err(AuthError::Validation(
                "Access token secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.refresh_secret.len() < 32 {
            return Err(AuthError::Validation(
                "Refresh token secret must be at least 32 characters".to_string(),
            ));
        }

        // Sharing one secret would let an access token pass as a refresh token
        if self.authentication.access_secret == self.authentication.refresh_secret {
            return Err(AuthError::Validation(
                "Access and refresh token secrets must differ".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds_defaults_when_unset() {
        assert_eq!(parse_seconds("HG_RESET_TOKEN_TTL_SECS", None, 3600).unwrap(), 3600);
    }

    #[test]
    fn test_parse_seconds_accepts_integers() {
        let parsed = parse_seconds("HG_ACCESS_TOKEN_TTL_SECS", Some("600".to_string()), 900);
        assert_eq!(parsed.unwrap(), 600);
    }

    #[test]
    fn test_parse_seconds_rejects_malformed_values() {
        let err = parse_seconds("HG_ACCESS_TOKEN_TTL_SECS", Some("15min".to_string()), 900)
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "HG_ACCESS_TOKEN_TTL_SECS must be a whole number of seconds"
        );
    }
}
