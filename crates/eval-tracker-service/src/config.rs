//! Service configuration from CLI flags with environment fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{ArgAction, Args as ClapArgs, Parser};
use eval_tracker_core::DEFAULT_SESSION_LIFETIME_HOURS;

use crate::oauth::{IdentityProvider, OidcProvider, OidcSettings, StaticIdentityProvider};

#[derive(Parser, Debug, Clone)]
#[command(name = "eval-tracker-service")]
#[command(about = "HTTP service for the evaluation request tracker")]
pub struct Args {
    #[arg(long, env = "EVAL_TRACKER_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    #[arg(long, env = "EVAL_TRACKER_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Defaults to `<data-dir>/sessions`.
    #[arg(long, env = "EVAL_TRACKER_SESSIONS_DIR")]
    pub sessions_dir: Option<PathBuf>,

    #[arg(long, env = "SESSION_LIFETIME_HOURS", default_value_t = DEFAULT_SESSION_LIFETIME_HOURS)]
    pub session_lifetime_hours: i64,

    #[arg(long, env = "SESSION_SWEEP_INTERVAL_SECS", default_value_t = 600)]
    pub session_sweep_interval_secs: u64,

    /// Comma-separated emails granted the admin role.
    #[arg(long, env = "ADMIN_USERS", value_delimiter = ',')]
    pub admin_users: Vec<String>,

    #[arg(long, env = "BACKUP_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub backup_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Adds the `Secure` attribute to the session cookie.
    #[arg(long, env = "SECURE_COOKIES", default_value_t = false, action = ArgAction::Set)]
    pub secure_cookies: bool,

    /// Development identity used when no OAuth provider is configured.
    #[arg(long, env = "DEV_IDENTITY_NAME")]
    pub dev_identity_name: Option<String>,

    #[arg(long, env = "DEV_IDENTITY_EMAIL")]
    pub dev_identity_email: Option<String>,

    #[command(flatten)]
    pub oauth: OAuthArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct OAuthArgs {
    #[arg(long = "oauth-client-id", env = "OAUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long = "oauth-client-secret", env = "OAUTH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[arg(long = "oauth-authorize-url", env = "OAUTH_AUTHORIZE_URL")]
    pub authorize_url: Option<String>,

    #[arg(long = "oauth-token-url", env = "OAUTH_TOKEN_URL")]
    pub token_url: Option<String>,

    #[arg(
        long = "oauth-redirect-uri",
        env = "OAUTH_REDIRECT_URI",
        default_value = "http://localhost:8000/api/auth/callback"
    )]
    pub redirect_uri: String,

    #[arg(long = "oauth-scope", env = "OAUTH_SCOPE", default_value = "openid profile email")]
    pub scope: String,
}

impl Args {
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("sessions"))
    }

    /// Trimmed, non-empty admin emails.
    #[must_use]
    pub fn admin_emails(&self) -> Vec<String> {
        self.admin_users
            .iter()
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty())
            .collect()
    }

    /// # Errors
    /// Returns an error for settings that cannot produce a working service.
    pub fn validate(&self) -> Result<()> {
        if self.session_lifetime_hours <= 0 {
            bail!("SESSION_LIFETIME_HOURS must be positive");
        }
        if self.session_sweep_interval_secs == 0 {
            bail!("SESSION_SWEEP_INTERVAL_SECS must be positive");
        }
        let oauth = &self.oauth;
        let configured = [
            &oauth.client_id,
            &oauth.client_secret,
            &oauth.authorize_url,
            &oauth.token_url,
        ]
        .iter()
        .filter(|value| value.is_some())
        .count();
        if configured != 0 && configured != 4 {
            bail!(
                "OAUTH_CLIENT_ID, OAUTH_CLIENT_SECRET, OAUTH_AUTHORIZE_URL and OAUTH_TOKEN_URL must be set together"
            );
        }
        if configured == 0 && self.dev_identity_name.is_none() {
            bail!("configure OAuth settings or DEV_IDENTITY_NAME for development logins");
        }
        Ok(())
    }

    /// Builds the OIDC provider when OAuth is configured, otherwise the
    /// static development provider.
    ///
    /// # Errors
    /// Returns an error when neither provider can be built.
    pub fn identity_provider(&self) -> Result<Arc<dyn IdentityProvider>> {
        let oauth = &self.oauth;
        if let (Some(client_id), Some(client_secret), Some(authorize_url), Some(token_url)) = (
            &oauth.client_id,
            &oauth.client_secret,
            &oauth.authorize_url,
            &oauth.token_url,
        ) {
            let provider = OidcProvider::new(OidcSettings {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                authorize_url: authorize_url.clone(),
                token_url: token_url.clone(),
                redirect_uri: oauth.redirect_uri.clone(),
                scope: oauth.scope.clone(),
            })?;
            return Ok(Arc::new(provider));
        }

        match &self.dev_identity_name {
            Some(name) => {
                tracing::warn!(user = %name, "no OAuth provider configured, using development identity");
                Ok(Arc::new(StaticIdentityProvider::new(
                    name,
                    self.dev_identity_email.as_deref(),
                    &oauth.redirect_uri,
                )))
            }
            None => bail!("no identity provider configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        match Args::try_parse_from(args) {
            Ok(args) => args,
            Err(err) => panic!("failed to parse {args:?}: {err}"),
        }
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "eval-tracker-service",
            "--data-dir",
            "/srv/tracker",
            "--admin-users",
            "a@example.com, b@example.com,",
            "--backup-enabled",
            "false",
            "--dev-identity-name",
            "Dev User",
        ]);
        assert_eq!(args.sessions_dir(), PathBuf::from("/srv/tracker/sessions"));
        assert_eq!(
            args.admin_emails(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(!args.backup_enabled);
        assert_eq!(args.session_lifetime_hours, 24);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn partial_oauth_settings_are_rejected() {
        let args = parse(&[
            "eval-tracker-service",
            "--oauth-client-id",
            "client",
            "--dev-identity-name",
            "Dev User",
        ]);
        assert!(args.validate().is_err());
    }
}
