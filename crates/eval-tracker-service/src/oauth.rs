//! Identity providers for the login flow.
//!
//! The OIDC provider runs the authorization-code flow with PKCE (S256) and
//! reads the user's claims from the `id_token` returned by the token
//! endpoint. The static provider skips the external hop and is meant for
//! development and tests.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use eval_tracker_core::Identity;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where the browser is sent to sign in.
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String;

    /// Exchanges an authorization code for the signed-in identity. The
    /// returned identity is never admin; the caller applies the admin list.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Identity>;
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

#[must_use]
pub fn pkce_pair() -> PkcePair {
    let bytes: [u8; 32] = rand::random();
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = pkce_challenge(&verifier);
    PkcePair {
        verifier,
        challenge,
    }
}

#[must_use]
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scope: String,
}

pub struct OidcProvider {
    settings: OidcSettings,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl OidcProvider {
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(settings: OidcSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            settings,
            http_client,
        })
    }
}

#[async_trait::async_trait]
impl IdentityProvider for OidcProvider {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String {
        let settings = &self.settings;
        let separator = if settings.authorize_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}{}",
            settings.authorize_url,
            query_string(&[
                ("client_id", settings.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", settings.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", settings.scope.as_str()),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "S256"),
            ])
        )
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Identity> {
        let settings = &self.settings;
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
            ("scope", settings.scope.as_str()),
        ];
        let response = self
            .http_client
            .post(&settings.token_url)
            .form(&form)
            .send()
            .await
            .context("token request failed")?;
        let status = response.status();
        let body: TokenResponse = response
            .json()
            .await
            .with_context(|| format!("token endpoint returned an unreadable body ({status})"))?;

        if let Some(error) = body.error {
            let detail = body.error_description.unwrap_or(error);
            bail!("authentication failed: {detail}");
        }
        if !status.is_success() {
            bail!("token endpoint returned {status}");
        }
        let id_token = body
            .id_token
            .ok_or_else(|| anyhow!("token response has no id_token"))?;
        identity_from_id_token(&id_token)
    }
}

/// Decodes the claims segment of a JWT without checking its signature; the
/// token arrives directly from the token endpoint over TLS.
///
/// # Errors
/// Returns an error when the token is malformed or lacks a subject.
pub fn identity_from_id_token(id_token: &str) -> Result<Identity> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow!("id_token is not a JWT"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("id_token payload is not base64url")?;
    let claims: Value =
        serde_json::from_slice(&bytes).context("id_token payload is not JSON")?;

    let claim = |name: &str| {
        claims
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    };

    let oid = claim("oid")
        .or_else(|| claim("sub"))
        .ok_or_else(|| anyhow!("id_token has no oid or sub claim"))?;
    let email = claim("email").or_else(|| claim("preferred_username"));
    let name = claim("name")
        .or_else(|| claim("preferred_username"))
        .unwrap_or_else(|| "Unknown User".to_string());

    Ok(Identity {
        oid,
        name,
        email,
        is_admin: false,
    })
}

/// Signs everyone in as one fixed identity. The authorization URL points
/// straight back at the callback with a dummy code.
pub struct StaticIdentityProvider {
    identity: Identity,
    redirect_uri: String,
}

impl StaticIdentityProvider {
    #[must_use]
    pub fn new(name: &str, email: Option<&str>, redirect_uri: &str) -> Self {
        Self {
            identity: Identity {
                oid: format!("dev-{}", name.trim().to_ascii_lowercase().replace(' ', "-")),
                name: name.trim().to_string(),
                email: email.map(|email| email.trim().to_string()),
                is_admin: false,
            },
            redirect_uri: redirect_uri.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentityProvider {
    fn authorization_url(&self, state: &str, _code_challenge: &str) -> String {
        format!(
            "{}?{}",
            self.redirect_uri,
            query_string(&[("code", "dev"), ("state", state)])
        )
    }

    async fn exchange_code(&self, _code: &str, code_verifier: &str) -> Result<Identity> {
        if code_verifier.is_empty() {
            bail!("missing code verifier");
        }
        Ok(self.identity.clone())
    }
}

fn query_string(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn must_ok<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err:#}"),
        }
    }

    fn fake_jwt(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.")
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r7wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        let pair = pkce_pair();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge, pkce_challenge(&pair.verifier));
    }

    #[test]
    fn id_token_claims_fall_back_to_preferred_username() {
        let token = fake_jwt(&json!({
            "sub": "subject-1",
            "preferred_username": "ada@example.com",
        }));
        let identity = must_ok(identity_from_id_token(&token));
        assert_eq!(identity.oid, "subject-1");
        assert_eq!(identity.name, "ada@example.com");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert!(!identity.is_admin);

        let token = fake_jwt(&json!({
            "oid": "object-1",
            "sub": "subject-1",
            "name": "Ada Lovelace",
            "email": "ada@contoso.com",
        }));
        let identity = must_ok(identity_from_id_token(&token));
        assert_eq!(identity.oid, "object-1");
        assert_eq!(identity.name, "Ada Lovelace");

        assert!(identity_from_id_token("not-a-jwt").is_err());
        assert!(identity_from_id_token(&fake_jwt(&json!({"name": "x"}))).is_err());
    }

    #[test]
    fn authorization_url_encodes_parameters() {
        let provider = must_ok(OidcProvider::new(OidcSettings {
            client_id: "client id".to_string(),
            client_secret: "secret".to_string(),
            authorize_url: "https://login.example.com/authorize".to_string(),
            token_url: "https://login.example.com/token".to_string(),
            redirect_uri: "http://localhost:8000/api/auth/callback".to_string(),
            scope: "openid profile email".to_string(),
        }));
        let url = provider.authorization_url("state-1", "challenge-1");
        assert!(url.starts_with("https://login.example.com/authorize?client_id=client%20id&"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fapi%2Fauth%2Fcallback"));
        assert!(url.contains("scope=openid%20profile%20email"));
        assert!(url.contains("state=state-1"));
        assert!(url.contains("code_challenge=challenge-1&code_challenge_method=S256"));
    }

    #[tokio::test]
    async fn static_provider_round_trips_through_callback() {
        let provider = StaticIdentityProvider::new(
            "Dev User",
            Some("dev@example.com"),
            "/api/auth/callback",
        );
        assert_eq!(
            provider.authorization_url("abc", "ignored"),
            "/api/auth/callback?code=dev&state=abc"
        );
        let identity = must_ok(provider.exchange_code("dev", "verifier").await);
        assert_eq!(identity.oid, "dev-dev-user");
        assert_eq!(identity.email.as_deref(), Some("dev@example.com"));
        assert!(provider.exchange_code("dev", "").await.is_err());
    }
}
