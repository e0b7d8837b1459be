//! Authenticated session management
//!
//! This module implements the OAuth2 authorization-code-with-PKCE flow
//! against the provider's regional auth servers, transparent refresh of
//! expired tokens, and the single `request()` choke point that every API
//! call funnels through. Tokens are persisted via the [`TokenCache`] so a
//! new session can resume without re-authentication while the cached
//! token is valid.

use crate::config::{AuthConfig, RetryConfig};
use crate::error::{AurigaError, Result};
use crate::logging::get_logger;
use crate::token::{TokenCache, TokenRecord};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

const AUTH_BASE_GLOBAL: &str = "https://auth.tesla.com";
const AUTH_BASE_CHINA: &str = "https://auth.tesla.cn";

/// PKCE verifier/challenge pair
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier and its S256 challenge
    pub fn generate() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(86)
            .map(char::from)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

        Self {
            verifier,
            challenge,
        }
    }
}

/// Generate a random state nonce for the authorization request
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Capability interface for completing the interactive login: given the
/// provider's authorization URL, return the redirected callback URL.
/// Implementations range from "print and ask the user to paste" to a
/// browser-driving automation.
#[async_trait::async_trait]
pub trait UrlAuthenticator: Send + Sync {
    async fn authenticate(&self, authorization_url: &Url) -> Result<String>;
}

/// Status and body of one provider response, as seen by the session
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam under the session: the OAuth2 token exchange and the
/// API request loop go through this interface, so both can be exercised
/// against a scripted transport.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST a form-encoded body, as the token endpoint expects
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse>;

    /// Send an API request with optional bearer header, query string and
    /// JSON body
    async fn send_json(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        query: Option<&[(String, String)]>,
        body: Option<&Value>,
    ) -> Result<HttpResponse>;
}

/// Production transport over a shared reqwest client
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse> {
        let response = self
            .http
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(map_transport_error)?;
        read_response(response).await
    }

    async fn send_json(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        query: Option<&[(String, String)]>,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let mut builder = self.http.request(method, url);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(map_transport_error)?;
        read_response(response).await
    }
}

fn map_transport_error(err: reqwest::Error) -> AurigaError {
    if err.is_timeout() {
        AurigaError::timeout(err.to_string())
    } else {
        AurigaError::network(err.to_string())
    }
}

async fn read_response(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(map_transport_error)?;
    Ok(HttpResponse { status, body })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    id_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

struct AuthState {
    token: Option<TokenRecord>,
    cache: TokenCache,
}

/// Session manager holding the HTTP client and the bearer token for one
/// account identity. Sole writer of the token cache file.
pub struct AuthSession {
    email: String,
    auth_config: AuthConfig,
    retry_config: RetryConfig,
    transport: Box<dyn HttpTransport>,
    state: tokio::sync::Mutex<AuthState>,
    authenticator: Option<Box<dyn UrlAuthenticator>>,
    logger: crate::logging::StructuredLogger,
}

impl AuthSession {
    /// Create a session for an identity, loading any cached token
    pub fn new(
        email: &str,
        auth_config: AuthConfig,
        retry_config: RetryConfig,
        cache_file: &str,
        authenticator: Option<Box<dyn UrlAuthenticator>>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(auth_config.http_timeout_seconds))
            .build()?;
        Self::with_transport(
            email,
            auth_config,
            retry_config,
            cache_file,
            authenticator,
            Box::new(ReqwestTransport::new(http)),
        )
    }

    /// Create a session over an explicit transport
    pub fn with_transport(
        email: &str,
        auth_config: AuthConfig,
        retry_config: RetryConfig,
        cache_file: &str,
        authenticator: Option<Box<dyn UrlAuthenticator>>,
        transport: Box<dyn HttpTransport>,
    ) -> Result<Self> {
        let logger = get_logger("auth");
        let cache = TokenCache::load(cache_file)?;
        let token = cache.get(email).cloned();
        if token.is_some() {
            logger.debug(&format!("Resumed cached token for {}", email));
        }

        Ok(Self {
            email: email.to_string(),
            auth_config,
            retry_config,
            transport,
            state: tokio::sync::Mutex::new(AuthState { token, cache }),
            authenticator,
            logger,
        })
    }

    /// Account identity this session is bound to
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Whether a bearer token is currently held (possibly expired)
    pub async fn is_authorized(&self) -> bool {
        self.state.lock().await.token.is_some()
    }

    /// Regional authorization server base URL. Uses the explicit
    /// configuration when set, the host recorded with the cached token
    /// otherwise, and falls back to detection from the identity.
    pub async fn auth_base_url(&self) -> String {
        if !self.auth_config.auth_base_url.is_empty() {
            return self.auth_config.auth_base_url.clone();
        }
        if let Some(base) = self
            .state
            .lock()
            .await
            .token
            .as_ref()
            .and_then(|t| t.region_base_url.clone())
        {
            return base;
        }
        detect_auth_base(&self.email).to_string()
    }

    /// Build the provider's login URL with the PKCE challenge
    pub async fn authorization_url(&self, state: &str, pkce: &PkceChallenge) -> Result<Url> {
        let base = self.auth_base_url().await;
        let mut url = Url::parse(&format!("{}/oauth2/v3/authorize", base))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.auth_config.client_id)
            .append_pair("redirect_uri", &self.auth_config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.auth_config.scope)
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("login_hint", &self.email);
        Ok(url)
    }

    /// Exchange the authorization response (the redirected callback URL)
    /// for a bearer token and persist it. The state parameter is verified
    /// when the redirect carries one.
    pub async fn fetch_token(
        &self,
        authorization_response: &str,
        expected_state: &str,
        code_verifier: &str,
    ) -> Result<TokenRecord> {
        let redirect = Url::parse(authorization_response.trim())?;
        let mut code = None;
        let mut returned_state = None;
        for (key, value) in redirect.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => returned_state = Some(value.into_owned()),
                // Cancellation and provider denials surface as one auth error
                "error" => return Err(AurigaError::auth(format!("Authorization failed: {}", value))),
                _ => {}
            }
        }
        if let Some(s) = returned_state
            && s != expected_state
        {
            return Err(AurigaError::auth("State mismatch in authorization response"));
        }
        let code = code.ok_or_else(|| {
            AurigaError::auth("Authorization response carries no code parameter")
        })?;

        let base = self.auth_base_url().await;
        let record = self
            .exchange(
                &base,
                &[
                    ("grant_type", "authorization_code"),
                    ("client_id", &self.auth_config.client_id),
                    ("code", &code),
                    ("code_verifier", code_verifier),
                    ("redirect_uri", &self.auth_config.redirect_uri),
                ],
            )
            .await?;

        let mut state = self.state.lock().await;
        state.cache.store(&self.email, record.clone())?;
        state.token = Some(record.clone());
        self.logger.debug("Fetched new token");
        Ok(record)
    }

    /// Run the full interactive login through the configured authenticator
    pub async fn authenticate(&self) -> Result<TokenRecord> {
        let authenticator = self
            .authenticator
            .as_ref()
            .ok_or_else(|| AurigaError::auth("No authenticator configured"))?;
        let pkce = PkceChallenge::generate();
        let state = generate_state();
        let url = self.authorization_url(&state, &pkce).await?;
        let redirected = authenticator.authenticate(&url).await?;
        self.fetch_token(&redirected, &state, &pkce.verifier).await
    }

    /// Exchange the refresh token for a new bearer token and persist it.
    /// Callable while the current token is still valid; the cache entry
    /// for every other identity is unaffected.
    pub async fn refresh(&self) -> Result<TokenRecord> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut AuthState) -> Result<TokenRecord> {
        let refresh_token = state
            .token
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or_else(|| AurigaError::auth("No refresh token available"))?;
        let base = state
            .token
            .as_ref()
            .and_then(|t| t.region_base_url.clone())
            .unwrap_or_else(|| detect_auth_base(&self.email).to_string());

        let record = self
            .exchange(
                &base,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", &self.auth_config.client_id),
                    ("refresh_token", &refresh_token),
                    ("scope", &self.auth_config.scope),
                ],
            )
            .await?;

        state.cache.store(&self.email, record.clone())?;
        state.token = Some(record.clone());
        self.logger.debug("Refreshed token");
        Ok(record)
    }

    // Token endpoint exchange shared by both grants
    async fn exchange(&self, auth_base: &str, params: &[(&str, &str)]) -> Result<TokenRecord> {
        let url = format!("{}/oauth2/v3/token", auth_base);
        let response = self.transport.post_form(&url, params).await?;
        let body: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| AurigaError::auth(format!("Malformed token response: {}", e)))?;

        if let Some(error) = body.error {
            let detail = body.error_description.unwrap_or(error);
            return Err(AurigaError::auth(detail));
        }
        if !response.is_success() {
            return Err(AurigaError::auth(format!(
                "Token endpoint returned {}",
                response.status
            )));
        }

        let access_token = body
            .access_token
            .ok_or_else(|| AurigaError::auth("Token response carries no access token"))?;
        let refresh_token = body
            .refresh_token
            .ok_or_else(|| AurigaError::auth("Token response carries no refresh token"))?;
        let expires_at = Utc::now().timestamp() + body.expires_in.unwrap_or(0);

        Ok(TokenRecord {
            access_token,
            refresh_token,
            expires_at,
            id_token: body.id_token,
            region_base_url: Some(auth_base.to_string()),
        })
    }

    // Current access token, refreshing first when expired or near expiry.
    // The check-refresh-store sequence runs under the session mutex so two
    // concurrent requests cannot race a double refresh.
    async fn bearer(&self) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        let Some(token) = state.token.as_ref() else {
            return Ok(None);
        };
        if token.is_expired(self.auth_config.expiry_margin_seconds as i64) {
            self.logger.debug("Cached token expired, refreshing");
            let record = self.refresh_locked(&mut state).await?;
            return Ok(Some(record.access_token));
        }
        Ok(Some(token.access_token.clone()))
    }

    /// Current access token, refreshing or running the interactive flow
    /// when necessary
    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.bearer().await? {
            return Ok(token);
        }
        Ok(self.authenticate().await?.access_token)
    }

    /// Ensure a usable bearer token exists, running the interactive flow
    /// when necessary
    pub async fn ensure_authorized(&self) -> Result<()> {
        self.access_token().await.map(|_| ())
    }

    /// The single choke point for API requests: injects the bearer header,
    /// retries retryable status codes with backoff, and decodes provider
    /// error bodies into [`AurigaError::Http`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(String, String)]>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!(
            "{}/{}",
            self.auth_config.api_base_url.trim_end_matches('/'),
            path.trim_matches('/')
        );

        let mut attempt: u32 = 0;
        loop {
            let bearer = self.bearer().await?;
            let outcome = match self
                .transport
                .send_json(method.clone(), &url, bearer.as_deref(), query, body)
                .await
            {
                Ok(response) if response.is_success() => {
                    return Ok(serde_json::from_str(&response.body)?);
                }
                Ok(response) => {
                    let reason = reqwest::StatusCode::from_u16(response.status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("request failed");
                    let message = decode_error_body(reason, response.body);
                    Err(AurigaError::http(response.status, message))
                }
                Err(e) => Err(e),
            };

            match outcome {
                Err(err) if attempt < self.retry_config.max_retries && is_retryable(&err, &self.retry_config) => {
                    let delay = backoff_delay(attempt, &self.retry_config);
                    self.logger.debug(&format!(
                        "Retrying {} {} after {:.1}s ({})",
                        method,
                        path,
                        delay.as_secs_f64(),
                        err
                    ));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Pick the regional auth server from the account identity
pub fn detect_auth_base(email: &str) -> &'static str {
    if email.rsplit('@').next().is_some_and(|d| d.ends_with(".cn")) {
        AUTH_BASE_CHINA
    } else {
        AUTH_BASE_GLOBAL
    }
}

/// Whether an error is retried under the given policy: connection
/// failures, request timeouts and the configured status codes only
pub fn is_retryable(err: &AurigaError, config: &RetryConfig) -> bool {
    match err {
        AurigaError::Network { .. } | AurigaError::Timeout { .. } => true,
        AurigaError::Http { status, .. } => config.retryable_status_codes.contains(status),
        _ => false,
    }
}

/// Delay before the given retry attempt (0-based)
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let delay = config.retry_delay_seconds * config.backoff_factor.powi(attempt as i32);
    Duration::from_secs_f64(delay.max(0.0))
}

// Build a readable message from the provider's JSON error body, falling
// back to the raw body or the canonical status reason
fn decode_error_body(reason: &str, body: String) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) {
        let parts: Vec<String> = map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v.as_str() {
                Some(s) => format!("{}: {}", k, s),
                None => format!("{}: {}", k, v),
            })
            .collect();
        if !parts.is_empty() {
            return parts.join(", ");
        }
    }
    if !body.trim().is_empty() {
        return body.trim().to_string();
    }
    reason.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_challenge_is_base64url_of_sha256() {
        let pkce = PkceChallenge::generate();
        assert_eq!(pkce.verifier.len(), 86);

        let mut hasher = Sha256::new();
        hasher.update(pkce.verifier.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());
        assert_eq!(pkce.challenge, expected);
    }

    #[test]
    fn state_nonces_are_unique() {
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn region_detection_from_identity() {
        assert_eq!(detect_auth_base("owner@example.com"), AUTH_BASE_GLOBAL);
        assert_eq!(detect_auth_base("owner@example.com.cn"), AUTH_BASE_CHINA);
        assert_eq!(detect_auth_base("owner@163.cn"), AUTH_BASE_CHINA);
    }

    #[test]
    fn retryable_classification() {
        let config = RetryConfig::default();
        assert!(is_retryable(&AurigaError::network("reset"), &config));
        assert!(is_retryable(&AurigaError::timeout("deadline elapsed"), &config));
        assert!(is_retryable(&AurigaError::http(408, "unavailable"), &config));
        assert!(!is_retryable(&AurigaError::http(401, "unauthorized"), &config));
        assert!(!is_retryable(&AurigaError::vehicle("user_not_present"), &config));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let config = RetryConfig {
            max_retries: 3,
            retry_delay_seconds: 1.0,
            backoff_factor: 2.0,
            retryable_status_codes: vec![],
        };
        assert_eq!(backoff_delay(0, &config), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, &config), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, &config), Duration::from_secs(4));
    }

    #[test]
    fn error_body_decoding() {
        let msg = decode_error_body(
            "Request Timeout",
            r#"{"error": "vehicle unavailable", "error_description": ""}"#.to_string(),
        );
        assert_eq!(msg, "error: vehicle unavailable, error_description: ");

        let msg = decode_error_body("Request Timeout", "plain text".to_string());
        assert_eq!(msg, "plain text");

        let msg = decode_error_body("Request Timeout", String::new());
        assert_eq!(msg, "Request Timeout");
    }
}
