//! OAuth2 authentication and token management for the Photos Library API.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use albumsync_common::{Error, Result};

use crate::token_store::{self, ClientCredentials, StoredToken};

/// Photos Library OAuth2 scopes.
pub const SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/photoslibrary",
    "https://www.googleapis.com/auth/photoslibrary.readonly",
    "https://www.googleapis.com/auth/photoslibrary.appendonly",
    "https://www.googleapis.com/auth/photoslibrary.sharing",
];

/// How long the loopback listener waits for the browser redirect.
pub const AUTHORIZATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// Upper bound on the callback request head.
const MAX_CALLBACK_REQUEST: usize = 16 * 1024;
/// How long one callback connection may stay silent.
const CALLBACK_READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

type OAuthClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth2 client for code exchange and token refresh.
pub struct AuthManager {
    client: OAuthClient,
    http: oauth2::reqwest::Client,
}

impl AuthManager {
    /// Create a manager from the credentials descriptor.
    ///
    /// `redirect_url` is only needed for the authorization-code exchange.
    pub fn new(credentials: &ClientCredentials, redirect_url: Option<&str>) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(credentials.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(credentials.auth_uri.clone())
                    .map_err(|e| Error::MalformedCredentials(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(credentials.token_uri.clone())
                    .map_err(|e| Error::MalformedCredentials(format!("Invalid token URL: {}", e)))?,
            );

        if let Some(redirect_url) = redirect_url {
            client = client.set_redirect_uri(
                RedirectUrl::new(redirect_url.to_string())
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
            );
        }

        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, http })
    }

    /// Generate the authorization URL for the user to visit.
    ///
    /// Returns the URL and the CSRF state expected back on the callback.
    pub fn authorization_url(&self) -> (String, String) {
        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        (auth_url.to_string(), csrf_token.secret().clone())
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    /// - Invalid authorization code
    /// - No refresh token granted
    /// - Network errors
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        let refresh_token = token_result
            .refresh_token()
            .ok_or_else(|| {
                Error::Authentication(
                    "No refresh token received. Ensure 'offline' access and 'consent' prompt were requested.".to_string(),
                )
            })?
            .secret()
            .clone();

        Ok(Self::stored(
            token_result.access_token().secret().clone(),
            refresh_token,
            token_result.expires_in(),
        ))
    }

    /// Refresh an access token using the refresh token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<StoredToken> {
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        // Refresh tokens may or may not be returned in refresh response
        let new_refresh_token = token_result
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_else(|| refresh_token.to_string());

        Ok(Self::stored(
            token_result.access_token().secret().clone(),
            new_refresh_token,
            token_result.expires_in(),
        ))
    }

    fn stored(
        access_token: String,
        refresh_token: String,
        expires_in: Option<std::time::Duration>,
    ) -> StoredToken {
        let expires_in = expires_in.unwrap_or_else(|| std::time::Duration::from_secs(3600));
        let expiry =
            Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));

        StoredToken {
            access_token,
            token_type: "Bearer".to_string(),
            refresh_token,
            expiry: Some(expiry),
        }
    }
}

/// Supplier of bearer tokens for API requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Get a currently valid access token.
    async fn access_token(&self) -> Result<String>;
}

/// Fixed access token, for tests and pre-authorized environments.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Token manager that refreshes expired tokens and persists every refresh.
pub struct TokenManager {
    auth_manager: AuthManager,
    token_path: Option<PathBuf>,
    tokens: Mutex<StoredToken>,
}

impl TokenManager {
    /// Create a new token manager with initial tokens.
    pub fn new(auth_manager: AuthManager, tokens: StoredToken) -> Self {
        Self {
            auth_manager,
            token_path: None,
            tokens: Mutex::new(tokens),
        }
    }

    /// Write refreshed tokens to `path`.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// Get the current tokens.
    pub async fn get_tokens(&self) -> StoredToken {
        self.tokens.lock().await.clone()
    }
}

#[async_trait]
impl AccessTokenSource for TokenManager {
    async fn access_token(&self) -> Result<String> {
        // Refresh and persist under one guard.
        let mut tokens = self.tokens.lock().await;

        if !tokens.is_expired() {
            return Ok(tokens.access_token.clone());
        }

        info!("Refreshing access token");
        let fresh = self
            .auth_manager
            .refresh_token(&tokens.refresh_token)
            .await?;

        if fresh.access_token != tokens.access_token {
            if let Some(path) = &self.token_path {
                if let Err(e) = token_store::save_token(path, &fresh).await {
                    warn!("Failed to persist refreshed token to {}: {}", path.display(), e);
                }
            }
        }

        *tokens = fresh;
        Ok(tokens.access_token.clone())
    }
}

/// Loopback listener receiving the OAuth2 redirect.
///
/// The socket is released when the server is dropped, so every exit path of
/// [`CallbackServer::wait_for_code`] closes it.
pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
}

impl CallbackServer {
    /// Bind an ephemeral port on 127.0.0.1.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            Error::AuthorizationFailed(format!("Failed to start local server: {}", e))
        })?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    /// Redirect URI pointing at this listener.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Wait for the OAuth2 redirect and return its authorization code.
    ///
    /// Connections are read concurrently, so an idle speculative connection
    /// from the browser cannot hold up the real redirect. Requests without
    /// any OAuth parameter (a favicon fetch) are answered with 404 and the
    /// wait goes on.
    ///
    /// # Errors
    /// - [`Error::AuthorizationFailed`] on timeout, an `error` parameter, a
    ///   missing code or a state mismatch
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        timeout: std::time::Duration,
    ) -> Result<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        tokio::time::timeout_at(deadline, self.serve(expected_state))
            .await
            .map_err(|_| Error::AuthorizationFailed("Authorization timeout".to_string()))?
    }

    async fn serve(&self, expected_state: &str) -> Result<String> {
        let mut pending = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("OAuth callback connection from {}", peer);
                    pending.spawn(read_request(stream));
                }
                Some(joined) = pending.join_next() => {
                    let Ok((mut stream, Some(request))) = joined else {
                        continue;
                    };

                    let outcome = match parse_callback(&request, expected_state) {
                        Ok(None) => {
                            if let Err(e) = respond(&mut stream, "404 Not Found", "Not found.").await {
                                debug!("Failed to answer stray request: {}", e);
                            }
                            continue;
                        }
                        Ok(Some(code)) => Ok(code),
                        Err(e) => Err(e),
                    };

                    let message = match &outcome {
                        Ok(_) => "Authorization complete. You can close this window.",
                        Err(_) => "Authorization failed. Return to the terminal for details.",
                    };
                    if let Err(e) = respond(&mut stream, "200 OK", message).await {
                        debug!("Failed to answer OAuth callback: {}", e);
                    }
                    return outcome;
                }
            }
        }
    }
}

/// Read one request head. `None` when nothing arrives within
/// [`CALLBACK_READ_TIMEOUT`] or the read fails.
async fn read_request(mut stream: TcpStream) -> (TcpStream, Option<String>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let read = tokio::time::timeout(CALLBACK_READ_TIMEOUT, async {
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_CALLBACK_REQUEST {
                break;
            }
        }
        Ok::<_, std::io::Error>(())
    })
    .await;

    match read {
        Ok(Ok(())) if !buf.is_empty() => {
            let request = String::from_utf8_lossy(&buf).into_owned();
            (stream, Some(request))
        }
        Ok(Err(e)) => {
            debug!("Dropping callback connection: {}", e);
            (stream, None)
        }
        _ => (stream, None),
    }
}

/// Extract the authorization code from a raw HTTP request head.
///
/// Returns `Ok(None)` for requests carrying none of `code`, `state` or
/// `error`.
fn parse_callback(request: &str, expected_state: &str) -> Result<Option<String>> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| Error::AuthorizationFailed("Malformed callback request".to_string()))?;

    let url = url::Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| Error::AuthorizationFailed(format!("Malformed callback URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if code.is_none() && state.is_none() && error.is_none() {
        return Ok(None);
    }
    if let Some(error) = error {
        return Err(Error::AuthorizationFailed(format!(
            "Consent was not granted: {}",
            error
        )));
    }
    let code = code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::AuthorizationFailed("No code in callback".to_string()))?;
    if state.as_deref() != Some(expected_state) {
        return Err(Error::AuthorizationFailed(
            "OAuth state mismatch".to_string(),
        ));
    }
    Ok(Some(code))
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) -> std::io::Result<()> {
    let body = format!("{}\n", message);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Run the browser consent flow and return fresh tokens.
pub async fn authorize_interactive(credentials: &ClientCredentials) -> Result<StoredToken> {
    let server = CallbackServer::bind().await?;
    let manager = AuthManager::new(credentials, Some(&server.redirect_uri()))?;
    let (auth_url, state) = manager.authorization_url();

    println!("Opening the browser for authorization...");
    if let Err(e) = open::that(&auth_url) {
        debug!("Could not open browser: {}", e);
        println!("Open this link manually:\n{}", auth_url);
    }

    let code = server.wait_for_code(&state, AUTHORIZATION_TIMEOUT).await?;
    manager.exchange_code(&code).await
}

/// Produce an auto-refreshing token source from stored or interactive tokens.
///
/// # Errors
/// - Missing or malformed credentials
/// - Authorization flow failure or timeout
/// - The freshly authorized token cannot be saved
pub async fn authenticate(credentials_path: &Path, token_path: &Path) -> Result<TokenManager> {
    let credentials = token_store::load_credentials(credentials_path).await?;

    let tokens = match token_store::load_token(token_path).await {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!("No usable stored token ({}), starting authorization", e);
            let tokens = authorize_interactive(&credentials).await?;
            token_store::save_token(token_path, &tokens).await?;
            println!("Authorization successful, token saved.");
            tokens
        }
    };

    let auth_manager = AuthManager::new(&credentials, None)?;
    Ok(TokenManager::new(auth_manager, tokens).with_persistence(token_path))
}
