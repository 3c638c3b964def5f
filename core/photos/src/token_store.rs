//! OAuth2 client credentials and on-disk token persistence.
//!
//! Two token file shapes are accepted on load: the native shape written by
//! this tool and the shape written by Python's `google-auth` library. Only
//! the native shape is ever written.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use albumsync_common::{Error, Result};

/// Default OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Default OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Static OAuth2 client descriptor (the "installed app" credentials file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_uri: String,
    #[serde(default)]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct CredentialsFile {
    installed: ClientCredentials,
}

/// Load the credentials descriptor `{"installed": {...}}`.
///
/// # Errors
/// - [`Error::MissingCredentials`] if the file cannot be read
/// - [`Error::MalformedCredentials`] if it does not parse
pub async fn load_credentials(path: &Path) -> Result<ClientCredentials> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        Error::MissingCredentials(format!(
            "{} ({}). Download OAuth client credentials from the Google Cloud Console",
            path.display(),
            e
        ))
    })?;

    let file: CredentialsFile = serde_json::from_slice(&data)
        .map_err(|e| Error::MalformedCredentials(format!("{}: {}", path.display(), e)))?;

    let mut credentials = file.installed;
    if credentials.auth_uri.is_empty() {
        credentials.auth_uri = GOOGLE_AUTH_URL.to_string();
    }
    if credentials.token_uri.is_empty() {
        credentials.token_uri = GOOGLE_TOKEN_URL.to_string();
    }
    Ok(credentials)
}

/// Mutable OAuth2 token pair in its native on-disk shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(rename = "access_token", alias = "accessToken")]
    pub access_token: String,
    #[serde(
        rename = "token_type",
        alias = "tokenType",
        default = "default_token_type"
    )]
    pub token_type: String,
    #[serde(rename = "refresh_token", alias = "refreshToken", default)]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    /// Whether the token can be refreshed without user interaction.
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Check if the access token is missing, expired or about to expire.
    pub fn is_expired(&self) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        // Consider expired if less than 5 minutes remaining
        match self.expiry {
            Some(expiry) => expiry < Utc::now() + Duration::minutes(5),
            None => false,
        }
    }
}

/// Token file written by Python's `google-auth` library.
///
/// Its `token_uri`, `client_id`, `client_secret` and `scopes` fields are
/// ignored; the credentials descriptor is authoritative for those.
#[derive(Debug, Deserialize)]
struct LegacyToken {
    token: Option<String>,
    refresh_token: String,
    #[serde(default)]
    expiry: Option<String>,
}

impl From<LegacyToken> for StoredToken {
    fn from(legacy: LegacyToken) -> Self {
        Self {
            access_token: legacy.token.unwrap_or_default(),
            token_type: default_token_type(),
            refresh_token: legacy.refresh_token,
            expiry: legacy.expiry.as_deref().and_then(parse_legacy_expiry),
        }
    }
}

/// `google-auth` writes either RFC 3339 or a naive UTC timestamp.
fn parse_legacy_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// On-disk token encodings, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    /// Shape written by this tool.
    Native,
    /// Shape written by Python's `google-auth`.
    Legacy,
}

impl TokenFormat {
    /// Load order: first format that yields a refreshable token wins.
    pub const LOAD_ORDER: [TokenFormat; 2] = [TokenFormat::Native, TokenFormat::Legacy];

    /// Parse `data` as this format.
    pub fn parse(self, data: &[u8]) -> Result<StoredToken> {
        let token = match self {
            TokenFormat::Native => serde_json::from_slice::<StoredToken>(data),
            TokenFormat::Legacy => serde_json::from_slice::<LegacyToken>(data).map(Into::into),
        }
        .map_err(|e| Error::Serialization(format!("{:?} token: {}", self, e)))?;

        if !token.has_refresh_token() {
            return Err(Error::Serialization(format!(
                "{:?} token has no refresh token",
                self
            )));
        }
        Ok(token)
    }
}

/// Load a persisted token, accepting either on-disk shape.
///
/// # Errors
/// - File missing or unreadable
/// - No shape parses into a token carrying a refresh token
pub async fn load_token(path: &Path) -> Result<StoredToken> {
    let data = tokio::fs::read(path).await?;

    let mut last_error = None;
    for format in TokenFormat::LOAD_ORDER {
        match format.parse(&data) {
            Ok(token) => {
                tracing::debug!("Loaded {:?} token from {}", format, path.display());
                return Ok(token);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::Serialization("Unrecognized token file".to_string())))
}

/// Persist a token in the native shape (pretty JSON, trailing newline).
pub async fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    let mut data =
        serde_json::to_vec_pretty(token).map_err(|e| Error::Serialization(e.to_string()))?;
    data.push(b'\n');

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(&data).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_credentials() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"installed":{"client_id":"cid","client_secret":"secret",
                "auth_uri":"https://auth.example/auth","token_uri":"",
                "redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();

        let credentials = load_credentials(&path).await.unwrap();
        assert_eq!(credentials.client_id, "cid");
        assert_eq!(credentials.auth_uri, "https://auth.example/auth");
        assert_eq!(credentials.token_uri, GOOGLE_TOKEN_URL);
        assert_eq!(credentials.redirect_uris, vec!["http://localhost"]);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let dir = TempDir::new().unwrap();
        let err = load_credentials(&dir.path().join("nope.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn test_malformed_credentials() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"web": {}}"#).unwrap();

        let err = load_credentials(&path).await.unwrap_err();
        assert!(matches!(err, Error::MalformedCredentials(_)));
    }

    #[tokio::test]
    async fn test_native_token_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        let token = StoredToken {
            access_token: "access".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: "refresh".to_string(),
            expiry: Some(Utc::now()),
        };

        save_token(&path, &token).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        assert!(raw.contains("\"access_token\""));

        let loaded = load_token(&path).await.unwrap();
        assert_eq!(loaded, token);
    }

    #[tokio::test]
    async fn test_native_camel_case_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"accessToken":"a","refreshToken":"r","tokenType":"Bearer",
                "expiry":"2030-01-01T00:00:00+03:00"}"#,
        )
        .unwrap();

        let token = load_token(&path).await.unwrap();
        assert_eq!(token.access_token, "a");
        assert_eq!(token.refresh_token, "r");
        assert_eq!(
            token.expiry.unwrap().to_rfc3339(),
            "2029-12-31T21:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_legacy_token_is_mapped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"token":"py-access","refresh_token":"py-refresh",
                "token_uri":"https://oauth2.googleapis.com/token",
                "client_id":"cid","client_secret":"secret",
                "scopes":["https://www.googleapis.com/auth/photoslibrary"],
                "expiry":"2030-05-01T10:00:00.123456Z"}"#,
        )
        .unwrap();

        let token = load_token(&path).await.unwrap();
        assert_eq!(token.access_token, "py-access");
        assert_eq!(token.refresh_token, "py-refresh");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expiry.is_some());
    }

    #[test]
    fn test_legacy_bad_expiry_is_ignored() {
        let token = TokenFormat::Legacy
            .parse(br#"{"token":"a","refresh_token":"r","expiry":"soon"}"#)
            .unwrap();
        assert!(token.expiry.is_none());
    }

    #[tokio::test]
    async fn test_token_without_refresh_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token":"a","token_type":"Bearer"}"#).unwrap();

        assert!(load_token(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            load_token(&path).await,
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_token_expiration() {
        let mut token = StoredToken {
            access_token: "a".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: "r".to_string(),
            expiry: Some(Utc::now() + Duration::minutes(4)),
        };
        assert!(token.is_expired());

        token.expiry = Some(Utc::now() + Duration::hours(1));
        assert!(!token.is_expired());

        token.expiry = None;
        assert!(!token.is_expired());

        token.access_token.clear();
        assert!(token.is_expired());
    }
}
