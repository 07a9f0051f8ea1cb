//! OAuth2 installed-app flow for Google Drive.

use chrono::{Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use async_trait::async_trait;
use drivesync_common::{Error, Result};

use crate::credentials::{AuthFlow, Credential, DEFAULT_TOKEN_URI};

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Full Drive access scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const SUCCESS_PAGE: &str =
    "The authentication flow has completed. You may close this window.";
const FAILURE_PAGE: &str = "The authentication flow failed. Check the terminal for details.";

/// How long the redirect listener may take to close open connections.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth2 client registration from a Google `credentials.json` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientConfig>,
    web: Option<ClientConfig>,
}

impl ClientConfig {
    /// Parse the `installed` (or `web`) section of a client secrets file.
    pub fn from_secrets_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)
            .map_err(|e| Error::Authentication(format!("Invalid client secrets: {}", e)))?;

        file.installed.or(file.web).ok_or_else(|| {
            Error::Authentication(
                "Client secrets must contain an 'installed' or 'web' section".to_string(),
            )
        })
    }

    /// Load a client secrets file.
    ///
    /// # Errors
    /// - `Error::Authentication` if the file is missing or malformed
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Authentication(format!(
                "Cannot read client secrets {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_secrets_json(&json)
    }
}

/// Installed-app authorization against Google's identity provider.
///
/// Authorization opens a loopback listener on an ephemeral port, sends the
/// user to the consent page and waits for the redirect carrying the code.
pub struct InstalledAppFlow {
    client_secrets_path: PathBuf,
    scopes: Vec<String>,
    open_browser: bool,
    http: oauth2::reqwest::Client,
}

impl InstalledAppFlow {
    /// Create a flow reading the client registration from `client_secrets_path`.
    pub fn new(client_secrets_path: impl Into<PathBuf>, scopes: Vec<String>) -> Result<Self> {
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Authentication(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client_secrets_path: client_secrets_path.into(),
            scopes,
            open_browser: true,
            http,
        })
    }

    /// Whether to launch the system browser during authorization.
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    fn show_authorization_url(&self, url: &str) {
        println!("Please visit this URL to authorize this application: {}", url);

        if self.open_browser {
            if let Err(e) = open::that(url) {
                warn!("Could not open browser: {}", e);
            }
        }
    }
}

#[async_trait]
impl AuthFlow for InstalledAppFlow {
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or_else(|| Error::Authentication("No refresh token available".to_string()))?;

        let client = BasicClient::new(ClientId::new(credential.client_id.clone()))
            .set_client_secret(ClientSecret::new(credential.client_secret.clone()))
            .set_token_uri(
                TokenUrl::new(credential.token_uri.clone())
                    .map_err(|e| Error::Authentication(format!("Invalid token URL: {}", e)))?,
            );

        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        Ok(credential_from_response(&token, credential.clone()))
    }

    async fn authorize(&self) -> Result<Credential> {
        let config = ClientConfig::load(&self.client_secrets_path).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            Error::Authentication(format!("Failed to start redirect listener: {}", e))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Authentication(format!("Redirect listener has no address: {}", e)))?
            .port();
        let redirect_url = format!("http://localhost:{}/", port);

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(config.auth_uri.clone())
                    .map_err(|e| Error::Authentication(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_uri.clone())
                    .map_err(|e| Error::Authentication(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_url)
                    .map_err(|e| Error::Authentication(format!("Invalid redirect URL: {}", e)))?,
            );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        self.show_authorization_url(auth_url.as_str());

        let code = receive_authorization_code(listener, csrf_token.secret()).await?;
        debug!("Authorization code received, exchanging for tokens");

        let token = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        let base = Credential {
            access_token: String::new(),
            refresh_token: None,
            token_uri: config.token_uri,
            client_id: config.client_id,
            client_secret: config.client_secret,
            scopes: self.scopes.clone(),
            expires_at: None,
        };

        info!("Authorization completed");
        Ok(credential_from_response(&token, base))
    }
}

/// Merge a token response into `base`.
///
/// A response without a refresh token keeps the previous one.
fn credential_from_response(token: &BasicTokenResponse, base: Credential) -> Credential {
    let expires_in = token
        .expires_in()
        .unwrap_or_else(|| std::time::Duration::from_secs(3600));
    let expires_at =
        Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));

    let scopes = token
        .scopes()
        .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
        .unwrap_or(base.scopes);

    Credential {
        access_token: token.access_token().secret().clone(),
        refresh_token: token
            .refresh_token()
            .map(|t| t.secret().clone())
            .or(base.refresh_token),
        scopes,
        expires_at: Some(expires_at),
        ..base
    }
}

/// Outcome carried by a redirect request.
///
/// Returns `None` for requests unrelated to the flow, such as a bare `/`.
fn parse_callback(params: &HashMap<String, String>, expected_state: &str) -> Option<Result<String>> {
    if let Some(error) = params.get("error") {
        return Some(Err(Error::Authentication(format!(
            "Authorization denied: {}",
            error
        ))));
    }

    let code = params.get("code")?;

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Some(Err(Error::Authentication(
            "Authorization state mismatch (possible CSRF)".to_string(),
        )));
    }

    Some(Ok(code.clone()))
}

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    result: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

async fn redirect_handler(
    State(state): State<RedirectState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let Some(outcome) = parse_callback(&params, &state.expected_state) else {
        return (StatusCode::NOT_FOUND, Html(""));
    };

    let response = match &outcome {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE)),
        Err(e) => {
            warn!("Authorization callback rejected: {}", e);
            (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
        }
    };

    // Only the first callback counts
    if let Some(tx) = state.result.lock().await.take() {
        let _ = tx.send(outcome);
    }

    response
}

/// Serve the redirect listener until the authorization callback arrives.
///
/// The server shuts down gracefully once the callback has been answered.
async fn receive_authorization_code(listener: TcpListener, expected_state: &str) -> Result<String> {
    let (result_tx, result_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = Router::new()
        .route("/", get(redirect_handler))
        .with_state(RedirectState {
            expected_state: Arc::from(expected_state),
            result: Arc::new(Mutex::new(Some(result_tx))),
        });

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let outcome = result_rx.await.map_err(|_| {
        Error::Authentication("Redirect listener stopped before authorization".to_string())
    });

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => debug!("Redirect listener stopped"),
        Ok(Ok(Err(e))) => warn!("Redirect listener failed: {}", e),
        Ok(Err(e)) => warn!("Redirect listener task failed: {}", e),
        Err(_) => debug!("Redirect listener still draining connections, leaving it"),
    }

    outcome?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    const SECRETS: &str = r#"{
        "installed": {
            "client_id": "123.apps.googleusercontent.com",
            "project_id": "drivesync",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "shh",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn test_client_secrets_installed() {
        let config = ClientConfig::from_secrets_json(SECRETS).unwrap();
        assert_eq!(config.client_id, "123.apps.googleusercontent.com");
        assert_eq!(config.client_secret, "shh");
        assert_eq!(config.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_client_secrets_web_defaults() {
        let json = r#"{"web": {"client_id": "id", "client_secret": "secret"}}"#;
        let config = ClientConfig::from_secrets_json(json).unwrap();
        assert_eq!(config.auth_uri, GOOGLE_AUTH_URL);
        assert_eq!(config.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn test_client_secrets_missing_section() {
        let result = ClientConfig::from_secrets_json(r#"{"other": {}}"#);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_client_secrets_missing_file() {
        let result = ClientConfig::load(Path::new("/nonexistent/credentials.json")).await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_authorize_without_client_secrets_fails() {
        let flow = InstalledAppFlow::new("/nonexistent/credentials.json", vec![DRIVE_SCOPE.to_string()])
            .unwrap()
            .with_browser(false);

        let result = flow.authorize().await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_credential_from_response_keeps_refresh_token() {
        use oauth2::basic::BasicTokenType;
        use oauth2::{AccessToken, EmptyExtraTokenFields, StandardTokenResponse};

        let mut token = StandardTokenResponse::new(
            AccessToken::new("new-access".to_string()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        token.set_expires_in(Some(&std::time::Duration::from_secs(3599)));

        let base = Credential {
            access_token: "old-access".to_string(),
            refresh_token: Some("keep-me".to_string()),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![DRIVE_SCOPE.to_string()],
            expires_at: None,
        };

        let cred = credential_from_response(&token, base);

        assert_eq!(cred.access_token, "new-access");
        assert_eq!(cred.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(cred.scopes, vec![DRIVE_SCOPE.to_string()]);
        assert!(cred.is_valid());
    }

    fn params(query: &[(&str, &str)]) -> HashMap<String, String> {
        query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_callback_code() {
        let outcome = parse_callback(&params(&[("state", "abc"), ("code", "4/0Axyz")]), "abc");
        assert_eq!(outcome.unwrap().unwrap(), "4/0Axyz");
    }

    #[test]
    fn test_parse_callback_state_mismatch() {
        let outcome = parse_callback(&params(&[("state", "evil"), ("code", "xyz")]), "abc");
        assert!(matches!(outcome, Some(Err(Error::Authentication(_)))));
    }

    #[test]
    fn test_parse_callback_denied() {
        let outcome = parse_callback(&params(&[("error", "access_denied"), ("state", "abc")]), "abc");
        let err = outcome.unwrap().unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn test_parse_callback_unrelated() {
        assert!(parse_callback(&params(&[]), "abc").is_none());
        assert!(parse_callback(&params(&[("scope", "drive")]), "abc").is_none());
    }

    #[tokio::test]
    async fn test_receive_authorization_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            // Speculative preconnect that never sends a request
            drop(TcpStream::connect(addr).await.unwrap());

            let favicon = reqwest::get(format!("http://{}/favicon.ico", addr))
                .await
                .unwrap();
            assert_eq!(favicon.status(), reqwest::StatusCode::NOT_FOUND);

            let redirect = reqwest::get(format!("http://{}/?state=s1&code=c1", addr))
                .await
                .unwrap();
            assert_eq!(redirect.status(), reqwest::StatusCode::OK);
            redirect.text().await.unwrap()
        });

        let code = receive_authorization_code(listener, "s1").await.unwrap();
        assert_eq!(code, "c1");

        let page = browser.await.unwrap();
        assert!(page.contains(SUCCESS_PAGE));
    }

    #[tokio::test]
    async fn test_receive_denied_authorization() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            reqwest::get(format!("http://{}/?error=access_denied&state=s1", addr))
                .await
                .unwrap()
                .status()
        });

        let result = receive_authorization_code(listener, "s1").await;
        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(browser.await.unwrap(), reqwest::StatusCode::BAD_REQUEST);
    }
}
