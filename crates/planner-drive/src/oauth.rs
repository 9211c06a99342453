//! OAuth 2.0 authorization code flow with PKCE for installed applications.
//!
//! # Flow Overview
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Bind a loopback listener and build the consent URL pointing back at it
//! 3. Open the consent page in the user's browser
//! 4. Capture the first redirect to `/callback`
//! 5. Exchange the authorization code (with the verifier) for tokens
//!
//! The consent window and the token endpoint sit behind the
//! [`ConsentWindow`] and [`TokenExchanger`] traits so the auth flow can be
//! driven without a browser or network.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::BoxFuture;
use crate::config::{Endpoints, OAuthCredentials};
use crate::error::{DriveError, DriveResult};
use crate::tokens::{TokenInfo, TokenRefresh};

/// PKCE code verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// Path the loopback listener expects the redirect on.
const CALLBACK_PATH: &str = "/callback";

/// PKCE verifier, challenge and CSRF state for one authorization attempt.
///
/// Implements RFC 7636.
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    /// base64url(SHA-256(verifier)).
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent URL: offline access, forced consent prompt.
    pub fn consent_url(
        &self,
        auth_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Query parameters of an observed redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirect {
    params: Vec<(String, String)>,
}

impl Redirect {
    /// Parses a request target such as `/callback?code=...&state=...`, or a
    /// full URL.
    pub fn parse(target: &str) -> Option<Self> {
        let url = if target.starts_with('/') {
            Url::parse(&format!("http://127.0.0.1{}", target)).ok()?
        } else {
            Url::parse(target).ok()?
        };

        Some(Self {
            params: url.query_pairs().into_owned().collect(),
        })
    }

    /// Builds a redirect from explicit pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// The authorization code, if consent was granted.
    pub fn code(&self) -> Option<&str> {
        self.param("code")
    }

    pub fn state(&self) -> Option<&str> {
        self.param("state")
    }

    /// The OAuth error, e.g. `access_denied`.
    pub fn error(&self) -> Option<&str> {
        self.param("error")
    }
}

/// What the consent window observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentOutcome {
    /// Redirect URI the consent URL was built with.
    pub redirect_uri: String,
    /// First redirect seen, or `None` if the window closed without one.
    pub redirect: Option<Redirect>,
}

/// Builds the consent URL once the redirect URI is known.
pub type ConsentUrlBuilder<'a> = &'a (dyn Fn(&str) -> String + Send + Sync);

/// A single-use interactive window that shows the consent page and reports
/// the redirect.
pub trait ConsentWindow: Send + Sync {
    fn present<'a>(
        &'a self,
        consent_url: ConsentUrlBuilder<'a>,
    ) -> BoxFuture<'a, DriveResult<ConsentOutcome>>;
}

/// Authorization code to exchange.
#[derive(Debug, Clone, Copy)]
pub struct CodeGrant<'a> {
    pub code: &'a str,
    pub verifier: &'a str,
    pub redirect_uri: &'a str,
}

/// The token endpoint.
pub trait TokenExchanger: Send + Sync {
    /// Exchanges an authorization code for a credential bundle.
    fn exchange<'a>(&'a self, grant: CodeGrant<'a>) -> BoxFuture<'a, DriveResult<TokenInfo>>;

    /// Obtains a new access token from a refresh token.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, DriveResult<TokenRefresh>>;
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP client for Google's token endpoint.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    token_url: String,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(
        credentials: OAuthCredentials,
        endpoints: &Endpoints,
        scopes: Vec<String>,
        timeout: Duration,
    ) -> DriveResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriveError::internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            token_url: endpoints.token_url.clone(),
            scopes,
            http_client,
        })
    }

    async fn post_token(&self, params: &[(&str, &str)], context: &str) -> DriveResult<String> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| DriveError::from_transport(context, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DriveError::from_transport("failed to read token response", e))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(DriveError::authentication(format!(
                "{} ({}): {}",
                context, status, detail
            )));
        }

        Ok(body)
    }
}

impl TokenExchanger for OAuthClient {
    fn exchange<'a>(&'a self, grant: CodeGrant<'a>) -> BoxFuture<'a, DriveResult<TokenInfo>> {
        Box::pin(async move {
            let params = [
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("code", grant.code),
                ("code_verifier", grant.verifier),
                ("grant_type", "authorization_code"),
                ("redirect_uri", grant.redirect_uri),
            ];
            let body = self.post_token(&params, "token exchange failed").await?;

            let response: TokenRefresh = serde_json::from_str(&body).map_err(|e| {
                DriveError::invalid_response(format!("invalid token response: {}", e))
            })?;

            info!(
                has_refresh_token = response.refresh_token.is_some(),
                "obtained tokens"
            );
            Ok(TokenInfo::new(
                response.access_token,
                response.refresh_token,
                response.expires_in,
                response.scope.unwrap_or_else(|| self.scopes.join(" ")),
                response.token_type,
            ))
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, DriveResult<TokenRefresh>> {
        Box::pin(async move {
            let params = [
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ];
            let body = self.post_token(&params, "token refresh failed").await?;

            let refresh: TokenRefresh = serde_json::from_str(&body).map_err(|e| {
                DriveError::invalid_response(format!("invalid token response: {}", e))
            })?;
            info!("refreshed access token");
            Ok(refresh)
        })
    }
}

/// Consent window made of the system browser and a loopback listener.
#[derive(Debug, Clone)]
pub struct LoopbackWindow {
    port_range: (u16, u16),
    timeout: Duration,
    open_browser: bool,
}

impl LoopbackWindow {
    pub fn new(port_range: (u16, u16), timeout: Duration) -> Self {
        Self {
            port_range,
            timeout,
            open_browser: true,
        }
    }

    /// Disables launching the browser; the URL is only printed.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    async fn bind(&self) -> DriveResult<TcpListener> {
        for port in self.port_range.0..=self.port_range.1 {
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
                return Ok(listener);
            }
        }
        Err(DriveError::configuration(format!(
            "no available port in range {}-{}",
            self.port_range.0, self.port_range.1
        )))
    }

    fn show(&self, url: &str) {
        if self.open_browser {
            info!("opening consent page in the browser");
            if let Err(e) = open::that(url) {
                warn!(error = %e, "failed to open browser");
                eprintln!("\nPlease open this URL in your browser:\n\n{}\n", url);
            }
        } else {
            eprintln!("\nOpen this URL in your browser to sign in:\n\n{}\n", url);
        }
    }

    /// Accepts connections until one hits the callback path.
    async fn wait_for_redirect(listener: &TcpListener) -> DriveResult<Redirect> {
        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| DriveError::internal(format!("failed to accept connection: {}", e)))?;
            debug!(%peer, "loopback connection");

            if let Some(redirect) = Self::handle_connection(stream).await {
                return Ok(redirect);
            }
        }
    }

    /// Reads one request; answers it and returns the redirect when it is the callback.
    async fn handle_connection(mut stream: TcpStream) -> Option<Redirect> {
        let mut request_line = String::new();
        {
            let mut reader = BufReader::new(&mut stream);
            reader.read_line(&mut request_line).await.ok()?;
        }

        // GET /callback?code=...&state=... HTTP/1.1
        let mut parts = request_line.split_whitespace();
        let method = parts.next();
        let target = parts.next().unwrap_or_default();

        let redirect = if method == Some("GET") && target.starts_with(CALLBACK_PATH) {
            Redirect::parse(target)
        } else {
            None
        };

        let response = match &redirect {
            None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            Some(r) if r.code().is_some() => {
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
                <html><body><h1>Signed in</h1>\
                <p>You can close this window and return to the planner.</p></body></html>"
            }
            Some(_) => {
                "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
                <html><body><h1>Sign-in cancelled</h1>\
                <p>You can close this window.</p></body></html>"
            }
        };

        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.flush().await;
        let _ = stream.shutdown().await;

        redirect
    }
}

impl ConsentWindow for LoopbackWindow {
    fn present<'a>(
        &'a self,
        consent_url: ConsentUrlBuilder<'a>,
    ) -> BoxFuture<'a, DriveResult<ConsentOutcome>> {
        Box::pin(async move {
            let listener = self.bind().await?;
            let port = listener
                .local_addr()
                .map_err(|e| DriveError::internal(format!("failed to read local address: {}", e)))?
                .port();
            let redirect_uri = format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH);
            debug!(%redirect_uri, "loopback listener ready");

            let url = consent_url(&redirect_uri);
            self.show(&url);

            let redirect =
                match tokio::time::timeout(self.timeout, Self::wait_for_redirect(&listener)).await {
                    Ok(result) => Some(result?),
                    Err(_) => {
                        info!("consent window timed out without a redirect");
                        None
                    }
                };

            Ok(ConsentOutcome {
                redirect_uri,
                redirect,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn pkce_verifier_length() {
        // 32 bytes, base64 without padding
        assert_eq!(PkceFlow::new().verifier.len(), 43);
    }

    #[test]
    fn pkce_challenge_is_deterministic() {
        assert_eq!(
            PkceFlow::compute_challenge("verifier"),
            PkceFlow::compute_challenge("verifier")
        );
    }

    #[test]
    fn pkce_values_are_random() {
        let a = PkceFlow::new();
        let b = PkceFlow::new();
        assert_ne!(a.challenge, b.challenge);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn consent_url_parameters() {
        let flow = PkceFlow::new();
        let url = flow.consent_url(
            "https://accounts.google.com/o/oauth2/v2/auth",
            "id.apps.googleusercontent.com",
            "http://127.0.0.1:8080/callback",
            &["https://www.googleapis.com/auth/drive".to_string()],
        );

        let parsed = Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["scope"], "https://www.googleapis.com/auth/drive");
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:8080/callback");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["state"], flow.state);
    }

    #[test]
    fn redirect_parsing() {
        let redirect = Redirect::parse("/callback?code=4%2F0Ab&state=xyz").unwrap();
        assert_eq!(redirect.code(), Some("4/0Ab"));
        assert_eq!(redirect.state(), Some("xyz"));
        assert_eq!(redirect.error(), None);

        let denied = Redirect::parse("http://127.0.0.1:8080/callback?error=access_denied").unwrap();
        assert_eq!(denied.code(), None);
        assert_eq!(denied.error(), Some("access_denied"));

        let empty_code = Redirect::parse("/callback?code=").unwrap();
        assert_eq!(empty_code.code(), None);
    }

    async fn send_request(uri: &str, target: &str) -> String {
        let addr = Url::parse(uri).unwrap();
        let mut stream = TcpStream::connect(("127.0.0.1", addr.port().unwrap()))
            .await
            .unwrap();
        stream
            .write_all(format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", target).as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn loopback_window_captures_the_callback() {
        let window = LoopbackWindow::new((0, 0), Duration::from_secs(5)).without_browser();
        let (tx, rx) = tokio::sync::oneshot::channel::<String>();
        let tx = Mutex::new(Some(tx));
        let builder = move |redirect_uri: &str| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(redirect_uri.to_string());
            }
            format!("https://consent.example/?redirect_uri={}", redirect_uri)
        };

        let client = tokio::spawn(async move {
            let uri = rx.await.unwrap();
            let ignored = send_request(&uri, "/favicon.ico").await;
            assert!(ignored.starts_with("HTTP/1.1 404"));
            send_request(&uri, "/callback?code=abc&state=s1").await
        });

        let outcome = window.present(&builder).await.unwrap();
        let response = client.await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(outcome.redirect_uri.ends_with("/callback"));
        let redirect = outcome.redirect.unwrap();
        assert_eq!(redirect.code(), Some("abc"));
        assert_eq!(redirect.state(), Some("s1"));
    }

    #[tokio::test]
    async fn loopback_window_times_out_as_closed() {
        let window = LoopbackWindow::new((0, 0), Duration::from_millis(50)).without_browser();
        let builder = |uri: &str| uri.to_string();

        let outcome = window.present(&builder).await.unwrap();
        assert!(outcome.redirect.is_none());
    }

    fn oauth_client(server: &MockServer) -> OAuthClient {
        OAuthClient::new(
            OAuthCredentials::new("id.apps.googleusercontent.com", "secret"),
            &Endpoints::local(&server.uri()),
            vec!["https://www.googleapis.com/auth/drive".to_string()],
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn exchange_code_for_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("code_verifier=the-verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.access",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = oauth_client(&server)
            .exchange(CodeGrant {
                code: "the-code",
                verifier: "the-verifier",
                redirect_uri: "http://127.0.0.1:8080/callback",
            })
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "ya29.access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(tokens.scope, "https://www.googleapis.com/auth/drive");
        assert!(!tokens.is_expired());
    }

    #[tokio::test]
    async fn exchange_failure_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let err = oauth_client(&server)
            .exchange(CodeGrant {
                code: "stale",
                verifier: "v",
                redirect_uri: "http://127.0.0.1:8080/callback",
            })
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(err.message().contains("invalid_grant: Bad Request"));
    }

    #[tokio::test]
    async fn refresh_returns_partial_bundle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let refresh = oauth_client(&server).refresh("1//refresh").await.unwrap();
        assert_eq!(refresh.access_token, "ya29.new");
        assert!(refresh.refresh_token.is_none());
    }
}
