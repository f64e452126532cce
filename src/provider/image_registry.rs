//! # Image Registry Client
//!
//! Verifies registry credentials the way `docker login` does: ping `/v2/` and
//! answer the authentication challenge.
//!
//! - `Basic` challenge: retry the ping with basic credentials
//! - `Bearer` challenge: use the registry token directly, or fetch one from the realm
//!   (refresh-token grant for identity tokens, basic credentials otherwise)

use crate::model::ImageRegistry;
use crate::observability;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use regex::Regex;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Certificate, Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

const TOKEN_CLIENT_ID: &str = "fleet-controller";

static CHALLENGE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)="([^"]*)""#)
        .expect("Failed to compile CHALLENGE_PARAM regex - this should never happen")
});

/// Credentials presented to a registry
///
/// Wiped from memory when dropped.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server_address: String,
    pub identity_token: String,
    pub registry_token: String,
    /// PEM bundle trusted in addition to the web PKI roots
    pub ca: String,
}

impl RegistryAuth {
    pub fn from_registry(registry: &ImageRegistry) -> Self {
        let auth = &registry.spec.authconfig;
        Self {
            username: auth.username.clone(),
            password: auth.password.clone(),
            server_address: registry.spec.url.clone(),
            identity_token: auth.identitytoken.clone(),
            registry_token: auth.registrytoken.clone(),
            ca: registry.spec.ca.clone(),
        }
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("server_address", &self.server_address)
            .finish_non_exhaustive()
    }
}

/// Image registry login
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageRegistryClient: Send + Sync {
    async fn login(&self, auth: &RegistryAuth) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

fn parse_challenge(header: &str) -> Option<Challenge> {
    let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for captures in CHALLENGE_PARAM.captures_iter(params) {
        let value = captures[2].to_string();
        match &captures[1] {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }

    Some(Challenge::Bearer {
        realm: realm?,
        service,
        scope,
    })
}

/// Base URL for a registry address, defaulting to HTTPS
fn registry_base_url(server_address: &str) -> String {
    let address = server_address.trim().trim_end_matches('/');
    match address {
        "docker.io" | "index.docker.io" | "registry-1.docker.io" => {
            "https://registry-1.docker.io".to_string()
        }
        _ if address.starts_with("http://") || address.starts_with("https://") => {
            address.to_string()
        }
        _ => format!("https://{address}"),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Registry client speaking the Docker Registry HTTP API v2
#[derive(Debug, Clone)]
pub struct RegistryV2Client {
    timeout: Duration,
}

impl RegistryV2Client {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn http_client(&self, ca: &str) -> Result<Client> {
        let mut builder = Client::builder().timeout(self.timeout);
        if !ca.trim().is_empty() {
            let certificates = Certificate::from_pem_bundle(ca.as_bytes())
                .context("Failed to parse registry CA bundle")?;
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }
        builder.build().context("Failed to create HTTP client")
    }

    async fn fetch_bearer_token(
        &self,
        client: &Client,
        realm: &str,
        service: Option<&str>,
        scope: Option<&str>,
        auth: &RegistryAuth,
    ) -> Result<String> {
        let mut params = Vec::new();
        if let Some(service) = service {
            params.push(("service", service));
        }
        if let Some(scope) = scope {
            params.push(("scope", scope));
        }

        let request = if auth.identity_token.is_empty() {
            let mut request = client.get(realm);
            if !auth.username.is_empty() {
                params.push(("account", auth.username.as_str()));
                request = request.basic_auth(&auth.username, Some(&auth.password));
            }
            request.query(&params)
        } else {
            params.push(("grant_type", "refresh_token"));
            params.push(("refresh_token", auth.identity_token.as_str()));
            params.push(("client_id", TOKEN_CLIENT_ID));
            client.post(realm).form(&params)
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach token endpoint {realm}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("token endpoint {realm} returned {status}");
        }

        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to decode token response")?;
        body.token
            .filter(|token| !token.is_empty())
            .or(body.access_token)
            .filter(|token| !token.is_empty())
            .with_context(|| format!("token endpoint {realm} returned no token"))
    }

    async fn try_login(&self, auth: &RegistryAuth) -> Result<()> {
        let client = self.http_client(&auth.ca)?;
        let base = registry_base_url(&auth.server_address);
        let ping_url = format!("{base}/v2/");

        let ping = client
            .get(&ping_url)
            .send()
            .await
            .with_context(|| format!("Failed to reach registry {base}"))?;
        let status = ping.status();
        if status.is_success() {
            debug!(registry = %base, "Registry accepted anonymous access");
            return Ok(());
        }
        if status != StatusCode::UNAUTHORIZED {
            bail!("registry {base} returned {status}");
        }

        let challenge = ping
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_challenge)
            .with_context(|| format!("registry {base} sent no usable authentication challenge"))?;

        let request = match challenge {
            Challenge::Basic => client
                .get(&ping_url)
                .basic_auth(&auth.username, Some(&auth.password)),
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let token = if auth.registry_token.is_empty() {
                    self.fetch_bearer_token(
                        &client,
                        &realm,
                        service.as_deref(),
                        scope.as_deref(),
                        auth,
                    )
                    .await?
                } else {
                    auth.registry_token.clone()
                };
                client.get(&ping_url).bearer_auth(token)
            }
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach registry {base}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("registry {base} rejected credentials: {status}");
        }
        Ok(())
    }
}

impl Default for RegistryV2Client {
    fn default() -> Self {
        Self::new(Duration::from_secs(
            crate::constants::DEFAULT_CLIENT_TIMEOUT_SECS,
        ))
    }
}

#[async_trait]
impl ImageRegistryClient for RegistryV2Client {
    async fn login(&self, auth: &RegistryAuth) -> Result<()> {
        let result = self.try_login(auth).await;
        observability::metrics::record_registry_operation("image", "login", result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageRegistrySpec, Metadata, RegistryAuthConfig};
    use axum::http::{HeaderMap, HeaderValue};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn challenge(value: &str) -> Response {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_str(value).unwrap());
        response
    }

    fn authorization(headers: &HeaderMap) -> &str {
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    fn auth(server: &str, username: &str, password: &str) -> RegistryAuth {
        let mut auth = RegistryAuth::default();
        auth.username = username.to_string();
        auth.password = password.to_string();
        auth.server_address = server.to_string();
        auth
    }

    #[test]
    fn test_parse_challenge() {
        assert_eq!(parse_challenge(r#"Basic realm="Registry""#), Some(Challenge::Basic));
        assert_eq!(
            parse_challenge(
                r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="registry:catalog:*""#
            ),
            Some(Challenge::Bearer {
                realm: "https://auth.example.com/token".to_string(),
                service: Some("registry.example.com".to_string()),
                scope: Some("registry:catalog:*".to_string()),
            })
        );
        assert_eq!(parse_challenge(r#"Bearer service="x""#), None);
        assert_eq!(parse_challenge("Negotiate"), None);
    }

    #[test]
    fn test_registry_base_url() {
        assert_eq!(
            registry_base_url("registry.example.com"),
            "https://registry.example.com"
        );
        assert_eq!(
            registry_base_url("http://localhost:5000/"),
            "http://localhost:5000"
        );
        assert_eq!(registry_base_url("docker.io"), "https://registry-1.docker.io");
    }

    #[test]
    fn test_registry_auth_from_registry() {
        let registry = ImageRegistry {
            id: 1,
            metadata: Metadata::new("r1"),
            spec: ImageRegistrySpec {
                url: "registry.example.com".to_string(),
                authconfig: RegistryAuthConfig {
                    username: "u".to_string(),
                    password: "p".to_string(),
                    identitytoken: "identity".to_string(),
                    registrytoken: "registry".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };

        let auth = RegistryAuth::from_registry(&registry);
        assert_eq!(auth.server_address, "registry.example.com");
        assert_eq!(auth.identity_token, "identity");
        assert_eq!(auth.registry_token, "registry");
        assert!(!format!("{auth:?}").contains("\"p\""));
    }

    #[tokio::test]
    async fn test_login_basic_challenge() {
        // "u:p"
        let router = Router::new().route(
            "/v2/",
            get(|headers: HeaderMap| async move {
                if authorization(&headers) == "Basic dTpw" {
                    StatusCode::OK.into_response()
                } else {
                    challenge(r#"Basic realm="test""#)
                }
            }),
        );
        let base = serve(router).await;
        let client = RegistryV2Client::default();

        client.login(&auth(&base, "u", "p")).await.unwrap();

        let err = client.login(&auth(&base, "u", "wrong")).await.unwrap_err();
        assert!(err.to_string().contains("rejected credentials"));
    }

    #[tokio::test]
    async fn test_login_bearer_with_registry_token() {
        let router = Router::new().route(
            "/v2/",
            get(|headers: HeaderMap| async move {
                if authorization(&headers) == "Bearer abc" {
                    StatusCode::OK.into_response()
                } else {
                    challenge(r#"Bearer realm="http://127.0.0.1:1/token",service="test""#)
                }
            }),
        );
        let base = serve(router).await;

        let mut credentials = auth(&base, "", "");
        credentials.registry_token = "abc".to_string();
        RegistryV2Client::default().login(&credentials).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_bearer_fetches_token_from_realm() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let realm = format!("{base}/token");

        let router = Router::new()
            .route(
                "/v2/",
                get(move |headers: HeaderMap| {
                    let realm = realm.clone();
                    async move {
                        if authorization(&headers) == "Bearer xyz" {
                            StatusCode::OK.into_response()
                        } else {
                            challenge(&format!(r#"Bearer realm="{realm}",service="test""#))
                        }
                    }
                }),
            )
            .route(
                "/token",
                get(|headers: HeaderMap| async move {
                    if authorization(&headers) == "Basic dTpw" {
                        Json(serde_json::json!({ "token": "xyz" })).into_response()
                    } else {
                        StatusCode::UNAUTHORIZED.into_response()
                    }
                }),
            );
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let client = RegistryV2Client::default();
        client.login(&auth(&base, "u", "p")).await.unwrap();

        let err = client.login(&auth(&base, "u", "wrong")).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_login_unexpected_status() {
        let router = Router::new().route("/v2/", get(|| async { StatusCode::NOT_FOUND }));
        let base = serve(router).await;

        let err = RegistryV2Client::default()
            .login(&auth(&base, "u", "p"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
